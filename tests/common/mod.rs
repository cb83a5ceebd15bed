//! Shared fixtures for integration tests

#![allow(dead_code)]

use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use s3layer::cache::{CacheConfig, ObjectCache};
use s3layer::storage::{FsBackend, MemoryBackend, StorageBackend, XlBackend, XlConfig};
use s3layer::ObjectStore;
use tempfile::TempDir;
use tokio::io::AsyncWrite;

pub const MIB: usize = 1024 * 1024;

/// Deterministic, non-repeating-per-block payload
pub fn payload(len: usize) -> Vec<u8> {
    (0..len).map(|i| ((i * 7 + i / 251) % 256) as u8).collect()
}

/// An object store plus whatever keeps its disks alive
pub struct Fixture {
    pub name: &'static str,
    pub store: ObjectStore,
    pub memory: Option<Arc<MemoryBackend>>,
    _dir: Option<TempDir>,
}

fn cache() -> Arc<ObjectCache> {
    Arc::new(ObjectCache::new(CacheConfig::with_capacity(64 * MIB as u64)).unwrap())
}

fn build(backend: Arc<dyn StorageBackend>, cached: bool) -> ObjectStore {
    if cached {
        ObjectStore::with_cache(backend, cache())
    } else {
        ObjectStore::new(backend)
    }
}

pub fn memory(cached: bool) -> Fixture {
    let backend = Arc::new(MemoryBackend::new());
    Fixture {
        name: if cached { "memory+cache" } else { "memory" },
        store: build(backend.clone(), cached),
        memory: Some(backend),
        _dir: None,
    }
}

pub async fn fs(cached: bool) -> Fixture {
    let dir = TempDir::new().unwrap();
    let backend = Arc::new(FsBackend::new(dir.path()).await.unwrap());
    Fixture {
        name: if cached { "fs+cache" } else { "fs" },
        store: build(backend, cached),
        memory: None,
        _dir: Some(dir),
    }
}

pub async fn xl(disks: usize, cached: bool) -> Fixture {
    let dir = TempDir::new().unwrap();
    let roots = (0..disks)
        .map(|i| dir.path().join(format!("disk{}", i)))
        .collect();
    let backend = Arc::new(XlBackend::new(XlConfig::new(roots)).await.unwrap());
    Fixture {
        name: if cached { "xl+cache" } else { "xl" },
        store: build(backend, cached),
        memory: None,
        _dir: Some(dir),
    }
}

/// Every backend, with and without the cache
pub async fn all_fixtures() -> Vec<Fixture> {
    vec![
        memory(false),
        memory(true),
        fs(false).await,
        fs(true).await,
        xl(4, false).await,
        xl(4, true).await,
    ]
}

/// Sink that accepts `limit` bytes and then fails every write
pub struct EofWriter {
    limit: usize,
    pub written: Vec<u8>,
}

impl EofWriter {
    pub fn new(limit: usize) -> Self {
        Self {
            limit,
            written: Vec::new(),
        }
    }
}

impl AsyncWrite for EofWriter {
    fn poll_write(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let room = self.limit - self.written.len();
        if room == 0 {
            return Poll::Ready(Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "writer reached its limit",
            )));
        }
        let n = room.min(buf.len());
        self.written.extend_from_slice(&buf[..n]);
        Poll::Ready(Ok(n))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

/// Sink that accepts `limit` bytes and then never makes progress
pub struct StallingWriter {
    limit: usize,
    pub written: usize,
}

impl StallingWriter {
    pub fn new(limit: usize) -> Self {
        Self { limit, written: 0 }
    }
}

impl AsyncWrite for StallingWriter {
    fn poll_write(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let room = self.limit - self.written;
        if room == 0 {
            return Poll::Pending;
        }
        let n = room.min(buf.len());
        self.written += n;
        Poll::Ready(Ok(n))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}
