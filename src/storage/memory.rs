//! In-Memory Backend
//!
//! Keeps objects in a sharded `DashMap` and counts every call, which makes
//! it the backend of choice for tests that need to observe read traffic.

use std::io;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use dashmap::DashMap;
use futures::stream;
use tracing::debug;

use super::{BackendKind, ByteStream, ObjectDescriptor, StorageBackend, READ_CHUNK_SIZE};
use crate::error::{Error, Result};
use crate::range::ByteRange;

/// Call counters of a [`MemoryBackend`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemoryBackendStats {
    pub objects: u64,
    pub bytes: u64,
    pub stats: u64,
    pub opens: u64,
    pub puts: u64,
}

#[derive(Clone)]
struct StoredObject {
    data: Bytes,
    descriptor: ObjectDescriptor,
}

/// In-memory storage backend
pub struct MemoryBackend {
    /// bucket -> key -> object
    buckets: DashMap<String, DashMap<String, StoredObject>>,
    chunk_size: usize,
    /// Streams fail after this many bytes (u64::MAX = never)
    fault_after: AtomicU64,
    stats: AtomicU64,
    opens: AtomicU64,
    puts: AtomicU64,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::with_chunk_size(READ_CHUNK_SIZE)
    }
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Backend whose producers yield chunks of `chunk_size` bytes
    pub fn with_chunk_size(chunk_size: usize) -> Self {
        Self {
            buckets: DashMap::new(),
            chunk_size: chunk_size.max(1),
            fault_after: AtomicU64::new(u64::MAX),
            stats: AtomicU64::new(0),
            opens: AtomicU64::new(0),
            puts: AtomicU64::new(0),
        }
    }

    /// Make every subsequently opened producer fail after `bytes` bytes
    pub fn inject_read_fault(&self, bytes: u64) {
        self.fault_after.store(bytes, Ordering::Relaxed);
    }

    pub fn clear_read_fault(&self) {
        self.fault_after.store(u64::MAX, Ordering::Relaxed);
    }

    /// Number of `open_range` calls so far
    pub fn open_count(&self) -> u64 {
        self.opens.load(Ordering::Relaxed)
    }

    pub fn stats(&self) -> MemoryBackendStats {
        let (objects, bytes) = self.buckets.iter().fold((0, 0), |(n, b), bucket| {
            let size: u64 = bucket.iter().map(|o| o.data.len() as u64).sum();
            (n + bucket.len() as u64, b + size)
        });
        MemoryBackendStats {
            objects,
            bytes,
            stats: self.stats.load(Ordering::Relaxed),
            opens: self.opens.load(Ordering::Relaxed),
            puts: self.puts.load(Ordering::Relaxed),
        }
    }

    fn lookup(&self, bucket: &str, key: &str) -> Result<StoredObject> {
        let objects = self
            .buckets
            .get(bucket)
            .ok_or_else(|| Error::BucketNotFound(bucket.to_string()))?;
        let found = objects
            .get(key)
            .map(|o| o.clone())
            .ok_or_else(|| Error::object_not_found(bucket, key));
        found
    }
}

#[async_trait]
impl StorageBackend for MemoryBackend {
    async fn make_bucket(&self, bucket: &str) -> Result<()> {
        match self.buckets.entry(bucket.to_string()) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                Err(Error::BucketExists(bucket.to_string()))
            }
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(DashMap::new());
                Ok(())
            }
        }
    }

    async fn bucket_exists(&self, bucket: &str) -> Result<bool> {
        Ok(self.buckets.contains_key(bucket))
    }

    async fn list_buckets(&self) -> Result<Vec<String>> {
        let mut names: Vec<String> = self.buckets.iter().map(|b| b.key().clone()).collect();
        names.sort();
        Ok(names)
    }

    async fn put_object(&self, bucket: &str, key: &str, data: Bytes) -> Result<ObjectDescriptor> {
        self.puts.fetch_add(1, Ordering::Relaxed);
        let objects = self
            .buckets
            .get(bucket)
            .ok_or_else(|| Error::BucketNotFound(bucket.to_string()))?;

        let descriptor = ObjectDescriptor {
            bucket: bucket.to_string(),
            key: key.to_string(),
            size: data.len() as i64,
            etag: uuid::Uuid::new_v4().simple().to_string(),
            mod_time: Utc::now(),
        };
        objects.insert(
            key.to_string(),
            StoredObject {
                data,
                descriptor: descriptor.clone(),
            },
        );
        Ok(descriptor)
    }

    async fn delete_object(&self, bucket: &str, key: &str) -> Result<()> {
        let objects = self
            .buckets
            .get(bucket)
            .ok_or_else(|| Error::BucketNotFound(bucket.to_string()))?;
        let removed = objects.remove(key);
        removed
            .map(|_| ())
            .ok_or_else(|| Error::object_not_found(bucket, key))
    }

    async fn stat(&self, bucket: &str, key: &str) -> Result<ObjectDescriptor> {
        self.stats.fetch_add(1, Ordering::Relaxed);
        Ok(self.lookup(bucket, key)?.descriptor)
    }

    async fn open_range(&self, bucket: &str, key: &str, range: ByteRange) -> Result<ByteStream> {
        self.opens.fetch_add(1, Ordering::Relaxed);
        let object = self.lookup(bucket, key)?;

        let start = range.start() as usize;
        let end = range.end() as usize;
        if end > object.data.len() {
            return Err(Error::Io(super::short_read(
                range.length(),
                object.data.len().saturating_sub(start) as i64,
            )));
        }
        let window = object.data.slice(start..end);
        debug!(bucket, key, start, end, "opening in-memory range");

        let fault_after = self.fault_after.load(Ordering::Relaxed);
        let chunk_size = self.chunk_size;
        let chunks = (0..window.len())
            .step_by(chunk_size)
            .map(move |offset| {
                if offset as u64 >= fault_after {
                    return Err(io::Error::new(
                        io::ErrorKind::Other,
                        "injected backend read fault",
                    ));
                }
                let upper = (offset + chunk_size).min(window.len());
                Ok(window.slice(offset..upper))
            });

        Ok(Box::pin(stream::iter(chunks)))
    }

    fn kind(&self) -> BackendKind {
        BackendKind::Memory
    }
}
