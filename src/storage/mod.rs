//! Storage Backends
//!
//! Authoritative providers of object bytes. Every backend exposes the same
//! read contract: `stat` describes an object, `open_range` returns a lazy,
//! single-pass producer for a resolved [`ByteRange`].
//!
//! # Variants
//!
//! - [`FsBackend`] - one local directory tree
//! - [`XlBackend`] - Reed-Solomon shards spread across several disk roots
//! - [`MemoryBackend`] - in-process map, used for tests and embedding
//!
//! The concrete variant is chosen once at construction and handed to the
//! object layer as `Arc<dyn StorageBackend>`.

use std::io;
use std::pin::Pin;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::Stream;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::range::ByteRange;

mod fs;
mod memory;
mod xl;

pub use fs::FsBackend;
pub use memory::MemoryBackend;
pub use xl::{XlBackend, XlConfig, DEFAULT_BLOCK_SIZE, MAX_XL_DISKS, MIN_XL_DISKS};

/// Chunk size used when streaming from disk (64KB)
pub const READ_CHUNK_SIZE: usize = 64 * 1024;

/// Directory holding backend-private state inside a disk root
pub const SYSTEM_DIR: &str = ".s3layer.sys";

/// Lazy, finite, single-pass sequence of object chunks
pub type ByteStream = Pin<Box<dyn Stream<Item = io::Result<Bytes>> + Send>>;

/// Which storage variant backs an object layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Single local filesystem
    Fs,
    /// Erasure-coded multi-disk
    Xl,
    /// In-memory
    Memory,
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendKind::Fs => write!(f, "FS"),
            BackendKind::Xl => write!(f, "XL"),
            BackendKind::Memory => write!(f, "Memory"),
        }
    }
}

/// Snapshot of object metadata at the moment of a `stat`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectDescriptor {
    pub bucket: String,
    pub key: String,
    /// Authoritative size in bytes
    pub size: i64,
    /// Opaque version token
    pub etag: String,
    pub mod_time: DateTime<Utc>,
}

/// Storage backend contract
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Create a bucket
    async fn make_bucket(&self, bucket: &str) -> Result<()>;

    /// Check whether a bucket exists
    async fn bucket_exists(&self, bucket: &str) -> Result<bool>;

    /// List bucket names in lexical order
    async fn list_buckets(&self) -> Result<Vec<String>>;

    /// Store an object, replacing any previous version
    async fn put_object(&self, bucket: &str, key: &str, data: Bytes) -> Result<ObjectDescriptor>;

    /// Remove an object
    async fn delete_object(&self, bucket: &str, key: &str) -> Result<()>;

    /// Describe an object
    async fn stat(&self, bucket: &str, key: &str) -> Result<ObjectDescriptor>;

    /// Open a lazy producer for `range` of an object
    async fn open_range(&self, bucket: &str, key: &str, range: ByteRange) -> Result<ByteStream>;

    /// Backend variant
    fn kind(&self) -> BackendKind;
}

/// A path that does not exist, including one that runs through a file
pub(crate) fn is_missing(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::NotFound | io::ErrorKind::NotADirectory
    )
}

/// Error for a producer that ended before delivering `expected` bytes
pub(crate) fn short_read(expected: i64, got: i64) -> io::Error {
    io::Error::new(
        io::ErrorKind::UnexpectedEof,
        format!("short read: expected {} bytes, got {}", expected, got),
    )
}
