//! s3layer - S3-Compatible Object Storage
//!
//! Buckets and objects over HTTP, stored either in one local directory
//! tree or Reed-Solomon coded across several disks, with a bounded
//! read-through object cache in front.
//!
//! # Architecture
//!
//! ```text
//! HTTP ─▶ ObjectStore ─▶ naming ─▶ range ─▶ ObjectCache ─┬─▶ sink
//!                                              (miss) │
//!                                                     ▼
//!                                  StorageBackend (FS | XL | Memory)
//! ```
//!
//! # Modules
//!
//! - [`naming`] - Bucket and object name validation
//! - [`range`] - Byte range resolution
//! - [`storage`] - Storage backends
//! - [`ec`] - Erasure coding for the XL backend
//! - [`cache`] - Read-through object cache
//! - [`object_layer`] - `GetObject` and friends
//! - [`config`] - YAML configuration
//! - [`server`] - HTTP surface, health and metrics
//! - [`error`] - Error types

pub mod cache;
pub mod config;
pub mod ec;
pub mod error;
pub mod naming;
pub mod object_layer;
pub mod range;
pub mod server;
pub mod storage;

// Re-export commonly used types
pub use cache::{CacheConfig, CacheStats, ObjectCache};
pub use config::Config;
pub use error::{Error, Result};
pub use object_layer::{ObjectLayer, ObjectStore};
pub use range::ByteRange;
pub use storage::{BackendKind, FsBackend, MemoryBackend, ObjectDescriptor, StorageBackend, XlBackend};
