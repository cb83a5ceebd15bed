//! Object Layer
//!
//! The retrieval core. [`ObjectStore`] validates requests, resolves byte
//! ranges against the authoritative object size, and streams bytes to a
//! caller-supplied sink, going through the [`ObjectCache`] when one is
//! configured and straight to the backend otherwise.
//!
//! # GetObject gates
//!
//! ```text
//! bucket name → object name → sink/offset/length → stat → range → bytes
//! ```
//!
//! Every gate short-circuits; nothing is read from a backend before the
//! caller-supplied arguments have been checked.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::{debug, info, instrument, trace};

use crate::cache::{CacheKey, CacheLookup, CacheStats, FillMode, ObjectCache, ObjectVersion};
use crate::error::{Error, Result};
use crate::naming::{validate_bucket_name, validate_object_name};
use crate::range::{resolve, ByteRange};
use crate::storage::{short_read, BackendKind, ObjectDescriptor, StorageBackend};

/// Destination of a `get_object` call
pub type ObjectSink<'a> = &'a mut (dyn AsyncWrite + Send + Unpin);

/// Object-level operations served to the transport layer
#[async_trait]
pub trait ObjectLayer: Send + Sync {
    /// Create a bucket
    async fn make_bucket(&self, bucket: &str) -> Result<()>;

    /// List bucket names in lexical order
    async fn list_buckets(&self) -> Result<Vec<String>>;

    /// Store an object, replacing any previous version
    async fn put_object(&self, bucket: &str, object: &str, data: Bytes) -> Result<ObjectDescriptor>;

    /// Describe an object
    async fn get_object_info(&self, bucket: &str, object: &str) -> Result<ObjectDescriptor>;

    /// Write bytes `[offset, offset + length)` of an object to `sink`.
    ///
    /// On success exactly `length` bytes were written, in order. A `None`
    /// sink or a negative `offset`/`length` is rejected as `Unexpected`
    /// before the object is looked up.
    async fn get_object(
        &self,
        bucket: &str,
        object: &str,
        offset: i64,
        length: i64,
        sink: Option<ObjectSink<'_>>,
    ) -> Result<()>;

    /// Remove an object
    async fn delete_object(&self, bucket: &str, object: &str) -> Result<()>;
}

/// [`ObjectLayer`] over one storage backend and an optional cache
pub struct ObjectStore {
    backend: Arc<dyn StorageBackend>,
    cache: Option<Arc<ObjectCache>>,
}

impl ObjectStore {
    /// Object store reading straight from `backend`
    pub fn new(backend: Arc<dyn StorageBackend>) -> Self {
        Self {
            backend,
            cache: None,
        }
    }

    /// Object store reading through `cache`
    pub fn with_cache(backend: Arc<dyn StorageBackend>, cache: Arc<ObjectCache>) -> Self {
        Self {
            backend,
            cache: Some(cache),
        }
    }

    pub fn backend(&self) -> &Arc<dyn StorageBackend> {
        &self.backend
    }

    pub fn backend_kind(&self) -> BackendKind {
        self.backend.kind()
    }

    pub fn cache(&self) -> Option<&Arc<ObjectCache>> {
        self.cache.as_ref()
    }

    pub fn cache_stats(&self) -> Option<CacheStats> {
        self.cache.as_ref().map(|cache| cache.stats())
    }

    fn invalidate(&self, bucket: &str, object: &str) {
        if let Some(cache) = &self.cache {
            cache.invalidate(&CacheKey::new(bucket, object));
        }
    }

    /// Serve `range` through the cache.
    ///
    /// Whole-object reads may start a fill; partial reads only use an entry
    /// that is already ready.
    async fn read_through(
        &self,
        cache: &ObjectCache,
        info: &ObjectDescriptor,
        range: ByteRange,
        sink: ObjectSink<'_>,
    ) -> Result<u64> {
        let key = CacheKey::new(&info.bucket, &info.key);
        let mode = if range.covers(info.size) {
            FillMode::Populate
        } else {
            FillMode::ReadOnly
        };

        let version = ObjectVersion::from(info);
        match cache.lookup(&key, &version, info.size as u64, mode).await {
            CacheLookup::Hit(entry) => {
                trace!(%key, "cache hit");
                cache.serve(&entry, range, sink).await
            }
            CacheLookup::Fill(guard) => {
                let stream = self
                    .backend
                    .open_range(&info.bucket, &info.key, ByteRange::full(info.size)?)
                    .await?;
                guard.drive(stream, sink).await
            }
            CacheLookup::Miss => self.read_direct(info, range, sink).await,
        }
    }

    /// Serve `range` straight from the backend
    async fn read_direct(
        &self,
        info: &ObjectDescriptor,
        range: ByteRange,
        sink: ObjectSink<'_>,
    ) -> Result<u64> {
        let mut stream = self
            .backend
            .open_range(&info.bucket, &info.key, range)
            .await?;

        let mut written: u64 = 0;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            sink.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        sink.flush().await?;

        if written != range.length() as u64 {
            return Err(Error::Io(short_read(range.length(), written as i64)));
        }
        Ok(written)
    }
}

#[async_trait]
impl ObjectLayer for ObjectStore {
    #[instrument(skip(self))]
    async fn make_bucket(&self, bucket: &str) -> Result<()> {
        let bucket = validate_bucket_name(bucket)?;
        self.backend.make_bucket(bucket.as_str()).await?;
        info!(%bucket, "Bucket created");
        Ok(())
    }

    async fn list_buckets(&self) -> Result<Vec<String>> {
        self.backend.list_buckets().await
    }

    #[instrument(skip(self, data), fields(size = data.len()))]
    async fn put_object(&self, bucket: &str, object: &str, data: Bytes) -> Result<ObjectDescriptor> {
        let bucket = validate_bucket_name(bucket)?;
        let object = validate_object_name(bucket.as_str(), object)?;

        let result = self
            .backend
            .put_object(bucket.as_str(), object.as_str(), data)
            .await;
        self.invalidate(bucket.as_str(), object.as_str());
        result
    }

    #[instrument(skip(self))]
    async fn get_object_info(&self, bucket: &str, object: &str) -> Result<ObjectDescriptor> {
        let bucket = validate_bucket_name(bucket)?;
        let object = validate_object_name(bucket.as_str(), object)?;
        self.backend.stat(bucket.as_str(), object.as_str()).await
    }

    #[instrument(skip(self, sink), fields(backend = %self.backend.kind()))]
    async fn get_object(
        &self,
        bucket: &str,
        object: &str,
        offset: i64,
        length: i64,
        sink: Option<ObjectSink<'_>>,
    ) -> Result<()> {
        let bucket = validate_bucket_name(bucket)?;
        let object = validate_object_name(bucket.as_str(), object)?;

        let sink = sink.ok_or_else(|| Error::Unexpected("no writer supplied".into()))?;
        if offset < 0 || length < 0 {
            return Err(Error::Unexpected(format!(
                "negative range offset {} length {}",
                offset, length
            )));
        }

        let info = self.backend.stat(bucket.as_str(), object.as_str()).await?;
        let range = resolve(offset, length, info.size)?;

        let written = match &self.cache {
            Some(cache) => self.read_through(cache, &info, range, sink).await?,
            None => self.read_direct(&info, range, sink).await?,
        };

        debug!(written, size = info.size, "GetObject complete");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete_object(&self, bucket: &str, object: &str) -> Result<()> {
        let bucket = validate_bucket_name(bucket)?;
        let object = validate_object_name(bucket.as_str(), object)?;

        let result = self
            .backend
            .delete_object(bucket.as_str(), object.as_str())
            .await;
        self.invalidate(bucket.as_str(), object.as_str());
        result
    }
}

// =============================================================================
// Tests
// =============================================================================
