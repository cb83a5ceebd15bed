//! Single-Node Filesystem Backend
//!
//! Buckets are directories under one root and objects are plain files, so
//! a range read is a seek followed by a bounded sequential read.

use std::io::{self, SeekFrom};
use std::path::{Path, PathBuf};
use std::task::{Context, Poll};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::Stream;
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tokio_util::io::ReaderStream;
use tracing::{debug, instrument};

use super::{
    is_missing, short_read, BackendKind, ByteStream, ObjectDescriptor, StorageBackend,
    READ_CHUNK_SIZE, SYSTEM_DIR,
};
use crate::error::{Error, Result};
use crate::naming::is_valid_object_name;
use crate::range::ByteRange;

/// Filesystem storage backend rooted at one directory
#[derive(Debug, Clone)]
pub struct FsBackend {
    root: PathBuf,
}

impl FsBackend {
    /// Open (creating if needed) a backend rooted at `root`
    pub async fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(root.join(SYSTEM_DIR).join("tmp")).await?;
        debug!(root = %root.display(), "filesystem backend ready");
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn bucket_path(&self, bucket: &str) -> PathBuf {
        self.root.join(bucket)
    }

    fn object_path(&self, bucket: &str, key: &str) -> Result<PathBuf> {
        // Keys arrive validated; re-check since they become filesystem paths
        if !is_valid_object_name(key) {
            return Err(Error::InvalidObjectName {
                bucket: bucket.to_string(),
                object: key.to_string(),
            });
        }
        Ok(self.bucket_path(bucket).join(key))
    }

    async fn require_bucket(&self, bucket: &str) -> Result<()> {
        if self.bucket_exists(bucket).await? {
            Ok(())
        } else {
            Err(Error::BucketNotFound(bucket.to_string()))
        }
    }

    /// Map a missing path to the right not-found error
    async fn not_found(&self, bucket: &str, key: &str) -> Error {
        match self.bucket_exists(bucket).await {
            Ok(true) => Error::object_not_found(bucket, key),
            Ok(false) => Error::BucketNotFound(bucket.to_string()),
            Err(e) => e,
        }
    }

    fn descriptor(bucket: &str, key: &str, meta: &std::fs::Metadata) -> Result<ObjectDescriptor> {
        let mod_time: DateTime<Utc> = meta.modified()?.into();
        let size = meta.len() as i64;
        let nanos = mod_time.timestamp_nanos_opt().unwrap_or_default();
        Ok(ObjectDescriptor {
            bucket: bucket.to_string(),
            key: key.to_string(),
            size,
            etag: format!("{:x}-{:x}", nanos, size),
            mod_time,
        })
    }

    /// Remove now-empty directories between `path` and its bucket
    async fn prune_empty_parents(&self, bucket: &str, path: &Path) {
        let bucket_dir = self.bucket_path(bucket);
        let mut current = path.parent();
        while let Some(dir) = current {
            if dir == bucket_dir || !dir.starts_with(&bucket_dir) {
                break;
            }
            if fs::remove_dir(dir).await.is_err() {
                break;
            }
            current = dir.parent();
        }
    }
}

#[async_trait]
impl StorageBackend for FsBackend {
    #[instrument(skip(self))]
    async fn make_bucket(&self, bucket: &str) -> Result<()> {
        match fs::create_dir(self.bucket_path(bucket)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                Err(Error::BucketExists(bucket.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn bucket_exists(&self, bucket: &str) -> Result<bool> {
        match fs::metadata(self.bucket_path(bucket)).await {
            Ok(meta) => Ok(meta.is_dir()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn list_buckets(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        let mut entries = fs::read_dir(&self.root).await?;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with('.') || !entry.file_type().await?.is_dir() {
                continue;
            }
            names.push(name);
        }
        names.sort();
        Ok(names)
    }

    #[instrument(skip(self, data), fields(size = data.len()))]
    async fn put_object(&self, bucket: &str, key: &str, data: Bytes) -> Result<ObjectDescriptor> {
        self.require_bucket(bucket).await?;
        let target = self.object_path(bucket, key)?;

        let tmp = self
            .root
            .join(SYSTEM_DIR)
            .join("tmp")
            .join(uuid::Uuid::new_v4().to_string());
        let mut file = fs::File::create(&tmp).await?;
        let written = async {
            file.write_all(&data).await?;
            file.sync_all().await
        }
        .await;
        drop(file);
        if let Err(e) = written {
            let _ = fs::remove_file(&tmp).await;
            return Err(e.into());
        }

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).await?;
        }
        if let Err(e) = fs::rename(&tmp, &target).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(e.into());
        }

        let meta = fs::metadata(&target).await?;
        Self::descriptor(bucket, key, &meta)
    }

    #[instrument(skip(self))]
    async fn delete_object(&self, bucket: &str, key: &str) -> Result<()> {
        let path = self.object_path(bucket, key)?;
        match fs::remove_file(&path).await {
            Ok(()) => {
                self.prune_empty_parents(bucket, &path).await;
                Ok(())
            }
            Err(e) if is_missing(&e) => Err(self.not_found(bucket, key).await),
            Err(e) => Err(e.into()),
        }
    }

    async fn stat(&self, bucket: &str, key: &str) -> Result<ObjectDescriptor> {
        let path = self.object_path(bucket, key)?;
        match fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => Self::descriptor(bucket, key, &meta),
            Ok(_) => Err(Error::object_not_found(bucket, key)),
            Err(e) if is_missing(&e) => Err(self.not_found(bucket, key).await),
            Err(e) => Err(e.into()),
        }
    }

    #[instrument(skip(self))]
    async fn open_range(&self, bucket: &str, key: &str, range: ByteRange) -> Result<ByteStream> {
        let path = self.object_path(bucket, key)?;
        let mut file = match fs::File::open(&path).await {
            Ok(file) => file,
            Err(e) if is_missing(&e) => {
                return Err(self.not_found(bucket, key).await)
            }
            Err(e) => return Err(e.into()),
        };

        file.seek(SeekFrom::Start(range.start() as u64)).await?;
        let reader = file.take(range.length() as u64);
        let stream = ReaderStream::with_capacity(reader, READ_CHUNK_SIZE);

        Ok(Box::pin(ExactLength::new(Box::pin(stream), range.length())))
    }

    fn kind(&self) -> BackendKind {
        BackendKind::Fs
    }
}

/// Turns a quiet early end of the inner stream into `UnexpectedEof`
struct ExactLength {
    inner: ByteStream,
    expected: i64,
    seen: i64,
    done: bool,
}

impl ExactLength {
    fn new(inner: ByteStream, expected: i64) -> Self {
        Self {
            inner,
            expected,
            seen: 0,
            done: false,
        }
    }
}

impl Stream for ExactLength {
    type Item = io::Result<Bytes>;

    fn poll_next(self: std::pin::Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.done {
            return Poll::Ready(None);
        }
        match this.inner.as_mut().poll_next(cx) {
            Poll::Ready(Some(Ok(chunk))) => {
                this.seen += chunk.len() as i64;
                Poll::Ready(Some(Ok(chunk)))
            }
            Poll::Ready(Some(Err(e))) => {
                this.done = true;
                Poll::Ready(Some(Err(e)))
            }
            Poll::Ready(None) => {
                this.done = true;
                if this.seen < this.expected {
                    Poll::Ready(Some(Err(short_read(this.expected, this.seen))))
                } else {
                    Poll::Ready(None)
                }
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
