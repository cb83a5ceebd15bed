//! Cache Entry Types
//!
//! Keys, immutable ready entries, and the fill states published to readers
//! waiting on an in-flight fill.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use chrono::{DateTime, Utc};

use crate::range::ByteRange;
use crate::storage::ObjectDescriptor;

/// Cache key - composite of bucket and object key
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CacheKey {
    bucket: String,
    key: String,
}

impl CacheKey {
    /// Create a new cache key
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
        }
    }

    /// Get bucket name
    #[inline]
    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Get object key
    #[inline]
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.bucket, self.key)
    }
}

/// Object version as reported by `stat`
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ObjectVersion {
    etag: String,
    modified: DateTime<Utc>,
}

impl ObjectVersion {
    pub fn new(etag: impl Into<String>, modified: DateTime<Utc>) -> Self {
        Self {
            etag: etag.into(),
            modified,
        }
    }

    #[inline]
    pub fn etag(&self) -> &str {
        &self.etag
    }

    #[inline]
    pub fn modified(&self) -> DateTime<Utc> {
        self.modified
    }

    /// Strictly later modification; equal times never supersede
    #[inline]
    pub fn supersedes(&self, other: &ObjectVersion) -> bool {
        self.modified > other.modified
    }
}

impl From<&ObjectDescriptor> for ObjectVersion {
    fn from(info: &ObjectDescriptor) -> Self {
        Self::new(info.etag.clone(), info.mod_time)
    }
}

/// A fully filled, immutable cache entry
///
/// Only constructed from a completed fill, so holding one means the whole
/// object of `version` is present.
pub struct CacheEntry {
    key: CacheKey,
    /// Object version the bytes belong to
    version: ObjectVersion,
    data: Bytes,
    /// Logical clock value of the last access (LRU ordering)
    last_access: AtomicU64,
    hits: AtomicU64,
}

impl CacheEntry {
    pub(crate) fn new(key: CacheKey, version: ObjectVersion, data: Bytes, tick: u64) -> Self {
        Self {
            key,
            version,
            data,
            last_access: AtomicU64::new(tick),
            hits: AtomicU64::new(0),
        }
    }

    #[inline]
    pub fn key(&self) -> &CacheKey {
        &self.key
    }

    #[inline]
    pub fn version(&self) -> &ObjectVersion {
        &self.version
    }

    /// Get data (zero-copy)
    #[inline]
    pub fn data(&self) -> &Bytes {
        &self.data
    }

    #[inline]
    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }

    /// Zero-copy view of `range`
    pub fn slice(&self, range: ByteRange) -> Bytes {
        self.data.slice(range.start() as usize..range.end() as usize)
    }

    /// Record an access at logical time `tick`
    #[inline]
    pub(crate) fn touch(&self, tick: u64) {
        self.last_access.store(tick, Ordering::Relaxed);
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn last_access(&self) -> u64 {
        self.last_access.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }
}

impl std::fmt::Debug for CacheEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheEntry")
            .field("key", &self.key)
            .field("version", &self.version)
            .field("size", &self.size())
            .field("hits", &self.hits())
            .finish()
    }
}

/// Lifecycle of a cache slot as seen by waiting readers
#[derive(Clone, Debug)]
pub enum FillState {
    /// A fill is streaming; the partial buffer is private to the filler
    Filling,
    /// The fill completed and the entry is shareable
    Ready(Arc<CacheEntry>),
    /// The fill was abandoned; the slot has been removed
    Invalid,
}

impl FillState {
    #[inline]
    pub fn is_settled(&self) -> bool {
        !matches!(self, FillState::Filling)
    }
}

/// Observable slot kind
///
/// `Invalid` slots are removed as soon as they are published, so only these
/// two are ever visible in the map.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryState {
    Filling,
    Ready,
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::range::resolve;

    #[test]
    fn test_cache_key() {
        let key = CacheKey::new("bucket", "path/to/object");
        assert_eq!(key.bucket(), "bucket");
        assert_eq!(key.key(), "path/to/object");
        assert_eq!(key.to_string(), "bucket/path/to/object");
        assert_eq!(key, CacheKey::new("bucket", "path/to/object"));
        assert_ne!(key, CacheKey::new("bucket2", "path/to/object"));
    }

    #[test]
    fn test_entry_slice_and_access() {
        let entry = CacheEntry::new(
            CacheKey::new("b", "k"),
            ObjectVersion::new("v1", Utc::now()),
            Bytes::from_static(b"0123456789"),
            3,
        );
        assert_eq!(entry.size(), 10);
        assert_eq!(entry.slice(resolve(2, 5, 10).unwrap()).as_ref(), b"23456");

        entry.touch(9);
        assert_eq!(entry.last_access(), 9);
        assert_eq!(entry.hits(), 1);
    }

    #[test]
    fn test_version_supersedes_only_when_newer() {
        let t0 = Utc::now();
        let old = ObjectVersion::new("a", t0);
        let new = ObjectVersion::new("b", t0 + chrono::Duration::seconds(1));
        let same_time = ObjectVersion::new("c", t0);

        assert!(new.supersedes(&old));
        assert!(!old.supersedes(&new));
        assert!(!same_time.supersedes(&old));
        assert!(!old.supersedes(&old));
    }

    #[test]
    fn test_fill_state_settled() {
        assert!(!FillState::Filling.is_settled());
        assert!(FillState::Invalid.is_settled());
    }
}
