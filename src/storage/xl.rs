//! Erasure-Coded Multi-Disk Backend ("XL")
//!
//! Objects are cut into fixed-size blocks; every block is Reed-Solomon
//! encoded into `data + parity` shards and shard `i` is appended to the
//! part file on disk `i`. Each disk also keeps its own copy of the object
//! metadata so that a read quorum can be established without any single
//! disk being authoritative.
//!
//! ```text
//!  disk0/bucket/key/{xl.json, part.1}   shard 0 of every block
//!  disk1/bucket/key/{xl.json, part.1}   shard 1 of every block
//!  ...
//!  diskN/bucket/key/{xl.json, part.1}   shard N of every block
//! ```
//!
//! Range reads touch only the blocks that intersect the range and fall back
//! to parity shards when data shards are missing or unreadable.

use std::collections::BTreeMap;
use std::io::{self, SeekFrom};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use futures::stream;
use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tracing::{debug, instrument, warn};

use super::{
    is_missing, short_read, BackendKind, ByteStream, ObjectDescriptor, StorageBackend, SYSTEM_DIR,
};
use crate::ec::ErasureCodec;
use crate::error::{Error, Result};
use crate::naming::is_valid_object_name;
use crate::range::ByteRange;

/// Minimum number of disks in an erasure set
pub const MIN_XL_DISKS: usize = 4;

/// Maximum number of disks in an erasure set
pub const MAX_XL_DISKS: usize = 16;

/// Default erasure block size (1MB)
pub const DEFAULT_BLOCK_SIZE: usize = 1024 * 1024;

const META_FILE: &str = "xl.json";
const PART_FILE: &str = "part.1";
const META_VERSION: &str = "1.0.0";

/// XL backend configuration
#[derive(Debug, Clone)]
pub struct XlConfig {
    /// One root directory per disk
    pub disks: Vec<PathBuf>,
    /// Data shards per block
    pub data_shards: usize,
    /// Parity shards per block
    pub parity_shards: usize,
    /// Bytes per erasure block
    pub block_size: usize,
}

impl XlConfig {
    /// Half of `disks` for parity, the rest for data
    pub fn new(disks: Vec<PathBuf>) -> Self {
        let parity = disks.len() / 2;
        Self {
            data_shards: disks.len() - parity,
            parity_shards: parity,
            disks,
            block_size: DEFAULT_BLOCK_SIZE,
        }
    }

    pub fn with_block_size(mut self, block_size: usize) -> Self {
        self.block_size = block_size;
        self
    }

    pub fn validate(&self) -> Result<()> {
        let n = self.disks.len();
        if !(MIN_XL_DISKS..=MAX_XL_DISKS).contains(&n) {
            return Err(Error::Config(format!(
                "erasure set needs {}..={} disks, got {}",
                MIN_XL_DISKS, MAX_XL_DISKS, n
            )));
        }
        if self.data_shards + self.parity_shards != n {
            return Err(Error::InvalidEcConfig(format!(
                "{} data + {} parity shards do not match {} disks",
                self.data_shards, self.parity_shards, n
            )));
        }
        if self.block_size == 0 {
            return Err(Error::Config("block_size must be greater than 0".into()));
        }
        Ok(())
    }
}

/// Per-disk object metadata (`xl.json`)
#[derive(Debug, Clone, Serialize, Deserialize)]
struct XlMeta {
    version: String,
    size: i64,
    etag: String,
    mod_time: DateTime<Utc>,
    erasure: ErasureInfo,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ErasureInfo {
    data_blocks: usize,
    parity_blocks: usize,
    block_size: usize,
    /// Shard index stored on this disk
    index: usize,
}

impl XlMeta {
    /// Fields that must agree across disks, ignoring the shard index
    fn quorum_key(&self) -> (i64, &str, DateTime<Utc>, usize, usize, usize) {
        (
            self.size,
            self.etag.as_str(),
            self.mod_time,
            self.erasure.data_blocks,
            self.erasure.parity_blocks,
            self.erasure.block_size,
        )
    }

    fn descriptor(&self, bucket: &str, key: &str) -> ObjectDescriptor {
        ObjectDescriptor {
            bucket: bucket.to_string(),
            key: key.to_string(),
            size: self.size,
            etag: self.etag.clone(),
            mod_time: self.mod_time,
        }
    }
}

async fn disk_online(disk: &Path) -> bool {
    matches!(fs::metadata(disk).await, Ok(meta) if meta.is_dir())
}

/// Erasure-coded storage backend
#[derive(Debug, Clone)]
pub struct XlBackend {
    disks: Vec<PathBuf>,
    codec: ErasureCodec,
    block_size: usize,
}

impl XlBackend {
    /// Validate `config` and prepare every disk root
    pub async fn new(config: XlConfig) -> Result<Self> {
        config.validate()?;
        let codec = ErasureCodec::new(config.data_shards, config.parity_shards)?;

        for disk in &config.disks {
            fs::create_dir_all(disk.join(SYSTEM_DIR).join("tmp")).await?;
        }
        debug!(
            disks = config.disks.len(),
            data = config.data_shards,
            parity = config.parity_shards,
            block_size = config.block_size,
            "xl backend ready"
        );

        Ok(Self {
            disks: config.disks,
            codec,
            block_size: config.block_size,
        })
    }

    pub fn disks(&self) -> &[PathBuf] {
        &self.disks
    }

    pub fn codec(&self) -> &ErasureCodec {
        &self.codec
    }

    fn object_dir(&self, disk: &Path, bucket: &str, key: &str) -> Result<PathBuf> {
        if !is_valid_object_name(key) {
            return Err(Error::InvalidObjectName {
                bucket: bucket.to_string(),
                object: key.to_string(),
            });
        }
        Ok(disk.join(bucket).join(key))
    }

    async fn require_bucket(&self, bucket: &str) -> Result<()> {
        if self.bucket_exists(bucket).await? {
            Ok(())
        } else {
            Err(Error::BucketNotFound(bucket.to_string()))
        }
    }

    /// Read `xl.json` from every disk
    async fn read_all_meta(&self, bucket: &str, key: &str) -> Result<Vec<io::Result<XlMeta>>> {
        let dirs = self
            .disks
            .iter()
            .map(|disk| self.object_dir(disk, bucket, key).map(|dir| (disk, dir)))
            .collect::<Result<Vec<_>>>()?;

        let reads = dirs.into_iter().map(|(disk, dir)| async move {
            let raw = match fs::read(dir.join(META_FILE)).await {
                Ok(raw) => raw,
                // A vanished disk root is an offline disk, not a missing object
                Err(e) if is_missing(&e) && !disk_online(disk).await => {
                    return Err(io::Error::new(io::ErrorKind::NotConnected, "disk offline"));
                }
                Err(e) => return Err(e),
            };
            serde_json::from_slice::<XlMeta>(&raw)
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
        });
        Ok(join_all(reads).await)
    }

    /// Agreed metadata plus, per disk, whether that disk carries it
    async fn quorum_meta(&self, bucket: &str, key: &str) -> Result<(XlMeta, Vec<bool>)> {
        let results = self.read_all_meta(bucket, key).await?;
        let read_quorum = self.codec.read_quorum();

        // (first disk holding a variant, number of disks agreeing with it)
        let mut votes: Vec<(usize, usize)> = Vec::new();
        for (idx, result) in results.iter().enumerate() {
            let Ok(meta) = result else { continue };
            let existing = votes.iter_mut().find(|(first, _)| {
                matches!(&results[*first], Ok(m) if m.quorum_key() == meta.quorum_key())
            });
            match existing {
                Some(vote) => vote.1 += 1,
                None => votes.push((idx, 1)),
            }
        }

        if let Some(&(first, count)) = votes.iter().max_by_key(|(_, count)| *count) {
            if count >= read_quorum {
                if let Some(Ok(agreed)) = results.get(first) {
                    let agreed = agreed.clone();
                    let holders = results
                        .iter()
                        .map(|r| matches!(r, Ok(m) if m.quorum_key() == agreed.quorum_key()))
                        .collect();
                    return Ok((agreed, holders));
                }
            }
        }

        let missing = results
            .iter()
            .filter(|r| matches!(r, Err(e) if is_missing(e)))
            .count();
        if missing > self.disks.len() - read_quorum {
            self.require_bucket(bucket).await?;
            return Err(Error::object_not_found(bucket, key));
        }

        let available = votes.iter().map(|(_, count)| *count).max().unwrap_or(0);
        Err(Error::ReadQuorum {
            bucket: bucket.to_string(),
            object: key.to_string(),
            available,
            required: read_quorum,
        })
    }

    /// Write one disk's shard file and metadata into place
    async fn commit_disk(
        disk: &Path,
        object_dir: &Path,
        shard: &[u8],
        meta: &XlMeta,
    ) -> io::Result<()> {
        let staging = disk
            .join(SYSTEM_DIR)
            .join("tmp")
            .join(uuid::Uuid::new_v4().to_string());
        fs::create_dir_all(&staging).await?;

        let staged = async {
            fs::write(staging.join(PART_FILE), shard).await?;
            let raw = serde_json::to_vec_pretty(meta)
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
            fs::write(staging.join(META_FILE), raw).await?;

            fs::create_dir_all(object_dir).await?;
            fs::rename(staging.join(PART_FILE), object_dir.join(PART_FILE)).await?;
            fs::rename(staging.join(META_FILE), object_dir.join(META_FILE)).await
        }
        .await;

        let _ = fs::remove_dir_all(&staging).await;
        staged
    }

    async fn remove_disk_object(disk: &Path, bucket: &str, object_dir: &Path) -> io::Result<()> {
        fs::remove_file(object_dir.join(META_FILE)).await?;
        match fs::remove_file(object_dir.join(PART_FILE)).await {
            Err(e) if !is_missing(&e) => return Err(e),
            _ => {}
        }

        let bucket_dir = disk.join(bucket);
        let mut current = Some(object_dir);
        while let Some(dir) = current {
            if dir == bucket_dir || !dir.starts_with(&bucket_dir) {
                break;
            }
            if fs::remove_dir(dir).await.is_err() {
                break;
            }
            current = dir.parent();
        }
        Ok(())
    }
}

#[async_trait]
impl StorageBackend for XlBackend {
    #[instrument(skip(self))]
    async fn make_bucket(&self, bucket: &str) -> Result<()> {
        let results = join_all(self.disks.iter().map(|d| fs::create_dir(d.join(bucket)))).await;

        let created = results.iter().filter(|r| r.is_ok()).count();
        let existed = results
            .iter()
            .filter(|r| matches!(r, Err(e) if e.kind() == io::ErrorKind::AlreadyExists))
            .count();

        let write_quorum = self.codec.write_quorum();
        if existed >= write_quorum {
            return Err(Error::BucketExists(bucket.to_string()));
        }
        if created + existed < write_quorum {
            return Err(Error::WriteQuorum {
                available: created + existed,
                required: write_quorum,
            });
        }
        Ok(())
    }

    async fn bucket_exists(&self, bucket: &str) -> Result<bool> {
        let results = join_all(self.disks.iter().map(|d| fs::metadata(d.join(bucket)))).await;
        let present = results
            .iter()
            .filter(|r| matches!(r, Ok(meta) if meta.is_dir()))
            .count();
        Ok(present >= self.codec.read_quorum())
    }

    async fn list_buckets(&self) -> Result<Vec<String>> {
        let mut counts: BTreeMap<String, usize> = BTreeMap::new();
        for disk in &self.disks {
            let mut entries = match fs::read_dir(disk).await {
                Ok(entries) => entries,
                Err(e) => {
                    warn!(disk = %disk.display(), error = %e, "skipping unreadable disk");
                    continue;
                }
            };
            while let Some(entry) = entries.next_entry().await? {
                let name = entry.file_name().to_string_lossy().into_owned();
                if name.starts_with('.') || !entry.file_type().await?.is_dir() {
                    continue;
                }
                *counts.entry(name).or_default() += 1;
            }
        }
        let read_quorum = self.codec.read_quorum();
        Ok(counts
            .into_iter()
            .filter(|(_, n)| *n >= read_quorum)
            .map(|(name, _)| name)
            .collect())
    }

    #[instrument(skip(self, data), fields(size = data.len()))]
    async fn put_object(&self, bucket: &str, key: &str, data: Bytes) -> Result<ObjectDescriptor> {
        self.require_bucket(bucket).await?;

        let total = self.codec.total_shards();
        let mut shard_files: Vec<Vec<u8>> = vec![Vec::new(); total];
        for block in data.chunks(self.block_size) {
            let shards = self.codec.encode_block(block)?;
            for (file, shard) in shard_files.iter_mut().zip(shards) {
                file.extend_from_slice(&shard);
            }
        }

        let etag = uuid::Uuid::new_v4().simple().to_string();
        let mod_time = Utc::now();
        let metas: Vec<XlMeta> = (0..total)
            .map(|index| XlMeta {
                version: META_VERSION.to_string(),
                size: data.len() as i64,
                etag: etag.clone(),
                mod_time,
                erasure: ErasureInfo {
                    data_blocks: self.codec.data_shards(),
                    parity_blocks: self.codec.parity_shards(),
                    block_size: self.block_size,
                    index,
                },
            })
            .collect();

        let dirs = self
            .disks
            .iter()
            .map(|disk| self.object_dir(disk, bucket, key))
            .collect::<Result<Vec<_>>>()?;

        let writes = self
            .disks
            .iter()
            .zip(dirs.iter())
            .zip(shard_files.iter().zip(metas.iter()))
            .map(|((disk, dir), (shard, meta))| Self::commit_disk(disk, dir, shard, meta));
        let results = join_all(writes).await;

        let written = results.iter().filter(|r| r.is_ok()).count();
        for (disk, result) in self.disks.iter().zip(&results) {
            if let Err(e) = result {
                warn!(disk = %disk.display(), error = %e, "shard write failed");
            }
        }

        let write_quorum = self.codec.write_quorum();
        if written < write_quorum {
            return Err(Error::WriteQuorum {
                available: written,
                required: write_quorum,
            });
        }

        Ok(metas[0].descriptor(bucket, key))
    }

    #[instrument(skip(self))]
    async fn delete_object(&self, bucket: &str, key: &str) -> Result<()> {
        let dirs = self
            .disks
            .iter()
            .map(|disk| self.object_dir(disk, bucket, key))
            .collect::<Result<Vec<_>>>()?;

        let removals = self
            .disks
            .iter()
            .zip(dirs.iter())
            .map(|(disk, dir)| Self::remove_disk_object(disk, bucket, dir));
        let results = join_all(removals).await;

        let removed = results.iter().filter(|r| r.is_ok()).count();
        if removed == 0 {
            self.require_bucket(bucket).await?;
            return Err(Error::object_not_found(bucket, key));
        }
        Ok(())
    }

    async fn stat(&self, bucket: &str, key: &str) -> Result<ObjectDescriptor> {
        let (meta, _) = self.quorum_meta(bucket, key).await?;
        Ok(meta.descriptor(bucket, key))
    }

    #[instrument(skip(self))]
    async fn open_range(&self, bucket: &str, key: &str, range: ByteRange) -> Result<ByteStream> {
        let (meta, holders) = self.quorum_meta(bucket, key).await?;
        if range.end() > meta.size {
            return Err(Error::Io(short_read(
                range.length(),
                (meta.size - range.start()).max(0),
            )));
        }

        // The object may have been written with a different layout
        let codec = if meta.erasure.data_blocks == self.codec.data_shards()
            && meta.erasure.parity_blocks == self.codec.parity_shards()
        {
            self.codec.clone()
        } else {
            ErasureCodec::new(meta.erasure.data_blocks, meta.erasure.parity_blocks)?
        };

        let parts = self
            .disks
            .iter()
            .zip(holders)
            .map(|(disk, holds)| {
                self.object_dir(disk, bucket, key)
                    .map(|dir| holds.then(|| dir.join(PART_FILE)))
            })
            .collect::<Result<Vec<_>>>()?;

        let reader = BlockReader {
            codec,
            parts,
            files: Vec::new(),
            block_size: meta.erasure.block_size as i64,
            size: meta.size,
            pos: range.start(),
            end: range.end(),
        };

        let chunks = stream::try_unfold(reader, |mut reader| async move {
            let next = reader.next_chunk().await?;
            Ok::<_, io::Error>(next.map(|chunk| (chunk, reader)))
        });
        Ok(Box::pin(chunks))
    }

    fn kind(&self) -> BackendKind {
        BackendKind::Xl
    }
}

/// Sequential block decoder behind an XL range stream
struct BlockReader {
    codec: ErasureCodec,
    /// Part file per disk, `None` for disks without agreed metadata
    parts: Vec<Option<PathBuf>>,
    /// Opened lazily; a disk drops to `None` after its first read error
    files: Vec<Option<fs::File>>,
    block_size: i64,
    size: i64,
    pos: i64,
    end: i64,
}

impl BlockReader {
    async fn open_parts(&mut self) {
        let opens = self.parts.iter().map(|part| async move {
            match part {
                Some(path) => fs::File::open(path).await.ok(),
                None => None,
            }
        });
        self.files = join_all(opens).await;
    }

    /// Next decoded slice of the requested range
    async fn next_chunk(&mut self) -> io::Result<Option<Bytes>> {
        if self.pos >= self.end {
            return Ok(None);
        }
        if self.files.is_empty() {
            self.open_parts().await;
        }

        let block = self.pos / self.block_size;
        let block_start = block * self.block_size;
        let block_len = self.block_size.min(self.size - block_start) as usize;
        let shard_len = self.codec.shard_size(block_len);
        let shard_offset = block as u64 * self.codec.shard_size(self.block_size as usize) as u64;

        let data_shards = self.codec.data_shards();
        let mut shards: Vec<Option<Vec<u8>>> = vec![None; self.codec.total_shards()];

        // Data shards first, parity only to cover what is missing
        self.read_shards(0..data_shards, shard_offset, shard_len, &mut shards)
            .await;
        let missing = shards[..data_shards].iter().filter(|s| s.is_none()).count();
        if missing > 0 {
            let parity = data_shards..self.codec.total_shards();
            self.read_shards(parity, shard_offset, shard_len, &mut shards)
                .await;
        }

        let decoded = self
            .codec
            .decode_block(block as u64, &mut shards, block_len)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;

        let lo = (self.pos - block_start) as usize;
        let hi = (self.end.min(block_start + block_len as i64) - block_start) as usize;
        self.pos = block_start + hi as i64;

        Ok(Some(Bytes::from(decoded).slice(lo..hi)))
    }

    async fn read_shards(
        &mut self,
        indices: std::ops::Range<usize>,
        offset: u64,
        len: usize,
        shards: &mut [Option<Vec<u8>>],
    ) {
        let reads = self.files[indices.clone()]
            .iter_mut()
            .map(|file| async move {
                let file = file.as_mut()?;
                let mut buf = vec![0u8; len];
                file.seek(SeekFrom::Start(offset)).await.ok()?;
                file.read_exact(&mut buf).await.ok()?;
                Some(buf)
            });
        let results = join_all(reads).await;

        for (idx, shard) in indices.zip(results) {
            if shard.is_none() && self.files[idx].is_some() {
                debug!(disk = idx, offset, "shard read failed, disk excluded");
                self.files[idx] = None;
            }
            shards[idx] = shard;
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::range::resolve;
    use assert_matches::assert_matches;
    use futures::TryStreamExt;
    use tempfile::TempDir;

    async fn xl(disks: usize, block_size: usize) -> (TempDir, XlBackend) {
        let dir = TempDir::new().unwrap();
        let roots = (0..disks).map(|i| dir.path().join(format!("disk{}", i))).collect();
        let backend = XlBackend::new(XlConfig::new(roots).with_block_size(block_size))
            .await
            .unwrap();
        (dir, backend)
    }

    async fn read(backend: &XlBackend, key: &str, range: ByteRange) -> Result<Vec<u8>> {
        let stream = backend.open_range("bucket", key, range).await?;
        let out = stream
            .try_fold(Vec::new(), |mut acc, chunk| async move {
                acc.extend_from_slice(&chunk);
                Ok(acc)
            })
            .await?;
        Ok(out)
    }

    fn payload(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i * 31 % 256) as u8).collect()
    }

    #[test]
    fn test_config_validation() {
        let disks = |n: usize| (0..n).map(|i| PathBuf::from(format!("/d{}", i))).collect();
        assert!(XlConfig::new(disks(4)).validate().is_ok());
        assert!(XlConfig::new(disks(16)).validate().is_ok());
        let five = XlConfig::new(disks(5));
        assert_eq!((five.data_shards, five.parity_shards), (3, 2));
        assert!(five.validate().is_ok());
        assert_matches!(XlConfig::new(disks(2)).validate(), Err(Error::Config(_)));
        assert_matches!(XlConfig::new(disks(18)).validate(), Err(Error::Config(_)));

        let mut odd = XlConfig::new(disks(6));
        odd.parity_shards = 2;
        assert_matches!(odd.validate(), Err(Error::InvalidEcConfig(_)));
    }

    #[tokio::test]
    async fn test_xl_roundtrip_across_blocks() {
        let (_dir, backend) = xl(4, 1000).await;
        backend.make_bucket("bucket").await.unwrap();
        let data = payload(4321);
        let desc = backend
            .put_object("bucket", "obj", Bytes::from(data.clone()))
            .await
            .unwrap();
        assert_eq!(desc.size, 4321);
        assert_eq!(backend.stat("bucket", "obj").await.unwrap(), desc);

        let full = read(&backend, "obj", ByteRange::full(4321).unwrap()).await.unwrap();
        assert_eq!(full, data);

        let range = resolve(999, 2002, 4321).unwrap();
        let slice = read(&backend, "obj", range).await.unwrap();
        assert_eq!(slice, &data[999..3001]);
    }

    #[tokio::test]
    async fn test_xl_empty_object() {
        let (_dir, backend) = xl(4, 1000).await;
        backend.make_bucket("bucket").await.unwrap();
        backend
            .put_object("bucket", "empty", Bytes::new())
            .await
            .unwrap();
        let out = read(&backend, "empty", ByteRange::full(0).unwrap()).await.unwrap();
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn test_xl_degraded_read() {
        let (dir, backend) = xl(4, 512).await;
        backend.make_bucket("bucket").await.unwrap();
        let data = payload(3000);
        backend
            .put_object("bucket", "obj", Bytes::from(data.clone()))
            .await
            .unwrap();

        // Lose both shards of one data disk and one parity disk
        std::fs::remove_dir_all(dir.path().join("disk0")).unwrap();
        std::fs::remove_file(dir.path().join("disk3/bucket/obj").join(PART_FILE)).unwrap();

        let out = read(&backend, "obj", ByteRange::full(3000).unwrap()).await.unwrap();
        assert_eq!(out, data);
    }

    #[tokio::test]
    async fn test_xl_too_many_lost_shards() {
        let (dir, backend) = xl(4, 512).await;
        backend.make_bucket("bucket").await.unwrap();
        backend
            .put_object("bucket", "obj", Bytes::from(payload(2000)))
            .await
            .unwrap();

        for disk in ["disk0", "disk1", "disk2"] {
            std::fs::remove_file(dir.path().join(disk).join("bucket/obj").join(PART_FILE)).unwrap();
        }
        assert!(read(&backend, "obj", ByteRange::full(2000).unwrap()).await.is_err());
    }

    #[tokio::test]
    async fn test_xl_metadata_quorum() {
        let (dir, backend) = xl(4, 512).await;
        backend.make_bucket("bucket").await.unwrap();
        backend
            .put_object("bucket", "obj", Bytes::from(payload(100)))
            .await
            .unwrap();

        for disk in ["disk0", "disk1", "disk2"] {
            std::fs::write(dir.path().join(disk).join("bucket/obj").join(META_FILE), b"{").unwrap();
        }
        assert_matches!(
            backend.stat("bucket", "obj").await,
            Err(Error::ReadQuorum { required: 2, .. })
        );
    }

    #[tokio::test]
    async fn test_xl_offline_disks_are_not_missing_objects() {
        let (dir, backend) = xl(4, 512).await;
        backend.make_bucket("bucket").await.unwrap();
        backend
            .put_object("bucket", "obj", Bytes::from(payload(100)))
            .await
            .unwrap();

        for disk in ["disk1", "disk2", "disk3"] {
            std::fs::remove_dir_all(dir.path().join(disk)).unwrap();
        }
        assert_matches!(
            backend.stat("bucket", "obj").await,
            Err(Error::ReadQuorum { available: 1, .. })
        );
    }

    #[tokio::test]
    async fn test_xl_not_found_and_delete() {
        let (_dir, backend) = xl(4, 512).await;
        assert_matches!(
            backend.stat("bucket", "obj").await,
            Err(Error::BucketNotFound(_))
        );
        backend.make_bucket("bucket").await.unwrap();
        assert_matches!(
            backend.stat("bucket", "obj").await,
            Err(Error::ObjectNotFound { .. })
        );

        backend
            .put_object("bucket", "dir/obj", Bytes::from_static(b"hello"))
            .await
            .unwrap();
        backend.delete_object("bucket", "dir/obj").await.unwrap();
        assert_matches!(
            backend.stat("bucket", "dir/obj").await,
            Err(Error::ObjectNotFound { .. })
        );
        assert_eq!(backend.list_buckets().await.unwrap(), vec!["bucket"]);
    }

    #[tokio::test]
    async fn test_xl_key_below_an_object_is_not_found() {
        let (_dir, backend) = xl(4, 512).await;
        backend.make_bucket("bucket").await.unwrap();
        backend
            .put_object("bucket", "a", Bytes::from_static(b"object"))
            .await
            .unwrap();

        for key in ["a/part.1", "a/xl.json/b"] {
            assert_matches!(
                backend.stat("bucket", key).await,
                Err(Error::ObjectNotFound { .. }),
                "{}",
                key
            );
        }
        assert_matches!(
            backend.delete_object("bucket", "a/part.1").await,
            Err(Error::ObjectNotFound { .. })
        );
    }

    #[tokio::test]
    async fn test_xl_make_bucket_twice() {
        let (_dir, backend) = xl(4, 512).await;
        backend.make_bucket("bucket").await.unwrap();
        assert_matches!(
            backend.make_bucket("bucket").await,
            Err(Error::BucketExists(_))
        );
    }
}
