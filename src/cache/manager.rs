//! Object Cache - Bounded Read-Through Cache
//!
//! Holds whole objects in RAM under a byte budget with LRU eviction. A miss
//! on a cacheable object installs a `Filling` slot and hands the caller a
//! [`FillGuard`]; everyone else arriving for the same key parks on the
//! slot's watch channel until the fill commits or is purged. At most one
//! backend read per key is in flight through the cache at any time.

use std::future::Future;
use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::BytesMut;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::watch;
use tracing::{debug, trace, warn};

use super::entry::{CacheEntry, CacheKey, EntryState, FillState, ObjectVersion};
use super::metrics::{CacheMetrics, CacheStats};
use crate::error::{Error, Result};
use crate::range::ByteRange;
use crate::storage::{short_read, ByteStream};

/// Default cache capacity (256MB)
pub const DEFAULT_CACHE_CAPACITY: u64 = 256 * 1024 * 1024;

/// Default limit on a single stalled sink write during a fill (30s)
pub const DEFAULT_FILL_WRITE_TIMEOUT_MS: u64 = 30_000;

/// Cache configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Byte budget for ready entries
    pub capacity: u64,
    /// Objects larger than this are never cached
    pub max_object_size: u64,
    /// A filling reader whose sink accepts nothing for this long is purged
    pub fill_write_timeout_ms: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CACHE_CAPACITY)
    }
}

impl CacheConfig {
    /// Config with `max_object_size` at half the capacity
    pub fn with_capacity(capacity: u64) -> Self {
        Self {
            capacity,
            max_object_size: capacity / 2,
            fill_write_timeout_ms: DEFAULT_FILL_WRITE_TIMEOUT_MS,
        }
    }

    pub fn with_fill_write_timeout(mut self, timeout: Duration) -> Self {
        self.fill_write_timeout_ms = timeout.as_millis().min(u64::MAX as u128) as u64;
        self
    }

    pub fn fill_write_timeout(&self) -> Duration {
        Duration::from_millis(self.fill_write_timeout_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.capacity == 0 {
            return Err(Error::Config("cache capacity must be greater than 0".into()));
        }
        if self.max_object_size > self.capacity {
            return Err(Error::Config(format!(
                "cache max_object_size {} exceeds capacity {}",
                self.max_object_size, self.capacity
            )));
        }
        if self.fill_write_timeout_ms == 0 {
            return Err(Error::Config(
                "cache fill_write_timeout_ms must be greater than 0".into(),
            ));
        }
        Ok(())
    }
}

/// Whether a lookup may start a fill on absence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FillMode {
    /// Full-object read: install a fill when the object fits
    Populate,
    /// Partial read: use a ready entry, never start a fill
    ReadOnly,
}

/// Outcome of [`ObjectCache::lookup`]
pub enum CacheLookup<'a> {
    /// A ready entry of the requested version
    Hit(Arc<CacheEntry>),
    /// The caller owns a new fill and must drive it
    Fill(FillGuard<'a>),
    /// Nothing usable; read the backend directly
    Miss,
}

impl std::fmt::Debug for CacheLookup<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CacheLookup::Hit(entry) => f.debug_tuple("Hit").field(entry).finish(),
            CacheLookup::Fill(guard) => f.debug_tuple("Fill").field(guard.key()).finish(),
            CacheLookup::Miss => f.write_str("Miss"),
        }
    }
}

enum Slot {
    Filling {
        id: u64,
        state: watch::Receiver<FillState>,
    },
    Ready(Arc<CacheEntry>),
}

enum Step<'a> {
    Done(CacheLookup<'a>),
    Wait(watch::Receiver<FillState>),
    /// A fill would overrun the budget; evict and retry once
    NeedRoom,
}

/// Bounded read-through object cache
pub struct ObjectCache {
    config: CacheConfig,
    slots: DashMap<CacheKey, Slot>,
    /// Bytes held by ready entries
    used: AtomicU64,
    /// Bytes promised to in-flight fills
    reserved: AtomicU64,
    /// Logical clock for LRU ordering
    clock: AtomicU64,
    next_fill_id: AtomicU64,
    metrics: CacheMetrics,
}

impl ObjectCache {
    /// Create a new cache
    pub fn new(config: CacheConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            slots: DashMap::new(),
            used: AtomicU64::new(0),
            reserved: AtomicU64::new(0),
            clock: AtomicU64::new(0),
            next_fill_id: AtomicU64::new(1),
            metrics: CacheMetrics::new(),
        })
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Look up `key` at `version`, waiting out any in-flight fill.
    ///
    /// `size` is the authoritative object size from the backend and decides
    /// whether a fill may start. A fill that does not fit next to the ready
    /// entries and the other in-flight fills first evicts ready entries; if
    /// it still does not fit the lookup is a `Miss`.
    pub async fn lookup(
        &self,
        key: &CacheKey,
        version: &ObjectVersion,
        size: u64,
        mode: FillMode,
    ) -> CacheLookup<'_> {
        let mut evicted = false;
        loop {
            match self.try_lookup(key, version, size, mode, evicted) {
                Step::Done(result) => return result,
                Step::Wait(mut state) => {
                    self.metrics.record_wait();
                    trace!(%key, "Waiting on in-flight fill");
                    // Err means the filler went away; its slot is already gone
                    let _ = state.wait_for(FillState::is_settled).await;
                }
                Step::NeedRoom => {
                    self.evict_for(size);
                    evicted = true;
                }
            }
        }
    }

    fn try_lookup(
        &self,
        key: &CacheKey,
        version: &ObjectVersion,
        size: u64,
        mode: FillMode,
        evicted: bool,
    ) -> Step<'_> {
        let fillable = mode == FillMode::Populate && size <= self.config.max_object_size;

        match self.slots.entry(key.clone()) {
            Entry::Occupied(mut occupied) => {
                let stale_size = match occupied.get() {
                    Slot::Filling { state, .. } => return Step::Wait(state.clone()),
                    Slot::Ready(entry) if entry.version().etag() == version.etag() => {
                        entry.touch(self.tick());
                        self.metrics.record_hit();
                        return Step::Done(CacheLookup::Hit(entry.clone()));
                    }
                    Slot::Ready(entry) if !version.supersedes(entry.version()) => {
                        // The caller's stat predates what is cached
                        trace!(%key, "Cached entry is newer than the request");
                        self.metrics.record_miss();
                        return Step::Done(CacheLookup::Miss);
                    }
                    Slot::Ready(entry) => entry.size(),
                };

                debug!(%key, "Dropping stale cache entry");
                self.used.fetch_sub(stale_size, Ordering::Relaxed);
                self.metrics.record_invalidation();

                if !fillable {
                    occupied.remove();
                    self.metrics.record_miss();
                    return Step::Done(CacheLookup::Miss);
                }
                match self.begin_fill(key, version, size) {
                    Some((guard, slot)) => {
                        occupied.insert(slot);
                        Step::Done(CacheLookup::Fill(guard))
                    }
                    None => {
                        occupied.remove();
                        self.no_room(evicted)
                    }
                }
            }
            Entry::Vacant(vacant) => {
                if !fillable {
                    self.metrics.record_miss();
                    return Step::Done(CacheLookup::Miss);
                }
                match self.begin_fill(key, version, size) {
                    Some((guard, slot)) => {
                        vacant.insert(slot);
                        Step::Done(CacheLookup::Fill(guard))
                    }
                    None => self.no_room(evicted),
                }
            }
        }
    }

    fn no_room(&self, evicted: bool) -> Step<'_> {
        if evicted {
            self.metrics.record_miss();
            Step::Done(CacheLookup::Miss)
        } else {
            Step::NeedRoom
        }
    }

    /// Reserve `size` bytes and hand out a guard, or `None` when over budget
    fn begin_fill(
        &self,
        key: &CacheKey,
        version: &ObjectVersion,
        size: u64,
    ) -> Option<(FillGuard<'_>, Slot)> {
        if !self.try_reserve(size) {
            trace!(%key, size, reserved = self.reserved(), "No room for cache fill");
            return None;
        }

        let id = self.next_fill_id.fetch_add(1, Ordering::Relaxed);
        let (notify, state) = watch::channel(FillState::Filling);

        self.metrics.record_miss();
        self.metrics.record_fill_started();
        debug!(%key, size, "Starting cache fill");

        let guard = FillGuard {
            cache: self,
            key: key.clone(),
            version: version.clone(),
            id,
            expected: size,
            buffer: BytesMut::with_capacity(size as usize),
            notify,
            settled: false,
        };
        Some((guard, Slot::Filling { id, state }))
    }

    fn try_reserve(&self, size: u64) -> bool {
        let used = self.size();
        let capacity = self.config.capacity;
        self.reserved
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |reserved| {
                let total = used.checked_add(reserved)?.checked_add(size)?;
                (total <= capacity).then_some(reserved + size)
            })
            .is_ok()
    }

    fn release(&self, size: u64) {
        self.reserved.fetch_sub(size, Ordering::AcqRel);
    }

    /// Write `range` of a ready entry to `sink`
    pub async fn serve<W>(&self, entry: &CacheEntry, range: ByteRange, sink: &mut W) -> Result<u64>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        if range.end() as u64 > entry.size() {
            return Err(Error::Internal(format!(
                "range ending at {} outside cached entry {} of {} bytes",
                range.end(),
                entry.key(),
                entry.size()
            )));
        }

        let view = entry.slice(range);
        sink.write_all(&view).await?;
        sink.flush().await?;
        self.metrics.record_bytes_served(view.len() as u64);
        Ok(view.len() as u64)
    }

    /// Ready entry for `key` regardless of version, without touching LRU state
    pub fn peek(&self, key: &CacheKey) -> Option<Arc<CacheEntry>> {
        match self.slots.get(key).as_deref() {
            Some(Slot::Ready(entry)) => Some(entry.clone()),
            _ => None,
        }
    }

    /// Current slot kind for `key`
    pub fn state(&self, key: &CacheKey) -> Option<EntryState> {
        self.slots.get(key).map(|slot| match *slot {
            Slot::Filling { .. } => EntryState::Filling,
            Slot::Ready(_) => EntryState::Ready,
        })
    }

    /// Drop whatever is cached for `key`.
    ///
    /// An in-flight fill keeps streaming to its own caller but will not be
    /// admitted.
    pub fn invalidate(&self, key: &CacheKey) {
        if let Some((_, slot)) = self.slots.remove(key) {
            if let Slot::Ready(entry) = slot {
                self.used.fetch_sub(entry.size(), Ordering::Relaxed);
            }
            self.metrics.record_invalidation();
            debug!(%key, "Invalidated cache entry");
        }
    }

    /// Drop all ready entries
    pub fn clear(&self) {
        self.slots.retain(|_, slot| match slot {
            Slot::Ready(entry) => {
                self.used.fetch_sub(entry.size(), Ordering::Relaxed);
                false
            }
            Slot::Filling { .. } => true,
        });
    }

    /// Bytes held by ready entries
    pub fn size(&self) -> u64 {
        self.used.load(Ordering::Relaxed)
    }

    /// Bytes reserved by in-flight fills
    pub fn reserved(&self) -> u64 {
        self.reserved.load(Ordering::Acquire)
    }

    pub fn capacity(&self) -> u64 {
        self.config.capacity
    }

    /// Number of ready entries
    pub fn len(&self) -> usize {
        self.slots
            .iter()
            .filter(|slot| matches!(slot.value(), Slot::Ready(_)))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        self.metrics
            .snapshot(self.len(), self.size(), self.reserved(), self.config.capacity)
    }

    #[inline]
    fn tick(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Swap our `Filling` slot for the ready entry, if it is still ours,
    /// and give back the fill's reservation
    fn complete_fill(
        &self,
        key: &CacheKey,
        id: u64,
        entry: &Arc<CacheEntry>,
        reservation: u64,
    ) -> bool {
        let admitted = match self.slots.get_mut(key) {
            Some(mut slot) if matches!(*slot, Slot::Filling { id: current, .. } if current == id) => {
                *slot = Slot::Ready(entry.clone());
                self.used.fetch_add(entry.size(), Ordering::Relaxed);
                true
            }
            _ => false,
        };
        self.release(reservation);

        if admitted {
            self.evict_for(0);
        }
        admitted
    }

    /// Remove our `Filling` slot, if it is still ours
    fn purge_fill(&self, key: &CacheKey, id: u64) {
        self.slots.remove_if(key, |_, slot| {
            matches!(slot, Slot::Filling { id: current, .. } if *current == id)
        });
    }

    fn over_budget(&self, incoming: u64) -> bool {
        self.size() + self.reserved() + incoming > self.config.capacity
    }

    /// Evict least recently used ready entries until `incoming` more bytes
    /// fit. In-flight fills are never candidates.
    fn evict_for(&self, incoming: u64) {
        if !self.over_budget(incoming) {
            return;
        }

        let mut candidates: Vec<(u64, Arc<CacheEntry>)> = self
            .slots
            .iter()
            .filter_map(|slot| match slot.value() {
                Slot::Ready(entry) => Some((entry.last_access(), entry.clone())),
                Slot::Filling { .. } => None,
            })
            .collect();

        // Oldest access first
        candidates.sort_by_key(|(last_access, _)| *last_access);

        for (_, entry) in candidates {
            if !self.over_budget(incoming) {
                break;
            }

            let removed = self.slots.remove_if(entry.key(), |_, slot| {
                matches!(slot, Slot::Ready(current) if Arc::ptr_eq(current, &entry))
            });
            if removed.is_some() {
                self.used.fetch_sub(entry.size(), Ordering::Relaxed);
                self.metrics.record_eviction();
                debug!(key = %entry.key(), size = entry.size(), "Evicted cache entry");
            }
        }
    }
}

/// Exclusive right to fill one cache slot.
///
/// Dropping the guard without a successful [`FillGuard::drive`] removes the
/// slot and wakes every waiter, so an abandoned or failed fill never leaves
/// a partial entry behind.
pub struct FillGuard<'a> {
    cache: &'a ObjectCache,
    key: CacheKey,
    version: ObjectVersion,
    id: u64,
    expected: u64,
    buffer: BytesMut,
    notify: watch::Sender<FillState>,
    settled: bool,
}

impl FillGuard<'_> {
    pub fn key(&self) -> &CacheKey {
        &self.key
    }

    pub fn expected_size(&self) -> u64 {
        self.expected
    }

    /// Stream the whole object into `sink` while buffering it for the cache.
    ///
    /// Commits only when exactly the expected number of bytes arrived and
    /// every write succeeded. A sink write that makes no progress within the
    /// configured fill write timeout fails with `TimedOut`, releasing the
    /// slot to waiting readers.
    pub async fn drive<W>(mut self, mut stream: ByteStream, sink: &mut W) -> Result<u64>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        let limit = self.cache.config.fill_write_timeout();
        let mut written: u64 = 0;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            written += chunk.len() as u64;
            if written > self.expected {
                return Err(Error::Io(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("stream exceeded expected {} bytes", self.expected),
                )));
            }

            self.buffer.extend_from_slice(&chunk);
            write_within(limit, sink.write_all(&chunk)).await?;
        }
        write_within(limit, sink.flush()).await?;

        if written != self.expected {
            return Err(Error::Io(short_read(self.expected as i64, written as i64)));
        }

        self.commit();
        Ok(written)
    }

    fn commit(&mut self) {
        self.settled = true;

        let data = std::mem::take(&mut self.buffer).freeze();
        let entry = Arc::new(CacheEntry::new(
            self.key.clone(),
            self.version.clone(),
            data,
            self.cache.tick(),
        ));

        if self
            .cache
            .complete_fill(&self.key, self.id, &entry, self.expected)
        {
            self.cache.metrics.record_fill_completed();
            debug!(key = %self.key, size = entry.size(), "Cache fill committed");
            self.notify.send_replace(FillState::Ready(entry));
        } else {
            debug!(key = %self.key, "Cache fill superseded, not admitted");
            self.notify.send_replace(FillState::Invalid);
        }
    }
}

async fn write_within<F>(limit: Duration, write: F) -> io::Result<()>
where
    F: Future<Output = io::Result<()>>,
{
    tokio::time::timeout(limit, write).await.map_err(|_| {
        io::Error::new(
            io::ErrorKind::TimedOut,
            format!("sink accepted nothing for {:?}", limit),
        )
    })?
}

impl Drop for FillGuard<'_> {
    fn drop(&mut self) {
        if self.settled {
            return;
        }

        self.cache.purge_fill(&self.key, self.id);
        self.cache.release(self.expected);
        self.cache.metrics.record_fill_purged();
        warn!(
            key = %self.key,
            buffered = self.buffer.len(),
            expected = self.expected,
            "Cache fill abandoned, slot purged"
        );
        self.notify.send_replace(FillState::Invalid);
    }
}

// =============================================================================
// Tests
// =============================================================================
