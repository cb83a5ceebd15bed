//! Cache Metrics Collection
//!
//! Counters for monitoring object cache health.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Cache metrics collector
#[derive(Debug, Default)]
pub struct CacheMetrics {
    hits: AtomicU64,
    misses: AtomicU64,
    /// Readers that parked on an in-flight fill
    waits: AtomicU64,
    fills_started: AtomicU64,
    fills_completed: AtomicU64,
    fills_purged: AtomicU64,
    evictions: AtomicU64,
    invalidations: AtomicU64,
    /// Bytes served from ready entries
    bytes_served: AtomicU64,
}

impl CacheMetrics {
    /// Create a new metrics collector
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_bytes_served(&self, bytes: u64) {
        self.bytes_served.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_wait(&self) {
        self.waits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_fill_started(&self) {
        self.fills_started.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_fill_completed(&self) {
        self.fills_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_fill_purged(&self) {
        self.fills_purged.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_eviction(&self) {
        self.evictions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_invalidation(&self) {
        self.invalidations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    pub fn hit_ratio(&self) -> f64 {
        let hits = self.hits() as f64;
        let total = hits + self.misses() as f64;
        if total == 0.0 {
            0.0
        } else {
            hits / total
        }
    }

    /// Export a point-in-time snapshot
    pub fn snapshot(
        &self,
        entries: usize,
        size_bytes: u64,
        reserved_bytes: u64,
        capacity: u64,
    ) -> CacheStats {
        CacheStats {
            hits: self.hits(),
            misses: self.misses(),
            waits: self.waits.load(Ordering::Relaxed),
            fills_started: self.fills_started.load(Ordering::Relaxed),
            fills_completed: self.fills_completed.load(Ordering::Relaxed),
            fills_purged: self.fills_purged.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            invalidations: self.invalidations.load(Ordering::Relaxed),
            bytes_served: self.bytes_served.load(Ordering::Relaxed),
            hit_ratio: self.hit_ratio(),
            entries,
            size_bytes,
            reserved_bytes,
            capacity,
        }
    }
}

/// Exported cache statistics
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub waits: u64,
    pub fills_started: u64,
    pub fills_completed: u64,
    pub fills_purged: u64,
    pub evictions: u64,
    pub invalidations: u64,
    pub bytes_served: u64,
    pub hit_ratio: f64,
    /// Ready entries currently held
    pub entries: usize,
    /// Bytes held by ready entries
    pub size_bytes: u64,
    /// Bytes promised to in-flight fills
    pub reserved_bytes: u64,
    pub capacity: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hit_ratio() {
        let metrics = CacheMetrics::new();
        assert_eq!(metrics.hit_ratio(), 0.0);

        metrics.record_hit();
        metrics.record_hit();
        metrics.record_hit();
        metrics.record_miss();

        assert!((metrics.hit_ratio() - 0.75).abs() < 0.001);
    }

    #[test]
    fn test_snapshot() {
        let metrics = CacheMetrics::new();
        metrics.record_fill_started();
        metrics.record_fill_purged();
        metrics.record_hit();
        metrics.record_bytes_served(42);

        let stats = metrics.snapshot(3, 100, 20, 1000);
        assert_eq!(stats.fills_started, 1);
        assert_eq!(stats.fills_purged, 1);
        assert_eq!(stats.bytes_served, 42);
        assert_eq!(stats.entries, 3);
        assert_eq!(stats.reserved_bytes, 20);
        assert_eq!(stats.capacity, 1000);
    }
}
