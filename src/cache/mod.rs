//! Object Cache
//!
//! In-memory read-through cache sitting between the object layer and the
//! storage backends.
//!
//! # Slot lifecycle
//!
//! ```text
//! (absent) --lookup/Populate--> Filling --commit--> Ready
//!                                  |                  |
//!                        error/drop/short        evict/invalidate
//!                                  v                  v
//!                               Invalid ------> (absent)
//! ```
//!
//! Readers never observe a partially filled entry: bytes of an in-flight
//! fill are private to the [`FillGuard`] until commit. A fill reserves its
//! full size against the byte budget when it starts, so ready entries plus
//! in-flight fills never exceed the capacity.

pub mod entry;
pub mod manager;
pub mod metrics;

pub use entry::{CacheEntry, CacheKey, EntryState, FillState, ObjectVersion};
pub use manager::{
    CacheConfig, CacheLookup, FillGuard, FillMode, ObjectCache, DEFAULT_CACHE_CAPACITY,
    DEFAULT_FILL_WRITE_TIMEOUT_MS,
};
pub use metrics::{CacheMetrics, CacheStats};
