//! Erasure Coding
//!
//! Reed-Solomon block codec used by the multi-disk XL backend. Each object
//! block is encoded into `k` data shards and `m` parity shards; any `k`
//! surviving shards reconstruct the block.
//!
//! ```text
//!   block ──encode──▶ [d0 d1 .. dk-1 | p0 .. pm-1] ──▶ one shard per disk
//!   shards (≥ k) ──decode──▶ block
//! ```

pub mod codec;

#[cfg(test)]
mod proptest;

pub use codec::{shard_size, ErasureCodec};
