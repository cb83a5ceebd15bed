//! Property-Based Tests for the Block Codec
//!
//! 1. **Roundtrip**: decode(encode(block)) = block
//! 2. **Fault Tolerance**: any pattern of up to m lost shards is recoverable

#![cfg(test)]

use proptest::prelude::*;

use super::codec::{shard_size, ErasureCodec};

/// Disk-set shaped layouts: 2..=8 disks split evenly
fn layout_strategy() -> impl Strategy<Value = (usize, usize)> {
    (1usize..=4).prop_map(|half| (half, half))
}

fn block_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 1..4096)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_block_roundtrip((k, m) in layout_strategy(), block in block_strategy()) {
        let codec = ErasureCodec::new(k, m)?;
        let shards = codec.encode_block(&block)?;
        prop_assert_eq!(shards.len(), k + m);

        let mut shards: Vec<Option<Vec<u8>>> = shards.into_iter().map(Some).collect();
        let out = codec.decode_block(0, &mut shards, block.len())?;
        prop_assert_eq!(out, block);
    }

    #[test]
    fn prop_any_loss_within_parity(
        (k, m) in layout_strategy(),
        block in block_strategy(),
        lost in prop::collection::vec(0usize..8, 0..=4),
    ) {
        let codec = ErasureCodec::new(k, m)?;
        let mut lost: Vec<usize> = lost.into_iter().filter(|&i| i < k + m).collect();
        lost.sort();
        lost.dedup();
        lost.truncate(m);

        let mut shards: Vec<Option<Vec<u8>>> =
            codec.encode_block(&block)?.into_iter().map(Some).collect();
        for &i in &lost {
            shards[i] = None;
        }

        let out = codec.decode_block(1, &mut shards, block.len())?;
        prop_assert_eq!(out, block, "lost shards {:?} with k={} m={}", lost, k, m);
    }

    #[test]
    fn prop_shard_size_covers_block(k in 1usize..=8, len in 1usize..100_000) {
        let size = shard_size(len, k);
        prop_assert!(size * k >= len);
        prop_assert!(size * k < len + k);
    }
}
