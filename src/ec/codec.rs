//! Block Erasure Codec
//!
//! Reed-Solomon encoding of one object block into `data + parity` shards
//! and decoding back from any `data` survivors, via `reed-solomon-erasure`.

use std::sync::Arc;

use reed_solomon_erasure::galois_8::ReedSolomon;
use tracing::{debug, instrument};

use crate::error::{Error, Result};

/// Reed-Solomon codec for fixed-layout object blocks
#[derive(Clone)]
pub struct ErasureCodec {
    /// Reed-Solomon codec instance
    rs: Arc<ReedSolomon>,
    /// Number of data shards (k)
    data_shards: usize,
    /// Number of parity shards (m)
    parity_shards: usize,
}

impl std::fmt::Debug for ErasureCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ErasureCodec")
            .field("data_shards", &self.data_shards)
            .field("parity_shards", &self.parity_shards)
            .finish()
    }
}

impl ErasureCodec {
    /// Create a codec with the given k+m layout
    pub fn new(data_shards: usize, parity_shards: usize) -> Result<Self> {
        if data_shards == 0 {
            return Err(Error::InvalidEcConfig(
                "data_shards must be greater than 0".to_string(),
            ));
        }
        if parity_shards == 0 {
            return Err(Error::InvalidEcConfig(
                "parity_shards must be greater than 0".to_string(),
            ));
        }

        let rs = ReedSolomon::new(data_shards, parity_shards).map_err(|e| {
            Error::InvalidEcConfig(format!("Failed to create Reed-Solomon codec: {}", e))
        })?;

        Ok(Self {
            rs: Arc::new(rs),
            data_shards,
            parity_shards,
        })
    }

    pub fn data_shards(&self) -> usize {
        self.data_shards
    }

    pub fn parity_shards(&self) -> usize {
        self.parity_shards
    }

    pub fn total_shards(&self) -> usize {
        self.data_shards + self.parity_shards
    }

    /// Shards needed to read an object back
    pub fn read_quorum(&self) -> usize {
        self.data_shards
    }

    /// Disks that must accept a write for it to count
    pub fn write_quorum(&self) -> usize {
        self.data_shards + 1
    }

    /// Per-shard length for a block of `block_len` bytes
    pub fn shard_size(&self, block_len: usize) -> usize {
        shard_size(block_len, self.data_shards)
    }

    /// Split a block into data shards (zero padded) followed by parity shards
    #[instrument(skip(self, block), fields(block_len = block.len()))]
    pub fn encode_block(&self, block: &[u8]) -> Result<Vec<Vec<u8>>> {
        if block.is_empty() {
            return Err(Error::EcEncodingFailed(
                "cannot encode an empty block".to_string(),
            ));
        }

        let size = self.shard_size(block.len());
        let mut shards: Vec<Vec<u8>> = block
            .chunks(size)
            .map(|chunk| {
                let mut shard = chunk.to_vec();
                shard.resize(size, 0);
                shard
            })
            .collect();
        shards.resize(self.total_shards(), vec![0u8; size]);

        self.rs
            .encode(&mut shards)
            .map_err(|e| Error::EcEncodingFailed(format!("Reed-Solomon encoding failed: {}", e)))?;

        Ok(shards)
    }

    /// Rebuild block `block` of `block_len` bytes from the surviving shards
    #[instrument(skip(self, shards))]
    pub fn decode_block(
        &self,
        block: u64,
        shards: &mut [Option<Vec<u8>>],
        block_len: usize,
    ) -> Result<Vec<u8>> {
        if shards.len() != self.total_shards() {
            return Err(Error::InvalidEcConfig(format!(
                "Expected {} shards, got {}",
                self.total_shards(),
                shards.len()
            )));
        }

        let available = shards.iter().filter(|s| s.is_some()).count();
        if available < self.data_shards {
            return Err(Error::InsufficientShards {
                available,
                required: self.data_shards,
            });
        }

        let data_missing = shards[..self.data_shards].iter().any(Option::is_none);
        if data_missing {
            self.rs
                .reconstruct_data(shards)
                .map_err(|e| Error::EcReconstructionFailed {
                    block,
                    reason: e.to_string(),
                })?;
            debug!(
                block,
                available,
                total = self.total_shards(),
                "reconstructed block from degraded shard set"
            );
        }

        let mut data = Vec::with_capacity(block_len);
        for shard in shards[..self.data_shards].iter().flatten() {
            data.extend_from_slice(shard);
        }
        data.truncate(block_len);

        if data.len() != block_len {
            return Err(Error::EcReconstructionFailed {
                block,
                reason: format!("decoded {} bytes, expected {}", data.len(), block_len),
            });
        }
        Ok(data)
    }
}

/// Per-shard length for `block_len` bytes split over `data_shards`
pub fn shard_size(block_len: usize, data_shards: usize) -> usize {
    block_len.div_ceil(data_shards)
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn survivors(shards: Vec<Vec<u8>>) -> Vec<Option<Vec<u8>>> {
        shards.into_iter().map(Some).collect()
    }

    #[test]
    fn test_codec_layout() {
        let codec = ErasureCodec::new(4, 4).unwrap();
        assert_eq!(codec.total_shards(), 8);
        assert_eq!(codec.read_quorum(), 4);
        assert_eq!(codec.write_quorum(), 5);
        assert_eq!(codec.shard_size(101), 26);
    }

    #[test]
    fn test_codec_invalid_config() {
        assert!(ErasureCodec::new(0, 2).is_err());
        assert!(ErasureCodec::new(4, 0).is_err());
    }

    #[test]
    fn test_encode_pads_to_equal_shards() {
        let codec = ErasureCodec::new(4, 2).unwrap();
        let shards = codec.encode_block(b"Hello, World!").unwrap();
        assert_eq!(shards.len(), 6);
        assert!(shards.iter().all(|s| s.len() == 4));
    }

    #[test]
    fn test_encode_empty_block_fails() {
        let codec = ErasureCodec::new(4, 2).unwrap();
        assert!(codec.encode_block(&[]).is_err());
    }

    #[test]
    fn test_decode_intact_block() {
        let codec = ErasureCodec::new(4, 2).unwrap();
        let block = b"block payload that is spread over several shards";
        let mut shards = survivors(codec.encode_block(block).unwrap());
        let out = codec.decode_block(0, &mut shards, block.len()).unwrap();
        assert_eq!(out, block);
    }

    #[test]
    fn test_decode_with_parity_losses() {
        let codec = ErasureCodec::new(4, 2).unwrap();
        let block = b"surviving the loss of one data and one parity shard";
        let mut shards = survivors(codec.encode_block(block).unwrap());
        shards[1] = None;
        shards[5] = None;
        let out = codec.decode_block(7, &mut shards, block.len()).unwrap();
        assert_eq!(out, block);
    }

    #[test]
    fn test_decode_insufficient_shards() {
        let codec = ErasureCodec::new(4, 2).unwrap();
        let mut shards = survivors(codec.encode_block(b"not enough survivors").unwrap());
        shards[0] = None;
        shards[2] = None;
        shards[4] = None;
        let result = codec.decode_block(0, &mut shards, 20);
        assert!(matches!(
            result,
            Err(Error::InsufficientShards {
                available: 3,
                required: 4
            })
        ));
    }
}
