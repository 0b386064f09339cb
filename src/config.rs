//! Database configuration and validation.

use serde::{Deserialize, Serialize};

use crate::block::BLOCK_NULL_IDX;
use crate::error::ErrorKind;
use crate::layout::VERTEX_HEADER_BYTES;
use crate::locator::OFFSET_BITS;

/// Configuration for opening a [`crate::Database`].
///
/// Every peer in a cluster must open with the same `block_size_bytes` and
/// `offset_bits` (the latter is a compile-time constant, see
/// [`crate::locator::OFFSET_BITS`]); `memory_size_bytes_per_peer` may
/// differ per peer but is given here as the per-peer figure used by the
/// local simulator and by single-peer deployments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Size in bytes of a single block. Must be large enough to hold the
    /// 24-byte vertex header plus at least one 8-byte overflow-locator slot.
    pub block_size_bytes: u32,
    /// Total bytes of block storage owned by each peer.
    pub memory_size_bytes_per_peer: u64,
    /// Number of peers in the process group.
    pub process_group_size: u32,
    /// Number of head-of-chain slots the distributed index's table
    /// window holds per peer (§4.9's `T_local`).
    pub index_table_size_per_peer: u32,
    /// Number of element slots the distributed index's heap window
    /// holds per peer (§4.9's `H_local`).
    pub index_heap_size_per_peer: u32,
}

impl DatabaseConfig {
    /// Minimum viable block size: header plus one overflow-locator slot.
    pub const MIN_BLOCK_SIZE_BYTES: u32 = VERTEX_HEADER_BYTES + 8;

    /// Builds a configuration with index table/heap sizes defaulted to
    /// the peer's block count (one index slot per block is a reasonable
    /// starting ratio for a graph whose vertices are roughly as numerous
    /// as its blocks).
    pub fn new(block_size_bytes: u32, memory_size_bytes_per_peer: u64, process_group_size: u32) -> Self {
        let num_blocks = (memory_size_bytes_per_peer / block_size_bytes.max(1) as u64).max(1) as u32;
        DatabaseConfig {
            block_size_bytes,
            memory_size_bytes_per_peer,
            process_group_size,
            index_table_size_per_peer: num_blocks,
            index_heap_size_per_peer: num_blocks,
        }
    }

    /// Validates the configuration per the §6 constraints.
    pub fn validate(&self) -> Result<(), ErrorKind> {
        if self.block_size_bytes < Self::MIN_BLOCK_SIZE_BYTES {
            return Err(ErrorKind::Constraint);
        }
        if self.process_group_size == 0 {
            return Err(ErrorKind::Constraint);
        }
        if self.index_table_size_per_peer == 0 || self.index_heap_size_per_peer == 0 {
            return Err(ErrorKind::Constraint);
        }
        let num_blocks = self.memory_size_bytes_per_peer / self.block_size_bytes as u64;
        if num_blocks >= BLOCK_NULL_IDX as u64 {
            return Err(ErrorKind::Constraint);
        }
        if (self.process_group_size as u64) > (1u64 << OFFSET_BITS) {
            return Err(ErrorKind::Constraint);
        }
        Ok(())
    }

    /// Number of fixed-size blocks per peer, rounding down.
    pub fn num_blocks_per_peer(&self) -> u32 {
        (self.memory_size_bytes_per_peer / self.block_size_bytes as u64) as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_undersized_blocks() {
        let cfg = DatabaseConfig::new(16, 1 << 20, 1);
        assert_eq!(cfg.validate(), Err(ErrorKind::Constraint));
    }

    #[test]
    fn accepts_default_shape() {
        let cfg = DatabaseConfig::new(512, 64 * 1024, 2);
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.num_blocks_per_peer(), 128);
    }
}
