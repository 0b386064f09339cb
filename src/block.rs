//! Block manager: a fixed-size block pool per peer, with a distributed,
//! ABA-safe free list.
//!
//! Per peer, three windows are co-allocated at init (§4.3):
//!   - `Blocks`: raw storage, `num_blocks * block_size` bytes;
//!   - `Usage`: `num_blocks` `u32` entries, either [`BLOCK_INUSE`] or the
//!     index of the next free block (or [`BLOCK_NULL_IDX`]);
//!   - `System` slot 0: a 64-bit `{tag, index}` free-list head. (Slots
//!     `1..=num_blocks` of the same window double as vertex lock words,
//!     see `lock.rs`.)

use std::sync::Arc;

use tracing::{debug, trace};

use crate::locator::Locator;
use crate::rma::{Rma, WindowKind};

/// Sentinel marking a `Usage` slot as belonging to an in-use block.
pub const BLOCK_INUSE: u32 = 0xFFFF_FFFE;

/// Sentinel marking the end of the free list / an absent successor.
pub const BLOCK_NULL_IDX: u32 = 0xFFFF_FFFF;

const FREE_LIST_HEAD_OFFSET: u64 = 0;

/// `{tag: u32 | index: u32}` packed free-list head, used for ABA-safe CAS.
fn pack_head(tag: u32, idx: u32) -> u64 {
    ((tag as u64) << 32) | idx as u64
}

fn unpack_head(word: u64) -> (u32, u32) {
    ((word >> 32) as u32, word as u32)
}

/// Offset, in the `System` window, of a block's vertex-lock word.
///
/// Slot 0 is the free-list head, so block `idx`'s lock word lives at
/// `8 * (1 + idx)`.
pub fn system_lock_offset(block_idx: u32) -> u64 {
    8 * (1 + block_idx as u64)
}

/// Per-peer, block-addressed allocator sitting on top of an [`Rma`] façade.
#[derive(Debug)]
pub struct BlockManager {
    rma: Arc<dyn Rma>,
    block_size_bytes: u32,
    num_blocks_per_peer: u32,
}

impl BlockManager {
    /// Builds a block manager over an already-constructed RMA façade
    /// whose `Blocks`/`Usage`/`System` windows have the shapes implied by
    /// `block_size_bytes` and `num_blocks_per_peer` for every peer.
    pub fn new(rma: Arc<dyn Rma>, block_size_bytes: u32, num_blocks_per_peer: u32) -> Self {
        BlockManager {
            rma,
            block_size_bytes,
            num_blocks_per_peer,
        }
    }

    /// Block size in bytes.
    pub fn block_size_bytes(&self) -> u32 {
        self.block_size_bytes
    }

    /// Number of blocks owned by each peer.
    pub fn num_blocks_per_peer(&self) -> u32 {
        self.num_blocks_per_peer
    }

    /// Initializes the free list on every peer: `usage[i] = i+1` for
    /// `i < num_blocks-1`, `usage[num_blocks-1] = NULL`, and the
    /// `System` free-list head set to `{tag: 0, idx: 0}`.
    pub fn init(&self) {
        for rank in 0..self.rma.num_ranks() {
            for i in 0..self.num_blocks_per_peer {
                let next = if i + 1 == self.num_blocks_per_peer {
                    BLOCK_NULL_IDX
                } else {
                    i + 1
                };
                self.rma
                    .put(WindowKind::Usage, rank, (i as u64) * 4, &next.to_le_bytes());
            }
            self.rma.put(
                WindowKind::System,
                rank,
                FREE_LIST_HEAD_OFFSET,
                &pack_head(0, 0).to_le_bytes(),
            );
        }
        self.rma.flush_all();
    }

    /// Allocates one block, preferring `prefer_rank`, falling through to
    /// `(prefer_rank + 1) mod N`, `(prefer_rank + 2) mod N`, … on
    /// exhaustion. Returns [`Locator::NULL`] if every peer is full (B2).
    pub fn allocate(&self, prefer_rank: u32) -> Locator {
        let n = self.rma.num_ranks();
        let mut current_rank = prefer_rank;

        let mut head = self.read_head(current_rank);
        loop {
            let (tag, idx) = unpack_head(head);
            if idx == BLOCK_NULL_IDX {
                current_rank = (current_rank + 1) % n;
                if current_rank == prefer_rank {
                    debug!("block allocator exhausted on all {n} peers");
                    return Locator::NULL;
                }
                head = self.read_head(current_rank);
                continue;
            }

            let mut next_bytes = [0u8; 4];
            self.rma
                .get(WindowKind::Usage, current_rank, (idx as u64) * 4, &mut next_bytes);
            self.rma.flush(current_rank);
            let next = u32::from_le_bytes(next_bytes);

            let new_head = pack_head(tag.wrapping_add(1), next);
            let observed = self.rma.compare_and_swap_u64(
                WindowKind::System,
                current_rank,
                FREE_LIST_HEAD_OFFSET,
                head,
                new_head,
            );

            if observed == head {
                #[cfg(debug_assertions)]
                {
                    self.rma.put(
                        WindowKind::Usage,
                        current_rank,
                        (idx as u64) * 4,
                        &BLOCK_INUSE.to_le_bytes(),
                    );
                    self.rma.flush(current_rank);
                }
                trace!(rank = current_rank, idx, "allocated block");
                return Locator::pack(current_rank, (idx as u64) * self.block_size_bytes as u64);
            }

            head = observed;
        }
    }

    /// Returns a block to its owning peer's free list. Retries until the
    /// CAS succeeds (the algorithm is wait-free per attempt, lock-free
    /// overall).
    pub fn deallocate(&self, locator: Locator) {
        debug_assert!(!locator.is_null());
        let rank = locator.rank();
        let idx = (locator.offset() / self.block_size_bytes as u64) as u32;

        #[cfg(debug_assertions)]
        {
            let observed = self.rma.compare_and_swap_u32(
                WindowKind::Usage,
                rank,
                (idx as u64) * 4,
                BLOCK_INUSE,
                0,
            );
            if observed != BLOCK_INUSE {
                debug!(rank, idx, "double-free detected, ignoring deallocate");
                return;
            }
        }

        let mut head = self.read_head(rank);
        loop {
            let (tag, _) = unpack_head(head);
            self.rma
                .put(WindowKind::Usage, rank, (idx as u64) * 4, &head.to_le_bytes()[..4]);
            self.rma.flush(rank);

            let new_head = pack_head(tag.wrapping_add(1), idx);
            let observed = self.rma.compare_and_swap_u64(
                WindowKind::System,
                rank,
                FREE_LIST_HEAD_OFFSET,
                head,
                new_head,
            );
            if observed == head {
                trace!(rank, idx, "deallocated block");
                return;
            }
            head = observed;
        }
    }

    /// Fetches a block's raw bytes via RMA get.
    pub fn get_block(&self, locator: Locator, buf: &mut [u8]) {
        debug_assert!(!locator.is_null());
        debug_assert_eq!(buf.len(), self.block_size_bytes as usize);
        self.rma.get(WindowKind::Blocks, locator.rank(), locator.offset(), buf);
    }

    /// Writes a block's raw bytes via RMA put.
    pub fn put_block(&self, locator: Locator, buf: &[u8]) {
        debug_assert!(!locator.is_null());
        debug_assert_eq!(buf.len(), self.block_size_bytes as usize);
        self.rma.put(WindowKind::Blocks, locator.rank(), locator.offset(), buf);
    }

    fn read_head(&self, rank: u32) -> u64 {
        let mut buf = [0u8; 8];
        self.rma.get(WindowKind::System, rank, FREE_LIST_HEAD_OFFSET, &mut buf);
        self.rma.flush(rank);
        u64::from_le_bytes(buf)
    }

    /// Exposes the atomic fetch/CAS primitives against a block's
    /// lock-word slot in the `System` window, for use by `lock.rs`.
    pub(crate) fn rma(&self) -> &Arc<dyn Rma> {
        &self.rma
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rma::local::LocalRma;

    fn manager(num_blocks: u32) -> BlockManager {
        let rma = Arc::new(LocalRma::builder(1).blocks(num_blocks, 64).build());
        let mgr = BlockManager::new(rma, 64, num_blocks);
        mgr.init();
        mgr
    }

    #[test]
    fn allocate_then_deallocate_roundtrips() {
        let mgr = manager(4);
        let a = mgr.allocate(0);
        assert!(!a.is_null());
        mgr.deallocate(a);
        let b = mgr.allocate(0);
        assert_eq!(a, b, "freed block should be reused (LIFO free list)");
    }

    #[test]
    fn exhaustion_returns_null() {
        let mgr = manager(2);
        let a = mgr.allocate(0);
        let b = mgr.allocate(0);
        assert!(!a.is_null() && !b.is_null());
        assert_eq!(mgr.allocate(0), Locator::NULL);
    }

    #[test]
    fn falls_through_to_next_peer_when_local_is_empty() {
        let rma = Arc::new(LocalRma::builder(2).blocks(1, 64).build());
        let mgr = BlockManager::new(rma, 64, 1);
        mgr.init();
        let first = mgr.allocate(0);
        assert_eq!(first.rank(), 0);
        let second = mgr.allocate(0);
        assert_eq!(second.rank(), 1, "peer 0 is full, should fall through to peer 1");
    }

    proptest::proptest! {
        /// P2/P3: replaying any sequence of allocate/deallocate ops
        /// against a model free set never hands out a block that the
        /// model considers already in-use, and never frees a block the
        /// model considers already free (ABA safety, allocator
        /// disjointness).
        #[test]
        fn random_alloc_dealloc_sequence_respects_disjointness(
            ops in proptest::collection::vec(proptest::bool::ANY, 1..200)
        ) {
            let num_blocks = 16;
            let mgr = manager(num_blocks);
            let mut outstanding: Vec<Locator> = Vec::new();

            for allocate in ops {
                if allocate || outstanding.is_empty() {
                    let locator = mgr.allocate(0);
                    if !locator.is_null() {
                        proptest::prop_assert!(
                            !outstanding.contains(&locator),
                            "allocator handed out a block still outstanding: {locator:?}"
                        );
                        outstanding.push(locator);
                    }
                } else {
                    let idx = outstanding.len() - 1;
                    let locator = outstanding.swap_remove(idx);
                    mgr.deallocate(locator);
                }
            }
        }
    }

    #[test]
    fn concurrent_allocate_never_double_hands_out_a_block() {
        use std::collections::HashSet;
        use std::sync::Mutex;

        let num_blocks = 64;
        let mgr = Arc::new(manager(num_blocks));
        let seen = Arc::new(Mutex::new(HashSet::new()));

        std::thread::scope(|scope| {
            for _ in 0..8 {
                let mgr = Arc::clone(&mgr);
                let seen = Arc::clone(&seen);
                scope.spawn(move || {
                    for _ in 0..(num_blocks as usize / 8) {
                        let locator = mgr.allocate(0);
                        assert!(!locator.is_null());
                        assert!(
                            seen.lock().unwrap().insert(locator),
                            "block handed out twice: {locator:?}"
                        );
                    }
                });
            }
        });
    }
}
