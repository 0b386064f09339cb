//! Remote reader/writer lock with incarnation counters.
//!
//! The primary block's `System`-window slot doubles as a 64-bit lock word
//! laid out `{incarnation:u32 | writer_bit:1 | reader_count:31}` (§4.4).
//! All operations are remote atomics against that word; a failed
//! acquire/upgrade never blocks — it reports failure and the caller (the
//! transaction engine) decides whether to retry or go critical.

use crate::block::{system_lock_offset, BlockManager};
use crate::locator::Locator;
use crate::rma::{AtomicOp, WindowKind};

const READER_INCREMENT: u64 = 1;
const WRITER_BIT: u64 = 1 << 31;

/// The kind of lock a [`crate::holder::VertexHolder`] currently holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockState {
    /// No lock held.
    None,
    /// A shared read lock.
    Read,
    /// The exclusive write lock.
    Write,
}

/// Result of a lock acquisition/upgrade attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockResult {
    /// The lock was acquired/upgraded; carries the observed incarnation.
    Acquired { incarnation: u32 },
    /// A concurrent writer (for read) or concurrent reader (for upgrade)
    /// made the attempt fail. The caller still owns whatever lock it had
    /// before the call (none, for a failed read acquire; a read lock, for
    /// a failed upgrade) and must release it before retrying or aborting.
    Failed,
}

/// Attempts to acquire a shared read lock on the vertex whose primary
/// block is at `locator`.
pub fn acquire_read(blocks: &BlockManager, locator: Locator) -> LockResult {
    let offset = system_lock_offset(locator_block_idx(blocks, locator));
    let result = blocks.rma().fetch_and_op_u64(
        WindowKind::System,
        locator.rank(),
        offset,
        AtomicOp::Sum,
        READER_INCREMENT,
    );
    blocks.rma().flush(locator.rank());

    if result & WRITER_BIT != 0 {
        // An active writer: revert our speculative increment.
        blocks.rma().fetch_and_op_u64(
            WindowKind::System,
            locator.rank(),
            offset,
            AtomicOp::Sum,
            (-(READER_INCREMENT as i64)) as u64,
        );
        blocks.rma().flush(locator.rank());
        return LockResult::Failed;
    }

    LockResult::Acquired {
        incarnation: (result >> 32) as u32,
    }
}

/// Attempts to upgrade a previously-acquired read lock to the exclusive
/// write lock. On failure the caller still holds the read lock.
pub fn try_upgrade_to_write(blocks: &BlockManager, locator: Locator, incarnation: u32) -> LockResult {
    let offset = system_lock_offset(locator_block_idx(blocks, locator));
    let compare = ((incarnation as u64) << 32) | READER_INCREMENT;
    let replace = ((incarnation as u64) << 32) | WRITER_BIT;

    let observed = blocks
        .rma()
        .compare_and_swap_u64(WindowKind::System, locator.rank(), offset, compare, replace);
    blocks.rma().flush(locator.rank());

    if observed == compare {
        LockResult::Acquired { incarnation }
    } else {
        LockResult::Failed
    }
}

/// Sets the write-lock bit on a block that was just allocated by this
/// process and is therefore unobservable to any other peer yet — no CAS
/// is needed. Used by vertex creation (§4.10).
pub fn set_write_on_fresh_block(blocks: &BlockManager, locator: Locator) -> u32 {
    let offset = system_lock_offset(locator_block_idx(blocks, locator));
    let result = blocks.rma().fetch_and_op_u64(
        WindowKind::System,
        locator.rank(),
        offset,
        AtomicOp::Sum,
        WRITER_BIT,
    );
    blocks.rma().flush(locator.rank());
    (result >> 32) as u32
}

/// Releases whichever lock `state` describes. When releasing a write
/// lock on a vertex marked for deletion, the release and the incarnation
/// bump happen in the same atomic add (carrying `WRITER_BIT` into the
/// incarnation field), invalidating any index entry cached elsewhere
/// (P4/§3 "Incarnation").
pub fn release(blocks: &BlockManager, locator: Locator, state: LockState, deleted: bool) {
    let offset = system_lock_offset(locator_block_idx(blocks, locator));
    let delta: u64 = match state {
        LockState::None => return,
        LockState::Read => (-(READER_INCREMENT as i64)) as u64,
        LockState::Write => {
            if deleted {
                WRITER_BIT
            } else {
                (-(WRITER_BIT as i64)) as u64
            }
        }
    };
    blocks
        .rma()
        .fetch_and_op_u64(WindowKind::System, locator.rank(), offset, AtomicOp::Sum, delta);
    blocks.rma().flush(locator.rank());
}

/// Reads the current incarnation of a vertex's lock word without taking
/// a lock, used to validate an index entry's cached incarnation (§4.10
/// `translate_vertex_id`, I5).
pub fn read_incarnation(blocks: &BlockManager, locator: Locator) -> u32 {
    let offset = system_lock_offset(locator_block_idx(blocks, locator));
    let result =
        blocks
            .rma()
            .fetch_and_op_u64(WindowKind::System, locator.rank(), offset, AtomicOp::NoOp, 0);
    blocks.rma().flush(locator.rank());
    (result >> 32) as u32
}

fn locator_block_idx(blocks: &BlockManager, locator: Locator) -> u32 {
    (locator.offset() / blocks.block_size_bytes() as u64) as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rma::local::LocalRma;
    use std::sync::Arc;

    fn setup() -> (BlockManager, Locator) {
        let rma = Arc::new(LocalRma::builder(1).blocks(4, 64).build());
        let blocks = BlockManager::new(rma, 64, 4);
        blocks.init();
        let locator = blocks.allocate(0);
        (blocks, locator)
    }

    #[test]
    fn fresh_write_then_release_then_read() {
        let (blocks, locator) = setup();
        let incarnation = set_write_on_fresh_block(&blocks, locator);
        assert_eq!(incarnation, 0);
        release(&blocks, locator, LockState::Write, false);

        match acquire_read(&blocks, locator) {
            LockResult::Acquired { incarnation } => assert_eq!(incarnation, 0),
            LockResult::Failed => panic!("read should succeed once writer released"),
        }
    }

    #[test]
    fn two_readers_block_upgrade() {
        let (blocks, locator) = setup();
        set_write_on_fresh_block(&blocks, locator);
        release(&blocks, locator, LockState::Write, false);

        let r1 = acquire_read(&blocks, locator);
        let r2 = acquire_read(&blocks, locator);
        let inc = match (r1, r2) {
            (LockResult::Acquired { incarnation: i1 }, LockResult::Acquired { incarnation: i2 }) => {
                assert_eq!(i1, i2);
                i1
            }
            _ => panic!("both reads should succeed"),
        };

        assert_eq!(
            try_upgrade_to_write(&blocks, locator, inc),
            LockResult::Failed,
            "upgrade must fail with two readers present (S5)"
        );

        release(&blocks, locator, LockState::Read, false);
        assert_eq!(
            try_upgrade_to_write(&blocks, locator, inc),
            LockResult::Failed,
            "still one other reader present"
        );
        release(&blocks, locator, LockState::Read, false);
        assert_eq!(
            try_upgrade_to_write(&blocks, locator, inc),
            LockResult::Acquired { incarnation: inc },
            "upgrade succeeds once sole reader remains"
        );
    }

    #[test]
    fn writer_blocks_reader() {
        let (blocks, locator) = setup();
        set_write_on_fresh_block(&blocks, locator);
        release(&blocks, locator, LockState::Write, false);

        acquire_read(&blocks, locator);
        let LockResult::Acquired { incarnation } = acquire_read(&blocks, locator) else {
            panic!()
        };
        assert_eq!(
            try_upgrade_to_write(&blocks, locator, incarnation),
            LockResult::Failed
        );
    }

    #[test]
    fn delete_release_bumps_incarnation() {
        let (blocks, locator) = setup();
        let i0 = set_write_on_fresh_block(&blocks, locator);
        release(&blocks, locator, LockState::Write, true);
        assert_eq!(read_incarnation(&blocks, locator), i0 + 1);
    }
}
