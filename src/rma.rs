//! The RMA façade: a thin abstraction over one-sided get/put/atomics on
//! named windows, so the rest of the core is unaware of which underlying
//! one-sided transport is used.
//!
//! This crate treats the real transport (MPI one-sided, libfabric, UCX)
//! as an external collaborator, exactly like the benchmark drivers and
//! analytics kernels it does not implement. The only implementation
//! shipped here is [`local::LocalRma`], an in-process multi-peer
//! simulator used by tests and by single-binary multi-rank deployments.

pub mod local;

/// The named memory regions a database instance spreads across peers.
///
/// Each peer owns one instance of every window; a window is addressed by
/// `(kind, rank, byte offset)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WindowKind {
    /// Raw vertex/edge/property block storage, `num_blocks * block_size` bytes.
    Blocks,
    /// Per-block free-list bookkeeping, `num_blocks` `u32` entries.
    Usage,
    /// Free-list head (slot 0) and per-block vertex lock words (slots `1..=num_blocks`).
    System,
    /// Distributed index: per-slot head-of-chain locator.
    IndexTable,
    /// Distributed index: heap of `{key, value, incarnation, next}` elements.
    IndexHeap,
    /// Distributed index: `{next_free_slot, free_list_head}` counters.
    IndexCounter,
}

/// Accumulate/fetch-and-op operators, per §6's assumed RMA capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AtomicOp {
    /// Fetch the current value, then add the operand (wrapping).
    Sum,
    /// Fetch the current value without modifying it.
    NoOp,
    /// Replace the current value with the operand, returning the old one.
    Replace,
}

/// One-sided communication substrate over named, per-peer windows.
///
/// All operations are non-blocking: completion is only guaranteed after
/// the matching `flush`/`flush_local`/`flush_all` call, per §4.2 and §5.
/// [`local::LocalRma`] executes every operation synchronously (it has no
/// network to overlap), so its `flush` family are no-ops; a fabric-backed
/// implementation would buffer operations and resolve them on flush.
pub trait Rma: std::fmt::Debug + Send + Sync {
    /// Number of peers in the process group this façade spans.
    fn num_ranks(&self) -> u32;

    /// Copies `buf.len()` bytes from `(window, rank, offset)` into `buf`.
    fn get(&self, window: WindowKind, rank: u32, offset: u64, buf: &mut [u8]);

    /// Copies `buf.len()` bytes from `buf` into `(window, rank, offset)`.
    fn put(&self, window: WindowKind, rank: u32, offset: u64, buf: &[u8]);

    /// Atomically applies `op` with `operand` to the 32-bit word at
    /// `(window, rank, offset)` and returns the value observed *before*
    /// the operation (fetch-and-op semantics).
    fn fetch_and_op_u32(
        &self,
        window: WindowKind,
        rank: u32,
        offset: u64,
        op: AtomicOp,
        operand: u32,
    ) -> u32;

    /// 64-bit counterpart of [`Rma::fetch_and_op_u32`].
    fn fetch_and_op_u64(
        &self,
        window: WindowKind,
        rank: u32,
        offset: u64,
        op: AtomicOp,
        operand: u64,
    ) -> u64;

    /// Atomic compare-and-swap on the 32-bit word at `(window, rank,
    /// offset)`: if the current value equals `compare`, replaces it with
    /// `new_value`. Always returns the value observed before the
    /// operation; the caller compares it against `compare` to tell
    /// success from failure.
    fn compare_and_swap_u32(
        &self,
        window: WindowKind,
        rank: u32,
        offset: u64,
        compare: u32,
        new_value: u32,
    ) -> u32;

    /// 64-bit counterpart of [`Rma::compare_and_swap_u32`].
    fn compare_and_swap_u64(
        &self,
        window: WindowKind,
        rank: u32,
        offset: u64,
        compare: u64,
        new_value: u64,
    ) -> u64;

    /// Completes all outstanding operations targeting `rank`, blocking
    /// until they are locally visible.
    fn flush(&self, rank: u32);

    /// Completes all outstanding *local* (originated-by-us) operations
    /// without necessarily making them visible to other initiators.
    fn flush_local(&self, rank: u32);

    /// Completes all outstanding operations to every peer.
    fn flush_all(&self);

    /// Acquires the (shared, RMA-style) lock on every peer's windows.
    /// A no-op for [`local::LocalRma`], present for API fidelity with a
    /// real MPI-style transport that requires explicit window locking.
    fn lock_all(&self);

    /// Releases the lock acquired by [`Rma::lock_all`].
    fn unlock_all(&self);
}

/// Collective process-group operations: barrier and allreduce.
///
/// The only suspension points besides `flush` (§5); a real transport
/// would implement this over its communicator, [`local::LocalProcessGroup`]
/// over an in-process condition variable.
pub trait ProcessGroup: std::fmt::Debug + Send + Sync {
    /// This process's rank within the group.
    fn rank(&self) -> u32;

    /// Total number of processes in the group.
    fn size(&self) -> u32;

    /// Blocks until every member of the group has called `barrier`.
    fn barrier(&self);

    /// Collectively ANDs `value` across the group and returns the result
    /// to every member. Used to decide unanimous commit/abort for
    /// collective transactions.
    fn allreduce_and(&self, value: bool) -> bool;
}
