//! In-process, multi-peer simulator for the [`Rma`] façade.
//!
//! Every peer's windows are plain `Vec<u8>` behind a `Mutex`, so atomics
//! are implemented as lock-held read-modify-write rather than hardware
//! CAS. This still gives every caller the atomicity the façade promises
//! (§5: "atomics on the same 64-bit word provide a total order"); it just
//! does not itself need to be lock-free, since the lock-free properties
//! under test (the block free list, the index) are properties of the
//! *algorithms* built on top of this façade, not of the façade itself.

use std::collections::HashMap;
use std::sync::{Arc, Condvar, Mutex};

use crate::rma::{AtomicOp, ProcessGroup, Rma, WindowKind};

#[derive(Debug, Default)]
struct PeerWindows {
    blocks: Mutex<Vec<u8>>,
    usage: Mutex<Vec<u8>>,
    system: Mutex<Vec<u8>>,
    index_table: Mutex<Vec<u8>>,
    index_heap: Mutex<Vec<u8>>,
    index_counter: Mutex<Vec<u8>>,
}

impl PeerWindows {
    fn window(&self, kind: WindowKind) -> &Mutex<Vec<u8>> {
        match kind {
            WindowKind::Blocks => &self.blocks,
            WindowKind::Usage => &self.usage,
            WindowKind::System => &self.system,
            WindowKind::IndexTable => &self.index_table,
            WindowKind::IndexHeap => &self.index_heap,
            WindowKind::IndexCounter => &self.index_counter,
        }
    }
}

/// Builder for [`LocalRma`]: fixes the per-peer byte size of every named
/// window up front (a real transport would do the same at
/// `MPI_Win_allocate` time).
#[derive(Debug, Default)]
pub struct LocalRmaBuilder {
    num_ranks: u32,
    sizes: HashMap<WindowKind, usize>,
}

impl LocalRmaBuilder {
    fn new(num_ranks: u32) -> Self {
        LocalRmaBuilder {
            num_ranks,
            sizes: HashMap::new(),
        }
    }

    /// Sizes the `Blocks`/`Usage`/`System` windows for a block manager
    /// with `num_blocks` blocks of `block_size_bytes` each.
    pub fn blocks(mut self, num_blocks: u32, block_size_bytes: u32) -> Self {
        self.sizes.insert(
            WindowKind::Blocks,
            num_blocks as usize * block_size_bytes as usize,
        );
        self.sizes.insert(WindowKind::Usage, num_blocks as usize * 4);
        self.sizes
            .insert(WindowKind::System, (1 + num_blocks as usize) * 8);
        self
    }

    /// Sizes the `IndexTable`/`IndexHeap`/`IndexCounter` windows for a
    /// distributed index with `table_size` head-of-chain slots and
    /// `heap_size` element slots per peer.
    pub fn index(mut self, table_size: u32, heap_size: u32) -> Self {
        self.sizes.insert(WindowKind::IndexTable, table_size as usize * 8);
        self.sizes
            .insert(WindowKind::IndexHeap, heap_size as usize * 32);
        self.sizes.insert(WindowKind::IndexCounter, 16);
        self
    }

    /// Builds the simulator with every peer's windows zero-initialized.
    pub fn build(self) -> LocalRma {
        let peers = (0..self.num_ranks)
            .map(|_| PeerWindows {
                blocks: Mutex::new(vec![0u8; *self.sizes.get(&WindowKind::Blocks).unwrap_or(&0)]),
                usage: Mutex::new(vec![0u8; *self.sizes.get(&WindowKind::Usage).unwrap_or(&0)]),
                system: Mutex::new(vec![0u8; *self.sizes.get(&WindowKind::System).unwrap_or(&0)]),
                index_table: Mutex::new(vec![
                    0xFFu8;
                    *self.sizes.get(&WindowKind::IndexTable).unwrap_or(&0)
                ]),
                index_heap: Mutex::new(vec![0u8; *self.sizes.get(&WindowKind::IndexHeap).unwrap_or(&0)]),
                index_counter: Mutex::new(vec![
                    0u8;
                    *self.sizes.get(&WindowKind::IndexCounter).unwrap_or(&0)
                ]),
            })
            .collect();
        LocalRma {
            num_ranks: self.num_ranks,
            peers,
        }
    }
}

/// An in-process simulation of `N` peers' worth of RMA-addressable
/// memory, shared across as many threads as callers like to drive it
/// from.
#[derive(Debug)]
pub struct LocalRma {
    num_ranks: u32,
    peers: Vec<PeerWindows>,
}

impl LocalRma {
    /// Starts building a [`LocalRma`] spanning `num_ranks` peers.
    pub fn builder(num_ranks: u32) -> LocalRmaBuilder {
        LocalRmaBuilder::new(num_ranks)
    }

    fn peer(&self, rank: u32) -> &PeerWindows {
        &self.peers[rank as usize]
    }
}

fn apply_op_u32(current: u32, op: AtomicOp, operand: u32) -> u32 {
    match op {
        AtomicOp::Sum => current.wrapping_add(operand),
        AtomicOp::NoOp => current,
        AtomicOp::Replace => operand,
    }
}

fn apply_op_u64(current: u64, op: AtomicOp, operand: u64) -> u64 {
    match op {
        AtomicOp::Sum => current.wrapping_add(operand),
        AtomicOp::NoOp => current,
        AtomicOp::Replace => operand,
    }
}

impl Rma for LocalRma {
    fn num_ranks(&self) -> u32 {
        self.num_ranks
    }

    fn get(&self, window: WindowKind, rank: u32, offset: u64, buf: &mut [u8]) {
        let guard = self.peer(rank).window(window).lock().unwrap();
        let start = offset as usize;
        buf.copy_from_slice(&guard[start..start + buf.len()]);
    }

    fn put(&self, window: WindowKind, rank: u32, offset: u64, buf: &[u8]) {
        let mut guard = self.peer(rank).window(window).lock().unwrap();
        let start = offset as usize;
        guard[start..start + buf.len()].copy_from_slice(buf);
    }

    fn fetch_and_op_u32(&self, window: WindowKind, rank: u32, offset: u64, op: AtomicOp, operand: u32) -> u32 {
        let mut guard = self.peer(rank).window(window).lock().unwrap();
        let start = offset as usize;
        let current = u32::from_le_bytes(guard[start..start + 4].try_into().unwrap());
        let new_value = apply_op_u32(current, op, operand);
        guard[start..start + 4].copy_from_slice(&new_value.to_le_bytes());
        current
    }

    fn fetch_and_op_u64(&self, window: WindowKind, rank: u32, offset: u64, op: AtomicOp, operand: u64) -> u64 {
        let mut guard = self.peer(rank).window(window).lock().unwrap();
        let start = offset as usize;
        let current = u64::from_le_bytes(guard[start..start + 8].try_into().unwrap());
        let new_value = apply_op_u64(current, op, operand);
        guard[start..start + 8].copy_from_slice(&new_value.to_le_bytes());
        current
    }

    fn compare_and_swap_u32(&self, window: WindowKind, rank: u32, offset: u64, compare: u32, new_value: u32) -> u32 {
        let mut guard = self.peer(rank).window(window).lock().unwrap();
        let start = offset as usize;
        let current = u32::from_le_bytes(guard[start..start + 4].try_into().unwrap());
        if current == compare {
            guard[start..start + 4].copy_from_slice(&new_value.to_le_bytes());
        }
        current
    }

    fn compare_and_swap_u64(&self, window: WindowKind, rank: u32, offset: u64, compare: u64, new_value: u64) -> u64 {
        let mut guard = self.peer(rank).window(window).lock().unwrap();
        let start = offset as usize;
        let current = u64::from_le_bytes(guard[start..start + 8].try_into().unwrap());
        if current == compare {
            guard[start..start + 8].copy_from_slice(&new_value.to_le_bytes());
        }
        current
    }

    fn flush(&self, _rank: u32) {}
    fn flush_local(&self, _rank: u32) {}
    fn flush_all(&self) {}
    fn lock_all(&self) {}
    fn unlock_all(&self) {}
}

#[derive(Debug, Default)]
struct AllreduceState {
    generation: u64,
    arrived: u32,
    acc: bool,
    result: bool,
}

#[derive(Debug)]
struct GroupShared {
    size: u32,
    barrier: std::sync::Barrier,
    allreduce: Mutex<AllreduceState>,
    condvar: Condvar,
}

/// An in-process collective group of [`LocalProcessGroup`] members
/// backing a `barrier`/`allreduce_and` over a shared generation counter.
#[derive(Debug)]
pub struct LocalProcessGroup {
    rank: u32,
    shared: Arc<GroupShared>,
}

impl LocalProcessGroup {
    /// Builds `size` group members sharing one barrier/allreduce state,
    /// ranked `0..size`.
    pub fn group(size: u32) -> Vec<LocalProcessGroup> {
        let shared = Arc::new(GroupShared {
            size,
            barrier: std::sync::Barrier::new(size as usize),
            allreduce: Mutex::new(AllreduceState {
                acc: true,
                ..Default::default()
            }),
            condvar: Condvar::new(),
        });
        (0..size)
            .map(|rank| LocalProcessGroup {
                rank,
                shared: Arc::clone(&shared),
            })
            .collect()
    }
}

impl ProcessGroup for LocalProcessGroup {
    fn rank(&self) -> u32 {
        self.rank
    }

    fn size(&self) -> u32 {
        self.shared.size
    }

    fn barrier(&self) {
        self.shared.barrier.wait();
    }

    fn allreduce_and(&self, value: bool) -> bool {
        let mut state = self.shared.allreduce.lock().unwrap();
        let my_generation = state.generation;
        state.acc &= value;
        state.arrived += 1;
        if state.arrived == self.shared.size {
            state.result = state.acc;
            state.acc = true;
            state.arrived = 0;
            state.generation += 1;
            self.shared.condvar.notify_all();
            state.result
        } else {
            let result = self
                .shared
                .condvar
                .wait_while(state, |s| s.generation == my_generation)
                .unwrap()
                .result;
            result
        }
    }
}
