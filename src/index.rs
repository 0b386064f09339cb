//! Distributed lock-free hash index: external key → `(locator, incarnation)`
//! (§4.9), grounded in `gda_distributed_hashtable.c`.
//!
//! Three windows, all per peer:
//!   - `IndexTable`: `T_local` head-of-chain pointers (as [`Locator`]s,
//!     reused here to address a heap slot rather than a block);
//!   - `IndexHeap`: `heap_size_local` four-word `{key, value, incarnation,
//!     next}` records, 32 bytes each;
//!   - `IndexCounter`: `{next_free_slot, free_list_head}`, the second word
//!     packed `{tag:u32 | index:u32}` exactly as the block manager's free
//!     list (`block.rs`).
//!
//! A deleted element is first marked by CASing its own `next` field to
//! point at itself; a concurrent reader that fetches a self-pointing
//! element knows a delete is in flight and restarts its walk from the
//! table head rather than risk observing a half-unlinked list.

use std::sync::Arc;

use tracing::trace;

use crate::error::ErrorKind;
use crate::locator::Locator;
use crate::rma::{AtomicOp, Rma, WindowKind};

const ELEMENT_BYTES: u64 = 32;
const KEY_OFFSET: u64 = 0;
const VALUE_OFFSET: u64 = 8;
const INCARNATION_OFFSET: u64 = 16;
const NEXT_OFFSET: u64 = 24;

const COUNTER_NEXT_FREE_OFFSET: u64 = 0;
const COUNTER_FREE_LIST_HEAD_OFFSET: u64 = 8;

/// Sentinel marking the end of the heap's reuse free list.
const HEAP_NULL_IDX: u32 = 0xFFFF_FFFF;

fn pack_head(tag: u32, idx: u32) -> u64 {
    ((tag as u64) << 32) | idx as u64
}

fn unpack_head(word: u64) -> (u32, u32) {
    ((word >> 32) as u32, word as u32)
}

/// A fetched heap element, before its `next` pointer is interpreted.
#[derive(Debug, Clone, Copy)]
struct Element {
    key: u64,
    value: u64,
    incarnation: u64,
    next: u64,
}

/// Mixes a label handle and an external key's bytes into a 64-bit hash
/// used both to pick the owning table slot and, in full, as the index's
/// stored match key (§4.9: "64-bit mix of the external-key bytes and
/// label handle").
pub fn hash_key(label: u8, external_id: &[u8]) -> u64 {
    use std::hash::Hasher;
    let mut hasher = ahash::AHasher::default();
    hasher.write_u8(label);
    hasher.write(external_id);
    hasher.finish()
}

/// Distributed, lock-free key → `(locator, incarnation)` hash index.
#[derive(Debug)]
pub struct DistributedIndex {
    rma: Arc<dyn Rma>,
    table_size_local: u32,
    heap_size_local: u32,
}

impl DistributedIndex {
    /// Builds an index over an already-sized `IndexTable`/`IndexHeap`/
    /// `IndexCounter` window set.
    pub fn new(rma: Arc<dyn Rma>, table_size_local: u32, heap_size_local: u32) -> Self {
        DistributedIndex {
            rma,
            table_size_local,
            heap_size_local,
        }
    }

    /// Initializes every peer's table (all slots `NULL`) and counters
    /// (`next_free_slot = 0`, `free_list_head = NULL`). Every peer must
    /// call this with the same sizes (§4.9 precondition).
    pub fn init(&self) {
        for rank in 0..self.rma.num_ranks() {
            for slot in 0..self.table_size_local {
                self.rma
                    .put(WindowKind::IndexTable, rank, (slot as u64) * 8, &Locator::NULL.as_u64().to_le_bytes());
            }
            self.rma
                .put(WindowKind::IndexCounter, rank, COUNTER_NEXT_FREE_OFFSET, &0u64.to_le_bytes());
            self.rma.put(
                WindowKind::IndexCounter,
                rank,
                COUNTER_FREE_LIST_HEAD_OFFSET,
                &pack_head(0, HEAP_NULL_IDX).to_le_bytes(),
            );
        }
        self.rma.flush_all();
    }

    fn table_total(&self) -> u64 {
        self.table_size_local as u64 * self.rma.num_ranks() as u64
    }

    fn table_slot(&self, key: u64) -> (u32, u64) {
        let hash = key % self.table_total();
        let t_rank = (hash / self.table_size_local as u64) as u32;
        let t_offset = hash % self.table_size_local as u64;
        (t_rank, t_offset)
    }

    fn table_get(&self, t_rank: u32, t_offset: u64) -> Locator {
        let mut buf = [0u8; 8];
        self.rma.get(WindowKind::IndexTable, t_rank, t_offset * 8, &mut buf);
        self.rma.flush(t_rank);
        Locator::from_u64(u64::from_le_bytes(buf))
    }

    fn heap_get(&self, rank: u32, slot: u32) -> Element {
        let mut buf = [0u8; ELEMENT_BYTES as usize];
        self.rma.get(WindowKind::IndexHeap, rank, slot as u64 * ELEMENT_BYTES, &mut buf);
        self.rma.flush(rank);
        Element {
            key: u64::from_le_bytes(buf[0..8].try_into().unwrap()),
            value: u64::from_le_bytes(buf[8..16].try_into().unwrap()),
            incarnation: u64::from_le_bytes(buf[16..24].try_into().unwrap()),
            next: u64::from_le_bytes(buf[24..32].try_into().unwrap()),
        }
    }

    fn heap_put_element(&self, rank: u32, slot: u32, element: &Element) {
        let base = slot as u64 * ELEMENT_BYTES;
        self.rma.put(WindowKind::IndexHeap, rank, base + KEY_OFFSET, &element.key.to_le_bytes());
        self.rma.put(WindowKind::IndexHeap, rank, base + VALUE_OFFSET, &element.value.to_le_bytes());
        self.rma
            .put(WindowKind::IndexHeap, rank, base + INCARNATION_OFFSET, &element.incarnation.to_le_bytes());
        self.rma.put(WindowKind::IndexHeap, rank, base + NEXT_OFFSET, &element.next.to_le_bytes());
    }

    fn heap_read_head(&self, rank: u32) -> u64 {
        let mut buf = [0u8; 8];
        self.rma
            .get(WindowKind::IndexCounter, rank, COUNTER_FREE_LIST_HEAD_OFFSET, &mut buf);
        self.rma.flush(rank);
        u64::from_le_bytes(buf)
    }

    /// Allocates a heap slot on `rank`, preferring never-used space and
    /// falling back to the ABA-safe tag-CAS free list (mirrors
    /// `BlockManager::allocate`).
    fn heap_alloc(&self, rank: u32) -> Result<u32, ErrorKind> {
        let fresh = self
            .rma
            .fetch_and_op_u64(WindowKind::IndexCounter, rank, COUNTER_NEXT_FREE_OFFSET, AtomicOp::Sum, 1);
        if fresh < self.heap_size_local as u64 {
            return Ok(fresh as u32);
        }

        let mut head = self.heap_read_head(rank);
        loop {
            let (tag, idx) = unpack_head(head);
            if idx == HEAP_NULL_IDX {
                return Err(ErrorKind::NoMemory);
            }
            let mut next_bytes = [0u8; 8];
            self.rma
                .get(WindowKind::IndexHeap, rank, idx as u64 * ELEMENT_BYTES + VALUE_OFFSET, &mut next_bytes);
            self.rma.flush(rank);
            let next = u64::from_le_bytes(next_bytes) as u32;

            let new_head = pack_head(tag.wrapping_add(1), next);
            let observed =
                self.rma
                    .compare_and_swap_u64(WindowKind::IndexCounter, rank, COUNTER_FREE_LIST_HEAD_OFFSET, head, new_head);
            if observed == head {
                return Ok(idx);
            }
            head = observed;
        }
    }

    /// Returns a heap slot to `rank`'s free list. The slot's `next` field
    /// is left pointing at itself (a benign leftover of the delete mark);
    /// `value` is repurposed to carry the free-list link while unused.
    fn heap_dealloc(&self, rank: u32, slot: u32) {
        let mut head = self.heap_read_head(rank);
        loop {
            let (tag, _) = unpack_head(head);
            self.rma.put(
                WindowKind::IndexHeap,
                rank,
                slot as u64 * ELEMENT_BYTES + VALUE_OFFSET,
                &(head & 0xFFFF_FFFF).to_le_bytes(),
            );
            self.rma.flush(rank);

            let new_head = pack_head(tag.wrapping_add(1), slot);
            let observed =
                self.rma
                    .compare_and_swap_u64(WindowKind::IndexCounter, rank, COUNTER_FREE_LIST_HEAD_OFFSET, head, new_head);
            if observed == head {
                trace!(rank, slot, "freed index heap slot");
                return;
            }
            head = observed;
        }
    }

    /// Inserts `(key, value, incarnation)`, always allocating the new
    /// heap element on `local_rank`. Repeated inserts of the same key
    /// create a second, shadowing entry (matches the original: "may
    /// cause double inserts if insert same key again" — callers must
    /// avoid that, as the transaction engine does via O2/commit-once).
    pub fn insert(&self, key: u64, value: Locator, incarnation: u32, local_rank: u32) -> Result<(), ErrorKind> {
        let (t_rank, t_offset) = self.table_slot(key);
        let slot = self.heap_alloc(local_rank)?;
        let dp = Locator::pack(local_rank, slot as u64);

        loop {
            let current = self.table_get(t_rank, t_offset);
            self.heap_put_element(
                local_rank,
                slot,
                &Element {
                    key,
                    value: value.as_u64(),
                    incarnation: incarnation as u64,
                    next: current.as_u64(),
                },
            );

            let observed =
                self.rma
                    .compare_and_swap_u64(WindowKind::IndexTable, t_rank, t_offset * 8, current.as_u64(), dp.as_u64());
            if observed == current.as_u64() {
                trace!(key, rank = local_rank, slot, "inserted index element");
                return Ok(());
            }
        }
    }

    /// Looks up `key`, restarting from the table head whenever a
    /// concurrent delete's self-pointer mark is observed (I4).
    pub fn find(&self, key: u64) -> Option<(Locator, u32)> {
        let (t_rank, t_offset) = self.table_slot(key);
        'restart: loop {
            let mut dp = self.table_get(t_rank, t_offset);
            if dp.is_null() {
                return None;
            }
            loop {
                let element = self.heap_get(dp.rank(), dp.offset() as u32);
                if element.next == dp.as_u64() {
                    continue 'restart;
                }
                if element.key == key {
                    return Some((Locator::from_u64(element.value), element.incarnation as u32));
                }
                dp = Locator::from_u64(element.next);
                if dp.is_null() {
                    return None;
                }
            }
        }
    }

    /// Removes `key`'s entry, if present. Returns whether one was found.
    ///
    /// Two-phase: CAS the target element's own `next` field to itself
    /// (soft-delete mark, visible to `find`), then CAS the predecessor
    /// (table slot, or previous element's `next`) from the target to the
    /// target's old `next`. A predecessor-CAS failure means some other
    /// mutation raced us; retry the unlink with the same remembered
    /// `next`, re-walking from the table head to find our still-marked
    /// node (mirrors `GDA_RemoveElementFromRMAHashMap_internal`).
    pub fn remove(&self, key: u64) -> bool {
        let (t_rank, t_offset) = self.table_slot(key);

        'restart: loop {
            let head = self.table_get(t_rank, t_offset);
            if head.is_null() {
                return false;
            }

            let head_elem = self.heap_get(head.rank(), head.offset() as u32);
            if head_elem.next == head.as_u64() {
                continue 'restart;
            }
            if head_elem.key == key {
                let marked = self.rma.compare_and_swap_u64(
                    WindowKind::IndexHeap,
                    head.rank(),
                    head.offset() * ELEMENT_BYTES + NEXT_OFFSET,
                    head_elem.next,
                    head.as_u64(),
                );
                if marked != head_elem.next {
                    continue 'restart;
                }
                let unlinked = self.rma.compare_and_swap_u64(
                    WindowKind::IndexTable,
                    t_rank,
                    t_offset * 8,
                    head.as_u64(),
                    head_elem.next,
                );
                if unlinked == head.as_u64() {
                    self.heap_dealloc(head.rank(), head.offset() as u32);
                    return true;
                }
                return self.finish_unlink(t_rank, t_offset, key, head_elem.next);
            }

            let mut previous = head;
            let mut dp = Locator::from_u64(head_elem.next);
            if dp.is_null() {
                return false;
            }

            loop {
                let element = self.heap_get(dp.rank(), dp.offset() as u32);
                if element.next == dp.as_u64() {
                    continue 'restart;
                }
                if element.key == key {
                    let marked = self.rma.compare_and_swap_u64(
                        WindowKind::IndexHeap,
                        dp.rank(),
                        dp.offset() * ELEMENT_BYTES + NEXT_OFFSET,
                        element.next,
                        dp.as_u64(),
                    );
                    if marked != element.next {
                        continue 'restart;
                    }
                    let unlinked = self.rma.compare_and_swap_u64(
                        WindowKind::IndexHeap,
                        previous.rank(),
                        previous.offset() * ELEMENT_BYTES + NEXT_OFFSET,
                        dp.as_u64(),
                        element.next,
                    );
                    if unlinked == dp.as_u64() {
                        self.heap_dealloc(dp.rank(), dp.offset() as u32);
                        return true;
                    }
                    return self.finish_unlink(t_rank, t_offset, key, element.next);
                }
                previous = dp;
                dp = Locator::from_u64(element.next);
                if dp.is_null() {
                    return false;
                }
            }
        }
    }

    /// Re-walks from the table head looking for the node that *we*
    /// already soft-deleted (its `next` self-points), and repairs its
    /// predecessor's link to `next_hint`. A self-pointing node with a
    /// different key belongs to someone else's in-flight delete; that is
    /// just cause to restart the whole walk, not to give up.
    fn finish_unlink(&self, t_rank: u32, t_offset: u64, key: u64, next_hint: u64) -> bool {
        loop {
            let dp = self.table_get(t_rank, t_offset);
            if dp.is_null() {
                return false;
            }
            let element = self.heap_get(dp.rank(), dp.offset() as u32);
            if element.next == dp.as_u64() {
                if element.key != key {
                    continue;
                }
                let swap =
                    self.rma
                        .compare_and_swap_u64(WindowKind::IndexTable, t_rank, t_offset * 8, dp.as_u64(), next_hint);
                if swap == dp.as_u64() {
                    self.heap_dealloc(dp.rank(), dp.offset() as u32);
                    return true;
                }
                continue;
            }

            let mut previous = dp;
            let mut cursor = Locator::from_u64(element.next);
            if cursor.is_null() {
                return false;
            }
            loop {
                let e = self.heap_get(cursor.rank(), cursor.offset() as u32);
                if e.next == cursor.as_u64() {
                    if e.key != key {
                        break;
                    }
                    let swap = self.rma.compare_and_swap_u64(
                        WindowKind::IndexHeap,
                        previous.rank(),
                        previous.offset() * ELEMENT_BYTES + NEXT_OFFSET,
                        cursor.as_u64(),
                        next_hint,
                    );
                    if swap == cursor.as_u64() {
                        self.heap_dealloc(cursor.rank(), cursor.offset() as u32);
                        return true;
                    }
                    break;
                }
                previous = cursor;
                cursor = Locator::from_u64(e.next);
                if cursor.is_null() {
                    return false;
                }
            }
        }
    }
}
