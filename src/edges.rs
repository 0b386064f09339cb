//! Lightweight edge table: a per-vertex, block-structured array of
//! `(orientation, label, partner locator)` triples (§4.7).
//!
//! Slots are grouped into 80-byte blocks of 10 8-byte words: word 0 holds
//! 8 orientation bytes, word 1 holds 8 label bytes, words 2-9 hold the 8
//! partner locators. A slot's orientation byte of `0` marks it a
//! tombstone. New edges are always appended; tombstones are only
//! reclaimed by [`EdgeTable::shrink`], which runs once at commit.

use crate::locator::Locator;

/// Slots per 80-byte edge block.
pub const EDGE_SLOTS_PER_BLOCK: u32 = 8;
/// Bytes per edge block: 8 meta + 8 label + 8 * 8 locator bytes.
pub const EDGE_BLOCK_BYTES: u32 = 80;

const META_WORD_OFFSET: usize = 0;
const LABEL_WORD_OFFSET: usize = 8;
const LOCATOR_WORD_OFFSET: usize = 16;

/// Orientation bit: the edge points at this vertex.
pub const INCOMING: u8 = 1;
/// Orientation bit: the edge points away from this vertex.
pub const OUTGOING: u8 = 2;
/// Orientation bit: the edge has no direction.
pub const UNDIRECTED: u8 = 4;
/// All orientation bits set; used as a query mask matching any edge.
pub const ANY_ORIENTATION: u8 = INCOMING | OUTGOING | UNDIRECTED;

/// How a filter/count query restricts by label.
#[derive(Debug, Clone, Copy)]
pub enum LabelPolicy<'a> {
    /// No label restriction.
    Any,
    /// Only labels in this list match.
    Whitelist(&'a [u8]),
    /// Any label except those in this list match.
    Blacklist(&'a [u8]),
}

impl LabelPolicy<'_> {
    fn accepts(&self, label: u8) -> bool {
        match self {
            LabelPolicy::Any => true,
            LabelPolicy::Whitelist(list) => list.contains(&label),
            LabelPolicy::Blacklist(list) => !list.contains(&label),
        }
    }
}

/// A vertex's lightweight edge table.
#[derive(Debug, Clone, Default)]
pub struct EdgeTable {
    blocks: Vec<u8>,
    /// Index one past the highest slot ever written (includes tombstones
    /// not yet reclaimed by `shrink`).
    used_slots: u32,
}

fn block_base(slot: u32) -> usize {
    (slot / EDGE_SLOTS_PER_BLOCK) as usize * EDGE_BLOCK_BYTES as usize
}

fn in_block_index(slot: u32) -> usize {
    (slot % EDGE_SLOTS_PER_BLOCK) as usize
}

impl EdgeTable {
    /// An empty edge table.
    pub fn new() -> EdgeTable {
        EdgeTable { blocks: Vec::new(), used_slots: 0 }
    }

    /// Reconstructs a table from its on-block bytes plus the live edge
    /// count recorded in the vertex header (post-shrink, these coincide
    /// exactly: no tombstones survive a commit).
    pub fn from_bytes(bytes: Vec<u8>, num_live_edges: u32) -> EdgeTable {
        EdgeTable { blocks: bytes, used_slots: num_live_edges }
    }

    /// Raw bytes, sized to exactly `ceil(used_slots / 8)` blocks.
    pub fn as_bytes(&self) -> &[u8] {
        &self.blocks
    }

    /// Number of slots (live or tombstoned) ever written.
    pub fn used_slots(&self) -> u32 {
        self.used_slots
    }

    fn meta(&self, slot: u32) -> u8 {
        self.blocks[block_base(slot) + META_WORD_OFFSET + in_block_index(slot)]
    }

    fn set_meta(&mut self, slot: u32, value: u8) {
        self.blocks[block_base(slot) + META_WORD_OFFSET + in_block_index(slot)] = value;
    }

    fn label_byte(&self, slot: u32) -> u8 {
        self.blocks[block_base(slot) + LABEL_WORD_OFFSET + in_block_index(slot)]
    }

    fn set_label_byte(&mut self, slot: u32, value: u8) {
        self.blocks[block_base(slot) + LABEL_WORD_OFFSET + in_block_index(slot)] = value;
    }

    fn locator_bytes(&self, slot: u32) -> u64 {
        let start = block_base(slot) + LOCATOR_WORD_OFFSET + in_block_index(slot) * 8;
        u64::from_le_bytes(self.blocks[start..start + 8].try_into().unwrap())
    }

    fn set_locator_bytes(&mut self, slot: u32, value: u64) {
        let start = block_base(slot) + LOCATOR_WORD_OFFSET + in_block_index(slot) * 8;
        self.blocks[start..start + 8].copy_from_slice(&value.to_le_bytes());
    }

    /// Appends a new edge slot, growing the backing buffer by one block
    /// whenever the current one fills up. Returns the new slot's index.
    pub fn add(&mut self, orientation: u8, label: u8, partner: Locator) -> u32 {
        if self.used_slots % EDGE_SLOTS_PER_BLOCK == 0 {
            self.blocks.extend(std::iter::repeat(0u8).take(EDGE_BLOCK_BYTES as usize));
        }
        let slot = self.used_slots;
        self.set_meta(slot, orientation);
        self.set_label_byte(slot, label);
        self.set_locator_bytes(slot, partner.as_u64());
        self.used_slots += 1;
        slot
    }

    /// Tombstones `slot`. Returns whether it was live (a no-op repeat
    /// remove, or an out-of-range slot, returns `false`).
    pub fn remove(&mut self, slot: u32) -> bool {
        if slot >= self.used_slots || self.meta(slot) == 0 {
            return false;
        }
        self.set_meta(slot, 0);
        true
    }

    /// The `(orientation, partner)` pair at `slot`, or `None` if
    /// out-of-range or tombstoned.
    pub fn get(&self, slot: u32) -> Option<(u8, Locator)> {
        if slot >= self.used_slots || self.meta(slot) == 0 {
            return None;
        }
        Some((self.meta(slot), Locator::from_u64(self.locator_bytes(slot))))
    }

    /// The label at `slot`, or `None` if out-of-range or tombstoned.
    pub fn get_label(&self, slot: u32) -> Option<u8> {
        if slot >= self.used_slots || self.meta(slot) == 0 {
            return None;
        }
        Some(self.label_byte(slot))
    }

    /// Overwrites the orientation of a live edge.
    pub fn set_orientation(&mut self, slot: u32, orientation: u8) {
        debug_assert!(slot < self.used_slots && self.meta(slot) != 0, "updating a tombstoned edge");
        self.set_meta(slot, orientation);
    }

    /// Overwrites the partner locator of a live edge.
    pub fn set_partner(&mut self, slot: u32, partner: Locator) {
        debug_assert!(slot < self.used_slots && self.meta(slot) != 0, "updating a tombstoned edge");
        self.set_locator_bytes(slot, partner.as_u64());
    }

    /// Overwrites the label of a live edge.
    pub fn set_label(&mut self, slot: u32, label: u8) {
        debug_assert!(slot < self.used_slots && self.meta(slot) != 0, "updating a tombstoned edge");
        self.set_label_byte(slot, label);
    }

    fn matching_slots<'a>(
        &'a self,
        orientation_mask: u8,
        labels: LabelPolicy<'a>,
    ) -> impl Iterator<Item = u32> + 'a {
        (0..self.used_slots).filter(move |&slot| {
            let meta = self.meta(slot);
            meta & orientation_mask != 0 && labels.accepts(self.label_byte(slot))
        })
    }

    /// All live slots matching `orientation_mask` and `labels`, in
    /// storage order.
    pub fn filter(&self, orientation_mask: u8, labels: LabelPolicy<'_>) -> Vec<u32> {
        self.matching_slots(orientation_mask, labels).collect()
    }

    /// Count of live slots matching `orientation_mask` and `labels`.
    pub fn count(&self, orientation_mask: u8, labels: LabelPolicy<'_>) -> usize {
        self.matching_slots(orientation_mask, labels).count()
    }

    /// Locates a counterpart edge pointing back at `partner` with the
    /// flipped orientation (an outgoing edge on one end is incoming on
    /// the other; undirected edges match undirected) and matching
    /// `label`. `orientation` is the orientation as recorded on the
    /// *opposite* vertex; this searches `self`'s table (the partner's)
    /// for the corresponding entry.
    pub fn find(&self, orientation: u8, partner: Locator, label: u8) -> Option<u32> {
        let query = match orientation {
            UNDIRECTED => UNDIRECTED,
            INCOMING => OUTGOING,
            OUTGOING => INCOMING,
            _ => return None,
        };
        self.matching_slots(query, LabelPolicy::Any)
            .find(|&slot| self.label_byte(slot) == label && self.locator_bytes(slot) == partner.as_u64())
    }

    /// Two-pointer in-place compaction: copies live edges from the back
    /// over tombstoned slots from the front until the iterators cross,
    /// then truncates the buffer to exactly the blocks needed for the
    /// surviving count. Run once, at commit (§4.7).
    pub fn shrink(&mut self) {
        let mut forward = 0u32;
        let mut backward = self.used_slots;

        while forward < backward {
            while forward < backward && self.meta(forward) != 0 {
                forward += 1;
            }
            if forward == backward {
                break;
            }
            backward -= 1;
            while backward > forward && self.meta(backward) == 0 {
                backward -= 1;
            }
            if forward < backward {
                let meta = self.meta(backward);
                let label = self.label_byte(backward);
                let partner = self.locator_bytes(backward);
                self.set_meta(forward, meta);
                self.set_label_byte(forward, label);
                self.set_locator_bytes(forward, partner);
                self.set_meta(backward, 0);
                forward += 1;
            }
        }

        self.used_slots = forward;
        let live_blocks = (forward + EDGE_SLOTS_PER_BLOCK - 1) / EDGE_SLOTS_PER_BLOCK;
        self.blocks.truncate(live_blocks as usize * EDGE_BLOCK_BYTES as usize);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loc(offset: u64) -> Locator {
        Locator::pack(0, offset)
    }

    #[test]
    fn add_then_get_roundtrips() {
        let mut table = EdgeTable::new();
        let slot = table.add(OUTGOING, 3, loc(512));
        assert_eq!(table.get(slot), Some((OUTGOING, loc(512))));
        assert_eq!(table.get_label(slot), Some(3));
    }

    #[test]
    fn remove_tombstones_and_rejects_double_remove() {
        let mut table = EdgeTable::new();
        let slot = table.add(INCOMING, 0, loc(1));
        assert!(table.remove(slot));
        assert_eq!(table.get(slot), None);
        assert!(!table.remove(slot), "removing an already-tombstoned slot is a no-op");
    }

    #[test]
    fn grows_across_block_boundary() {
        let mut table = EdgeTable::new();
        for i in 0..9 {
            table.add(OUTGOING, 0, loc(i));
        }
        assert_eq!(table.as_bytes().len(), EDGE_BLOCK_BYTES as usize * 2);
        assert_eq!(table.get(8), Some((OUTGOING, loc(8))));
    }

    #[test]
    fn filter_respects_orientation_and_label_policies() {
        let mut table = EdgeTable::new();
        table.add(OUTGOING, 1, loc(1));
        table.add(INCOMING, 2, loc(2));
        table.add(UNDIRECTED, 1, loc(3));

        assert_eq!(table.filter(OUTGOING | UNDIRECTED, LabelPolicy::Any).len(), 2);
        assert_eq!(table.count(ANY_ORIENTATION, LabelPolicy::Whitelist(&[1])), 2);
        assert_eq!(table.count(ANY_ORIENTATION, LabelPolicy::Blacklist(&[1])), 1);
    }

    #[test]
    fn find_flips_orientation_to_match_partner_side() {
        let mut table = EdgeTable::new();
        table.add(INCOMING, 9, loc(42));
        assert_eq!(table.find(OUTGOING, loc(42), 9), Some(0));
        assert_eq!(table.find(INCOMING, loc(42), 9), None);
        assert_eq!(table.find(OUTGOING, loc(42), 1), None, "label must match too");
    }

    #[test]
    fn shrink_compacts_and_truncates_buffer() {
        let mut table = EdgeTable::new();
        let mut slots = Vec::new();
        for i in 0..12 {
            slots.push(table.add(OUTGOING, 0, loc(i)));
        }
        // Remove every third edge, scattering tombstones across both blocks.
        for &slot in slots.iter().step_by(3) {
            table.remove(slot);
        }
        let live_before: Vec<u64> = (0..table.used_slots())
            .filter_map(|s| table.get(s).map(|(_, l)| l.offset()))
            .collect();

        table.shrink();

        assert_eq!(table.used_slots(), live_before.len() as u32);
        assert_eq!(table.as_bytes().len(), EDGE_BLOCK_BYTES as usize, "8 survivors fit in one block");
        let live_after: Vec<u64> = (0..table.used_slots())
            .map(|s| table.get(s).unwrap().1.offset())
            .collect();
        assert_eq!(live_after, live_before, "shrink preserves relative order of survivors");
    }

    #[test]
    fn shrink_to_empty_truncates_to_zero_blocks() {
        let mut table = EdgeTable::new();
        let slot = table.add(OUTGOING, 0, loc(7));
        table.remove(slot);
        table.shrink();
        assert_eq!(table.used_slots(), 0);
        assert_eq!(table.as_bytes().len(), 0);
    }
}
