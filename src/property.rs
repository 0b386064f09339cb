//! Property list: a linked sequence of `[handle | size | bytes]` records
//! holding labels and typed properties, with in-place merge of free
//! holes (§4.6).
//!
//! Record layout (metadata is [`METADATA_BYTES`] = 5 bytes):
//!   - `handle: u8` — [`EMPTY`], [`LAST`], [`LABEL`], [`ID`], or a
//!     registry-assigned user property-type handle (`>= FIRST_USER_HANDLE`);
//!   - `size: u32` — payload byte length (§3/O1: chosen as a 32-bit field,
//!     wide enough for any in-memory payload while keeping metadata
//!     compact; the original implementation left this width an open
//!     question between 8 and 64 bits);
//!   - `size` bytes of payload.
//!
//! The buffer always ends with a `LAST` record (payload-less, a
//! terminator, never itself coalesced away).

use crate::error::ErrorKind;

/// Bytes of metadata (handle + size field) preceding every record's payload.
pub const METADATA_BYTES: usize = 1 + 4;

/// Free hole, reusable or coalesced with its neighbors.
pub const EMPTY: u8 = 0;
/// Terminator; always the final record in the buffer.
pub const LAST: u8 = 1;
/// A vertex label membership record; payload is the label's `u8` handle.
pub const LABEL: u8 = 2;
/// The vertex's external identifier; payload is caller-supplied bytes.
pub const ID: u8 = 3;
/// First handle value available for registry-assigned property types.
pub const FIRST_USER_HANDLE: u8 = 4;

/// Whether a property type allows at most one value per vertex
/// (`SINGLE_ENTITY`) or many distinct values (`MULTIPLE_ENTITY`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entity {
    /// At most one stored value for this handle.
    Single,
    /// Any number of distinct stored values for this handle.
    Multiple,
}

/// A linear-scan property list over an in-memory buffer.
#[derive(Debug, Clone)]
pub struct PropertyList {
    buf: Vec<u8>,
    unused_bytes: u64,
}

struct Record {
    offset: usize,
    handle: u8,
    size: u32,
}

impl Record {
    fn payload_start(&self) -> usize {
        self.offset + METADATA_BYTES
    }
    fn payload_end(&self) -> usize {
        self.payload_start() + self.size as usize
    }
    fn footprint(&self) -> usize {
        METADATA_BYTES + self.size as usize
    }
}

fn read_record(buf: &[u8], offset: usize) -> Record {
    let handle = buf[offset];
    let size = u32::from_le_bytes(buf[offset + 1..offset + 5].try_into().unwrap());
    Record { offset, handle, size }
}

fn write_record_header(buf: &mut [u8], offset: usize, handle: u8, size: u32) {
    buf[offset] = handle;
    buf[offset + 1..offset + 5].copy_from_slice(&size.to_le_bytes());
}

impl PropertyList {
    /// An empty list: just the `LAST` terminator.
    pub fn new() -> PropertyList {
        let mut buf = vec![0u8; METADATA_BYTES];
        write_record_header(&mut buf, 0, LAST, 0);
        PropertyList { buf, unused_bytes: 0 }
    }

    /// Reconstructs a property list from its raw on-block payload bytes.
    pub fn from_bytes(bytes: Vec<u8>) -> PropertyList {
        let mut list = PropertyList { buf: bytes, unused_bytes: 0 };
        list.unused_bytes = list.scan_unused_bytes();
        list
    }

    /// The raw bytes backing this list, as persisted in a vertex segment.
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    /// Total payload bytes, matching the header's `property_bytes` field.
    pub fn byte_len(&self) -> u64 {
        self.buf.len() as u64
    }

    /// Sum of the sizes of all `EMPTY` records (P6).
    pub fn unused_bytes(&self) -> u64 {
        self.unused_bytes
    }

    fn scan_unused_bytes(&self) -> u64 {
        let mut total = 0u64;
        let mut offset = 0;
        loop {
            let record = read_record(&self.buf, offset);
            if record.handle == LAST {
                break;
            }
            if record.handle == EMPTY {
                total += record.size as u64;
            }
            offset = record.payload_end();
        }
        total
    }

    fn records(&self) -> RecordIter<'_> {
        RecordIter { buf: &self.buf, offset: 0, done: false }
    }

    /// Adds a new record with the given `handle` and `value` bytes.
    ///
    /// Returns [`ErrorKind::PropertyTypeExists`] if `entity` is
    /// [`Entity::Single`] and a record with this handle already exists
    /// (used for both `SINGLE_ENTITY` property types and the ID
    /// property). Returns [`ErrorKind::PropertyExists`] if `entity` is
    /// [`Entity::Multiple`] and an exact-duplicate record already exists
    /// (e.g. adding the same label twice, R2).
    pub fn add(&mut self, handle: u8, value: &[u8], entity: Entity) -> Result<(), ErrorKind> {
        if value.len() > u32::MAX as usize {
            return Err(ErrorKind::Size);
        }
        for record in self.records() {
            if record.handle != handle {
                continue;
            }
            match entity {
                Entity::Single => return Err(ErrorKind::PropertyTypeExists),
                Entity::Multiple => {
                    let payload = &self.buf[record.payload_start()..record.payload_end()];
                    if payload == value {
                        return Err(ErrorKind::PropertyExists);
                    }
                }
            }
        }
        self.insert_record(handle, value);
        Ok(())
    }

    /// Idempotent label add: unlike [`PropertyList::add`], adding a label
    /// already present is a successful no-op (R2) rather than an error.
    pub fn add_label_idempotent(&mut self, label_handle: u8) {
        match self.add(LABEL, &[label_handle], Entity::Multiple) {
            Ok(()) | Err(ErrorKind::PropertyExists) => {}
            Err(_) => unreachable!("label payload never overflows u32"),
        }
    }

    fn insert_record(&mut self, handle: u8, value: &[u8]) {
        let needed = value.len() as u32;

        // Reuse the first sufficiently large EMPTY hole.
        let mut offset = 0;
        loop {
            let record = read_record(&self.buf, offset);
            if record.handle == LAST {
                break;
            }
            if record.handle == EMPTY && record.size >= needed {
                let leftover = record.size - needed;
                // A leftover too small to host its own record's metadata
                // can't be carved off as a separate hole without either
                // inflating this record's logical size past `value`'s
                // actual length or leaving unaccounted bytes in the
                // stream; skip such holes and keep looking.
                if leftover == 0 || leftover >= METADATA_BYTES as u32 {
                    self.occupy_hole(offset, handle, value);
                    return;
                }
            }
            offset = record.payload_end();
        }

        // No hole fits: extend the buffer in place of LAST, then re-terminate.
        let last = self.records().find(|r| r.handle == LAST).expect("LAST always present");
        let last_offset = last.offset;
        let mut new_tail = Vec::with_capacity(METADATA_BYTES + value.len() + METADATA_BYTES);
        new_tail.push(handle);
        new_tail.extend_from_slice(&needed.to_le_bytes());
        new_tail.extend_from_slice(value);
        new_tail.push(LAST);
        new_tail.extend_from_slice(&0u32.to_le_bytes());
        self.buf.truncate(last_offset);
        self.buf.extend_from_slice(&new_tail);
    }

    /// Splits an existing `EMPTY` hole at `offset`: writes the new record
    /// at its start and, if leftover space remains, a smaller trailing
    /// `EMPTY` hole after it. Callers only pass holes whose leftover is
    /// `0` or at least `METADATA_BYTES` (see `insert_record`), so the
    /// leftover always either vanishes exactly or hosts its own record.
    fn occupy_hole(&mut self, offset: usize, handle: u8, value: &[u8]) {
        let hole = read_record(&self.buf, offset);
        debug_assert_eq!(hole.handle, EMPTY);
        let leftover = hole.size - value.len() as u32;
        debug_assert!(leftover == 0 || leftover >= METADATA_BYTES as u32);
        self.unused_bytes -= hole.size as u64;

        write_record_header(&mut self.buf, offset, handle, value.len() as u32);
        self.buf[offset + METADATA_BYTES..offset + METADATA_BYTES + value.len()].copy_from_slice(value);

        if leftover >= METADATA_BYTES as u32 {
            let hole_offset = offset + METADATA_BYTES + value.len();
            let hole_payload = leftover - METADATA_BYTES as u32;
            write_record_header(&mut self.buf, hole_offset, EMPTY, hole_payload);
            self.unused_bytes += hole_payload as u64;
        }
    }

    /// Removes every record with `handle`, coalescing each removal with
    /// its neighbors. Returns whether anything was found.
    pub fn remove_all(&mut self, handle: u8) -> bool {
        let mut found = false;
        loop {
            let target = self.records().find(|r| r.handle == handle);
            match target {
                Some(r) => {
                    self.erase_record(r.offset);
                    found = true;
                }
                None => break,
            }
        }
        found
    }

    /// Removes the single record with `handle` whose payload equals
    /// `value`. Returns whether it was found.
    pub fn remove_specific(&mut self, handle: u8, value: &[u8]) -> bool {
        let target = self
            .records()
            .find(|r| r.handle == handle && &self.buf[r.payload_start()..r.payload_end()] == value);
        match target {
            Some(r) => {
                self.erase_record(r.offset);
                true
            }
            None => false,
        }
    }

    /// Coalescing removal: marks the record at `offset` `EMPTY`, then
    /// merges with a preceding `EMPTY` record and/or an immediately
    /// following `EMPTY`/`LAST` record, per §4.6's rule.
    fn erase_record(&mut self, offset: usize) {
        let record = read_record(&self.buf, offset);
        let removed_footprint = record.footprint();

        // Find the previous record by scanning from the start (the list
        // is singly-linked via offsets, not back-pointers).
        let prev_offset = self.records().take_while(|r| r.offset < offset).last().map(|r| r.offset);

        let next_offset = record.payload_end();
        let next = read_record(&self.buf, next_offset);

        self.unused_bytes += record.size as u64;

        match (prev_offset, next.handle) {
            (Some(p), _) if read_record(&self.buf, p).handle == EMPTY => {
                // Merge into the previous EMPTY record, possibly also
                // absorbing a following EMPTY/LAST in the same pass.
                let prev = read_record(&self.buf, p);
                self.unused_bytes -= prev.size as u64;
                if next.handle == LAST {
                    // Previous + removed collapse into LAST.
                    write_record_header(&mut self.buf, p, LAST, 0);
                    self.unused_bytes -= record.size as u64;
                    self.buf.truncate(p + METADATA_BYTES);
                } else if next.handle == EMPTY {
                    self.unused_bytes -= next.size as u64;
                    let merged = prev.size as u64 + removed_footprint as u64 + next.size as u64;
                    write_record_header(&mut self.buf, p, EMPTY, merged as u32);
                    self.unused_bytes += merged;
                } else {
                    let merged = prev.size as u64 + removed_footprint as u64;
                    write_record_header(&mut self.buf, p, EMPTY, merged as u32);
                    self.unused_bytes += merged;
                }
            }
            _ if next.handle == LAST => {
                // Removed record collapses directly into LAST.
                write_record_header(&mut self.buf, offset, LAST, 0);
                self.unused_bytes -= record.size as u64;
                self.buf.truncate(offset + METADATA_BYTES);
            }
            _ if next.handle == EMPTY => {
                self.unused_bytes -= next.size as u64;
                let merged = removed_footprint as u64 + next.size as u64;
                write_record_header(&mut self.buf, offset, EMPTY, merged as u32);
                self.unused_bytes += merged;
            }
            _ => {
                write_record_header(&mut self.buf, offset, EMPTY, record.size);
            }
        }
    }

    /// Removes then re-inserts a `Single`-entity record (ID properties,
    /// single-valued property types).
    pub fn update_single(&mut self, handle: u8, value: &[u8]) -> Result<(), ErrorKind> {
        if !self.remove_all_single(handle) {
            return Err(ErrorKind::NoProperty);
        }
        self.insert_record(handle, value);
        Ok(())
    }

    fn remove_all_single(&mut self, handle: u8) -> bool {
        self.remove_all(handle)
    }

    /// Removes then re-inserts a specific `Multiple`-entity record.
    pub fn update_specific(&mut self, handle: u8, old_value: &[u8], new_value: &[u8]) -> Result<(), ErrorKind> {
        if self.records().any(|r| {
            r.handle == handle && &self.buf[r.payload_start()..r.payload_end()] == new_value
        }) {
            return Err(ErrorKind::PropertyExists);
        }
        if !self.remove_specific(handle, old_value) {
            return Err(ErrorKind::NoProperty);
        }
        self.insert_record(handle, new_value);
        Ok(())
    }

    /// Number of distinct labels stored.
    pub fn num_labels(&self) -> usize {
        self.records().filter(|r| r.handle == LABEL).count()
    }

    /// All stored label handles, in storage order.
    pub fn labels(&self) -> Vec<u8> {
        self.records()
            .filter(|r| r.handle == LABEL)
            .map(|r| self.buf[r.payload_start()])
            .collect()
    }

    /// Whether `label` is present.
    pub fn has_label(&self, label: u8) -> bool {
        self.labels().contains(&label)
    }

    /// Number of distinct user property-type handles with at least one value.
    pub fn num_property_types(&self) -> usize {
        self.property_types().len()
    }

    /// Distinct user property-type handles with at least one value, in
    /// first-occurrence order.
    pub fn property_types(&self) -> Vec<u8> {
        let mut seen = Vec::new();
        for r in self.records() {
            if r.handle >= FIRST_USER_HANDLE && !seen.contains(&r.handle) {
                seen.push(r.handle);
            }
        }
        seen
    }

    /// Number of stored values for `handle` (properties or the ID), and
    /// their total payload byte count.
    pub fn num_properties(&self, handle: u8) -> (usize, usize) {
        let mut count = 0;
        let mut bytes = 0;
        for r in self.records().filter(|r| r.handle == handle) {
            count += 1;
            bytes += r.size as usize;
        }
        (count, bytes)
    }

    /// All stored payloads for `handle`, in storage order.
    pub fn properties(&self, handle: u8) -> Vec<Vec<u8>> {
        self.records()
            .filter(|r| r.handle == handle)
            .map(|r| self.buf[r.payload_start()..r.payload_end()].to_vec())
            .collect()
    }
}

impl Default for PropertyList {
    fn default() -> Self {
        PropertyList::new()
    }
}

struct RecordIter<'a> {
    buf: &'a [u8],
    offset: usize,
    done: bool,
}

impl<'a> Iterator for RecordIter<'a> {
    type Item = Record;
    fn next(&mut self) -> Option<Record> {
        if self.done {
            return None;
        }
        let record = read_record(self.buf, self.offset);
        if record.handle == LAST {
            self.done = true;
            return None;
        }
        self.offset = record.payload_end();
        Some(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PTYPE_A: u8 = FIRST_USER_HANDLE;
    const PTYPE_B: u8 = FIRST_USER_HANDLE + 1;

    #[test]
    fn new_list_is_just_last() {
        let list = PropertyList::new();
        assert_eq!(list.unused_bytes(), 0);
        assert_eq!(list.num_labels(), 0);
    }

    #[test]
    fn add_then_remove_specific_restores_initial_state_r1() {
        let mut list = PropertyList::new();
        let before = list.as_bytes().to_vec();
        list.add(PTYPE_A, &7u32.to_le_bytes(), Entity::Single).unwrap();
        assert!(list.remove_specific(PTYPE_A, &7u32.to_le_bytes()));
        assert_eq!(list.as_bytes(), &before[..]);
        assert_eq!(list.unused_bytes(), 0);
    }

    #[test]
    fn single_entity_rejects_second_add() {
        let mut list = PropertyList::new();
        list.add(PTYPE_A, b"x", Entity::Single).unwrap();
        assert_eq!(list.add(PTYPE_A, b"y", Entity::Single), Err(ErrorKind::PropertyTypeExists));
    }

    #[test]
    fn multiple_entity_rejects_exact_duplicate_only() {
        let mut list = PropertyList::new();
        list.add(PTYPE_A, b"x", Entity::Multiple).unwrap();
        assert_eq!(list.add(PTYPE_A, b"x", Entity::Multiple), Err(ErrorKind::PropertyExists));
        assert!(list.add(PTYPE_A, b"y", Entity::Multiple).is_ok());
    }

    #[test]
    fn add_label_idempotent_r2() {
        let mut list = PropertyList::new();
        list.add_label_idempotent(5);
        list.add_label_idempotent(5);
        assert_eq!(list.labels(), vec![5]);
        assert!(!list.remove_all(99)); // removing absent label is a no-op
    }

    #[test]
    fn num_properties_matches_properties_size_trick_p8() {
        let mut list = PropertyList::new();
        list.add(PTYPE_A, b"x", Entity::Multiple).unwrap();
        list.add(PTYPE_A, b"yy", Entity::Multiple).unwrap();
        list.add(PTYPE_A, b"zzz", Entity::Multiple).unwrap();

        let (count, bytes) = list.num_properties(PTYPE_A);
        let values = list.properties(PTYPE_A);
        assert_eq!(count, values.len(), "zero-buffer count must match the real call's length");
        assert_eq!(
            bytes,
            values.iter().map(|v| v.len()).sum::<usize>(),
            "zero-buffer byte total must match the real call's payload size"
        );
    }

    #[test]
    fn unused_bytes_accounting_p6() {
        let mut list = PropertyList::new();
        list.add(PTYPE_A, b"aaaa", Entity::Single).unwrap();
        list.add(PTYPE_B, b"bbbb", Entity::Single).unwrap();
        assert_eq!(list.unused_bytes(), 0);
        assert!(list.remove_all(PTYPE_A));
        assert_eq!(list.unused_bytes(), 4);
        assert!(list.remove_all(PTYPE_B));
        assert_eq!(list.unused_bytes(), 0, "removing the last record collapses into LAST");
    }

    #[test]
    fn coalesces_with_both_neighbors() {
        let mut list = PropertyList::new();
        list.add(PTYPE_A, b"1111", Entity::Multiple).unwrap();
        list.add(PTYPE_A, b"2222", Entity::Multiple).unwrap();
        list.add(PTYPE_A, b"3333", Entity::Multiple).unwrap();
        assert!(list.remove_specific(PTYPE_A, b"1111"));
        assert!(list.remove_specific(PTYPE_A, b"3333"));
        assert_eq!(list.unused_bytes(), 8);
        assert!(list.remove_specific(PTYPE_A, b"2222"));
        assert_eq!(list.unused_bytes(), 0, "removing the middle record merges both holes away");
    }

    #[test]
    fn reuses_holes_before_growing() {
        let mut list = PropertyList::new();
        list.add(PTYPE_A, b"aaaaaaaa", Entity::Single).unwrap();
        let grown_len = list.byte_len();
        list.remove_all(PTYPE_A);
        list.add(PTYPE_B, b"bb", Entity::Single).unwrap();
        assert_eq!(list.byte_len(), grown_len, "reused the hole instead of growing");
    }

    #[test]
    fn update_specific_rejects_duplicate_new_value() {
        let mut list = PropertyList::new();
        list.add(PTYPE_A, b"one", Entity::Multiple).unwrap();
        list.add(PTYPE_A, b"two", Entity::Multiple).unwrap();
        assert_eq!(
            list.update_specific(PTYPE_A, b"one", b"two"),
            Err(ErrorKind::PropertyExists)
        );
    }

    #[test]
    fn update_single_requires_existing_value() {
        let mut list = PropertyList::new();
        assert_eq!(list.update_single(PTYPE_A, b"x"), Err(ErrorKind::NoProperty));
        list.add(PTYPE_A, b"x", Entity::Single).unwrap();
        assert!(list.update_single(PTYPE_A, b"y").is_ok());
        assert_eq!(list.properties(PTYPE_A), vec![b"y".to_vec()]);
    }

    #[test]
    fn from_bytes_reconstructs_unused_bytes() {
        let mut list = PropertyList::new();
        list.add(PTYPE_A, b"aaaa", Entity::Single).unwrap();
        list.add(PTYPE_B, b"bbbb", Entity::Single).unwrap();
        list.remove_all(PTYPE_A);
        let bytes = list.as_bytes().to_vec();
        let reloaded = PropertyList::from_bytes(bytes);
        assert_eq!(reloaded.unused_bytes(), 4);
    }
}
