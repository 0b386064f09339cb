//! In-transaction mirrors of vertices and edges: an editable, process-local
//! copy of a vertex's property list, label set, lightweight edge table, and
//! block list, plus the bookkeeping a transaction needs to commit or abort
//! it (§4.10, grounded in `gdi_vertex.c`'s `GDI_VertexHolder` accessors).
//!
//! Registry validation, lock acquisition, and index maintenance are the
//! transaction engine's job ([`crate::transaction`]); this module only
//! edits the in-memory mirror and tracks which edits happened.

use crate::edges::{EdgeTable, LabelPolicy, ANY_ORIENTATION, INCOMING, OUTGOING};
use crate::error::ErrorKind;
use crate::locator::Locator;
use crate::lock::LockState;
use crate::property::{Entity, PropertyList, ID, LABEL};

/// A vertex's in-transaction working copy.
#[derive(Debug, Clone)]
pub struct VertexHolder {
    /// The vertex's primary block locator; doubles as its UID.
    pub locator: Locator,
    /// Overflow blocks beyond the primary one, in order.
    pub overflow_blocks: Vec<Locator>,
    /// The lock currently held on this vertex by this transaction.
    pub lock_state: LockState,
    /// Incarnation observed when the lock was acquired (for translation
    /// validation and index staleness checks, I5).
    pub incarnation: u32,
    /// True if this holder was created by `create_vertex` in this
    /// transaction (never existed on any peer before).
    pub created: bool,
    /// True if `free_vertex` was called on this holder.
    pub deleted: bool,
    /// True if any field has changed and must be persisted at commit.
    pub written: bool,
    properties: PropertyList,
    edges: EdgeTable,
}

impl VertexHolder {
    /// A brand-new vertex occupying a freshly allocated, as-yet-invisible
    /// primary block. `incarnation` is whatever [`crate::lock::set_write_on_fresh_block`]
    /// observed on the block's lock word — a reused block carries forward
    /// the incarnation left by its previous occupant's deletion (P4), so
    /// this must not be assumed to be `0`.
    pub fn new_created(locator: Locator, incarnation: u32) -> VertexHolder {
        VertexHolder {
            locator,
            overflow_blocks: Vec::new(),
            lock_state: LockState::Write,
            incarnation,
            created: true,
            deleted: false,
            written: true,
            properties: PropertyList::new(),
            edges: EdgeTable::new(),
        }
    }

    /// An existing vertex, reconstructed from its fetched segment.
    pub fn from_segment(
        locator: Locator,
        overflow_blocks: Vec<Locator>,
        lock_state: LockState,
        incarnation: u32,
        properties: PropertyList,
        edges: EdgeTable,
    ) -> VertexHolder {
        VertexHolder {
            locator,
            overflow_blocks,
            lock_state,
            incarnation,
            created: false,
            deleted: false,
            written: false,
            properties,
            edges,
        }
    }

    /// Read-only access to the property list, for serialization at commit.
    pub fn properties(&self) -> &PropertyList {
        &self.properties
    }

    /// Read-only access to the edge table, for serialization at commit.
    pub fn edges(&self) -> &EdgeTable {
        &self.edges
    }

    /// Mutable access to the edge table, used by the transaction engine
    /// when tearing down a deleted vertex's partner edges.
    pub fn edges_mut(&mut self) -> &mut EdgeTable {
        &mut self.edges
    }

    /// The vertex's external ID bytes, if one was set at creation.
    pub fn external_id(&self) -> Option<Vec<u8>> {
        self.properties.properties(ID).into_iter().next()
    }

    /// Sets the external ID at creation time. Internal: called once by
    /// `create_vertex`, bypassing the usual write-lock dance since a
    /// freshly created vertex is always already write-locked.
    pub fn set_external_id(&mut self, value: &[u8]) {
        self.properties
            .add(ID, value, Entity::Single)
            .expect("a freshly created vertex has no ID yet");
    }

    /// Adds `label`, if not already present (R2: repeat adds are a
    /// successful no-op). Returns whether it was newly inserted.
    pub fn add_label(&mut self, label: u8) -> bool {
        if self.properties.has_label(label) {
            return false;
        }
        self.properties
            .add(LABEL, &[label], Entity::Multiple)
            .expect("label just checked absent");
        self.written = true;
        true
    }

    /// Removes `label`. Returns whether it had been present.
    pub fn remove_label(&mut self, label: u8) -> bool {
        let removed = self.properties.remove_specific(LABEL, &[label]);
        if removed {
            self.written = true;
        }
        removed
    }

    /// All labels on this vertex.
    pub fn labels(&self) -> Vec<u8> {
        self.properties.labels()
    }

    /// Number of labels on this vertex.
    pub fn num_labels(&self) -> usize {
        self.properties.num_labels()
    }

    /// Adds a property value. `Ok(true)` if inserted; `Ok(false)` if a
    /// [`Entity::Multiple`] duplicate made this a no-op (not an error at
    /// this layer, mirroring `GDI_AddPropertyToVertex`'s demotion of
    /// `PropertyExists`).
    pub fn add_property(&mut self, handle: u8, value: &[u8], entity: Entity) -> Result<bool, ErrorKind> {
        match self.properties.add(handle, value, entity) {
            Ok(()) => {
                self.written = true;
                Ok(true)
            }
            Err(ErrorKind::PropertyExists) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Removes every value stored under `handle`. Returns whether
    /// anything was found.
    pub fn remove_properties(&mut self, handle: u8) -> bool {
        let found = self.properties.remove_all(handle);
        if found {
            self.written = true;
        }
        found
    }

    /// Removes a single matching value stored under `handle`.
    pub fn remove_specific_property(&mut self, handle: u8, value: &[u8]) -> bool {
        let found = self.properties.remove_specific(handle, value);
        if found {
            self.written = true;
        }
        found
    }

    /// Replaces the sole value of a `SINGLE_ENTITY` property type.
    pub fn update_single_property(&mut self, handle: u8, value: &[u8]) -> Result<(), ErrorKind> {
        self.properties.update_single(handle, value)?;
        self.written = true;
        Ok(())
    }

    /// Replaces one matching value of a `MULTIPLE_ENTITY` property type.
    pub fn update_specific_property(&mut self, handle: u8, old: &[u8], new: &[u8]) -> Result<(), ErrorKind> {
        self.properties.update_specific(handle, old, new)?;
        self.written = true;
        Ok(())
    }

    /// Unconditionally sets a `SINGLE_ENTITY` property's value (removing
    /// any prior value first). Always marks the vertex written, mirroring
    /// `GDI_SetPropertyOfVertex`.
    pub fn set_single_property(&mut self, handle: u8, value: &[u8]) {
        self.properties.remove_all(handle);
        self.properties
            .add(handle, value, Entity::Single)
            .expect("prior value for this handle was just removed");
        self.written = true;
    }

    /// Number of stored values and their combined byte length for `handle`.
    pub fn num_properties(&self, handle: u8) -> (usize, usize) {
        self.properties.num_properties(handle)
    }

    /// All stored values for `handle`.
    pub fn properties_of(&self, handle: u8) -> Vec<Vec<u8>> {
        self.properties.properties(handle)
    }

    /// Distinct user property-type handles with at least one value.
    pub fn property_type_handles(&self) -> Vec<u8> {
        self.properties.property_types()
    }

    /// Count of live edges matching `orientation_mask`/`labels`
    /// (§4.7, backs the read-only `DEGREE`/`INDEGREE`/`OUTDEGREE`
    /// properties, computed on the fly rather than stored).
    pub fn degree(&self, orientation_mask: u8, labels: LabelPolicy<'_>) -> u64 {
        self.edges.count(orientation_mask, labels) as u64
    }

    /// Convenience: total degree, ignoring direction and label.
    pub fn total_degree(&self) -> u64 {
        self.degree(ANY_ORIENTATION, LabelPolicy::Any)
    }

    /// Convenience: in-degree.
    pub fn in_degree(&self) -> u64 {
        self.degree(INCOMING, LabelPolicy::Any)
    }

    /// Convenience: out-degree.
    pub fn out_degree(&self) -> u64 {
        self.degree(OUTGOING, LabelPolicy::Any)
    }

    /// Marks this vertex for deletion (the transaction engine is
    /// responsible for tearing down partner edges and releasing the
    /// lock at commit).
    pub fn mark_deleted(&mut self) {
        self.deleted = true;
        self.written = true;
    }
}

/// A transaction-local handle on one lightweight edge row, tracking both
/// sides of the pair so deletion/teardown can find the partner slot
/// without a fresh table scan (mirrors the `edges` list hung off
/// `GDI_VertexHolder` in the original implementation).
#[derive(Debug, Clone, Copy)]
pub struct EdgeHolder {
    /// The vertex whose table row this handle names.
    pub vertex: Locator,
    /// That row's slot index.
    pub slot: u32,
    /// The partner vertex.
    pub other_vertex: Locator,
    /// The partner's mirrored row's slot index.
    pub other_slot: u32,
    /// Orientation as recorded in `vertex`'s row.
    pub orientation: u8,
    /// The edge's label.
    pub label: u8,
    /// True once either side's row has been tombstoned.
    pub deleted: bool,
}

impl EdgeHolder {
    /// Marks both sides of the pair deleted; the caller still owns
    /// tombstoning the actual table rows via the owning vertex holders.
    pub fn mark_deleted(&mut self) {
        self.deleted = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loc(offset: u64) -> Locator {
        Locator::pack(0, offset)
    }

    #[test]
    fn created_vertex_starts_write_locked_and_dirty() {
        let v = VertexHolder::new_created(loc(0), 0);
        assert_eq!(v.lock_state, LockState::Write);
        assert!(v.created);
        assert!(v.written);
    }

    #[test]
    fn add_label_is_idempotent_r2() {
        let mut v = VertexHolder::new_created(loc(0), 0);
        assert!(v.add_label(5));
        assert!(!v.add_label(5), "second add reports not-newly-inserted");
        assert_eq!(v.labels(), vec![5]);
    }

    #[test]
    fn set_single_property_always_marks_written() {
        let mut v = VertexHolder::new_created(loc(0), 0);
        v.written = false;
        v.set_single_property(10, b"a");
        assert!(v.written);
        v.written = false;
        v.set_single_property(10, b"b");
        assert_eq!(v.properties_of(10), vec![b"b".to_vec()]);
        assert!(v.written);
    }

    #[test]
    fn degree_reads_through_to_edge_table() {
        let mut v = VertexHolder::new_created(loc(0), 0);
        v.edges_mut().add(OUTGOING, 0, loc(8));
        v.edges_mut().add(INCOMING, 0, loc(16));
        assert_eq!(v.out_degree(), 1);
        assert_eq!(v.in_degree(), 1);
        assert_eq!(v.total_degree(), 2);
    }
}
