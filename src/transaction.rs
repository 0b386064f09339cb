//! Transaction lifecycle: start, associate, mutate, commit/abort (§4.10),
//! grounded in `gdi_transaction.c`/`gdi_vertex.c`/`gdi_edge.c`.
//!
//! A [`Transaction`] owns every [`VertexHolder`] and [`EdgeHolder`] it
//! touches; both live only as long as the transaction (§9 "pointer graphs
//! replaced by locator+index"). On `close`, every held lock is released
//! and every holder is dropped together, matching the original's
//! per-transaction arena. Dropping a `Transaction` without calling
//! `close` aborts it (§9's RAII requirement): no acquired lock, no
//! speculatively allocated block, survives a dropped transaction.

use ahash::AHashMap;
use tracing::{instrument, trace, warn};

use crate::database::Database;
use crate::edges::{INCOMING, OUTGOING, UNDIRECTED};
use crate::error::ErrorKind;
use crate::holder::{EdgeHolder, VertexHolder};
use crate::layout::{self, VertexHeader, VERTEX_HEADER_BYTES};
use crate::locator::Locator;
use crate::lock::{self, LockResult, LockState};
use crate::property::PropertyList;
use crate::registry::LABEL_NONE;

/// Whether a transaction is a single-process read/write transaction or a
/// cluster-wide, read-only collective transaction (§3/§5).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionKind {
    /// Ordinary read/write transaction run by one process.
    Single,
    /// Read-only, barrier-delimited transaction run by every peer.
    Collective,
}

/// How a transaction's `close` call should resolve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseMode {
    /// Persist all changes.
    Commit,
    /// Discard all changes.
    Abort,
}

/// A single-process or collective transaction in progress.
///
/// Mutating calls (`create_vertex`, `add_label`, …) live as inherent
/// methods that take `&mut self`, mirroring the C API's `GDI_*(…,
/// transaction)` entry points, but expressed as methods so the borrow
/// checker enforces "one transaction touches its own holders" for us.
#[derive(Debug)]
pub struct Transaction<'db> {
    db: &'db Database,
    kind: TransactionKind,
    write: bool,
    critical: bool,
    closed: bool,
    vertices: Vec<VertexHolder>,
    edges: Vec<EdgeHolder>,
    key_to_index: AHashMap<Locator, usize>,
}

impl<'db> Transaction<'db> {
    pub(crate) fn new_single(db: &'db Database) -> Transaction<'db> {
        Transaction {
            db,
            kind: TransactionKind::Single,
            write: false,
            critical: false,
            closed: false,
            vertices: Vec::new(),
            edges: Vec::new(),
            key_to_index: AHashMap::new(),
        }
    }

    pub(crate) fn new_collective(db: &'db Database) -> Transaction<'db> {
        Transaction {
            db,
            kind: TransactionKind::Collective,
            write: false,
            critical: false,
            closed: false,
            vertices: Vec::new(),
            edges: Vec::new(),
            key_to_index: AHashMap::new(),
        }
    }

    /// The transaction's kind.
    pub fn kind(&self) -> TransactionKind {
        self.kind
    }

    /// Whether a failed remote operation has latched this transaction
    /// into an unrecoverable state (§7, tier 2). Once set, every
    /// subsequent mutating/read call returns
    /// [`ErrorKind::TransactionCritical`]; the only valid next step is
    /// `close(Abort)`.
    pub fn is_critical(&self) -> bool {
        self.critical
    }

    fn check_usable(&self) -> Result<(), ErrorKind> {
        if self.critical {
            return Err(ErrorKind::TransactionCritical);
        }
        Ok(())
    }

    fn check_writable(&self) -> Result<(), ErrorKind> {
        self.check_usable()?;
        if self.kind == TransactionKind::Collective {
            return Err(ErrorKind::ReadOnlyTransaction);
        }
        Ok(())
    }

    fn mark_critical(&mut self) {
        warn!("transaction latched critical");
        self.critical = true;
    }

    /// Creates a brand-new vertex on the local peer, optionally carrying
    /// an external ID. Fails with [`ErrorKind::NoMemory`] if every peer
    /// is out of blocks (B2).
    #[instrument(skip(self, external_id))]
    pub fn create_vertex(&mut self, external_id: Option<&[u8]>) -> Result<usize, ErrorKind> {
        self.check_writable()?;

        let locator = self.db.blocks.allocate(self.db.rank());
        if locator.is_null() {
            return Err(ErrorKind::NoMemory);
        }
        let incarnation = lock::set_write_on_fresh_block(&self.db.blocks, locator);

        let mut holder = VertexHolder::new_created(locator, incarnation);
        if let Some(id) = external_id {
            holder.set_external_id(id);
        }
        self.write = true;
        let index = self.vertices.len();
        self.key_to_index.insert(locator, index);
        self.vertices.push(holder);
        trace!(?locator, "created vertex");
        Ok(index)
    }

    /// Associates an existing vertex with this transaction: acquires a
    /// read lock and fetches its segment over RMA, reconstructing the
    /// holder (§4.10). Returns the holder's index within this
    /// transaction; repeated associations of the same locator return the
    /// same index (or [`ErrorKind::Vertex`] if it was since marked
    /// deleted in this transaction).
    #[instrument(skip(self))]
    pub fn associate_vertex(&mut self, locator: Locator) -> Result<usize, ErrorKind> {
        self.check_usable()?;
        if locator.is_null() {
            return Err(ErrorKind::Uid);
        }

        if let Some(&index) = self.key_to_index.get(&locator) {
            return if self.vertices[index].deleted {
                Err(ErrorKind::Vertex)
            } else {
                Ok(index)
            };
        }

        if self.kind == TransactionKind::Single {
            match lock::acquire_read(&self.db.blocks, locator) {
                LockResult::Failed => {
                    self.mark_critical();
                    return Err(ErrorKind::TransactionCritical);
                }
                LockResult::Acquired { incarnation } => {
                    let holder = self.fetch_segment(locator, LockState::Read, incarnation);
                    let index = self.vertices.len();
                    self.key_to_index.insert(locator, index);
                    self.vertices.push(holder);
                    Ok(index)
                }
            }
        } else {
            let incarnation = lock::read_incarnation(&self.db.blocks, locator);
            let holder = self.fetch_segment(locator, LockState::None, incarnation);
            let index = self.vertices.len();
            self.key_to_index.insert(locator, index);
            self.vertices.push(holder);
            Ok(index)
        }
    }

    fn fetch_segment(&self, locator: Locator, lock_state: LockState, incarnation: u32) -> VertexHolder {
        let block_size = self.db.blocks.block_size_bytes();
        let mut primary = vec![0u8; block_size as usize];
        self.db.blocks.get_block(locator, &mut primary);
        let header = VertexHeader::from_bytes(&primary[0..VERTEX_HEADER_BYTES as usize]);

        let mut stream = Vec::with_capacity(header.num_blocks as usize * block_size as usize);
        stream.extend_from_slice(&primary);

        // Read the overflow locator list out of the primary block, then
        // fetch the rest of the segment's blocks in order.
        if header.num_blocks > 1 {
            let mut offset = VERTEX_HEADER_BYTES as usize;
            let mut overflow = Vec::with_capacity(header.num_blocks as usize - 1);
            for _ in 1..header.num_blocks {
                let raw = u64::from_le_bytes(primary[offset..offset + 8].try_into().unwrap());
                overflow.push(Locator::from_u64(raw));
                offset += 8;
            }
            for &loc in &overflow {
                let mut block = vec![0u8; block_size as usize];
                self.db.blocks.get_block(loc, &mut block);
                stream.extend_from_slice(&block);
            }
        }

        let parsed = layout::parse_stream(&stream);
        let properties = PropertyList::from_bytes(parsed.property_bytes);
        let edges = crate::edges::EdgeTable::from_bytes(parsed.edge_bytes, parsed.header.num_lightweight_edges);

        VertexHolder::from_segment(locator, parsed.overflow_locators, lock_state, incarnation, properties, edges)
    }

    /// Translates an `(label, external_id)` key to a vertex locator via
    /// the distributed index (§4.9/§4.10). For a single-process
    /// transaction, a found locator that is not yet associated is
    /// pre-associated: its read lock is acquired and its incarnation
    /// checked against the index entry's cached incarnation (I5); a
    /// mismatch (a racing delete-and-reinsert, S3) latches the
    /// transaction critical rather than silently returning a stale
    /// vertex.
    #[instrument(skip(self, external_id))]
    pub fn translate_vertex_id(&mut self, label: u8, external_id: &[u8]) -> Result<Option<Locator>, ErrorKind> {
        self.check_usable()?;
        if label != LABEL_NONE && !self.db.registry().label_exists(label) {
            return Err(ErrorKind::Label);
        }

        let key = crate::index::hash_key(label, external_id);
        let Some((locator, index_incarnation)) = self.db.index.find(key) else {
            return Ok(None);
        };

        if self.kind != TransactionKind::Single || self.key_to_index.contains_key(&locator) {
            return Ok(Some(locator));
        }

        match lock::acquire_read(&self.db.blocks, locator) {
            LockResult::Failed => {
                self.mark_critical();
                Err(ErrorKind::TransactionCritical)
            }
            LockResult::Acquired { incarnation } => {
                if incarnation != index_incarnation {
                    lock::release(&self.db.blocks, locator, LockState::Read, false);
                    self.mark_critical();
                    return Err(ErrorKind::TransactionCritical);
                }
                let holder = self.fetch_segment(locator, LockState::Read, incarnation);
                let index = self.vertices.len();
                self.key_to_index.insert(locator, index);
                self.vertices.push(holder);
                Ok(Some(locator))
            }
        }
    }

    /// Shared access to a vertex holder already associated with this
    /// transaction.
    pub fn vertex(&self, index: usize) -> &VertexHolder {
        &self.vertices[index]
    }

    /// The holder index for a locator already associated with this
    /// transaction, if any.
    pub fn index_of(&self, locator: Locator) -> Option<usize> {
        self.key_to_index.get(&locator).copied()
    }

    fn upgrade_to_write(&mut self, index: usize) -> Result<(), ErrorKind> {
        self.check_writable()?;
        let holder = &mut self.vertices[index];
        match holder.lock_state {
            LockState::Write => Ok(()),
            LockState::None => unreachable!("every associated holder holds at least a read lock"),
            LockState::Read => match lock::try_upgrade_to_write(&self.db.blocks, holder.locator, holder.incarnation) {
                LockResult::Acquired { .. } => {
                    holder.lock_state = LockState::Write;
                    Ok(())
                }
                LockResult::Failed => {
                    self.mark_critical();
                    Err(ErrorKind::TransactionCritical)
                }
            },
        }
    }

    /// Adds `label` to the vertex at `index` (R2: idempotent).
    pub fn add_label(&mut self, index: usize, label: u8) -> Result<(), ErrorKind> {
        self.check_writable()?;
        if !self.db.registry().label_exists(label) || label == LABEL_NONE {
            return Err(ErrorKind::Label);
        }
        self.upgrade_to_write(index)?;
        self.vertices[index].add_label(label);
        self.write = true;
        Ok(())
    }

    /// Removes `label` from the vertex at `index` (no-op if absent, R2).
    pub fn remove_label(&mut self, index: usize, label: u8) -> Result<(), ErrorKind> {
        self.check_writable()?;
        self.upgrade_to_write(index)?;
        self.vertices[index].remove_label(label);
        self.write = true;
        Ok(())
    }

    /// Adds a property value to the vertex at `index`, validating
    /// `value`'s length against the registered property type's size
    /// constraint (B3).
    pub fn add_property(&mut self, index: usize, handle: u8, value: &[u8]) -> Result<(), ErrorKind> {
        self.check_writable()?;
        let ptype = self.db.registry().property_type_by_handle(handle)?.clone();
        self.db.registry().validate_size(&ptype, value.len())?;
        self.upgrade_to_write(index)?;
        self.vertices[index].add_property(handle, value, ptype.entity)?;
        self.write = true;
        Ok(())
    }

    /// Removes every value of `handle` from the vertex at `index`.
    pub fn remove_properties(&mut self, index: usize, handle: u8) -> Result<bool, ErrorKind> {
        self.check_writable()?;
        self.db.registry().property_type_by_handle(handle)?;
        self.upgrade_to_write(index)?;
        Ok(self.vertices[index].remove_properties(handle))
    }

    /// Removes a single matching value from the vertex at `index`.
    pub fn remove_specific_property(&mut self, index: usize, handle: u8, value: &[u8]) -> Result<bool, ErrorKind> {
        self.check_writable()?;
        self.db.registry().property_type_by_handle(handle)?;
        self.upgrade_to_write(index)?;
        Ok(self.vertices[index].remove_specific_property(handle, value))
    }

    /// Unconditionally sets a `SINGLE_ENTITY` property's value.
    pub fn set_property(&mut self, index: usize, handle: u8, value: &[u8]) -> Result<(), ErrorKind> {
        self.check_writable()?;
        let ptype = self.db.registry().property_type_by_handle(handle)?.clone();
        self.db.registry().validate_size(&ptype, value.len())?;
        self.upgrade_to_write(index)?;
        self.vertices[index].set_single_property(handle, value);
        self.write = true;
        Ok(())
    }

    /// Marks a vertex for deletion, tearing down every live edge it
    /// participates in by write-locking each partner and tombstoning the
    /// partner's mirrored slot (§4.10 `free_vertex`).
    #[instrument(skip(self))]
    pub fn free_vertex(&mut self, index: usize) -> Result<(), ErrorKind> {
        self.check_writable()?;
        if self.vertices[index].deleted {
            return Err(ErrorKind::Vertex);
        }
        self.upgrade_to_write(index)?;

        let self_locator = self.vertices[index].locator;
        let live_slots: Vec<(u32, u8, Locator, u8)> = {
            let edges = self.vertices[index].edges();
            (0..edges.used_slots())
                .filter_map(|slot| {
                    let (orientation, partner) = edges.get(slot)?;
                    let label = edges.get_label(slot)?;
                    Some((slot, orientation, partner, label))
                })
                .collect()
        };

        for (_slot, orientation, partner, label) in live_slots {
            if partner == self_locator {
                // Self-loop: the single row on this vertex represents
                // both ends; tearing down the vertex tears it down too.
                continue;
            }
            let partner_index = self.associate_vertex(partner)?;
            self.upgrade_to_write(partner_index)?;
            if let Some(partner_slot) = self.vertices[partner_index].edges().find(orientation, self_locator, label) {
                self.vertices[partner_index].edges_mut().remove(partner_slot);
                self.vertices[partner_index].written = true;
            }
        }

        self.vertices[index].mark_deleted();
        self.write = true;
        Ok(())
    }

    /// Creates a symmetric edge between two already-associated vertices,
    /// write-locking both sides and appending one row to each endpoint's
    /// edge table (§4.10 `create_edge`).
    #[instrument(skip(self))]
    pub fn create_edge(&mut self, origin: usize, target: usize, label: u8, dtype: u8) -> Result<usize, ErrorKind> {
        self.check_writable()?;
        if !matches!(dtype, INCOMING | OUTGOING | UNDIRECTED) {
            return Err(ErrorKind::EdgeOrientation);
        }
        if label != LABEL_NONE && !self.db.registry().label_exists(label) {
            return Err(ErrorKind::Label);
        }
        self.upgrade_to_write(origin)?;
        self.upgrade_to_write(target)?;

        let origin_locator = self.vertices[origin].locator;
        let target_locator = self.vertices[target].locator;

        let (origin_orientation, target_orientation) = match dtype {
            UNDIRECTED => (UNDIRECTED, UNDIRECTED),
            OUTGOING => (OUTGOING, INCOMING),
            INCOMING => (INCOMING, OUTGOING),
            _ => unreachable!("validated above"),
        };

        let origin_slot = self.vertices[origin].edges_mut().add(origin_orientation, label, target_locator);
        self.vertices[origin].written = true;
        let target_slot = if origin == target {
            origin_slot
        } else {
            let slot = self.vertices[target].edges_mut().add(target_orientation, label, origin_locator);
            self.vertices[target].written = true;
            slot
        };

        let handle = EdgeHolder {
            vertex: origin_locator,
            slot: origin_slot,
            other_vertex: target_locator,
            other_slot: target_slot,
            orientation: origin_orientation,
            label,
            deleted: false,
        };
        self.edges.push(handle);
        self.write = true;
        Ok(self.edges.len() - 1)
    }

    /// Tombstones both sides of a previously created edge.
    pub fn remove_edge(&mut self, edge_index: usize) -> Result<(), ErrorKind> {
        self.check_writable()?;
        let (origin_locator, origin_slot, target_locator, target_slot) = {
            let edge = &self.edges[edge_index];
            if edge.deleted {
                return Err(ErrorKind::Edge);
            }
            (edge.vertex, edge.slot, edge.other_vertex, edge.other_slot)
        };

        let origin_index = self.associate_vertex(origin_locator)?;
        self.upgrade_to_write(origin_index)?;
        self.vertices[origin_index].edges_mut().remove(origin_slot);
        self.vertices[origin_index].written = true;

        if target_locator != origin_locator {
            let target_index = self.associate_vertex(target_locator)?;
            self.upgrade_to_write(target_index)?;
            self.vertices[target_index].edges_mut().remove(target_slot);
            self.vertices[target_index].written = true;
        }

        self.edges[edge_index].mark_deleted();
        self.write = true;
        Ok(())
    }

    /// Edge property read/write operations are input-validated no-ops
    /// that still mark the transaction written (§3 O3: edge properties
    /// are declared in the type system but never persisted).
    pub fn set_edge_property(&mut self, edge_index: usize, handle: u8, value: &[u8]) -> Result<(), ErrorKind> {
        self.check_writable()?;
        if self.edges[edge_index].deleted {
            return Err(ErrorKind::Edge);
        }
        let ptype = self.db.registry().property_type_by_handle(handle)?.clone();
        self.db.registry().validate_size(&ptype, value.len())?;
        self.write = true;
        Ok(())
    }

    /// Closes the transaction, committing or aborting per `mode` (§4.10
    /// `close`). Consumes `self`: every holder and held lock is released
    /// together, here or in `Drop` if this returns early via `?`.
    #[instrument(skip(self))]
    pub fn close(mut self, mode: CloseMode) -> Result<(), ErrorKind> {
        self.closed = true;

        if self.kind == TransactionKind::Collective {
            let result = self.close_collective_inner(mode);
            self.db.end_collective();
            return result;
        }

        let effective_mode = if self.critical { CloseMode::Abort } else { mode };

        let result = if effective_mode == CloseMode::Abort {
            self.release_all();
            if mode == CloseMode::Commit {
                Err(ErrorKind::TransactionCommitFail)
            } else {
                Ok(())
            }
        } else {
            self.commit_all()
        };
        self.db.end_single();
        result
    }

    fn close_collective_inner(&mut self, mode: CloseMode) -> Result<(), ErrorKind> {
        let wants_commit = !self.critical && mode == CloseMode::Commit;
        let unanimous = self.db.process_group().allreduce_and(wants_commit);
        self.release_all();
        if mode == CloseMode::Commit && !unanimous {
            return Err(ErrorKind::TransactionCommitFail);
        }
        Ok(())
    }

    fn release_all(&mut self) {
        for vertex in &mut self.vertices {
            if vertex.created {
                // Never published: just return the speculative block.
                self.db.blocks.deallocate(vertex.locator);
                for &overflow in &vertex.overflow_blocks {
                    self.db.blocks.deallocate(overflow);
                }
                vertex.lock_state = LockState::None;
                continue;
            }
            lock::release(&self.db.blocks, vertex.locator, vertex.lock_state, false);
            vertex.lock_state = LockState::None;
        }
    }

    fn commit_all(&mut self) -> Result<(), ErrorKind> {
        let block_size = self.db.blocks.block_size_bytes();

        for i in 0..self.vertices.len() {
            // O2: created-and-deleted-in-the-same-transaction vertices
            // are suppressed entirely: no write-back, no index patch,
            // blocks simply returned.
            if self.vertices[i].created && self.vertices[i].deleted {
                self.db.blocks.deallocate(self.vertices[i].locator);
                for j in 0..self.vertices[i].overflow_blocks.len() {
                    self.db.blocks.deallocate(self.vertices[i].overflow_blocks[j]);
                }
                self.vertices[i].lock_state = LockState::None;
                continue;
            }

            if self.vertices[i].deleted {
                self.db.blocks.deallocate(self.vertices[i].locator);
                for j in 0..self.vertices[i].overflow_blocks.len() {
                    self.db.blocks.deallocate(self.vertices[i].overflow_blocks[j]);
                }
                continue;
            }

            if !self.vertices[i].written {
                continue;
            }

            self.vertices[i].edges_mut().shrink();
            if let Err(e) = self.resize_and_write_back(i, block_size) {
                self.mark_critical();
                self.release_all();
                return Err(e);
            }
        }

        self.patch_index()?;

        self.db.blocks.rma().flush_all();

        for vertex in &mut self.vertices {
            let deleted = vertex.deleted;
            if !(vertex.created && vertex.deleted) {
                lock::release(&self.db.blocks, vertex.locator, vertex.lock_state, deleted);
            }
            vertex.lock_state = LockState::None;
        }

        Ok(())
    }

    fn resize_and_write_back(&mut self, i: usize, block_size: u32) -> Result<(), ErrorKind> {
        let primary_rank = self.vertices[i].locator.rank();
        let edge_bytes = self.vertices[i].edges().as_bytes().len() as u64;
        let property_bytes = self.vertices[i].properties().byte_len();

        // I3: num_blocks = ceil((header + (num_blocks-1)*8 + edge_bytes + property_bytes) / block_size).
        // The overflow-locator region's own size depends on num_blocks,
        // so we solve it by fixed point: start from 1 block and grow
        // until the computed requirement stops increasing the count.
        let mut num_blocks = 1u32;
        loop {
            let overflow_bytes = (num_blocks.saturating_sub(1)) as u64 * 8;
            let total = VERTEX_HEADER_BYTES as u64 + overflow_bytes + edge_bytes + property_bytes;
            let required = layout::blocks_required(total, block_size);
            if required == num_blocks {
                break;
            }
            num_blocks = required;
        }

        let current_overflow = self.vertices[i].overflow_blocks.len() as u32;
        let needed_overflow = num_blocks - 1;

        if needed_overflow > current_overflow {
            for _ in current_overflow..needed_overflow {
                let locator = self.db.blocks.allocate(primary_rank);
                if locator.is_null() {
                    return Err(ErrorKind::NoMemory);
                }
                self.vertices[i].overflow_blocks.push(locator);
            }
        } else if needed_overflow < current_overflow {
            for _ in needed_overflow..current_overflow {
                if let Some(locator) = self.vertices[i].overflow_blocks.pop() {
                    self.db.blocks.deallocate(locator);
                }
            }
        }

        let unused_bytes = self.vertices[i].properties().unused_bytes();
        let num_lightweight_edges = self.vertices[i].edges().used_slots();
        let header = VertexHeader {
            num_blocks,
            num_lightweight_edges,
            property_bytes,
            unused_bytes,
        };

        let stream = layout::assemble_stream(
            &header,
            &self.vertices[i].overflow_blocks,
            self.vertices[i].edges().as_bytes(),
            self.vertices[i].properties().as_bytes(),
        );
        let blocks = layout::split_into_blocks(&stream, block_size);

        self.db.blocks.put_block(self.vertices[i].locator, &blocks[0]);
        for (slot, locator) in self.vertices[i].overflow_blocks.clone().into_iter().enumerate() {
            self.db.blocks.put_block(locator, &blocks[slot + 1]);
        }

        Ok(())
    }

    fn patch_index(&mut self) -> Result<(), ErrorKind> {
        for i in 0..self.vertices.len() {
            let vertex = &self.vertices[i];
            if vertex.created && vertex.deleted {
                continue; // O2: suppressed entirely.
            }

            if vertex.deleted {
                let labels = vertex.labels();
                let external_id = vertex.external_id();
                if labels.is_empty() {
                    if let Some(id) = &external_id {
                        self.db.index.remove(crate::index::hash_key(LABEL_NONE, id));
                    }
                } else {
                    for label in labels {
                        if let Some(id) = &external_id {
                            self.db.index.remove(crate::index::hash_key(label, id));
                        }
                    }
                }
                continue;
            }

            if !vertex.created {
                continue;
            }

            let Some(external_id) = vertex.external_id() else {
                continue;
            };
            let labels = vertex.labels();
            let incarnation = vertex.incarnation;
            let locator = vertex.locator;
            let rank = locator.rank();

            if labels.is_empty() {
                self.db
                    .index
                    .insert(crate::index::hash_key(LABEL_NONE, &external_id), locator, incarnation, rank)?;
            } else {
                for label in labels {
                    self.db
                        .index
                        .insert(crate::index::hash_key(label, &external_id), locator, incarnation, rank)?;
                }
            }
        }
        Ok(())
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        if !self.closed {
            // Caller abandoned the transaction without calling `close`;
            // per §9's RAII requirement, treat it as an abort so no lock
            // or speculative block outlives it.
            self.release_all();
            match self.kind {
                TransactionKind::Single => self.db.end_single(),
                TransactionKind::Collective => self.db.end_collective(),
            }
        }
    }
}
