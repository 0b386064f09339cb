//! Top-level database handle: owns the block manager, the distributed
//! index, the label/property-type registries, and the per-peer
//! active-transaction bookkeeping (§5/§9).
//!
//! `Database` is the one piece of cluster-shared mutable state above the
//! block layer that every transaction reads through (§9 "global mutable
//! state"). The registries are populated once, collectively, before any
//! transaction starts, then never mutated again; the active-transaction
//! counter is the only thing a running transaction touches concurrently
//! with its siblings on the same peer.

use std::sync::{Arc, Mutex};

use tracing::info;

use crate::block::BlockManager;
use crate::config::DatabaseConfig;
use crate::error::ErrorKind;
use crate::index::DistributedIndex;
use crate::property::{Entity, FIRST_USER_HANDLE};
use crate::registry::{PropertyTypeDescriptor, Registry, SizeKind};
use crate::rma::{ProcessGroup, Rma};

/// Tracks which kind of transaction, if any, is active on this peer
/// (§5's collective/single-process exclusion rule).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PeerActivity {
    Idle,
    Single(u32),
    Collective,
}

/// An opened NOD database instance bound to one peer (`rank`) of a
/// process group.
#[derive(Debug)]
pub struct Database {
    pub(crate) blocks: BlockManager,
    pub(crate) index: DistributedIndex,
    registry: Registry,
    process_group: Arc<dyn ProcessGroup>,
    activity: Mutex<PeerActivity>,
    config: DatabaseConfig,
}

impl Database {
    /// Opens a database over an already-allocated [`Rma`] façade and
    /// [`ProcessGroup`], initializing the block free lists and the
    /// distributed index on every peer. Every peer in the group must
    /// call this with an identical `config` (§6 precondition).
    pub fn open(
        config: DatabaseConfig,
        rma: Arc<dyn Rma>,
        process_group: Arc<dyn ProcessGroup>,
    ) -> Result<Database, ErrorKind> {
        config.validate()?;

        let blocks = BlockManager::new(Arc::clone(&rma), config.block_size_bytes, config.num_blocks_per_peer());
        blocks.init();

        let index = DistributedIndex::new(rma, config.index_table_size_per_peer, config.index_heap_size_per_peer);
        index.init();

        info!(
            rank = process_group.rank(),
            blocks = config.num_blocks_per_peer(),
            "opened NOD database"
        );

        Ok(Database {
            blocks,
            index,
            registry: Registry::new(),
            process_group,
            activity: Mutex::new(PeerActivity::Idle),
            config,
        })
    }

    /// This peer's rank.
    pub fn rank(&self) -> u32 {
        self.process_group.rank()
    }

    /// The process group this database instance is a member of.
    pub fn process_group(&self) -> &dyn ProcessGroup {
        self.process_group.as_ref()
    }

    /// The configuration this database was opened with.
    pub fn config(&self) -> &DatabaseConfig {
        &self.config
    }

    /// Read access to the label/property-type registries.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Registers a label. Intended for collective, pre-transaction setup
    /// (§4.11/§5): every peer must call this with the same names in the
    /// same order.
    pub fn create_label(&mut self, name: impl Into<String>) -> Result<u8, ErrorKind> {
        self.registry.create_label(name)
    }

    /// Registers a property type. Intended for collective, pre-transaction
    /// setup, same ordering requirement as [`Database::create_label`].
    pub fn create_property_type(
        &mut self,
        name: impl Into<String>,
        entity: Entity,
        size_kind: SizeKind,
        count: u32,
    ) -> Result<u8, ErrorKind> {
        self.registry.create_property_type(name, entity, size_kind, count)
    }

    /// Looks up a property type's descriptor by handle, for callers
    /// outside `transaction.rs` that need to interpret raw property
    /// bytes (e.g. the size-trick / degree helpers).
    pub fn property_type_by_handle(&self, handle: u8) -> Result<&PropertyTypeDescriptor, ErrorKind> {
        self.registry.property_type_by_handle(handle)
    }

    /// Starts a single-process read/write transaction. Fails with
    /// [`ErrorKind::IncompatibleTransactions`] if a collective
    /// transaction is currently active on this peer.
    pub fn start_single(&self) -> Result<crate::transaction::Transaction<'_>, ErrorKind> {
        let mut activity = self.activity.lock().unwrap();
        match *activity {
            PeerActivity::Collective => return Err(ErrorKind::IncompatibleTransactions),
            PeerActivity::Idle => *activity = PeerActivity::Single(1),
            PeerActivity::Single(n) => *activity = PeerActivity::Single(n + 1),
        }
        drop(activity);
        Ok(crate::transaction::Transaction::new_single(self))
    }

    /// Starts a collective, read-only transaction: every peer in the
    /// process group must call this before any of them proceeds past the
    /// opening barrier. Fails with [`ErrorKind::IncompatibleTransactions`]
    /// if any single-process transaction is active on this peer.
    pub fn start_collective(&self) -> Result<crate::transaction::Transaction<'_>, ErrorKind> {
        {
            let mut activity = self.activity.lock().unwrap();
            match *activity {
                PeerActivity::Single(_) => return Err(ErrorKind::IncompatibleTransactions),
                PeerActivity::Collective => return Err(ErrorKind::IncompatibleTransactions),
                PeerActivity::Idle => *activity = PeerActivity::Collective,
            }
        }
        self.process_group.barrier();
        Ok(crate::transaction::Transaction::new_collective(self))
    }

    pub(crate) fn end_single(&self) {
        let mut activity = self.activity.lock().unwrap();
        *activity = match *activity {
            PeerActivity::Single(n) if n > 1 => PeerActivity::Single(n - 1),
            _ => PeerActivity::Idle,
        };
    }

    pub(crate) fn end_collective(&self) {
        let mut activity = self.activity.lock().unwrap();
        *activity = PeerActivity::Idle;
    }
}

/// First handle available for application-registered labels; [`LABEL_NONE`]
/// ([`crate::registry::LABEL_NONE`]) occupies handle 0.
pub const FIRST_USER_PROPERTY_HANDLE: u8 = FIRST_USER_HANDLE;
