//! NOD: an in-memory, distributed labeled-property-graph store built
//! directly on one-sided RMA primitives.
//!
//! A database is spread across a process group as a flat array of
//! fixed-size blocks per peer (§3/§4.1). Vertices occupy one or more
//! blocks, addressed by a [`locator::Locator`]; edges live inline in each
//! endpoint's block as a lightweight, tombstoned table ([`edges`]);
//! properties and labels live in a linked record list ([`property`]).
//! Two cooperating peers never see each other's vertices except through
//! one-sided get/put/atomics ([`rma`]) and a lock-free distributed hash
//! index ([`index`]) mapping `(label, external id)` to a vertex locator.
//!
//! Mutation happens inside a [`transaction::Transaction`]: either a
//! single-process read/write transaction, or a collective, barrier-joined
//! read-only transaction across the whole process group (§4.10/§5).
//! [`database::Database`] is the per-peer handle tying the block
//! manager, distributed index, and registries together.
//!
//! No real transport is shipped: [`rma::local::LocalRma`] and
//! [`rma::local::LocalProcessGroup`] simulate a process group in a single
//! binary, which is what the test suite runs against. A real deployment
//! supplies its own [`rma::Rma`]/[`rma::ProcessGroup`] implementations
//! over MPI one-sided, libfabric, or UCX.

mod block;
mod edges;
mod holder;
mod index;
mod layout;
mod lock;
mod property;
mod registry;

pub mod config;
pub mod database;
pub mod error;
pub mod locator;
pub mod rma;
pub mod transaction;

pub use config::DatabaseConfig;
pub use database::Database;
pub use edges::{LabelPolicy, ANY_ORIENTATION, INCOMING, OUTGOING, UNDIRECTED};
pub use error::{ErrorKind, Result};
pub use locator::Locator;
pub use property::Entity;
pub use registry::{LabelDescriptor, PropertyTypeDescriptor, PropertyTypeRef, SizeKind, LABEL_NONE};
pub use rma::local::{LocalProcessGroup, LocalRma, LocalRmaBuilder};
pub use rma::{AtomicOp, ProcessGroup, Rma, WindowKind};
pub use transaction::{CloseMode, Transaction, TransactionKind};
