//! Error kinds returned by core operations.
//!
//! Two tiers, per the design's error handling section: most variants are
//! argument/semantic errors that leave the transaction usable; the
//! [`ErrorKind::TransactionCritical`] and
//! [`ErrorKind::TransactionCommitFail`] variants are latched states,
//! never returned directly by an operation but observed by the *next*
//! call after a transaction has gone critical (see `transaction.rs`).

use thiserror::Error;

/// Error kinds returned by NOD core operations.
///
/// Mirrors the `ERROR_*` list exactly; the names are mapped to
/// CamelCase per Rust convention.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// A caller-supplied buffer was null, too small, or otherwise unusable.
    #[error("invalid buffer")]
    Buffer,
    /// The database handle is invalid or has been closed.
    #[error("invalid database")]
    Database,
    /// The transaction handle is invalid or in the wrong state for this call.
    #[error("invalid transaction state")]
    Transaction,
    /// The vertex handle or locator is invalid, deleted, or unassociated.
    #[error("invalid vertex")]
    Vertex,
    /// The edge handle, orientation, or endpoint pairing is invalid.
    #[error("invalid edge")]
    Edge,
    /// An unknown or mismatched label handle was used.
    #[error("unknown label")]
    Label,
    /// An unknown property-type handle was used.
    #[error("unknown property type")]
    PropertyType,
    /// Adding a property that already exists under `SINGLE_ENTITY`/exact-match rules.
    #[error("property already exists")]
    PropertyExists,
    /// Adding a property type that is already registered.
    #[error("property type already exists")]
    PropertyTypeExists,
    /// Removing/updating a property that is not present.
    #[error("no such property")]
    NoProperty,
    /// A count/size exceeds the registered property type's limit.
    #[error("size limit exceeded")]
    SizeLimit,
    /// A record or buffer size is otherwise invalid (e.g. overflowed the record-size field).
    #[error("invalid size")]
    Size,
    /// The object is not in a state that permits this operation.
    #[error("invalid object state")]
    State,
    /// A locator or holder was used with an object kind it does not belong to.
    #[error("object mismatch")]
    ObjectMismatch,
    /// A mutating call was made on a read-only (collective) transaction.
    #[error("read-only transaction")]
    ReadOnlyTransaction,
    /// A mutating call targeted a read-only property type.
    #[error("read-only property type")]
    ReadOnlyPropertyType,
    /// A value's byte count did not match the property type's element size.
    #[error("wrong type")]
    WrongType,
    /// An invalid or unsupported edge orientation was requested.
    #[error("invalid edge orientation")]
    EdgeOrientation,
    /// A collective and a single-process transaction were mixed incompatibly.
    #[error("incompatible transaction kinds")]
    IncompatibleTransactions,
    /// A database configuration or usage constraint was violated.
    #[error("constraint violated")]
    Constraint,
    /// An operation observed a stale incarnation or otherwise torn-down state.
    #[error("stale locator")]
    Stale,
    /// A vertex UID (locator) does not resolve to any live vertex.
    #[error("invalid vertex uid")]
    Uid,
    /// The block allocator has no free blocks on any peer.
    #[error("out of memory")]
    NoMemory,
    /// The caller's output buffer was too small; accompanies the required size.
    #[error("buffer too small, need {required} elements")]
    Truncate {
        /// The number of elements the caller's next call must provide room for.
        required: usize,
    },
    /// The transaction has been latched into an unrecoverable state by a
    /// failed remote operation; only `close(abort)` is valid afterward.
    #[error("transaction is critical, must abort")]
    TransactionCritical,
    /// `close(commit)` was requested on a critical transaction and was
    /// converted to an abort.
    #[error("commit failed, transaction was aborted")]
    TransactionCommitFail,
}

/// Convenience alias for fallible NOD operations.
pub type Result<T> = std::result::Result<T, ErrorKind>;
