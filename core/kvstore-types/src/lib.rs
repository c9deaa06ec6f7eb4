//! Shared types for the kvstore workspace.
//!
//! Defines the datatype-agnostic primitives every other crate depends on:
//! - [`ReplicaId`] — stable per-replica identifier, also the LWW tiebreaker
//! - [`Timestamp`] — wall-clock nanoseconds, monotone per replica
//! - [`Operation`] / [`OperationId`] — the unit of durable local history and
//!   replication

mod operation;
mod replica_id;
mod timestamp;

pub use operation::{Operation, OperationId, OperationKind};
pub use replica_id::ReplicaId;
pub use timestamp::Timestamp;

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur working with core types.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}
