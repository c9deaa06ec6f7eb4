//! The durable record of a locally issued write.
//!
//! An `Operation` is what the operation log (C4) stores and what the
//! replication syncer (C6) exchanges between peers. Applying a remote
//! operation must be indistinguishable from applying the same operation
//! locally — the `timestamp`/`replica_id` travel with the operation and
//! are never regenerated by the receiver.

use crate::{ReplicaId, Timestamp};
use serde::{Deserialize, Serialize};
use std::fmt;

/// High-level classification of an operation, independent of the specific
/// command name. The applier uses this to decide whether a `Value` should
/// be merged in or removed before looking at `command` at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    /// A write that installs or merges a `Value` (SET, INCR, LPUSH, ...).
    Write,
    /// A write that removes a key (DEL, GETDEL, an expired key's tombstone).
    Delete,
}

/// Stable identifier for an operation, sufficient for de-duplication on the
/// receiving side of replication. Constructed from the triple that the
/// spec calls out: `(replica_id, timestamp, key)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OperationId {
    pub replica_id: ReplicaId,
    pub timestamp: Timestamp,
    pub key: String,
}

impl OperationId {
    #[must_use]
    pub fn new(replica_id: ReplicaId, timestamp: Timestamp, key: impl Into<String>) -> Self {
        Self {
            replica_id,
            timestamp,
            key: key.into(),
        }
    }
}

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.replica_id, self.timestamp.as_nanos(), self.key)
    }
}

/// A locally issued operation, as recorded in the operation log and
/// exchanged over the replication wire protocol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    pub operation_id: OperationId,
    #[serde(rename = "type")]
    pub kind: OperationKind,
    /// The command name as issued, e.g. "SET", "LPUSH", "HINCRBY".
    pub command: String,
    pub args: Vec<String>,
    pub timestamp: Timestamp,
    pub replica_id: ReplicaId,
}

impl Operation {
    #[must_use]
    pub fn new(
        kind: OperationKind,
        command: impl Into<String>,
        args: Vec<String>,
        key: impl Into<String>,
        timestamp: Timestamp,
        replica_id: ReplicaId,
    ) -> Self {
        let key = key.into();
        let operation_id = OperationId::new(replica_id.clone(), timestamp, key);
        Self {
            operation_id,
            kind,
            command: command.into(),
            args,
            timestamp,
            replica_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operation_id_round_trips_through_json() {
        let op = Operation::new(
            OperationKind::Write,
            "SET",
            vec!["k".into(), "v".into()],
            "k",
            Timestamp::from_nanos(100),
            ReplicaId::new("r1"),
        );
        let json = serde_json::to_string(&op).unwrap();
        let parsed: Operation = serde_json::from_str(&json).unwrap();
        assert_eq!(op, parsed);
    }

    #[test]
    fn display_formats_as_colon_separated_triple() {
        let id = OperationId::new(ReplicaId::new("r1"), Timestamp::from_nanos(42), "k");
        assert_eq!(id.to_string(), "r1:42:k");
    }
}
