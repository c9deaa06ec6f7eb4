//! Wire shapes exchanged between replicas, per the replication HTTP API:
//!
//! - `GET /ops?since=<int64_nanoseconds>` -> `OperationBatch`
//! - `POST /apply` <- `OperationBatch`
//!
//! Framed TCP is an acceptable alternative carrier for the same
//! [`kvstore_types::Operation`] records; nothing here is HTTP-specific
//! beyond the query-string `since` parameter.

use kvstore_types::Operation;
use serde::{Deserialize, Serialize};

/// A batch of operations, in the shape both replication endpoints speak.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OperationBatch {
    pub operations: Vec<Operation>,
}

/// Query parameters for `GET /ops`.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct OpsQuery {
    /// Return only operations with `timestamp > since`, in nanoseconds.
    pub since: i64,
}
