//! Error types for the replication layer.

use thiserror::Error;

/// Result type for replication operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur while pulling from or applying a peer's operation
/// log. Per the design's error taxonomy, [`SyncError::PeerUnreachable`] is
/// recoverable (retried next tick with the same watermark) while
/// [`SyncError::Apply`] is per-operation: the syncer logs it and advances
/// past the offending operation rather than treating the whole batch as
/// fatal.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The peer's transport endpoint could not be reached (connection
    /// refused, timeout, DNS failure, non-2xx status). Recoverable: the
    /// next tick retries against the same `since` watermark.
    #[error("peer {peer} unreachable: {reason}")]
    PeerUnreachable { peer: String, reason: String },

    /// A batch from a peer failed to decode as the wire protocol's JSON
    /// shape.
    #[error("malformed response from {peer}: {reason}")]
    MalformedResponse { peer: String, reason: String },

    /// A single remote operation was malformed or referenced an unknown
    /// command, or the engine's application of it failed.
    #[error("apply error: {0}")]
    Apply(#[from] kvstore_engine::EngineError),
}
