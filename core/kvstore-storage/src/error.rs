//! Error types for the storage layer.

use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur in storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// IO error from the underlying filesystem.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A record failed to serialize or deserialize.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A segment (or the op-log) contains a corrupt record mid-file, not
    /// just a truncated trailing one. Unlike a truncated tail this is not
    /// silently discarded — recovery aborts.
    #[error("recovery error: corrupt record in {path}: {reason}")]
    Recovery { path: String, reason: String },

    /// Merging two records for the same key hit a datatype mismatch.
    #[error("datatype mismatch during recovery: {0}")]
    DatatypeMismatch(#[from] kvstore_crdt::Error),

    /// An advisory lock file for the data directory is already held.
    #[error("data directory already locked by another process (pid {0})")]
    AlreadyLocked(u32),
}
