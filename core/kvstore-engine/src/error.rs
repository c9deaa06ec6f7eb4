//! Error taxonomy for the command API, matching the disposition table in
//! the design: some variants are surfaced to the caller (client-visible),
//! others are fatal and expected to abort the process.

use thiserror::Error;

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

#[derive(Debug, Error)]
pub enum EngineError {
    /// Wrong arity or malformed argument for a command. Surfaced to the
    /// caller; never persisted.
    #[error("invalid arguments: {0}")]
    InvalidArgs(String),

    /// A command expected a different datatype than the key currently holds.
    #[error("datatype mismatch: key holds {actual}, command expects {expected}")]
    DatatypeMismatch { expected: &'static str, actual: &'static str },

    /// Read of an absent or expired key.
    #[error("key not found: {0}")]
    NotFound(String),

    /// Segment write or fsync failure. Fatal: the caller should abort the
    /// process rather than continue with a store that may be missing
    /// durable writes.
    #[error("persistence error: {0}")]
    Persistence(#[from] kvstore_storage::StorageError),

    /// A replayed remote operation was malformed or referenced an unknown
    /// command. Non-fatal: the syncer logs and skips it, advancing the
    /// watermark past it anyway.
    #[error("apply error: {0}")]
    Apply(String),
}

impl From<kvstore_crdt::Error> for EngineError {
    fn from(err: kvstore_crdt::Error) -> Self {
        match err {
            kvstore_crdt::Error::DatatypeMismatch { left, right } => {
                EngineError::DatatypeMismatch { expected: left, actual: right }
            }
        }
    }
}

impl EngineError {
    /// Whether this error should be treated as fatal (process-abort) per
    /// the error taxonomy, as opposed to a client-visible command failure.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, EngineError::Persistence(_))
    }
}
