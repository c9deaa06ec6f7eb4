//! Errors surfaced by the CRDT merge algebra.

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Returned when a merge is attempted between two [`crate::Value`]s
    /// holding different datatypes for the same key, e.g. a `String` and a
    /// `Counter`. Datatype identity is fixed at creation and never migrates
    /// implicitly.
    #[error("datatype mismatch: cannot merge {left} with {right}")]
    DatatypeMismatch { left: &'static str, right: &'static str },
}
