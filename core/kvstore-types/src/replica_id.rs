//! Replica identifiers.
//!
//! Every replica is configured with a stable, unique `ReplicaId` (typically
//! set once via `--replica-id` and never changed). Unlike the peer/entity
//! IDs of a UUID-keyed system, replica IDs are plain strings: operators name
//! their own replicas, and the value also serves as the LWW tiebreaker key
//! described in the data model.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A unique, operator-assigned identifier for a replica.
///
/// Orders any two values of the same datatype for LWW tiebreak when their
/// timestamps are equal — larger `ReplicaId` (lexicographically) wins.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReplicaId(String);

impl ReplicaId {
    /// Wraps an existing string as a replica id.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generates a random replica id (used when none is configured).
    #[must_use]
    pub fn generate() -> Self {
        Self(format!("replica-{:08x}", rand_u32()))
    }

    /// Returns the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ReplicaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for ReplicaId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ReplicaId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

// A tiny non-cryptographic generator so this crate doesn't need to pull in
// `rand` just to mint a fallback identifier when the operator doesn't pass one.
fn rand_u32() -> u32 {
    use std::time::{SystemTime, UNIX_EPOCH};
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    (nanos as u64 ^ (std::process::id() as u64).rotate_left(17)) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn orders_lexicographically() {
        let a = ReplicaId::new("alpha");
        let b = ReplicaId::new("beta");
        assert!(a < b);
    }

    #[test]
    fn display_matches_inner_string() {
        let id = ReplicaId::new("r1");
        assert_eq!(id.to_string(), "r1");
        assert_eq!(id.as_str(), "r1");
    }

    #[test]
    fn generate_produces_nonempty_id() {
        let id = ReplicaId::generate();
        assert!(!id.as_str().is_empty());
    }
}
