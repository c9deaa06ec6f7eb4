//! Unique add-tags for Observed-Remove sets.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A unique tag identifying a single add operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Tag(Uuid);

impl Tag {
    /// Creates a new, globally unique tag.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for Tag {
    fn default() -> Self {
        Self::new()
    }
}
