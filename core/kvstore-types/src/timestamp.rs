//! Causal timestamp for LWW ordering.
//!
//! Per the data model, every `Value` carries a wall-clock timestamp in
//! nanoseconds that is monotone only *within* a single replica's history —
//! there is no cross-replica clock synchronization. Ordering across
//! replicas is resolved by the `(timestamp, replica_id)` pair, not by the
//! timestamp alone.

use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// A wall-clock timestamp, in nanoseconds since the Unix epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(i64);

impl Timestamp {
    /// Creates a timestamp from a raw nanosecond value (for replay/testing).
    #[must_use]
    pub const fn from_nanos(nanos: i64) -> Self {
        Self(nanos)
    }

    /// Returns the current wall-clock time.
    #[must_use]
    pub fn now() -> Self {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system time before Unix epoch")
            .as_nanos();
        Self(nanos as i64)
    }

    /// Returns the raw nanosecond value.
    #[must_use]
    pub const fn as_nanos(&self) -> i64 {
        self.0
    }

    /// Returns a timestamp guaranteed to be strictly greater than `self`,
    /// even if called faster than the system clock's resolution.
    ///
    /// Used when issuing successive local writes so that two ops stamped
    /// in the same clock tick still order deterministically.
    #[must_use]
    pub fn tick(&self) -> Self {
        let now = Self::now();
        if now.0 > self.0 {
            now
        } else {
            Self(self.0 + 1)
        }
    }
}

impl Default for Timestamp {
    fn default() -> Self {
        Self::now()
    }
}
