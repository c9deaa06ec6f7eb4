//! The tagged value stored under every key.
//!
//! Every key holds exactly one [`Value`], carrying the replica's write
//! metadata (`timestamp`, `replica_id`) at the top level plus a datatype
//! payload. The datatype is fixed the moment a key is first written and
//! never migrates implicitly — a second write of a different datatype to an
//! existing key is a caller-level error, and merging two [`Value`]s with
//! different payload variants is a [`Error::DatatypeMismatch`].

use crate::{Error, HashCrdt, ListCrdt, OrSet, PnCounter, Result, SortedSetCrdt};
use kvstore_types::{ReplicaId, Timestamp};
use serde::{Deserialize, Serialize};

/// The datatype-specific payload carried by a [`Value`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "datatype", rename_all = "snake_case")]
pub enum Payload {
    String(Vec<u8>),
    Counter(PnCounter),
    List(ListCrdt),
    Set(OrSet<Vec<u8>>),
    Hash(HashCrdt),
    SortedSet(SortedSetCrdt),
}

impl Payload {
    /// The name used by the `TYPE` command and in error messages.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Payload::String(_) => "string",
            Payload::Counter(_) => "counter",
            Payload::List(_) => "list",
            Payload::Set(_) => "set",
            Payload::Hash(_) => "hash",
            Payload::SortedSet(_) => "sortedset",
        }
    }
}

/// A stored value: write metadata plus a datatype payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Value {
    pub payload: Payload,
    /// Timestamp of the most recent write that touched this value.
    pub timestamp: Timestamp,
    /// Replica that performed the most recent write.
    pub replica_id: ReplicaId,
    /// Absolute expiry, set by EXPIRE/PEXPIRE/EXPIREAT. `None` means no TTL.
    pub expire_at: Option<Timestamp>,
}

impl Value {
    #[must_use]
    pub fn new(payload: Payload, timestamp: Timestamp, replica_id: ReplicaId) -> Self {
        Self {
            payload,
            timestamp,
            replica_id,
            expire_at: None,
        }
    }

    #[must_use]
    pub fn type_name(&self) -> &'static str {
        self.payload.type_name()
    }

    /// Whether this value has expired as of `now`.
    #[must_use]
    pub fn is_expired_at(&self, now: Timestamp) -> bool {
        self.expire_at.is_some_and(|exp| exp <= now)
    }

    /// Merges another value into this one in place. The datatype payloads
    /// must match; top-level metadata (timestamp, replica_id, expire_at)
    /// takes the winner of the payload-level merge rather than an
    /// independent LWW, since the payload merge already encodes the
    /// datatype's own conflict resolution.
    pub fn merge(&mut self, other: &Self) -> Result<()> {
        // Captured before any payload arm below mutates `self.timestamp`/
        // `self.replica_id` to the post-merge winner, so the TTL resolution
        // at the end of this function still compares against the pre-merge
        // state rather than comparing a value against itself.
        let other_wins = (other.timestamp, &other.replica_id) > (self.timestamp, &self.replica_id);

        match (&mut self.payload, &other.payload) {
            (Payload::String(a), Payload::String(b)) => {
                if other_wins {
                    *a = b.clone();
                    self.timestamp = other.timestamp;
                    self.replica_id = other.replica_id.clone();
                }
            }
            (Payload::Counter(a), Payload::Counter(b)) => {
                a.merge(b);
                self.timestamp = self.timestamp.max(other.timestamp);
            }
            (Payload::List(a), Payload::List(b)) => {
                a.merge(b);
                self.timestamp = self.timestamp.max(other.timestamp);
            }
            (Payload::Set(a), Payload::Set(b)) => {
                a.merge(b);
                self.timestamp = self.timestamp.max(other.timestamp);
            }
            (Payload::Hash(a), Payload::Hash(b)) => {
                a.merge(b);
                self.timestamp = self.timestamp.max(other.timestamp);
            }
            (Payload::SortedSet(a), Payload::SortedSet(b)) => {
                a.merge(b);
                self.timestamp = self.timestamp.max(other.timestamp);
            }
            (a, b) => {
                return Err(Error::DatatypeMismatch {
                    left: a.type_name(),
                    right: b.type_name(),
                });
            }
        }

        // TTL resolution follows the same last-writer-wins rule used for the
        // string payload: whichever replica wrote most recently decides
        // whether the key still carries an expiry.
        if other_wins {
            self.expire_at = other.expire_at;
        }

        Ok(())
    }

    #[must_use]
    pub fn merged(&self, other: &Self) -> Result<Self> {
        let mut result = self.clone();
        result.merge(other)?;
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn r(n: &str) -> ReplicaId {
        ReplicaId::new(n)
    }

    #[test]
    fn string_merge_takes_latest_write() {
        let a = Value::new(Payload::String(b"a".to_vec()), Timestamp::from_nanos(1), r("x"));
        let b = Value::new(Payload::String(b"b".to_vec()), Timestamp::from_nanos(2), r("y"));

        let merged = a.merged(&b).unwrap();
        match merged.payload {
            Payload::String(v) => assert_eq!(v, b"b".to_vec()),
            _ => panic!("expected string payload"),
        }
    }

    #[test]
    fn mismatched_datatypes_error() {
        let a = Value::new(Payload::String(b"a".to_vec()), Timestamp::from_nanos(1), r("x"));
        let mut b = Value::new(Payload::Counter(PnCounter::new()), Timestamp::from_nanos(2), r("y"));

        let err = b.merge(&a).unwrap_err();
        match err {
            Error::DatatypeMismatch { left, right } => {
                assert_eq!(left, "counter");
                assert_eq!(right, "string");
            }
        }
    }

    #[test]
    fn expiry_follows_latest_writer() {
        let mut a = Value::new(Payload::String(b"a".to_vec()), Timestamp::from_nanos(1), r("x"));
        a.expire_at = Some(Timestamp::from_nanos(100));
        let b = Value::new(Payload::String(b"b".to_vec()), Timestamp::from_nanos(2), r("y"));

        a.merge(&b).unwrap();
        assert_eq!(a.expire_at, None);
    }

    #[test]
    fn is_expired_at_boundary() {
        let mut v = Value::new(Payload::String(b"a".to_vec()), Timestamp::from_nanos(1), r("x"));
        v.expire_at = Some(Timestamp::from_nanos(100));
        assert!(!v.is_expired_at(Timestamp::from_nanos(99)));
        assert!(v.is_expired_at(Timestamp::from_nanos(100)));
        assert!(v.is_expired_at(Timestamp::from_nanos(101)));
    }
}
