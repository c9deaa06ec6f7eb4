//! Per-field LWW hash CRDT backing HSET/HGET/HDEL et al.
//!
//! Each field is an independent LWW-Register keyed by `(timestamp,
//! replica_id)`. A delete is recorded as a tombstone marker rather than a
//! removed map entry, so a later set with a greater `(timestamp,
//! replica_id)` correctly resurrects the field.

use kvstore_types::{ReplicaId, Timestamp};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct FieldEntry {
    /// `None` marks a tombstone (the field was deleted).
    value: Option<Vec<u8>>,
    timestamp: Timestamp,
    replica_id: ReplicaId,
}

impl FieldEntry {
    fn wins_over(&self, other: &Self) -> bool {
        match self.timestamp.cmp(&other.timestamp) {
            Ordering::Greater => true,
            Ordering::Less => false,
            Ordering::Equal => self.replica_id > other.replica_id,
        }
    }
}

/// A replicated hash with per-field last-writer-wins semantics.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HashCrdt {
    fields: HashMap<String, FieldEntry>,
}

impl HashCrdt {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a field, stamped with `(timestamp, replica_id)`. Returns `true`
    /// if this write wins over whatever was there before (or nothing was).
    pub fn set(
        &mut self,
        field: impl Into<String>,
        value: Vec<u8>,
        timestamp: Timestamp,
        replica_id: ReplicaId,
    ) -> bool {
        let incoming = FieldEntry {
            value: Some(value),
            timestamp,
            replica_id,
        };
        self.apply(field.into(), incoming)
    }

    /// Deletes a field by writing a tombstone marker stamped `(timestamp,
    /// replica_id)`. A later `set` with a greater pair resurrects it.
    pub fn delete(&mut self, field: impl Into<String>, timestamp: Timestamp, replica_id: ReplicaId) -> bool {
        let incoming = FieldEntry {
            value: None,
            timestamp,
            replica_id,
        };
        self.apply(field.into(), incoming)
    }

    fn apply(&mut self, field: String, incoming: FieldEntry) -> bool {
        match self.fields.get(&field) {
            Some(existing) if !incoming.wins_over(existing) => false,
            _ => {
                self.fields.insert(field, incoming);
                true
            }
        }
    }

    #[must_use]
    pub fn get(&self, field: &str) -> Option<&[u8]> {
        self.fields
            .get(field)
            .and_then(|e| e.value.as_deref())
    }

    #[must_use]
    pub fn contains(&self, field: &str) -> bool {
        self.get(field).is_some()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.values().filter(|e| e.value.is_some()).count()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields
            .iter()
            .filter(|(_, e)| e.value.is_some())
            .map(|(k, _)| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[u8])> {
        self.fields
            .iter()
            .filter_map(|(k, e)| e.value.as_deref().map(|v| (k.as_str(), v)))
    }

    /// Merges another hash into this one: per-field LWW on `(timestamp, replica_id)`.
    pub fn merge(&mut self, other: &Self) {
        for (field, other_entry) in &other.fields {
            self.apply(field.clone(), other_entry.clone());
        }
    }

    #[must_use]
    pub fn merged(&self, other: &Self) -> Self {
        let mut result = self.clone();
        result.merge(other);
        result
    }
}
