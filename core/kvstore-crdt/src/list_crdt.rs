//! Ordered list CRDT backing LPUSH/RPUSH/LPOP/RPOP/LRANGE et al.
//!
//! Every element carries an `ElementId` that totally orders the visible
//! sequence. `RPUSH` mints ids with an increasing rank (append to the
//! tail); `LPUSH` mints ids with a decreasing rank (prepend to the head) —
//! the same push issued later always sorts further toward the front.
//! Deletes mark a tombstone rather than removing the entry, so merge only
//! ever needs to union entries and OR their tombstone bit.

use kvstore_types::{ReplicaId, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Which end of the list an insertion targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Left,
    Right,
}

/// Total-order identifier for a list element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ElementId {
    /// Signed rank: positive and increasing for RPUSH, negative and
    /// decreasing for LPUSH. Orders the total sequence directly.
    rank: i128,
    replica_id: ReplicaId,
    local_sequence: u64,
}

/// An entry in the list: the element's value plus its tombstone bit.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Entry {
    value: Vec<u8>,
    tombstone: bool,
}

/// A replicated, ordered list with tombstone-based deletes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListCrdt {
    entries: BTreeMap<ElementId, Entry>,
    local_sequence: u64,
}

impl ListCrdt {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn next_sequence(&mut self) -> u64 {
        self.local_sequence += 1;
        self.local_sequence
    }

    /// Mints the next id for a push at `side`, issued by `replica_id` at `timestamp`.
    pub fn next_id(&mut self, side: Side, timestamp: Timestamp, replica_id: ReplicaId) -> ElementId {
        let nanos = timestamp.as_nanos() as i128;
        let rank = match side {
            Side::Right => nanos,
            Side::Left => -nanos,
        };
        ElementId {
            rank,
            replica_id,
            local_sequence: self.next_sequence(),
        }
    }

    /// Inserts (or re-inserts) a value under a given id. Used both for local
    /// pushes and for replaying a remote op with its original id.
    pub fn insert_with_id(&mut self, id: ElementId, value: Vec<u8>) {
        self.entries.insert(
            id,
            Entry {
                value,
                tombstone: false,
            },
        );
    }

    /// Returns the visible (non-tombstoned) values in list order.
    #[must_use]
    pub fn to_vec(&self) -> Vec<Vec<u8>> {
        self.entries
            .values()
            .filter(|e| !e.tombstone)
            .map(|e| e.value.clone())
            .collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.values().filter(|e| !e.tombstone).count()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the id of the visible element at `index`, if any.
    #[must_use]
    pub fn id_at(&self, index: usize) -> Option<ElementId> {
        self.entries
            .iter()
            .filter(|(_, e)| !e.tombstone)
            .nth(index)
            .map(|(id, _)| *id)
    }

    /// Returns the visible value at `index`.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<Vec<u8>> {
        self.entries
            .values()
            .filter(|e| !e.tombstone)
            .nth(index)
            .map(|e| e.value.clone())
    }

    /// Overwrites the value at a visible index in place (LSET). Keeps the
    /// element's id, so this is not itself a CRDT operation that needs
    /// merge beyond the usual tombstone union — a concurrent LSET on the
    /// same id behaves like last-write-wins via the caller re-inserting
    /// under a fresh id when exact conflict semantics matter.
    pub fn set_at(&mut self, index: usize, value: Vec<u8>) -> bool {
        if let Some(id) = self.id_at(index) {
            if let Some(entry) = self.entries.get_mut(&id) {
                entry.value = value;
                return true;
            }
        }
        false
    }

    /// Tombstones the visible element at `index`. Returns its id.
    pub fn delete_at(&mut self, index: usize) -> Option<ElementId> {
        let id = self.id_at(index)?;
        if let Some(entry) = self.entries.get_mut(&id) {
            entry.tombstone = true;
        }
        Some(id)
    }

    /// Builds a single-entry delta tombstoning `id`, carrying `value` along
    /// with it rather than shipping the whole list. Carrying the value (not
    /// just the id) means the delta is self-sufficient even if it reaches a
    /// peer before the entry's original insert does: whichever arrives
    /// first, the merged entry ends up with the right value and the right
    /// tombstone bit, since `merge` only ORs the tombstone bit on a
    /// matching id and otherwise takes the incoming entry as-is.
    #[must_use]
    pub fn delta_remove(id: ElementId, value: Vec<u8>) -> Self {
        let mut delta = Self::new();
        delta.entries.insert(id, Entry { value, tombstone: true });
        delta
    }

    /// Builds a replacement id that sorts at the same rank as `near` but
    /// with a fresh local sequence, for changing a visible element's value
    /// without moving its position (`LSET`). Kept as a tombstone-plus-insert
    /// rather than an in-place value mutation so replication still sees it
    /// as the union of two independently-mergeable facts.
    pub fn reinsert_near(&mut self, near: ElementId, value: Vec<u8>) -> ElementId {
        let id = ElementId {
            rank: near.rank,
            replica_id: near.replica_id,
            local_sequence: self.next_sequence(),
        };
        self.insert_with_id(id, value);
        id
    }

    /// Mints an id ranked strictly between `left` and `right` (either end
    /// open), for `LINSERT`. Uses integer midpoint on the rank space; with
    /// nanosecond-timestamp-derived ranks there is ample room in practice,
    /// though in principle repeated inserts at the exact same spot can
    /// exhaust it.
    pub fn insert_between(
        &mut self,
        left: Option<ElementId>,
        right: Option<ElementId>,
        replica_id: ReplicaId,
        value: Vec<u8>,
    ) -> ElementId {
        let rank = match (left, right) {
            (Some(l), Some(r)) => l.rank + (r.rank - l.rank) / 2,
            (Some(l), None) => l.rank + 1,
            (None, Some(r)) => r.rank - 1,
            (None, None) => 0,
        };
        let id = ElementId {
            rank,
            replica_id,
            local_sequence: self.next_sequence(),
        };
        self.insert_with_id(id, value);
        id
    }

    /// Tombstones an element by id (used when replaying a remote delete).
    pub fn delete_by_id(&mut self, id: ElementId) {
        if let Some(entry) = self.entries.get_mut(&id) {
            entry.tombstone = true;
        }
    }

    /// Merges another list into this one: union of entries, OR of tombstones
    /// on matching ids. Commutative, associative, idempotent.
    pub fn merge(&mut self, other: &Self) {
        for (id, other_entry) in &other.entries {
            match self.entries.get_mut(id) {
                Some(existing) => {
                    existing.tombstone = existing.tombstone || other_entry.tombstone;
                }
                None => {
                    self.entries.insert(*id, other_entry.clone());
                }
            }
        }
        self.local_sequence = self.local_sequence.max(other.local_sequence);
    }

    #[must_use]
    pub fn merged(&self, other: &Self) -> Self {
        let mut result = self.clone();
        result.merge(other);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn push(list: &mut ListCrdt, side: Side, nanos: i64, replica: &str, value: &str) {
        let id = list.next_id(side, Timestamp::from_nanos(nanos), ReplicaId::new(replica));
        list.insert_with_id(id, value.as_bytes().to_vec());
    }

    fn as_strings(list: &ListCrdt) -> Vec<String> {
        list.to_vec()
            .into_iter()
            .map(|b| String::from_utf8(b).unwrap())
            .collect()
    }

    #[test]
    fn rpush_appends_in_order() {
        let mut list = ListCrdt::new();
        push(&mut list, Side::Right, 100, "r1", "a");
        push(&mut list, Side::Right, 200, "r1", "b");
        assert_eq!(as_strings(&list), vec!["a", "b"]);
    }

    #[test]
    fn lpush_prepends_newest_first() {
        let mut list = ListCrdt::new();
        push(&mut list, Side::Left, 100, "r1", "a");
        push(&mut list, Side::Left, 200, "r1", "b");
        // b pushed later on the left ends up at the very front.
        assert_eq!(as_strings(&list), vec!["b", "a"]);
    }

    #[test]
    fn delete_is_filtered_from_visible_sequence() {
        let mut list = ListCrdt::new();
        push(&mut list, Side::Right, 100, "r1", "a");
        push(&mut list, Side::Right, 200, "r1", "b");
        list.delete_at(0);
        assert_eq!(as_strings(&list), vec!["b"]);
    }

    #[test]
    fn merge_is_commutative_and_idempotent() {
        let mut a = ListCrdt::new();
        push(&mut a, Side::Right, 100, "r1", "a");
        let mut b = ListCrdt::new();
        push(&mut b, Side::Right, 200, "r2", "b");

        let ab = a.merged(&b);
        let ba = b.merged(&a);
        assert_eq!(as_strings(&ab), as_strings(&ba));

        let idempotent = ab.merged(&ab);
        assert_eq!(as_strings(&idempotent), as_strings(&ab));
    }

    #[test]
    fn tombstone_wins_on_merge() {
        let mut a = ListCrdt::new();
        push(&mut a, Side::Right, 100, "r1", "a");
        let mut b = a.clone();
        b.delete_at(0);

        let merged = a.merged(&b);
        assert!(merged.is_empty());
    }
}
