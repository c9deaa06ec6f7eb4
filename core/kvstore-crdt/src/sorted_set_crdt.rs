//! Sorted-set CRDT backing ZADD/ZSCORE/ZRANGE et al.
//!
//! Each member's score is an independent LWW-Register keyed by
//! `(timestamp, replica_id)`, mirroring [`crate::HashCrdt`]. A derived
//! `(score, member)` index is kept alongside the map so range queries don't
//! need to re-sort on every call.

use kvstore_types::{ReplicaId, Timestamp};
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ScoreEntry {
    /// `None` marks a tombstone (the member was removed).
    score: Option<f64>,
    timestamp: Timestamp,
    replica_id: ReplicaId,
}

impl ScoreEntry {
    fn wins_over(&self, other: &Self) -> bool {
        match self.timestamp.cmp(&other.timestamp) {
            Ordering::Greater => true,
            Ordering::Less => false,
            Ordering::Equal => self.replica_id > other.replica_id,
        }
    }
}

/// A replicated sorted set with per-member last-writer-wins scores.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SortedSetCrdt {
    members: HashMap<String, ScoreEntry>,
    /// Derived index of live members ordered by `(score, member)`, kept in
    /// sync with `members` on every mutation.
    index: BTreeSet<(OrderedFloat<f64>, String)>,
}

impl SortedSetCrdt {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a member's score, stamped `(timestamp, replica_id)`. Returns
    /// `true` if this write wins over whatever was there before.
    pub fn set(
        &mut self,
        member: impl Into<String>,
        score: f64,
        timestamp: Timestamp,
        replica_id: ReplicaId,
    ) -> bool {
        let incoming = ScoreEntry {
            score: Some(score),
            timestamp,
            replica_id,
        };
        self.apply(member.into(), incoming)
    }

    /// Removes a member by writing a tombstone marker.
    pub fn remove(&mut self, member: impl Into<String>, timestamp: Timestamp, replica_id: ReplicaId) -> bool {
        let incoming = ScoreEntry {
            score: None,
            timestamp,
            replica_id,
        };
        self.apply(member.into(), incoming)
    }

    fn apply(&mut self, member: String, incoming: ScoreEntry) -> bool {
        match self.members.get(&member) {
            Some(existing) if !incoming.wins_over(existing) => false,
            _ => {
                if let Some(existing) = self.members.get(&member) {
                    if let Some(old_score) = existing.score {
                        self.index.remove(&(OrderedFloat(old_score), member.clone()));
                    }
                }
                if let Some(new_score) = incoming.score {
                    self.index.insert((OrderedFloat(new_score), member.clone()));
                }
                self.members.insert(member, incoming);
                true
            }
        }
    }

    #[must_use]
    pub fn score(&self, member: &str) -> Option<f64> {
        self.members.get(member).and_then(|e| e.score)
    }

    #[must_use]
    pub fn contains(&self, member: &str) -> bool {
        self.score(member).is_some()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.index.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Returns members in ascending `(score, member)` order.
    pub fn range(&self) -> impl DoubleEndedIterator<Item = (&str, f64)> {
        self.index.iter().map(|(score, member)| (member.as_str(), score.0))
    }

    /// Returns the 0-based rank of `member` in ascending score order.
    #[must_use]
    pub fn rank(&self, member: &str) -> Option<usize> {
        let score = self.score(member)?;
        self.index.iter().position(|(s, m)| s.0 == score && m == member)
    }

    /// Returns members whose score falls within `[min, max]`, ascending.
    pub fn range_by_score(&self, min: f64, max: f64) -> impl Iterator<Item = (&str, f64)> {
        self.index
            .range((OrderedFloat(min), String::new())..)
            .take_while(move |(s, _)| s.0 <= max)
            .map(|(score, member)| (member.as_str(), score.0))
    }

    /// Merges another sorted set into this one: per-member LWW on `(timestamp, replica_id)`.
    pub fn merge(&mut self, other: &Self) {
        for (member, other_entry) in &other.members {
            self.apply(member.clone(), other_entry.clone());
        }
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

    fn r(n: &str) -> ReplicaId {
        ReplicaId::new(n)
    }

    #[test]
    fn set_then_score() {
        let mut z = SortedSetCrdt::new();
        z.set("m1", 1.5, Timestamp::from_nanos(1), r("a"));
        assert_eq!(z.score("m1"), Some(1.5));
    }

    #[test]
    fn range_is_ascending_by_score() {
        let mut z = SortedSetCrdt::new();
        z.set("c", 3.0, Timestamp::from_nanos(1), r("a"));
        z.set("a", 1.0, Timestamp::from_nanos(2), r("a"));
        z.set("b", 2.0, Timestamp::from_nanos(3), r("a"));
        let names: Vec<&str> = z.range().map(|(m, _)| m).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
    }

    #[test]
    fn remove_then_set_with_greater_ts_resurrects() {
        let mut z = SortedSetCrdt::new();
        z.set("m1", 1.0, Timestamp::from_nanos(1), r("a"));
        z.remove("m1", Timestamp::from_nanos(2), r("a"));
        assert!(!z.contains("m1"));
        z.set("m1", 5.0, Timestamp::from_nanos(3), r("a"));
        assert_eq!(z.score("m1"), Some(5.0));
    }

    #[test]
    fn range_by_score_is_inclusive() {
        let mut z = SortedSetCrdt::new();
        z.set("a", 1.0, Timestamp::from_nanos(1), r("a"));
        z.set("b", 2.0, Timestamp::from_nanos(2), r("a"));
        z.set("c", 3.0, Timestamp::from_nanos(3), r("a"));
        let names: Vec<&str> = z.range_by_score(1.0, 2.0).map(|(m, _)| m).collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn merge_is_commutative_and_idempotent() {
        let mut a = SortedSetCrdt::new();
        a.set("m1", 1.0, Timestamp::from_nanos(1), r("a"));
        let mut b = SortedSetCrdt::new();
        b.set("m2", 2.0, Timestamp::from_nanos(2), r("b"));

        let ab = a.merged(&b);
        let ba = b.merged(&a);
        assert_eq!(ab.score("m1"), ba.score("m1"));
        assert_eq!(ab.score("m2"), ba.score("m2"));

        let idempotent = ab.merged(&ab);
        assert_eq!(idempotent.score("m1"), ab.score("m1"));
    }
}
