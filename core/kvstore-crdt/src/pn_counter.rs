//! Positive-Negative Counter CRDT.
//!
//! Realized as two G-Counters (one for increments, one for decrements) keyed
//! by replica id; the observed value is `sum(positive) - sum(negative)`.
//! Merge takes the per-replica, per-sign maximum, which keeps each map a
//! true G-Counter (monotone per replica) while letting the overall value
//! move in either direction.

use kvstore_types::ReplicaId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A Positive-Negative Counter CRDT.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PnCounter {
    positive: HashMap<ReplicaId, u64>,
    negative: HashMap<ReplicaId, u64>,
}

impl PnCounter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies a signed delta at the given replica, splitting it into the
    /// positive or negative map as appropriate. This is how INCR/DECR/INCRBY
    /// with arbitrary (possibly negative) deltas are represented.
    pub fn apply_delta(&mut self, replica_id: &ReplicaId, delta: i64) {
        if delta >= 0 {
            *self.positive.entry(replica_id.clone()).or_insert(0) += delta as u64;
        } else {
            *self.negative.entry(replica_id.clone()).or_insert(0) += delta.unsigned_abs();
        }
    }

    #[must_use]
    pub fn value(&self) -> i64 {
        let pos: u64 = self.positive.values().sum();
        let neg: u64 = self.negative.values().sum();
        pos as i64 - neg as i64
    }

    /// Merges another counter into this one (per-replica, per-sign maximum).
    pub fn merge(&mut self, other: &Self) {
        for (replica_id, &count) in &other.positive {
            let entry = self.positive.entry(replica_id.clone()).or_insert(0);
            *entry = (*entry).max(count);
        }
        for (replica_id, &count) in &other.negative {
            let entry = self.negative.entry(replica_id.clone()).or_insert(0);
            *entry = (*entry).max(count);
        }
    }

    #[must_use]
    pub fn merged(&self, other: &Self) -> Self {
        let mut result = self.clone();
        result.merge(other);
        result
    }
}

impl PartialEq for PnCounter {
    fn eq(&self, other: &Self) -> bool {
        let all_pos: std::collections::HashSet<_> =
            self.positive.keys().chain(other.positive.keys()).collect();
        let all_neg: std::collections::HashSet<_> =
            self.negative.keys().chain(other.negative.keys()).collect();

        all_pos.into_iter().all(|r| {
            self.positive.get(r).copied().unwrap_or(0) == other.positive.get(r).copied().unwrap_or(0)
        }) && all_neg.into_iter().all(|r| {
            self.negative.get(r).copied().unwrap_or(0) == other.negative.get(r).copied().unwrap_or(0)
        })
    }
}

impl Eq for PnCounter {}

#[cfg(test)]
mod tests {
    use super::*;

    fn r(name: &str) -> ReplicaId {
        ReplicaId::new(name)
    }

    #[test]
    fn increment_and_decrement() {
        let mut c = PnCounter::new();
        c.apply_delta(&r("a"), 5);
        c.apply_delta(&r("a"), -2);
        assert_eq!(c.value(), 3);
    }

    #[test]
    fn value_can_go_negative() {
        let mut c = PnCounter::new();
        c.apply_delta(&r("a"), -5);
        assert_eq!(c.value(), -5);
    }

    #[test]
    fn merge_is_commutative() {
        let mut a = PnCounter::new();
        a.apply_delta(&r("a"), 3);
        a.apply_delta(&r("b"), -1);

        let mut b = PnCounter::new();
        b.apply_delta(&r("b"), 5);
        b.apply_delta(&r("a"), -2);

        let ab = a.merged(&b);
        let ba = b.merged(&a);
        assert_eq!(ab, ba);
    }

    #[test]
    fn merge_is_associative() {
        let mut a = PnCounter::new();
        a.apply_delta(&r("a"), 1);
        let mut b = PnCounter::new();
        b.apply_delta(&r("b"), 2);
        let mut c = PnCounter::new();
        c.apply_delta(&r("c"), -1);

        let ab_c = a.merged(&b).merged(&c);
        let a_bc = a.merged(&b.merged(&c));
        assert_eq!(ab_c, a_bc);
    }

    #[test]
    fn merge_is_idempotent() {
        let mut a = PnCounter::new();
        a.apply_delta(&r("a"), 5);
        let aa = a.merged(&a);
        assert_eq!(a, aa);
    }

    #[test]
    fn merge_takes_per_replica_max() {
        // Concurrency scenario from the spec: 5 local INCRs on A, 3 on B.
        let mut a = PnCounter::new();
        for _ in 0..5 {
            a.apply_delta(&r("a"), 1);
        }
        let mut b = PnCounter::new();
        for _ in 0..3 {
            b.apply_delta(&r("b"), 1);
        }
        let merged = a.merged(&b);
        assert_eq!(merged.value(), 8);
    }
}
