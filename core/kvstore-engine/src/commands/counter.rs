//! `INCR` / `INCRBY` / `DECR` / `DECRBY` / `INCRBYFLOAT` — the `Counter`
//! datatype family.
//!
//! Unlike the other datatypes, a `Counter`'s merge takes a per-replica
//! *maximum* of cumulative totals (it's a pair of G-Counters), not a union
//! or LWW pick. That means the payload shipped in the issuing `Operation`
//! must carry this replica's full cumulative total so far, not just this
//! call's delta — sending only the delta would let a later `max()` against
//! an already-seen lower total silently drop the increment. So every
//! command here reads the current counter, applies the delta on top of it,
//! and ships that whole (small) map.
//!
//! `INCRBYFLOAT` has no native float counter in the data model (`Counter`'s
//! `per_replica_totals` are `i64`): floats are represented as fixed-point,
//! scaled by [`FLOAT_SCALE`], so the same integer G-Counter merge applies
//! unchanged.

use kvstore_crdt::Payload;

use super::Commands;
use crate::error::{EngineError, EngineResult};

/// Fixed-point scale for `INCRBYFLOAT`/`HINCRBYFLOAT`: values are stored as
/// integer nanounits so the counter payload stays a plain `i64` G-Counter.
pub(crate) const FLOAT_SCALE: f64 = 1_000_000_000.0;

impl Commands {
    fn incr_counter(&self, key: &str, delta: i64, command: &str) -> EngineResult<i64> {
        let mut counter = self.current_counter(key)?;
        counter.apply_delta(&self.replica_id(), delta);
        let expire_at = self.existing_expire_at(key);
        let merged = self.issue_write(key, Payload::Counter(counter), expire_at, command)?;
        match merged.payload {
            Payload::Counter(c) => Ok(c.value()),
            _ => unreachable!("issue_write preserves the payload variant it was given"),
        }
    }

    /// `INCR key`.
    pub fn incr(&self, key: &str) -> EngineResult<i64> {
        self.incr_counter(key, 1, "INCRBY")
    }

    /// `INCRBY key delta`.
    pub fn incr_by(&self, key: &str, delta: i64) -> EngineResult<i64> {
        self.incr_counter(key, delta, "INCRBY")
    }

    /// `DECR key`.
    pub fn decr(&self, key: &str) -> EngineResult<i64> {
        self.incr_counter(key, -1, "INCRBY")
    }

    /// `DECRBY key delta`.
    pub fn decr_by(&self, key: &str, delta: i64) -> EngineResult<i64> {
        self.incr_counter(key, delta.checked_neg().ok_or_else(|| {
            EngineError::InvalidArgs("DECRBY: delta overflow negating i64::MIN".to_string())
        })?, "INCRBY")
    }

    /// `INCRBYFLOAT key delta`. Returns the new value as a float.
    pub fn incr_by_float(&self, key: &str, delta: f64) -> EngineResult<f64> {
        if !delta.is_finite() {
            return Err(EngineError::InvalidArgs("INCRBYFLOAT: delta must be finite".to_string()));
        }
        let scaled = (delta * FLOAT_SCALE).round() as i64;
        let value = self.incr_counter(key, scaled, "INCRBYFLOAT")?;
        Ok(value as f64 / FLOAT_SCALE)
    }

    /// Reads the counter's current value without mutating it, for `GET`-like
    /// introspection of a counter key from the server layer.
    pub fn counter_value(&self, key: &str) -> EngineResult<i64> {
        Ok(self.current_counter(key)?.value())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::TypedStore;
    use kvstore_types::ReplicaId;
    use std::sync::Arc;

    fn commands(replica: &str) -> (tempfile::TempDir, Commands) {
        let dir = tempfile::tempdir().unwrap();
        let store = TypedStore::open(
            dir.path().join("segments"),
            dir.path().join("oplog.log"),
            ReplicaId::new(replica),
            kvstore_storage::DEFAULT_MAX_SEGMENT_SIZE,
            kvstore_storage::DEFAULT_COMPACTION_THRESHOLD,
        )
        .unwrap();
        (dir, Commands::new(Arc::new(store)))
    }

    #[test]
    fn incr_then_decr() {
        let (_dir, cmds) = commands("r1");
        assert_eq!(cmds.incr("c").unwrap(), 1);
        assert_eq!(cmds.incr_by("c", 4).unwrap(), 5);
        assert_eq!(cmds.decr("c").unwrap(), 4);
        assert_eq!(cmds.decr_by("c", 2).unwrap(), 2);
    }

    #[test]
    fn incr_by_float_round_trips() {
        let (_dir, cmds) = commands("r1");
        let v = cmds.incr_by_float("c", 2.5).unwrap();
        assert!((v - 2.5).abs() < 1e-9);
        let v2 = cmds.incr_by_float("c", 1.25).unwrap();
        assert!((v2 - 3.75).abs() < 1e-9);
    }

    #[test]
    fn concurrent_replica_increments_converge_via_delta_replay() {
        // Scenario from the spec: 5 local INCRs on A, 3 on B, converge to 8.
        let (_dir_a, a) = commands("A");
        let (_dir_b, b) = commands("B");
        for _ in 0..5 {
            a.incr("c").unwrap();
        }
        for _ in 0..3 {
            b.incr("c").unwrap();
        }

        for op in a.store().operations_since(kvstore_types::Timestamp::from_nanos(0)).unwrap() {
            b.apply_operation(&op).unwrap();
        }
        for op in b.store().operations_since(kvstore_types::Timestamp::from_nanos(0)).unwrap() {
            a.apply_operation(&op).unwrap();
        }

        assert_eq!(a.counter_value("c").unwrap(), 8);
        assert_eq!(b.counter_value("c").unwrap(), 8);
    }
}
