//! `ZADD` / `ZREM` / `ZSCORE` / `ZCARD` / `ZRANK` / `ZRANGE` /
//! `ZRANGEBYSCORE` / `ZINCRBY` — the `SortedSet` datatype family.
//!
//! Mirrors [`super::hash`]: each member's score is an independent
//! last-writer-wins register, so a single member set or remove is a
//! complete, self-sufficient delta.

use kvstore_crdt::{Payload, SortedSetCrdt};

use super::Commands;
use crate::error::{EngineError, EngineResult};

impl Commands {
    /// `ZADD key score member [score member ...]`. Returns the number of
    /// members newly created (not merely re-scored).
    pub fn zadd(&self, key: &str, pairs: Vec<(f64, String)>) -> EngineResult<usize> {
        if pairs.is_empty() {
            return Err(EngineError::InvalidArgs("ZADD: requires at least one score/member pair".to_string()));
        }
        let current = self.current_sorted_set(key)?;
        let mut created = 0;
        let mut delta = SortedSetCrdt::new();
        for (score, member) in pairs {
            if !score.is_finite() {
                return Err(EngineError::InvalidArgs("ZADD: score must be finite".to_string()));
            }
            if !current.contains(&member) {
                created += 1;
            }
            let ts = self.next_timestamp();
            delta.set(member, score, ts, self.replica_id());
        }
        let expire_at = self.existing_expire_at(key);
        self.issue_write(key, Payload::SortedSet(delta), expire_at, "ZADD")?;
        Ok(created)
    }

    /// `ZREM key member [member ...]`. Returns the number of members
    /// removed.
    pub fn zrem(&self, key: &str, members: Vec<String>) -> EngineResult<usize> {
        let current = self.current_sorted_set(key)?;
        let mut delta = SortedSetCrdt::new();
        let mut removed = 0;
        for member in members {
            if current.contains(&member) {
                removed += 1;
            }
            let ts = self.next_timestamp();
            delta.remove(member, ts, self.replica_id());
        }
        if removed > 0 {
            let expire_at = self.existing_expire_at(key);
            self.issue_write(key, Payload::SortedSet(delta), expire_at, "ZREM")?;
        }
        Ok(removed)
    }

    /// `ZSCORE key member`.
    pub fn zscore(&self, key: &str, member: &str) -> EngineResult<Option<f64>> {
        Ok(self.current_sorted_set(key)?.score(member))
    }

    /// `ZCARD key`.
    pub fn zcard(&self, key: &str) -> EngineResult<usize> {
        Ok(self.current_sorted_set(key)?.len())
    }

    /// `ZRANK key member`: 0-based rank in ascending score order.
    pub fn zrank(&self, key: &str, member: &str) -> EngineResult<Option<usize>> {
        Ok(self.current_sorted_set(key)?.rank(member))
    }

    /// `ZRANGE key start stop`: members in ascending score order, Redis-style
    /// inclusive possibly-negative indices.
    pub fn zrange(&self, key: &str, start: i64, stop: i64) -> EngineResult<Vec<(String, f64)>> {
        let zset = self.current_sorted_set(key)?;
        let all: Vec<(String, f64)> = zset.range().map(|(m, s)| (m.to_string(), s)).collect();
        let len = all.len() as i64;
        if len == 0 {
            return Ok(Vec::new());
        }
        let start = if start < 0 { (len + start).max(0) } else { start.min(len - 1).max(0) };
        let stop = if stop < 0 { len + stop } else { stop.min(len - 1) };
        if stop < start || start >= len {
            return Ok(Vec::new());
        }
        Ok(all[start as usize..=stop.max(0) as usize].to_vec())
    }

    /// `ZRANGEBYSCORE key min max`: members with `min <= score <= max`,
    /// ascending.
    pub fn zrangebyscore(&self, key: &str, min: f64, max: f64) -> EngineResult<Vec<(String, f64)>> {
        Ok(self
            .current_sorted_set(key)?
            .range_by_score(min, max)
            .map(|(m, s)| (m.to_string(), s))
            .collect())
    }

    /// `ZINCRBY key delta member`. Returns the member's new score.
    pub fn zincrby(&self, key: &str, member: &str, delta: f64) -> EngineResult<f64> {
        if !delta.is_finite() {
            return Err(EngineError::InvalidArgs("ZINCRBY: delta must be finite".to_string()));
        }
        let current = self.current_sorted_set(key)?;
        let new_score = current.score(member).unwrap_or(0.0) + delta;

        let mut delta_zset = SortedSetCrdt::new();
        let ts = self.next_timestamp();
        delta_zset.set(member, new_score, ts, self.replica_id());
        let expire_at = self.existing_expire_at(key);
        self.issue_write_at(key, Payload::SortedSet(delta_zset), expire_at, "ZINCRBY", ts)?;
        Ok(new_score)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::TypedStore;
    use kvstore_types::ReplicaId;
    use std::sync::Arc;

    fn commands() -> (tempfile::TempDir, Commands) {
        let dir = tempfile::tempdir().unwrap();
        let store = TypedStore::open(
            dir.path().join("segments"),
            dir.path().join("oplog.log"),
            ReplicaId::new("r1"),
            kvstore_storage::DEFAULT_MAX_SEGMENT_SIZE,
            kvstore_storage::DEFAULT_COMPACTION_THRESHOLD,
        )
        .unwrap();
        (dir, Commands::new(Arc::new(store)))
    }

    #[test]
    fn zadd_then_zscore_and_rank() {
        let (_dir, cmds) = commands();
        cmds.zadd("z", vec![(3.0, "c".to_string()), (1.0, "a".to_string()), (2.0, "b".to_string())]).unwrap();
        assert_eq!(cmds.zscore("z", "b").unwrap(), Some(2.0));
        assert_eq!(cmds.zrank("z", "a").unwrap(), Some(0));
        assert_eq!(cmds.zrank("z", "c").unwrap(), Some(2));
    }

    #[test]
    fn zrange_ascending() {
        let (_dir, cmds) = commands();
        cmds.zadd("z", vec![(3.0, "c".to_string()), (1.0, "a".to_string()), (2.0, "b".to_string())]).unwrap();
        let names: Vec<String> = cmds.zrange("z", 0, -1).unwrap().into_iter().map(|(m, _)| m).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
    }

    #[test]
    fn zrem_removes_member() {
        let (_dir, cmds) = commands();
        cmds.zadd("z", vec![(1.0, "a".to_string())]).unwrap();
        assert_eq!(cmds.zrem("z", vec!["a".to_string()]).unwrap(), 1);
        assert_eq!(cmds.zscore("z", "a").unwrap(), None);
    }

    #[test]
    fn zincrby_accumulates() {
        let (_dir, cmds) = commands();
        cmds.zadd("z", vec![(1.0, "a".to_string())]).unwrap();
        let score = cmds.zincrby("z", "a", 2.5).unwrap();
        assert_eq!(score, 3.5);
        assert_eq!(cmds.zscore("z", "a").unwrap(), Some(3.5));
    }
}
