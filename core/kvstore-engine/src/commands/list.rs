//! `LPUSH` / `RPUSH` / `LPOP` / `RPOP` / `LRANGE` / `LINDEX` / `LSET` /
//! `LINSERT` / `LTRIM` / `LREM` — the `List` datatype family.
//!
//! Pushes and pops ship a delta containing only the affected entries
//! (minted or tombstoned ids), not the full list — `ListCrdt::merge` is a
//! union over entries plus an OR of tombstone bits, so a delta-only payload
//! is sufficient for convergence. `LSET`/`LINSERT` additionally need a
//! fresh id at (or near) a specific position; see
//! [`kvstore_crdt::ListCrdt::reinsert_near`] and
//! [`kvstore_crdt::ListCrdt::insert_between`].

use kvstore_crdt::{ElementId, ListCrdt, Payload, Side};

use super::Commands;
use crate::error::{EngineError, EngineResult};

/// Resolves a Redis-style possibly-negative index against a length,
/// returning `None` if still out of bounds after normalizing.
fn normalize_index(index: i64, len: i64) -> Option<usize> {
    let resolved = if index < 0 { len + index } else { index };
    if resolved < 0 || resolved >= len {
        None
    } else {
        Some(resolved as usize)
    }
}

impl Commands {
    fn push(&self, key: &str, values: Vec<Vec<u8>>, side: Side, command: &str) -> EngineResult<usize> {
        if values.is_empty() {
            return Err(EngineError::InvalidArgs(format!("{command}: requires at least one value")));
        }
        self.current_list(key)?;
        let mut delta = ListCrdt::new();
        for value in values {
            let ts = self.next_timestamp();
            let id = delta.next_id(side, ts, self.replica_id());
            delta.insert_with_id(id, value);
        }
        let expire_at = self.existing_expire_at(key);
        let merged = self.issue_write(key, Payload::List(delta), expire_at, command)?;
        match merged.payload {
            Payload::List(l) => Ok(l.len()),
            _ => unreachable!("issue_write preserves the payload variant it was given"),
        }
    }

    /// `LPUSH key value [value ...]`. Each value prepends in turn, so the
    /// last value given ends up closest to the head.
    pub fn lpush(&self, key: &str, values: Vec<Vec<u8>>) -> EngineResult<usize> {
        self.push(key, values, Side::Left, "LPUSH")
    }

    /// `RPUSH key value [value ...]`.
    pub fn rpush(&self, key: &str, values: Vec<Vec<u8>>) -> EngineResult<usize> {
        self.push(key, values, Side::Right, "RPUSH")
    }

    fn pop(&self, key: &str, side: Side, command: &str) -> EngineResult<Option<Vec<u8>>> {
        let list = self.current_list(key)?;
        if list.is_empty() {
            return Ok(None);
        }
        let index = match side {
            Side::Left => 0,
            Side::Right => list.len() - 1,
        };
        let id = list.id_at(index).expect("index within bounds of a non-empty list");
        let value = list.get(index).expect("index within bounds of a non-empty list");
        let delta = ListCrdt::delta_remove(id, value.clone());
        let expire_at = self.existing_expire_at(key);
        self.issue_write(key, Payload::List(delta), expire_at, command)?;
        Ok(Some(value))
    }

    /// `LPOP key`.
    pub fn lpop(&self, key: &str) -> EngineResult<Option<Vec<u8>>> {
        self.pop(key, Side::Left, "LPOP")
    }

    /// `RPOP key`.
    pub fn rpop(&self, key: &str) -> EngineResult<Option<Vec<u8>>> {
        self.pop(key, Side::Right, "RPOP")
    }

    /// `LLEN key`.
    pub fn llen(&self, key: &str) -> EngineResult<usize> {
        Ok(self.current_list(key)?.len())
    }

    /// `LINDEX key index`.
    pub fn lindex(&self, key: &str, index: i64) -> EngineResult<Option<Vec<u8>>> {
        let list = self.current_list(key)?;
        match normalize_index(index, list.len() as i64) {
            Some(i) => Ok(list.get(i)),
            None => Ok(None),
        }
    }

    /// `LRANGE key start stop`, inclusive of both ends, Redis-style negative
    /// indices and clamped out-of-range bounds.
    pub fn lrange(&self, key: &str, start: i64, stop: i64) -> EngineResult<Vec<Vec<u8>>> {
        let list = self.current_list(key)?;
        let len = list.len() as i64;
        if len == 0 {
            return Ok(Vec::new());
        }
        let start = if start < 0 { (len + start).max(0) } else { start.min(len - 1).max(0) };
        let stop = if stop < 0 { len + stop } else { stop.min(len - 1) };
        if stop < start || start >= len {
            return Ok(Vec::new());
        }
        let all = list.to_vec();
        Ok(all[start as usize..=(stop.max(0) as usize).min(all.len() - 1)].to_vec())
    }

    /// `LSET key index value`. Replaces the value at `index` without moving
    /// its position, by tombstoning the old id and minting a new one at the
    /// same rank.
    pub fn lset(&self, key: &str, index: i64, value: Vec<u8>) -> EngineResult<()> {
        let list = self.current_list(key)?;
        let idx = normalize_index(index, list.len() as i64)
            .ok_or_else(|| EngineError::InvalidArgs("LSET: index out of range".to_string()))?;
        let old_id = list.id_at(idx).expect("normalized index is in bounds");
        let old_value = list.get(idx).expect("normalized index is in bounds");

        let mut delta = ListCrdt::delta_remove(old_id, old_value);
        delta.reinsert_near(old_id, value);

        let expire_at = self.existing_expire_at(key);
        self.issue_write(key, Payload::List(delta), expire_at, "LSET")?;
        Ok(())
    }

    /// `LINSERT key BEFORE|AFTER pivot value`. Inserts `value` adjacent to
    /// the first element equal to `pivot`. Returns the new length, or `-1`
    /// if `pivot` wasn't found (matching Redis).
    pub fn linsert(&self, key: &str, before: bool, pivot: &[u8], value: Vec<u8>) -> EngineResult<i64> {
        let list = self.current_list(key)?;
        let all = list.to_vec();
        let Some(pivot_index) = all.iter().position(|v| v.as_slice() == pivot) else {
            return Ok(-1);
        };

        let pivot_id = list.id_at(pivot_index).expect("pivot_index came from to_vec, in bounds");
        let (left, right): (Option<ElementId>, Option<ElementId>) = if before {
            let left = if pivot_index == 0 { None } else { list.id_at(pivot_index - 1) };
            (left, Some(pivot_id))
        } else {
            let right = list.id_at(pivot_index + 1);
            (Some(pivot_id), right)
        };

        let mut delta = ListCrdt::new();
        delta.insert_between(left, right, self.replica_id(), value);
        let expire_at = self.existing_expire_at(key);
        let merged = self.issue_write(key, Payload::List(delta), expire_at, "LINSERT")?;
        match merged.payload {
            Payload::List(l) => Ok(l.len() as i64),
            _ => unreachable!("issue_write preserves the payload variant it was given"),
        }
    }

    /// `LTRIM key start stop`. Keeps only the inclusive `[start, stop]`
    /// range, tombstoning everything else.
    pub fn ltrim(&self, key: &str, start: i64, stop: i64) -> EngineResult<()> {
        let list = self.current_list(key)?;
        let len = list.len() as i64;
        if len == 0 {
            return Ok(());
        }
        let start = if start < 0 { (len + start).max(0) } else { start };
        let stop = if stop < 0 { len + stop } else { stop };

        let mut delta = ListCrdt::new();
        for index in 0..list.len() {
            let keep = (index as i64) >= start && (index as i64) <= stop;
            if !keep {
                let id = list.id_at(index).expect("index within bounds");
                let value = list.get(index).expect("index within bounds");
                let tomb = ListCrdt::delta_remove(id, value);
                delta.merge(&tomb);
            }
        }
        let expire_at = self.existing_expire_at(key);
        self.issue_write(key, Payload::List(delta), expire_at, "LTRIM")?;
        Ok(())
    }

    /// `LREM key count value`. `count > 0` removes the first `count`
    /// matches from the head; `count < 0` from the tail; `count == 0`
    /// removes every match. Returns the number removed.
    pub fn lrem(&self, key: &str, count: i64, value: &[u8]) -> EngineResult<usize> {
        let list = self.current_list(key)?;
        let all = list.to_vec();
        let mut matches: Vec<usize> = all
            .iter()
            .enumerate()
            .filter(|(_, v)| v.as_slice() == value)
            .map(|(i, _)| i)
            .collect();

        if count > 0 {
            matches.truncate(count as usize);
        } else if count < 0 {
            let keep = (-count) as usize;
            let start = matches.len().saturating_sub(keep);
            matches = matches.split_off(start);
        }

        let mut delta = ListCrdt::new();
        for index in &matches {
            let id = list.id_at(*index).expect("index within bounds");
            let v = list.get(*index).expect("index within bounds");
            let tomb = ListCrdt::delta_remove(id, v);
            delta.merge(&tomb);
        }
        let removed = matches.len();
        if removed > 0 {
            let expire_at = self.existing_expire_at(key);
            self.issue_write(key, Payload::List(delta), expire_at, "LREM")?;
        }
        Ok(removed)
    }
}
