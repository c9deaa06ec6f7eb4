//! `HSET` / `HGET` / `HDEL` / `HKEYS` / `HVALS` / `HGETALL` / `HLEN` /
//! `HEXISTS` / `HINCRBY` / `HINCRBYFLOAT` — the `Hash` datatype family.
//!
//! Each field is an independent last-writer-wins register, so a single
//! field set or delete is itself a complete, self-sufficient delta — no
//! cumulative-state trick is needed the way `Counter` needs one.

use kvstore_crdt::{HashCrdt, Payload};

use super::Commands;
use super::counter::FLOAT_SCALE;
use crate::error::{EngineError, EngineResult};

impl Commands {
    /// `HSET key field value [field value ...]`. Returns the number of
    /// fields that were newly created (not merely updated).
    pub fn hset(&self, key: &str, pairs: Vec<(String, Vec<u8>)>) -> EngineResult<usize> {
        if pairs.is_empty() {
            return Err(EngineError::InvalidArgs("HSET: requires at least one field/value pair".to_string()));
        }
        let current = self.current_hash(key)?;
        let mut created = 0;
        let mut delta = HashCrdt::new();
        for (field, value) in pairs {
            if !current.contains(&field) {
                created += 1;
            }
            let ts = self.next_timestamp();
            delta.set(field, value, ts, self.replica_id());
        }
        let expire_at = self.existing_expire_at(key);
        self.issue_write(key, Payload::Hash(delta), expire_at, "HSET")?;
        Ok(created)
    }

    /// `HGET key field`.
    pub fn hget(&self, key: &str, field: &str) -> EngineResult<Option<Vec<u8>>> {
        Ok(self.current_hash(key)?.get(field).map(<[u8]>::to_vec))
    }

    /// `HDEL key field [field ...]`. Returns the number of fields removed.
    pub fn hdel(&self, key: &str, fields: Vec<String>) -> EngineResult<usize> {
        let current = self.current_hash(key)?;
        let mut delta = HashCrdt::new();
        let mut removed = 0;
        for field in fields {
            if current.contains(&field) {
                removed += 1;
            }
            let ts = self.next_timestamp();
            delta.delete(field, ts, self.replica_id());
        }
        if removed > 0 {
            let expire_at = self.existing_expire_at(key);
            self.issue_write(key, Payload::Hash(delta), expire_at, "HDEL")?;
        }
        Ok(removed)
    }

    /// `HKEYS key`.
    pub fn hkeys(&self, key: &str) -> EngineResult<Vec<String>> {
        Ok(self.current_hash(key)?.keys().map(str::to_string).collect())
    }

    /// `HVALS key`.
    pub fn hvals(&self, key: &str) -> EngineResult<Vec<Vec<u8>>> {
        Ok(self.current_hash(key)?.iter().map(|(_, v)| v.to_vec()).collect())
    }

    /// `HGETALL key`.
    pub fn hgetall(&self, key: &str) -> EngineResult<Vec<(String, Vec<u8>)>> {
        Ok(self.current_hash(key)?.iter().map(|(k, v)| (k.to_string(), v.to_vec())).collect())
    }

    /// `HLEN key`.
    pub fn hlen(&self, key: &str) -> EngineResult<usize> {
        Ok(self.current_hash(key)?.len())
    }

    /// `HEXISTS key field`.
    pub fn hexists(&self, key: &str, field: &str) -> EngineResult<bool> {
        Ok(self.current_hash(key)?.contains(field))
    }

    fn field_as_int(hash: &HashCrdt, field: &str) -> EngineResult<i64> {
        match hash.get(field) {
            Some(bytes) => std::str::from_utf8(bytes)
                .ok()
                .and_then(|s| s.parse::<i64>().ok())
                .ok_or_else(|| EngineError::InvalidArgs(format!("HINCRBY: field {field} is not an integer"))),
            None => Ok(0),
        }
    }

    /// `HINCRBY key field delta`.
    pub fn hincrby(&self, key: &str, field: &str, delta: i64) -> EngineResult<i64> {
        let current = self.current_hash(key)?;
        let new_value = Self::field_as_int(&current, field)?
            .checked_add(delta)
            .ok_or_else(|| EngineError::InvalidArgs("HINCRBY: overflow".to_string()))?;

        let mut delta_hash = HashCrdt::new();
        let ts = self.next_timestamp();
        delta_hash.set(field, new_value.to_string().into_bytes(), ts, self.replica_id());
        let expire_at = self.existing_expire_at(key);
        self.issue_write_at(key, Payload::Hash(delta_hash), expire_at, "HINCRBY", ts)?;
        Ok(new_value)
    }

    /// `HINCRBYFLOAT key field delta`. Fixed-point the same way as
    /// `INCRBYFLOAT` (see [`FLOAT_SCALE`]), but the field itself is stored
    /// as a plain decimal string so `HGET` reads back a normal-looking
    /// value rather than a scaled integer.
    pub fn hincrbyfloat(&self, key: &str, field: &str, delta: f64) -> EngineResult<f64> {
        if !delta.is_finite() {
            return Err(EngineError::InvalidArgs("HINCRBYFLOAT: delta must be finite".to_string()));
        }
        let current = self.current_hash(key)?;
        let current_scaled = match current.get(field) {
            Some(bytes) => std::str::from_utf8(bytes)
                .ok()
                .and_then(|s| s.parse::<f64>().ok())
                .map(|v| (v * FLOAT_SCALE).round() as i64)
                .ok_or_else(|| EngineError::InvalidArgs(format!("HINCRBYFLOAT: field {field} is not a float")))?,
            None => 0,
        };
        let new_scaled = current_scaled + (delta * FLOAT_SCALE).round() as i64;
        let new_value = new_scaled as f64 / FLOAT_SCALE;

        let mut delta_hash = HashCrdt::new();
        let ts = self.next_timestamp();
        delta_hash.set(field, new_value.to_string().into_bytes(), ts, self.replica_id());
        let expire_at = self.existing_expire_at(key);
        self.issue_write_at(key, Payload::Hash(delta_hash), expire_at, "HINCRBYFLOAT", ts)?;
        Ok(new_value)
    }
}
