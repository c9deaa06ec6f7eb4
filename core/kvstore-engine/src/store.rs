//! The in-memory typed store: a sharded index over `Value`, backed by the
//! segment log for durability and the operation log for replication
//! history.
//!
//! Locking discipline follows the design's acquire order strictly: key
//! shard lock, then the segment writer lock, then the op-log lock. A
//! sharded lock table (hashing the key into one of [`SHARD_COUNT`] buckets)
//! is used instead of one global lock so that writes to unrelated keys
//! don't serialize against each other.

use kvstore_crdt::Value;
use kvstore_storage::{LogEntry, OperationLog, SegmentManager, SegmentStats};
use kvstore_types::{Operation, ReplicaId, Timestamp};
use std::collections::HashMap;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::PathBuf;
use std::sync::{Mutex, RwLock};
use tracing::{debug, info};

use crate::error::EngineResult;

const SHARD_COUNT: usize = 64;

fn shard_of(key: &str) -> usize {
    let mut hasher = DefaultHasher::new();
    key.hash(&mut hasher);
    (hasher.finish() as usize) % SHARD_COUNT
}

/// The in-memory key -> Value index, guarded by a sharded lock table, with
/// the segment log and operation log behind their own locks underneath it.
pub struct TypedStore {
    shards: Vec<RwLock<HashMap<String, Value>>>,
    segments: Mutex<SegmentManager>,
    oplog: Mutex<OperationLog>,
    replica_id: ReplicaId,
}

impl TypedStore {
    /// Opens (or creates) the store at `data_dir`, replaying the segment
    /// log into the in-memory shards, and opens the operation log at
    /// `oplog_path`.
    pub fn open(
        data_dir: impl Into<PathBuf>,
        oplog_path: impl Into<PathBuf>,
        replica_id: ReplicaId,
        max_segment_size: u64,
        compaction_threshold: u64,
    ) -> EngineResult<Self> {
        let segments = SegmentManager::open_with_limits(data_dir, max_segment_size, compaction_threshold)?;
        let recovered = segments.load_all_entries()?;
        info!(keys = recovered.len(), "recovered keys from segment log");

        let mut shards: Vec<RwLock<HashMap<String, Value>>> =
            (0..SHARD_COUNT).map(|_| RwLock::new(HashMap::new())).collect();
        for (key, value) in recovered {
            let idx = shard_of(&key);
            shards[idx].write().unwrap().insert(key, value);
        }

        let oplog = OperationLog::open(oplog_path)?;

        Ok(Self {
            shards,
            segments: Mutex::new(segments),
            oplog: Mutex::new(oplog),
            replica_id,
        })
    }

    #[must_use]
    pub fn replica_id(&self) -> &ReplicaId {
        &self.replica_id
    }

    /// Returns the live value for `key`, or `None` if absent or expired as
    /// of `now`. Expiry is lazy: an expired value is simply not returned,
    /// it is not proactively removed here (the TTL sweeper does that).
    #[must_use]
    pub fn get(&self, key: &str, now: Timestamp) -> Option<Value> {
        let shard = self.shards[shard_of(key)].read().unwrap();
        shard.get(key).filter(|v| !v.is_expired_at(now)).cloned()
    }

    /// Installs `value` under `key`, merging with whatever is already
    /// present (or inserting fresh if absent or expired). Persists a SET
    /// segment record. Returns the resulting merged value. This is the
    /// single path used both by locally issued writes and by replayed
    /// remote operations — applying a remote op with its original
    /// `(timestamp, replica_id)` is indistinguishable from a local write
    /// carrying the same metadata.
    pub fn install_or_merge(&self, key: &str, value: Value, now: Timestamp) -> EngineResult<Value> {
        let idx = shard_of(key);
        let mut shard = self.shards[idx].write().unwrap();

        let merged = match shard.get(key) {
            Some(existing) if !existing.is_expired_at(now) => {
                let mut merged = existing.clone();
                merged.merge(&value)?;
                merged
            }
            _ => value,
        };

        self.segments
            .lock()
            .unwrap()
            .write_entry(LogEntry::set(key, merged.clone()))?;
        shard.insert(key.to_string(), merged.clone());
        Ok(merged)
    }

    /// Removes `key`, writing a DELETE tombstone stamped `(timestamp,
    /// replica_id)`. A later write with a greater pair may resurrect the
    /// key (handled by `install_or_merge`/recovery, not here). Returns
    /// whether a live value was present before the delete.
    pub fn remove(&self, key: &str, timestamp: Timestamp, replica_id: ReplicaId, now: Timestamp) -> EngineResult<bool> {
        let idx = shard_of(key);
        let mut shard = self.shards[idx].write().unwrap();
        let existed = shard.get(key).is_some_and(|v| !v.is_expired_at(now));

        self.segments
            .lock()
            .unwrap()
            .write_entry(LogEntry::delete(key, timestamp, replica_id))?;
        shard.remove(key);
        Ok(existed)
    }

    /// Appends a locally issued operation to the op-log. Never called for
    /// replayed remote operations — the op-log records only local history.
    pub fn record_local_operation(&self, op: &Operation) -> EngineResult<()> {
        self.oplog.lock().unwrap().append(op)?;
        Ok(())
    }

    /// Returns every locally issued operation with `timestamp > since`.
    pub fn operations_since(&self, since: Timestamp) -> EngineResult<Vec<Operation>> {
        Ok(self.oplog.lock().unwrap().get_operations(since)?)
    }

    /// Keys matching a simple substring/prefix pattern (`*` = all), for
    /// operational tooling and tests. Not Redis's cursor-based SCAN.
    #[must_use]
    pub fn keys(&self, pattern: &str, now: Timestamp) -> Vec<String> {
        let mut out = Vec::new();
        for shard in &self.shards {
            let guard = shard.read().unwrap();
            for (key, value) in guard.iter() {
                if value.is_expired_at(now) {
                    continue;
                }
                if pattern == "*" || key.contains(pattern) {
                    out.push(key.clone());
                }
            }
        }
        out
    }

    /// Proactively evicts every expired key. Returns the number removed.
    /// Driven by the optional TTL sweeper task.
    pub fn sweep_expired(&self, now: Timestamp) -> EngineResult<usize> {
        let mut removed = 0;
        for shard in &self.shards {
            let expired_keys: Vec<String> = {
                let guard = shard.read().unwrap();
                guard
                    .iter()
                    .filter(|(_, v)| v.is_expired_at(now))
                    .map(|(k, _)| k.clone())
                    .collect()
            };
            for key in expired_keys {
                let (ts, rid) = {
                    let guard = shard.read().unwrap();
                    match guard.get(&key) {
                        Some(v) => (v.timestamp, v.replica_id.clone()),
                        None => continue,
                    }
                };
                if self.remove(&key, ts.tick(), rid, now)? {
                    removed += 1;
                }
            }
        }
        if removed > 0 {
            debug!(removed, "TTL sweep evicted expired keys");
        }
        Ok(removed)
    }

    #[must_use]
    pub fn stats(&self) -> SegmentStats {
        self.segments.lock().unwrap().stats()
    }

    /// Runs compaction on the segment log. Does not touch the in-memory
    /// shards (they already hold the converged state); this only reduces
    /// on-disk segment count.
    pub fn compact(&self) -> EngineResult<usize> {
        Ok(self.segments.lock().unwrap().compact()?)
    }

    /// Total bytes across all segments, used by the compaction worker to
    /// decide whether to trigger a run.
    pub fn total_size_bytes(&self) -> EngineResult<u64> {
        Ok(self.segments.lock().unwrap().total_size_bytes()?)
    }

    pub fn compaction_threshold(&self) -> u64 {
        self.segments.lock().unwrap().compaction_threshold()
    }

    /// Flushes the operation log. Called at shutdown.
    pub fn close(&self) -> EngineResult<()> {
        self.oplog.lock().unwrap().close()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kvstore_crdt::Payload;

    fn open_store() -> (tempfile::TempDir, TypedStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = TypedStore::open(
            dir.path().join("segments"),
            dir.path().join("oplog.log"),
            ReplicaId::new("r1"),
            kvstore_storage::DEFAULT_MAX_SEGMENT_SIZE,
            kvstore_storage::DEFAULT_COMPACTION_THRESHOLD,
        )
        .unwrap();
        (dir, store)
    }

    #[test]
    fn install_then_get_round_trips() {
        let (_dir, store) = open_store();
        let now = Timestamp::from_nanos(1);
        let value = Value::new(Payload::String(b"v".to_vec()), now, ReplicaId::new("r1"));
        store.install_or_merge("k", value, now).unwrap();

        let got = store.get("k", now).unwrap();
        match got.payload {
            Payload::String(v) => assert_eq!(v, b"v"),
            _ => panic!("wrong payload"),
        }
    }

    #[test]
    fn remove_then_get_returns_none() {
        let (_dir, store) = open_store();
        let now = Timestamp::from_nanos(1);
        let value = Value::new(Payload::String(b"v".to_vec()), now, ReplicaId::new("r1"));
        store.install_or_merge("k", value, now).unwrap();
        store.remove("k", Timestamp::from_nanos(2), ReplicaId::new("r1"), now).unwrap();
        assert!(store.get("k", now).is_none());
    }

    #[test]
    fn expired_key_reads_as_absent() {
        let (_dir, store) = open_store();
        let mut value = Value::new(Payload::String(b"v".to_vec()), Timestamp::from_nanos(1), ReplicaId::new("r1"));
        value.expire_at = Some(Timestamp::from_nanos(100));
        store.install_or_merge("k", value, Timestamp::from_nanos(1)).unwrap();

        assert!(store.get("k", Timestamp::from_nanos(50)).is_some());
        assert!(store.get("k", Timestamp::from_nanos(150)).is_none());
    }

    #[test]
    fn recovers_state_after_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let data_dir = dir.path().join("segments");
        let oplog_path = dir.path().join("oplog.log");
        {
            let store = TypedStore::open(
                &data_dir,
                &oplog_path,
                ReplicaId::new("r1"),
                kvstore_storage::DEFAULT_MAX_SEGMENT_SIZE,
                kvstore_storage::DEFAULT_COMPACTION_THRESHOLD,
            )
            .unwrap();
            let value = Value::new(Payload::String(b"v".to_vec()), Timestamp::from_nanos(1), ReplicaId::new("r1"));
            store.install_or_merge("k", value, Timestamp::from_nanos(1)).unwrap();
        }
        let store = TypedStore::open(
            &data_dir,
            &oplog_path,
            ReplicaId::new("r1"),
            kvstore_storage::DEFAULT_MAX_SEGMENT_SIZE,
            kvstore_storage::DEFAULT_COMPACTION_THRESHOLD,
        )
        .unwrap();
        assert!(store.get("k", Timestamp::from_nanos(1)).is_some());
    }

    #[test]
    fn sweep_expired_evicts_and_persists_tombstone() {
        let (_dir, store) = open_store();
        let mut value = Value::new(Payload::String(b"v".to_vec()), Timestamp::from_nanos(1), ReplicaId::new("r1"));
        value.expire_at = Some(Timestamp::from_nanos(10));
        store.install_or_merge("k", value, Timestamp::from_nanos(1)).unwrap();

        let removed = store.sweep_expired(Timestamp::from_nanos(20)).unwrap();
        assert_eq!(removed, 1);
        assert!(store.get("k", Timestamp::from_nanos(20)).is_none());
    }
}
