//! Append-only segment log: the durable record of key -> Value transitions.
//!
//! Segments are flat files named `segment-<id>.log` in a data directory,
//! `id` monotonically increasing; the highest id is the active (writable)
//! segment, everything below it is sealed. Each record is a length-prefixed,
//! self-describing [`LogEntry`] — a 4-byte big-endian length followed by its
//! JSON encoding. A record is only ever considered present if both the
//! prefix and the full payload were read back intact; anything less is
//! treated as a truncated tail left by a crash mid-append and silently
//! discarded. A record whose prefix claims a length that IS on disk but
//! fails to parse is a different failure — corruption, not truncation — and
//! is reported as [`StorageError::Recovery`].

use crate::error::{StorageError, StorageResult};
use kvstore_crdt::Value;
use kvstore_types::{ReplicaId, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

const SEGMENT_PREFIX: &str = "segment-";
const SEGMENT_SUFFIX: &str = ".log";
const COMPACTING_SUFFIX: &str = ".tmp";

/// Default active-segment rotation threshold: 64 MiB.
pub const DEFAULT_MAX_SEGMENT_SIZE: u64 = 64 * 1024 * 1024;
/// Default total-on-disk compaction trigger: 1 GiB.
pub const DEFAULT_COMPACTION_THRESHOLD: u64 = 1024 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    Set,
    Delete,
}

/// A single durable record: a key transition, with enough metadata to
/// resolve LWW against any other record for the same key regardless of the
/// order segments are replayed in.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: Timestamp,
    pub replica_id: ReplicaId,
    pub operation: EntryKind,
    pub key: String,
    pub value: Option<Value>,
}

impl LogEntry {
    #[must_use]
    pub fn set(key: impl Into<String>, value: Value) -> Self {
        Self {
            timestamp: value.timestamp,
            replica_id: value.replica_id.clone(),
            operation: EntryKind::Set,
            key: key.into(),
            value: Some(value),
        }
    }

    #[must_use]
    pub fn delete(key: impl Into<String>, timestamp: Timestamp, replica_id: ReplicaId) -> Self {
        Self {
            timestamp,
            replica_id,
            operation: EntryKind::Delete,
            key: key.into(),
            value: None,
        }
    }
}

/// Recovery-time per-key state: either a live value or a delete tombstone,
/// each stamped so a later record for the same key can be LWW-compared
/// against it irrespective of read order.
enum Slot {
    Value(Value),
    Tombstone { timestamp: Timestamp, replica_id: ReplicaId },
}

impl Slot {
    fn stamp(&self) -> (Timestamp, &ReplicaId) {
        match self {
            Slot::Value(v) => (v.timestamp, &v.replica_id),
            Slot::Tombstone { timestamp, replica_id } => (*timestamp, replica_id),
        }
    }

    fn wins_over(&self, timestamp: Timestamp, replica_id: &ReplicaId) -> bool {
        let (their_ts, their_rid) = self.stamp();
        (timestamp, replica_id) > (their_ts, their_rid)
    }
}

fn apply_entry(map: &mut HashMap<String, Slot>, entry: LogEntry) -> StorageResult<()> {
    match entry.operation {
        EntryKind::Set => {
            let incoming = entry.value.expect("set entry always carries a value");
            match map.get_mut(&entry.key) {
                None => {
                    map.insert(entry.key, Slot::Value(incoming));
                }
                Some(Slot::Value(existing)) => {
                    // Value::merge already resolves LWW (String) or performs
                    // a monotone CRDT merge (everything else) internally, so
                    // it is safe to call regardless of record replay order.
                    existing.merge(&incoming)?;
                }
                Some(slot @ Slot::Tombstone { .. }) => {
                    if incoming.timestamp > slot.stamp().0
                        || (incoming.timestamp == slot.stamp().0 && &incoming.replica_id > slot.stamp().1)
                    {
                        *slot = Slot::Value(incoming);
                    }
                }
            }
        }
        EntryKind::Delete => match map.get_mut(&entry.key) {
            None => {
                map.insert(
                    entry.key,
                    Slot::Tombstone {
                        timestamp: entry.timestamp,
                        replica_id: entry.replica_id,
                    },
                );
            }
            Some(slot) => {
                if slot.wins_over(entry.timestamp, &entry.replica_id) {
                    // existing record is newer than this delete; ignore it
                } else {
                    *slot = Slot::Tombstone {
                        timestamp: entry.timestamp,
                        replica_id: entry.replica_id,
                    };
                }
            }
        },
    }
    Ok(())
}

fn write_record<W: Write>(writer: &mut W, entry: &LogEntry) -> StorageResult<()> {
    let bytes = serde_json::to_vec(entry)?;
    let len = u32::try_from(bytes.len()).expect("a single record should never exceed 4 GiB");
    writer.write_all(&len.to_be_bytes())?;
    writer.write_all(&bytes)?;
    Ok(())
}

/// Reads every valid record from `path` in order. Stops (without error) at
/// the first truncated trailing record. Returns a [`StorageError::Recovery`]
/// if a length-prefixed record's payload is present but fails to parse.
fn read_records(path: &Path) -> StorageResult<Vec<LogEntry>> {
    let mut file = match File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    let mut entries = Vec::new();
    loop {
        let mut len_buf = [0u8; 4];
        match file.read_exact(&mut len_buf) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
            Err(e) => return Err(e.into()),
        }
        let len = u32::from_be_bytes(len_buf) as usize;

        let mut payload = vec![0u8; len];
        match file.read_exact(&mut payload) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
            Err(e) => return Err(e.into()),
        }

        let entry: LogEntry = serde_json::from_slice(&payload).map_err(|e| StorageError::Recovery {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        entries.push(entry);
    }
    Ok(entries)
}

fn segment_path(data_dir: &Path, id: u64) -> PathBuf {
    data_dir.join(format!("{SEGMENT_PREFIX}{id:020}{SEGMENT_SUFFIX}"))
}

fn parse_segment_id(file_name: &str) -> Option<u64> {
    file_name
        .strip_prefix(SEGMENT_PREFIX)?
        .strip_suffix(SEGMENT_SUFFIX)?
        .parse()
        .ok()
}

fn existing_segment_ids(data_dir: &Path) -> StorageResult<Vec<u64>> {
    let mut ids = Vec::new();
    for entry in fs::read_dir(data_dir)? {
        let entry = entry?;
        if let Some(id) = entry.file_name().to_str().and_then(parse_segment_id) {
            ids.push(id);
        }
    }
    ids.sort_unstable();
    Ok(ids)
}

/// Point-in-time statistics about the segment log, for `/stats`.
#[derive(Debug, Clone, Serialize)]
pub struct SegmentStats {
    pub total_segments: usize,
    pub current_segment_id: u64,
    pub max_segment_size: u64,
    pub compaction_threshold: u64,
    pub total_size_bytes: u64,
}

const LOCK_FILE_NAME: &str = ".lock";

/// Advisory PID-file lock over a data directory: only one live process
/// should hold the segment log open at a time. Removed on drop.
struct DirLock {
    path: PathBuf,
}

impl DirLock {
    fn acquire(data_dir: &Path) -> StorageResult<Self> {
        let path = data_dir.join(LOCK_FILE_NAME);
        if let Ok(existing) = fs::read_to_string(&path) {
            if let Ok(pid) = existing.trim().parse::<u32>() {
                if process_is_alive(pid) {
                    return Err(StorageError::AlreadyLocked(pid));
                }
            }
        }
        fs::write(&path, std::process::id().to_string())?;
        Ok(Self { path })
    }
}

impl Drop for DirLock {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}

#[cfg(unix)]
fn process_is_alive(pid: u32) -> bool {
    // Signal 0 performs no action but reports whether the process exists
    // and is addressable, per kill(2).
    unsafe { libc::kill(pid as libc::pid_t, 0) == 0 }
}

#[cfg(not(unix))]
fn process_is_alive(_pid: u32) -> bool {
    // Non-Unix platforms: err on the side of refusing to steal the lock.
    true
}

/// Owns the segment directory: the active segment for writes, plus the
/// sealed history replayed on open.
pub struct SegmentManager {
    data_dir: PathBuf,
    active_id: u64,
    active_file: File,
    active_size: u64,
    max_segment_size: u64,
    compaction_threshold: u64,
    _lock: DirLock,
}

impl SegmentManager {
    /// Opens (creating if needed) the segment directory, discards any
    /// abandoned `.tmp` compaction output, and positions the active segment
    /// at the highest existing id (or segment 0 if the directory is empty).
    pub fn open(data_dir: impl Into<PathBuf>) -> StorageResult<Self> {
        Self::open_with_limits(data_dir, DEFAULT_MAX_SEGMENT_SIZE, DEFAULT_COMPACTION_THRESHOLD)
    }

    pub fn open_with_limits(
        data_dir: impl Into<PathBuf>,
        max_segment_size: u64,
        compaction_threshold: u64,
    ) -> StorageResult<Self> {
        let data_dir = data_dir.into();
        fs::create_dir_all(&data_dir)?;
        let lock = DirLock::acquire(&data_dir)?;
        discard_abandoned_compactions(&data_dir)?;

        let ids = existing_segment_ids(&data_dir)?;
        let active_id = ids.last().copied().unwrap_or(0);
        let path = segment_path(&data_dir, active_id);
        let active_file = OpenOptions::new().create(true).append(true).open(&path)?;
        let active_size = active_file.metadata()?.len();

        Ok(Self {
            data_dir,
            active_id,
            active_file,
            active_size,
            max_segment_size,
            compaction_threshold,
            _lock: lock,
        })
    }

    /// Appends an entry to the active segment. Flushes and fsyncs before
    /// returning so the write is durable. Rotates to a fresh active segment
    /// if this append crosses `max_segment_size`.
    pub fn write_entry(&mut self, entry: LogEntry) -> StorageResult<()> {
        let mut buf = Vec::new();
        write_record(&mut buf, &entry)?;
        self.active_file.write_all(&buf)?;
        self.active_file.flush()?;
        self.active_file.sync_data()?;
        self.active_size += buf.len() as u64;

        if self.active_size >= self.max_segment_size {
            self.rotate()?;
        }
        Ok(())
    }

    fn rotate(&mut self) -> StorageResult<()> {
        self.active_id += 1;
        let path = segment_path(&self.data_dir, self.active_id);
        self.active_file = OpenOptions::new().create(true).append(true).open(path)?;
        self.active_size = 0;
        Ok(())
    }

    /// Replays every segment in id order and resolves per-key LWW across
    /// all observed records, returning the converged `key -> Value` mapping.
    pub fn load_all_entries(&self) -> StorageResult<HashMap<String, Value>> {
        let ids = existing_segment_ids(&self.data_dir)?;
        let mut slots: HashMap<String, Slot> = HashMap::new();

        for id in ids {
            let path = segment_path(&self.data_dir, id);
            for entry in read_records(&path)? {
                apply_entry(&mut slots, entry)?;
            }
        }

        Ok(slots
            .into_iter()
            .filter_map(|(key, slot)| match slot {
                Slot::Value(v) => Some((key, v)),
                Slot::Tombstone { .. } => None,
            })
            .collect())
    }

    /// Compacts all sealed segments (everything below `active_id`) into one
    /// fresh segment holding only the converged latest state. The active
    /// segment is left untouched so writers never stall on compaction.
    /// Returns the number of sealed segments folded in.
    pub fn compact(&mut self) -> StorageResult<usize> {
        let ids: Vec<u64> = existing_segment_ids(&self.data_dir)?
            .into_iter()
            .filter(|&id| id != self.active_id)
            .collect();
        if ids.len() < 2 {
            return Ok(0);
        }

        let mut slots: HashMap<String, Slot> = HashMap::new();
        for &id in &ids {
            for entry in read_records(&segment_path(&self.data_dir, id))? {
                apply_entry(&mut slots, entry)?;
            }
        }

        let compacted_id = ids[0];
        let tmp_path = self.data_dir.join(format!(
            "{SEGMENT_PREFIX}{compacted_id:020}{SEGMENT_SUFFIX}{COMPACTING_SUFFIX}"
        ));
        {
            let mut tmp_file = OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(&tmp_path)?;
            for (key, slot) in &slots {
                if let Slot::Value(value) = slot {
                    write_record(&mut tmp_file, &LogEntry::set(key.clone(), value.clone()))?;
                }
            }
            tmp_file.flush()?;
            tmp_file.sync_all()?;
        }

        let final_path = segment_path(&self.data_dir, compacted_id);
        fs::rename(&tmp_path, &final_path)?;

        for &id in &ids[1..] {
            fs::remove_file(segment_path(&self.data_dir, id))?;
        }

        Ok(ids.len())
    }

    #[must_use]
    pub fn stats(&self) -> SegmentStats {
        let total_size_bytes = existing_segment_ids(&self.data_dir)
            .unwrap_or_default()
            .into_iter()
            .filter_map(|id| fs::metadata(segment_path(&self.data_dir, id)).ok())
            .map(|m| m.len())
            .sum();
        SegmentStats {
            total_segments: existing_segment_ids(&self.data_dir).unwrap_or_default().len(),
            current_segment_id: self.active_id,
            max_segment_size: self.max_segment_size,
            compaction_threshold: self.compaction_threshold,
            total_size_bytes,
        }
    }

    #[must_use]
    pub fn compaction_threshold(&self) -> u64 {
        self.compaction_threshold
    }

    /// Total on-disk size across all segments, used to decide when to trigger compaction.
    pub fn total_size_bytes(&self) -> StorageResult<u64> {
        Ok(self.stats().total_size_bytes)
    }
}

/// Deletes any `.tmp` compaction output left behind by a crash mid-compaction.
fn discard_abandoned_compactions(data_dir: &Path) -> StorageResult<()> {
    for entry in fs::read_dir(data_dir)? {
        let entry = entry?;
        if entry.file_name().to_string_lossy().ends_with(COMPACTING_SUFFIX) {
            fs::remove_file(entry.path())?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use kvstore_crdt::Payload;

    fn replica(n: &str) -> ReplicaId {
        ReplicaId::new(n)
    }

    fn value(ts: i64, rid: &str, s: &str) -> Value {
        Value::new(Payload::String(s.as_bytes().to_vec()), Timestamp::from_nanos(ts), replica(rid))
    }

    #[test]
    fn write_then_recover_roundtrips() {
        let dir = tempfile::tempdir().unwrap();
        let mut mgr = SegmentManager::open(dir.path()).unwrap();
        mgr.write_entry(LogEntry::set("k1", value(1, "a", "v1"))).unwrap();
        mgr.write_entry(LogEntry::set("k2", value(2, "a", "v2"))).unwrap();

        let loaded = mgr.load_all_entries().unwrap();
        assert_eq!(loaded.len(), 2);
        match &loaded["k1"].payload {
            Payload::String(v) => assert_eq!(v, b"v1"),
            _ => panic!("wrong payload"),
        }
    }

    #[test]
    fn delete_then_recover_omits_key() {
        let dir = tempfile::tempdir().unwrap();
        let mut mgr = SegmentManager::open(dir.path()).unwrap();
        mgr.write_entry(LogEntry::set("k1", value(1, "a", "v1"))).unwrap();
        mgr.write_entry(LogEntry::delete("k1", Timestamp::from_nanos(2), replica("a")))
            .unwrap();

        let loaded = mgr.load_all_entries().unwrap();
        assert!(!loaded.contains_key("k1"));
    }

    #[test]
    fn out_of_order_timestamps_still_converge() {
        let dir = tempfile::tempdir().unwrap();
        let mut mgr = SegmentManager::open(dir.path()).unwrap();
        // Written in file order 10, then 5 — but 10 should still win since it
        // carries the larger timestamp, regardless of replay order.
        mgr.write_entry(LogEntry::set("k1", value(10, "a", "new"))).unwrap();
        mgr.write_entry(LogEntry::set("k1", value(5, "a", "old"))).unwrap();

        let loaded = mgr.load_all_entries().unwrap();
        match &loaded["k1"].payload {
            Payload::String(v) => assert_eq!(v, b"new"),
            _ => panic!("wrong payload"),
        }
    }

    #[test]
    fn rotation_creates_new_active_segment() {
        let dir = tempfile::tempdir().unwrap();
        let mut mgr = SegmentManager::open_with_limits(dir.path(), 1, DEFAULT_COMPACTION_THRESHOLD).unwrap();
        mgr.write_entry(LogEntry::set("k1", value(1, "a", "v1"))).unwrap();
        mgr.write_entry(LogEntry::set("k2", value(2, "a", "v2"))).unwrap();

        let ids = existing_segment_ids(dir.path()).unwrap();
        assert!(ids.len() >= 2);
    }

    #[test]
    fn compaction_preserves_latest_state_and_reduces_segment_count() {
        let dir = tempfile::tempdir().unwrap();
        let mut mgr = SegmentManager::open_with_limits(dir.path(), 1, DEFAULT_COMPACTION_THRESHOLD).unwrap();
        mgr.write_entry(LogEntry::set("k1", value(1, "a", "v1"))).unwrap();
        mgr.write_entry(LogEntry::set("k1", value(2, "a", "v2"))).unwrap();
        mgr.write_entry(LogEntry::set("k2", value(3, "a", "v3"))).unwrap();

        let before = existing_segment_ids(dir.path()).unwrap().len();
        let folded = mgr.compact().unwrap();
        assert!(folded > 0);
        let after = existing_segment_ids(dir.path()).unwrap().len();
        assert!(after < before);

        let loaded = mgr.load_all_entries().unwrap();
        match &loaded["k1"].payload {
            Payload::String(v) => assert_eq!(v, b"v2"),
            _ => panic!("wrong payload"),
        }
        assert!(loaded.contains_key("k2"));
    }

    #[test]
    fn truncated_trailing_record_is_discarded_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        {
            let mut mgr = SegmentManager::open(dir.path()).unwrap();
            mgr.write_entry(LogEntry::set("k1", value(1, "a", "v1"))).unwrap();
        }
        let path = segment_path(dir.path(), 0);
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        // Simulate a crash mid-append: a length prefix with no payload.
        file.write_all(&999u32.to_be_bytes()).unwrap();
        file.write_all(b"short").unwrap();

        let mgr = SegmentManager::open(dir.path()).unwrap();
        let loaded = mgr.load_all_entries().unwrap();
        assert_eq!(loaded.len(), 1);
    }
}
