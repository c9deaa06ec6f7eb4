//! Durable, time-ordered log of locally issued operations.
//!
//! Distinct from [`crate::SegmentManager`]: the op-log is not the source of
//! truth for state and never rotates or compacts. It exists only so a peer
//! can pull a replica's recent local history during replication. Every
//! append is flushed and fsynced before the local command is allowed to
//! return success.

use crate::error::StorageResult;
use kvstore_types::{Operation, Timestamp};
use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

fn write_record<W: Write>(writer: &mut W, op: &Operation) -> StorageResult<()> {
    let bytes = serde_json::to_vec(op)?;
    let len = u32::try_from(bytes.len()).expect("a single operation should never exceed 4 GiB");
    writer.write_all(&len.to_be_bytes())?;
    writer.write_all(&bytes)?;
    Ok(())
}

fn read_all(path: &Path) -> StorageResult<Vec<Operation>> {
    let mut file = match File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    let mut ops = Vec::new();
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

        match serde_json::from_slice(&payload) {
            Ok(op) => ops.push(op),
            Err(_) => break, // corrupt trailing record, same treatment as a truncated one
        }
    }
    Ok(ops)
}

/// Append-only log of operations this replica has locally issued.
pub struct OperationLog {
    path: PathBuf,
    file: File,
}

impl OperationLog {
    pub fn open(path: impl Into<PathBuf>) -> StorageResult<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self { path, file })
    }

    /// Appends `op` durably; returns only once flushed and fsynced.
    pub fn append(&mut self, op: &Operation) -> StorageResult<()> {
        write_record(&mut self.file, op)?;
        self.file.flush()?;
        self.file.sync_data()?;
        Ok(())
    }

    /// Returns every locally issued operation with `timestamp > since`, in
    /// the order they were appended.
    pub fn get_operations(&self, since: Timestamp) -> StorageResult<Vec<Operation>> {
        let ops = read_all(&self.path)?;
        Ok(ops.into_iter().filter(|op| op.timestamp > since).collect())
    }

    /// Flushes and fsyncs any buffered writes. Safe to call repeatedly.
    pub fn close(&mut self) -> StorageResult<()> {
        self.file.flush()?;
        self.file.sync_data()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kvstore_types::{OperationKind, ReplicaId};

    fn op(nanos: i64) -> Operation {
        Operation::new(
            OperationKind::Write,
            "SET",
            vec!["k".to_string(), "v".to_string()],
            "k".to_string(),
            Timestamp::from_nanos(nanos),
            ReplicaId::new("r1"),
        )
    }

    #[test]
    fn append_and_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let mut log = OperationLog::open(dir.path().join("oplog.log")).unwrap();
        log.append(&op(1)).unwrap();
        log.append(&op(2)).unwrap();

        let ops = log.get_operations(Timestamp::from_nanos(0)).unwrap();
        assert_eq!(ops.len(), 2);
    }

    #[test]
    fn get_operations_filters_by_since() {
        let dir = tempfile::tempdir().unwrap();
        let mut log = OperationLog::open(dir.path().join("oplog.log")).unwrap();
        log.append(&op(100)).unwrap();
        log.append(&op(200)).unwrap();
        log.append(&op(300)).unwrap();

        let ops = log.get_operations(Timestamp::from_nanos(150)).unwrap();
        assert_eq!(ops.len(), 2);
    }

    #[test]
    fn survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("oplog.log");
        {
            let mut log = OperationLog::open(&path).unwrap();
            log.append(&op(1)).unwrap();
        }
        let log = OperationLog::open(&path).unwrap();
        assert_eq!(log.get_operations(Timestamp::from_nanos(0)).unwrap().len(), 1);
    }
}
