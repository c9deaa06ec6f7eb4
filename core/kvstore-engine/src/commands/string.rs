//! `SET` / `GET` / `GETDEL` — the `String` datatype family.

use kvstore_crdt::Payload;
use kvstore_types::Timestamp;

use super::{Commands, SetOptions};
use crate::error::{EngineError, EngineResult};

impl Commands {
    /// `SET key value [NX|XX] [EX s|PX ms|EXAT ts|PXAT ts] [KEEPTTL]`.
    /// Returns `false` without writing anything if `NX`/`XX` vetoes the set.
    pub fn set(&self, key: &str, value: Vec<u8>, opts: SetOptions) -> EngineResult<bool> {
        if opts.nx && opts.xx {
            return Err(EngineError::InvalidArgs("SET: NX and XX are mutually exclusive".to_string()));
        }
        let now = Timestamp::now();
        let existing = self.read(key);
        if opts.nx && existing.is_some() {
            return Ok(false);
        }
        if opts.xx && existing.is_none() {
            return Ok(false);
        }

        let expire_at = if opts.keep_ttl {
            existing.and_then(|v| v.expire_at)
        } else {
            opts.expire.map(|spec| spec.resolve(now))
        };

        self.issue_write(key, Payload::String(value), expire_at, "SET")?;
        Ok(true)
    }

    /// `GET key`. `Ok(None)` if absent or expired; errors if `key` holds a
    /// non-string datatype.
    pub fn get(&self, key: &str) -> EngineResult<Option<Vec<u8>>> {
        match self.read(key) {
            Some(v) => match v.payload {
                Payload::String(bytes) => Ok(Some(bytes)),
                other => Err(EngineError::DatatypeMismatch { expected: "string", actual: other.type_name() }),
            },
            None => Ok(None),
        }
    }

    /// `GETDEL key`: atomically returns and removes a string value.
    pub fn getdel(&self, key: &str) -> EngineResult<Option<Vec<u8>>> {
        let value = self.get(key)?;
        if value.is_some() {
            self.issue_delete(key, "GETDEL")?;
        }
        Ok(value)
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
    fn set_then_get_round_trips() {
        let (_dir, cmds) = commands();
        cmds.set("k", b"v".to_vec(), SetOptions::default()).unwrap();
        assert_eq!(cmds.get("k").unwrap(), Some(b"v".to_vec()));
    }

    #[test]
    fn nx_refuses_when_present() {
        let (_dir, cmds) = commands();
        cmds.set("k", b"v1".to_vec(), SetOptions::default()).unwrap();
        let applied = cmds.set("k", b"v2".to_vec(), SetOptions { nx: true, ..Default::default() }).unwrap();
        assert!(!applied);
        assert_eq!(cmds.get("k").unwrap(), Some(b"v1".to_vec()));
    }

    #[test]
    fn xx_refuses_when_absent() {
        let (_dir, cmds) = commands();
        let applied = cmds.set("k", b"v".to_vec(), SetOptions { xx: true, ..Default::default() }).unwrap();
        assert!(!applied);
        assert_eq!(cmds.get("k").unwrap(), None);
    }

    #[test]
    fn getdel_removes_key() {
        let (_dir, cmds) = commands();
        cmds.set("k", b"v".to_vec(), SetOptions::default()).unwrap();
        assert_eq!(cmds.getdel("k").unwrap(), Some(b"v".to_vec()));
        assert_eq!(cmds.get("k").unwrap(), None);
    }

    #[test]
    fn get_on_wrong_datatype_errors() {
        let (_dir, cmds) = commands();
        cmds.incr_by("k", 1).unwrap();
        let err = cmds.get("k").unwrap_err();
        assert!(matches!(err, EngineError::DatatypeMismatch { .. }));
    }
}
