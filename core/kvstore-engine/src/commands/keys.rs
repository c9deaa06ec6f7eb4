//! Generic key-lifecycle commands that apply across every datatype:
//! `EXISTS` / `DEL` / `EXPIRE` / `PEXPIRE` / `EXPIREAT` / `PEXPIREAT` /
//! `PERSIST` / `TTL` / `PTTL` / `RENAME` / `KEYS`. `TYPE` lives in
//! [`super::type_of`] since it needs no module of its own.
//!
//! The TTL-setting commands ("touch" operations) don't fit the
//! datatype-family pattern the other modules follow: they don't change a
//! key's payload at all, only its `expire_at`. Reissuing the current
//! payload unchanged alongside the new `expire_at` keeps them on the same
//! delta-and-merge path as every other write — merging an unchanged payload
//! into itself is a no-op for every datatype, so only the expiry (and the
//! top-level timestamp, which decides expiry via last-writer-wins) actually
//! moves.

use super::{Commands, ExpireSpec};
use crate::error::{EngineError, EngineResult};
use kvstore_types::Timestamp;

impl Commands {
    fn touch(&self, key: &str, expire_at: Option<Timestamp>, command: &str) -> EngineResult<bool> {
        match self.read(key) {
            Some(value) => {
                self.issue_write(key, value.payload, expire_at, command)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// `EXPIRE key seconds` / `PEXPIRE key millis` / `EXPIREAT key
    /// unix-seconds` / `PEXPIREAT key unix-millis`, unified behind
    /// [`ExpireSpec`]. Returns whether the key existed and got a new TTL.
    pub fn expire(&self, key: &str, spec: ExpireSpec) -> EngineResult<bool> {
        let expire_at = spec.resolve(Timestamp::now());
        self.touch(key, Some(expire_at), "EXPIRE")
    }

    /// `PERSIST key`. Returns whether a TTL was actually removed.
    pub fn persist(&self, key: &str) -> EngineResult<bool> {
        match self.read(key) {
            Some(value) if value.expire_at.is_some() => {
                self.issue_write(key, value.payload, None, "PERSIST")?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// `EXISTS key [key ...]`. Counts with multiplicity, matching Redis.
    #[must_use]
    pub fn exists(&self, keys: &[String]) -> usize {
        keys.iter().filter(|k| self.read(k).is_some()).count()
    }

    /// `DEL key [key ...]`. Returns the number of keys actually removed.
    pub fn del(&self, keys: &[String]) -> EngineResult<usize> {
        let mut removed = 0;
        for key in keys {
            if self.issue_delete(key, "DEL")? {
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// `TTL key`, in whole seconds (rounded up): `-2` if the key doesn't
    /// exist, `-1` if it has no expiry, else the seconds remaining.
    #[must_use]
    pub fn ttl(&self, key: &str) -> i64 {
        let ms = self.pttl(key);
        if ms < 0 { ms } else { (ms + 999) / 1000 }
    }

    /// `PTTL key`, in milliseconds: `-2` if the key doesn't exist, `-1` if
    /// it has no expiry, else the milliseconds remaining.
    #[must_use]
    pub fn pttl(&self, key: &str) -> i64 {
        match self.read(key) {
            None => -2,
            Some(value) => match value.expire_at {
                None => -1,
                Some(expire_at) => {
                    let remaining_nanos = expire_at.as_nanos() - Timestamp::now().as_nanos();
                    (remaining_nanos / 1_000_000).max(0)
                }
            },
        }
    }

    /// `RENAME key newkey`. Errors if `key` doesn't exist. Overwrites
    /// `newkey` if present, carrying over the source's payload and TTL.
    pub fn rename(&self, key: &str, newkey: &str) -> EngineResult<()> {
        let value = self.read(key).ok_or_else(|| EngineError::NotFound(key.to_string()))?;
        self.issue_write(newkey, value.payload, value.expire_at, "RENAME")?;
        self.issue_delete(key, "RENAME")?;
        Ok(())
    }

    /// `KEYS pattern`. A plain substring match (`*` matches everything),
    /// not Redis's glob syntax or cursor-based `SCAN`.
    #[must_use]
    pub fn keys(&self, pattern: &str) -> Vec<String> {
        self.store.keys(pattern, Timestamp::now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::SetOptions;
    use crate::store::TypedStore;
    use kvstore_types::ReplicaId;
    use std::sync::Arc;
    use std::thread::sleep;
    use std::time::Duration;

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
    fn exists_and_del() {
        let (_dir, cmds) = commands();
        cmds.set("a", b"1".to_vec(), SetOptions::default()).unwrap();
        cmds.set("b", b"2".to_vec(), SetOptions::default()).unwrap();
        assert_eq!(cmds.exists(&["a".to_string(), "missing".to_string(), "b".to_string()]), 2);
        assert_eq!(cmds.del(&["a".to_string(), "missing".to_string()]).unwrap(), 1);
        assert_eq!(cmds.exists(&["a".to_string()]), 0);
    }

    #[test]
    fn expire_then_ttl_then_persist() {
        let (_dir, cmds) = commands();
        cmds.set("k", b"v".to_vec(), SetOptions::default()).unwrap();
        assert_eq!(cmds.ttl("k"), -1);

        cmds.expire("k", ExpireSpec::Seconds(100)).unwrap();
        let ttl = cmds.ttl("k");
        assert!(ttl > 0 && ttl <= 100);

        assert!(cmds.persist("k").unwrap());
        assert_eq!(cmds.ttl("k"), -1);
    }

    #[test]
    fn ttl_on_missing_key_is_minus_two() {
        let (_dir, cmds) = commands();
        assert_eq!(cmds.ttl("missing"), -2);
    }

    #[test]
    fn expired_key_reads_as_gone_and_ttl_reports_absent() {
        let (_dir, cmds) = commands();
        cmds.set("k", b"v".to_vec(), SetOptions::default()).unwrap();
        cmds.expire("k", ExpireSpec::Millis(10)).unwrap();
        sleep(Duration::from_millis(30));
        assert_eq!(cmds.get("k").unwrap(), None);
        assert_eq!(cmds.ttl("k"), -2);
    }

    #[test]
    fn rename_moves_value_and_ttl() {
        let (_dir, cmds) = commands();
        cmds.set("src", b"v".to_vec(), SetOptions::default()).unwrap();
        cmds.expire("src", ExpireSpec::Seconds(100)).unwrap();
        cmds.rename("src", "dst").unwrap();
        assert_eq!(cmds.get("dst").unwrap(), Some(b"v".to_vec()));
        assert_eq!(cmds.get("src").unwrap(), None);
        assert!(cmds.ttl("dst") > 0);
    }

    #[test]
    fn rename_missing_source_errors() {
        let (_dir, cmds) = commands();
        assert!(cmds.rename("missing", "dst").is_err());
    }

    #[test]
    fn keys_wildcard_lists_everything() {
        let (_dir, cmds) = commands();
        cmds.set("a", b"1".to_vec(), SetOptions::default()).unwrap();
        cmds.set("b", b"2".to_vec(), SetOptions::default()).unwrap();
        let mut all = cmds.keys("*");
        all.sort();
        assert_eq!(all, vec!["a".to_string(), "b".to_string()]);
    }
}
