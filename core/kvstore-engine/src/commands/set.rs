//! `SADD` / `SREM` / `SMEMBERS` / `SCARD` / `SISMEMBER` — the `Set`
//! datatype family, backed by an add-wins observed-remove set.
//!
//! `SADD` ships a delta containing only the freshly minted tags; `SREM`
//! ships a tombstone-only delta (see
//! [`kvstore_crdt::OrSet::delta_tombstones`]) rather than the whole set.

use kvstore_crdt::{OrSet, Payload};

use super::Commands;
use crate::error::EngineResult;

impl Commands {
    /// `SADD key member [member ...]`. Returns the number of members newly
    /// added (already-present members don't count).
    pub fn sadd(&self, key: &str, members: Vec<Vec<u8>>) -> EngineResult<usize> {
        let current = self.current_set(key)?;
        let mut delta = OrSet::new();
        let mut added = 0;
        for member in members {
            if !current.contains(&member) {
                delta.add(member);
                added += 1;
            }
        }
        if added > 0 {
            let expire_at = self.existing_expire_at(key);
            self.issue_write(key, Payload::Set(delta), expire_at, "SADD")?;
        }
        Ok(added)
    }

    /// `SREM key member [member ...]`. Returns the number of members
    /// removed.
    pub fn srem(&self, key: &str, members: Vec<Vec<u8>>) -> EngineResult<usize> {
        let mut current = self.current_set(key)?;
        let mut tags = Vec::new();
        let mut removed = 0;
        for member in &members {
            if current.contains(member) {
                tags.extend(current.remove(member));
                removed += 1;
            }
        }
        if removed > 0 {
            let delta = OrSet::delta_tombstones(tags);
            let expire_at = self.existing_expire_at(key);
            self.issue_write(key, Payload::Set(delta), expire_at, "SREM")?;
        }
        Ok(removed)
    }

    /// `SMEMBERS key`.
    pub fn smembers(&self, key: &str) -> EngineResult<Vec<Vec<u8>>> {
        Ok(self.current_set(key)?.iter().cloned().collect())
    }

    /// `SCARD key`.
    pub fn scard(&self, key: &str) -> EngineResult<usize> {
        Ok(self.current_set(key)?.len())
    }

    /// `SISMEMBER key member`.
    pub fn sismember(&self, key: &str, member: &[u8]) -> EngineResult<bool> {
        Ok(self.current_set(key)?.contains(&member.to_vec()))
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
    fn sadd_then_smembers() {
        let (_dir, cmds) = commands();
        let added = cmds.sadd("s", vec![b"a".to_vec(), b"b".to_vec(), b"a".to_vec()]).unwrap();
        assert_eq!(added, 2);
        assert_eq!(cmds.scard("s").unwrap(), 2);
        assert!(cmds.sismember("s", b"a").unwrap());
    }

    #[test]
    fn srem_removes_and_counts() {
        let (_dir, cmds) = commands();
        cmds.sadd("s", vec![b"a".to_vec(), b"b".to_vec()]).unwrap();
        let removed = cmds.srem("s", vec![b"a".to_vec(), b"missing".to_vec()]).unwrap();
        assert_eq!(removed, 1);
        assert!(!cmds.sismember("s", b"a").unwrap());
        assert!(cmds.sismember("s", b"b").unwrap());
    }

    #[test]
    fn concurrent_adds_and_removes_converge_via_replay() {
        let dir_a = tempfile::tempdir().unwrap();
        let store_a = TypedStore::open(
            dir_a.path().join("segments"),
            dir_a.path().join("oplog.log"),
            ReplicaId::new("A"),
            kvstore_storage::DEFAULT_MAX_SEGMENT_SIZE,
            kvstore_storage::DEFAULT_COMPACTION_THRESHOLD,
        )
        .unwrap();
        let a = Commands::new(Arc::new(store_a));

        let dir_b = tempfile::tempdir().unwrap();
        let store_b = TypedStore::open(
            dir_b.path().join("segments"),
            dir_b.path().join("oplog.log"),
            ReplicaId::new("B"),
            kvstore_storage::DEFAULT_MAX_SEGMENT_SIZE,
            kvstore_storage::DEFAULT_COMPACTION_THRESHOLD,
        )
        .unwrap();
        let b = Commands::new(Arc::new(store_b));

        a.sadd("s", vec![b"shared".to_vec()]).unwrap();
        for op in a.store().operations_since(kvstore_types::Timestamp::from_nanos(0)).unwrap() {
            b.apply_operation(&op).unwrap();
        }
        // A adds a second element while B concurrently removes the shared one.
        a.sadd("s", vec![b"only_a".to_vec()]).unwrap();
        b.srem("s", vec![b"shared".to_vec()]).unwrap();

        for op in a.store().operations_since(kvstore_types::Timestamp::from_nanos(0)).unwrap() {
            b.apply_operation(&op).unwrap();
        }
        for op in b.store().operations_since(kvstore_types::Timestamp::from_nanos(0)).unwrap() {
            a.apply_operation(&op).unwrap();
        }

        let mut a_members = a.smembers("s").unwrap();
        let mut b_members = b.smembers("s").unwrap();
        a_members.sort();
        b_members.sort();
        assert_eq!(a_members, b_members);
        assert_eq!(a_members, vec![b"only_a".to_vec()]);
    }
}
