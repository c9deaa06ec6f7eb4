//! The public command API (C5): Redis-semantically-aligned operations over
//! [`TypedStore`]. Each mutating command follows the same steps from the
//! design: validate, build a delta `Value` stamped `(now, self
//! replica_id)`, persist it through the store, then append the issued
//! [`Operation`] to the operation log so peers can pull it later.
//!
//! The delta itself — not a reconstruction of the full current state — is
//! what gets shipped in the `Operation`'s args (JSON-encoded `Payload`,
//! base64-wrapped to keep it a plain string). Since every payload's merge
//! is commutative, associative and idempotent, shipping just the delta
//! (the single new counter contribution, the single new set tag, the
//! single new list entry, ...) and merging it wherever it lands is
//! sufficient — no full-state reconstruction needed on the receiving end.
//!
//! [`Commands::apply_operation`] is the replay entry point used by the
//! replication syncer: it deserializes that delta and merges it in,
//! preserving the operation's original `(timestamp, replica_id)` rather
//! than regenerating one. Applying a remote op this way is indistinguishable
//! from applying a local one with the same metadata, which is what makes
//! convergence hold regardless of delivery order.

mod counter;
mod hash;
mod keys;
mod list;
mod set;
mod sorted_set;
mod string;

use base64::Engine;
use kvstore_crdt::{HashCrdt, ListCrdt, OrSet, Payload, PnCounter, SortedSetCrdt, Value};
use kvstore_types::{Operation, OperationKind, ReplicaId, Timestamp};
use std::sync::{Arc, Mutex};

use crate::error::{EngineError, EngineResult};
use crate::store::TypedStore;

const B64: base64::engine::GeneralPurpose = base64::engine::general_purpose::STANDARD;

pub(crate) fn encode_bytes(bytes: &[u8]) -> String {
    B64.encode(bytes)
}

pub(crate) fn decode_bytes(s: &str) -> EngineResult<Vec<u8>> {
    B64.decode(s).map_err(|e| EngineError::Apply(format!("invalid base64 arg: {e}")))
}

/// Options accepted by `SET`, mirroring Redis's `NX`/`XX`/`EX`/`PX`/`EXAT`/
/// `PXAT`/`KEEPTTL` flags.
#[derive(Debug, Clone, Copy, Default)]
pub struct SetOptions {
    pub nx: bool,
    pub xx: bool,
    pub expire: Option<ExpireSpec>,
    pub keep_ttl: bool,
}

/// A TTL expressed one of the four ways `SET`/`EXPIRE` accept it.
#[derive(Debug, Clone, Copy)]
pub enum ExpireSpec {
    Seconds(i64),
    Millis(i64),
    UnixSeconds(i64),
    UnixMillis(i64),
}

impl ExpireSpec {
    fn resolve(self, now: Timestamp) -> Timestamp {
        match self {
            ExpireSpec::Seconds(s) => Timestamp::from_nanos(now.as_nanos() + s * 1_000_000_000),
            ExpireSpec::Millis(ms) => Timestamp::from_nanos(now.as_nanos() + ms * 1_000_000),
            ExpireSpec::UnixSeconds(s) => Timestamp::from_nanos(s * 1_000_000_000),
            ExpireSpec::UnixMillis(ms) => Timestamp::from_nanos(ms * 1_000_000),
        }
    }
}

/// The public command surface over a [`TypedStore`]. One `Commands`
/// instance is shared (behind an `Arc`) by every client-serving worker and
/// by the replication applicator.
pub struct Commands {
    pub(crate) store: Arc<TypedStore>,
    /// Monotonic clock for locally issued writes: every local operation
    /// gets a timestamp strictly greater than the last one this replica
    /// issued, even if the wall clock hasn't visibly advanced.
    last_ts: Mutex<Timestamp>,
}

fn encode_args(payload: &Payload, expire_at: Option<Timestamp>) -> EngineResult<Vec<String>> {
    let json = serde_json::to_vec(payload).map_err(|e| EngineError::Apply(e.to_string()))?;
    let expire_str = expire_at.map(|t| t.as_nanos().to_string()).unwrap_or_default();
    Ok(vec![encode_bytes(&json), expire_str])
}

impl Commands {
    #[must_use]
    pub fn new(store: Arc<TypedStore>) -> Self {
        Self {
            store,
            last_ts: Mutex::new(Timestamp::now()),
        }
    }

    #[must_use]
    pub fn store(&self) -> &Arc<TypedStore> {
        &self.store
    }

    #[must_use]
    pub fn replica_id(&self) -> ReplicaId {
        self.store.replica_id().clone()
    }

    fn next_timestamp(&self) -> Timestamp {
        let mut guard = self.last_ts.lock().unwrap();
        let next = guard.tick();
        *guard = next;
        next
    }

    /// Reads the current value for `key`, applying lazy expiry.
    fn read(&self, key: &str) -> Option<Value> {
        self.store.get(key, Timestamp::now())
    }

    /// The TTL a non-`SET` mutation should preserve: every command except
    /// `SET` (which has its own `EX`/`PX`/`KEEPTTL` handling) leaves a
    /// key's existing expiry untouched.
    fn existing_expire_at(&self, key: &str) -> Option<Timestamp> {
        self.read(key).and_then(|v| v.expire_at)
    }

    /// Builds and persists a delta `Value` for `key`, merging with whatever
    /// is already there, then records the issuing `Operation`. This is the
    /// single local-write path every mutating command funnels through.
    /// Mints its own timestamp; use [`Self::issue_write_at`] when a
    /// per-entry timestamp (e.g. a `HashCrdt`/`SortedSetCrdt` field stamp)
    /// must match the operation's own timestamp exactly.
    fn issue_write(&self, key: &str, payload: Payload, expire_at: Option<Timestamp>, command: &str) -> EngineResult<Value> {
        let ts = self.next_timestamp();
        self.issue_write_at(key, payload, expire_at, command, ts)
    }

    /// Like [`Self::issue_write`] but takes an already-minted timestamp,
    /// for commands that need that same timestamp baked into the delta
    /// payload itself (a hash/sorted-set field entry) before building it.
    fn issue_write_at(
        &self,
        key: &str,
        payload: Payload,
        expire_at: Option<Timestamp>,
        command: &str,
        ts: Timestamp,
    ) -> EngineResult<Value> {
        let args = encode_args(&payload, expire_at)?;
        let mut value = Value::new(payload, ts, self.replica_id());
        value.expire_at = expire_at;
        let merged = self.store.install_or_merge(key, value, ts)?;
        self.record_op(OperationKind::Write, command, args, key, ts)?;
        Ok(merged)
    }

    /// Deletes `key`, recording a `Delete`-kind `Operation`.
    fn issue_delete(&self, key: &str, command: &str) -> EngineResult<bool> {
        let ts = self.next_timestamp();
        let rid = self.replica_id();
        let existed = self.store.remove(key, ts, rid, ts)?;
        self.record_op(OperationKind::Delete, command, Vec::new(), key, ts)?;
        Ok(existed)
    }

    fn record_op(&self, kind: OperationKind, command: &str, args: Vec<String>, key: &str, ts: Timestamp) -> EngineResult<()> {
        let op = Operation::new(kind, command, args, key, ts, self.replica_id());
        self.store.record_local_operation(&op)
    }

    /// Fetches `key`'s counter payload, or an empty counter if absent.
    /// Errors if `key` holds a different datatype.
    fn current_counter(&self, key: &str) -> EngineResult<PnCounter> {
        match self.read(key) {
            Some(v) => match v.payload {
                Payload::Counter(c) => Ok(c),
                other => Err(EngineError::DatatypeMismatch { expected: "counter", actual: other.type_name() }),
            },
            None => Ok(PnCounter::new()),
        }
    }

    fn current_list(&self, key: &str) -> EngineResult<ListCrdt> {
        match self.read(key) {
            Some(v) => match v.payload {
                Payload::List(l) => Ok(l),
                other => Err(EngineError::DatatypeMismatch { expected: "list", actual: other.type_name() }),
            },
            None => Ok(ListCrdt::new()),
        }
    }

    fn current_set(&self, key: &str) -> EngineResult<OrSet<Vec<u8>>> {
        match self.read(key) {
            Some(v) => match v.payload {
                Payload::Set(s) => Ok(s),
                other => Err(EngineError::DatatypeMismatch { expected: "set", actual: other.type_name() }),
            },
            None => Ok(OrSet::new()),
        }
    }

    fn current_hash(&self, key: &str) -> EngineResult<HashCrdt> {
        match self.read(key) {
            Some(v) => match v.payload {
                Payload::Hash(h) => Ok(h),
                other => Err(EngineError::DatatypeMismatch { expected: "hash", actual: other.type_name() }),
            },
            None => Ok(HashCrdt::new()),
        }
    }

    fn current_sorted_set(&self, key: &str) -> EngineResult<SortedSetCrdt> {
        match self.read(key) {
            Some(v) => match v.payload {
                Payload::SortedSet(z) => Ok(z),
                other => Err(EngineError::DatatypeMismatch { expected: "sortedset", actual: other.type_name() }),
            },
            None => Ok(SortedSetCrdt::new()),
        }
    }

    /// Read-only introspection of a key's datatype tag (`TYPE`).
    #[must_use]
    pub fn type_of(&self, key: &str) -> Option<&'static str> {
        self.read(key).map(|v| v.type_name())
    }

    /// Replays a remote operation: deserializes the delta `Payload` it
    /// carries and merges it in, preserving `op.timestamp` /
    /// `op.replica_id`. Never recorded in the local op-log — only locally
    /// issued writes go there. A malformed operation is reported as
    /// `EngineError::Apply` so the syncer can log and skip it without
    /// treating the whole batch as fatal.
    pub fn apply_operation(&self, op: &Operation) -> EngineResult<()> {
        let key = op.operation_id.key.as_str();
        match op.kind {
            OperationKind::Delete => {
                self.store.remove(key, op.timestamp, op.replica_id.clone(), op.timestamp)?;
                Ok(())
            }
            OperationKind::Write => {
                let raw = op
                    .args
                    .first()
                    .ok_or_else(|| EngineError::Apply("write operation missing payload arg".to_string()))?;
                let json = decode_bytes(raw)?;
                let payload: Payload =
                    serde_json::from_slice(&json).map_err(|e| EngineError::Apply(format!("malformed delta payload: {e}")))?;
                let expire_at = op
                    .args
                    .get(1)
                    .filter(|s| !s.is_empty())
                    .and_then(|s| s.parse::<i64>().ok())
                    .map(Timestamp::from_nanos);

                let mut value = Value::new(payload, op.timestamp, op.replica_id.clone());
                value.expire_at = expire_at;
                self.store.install_or_merge(key, value, op.timestamp)?;
                Ok(())
            }
        }
    }
}
