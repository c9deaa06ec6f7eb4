//! Replication syncer (C6): periodic pull-based convergence.
//!
//! Each tick, for every configured peer, the syncer fetches operations
//! issued since that peer's watermark and replays them through the same
//! applier local commands use — `Commands::apply_operation` preserves the
//! operation's original `(timestamp, replica_id)` rather than regenerating
//! one, which is what makes applying a remote op indistinguishable from a
//! local write carrying the same metadata. Convergence follows from that
//! plus the merge algebra being commutative, associative, and idempotent:
//! delivery order and duplication don't matter.

use kvstore_engine::Commands;
use kvstore_types::Timestamp;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::transport::PeerTransport;

/// Replication configuration: this replica's own advertised address (for
/// logging/introspection only — peers address us by whatever URL they were
/// configured with) plus the peers to pull from and how often.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub self_address: Option<String>,
    pub peers: Vec<String>,
    pub interval: Duration,
}

/// Per-peer watermark: the last remote-operation timestamp observed from
/// that peer. Advanced to `max(incoming timestamps, current)` after every
/// successful pull, even a partially-applied one.
pub struct ReplicationSyncer {
    commands: Arc<Commands>,
    transport: Arc<dyn PeerTransport>,
    peers: Vec<String>,
    watermarks: Mutex<HashMap<String, Timestamp>>,
}

impl ReplicationSyncer {
    #[must_use]
    pub fn new(commands: Arc<Commands>, transport: Arc<dyn PeerTransport>, peers: Vec<String>) -> Self {
        let watermarks = peers.iter().map(|p| (p.clone(), Timestamp::from_nanos(0))).collect();
        Self { commands, transport, peers, watermarks: Mutex::new(watermarks) }
    }

    /// Builds a syncer from a [`SyncConfig`], logging `self_address` for
    /// operators reading the startup banner (peers address this replica by
    /// whatever URL they were configured with, so it has no behavioral
    /// effect here).
    #[must_use]
    pub fn from_config(commands: Arc<Commands>, transport: Arc<dyn PeerTransport>, config: &SyncConfig) -> Self {
        if let Some(addr) = &config.self_address {
            info!(self_address = %addr, "replication syncer configured");
        }
        Self::new(commands, transport, config.peers.clone())
    }

    /// The watermark currently recorded for `peer` (0 if never synced or
    /// unknown).
    #[must_use]
    pub fn watermark(&self, peer: &str) -> Timestamp {
        self.watermarks.lock().unwrap().get(peer).copied().unwrap_or(Timestamp::from_nanos(0))
    }

    /// Runs one tick against every configured peer. Failures are per-peer
    /// and non-fatal: a peer that's unreachable this tick is retried next
    /// tick against the same watermark; malformed operations from a peer
    /// that did respond are logged and skipped without blocking the rest
    /// of that peer's batch.
    pub async fn tick(&self) {
        for peer in &self.peers {
            self.sync_peer(peer).await;
        }
    }

    async fn sync_peer(&self, peer: &str) {
        let since = self.watermark(peer);
        let ops = match self.transport.fetch_ops_since(peer, since).await {
            Ok(ops) => ops,
            Err(e) => {
                warn!(peer, error = %e, "peer unreachable this tick, retrying next tick at same watermark");
                return;
            }
        };

        if ops.is_empty() {
            return;
        }

        let mut high_watermark = since;
        let mut applied = 0usize;
        for op in &ops {
            match self.commands.apply_operation(op) {
                Ok(()) => applied += 1,
                Err(e) => warn!(peer, operation_id = %op.operation_id, error = %e, "skipping malformed remote operation"),
            }
            // The watermark advances past every fetched operation regardless
            // of whether it applied cleanly: a persistently malformed
            // operation must not wedge the syncer into refetching it forever.
            if op.timestamp > high_watermark {
                high_watermark = op.timestamp;
            }
        }

        self.watermarks.lock().unwrap().insert(peer.to_string(), high_watermark);
        debug!(peer, fetched = ops.len(), applied, new_watermark = high_watermark.as_nanos(), "synced peer");
    }

    /// Runs the periodic sync loop until `shutdown` is signalled (set to
    /// `true`). Completes any in-flight tick before returning, per the
    /// design's cooperative cancellation requirement.
    pub async fn run(self: Arc<Self>, interval: Duration, mut shutdown: watch::Receiver<bool>) {
        if self.peers.is_empty() {
            info!("no peers configured, replication syncer idle");
        }
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.tick().await;
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("replication syncer received shutdown signal");
                        break;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use kvstore_crdt::Payload;
    use kvstore_engine::Commands;
    use kvstore_storage::{DEFAULT_COMPACTION_THRESHOLD, DEFAULT_MAX_SEGMENT_SIZE};
    use kvstore_types::{Operation, OperationKind, ReplicaId};
    use std::sync::Mutex as StdMutex;
    use tempfile::TempDir;

    fn commands(replica: &str) -> (TempDir, Arc<Commands>) {
        let dir = tempfile::tempdir().unwrap();
        let store = kvstore_engine::TypedStore::open(
            dir.path().join("segments"),
            dir.path().join("oplog.log"),
            ReplicaId::new(replica),
            DEFAULT_MAX_SEGMENT_SIZE,
            DEFAULT_COMPACTION_THRESHOLD,
        )
        .unwrap();
        (dir, Arc::new(Commands::new(Arc::new(store))))
    }

    /// An in-memory stand-in peer: serves whatever operations a second
    /// `Commands` instance has locally issued, without any real network.
    struct FakePeer {
        ops: StdMutex<Vec<Operation>>,
    }

    #[async_trait]
    impl PeerTransport for FakePeer {
        async fn fetch_ops_since(&self, _peer: &str, since: Timestamp) -> crate::error::SyncResult<Vec<Operation>> {
            Ok(self.ops.lock().unwrap().iter().filter(|op| op.timestamp > since).cloned().collect())
        }
    }

    #[tokio::test]
    async fn tick_applies_fetched_ops_and_advances_watermark() {
        let (_dir_b, b) = commands("B");
        b.set("k", b"v1".to_vec(), Default::default()).unwrap();
        let b_ops = b.store().operations_since(Timestamp::from_nanos(0)).unwrap();

        let (_dir_a, a) = commands("A");
        let transport = Arc::new(FakePeer { ops: StdMutex::new(b_ops) });
        let syncer = ReplicationSyncer::new(a.clone(), transport, vec!["peer-b".to_string()]);

        syncer.tick().await;

        assert_eq!(a.get("k").unwrap(), Some(b"v1".to_vec()));
        assert!(syncer.watermark("peer-b") > Timestamp::from_nanos(0));
    }

    #[tokio::test]
    async fn unreachable_peer_leaves_watermark_unchanged() {
        struct AlwaysFails;
        #[async_trait]
        impl PeerTransport for AlwaysFails {
            async fn fetch_ops_since(&self, peer: &str, _since: Timestamp) -> crate::error::SyncResult<Vec<Operation>> {
                Err(crate::error::SyncError::PeerUnreachable { peer: peer.to_string(), reason: "connection refused".into() })
            }
        }

        let (_dir_a, a) = commands("A");
        let syncer = ReplicationSyncer::new(a, Arc::new(AlwaysFails), vec!["peer-b".to_string()]);
        let before = syncer.watermark("peer-b");
        syncer.tick().await;
        assert_eq!(syncer.watermark("peer-b"), before);
    }

    #[tokio::test]
    async fn malformed_operation_is_skipped_without_blocking_the_rest() {
        let (_dir_a, a) = commands("A");
        let good = Operation::new(
            OperationKind::Write,
            "SET",
            vec![base64_payload(&Payload::String(b"ok".to_vec())), String::new()],
            "k2",
            Timestamp::from_nanos(10),
            ReplicaId::new("B"),
        );
        let bad = Operation::new(
            OperationKind::Write,
            "SET",
            vec!["not valid base64 json!!".to_string(), String::new()],
            "k1",
            Timestamp::from_nanos(5),
            ReplicaId::new("B"),
        );
        let transport = Arc::new(FakePeer { ops: StdMutex::new(vec![bad, good]) });
        let syncer = ReplicationSyncer::new(a.clone(), transport, vec!["peer-b".to_string()]);

        syncer.tick().await;

        assert_eq!(a.get("k2").unwrap(), Some(b"ok".to_vec()));
        assert_eq!(syncer.watermark("peer-b"), Timestamp::from_nanos(10));
    }

    fn base64_payload(payload: &Payload) -> String {
        use base64::Engine;
        let json = serde_json::to_vec(payload).unwrap();
        base64::engine::general_purpose::STANDARD.encode(json)
    }
}
