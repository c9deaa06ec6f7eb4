//! End-to-end replication test: two real `TypedStore`s, a real axum
//! replication endpoint, and a real HTTP client syncer pulling between
//! them. Exercises the "two-replica sync" scenario from the design: a
//! write on one replica should be observable on the other within a few
//! sync ticks.

use kvstore_engine::Commands;
use kvstore_storage::{DEFAULT_COMPACTION_THRESHOLD, DEFAULT_MAX_SEGMENT_SIZE};
use kvstore_sync::{transport::replication_router, HttpPeerTransport, ReplicationSyncer};
use kvstore_types::ReplicaId;
use std::sync::Arc;
use std::time::Duration;
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

/// Spins up a replica's replication endpoints on an OS-assigned port,
/// returning the base URL peers should pull from.
async fn spawn_replica_endpoint(commands: Arc<Commands>) -> String {
    let app = replication_router(commands);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://127.0.0.1:{port}")
}

#[tokio::test]
async fn write_on_one_replica_appears_on_the_other_after_a_tick() {
    let (_dir_r1, r1) = commands("R1");
    let (_dir_r2, r2) = commands("R2");

    let r1_url = spawn_replica_endpoint(r1.clone()).await;

    r1.set("k1", b"v1".to_vec(), Default::default()).unwrap();

    let transport = Arc::new(HttpPeerTransport::new());
    let syncer = ReplicationSyncer::new(r2.clone(), transport, vec![r1_url]);
    syncer.tick().await;

    assert_eq!(r2.get("k1").unwrap(), Some(b"v1".to_vec()));
}

#[tokio::test]
async fn bidirectional_sync_converges_counters() {
    let (_dir_r1, r1) = commands("R1");
    let (_dir_r2, r2) = commands("R2");

    let r1_url = spawn_replica_endpoint(r1.clone()).await;
    let r2_url = spawn_replica_endpoint(r2.clone()).await;

    for _ in 0..5 {
        r1.incr("c").unwrap();
    }
    for _ in 0..3 {
        r2.incr("c").unwrap();
    }

    let r1_pulls_r2 = ReplicationSyncer::new(r1.clone(), Arc::new(HttpPeerTransport::new()), vec![r2_url]);
    let r2_pulls_r1 = ReplicationSyncer::new(r2.clone(), Arc::new(HttpPeerTransport::new()), vec![r1_url]);

    r1_pulls_r2.tick().await;
    r2_pulls_r1.tick().await;

    assert_eq!(r1.counter_value("c").unwrap(), 8);
    assert_eq!(r2.counter_value("c").unwrap(), 8);
}

#[tokio::test]
async fn peer_unreachable_does_not_fail_the_tick() {
    let (_dir_r2, r2) = commands("R2");
    let transport = Arc::new(HttpPeerTransport::new());
    // Port 1 should never have a listener bound in test environments.
    let syncer = ReplicationSyncer::new(r2, transport, vec!["http://127.0.0.1:1".to_string()]);
    tokio::time::timeout(Duration::from_secs(10), syncer.tick()).await.expect("tick must not hang");
}
