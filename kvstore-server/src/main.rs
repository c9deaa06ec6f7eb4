//! `kvstore-server`: a single replica combining the RESP command surface,
//! the durable engine, and the replication syncer.
//!
//! Exit codes follow §6: `0` normal shutdown, `1` configuration or
//! initialization failure, `2` a runtime-fatal error (a persistence
//! failure surfaced by a connection handler).

use anyhow::Context;
use clap::Parser;
use kvstore_engine::{Commands, TypedStore};
use kvstore_sync::{transport::replication_router, HttpPeerTransport, ReplicationSyncer, SyncConfig};
use kvstore_types::ReplicaId;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// How often the TTL sweeper runs. Not spec-mandated (the sweeper is
/// optional); five seconds keeps expired keys from lingering long without
/// adding meaningful lock contention.
const TTL_SWEEP_INTERVAL: Duration = Duration::from_secs(5);
/// How often the compaction worker checks whether the threshold has been
/// crossed.
const COMPACTION_CHECK_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Parser, Debug)]
#[command(name = "kvstore-server", about = "A replicated, CRDT-converging key-value store replica")]
struct Args {
    /// Directory holding the segment log.
    #[arg(long, default_value = "./data")]
    data_dir: PathBuf,

    /// Path to the local operation log.
    #[arg(long, default_value = "./data/oplog.log")]
    oplog: PathBuf,

    /// Address the RESP listener binds to.
    #[arg(long, default_value = "127.0.0.1:6379")]
    listen: SocketAddr,

    /// Address the replication HTTP API (`/ops`, `/apply`) binds to.
    /// Distinct from `--listen` because RESP and HTTP are different wire
    /// protocols and cannot share one listener.
    #[arg(long, default_value = "127.0.0.1:7379")]
    replication_listen: SocketAddr,

    /// Base URL of a peer to replicate with (`http://host:replication_port`);
    /// may be repeated.
    #[arg(long = "peer")]
    peers: Vec<String>,

    /// This replica's unique identifier. Generated if not given, but a
    /// stable explicit id is strongly recommended — it's also the LWW
    /// tiebreaker across restarts.
    #[arg(long)]
    replica_id: Option<String>,

    /// Active-segment rotation threshold, in bytes.
    #[arg(long, default_value_t = kvstore_storage::DEFAULT_MAX_SEGMENT_SIZE)]
    max_segment_size: u64,

    /// Total on-disk size that triggers compaction, in bytes.
    #[arg(long, default_value_t = kvstore_storage::DEFAULT_COMPACTION_THRESHOLD)]
    compaction_threshold: u64,

    /// How often the replication syncer pulls from each peer.
    #[arg(long, default_value = "1000")]
    sync_interval_ms: u64,

    /// Log verbosity when `RUST_LOG` isn't set.
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn main() -> std::process::ExitCode {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(args.log_level.clone())))
        .compact()
        .init();

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("failed to start async runtime: {e}");
            return std::process::ExitCode::from(1);
        }
    };

    match runtime.block_on(run(args)) {
        Ok(()) => std::process::ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "fatal startup error");
            std::process::ExitCode::from(1)
        }
    }
}

async fn run(args: Args) -> anyhow::Result<()> {
    let replica_id = args.replica_id.map(ReplicaId::new).unwrap_or_else(ReplicaId::generate);
    info!(%replica_id, data_dir = %args.data_dir.display(), listen = %args.listen, "starting replica");

    let store = TypedStore::open(
        args.data_dir.clone(),
        args.oplog.clone(),
        replica_id.clone(),
        args.max_segment_size,
        args.compaction_threshold,
    )
    .context("failed to open segment log / operation log")?;
    let commands = Arc::new(Commands::new(Arc::new(store)));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let resp_task = tokio::spawn(kvstore_server::server::serve_resp(args.listen, commands.clone(), shutdown_rx.clone()));

    let replication_app = replication_router(commands.clone());
    let replication_listener = tokio::net::TcpListener::bind(args.replication_listen)
        .await
        .context("failed to bind replication listener")?;
    info!(addr = %args.replication_listen, "replication endpoint bound");
    let mut replication_shutdown = shutdown_rx.clone();
    let replication_task = tokio::spawn(async move {
        axum::serve(replication_listener, replication_app)
            .with_graceful_shutdown(async move {
                let _ = replication_shutdown.changed().await;
            })
            .await
    });

    let compaction_task = tokio::spawn(kvstore_server::background::compaction_worker(
        commands.clone(),
        COMPACTION_CHECK_INTERVAL,
        shutdown_rx.clone(),
    ));
    let sweeper_task = tokio::spawn(kvstore_server::background::ttl_sweeper(commands.clone(), TTL_SWEEP_INTERVAL, shutdown_rx.clone()));

    let sync_interval = Duration::from_millis(args.sync_interval_ms);
    let syncer_task = if args.peers.is_empty() {
        None
    } else {
        let transport = Arc::new(HttpPeerTransport::new());
        let sync_config = SyncConfig {
            self_address: Some(format!("http://{}", args.replication_listen)),
            peers: args.peers.clone(),
            interval: sync_interval,
        };
        let syncer = Arc::new(ReplicationSyncer::from_config(commands.clone(), transport, &sync_config));
        Some(tokio::spawn(syncer.run(sync_config.interval, shutdown_rx.clone())))
    };

    tokio::signal::ctrl_c().await.context("failed to listen for shutdown signal")?;
    info!("shutdown signal received, draining background tasks");
    let _ = shutdown_tx.send(true);

    let _ = resp_task.await;
    let _ = replication_task.await;
    let _ = compaction_task.await;
    let _ = sweeper_task.await;
    if let Some(task) = syncer_task {
        let _ = task.await;
    }

    commands.store().close().context("failed to flush operation log on shutdown")?;
    info!("shutdown complete");
    Ok(())
}
