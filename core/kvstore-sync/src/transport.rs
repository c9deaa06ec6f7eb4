//! Peer transport glue (C7): the minimal carrier the syncer pulls over,
//! plus the inbound axum routes a replica exposes for its peers to pull
//! from (and, optionally, push into).
//!
//! [`PeerTransport`] is deliberately narrow — `fetch_ops_since` is the only
//! operation convergence requires. Framed TCP or any other carrier can
//! implement the same trait without the syncer (`kvstore_sync::syncer`)
//! changing at all.

use async_trait::async_trait;
use axum::extract::{Query, State};
use axum::response::Json;
use axum::routing::{get, post};
use axum::Router;
use kvstore_engine::Commands;
use kvstore_types::Timestamp;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

use crate::error::{SyncError, SyncResult};
use crate::protocol::{OperationBatch, OpsQuery};

/// Default per-request timeout for the HTTP peer transport.
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Pulls a peer's recently issued operations. One implementation (HTTP) is
/// provided; a framed-TCP carrier would implement the same trait.
#[async_trait]
pub trait PeerTransport: Send + Sync {
    /// Fetches all of `peer`'s local operations with `timestamp > since`.
    async fn fetch_ops_since(&self, peer: &str, since: Timestamp) -> SyncResult<Vec<kvstore_types::Operation>>;
}

/// `GET /ops?since=<ns>` / `POST /apply` over plain HTTP via `reqwest`.
pub struct HttpPeerTransport {
    client: reqwest::Client,
}

impl HttpPeerTransport {
    #[must_use]
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .timeout(DEFAULT_REQUEST_TIMEOUT)
            .build()
            .expect("reqwest client builder with only a timeout cannot fail");
        Self { client }
    }
}

impl Default for HttpPeerTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PeerTransport for HttpPeerTransport {
    async fn fetch_ops_since(&self, peer: &str, since: Timestamp) -> SyncResult<Vec<kvstore_types::Operation>> {
        let url = format!("{}/ops?since={}", peer.trim_end_matches('/'), since.as_nanos());
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| SyncError::PeerUnreachable { peer: peer.to_string(), reason: e.to_string() })?;

        if !resp.status().is_success() {
            return Err(SyncError::PeerUnreachable {
                peer: peer.to_string(),
                reason: format!("status {}", resp.status()),
            });
        }

        let batch: OperationBatch = resp
            .json()
            .await
            .map_err(|e| SyncError::MalformedResponse { peer: peer.to_string(), reason: e.to_string() })?;
        Ok(batch.operations)
    }
}

async fn ops_handler(State(commands): State<Arc<Commands>>, Query(query): Query<OpsQuery>) -> Json<OperationBatch> {
    let since = Timestamp::from_nanos(query.since);
    let operations = commands.store().operations_since(since).unwrap_or_else(|e| {
        warn!(error = %e, "failed to read operation log for /ops");
        Vec::new()
    });
    Json(OperationBatch { operations })
}

/// Applies an incoming batch through the same path `apply_operation` gives
/// the syncer. Best-effort: a malformed operation is logged and skipped,
/// and the response is always 200 regardless of how many entries applied.
async fn apply_handler(State(commands): State<Arc<Commands>>, Json(batch): Json<OperationBatch>) -> Json<serde_json::Value> {
    let mut applied = 0usize;
    for op in &batch.operations {
        match commands.apply_operation(op) {
            Ok(()) => applied += 1,
            Err(e) => warn!(operation_id = %op.operation_id, error = %e, "dropping malformed pushed operation"),
        }
    }
    Json(serde_json::json!({ "applied": applied, "received": batch.operations.len() }))
}

async fn health_handler() -> &'static str {
    "ok"
}

/// Surfaces the C2 statistics block (§4.2: `total_segments`,
/// `current_segment_id`, `total_size_bytes`, ...) for operators and
/// monitoring, not used by replication itself.
async fn stats_handler(State(commands): State<Arc<Commands>>) -> Json<kvstore_storage::SegmentStats> {
    Json(commands.store().stats())
}

/// Builds the replication and operational endpoints a replica exposes:
/// `/ops` and `/apply` drive convergence, `/health` and `/stats` are
/// operator-facing and mounted alongside them for convenience.
#[must_use]
pub fn replication_router(commands: Arc<Commands>) -> Router {
    Router::new()
        .route("/ops", get(ops_handler))
        .route("/apply", post(apply_handler))
        .route("/health", get(health_handler))
        .route("/stats", get(stats_handler))
        .with_state(commands)
}
