//! Replication syncer (C6) and peer transport glue (C7).
//!
//! Convergence is pull-based: [`syncer::ReplicationSyncer`] periodically
//! fetches each peer's locally issued operations beyond a per-peer
//! [watermark](syncer::ReplicationSyncer::watermark) and replays them
//! through [`kvstore_engine::Commands::apply_operation`]. [`transport`]
//! supplies the HTTP carrier (`GET /ops`, `POST /apply`) both as a client
//! ([`transport::HttpPeerTransport`]) and as the axum routes a replica
//! mounts for its peers to pull from.

mod error;
mod protocol;
pub mod syncer;
pub mod transport;

pub use error::{SyncError, SyncResult};
pub use protocol::{OperationBatch, OpsQuery};
pub use syncer::{ReplicationSyncer, SyncConfig};
pub use transport::{HttpPeerTransport, PeerTransport};
