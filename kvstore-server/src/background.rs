//! The two optional background workers from the concurrency model (§5):
//! a compaction worker that folds sealed segments once the on-disk log
//! crosses its threshold, and a TTL sweeper that proactively evicts
//! expired keys rather than waiting for a read to find them stale. Both
//! take a cooperative shutdown signal at construction and return promptly
//! once it fires.

use kvstore_engine::Commands;
use kvstore_types::Timestamp;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Checks total segment-log size against the compaction threshold every
/// `interval` and runs a compaction pass when it's exceeded.
pub async fn compaction_worker(commands: Arc<Commands>, interval: Duration, mut shutdown: watch::Receiver<bool>) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let store = commands.store();
                let total = match store.total_size_bytes() {
                    Ok(n) => n,
                    Err(e) => {
                        warn!(error = %e, "failed to read segment log size");
                        continue;
                    }
                };
                if total >= store.compaction_threshold() {
                    match store.compact() {
                        Ok(folded) if folded > 0 => info!(folded, total_size_bytes = total, "compaction completed"),
                        Ok(_) => {}
                        Err(e) => warn!(error = %e, "compaction run failed"),
                    }
                }
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    info!("compaction worker received shutdown signal");
                    break;
                }
            }
        }
    }
}

/// Proactively evicts expired keys every `interval`, instead of relying
/// solely on lazy expiration at read time.
pub async fn ttl_sweeper(commands: Arc<Commands>, interval: Duration, mut shutdown: watch::Receiver<bool>) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match commands.store().sweep_expired(Timestamp::now()) {
                    Ok(removed) if removed > 0 => debug!(removed, "TTL sweep ran"),
                    Ok(_) => {}
                    Err(e) => warn!(error = %e, "TTL sweep failed"),
                }
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    info!("TTL sweeper received shutdown signal");
                    break;
                }
            }
        }
    }
}
