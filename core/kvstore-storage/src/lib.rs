//! Durable persistence for the kvstore: the segment log (state) and the
//! operation log (local write history for replication).
//!
//! [`SegmentManager`] is the sole source of truth for key state, with
//! rotation, crash recovery, and compaction. [`OperationLog`] is a
//! secondary, never-compacted append log that peers pull from during sync —
//! it never drives recovery of local state.

mod error;
mod operation_log;
mod segment;

pub use error::{StorageError, StorageResult};
pub use operation_log::OperationLog;
pub use segment::{
    EntryKind, LogEntry, SegmentManager, SegmentStats, DEFAULT_COMPACTION_THRESHOLD, DEFAULT_MAX_SEGMENT_SIZE,
};
