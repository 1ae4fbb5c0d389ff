//! Persistence Module
//!
//! Durability for the shard engine, in two independent forms:
//!
//! - **Append-only log**: every mutating command a shard applies is written
//!   as one text line and flushed before the command returns. Replaying the
//!   log through the normal write path rebuilds the shard.
//! - **Snapshot**: a full dump of a shard's entries, with absolute expiry
//!   timestamps, restorable on its own.
//!
//! A checkpoint writes a snapshot and truncates the log in the same critical
//! section, so recovery is always "load snapshot, then replay log". The
//! [`CheckpointScheduler`] runs checkpoints in the background.
//!
//! ## On-disk layout
//!
//! ```text
//! <data-dir>/
//!   shard-000.snapshot   shard-000.aof
//!   shard-001.snapshot   shard-001.aof
//!   ...
//! ```

pub mod aof;
pub mod record;
pub mod scheduler;
pub mod snapshot;

pub use aof::AppendLog;
pub use record::{LogRecord, RecordLine, RecordReader, SnapshotRecord, TextRecord};
pub use scheduler::{CheckpointConfig, CheckpointScheduler};
pub use snapshot::write_snapshot;

use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors raised by explicit persistence operations.
///
/// Malformed records are not errors; they are skipped and counted.
#[derive(Debug, Error)]
pub enum PersistenceError {
    /// The file could not be opened or created
    #[error("failed to open {}: {source}", path.display())]
    Open { path: PathBuf, source: io::Error },

    /// Reading an open file failed part way through
    #[error("failed to read {}: {source}", path.display())]
    Read { path: PathBuf, source: io::Error },

    /// Writing, flushing or renaming failed
    #[error("failed to write {}: {source}", path.display())]
    Write { path: PathBuf, source: io::Error },
}

/// Result type for persistence operations.
pub type PersistenceResult<T> = Result<T, PersistenceError>;

/// Outcome of replaying an append log.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplayReport {
    /// Commands dispatched to the shard
    pub applied: u64,
    /// Lines that did not parse as a known command
    pub skipped: u64,
}

/// Outcome of loading a snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadReport {
    /// Entries inserted
    pub loaded: u64,
    /// Lines that did not parse as a snapshot record
    pub skipped: u64,
}

/// Path of the snapshot file for shard `index` inside `dir`.
pub fn snapshot_path(dir: &Path, index: usize) -> PathBuf {
    dir.join(format!("shard-{:03}.snapshot", index))
}

/// Path of the append log for shard `index` inside `dir`.
pub fn log_path(dir: &Path, index: usize) -> PathBuf {
    dir.join(format!("shard-{:03}.aof", index))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_names() {
        let dir = Path::new("/var/lib/shardkv");
        assert_eq!(
            snapshot_path(dir, 7),
            PathBuf::from("/var/lib/shardkv/shard-007.snapshot")
        );
        assert_eq!(
            log_path(dir, 12),
            PathBuf::from("/var/lib/shardkv/shard-012.aof")
        );
    }

    #[test]
    fn test_error_display_includes_path() {
        let err = PersistenceError::Open {
            path: PathBuf::from("/nope/shard-000.aof"),
            source: io::Error::new(io::ErrorKind::NotFound, "not found"),
        };
        let msg = err.to_string();
        assert!(msg.contains("/nope/shard-000.aof"));
        assert!(msg.contains("not found"));
    }
}
