//! Append-Only Log Sink
//!
//! An open, appendable log file owned by exactly one shard. The shard calls
//! [`AppendLog::append`] while holding its lock, so records land in the file
//! in the same order the mutations took effect.
//!
//! Each append is flushed to the OS before returning; there is no background
//! buffering.

use crate::persistence::record::{LogRecord, TextRecord};
use crate::persistence::{PersistenceError, PersistenceResult};
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

/// An open append log.
#[derive(Debug)]
pub struct AppendLog {
    path: PathBuf,
    writer: BufWriter<File>,
    /// Reused encode buffer
    scratch: Vec<u8>,
}

impl AppendLog {
    /// Opens `path` for appending, creating it if needed.
    pub fn open(path: &Path) -> PersistenceResult<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|source| PersistenceError::Open {
                path: path.to_path_buf(),
                source,
            })?;

        debug!(path = %path.display(), "Append log opened");

        Ok(Self {
            path: path.to_path_buf(),
            writer: BufWriter::new(file),
            scratch: Vec::with_capacity(128),
        })
    }

    /// The file this log appends to.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Writes one record and flushes it.
    pub fn append(&mut self, record: &LogRecord) -> PersistenceResult<()> {
        self.scratch.clear();
        record.encode(&mut self.scratch);

        self.writer
            .write_all(&self.scratch)
            .and_then(|()| self.writer.flush())
            .map_err(|source| PersistenceError::Write {
                path: self.path.clone(),
                source,
            })
    }

    /// Discards everything written so far. Later appends start at offset 0.
    pub fn truncate(&mut self) -> PersistenceResult<()> {
        self.writer
            .flush()
            .and_then(|()| self.writer.get_ref().set_len(0))
            .map_err(|source| PersistenceError::Write {
                path: self.path.clone(),
                source,
            })?;

        debug!(path = %self.path.display(), "Append log truncated");
        Ok(())
    }

    /// Flushes and closes the log.
    pub fn close(mut self) -> PersistenceResult<()> {
        self.writer.flush().map_err(|source| PersistenceError::Write {
            path: self.path.clone(),
            source,
        })?;
        debug!(path = %self.path.display(), "Append log closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn set(key: &str, value: &str) -> LogRecord {
        LogRecord::Set {
            key: Bytes::from(key.to_string()),
            value: Bytes::from(value.to_string()),
        }
    }

    #[test]
    fn test_append_is_visible_immediately() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shard.aof");

        let mut log = AppendLog::open(&path).unwrap();
        log.append(&set("a", "1")).unwrap();
        log.append(&LogRecord::Del {
            key: Bytes::from("a"),
        })
        .unwrap();

        // No close: each append was already flushed
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "SET a 1\nDEL a\n");
    }

    #[test]
    fn test_reopen_appends() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shard.aof");

        let mut log = AppendLog::open(&path).unwrap();
        log.append(&set("a", "1")).unwrap();
        log.close().unwrap();

        let mut log = AppendLog::open(&path).unwrap();
        log.append(&set("b", "2")).unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "SET a 1\nSET b 2\n");
    }

    #[test]
    fn test_truncate() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shard.aof");

        let mut log = AppendLog::open(&path).unwrap();
        log.append(&set("a", "1")).unwrap();
        log.truncate().unwrap();
        log.append(&set("b", "2")).unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "SET b 2\n");
    }

    #[test]
    fn test_open_in_missing_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("shard.aof");

        let err = AppendLog::open(&path).unwrap_err();
        assert!(matches!(err, PersistenceError::Open { .. }));
    }
}
