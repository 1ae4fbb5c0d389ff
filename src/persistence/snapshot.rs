//! Snapshot Writer
//!
//! Snapshots are written to `<path>.tmp`, synced, and then renamed over
//! `<path>`. A crash mid-write leaves the previous snapshot intact.

use crate::persistence::record::{SnapshotRecord, TextRecord};
use crate::persistence::{PersistenceError, PersistenceResult};
use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Writes `records` to `path`, replacing any existing snapshot.
///
/// Returns the number of records written.
pub fn write_snapshot<I>(path: &Path, records: I) -> PersistenceResult<u64>
where
    I: IntoIterator<Item = SnapshotRecord>,
{
    let tmp = temp_path(path);
    let write_err = |source: std::io::Error| PersistenceError::Write {
        path: tmp.clone(),
        source,
    };

    let file = File::create(&tmp).map_err(|source| PersistenceError::Open {
        path: tmp.clone(),
        source,
    })?;
    let mut writer = BufWriter::new(file);

    let mut line = Vec::with_capacity(128);
    let mut written = 0u64;
    for record in records {
        line.clear();
        record.encode(&mut line);
        writer.write_all(&line).map_err(write_err)?;
        written += 1;
    }

    let file = writer
        .into_inner()
        .map_err(|e| write_err(e.into_error()))?;
    file.sync_all().map_err(write_err)?;
    drop(file);

    fs::rename(&tmp, path).map_err(|source| PersistenceError::Write {
        path: path.to_path_buf(),
        source,
    })?;

    Ok(written)
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(".tmp");
    PathBuf::from(name)
}
