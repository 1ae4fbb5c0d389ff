//! Text Record Codecs
//!
//! Both persistence files are plain text, one record per line, with fields
//! separated the same way as on the wire (see [`is_field_separator`]):
//!
//! ```text
//! append log                 snapshot
//! ----------                 --------
//! SET <key> <value>          <key> <value> <expire_epoch_seconds>
//! SETEX <key> <ttl> <value>  <key> <value> -1            (no expiry)
//! DEL <key>
//! ```
//!
//! Fields are not escaped. The line parser never produces a token holding a
//! separator, so any key or value a client can send round-trips.
//! Lines that fail to decode are reported to the caller, which skips them.
//!
//! Decoding is zero-copy: each line is read into one `Bytes` buffer and the
//! key/value fields are `slice_ref`s into it.

use crate::persistence::PersistenceError;
use crate::protocol::is_field_separator;
use bytes::Bytes;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Sentinel written in the expiry column for keys without a TTL.
pub const NO_EXPIRY: i64 = -1;

/// A record that can be written to and read back from a single text line.
pub trait TextRecord: Sized {
    /// Appends the record, including the trailing newline, to `out`.
    fn encode(&self, out: &mut Vec<u8>);

    /// Decodes one line (without its terminator). `None` means malformed.
    fn decode(line: &Bytes) -> Option<Self>;
}

/// One mutating command in a shard's append log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogRecord {
    Set { key: Bytes, value: Bytes },
    SetEx { key: Bytes, ttl_secs: u64, value: Bytes },
    Del { key: Bytes },
}

impl TextRecord for LogRecord {
    fn encode(&self, out: &mut Vec<u8>) {
        match self {
            LogRecord::Set { key, value } => {
                out.extend_from_slice(b"SET ");
                out.extend_from_slice(key);
                out.push(b' ');
                out.extend_from_slice(value);
            }
            LogRecord::SetEx {
                key,
                ttl_secs,
                value,
            } => {
                out.extend_from_slice(b"SETEX ");
                out.extend_from_slice(key);
                out.push(b' ');
                out.extend_from_slice(ttl_secs.to_string().as_bytes());
                out.push(b' ');
                out.extend_from_slice(value);
            }
            LogRecord::Del { key } => {
                out.extend_from_slice(b"DEL ");
                out.extend_from_slice(key);
            }
        }
        out.push(b'\n');
    }

    fn decode(line: &Bytes) -> Option<Self> {
        let fields: Vec<&[u8]> = split_fields(line).collect();
        let (cmd, args) = fields.split_first()?;

        if cmd.eq_ignore_ascii_case(b"SET") {
            match args {
                [key, value] => Some(LogRecord::Set {
                    key: line.slice_ref(key),
                    value: line.slice_ref(value),
                }),
                _ => None,
            }
        } else if cmd.eq_ignore_ascii_case(b"SETEX") {
            match args {
                [key, ttl, value] => Some(LogRecord::SetEx {
                    key: line.slice_ref(key),
                    ttl_secs: parse_ascii(ttl)?,
                    value: line.slice_ref(value),
                }),
                _ => None,
            }
        } else if cmd.eq_ignore_ascii_case(b"DEL") {
            match args {
                [key] => Some(LogRecord::Del {
                    key: line.slice_ref(key),
                }),
                _ => None,
            }
        } else {
            None
        }
    }
}

/// One entry of a shard snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotRecord {
    pub key: Bytes,
    pub value: Bytes,
    /// Absolute expiry as Unix seconds, `None` for no expiry.
    pub expires_at_epoch: Option<u64>,
}

impl TextRecord for SnapshotRecord {
    fn encode(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.key);
        out.push(b' ');
        out.extend_from_slice(&self.value);
        out.push(b' ');
        let expiry = match self.expires_at_epoch {
            Some(secs) => secs.to_string(),
            None => NO_EXPIRY.to_string(),
        };
        out.extend_from_slice(expiry.as_bytes());
        out.push(b'\n');
    }

    fn decode(line: &Bytes) -> Option<Self> {
        let fields: Vec<&[u8]> = split_fields(line).collect();
        let [key, value, expiry] = fields.as_slice() else {
            return None;
        };

        let expiry: i64 = parse_ascii(expiry)?;
        let expires_at_epoch = match expiry {
            NO_EXPIRY => None,
            secs if secs >= 0 => Some(secs as u64),
            _ => return None,
        };

        Some(SnapshotRecord {
            key: line.slice_ref(key),
            value: line.slice_ref(value),
            expires_at_epoch,
        })
    }
}

/// Splits a line into its non-empty fields.
fn split_fields(line: &[u8]) -> impl Iterator<Item = &[u8]> {
    line.split(|&b| is_field_separator(b))
        .filter(|field| !field.is_empty())
}

fn parse_ascii<T: std::str::FromStr>(field: &[u8]) -> Option<T> {
    std::str::from_utf8(field).ok()?.parse().ok()
}

// ============================================================================
// Clock domain translation
// ============================================================================

/// Largest expiry written to a snapshot; it must parse back as an `i64`.
pub const MAX_EPOCH_SECS: u64 = i64::MAX as u64;

/// Converts a monotonic deadline into Unix seconds.
///
/// Future deadlines are rounded up so a restored key never expires earlier
/// than it would have in the process that saved it. Deadlines past what the
/// wall clock can represent saturate at [`MAX_EPOCH_SECS`].
pub fn instant_to_epoch_secs(at: Instant) -> u64 {
    let now = Instant::now();
    let wall_now = SystemTime::now();

    let wall_at = if at >= now {
        match wall_now.checked_add(at - now) {
            Some(wall_at) => wall_at,
            None => return MAX_EPOCH_SECS,
        }
    } else {
        wall_now.checked_sub(now - at).unwrap_or(UNIX_EPOCH)
    };

    let secs = match wall_at.duration_since(UNIX_EPOCH) {
        Ok(since) if since.subsec_nanos() > 0 && at > now => since.as_secs().saturating_add(1),
        Ok(since) => since.as_secs(),
        Err(_) => 0,
    };
    secs.min(MAX_EPOCH_SECS)
}

/// Converts Unix seconds back into a monotonic deadline.
///
/// Timestamps in the past map to a deadline at or before now, so the entry
/// reads as expired. Returns `None` when the deadline is too far away for an
/// `Instant`; such an entry never expires, as with an oversized live TTL.
pub fn epoch_secs_to_instant(secs: u64) -> Option<Instant> {
    let now = Instant::now();
    let target = UNIX_EPOCH.checked_add(Duration::from_secs(secs))?;

    match target.duration_since(SystemTime::now()) {
        Ok(ahead) => now.checked_add(ahead),
        Err(behind) => Some(now.checked_sub(behind.duration()).unwrap_or(now)),
    }
}

// ============================================================================
// Reading
// ============================================================================

/// One line of a record file.
#[derive(Debug)]
pub struct RecordLine<T> {
    /// 1-based line number, for diagnostics.
    pub number: usize,
    /// The decoded record, or `None` if the line was malformed.
    pub record: Option<T>,
    /// The raw line.
    pub raw: Bytes,
}

/// Streams decoded records from a text file, skipping blank lines.
pub struct RecordReader<T> {
    path: PathBuf,
    reader: BufReader<File>,
    line_no: usize,
    _record: PhantomData<T>,
}

impl<T: TextRecord> RecordReader<T> {
    /// Opens `path` for reading.
    pub fn open(path: &Path) -> Result<Self, PersistenceError> {
        let file = File::open(path).map_err(|source| PersistenceError::Open {
            path: path.to_path_buf(),
            source,
        })?;

        Ok(Self {
            path: path.to_path_buf(),
            reader: BufReader::new(file),
            line_no: 0,
            _record: PhantomData,
        })
    }
}

impl<T: TextRecord> Iterator for RecordReader<T> {
    type Item = Result<RecordLine<T>, PersistenceError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let mut buf = Vec::new();
            match self.reader.read_until(b'\n', &mut buf) {
                Ok(0) => return None,
                Ok(_) => {}
                Err(source) => {
                    return Some(Err(PersistenceError::Read {
                        path: self.path.clone(),
                        source,
                    }))
                }
            }
            self.line_no += 1;

            while matches!(buf.last(), Some(b'\n' | b'\r')) {
                buf.pop();
            }
            if buf.iter().all(|&b| is_field_separator(b)) {
                continue;
            }

            let raw = Bytes::from(buf);
            return Some(Ok(RecordLine {
                number: self.line_no,
                record: T::decode(&raw),
                raw,
            }));
        }
    }
}
