//! Single-Shard Engine
//!
//! A [`Shard`] is one capacity-bounded key-value table: a hash index for
//! lookups, a [`RecencyList`] for LRU order, lazy TTL expiry, lifetime
//! counters, and an optional append log.
//!
//! ## Concurrency
//!
//! All state sits behind one `Mutex`. `get` takes the same exclusive lock as
//! the writers because a read mutates the shard: it promotes the key in the
//! recency list, or removes it when it has expired. Every operation is one
//! critical section, so operations on a shard are linearizable and the
//! append log records them in exactly that order.
//!
//! ## Invariants
//!
//! - The index and the recency list always hold the same keys.
//! - With `capacity > 0`, a mutation never leaves more than `capacity` keys.
//!   Snapshot load is the one exception: it restores every record it reads.
//! - The most recently inserted or read key is at the front; eviction takes
//!   the back.
//! - An expired entry is never returned, and the first `get` that sees it
//!   removes it. There is no background sweeper, so `size` counts expired
//!   keys that nobody has read yet.

use crate::persistence::record::{epoch_secs_to_instant, instant_to_epoch_secs};
use crate::persistence::{
    write_snapshot, AppendLog, LoadReport, LogRecord, PersistenceResult, RecordReader,
    ReplayReport, SnapshotRecord,
};
use crate::storage::recency::{NodeId, RecencyList};
use bytes::Bytes;
use std::collections::HashMap;
use std::ops::{Add, AddAssign};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, trace, warn};

/// A stored value with its optional absolute expiry.
#[derive(Debug, Clone)]
pub struct Entry {
    /// The stored value
    pub value: Bytes,
    /// Monotonic deadline; `None` never expires
    pub expires_at: Option<Instant>,
    /// Position in the shard's recency list
    node: NodeId,
}

impl Entry {
    /// An entry is expired once `now` reaches its deadline.
    #[inline]
    pub fn is_expired_at(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|exp| now >= exp)
    }
}

/// Counters for one shard, or the sum over several.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShardStats {
    /// Reads that returned a value
    pub hits: u64,
    /// Reads of absent or expired keys
    pub misses: u64,
    /// Keys removed to make room for a new key
    pub evictions: u64,
    /// Keys currently in the index, expired-but-unread ones included
    pub size: u64,
}

impl ShardStats {
    /// hits / (hits + misses), or 0.0 before the first read.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

impl Add for ShardStats {
    type Output = ShardStats;

    fn add(self, rhs: ShardStats) -> ShardStats {
        ShardStats {
            hits: self.hits + rhs.hits,
            misses: self.misses + rhs.misses,
            evictions: self.evictions + rhs.evictions,
            size: self.size + rhs.size,
        }
    }
}

impl AddAssign for ShardStats {
    fn add_assign(&mut self, rhs: ShardStats) {
        *self = *self + rhs;
    }
}

impl std::iter::Sum for ShardStats {
    fn sum<I: Iterator<Item = ShardStats>>(iter: I) -> ShardStats {
        iter.fold(ShardStats::default(), Add::add)
    }
}

/// Everything guarded by the shard lock.
#[derive(Debug)]
struct ShardState {
    id: usize,
    index: HashMap<Bytes, Entry>,
    recency: RecencyList,
    /// Maximum number of keys, 0 = unbounded
    capacity: usize,
    hits: u64,
    misses: u64,
    evictions: u64,
    log: Option<AppendLog>,
}

impl ShardState {
    fn new(id: usize, capacity: usize) -> Self {
        Self {
            id,
            index: HashMap::new(),
            recency: RecencyList::new(),
            capacity,
            hits: 0,
            misses: 0,
            evictions: 0,
            log: None,
        }
    }

    // ========================================================================
    // Mutations (the live path and log replay both go through these)
    // ========================================================================

    /// Upserts a key and appends the command to the log.
    fn set(&mut self, key: Bytes, value: Bytes, ttl: Option<Duration>) -> bool {
        let expires_at = ttl.and_then(|ttl| Instant::now().checked_add(ttl));
        let is_new = self.upsert(key.clone(), value.clone(), expires_at, true);

        if self.log.is_some() {
            let record = match ttl {
                None => LogRecord::Set { key, value },
                Some(ttl) => LogRecord::SetEx {
                    key,
                    ttl_secs: whole_secs_ceil(ttl),
                    value,
                },
            };
            self.append_log(&record);
        }

        is_new
    }

    /// Removes a key, logging the command only if the key existed.
    fn del(&mut self, key: &[u8]) -> bool {
        match self.remove(key) {
            Some((key, _)) => {
                if self.log.is_some() {
                    self.append_log(&LogRecord::Del { key });
                }
                true
            }
            None => false,
        }
    }

    /// Dispatches one logged command exactly as a live caller would.
    fn apply(&mut self, record: LogRecord) {
        match record {
            LogRecord::Set { key, value } => {
                self.set(key, value, None);
            }
            LogRecord::SetEx {
                key,
                ttl_secs,
                value,
            } => {
                self.set(key, value, Some(Duration::from_secs(ttl_secs)));
            }
            LogRecord::Del { key } => {
                self.del(&key);
            }
        }
    }

    fn get(&mut self, key: &[u8]) -> Option<Bytes> {
        let now = Instant::now();

        let (node, expired) = match self.index.get(key) {
            Some(entry) => (entry.node, entry.is_expired_at(now)),
            None => {
                self.misses += 1;
                return None;
            }
        };

        if expired {
            self.remove(key);
            self.misses += 1;
            trace!(shard = self.id, "Lazily expired key on read");
            return None;
        }

        self.hits += 1;
        self.recency.move_to_front(node);
        self.index.get(key).map(|entry| entry.value.clone())
    }

    // ========================================================================
    // Index + recency list primitives
    // ========================================================================

    /// Inserts or overwrites. Overwrites never evict; a new key evicts the
    /// LRU entry first when `enforce_capacity` is set and the shard is full.
    fn upsert(
        &mut self,
        key: Bytes,
        value: Bytes,
        expires_at: Option<Instant>,
        enforce_capacity: bool,
    ) -> bool {
        if let Some(entry) = self.index.get_mut(&key) {
            entry.value = value;
            entry.expires_at = expires_at;
            self.recency.move_to_front(entry.node);
            return false;
        }

        if enforce_capacity && self.capacity > 0 && self.index.len() >= self.capacity {
            self.evict_lru();
        }

        let node = self.recency.push_front(key.clone());
        self.index.insert(
            key,
            Entry {
                value,
                expires_at,
                node,
            },
        );
        true
    }

    fn remove(&mut self, key: &[u8]) -> Option<(Bytes, Entry)> {
        let entry = self.index.remove(key)?;
        let key = self.recency.remove(entry.node);
        Some((key, entry))
    }

    fn evict_lru(&mut self) {
        if let Some(victim) = self.recency.pop_back() {
            self.index.remove(&victim);
            self.evictions += 1;
            trace!(shard = self.id, "Evicted least recently used key");
        }
    }

    fn clear(&mut self) {
        self.index.clear();
        self.recency.clear();
    }

    fn stats(&self) -> ShardStats {
        ShardStats {
            hits: self.hits,
            misses: self.misses,
            evictions: self.evictions,
            size: self.index.len() as u64,
        }
    }

    // ========================================================================
    // Persistence helpers
    // ========================================================================

    /// Appends to the log. A failed write drops the sink: the in-memory
    /// mutation stands, but the log can no longer be trusted for replay.
    fn append_log(&mut self, record: &LogRecord) {
        let Some(log) = self.log.as_mut() else {
            return;
        };
        if let Err(e) = log.append(record) {
            error!(shard = self.id, error = %e, "Append log write failed, logging disabled");
            self.log = None;
        }
    }

    /// Entries from least to most recently used, so that loading them in
    /// file order rebuilds the same recency order.
    fn snapshot_records(&self) -> Vec<SnapshotRecord> {
        self.recency
            .iter_lru()
            .filter_map(|key| {
                self.index.get(key).map(|entry| SnapshotRecord {
                    key: key.clone(),
                    value: entry.value.clone(),
                    expires_at_epoch: entry.expires_at.map(instant_to_epoch_secs),
                })
            })
            .collect()
    }
}

fn whole_secs_ceil(ttl: Duration) -> u64 {
    ttl.as_secs().saturating_add(u64::from(ttl.subsec_nanos() > 0))
}

/// One independently locked, capacity-bounded key-value table.
///
/// # Example
///
/// ```
/// use shardkv::storage::Shard;
/// use bytes::Bytes;
///
/// let shard = Shard::new(2);
/// shard.set(Bytes::from("a"), Bytes::from("1"));
/// shard.set(Bytes::from("b"), Bytes::from("2"));
/// shard.get(b"a");                                // promotes "a"
/// shard.set(Bytes::from("c"), Bytes::from("3")); // evicts "b"
///
/// assert_eq!(shard.get(b"a"), Some(Bytes::from("1")));
/// assert_eq!(shard.get(b"b"), None);
/// ```
pub struct Shard {
    state: Mutex<ShardState>,
}

impl std::fmt::Debug for Shard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("Shard")
            .field("id", &state.id)
            .field("capacity", &state.capacity)
            .field("size", &state.index.len())
            .field("logging", &state.log.is_some())
            .finish()
    }
}

impl Shard {
    /// Creates a shard holding at most `capacity` keys (0 = unbounded).
    pub fn new(capacity: usize) -> Self {
        Self::with_id(0, capacity)
    }

    /// Creates a shard with an id used in log output.
    pub fn with_id(id: usize, capacity: usize) -> Self {
        Self {
            state: Mutex::new(ShardState::new(id, capacity)),
        }
    }

    /// A panic while holding the lock cannot leave the index and recency
    /// list out of step, so a poisoned lock is still safe to use.
    fn lock(&self) -> MutexGuard<'_, ShardState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ========================================================================
    // Key-value operations
    // ========================================================================

    /// Stores a value with no expiry, clearing any previous expiry.
    ///
    /// Returns `true` if the key was new. Inserting a new key into a full
    /// shard evicts the least recently used key first.
    pub fn set(&self, key: Bytes, value: Bytes) -> bool {
        self.lock().set(key, value, None)
    }

    /// Stores a value that expires `ttl` from now.
    ///
    /// The log records the TTL in whole seconds, rounded up. A TTL too large
    /// to add to the current `Instant` never expires.
    pub fn set_with_ttl(&self, key: Bytes, value: Bytes, ttl: Duration) -> bool {
        self.lock().set(key, value, Some(ttl))
    }

    /// Looks up a key, promoting it to most recently used.
    ///
    /// An expired key is removed and counted as a miss.
    pub fn get(&self, key: &[u8]) -> Option<Bytes> {
        self.lock().get(key)
    }

    /// Removes a key. Returns `true` if it existed.
    pub fn del(&self, key: &[u8]) -> bool {
        self.lock().del(key)
    }

    /// Current counters; `size` is the index cardinality.
    pub fn stats(&self) -> ShardStats {
        self.lock().stats()
    }

    pub fn len(&self) -> usize {
        self.lock().index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Keys from most to least recently used.
    pub fn keys_by_recency(&self) -> Vec<Bytes> {
        self.lock().recency.iter().cloned().collect()
    }

    // ========================================================================
    // Append log
    // ========================================================================

    /// Starts logging every mutation to `path` (opened in append mode).
    ///
    /// If a log was already open it is flushed and closed first. On error
    /// the previous logging state is left unchanged.
    pub fn enable_log(&self, path: &Path) -> PersistenceResult<()> {
        let log = AppendLog::open(path)?;

        let mut state = self.lock();
        let previous = state.log.replace(log);
        info!(shard = state.id, path = %path.display(), "Append logging enabled");
        drop(state);

        if let Some(previous) = previous {
            previous.close()?;
        }
        Ok(())
    }

    /// Stops logging. Returns `false` if logging was not enabled.
    pub fn disable_log(&self) -> PersistenceResult<bool> {
        let mut state = self.lock();
        let Some(log) = state.log.take() else {
            return Ok(false);
        };
        info!(shard = state.id, path = %log.path().display(), "Append logging disabled");
        drop(state);

        log.close()?;
        Ok(true)
    }

    pub fn is_logging(&self) -> bool {
        self.lock().log.is_some()
    }

    /// The file mutations are currently logged to.
    pub fn log_path(&self) -> Option<PathBuf> {
        self.lock().log.as_ref().map(|log| log.path().to_path_buf())
    }

    /// Replays an append log through the normal write path.
    ///
    /// Logging is suspended for the duration so replayed commands are not
    /// appended again, then restored. TTLs count from replay time. Lines
    /// that do not parse are skipped. The whole replay runs under the shard
    /// lock.
    pub fn replay(&self, path: &Path) -> PersistenceResult<ReplayReport> {
        let reader = RecordReader::<LogRecord>::open(path)?;

        let mut state = self.lock();
        let suspended = state.log.take();
        let mut report = ReplayReport::default();

        let mut result = Ok(());
        for line in reader {
            match line {
                Ok(line) => match line.record {
                    Some(record) => {
                        state.apply(record);
                        report.applied += 1;
                    }
                    None => {
                        warn!(
                            shard = state.id,
                            line = line.number,
                            content = %String::from_utf8_lossy(&line.raw),
                            "Skipping unrecognised log line"
                        );
                        report.skipped += 1;
                    }
                },
                Err(e) => {
                    result = Err(e);
                    break;
                }
            }
        }

        state.log = suspended;
        result?;

        info!(
            shard = state.id,
            applied = report.applied,
            skipped = report.skipped,
            "Append log replayed"
        );
        Ok(report)
    }

    // ========================================================================
    // Snapshots
    // ========================================================================

    /// Writes every entry in the index to `path`, expired-but-unread
    /// entries included. Returns the number of entries written.
    pub fn save(&self, path: &Path) -> PersistenceResult<u64> {
        let (id, records) = {
            let state = self.lock();
            (state.id, state.snapshot_records())
        };

        let written = write_snapshot(path, records)?;
        debug!(shard = id, entries = written, path = %path.display(), "Snapshot saved");
        Ok(written)
    }

    /// Replaces the shard's contents with the snapshot at `path`.
    ///
    /// Records are inserted in file order, each at the most recently used
    /// position, without capacity enforcement. Counters are kept. The load
    /// is not logged.
    pub fn load(&self, path: &Path) -> PersistenceResult<LoadReport> {
        let mut report = LoadReport::default();
        let mut records = Vec::new();

        for line in RecordReader::<SnapshotRecord>::open(path)? {
            let line = line?;
            match line.record {
                Some(record) => records.push(record),
                None => {
                    warn!(
                        line = line.number,
                        path = %path.display(),
                        "Skipping malformed snapshot record"
                    );
                    report.skipped += 1;
                }
            }
        }

        let mut state = self.lock();
        state.clear();
        for record in records {
            let expires_at = record.expires_at_epoch.and_then(epoch_secs_to_instant);
            state.upsert(record.key, record.value, expires_at, false);
            report.loaded += 1;
        }

        info!(
            shard = state.id,
            loaded = report.loaded,
            skipped = report.skipped,
            "Snapshot loaded"
        );
        Ok(report)
    }

    /// Saves a snapshot and truncates the append log in one critical
    /// section, so that loading the snapshot and replaying the log
    /// reproduces the current state exactly once.
    ///
    /// If the truncate fails after the snapshot is in place, logging is
    /// disabled: the old log would replay commands the snapshot already
    /// holds.
    pub fn checkpoint(&self, snapshot: &Path) -> PersistenceResult<u64> {
        let mut state = self.lock();
        let written = write_snapshot(snapshot, state.snapshot_records())?;

        if let Some(log) = state.log.as_mut() {
            if let Err(e) = log.truncate() {
                error!(shard = state.id, error = %e, "Append log truncate failed, logging disabled");
                state.log = None;
                return Err(e);
            }
        }

        debug!(shard = state.id, entries = written, "Checkpoint written");
        Ok(written)
    }

    #[cfg(test)]
    pub(crate) fn assert_coherent(&self) {
        let state = self.lock();
        assert_eq!(state.index.len(), state.recency.len());
        for key in state.recency.iter() {
            assert!(state.index.contains_key(key), "list key missing from index");
        }
        if state.capacity > 0 {
            assert!(state.index.len() <= state.capacity);
        }
    }

    /// Keys that carry a deadline, sorted.
    #[cfg(test)]
    pub(crate) fn expiring_keys(&self) -> Vec<Bytes> {
        let state = self.lock();
        let mut keys: Vec<Bytes> = state
            .index
            .iter()
            .filter(|(_, entry)| entry.expires_at.is_some())
            .map(|(key, _)| key.clone())
            .collect();
        keys.sort();
        keys
    }
}
