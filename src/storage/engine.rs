//! Sharded Storage Engine
//!
//! The [`StorageEngine`] owns a fixed set of [`Shard`]s and routes every key
//! to exactly one of them by hash. It holds no other state: each operation is
//! a direct delegation to the selected shard, under that shard's lock.
//!
//! ## Concurrency Model
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     StorageEngine                           │
//! │  ┌─────────┐ ┌─────────┐ ┌─────────┐ ┌─────────┐           │
//! │  │ Shard 0 │ │ Shard 1 │ │ Shard 2 │ │ Shard N │           │
//! │  │ Mutex   │ │ Mutex   │ │ Mutex   │ │ Mutex   │           │
//! │  │ LRU+TTL │ │ LRU+TTL │ │ LRU+TTL │ │ LRU+TTL │           │
//! │  │ AOF     │ │ AOF     │ │ AOF     │ │ AOF     │           │
//! │  └─────────┘ └─────────┘ └─────────┘ └─────────┘           │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Operations on keys in different shards run in parallel and have no
//! ordering relative to each other. There are no multi-key operations.
//! [`StorageEngine::stats`] reads the shards one after another, so the sum is
//! not an atomic snapshot.
//!
//! Capacity is per shard: a full shard evicts its own LRU key even when
//! other shards have room.

use crate::persistence::{
    log_path, snapshot_path, LoadReport, PersistenceError, PersistenceResult, ReplayReport,
};
use crate::storage::shard::{Shard, ShardStats};
use bytes::Bytes;
use std::hash::{DefaultHasher, Hash, Hasher};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

/// Default number of shards.
pub const DEFAULT_SHARDS: usize = 16;

/// Construction parameters for a [`StorageEngine`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageConfig {
    /// Number of shards (values below 1 are treated as 1)
    pub shard_count: usize,
    /// Maximum keys per shard, 0 = unbounded
    pub capacity_per_shard: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            shard_count: DEFAULT_SHARDS,
            capacity_per_shard: 0,
        }
    }
}

/// What startup recovery found on disk.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    pub snapshots: LoadReport,
    pub logs: ReplayReport,
}

/// The sharded store shared by every client connection.
///
/// # Example
///
/// ```
/// use shardkv::storage::StorageEngine;
/// use bytes::Bytes;
/// use std::time::Duration;
///
/// let engine = StorageEngine::new(4, 1000);
///
/// engine.set(Bytes::from("name"), Bytes::from("shardkv"));
/// assert_eq!(engine.get(b"name"), Some(Bytes::from("shardkv")));
///
/// engine.set_with_ttl(Bytes::from("session"), Bytes::from("abc123"), Duration::from_secs(60));
/// engine.del(b"name");
///
/// let stats = engine.stats();
/// assert_eq!(stats.hits, 1);
/// assert_eq!(stats.size, 1);
/// ```
pub struct StorageEngine {
    shards: Vec<Shard>,
    capacity_per_shard: usize,
}

impl std::fmt::Debug for StorageEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageEngine")
            .field("shards", &self.shards.len())
            .field("capacity_per_shard", &self.capacity_per_shard)
            .finish()
    }
}

impl Default for StorageEngine {
    fn default() -> Self {
        Self::with_config(&StorageConfig::default())
    }
}

impl StorageEngine {
    /// Creates `shard_count` shards, each holding at most
    /// `capacity_per_shard` keys (0 = unbounded).
    pub fn new(shard_count: usize, capacity_per_shard: usize) -> Self {
        let shards = (0..shard_count.max(1))
            .map(|id| Shard::with_id(id, capacity_per_shard))
            .collect();

        Self {
            shards,
            capacity_per_shard,
        }
    }

    pub fn with_config(config: &StorageConfig) -> Self {
        Self::new(config.shard_count, config.capacity_per_shard)
    }

    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    pub fn capacity_per_shard(&self) -> usize {
        self.capacity_per_shard
    }

    /// Determines which shard a key belongs to.
    ///
    /// Pure and stable for the life of the engine.
    #[inline]
    pub fn shard_index(&self, key: &[u8]) -> usize {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        (hasher.finish() as usize) % self.shards.len()
    }

    pub fn shards(&self) -> &[Shard] {
        &self.shards
    }

    #[inline]
    fn get_shard(&self, key: &[u8]) -> &Shard {
        &self.shards[self.shard_index(key)]
    }

    // ========================================================================
    // Key-value operations
    // ========================================================================

    /// Stores a value with no expiry. Returns `true` if the key was new.
    pub fn set(&self, key: Bytes, value: Bytes) -> bool {
        self.get_shard(&key).set(key, value)
    }

    /// Stores a value that expires `ttl` from now.
    pub fn set_with_ttl(&self, key: Bytes, value: Bytes, ttl: Duration) -> bool {
        self.get_shard(&key).set_with_ttl(key, value, ttl)
    }

    /// Gets the value for a key, `None` if absent or expired.
    pub fn get(&self, key: &[u8]) -> Option<Bytes> {
        self.get_shard(key).get(key)
    }

    /// Deletes a key. Returns `true` if it existed.
    pub fn del(&self, key: &[u8]) -> bool {
        self.get_shard(key).del(key)
    }

    /// Sum of every shard's counters.
    pub fn stats(&self) -> ShardStats {
        self.shards.iter().map(Shard::stats).sum()
    }

    /// Per-shard counters, in shard order.
    pub fn shard_stats(&self) -> Vec<ShardStats> {
        self.shards.iter().map(Shard::stats).collect()
    }

    /// Total number of keys across all shards.
    pub fn len(&self) -> usize {
        self.shards.iter().map(Shard::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // ========================================================================
    // Persistence (one file per shard inside `dir`)
    // ========================================================================

    /// Opens `shard-NNN.aof` in `dir` for every shard, creating `dir` if
    /// needed.
    pub fn enable_logging(&self, dir: &Path) -> PersistenceResult<()> {
        ensure_dir(dir)?;
        for (index, shard) in self.shards.iter().enumerate() {
            shard.enable_log(&log_path(dir, index))?;
        }
        info!(dir = %dir.display(), shards = self.shards.len(), "Append logging enabled");
        Ok(())
    }

    /// Closes every shard's log.
    pub fn disable_logging(&self) -> PersistenceResult<()> {
        for shard in &self.shards {
            shard.disable_log()?;
        }
        Ok(())
    }

    /// Replays every shard's log found in `dir`. Missing files are skipped.
    pub fn replay_logs(&self, dir: &Path) -> PersistenceResult<ReplayReport> {
        let mut total = ReplayReport::default();
        for (index, shard) in self.shards.iter().enumerate() {
            let path = log_path(dir, index);
            if !path.exists() {
                debug!(shard = index, "No append log to replay");
                continue;
            }
            let report = shard.replay(&path)?;
            total.applied += report.applied;
            total.skipped += report.skipped;
        }
        Ok(total)
    }

    /// Saves every shard to `shard-NNN.snapshot` in `dir`.
    pub fn save_snapshots(&self, dir: &Path) -> PersistenceResult<u64> {
        ensure_dir(dir)?;
        let mut written = 0;
        for (index, shard) in self.shards.iter().enumerate() {
            written += shard.save(&snapshot_path(dir, index))?;
        }
        Ok(written)
    }

    /// Loads every shard's snapshot found in `dir`. Shards without a
    /// snapshot file keep their contents.
    pub fn load_snapshots(&self, dir: &Path) -> PersistenceResult<LoadReport> {
        let mut total = LoadReport::default();
        for (index, shard) in self.shards.iter().enumerate() {
            let path = snapshot_path(dir, index);
            if !path.exists() {
                debug!(shard = index, "No snapshot to load");
                continue;
            }
            let report = shard.load(&path)?;
            total.loaded += report.loaded;
            total.skipped += report.skipped;
        }
        Ok(total)
    }

    /// Checkpoints every shard: snapshot written, log truncated.
    pub fn checkpoint(&self, dir: &Path) -> PersistenceResult<u64> {
        ensure_dir(dir)?;
        let mut written = 0;
        for (index, shard) in self.shards.iter().enumerate() {
            written += shard.checkpoint(&snapshot_path(dir, index))?;
        }
        debug!(dir = %dir.display(), entries = written, "Checkpoint complete");
        Ok(written)
    }

    /// Startup recovery: load snapshots, replay logs, then start logging.
    ///
    /// The shard count must match the run that wrote `dir`.
    pub fn recover(&self, dir: &Path) -> PersistenceResult<RecoveryReport> {
        let snapshots = self.load_snapshots(dir)?;
        let logs = self.replay_logs(dir)?;
        self.enable_logging(dir)?;

        info!(
            loaded = snapshots.loaded,
            replayed = logs.applied,
            skipped = snapshots.skipped + logs.skipped,
            keys = self.len(),
            "Recovery complete"
        );
        Ok(RecoveryReport { snapshots, logs })
    }
}

fn ensure_dir(dir: &Path) -> PersistenceResult<()> {
    std::fs::create_dir_all(dir).map_err(|source| PersistenceError::Open {
        path: dir.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn b(s: &str) -> Bytes {
        Bytes::from(s.to_string())
    }

    #[test]
    fn test_set_and_get() {
        let engine = StorageEngine::new(8, 0);

        engine.set(b("name"), b("shardkv"));
        assert_eq!(engine.get(b"name"), Some(b("shardkv")));
        assert_eq!(engine.get(b"nonexistent"), None);
    }

    #[test]
    fn test_del() {
        let engine = StorageEngine::new(8, 0);

        engine.set(b("key"), b("value"));
        assert!(engine.del(b"key"));
        assert!(!engine.del(b"key"));
        assert!(engine.is_empty());
    }

    #[test]
    fn test_shard_index_is_stable() {
        let engine = StorageEngine::new(16, 0);

        for i in 0..100 {
            let key = format!("key:{i}");
            let first = engine.shard_index(key.as_bytes());
            assert!(first < 16);
            for _ in 0..5 {
                assert_eq!(engine.shard_index(key.as_bytes()), first);
            }
        }
    }

    #[test]
    fn test_keys_land_in_their_shard() {
        let engine = StorageEngine::new(4, 0);

        for i in 0..50 {
            let key = b(&format!("k{i}"));
            engine.set(key.clone(), b("v"));
            let owner = engine.shard_index(&key);
            for (index, shard) in engine.shards().iter().enumerate() {
                assert_eq!(shard.keys_by_recency().contains(&key), index == owner);
            }
        }
    }

    #[test]
    fn test_keys_spread_over_shards() {
        let engine = StorageEngine::new(8, 0);
        for i in 0..1000 {
            engine.set(b(&format!("key:{i}")), b("v"));
        }
        assert!(engine.shard_stats().iter().all(|s| s.size > 0));
        assert_eq!(engine.len(), 1000);
    }

    #[test]
    fn test_zero_shards_means_one() {
        let engine = StorageEngine::new(0, 0);
        assert_eq!(engine.shard_count(), 1);
        engine.set(b("a"), b("1"));
        assert_eq!(engine.get(b"a"), Some(b("1")));
    }

    #[test]
    fn test_stats_are_summed() {
        let engine = StorageEngine::new(4, 0);

        for i in 0..10 {
            engine.set(b(&format!("k{i}")), b("v"));
        }
        for i in 0..10 {
            engine.get(format!("k{i}").as_bytes());
        }
        for i in 0..5 {
            engine.get(format!("missing{i}").as_bytes());
        }

        let stats = engine.stats();
        assert_eq!(stats.hits, 10);
        assert_eq!(stats.misses, 5);
        assert_eq!(stats.size, 10);

        let per_shard: ShardStats = engine.shard_stats().into_iter().sum();
        assert_eq!(per_shard, stats);
    }

    #[test]
    fn test_capacity_is_per_shard() {
        let engine = StorageEngine::new(1, 2);

        engine.set(b("a"), b("1"));
        engine.set(b("b"), b("2"));
        engine.get(b"a");
        engine.set(b("c"), b("3"));

        assert_eq!(engine.get(b"a"), Some(b("1")));
        assert_eq!(engine.get(b"b"), None);
        assert_eq!(engine.stats().evictions, 1);
        assert_eq!(engine.capacity_per_shard(), 2);
    }

    #[test]
    fn test_default_config() {
        let engine = StorageEngine::default();
        assert_eq!(engine.shard_count(), DEFAULT_SHARDS);
        assert_eq!(engine.capacity_per_shard(), 0);
    }

    #[test]
    fn test_concurrent_access() {
        let engine = Arc::new(StorageEngine::new(8, 0));
        let mut handles = vec![];

        for i in 0..10 {
            let engine = Arc::clone(&engine);
            handles.push(thread::spawn(move || {
                for j in 0..100 {
                    let key = b(&format!("key-{i}-{j}"));
                    engine.set(key.clone(), b("value"));
                    assert_eq!(engine.get(&key), Some(b("value")));
                }
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(engine.len(), 1000);
        assert_eq!(engine.stats().hits, 1000);
    }

    #[test]
    fn test_snapshots_round_trip_through_dir() {
        let dir = tempfile::tempdir().unwrap();

        let engine = StorageEngine::new(4, 0);
        for i in 0..40 {
            engine.set(b(&format!("k{i}")), b(&format!("v{i}")));
        }
        assert_eq!(engine.save_snapshots(dir.path()).unwrap(), 40);

        let restored = StorageEngine::new(4, 0);
        let report = restored.load_snapshots(dir.path()).unwrap();
        assert_eq!(report.loaded, 40);
        for i in 0..40 {
            assert_eq!(
                restored.get(format!("k{i}").as_bytes()),
                Some(b(&format!("v{i}")))
            );
        }
    }

    #[test]
    fn test_recover_from_checkpoint_and_logs() {
        let dir = tempfile::tempdir().unwrap();
        let data = dir.path().join("data");

        {
            let engine = StorageEngine::new(4, 0);
            engine.recover(&data).unwrap();
            engine.set(b("a"), b("1"));
            engine.set(b("b"), b("2"));
            engine.checkpoint(&data).unwrap();
            engine.del(b"a");
            engine.set(b("c"), b("3"));
            engine.set_with_ttl(b("d"), b("4"), Duration::from_secs(600));
            engine.disable_logging().unwrap();
        }

        let engine = StorageEngine::new(4, 0);
        let report = engine.recover(&data).unwrap();

        assert_eq!(report.snapshots.loaded, 2);
        assert_eq!(report.logs.applied, 3);
        assert_eq!(engine.get(b"a"), None);
        assert_eq!(engine.get(b"b"), Some(b("2")));
        assert_eq!(engine.get(b"c"), Some(b("3")));
        assert_eq!(engine.get(b"d"), Some(b("4")));
        assert!(engine.shards().iter().all(Shard::is_logging));
    }

    #[test]
    fn test_recover_from_empty_dir() {
        let dir = tempfile::tempdir().unwrap();
        let engine = StorageEngine::new(2, 0);

        let report = engine.recover(dir.path()).unwrap();
        assert_eq!(report, RecoveryReport::default());
        assert!(log_path(dir.path(), 0).exists());
        assert!(log_path(dir.path(), 1).exists());
    }
}
