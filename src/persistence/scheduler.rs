//! Background Checkpoint Task
//!
//! Without checkpoints the append logs grow forever and startup replays
//! every command ever written. The scheduler periodically checkpoints every
//! shard (snapshot written, log truncated) so recovery only replays what
//! happened since the last tick.
//!
//! ## Design
//!
//! The scheduler runs as a Tokio task and:
//! 1. Sleeps for the configured interval
//! 2. Runs [`StorageEngine::checkpoint`] on the blocking pool, since it does
//!    synchronous file I/O under the shard locks
//! 3. Logs the result and goes back to sleep
//!
//! A failed checkpoint is logged and retried on the next tick. The previous
//! snapshot and the untruncated log still describe the data.

use crate::storage::StorageEngine;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{debug, error, info};

/// Configuration for the checkpoint scheduler.
#[derive(Debug, Clone)]
pub struct CheckpointConfig {
    /// Directory holding the per-shard snapshot and log files
    pub dir: PathBuf,

    /// Time between checkpoints (default: 60s)
    pub interval: Duration,
}

impl CheckpointConfig {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            interval: Duration::from_secs(60),
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }
}

/// A handle to the running checkpoint task.
///
/// When this handle is dropped, the task is stopped. A checkpoint already
/// running on the blocking pool finishes first.
#[derive(Debug)]
pub struct CheckpointScheduler {
    shutdown_tx: watch::Sender<bool>,
}

impl CheckpointScheduler {
    /// Starts the checkpoint task. Must be called inside a Tokio runtime.
    pub fn start(engine: Arc<StorageEngine>, config: CheckpointConfig) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        info!(
            dir = %config.dir.display(),
            interval_secs = config.interval.as_secs(),
            "Checkpoint scheduler started"
        );

        tokio::spawn(checkpoint_loop(engine, config, shutdown_rx));

        Self { shutdown_tx }
    }

    /// Stops the task. Called automatically on drop.
    pub fn stop(&self) {
        if self.shutdown_tx.send_replace(true) {
            return;
        }
        info!("Checkpoint scheduler stopped");
    }
}

impl Drop for CheckpointScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn checkpoint_loop(
    engine: Arc<StorageEngine>,
    config: CheckpointConfig,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            _ = tokio::time::sleep(config.interval) => {}
            result = shutdown_rx.changed() => {
                if result.is_err() || *shutdown_rx.borrow() {
                    debug!("Checkpoint scheduler received shutdown signal");
                    return;
                }
            }
        }

        let engine = Arc::clone(&engine);
        let dir = config.dir.clone();
        let started = Instant::now();

        match tokio::task::spawn_blocking(move || engine.checkpoint(&dir)).await {
            Ok(Ok(entries)) => {
                debug!(
                    entries = entries,
                    elapsed_ms = started.elapsed().as_millis(),
                    "Periodic checkpoint written"
                );
            }
            Ok(Err(e)) => {
                error!(error = %e, "Periodic checkpoint failed");
            }
            Err(e) => {
                error!(error = %e, "Checkpoint task panicked");
            }
        }
    }
}
