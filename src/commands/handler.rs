//! Command Handler Module
//!
//! Turns a tokenized command line into a call on the [`StorageEngine`] and
//! the engine's result into a [`Reply`].
//!
//! ## Supported Commands
//!
//! - `SET key value` - Store a value with no expiry
//! - `SETEX key seconds value` - Store a value that expires
//! - `GET key` - Fetch a value, `(nil)` when absent or expired
//! - `DEL key` - Remove a key (replies `OK` whether or not it existed)
//! - `STATS` - Hits, misses, evictions and size summed over all shards
//! - `PING` - Liveness check
//! - `SAVE` - Checkpoint every shard to the data directory
//!
//! Command names are case-insensitive. Keys and values are opaque bytes.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     CommandHandler                          │
//! │                                                             │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐     │
//! │  │  execute()  │───>│  dispatch() │───>│  cmd_xxx()  │     │
//! │  └─────────────┘    └─────────────┘    └─────────────┘     │
//! │                                               │             │
//! │                                               ▼             │
//! │                                      StorageEngine          │
//! └─────────────────────────────────────────────────────────────┘
//! ```

use crate::protocol::Reply;
use crate::storage::StorageEngine;
use bytes::Bytes;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::{Handle, RuntimeFlavor};
use tracing::{error, info};

/// Dispatches commands onto the shared storage engine.
///
/// Cheap to clone; every connection gets its own copy.
#[derive(Debug, Clone)]
pub struct CommandHandler {
    /// The storage engine
    storage: Arc<StorageEngine>,
    /// Where `SAVE` checkpoints to; `None` when persistence is off
    data_dir: Option<Arc<PathBuf>>,
}

impl CommandHandler {
    /// Creates a handler without persistence; `SAVE` replies with an error.
    pub fn new(storage: Arc<StorageEngine>) -> Self {
        Self {
            storage,
            data_dir: None,
        }
    }

    /// Creates a handler whose `SAVE` checkpoints into `data_dir`.
    pub fn with_data_dir(storage: Arc<StorageEngine>, data_dir: impl Into<PathBuf>) -> Self {
        Self {
            storage,
            data_dir: Some(Arc::new(data_dir.into())),
        }
    }

    pub fn storage(&self) -> &Arc<StorageEngine> {
        &self.storage
    }

    /// Executes one command line and returns its reply.
    ///
    /// # Arguments
    ///
    /// * `command` - The tokens of one line, command name first
    pub fn execute(&self, command: Vec<Bytes>) -> Reply {
        let Some((name, args)) = command.split_first() else {
            return Reply::error("empty command");
        };

        let cmd_name = String::from_utf8_lossy(name).to_uppercase();
        self.dispatch(&cmd_name, args)
    }

    fn dispatch(&self, cmd: &str, args: &[Bytes]) -> Reply {
        match cmd {
            "SET" => self.cmd_set(args),
            "SETEX" => self.cmd_setex(args),
            "GET" => self.cmd_get(args),
            "DEL" => self.cmd_del(args),
            "STATS" => self.cmd_stats(args),
            "PING" => self.cmd_ping(args),
            "SAVE" => self.cmd_save(args),

            _ => Reply::error(format!("unknown command '{}'", cmd)),
        }
    }

    // ========================================================================
    // Helper functions
    // ========================================================================

    fn wrong_arity(cmd: &str) -> Reply {
        Reply::error(format!("wrong number of arguments for '{}' command", cmd))
    }

    /// Parses a non-negative decimal integer.
    fn get_seconds(value: &[u8]) -> Option<u64> {
        std::str::from_utf8(value).ok()?.parse().ok()
    }

    // ========================================================================
    // Key-value commands
    // ========================================================================

    /// SET key value
    fn cmd_set(&self, args: &[Bytes]) -> Reply {
        let [key, value] = args else {
            return Self::wrong_arity("SET");
        };

        self.storage.set(key.clone(), value.clone());
        Reply::Ok
    }

    /// SETEX key seconds value
    fn cmd_setex(&self, args: &[Bytes]) -> Reply {
        let [key, seconds, value] = args else {
            return Self::wrong_arity("SETEX");
        };

        let Some(seconds) = Self::get_seconds(seconds) else {
            return Reply::error("invalid expire time");
        };

        self.storage
            .set_with_ttl(key.clone(), value.clone(), Duration::from_secs(seconds));
        Reply::Ok
    }

    /// GET key
    fn cmd_get(&self, args: &[Bytes]) -> Reply {
        let [key] = args else {
            return Self::wrong_arity("GET");
        };

        Reply::from_value(self.storage.get(key))
    }

    /// DEL key
    fn cmd_del(&self, args: &[Bytes]) -> Reply {
        let [key] = args else {
            return Self::wrong_arity("DEL");
        };

        self.storage.del(key);
        Reply::Ok
    }

    // ========================================================================
    // Server commands
    // ========================================================================

    /// STATS
    fn cmd_stats(&self, args: &[Bytes]) -> Reply {
        if !args.is_empty() {
            return Self::wrong_arity("STATS");
        }
        Reply::Stats(self.storage.stats())
    }

    /// PING
    fn cmd_ping(&self, args: &[Bytes]) -> Reply {
        if !args.is_empty() {
            return Self::wrong_arity("PING");
        }
        Reply::Pong
    }

    /// SAVE
    ///
    /// The connection waits for the checkpoint. On a multi-threaded runtime
    /// the worker hands its other tasks off while the files are written.
    fn cmd_save(&self, args: &[Bytes]) -> Reply {
        if !args.is_empty() {
            return Self::wrong_arity("SAVE");
        }

        let Some(dir) = &self.data_dir else {
            return Reply::error("persistence disabled");
        };

        match run_blocking(|| self.storage.checkpoint(dir)) {
            Ok(entries) => {
                info!(entries = entries, "Checkpoint requested by client");
                Reply::Ok
            }
            Err(e) => {
                error!(error = %e, "SAVE failed");
                Reply::error(format!("save failed: {}", e))
            }
        }
    }
}

/// Runs blocking file I/O from command dispatch.
///
/// `block_in_place` is only allowed on the multi-threaded runtime; anywhere
/// else (a current-thread runtime, or no runtime at all) the closure runs
/// inline.
fn run_blocking<T>(f: impl FnOnce() -> T) -> T {
    match Handle::try_current() {
        Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => {
            tokio::task::block_in_place(f)
        }
        _ => f(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::snapshot_path;
    use crate::protocol::parse_line;

    fn create_handler() -> CommandHandler {
        let storage = Arc::new(StorageEngine::new(4, 0));
        CommandHandler::new(storage)
    }

    fn make_command(args: &[&str]) -> Vec<Bytes> {
        args.iter().map(|s| Bytes::from(s.to_string())).collect()
    }

    fn value(s: &str) -> Reply {
        Reply::Value(Bytes::from(s.to_string()))
    }

    #[test]
    fn test_ping() {
        let handler = create_handler();

        assert_eq!(handler.execute(make_command(&["PING"])), Reply::Pong);
        assert_eq!(handler.execute(make_command(&["ping"])), Reply::Pong);
    }

    #[test]
    fn test_set_get() {
        let handler = create_handler();

        let response = handler.execute(make_command(&["SET", "key", "value"]));
        assert_eq!(response, Reply::Ok);

        let response = handler.execute(make_command(&["GET", "key"]));
        assert_eq!(response, value("value"));
    }

    #[test]
    fn test_get_nonexistent() {
        let handler = create_handler();

        let response = handler.execute(make_command(&["GET", "nonexistent"]));
        assert_eq!(response, Reply::Nil);
    }

    #[test]
    fn test_case_insensitive_names() {
        let handler = create_handler();

        handler.execute(make_command(&["set", "k", "v"]));
        assert_eq!(handler.execute(make_command(&["gEt", "k"])), value("v"));
    }

    #[test]
    fn test_del() {
        let handler = create_handler();

        handler.execute(make_command(&["SET", "key", "value"]));
        assert_eq!(handler.execute(make_command(&["DEL", "key"])), Reply::Ok);
        assert_eq!(handler.execute(make_command(&["GET", "key"])), Reply::Nil);

        // Deleting a missing key is still OK
        assert_eq!(handler.execute(make_command(&["DEL", "key"])), Reply::Ok);
    }

    #[test]
    fn test_setex() {
        let handler = create_handler();

        let response = handler.execute(make_command(&["SETEX", "session", "60", "token"]));
        assert_eq!(response, Reply::Ok);
        assert_eq!(
            handler.execute(make_command(&["GET", "session"])),
            value("token")
        );
    }

    #[test]
    fn test_setex_zero_expires_immediately() {
        let handler = create_handler();

        handler.execute(make_command(&["SETEX", "k", "0", "v"]));
        assert_eq!(handler.execute(make_command(&["GET", "k"])), Reply::Nil);
    }

    #[test]
    fn test_setex_expires() {
        let handler = create_handler();

        handler.execute(make_command(&["SETEX", "k", "1", "v"]));
        std::thread::sleep(Duration::from_millis(1100));
        assert_eq!(handler.execute(make_command(&["GET", "k"])), Reply::Nil);
    }

    #[test]
    fn test_setex_invalid_ttl() {
        let handler = create_handler();

        for ttl in ["-1", "abc", "1.5", ""] {
            let response = handler.execute(make_command(&["SETEX", "k", ttl, "v"]));
            assert_eq!(response, Reply::error("invalid expire time"), "ttl {:?}", ttl);
        }
        assert_eq!(handler.storage().len(), 0);
    }

    #[test]
    fn test_stats() {
        let storage = Arc::new(StorageEngine::new(1, 2));
        let handler = CommandHandler::new(storage);

        for cmd in [
            &["SET", "a", "1"][..],
            &["GET", "a"],
            &["GET", "a"],
            &["GET", "x"],
            &["SET", "b", "2"],
            &["SET", "c", "3"],
        ] {
            handler.execute(make_command(cmd));
        }

        let response = handler.execute(make_command(&["STATS"]));
        assert_eq!(
            response.serialize(),
            b"hits=2 misses=1 evictions=1 size=2\n"
        );
    }

    #[test]
    fn test_wrong_arity() {
        let handler = create_handler();

        let cases: &[(&[&str], &str)] = &[
            (&["SET", "k"], "SET"),
            (&["SET", "k", "v", "extra"], "SET"),
            (&["SETEX", "k", "10"], "SETEX"),
            (&["GET"], "GET"),
            (&["GET", "a", "b"], "GET"),
            (&["DEL"], "DEL"),
            (&["STATS", "now"], "STATS"),
            (&["PING", "hello"], "PING"),
            (&["SAVE", "now"], "SAVE"),
        ];

        for (cmd, name) in cases {
            let response = handler.execute(make_command(cmd));
            assert_eq!(
                response,
                Reply::error(format!("wrong number of arguments for '{}' command", name))
            );
        }
    }

    #[test]
    fn test_unknown_command() {
        let handler = create_handler();

        let response = handler.execute(make_command(&["FLUSHALL"]));
        assert_eq!(response, Reply::error("unknown command 'FLUSHALL'"));
        assert_eq!(response.serialize(), b"ERR unknown command 'FLUSHALL'\n");
    }

    #[test]
    fn test_empty_command() {
        let handler = create_handler();
        assert!(handler.execute(Vec::new()).is_error());
    }

    #[test]
    fn test_save_without_data_dir() {
        let handler = create_handler();

        let response = handler.execute(make_command(&["SAVE"]));
        assert_eq!(response, Reply::error("persistence disabled"));
    }

    #[test]
    fn test_save_writes_snapshots() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Arc::new(StorageEngine::new(2, 0));
        let handler = CommandHandler::with_data_dir(Arc::clone(&storage), dir.path());

        handler.execute(make_command(&["SET", "a", "1"]));
        handler.execute(make_command(&["SETEX", "b", "100", "2"]));
        assert_eq!(handler.execute(make_command(&["SAVE"])), Reply::Ok);

        assert!(snapshot_path(dir.path(), 0).exists());
        assert!(snapshot_path(dir.path(), 1).exists());

        let restored = StorageEngine::new(2, 0);
        assert_eq!(restored.load_snapshots(dir.path()).unwrap().loaded, 2);
        assert_eq!(restored.get(b"a"), Some(Bytes::from("1")));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_save_on_multi_thread_runtime() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Arc::new(StorageEngine::new(2, 0));
        let handler = CommandHandler::with_data_dir(Arc::clone(&storage), dir.path());

        handler.execute(make_command(&["SET", "a", "1"]));
        let reply = tokio::spawn(async move { handler.execute(make_command(&["SAVE"])) })
            .await
            .unwrap();
        assert_eq!(reply, Reply::Ok);
        assert!(snapshot_path(dir.path(), 0).exists());
    }

    #[tokio::test]
    async fn test_save_on_current_thread_runtime() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Arc::new(StorageEngine::new(2, 0));
        let handler = CommandHandler::with_data_dir(storage, dir.path());

        handler.execute(make_command(&["SET", "a", "1"]));
        assert_eq!(handler.execute(make_command(&["SAVE"])), Reply::Ok);
    }

    #[test]
    fn test_setex_huge_ttl_then_save_and_recover() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Arc::new(StorageEngine::new(2, 0));
        storage.enable_logging(dir.path()).unwrap();
        let handler = CommandHandler::with_data_dir(Arc::clone(&storage), dir.path());

        let huge = (i64::MAX - 10_000_000).to_string();
        let max = u64::MAX.to_string();
        assert_eq!(handler.execute(make_command(&["SETEX", "k", huge.as_str(), "v"])), Reply::Ok);
        assert_eq!(handler.execute(make_command(&["SAVE"])), Reply::Ok);
        assert_eq!(handler.execute(make_command(&["SETEX", "m", max.as_str(), "w"])), Reply::Ok);
        storage.disable_logging().unwrap();

        let recovered = StorageEngine::new(2, 0);
        let report = recovered.recover(dir.path()).unwrap();
        assert_eq!(report.snapshots.skipped, 0);
        assert_eq!(report.logs.skipped, 0);
        assert_eq!(recovered.get(b"k"), Some(Bytes::from("v")));
        assert_eq!(recovered.get(b"m"), Some(Bytes::from("w")));
    }

    #[test]
    fn test_control_byte_values_survive_recovery() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Arc::new(StorageEngine::new(2, 0));
        storage.enable_logging(dir.path()).unwrap();
        let handler = CommandHandler::new(Arc::clone(&storage));

        let (command, _) = parse_line(b"SET k a\x0cb\x0b\r\n").unwrap().unwrap();
        assert_eq!(handler.execute(command), Reply::Ok);
        storage.disable_logging().unwrap();

        let recovered = StorageEngine::new(2, 0);
        let report = recovered.recover(dir.path()).unwrap();
        assert_eq!(report.logs.applied, 1);
        assert_eq!(report.logs.skipped, 0);
        assert_eq!(recovered.get(b"k"), Some(Bytes::from(&b"a\x0cb\x0b"[..])));
    }
}
