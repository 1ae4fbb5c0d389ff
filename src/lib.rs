//! # ShardKV - A Sharded In-Memory Key-Value Store
//!
//! ShardKV is an in-memory key-value store with bounded capacity, per-key
//! expiry, least-recently-used eviction and crash recovery. Keys are spread
//! over independently locked shards, so clients working on different keys
//! rarely contend.
//!
//! ## Features
//!
//! - **Bounded Shards**: each shard holds at most `capacity` keys and evicts
//!   its least recently used key to make room
//! - **TTL Support**: keys can expire; expiry is checked lazily on read
//! - **Statistics**: hits, misses, evictions and size per shard, summed on
//!   demand
//! - **Durability**: a per-shard append-only log flushed on every write,
//!   plus point-in-time snapshots and checkpoints
//! - **Async I/O**: a Tokio task per client connection
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                              ShardKV                                    │
//! │                                                                         │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐                  │
//! │  │ TCP Server  │───>│ Connection  │───>│  Command    │                  │
//! │  │ (Listener)  │    │  Handler    │    │  Handler    │                  │
//! │  └─────────────┘    └─────────────┘    └──────┬──────┘                  │
//! │                                               │                         │
//! │                                               ▼                         │
//! │  ┌─────────────┐    ┌──────────────────────────────────────────────┐   │
//! │  │   Line      │    │              StorageEngine                   │   │
//! │  │   Parser    │    │  ┌────────┐ ┌────────┐ ┌────────┐ ┌────────┐ │   │
//! │  │             │    │  │Shard 0 │ │Shard 1 │ │Shard 2 │ │...N    │ │   │
//! │  └─────────────┘    │  │LRU+TTL │ │LRU+TTL │ │LRU+TTL │ │shards  │ │   │
//! │                     │  └───┬────┘ └───┬────┘ └───┬────┘ └────────┘ │   │
//! │                     └──────┼──────────┼──────────┼─────────────────┘   │
//! │                            ▼          ▼          ▼                      │
//! │                     ┌──────────────────────────────────────────────┐   │
//! │                     │  shard-NNN.aof + shard-NNN.snapshot          │   │
//! │                     └──────────────────────────────────────────────┘   │
//! │                                               ▲                         │
//! │                     ┌─────────────────────────┴───────────────────────┐ │
//! │                     │           CheckpointScheduler                   │ │
//! │                     │      (Background Tokio Task)                    │ │
//! │                     └─────────────────────────────────────────────────┘ │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```ignore
//! use shardkv::storage::StorageEngine;
//! use shardkv::persistence::{CheckpointConfig, CheckpointScheduler};
//! use shardkv::commands::CommandHandler;
//! use shardkv::connection::{handle_connection, ConnectionStats};
//! use std::sync::Arc;
//! use tokio::net::TcpListener;
//!
//! #[tokio::main]
//! async fn main() {
//!     // 16 shards of at most 10000 keys each
//!     let storage = Arc::new(StorageEngine::new(16, 10_000));
//!
//!     // Load snapshots, replay logs, start logging
//!     storage.recover("/var/lib/shardkv".as_ref()).unwrap();
//!     let _scheduler = CheckpointScheduler::start(
//!         Arc::clone(&storage),
//!         CheckpointConfig::new("/var/lib/shardkv"),
//!     );
//!
//!     let stats = Arc::new(ConnectionStats::new());
//!     let listener = TcpListener::bind("127.0.0.1:6380").await.unwrap();
//!
//!     loop {
//!         let (stream, addr) = listener.accept().await.unwrap();
//!         let handler = CommandHandler::with_data_dir(Arc::clone(&storage), "/var/lib/shardkv");
//!         let stats = Arc::clone(&stats);
//!
//!         tokio::spawn(handle_connection(stream, addr, handler, stats));
//!     }
//! }
//! ```
//!
//! ## Supported Commands
//!
//! - `SET key value`
//! - `SETEX key seconds value`
//! - `GET key`
//! - `DEL key`
//! - `STATS`
//! - `PING`
//! - `SAVE`
//!
//! ## Module Overview
//!
//! - [`storage`]: Shards, the recency list and the hash router
//! - [`persistence`]: Append log, snapshots, record formats and the
//!   checkpoint task
//! - [`protocol`]: Line parser and reply types
//! - [`commands`]: Command dispatch onto the storage engine
//! - [`connection`]: Client connection management
//!
//! ## Design Highlights
//!
//! ### One Lock Per Shard
//!
//! Every operation, reads included, takes its shard's mutex exclusively:
//! a read moves the key to the front of the recency list and may remove
//! an expired entry. The log append for a write happens under the same
//! lock, so each shard's log is in the exact order its writes took effect.
//!
//! ### Arena-Backed Recency List
//!
//! The LRU order is a doubly linked list stored in a `Vec`, addressed by
//! integer handles. The hash index stores each key's handle, so promotion
//! and removal are O(1) without shared pointers.
//!
//! ### Recovery
//!
//! A checkpoint writes the snapshot and truncates the log in one critical
//! section. Recovery loads the snapshot, then replays the log through the
//! normal write path. Snapshot expiry is absolute (Unix seconds); replayed
//! `SETEX` deadlines are relative to replay time.

pub mod commands;
pub mod connection;
pub mod persistence;
pub mod protocol;
pub mod storage;

// Re-export commonly used types for convenience
pub use commands::CommandHandler;
pub use connection::{handle_connection, ConnectionStats};
pub use persistence::{CheckpointConfig, CheckpointScheduler, PersistenceError};
pub use protocol::{LineParser, ParseError, Reply};
pub use storage::{Shard, ShardStats, StorageConfig, StorageEngine};

/// The default port ShardKV listens on
pub const DEFAULT_PORT: u16 = 6380;

/// The default host ShardKV binds to
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Version of ShardKV
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
