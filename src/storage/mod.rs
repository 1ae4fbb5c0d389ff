//! Storage Engine Module
//!
//! The in-memory side of ShardKV: a fixed set of independently locked shards,
//! each a capacity-bounded LRU map with lazy TTL expiry, and a router that
//! picks the shard for a key by hash.
//!
//! ## Architecture
//!
//! ```text
//!                  hash(key) mod N
//!                        │
//! ┌──────────────────────┼──────────────────────────────────────┐
//! │ StorageEngine        ▼                                      │
//! │  ┌──────────────────────────────┐  ┌─────────┐ ┌─────────┐  │
//! │  │ Shard i (Mutex)              │  │ Shard j │ │ Shard N │  │
//! │  │  HashMap<key, Entry> ──node──┼─►│   ...   │ │   ...   │  │
//! │  │  RecencyList  MRU ⇄ … ⇄ LRU  │  └─────────┘ └─────────┘  │
//! │  │  hits / misses / evictions   │                           │
//! │  │  AppendLog (optional)        │                           │
//! │  └──────────────────────────────┘                           │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Features
//!
//! - **LRU Eviction**: a full shard drops its least recently used key
//! - **Lazy Expiry**: expired keys are removed when read, never in the
//!   background
//! - **Per-Shard Stats**: hits, misses, evictions and size, summed by the
//!   router
//! - **Persistence Hooks**: append logging, snapshots and checkpoints per
//!   shard (see [`crate::persistence`])
//!
//! ## Example
//!
//! ```
//! use shardkv::storage::StorageEngine;
//! use bytes::Bytes;
//! use std::time::Duration;
//!
//! let engine = StorageEngine::new(4, 2);
//!
//! engine.set(Bytes::from("name"), Bytes::from("shardkv"));
//! assert_eq!(engine.get(b"name"), Some(Bytes::from("shardkv")));
//!
//! engine.set_with_ttl(
//!     Bytes::from("session"),
//!     Bytes::from("token123"),
//!     Duration::from_secs(3600),
//! );
//! ```

pub mod engine;
pub mod recency;
pub mod shard;


pub use engine::{RecoveryReport, StorageConfig, StorageEngine, DEFAULT_SHARDS};
pub use recency::{NodeId, RecencyList};
pub use shard::{Entry, Shard, ShardStats};
