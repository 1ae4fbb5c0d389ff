//! ShardKV - A Sharded In-Memory Key-Value Store
//!
//! This is the main entry point for the ShardKV server.
//! It recovers persisted state, sets up the TCP listener, and handles
//! incoming connections until Ctrl+C.

use shardkv::commands::CommandHandler;
use shardkv::connection::{handle_connection, ConnectionStats};
use shardkv::persistence::{CheckpointConfig, CheckpointScheduler};
use shardkv::storage::{StorageConfig, StorageEngine, DEFAULT_SHARDS};
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Server configuration
struct Config {
    /// Host to bind to
    host: String,
    /// Port to listen on
    port: u16,
    /// Shard layout and per-shard capacity
    storage: StorageConfig,
    /// Enables logging, snapshots and recovery when set
    data_dir: Option<PathBuf>,
    /// Seconds between background checkpoints, 0 = never
    snapshot_interval: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: shardkv::DEFAULT_HOST.to_string(),
            port: shardkv::DEFAULT_PORT,
            storage: StorageConfig::default(),
            data_dir: None,
            snapshot_interval: 60,
        }
    }
}

impl Config {
    /// Parse configuration from command-line arguments
    fn from_args() -> Self {
        let mut config = Config::default();
        let args: Vec<String> = std::env::args().collect();

        let mut i = 1;
        while i < args.len() {
            match args[i].as_str() {
                "--host" | "-h" => {
                    config.host = flag_value(&args, i, "--host").to_string();
                    i += 2;
                }
                "--port" | "-p" => {
                    config.port = parse_flag(&args, i, "--port", "port number");
                    i += 2;
                }
                "--shards" | "-s" => {
                    config.storage.shard_count = parse_flag(&args, i, "--shards", "shard count");
                    if config.storage.shard_count == 0 {
                        eprintln!("Error: --shards must be at least 1");
                        std::process::exit(1);
                    }
                    i += 2;
                }
                "--capacity" | "-c" => {
                    config.storage.capacity_per_shard =
                        parse_flag(&args, i, "--capacity", "capacity");
                    i += 2;
                }
                "--data-dir" | "-d" => {
                    config.data_dir = Some(PathBuf::from(flag_value(&args, i, "--data-dir")));
                    i += 2;
                }
                "--snapshot-interval" => {
                    config.snapshot_interval =
                        parse_flag(&args, i, "--snapshot-interval", "interval");
                    i += 2;
                }
                "--help" => {
                    print_help();
                    std::process::exit(0);
                }
                "--version" | "-v" => {
                    println!("ShardKV version {}", shardkv::VERSION);
                    std::process::exit(0);
                }
                _ => {
                    eprintln!("Unknown argument: {}", args[i]);
                    print_help();
                    std::process::exit(1);
                }
            }
        }

        config
    }

    /// Returns the bind address as a string
    fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// The argument after the flag at `i`, or exit.
fn flag_value<'a>(args: &'a [String], i: usize, flag: &str) -> &'a str {
    match args.get(i + 1) {
        Some(value) => value,
        None => {
            eprintln!("Error: {} requires a value", flag);
            std::process::exit(1);
        }
    }
}

fn parse_flag<T: FromStr>(args: &[String], i: usize, flag: &str, what: &str) -> T {
    flag_value(args, i, flag).parse().unwrap_or_else(|_| {
        eprintln!("Error: invalid {}", what);
        std::process::exit(1);
    })
}

fn print_help() {
    println!(
        r#"
ShardKV - A Sharded In-Memory Key-Value Store

USAGE:
    shardkv [OPTIONS]

OPTIONS:
    -h, --host <HOST>              Host to bind to (default: 127.0.0.1)
    -p, --port <PORT>              Port to listen on (default: 6380)
    -s, --shards <N>               Number of shards (default: {})
    -c, --capacity <N>             Max keys per shard, 0 = unbounded (default: 0)
    -d, --data-dir <DIR>           Persist to DIR and recover from it on start
        --snapshot-interval <SECS> Seconds between checkpoints, 0 = off (default: 60)
    -v, --version                  Print version information
        --help                     Print this help message

EXAMPLES:
    shardkv                                  # In-memory only on 127.0.0.1:6380
    shardkv --capacity 10000                 # Evict LRU keys past 10000 per shard
    shardkv --data-dir /var/lib/shardkv      # Durable across restarts

CONNECTING:
    Any line-oriented client works:
    $ nc 127.0.0.1 6380
    SET name ariz
    OK
    SETEX session 60 token
    OK
    GET name
    ariz
    STATS
    hits=1 misses=0 evictions=0 size=2

    Keep --shards the same across restarts that share a data directory.
"#,
        DEFAULT_SHARDS
    );
}

fn print_banner(config: &Config) {
    let persistence = match &config.data_dir {
        Some(dir) => format!("{}", dir.display()),
        None => "disabled".to_string(),
    };
    let capacity = match config.storage.capacity_per_shard {
        0 => "unbounded".to_string(),
        n => format!("{} keys", n),
    };

    println!(
        r#"
ShardKV v{} - Sharded In-Memory Key-Value Store
──────────────────────────────────────────────────────────────
Server started on {}
Shards:       {}
Capacity:     {} per shard
Persistence:  {}
Ready to accept connections.

Use Ctrl+C to shutdown gracefully.
"#,
        shardkv::VERSION,
        config.bind_address(),
        config.storage.shard_count,
        capacity,
        persistence
    );
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse command-line arguments
    let config = Config::from_args();

    // Set up logging, RUST_LOG overrides the default level
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();

    print_banner(&config);

    // Create the storage engine (shared across all connections)
    let storage = Arc::new(StorageEngine::with_config(&config.storage));
    info!(
        shards = storage.shard_count(),
        capacity_per_shard = storage.capacity_per_shard(),
        "Storage engine initialized"
    );

    // Recover persisted state and start logging
    let scheduler = match &config.data_dir {
        Some(dir) => {
            storage.recover(dir)?;
            (config.snapshot_interval > 0).then(|| {
                let checkpoint = CheckpointConfig::new(dir.clone())
                    .with_interval(Duration::from_secs(config.snapshot_interval));
                CheckpointScheduler::start(Arc::clone(&storage), checkpoint)
            })
        }
        None => None,
    };

    // Create connection statistics
    let stats = Arc::new(ConnectionStats::new());

    // Bind the TCP listener
    let listener = TcpListener::bind(config.bind_address()).await?;
    info!("Listening on {}", config.bind_address());

    // Set up graceful shutdown
    let shutdown = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
        info!("Shutdown signal received, stopping server...");
    };

    // Main accept loop
    tokio::select! {
        _ = accept_loop(listener, Arc::clone(&storage), config.data_dir.clone(), stats) => {}
        _ = shutdown => {}
    }

    drop(scheduler);

    if let Some(dir) = &config.data_dir {
        let storage = Arc::clone(&storage);
        let dir = dir.clone();
        let result = tokio::task::spawn_blocking(move || {
            storage.checkpoint(&dir)?;
            storage.disable_logging()
        })
        .await?;

        match result {
            Ok(()) => info!("Final checkpoint written"),
            Err(e) => warn!(error = %e, "Final checkpoint failed, the append logs are still intact"),
        }
    }

    info!("Server shutdown complete");
    Ok(())
}

/// Main loop that accepts incoming connections
async fn accept_loop(
    listener: TcpListener,
    storage: Arc<StorageEngine>,
    data_dir: Option<PathBuf>,
    stats: Arc<ConnectionStats>,
) {
    let handler = match data_dir {
        Some(dir) => CommandHandler::with_data_dir(storage, dir),
        None => CommandHandler::new(storage),
    };

    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                let handler = handler.clone();
                let stats = Arc::clone(&stats);

                tokio::spawn(async move {
                    handle_connection(stream, addr, handler, stats).await;
                });
            }
            Err(e) => {
                error!("Failed to accept connection: {}", e);
            }
        }
    }
}
