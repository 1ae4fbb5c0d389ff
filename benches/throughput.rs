//! Throughput Benchmark for ShardKV
//!
//! Measures the storage engine under various workloads, with and without
//! eviction and append logging.

use bytes::Bytes;
use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use shardkv::protocol::LineParser;
use shardkv::storage::StorageEngine;
use std::sync::Arc;
use std::time::Duration;

/// Benchmark SET operations
fn bench_set(c: &mut Criterion) {
    let engine = Arc::new(StorageEngine::new(16, 0));

    let mut group = c.benchmark_group("set");
    group.throughput(Throughput::Elements(1));

    group.bench_function("set_small", |b| {
        let mut i = 0u64;
        b.iter(|| {
            let key = Bytes::from(format!("key:{}", i));
            let value = Bytes::from("small_value");
            engine.set(key, value);
            i += 1;
        });
    });

    group.bench_function("set_medium", |b| {
        let mut i = 0u64;
        let value = Bytes::from("x".repeat(1024)); // 1KB value
        b.iter(|| {
            let key = Bytes::from(format!("key:{}", i));
            engine.set(key, value.clone());
            i += 1;
        });
    });

    group.bench_function("set_with_ttl", |b| {
        let mut i = 0u64;
        b.iter(|| {
            let key = Bytes::from(format!("ttl:{}", i));
            engine.set_with_ttl(key, Bytes::from("value"), Duration::from_secs(3600));
            i += 1;
        });
    });

    group.finish();
}

/// Benchmark GET operations
fn bench_get(c: &mut Criterion) {
    let engine = Arc::new(StorageEngine::new(16, 0));

    // Pre-populate with data
    for i in 0..100_000 {
        let key = Bytes::from(format!("key:{}", i));
        let value = Bytes::from(format!("value:{}", i));
        engine.set(key, value);
    }

    let mut group = c.benchmark_group("get");
    group.throughput(Throughput::Elements(1));

    group.bench_function("get_existing", |b| {
        let mut i = 0u64;
        b.iter(|| {
            let key = format!("key:{}", i % 100_000);
            black_box(engine.get(key.as_bytes()));
            i += 1;
        });
    });

    group.bench_function("get_missing", |b| {
        let mut i = 0u64;
        b.iter(|| {
            let key = format!("missing:{}", i);
            black_box(engine.get(key.as_bytes()));
            i += 1;
        });
    });

    group.finish();
}

/// Benchmark mixed workload (80% reads, 20% writes)
fn bench_mixed(c: &mut Criterion) {
    let engine = Arc::new(StorageEngine::new(16, 0));

    // Pre-populate
    for i in 0..10_000 {
        let key = Bytes::from(format!("key:{}", i));
        let value = Bytes::from(format!("value:{}", i));
        engine.set(key, value);
    }

    let mut group = c.benchmark_group("mixed");
    group.throughput(Throughput::Elements(1));

    group.bench_function("80_read_20_write", |b| {
        let mut i = 0u64;
        b.iter(|| {
            if i % 5 == 0 {
                // 20% writes
                let key = Bytes::from(format!("new:{}", i));
                engine.set(key, Bytes::from("value"));
            } else {
                // 80% reads
                let key = format!("key:{}", i % 10_000);
                black_box(engine.get(key.as_bytes()));
            }
            i += 1;
        });
    });

    group.finish();
}

/// Benchmark inserts into full shards, each evicting the LRU key
fn bench_eviction(c: &mut Criterion) {
    let engine = Arc::new(StorageEngine::new(16, 1_000));

    for i in 0..16_000 {
        engine.set(Bytes::from(format!("warm:{}", i)), Bytes::from("value"));
    }

    let mut group = c.benchmark_group("eviction");
    group.throughput(Throughput::Elements(1));

    group.bench_function("set_evicting", |b| {
        let mut i = 0u64;
        b.iter(|| {
            let key = Bytes::from(format!("key:{}", i));
            engine.set(key, Bytes::from("value"));
            i += 1;
        });
    });

    group.finish();
}

/// Benchmark writes with the append log enabled
fn bench_logged(c: &mut Criterion) {
    let dir = tempfile::tempdir().unwrap();
    let engine = Arc::new(StorageEngine::new(16, 0));
    engine.enable_logging(dir.path()).unwrap();

    let mut group = c.benchmark_group("logged");
    group.throughput(Throughput::Elements(1));

    group.bench_function("set_logged", |b| {
        let mut i = 0u64;
        b.iter(|| {
            let key = Bytes::from(format!("key:{}", i));
            engine.set(key, Bytes::from("value"));
            i += 1;
        });
    });

    group.finish();
    engine.disable_logging().unwrap();
}

/// Benchmark concurrent access
fn bench_concurrent(c: &mut Criterion) {
    use std::thread;

    let mut group = c.benchmark_group("concurrent");
    group.measurement_time(Duration::from_secs(10));

    group.bench_function("4_threads_mixed", |b| {
        b.iter(|| {
            let engine = Arc::new(StorageEngine::new(16, 0));
            let handles: Vec<_> = (0..4)
                .map(|t| {
                    let engine = Arc::clone(&engine);
                    thread::spawn(move || {
                        for i in 0..10_000 {
                            let key = Bytes::from(format!("key:{}:{}", t, i));
                            engine.set(key.clone(), Bytes::from("value"));
                            engine.get(&key);
                        }
                    })
                })
                .collect();

            for handle in handles {
                handle.join().unwrap();
            }

            black_box(engine.len());
        });
    });

    group.finish();
}

/// Benchmark parsing a pipelined batch of command lines
fn bench_parse(c: &mut Criterion) {
    let input: Vec<u8> = (0..100)
        .flat_map(|i| format!("SET key:{} value:{}\r\n", i, i).into_bytes())
        .collect();

    let mut group = c.benchmark_group("parse");
    group.throughput(Throughput::Elements(100));

    group.bench_function("parse_100_lines", |b| {
        b.iter(|| {
            let mut parser = LineParser::new();
            let mut offset = 0;
            while let Some((tokens, consumed)) = parser.parse(&input[offset..]).unwrap() {
                black_box(tokens);
                offset += consumed;
            }
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_set,
    bench_get,
    bench_mixed,
    bench_eviction,
    bench_logged,
    bench_concurrent,
    bench_parse,
);

criterion_main!(benches);
