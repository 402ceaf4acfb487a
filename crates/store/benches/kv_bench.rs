//! Key-value store benchmarks.
//!
//! Point lookups, batch commits and prefix scans against a file-backed store,
//! plus ancient-range reads at several byte budgets.

#![allow(clippy::expect_used, missing_docs)]

use std::{hint::black_box, time::Duration};

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use tempfile::TempDir;
use tierdb_store::{AncientStore, KvStore};
use tierdb_types::config::{AncientConfig, StoreConfig};

fn bench_config() -> StoreConfig {
    StoreConfig::builder().reclaim_enabled(false).build().expect("valid config")
}

/// Writes `count` `block-NNNNNNNN` keys in batches of 1000.
fn populate(store: &KvStore, count: usize) {
    for chunk_start in (0..count).step_by(1000) {
        let mut batch = store.new_batch();
        for i in chunk_start..(chunk_start + 1000).min(count) {
            batch.put(format!("block-{i:08}").as_bytes(), format!("payload-{i}").as_bytes());
        }
        batch.write().expect("batch write");
    }
}

// =============================================================================
// Point lookups
// =============================================================================

fn bench_point_lookup(c: &mut Criterion) {
    let mut group = c.benchmark_group("kv/point_lookup");
    group.throughput(Throughput::Elements(1));

    for count in [1_000, 10_000, 100_000] {
        let dir = TempDir::new().expect("temp dir");
        let store = KvStore::open(dir.path().join("bench.redb"), &bench_config()).expect("open");
        populate(&store, count);

        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{}k", count / 1000)),
            &count,
            |b, &count| {
                let mut i = 0usize;
                b.iter(|| {
                    i = (i + 7919) % count;
                    black_box(store.get(format!("block-{i:08}").as_bytes()).expect("get"))
                });
            },
        );
    }
    group.finish();
}

// =============================================================================
// Batch commits
// =============================================================================

fn bench_batch_write(c: &mut Criterion) {
    let mut group = c.benchmark_group("kv/batch_write");
    group.measurement_time(Duration::from_secs(10));

    for batch_size in [10, 100, 1_000] {
        group.throughput(Throughput::Elements(batch_size as u64));
        let dir = TempDir::new().expect("temp dir");
        let store = KvStore::open(dir.path().join("bench.redb"), &bench_config()).expect("open");

        group.bench_with_input(BenchmarkId::from_parameter(batch_size), &batch_size, |b, &n| {
            let mut round = 0u64;
            b.iter(|| {
                round += 1;
                let mut batch = store.new_batch();
                for i in 0..n {
                    batch.put(format!("k-{round}-{i}").as_bytes(), &[0u8; 128]);
                }
                batch.write().expect("batch write");
            });
        });
    }
    group.finish();
}

// =============================================================================
// Prefix scans
// =============================================================================

fn bench_prefix_scan(c: &mut Criterion) {
    let mut group = c.benchmark_group("kv/prefix_scan");
    let dir = TempDir::new().expect("temp dir");
    let store = KvStore::open(dir.path().join("bench.redb"), &bench_config()).expect("open");
    populate(&store, 50_000);

    for prefix in ["block-0000", "block-000", "block-"] {
        group.bench_with_input(BenchmarkId::from_parameter(prefix), prefix, |b, prefix| {
            b.iter(|| {
                let n = store
                    .new_iterator(prefix.as_bytes(), None)
                    .expect("iterator")
                    .map(|entry| entry.expect("entry"))
                    .count();
                black_box(n)
            });
        });
    }
    group.finish();
}

// =============================================================================
// Ancient ranges
// =============================================================================

fn bench_ancient_range(c: &mut Criterion) {
    let mut group = c.benchmark_group("ancient/range");
    let config = AncientConfig::builder()
        .tables(vec!["bodies".to_string()])
        .store(bench_config())
        .build()
        .expect("valid config");
    let store = AncientStore::open_in_memory(&config).expect("open");
    store
        .modify_ancients(|op| {
            for index in 0..10_000u64 {
                op.append_raw("bodies", index, &[0u8; 512])?;
            }
            Ok(())
        })
        .expect("fill");

    for max_bytes in [0u64, 64 * 1024, 1024 * 1024] {
        group.bench_with_input(BenchmarkId::from_parameter(max_bytes), &max_bytes, |b, &max| {
            b.iter(|| black_box(store.ancient_range("bodies", 1_000, 4_096, max).expect("range")));
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_point_lookup,
    bench_batch_write,
    bench_prefix_scan,
    bench_ancient_range
);
criterion_main!(benches);
