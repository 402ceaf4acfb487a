//! Shared read-only access.
//!
//! Several read-only handles may hold the same file at once, across threads,
//! while a read-write handle may not coexist with them.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::disallowed_methods)]

use std::{sync::Arc, thread};

use tierdb_store::{Error, KvStore};
use tierdb_test_utils::{TestDir, sequential_records};
use tierdb_types::config::StoreConfig;

fn config() -> StoreConfig {
    StoreConfig::builder().reclaim_enabled(false).build().unwrap()
}

fn seed(path: &std::path::Path, count: u64) {
    let store = KvStore::open(path, &config()).unwrap();
    let mut batch = store.new_batch();
    for (key, value) in sequential_records(count) {
        batch.put(&key, &value);
    }
    batch.write().unwrap();
    store.close().unwrap();
}

#[test]
fn test_many_readers_share_one_file() {
    let dir = TestDir::new();
    let path = dir.join("shared.redb");
    seed(&path, 100);

    let handles: Vec<_> = (0..5)
        .map(|_| Arc::new(KvStore::open_read_only(&path, &config()).unwrap()))
        .collect();

    let workers: Vec<_> = handles
        .iter()
        .enumerate()
        .map(|(n, store)| {
            let store = Arc::clone(store);
            thread::spawn(move || {
                for i in (n as u64..100).step_by(5) {
                    let value = store.get(format!("block-{i}").as_bytes()).unwrap();
                    assert_eq!(value, format!("data-{i}").into_bytes());
                }
                store.new_iterator(b"block-", None).unwrap().count()
            })
        })
        .collect();

    for worker in workers {
        assert_eq!(worker.join().unwrap(), 100);
    }
}

#[test]
fn test_readers_reject_every_mutation() {
    let dir = TestDir::new();
    let path = dir.join("shared.redb");
    seed(&path, 3);

    let reader = KvStore::open_read_only(&path, &config()).unwrap();
    assert!(matches!(reader.put(b"x", b"y"), Err(Error::ReadOnly)));
    assert!(matches!(reader.delete(b"block-0"), Err(Error::ReadOnly)));
    assert!(matches!(reader.delete_range(b"block-", None), Err(Error::ReadOnly)));
    assert!(reader.put(b"x", b"y").unwrap_err().is_unsupported());
    assert_eq!(reader.stat().unwrap().entries, 3);
    assert!(reader.stat().unwrap().read_only);
}

#[test]
fn test_writer_excluded_while_readers_open() {
    let dir = TestDir::new();
    let path = dir.join("shared.redb");
    seed(&path, 1);

    let reader = KvStore::open_read_only(&path, &config()).unwrap();
    assert!(matches!(KvStore::open(&path, &config()), Err(Error::Open { .. })));

    reader.close().unwrap();
    let writer = KvStore::open(&path, &config()).unwrap();
    writer.put(b"after", b"readers").unwrap();
}
