//! Archiver behavior against on-disk tiers.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::disallowed_methods)]

use std::{sync::Arc, time::Duration};

use tierdb_store::{CrashInjector, CrashPoint, Error, KvStore};
use tierdb_test_utils::{
    ChainBlock, TestDir, assert_eventually,
    chain::{chain_head_record, chain_records},
};
use tierdb_tiered::{Archiver, TieredDatabase};
use tierdb_types::config::{ArchiveMode, ArchiverConfig, StoreConfig, TieredConfig};

fn store_config() -> StoreConfig {
    StoreConfig::builder().reclaim_enabled(false).build().unwrap()
}

fn open(dir: &TestDir) -> Arc<TieredDatabase> {
    let (current, archive, _) = dir.tier_paths();
    let config = TieredConfig::builder()
        .current_path(&current)
        .archive_path(&archive)
        .store(store_config())
        .build()
        .unwrap();
    Arc::new(TieredDatabase::open(&config).unwrap())
}

fn seed_blocks(db: &TieredDatabase, head: u64) {
    let mut batch = db.new_batch();
    for height in 0..=head {
        batch.put(format!("block-{height}").as_bytes(), format!("data-{height}").as_bytes());
    }
    let (key, value) = chain_head_record(head);
    batch.put(&key, &value);
    batch.write().unwrap();
}

fn archiver(db: &Arc<TieredDatabase>, chunk_size: usize) -> Archiver {
    let config = ArchiverConfig::builder()
        .finality_delay(5)
        .chunk_size(chunk_size)
        .interval(Duration::from_millis(20))
        .build()
        .unwrap();
    Archiver::builder().database(Arc::clone(db)).config(config).build()
}

#[test]
fn test_finalized_heights_move_to_archive() {
    let dir = TestDir::new();
    let db = open(&dir);
    seed_blocks(&db, 19);

    let report = archiver(&db, 4).archive_finalized().unwrap();
    assert_eq!(report.finalized_height, 14);
    assert_eq!(report.archived, 14);
    assert_eq!(db.finality_height(), 14);

    let archive = db.archive().unwrap();
    for height in 0..14 {
        let key = format!("block-{height}");
        assert!(!db.current().has(key.as_bytes()).unwrap(), "{key} left in current");
        assert_eq!(archive.get(key.as_bytes()).unwrap(), format!("data-{height}").into_bytes());
    }
    for height in 14..=19 {
        let key = format!("block-{height}");
        assert!(db.current().has(key.as_bytes()).unwrap(), "{key} missing from current");
        assert!(!archive.has(key.as_bytes()).unwrap(), "{key} archived too early");
    }

    // Reads are unaffected by where a record lives.
    assert_eq!(db.get(b"block-3").unwrap(), b"data-3");
    assert_eq!(db.get(b"block-17").unwrap(), b"data-17");
}

#[test]
fn test_chain_schema_records_are_height_scoped() {
    let dir = TestDir::new();
    let db = open(&dir);
    let mut batch = db.new_batch();
    for (key, value) in chain_records(9) {
        batch.put(&key, &value);
    }
    let (key, value) = chain_head_record(9);
    batch.put(&key, &value);
    batch.write().unwrap();

    let report = archiver(&db, 7).archive_finalized().unwrap();
    // Five records for each of blocks 0 to 3.
    assert_eq!(report.archived, 20);
    for (key, _) in ChainBlock::at(3).records() {
        assert!(db.archive().unwrap().has(&key).unwrap());
    }
    for (key, _) in ChainBlock::at(4).records() {
        assert!(db.current().has(&key).unwrap());
    }
}

#[test]
fn test_second_run_archives_nothing() {
    let dir = TestDir::new();
    let db = open(&dir);
    seed_blocks(&db, 19);
    let archiver = archiver(&db, 4);

    archiver.archive_finalized().unwrap();
    let total = archiver.stats().total_archived;

    let report = archiver.archive_finalized().unwrap();
    assert_eq!(report.archived, 0);
    assert_eq!(report.deleted, 0);
    assert_eq!(archiver.stats().total_archived, total);
}

#[test]
fn test_rewrite_before_cycle_is_archived_with_latest_value() {
    let dir = TestDir::new();
    let db = open(&dir);
    seed_blocks(&db, 19);
    let mut batch = db.new_batch();
    batch.put(b"block-3", b"data-3-rewritten");
    batch.write().unwrap();

    let report = archiver(&db, 4).archive_finalized().unwrap();
    assert_eq!(report.archived, 14);
    assert!(!db.current().has(b"block-3").unwrap());
    assert_eq!(db.archive().unwrap().get(b"block-3").unwrap(), b"data-3-rewritten");
    assert_eq!(db.get(b"block-3").unwrap(), b"data-3-rewritten");
}

#[test]
fn test_crash_between_archive_and_delete_loses_nothing() {
    let dir = TestDir::new();
    {
        let db = open(&dir);
        seed_blocks(&db, 19);
        let config = ArchiverConfig::builder().finality_delay(5).chunk_size(4).build().unwrap();
        let injector = CrashInjector::armed(CrashPoint::AfterArchiveCommit { after_chunks: 1 });
        let archiver = Archiver::builder()
            .database(Arc::clone(&db))
            .config(config)
            .crash_injector(injector)
            .build();

        let err = archiver.archive_finalized().unwrap_err();
        assert!(matches!(err, Error::InjectedCrash { .. }));
        drop(archiver);
        db.close().unwrap();
    }

    // After "restart" the crashed chunk is in both tiers and nothing is lost.
    let db = open(&dir);
    for height in 0..=19 {
        let key = format!("block-{height}");
        assert_eq!(db.get(key.as_bytes()).unwrap(), format!("data-{height}").into_bytes());
    }
    assert!(db.current().has(b"block-0").unwrap());
    assert!(db.archive().unwrap().has(b"block-0").unwrap());

    // The next cycle finishes the migration.
    let report = archiver(&db, 4).archive_finalized().unwrap();
    assert_eq!(report.archived, 14);
    assert!(!db.current().has(b"block-0").unwrap());
    assert_eq!(db.get(b"block-0").unwrap(), b"data-0");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_background_loop_start_stop() {
    let dir = TestDir::new();
    let db = open(&dir);
    seed_blocks(&db, 19);
    let archiver = Arc::new(archiver(&db, 4));

    assert!(archiver.start());
    assert!(!archiver.start(), "second start must be rejected");
    assert!(archiver.is_running());

    let reached = assert_eventually(Duration::from_secs(5), || db.finality_height() == 14).await;
    assert!(reached, "archiver never finalized");

    // New blocks are picked up by later ticks.
    let mut batch = db.new_batch();
    for height in 20..=25 {
        batch.put(format!("block-{height}").as_bytes(), b"late");
    }
    let (key, value) = chain_head_record(25);
    batch.put(&key, &value);
    batch.write().unwrap();
    let reached = assert_eventually(Duration::from_secs(5), || db.finality_height() == 20).await;
    assert!(reached, "archiver stopped ticking");

    archiver.stop().await;
    assert!(!archiver.is_running());
    archiver.stop().await;

    let cycles = archiver.stats().cycles;
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(archiver.stats().cycles, cycles, "cycles ran after stop");

    // Restartable.
    assert!(archiver.start());
    archiver.stop().await;
    db.close().unwrap();
}

#[test]
fn test_shared_archive_rejects_archiving() {
    let dir = TestDir::new();
    let (current, archive, _) = dir.tier_paths();
    KvStore::open(&archive, &store_config()).unwrap().close().unwrap();

    let config = TieredConfig::builder()
        .current_path(&current)
        .archive_path(&archive)
        .archive_mode(ArchiveMode::Shared)
        .store(store_config())
        .build()
        .unwrap();
    let db = Arc::new(TieredDatabase::open(&config).unwrap());
    seed_blocks(&db, 19);

    let archiver = Arc::new(archiver(&db, 4));
    let err = archiver.archive_finalized().unwrap_err();
    assert!(matches!(err, Error::Unsupported { .. }));
    assert!(db.current().has(b"block-0").unwrap());
}

#[tokio::test]
async fn test_start_refuses_shared_archive() {
    let dir = TestDir::new();
    let (current, archive, _) = dir.tier_paths();
    KvStore::open(&archive, &store_config()).unwrap().close().unwrap();
    let config = TieredConfig::builder()
        .current_path(&current)
        .archive_path(&archive)
        .archive_mode(ArchiveMode::Shared)
        .store(store_config())
        .build()
        .unwrap();
    let db = Arc::new(TieredDatabase::open(&config).unwrap());

    let archiver = Arc::new(archiver(&db, 4));
    assert!(!archiver.start());
    archiver.stop().await;
}
