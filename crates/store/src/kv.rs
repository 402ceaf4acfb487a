//! Key-value store backed by a single redb table.
//!
//! A [`KvStore`] owns one database file. Read-write handles hold redb's
//! exclusive file lock and may run a background reclamation cycle. Read-only
//! handles open the file through [`ReadOnlyDatabase`], which takes a shared
//! lock, so any number of readers (in this process or others) can open the
//! same path at once as long as no read-write handle holds it.

use std::{
    fmt, fs,
    ops::Bound,
    path::{Path, PathBuf},
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

use parking_lot::{Mutex, RwLock};
use redb::{
    Database, ReadOnlyDatabase, ReadOnlyTable, ReadTransaction, ReadableDatabase, ReadableTable,
    ReadableTableMetadata, Table, TableDefinition, TableError,
};
use snafu::{OptionExt, ResultExt, ensure};
use tierdb_types::config::StoreConfig;
use tracing::{debug, info};

use crate::{
    batch::Batch,
    crash::CrashInjector,
    error::{
        ClosedSnafu, CommitSnafu, CompactionSnafu, Error, MissingPathSnafu, NotFoundSnafu,
        OpenSnafu, ReadOnlySnafu, Result, StorageSnafu, TableSnafu, TransactionSnafu,
    },
    iterator::KvIterator,
    metrics,
    reclaim::Reclaimer,
    snapshot::Snapshot,
    traits::{
        Batcher, Iteratee, KeyValueRangeDeleter, KeyValueReader, KeyValueWriter,
    },
};

/// The single table every store keeps its records in.
pub(crate) const KV_TABLE: TableDefinition<'static, &'static [u8], &'static [u8]> =
    TableDefinition::new("kv");

/// Writable view of [`KV_TABLE`] inside a write transaction.
pub(crate) type KvTable<'txn> = Table<'txn, &'static [u8], &'static [u8]>;

/// Read view of [`KV_TABLE`] pinned to one read transaction.
pub(crate) type KvReadTable = ReadOnlyTable<&'static [u8], &'static [u8]>;

/// Backend handle, resolved once at open time.
enum Backend {
    ReadWrite(Database),
    ReadOnly(ReadOnlyDatabase),
}

impl Backend {
    fn begin_read(&self) -> std::result::Result<ReadTransaction, redb::TransactionError> {
        match self {
            Self::ReadWrite(db) => db.begin_read(),
            Self::ReadOnly(db) => db.begin_read(),
        }
    }
}

/// State shared between a [`KvStore`], its batches and its reclamation task.
pub(crate) struct StoreInner {
    backend: RwLock<Option<Backend>>,
    path: Option<PathBuf>,
    read_only: bool,
    crash_injector: RwLock<Option<Arc<CrashInjector>>>,
    reclaim_cycles: AtomicU64,
}

impl StoreInner {
    fn new(backend: Backend, path: Option<PathBuf>) -> Self {
        let read_only = matches!(backend, Backend::ReadOnly(_));
        Self {
            backend: RwLock::new(Some(backend)),
            path,
            read_only,
            crash_injector: RwLock::new(None),
            reclaim_cycles: AtomicU64::new(0),
        }
    }

    /// Opens a point-in-time view of the table.
    ///
    /// Returns `None` when the table has never been created, which only
    /// happens for read-only handles on a fresh file.
    pub(crate) fn read_table(&self) -> Result<Option<KvReadTable>> {
        let guard = self.backend.read();
        let backend = guard.as_ref().context(ClosedSnafu)?;
        let txn = backend.begin_read().context(TransactionSnafu)?;
        match txn.open_table(KV_TABLE) {
            Ok(table) => Ok(Some(table)),
            Err(TableError::TableDoesNotExist(_)) => Ok(None),
            Err(source) => Err(Error::Table { source }),
        }
    }

    /// Runs `f` inside one write transaction, committing if it succeeds and
    /// aborting if it fails.
    pub(crate) fn write<T>(&self, f: impl FnOnce(&mut KvTable<'_>) -> Result<T>) -> Result<T> {
        let guard = self.backend.read();
        let db = match guard.as_ref().context(ClosedSnafu)? {
            Backend::ReadWrite(db) => db,
            Backend::ReadOnly(_) => return ReadOnlySnafu.fail(),
        };

        let txn = db.begin_write().context(TransactionSnafu)?;
        let result = {
            let mut table = txn.open_table(KV_TABLE).context(TableSnafu)?;
            f(&mut table)
        };
        match result {
            Ok(value) => {
                txn.commit().context(CommitSnafu)?;
                Ok(value)
            },
            Err(e) => {
                txn.abort().context(StorageSnafu)?;
                Err(e)
            },
        }
    }

    /// Compacts the database file.
    ///
    /// Blocks every other operation on this handle while it runs. Fails if a
    /// read transaction (iterator, snapshot) is still open.
    pub(crate) fn compact(&self) -> Result<bool> {
        let mut guard = self.backend.write();
        match guard.as_mut().context(ClosedSnafu)? {
            Backend::ReadWrite(db) => db.compact().context(CompactionSnafu),
            Backend::ReadOnly(_) => ReadOnlySnafu.fail(),
        }
    }

    pub(crate) fn crash_injector(&self) -> Option<Arc<CrashInjector>> {
        self.crash_injector.read().clone()
    }

    pub(crate) fn record_reclaim_cycle(&self) {
        self.reclaim_cycles.fetch_add(1, Ordering::Relaxed);
    }

    fn is_closed(&self) -> bool {
        self.backend.read().is_none()
    }
}

/// Summary returned by [`KvStore::stat`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreStats {
    /// Number of records.
    pub entries: u64,
    /// File backing the store; `None` for in-memory stores.
    pub path: Option<PathBuf>,
    /// Whether the handle is read-only.
    pub read_only: bool,
    /// Size of the backing file, when it has one.
    pub file_size_bytes: Option<u64>,
}

impl fmt::Display for StoreStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mode = if self.read_only { "read-only" } else { "read-write" };
        write!(f, "entries={} mode={mode}", self.entries)?;
        if let Some(size) = self.file_size_bytes {
            write!(f, " size={size}B")?;
        }
        match &self.path {
            Some(path) => write!(f, " path={}", path.display()),
            None => write!(f, " path=<memory>"),
        }
    }
}

/// A single embedded key-value database handle.
///
/// All operations are blocking. Writes are serialized by redb's transaction
/// manager, so concurrent `put`s never interleave partially.
///
/// # Example
///
/// ```no_run
/// use tierdb_store::KvStore;
/// use tierdb_types::config::StoreConfig;
///
/// let store = KvStore::open("/tmp/chain.redb", &StoreConfig::default())?;
/// store.put(b"key", b"value")?;
/// assert_eq!(store.get(b"key")?, b"value");
/// store.close()?;
/// # Ok::<(), tierdb_store::Error>(())
/// ```
pub struct KvStore {
    inner: Arc<StoreInner>,
    reclaimer: Mutex<Option<Reclaimer>>,
}

impl KvStore {
    /// Opens a read-write store at `path`, creating the file if needed.
    ///
    /// Starts the reclamation cycle when `config.reclaim_enabled` is set.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Open`] if the file is locked by another handle or is
    /// not a valid database, and [`Error::Io`] if the parent directory cannot
    /// be created.
    pub fn open(path: impl AsRef<Path>, config: &StoreConfig) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let db = Database::builder()
            .set_cache_size(config.cache_size_bytes)
            .create(path)
            .context(OpenSnafu { path })?;
        ensure_table(&db)?;

        let store = Self::from_backend(Backend::ReadWrite(db), Some(path.to_path_buf()));
        if config.reclaim_enabled {
            *store.reclaimer.lock() =
                Reclaimer::spawn(Arc::downgrade(&store.inner), config.reclaim_interval);
        }
        info!(path = %path.display(), reclaim = config.reclaim_enabled, "Opened key-value store");
        Ok(store)
    }

    /// Opens an existing store read-only.
    ///
    /// The handle takes a shared lock: several read-only handles may be open
    /// on the same path at once, from this process or others. Every mutation
    /// through it fails with [`Error::ReadOnly`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingPath`] if nothing exists at `path`, and
    /// [`Error::Open`] if a read-write handle holds the file.
    pub fn open_read_only(path: impl AsRef<Path>, config: &StoreConfig) -> Result<Self> {
        let path = path.as_ref();
        ensure!(path.exists(), MissingPathSnafu { path });

        let db = Database::builder()
            .set_cache_size(config.cache_size_bytes)
            .open_read_only(path)
            .context(OpenSnafu { path })?;

        debug!(path = %path.display(), "Opened key-value store read-only");
        Ok(Self::from_backend(Backend::ReadOnly(db), Some(path.to_path_buf())))
    }

    /// Opens a read-write store held entirely in memory.
    ///
    /// No reclamation cycle runs.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Open`] if the backend cannot be initialized.
    pub fn open_in_memory() -> Result<Self> {
        let db = Database::builder()
            .create_with_backend(redb::backends::InMemoryBackend::new())
            .context(OpenSnafu { path: ":memory:" })?;
        ensure_table(&db)?;
        Ok(Self::from_backend(Backend::ReadWrite(db), None))
    }

    fn from_backend(backend: Backend, path: Option<PathBuf>) -> Self {
        Self { inner: Arc::new(StoreInner::new(backend, path)), reclaimer: Mutex::new(None) }
    }

    pub(crate) fn inner(&self) -> &Arc<StoreInner> {
        &self.inner
    }

    /// Returns the path backing this store, or `None` for in-memory stores.
    pub fn path(&self) -> Option<&Path> {
        self.inner.path.as_deref()
    }

    /// Returns true if this handle was opened read-only.
    pub fn is_read_only(&self) -> bool {
        self.inner.read_only
    }

    /// Returns true once [`close`](Self::close) has run.
    pub fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }

    /// Attaches (or detaches) a crash injector consulted by batch writes.
    pub fn set_crash_injector(&self, injector: Option<Arc<CrashInjector>>) {
        *self.inner.crash_injector.write() = injector;
    }

    /// Number of reclamation cycles run so far.
    pub fn reclaim_cycles(&self) -> u64 {
        self.inner.reclaim_cycles.load(Ordering::Relaxed)
    }

    /// Returns true if `key` is present.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Closed`] after close and backend errors otherwise.
    pub fn has(&self, key: &[u8]) -> Result<bool> {
        let Some(table) = self.inner.read_table()? else {
            return Ok(false);
        };
        Ok(table.get(key).context(StorageSnafu)?.is_some())
    }

    /// Returns the value stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the key is absent.
    pub fn get(&self, key: &[u8]) -> Result<Vec<u8>> {
        let Some(table) = self.inner.read_table()? else {
            return NotFoundSnafu.fail();
        };
        let value = table.get(key).context(StorageSnafu)?.context(NotFoundSnafu)?;
        Ok(value.value().to_vec())
    }

    /// Stores `value` under `key`, replacing any previous value.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ReadOnly`] on read-only handles.
    pub fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.inner.write(|table| {
            table.insert(key, value).context(StorageSnafu)?;
            Ok(())
        })?;
        metrics::record_kv_write("put");
        Ok(())
    }

    /// Removes `key`. Removing an absent key succeeds.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ReadOnly`] on read-only handles.
    pub fn delete(&self, key: &[u8]) -> Result<()> {
        self.inner.write(|table| {
            table.remove(key).context(StorageSnafu)?;
            Ok(())
        })?;
        metrics::record_kv_write("delete");
        Ok(())
    }

    /// Removes every key in `[start, end)`. `end = None` removes through the
    /// end of the keyspace.
    ///
    /// Runs as one write transaction.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ReadOnly`] on read-only handles.
    pub fn delete_range(&self, start: &[u8], end: Option<&[u8]>) -> Result<()> {
        if end.is_some_and(|end| end <= start) {
            return Ok(());
        }
        let deleted = self.inner.write(|table| {
            let upper = end.map_or(Bound::Unbounded, Bound::Excluded);
            let keys = table
                .range::<&[u8]>((Bound::Included(start), upper))
                .context(StorageSnafu)?
                .map(|entry| entry.map(|(key, _)| key.value().to_vec()))
                .collect::<std::result::Result<Vec<_>, _>>()
                .context(StorageSnafu)?;
            for key in &keys {
                table.remove(key.as_slice()).context(StorageSnafu)?;
            }
            Ok(keys.len())
        })?;
        metrics::record_kv_write("delete_range");
        debug!(deleted, "Deleted key range");
        Ok(())
    }

    /// Creates an empty batch bound to this store.
    pub fn new_batch(&self) -> Batch {
        Batch::new(Arc::clone(&self.inner))
    }

    /// Iterates keys carrying `prefix` in ascending byte order.
    ///
    /// Iteration begins at `start` when it sorts after `prefix`, otherwise at
    /// `prefix`, and stops at the first key lacking `prefix`. The iterator
    /// reads from a point-in-time view: writes made after this call are not
    /// observed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Closed`] after close and backend errors otherwise.
    pub fn new_iterator(&self, prefix: &[u8], start: Option<&[u8]>) -> Result<KvIterator> {
        KvIterator::new(self.inner.read_table()?, prefix, start)
    }

    /// Takes a consistent read-only snapshot of the store.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Closed`] after close and backend errors otherwise.
    pub fn new_snapshot(&self) -> Result<Snapshot> {
        Ok(Snapshot::new(self.inner.read_table()?))
    }

    /// Returns record count and file information.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Closed`] after close and backend errors otherwise.
    pub fn stat(&self) -> Result<StoreStats> {
        let entries = match self.inner.read_table()? {
            Some(table) => table.len().context(StorageSnafu)?,
            None => 0,
        };
        let file_size_bytes =
            self.inner.path.as_ref().and_then(|path| fs::metadata(path).ok()).map(|m| m.len());
        Ok(StoreStats {
            entries,
            path: self.inner.path.clone(),
            read_only: self.inner.read_only,
            file_size_bytes,
        })
    }

    /// Compacts the store file, reclaiming space left by deleted records.
    ///
    /// The range arguments are accepted for interface compatibility; the
    /// whole file is always compacted. Returns whether compaction ran.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ReadOnly`] on read-only handles and
    /// [`Error::Compaction`] while iterators or snapshots are open.
    pub fn compact(&self, _start: Option<&[u8]>, _limit: Option<&[u8]>) -> Result<bool> {
        self.inner.compact()
    }

    /// Ensures prior writes are durable.
    ///
    /// Every commit is durable on return, so this only checks that the handle
    /// is still open.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Closed`] after close.
    pub fn sync(&self) -> Result<()> {
        ensure!(!self.inner.is_closed(), ClosedSnafu);
        Ok(())
    }

    /// Stops the reclamation cycle and releases the backend.
    ///
    /// Waits for in-flight operations on this handle to finish. Idempotent;
    /// every later operation fails with [`Error::Closed`].
    ///
    /// # Errors
    ///
    /// Currently infallible; the signature leaves room for backends whose
    /// shutdown can fail.
    pub fn close(&self) -> Result<()> {
        if let Some(reclaimer) = self.reclaimer.lock().take() {
            reclaimer.shutdown();
        }
        if self.inner.backend.write().take().is_some() {
            debug!(path = ?self.inner.path, "Closed key-value store");
        }
        Ok(())
    }
}

impl Drop for KvStore {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

impl fmt::Debug for KvStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KvStore")
            .field("path", &self.inner.path)
            .field("read_only", &self.inner.read_only)
            .field("closed", &self.inner.is_closed())
            .finish()
    }
}

fn ensure_table(db: &Database) -> Result<()> {
    let txn = db.begin_write().context(TransactionSnafu)?;
    txn.open_table(KV_TABLE).context(TableSnafu)?;
    txn.commit().context(CommitSnafu)?;
    Ok(())
}

impl KeyValueReader for KvStore {
    fn has(&self, key: &[u8]) -> Result<bool> {
        KvStore::has(self, key)
    }

    fn get(&self, key: &[u8]) -> Result<Vec<u8>> {
        KvStore::get(self, key)
    }
}

impl KeyValueWriter for KvStore {
    fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        KvStore::put(self, key, value)
    }

    fn delete(&self, key: &[u8]) -> Result<()> {
        KvStore::delete(self, key)
    }
}

impl KeyValueRangeDeleter for KvStore {
    fn delete_range(&self, start: &[u8], end: Option<&[u8]>) -> Result<()> {
        KvStore::delete_range(self, start, end)
    }
}

impl Iteratee for KvStore {
    type Iter = KvIterator;

    fn new_iterator(&self, prefix: &[u8], start: Option<&[u8]>) -> Result<KvIterator> {
        KvStore::new_iterator(self, prefix, start)
    }
}

impl Batcher for KvStore {
    fn new_batch(&self) -> Batch {
        KvStore::new_batch(self)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::disallowed_methods)]
mod tests {
    use std::time::{Duration, Instant};

    use tempfile::TempDir;

    use super::*;

    fn collect(iter: KvIterator) -> Vec<(Vec<u8>, Vec<u8>)> {
        iter.collect::<Result<Vec<_>>>().unwrap()
    }

    fn no_reclaim() -> StoreConfig {
        StoreConfig::builder().reclaim_enabled(false).build().unwrap()
    }

    #[test]
    fn test_put_get_delete() {
        let store = KvStore::open_in_memory().unwrap();
        store.put(b"k", b"v1").unwrap();
        assert!(store.has(b"k").unwrap());
        assert_eq!(store.get(b"k").unwrap(), b"v1");

        store.put(b"k", b"v2").unwrap();
        assert_eq!(store.get(b"k").unwrap(), b"v2");

        store.delete(b"k").unwrap();
        assert!(!store.has(b"k").unwrap());
        assert!(store.get(b"k").unwrap_err().is_not_found());
    }

    #[test]
    fn test_delete_missing_key_succeeds() {
        let store = KvStore::open_in_memory().unwrap();
        store.delete(b"never-written").unwrap();
    }

    #[test]
    fn test_empty_value_is_distinct_from_missing() {
        let store = KvStore::open_in_memory().unwrap();
        store.put(b"empty", b"").unwrap();
        assert!(store.has(b"empty").unwrap());
        assert_eq!(store.get(b"empty").unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn test_delete_range_is_half_open() {
        let store = KvStore::open_in_memory().unwrap();
        for key in [b"a", b"b", b"c", b"d", b"e"] {
            store.put(key, b"x").unwrap();
        }
        store.delete_range(b"b", Some(b"d")).unwrap();

        let keys: Vec<_> = collect(store.new_iterator(b"", None).unwrap())
            .into_iter()
            .map(|(k, _)| k)
            .collect();
        assert_eq!(keys, vec![b"a".to_vec(), b"d".to_vec(), b"e".to_vec()]);
    }

    #[test]
    fn test_delete_range_open_end_and_inverted_bounds() {
        let store = KvStore::open_in_memory().unwrap();
        for key in [b"a", b"b", b"c"] {
            store.put(key, b"x").unwrap();
        }
        // Inverted range is a no-op.
        store.delete_range(b"c", Some(b"a")).unwrap();
        assert_eq!(store.stat().unwrap().entries, 3);

        store.delete_range(b"b", None).unwrap();
        assert!(store.has(b"a").unwrap());
        assert!(!store.has(b"b").unwrap());
        assert!(!store.has(b"c").unwrap());
    }

    #[test]
    fn test_iterator_prefix_and_start() {
        let store = KvStore::open_in_memory().unwrap();
        for (k, v) in [("a-1", "1"), ("b-1", "2"), ("b-2", "3"), ("b-3", "4"), ("c-1", "5")] {
            store.put(k.as_bytes(), v.as_bytes()).unwrap();
        }

        let all_b = collect(store.new_iterator(b"b-", None).unwrap());
        assert_eq!(all_b.len(), 3);
        assert_eq!(all_b[0], (b"b-1".to_vec(), b"2".to_vec()));

        let from_b2 = collect(store.new_iterator(b"b-", Some(b"b-2")).unwrap());
        assert_eq!(from_b2.iter().map(|(k, _)| k.clone()).collect::<Vec<_>>(), vec![
            b"b-2".to_vec(),
            b"b-3".to_vec()
        ]);

        // A start sorting before the prefix seeks to the prefix.
        let early_start = collect(store.new_iterator(b"b-", Some(b"a")).unwrap());
        assert_eq!(early_start.len(), 3);

        // Without a prefix, start seeks into the whole keyspace.
        let tail = collect(store.new_iterator(b"", Some(b"b-3")).unwrap());
        assert_eq!(tail.len(), 2);
    }

    #[test]
    fn test_iterator_is_point_in_time() {
        let store = KvStore::open_in_memory().unwrap();
        store.put(b"k1", b"v1").unwrap();
        let iter = store.new_iterator(b"k", None).unwrap();

        store.put(b"k2", b"v2").unwrap();
        store.put(b"k1", b"changed").unwrap();

        let seen = collect(iter);
        assert_eq!(seen, vec![(b"k1".to_vec(), b"v1".to_vec())]);
    }

    #[test]
    fn test_iterator_release_ends_iteration() {
        let store = KvStore::open_in_memory().unwrap();
        store.put(b"k1", b"v1").unwrap();
        store.put(b"k2", b"v2").unwrap();
        let mut iter = store.new_iterator(b"", None).unwrap();
        assert!(iter.next().is_some());
        iter.release();
        assert!(iter.next().is_none());
    }

    #[test]
    fn test_snapshot_isolation_and_release() {
        let store = KvStore::open_in_memory().unwrap();
        store.put(b"k", b"before").unwrap();
        let mut snapshot = store.new_snapshot().unwrap();

        store.put(b"k", b"after").unwrap();
        store.put(b"new", b"x").unwrap();

        assert_eq!(snapshot.get(b"k").unwrap(), b"before");
        assert!(!snapshot.has(b"new").unwrap());
        assert_eq!(store.get(b"k").unwrap(), b"after");

        snapshot.release();
        snapshot.release();
        assert!(matches!(snapshot.get(b"k"), Err(Error::SnapshotReleased)));
    }

    #[test]
    fn test_operations_after_close_fail() {
        let store = KvStore::open_in_memory().unwrap();
        store.put(b"k", b"v").unwrap();
        let batch = {
            let mut batch = store.new_batch();
            batch.put(b"late", b"v");
            batch
        };
        store.close().unwrap();
        store.close().unwrap();

        assert!(store.is_closed());
        assert!(matches!(store.get(b"k"), Err(Error::Closed)));
        assert!(matches!(store.has(b"k"), Err(Error::Closed)));
        assert!(matches!(store.put(b"k", b"v"), Err(Error::Closed)));
        assert!(matches!(store.new_iterator(b"", None), Err(Error::Closed)));
        assert!(matches!(store.sync(), Err(Error::Closed)));
        assert!(matches!(batch.write(), Err(Error::Closed)));
    }

    #[test]
    fn test_reopen_persists_data() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("store.redb");
        {
            let store = KvStore::open(&path, &no_reclaim()).unwrap();
            store.put(b"durable", b"yes").unwrap();
            store.close().unwrap();
        }
        let store = KvStore::open(&path, &no_reclaim()).unwrap();
        assert_eq!(store.get(b"durable").unwrap(), b"yes");
    }

    #[test]
    fn test_read_only_handle_rejects_writes() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("store.redb");
        {
            let store = KvStore::open(&path, &no_reclaim()).unwrap();
            store.put(b"k", b"v").unwrap();
        }

        let reader = KvStore::open_read_only(&path, &no_reclaim()).unwrap();
        assert!(reader.is_read_only());
        assert_eq!(reader.get(b"k").unwrap(), b"v");
        assert!(matches!(reader.put(b"k", b"x"), Err(Error::ReadOnly)));
        assert!(matches!(reader.delete(b"k"), Err(Error::ReadOnly)));
        assert!(matches!(reader.delete_range(b"", None), Err(Error::ReadOnly)));
        assert!(matches!(reader.compact(None, None), Err(Error::ReadOnly)));
        let mut batch = reader.new_batch();
        batch.put(b"k", b"x");
        assert!(matches!(batch.write(), Err(Error::ReadOnly)));
    }

    #[test]
    fn test_read_only_requires_existing_path() {
        let dir = TempDir::new().unwrap();
        let err = KvStore::open_read_only(dir.path().join("missing.redb"), &no_reclaim())
            .unwrap_err();
        assert!(matches!(err, Error::MissingPath { .. }));
    }

    #[test]
    fn test_stat_reports_entries() {
        let dir = TempDir::new().unwrap();
        let store = KvStore::open(dir.path().join("s.redb"), &no_reclaim()).unwrap();
        store.put(b"a", b"1").unwrap();
        store.put(b"b", b"2").unwrap();
        let stats = store.stat().unwrap();
        assert_eq!(stats.entries, 2);
        assert!(!stats.read_only);
        assert!(stats.file_size_bytes.unwrap() > 0);
        assert!(stats.to_string().contains("entries=2"));
    }

    #[test]
    fn test_compact_runs_without_open_readers() {
        let store = KvStore::open_in_memory().unwrap();
        for i in 0..100u32 {
            store.put(&i.to_be_bytes(), &[0u8; 256]).unwrap();
        }
        store.delete_range(&[], None).unwrap();
        store.compact(None, None).unwrap();
        assert_eq!(store.stat().unwrap().entries, 0);
    }

    fn reclaim_config() -> StoreConfig {
        StoreConfig::builder().reclaim_interval(Duration::from_millis(20)).build().unwrap()
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_reclaimer_runs_and_stops_on_close() {
        let dir = TempDir::new().unwrap();
        let store = KvStore::open(dir.path().join("gc.redb"), &reclaim_config()).unwrap();
        store.put(b"k", b"v").unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        while store.reclaim_cycles() == 0 && Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(store.reclaim_cycles() > 0, "reclamation should have run");

        store.close().unwrap();
        let cycles = store.reclaim_cycles();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(store.reclaim_cycles(), cycles, "no cycles after close");
    }

    #[test]
    fn test_reclaim_needs_a_runtime() {
        let dir = TempDir::new().unwrap();
        let store = KvStore::open(dir.path().join("gc.redb"), &reclaim_config()).unwrap();
        std::thread::sleep(Duration::from_millis(60));
        assert_eq!(store.reclaim_cycles(), 0);
        store.close().unwrap();
    }
}
