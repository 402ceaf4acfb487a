//! Append-only ancient store.
//!
//! Items are kept in named tables, addressed by a dense `u64` index. Every
//! table covers the same index window `[tail, ancients)`: appends and
//! truncations move all tables together, so one index names one block across
//! all of them.
//!
//! The store lives in its own key-value file:
//!
//! ```text
//! <table> ':' be(index)      → item bytes
//! "ancient-count"            → ancients (exclusive upper bound)
//! "ancient-tail"             → tail (inclusive lower bound)
//! "table-<name>-count"       → items currently held by <name>
//! "table-<name>-size"        → bytes currently held by <name>
//! ```
//!
//! Bounds are cached in memory and persisted in the same transaction as the
//! item writes they describe.

use std::{collections::BTreeMap, fmt, path::Path};

use parking_lot::{Mutex, RwLock};
use redb::ReadableTable;
use snafu::{OptionExt, ResultExt, ensure};
use tierdb_types::{
    codec::{HEIGHT_LEN, decode_height, encode_height},
    config::{ANCIENT_KEY_SEPARATOR, AncientConfig},
};
use tracing::{debug, info};

use crate::{
    error::{
        AncientNotFoundSnafu, CodecSnafu, InvariantViolationSnafu, MissingPathSnafu,
        OutOfBoundsSnafu, ReadOnlySnafu, Result, StorageSnafu, UnknownTableSnafu,
    },
    kv::{KvStore, KvTable},
    metrics,
    traits::{AncientReader, AncientWriter},
};

const ANCIENT_COUNT_KEY: &[u8] = b"ancient-count";
const ANCIENT_TAIL_KEY: &[u8] = b"ancient-tail";

/// Physical key of item `index` in `table`.
fn item_key(table: &str, index: u64) -> Vec<u8> {
    let mut key = Vec::with_capacity(table.len() + 1 + HEIGHT_LEN);
    key.extend_from_slice(table.as_bytes());
    key.push(ANCIENT_KEY_SEPARATOR);
    key.extend_from_slice(&encode_height(index));
    key
}

fn table_count_key(table: &str) -> Vec<u8> {
    format!("table-{table}-count").into_bytes()
}

fn table_size_key(table: &str) -> Vec<u8> {
    format!("table-{table}-size").into_bytes()
}

/// Per-table accounting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TableMeta {
    /// Items currently held.
    pub items: u64,
    /// Bytes currently held.
    pub size: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct AncientMeta {
    ancients: u64,
    tail: u64,
    tables: BTreeMap<String, TableMeta>,
}

impl AncientMeta {
    /// Exclusive upper index of `meta`'s items, given the shared tail.
    fn head_of(&self, meta: &TableMeta) -> u64 {
        self.tail + meta.items
    }

    fn check_lockstep(&self) -> Result<()> {
        ensure!(
            self.tail <= self.ancients,
            InvariantViolationSnafu {
                message: format!("tail {} is above ancients {}", self.tail, self.ancients)
            }
        );
        for (name, meta) in &self.tables {
            let head = self.head_of(meta);
            ensure!(
                head == self.ancients,
                InvariantViolationSnafu {
                    message: format!(
                        "table {name} ends at {head} but the store ends at {}",
                        self.ancients
                    )
                }
            );
        }
        Ok(())
    }
}

enum Mutation {
    Append { table: String, index: u64, data: Vec<u8> },
    /// Removes `[from, to)` from every table.
    Remove { from: u64, to: u64 },
}

/// Mutations staged inside [`AncientStore::modify_ancients`].
///
/// Every call validates against the bounds as they will be after the
/// mutations staged so far; nothing reaches the store until the closure
/// returns successfully.
pub struct AncientWriteOp {
    meta: AncientMeta,
    mutations: Vec<Mutation>,
    written: u64,
}

impl AncientWriteOp {
    /// Appends `data` to `table` at `index`.
    ///
    /// `index` must be the table's next free index.
    ///
    /// # Errors
    ///
    /// Returns `UnknownTable` for unregistered tables and
    /// `InvariantViolation` for out-of-order indices.
    pub fn append_raw(&mut self, table: &str, index: u64, data: &[u8]) -> Result<()> {
        let tail = self.meta.tail;
        let entry = self.meta.tables.get_mut(table).context(UnknownTableSnafu { table })?;
        let next = tail + entry.items;
        ensure!(
            index == next,
            InvariantViolationSnafu {
                message: format!("append to {table} at {index}, next free index is {next}")
            }
        );
        entry.items += 1;
        entry.size += data.len() as u64;
        self.meta.ancients = self.meta.ancients.max(index + 1);
        self.written += data.len() as u64;
        self.mutations.push(Mutation::Append {
            table: table.to_string(),
            index,
            data: data.to_vec(),
        });
        Ok(())
    }

    /// Discards items at indices `>= n`. Returns the previous upper bound.
    ///
    /// A no-op when `n` is at or above the current upper bound.
    ///
    /// # Errors
    ///
    /// Returns `InvariantViolation` if `n` is below the tail.
    pub fn truncate_head(&mut self, n: u64) -> Result<u64> {
        let previous = self.meta.ancients;
        let tail = self.meta.tail;
        ensure!(
            n >= tail,
            InvariantViolationSnafu {
                message: format!("cannot truncate head to {n}, below tail {tail}"),
            }
        );
        if n < previous {
            for meta in self.meta.tables.values_mut() {
                meta.items = (tail + meta.items).min(n) - tail;
            }
            self.meta.ancients = n;
            self.mutations.push(Mutation::Remove { from: n, to: previous });
        }
        Ok(previous)
    }

    /// Discards the `n` oldest items. Returns the previous tail.
    ///
    /// # Errors
    ///
    /// Returns `InvariantViolation` if fewer than `n` items are stored.
    pub fn truncate_tail(&mut self, n: u64) -> Result<u64> {
        let previous = self.meta.tail;
        let ancients = self.meta.ancients;
        let new_tail = previous.checked_add(n).filter(|tail| *tail <= ancients).context(
            InvariantViolationSnafu {
                message: format!("cannot advance tail {previous} by {n} past ancients {ancients}"),
            },
        )?;
        if new_tail > previous {
            for meta in self.meta.tables.values_mut() {
                meta.items = (previous + meta.items).saturating_sub(new_tail);
            }
            self.meta.tail = new_tail;
            self.mutations.push(Mutation::Remove { from: previous, to: new_tail });
        }
        Ok(previous)
    }

    /// Upper bound as staged so far.
    pub fn ancients(&self) -> u64 {
        self.meta.ancients
    }

    /// Tail as staged so far.
    pub fn tail(&self) -> u64 {
        self.meta.tail
    }
}

impl fmt::Debug for AncientWriteOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AncientWriteOp")
            .field("tail", &self.meta.tail)
            .field("ancients", &self.meta.ancients)
            .field("mutations", &self.mutations.len())
            .field("written", &self.written)
            .finish()
    }
}

/// Append-only, index-addressed storage for finalized block data.
///
/// Reads run concurrently. Writes are serialized: one
/// [`modify_ancients`](Self::modify_ancients) (or truncation) at a time.
pub struct AncientStore {
    store: KvStore,
    meta: RwLock<AncientMeta>,
    write_lock: Mutex<()>,
}

impl AncientStore {
    /// Opens (or creates) a read-write ancient store at `path`.
    ///
    /// # Errors
    ///
    /// Returns the key-value store's open errors, and `InvariantViolation`
    /// if persisted bounds are inconsistent with the configured tables.
    pub fn open(path: impl AsRef<Path>, config: &AncientConfig) -> Result<Self> {
        let store = KvStore::open(path, &config.store)?;
        Self::with_store(store, &config.tables)
    }

    /// Opens an existing ancient store read-only.
    ///
    /// # Errors
    ///
    /// Returns `MissingPath` if nothing exists at `path`.
    pub fn open_shared(path: impl AsRef<Path>, config: &AncientConfig) -> Result<Self> {
        let path = path.as_ref();
        ensure!(path.exists(), MissingPathSnafu { path });
        let store = KvStore::open_read_only(path, &config.store)?;
        Self::with_store(store, &config.tables)
    }

    /// Opens an in-memory ancient store.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be initialized.
    pub fn open_in_memory(config: &AncientConfig) -> Result<Self> {
        Self::with_store(KvStore::open_in_memory()?, &config.tables)
    }

    fn with_store(store: KvStore, tables: &[String]) -> Result<Self> {
        let meta = load_meta(&store, tables)?;
        metrics::set_ancient_bounds(meta.tail, meta.ancients);
        info!(
            path = ?store.path(),
            tail = meta.tail,
            ancients = meta.ancients,
            tables = tables.len(),
            "Opened ancient store"
        );
        Ok(Self { store, meta: RwLock::new(meta), write_lock: Mutex::new(()) })
    }

    /// Returns true if this store was opened read-only.
    pub fn is_read_only(&self) -> bool {
        self.store.is_read_only()
    }

    /// Registered table names, in sorted order.
    pub fn tables(&self) -> Vec<String> {
        self.meta.read().tables.keys().cloned().collect()
    }

    /// Accounting for `table`.
    ///
    /// # Errors
    ///
    /// Returns `UnknownTable` for unregistered tables.
    pub fn table_meta(&self, table: &str) -> Result<TableMeta> {
        self.meta.read().tables.get(table).copied().context(UnknownTableSnafu { table })
    }

    /// Returns `(tail, ancients)`.
    pub fn bounds(&self) -> (u64, u64) {
        let meta = self.meta.read();
        (meta.tail, meta.ancients)
    }

    /// Exclusive upper bound of stored items.
    pub fn ancients(&self) -> u64 {
        self.meta.read().ancients
    }

    /// Inclusive lower bound of stored items.
    pub fn tail(&self) -> u64 {
        self.meta.read().tail
    }

    /// Returns true if `table` holds an item at `index`.
    ///
    /// # Errors
    ///
    /// Returns `UnknownTable` for unregistered tables.
    pub fn has_ancient(&self, table: &str, index: u64) -> Result<bool> {
        let meta = self.meta.read();
        ensure!(meta.tables.contains_key(table), UnknownTableSnafu { table });
        if index < meta.tail || index >= meta.ancients {
            return Ok(false);
        }
        self.store.has(&item_key(table, index))
    }

    /// Returns the item at `index` of `table`.
    ///
    /// # Errors
    ///
    /// Returns `UnknownTable` for unregistered tables and `AncientNotFound`
    /// outside `[tail, ancients)`.
    pub fn ancient(&self, table: &str, index: u64) -> Result<Vec<u8>> {
        let meta = self.meta.read();
        ensure!(meta.tables.contains_key(table), UnknownTableSnafu { table });
        ensure!(index >= meta.tail && index < meta.ancients, AncientNotFoundSnafu { table, index });
        match self.store.get(&item_key(table, index)) {
            Err(e) if e.is_not_found() => AncientNotFoundSnafu { table, index }.fail(),
            other => other,
        }
    }

    /// Returns up to `count` consecutive items of `table` starting at `start`.
    ///
    /// Stops before the item that would push the total past `max_bytes`
    /// (`0` means unlimited), but always returns at least one item when
    /// `start` is in range. Returns nothing when `start >= ancients`.
    ///
    /// # Errors
    ///
    /// Returns `OutOfBounds` if `start < tail`, and `InvariantViolation` if a
    /// stored item is missing from the range.
    pub fn ancient_range(
        &self,
        table: &str,
        start: u64,
        count: u64,
        max_bytes: u64,
    ) -> Result<Vec<Vec<u8>>> {
        let meta = self.meta.read();
        ensure!(meta.tables.contains_key(table), UnknownTableSnafu { table });
        let (tail, ancients) = (meta.tail, meta.ancients);
        if start >= ancients || count == 0 {
            return Ok(Vec::new());
        }
        ensure!(start >= tail, OutOfBoundsSnafu { table, index: start, tail, ancients });

        let end = start.saturating_add(count).min(ancients);
        let view = self.store.inner().read_table()?.context(InvariantViolationSnafu {
            message: format!("ancient store reports [{tail}, {ancients}) but holds no data"),
        })?;
        // The view is pinned; writers may proceed.
        drop(meta);

        let lower = item_key(table, start);
        let upper = item_key(table, end);
        let mut items = Vec::new();
        let mut total = 0u64;
        let mut expected = start;
        let mut budget_hit = false;
        for entry in view.range(lower.as_slice()..upper.as_slice()).context(StorageSnafu)? {
            let (key, value) = entry.context(StorageSnafu)?;
            let index = index_of(table, key.value())?;
            ensure!(
                index == expected,
                InvariantViolationSnafu {
                    message: format!("table {table} is missing item {expected}")
                }
            );
            let value = value.value();
            let len = value.len() as u64;
            if max_bytes > 0 && !items.is_empty() && total + len > max_bytes {
                budget_hit = true;
                break;
            }
            total += len;
            items.push(value.to_vec());
            expected += 1;
        }
        ensure!(
            budget_hit || expected == end,
            InvariantViolationSnafu { message: format!("table {table} is missing item {expected}") }
        );
        Ok(items)
    }

    /// Total bytes stored in `table`.
    ///
    /// # Errors
    ///
    /// Returns `UnknownTable` for unregistered tables.
    pub fn ancient_size(&self, table: &str) -> Result<u64> {
        self.table_meta(table).map(|meta| meta.size)
    }

    /// Runs `f` while holding the write lock, so no modification can
    /// interleave with the reads `f` performs.
    ///
    /// `f` must not modify the store; doing so deadlocks.
    ///
    /// # Errors
    ///
    /// Returns whatever `f` returns.
    pub fn read_ancients<T>(&self, f: impl FnOnce(&Self) -> Result<T>) -> Result<T> {
        let _writer = self.write_lock.lock();
        f(self)
    }

    /// Applies every mutation staged by `f` in one transaction.
    ///
    /// Returns the number of bytes appended. If `f` fails, or the staged
    /// result leaves the tables out of lockstep, nothing is applied.
    ///
    /// # Errors
    ///
    /// Returns `ReadOnly` on shared handles, any error from `f`, and
    /// `InvariantViolation` if the tables would end at different indices.
    pub fn modify_ancients<F>(&self, f: F) -> Result<u64>
    where
        F: FnOnce(&mut AncientWriteOp) -> Result<()>,
    {
        ensure!(!self.store.is_read_only(), ReadOnlySnafu);
        let _writer = self.write_lock.lock();

        let mut op =
            AncientWriteOp { meta: self.meta.read().clone(), mutations: Vec::new(), written: 0 };
        f(&mut op)?;
        let AncientWriteOp { meta: mut staged, mutations, written } = op;
        staged.check_lockstep()?;
        if mutations.is_empty() {
            return Ok(0);
        }

        // Hold the bounds while committing so readers never pair old bounds
        // with new data.
        let mut current = self.meta.write();
        self.store.inner().write(|table| {
            for mutation in &mutations {
                apply(table, mutation, &mut staged)?;
            }
            persist_meta(table, &staged)
        })?;
        *current = staged;
        metrics::set_ancient_bounds(current.tail, current.ancients);
        metrics::record_ancient_bytes_written(written);
        debug!(
            tail = current.tail,
            ancients = current.ancients,
            mutations = mutations.len(),
            written,
            "Modified ancient store"
        );
        Ok(written)
    }

    /// Discards items at indices `>= n`. Returns the previous upper bound.
    ///
    /// # Errors
    ///
    /// Returns `InvariantViolation` if `n` is below the tail.
    pub fn truncate_head(&self, n: u64) -> Result<u64> {
        let mut previous = 0;
        self.modify_ancients(|op| {
            previous = op.truncate_head(n)?;
            Ok(())
        })?;
        Ok(previous)
    }

    /// Discards the `n` oldest items. Returns the previous tail.
    ///
    /// # Errors
    ///
    /// Returns `InvariantViolation` if fewer than `n` items are stored.
    pub fn truncate_tail(&self, n: u64) -> Result<u64> {
        let mut previous = 0;
        self.modify_ancients(|op| {
            previous = op.truncate_tail(n)?;
            Ok(())
        })?;
        Ok(previous)
    }

    /// Flushes ancient data to durable storage.
    ///
    /// # Errors
    ///
    /// Returns `Closed` after close.
    pub fn sync(&self) -> Result<()> {
        self.store.sync()
    }

    /// Closes the underlying store. Idempotent.
    ///
    /// # Errors
    ///
    /// Propagates close errors from the key-value store.
    pub fn close(&self) -> Result<()> {
        self.store.close()
    }
}

impl fmt::Debug for AncientStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let meta = self.meta.read();
        f.debug_struct("AncientStore")
            .field("path", &self.store.path())
            .field("tail", &meta.tail)
            .field("ancients", &meta.ancients)
            .field("tables", &meta.tables.len())
            .finish()
    }
}

fn read_counter(store: &KvStore, key: &[u8]) -> Result<u64> {
    match store.get(key) {
        Ok(bytes) => decode_height(&bytes)
            .context(CodecSnafu { what: String::from_utf8_lossy(key).into_owned() }),
        Err(e) if e.is_not_found() => Ok(0),
        Err(e) => Err(e),
    }
}

fn load_meta(store: &KvStore, tables: &[String]) -> Result<AncientMeta> {
    let mut meta = AncientMeta {
        ancients: read_counter(store, ANCIENT_COUNT_KEY)?,
        tail: read_counter(store, ANCIENT_TAIL_KEY)?,
        tables: BTreeMap::new(),
    };
    for name in tables {
        let items = read_counter(store, &table_count_key(name))?;
        let size = read_counter(store, &table_size_key(name))?;
        meta.tables.insert(name.clone(), TableMeta { items, size });
    }
    meta.check_lockstep()?;
    Ok(meta)
}

fn index_of(table: &str, key: &[u8]) -> Result<u64> {
    let suffix = key.get(table.len() + 1..).unwrap_or_default();
    decode_height(suffix).context(CodecSnafu { what: format!("{table} item key") })
}

fn apply(table: &mut KvTable<'_>, mutation: &Mutation, meta: &mut AncientMeta) -> Result<()> {
    match mutation {
        Mutation::Append { table: name, index, data } => {
            table.insert(item_key(name, *index).as_slice(), data.as_slice()).context(StorageSnafu)?;
        },
        Mutation::Remove { from, to } => {
            let names: Vec<String> = meta.tables.keys().cloned().collect();
            for name in names {
                let removed = remove_items(table, &name, *from, *to)?;
                if let Some(entry) = meta.tables.get_mut(&name) {
                    entry.size = entry.size.saturating_sub(removed);
                }
            }
        },
    }
    Ok(())
}

/// Removes `[from, to)` of `name`, returning the bytes removed.
fn remove_items(table: &mut KvTable<'_>, name: &str, from: u64, to: u64) -> Result<u64> {
    let lower = item_key(name, from);
    let upper = item_key(name, to);
    let doomed = table
        .range(lower.as_slice()..upper.as_slice())
        .context(StorageSnafu)?
        .map(|entry| entry.map(|(key, value)| (key.value().to_vec(), value.value().len() as u64)))
        .collect::<std::result::Result<Vec<_>, _>>()
        .context(StorageSnafu)?;
    let mut removed = 0;
    for (key, len) in &doomed {
        table.remove(key.as_slice()).context(StorageSnafu)?;
        removed += len;
    }
    Ok(removed)
}

fn persist_meta(table: &mut KvTable<'_>, meta: &AncientMeta) -> Result<()> {
    table.insert(ANCIENT_COUNT_KEY, encode_height(meta.ancients).as_slice()).context(StorageSnafu)?;
    table.insert(ANCIENT_TAIL_KEY, encode_height(meta.tail).as_slice()).context(StorageSnafu)?;
    for (name, entry) in &meta.tables {
        table
            .insert(table_count_key(name).as_slice(), encode_height(entry.items).as_slice())
            .context(StorageSnafu)?;
        table
            .insert(table_size_key(name).as_slice(), encode_height(entry.size).as_slice())
            .context(StorageSnafu)?;
    }
    Ok(())
}

impl AncientReader for AncientStore {
    fn has_ancient(&self, table: &str, index: u64) -> Result<bool> {
        AncientStore::has_ancient(self, table, index)
    }

    fn ancient(&self, table: &str, index: u64) -> Result<Vec<u8>> {
        AncientStore::ancient(self, table, index)
    }

    fn ancient_range(
        &self,
        table: &str,
        start: u64,
        count: u64,
        max_bytes: u64,
    ) -> Result<Vec<Vec<u8>>> {
        AncientStore::ancient_range(self, table, start, count, max_bytes)
    }

    fn ancients(&self) -> Result<u64> {
        Ok(AncientStore::ancients(self))
    }

    fn tail(&self) -> Result<u64> {
        Ok(AncientStore::tail(self))
    }

    fn ancient_size(&self, table: &str) -> Result<u64> {
        AncientStore::ancient_size(self, table)
    }
}

impl AncientWriter for AncientStore {
    fn modify_ancients<F>(&self, f: F) -> Result<u64>
    where
        F: FnOnce(&mut AncientWriteOp) -> Result<()>,
    {
        AncientStore::modify_ancients(self, f)
    }

    fn truncate_head(&self, n: u64) -> Result<u64> {
        AncientStore::truncate_head(self, n)
    }

    fn truncate_tail(&self, n: u64) -> Result<u64> {
        AncientStore::truncate_tail(self, n)
    }

    fn sync_ancient(&self) -> Result<()> {
        self.sync()
    }
}
