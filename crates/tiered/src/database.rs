//! Two-tier database: a read-write current tier in front of an archive tier.
//!
//! Normal traffic reads current first and falls back to the archive; every
//! write goes to current. Only the [`Archiver`](crate::Archiver) writes the
//! archive, and only the archiver moves the finality height.
//!
//! Records below the finality height are immutable once archived: they are
//! never written back to current by any component of this crate.

use std::{
    fmt,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

use snafu::OptionExt;
use tierdb_store::{
    AncientReader, AncientStore, AncientWriteOp, AncientWriter, Batch, Batcher, Error, Iteratee,
    KeyValueRangeDeleter, KeyValueReader, KeyValueWriter, KvStore, Result, Snapshot, StoreStats,
    error::UnsupportedSnafu, metrics,
};
use tierdb_types::config::{AncientConfig, ArchiveMode, TieredConfig};
use tracing::{info, warn};

use crate::iterator::MergedIterator;

/// Which tier served a read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tier {
    Current,
    Archive,
}

impl Tier {
    fn label(self) -> &'static str {
        match self {
            Self::Current => "current",
            Self::Archive => "archive",
        }
    }
}

/// Cumulative read and write counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReadStats {
    /// Reads answered by the archive tier.
    pub archive_reads: u64,
    /// Reads answered by the current tier.
    pub current_reads: u64,
    /// Single-key and range writes applied to the current tier.
    pub current_writes: u64,
}

#[derive(Debug, Default)]
struct Counters {
    archive_reads: AtomicU64,
    current_reads: AtomicU64,
    current_writes: AtomicU64,
}

/// Combined statistics for both tiers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TieredStats {
    /// Current tier statistics.
    pub current: StoreStats,
    /// Archive tier statistics, if an archive is attached.
    pub archive: Option<StoreStats>,
    /// Heights below this live in the archive.
    pub finality_height: u64,
    /// `(tail, ancients)` of the attached ancient store.
    pub ancient_bounds: Option<(u64, u64)>,
}

impl fmt::Display for TieredStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "current: {}", self.current)?;
        match &self.archive {
            Some(archive) => writeln!(f, "archive: {archive}")?,
            None => writeln!(f, "archive: none")?,
        }
        if let Some((tail, ancients)) = self.ancient_bounds {
            writeln!(f, "ancient: [{tail}, {ancients})")?;
        }
        write!(f, "finality_height={}", self.finality_height)
    }
}

/// Current and archive tiers behind one key-value surface.
///
/// Without an archive the database runs in single-tier mode and behaves like
/// its current store. An attached [`AncientStore`] is exposed through the
/// ancient capability traits; without one every ancient call returns
/// [`Error::Unsupported`].
pub struct TieredDatabase {
    current: Arc<KvStore>,
    archive: Option<Arc<KvStore>>,
    ancient: Option<Arc<AncientStore>>,
    finality_height: AtomicU64,
    counters: Counters,
}

#[bon::bon]
impl TieredDatabase {
    /// Assembles a database from already-open handles.
    ///
    /// The archive is writable by the archiver only if its handle is
    /// read-write.
    #[builder]
    pub fn new(
        current: Arc<KvStore>,
        archive: Option<Arc<KvStore>>,
        ancient: Option<Arc<AncientStore>>,
    ) -> Self {
        Self {
            current,
            archive,
            ancient,
            finality_height: AtomicU64::new(0),
            counters: Counters::default(),
        }
    }
}

impl TieredDatabase {
    /// Opens every tier named by `config`.
    ///
    /// `ArchiveMode::Owned` opens the archive read-write; `ArchiveMode::Shared`
    /// opens it read-only on a shared lock, so other processes can hold it
    /// too.
    ///
    /// # Errors
    ///
    /// Returns the first open error. Tiers opened before the failure are
    /// closed again.
    pub fn open(config: &TieredConfig) -> Result<Self> {
        let current = Arc::new(KvStore::open(&config.current_path, &config.store)?);

        let archive = match &config.archive_path {
            Some(path) => {
                let store = match config.archive_mode {
                    ArchiveMode::Owned => KvStore::open(path, &config.store),
                    ArchiveMode::Shared => KvStore::open_read_only(path, &config.store),
                };
                Some(Arc::new(store?))
            },
            None => None,
        };

        let ancient = match &config.ancient_path {
            Some(path) => {
                let ancient_config =
                    AncientConfig { store: config.store.clone(), ..AncientConfig::default() };
                Some(Arc::new(AncientStore::open(path, &ancient_config)?))
            },
            None => None,
        };

        info!(
            current = %config.current_path.display(),
            archive = ?config.archive_path,
            archive_mode = ?config.archive_mode,
            ancient = ?config.ancient_path,
            "Opened tiered database"
        );
        Ok(Self::builder().current(current).maybe_archive(archive).maybe_ancient(ancient).build())
    }

    /// The current tier.
    pub fn current(&self) -> &Arc<KvStore> {
        &self.current
    }

    /// The archive tier, if attached.
    pub fn archive(&self) -> Option<&Arc<KvStore>> {
        self.archive.as_ref()
    }

    /// The ancient store, if attached.
    pub fn ancient_store(&self) -> Option<&Arc<AncientStore>> {
        self.ancient.as_ref()
    }

    /// Returns true if an archive tier is attached and writable.
    pub fn archive_writable(&self) -> bool {
        self.archive.as_ref().is_some_and(|archive| !archive.is_read_only())
    }

    /// Heights below this value have been migrated to the archive.
    pub fn finality_height(&self) -> u64 {
        self.finality_height.load(Ordering::Acquire)
    }

    /// Advances the finality height. Never moves it backwards.
    pub(crate) fn advance_finality_height(&self, height: u64) {
        let previous = self.finality_height.fetch_max(height, Ordering::AcqRel);
        if height > previous {
            metrics::set_finality_height(height);
        }
    }

    /// Cumulative read and write counts.
    pub fn read_stats(&self) -> ReadStats {
        ReadStats {
            archive_reads: self.counters.archive_reads.load(Ordering::Relaxed),
            current_reads: self.counters.current_reads.load(Ordering::Relaxed),
            current_writes: self.counters.current_writes.load(Ordering::Relaxed),
        }
    }

    fn record_read(&self, tier: Tier) {
        let counter = match tier {
            Tier::Current => &self.counters.current_reads,
            Tier::Archive => &self.counters.archive_reads,
        };
        counter.fetch_add(1, Ordering::Relaxed);
        metrics::record_tier_read(tier.label());
    }

    fn record_write(&self) {
        self.counters.current_writes.fetch_add(1, Ordering::Relaxed);
    }

    fn tier(&self, tier: Tier) -> Option<&KvStore> {
        match tier {
            Tier::Current => Some(&self.current),
            Tier::Archive => self.archive.as_deref(),
        }
    }

    fn get_from(&self, tier: Tier, key: &[u8]) -> Result<Vec<u8>> {
        let Some(store) = self.tier(tier) else {
            return Err(Error::NotFound);
        };
        let value = store.get(key)?;
        self.record_read(tier);
        Ok(value)
    }

    fn get_in_order(&self, first: Tier, second: Tier, key: &[u8]) -> Result<Vec<u8>> {
        match self.get_from(first, key) {
            Err(e) if e.is_not_found() => self.get_from(second, key),
            other => other,
        }
    }

    /// Returns true if `key` is in either tier.
    ///
    /// # Errors
    ///
    /// Propagates backend errors from either tier.
    pub fn has(&self, key: &[u8]) -> Result<bool> {
        if self.current.has(key)? {
            self.record_read(Tier::Current);
            return Ok(true);
        }
        match &self.archive {
            Some(archive) if archive.has(key)? => {
                self.record_read(Tier::Archive);
                Ok(true)
            },
            _ => Ok(false),
        }
    }

    /// Returns the value of `key`, preferring current over the archive.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if neither tier holds `key`.
    pub fn get(&self, key: &[u8]) -> Result<Vec<u8>> {
        self.get_in_order(Tier::Current, Tier::Archive, key)
    }

    /// Reads a record of the block at `height`.
    ///
    /// Finalized heights go to the archive first, others to current first;
    /// either way the other tier is consulted on NotFound.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if neither tier holds `key`.
    pub fn get_at_height(&self, key: &[u8], height: u64) -> Result<Vec<u8>> {
        if self.archive.is_some() && height < self.finality_height() {
            self.get_in_order(Tier::Archive, Tier::Current, key)
        } else {
            self.get_in_order(Tier::Current, Tier::Archive, key)
        }
    }

    /// Writes `key` to the current tier.
    ///
    /// # Errors
    ///
    /// Propagates current-tier errors.
    pub fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.current.put(key, value)?;
        self.record_write();
        Ok(())
    }

    /// Deletes `key` from the current tier. Archived copies are untouched.
    ///
    /// # Errors
    ///
    /// Propagates current-tier errors.
    pub fn delete(&self, key: &[u8]) -> Result<()> {
        self.current.delete(key)?;
        self.record_write();
        Ok(())
    }

    /// Deletes `[start, end)` from the current tier.
    ///
    /// # Errors
    ///
    /// Propagates current-tier errors.
    pub fn delete_range(&self, start: &[u8], end: Option<&[u8]>) -> Result<()> {
        self.current.delete_range(start, end)?;
        self.record_write();
        Ok(())
    }

    /// A batch bound to the current tier.
    pub fn new_batch(&self) -> Batch {
        self.current.new_batch()
    }

    /// Iterates `prefix` in the archive, then in current.
    ///
    /// See [`MergedIterator`] for the ordering caveat.
    ///
    /// # Errors
    ///
    /// Propagates errors opening either tier's read view.
    pub fn new_iterator(&self, prefix: &[u8], start: Option<&[u8]>) -> Result<MergedIterator> {
        let archive = match &self.archive {
            Some(archive) => Some(archive.new_iterator(prefix, start)?),
            None => None,
        };
        Ok(MergedIterator::new(archive, self.current.new_iterator(prefix, start)?))
    }

    /// Snapshot of the current tier.
    ///
    /// # Errors
    ///
    /// Propagates current-tier errors.
    pub fn new_snapshot(&self) -> Result<Snapshot> {
        self.current.new_snapshot()
    }

    /// Statistics for every tier.
    ///
    /// # Errors
    ///
    /// Propagates errors from either tier.
    pub fn stat(&self) -> Result<TieredStats> {
        Ok(TieredStats {
            current: self.current.stat()?,
            archive: self.archive.as_ref().map(|archive| archive.stat()).transpose()?,
            finality_height: self.finality_height(),
            ancient_bounds: self.ancient.as_ref().map(|ancient| ancient.bounds()),
        })
    }

    /// Compacts current and, when owned, the archive.
    ///
    /// # Errors
    ///
    /// Propagates compaction errors.
    pub fn compact(&self, start: Option<&[u8]>, limit: Option<&[u8]>) -> Result<()> {
        self.current.compact(start, limit)?;
        if let Some(archive) = self.archive.as_ref().filter(|archive| !archive.is_read_only()) {
            archive.compact(start, limit)?;
        }
        Ok(())
    }

    /// Syncs every tier.
    ///
    /// # Errors
    ///
    /// Returns the first sync error.
    pub fn sync(&self) -> Result<()> {
        self.current.sync()?;
        if let Some(archive) = &self.archive {
            archive.sync()?;
        }
        if let Some(ancient) = &self.ancient {
            ancient.sync()?;
        }
        Ok(())
    }

    /// Closes every tier and the ancient store.
    ///
    /// All of them are closed even if one fails; the first failure is
    /// returned. Stop any archiver using this database first.
    ///
    /// # Errors
    ///
    /// Returns the first close error.
    pub fn close(&self) -> Result<()> {
        let results = [
            Some(self.current.close()),
            self.archive.as_ref().map(|archive| archive.close()),
            self.ancient.as_ref().map(|ancient| ancient.close()),
        ];
        let mut first = None;
        for result in results.into_iter().flatten() {
            if let Err(e) = result {
                warn!(error = %e, "Failed to close tier");
                first.get_or_insert(e);
            }
        }
        first.map_or(Ok(()), Err)
    }

    fn require_ancient(&self, operation: &str) -> Result<&AncientStore> {
        self.ancient.as_deref().context(UnsupportedSnafu { operation })
    }

    /// Runs `f` against the ancient store with writers excluded.
    ///
    /// # Errors
    ///
    /// Returns `Unsupported` without an ancient store, otherwise whatever
    /// `f` returns.
    pub fn read_ancients<T>(&self, f: impl FnOnce(&AncientStore) -> Result<T>) -> Result<T> {
        self.require_ancient("read_ancients")?.read_ancients(f)
    }
}

impl fmt::Debug for TieredDatabase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TieredDatabase")
            .field("current", &self.current)
            .field("archive", &self.archive)
            .field("ancient", &self.ancient)
            .field("finality_height", &self.finality_height())
            .finish()
    }
}

impl KeyValueReader for TieredDatabase {
    fn has(&self, key: &[u8]) -> Result<bool> {
        TieredDatabase::has(self, key)
    }

    fn get(&self, key: &[u8]) -> Result<Vec<u8>> {
        TieredDatabase::get(self, key)
    }
}

impl KeyValueWriter for TieredDatabase {
    fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        TieredDatabase::put(self, key, value)
    }

    fn delete(&self, key: &[u8]) -> Result<()> {
        TieredDatabase::delete(self, key)
    }
}

impl KeyValueRangeDeleter for TieredDatabase {
    fn delete_range(&self, start: &[u8], end: Option<&[u8]>) -> Result<()> {
        TieredDatabase::delete_range(self, start, end)
    }
}

impl Iteratee for TieredDatabase {
    type Iter = MergedIterator;

    fn new_iterator(&self, prefix: &[u8], start: Option<&[u8]>) -> Result<MergedIterator> {
        TieredDatabase::new_iterator(self, prefix, start)
    }
}

impl Batcher for TieredDatabase {
    fn new_batch(&self) -> Batch {
        TieredDatabase::new_batch(self)
    }
}

impl AncientReader for TieredDatabase {
    fn has_ancient(&self, table: &str, index: u64) -> Result<bool> {
        self.require_ancient("has_ancient")?.has_ancient(table, index)
    }

    fn ancient(&self, table: &str, index: u64) -> Result<Vec<u8>> {
        AncientStore::ancient(self.require_ancient("ancient")?, table, index)
    }

    fn ancient_range(
        &self,
        table: &str,
        start: u64,
        count: u64,
        max_bytes: u64,
    ) -> Result<Vec<Vec<u8>>> {
        self.require_ancient("ancient_range")?.ancient_range(table, start, count, max_bytes)
    }

    fn ancients(&self) -> Result<u64> {
        Ok(self.require_ancient("ancients")?.ancients())
    }

    fn tail(&self) -> Result<u64> {
        Ok(self.require_ancient("tail")?.tail())
    }

    fn ancient_size(&self, table: &str) -> Result<u64> {
        self.require_ancient("ancient_size")?.ancient_size(table)
    }
}

impl AncientWriter for TieredDatabase {
    fn modify_ancients<F>(&self, f: F) -> Result<u64>
    where
        F: FnOnce(&mut AncientWriteOp) -> Result<()>,
    {
        self.require_ancient("modify_ancients")?.modify_ancients(f)
    }

    fn truncate_head(&self, n: u64) -> Result<u64> {
        self.require_ancient("truncate_head")?.truncate_head(n)
    }

    fn truncate_tail(&self, n: u64) -> Result<u64> {
        self.require_ancient("truncate_tail")?.truncate_tail(n)
    }

    fn sync_ancient(&self) -> Result<()> {
        self.require_ancient("sync_ancient")?.sync()
    }
}
