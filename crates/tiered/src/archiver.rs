//! Background migration of finalized records from current to archive.
//!
//! Each cycle reads the chain head marker from the current tier, derives the
//! finalized height and moves every eligible record into the archive in
//! chunks. A chunk is deleted from current only after its archive commit is
//! durable, so a record is always readable from at least one tier.
//!
//! ## Cycle
//!
//! ```text
//! chain-head-height ──► finalized = head - finality_delay
//!                              │
//!        ┌─────────────────────▼─────────────────────┐
//!        │ scan current from resume key              │
//!        │ collect up to chunk_size eligible records │
//!        └─────────────────────┬─────────────────────┘
//!                              │
//!              archive batch commit (durable)
//!                              │
//!              current delete batch commit
//!                              │
//!                  more records? ──yes──► scan
//!                              │ no
//!                  finality_height = finalized
//! ```
//!
//! A failed cycle is logged and counted; the next tick starts from scratch.
//! Records that survived in both tiers are copied again and then deleted.

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
    time::Instant,
};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use snafu::{ResultExt, ensure};
use tierdb_store::{
    CrashInjector, KvPair, KvStore, Result,
    error::{CodecSnafu, InjectedCrashSnafu, UnsupportedSnafu},
    metrics,
};
use tierdb_types::{
    config::ArchiverConfig,
    decode_height,
    schema::{CHAIN_HEAD_HEIGHT_KEY, LAST_REPLAYED_HEIGHT_KEY},
};
use tokio::{
    runtime::Handle,
    sync::mpsc,
    task::JoinHandle,
    time::{MissedTickBehavior, interval},
};
use tracing::{debug, info, warn};

use crate::{
    database::TieredDatabase,
    policy::{ArchivePolicy, HeightScoped},
};

const JOB: &str = "archiver";

/// Markers that describe the current tier itself and never leave it.
const MARKER_KEYS: [&[u8]; 2] = [CHAIN_HEAD_HEIGHT_KEY, LAST_REPLAYED_HEIGHT_KEY];

fn default_policy() -> Arc<dyn ArchivePolicy> {
    Arc::new(HeightScoped::default())
}

/// Outcome of one archive cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ArchiveReport {
    /// Height below which records were eligible. Zero if nothing was final.
    pub finalized_height: u64,
    /// Records copied to the archive.
    pub archived: u64,
    /// Records deleted from current.
    pub deleted: u64,
    /// True if a stop request ended the cycle between chunks. The finality
    /// height is not advanced for an interrupted cycle.
    pub interrupted: bool,
}

/// Cumulative archiver statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArchiverStats {
    /// Records copied to the archive across all cycles.
    pub total_archived: u64,
    /// Records deleted from current across all cycles.
    pub total_deleted: u64,
    /// Cycles that completed without error.
    pub cycles: u64,
    /// Cycles that returned an error.
    pub failed_cycles: u64,
    /// Completion time of the last cycle that archived at least one record.
    pub last_archived_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Default)]
struct Counters {
    total_archived: AtomicU64,
    total_deleted: AtomicU64,
    cycles: AtomicU64,
    failed_cycles: AtomicU64,
    last_archived_at: Mutex<Option<DateTime<Utc>>>,
}

#[derive(Debug)]
struct RunningTask {
    shutdown: mpsc::Sender<()>,
    handle: JoinHandle<()>,
}

/// Migrates finalized records from the current tier into the archive.
///
/// Requires a database with an owned, writable archive. Run cycles by hand
/// with [`archive_finalized`](Self::archive_finalized), or on a timer with
/// [`start`](Self::start) and [`stop`](Self::stop).
///
/// # Concurrent writes
///
/// Records the policy marks eligible are treated as immutable. A chunk is
/// read, copied to the archive and then deleted from current by key only,
/// so a write to one of its keys between the read and the delete is lost.
/// A write that lands before the cycle reads the key is archived with its
/// latest value.
#[derive(Debug, bon::Builder)]
pub struct Archiver {
    /// Database whose tiers are migrated.
    database: Arc<TieredDatabase>,
    /// Finality delay, tick interval and chunk size.
    #[builder(default)]
    config: ArchiverConfig,
    /// Decides which keys are eligible.
    #[builder(default = default_policy())]
    policy: Arc<dyn ArchivePolicy>,
    /// Simulated crash between archive commit and current delete.
    crash_injector: Option<Arc<CrashInjector>>,
    #[builder(skip)]
    counters: Counters,
    #[builder(skip)]
    task: Mutex<Option<RunningTask>>,
    #[builder(skip)]
    stopping: AtomicBool,
}

impl Archiver {
    /// The database this archiver migrates.
    pub fn database(&self) -> &Arc<TieredDatabase> {
        &self.database
    }

    /// Cumulative statistics.
    pub fn stats(&self) -> ArchiverStats {
        ArchiverStats {
            total_archived: self.counters.total_archived.load(Ordering::Relaxed),
            total_deleted: self.counters.total_deleted.load(Ordering::Relaxed),
            cycles: self.counters.cycles.load(Ordering::Relaxed),
            failed_cycles: self.counters.failed_cycles.load(Ordering::Relaxed),
            last_archived_at: *self.counters.last_archived_at.lock(),
        }
    }

    /// Returns true while the background loop is running.
    pub fn is_running(&self) -> bool {
        self.task.lock().as_ref().is_some_and(|task| !task.handle.is_finished())
    }

    /// Runs one archive cycle.
    ///
    /// Returns an empty report when the chain head marker is absent or not
    /// above the finality delay. A second call with no new writes archives
    /// nothing.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Unsupported`](tierdb_store::Error::Unsupported) when
    /// the database has no writable archive, and propagates storage errors
    /// from either tier. Chunks committed before the error stay committed.
    pub fn archive_finalized(&self) -> Result<ArchiveReport> {
        match self.archive_cycle() {
            Ok(report) => {
                self.counters.cycles.fetch_add(1, Ordering::Relaxed);
                if report.archived > 0 {
                    *self.counters.last_archived_at.lock() = Some(Utc::now());
                }
                Ok(report)
            },
            Err(e) => {
                self.counters.failed_cycles.fetch_add(1, Ordering::Relaxed);
                Err(e)
            },
        }
    }

    fn writable_archive(&self) -> Result<&KvStore> {
        let archive = self.database.archive().filter(|archive| !archive.is_read_only());
        match archive {
            Some(archive) => Ok(archive),
            None => UnsupportedSnafu { operation: "archive_finalized" }.fail(),
        }
    }

    fn chain_head(&self) -> Result<Option<u64>> {
        match self.database.current().get(CHAIN_HEAD_HEIGHT_KEY) {
            Ok(bytes) => {
                let height = decode_height(&bytes).context(CodecSnafu { what: "chain head" })?;
                Ok(Some(height))
            },
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn is_eligible(&self, key: &[u8], finalized_height: u64) -> bool {
        !MARKER_KEYS.iter().any(|marker| *marker == key)
            && self.policy.should_archive(key, finalized_height)
    }

    fn archive_cycle(&self) -> Result<ArchiveReport> {
        let archive = self.writable_archive()?;
        let Some(head) = self.chain_head()? else {
            debug!("No chain head marker, nothing to archive");
            return Ok(ArchiveReport::default());
        };
        if head <= self.config.finality_delay {
            debug!(head, finality_delay = self.config.finality_delay, "Nothing finalized yet");
            return Ok(ArchiveReport::default());
        }

        let finalized_height = head - self.config.finality_delay;
        let mut report = ArchiveReport { finalized_height, ..ArchiveReport::default() };
        let mut resume: Option<Vec<u8>> = None;

        loop {
            if self.stopping.load(Ordering::Acquire) {
                report.interrupted = true;
                break;
            }

            let chunk = self.collect_chunk(resume.as_deref(), finalized_height)?;
            let Some((last_key, _)) = chunk.last() else {
                break;
            };
            // Smallest key strictly after the chunk.
            let mut next = last_key.clone();
            next.push(0);

            let moved = self.move_chunk(archive, &chunk)?;
            report.archived += moved;
            report.deleted += moved;

            if chunk.len() < self.config.chunk_size {
                break;
            }
            resume = Some(next);
        }

        if report.interrupted {
            info!(
                finalized_height,
                archived = report.archived,
                "Archive cycle interrupted by stop request"
            );
            return Ok(report);
        }

        self.database.advance_finality_height(finalized_height);
        if report.archived > 0 {
            info!(
                finalized_height,
                archived = report.archived,
                deleted = report.deleted,
                "Archived finalized records"
            );
        }
        Ok(report)
    }

    fn collect_chunk(&self, start: Option<&[u8]>, finalized_height: u64) -> Result<Vec<KvPair>> {
        let mut chunk = Vec::with_capacity(self.config.chunk_size);
        let mut iter = self.database.current().new_iterator(&[], start)?;
        for entry in iter.by_ref() {
            let (key, value) = entry?;
            if self.is_eligible(&key, finalized_height) {
                chunk.push((key, value));
                if chunk.len() >= self.config.chunk_size {
                    break;
                }
            }
        }
        iter.release();
        Ok(chunk)
    }

    fn move_chunk(&self, archive: &KvStore, chunk: &[KvPair]) -> Result<u64> {
        let mut copy = archive.new_batch();
        for (key, value) in chunk {
            copy.put(key, value);
        }
        copy.write()?;

        if let Some(injector) = &self.crash_injector {
            ensure!(
                !injector.on_archive_commit(),
                InjectedCrashSnafu { point: injector.crash_point().to_string() }
            );
        }

        let mut delete = self.database.current().new_batch();
        for (key, _) in chunk {
            delete.delete(key);
        }
        delete.write()?;

        let moved = chunk.len() as u64;
        self.counters.total_archived.fetch_add(moved, Ordering::Relaxed);
        self.counters.total_deleted.fetch_add(moved, Ordering::Relaxed);
        debug!(records = moved, "Moved chunk to archive");
        Ok(moved)
    }

    /// Starts the background loop on the current tokio runtime.
    ///
    /// The first cycle runs immediately, then one per `interval`. Returns
    /// false if the loop is already running, if the archive is not writable,
    /// or if called outside a tokio runtime.
    pub fn start(self: &Arc<Self>) -> bool {
        let mut task = self.task.lock();
        if task.as_ref().is_some_and(|task| !task.handle.is_finished()) {
            return false;
        }
        if let Err(e) = self.writable_archive() {
            warn!(error = %e, "Archiver not started");
            return false;
        }
        let Ok(runtime) = Handle::try_current() else {
            warn!("Archiver not started: no tokio runtime");
            return false;
        };

        self.stopping.store(false, Ordering::Release);
        let (shutdown, shutdown_rx) = mpsc::channel(1);
        let handle = runtime.spawn(Arc::clone(self).run(shutdown_rx));
        *task = Some(RunningTask { shutdown, handle });
        true
    }

    /// Stops the background loop and waits for it to exit.
    ///
    /// An in-flight cycle finishes its current chunk first. No-op if the loop
    /// is not running.
    pub async fn stop(&self) {
        let Some(task) = self.task.lock().take() else {
            return;
        };
        self.stopping.store(true, Ordering::Release);
        drop(task.shutdown);
        if let Err(e) = task.handle.await {
            warn!(error = %e, "Archiver task ended abnormally");
        }
        self.stopping.store(false, Ordering::Release);
        info!("Archiver stopped");
    }

    async fn run(self: Arc<Self>, mut shutdown: mpsc::Receiver<()>) {
        let mut ticker = interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(
            interval_ms = self.config.interval.as_millis() as u64,
            finality_delay = self.config.finality_delay,
            chunk_size = self.config.chunk_size,
            "Archiver started"
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let archiver = Arc::clone(&self);
                    let cycle = tokio::task::spawn_blocking(move || archiver.run_cycle());
                    if let Err(e) = cycle.await {
                        warn!(error = %e, "Archiver cycle panicked");
                    }
                }
                _ = shutdown.recv() => {
                    debug!("Archiver loop received shutdown");
                    break;
                }
            }
        }
    }

    fn run_cycle(&self) {
        let started = Instant::now();
        match self.archive_finalized() {
            Ok(report) => {
                metrics::record_background_job_run(JOB, "success");
                metrics::record_background_job_items(JOB, report.archived);
            },
            Err(e) => {
                metrics::record_background_job_run(JOB, "failure");
                warn!(error = %e, "Archive cycle failed");
            },
        }
        metrics::record_background_job_duration(JOB, started.elapsed().as_secs_f64());
    }
}
