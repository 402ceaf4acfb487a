//! Crash injection for testing durability and resumability.
//!
//! A [`CrashInjector`] is attached to a store, archiver or replayer and fires a
//! simulated crash at a configured point. The component observing the crash
//! abandons the operation exactly as a dying process would: an open write
//! transaction is dropped uncommitted, and nothing after the crash point runs.
//!
//! # Crash Points
//!
//! ```text
//! Batch::write:   op 1 → op 2 → ... → op N → commit
//!                              ↑
//!                     DuringBatchWrite
//!
//! Archiver chunk: archive commit → current delete
//!                               ↑
//!                      AfterArchiveCommit
//!
//! Replayer batch: records + checkpoint commit → next batch
//!                                            ↑
//!                               AfterCheckpointCommit
//! ```

use std::{
    fmt,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU32, Ordering},
    },
};

/// Points where a crash can be injected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CrashPoint {
    /// Crash inside `Batch::write` once `after_ops` operations have been
    /// applied to the open transaction, before it commits.
    ///
    /// On-disk state: unchanged. None of the batch is visible.
    DuringBatchWrite {
        /// Operations applied before the crash.
        after_ops: u32,
    },

    /// Crash once `after_chunks` archive chunks have committed, before the
    /// matching keys are deleted from the current tier.
    ///
    /// On-disk state: the chunk exists in both tiers.
    AfterArchiveCommit {
        /// Archive commits observed before the crash.
        after_chunks: u32,
    },

    /// Crash once `after_batches` replay batches (records and checkpoint)
    /// have committed.
    ///
    /// On-disk state: the checkpoint covers exactly the committed batches.
    AfterCheckpointCommit {
        /// Checkpoint commits observed before the crash.
        after_batches: u32,
    },
}

impl fmt::Display for CrashPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DuringBatchWrite { after_ops } => write!(f, "batch write after {after_ops} ops"),
            Self::AfterArchiveCommit { after_chunks } => {
                write!(f, "archive commit {after_chunks}")
            },
            Self::AfterCheckpointCommit { after_batches } => {
                write!(f, "checkpoint commit {after_batches}")
            },
        }
    }
}

/// Tracks crash injection state for deterministic crash simulation.
///
/// The injector starts disarmed and fires at most once per arming.
///
/// # Thread Safety
///
/// All state is atomic, making `CrashInjector` safe to share across threads.
#[derive(Debug)]
pub struct CrashInjector {
    /// The crash point to trigger.
    crash_point: CrashPoint,
    /// Batch operations observed while armed.
    batch_op_count: AtomicU32,
    /// Archive commits observed while armed.
    archive_commit_count: AtomicU32,
    /// Checkpoint commits observed while armed.
    checkpoint_commit_count: AtomicU32,
    /// Whether the crash has been triggered.
    crashed: AtomicBool,
    /// Whether injection is armed (enabled).
    armed: AtomicBool,
}

impl CrashInjector {
    /// Creates a new, disarmed crash injector targeting `crash_point`.
    pub fn new(crash_point: CrashPoint) -> Arc<Self> {
        Arc::new(Self {
            crash_point,
            batch_op_count: AtomicU32::new(0),
            archive_commit_count: AtomicU32::new(0),
            checkpoint_commit_count: AtomicU32::new(0),
            crashed: AtomicBool::new(false),
            armed: AtomicBool::new(false),
        })
    }

    /// Creates an injector that is already armed.
    pub fn armed(crash_point: CrashPoint) -> Arc<Self> {
        let injector = Self::new(crash_point);
        injector.arm();
        injector
    }

    /// Arms the injector and resets its counters.
    ///
    /// The injector starts disarmed to allow setup writes without interference.
    pub fn arm(&self) {
        self.batch_op_count.store(0, Ordering::SeqCst);
        self.archive_commit_count.store(0, Ordering::SeqCst);
        self.checkpoint_commit_count.store(0, Ordering::SeqCst);
        self.crashed.store(false, Ordering::SeqCst);
        self.armed.store(true, Ordering::SeqCst);
    }

    /// Disarms the injector.
    pub fn disarm(&self) {
        self.armed.store(false, Ordering::SeqCst);
    }

    /// Checks if the crash has been triggered.
    pub fn has_crashed(&self) -> bool {
        self.crashed.load(Ordering::SeqCst)
    }

    /// Returns the configured crash point.
    pub fn crash_point(&self) -> CrashPoint {
        self.crash_point
    }

    /// Records one applied batch operation.
    ///
    /// Returns `true` if the batch write should crash now.
    pub fn on_batch_op(&self) -> bool {
        self.observe(&self.batch_op_count, |count| match self.crash_point {
            CrashPoint::DuringBatchWrite { after_ops } => count + 1 >= after_ops,
            _ => false,
        })
    }

    /// Records one durable archive commit.
    ///
    /// Returns `true` if the archiver should crash before deleting the chunk.
    pub fn on_archive_commit(&self) -> bool {
        self.observe(&self.archive_commit_count, |count| match self.crash_point {
            CrashPoint::AfterArchiveCommit { after_chunks } => count + 1 >= after_chunks,
            _ => false,
        })
    }

    /// Records one durable checkpoint commit.
    ///
    /// Returns `true` if the replayer should crash now.
    pub fn on_checkpoint_commit(&self) -> bool {
        self.observe(&self.checkpoint_commit_count, |count| match self.crash_point {
            CrashPoint::AfterCheckpointCommit { after_batches } => count + 1 >= after_batches,
            _ => false,
        })
    }

    fn observe(&self, counter: &AtomicU32, should_crash: impl FnOnce(u32) -> bool) -> bool {
        if !self.armed.load(Ordering::SeqCst) || self.crashed.load(Ordering::SeqCst) {
            return false;
        }

        let count = counter.fetch_add(1, Ordering::SeqCst);
        let crash = should_crash(count);
        if crash {
            self.crashed.store(true, Ordering::SeqCst);
        }
        crash
    }
}
