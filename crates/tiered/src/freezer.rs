//! Freezing of canonical blocks into the ancient store.
//!
//! Blocks more than `freeze_threshold` below the head are copied, in batches,
//! from the key-value tiers into the ancient store's lockstep tables. Each
//! batch is one `modify_ancients` commit. With `prune_source`, the frozen
//! records are deleted from the current tier only after that commit.

use std::{
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Instant,
};

use parking_lot::Mutex;
use snafu::OptionExt;
use tierdb_store::{
    AncientStore, Result,
    error::{InvariantViolationSnafu, UnsupportedSnafu},
    metrics,
};
use tierdb_types::{
    Hash, hash_from_slice,
    config::{
        BODIES_TABLE, DIFFICULTIES_TABLE, FreezerConfig, HASHES_TABLE, HEADERS_TABLE,
        RECEIPTS_TABLE,
    },
    schema::{body_key, canonical_hash_key, header_key, receipts_key, td_key},
    short_hex,
};
use tracing::{debug, info};

use crate::database::TieredDatabase;

const JOB: &str = "freezer";

/// Outcome of one freeze run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FreezeReport {
    /// First height frozen by this run.
    pub start_height: u64,
    /// One past the last height frozen by this run.
    pub end_height: u64,
    /// Blocks frozen.
    pub frozen: u64,
    /// Bytes appended to the ancient store.
    pub bytes: u64,
}

struct FrozenBlock {
    height: u64,
    hash: Hash,
    header: Vec<u8>,
    body: Vec<u8>,
    receipts: Vec<u8>,
    difficulty: Vec<u8>,
}

/// Moves canonical blocks from a tiered database into its ancient store.
#[derive(Debug, bon::Builder)]
pub struct Freezer {
    /// Source tiers and destination ancient store.
    database: Arc<TieredDatabase>,
    #[builder(default)]
    config: FreezerConfig,
    #[builder(skip)]
    frozen_blocks: AtomicU64,
    #[builder(skip)]
    last_frozen: Mutex<Option<u64>>,
    #[builder(skip)]
    run_lock: Mutex<()>,
}

impl Freezer {
    /// Blocks frozen by this freezer since construction.
    pub fn frozen_blocks(&self) -> u64 {
        self.frozen_blocks.load(Ordering::Relaxed)
    }

    /// Highest height frozen by this freezer.
    pub fn last_frozen(&self) -> Option<u64> {
        *self.last_frozen.lock()
    }

    /// Freezes every block from the ancient store's upper bound up to
    /// `head - freeze_threshold` (exclusive).
    ///
    /// Nothing happens when `head <= freeze_threshold`.
    ///
    /// # Errors
    ///
    /// Returns `Unsupported` if the database has no ancient store and
    /// `InvariantViolation` if a block's canonical hash or header is
    /// missing. Batches committed before an error stay committed.
    pub fn freeze(&self, head: u64) -> Result<FreezeReport> {
        let ancient =
            self.database.ancient_store().context(UnsupportedSnafu { operation: "freeze" })?;
        let _running = self.run_lock.lock();

        let start_height = ancient.ancients();
        let mut report =
            FreezeReport { start_height, end_height: start_height, ..FreezeReport::default() };
        if head <= self.config.freeze_threshold {
            return Ok(report);
        }
        let limit = head - self.config.freeze_threshold;
        if start_height >= limit {
            return Ok(report);
        }

        let started = Instant::now();
        while report.end_height < limit {
            let from = report.end_height;
            let to = from.saturating_add(self.config.batch_size).min(limit);
            let blocks =
                (from..to).map(|height| self.read_block(height)).collect::<Result<Vec<_>>>()?;

            report.bytes += self.append(ancient, &blocks)?;
            if self.config.prune_source {
                self.prune(&blocks)?;
            }

            let count = to - from;
            report.end_height = to;
            report.frozen += count;
            self.frozen_blocks.fetch_add(count, Ordering::Relaxed);
            *self.last_frozen.lock() = Some(to - 1);
            debug!(from, to, "Froze block batch");
        }

        metrics::record_background_job_items(JOB, report.frozen);
        metrics::record_background_job_duration(JOB, started.elapsed().as_secs_f64());
        info!(
            start_height = report.start_height,
            end_height = report.end_height,
            bytes = report.bytes,
            pruned = self.config.prune_source,
            "Froze blocks into ancient store"
        );
        Ok(report)
    }

    fn read_block(&self, height: u64) -> Result<FrozenBlock> {
        let hash_bytes = self.required(&canonical_hash_key(height), height, "canonical hash")?;
        let hash = hash_from_slice(&hash_bytes).context(InvariantViolationSnafu {
            message: format!("canonical hash at {height} is {} bytes", hash_bytes.len()),
        })?;
        let header = self.required(&header_key(height, &hash), height, "header")?;

        Ok(FrozenBlock {
            height,
            hash,
            header,
            body: self.optional(&body_key(height, &hash))?,
            receipts: self.optional(&receipts_key(height, &hash))?,
            difficulty: self.optional(&td_key(height, &hash))?,
        })
    }

    fn required(&self, key: &[u8], height: u64, what: &str) -> Result<Vec<u8>> {
        match self.database.get_at_height(key, height) {
            Err(e) if e.is_not_found() => {
                InvariantViolationSnafu { message: format!("missing {what} for block {height}") }
                    .fail()
            },
            other => other,
        }
    }

    fn optional(&self, key: &[u8]) -> Result<Vec<u8>> {
        match self.database.get(key) {
            Err(e) if e.is_not_found() => Ok(Vec::new()),
            other => other,
        }
    }

    fn append(&self, ancient: &AncientStore, blocks: &[FrozenBlock]) -> Result<u64> {
        ancient.modify_ancients(|op| {
            for block in blocks {
                op.append_raw(HASHES_TABLE, block.height, &block.hash)?;
                op.append_raw(HEADERS_TABLE, block.height, &block.header)?;
                op.append_raw(BODIES_TABLE, block.height, &block.body)?;
                op.append_raw(RECEIPTS_TABLE, block.height, &block.receipts)?;
                op.append_raw(DIFFICULTIES_TABLE, block.height, &block.difficulty)?;
            }
            Ok(())
        })
    }

    fn prune(&self, blocks: &[FrozenBlock]) -> Result<()> {
        let mut batch = self.database.new_batch();
        for block in blocks {
            batch.delete(&canonical_hash_key(block.height));
            batch.delete(&header_key(block.height, &block.hash));
            batch.delete(&body_key(block.height, &block.hash));
            batch.delete(&receipts_key(block.height, &block.hash));
            batch.delete(&td_key(block.height, &block.hash));
        }
        batch.write()?;
        if let Some(last) = blocks.last() {
            debug!(height = last.height, hash = %short_hex(&last.hash), "Pruned frozen blocks");
        }
        Ok(())
    }
}
