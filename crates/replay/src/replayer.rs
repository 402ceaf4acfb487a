//! Resumable, checkpointed replay of a legacy dataset.
//!
//! Heights are copied in batches of `batch_size`. The last write of every
//! batch also stores the batch's final height under `LastReplayedHeight`, so
//! the checkpoint and the records it covers commit together. A later run
//! resumes at the height after the checkpoint; intermediate commits inside
//! a batch that were not followed by their checkpoint are simply rewritten.
//!
//! ```text
//! checkpoint ─► [from ─────── batch_size ─────── to] ─► checkpoint = to
//!                 │ commit_interval │ commit_interval │ + checkpoint
//! ```

use std::{sync::Arc, time::Duration};

use humantime::format_duration;
use snafu::{OptionExt, ResultExt, ensure};
use tierdb_store::{CrashInjector, metrics};
use tierdb_tiered::TieredDatabase;
use tierdb_types::{
    config::ReplayConfig, decode_height, encode_height, is_zero_hash,
    schema::LAST_REPLAYED_HEIGHT_KEY,
};
use tracing::{debug, info, warn};

use crate::{
    error::{
        EmptySourceSnafu, InjectedCrashSnafu, MissingBlockSnafu, Result, StoreSnafu,
        TipMismatchSnafu, TipRecordMismatchSnafu, VerificationSnafu,
    },
    progress::Progress,
    source::{ReplaySource, SourceBlock},
};

/// Outcome of one [`Replayer::replay`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplayReport {
    /// First height this call processed.
    pub start_height: u64,
    /// Checkpoint when the call returned.
    pub end_height: u64,
    /// Blocks copied by this call.
    pub replayed: u64,
    /// Blocks skipped under `continue_on_error`.
    pub skipped: u64,
    /// True if the checkpoint already covered the target.
    pub already_complete: bool,
}

/// Replay progress as persisted in the destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplayStatus {
    /// Checkpoint, inclusive. `None` before the first batch commits.
    pub last_replayed_height: Option<u64>,
    /// Height the replay runs up to.
    pub target_height: u64,
    /// True once the checkpoint equals the target.
    pub is_complete: bool,
}

#[derive(Debug, Default)]
struct BatchOutcome {
    copied: u64,
    skipped: u64,
}

/// Copies a [`ReplaySource`] into a [`TieredDatabase`].
///
/// Records land in the current tier. Calling [`replay`](Self::replay) again
/// after an interruption continues from the checkpoint and ends in the same
/// state as one uninterrupted run.
#[derive(Debug, bon::Builder)]
pub struct Replayer<S> {
    /// Legacy dataset.
    source: S,
    /// Database receiving the records and the checkpoint.
    destination: Arc<TieredDatabase>,
    #[builder(default)]
    config: ReplayConfig,
    /// Simulated crash after a checkpoint commit.
    crash_injector: Option<Arc<CrashInjector>>,
}

impl<S: ReplaySource> Replayer<S> {
    /// The persisted checkpoint: last replayed height, inclusive.
    ///
    /// # Errors
    ///
    /// Returns storage errors and codec errors for a malformed checkpoint.
    pub fn checkpoint(&self) -> Result<Option<u64>> {
        match self.destination.current().get(LAST_REPLAYED_HEIGHT_KEY) {
            Ok(bytes) => {
                let height = decode_height(&bytes)
                    .context(tierdb_store::error::CodecSnafu { what: "replay checkpoint" })
                    .context(StoreSnafu)?;
                Ok(Some(height))
            },
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e).context(StoreSnafu),
        }
    }

    /// Source tip capped by `max_height`.
    ///
    /// # Errors
    ///
    /// Returns `EmptySource` when the source has no tip.
    pub fn target_height(&self) -> Result<u64> {
        let tip = self.source.tip()?.context(EmptySourceSnafu)?;
        Ok(self.config.max_height.map_or(tip, |max| max.min(tip)))
    }

    /// Checkpoint, target and completion.
    ///
    /// # Errors
    ///
    /// Propagates errors from [`checkpoint`](Self::checkpoint) and
    /// [`target_height`](Self::target_height).
    pub fn status(&self) -> Result<ReplayStatus> {
        let last_replayed_height = self.checkpoint()?;
        let target_height = self.target_height()?;
        Ok(ReplayStatus {
            last_replayed_height,
            target_height,
            is_complete: last_replayed_height == Some(target_height),
        })
    }

    /// Returns true once the checkpoint equals the target.
    ///
    /// # Errors
    ///
    /// Propagates errors from [`status`](Self::status).
    pub fn is_complete(&self) -> Result<bool> {
        Ok(self.status()?.is_complete)
    }

    /// Replays every height after the checkpoint up to the target, then
    /// verifies the tip.
    ///
    /// # Errors
    ///
    /// - `EmptySource` if the source has no tip
    /// - `MissingBlock` / `Verification` for a bad block, unless
    ///   `continue_on_error` is set
    /// - `TipMismatch` / `TipRecordMismatch` if the finished destination does
    ///   not match the source tip
    /// - `Store` for storage failures on either side
    pub fn replay(&self) -> Result<ReplayReport> {
        let target = self.target_height()?;
        let checkpoint = self.checkpoint()?;
        let start_height = checkpoint.map_or(0, |height| height + 1);

        if start_height > target {
            self.verify_tip(target)?;
            info!(checkpoint = ?checkpoint, target, "Replay already complete");
            return Ok(ReplayReport {
                start_height,
                end_height: checkpoint.unwrap_or(target),
                already_complete: true,
                ..ReplayReport::default()
            });
        }

        info!(start_height, target, batch_size = self.config.batch_size, "Starting replay");
        let mut report = ReplayReport { start_height, ..ReplayReport::default() };
        let mut progress = Progress::new(target);
        let batch_size = self.config.batch_size.max(1);
        let mut from = start_height;

        loop {
            let to = from.saturating_add(batch_size - 1).min(target);
            let outcome = self.replay_batch(from, to)?;
            report.replayed += outcome.copied;
            report.skipped += outcome.skipped;
            report.end_height = to;

            let sample = progress.advance(to, to - from + 1);
            let rate = sample.blocks_per_second;
            metrics::record_replay_batch(to, outcome.copied, outcome.skipped, rate);
            let eta = sample.eta.map_or_else(
                || "unknown".to_string(),
                |eta| format_duration(Duration::from_secs(eta.as_secs())).to_string(),
            );
            info!(
                height = to,
                target,
                blocks_per_second = format!("{:.1}", sample.blocks_per_second),
                eta = %eta,
                "Replay progress"
            );

            if let Some(injector) = &self.crash_injector {
                ensure!(!injector.on_checkpoint_commit(), InjectedCrashSnafu { height: to });
            }
            if to >= target {
                break;
            }
            from = to + 1;
        }

        self.verify_tip(target)?;
        info!(
            start_height,
            end_height = report.end_height,
            replayed = report.replayed,
            skipped = report.skipped,
            "Replay complete"
        );
        Ok(report)
    }

    /// Copies `[from, to]` and commits the checkpoint `to` with the last write.
    fn replay_batch(&self, from: u64, to: u64) -> Result<BatchOutcome> {
        let commit_interval = self.config.commit_interval.max(1);
        let mut outcome = BatchOutcome::default();
        let mut batch = self.destination.new_batch();
        let mut pending = 0;

        for height in from..=to {
            match self.load_block(height) {
                Ok(block) => {
                    for (key, value) in &block.records {
                        batch.put(key, value);
                    }
                    outcome.copied += 1;
                },
                Err(e) if self.config.continue_on_error && e.is_block_error() => {
                    warn!(height, error = %e, "Skipping block");
                    outcome.skipped += 1;
                },
                Err(e) => return Err(e),
            }

            pending += 1;
            if pending >= commit_interval && height < to {
                batch.write().context(StoreSnafu)?;
                batch.reset();
                pending = 0;
            }
        }

        batch.put(LAST_REPLAYED_HEIGHT_KEY, &encode_height(to));
        batch.write().context(StoreSnafu)?;
        debug!(
            from,
            to,
            copied = outcome.copied,
            skipped = outcome.skipped,
            "Committed replay batch"
        );
        Ok(outcome)
    }

    fn load_block(&self, height: u64) -> Result<SourceBlock> {
        let block = self.source.block(height)?.context(MissingBlockSnafu { height })?;
        if self.config.verify_blocks {
            verify_block(&block)?;
        }
        Ok(block)
    }

    /// Checks that the checkpoint equals `target` and that the target block's
    /// records in the destination equal the source's.
    ///
    /// A tip block the source cannot supply was skipped by the batch that
    /// covered it, so only the checkpoint is compared.
    fn verify_tip(&self, target: u64) -> Result<()> {
        let checkpoint = self.checkpoint()?;
        ensure!(
            checkpoint == Some(target),
            TipMismatchSnafu { expected: target, found: checkpoint }
        );

        let block = match self.source.block(target) {
            Ok(Some(block)) => block,
            Ok(None) => {
                warn!(height = target, "Tip block absent from source, records not compared");
                return Ok(());
            },
            Err(e) if e.is_block_error() => {
                warn!(height = target, error = %e, "Tip block unreadable, records not compared");
                return Ok(());
            },
            Err(e) => return Err(e),
        };
        for (key, value) in &block.records {
            let matches = match self.destination.get(key) {
                Ok(stored) => stored == *value,
                Err(e) if e.is_not_found() => false,
                Err(e) => return Err(e).context(StoreSnafu),
            };
            ensure!(matches, TipRecordMismatchSnafu { height: target, key: hex::encode(key) });
        }
        Ok(())
    }
}

/// Structural checks on a block that carries hashes: non-zero hash, zero
/// parent at genesis, non-zero parent elsewhere.
fn verify_block(block: &SourceBlock) -> Result<()> {
    let height = block.height;
    let Some(hash) = &block.hash else {
        return Ok(());
    };
    ensure!(!is_zero_hash(hash), VerificationSnafu { height, reason: "zero block hash" });

    let parent = block
        .parent_hash
        .context(VerificationSnafu { height, reason: "header carries no parent hash" })?;
    if height == 0 {
        ensure!(
            is_zero_hash(&parent),
            VerificationSnafu { height, reason: "genesis has a non-zero parent hash" }
        );
    } else {
        ensure!(!is_zero_hash(&parent), VerificationSnafu { height, reason: "zero parent hash" });
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::disallowed_methods)]
mod tests {
    use tierdb_store::KvStore;
    use tierdb_test_utils::{
        ChainBlock,
        chain::{chain_records, legacy_head_record},
        sequential_records,
    };
    use tierdb_types::{ZERO_HASH, schema::canonical_hash_key};

    use super::*;
    use crate::{
        error::ReplayError,
        source::{ChainSource, SequentialSource},
    };

    fn destination() -> Arc<TieredDatabase> {
        Arc::new(
            TieredDatabase::builder().current(Arc::new(KvStore::open_in_memory().unwrap())).build(),
        )
    }

    fn source_store(records: Vec<(Vec<u8>, Vec<u8>)>) -> KvStore {
        let store = KvStore::open_in_memory().unwrap();
        for (key, value) in records {
            store.put(&key, &value).unwrap();
        }
        store
    }

    fn chain_source(tip: u64) -> ChainSource<KvStore> {
        let mut records = chain_records(tip);
        records.push(legacy_head_record(tip));
        ChainSource::new(source_store(records))
    }

    fn config(batch_size: u64) -> ReplayConfig {
        ReplayConfig::builder().batch_size(batch_size).commit_interval(2).build().unwrap()
    }

    #[test]
    fn test_replays_chain_with_verification() {
        let db = destination();
        let replayer = Replayer::builder()
            .source(chain_source(9))
            .destination(Arc::clone(&db))
            .config(config(4))
            .build();

        let report = replayer.replay().unwrap();
        assert_eq!(report.start_height, 0);
        assert_eq!(report.end_height, 9);
        assert_eq!(report.replayed, 10);
        assert!(replayer.is_complete().unwrap());
        assert_eq!(replayer.checkpoint().unwrap(), Some(9));

        for (key, value) in chain_records(9) {
            assert_eq!(db.get(&key).unwrap(), value);
        }
    }

    #[test]
    fn test_second_run_is_a_no_op() {
        let db = destination();
        let replayer = Replayer::builder()
            .source(chain_source(3))
            .destination(Arc::clone(&db))
            .config(config(2))
            .build();
        replayer.replay().unwrap();

        let report = replayer.replay().unwrap();
        assert!(report.already_complete);
        assert_eq!(report.replayed, 0);
        assert_eq!(report.end_height, 3);
    }

    #[test]
    fn test_empty_source() {
        let replayer = Replayer::builder()
            .source(ChainSource::new(source_store(Vec::new())))
            .destination(destination())
            .build();
        assert!(matches!(replayer.replay(), Err(ReplayError::EmptySource)));
    }

    #[test]
    fn test_max_height_caps_the_run() {
        let db = destination();
        let config = ReplayConfig::builder().batch_size(3).max_height(4).build().unwrap();
        let replayer = Replayer::builder()
            .source(chain_source(9))
            .destination(Arc::clone(&db))
            .config(config)
            .build();

        let report = replayer.replay().unwrap();
        assert_eq!(report.end_height, 4);
        let status = replayer.status().unwrap();
        assert_eq!(status, ReplayStatus {
            last_replayed_height: Some(4),
            target_height: 4,
            is_complete: true,
        });
        assert!(!db.has(&canonical_hash_key(5)).unwrap());
    }

    #[test]
    fn test_missing_block_aborts_without_continue() {
        let mut records = chain_records(5);
        records.retain(|(key, _)| *key != canonical_hash_key(3));
        records.push(legacy_head_record(5));
        let db = destination();
        let replayer = Replayer::builder()
            .source(ChainSource::new(source_store(records)))
            .destination(Arc::clone(&db))
            .config(config(2))
            .build();

        let err = replayer.replay().unwrap_err();
        assert!(matches!(err, ReplayError::MissingBlock { height: 3 }));
        // The batch before the gap is checkpointed.
        assert_eq!(replayer.checkpoint().unwrap(), Some(1));
    }

    #[test]
    fn test_continue_on_error_skips_bad_blocks() {
        let mut records = chain_records(5);
        records.retain(|(key, _)| *key != canonical_hash_key(3));
        records.push(legacy_head_record(5));
        let config = ReplayConfig::builder().batch_size(2).continue_on_error(true).build().unwrap();
        let replayer = Replayer::builder()
            .source(ChainSource::new(source_store(records)))
            .destination(destination())
            .config(config)
            .build();

        let report = replayer.replay().unwrap();
        assert_eq!(report.replayed, 5);
        assert_eq!(report.skipped, 1);
        assert!(replayer.is_complete().unwrap());
    }

    #[test]
    fn test_verification_rejects_zero_parent() {
        let mut block = ChainBlock::at(4);
        block.parent_hash = ZERO_HASH;
        let source = SourceBlock {
            height: 4,
            hash: Some(block.hash),
            parent_hash: Some(block.parent_hash),
            records: Vec::new(),
        };
        let err = verify_block(&source).unwrap_err();
        assert!(matches!(err, ReplayError::Verification { height: 4, .. }));

        let genesis = ChainBlock::at(0);
        let source = SourceBlock {
            height: 0,
            hash: Some(genesis.hash),
            parent_hash: Some(genesis.parent_hash),
            records: Vec::new(),
        };
        verify_block(&source).unwrap();
    }

    #[test]
    fn test_verification_skipped_without_hashes() {
        let source = SourceBlock { height: 3, hash: None, parent_hash: None, records: Vec::new() };
        verify_block(&source).unwrap();
    }

    #[test]
    fn test_tip_mismatch_is_detected() {
        let db = destination();
        let replayer = Replayer::builder()
            .source(SequentialSource::new(source_store(sequential_records(4)), "block-"))
            .destination(Arc::clone(&db))
            .build();
        replayer.replay().unwrap();

        db.put(b"block-3", b"tampered").unwrap();
        let err = replayer.replay().unwrap_err();
        assert!(matches!(err, ReplayError::TipRecordMismatch { height: 3, .. }));
    }

    #[test]
    fn test_checkpoint_past_source_tip_is_a_mismatch() {
        let db = destination();
        db.put(LAST_REPLAYED_HEIGHT_KEY, &encode_height(7)).unwrap();
        let replayer = Replayer::builder()
            .source(SequentialSource::new(source_store(sequential_records(4)), "block-"))
            .destination(Arc::clone(&db))
            .build();

        assert!(!replayer.is_complete().unwrap());
        let err = replayer.replay().unwrap_err();
        assert!(
            matches!(err, ReplayError::TipMismatch { expected: 3, found: Some(7) }),
            "{err}"
        );
    }

    #[test]
    fn test_skipped_tip_block_still_completes() {
        let mut records = chain_records(5);
        records.retain(|(key, _)| *key != canonical_hash_key(5));
        records.push(legacy_head_record(5));
        let config = ReplayConfig::builder().batch_size(2).continue_on_error(true).build().unwrap();
        let db = destination();
        let replayer = Replayer::builder()
            .source(ChainSource::new(source_store(records)))
            .destination(Arc::clone(&db))
            .config(config)
            .build();

        let report = replayer.replay().unwrap();
        assert_eq!(report.replayed, 5);
        assert_eq!(report.skipped, 1);
        assert_eq!(report.end_height, 5);
        assert!(replayer.is_complete().unwrap());
        assert!(!db.has(&canonical_hash_key(5)).unwrap());

        let again = replayer.replay().unwrap();
        assert!(again.already_complete);
    }

    #[test]
    fn test_intermediate_commits_respect_checkpoint() {
        let db = destination();
        let config = ReplayConfig::builder().batch_size(10).commit_interval(3).build().unwrap();
        let replayer = Replayer::builder()
            .source(SequentialSource::new(source_store(sequential_records(7)), "block-"))
            .destination(Arc::clone(&db))
            .config(config)
            .build();

        replayer.replay().unwrap();
        assert_eq!(replayer.checkpoint().unwrap(), Some(6));
        assert_eq!(db.get(b"block-6").unwrap(), b"data-6");
    }
}
