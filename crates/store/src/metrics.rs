//! Metrics for the tiered storage engine.
//!
//! Uses the `metrics` crate facade; the embedding application installs the
//! exporter. All helpers are cheap no-ops when no recorder is installed.

use metrics::{counter, gauge, histogram};

// ─── Key-Value Store Metrics ──────────────────────────────────

/// Committed write transactions (counter).
///
/// Labels: `kind` = put | delete | delete_range | batch
const KV_WRITES_TOTAL: &str = "tierdb_kv_writes_total";

/// Operations applied by committed batches (counter).
const KV_BATCH_OPS_TOTAL: &str = "tierdb_kv_batch_ops_total";

/// Key and value bytes applied by committed batches (counter).
const KV_BATCH_BYTES_TOTAL: &str = "tierdb_kv_batch_bytes_total";

// ─── Tier Routing Metrics ─────────────────────────────────────

/// Reads served per tier (counter).
///
/// Labels: `tier` = current | archive
const TIER_READS_TOTAL: &str = "tierdb_tier_reads_total";

/// Highest height known to live immutably in the archive tier (gauge).
const FINALITY_HEIGHT: &str = "tierdb_finality_height";

// ─── Ancient Store Metrics ────────────────────────────────────

/// Exclusive upper bound of the ancient store (gauge).
const ANCIENT_HEAD: &str = "tierdb_ancient_head";

/// Inclusive lower bound of the ancient store (gauge).
const ANCIENT_TAIL: &str = "tierdb_ancient_tail";

/// Bytes appended to the ancient store (counter).
const ANCIENT_BYTES_WRITTEN_TOTAL: &str = "tierdb_ancient_bytes_written_total";

// ─── Replay Metrics ───────────────────────────────────────────

/// Last checkpointed replay height (gauge).
const REPLAY_HEIGHT: &str = "tierdb_replay_height";

/// Blocks replayed (counter).
///
/// Labels: `result` = copied | skipped
const REPLAY_BLOCKS_TOTAL: &str = "tierdb_replay_blocks_total";

/// Replay throughput over the most recent batch, blocks per second (gauge).
const REPLAY_BLOCKS_PER_SECOND: &str = "tierdb_replay_blocks_per_second";

// ─── Background Job Metrics ───────────────────────────────────

/// Duration of a background job cycle (histogram).
///
/// Labels: `job` = reclaim | archiver | freezer
const BACKGROUND_JOB_DURATION_SECONDS: &str = "tierdb_background_job_duration_seconds";

/// Total number of background job cycle runs (counter).
///
/// Labels: `job`, `result` = success | failure
const BACKGROUND_JOB_RUNS_TOTAL: &str = "tierdb_background_job_runs_total";

/// Total items processed by background jobs (counter).
///
/// Labels: `job`
///
/// Meaning per job:
/// - `archiver`: keys moved to the archive tier
/// - `freezer`: blocks moved to the ancient store
const BACKGROUND_JOB_ITEMS_PROCESSED_TOTAL: &str = "tierdb_background_job_items_processed_total";

/// Records a committed single-key or range write.
#[inline]
pub fn record_kv_write(kind: &'static str) {
    counter!(KV_WRITES_TOTAL, "kind" => kind).increment(1);
}

/// Records a committed batch.
#[inline]
pub fn record_batch_commit(ops: usize, bytes: usize) {
    counter!(KV_WRITES_TOTAL, "kind" => "batch").increment(1);
    counter!(KV_BATCH_OPS_TOTAL).increment(ops as u64);
    counter!(KV_BATCH_BYTES_TOTAL).increment(bytes as u64);
}

/// Records a read served by `tier`.
#[inline]
pub fn record_tier_read(tier: &'static str) {
    counter!(TIER_READS_TOTAL, "tier" => tier).increment(1);
}

/// Sets the finality height gauge.
#[inline]
pub fn set_finality_height(height: u64) {
    gauge!(FINALITY_HEIGHT).set(height as f64);
}

/// Sets the ancient bound gauges.
#[inline]
pub fn set_ancient_bounds(tail: u64, ancients: u64) {
    gauge!(ANCIENT_TAIL).set(tail as f64);
    gauge!(ANCIENT_HEAD).set(ancients as f64);
}

/// Records bytes appended to the ancient store.
#[inline]
pub fn record_ancient_bytes_written(bytes: u64) {
    counter!(ANCIENT_BYTES_WRITTEN_TOTAL).increment(bytes);
}

/// Records replay progress after a checkpointed batch.
#[inline]
pub fn record_replay_batch(height: u64, copied: u64, skipped: u64, blocks_per_second: f64) {
    gauge!(REPLAY_HEIGHT).set(height as f64);
    gauge!(REPLAY_BLOCKS_PER_SECOND).set(blocks_per_second);
    counter!(REPLAY_BLOCKS_TOTAL, "result" => "copied").increment(copied);
    if skipped > 0 {
        counter!(REPLAY_BLOCKS_TOTAL, "result" => "skipped").increment(skipped);
    }
}

/// Records the duration of a background job cycle.
#[inline]
pub fn record_background_job_duration(job: &'static str, duration_secs: f64) {
    histogram!(BACKGROUND_JOB_DURATION_SECONDS, "job" => job).record(duration_secs);
}

/// Records a completed background job cycle.
///
/// `result` must be `"success"` or `"failure"`.
#[inline]
pub fn record_background_job_run(job: &'static str, result: &'static str) {
    counter!(BACKGROUND_JOB_RUNS_TOTAL, "job" => job, "result" => result).increment(1);
}

/// Records items processed by a background job cycle.
#[inline]
pub fn record_background_job_items(job: &'static str, count: u64) {
    counter!(BACKGROUND_JOB_ITEMS_PROCESSED_TOTAL, "job" => job).increment(count);
}
