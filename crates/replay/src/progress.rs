//! Replay throughput and ETA tracking.

use std::time::{Duration, Instant};

/// Rate and remaining-time estimate for one replay run.
#[derive(Debug, Clone)]
pub(crate) struct Progress {
    started: Instant,
    target: u64,
    processed: u64,
}

/// One progress sample, taken after a batch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Sample {
    /// Blocks per second since the run started.
    pub blocks_per_second: f64,
    /// Estimated time to reach the target, if the rate is known.
    pub eta: Option<Duration>,
}

impl Progress {
    pub(crate) fn new(target: u64) -> Self {
        Self { started: Instant::now(), target, processed: 0 }
    }

    /// Records `blocks` more processed blocks, the last at `height`.
    pub(crate) fn advance(&mut self, height: u64, blocks: u64) -> Sample {
        self.processed += blocks;
        self.sample(height, self.started.elapsed())
    }

    fn sample(&self, height: u64, elapsed: Duration) -> Sample {
        let secs = elapsed.as_secs_f64();
        if secs <= 0.0 || self.processed == 0 {
            return Sample { blocks_per_second: 0.0, eta: None };
        }
        let blocks_per_second = self.processed as f64 / secs;
        let remaining = self.target.saturating_sub(height);
        let eta = Duration::try_from_secs_f64(remaining as f64 / blocks_per_second).ok();
        Sample { blocks_per_second, eta }
    }
}
