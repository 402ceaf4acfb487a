//! Background space reclamation for read-write stores.
//!
//! A tokio task wakes every `reclaim_interval` and compacts the store file on
//! the blocking pool. Compaction cannot run while iterators or snapshots hold
//! read transactions; such cycles are skipped and retried on the next tick.
//!
//! The task holds only a weak reference to the store, so dropping the last
//! handle ends the loop even if `close` was never called. Stores opened
//! outside a tokio runtime run without reclamation.

use std::{
    sync::{Arc, Weak},
    time::{Duration, Instant},
};

use parking_lot::Mutex;
use tokio::{
    runtime::Handle,
    sync::mpsc,
    task::JoinHandle,
    time::{self, MissedTickBehavior},
};
use tracing::{debug, warn};

use crate::{error::Error, kv::StoreInner, metrics};

const JOB: &str = "reclaim";

/// Handle to a running reclamation task.
pub(crate) struct Reclaimer {
    shutdown: Option<mpsc::Sender<()>>,
    /// Held for the duration of every cycle; `true` once stopped.
    stopped: Arc<Mutex<bool>>,
    handle: JoinHandle<()>,
}

impl Reclaimer {
    /// Spawns the reclamation task on the current tokio runtime.
    ///
    /// Returns `None` outside a runtime.
    pub(crate) fn spawn(store: Weak<StoreInner>, interval: Duration) -> Option<Self> {
        let Ok(runtime) = Handle::try_current() else {
            warn!("Reclamation disabled: no tokio runtime");
            return None;
        };
        let (shutdown, shutdown_rx) = mpsc::channel(1);
        let stopped = Arc::new(Mutex::new(false));
        let handle = runtime.spawn(run(store, interval, shutdown_rx, Arc::clone(&stopped)));
        debug!(interval_secs = interval.as_secs_f64(), "Reclamation task started");
        Some(Self { shutdown: Some(shutdown), stopped, handle })
    }

    /// Signals the task and waits for an in-flight cycle to finish.
    ///
    /// No cycle starts after this returns. The task itself exits on its next
    /// poll.
    pub(crate) fn shutdown(mut self) {
        drop(self.shutdown.take());
        *self.stopped.lock() = true;
        if self.handle.is_finished() {
            debug!("Reclamation task already exited");
        }
    }
}

async fn run(
    store: Weak<StoreInner>,
    interval: Duration,
    mut shutdown: mpsc::Receiver<()>,
    stopped: Arc<Mutex<bool>>,
) {
    let mut ticker = time::interval_at(time::Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;
            _ = shutdown.recv() => {
                debug!("Reclamation task received shutdown");
                break;
            }
            _ = ticker.tick() => {
                let store = store.clone();
                let stopped = Arc::clone(&stopped);
                let cycle = tokio::task::spawn_blocking(move || {
                    let guard = stopped.lock();
                    if *guard {
                        return false;
                    }
                    let Some(store) = store.upgrade() else {
                        return false;
                    };
                    run_cycle(&store);
                    true
                });
                match cycle.await {
                    Ok(true) => {},
                    Ok(false) => break,
                    Err(e) => warn!(error = %e, "Reclamation cycle panicked"),
                }
            }
        }
    }
    debug!("Reclamation task stopped");
}

/// Runs one compaction cycle. Returns whether compaction ran.
fn run_cycle(store: &StoreInner) -> bool {
    let start = Instant::now();
    let result = store.compact();
    if matches!(result, Err(Error::Closed)) {
        return false;
    }
    let duration = start.elapsed().as_secs_f64();
    store.record_reclaim_cycle();
    metrics::record_background_job_duration(JOB, duration);

    match result {
        Ok(compacted) => {
            metrics::record_background_job_run(JOB, "success");
            debug!(compacted, duration_secs = duration, "Reclamation cycle complete");
            compacted
        },
        Err(e @ Error::Compaction { .. }) => {
            // Open readers; retried next tick.
            metrics::record_background_job_run(JOB, "success");
            debug!(reason = %e, "Reclamation cycle skipped");
            false
        },
        Err(e) => {
            metrics::record_background_job_run(JOB, "failure");
            warn!(error = %e, "Reclamation cycle failed");
            false
        },
    }
}
