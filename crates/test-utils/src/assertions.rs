//! Polling assertions for background jobs.

use std::time::Duration;

use tokio::time::{Instant, sleep};

/// Default polling interval for [`assert_eventually`].
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Polls `condition` until it returns true or `timeout` expires.
///
/// Background jobs (archiver cycles, reclamation) run on their own
/// schedule; poll their observable effects instead of sleeping a fixed time.
///
/// Returns `true` if the condition held before the deadline. The condition
/// is checked one final time after the deadline passes.
///
/// # Example
///
/// ```no_run
/// use std::sync::{
///     Arc,
///     atomic::{AtomicU64, Ordering},
/// };
/// use std::time::Duration;
/// use tierdb_test_utils::assert_eventually;
///
/// # async fn example() {
/// let archived = Arc::new(AtomicU64::new(0));
/// let worker = Arc::clone(&archived);
/// tokio::spawn(async move {
///     tokio::time::sleep(Duration::from_millis(50)).await;
///     worker.store(14, Ordering::SeqCst);
/// });
///
/// let done = assert_eventually(Duration::from_secs(1), || {
///     archived.load(Ordering::SeqCst) == 14
/// })
/// .await;
/// assert!(done, "archive cycle should have run");
/// # }
/// ```
pub async fn assert_eventually<F>(timeout: Duration, condition: F) -> bool
where
    F: Fn() -> bool,
{
    let start = Instant::now();

    while start.elapsed() < timeout {
        if condition() {
            return true;
        }
        sleep(DEFAULT_POLL_INTERVAL).await;
    }

    condition()
}
