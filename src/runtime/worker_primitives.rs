use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

/// Pause after a queue error before polling again.
pub(crate) const QUEUE_ERROR_BACKOFF: Duration = Duration::from_secs(1);
pub(crate) const STOP_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Sleeps in short steps so a raised stop flag is noticed promptly.
/// Returns `false` when stopped.
pub(crate) fn sleep_with_stop(stop: &AtomicBool, total: Duration) -> bool {
    let mut remaining = total;
    while remaining > Duration::ZERO {
        if stop.load(Ordering::Relaxed) {
            return false;
        }
        let step = remaining.min(STOP_POLL_INTERVAL);
        thread::sleep(step);
        remaining = remaining.saturating_sub(step);
    }
    !stop.load(Ordering::Relaxed)
}
