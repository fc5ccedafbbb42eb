//! Clock abstraction for timestamp reads and delays.
//!
//! Timers take their notion of "now" and their sleeps from a [`Clock`] so
//! that calendar-crossing behavior (weekend skips, drift properties) can be
//! exercised deterministically in tests. Production code uses
//! [`SystemClock`], which reads `Utc::now()` and delegates delays to tokio.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Source of the current time and of awaitable delays.
#[async_trait]
pub trait Clock: Send + Sync {
    /// Returns the current timestamp.
    fn now(&self) -> DateTime<Utc>;

    /// Suspends for the given duration.
    async fn sleep(&self, duration: std::time::Duration);
}

/// The production clock: wall-clock time and tokio delays.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

#[async_trait]
impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    async fn sleep(&self, duration: std::time::Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Returns a shared handle to the production clock.
#[must_use]
pub fn system_clock() -> Arc<dyn Clock> {
    Arc::new(SystemClock)
}

/// Waits out `delay` on `clock`, resolving early on cancellation.
///
/// Returns `true` if the delay elapsed and `false` if the token was
/// cancelled first. A non-positive delay counts as already elapsed, so a
/// late caller fires immediately instead of erroring; cancellation still
/// wins if it is already signalled.
pub(crate) async fn wait_for(
    clock: &Arc<dyn Clock>,
    delay: Duration,
    cancel: &CancellationToken,
) -> bool {
    if cancel.is_cancelled() {
        return false;
    }
    let Ok(delay) = delay.to_std() else {
        // Negative delay: the target has already passed.
        return true;
    };
    tokio::select! {
        biased;
        () = cancel.cancelled() => false,
        () = clock.sleep(delay) => true,
    }
}
