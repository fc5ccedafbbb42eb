//! Frequency-limiting decorator.

use crate::error::TriggerError;
use crate::timer::{NextFire, Timer, TimerInfo};
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Wraps a timer so it stops after a fixed number of occurrences.
///
/// The final occurrence is tagged [`NextFire::Last`] so callers can tell
/// it was the last fire without invoking the timer again; the call after
/// that returns `None`.
pub struct LimitFrequency<T> {
    inner: T,
    remaining: u32,
}

impl<T: Timer> LimitFrequency<T> {
    /// Limits `inner` to at most `max_count` occurrences.
    #[must_use]
    pub fn new(inner: T, max_count: u32) -> Self {
        Self {
            inner,
            remaining: max_count,
        }
    }
}

/// Decorator form of [`LimitFrequency::new`].
pub fn limit_frequency<T: Timer>(timer: T, max_count: u32) -> LimitFrequency<T> {
    LimitFrequency::new(timer, max_count)
}

#[async_trait]
impl<T: Timer> Timer for LimitFrequency<T> {
    async fn next(
        &mut self,
        cancel: &CancellationToken,
    ) -> Result<Option<TimerInfo>, TriggerError> {
        if self.remaining == 0 || cancel.is_cancelled() {
            return Ok(None);
        }

        let Some(mut info) = self.inner.next(cancel).await? else {
            return Ok(None);
        };

        self.remaining -= 1;
        if self.remaining == 0 {
            debug!("frequency limit reached, tagging final occurrence");
            info.next = NextFire::Last;
        }

        Ok(Some(info))
    }
}
