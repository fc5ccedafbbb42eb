//! Absolute-time timer.
//!
//! Chaining relative sleeps accumulates scheduling error: each sleep is
//! measured from "now", so per-fire overhead compounds over a long run.
//! [`AbsoluteTimer`] instead recomputes the absolute target instant as
//! `start + elapsed_count * interval` on every call, keeping fire `k`
//! pinned to `start + k * interval` no matter how slow the consumer is
//! between calls.

use crate::clock::{self, Clock};
use crate::error::TriggerError;
use crate::timer::{NextFire, Timer, TimerInfo};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use futures::future::FutureExt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// A drift-free timer firing at `start + k * interval` for `k = 0, 1, …`.
///
/// A consumer that falls behind gets immediate catch-up fires (one per
/// missed occurrence) rather than an error, preserving the occurrence
/// count and the absolute cadence.
pub struct AbsoluteTimer {
    start: DateTime<Utc>,
    interval: Duration,
    /// Number of occurrences handed out so far. Kept fractional so a
    /// pre-start wait can consume part of a step.
    elapsed_count: f64,
    clock: Arc<dyn Clock>,
}

impl AbsoluteTimer {
    /// Creates a timer anchored at `start`, firing every `interval`.
    ///
    /// # Errors
    ///
    /// Returns [`TriggerError::IntervalTooSmall`] for intervals under 1ms.
    pub fn new(
        start: DateTime<Utc>,
        interval: Duration,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, TriggerError> {
        TriggerError::check_interval(interval)?;
        Ok(Self {
            start,
            interval,
            elapsed_count: 0.0,
            clock,
        })
    }

    fn offset(&self, count: f64) -> Duration {
        let ms = self.interval.num_milliseconds() as f64 * count;
        Duration::milliseconds(ms.round() as i64)
    }
}

#[async_trait]
impl Timer for AbsoluteTimer {
    async fn next(
        &mut self,
        cancel: &CancellationToken,
    ) -> Result<Option<TimerInfo>, TriggerError> {
        if cancel.is_cancelled() {
            return Ok(None);
        }

        let now = self.clock.now();

        // Before the anchor the first occurrence is `start` itself, which
        // may be less than a full interval away.
        let target = if now < self.start {
            self.start
        } else {
            self.start + self.offset(self.elapsed_count)
        };
        self.elapsed_count += 1.0;
        let upcoming = self.start + self.offset(self.elapsed_count);

        let span = target - now;
        if span <= Duration::zero() {
            warn!(target = %target, now = %now, "absolute timer behind schedule, firing immediately");
        } else {
            debug!(target = %target, "absolute timer scheduling occurrence");
        }

        let clock = Arc::clone(&self.clock);
        let cancel = cancel.clone();
        let wait = async move { Ok(clock::wait_for(&clock, span, &cancel).await) }.boxed();

        Ok(Some(TimerInfo::new(wait, NextFire::At(upcoming))))
    }
}
