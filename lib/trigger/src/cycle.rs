//! Fixed-interval timer.

use crate::clock::{self, Clock};
use crate::error::TriggerError;
use crate::timer::{NextFire, Timer, TimerInfo};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use futures::future::FutureExt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// A timer firing at a fixed interval from an optional start time.
///
/// With `immediate` set, the first call fires right away and subsequent
/// occurrences follow at `interval` from that moment. The next fire time is
/// advanced by whole intervals rather than re-measured from "now", so
/// consumer overhead does not accumulate across fires. A target that has
/// already passed when the consumer catches up fires immediately; see
/// [`AbsoluteTimer`](crate::absolute::AbsoluteTimer) for the same policy.
pub struct CycleTimer {
    next_fire: DateTime<Utc>,
    interval: Duration,
    immediate: bool,
    clock: Arc<dyn Clock>,
}

impl CycleTimer {
    /// Creates a timer firing every `interval`, first at `start` (or one
    /// interval from now when `start` is `None`).
    ///
    /// # Errors
    ///
    /// Returns [`TriggerError::IntervalTooSmall`] for intervals under 1ms.
    pub fn new(
        start: Option<DateTime<Utc>>,
        interval: Duration,
        immediate: bool,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, TriggerError> {
        TriggerError::check_interval(interval)?;
        let next_fire = start.unwrap_or_else(|| clock.now() + interval);
        Ok(Self {
            next_fire,
            interval,
            immediate,
            clock,
        })
    }
}

#[async_trait]
impl Timer for CycleTimer {
    async fn next(
        &mut self,
        cancel: &CancellationToken,
    ) -> Result<Option<TimerInfo>, TriggerError> {
        if cancel.is_cancelled() {
            return Ok(None);
        }

        let now = self.clock.now();

        if self.immediate {
            self.immediate = false;
            self.next_fire = now + self.interval;
            debug!(next_fire = %self.next_fire, "cycle timer firing immediately");
            return Ok(Some(TimerInfo::already_fired(NextFire::At(self.next_fire))));
        }

        let target = self.next_fire;
        self.next_fire = target + self.interval;
        let upcoming = self.next_fire;

        let delay = target - now;
        if delay <= Duration::zero() {
            warn!(target = %target, now = %now, "cycle timer target already passed, firing immediately");
        } else {
            debug!(target = %target, "cycle timer scheduling occurrence");
        }

        let clock = Arc::clone(&self.clock);
        let cancel = cancel.clone();
        let wait = async move { Ok(clock::wait_for(&clock, delay, &cancel).await) }.boxed();

        Ok(Some(TimerInfo::new(wait, NextFire::At(upcoming))))
    }
}
