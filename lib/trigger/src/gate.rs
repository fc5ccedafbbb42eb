//! Calendar-date gating decorators.
//!
//! [`OnlyAppointDate`] only lets an inner timer's occurrences through on
//! calendar dates an asynchronous predicate accepts. A fire landing on a
//! rejected date is silently carried across midnight, day by day, until the
//! predicate accepts or the inner timer runs out of occurrences.
//! [`only_weekday_or_holiday`] specializes the predicate to an external
//! holiday judgment.

use crate::clock::{self, Clock};
use crate::error::TriggerError;
use crate::timer::{NextFire, Timer, TimerInfo};
use async_trait::async_trait;
use chrono::{NaiveDate, NaiveTime};
use futures::future::{BoxFuture, FutureExt};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Asynchronous calendar-date predicate.
///
/// Called with the candidate date and the number of days skipped since the
/// last accepted date; resolves `Ok(true)` to let the occurrence through.
/// Failures propagate unmodified to the caller awaiting the occurrence.
pub type DatePredicate =
    Arc<dyn Fn(NaiveDate, u32) -> BoxFuture<'static, Result<bool, TriggerError>> + Send + Sync>;

/// Asynchronous holiday judgment supplied by the host.
pub type HolidayJudge =
    Arc<dyn Fn(NaiveDate) -> BoxFuture<'static, Result<bool, TriggerError>> + Send + Sync>;

/// Gates an inner timer's occurrences on a calendar-date predicate.
///
/// When a fire lands on a rejected date the decorator waits until the next
/// midnight, pulls a fresh occurrence from the inner timer, and tries
/// again; the skipping runs as an explicit loop inside the returned wait
/// future, so an arbitrarily long run of rejected days costs no stack. The
/// inner timer and the last-accepted date sit behind mutexes only so that
/// the wait future can drive re-invocation; the single-consumer contract
/// keeps them uncontended.
pub struct OnlyAppointDate {
    inner: Arc<Mutex<Box<dyn Timer>>>,
    can_continue: DatePredicate,
    last_accepted: Arc<Mutex<NaiveDate>>,
    clock: Arc<dyn Clock>,
}

impl OnlyAppointDate {
    /// Wraps `inner`, admitting only dates accepted by `can_continue`.
    ///
    /// The last-accepted date starts at today, so the first skip run
    /// reports one skipped day per midnight crossed since construction.
    #[must_use]
    pub fn new(
        inner: impl Timer + 'static,
        can_continue: DatePredicate,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let today = clock.now().date_naive();
        Self {
            inner: Arc::new(Mutex::new(Box::new(inner))),
            can_continue,
            last_accepted: Arc::new(Mutex::new(today)),
            clock,
        }
    }
}

#[async_trait]
impl Timer for OnlyAppointDate {
    async fn next(
        &mut self,
        cancel: &CancellationToken,
    ) -> Result<Option<TimerInfo>, TriggerError> {
        if cancel.is_cancelled() {
            return Ok(None);
        }

        let first = { self.inner.lock().await.next(cancel).await? };
        let Some(first) = first else {
            return Ok(None);
        };

        let inner = Arc::clone(&self.inner);
        let can_continue = Arc::clone(&self.can_continue);
        let last_accepted = Arc::clone(&self.last_accepted);
        let clock = Arc::clone(&self.clock);
        let cancel = cancel.clone();

        let wait = async move {
            let mut wait = first.wait;
            let mut next = first.next;
            loop {
                if !wait.await? {
                    return Ok(false);
                }

                let today = clock.now().date_naive();
                let skipped = {
                    let last = *last_accepted.lock().await;
                    (today - last).num_days().max(0) as u32
                };
                if (can_continue)(today, skipped).await? {
                    *last_accepted.lock().await = today;
                    return Ok(true);
                }
                if next.is_last() {
                    debug!(date = %today, "date rejected and inner timer exhausted");
                    return Ok(false);
                }

                debug!(date = %today, skipped, "date rejected, carrying fire across midnight");
                let Some(tomorrow) = today.succ_opt() else {
                    return Ok(false);
                };
                let midnight = tomorrow.and_time(NaiveTime::MIN).and_utc();
                let delay = midnight - clock.now();
                if !clock::wait_for(&clock, delay, &cancel).await {
                    return Ok(false);
                }

                let step = { inner.lock().await.next(&cancel).await? };
                match step {
                    Some(info) => {
                        wait = info.wait;
                        next = info.next;
                    }
                    None => return Ok(false),
                }
            }
        }
        .boxed();

        // The true next accepted date is unknowable without running the
        // predicate over future days.
        Ok(Some(TimerInfo::new(wait, NextFire::Unknown)))
    }
}

/// Decorator form of [`OnlyAppointDate::new`].
pub fn only_appoint_date(
    timer: impl Timer + 'static,
    can_continue: DatePredicate,
    clock: Arc<dyn Clock>,
) -> OnlyAppointDate {
    OnlyAppointDate::new(timer, can_continue, clock)
}

/// Gates a timer on the host's holiday judgment.
///
/// With `only_holiday` false the timer fires on working days and skips
/// holidays; with it true, the reverse.
pub fn only_weekday_or_holiday(
    timer: impl Timer + 'static,
    is_holiday: HolidayJudge,
    only_holiday: bool,
    clock: Arc<dyn Clock>,
) -> OnlyAppointDate {
    let can_continue: DatePredicate = Arc::new(move |date, _skipped| {
        let is_holiday = Arc::clone(&is_holiday);
        async move { Ok(is_holiday(date).await? == only_holiday) }.boxed()
    });
    OnlyAppointDate::new(timer, can_continue, clock)
}
