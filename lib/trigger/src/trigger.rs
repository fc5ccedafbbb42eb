//! Trigger assembly: factory functions producing ready-to-use triggers.
//!
//! A [`Trigger`] is a configured recurrence rule plus its derived timer,
//! identified for logging by a [`TriggerId`]. The factory functions here
//! cover the common shapes: one-shot, fixed interval, weekly, monthly,
//! yearly, and fire-on-host-start.

use crate::absolute::AbsoluteTimer;
use crate::clock::{Clock, system_clock};
use crate::cycle::CycleTimer;
use crate::error::TriggerError;
use crate::limit::limit_frequency;
use crate::plan::{MonthlyRule, PlanTimer, PlanTrigger, WeeklyRule, YearlyRule};
use crate::timer::{Timer, TimerInfo};
use cadenza_core::TriggerId;
use chrono::{DateTime, Duration, Month, NaiveTime, Utc, Weekday};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// A configured recurrence rule plus its derived timer.
pub struct Trigger {
    id: TriggerId,
    timer: Box<dyn Timer>,
}

impl Trigger {
    /// Wraps a custom timer (or decorator chain) as a trigger.
    #[must_use]
    pub fn from_timer(timer: impl Timer + 'static) -> Self {
        Self {
            id: TriggerId::new(),
            timer: Box::new(timer),
        }
    }

    /// The trigger's identifier.
    #[must_use]
    pub fn id(&self) -> TriggerId {
        self.id
    }

    /// Schedules the next occurrence; see [`Timer::next`].
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying schedule can no longer be
    /// evaluated.
    pub async fn next(
        &mut self,
        cancel: &CancellationToken,
    ) -> Result<Option<TimerInfo>, TriggerError> {
        let step = self.timer.next(cancel).await?;
        if step.is_none() {
            debug!(trigger_id = %self.id, "trigger exhausted");
        }
        Ok(step)
    }
}

/// A trigger firing exactly once, at `at`.
///
/// # Errors
///
/// Returns [`TriggerError::StartInPast`] if `at` has already passed.
pub fn once(at: DateTime<Utc>) -> Result<Trigger, TriggerError> {
    once_with(at, system_clock())
}

fn once_with(at: DateTime<Utc>, clock: Arc<dyn Clock>) -> Result<Trigger, TriggerError> {
    let now = clock.now();
    if at <= now {
        return Err(TriggerError::StartInPast { start: at, now });
    }
    let timer = AbsoluteTimer::new(at, Duration::days(1), clock)?;
    Ok(Trigger::from_timer(limit_frequency(timer, 1)))
}

/// A trigger firing every `every` starting at `begin`, optionally limited
/// to `count` occurrences. Without an interval it degrades to a one-shot
/// at `begin`.
///
/// # Errors
///
/// Returns an error if `begin` has passed or the interval is under 1ms.
pub fn interval(
    begin: DateTime<Utc>,
    every: Option<Duration>,
    count: Option<u32>,
) -> Result<Trigger, TriggerError> {
    interval_with(begin, every, count, system_clock())
}

fn interval_with(
    begin: DateTime<Utc>,
    every: Option<Duration>,
    count: Option<u32>,
    clock: Arc<dyn Clock>,
) -> Result<Trigger, TriggerError> {
    let Some(every) = every else {
        return once_with(begin, clock);
    };
    let now = clock.now();
    if begin <= now {
        return Err(TriggerError::StartInPast { start: begin, now });
    }
    let timer = AbsoluteTimer::new(begin, every, clock)?;
    Ok(match count {
        Some(count) => Trigger::from_timer(limit_frequency(timer, count)),
        None => Trigger::from_timer(timer),
    })
}

/// A weekly trigger: the given weekdays at `time`, every `interval_weeks`
/// weeks, anchored at `create_date` (default: now).
///
/// # Errors
///
/// Returns an error for an empty weekday set or a zero week interval.
pub fn weekly(
    weekdays: impl IntoIterator<Item = Weekday>,
    time: NaiveTime,
    count: Option<u32>,
    create_date: Option<DateTime<Utc>>,
    interval_weeks: u32,
) -> Result<Trigger, TriggerError> {
    weekly_with(weekdays, time, count, create_date, interval_weeks, system_clock())
}

fn weekly_with(
    weekdays: impl IntoIterator<Item = Weekday>,
    time: NaiveTime,
    count: Option<u32>,
    create_date: Option<DateTime<Utc>>,
    interval_weeks: u32,
    clock: Arc<dyn Clock>,
) -> Result<Trigger, TriggerError> {
    let create_date = create_date.unwrap_or_else(|| clock.now());
    let rule = WeeklyRule::new(weekdays, time, create_date, interval_weeks)?;
    let plan = PlanTrigger::new(rule, create_date, count);
    Ok(Trigger::from_timer(PlanTimer::new(plan, clock)))
}

/// A monthly trigger: the given days of the month at `time`, every
/// `interval_months` months, anchored at `create_date` (default: now).
/// Days invalid for a month (the 31st in a 30-day month) are skipped for
/// that month, never clamped.
///
/// # Errors
///
/// Returns an error for an empty or out-of-range day set or a zero month
/// interval.
pub fn monthly(
    days: impl IntoIterator<Item = u32>,
    time: NaiveTime,
    count: Option<u32>,
    create_date: Option<DateTime<Utc>>,
    interval_months: u32,
) -> Result<Trigger, TriggerError> {
    monthly_with(days, time, count, create_date, interval_months, system_clock())
}

fn monthly_with(
    days: impl IntoIterator<Item = u32>,
    time: NaiveTime,
    count: Option<u32>,
    create_date: Option<DateTime<Utc>>,
    interval_months: u32,
    clock: Arc<dyn Clock>,
) -> Result<Trigger, TriggerError> {
    let create_date = create_date.unwrap_or_else(|| clock.now());
    let rule = MonthlyRule::new(days, time, create_date, interval_months)?;
    let plan = PlanTrigger::new(rule, create_date, count);
    Ok(Trigger::from_timer(PlanTimer::new(plan, clock)))
}

/// A yearly trigger: every `(month, day)` combination at `time`, anchored
/// at `create_date` (default: now).
///
/// # Errors
///
/// Returns an error for empty or out-of-range month or day sets.
pub fn yearly(
    time: NaiveTime,
    months: impl IntoIterator<Item = Month>,
    days: impl IntoIterator<Item = u32>,
    count: Option<u32>,
    create_date: Option<DateTime<Utc>>,
) -> Result<Trigger, TriggerError> {
    yearly_with(time, months, days, count, create_date, system_clock())
}

fn yearly_with(
    time: NaiveTime,
    months: impl IntoIterator<Item = Month>,
    days: impl IntoIterator<Item = u32>,
    count: Option<u32>,
    create_date: Option<DateTime<Utc>>,
    clock: Arc<dyn Clock>,
) -> Result<Trigger, TriggerError> {
    let create_date = create_date.unwrap_or_else(|| clock.now());
    let rule = YearlyRule::new(time, months, days, create_date)?;
    let plan = PlanTrigger::new(rule, create_date, count);
    Ok(Trigger::from_timer(PlanTimer::new(plan, clock)))
}

/// A trigger firing exactly once, immediately, when the host starts its
/// consumer loop.
///
/// # Errors
///
/// Construction cannot fail in practice; the `Result` keeps the factory
/// surface uniform.
pub fn on_host_start() -> Result<Trigger, TriggerError> {
    on_host_start_with(system_clock())
}

fn on_host_start_with(clock: Arc<dyn Clock>) -> Result<Trigger, TriggerError> {
    let timer = CycleTimer::new(None, Duration::days(1), true, clock)?;
    Ok(Trigger::from_timer(limit_frequency(timer, 1)))
}
