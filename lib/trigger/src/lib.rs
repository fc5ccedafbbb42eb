//! Recurring trigger timers for the cadenza library.
//!
//! The core contract is [`Timer`]: given a cancellation handle, one call
//! yields either exhaustion or a [`TimerInfo`] — an awaitable handle to the
//! next occurrence plus the timestamp of the occurrence after that. On top
//! of it this crate provides:
//!
//! - **Base timers**: [`CycleTimer`] (fixed interval) and [`AbsoluteTimer`]
//!   (drift-free absolute scheduling)
//! - **Decorators**: [`limit_frequency`] (stop after N fires),
//!   [`only_appoint_date`] (calendar-date predicate gating) and
//!   [`only_weekday_or_holiday`] (holiday-judgment gating)
//! - **Calendar plans**: weekly/monthly/yearly [`RecurrenceRule`]s driven
//!   through [`PlanTrigger`] and [`PlanTimer`]
//! - **Factories**: [`once`], [`interval`], [`weekly`], [`monthly`],
//!   [`yearly`], [`on_host_start`]
//!
//! Consumers drive a trigger with a single sequential loop: call `next`,
//! await the returned wait handle, run the task if it resolved `Ok(true)`,
//! repeat. Cancelling the shared token resolves any pending wait promptly
//! and exhausts every timer in the chain.

pub mod absolute;
pub mod clock;
pub mod cycle;
pub mod error;
pub mod gate;
pub mod limit;
pub mod plan;
pub mod timer;
pub mod trigger;

pub use absolute::AbsoluteTimer;
pub use clock::{Clock, SystemClock, system_clock};
pub use cycle::CycleTimer;
pub use error::TriggerError;
pub use gate::{
    DatePredicate, HolidayJudge, OnlyAppointDate, only_appoint_date, only_weekday_or_holiday,
};
pub use limit::{LimitFrequency, limit_frequency};
pub use plan::{MonthlyRule, PlanTimer, PlanTrigger, RecurrenceRule, WeeklyRule, YearlyRule};
pub use timer::{NextFire, Timer, TimerInfo, WaitFuture};
pub use trigger::{Trigger, interval, monthly, on_host_start, once, weekly, yearly};
