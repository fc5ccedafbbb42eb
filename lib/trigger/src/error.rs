//! Error types for the trigger crate.
//!
//! Configuration problems are caught when a timer or rule is constructed
//! and abort creation synchronously. Failures of the external holiday or
//! date-predicate collaborator surface through the `Judgment` variant from
//! inside a pending wait. Cancellation and exhaustion are not errors: a
//! cancelled wait resolves to `Ok(false)` and an exhausted timer returns
//! `Ok(None)` forever after.

use chrono::{DateTime, Duration, Utc};
use std::fmt;

/// Errors from trigger and recurrence-rule construction or evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TriggerError {
    /// Interval below the minimum scheduling granularity of one millisecond.
    IntervalTooSmall { interval_ms: i64 },
    /// Configured start time is already in the past.
    StartInPast {
        start: DateTime<Utc>,
        now: DateTime<Utc>,
    },
    /// A recurrence rule was given an empty weekday, day, or month set.
    EmptySchedule { field: &'static str },
    /// A week or month interval of zero.
    InvalidInterval { field: &'static str },
    /// Day of month outside 1..=31.
    InvalidDayOfMonth { day: u32 },
    /// Month outside 1..=12.
    InvalidMonth { month: u32 },
    /// The external date judgment (holiday lookup or custom predicate) failed.
    Judgment { reason: String },
}

impl TriggerError {
    /// Validates an interval against the 1ms minimum granularity.
    pub(crate) fn check_interval(interval: Duration) -> Result<(), Self> {
        let interval_ms = interval.num_milliseconds();
        if interval_ms < 1 {
            return Err(Self::IntervalTooSmall { interval_ms });
        }
        Ok(())
    }
}

impl fmt::Display for TriggerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::IntervalTooSmall { interval_ms } => {
                write!(f, "interval of {interval_ms}ms is below the 1ms minimum")
            }
            Self::StartInPast { start, now } => {
                write!(f, "start time {start} is in the past (now: {now})")
            }
            Self::EmptySchedule { field } => {
                write!(f, "recurrence rule has an empty {field} set")
            }
            Self::InvalidInterval { field } => {
                write!(f, "recurrence {field} must be at least 1")
            }
            Self::InvalidDayOfMonth { day } => {
                write!(f, "day of month {day} is outside 1..=31")
            }
            Self::InvalidMonth { month } => {
                write!(f, "month {month} is outside 1..=12")
            }
            Self::Judgment { reason } => {
                write!(f, "date judgment failed: {reason}")
            }
        }
    }
}

impl std::error::Error for TriggerError {}
