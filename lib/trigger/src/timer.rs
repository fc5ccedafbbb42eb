//! The timer contract: one scheduling step at a time.
//!
//! A [`Timer`] is invoked by a single consumer in a strict
//! await-then-call-again loop: call [`Timer::next`], await the returned
//! [`TimerInfo::wait`], run the scheduled task if it resolved `Ok(true)`,
//! then call `next` again. Decorators wrap a timer and intercept this loop
//! without changing the contract.

use crate::error::TriggerError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::{self, BoxFuture, FutureExt};
use tokio_util::sync::CancellationToken;

/// The awaitable handle for one occurrence.
///
/// Resolves `Ok(true)` when the occurrence fires, `Ok(false)` when the
/// chain was cancelled before firing, and `Err(_)` when a mid-schedule
/// failure (such as a holiday-judgment error) interrupts the wait. The
/// future is lazy: nothing runs in the background until it is awaited, so
/// dropping it leaks no delays.
pub type WaitFuture = BoxFuture<'static, Result<bool, TriggerError>>;

/// The timestamp of the occurrence *after* the one just scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextFire {
    /// The following occurrence is known.
    At(DateTime<Utc>),
    /// The occurrence just scheduled is the final one.
    Last,
    /// The following occurrence cannot be determined up front, e.g. because
    /// a calendar predicate may skip an unknown number of days.
    Unknown,
}

impl NextFire {
    /// Returns the known timestamp, if any.
    #[must_use]
    pub fn at(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::At(ts) => Some(*ts),
            Self::Last | Self::Unknown => None,
        }
    }

    /// Returns true if the occurrence just scheduled was the final one.
    #[must_use]
    pub fn is_last(&self) -> bool {
        matches!(self, Self::Last)
    }
}

/// The result of one scheduling step.
///
/// Created fresh on every [`Timer::next`] invocation and never reused. If
/// `wait` resolves `Ok(false)` the caller must not execute the scheduled
/// task for that step.
pub struct TimerInfo {
    /// Resolves when the occurrence fires or the chain is cancelled.
    pub wait: WaitFuture,
    /// The occurrence after this one.
    pub next: NextFire,
}

impl TimerInfo {
    /// Builds a step from a wait future and the following occurrence.
    #[must_use]
    pub fn new(wait: WaitFuture, next: NextFire) -> Self {
        Self { wait, next }
    }

    /// Builds a step whose occurrence has already fired.
    #[must_use]
    pub fn already_fired(next: NextFire) -> Self {
        Self {
            wait: future::ready(Ok(true)).boxed(),
            next,
        }
    }
}

impl std::fmt::Debug for TimerInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimerInfo")
            .field("next", &self.next)
            .finish_non_exhaustive()
    }
}

/// A source of recurring occurrences.
///
/// `next` returns `Ok(None)` once the timer is exhausted; every later call
/// must keep returning `Ok(None)` without scheduling anything. A timer owns
/// its scheduling state exclusively and assumes a single sequential
/// consumer, which the `&mut self` receiver makes explicit.
#[async_trait]
pub trait Timer: Send {
    /// Schedules the next occurrence, or reports exhaustion.
    ///
    /// If `cancel` is already signalled this returns `Ok(None)` immediately.
    ///
    /// # Errors
    ///
    /// Returns an error if the timer's schedule can no longer be evaluated.
    async fn next(&mut self, cancel: &CancellationToken)
    -> Result<Option<TimerInfo>, TriggerError>;
}
