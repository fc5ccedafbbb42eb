//! Calendar recurrence rules and their timer adapter.
//!
//! A [`RecurrenceRule`] computes the next absolute occurrence of a
//! weekly/monthly/yearly schedule; [`PlanTrigger`] adds the repeat counter
//! and exposes the `next_date` entry point; [`PlanTimer`] adapts a plan to
//! the [`Timer`] contract.
//!
//! Rules are pure: they carry no "already fired" state and may be queried
//! repeatedly. Invalid calendar combinations (day 31 in a 30-day month,
//! Feb 30) are skipped outright rather than clamped, so a rule asking for
//! the 31st never silently fires on the 30th.

use crate::clock::{self, Clock};
use crate::error::TriggerError;
use crate::timer::{NextFire, Timer, TimerInfo};
use async_trait::async_trait;
use chrono::{DateTime, Datelike, Duration, Month, NaiveDate, NaiveTime, Utc, Weekday};
use futures::future::FutureExt;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// How far the bounded searches look before declaring a rule dead.
///
/// Monthly: enough interval blocks to cover day/month mismatches such as
/// `{31}` with several short months in a row. Yearly: covers Feb 29.
const MONTH_SEARCH_SLACK: u32 = 48;
const YEAR_SEARCH_HORIZON: i32 = 8;

/// A recurrence rule computing absolute occurrences of a calendar schedule.
pub trait RecurrenceRule: Send + Sync {
    /// Returns the smallest occurrence at or after `from` (and at or after
    /// the rule's anchor), or `None` when the rule can produce no further
    /// occurrence.
    fn next_from(&self, from: DateTime<Utc>) -> Option<DateTime<Utc>>;
}

/// Weekly schedule: given days of the week, every `interval_weeks` weeks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeeklyRule {
    anchor: DateTime<Utc>,
    time: NaiveTime,
    /// ISO weekday numbers, Monday = 1.
    weekdays: BTreeSet<u32>,
    interval_weeks: u32,
}

impl WeeklyRule {
    /// Creates a weekly rule anchored at `create_date`.
    ///
    /// # Errors
    ///
    /// Returns an error for an empty weekday set or a zero week interval.
    pub fn new(
        weekdays: impl IntoIterator<Item = Weekday>,
        time: NaiveTime,
        create_date: DateTime<Utc>,
        interval_weeks: u32,
    ) -> Result<Self, TriggerError> {
        let weekdays: BTreeSet<u32> = weekdays
            .into_iter()
            .map(|day| day.number_from_monday())
            .collect();
        if weekdays.is_empty() {
            return Err(TriggerError::EmptySchedule { field: "weekday" });
        }
        if interval_weeks == 0 {
            return Err(TriggerError::InvalidInterval {
                field: "week interval",
            });
        }
        Ok(Self {
            anchor: create_date,
            time,
            weekdays,
            interval_weeks,
        })
    }
}

impl RecurrenceRule for WeeklyRule {
    fn next_from(&self, from: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let from = from.max(self.anchor);
        let anchor_day = self.anchor.date_naive();
        let mut day = from.date_naive();
        // One full interval block plus slack always contains a candidate.
        for _ in 0..=(7 * (i64::from(self.interval_weeks) + 2)) {
            let weeks = (day - anchor_day).num_days().div_euclid(7);
            if weeks % i64::from(self.interval_weeks) == 0
                && self.weekdays.contains(&day.weekday().number_from_monday())
            {
                let candidate = day.and_time(self.time).and_utc();
                if candidate >= from {
                    return Some(candidate);
                }
            }
            day = day.succ_opt()?;
        }
        None
    }
}

/// Monthly schedule: given days of the month, every `interval_months` months.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthlyRule {
    anchor: DateTime<Utc>,
    time: NaiveTime,
    days: BTreeSet<u32>,
    interval_months: u32,
}

impl MonthlyRule {
    /// Creates a monthly rule anchored at `create_date`.
    ///
    /// # Errors
    ///
    /// Returns an error for an empty or out-of-range day set or a zero
    /// month interval.
    pub fn new(
        days: impl IntoIterator<Item = u32>,
        time: NaiveTime,
        create_date: DateTime<Utc>,
        interval_months: u32,
    ) -> Result<Self, TriggerError> {
        let days: BTreeSet<u32> = days.into_iter().collect();
        if days.is_empty() {
            return Err(TriggerError::EmptySchedule { field: "day" });
        }
        if let Some(&day) = days.iter().find(|&&day| day == 0 || day > 31) {
            return Err(TriggerError::InvalidDayOfMonth { day });
        }
        if interval_months == 0 {
            return Err(TriggerError::InvalidInterval {
                field: "month interval",
            });
        }
        Ok(Self {
            anchor: create_date,
            time,
            days,
            interval_months,
        })
    }
}

impl RecurrenceRule for MonthlyRule {
    fn next_from(&self, from: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let from = from.max(self.anchor);
        let (anchor_year, anchor_month) = (self.anchor.year(), self.anchor.month());
        let (mut year, mut month) = (from.year(), from.month());

        for _ in 0..(self.interval_months * 4 + MONTH_SEARCH_SLACK) {
            let since = (year - anchor_year) * 12 + (month as i32 - anchor_month as i32);
            if since >= 0 && since % self.interval_months as i32 == 0 {
                for &day in &self.days {
                    // Day invalid for this month: skipped, never clamped.
                    let Some(date) = NaiveDate::from_ymd_opt(year, month, day) else {
                        continue;
                    };
                    let candidate = date.and_time(self.time).and_utc();
                    if candidate >= from {
                        return Some(candidate);
                    }
                }
            }
            month += 1;
            if month > 12 {
                month = 1;
                year += 1;
            }
        }
        None
    }
}

/// Yearly schedule: given `(month, day)` pairs, every year.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct YearlyRule {
    anchor: DateTime<Utc>,
    time: NaiveTime,
    months: BTreeSet<u32>,
    days: BTreeSet<u32>,
}

impl YearlyRule {
    /// Creates a yearly rule anchored at `create_date`.
    ///
    /// # Errors
    ///
    /// Returns an error for empty or out-of-range month or day sets.
    pub fn new(
        time: NaiveTime,
        months: impl IntoIterator<Item = Month>,
        days: impl IntoIterator<Item = u32>,
        create_date: DateTime<Utc>,
    ) -> Result<Self, TriggerError> {
        let months: BTreeSet<u32> = months
            .into_iter()
            .map(|month| month.number_from_month())
            .collect();
        if months.is_empty() {
            return Err(TriggerError::EmptySchedule { field: "month" });
        }
        let days: BTreeSet<u32> = days.into_iter().collect();
        if days.is_empty() {
            return Err(TriggerError::EmptySchedule { field: "day" });
        }
        if let Some(&day) = days.iter().find(|&&day| day == 0 || day > 31) {
            return Err(TriggerError::InvalidDayOfMonth { day });
        }
        Ok(Self {
            anchor: create_date,
            time,
            months,
            days,
        })
    }
}

impl RecurrenceRule for YearlyRule {
    fn next_from(&self, from: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let from = from.max(self.anchor);
        // Month and day sets iterate in ascending order, so candidates come
        // out chronologically within each year.
        for year in from.year()..=from.year() + YEAR_SEARCH_HORIZON {
            for &month in &self.months {
                for &day in &self.days {
                    let Some(date) = NaiveDate::from_ymd_opt(year, month, day) else {
                        continue;
                    };
                    let candidate = date.and_time(self.time).and_utc();
                    if candidate >= from {
                        return Some(candidate);
                    }
                }
            }
        }
        None
    }
}

/// A recurrence rule plus its repeat counter and creation-date baseline.
///
/// `next_date` is the single entry point: it computes the next occurrence
/// strictly after the given timestamp (or at/after the creation date on the
/// first call), decrementing the counter per computed occurrence. Once the
/// counter is exhausted it returns `None` forever.
pub struct PlanTrigger {
    rule: Box<dyn RecurrenceRule>,
    create_date: DateTime<Utc>,
    remaining: Option<u32>,
}

impl PlanTrigger {
    /// Wraps `rule` with a repeat counter (`None` = unlimited).
    #[must_use]
    pub fn new(
        rule: impl RecurrenceRule + 'static,
        create_date: DateTime<Utc>,
        count: Option<u32>,
    ) -> Self {
        Self {
            rule: Box::new(rule),
            create_date,
            remaining: count,
        }
    }

    /// Computes the next occurrence, consuming one repetition.
    ///
    /// Never returns a timestamp at or before `after`.
    pub fn next_date(&mut self, after: Option<DateTime<Utc>>) -> Option<DateTime<Utc>> {
        if self.remaining == Some(0) {
            return None;
        }
        let occurrence = self.rule.next_from(Self::search_start(self.create_date, after))?;
        if let Some(remaining) = self.remaining.as_mut() {
            *remaining -= 1;
        }
        Some(occurrence)
    }

    /// Like [`next_date`](Self::next_date) but without consuming a
    /// repetition, for looking one occurrence ahead.
    #[must_use]
    pub fn peek_date(&self, after: Option<DateTime<Utc>>) -> Option<DateTime<Utc>> {
        if self.remaining == Some(0) {
            return None;
        }
        self.rule.next_from(Self::search_start(self.create_date, after))
    }

    /// Remaining repetitions, `None` meaning unlimited.
    #[must_use]
    pub fn remaining(&self) -> Option<u32> {
        self.remaining
    }

    fn search_start(create_date: DateTime<Utc>, after: Option<DateTime<Utc>>) -> DateTime<Utc> {
        match after {
            // Strictly after, at scheduling granularity.
            Some(after) => after + Duration::milliseconds(1),
            None => create_date,
        }
    }
}

/// Adapts a [`PlanTrigger`] to the [`Timer`] contract.
///
/// Each call computes the next occurrence from the previously returned one
/// and schedules a cancellable wait to it; a consumer that falls behind
/// gets an immediate catch-up fire.
pub struct PlanTimer {
    plan: PlanTrigger,
    last: Option<DateTime<Utc>>,
    clock: Arc<dyn Clock>,
}

impl PlanTimer {
    /// Creates a timer driving `plan`.
    #[must_use]
    pub fn new(plan: PlanTrigger, clock: Arc<dyn Clock>) -> Self {
        Self {
            plan,
            last: None,
            clock,
        }
    }
}

#[async_trait]
impl Timer for PlanTimer {
    async fn next(
        &mut self,
        cancel: &CancellationToken,
    ) -> Result<Option<TimerInfo>, TriggerError> {
        if cancel.is_cancelled() {
            return Ok(None);
        }

        let Some(occurrence) = self.plan.next_date(self.last) else {
            return Ok(None);
        };
        self.last = Some(occurrence);

        let next = match self.plan.peek_date(Some(occurrence)) {
            Some(upcoming) => NextFire::At(upcoming),
            None => NextFire::Last,
        };
        debug!(occurrence = %occurrence, "plan timer scheduling occurrence");

        let delay = occurrence - self.clock.now();
        let clock = Arc::clone(&self.clock);
        let cancel = cancel.clone();
        let wait = async move { Ok(clock::wait_for(&clock, delay, &cancel).await) }.boxed();

        Ok(Some(TimerInfo::new(wait, next)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::testing::ManualClock;
    use chrono::TimeZone;

    fn nine() -> NaiveTime {
        NaiveTime::from_hms_opt(9, 0, 0).unwrap()
    }

    fn day(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
    }

    fn occurrence(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
    }

    // 2024-03-04 is a Monday.
    fn monday_anchor() -> DateTime<Utc> {
        day(2024, 3, 4)
    }

    #[test]
    fn weekly_mon_wed_count_four() {
        let rule = WeeklyRule::new(
            [Weekday::Mon, Weekday::Wed],
            nine(),
            monday_anchor(),
            1,
        )
        .expect("rule");
        let mut plan = PlanTrigger::new(rule, monday_anchor(), Some(4));

        let expected = [
            occurrence(2024, 3, 4, 9),
            occurrence(2024, 3, 6, 9),
            occurrence(2024, 3, 11, 9),
            occurrence(2024, 3, 13, 9),
        ];
        let mut previous = None;
        for want in expected {
            let got = plan.next_date(previous).expect("occurrence");
            assert_eq!(got, want);
            previous = Some(got);
        }

        assert_eq!(plan.next_date(previous), None);
        // Exhaustion is permanent.
        assert_eq!(plan.next_date(None), None);
    }

    #[test]
    fn weekly_interval_skips_off_weeks() {
        let rule = WeeklyRule::new([Weekday::Mon], nine(), monday_anchor(), 2).expect("rule");
        let mut plan = PlanTrigger::new(rule, monday_anchor(), None);

        let first = plan.next_date(None).expect("first");
        let second = plan.next_date(Some(first)).expect("second");
        let third = plan.next_date(Some(second)).expect("third");

        assert_eq!(first, occurrence(2024, 3, 4, 9));
        assert_eq!(second, occurrence(2024, 3, 18, 9));
        assert_eq!(third, occurrence(2024, 4, 1, 9));
    }

    #[test]
    fn weekly_anchor_time_pushes_same_day_occurrence_forward() {
        // Anchored Monday at 10:00 with a 09:00 fire time: the anchor
        // Monday's 09:00 already passed, so the first fire is Wednesday.
        let anchor = Utc.with_ymd_and_hms(2024, 3, 4, 10, 0, 0).unwrap();
        let rule =
            WeeklyRule::new([Weekday::Mon, Weekday::Wed], nine(), anchor, 1).expect("rule");
        let mut plan = PlanTrigger::new(rule, anchor, None);

        assert_eq!(plan.next_date(None), Some(occurrence(2024, 3, 6, 9)));
    }

    #[test]
    fn monthly_day_31_skips_short_months() {
        let rule = MonthlyRule::new([31], nine(), day(2024, 3, 15), 1).expect("rule");
        let mut plan = PlanTrigger::new(rule, day(2024, 3, 15), None);

        let expected = [
            occurrence(2024, 3, 31, 9),
            // April has 30 days: skipped entirely, not clamped.
            occurrence(2024, 5, 31, 9),
            occurrence(2024, 7, 31, 9),
            occurrence(2024, 8, 31, 9),
            occurrence(2024, 10, 31, 9),
        ];
        let mut previous = None;
        for want in expected {
            let got = plan.next_date(previous).expect("occurrence");
            assert_eq!(got, want);
            previous = Some(got);
        }
    }

    #[test]
    fn monthly_two_days_every_second_month() {
        let noon = NaiveTime::from_hms_opt(12, 0, 0).unwrap();
        let rule = MonthlyRule::new([1, 15], noon, day(2024, 1, 1), 2).expect("rule");
        let mut plan = PlanTrigger::new(rule, day(2024, 1, 1), None);

        let mut dates = Vec::new();
        let mut previous = None;
        for _ in 0..10 {
            let got = plan.next_date(previous).expect("occurrence");
            dates.push(got);
            previous = Some(got);
        }

        for pair in dates.windows(2) {
            assert!(pair[1] > pair[0], "sequence must be strictly increasing");
        }
        // Spacing alternates: 14 days within a month, the rest of the
        // two-month block between the 15th and the next block's 1st.
        for (k, pair) in dates.windows(2).enumerate() {
            let gap = pair[1] - pair[0];
            if k % 2 == 0 {
                assert_eq!(gap, Duration::days(14));
            } else {
                assert!(gap > Duration::days(40), "inter-block gap was {gap}");
            }
        }
    }

    #[test]
    fn monthly_rule_with_no_valid_dates_exhausts() {
        // Only February is eligible, but February never has 30 days.
        let rule = MonthlyRule::new([30], nine(), day(2023, 2, 1), 12).expect("rule");
        let mut plan = PlanTrigger::new(rule, day(2023, 2, 1), None);

        assert_eq!(plan.next_date(None), None);
    }

    #[test]
    fn yearly_leap_day_waits_for_leap_years() {
        let rule =
            YearlyRule::new(nine(), [Month::February], [29], day(2023, 1, 10)).expect("rule");
        let mut plan = PlanTrigger::new(rule, day(2023, 1, 10), None);

        let first = plan.next_date(None).expect("first");
        let second = plan.next_date(Some(first)).expect("second");

        assert_eq!(first, occurrence(2024, 2, 29, 9));
        assert_eq!(second, occurrence(2028, 2, 29, 9));
    }

    #[test]
    fn yearly_candidates_come_out_chronologically() {
        let rule = YearlyRule::new(
            nine(),
            [Month::January, Month::June],
            [1, 5],
            day(2024, 2, 1),
        )
        .expect("rule");
        let mut plan = PlanTrigger::new(rule, day(2024, 2, 1), None);

        let expected = [
            occurrence(2024, 6, 1, 9),
            occurrence(2024, 6, 5, 9),
            occurrence(2025, 1, 1, 9),
            occurrence(2025, 1, 5, 9),
            occurrence(2025, 6, 1, 9),
        ];
        let mut previous = None;
        for want in expected {
            let got = plan.next_date(previous).expect("occurrence");
            assert_eq!(got, want);
            previous = Some(got);
        }
    }

    #[test]
    fn peek_does_not_consume_a_repetition() {
        let rule = WeeklyRule::new([Weekday::Mon], nine(), monday_anchor(), 1).expect("rule");
        let plan = PlanTrigger::new(rule, monday_anchor(), Some(1));

        assert!(plan.peek_date(None).is_some());
        assert!(plan.peek_date(None).is_some());
        assert_eq!(plan.remaining(), Some(1));
    }

    #[test]
    fn construction_rejects_degenerate_rules() {
        let empty_weekdays = WeeklyRule::new([], nine(), monday_anchor(), 1);
        assert_eq!(
            empty_weekdays.err(),
            Some(TriggerError::EmptySchedule { field: "weekday" })
        );

        let zero_interval = WeeklyRule::new([Weekday::Mon], nine(), monday_anchor(), 0);
        assert!(matches!(
            zero_interval.err(),
            Some(TriggerError::InvalidInterval { .. })
        ));

        let bad_day = MonthlyRule::new([15, 32], nine(), monday_anchor(), 1);
        assert_eq!(
            bad_day.err(),
            Some(TriggerError::InvalidDayOfMonth { day: 32 })
        );

        let empty_months = YearlyRule::new(nine(), [], [1], monday_anchor());
        assert_eq!(
            empty_months.err(),
            Some(TriggerError::EmptySchedule { field: "month" })
        );
    }

    #[test]
    fn weekly_rule_serde_roundtrip() {
        let rule = WeeklyRule::new(
            [Weekday::Mon, Weekday::Fri],
            nine(),
            monday_anchor(),
            2,
        )
        .expect("rule");

        let json = serde_json::to_string(&rule).expect("serialize");
        let parsed: WeeklyRule = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(rule, parsed);
    }

    #[tokio::test]
    async fn plan_timer_fires_through_the_schedule() {
        let clock = ManualClock::starting_at(day(2024, 3, 1));
        let shared: Arc<dyn Clock> = clock.clone();
        let rule = WeeklyRule::new([Weekday::Mon], nine(), monday_anchor(), 1).expect("rule");
        let plan = PlanTrigger::new(rule, monday_anchor(), Some(2));
        let mut timer = PlanTimer::new(plan, Arc::clone(&shared));
        let cancel = CancellationToken::new();

        let info = timer.next(&cancel).await.expect("next").expect("some");
        assert_eq!(info.next.at(), Some(occurrence(2024, 3, 11, 9)));
        assert!(info.wait.await.expect("wait"));
        assert_eq!(shared.now(), occurrence(2024, 3, 4, 9));

        let info = timer.next(&cancel).await.expect("next").expect("some");
        assert!(info.next.is_last());
        assert!(info.wait.await.expect("wait"));
        assert_eq!(shared.now(), occurrence(2024, 3, 11, 9));

        assert!(timer.next(&cancel).await.expect("next").is_none());
    }

    #[tokio::test]
    async fn plan_timer_cancellation() {
        let clock = ManualClock::starting_at(day(2024, 3, 1));
        let shared: Arc<dyn Clock> = clock.clone();
        let rule = WeeklyRule::new([Weekday::Mon], nine(), monday_anchor(), 1).expect("rule");
        let plan = PlanTrigger::new(rule, monday_anchor(), None);
        let mut timer = PlanTimer::new(plan, shared);
        let cancel = CancellationToken::new();

        let info = timer.next(&cancel).await.expect("next").expect("some");
        cancel.cancel();
        assert!(!info.wait.await.expect("wait"));
        assert!(timer.next(&cancel).await.expect("next").is_none());
    }
}
