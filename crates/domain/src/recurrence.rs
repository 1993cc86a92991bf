//! Recurrence — next due date for recurring maintenance.
//!
//! [`next_due_date`] is pure: the only notion of "today" it has is the
//! `current` date passed in, so identical inputs always give identical
//! outputs.

use chrono::{Datelike, Days, Months, NaiveDate};
use serde::{Deserialize, Serialize};

/// How often something recurs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecurrenceType {
    #[default]
    None,
    Daily,
    Weekly,
    Monthly,
    Yearly,
}

/// A recurrence rule for a maintenance schedule or recurring work order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecurrenceSpec {
    #[serde(rename = "type")]
    pub kind: RecurrenceType,
    /// Step between occurrences in units of `kind`. `0` behaves like `1`.
    #[serde(default = "default_interval")]
    pub interval: u32,
    /// Weekdays for weekly recurrence, `0` = Sunday … `6` = Saturday.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub days_of_week: Option<Vec<u8>>,
    /// Day of month for monthly recurrence (1–31, clamped to month length).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub day_of_month: Option<u32>,
}

fn default_interval() -> u32 {
    1
}

impl RecurrenceSpec {
    #[must_use]
    pub fn new(kind: RecurrenceType, interval: u32) -> Self {
        Self {
            kind,
            interval,
            days_of_week: None,
            day_of_month: None,
        }
    }

    #[must_use]
    pub fn on_weekdays(mut self, days: impl IntoIterator<Item = u8>) -> Self {
        self.days_of_week = Some(days.into_iter().collect());
        self
    }

    #[must_use]
    pub fn on_day_of_month(mut self, day: u32) -> Self {
        self.day_of_month = Some(day);
        self
    }
}

/// Compute the next occurrence strictly after `current`.
///
/// Returns `None` for [`RecurrenceType::None`] or when the result would
/// overflow the calendar.
#[must_use]
pub fn next_due_date(current: NaiveDate, spec: &RecurrenceSpec) -> Option<NaiveDate> {
    let interval = spec.interval.max(1);
    match spec.kind {
        RecurrenceType::None => None,
        RecurrenceType::Daily => current.checked_add_days(Days::new(u64::from(interval))),
        RecurrenceType::Weekly => next_weekly(current, interval, spec.days_of_week.as_deref()),
        RecurrenceType::Monthly => {
            let day = spec.day_of_month.unwrap_or_else(|| current.day());
            next_monthly(current, interval, day)
        }
        RecurrenceType::Yearly => current.checked_add_months(Months::new(interval.checked_mul(12)?)),
    }
}

/// Weekday index with Sunday as `0`.
pub(crate) fn weekday_index(date: NaiveDate) -> u8 {
    // num_days_from_sunday is always < 7
    u8::try_from(date.weekday().num_days_from_sunday()).unwrap_or(0)
}

pub(crate) fn next_weekly(current: NaiveDate, interval: u32, days: Option<&[u8]>) -> Option<NaiveDate> {
    let mut days: Vec<u8> = days.unwrap_or_default().iter().copied().filter(|d| *d < 7).collect();
    days.sort_unstable();
    days.dedup();

    let Some(&first) = days.first() else {
        return current.checked_add_days(Days::new(7 * u64::from(interval)));
    };

    let today = weekday_index(current);
    if let Some(&later) = days.iter().find(|d| **d > today) {
        return current.checked_add_days(Days::new(u64::from(later - today)));
    }
    // wrap: start of this week + `interval` weeks + first listed weekday
    let offset = 7 * u64::from(interval) - u64::from(today) + u64::from(first);
    current.checked_add_days(Days::new(offset))
}

pub(crate) fn next_monthly(current: NaiveDate, interval: u32, day: u32) -> Option<NaiveDate> {
    let this_month = clamp_day(current.year(), current.month(), day)?;
    if this_month > current {
        return Some(this_month);
    }
    let first_of_month = current.with_day(1)?;
    let target_month = first_of_month.checked_add_months(Months::new(interval))?;
    clamp_day(target_month.year(), target_month.month(), day)
}

/// The `day`-th of the given month, or the month's last day if it is shorter.
pub(crate) fn clamp_day(year: i32, month: u32, day: u32) -> Option<NaiveDate> {
    let day = day.clamp(1, 31);
    let last = last_day_of_month(year, month)?;
    NaiveDate::from_ymd_opt(year, month, day.min(last))
}

fn last_day_of_month(year: i32, month: u32) -> Option<u32> {
    let first = NaiveDate::from_ymd_opt(year, month, 1)?;
    let next = first.checked_add_months(Months::new(1))?;
    next.pred_opt().map(|d| d.day())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn should_return_none_for_non_recurring() {
        let spec = RecurrenceSpec::new(RecurrenceType::None, 1);
        assert_eq!(next_due_date(date(2024, 1, 10), &spec), None);
    }

    #[test]
    fn should_add_interval_days_for_daily() {
        let spec = RecurrenceSpec::new(RecurrenceType::Daily, 3);
        assert_eq!(next_due_date(date(2024, 2, 27), &spec), Some(date(2024, 3, 1)));
    }

    #[test]
    fn should_add_whole_weeks_for_weekly_without_days() {
        let spec = RecurrenceSpec::new(RecurrenceType::Weekly, 2);
        assert_eq!(next_due_date(date(2024, 5, 1), &spec), Some(date(2024, 5, 15)));
    }

    #[test]
    fn should_pick_next_listed_weekday_in_same_week() {
        // 2024-05-01 is a Wednesday (3); next listed day is Friday (5)
        let spec = RecurrenceSpec::new(RecurrenceType::Weekly, 1).on_weekdays([1, 5]);
        assert_eq!(next_due_date(date(2024, 5, 1), &spec), Some(date(2024, 5, 3)));
    }

    #[test]
    fn should_wrap_to_first_weekday_after_interval_weeks() {
        // Friday 2024-05-03, days {Mon, Wed}: wrap to Monday one week on
        let spec = RecurrenceSpec::new(RecurrenceType::Weekly, 1).on_weekdays([3, 1]);
        assert_eq!(next_due_date(date(2024, 5, 3), &spec), Some(date(2024, 5, 6)));

        // with interval 2, skip a week
        let spec = RecurrenceSpec::new(RecurrenceType::Weekly, 2).on_weekdays([1, 3]);
        assert_eq!(next_due_date(date(2024, 5, 3), &spec), Some(date(2024, 5, 13)));
    }

    #[test]
    fn should_wrap_when_today_is_the_only_listed_weekday() {
        // Wednesday with {Wed}: the next one is a week later, never today
        let spec = RecurrenceSpec::new(RecurrenceType::Weekly, 1).on_weekdays([3]);
        assert_eq!(next_due_date(date(2024, 5, 1), &spec), Some(date(2024, 5, 8)));
    }

    #[test]
    fn should_ignore_out_of_range_weekdays() {
        let spec = RecurrenceSpec::new(RecurrenceType::Weekly, 1).on_weekdays([9]);
        assert_eq!(next_due_date(date(2024, 5, 1), &spec), Some(date(2024, 5, 8)));
    }

    #[test]
    fn should_use_day_of_month_later_in_current_month() {
        let spec = RecurrenceSpec::new(RecurrenceType::Monthly, 1).on_day_of_month(20);
        assert_eq!(next_due_date(date(2024, 1, 10), &spec), Some(date(2024, 1, 20)));
    }

    #[test]
    fn should_advance_month_when_day_is_today_or_passed() {
        let spec = RecurrenceSpec::new(RecurrenceType::Monthly, 1).on_day_of_month(10);
        assert_eq!(next_due_date(date(2024, 1, 10), &spec), Some(date(2024, 2, 10)));
        assert_eq!(next_due_date(date(2024, 1, 25), &spec), Some(date(2024, 2, 10)));
    }

    #[test]
    fn should_clamp_day_30_to_end_of_february() {
        let spec = RecurrenceSpec::new(RecurrenceType::Monthly, 1).on_day_of_month(30);
        assert_eq!(next_due_date(date(2024, 1, 30), &spec), Some(date(2024, 2, 29)));
        assert_eq!(next_due_date(date(2023, 1, 31), &spec), Some(date(2023, 2, 28)));
    }

    #[test]
    fn should_clamp_day_31_within_a_short_current_month() {
        // April has 30 days; day 31 clamps to the 30th, which is still ahead
        let spec = RecurrenceSpec::new(RecurrenceType::Monthly, 1).on_day_of_month(31);
        assert_eq!(next_due_date(date(2024, 4, 10), &spec), Some(date(2024, 4, 30)));
        // on the 30th itself the clamped day is today, so move to May 31
        assert_eq!(next_due_date(date(2024, 4, 30), &spec), Some(date(2024, 5, 31)));
    }

    #[test]
    fn should_keep_current_day_for_monthly_without_day() {
        let spec = RecurrenceSpec::new(RecurrenceType::Monthly, 3);
        assert_eq!(next_due_date(date(2024, 11, 30), &spec), Some(date(2025, 2, 28)));
    }

    #[test]
    fn should_add_years_and_clamp_leap_day() {
        let spec = RecurrenceSpec::new(RecurrenceType::Yearly, 1);
        assert_eq!(next_due_date(date(2024, 2, 29), &spec), Some(date(2025, 2, 28)));
        let spec = RecurrenceSpec::new(RecurrenceType::Yearly, 4);
        assert_eq!(next_due_date(date(2024, 2, 29), &spec), Some(date(2028, 2, 29)));
    }

    #[test]
    fn should_treat_zero_interval_as_one() {
        let spec = RecurrenceSpec::new(RecurrenceType::Daily, 0);
        assert_eq!(next_due_date(date(2024, 1, 1), &spec), Some(date(2024, 1, 2)));
    }

    #[test]
    fn should_always_be_strictly_after_current() {
        let specs = [
            RecurrenceSpec::new(RecurrenceType::Daily, 1),
            RecurrenceSpec::new(RecurrenceType::Weekly, 1),
            RecurrenceSpec::new(RecurrenceType::Weekly, 1).on_weekdays([0]),
            RecurrenceSpec::new(RecurrenceType::Weekly, 3).on_weekdays([0, 2, 4, 6]),
            RecurrenceSpec::new(RecurrenceType::Monthly, 1),
            RecurrenceSpec::new(RecurrenceType::Monthly, 1).on_day_of_month(1),
            RecurrenceSpec::new(RecurrenceType::Monthly, 2).on_day_of_month(31),
            RecurrenceSpec::new(RecurrenceType::Yearly, 1),
        ];
        let mut current = date(2023, 12, 20);
        for _ in 0..120 {
            for spec in &specs {
                let next = next_due_date(current, spec).unwrap();
                assert!(next > current, "{spec:?} from {current} gave {next}");
                assert_eq!(next_due_date(current, spec), Some(next));
            }
            current = current.succ_opt().unwrap();
        }
    }

    #[test]
    fn should_deserialize_spec_with_defaults() {
        let spec: RecurrenceSpec =
            serde_json::from_value(serde_json::json!({"type": "weekly", "days_of_week": [1]}))
                .unwrap();
        assert_eq!(spec.kind, RecurrenceType::Weekly);
        assert_eq!(spec.interval, 1);
        assert_eq!(spec.days_of_week, Some(vec![1]));
    }
}
