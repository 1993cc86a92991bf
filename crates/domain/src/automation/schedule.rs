//! Schedule — when a time-based trigger fires.
//!
//! Schedules are interpreted in UTC. The next fire time is always derived
//! from the schedule and the current instant, never from when the rule last
//! ran, so a restart or a clock change simply recomputes it.

use chrono::{Datelike, Days, Months, NaiveDate, NaiveTime, TimeDelta, Timelike};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::recurrence::{clamp_day, weekday_index};
use crate::time::{Timestamp, parse_time_of_day};

/// Base unit of a schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Frequency {
    Hourly,
    Daily,
    Weekly,
    Monthly,
}

/// A recurring fire time for a time-based trigger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schedule {
    pub frequency: Frequency,
    /// Number of `frequency` units between fires. Must be at least 1.
    #[serde(default = "default_interval")]
    pub interval: u32,
    /// `HH:MM` time of day. Hourly schedules only use the minutes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<String>,
    /// Weekdays for weekly schedules, `0` = Sunday … `6` = Saturday.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub days: Option<Vec<u8>>,
    /// Day of month for monthly schedules (1–31, clamped to month length).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<u32>,
}

fn default_interval() -> u32 {
    1
}

impl Schedule {
    #[must_use]
    pub fn new(frequency: Frequency) -> Self {
        Self {
            frequency,
            interval: 1,
            time: None,
            days: None,
            date: None,
        }
    }

    #[must_use]
    pub fn every(mut self, interval: u32) -> Self {
        self.interval = interval;
        self
    }

    #[must_use]
    pub fn at(mut self, time: impl Into<String>) -> Self {
        self.time = Some(time.into());
        self
    }

    #[must_use]
    pub fn on_days(mut self, days: impl IntoIterator<Item = u8>) -> Self {
        self.days = Some(days.into_iter().collect());
        self
    }

    #[must_use]
    pub fn on_date(mut self, date: u32) -> Self {
        self.date = Some(date);
        self
    }

    /// Check that every field is in range.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::InvalidSchedule`] naming the first
    /// offending field.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.interval == 0 {
            return Err(ValidationError::InvalidSchedule("interval must be at least 1"));
        }
        if let Some(time) = &self.time
            && parse_time_of_day(time).is_none()
        {
            return Err(ValidationError::InvalidSchedule("time must be HH:MM"));
        }
        if let Some(days) = &self.days
            && days.iter().any(|d| *d > 6)
        {
            return Err(ValidationError::InvalidSchedule("weekdays must be 0-6"));
        }
        if let Some(date) = self.date
            && !(1..=31).contains(&date)
        {
            return Err(ValidationError::InvalidSchedule("date must be 1-31"));
        }
        Ok(())
    }

    /// The first fire time strictly after `now`, or `None` if the schedule
    /// is invalid or the result overflows the calendar.
    #[must_use]
    pub fn next_execution(&self, now: Timestamp) -> Option<Timestamp> {
        self.validate().ok()?;
        let time_of_day = match &self.time {
            Some(time) => parse_time_of_day(time)?,
            None => NaiveTime::MIN,
        };
        let interval = self.interval;
        let today = now.date_naive();
        let at = |date: NaiveDate, time: NaiveTime| date.and_time(time).and_utc();

        let next = match self.frequency {
            Frequency::Hourly => {
                let this_hour = today
                    .and_hms_opt(now.hour(), time_of_day.minute(), 0)?
                    .and_utc();
                if this_hour > now {
                    this_hour
                } else {
                    this_hour.checked_add_signed(TimeDelta::hours(i64::from(interval)))?
                }
            }
            Frequency::Daily => {
                let candidate = at(today, time_of_day);
                if candidate > now {
                    candidate
                } else {
                    at(today.checked_add_days(Days::new(u64::from(interval)))?, time_of_day)
                }
            }
            Frequency::Weekly => {
                let mut days: Vec<u8> = self.days.clone().unwrap_or_default();
                days.sort_unstable();
                days.dedup();
                if days.is_empty() {
                    days.push(weekday_index(today));
                }
                let week_day = weekday_index(today);
                let rest_of_week = days
                    .iter()
                    .filter(|d| **d >= week_day)
                    .filter_map(|d| today.checked_add_days(Days::new(u64::from(*d - week_day))))
                    .map(|date| at(date, time_of_day))
                    .find(|candidate| *candidate > now);
                match rest_of_week {
                    Some(candidate) => candidate,
                    None => {
                        let week_start = today.checked_sub_days(Days::new(u64::from(week_day)))?;
                        let offset = 7 * u64::from(interval) + u64::from(days[0]);
                        at(week_start.checked_add_days(Days::new(offset))?, time_of_day)
                    }
                }
            }
            Frequency::Monthly => {
                let day = self.date.unwrap_or(1);
                let candidate = at(clamp_day(today.year(), today.month(), day)?, time_of_day);
                if candidate > now {
                    candidate
                } else {
                    let target = today.with_day(1)?.checked_add_months(Months::new(interval))?;
                    at(clamp_day(target.year(), target.month(), day)?, time_of_day)
                }
            }
        };
        Some(next)
    }
}

impl std::fmt::Display for Schedule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let unit = match self.frequency {
            Frequency::Hourly => "hour",
            Frequency::Daily => "day",
            Frequency::Weekly => "week",
            Frequency::Monthly => "month",
        };
        write!(f, "every {} {unit}(s)", self.interval)?;
        if let Some(time) = &self.time {
            write!(f, " at {time}")?;
        }
        Ok(())
    }
}
