//! Time and timestamp helpers.

use chrono::{DateTime, NaiveTime, Utc};

/// UTC timestamp used for audit fields, execution and delivery times.
pub type Timestamp = DateTime<Utc>;

/// Return the current UTC time.
#[must_use]
pub fn now() -> Timestamp {
    Utc::now()
}

/// Parse a `HH:MM` (24-hour) time of day.
///
/// Returns `None` for anything else, including `HH:MM:SS`.
#[must_use]
pub fn parse_time_of_day(value: &str) -> Option<NaiveTime> {
    let (hours, minutes) = value.trim().split_once(':')?;
    if hours.is_empty() || hours.len() > 2 || minutes.len() != 2 {
        return None;
    }
    NaiveTime::from_hms_opt(hours.parse().ok()?, minutes.parse().ok()?, 0)
}
