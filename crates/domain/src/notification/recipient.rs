//! Recipients, their contact addresses and delivery preferences.

use std::collections::BTreeSet;

use chrono::{Days, FixedOffset, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use super::Channel;
use crate::error::{UpkeepError, ValidationError};
use crate::time::{Timestamp, parse_time_of_day};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecipientKind {
    #[default]
    User,
    Group,
    Role,
}

/// A daily window during which non-urgent messages are held back.
///
/// `start`/`end` are `HH:MM` in `timezone`, which is `UTC` or a fixed
/// offset such as `+02:00`. A window with `start > end` spans midnight.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuietHours {
    pub start: String,
    pub end: String,
    #[serde(default = "default_timezone")]
    pub timezone: String,
}

fn default_timezone() -> String {
    "UTC".to_string()
}

impl QuietHours {
    #[must_use]
    pub fn new(start: impl Into<String>, end: impl Into<String>) -> Self {
        Self {
            start: start.into(),
            end: end.into(),
            timezone: default_timezone(),
        }
    }

    #[must_use]
    pub fn in_timezone(mut self, timezone: impl Into<String>) -> Self {
        self.timezone = timezone.into();
        self
    }

    /// # Errors
    ///
    /// Returns [`ValidationError::InvalidQuietHours`] for a malformed time
    /// or timezone.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.parts().map(|_| ())
    }

    fn parts(&self) -> Result<(NaiveTime, NaiveTime, FixedOffset), ValidationError> {
        let start = parse_time_of_day(&self.start)
            .ok_or(ValidationError::InvalidQuietHours("start must be HH:MM"))?;
        let end = parse_time_of_day(&self.end)
            .ok_or(ValidationError::InvalidQuietHours("end must be HH:MM"))?;
        let offset = parse_offset(&self.timezone)
            .ok_or(ValidationError::InvalidQuietHours("timezone must be UTC or ±HH:MM"))?;
        Ok((start, end, offset))
    }

    /// If `at` falls inside the window, the instant the window ends.
    #[must_use]
    pub fn window_end(&self, at: Timestamp) -> Option<Timestamp> {
        let (start, end, offset) = self.parts().ok()?;
        if start == end {
            return None;
        }
        let local = at.with_timezone(&offset);
        let time = local.time();
        let today = local.date_naive();

        let end_date = if start < end {
            (start <= time && time < end).then_some(today)?
        } else if time >= start {
            today.checked_add_days(Days::new(1))?
        } else if time < end {
            today
        } else {
            return None;
        };
        offset
            .from_local_datetime(&end_date.and_time(end))
            .single()
            .map(|dt| dt.with_timezone(&Utc))
    }

    #[must_use]
    pub fn contains(&self, at: Timestamp) -> bool {
        self.window_end(at).is_some()
    }
}

fn parse_offset(timezone: &str) -> Option<FixedOffset> {
    let tz = timezone.trim();
    if tz.is_empty() || tz.eq_ignore_ascii_case("utc") || tz == "Z" {
        return FixedOffset::east_opt(0);
    }
    let (sign, rest) = match tz.as_bytes().first()? {
        b'+' => (1, &tz[1..]),
        b'-' => (-1, &tz[1..]),
        _ => return None,
    };
    let time = parse_time_of_day(rest)?;
    let seconds = i32::try_from(time.signed_duration_since(NaiveTime::MIN).num_seconds()).ok()?;
    FixedOffset::east_opt(sign * seconds)
}

/// Per-recipient delivery preferences.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecipientPreferences {
    /// Channels the recipient accepts. Empty means all channels.
    #[serde(default)]
    pub channels: BTreeSet<Channel>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quiet_hours: Option<QuietHours>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_per_hour: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_per_day: Option<u32>,
}

/// A known recipient. `id` is the host application's user, group or role
/// identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationRecipient {
    pub id: String,
    #[serde(default, rename = "type")]
    pub kind: RecipientKind,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slack_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub teams_id: Option<String>,
    #[serde(default)]
    pub push_tokens: Vec<String>,
    #[serde(default)]
    pub preferences: RecipientPreferences,
}

impl NotificationRecipient {
    #[must_use]
    pub fn user(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: RecipientKind::User,
            name: name.into(),
            email: None,
            phone: None,
            slack_id: None,
            teams_id: None,
            push_tokens: Vec::new(),
            preferences: RecipientPreferences::default(),
        }
    }

    #[must_use]
    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    #[must_use]
    pub fn with_preferences(mut self, preferences: RecipientPreferences) -> Self {
        self.preferences = preferences;
        self
    }

    /// # Errors
    ///
    /// Returns [`UpkeepError::Validation`] for a blank id or name, or
    /// malformed quiet hours.
    pub fn validate(&self) -> Result<(), UpkeepError> {
        if self.id.trim().is_empty() {
            return Err(ValidationError::InvalidId(self.id.clone()).into());
        }
        if self.name.trim().is_empty() {
            return Err(ValidationError::EmptyName.into());
        }
        if let Some(quiet) = &self.preferences.quiet_hours {
            quiet.validate()?;
        }
        Ok(())
    }

    #[must_use]
    pub fn accepts(&self, channel: Channel) -> bool {
        self.preferences.channels.is_empty() || self.preferences.channels.contains(&channel)
    }

    /// The address a provider needs to reach this recipient on `channel`.
    #[must_use]
    pub fn address(&self, channel: Channel) -> Option<Value> {
        match channel {
            Channel::Email => self.email.clone().map(Value::String),
            Channel::Sms => self.phone.clone().map(Value::String),
            Channel::Slack => self.slack_id.clone().map(Value::String),
            Channel::Teams => self.teams_id.clone().map(Value::String),
            Channel::Push if !self.push_tokens.is_empty() => Some(json!(self.push_tokens)),
            Channel::Push | Channel::Browser | Channel::Webhook => None,
        }
    }
}
