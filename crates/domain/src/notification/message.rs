//! Queued notification messages and their delivery lifecycle.
//!
//! ```text
//! pending ──send ok──▶ sent ──(browser/webhook)──▶ delivered ──▶ read
//!    ▲                   │
//!    └──retry── failure ─┴──▶ failed (retries or window exhausted)
//! ```

use std::collections::BTreeMap;

use chrono::TimeDelta;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{Channel, Priority};
use crate::id::{MessageId, NotificationRuleId, RuleId, TemplateId};
use crate::time::Timestamp;

pub const DEFAULT_MAX_RETRIES: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageStatus {
    Pending,
    Sent,
    Delivered,
    Failed,
    Read,
}

/// Where a message came from and the variables it was rendered with.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<String>,
    /// Event name or rule that caused the message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub triggered_by: Option<String>,
    #[serde(default)]
    pub variables: Value,
}

/// The rule a message originated from, if any.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum MessageOrigin {
    Automation(RuleId),
    Notification(NotificationRuleId),
}

/// Linear backoff with a retry count cap and a wall-clock cap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff: TimeDelta,
    pub window: TimeDelta,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            backoff: TimeDelta::minutes(5),
            window: TimeDelta::hours(1),
        }
    }
}

/// What happened after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureOutcome {
    /// Back to pending, due again at the given time.
    Retry(Timestamp),
    /// Terminal failure.
    Exhausted,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationMessage {
    pub id: MessageId,
    #[serde(default, rename = "rule_id", skip_serializing_if = "Option::is_none")]
    pub origin: Option<MessageOrigin>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template_id: Option<TemplateId>,
    pub channel: Channel,
    pub recipients: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    pub body: String,
    pub priority: Priority,
    pub status: MessageStatus,
    #[serde(default)]
    pub metadata: MessageMetadata,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheduled_for: Option<Timestamp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sent_at: Option<Timestamp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delivered_at: Option<Timestamp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub read_at: Option<Timestamp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub retry_count: u32,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Set on the first failure; past it the message stops retrying.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_deadline: Option<Timestamp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_message_id: Option<String>,
    pub created_at: Timestamp,
}

fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}

impl NotificationMessage {
    #[must_use]
    pub fn new(
        channel: Channel,
        recipients: Vec<String>,
        body: impl Into<String>,
        created_at: Timestamp,
    ) -> Self {
        Self {
            id: MessageId::new(),
            origin: None,
            template_id: None,
            channel,
            recipients,
            subject: None,
            body: body.into(),
            priority: Priority::default(),
            status: MessageStatus::Pending,
            metadata: MessageMetadata::default(),
            scheduled_for: None,
            sent_at: None,
            delivered_at: None,
            read_at: None,
            error: None,
            retry_count: 0,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_deadline: None,
            provider_message_id: None,
            created_at,
        }
    }

    /// Pending and not scheduled in the future.
    #[must_use]
    pub fn is_due(&self, now: Timestamp) -> bool {
        self.status == MessageStatus::Pending && self.scheduled_for.is_none_or(|at| at <= now)
    }

    /// Record an accepted send.
    pub fn mark_sent(&mut self, provider_message_id: Option<String>, at: Timestamp) {
        self.status = MessageStatus::Sent;
        self.sent_at = Some(at);
        self.error = None;
        self.provider_message_id = provider_message_id;
        if self.channel.delivers_on_send() {
            self.status = MessageStatus::Delivered;
            self.delivered_at = Some(at);
        }
    }

    /// Record a failed attempt and decide whether it will be retried.
    ///
    /// While `retry_count < max_retries` the count is incremented and the
    /// message goes back to pending after `backoff × retry_count`.
    /// Otherwise it becomes terminal `failed`.
    pub fn record_failure(
        &mut self,
        error: impl Into<String>,
        now: Timestamp,
        policy: &RetryPolicy,
    ) -> FailureOutcome {
        self.error = Some(error.into());
        self.retry_deadline.get_or_insert(now + policy.window);
        if self.retry_count < self.max_retries {
            self.retry_count += 1;
            let due = now + policy.backoff * i32::try_from(self.retry_count).unwrap_or(i32::MAX);
            self.status = MessageStatus::Pending;
            self.scheduled_for = Some(due);
            FailureOutcome::Retry(due)
        } else {
            self.status = MessageStatus::Failed;
            FailureOutcome::Exhausted
        }
    }

    /// Fail a pending retry whose wall-clock window has passed.
    ///
    /// Returns `true` if the message was expired.
    pub fn expire_if_past_deadline(&mut self, now: Timestamp) -> bool {
        match self.retry_deadline {
            Some(deadline) if self.status == MessageStatus::Pending && now > deadline => {
                self.status = MessageStatus::Failed;
                self.error = Some("retry window expired".to_string());
                true
            }
            _ => false,
        }
    }

    /// Move a sent or delivered message to read. Returns `false` otherwise.
    pub fn mark_read(&mut self, at: Timestamp) -> bool {
        if matches!(self.status, MessageStatus::Sent | MessageStatus::Delivered) {
            self.status = MessageStatus::Read;
            self.read_at = Some(at);
            true
        } else {
            false
        }
    }
}

/// Counts over the message queue.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationStats {
    pub total: usize,
    pub pending: usize,
    pub sent: usize,
    pub delivered: usize,
    pub failed: usize,
    pub read: usize,
    pub by_channel: BTreeMap<Channel, usize>,
}

impl NotificationStats {
    #[must_use]
    pub fn from_messages<'a>(messages: impl IntoIterator<Item = &'a NotificationMessage>) -> Self {
        let mut stats = Self::default();
        for message in messages {
            stats.total += 1;
            *stats.by_channel.entry(message.channel).or_default() += 1;
            let counter = match message.status {
                MessageStatus::Pending => &mut stats.pending,
                MessageStatus::Sent => &mut stats.sent,
                MessageStatus::Delivered => &mut stats.delivered,
                MessageStatus::Failed => &mut stats.failed,
                MessageStatus::Read => &mut stats.read,
            };
            *counter += 1;
        }
        stats
    }
}
