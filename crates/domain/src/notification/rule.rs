//! Notification rules — who is told what, on which channels, when an event
//! matches.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::{Channel, Priority};
use crate::automation::Trigger;
use crate::error::{UpkeepError, ValidationError};
use crate::id::{NotificationRuleId, TemplateId};
use crate::time::{self, Timestamp};

/// Explicit users plus groups and roles to expand into their members.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecipientSpec {
    #[serde(default)]
    pub users: Vec<String>,
    #[serde(default)]
    pub groups: Vec<String>,
    #[serde(default)]
    pub roles: Vec<String>,
}

impl RecipientSpec {
    #[must_use]
    pub fn users<I, S>(users: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            users: users.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.users.is_empty() && self.groups.is_empty() && self.roles.is_empty()
    }
}

/// Delivery timing for messages a rule produces.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationScheduling {
    #[serde(default)]
    pub delay_minutes: u32,
    /// Split recipients into chunks of `batch_size`, one message each.
    #[serde(default)]
    pub batch: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_size: Option<usize>,
    #[serde(default)]
    pub respect_quiet_hours: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationRule {
    pub id: NotificationRuleId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub enabled: bool,
    pub trigger: Trigger,
    pub channels: BTreeSet<Channel>,
    #[serde(default)]
    pub recipients: RecipientSpec,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template_id: Option<TemplateId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheduling: Option<NotificationScheduling>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl NotificationRule {
    #[must_use]
    pub fn builder() -> NotificationRuleBuilder {
        NotificationRuleBuilder::default()
    }

    /// Check domain invariants.
    ///
    /// # Errors
    ///
    /// Returns [`UpkeepError::Validation`] when:
    /// - `name` is blank ([`ValidationError::EmptyName`])
    /// - `channels` is empty ([`ValidationError::NoChannels`])
    /// - there is neither a template nor a body ([`ValidationError::MissingContent`])
    /// - the trigger is malformed
    pub fn validate(&self) -> Result<(), UpkeepError> {
        if self.name.trim().is_empty() {
            return Err(ValidationError::EmptyName.into());
        }
        if self.channels.is_empty() {
            return Err(ValidationError::NoChannels.into());
        }
        let has_body = self.body.as_deref().is_some_and(|b| !b.trim().is_empty());
        if self.template_id.is_none() && !has_body {
            return Err(ValidationError::MissingContent.into());
        }
        self.trigger.validate()?;
        Ok(())
    }

    /// Whether this rule should notify for `event` about an entity whose
    /// variables are `snapshot`.
    #[must_use]
    pub fn applies_to(&self, event: &str, snapshot: &serde_json::Value) -> bool {
        self.enabled && self.trigger.matches_event(event) && self.trigger.conditions_hold(snapshot)
    }
}

#[derive(Debug, Default)]
pub struct NotificationRuleBuilder {
    id: Option<NotificationRuleId>,
    name: Option<String>,
    description: Option<String>,
    enabled: Option<bool>,
    trigger: Option<Trigger>,
    channels: BTreeSet<Channel>,
    recipients: RecipientSpec,
    template_id: Option<TemplateId>,
    subject: Option<String>,
    body: Option<String>,
    priority: Priority,
    scheduling: Option<NotificationScheduling>,
}

impl NotificationRuleBuilder {
    #[must_use]
    pub fn id(mut self, id: NotificationRuleId) -> Self {
        self.id = Some(id);
        self
    }

    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    #[must_use]
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = Some(enabled);
        self
    }

    #[must_use]
    pub fn trigger(mut self, trigger: Trigger) -> Self {
        self.trigger = Some(trigger);
        self
    }

    #[must_use]
    pub fn channel(mut self, channel: Channel) -> Self {
        self.channels.insert(channel);
        self
    }

    #[must_use]
    pub fn recipients(mut self, recipients: RecipientSpec) -> Self {
        self.recipients = recipients;
        self
    }

    #[must_use]
    pub fn template(mut self, template_id: TemplateId) -> Self {
        self.template_id = Some(template_id);
        self
    }

    #[must_use]
    pub fn subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    #[must_use]
    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    #[must_use]
    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    #[must_use]
    pub fn scheduling(mut self, scheduling: NotificationScheduling) -> Self {
        self.scheduling = Some(scheduling);
        self
    }

    /// # Errors
    ///
    /// Returns [`UpkeepError::Validation`] if the rule is incomplete.
    pub fn build(self) -> Result<NotificationRule, UpkeepError> {
        let now = time::now();
        let rule = NotificationRule {
            id: self.id.unwrap_or_default(),
            name: self.name.unwrap_or_default(),
            description: self.description.unwrap_or_default(),
            enabled: self.enabled.unwrap_or(true),
            trigger: self.trigger.unwrap_or_else(Trigger::manual),
            channels: self.channels,
            recipients: self.recipients,
            template_id: self.template_id,
            subject: self.subject,
            body: self.body,
            priority: self.priority,
            scheduling: self.scheduling,
            created_at: now,
            updated_at: now,
        };
        rule.validate()?;
        Ok(rule)
    }
}
