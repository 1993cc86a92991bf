//! Automation rules — trigger → conditions → ordered actions.
//!
//! An [`AutomationRule`] reacts to domain events, a schedule, a condition
//! becoming true or an explicit run. When it fires for an entity, its
//! [`ActionConfig`]s run strictly in order.

mod action;
mod schedule;
mod trigger;

pub use action::{ActionConfig, ActionKind};
pub use schedule::{Frequency, Schedule};
pub use trigger::{Trigger, TriggerKind};

use serde::{Deserialize, Serialize};

use crate::error::{UpkeepError, ValidationError};
use crate::id::RuleId;
use crate::time::{self, Timestamp};

/// A rule that reacts to events by executing actions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutomationRule {
    pub id: RuleId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub enabled: bool,
    pub trigger: Trigger,
    pub actions: Vec<ActionConfig>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by: Option<String>,
    #[serde(default)]
    pub execution_count: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_executed_at: Option<Timestamp>,
}

impl AutomationRule {
    /// Create a builder for constructing an [`AutomationRule`].
    #[must_use]
    pub fn builder() -> AutomationRuleBuilder {
        AutomationRuleBuilder::default()
    }

    /// Check domain invariants.
    ///
    /// # Errors
    ///
    /// Returns [`UpkeepError::Validation`] when:
    /// - `name` is blank ([`ValidationError::EmptyName`])
    /// - `actions` is empty ([`ValidationError::NoActions`])
    /// - the trigger is malformed (see [`Trigger::validate`])
    pub fn validate(&self) -> Result<(), UpkeepError> {
        if self.name.trim().is_empty() {
            return Err(ValidationError::EmptyName.into());
        }
        if self.actions.is_empty() {
            return Err(ValidationError::NoActions.into());
        }
        self.trigger.validate()?;
        Ok(())
    }

    /// Whether the scheduler should hold a timer for this rule.
    #[must_use]
    pub fn is_scheduled(&self) -> bool {
        self.enabled && self.trigger.schedule().is_some()
    }

    /// Count one completed execution.
    pub fn record_execution(&mut self, at: Timestamp) {
        self.execution_count += 1;
        self.last_executed_at = Some(at);
    }
}

/// Step-by-step builder for [`AutomationRule`].
#[derive(Debug, Default)]
pub struct AutomationRuleBuilder {
    id: Option<RuleId>,
    name: Option<String>,
    description: Option<String>,
    enabled: Option<bool>,
    trigger: Option<Trigger>,
    actions: Vec<ActionConfig>,
    created_by: Option<String>,
}

impl AutomationRuleBuilder {
    #[must_use]
    pub fn id(mut self, id: RuleId) -> Self {
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
    pub fn action(mut self, action: ActionConfig) -> Self {
        self.actions.push(action);
        self
    }

    #[must_use]
    pub fn created_by(mut self, user: impl Into<String>) -> Self {
        self.created_by = Some(user.into());
        self
    }

    /// Consume the builder, validate, and return an [`AutomationRule`].
    ///
    /// # Errors
    ///
    /// Returns [`UpkeepError::Validation`] if required fields are missing or
    /// the trigger is malformed.
    pub fn build(self) -> Result<AutomationRule, UpkeepError> {
        let now = time::now();
        let rule = AutomationRule {
            id: self.id.unwrap_or_default(),
            name: self.name.unwrap_or_default(),
            description: self.description.unwrap_or_default(),
            enabled: self.enabled.unwrap_or(true),
            trigger: self.trigger.unwrap_or_else(Trigger::manual),
            actions: self.actions,
            created_at: now,
            updated_at: now,
            created_by: self.created_by,
            execution_count: 0,
            last_executed_at: None,
        };
        rule.validate()?;
        Ok(rule)
    }
}
