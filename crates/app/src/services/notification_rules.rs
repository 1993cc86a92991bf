//! Notification rule store — CRUD for [`NotificationRule`]s.

use std::sync::Arc;

use serde_json::Value;
use upkeep_domain::error::{NotFoundError, UpkeepError, ValidationError};
use upkeep_domain::id::NotificationRuleId;
use upkeep_domain::notification::NotificationRule;
use upkeep_domain::time;

use crate::collection::Collection;
use crate::ports::KeyValueStore;

pub const COLLECTION_KEY: &str = "notification_rules";

fn not_found(id: NotificationRuleId) -> UpkeepError {
    NotFoundError {
        entity: "NotificationRule",
        id: id.to_string(),
    }
    .into()
}

pub struct NotificationRuleService<S> {
    rules: Collection<S, NotificationRule>,
}

impl<S: KeyValueStore + Send + Sync> NotificationRuleService<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self {
            rules: Collection::new(store, COLLECTION_KEY),
        }
    }

    /// # Errors
    ///
    /// Returns a storage error if the store cannot be read.
    pub async fn load(&self) -> Result<usize, UpkeepError> {
        self.rules.load().await
    }

    /// # Errors
    ///
    /// Returns [`UpkeepError::Validation`] if invariants fail or the id is
    /// taken, or a storage error.
    #[tracing::instrument(skip(self, rule), fields(rule_name = %rule.name))]
    pub async fn create_rule(&self, rule: NotificationRule) -> Result<NotificationRule, UpkeepError> {
        rule.validate()?;
        self.rules
            .mutate(|rules| {
                if rules.iter().any(|r| r.id == rule.id) {
                    return Err(ValidationError::AlreadyExists(rule.id.to_string()).into());
                }
                rules.push(rule.clone());
                Ok(rule)
            })
            .await
    }

    /// # Errors
    ///
    /// Returns [`UpkeepError::NotFound`] when no rule with `id` exists.
    pub async fn get_rule(&self, id: NotificationRuleId) -> Result<NotificationRule, UpkeepError> {
        self.rules.find(|r| r.id == id).await.ok_or_else(|| not_found(id))
    }

    pub async fn list_rules(&self) -> Vec<NotificationRule> {
        self.rules.all().await
    }

    /// Enabled rules that apply to `event` for an entity with `variables`.
    pub async fn matching(&self, event: &str, variables: &Value) -> Vec<NotificationRule> {
        self.rules.filter(|r| r.applies_to(event, variables)).await
    }

    /// # Errors
    ///
    /// Returns [`UpkeepError::Validation`] if invariants fail,
    /// [`UpkeepError::NotFound`] if the rule does not exist, or a storage error.
    #[tracing::instrument(skip(self, rule), fields(rule_id = %rule.id))]
    pub async fn update_rule(&self, mut rule: NotificationRule) -> Result<NotificationRule, UpkeepError> {
        rule.validate()?;
        self.rules
            .mutate(|rules| {
                let slot = rules
                    .iter_mut()
                    .find(|r| r.id == rule.id)
                    .ok_or_else(|| not_found(rule.id))?;
                rule.created_at = slot.created_at;
                rule.updated_at = time::now();
                *slot = rule.clone();
                Ok(rule)
            })
            .await
    }

    /// # Errors
    ///
    /// Returns [`UpkeepError::NotFound`] if the rule does not exist, or a
    /// storage error.
    #[tracing::instrument(skip(self))]
    pub async fn delete_rule(&self, id: NotificationRuleId) -> Result<(), UpkeepError> {
        self.rules
            .mutate(|rules| {
                let before = rules.len();
                rules.retain(|r| r.id != id);
                if rules.len() == before {
                    return Err(not_found(id));
                }
                Ok(())
            })
            .await
    }
}
