//! Automation rule store — CRUD for [`AutomationRule`]s.

use std::sync::Arc;

use upkeep_domain::automation::AutomationRule;
use upkeep_domain::error::{NotFoundError, UpkeepError, ValidationError};
use upkeep_domain::id::RuleId;
use upkeep_domain::time::{self, Timestamp};

use crate::collection::Collection;
use crate::ports::KeyValueStore;

pub const COLLECTION_KEY: &str = "automation_rules";

fn not_found(id: RuleId) -> UpkeepError {
    NotFoundError {
        entity: "AutomationRule",
        id: id.to_string(),
    }
    .into()
}

/// Application service for automation rule CRUD operations.
pub struct AutomationRuleService<S> {
    rules: Collection<S, AutomationRule>,
}

impl<S: KeyValueStore + Send + Sync> AutomationRuleService<S> {
    /// Create a new service backed by the given store.
    pub fn new(store: Arc<S>) -> Self {
        Self {
            rules: Collection::new(store, COLLECTION_KEY),
        }
    }

    /// Load persisted rules into memory.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the store cannot be read.
    pub async fn load(&self) -> Result<usize, UpkeepError> {
        self.rules.load().await
    }

    /// Create a new rule after validating domain invariants.
    ///
    /// # Errors
    ///
    /// Returns [`UpkeepError::Validation`] if invariants fail or the id is
    /// taken, or a storage error propagated from the store.
    #[tracing::instrument(skip(self, rule), fields(rule_name = %rule.name))]
    pub async fn create_rule(&self, rule: AutomationRule) -> Result<AutomationRule, UpkeepError> {
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

    /// Look up a rule by id, returning an error if not found.
    ///
    /// # Errors
    ///
    /// Returns [`UpkeepError::NotFound`] when no rule with `id` exists.
    pub async fn get_rule(&self, id: RuleId) -> Result<AutomationRule, UpkeepError> {
        self.rules.find(|r| r.id == id).await.ok_or_else(|| not_found(id))
    }

    pub async fn list_rules(&self) -> Vec<AutomationRule> {
        self.rules.all().await
    }

    pub async fn list_enabled(&self) -> Vec<AutomationRule> {
        self.rules.filter(|r| r.enabled).await
    }

    /// Replace a rule's definition.
    ///
    /// Audit and counter fields (`created_at`, `created_by`,
    /// `execution_count`, `last_executed_at`) are kept from the stored rule
    /// and `updated_at` is refreshed.
    ///
    /// # Errors
    ///
    /// Returns [`UpkeepError::Validation`] if invariants fail,
    /// [`UpkeepError::NotFound`] if the rule does not exist, or a storage error.
    #[tracing::instrument(skip(self, rule), fields(rule_id = %rule.id))]
    pub async fn update_rule(&self, mut rule: AutomationRule) -> Result<AutomationRule, UpkeepError> {
        rule.validate()?;
        self.rules
            .mutate(|rules| {
                let slot = rules
                    .iter_mut()
                    .find(|r| r.id == rule.id)
                    .ok_or_else(|| not_found(rule.id))?;
                rule.created_at = slot.created_at;
                rule.created_by = slot.created_by.clone();
                rule.execution_count = slot.execution_count;
                rule.last_executed_at = slot.last_executed_at;
                rule.updated_at = time::now();
                *slot = rule.clone();
                Ok(rule)
            })
            .await
    }

    /// Enable or disable a rule.
    ///
    /// # Errors
    ///
    /// Returns [`UpkeepError::NotFound`] if the rule does not exist, or a
    /// storage error.
    #[tracing::instrument(skip(self))]
    pub async fn set_enabled(&self, id: RuleId, enabled: bool) -> Result<AutomationRule, UpkeepError> {
        self.rules
            .mutate(|rules| {
                let slot = rules.iter_mut().find(|r| r.id == id).ok_or_else(|| not_found(id))?;
                slot.enabled = enabled;
                slot.updated_at = time::now();
                Ok(slot.clone())
            })
            .await
    }

    /// Delete a rule by id.
    ///
    /// # Errors
    ///
    /// Returns [`UpkeepError::NotFound`] if the rule does not exist, or a
    /// storage error.
    #[tracing::instrument(skip(self))]
    pub async fn delete_rule(&self, id: RuleId) -> Result<(), UpkeepError> {
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

    /// Count one completed execution of a rule.
    ///
    /// # Errors
    ///
    /// Returns [`UpkeepError::NotFound`] if the rule was deleted meanwhile,
    /// or a storage error.
    pub async fn record_execution(&self, id: RuleId, at: Timestamp) -> Result<(), UpkeepError> {
        self.rules
            .mutate(|rules| {
                let slot = rules.iter_mut().find(|r| r.id == id).ok_or_else(|| not_found(id))?;
                slot.record_execution(at);
                Ok(())
            })
            .await
    }
}
