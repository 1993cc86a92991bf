//! Automation engine — runs one rule's action pipeline against one entity.
//!
//! Actions run in order. An action whose guard does not hold is skipped; an
//! action with a delay waits inside this pipeline only; the first failing
//! action stops the pipeline. Every step is written to the execution log so
//! a running execution can be watched from outside.

use std::sync::Arc;

use upkeep_domain::automation::AutomationRule;
use upkeep_domain::error::UpkeepError;
use upkeep_domain::event::EntitySnapshot;
use upkeep_domain::execution::{Execution, ExecutionStatus};
use upkeep_domain::time;

use crate::actions::{ActionContext, ActionRegistry};
use crate::execution_log::ExecutionLog;
use crate::ports::KeyValueStore;
use crate::services::AutomationRuleService;

pub struct AutomationEngine<S> {
    rules: Arc<AutomationRuleService<S>>,
    log: Arc<ExecutionLog<S>>,
    registry: ActionRegistry,
}

impl<S: KeyValueStore + Send + Sync> AutomationEngine<S> {
    pub fn new(
        rules: Arc<AutomationRuleService<S>>,
        log: Arc<ExecutionLog<S>>,
        registry: ActionRegistry,
    ) -> Self {
        Self {
            rules,
            log,
            registry,
        }
    }

    /// Run `rule` for `entity` and return the finished execution.
    ///
    /// Action failures are recorded on the execution, not returned. A
    /// completed execution bumps the rule's execution count.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the execution cannot be appended to the
    /// log.
    #[tracing::instrument(skip(self, rule, entity), fields(rule_id = %rule.id, entity_id = %entity.id))]
    pub async fn fire(&self, rule: &AutomationRule, entity: &EntitySnapshot) -> Result<Execution, UpkeepError> {
        let mut execution = Execution::start(rule.id, entity, &rule.actions, time::now());
        self.log.append(execution.clone()).await?;
        tracing::info!(execution_id = %execution.id, rule_name = %rule.name, "execution started");

        let variables = entity.variables();
        for (index, action) in rule.actions.iter().enumerate() {
            if action.condition.as_ref().is_some_and(|guard| !guard.evaluate(&variables)) {
                execution.mark_skipped(index, time::now());
                self.save(&execution).await;
                continue;
            }

            if action.delay_minutes > 0 {
                tracing::debug!(action = %action.kind, minutes = action.delay_minutes, "delaying action");
                tokio::time::sleep(action.delay()).await;
            }

            execution.mark_running(index, time::now());
            self.save(&execution).await;

            let ctx = ActionContext {
                rule,
                action,
                entity,
                variables: &variables,
                now: time::now(),
            };
            match self.registry.dispatch(&ctx).await {
                Ok(result) => execution.mark_completed(index, result, time::now()),
                Err(err) => {
                    tracing::warn!(action = %action.kind, error = %err, "action failed");
                    execution.mark_failed(index, err.to_string(), time::now());
                    break;
                }
            }
            self.save(&execution).await;
        }

        let finished_at = time::now();
        execution.finish(finished_at);
        self.save(&execution).await;

        if execution.status == ExecutionStatus::Completed {
            if let Err(err) = self.rules.record_execution(rule.id, finished_at).await {
                tracing::warn!(error = %err, "could not record rule execution");
            }
        }
        tracing::info!(
            execution_id = %execution.id,
            status = ?execution.status,
            duration_ms = execution.duration_ms(),
            "execution finished"
        );
        Ok(execution)
    }

    async fn save(&self, execution: &Execution) {
        if let Err(err) = self.log.update(execution.clone()).await {
            tracing::error!(execution_id = %execution.id, error = %err, "failed to update execution log");
        }
    }
}
