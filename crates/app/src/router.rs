//! Trigger router — decides which rules run, for which entities, and starts
//! each run in its own task.
//!
//! Four things make a rule run:
//! - an emitted event naming it ([`Router::route_event`]),
//! - a scheduler fire request ([`Router::handle_fire`]),
//! - its conditions starting to hold on the periodic tick
//!   ([`Router::check_conditions`]),
//! - an explicit request ([`Router::run_rule`]).

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::task::{JoinHandle, JoinSet};

use upkeep_domain::automation::{AutomationRule, TriggerKind};
use upkeep_domain::error::{UpkeepError, ValidationError};
use upkeep_domain::event::{DomainEvent, EntitySnapshot};
use upkeep_domain::execution::Execution;
use upkeep_domain::id::RuleId;
use upkeep_domain::notification::NotificationMessage;

use crate::automation_engine::AutomationEngine;
use crate::dispatcher::Dispatcher;
use crate::ports::{EntitySource, KeyValueStore};
use crate::scheduler::{FireRequest, Scheduler};
use crate::services::AutomationRuleService;

/// Executions started for an event, and the notifications it produced.
pub struct Routed {
    pub executions: Vec<JoinHandle<Option<Execution>>>,
    pub notifications: Vec<NotificationMessage>,
}

/// Wait for spawned executions, dropping the ones that failed to start.
pub async fn join_all(handles: Vec<JoinHandle<Option<Execution>>>) -> Vec<Execution> {
    let mut executions = Vec::with_capacity(handles.len());
    for handle in handles {
        match handle.await {
            Ok(Some(execution)) => executions.push(execution),
            Ok(None) => {}
            Err(err) => tracing::error!(error = %err, "execution task panicked"),
        }
    }
    executions
}

pub struct Router<S, E> {
    rules: Arc<AutomationRuleService<S>>,
    engine: Arc<AutomationEngine<S>>,
    dispatcher: Arc<Dispatcher<S>>,
    scheduler: Arc<Scheduler>,
    entities: Arc<E>,
    /// Last seen result of each condition-based rule per entity.
    condition_state: Mutex<HashMap<(RuleId, String), bool>>,
}

impl<S, E> Router<S, E>
where
    S: KeyValueStore + Send + Sync + 'static,
    E: EntitySource + Send + Sync + 'static,
{
    pub fn new(
        rules: Arc<AutomationRuleService<S>>,
        engine: Arc<AutomationEngine<S>>,
        dispatcher: Arc<Dispatcher<S>>,
        scheduler: Arc<Scheduler>,
        entities: Arc<E>,
    ) -> Self {
        Self {
            rules,
            engine,
            dispatcher,
            scheduler,
            entities,
            condition_state: Mutex::new(HashMap::new()),
        }
    }

    fn spawn_fire(&self, rule: AutomationRule, entity: EntitySnapshot) -> JoinHandle<Option<Execution>> {
        let engine = Arc::clone(&self.engine);
        tokio::spawn(async move {
            match engine.fire(&rule, &entity).await {
                Ok(execution) => Some(execution),
                Err(err) => {
                    tracing::error!(rule_id = %rule.id, entity_id = %entity.id, error = %err, "could not start execution");
                    None
                }
            }
        })
    }

    async fn list_entities(&self) -> Vec<EntitySnapshot> {
        self.entities.list_entities().await.unwrap_or_else(|err| {
            tracing::error!(error = %err, "could not list entities");
            Vec::new()
        })
    }

    /// Fan one event out to matching event-based rules and notification
    /// rules.
    #[tracing::instrument(skip(self, event), fields(event = %event.name, entity_id = %event.entity.id))]
    pub async fn route_event(&self, event: DomainEvent) -> Routed {
        self.entities.observe(event.entity.clone()).await;

        let variables = event.entity.variables();
        let executions: Vec<_> = self
            .rules
            .list_enabled()
            .await
            .into_iter()
            .filter(|rule| rule.trigger.matches_event(&event.name) && rule.trigger.conditions_hold(&variables))
            .map(|rule| {
                tracing::debug!(rule_id = %rule.id, "event matched rule");
                self.spawn_fire(rule, event.entity.clone())
            })
            .collect();

        let notifications = self
            .dispatcher
            .trigger_notifications(&event.name, &event.entity)
            .await;

        Routed {
            executions,
            notifications,
        }
    }

    /// Run a scheduled rule for every entity its conditions hold for.
    /// Requests from a replaced or cancelled timer are ignored.
    #[tracing::instrument(skip(self), fields(rule_id = %request.rule_id))]
    pub async fn handle_fire(&self, request: FireRequest) -> Vec<JoinHandle<Option<Execution>>> {
        if !self.scheduler.is_current(&request) {
            tracing::debug!(generation = request.generation, "ignoring stale fire request");
            return Vec::new();
        }
        let rule = match self.rules.get_rule(request.rule_id).await {
            Ok(rule) if rule.is_scheduled() => rule,
            Ok(_) => {
                tracing::debug!("rule no longer scheduled");
                return Vec::new();
            }
            Err(err) => {
                tracing::warn!(error = %err, "scheduled rule not found");
                return Vec::new();
            }
        };

        let handles: Vec<_> = self
            .list_entities()
            .await
            .into_iter()
            .filter(|entity| rule.trigger.conditions_hold(&entity.variables()))
            .map(|entity| self.spawn_fire(rule.clone(), entity))
            .collect();
        tracing::info!(entities = handles.len(), scheduled_for = %request.scheduled_for, "scheduled rule fired");
        handles
    }

    /// Evaluate condition-based rules against every entity and run the ones
    /// whose conditions have just started to hold.
    ///
    /// The first check after start-up counts as a change for every entity
    /// the conditions already hold for.
    pub async fn check_conditions(&self) -> Vec<JoinHandle<Option<Execution>>> {
        let rules: Vec<AutomationRule> = self
            .rules
            .list_enabled()
            .await
            .into_iter()
            .filter(|rule| matches!(rule.trigger.kind, TriggerKind::ConditionBased))
            .collect();
        if rules.is_empty() {
            self.condition_state().clear();
            return Vec::new();
        }

        let entities = self.list_entities().await;
        let mut rising = Vec::new();
        {
            let mut state = self.condition_state();
            let live: HashSet<RuleId> = rules.iter().map(|rule| rule.id).collect();
            state.retain(|(rule_id, _), _| live.contains(rule_id));

            for entity in &entities {
                let variables = entity.variables();
                for rule in &rules {
                    let holds = rule.trigger.conditions_hold(&variables);
                    let held = state.insert((rule.id, entity.id.clone()), holds).unwrap_or(false);
                    if holds && !held {
                        rising.push((rule.clone(), entity.clone()));
                    }
                }
            }
        }

        rising
            .into_iter()
            .map(|(rule, entity)| {
                tracing::info!(rule_id = %rule.id, entity_id = %entity.id, "conditions started to hold");
                self.spawn_fire(rule, entity)
            })
            .collect()
    }

    fn condition_state(&self) -> std::sync::MutexGuard<'_, HashMap<(RuleId, String), bool>> {
        self.condition_state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run any enabled rule now, whatever its trigger.
    ///
    /// With an entity the rule runs for it without checking conditions;
    /// without one it runs for every entity its conditions hold for.
    ///
    /// # Errors
    ///
    /// Returns [`UpkeepError::NotFound`] for an unknown rule and
    /// [`ValidationError::RuleDisabled`] for a disabled one.
    #[tracing::instrument(skip(self, entity))]
    pub async fn run_rule(&self, rule_id: RuleId, entity: Option<EntitySnapshot>) -> Result<Vec<Execution>, UpkeepError> {
        let rule = self.rules.get_rule(rule_id).await?;
        if !rule.enabled {
            return Err(ValidationError::RuleDisabled(rule_id.to_string()).into());
        }

        if let Some(entity) = entity {
            return Ok(vec![self.engine.fire(&rule, &entity).await?]);
        }

        let mut runs = JoinSet::new();
        for entity in self.list_entities().await {
            if rule.trigger.conditions_hold(&entity.variables()) {
                let engine = Arc::clone(&self.engine);
                let rule = rule.clone();
                runs.spawn(async move { engine.fire(&rule, &entity).await });
            }
        }

        let mut executions = Vec::new();
        while let Some(joined) = runs.join_next().await {
            match joined {
                Ok(result) => executions.push(result?),
                Err(err) => tracing::error!(error = %err, "execution task panicked"),
            }
        }
        Ok(executions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::ActionRegistry;
    use crate::dispatcher::DispatcherSettings;
    use crate::execution_log::ExecutionLog;
    use crate::ports::EmptyDirectory;
    use crate::testing::{InMemoryStore, RecordingSink, StaticEntities};
    use serde_json::json;
    use upkeep_domain::automation::{ActionConfig, ActionKind, Frequency, Schedule, Trigger};
    use upkeep_domain::condition::{Condition, Operator};
    use upkeep_domain::execution::ExecutionStatus;
    use upkeep_domain::time;

    struct Fixture {
        router: Router<InMemoryStore, StaticEntities>,
        rules: Arc<AutomationRuleService<InMemoryStore>>,
        scheduler: Arc<Scheduler>,
        entities: Arc<StaticEntities>,
        sink: Arc<RecordingSink>,
    }

    fn fixture(entities: Vec<EntitySnapshot>) -> Fixture {
        let store = Arc::new(InMemoryStore::default());
        let rules = Arc::new(AutomationRuleService::new(store.clone()));
        let log = Arc::new(ExecutionLog::new(store.clone(), 100));
        let dispatcher = Arc::new(Dispatcher::new(store, Arc::new(EmptyDirectory), DispatcherSettings::default()));
        let sink = Arc::new(RecordingSink::default());
        let registry = ActionRegistry::with_builtins(dispatcher.clone(), sink.clone());
        let engine = Arc::new(AutomationEngine::new(rules.clone(), log, registry));
        let (scheduler, _fires) = Scheduler::new();
        let scheduler = Arc::new(scheduler);
        let entities = Arc::new(StaticEntities::with(entities));
        Fixture {
            router: Router::new(rules.clone(), engine, dispatcher, scheduler.clone(), entities.clone()),
            rules,
            scheduler,
            entities,
            sink,
        }
    }

    fn high() -> Condition {
        Condition::new("priority", Operator::Equals, json!("high"))
    }

    fn work_order(id: &str, priority: &str) -> EntitySnapshot {
        EntitySnapshot::new(id, "work_order", json!({"priority": priority}))
    }

    async fn create(f: &Fixture, trigger: Trigger, enabled: bool) -> AutomationRule {
        let rule = AutomationRule::builder()
            .name("rule")
            .enabled(enabled)
            .trigger(trigger)
            .action(ActionConfig::new(ActionKind::ChangeStatus))
            .build()
            .unwrap();
        f.rules.create_rule(rule).await.unwrap()
    }

    #[tokio::test]
    async fn should_fire_only_matching_enabled_event_rules() {
        let f = fixture(Vec::new());
        let matching = create(&f, Trigger::event_based(["work_order_created"]).with_condition(high()), true).await;
        create(&f, Trigger::event_based(["asset_created"]), true).await;
        create(&f, Trigger::event_based(["work_order_created"]), false).await;

        let routed = f
            .router
            .route_event(DomainEvent::new("work_order_created", work_order("wo-1", "high")))
            .await;
        let executions = join_all(routed.executions).await;

        assert_eq!(executions.len(), 1);
        assert_eq!(executions[0].rule_id, matching.id);
        assert_eq!(executions[0].status, ExecutionStatus::Completed);

        let routed = f
            .router
            .route_event(DomainEvent::new("work_order_created", work_order("wo-2", "low")))
            .await;
        assert!(routed.executions.is_empty());
    }

    #[tokio::test]
    async fn should_run_scheduled_rule_for_matching_entities() {
        let f = fixture(vec![work_order("wo-1", "high"), work_order("wo-2", "low")]);
        let rule = create(
            &f,
            Trigger::time_based(Schedule::new(Frequency::Daily)).with_condition(high()),
            true,
        )
        .await;
        f.scheduler.register(&rule);
        let generation = f.scheduler.timers()[0].generation;

        let stale = FireRequest {
            rule_id: rule.id,
            generation: generation + 100,
            scheduled_for: time::now(),
        };
        assert!(f.router.handle_fire(stale).await.is_empty());

        let current = FireRequest { generation, ..stale };
        let executions = join_all(f.router.handle_fire(current).await).await;
        assert_eq!(executions.len(), 1);
        assert_eq!(executions[0].entity_id, "wo-1");
    }

    #[tokio::test]
    async fn should_fire_condition_rules_on_rising_edge_only() {
        let f = fixture(vec![work_order("wo-1", "high")]);
        create(&f, Trigger::condition_based().with_condition(high()), true).await;

        assert_eq!(join_all(f.router.check_conditions().await).await.len(), 1);
        assert!(f.router.check_conditions().await.is_empty());

        f.entities.replace(work_order("wo-1", "low"));
        assert!(f.router.check_conditions().await.is_empty());

        f.entities.replace(work_order("wo-1", "high"));
        assert_eq!(join_all(f.router.check_conditions().await).await.len(), 1);
    }

    #[tokio::test]
    async fn should_run_manual_rule_for_given_entity_without_conditions() {
        let f = fixture(vec![work_order("wo-1", "high"), work_order("wo-2", "low")]);
        let rule = create(&f, Trigger::manual().with_condition(high()), true).await;

        let explicit = f.router.run_rule(rule.id, Some(work_order("wo-9", "low"))).await.unwrap();
        assert_eq!(explicit.len(), 1);
        assert_eq!(explicit[0].entity_id, "wo-9");

        let enumerated = f.router.run_rule(rule.id, None).await.unwrap();
        assert_eq!(enumerated.len(), 1);
        assert_eq!(enumerated[0].entity_id, "wo-1");
        assert_eq!(f.sink.actions().len(), 2);
    }

    #[tokio::test]
    async fn should_refuse_to_run_disabled_or_unknown_rule() {
        let f = fixture(Vec::new());
        let disabled = create(&f, Trigger::manual(), false).await;

        assert!(matches!(
            f.router.run_rule(disabled.id, None).await,
            Err(UpkeepError::Validation(ValidationError::RuleDisabled(_)))
        ));
        assert!(matches!(
            f.router.run_rule(RuleId::new(), None).await,
            Err(UpkeepError::NotFound(_))
        ));
    }
}
