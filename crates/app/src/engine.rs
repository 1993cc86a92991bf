//! Engine — the single composed automation and notification engine of a
//! process.
//!
//! Construct it once, wrap it in an `Arc`, [`load`](Engine::load) the
//! persisted state and [`start`](Engine::start) the background loops:
//!
//! - event loop: routes every emitted event,
//! - fire loop: runs scheduled rules when their timers fire,
//! - condition loop: re-evaluates condition-based rules on a tick,
//! - drain loop: delivers due and retrying notifications on a tick.
//!
//! Callers only enqueue (`emit`, `send`, rule CRUD) and read; all work
//! happens on the loops and the tasks they spawn.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;

use upkeep_domain::automation::AutomationRule;
use upkeep_domain::error::UpkeepError;
use upkeep_domain::event::{DomainEvent, EntitySnapshot};
use upkeep_domain::execution::{Execution, ExecutionStats};
use upkeep_domain::id::{ExecutionId, MessageId, RuleId};
use upkeep_domain::notification::{Channel, NotificationMessage, NotificationStats};
use upkeep_domain::time;

use crate::actions::ActionRegistry;
use crate::automation_engine::AutomationEngine;
use crate::dispatcher::{Dispatcher, DispatcherSettings, SendRequest};
use crate::event_bus::{self, InProcessEventBus};
use crate::execution_log::{self, ExecutionLog};
use crate::ports::{
    CommandSink, EntitySource, EventPublisher, KeyValueStore, MemberDirectory, NotificationProvider,
};
use crate::router::{self, Router};
use crate::scheduler::{Clock, FireRequest, Scheduler, TimerInfo};
use crate::services::{
    AutomationRuleService, NotificationRuleService, RecipientService, TemplateService,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineSettings {
    pub dispatcher: DispatcherSettings,
    pub drain_interval: Duration,
    pub condition_check_interval: Duration,
    pub max_executions: usize,
    pub event_capacity: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            dispatcher: DispatcherSettings::default(),
            drain_interval: Duration::from_secs(30),
            condition_check_interval: Duration::from_secs(60),
            max_executions: execution_log::DEFAULT_MAX_RETAINED,
            event_capacity: event_bus::DEFAULT_CAPACITY,
        }
    }
}

/// Running background loops. Dropping the handle stops them too.
///
/// Only the handle returned by the first [`Engine::start`] owns the loops
/// and timers. Shutting down any later handle leaves them running.
pub struct EngineHandle {
    shutdown: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
    scheduler: Option<Arc<Scheduler>>,
}

impl EngineHandle {
    /// Stop every loop and timer and wait for the loops to exit.
    /// Executions already running are left to finish on their own.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        if let Some(scheduler) = &self.scheduler {
            scheduler.shutdown();
        }
        for task in self.tasks {
            if let Err(err) = task.await {
                tracing::error!(error = %err, "engine loop panicked");
            }
        }
        tracing::info!("engine stopped");
    }
}

pub struct Engine<S, E> {
    rules: Arc<AutomationRuleService<S>>,
    log: Arc<ExecutionLog<S>>,
    dispatcher: Arc<Dispatcher<S>>,
    scheduler: Arc<Scheduler>,
    router: Arc<Router<S, E>>,
    bus: InProcessEventBus,
    fire_rx: Mutex<Option<mpsc::UnboundedReceiver<FireRequest>>>,
    settings: EngineSettings,
}

impl<S, E> Engine<S, E>
where
    S: KeyValueStore + Send + Sync + 'static,
    E: EntitySource + Send + Sync + 'static,
{
    pub fn new(
        store: Arc<S>,
        entities: Arc<E>,
        directory: Arc<dyn MemberDirectory>,
        sink: Arc<dyn CommandSink>,
        settings: EngineSettings,
    ) -> Self {
        Self::with_clock(store, entities, directory, sink, settings, Arc::new(time::now))
    }

    /// Like [`Engine::new`], with timers armed and fired on `clock`.
    pub fn with_clock(
        store: Arc<S>,
        entities: Arc<E>,
        directory: Arc<dyn MemberDirectory>,
        sink: Arc<dyn CommandSink>,
        settings: EngineSettings,
        clock: Clock,
    ) -> Self {
        let rules = Arc::new(AutomationRuleService::new(store.clone()));
        let log = Arc::new(ExecutionLog::new(store.clone(), settings.max_executions));
        let dispatcher = Arc::new(Dispatcher::new(store, directory, settings.dispatcher));
        let registry = ActionRegistry::with_builtins(dispatcher.clone(), sink);
        let automation = Arc::new(AutomationEngine::new(rules.clone(), log.clone(), registry));
        let (scheduler, fire_rx) = Scheduler::with_clock(clock);
        let scheduler = Arc::new(scheduler);
        let router = Arc::new(Router::new(
            rules.clone(),
            automation,
            dispatcher.clone(),
            scheduler.clone(),
            entities,
        ));

        Self {
            rules,
            log,
            dispatcher,
            scheduler,
            router,
            bus: InProcessEventBus::new(settings.event_capacity),
            fire_rx: Mutex::new(Some(fire_rx)),
            settings,
        }
    }

    /// Load every collection and arm timers for scheduled rules.
    ///
    /// # Errors
    ///
    /// Returns a storage error if any collection cannot be read.
    pub async fn load(&self) -> Result<(), UpkeepError> {
        let rules = self.rules.load().await?;
        let executions = self.log.load().await?;
        self.dispatcher.load().await?;
        let armed = self.scheduler.restore(&self.rules.list_rules().await);
        tracing::info!(rules, executions, armed, "engine loaded");
        Ok(())
    }

    /// Spawn the background loops. Calling it a second time starts nothing.
    pub fn start(self: &Arc<Self>) -> EngineHandle {
        let (shutdown, stop) = watch::channel(false);
        let mut tasks = Vec::new();
        let mut scheduler = None;

        let fire_rx = self.fire_rx.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(fire_rx) = fire_rx {
            scheduler = Some(Arc::clone(&self.scheduler));
            let events = self.bus.subscribe();
            tasks.push(tokio::spawn(Arc::clone(self).event_loop(events, stop.clone())));
            tasks.push(tokio::spawn(Arc::clone(self).fire_loop(fire_rx, stop.clone())));
            tasks.push(tokio::spawn(Arc::clone(self).condition_loop(stop.clone())));
            tasks.push(tokio::spawn(Arc::clone(self).drain_loop(stop)));
            tracing::info!(
                drain_interval_secs = self.settings.drain_interval.as_secs(),
                condition_check_interval_secs = self.settings.condition_check_interval.as_secs(),
                "engine started"
            );
        } else {
            tracing::warn!("engine already started");
        }

        EngineHandle {
            shutdown,
            tasks,
            scheduler,
        }
    }

    async fn event_loop(
        self: Arc<Self>,
        mut events: broadcast::Receiver<DomainEvent>,
        mut stop: watch::Receiver<bool>,
    ) {
        loop {
            tokio::select! {
                _ = stop.changed() => break,
                received = events.recv() => match received {
                    Ok(event) => {
                        let router = Arc::clone(&self.router);
                        tokio::spawn(async move {
                            router.route_event(event).await;
                        });
                    }
                    Err(RecvError::Lagged(missed)) => {
                        tracing::warn!(missed, "event loop fell behind, events dropped");
                    }
                    Err(RecvError::Closed) => break,
                },
            }
        }
    }

    async fn fire_loop(
        self: Arc<Self>,
        mut fires: mpsc::UnboundedReceiver<FireRequest>,
        mut stop: watch::Receiver<bool>,
    ) {
        loop {
            tokio::select! {
                _ = stop.changed() => break,
                request = fires.recv() => match request {
                    Some(request) => {
                        let router = Arc::clone(&self.router);
                        tokio::spawn(async move {
                            router.handle_fire(request).await;
                        });
                    }
                    None => break,
                },
            }
        }
    }

    async fn condition_loop(self: Arc<Self>, mut stop: watch::Receiver<bool>) {
        let mut tick = tokio::time::interval(self.settings.condition_check_interval);
        loop {
            tokio::select! {
                _ = stop.changed() => break,
                _ = tick.tick() => {
                    self.router.check_conditions().await;
                }
            }
        }
    }

    async fn drain_loop(self: Arc<Self>, mut stop: watch::Receiver<bool>) {
        let mut tick = tokio::time::interval(self.settings.drain_interval);
        loop {
            tokio::select! {
                _ = stop.changed() => break,
                _ = tick.tick() => {
                    self.dispatcher.drain_due(time::now()).await;
                }
            }
        }
    }

    // ── Automation rules ───────────────────────────────────────────

    /// # Errors
    ///
    /// Returns [`UpkeepError::Validation`] for an invalid rule or a taken
    /// id, or a storage error.
    pub async fn create_rule(&self, rule: AutomationRule) -> Result<AutomationRule, UpkeepError> {
        let rule = self.rules.create_rule(rule).await?;
        self.scheduler.register(&rule);
        Ok(rule)
    }

    /// # Errors
    ///
    /// Returns [`UpkeepError::NotFound`] for an unknown rule.
    pub async fn get_rule(&self, id: RuleId) -> Result<AutomationRule, UpkeepError> {
        self.rules.get_rule(id).await
    }

    pub async fn list_rules(&self) -> Vec<AutomationRule> {
        self.rules.list_rules().await
    }

    /// Replace a rule and re-arm (or cancel) its timer.
    ///
    /// # Errors
    ///
    /// Returns [`UpkeepError::NotFound`] for an unknown rule,
    /// [`UpkeepError::Validation`] for an invalid one, or a storage error.
    pub async fn update_rule(&self, rule: AutomationRule) -> Result<AutomationRule, UpkeepError> {
        let rule = self.rules.update_rule(rule).await?;
        self.scheduler.register(&rule);
        Ok(rule)
    }

    /// # Errors
    ///
    /// Returns [`UpkeepError::NotFound`] for an unknown rule, or a storage
    /// error.
    pub async fn set_enabled(&self, id: RuleId, enabled: bool) -> Result<AutomationRule, UpkeepError> {
        let rule = self.rules.set_enabled(id, enabled).await?;
        self.scheduler.register(&rule);
        Ok(rule)
    }

    /// Delete a rule and cancel its timer. Executions already running
    /// finish normally.
    ///
    /// # Errors
    ///
    /// Returns [`UpkeepError::NotFound`] for an unknown rule, or a storage
    /// error.
    pub async fn delete_rule(&self, id: RuleId) -> Result<(), UpkeepError> {
        self.rules.delete_rule(id).await?;
        self.scheduler.cancel(id);
        Ok(())
    }

    /// Run a rule now. See [`Router::run_rule`].
    ///
    /// # Errors
    ///
    /// Returns [`UpkeepError::NotFound`] for an unknown rule or a
    /// validation error for a disabled one.
    pub async fn run_rule(&self, id: RuleId, entity: Option<EntitySnapshot>) -> Result<Vec<Execution>, UpkeepError> {
        self.router.run_rule(id, entity).await
    }

    // ── Events ─────────────────────────────────────────────────────

    /// Publish an event for the event loop. Returns without waiting for
    /// any rule.
    ///
    /// # Errors
    ///
    /// Propagates a publishing error from the bus.
    pub async fn emit(&self, name: impl Into<String>, entity: EntitySnapshot) -> Result<(), UpkeepError> {
        self.bus.publish(DomainEvent::new(name, entity)).await
    }

    /// Route an event directly and wait for the executions it starts.
    pub async fn process_event(&self, event: DomainEvent) -> (Vec<Execution>, Vec<NotificationMessage>) {
        let routed = self.router.route_event(event).await;
        (router::join_all(routed.executions).await, routed.notifications)
    }

    // ── Notifications ──────────────────────────────────────────────

    pub async fn set_provider(&self, channel: Channel, provider: Arc<dyn NotificationProvider>) {
        self.dispatcher.set_provider(channel, provider).await;
    }

    /// # Errors
    ///
    /// See [`Dispatcher::send`].
    pub async fn send(&self, request: SendRequest) -> Result<Vec<NotificationMessage>, UpkeepError> {
        self.dispatcher.send(request).await
    }

    /// # Errors
    ///
    /// Returns [`UpkeepError::NotFound`] for an unknown message.
    pub async fn mark_read(&self, id: MessageId) -> Result<NotificationMessage, UpkeepError> {
        self.dispatcher.mark_read(id).await
    }

    pub async fn get_message(&self, id: MessageId) -> Option<NotificationMessage> {
        self.dispatcher.get_message(id).await
    }

    pub async fn get_messages(&self, limit: usize) -> Vec<NotificationMessage> {
        self.dispatcher.get_messages(limit).await
    }

    pub async fn get_stats(&self) -> NotificationStats {
        self.dispatcher.get_stats().await
    }

    pub fn notification_rules(&self) -> &NotificationRuleService<S> {
        self.dispatcher.notification_rules()
    }

    pub fn templates(&self) -> &TemplateService<S> {
        self.dispatcher.templates()
    }

    pub fn recipients(&self) -> &RecipientService<S> {
        self.dispatcher.recipients()
    }

    // ── Read models ────────────────────────────────────────────────

    pub async fn get_executions(&self, rule_id: Option<RuleId>) -> Vec<Execution> {
        self.log.list(rule_id).await
    }

    pub async fn get_execution(&self, id: ExecutionId) -> Option<Execution> {
        self.log.get(id).await
    }

    pub async fn get_execution_stats(&self) -> ExecutionStats {
        self.log.stats().await
    }

    #[must_use]
    pub fn scheduled_timers(&self) -> Vec<TimerInfo> {
        self.scheduler.timers()
    }
}
