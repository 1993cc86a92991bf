//! Action handlers — what each [`ActionKind`] does when a rule runs.
//!
//! The automation engine looks every action up in an [`ActionRegistry`].
//! Notifications go through the [`Dispatcher`]; everything that changes a
//! work order, asset or request is handed to the host as an
//! [`EntityCommand`](crate::ports::EntityCommand) through its
//! [`CommandSink`].

mod forward;
mod maintenance;
mod notify;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use upkeep_domain::automation::{ActionConfig, ActionKind, AutomationRule};
use upkeep_domain::error::UpkeepError;
use upkeep_domain::event::EntitySnapshot;
use upkeep_domain::time::Timestamp;

use crate::dispatcher::Dispatcher;
use crate::ports::{CommandError, CommandSink, KeyValueStore};

pub use forward::ForwardHandler;
pub use maintenance::ScheduleMaintenanceHandler;
pub use notify::{EscalateHandler, SendNotificationHandler};

/// Everything a handler may look at while running one action.
#[derive(Debug, Clone, Copy)]
pub struct ActionContext<'a> {
    pub rule: &'a AutomationRule,
    pub action: &'a ActionConfig,
    pub entity: &'a EntitySnapshot,
    /// `entity.variables()`, computed once per execution.
    pub variables: &'a Value,
    pub now: Timestamp,
}

/// Why an action failed. Recorded on the action execution as text.
#[derive(Debug, thiserror::Error)]
pub enum ActionError {
    #[error("no handler registered for {0}")]
    NoHandler(ActionKind),

    #[error("missing parameter {0}")]
    MissingParameter(&'static str),

    #[error("invalid parameter {name}: {reason}")]
    InvalidParameter { name: &'static str, reason: String },

    #[error(transparent)]
    Upkeep(#[from] UpkeepError),

    #[error(transparent)]
    Command(#[from] CommandError),
}

#[async_trait]
pub trait ActionHandler: Send + Sync {
    /// Run the action, returning an optional result to record.
    async fn handle(&self, ctx: &ActionContext<'_>) -> Result<Option<Value>, ActionError>;
}

#[derive(Clone, Default)]
pub struct ActionRegistry {
    handlers: HashMap<ActionKind, Arc<dyn ActionHandler>>,
}

impl ActionRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The standard handlers: notifications and escalations through
    /// `dispatcher`, maintenance scheduling and every other kind forwarded
    /// to `sink`.
    pub fn with_builtins<S>(dispatcher: Arc<Dispatcher<S>>, sink: Arc<dyn CommandSink>) -> Self
    where
        S: KeyValueStore + Send + Sync + 'static,
    {
        let mut registry = Self::new();
        let forward: Arc<dyn ActionHandler> = Arc::new(ForwardHandler::new(sink.clone()));
        for kind in ActionKind::ALL {
            registry.register(kind, forward.clone());
        }
        registry.register(
            ActionKind::SendNotification,
            Arc::new(SendNotificationHandler::new(dispatcher.clone())),
        );
        registry.register(
            ActionKind::Escalate,
            Arc::new(EscalateHandler::new(dispatcher, sink.clone())),
        );
        registry.register(
            ActionKind::ScheduleMaintenance,
            Arc::new(ScheduleMaintenanceHandler::new(sink)),
        );
        registry
    }

    /// Register `handler` for `kind`, replacing any previous one.
    pub fn register(&mut self, kind: ActionKind, handler: Arc<dyn ActionHandler>) {
        self.handlers.insert(kind, handler);
    }

    #[must_use]
    pub fn contains(&self, kind: ActionKind) -> bool {
        self.handlers.contains_key(&kind)
    }

    /// Run the handler registered for the context's action kind.
    ///
    /// # Errors
    ///
    /// Returns [`ActionError::NoHandler`] when nothing is registered for the
    /// kind, otherwise whatever the handler returns.
    pub async fn dispatch(&self, ctx: &ActionContext<'_>) -> Result<Option<Value>, ActionError> {
        let kind = ctx.action.kind;
        let handler = self.handlers.get(&kind).ok_or(ActionError::NoHandler(kind))?;
        handler.handle(ctx).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::EmptyDirectory;
    use crate::testing::{InMemoryStore, RecordingSink};
    use serde_json::json;
    use upkeep_domain::time;

    fn rule() -> AutomationRule {
        AutomationRule::builder()
            .name("r")
            .action(ActionConfig::new(ActionKind::ChangeStatus))
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn should_fail_for_unregistered_kind() {
        let rule = rule();
        let entity = EntitySnapshot::new("wo-1", "work_order", json!({}));
        let variables = entity.variables();
        let ctx = ActionContext {
            rule: &rule,
            action: &rule.actions[0],
            entity: &entity,
            variables: &variables,
            now: time::now(),
        };

        let err = ActionRegistry::new().dispatch(&ctx).await.unwrap_err();
        assert_eq!(err.to_string(), "no handler registered for change_status");
    }

    #[test]
    fn should_register_every_kind_in_builtins() {
        let store = Arc::new(InMemoryStore::default());
        let dispatcher = Arc::new(Dispatcher::new(store, Arc::new(EmptyDirectory), Default::default()));
        let registry = ActionRegistry::with_builtins(dispatcher, Arc::new(RecordingSink::default()));
        assert!(ActionKind::ALL.iter().all(|kind| registry.contains(*kind)));
    }
}
