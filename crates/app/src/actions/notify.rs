//! Notification actions: `send_notification` and `escalate`.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Value, json};

use upkeep_domain::automation::ActionKind;
use upkeep_domain::id::TemplateId;
use upkeep_domain::notification::{Channel, MessageOrigin, NotificationMessage, Priority};
use upkeep_domain::template;

use super::forward::command;
use super::{ActionContext, ActionError, ActionHandler};
use crate::dispatcher::{Dispatcher, SendRequest};
use crate::ports::{CommandSink, KeyValueStore};

/// `channel` (one name) or `channels` (a list).
fn channels(ctx: &ActionContext<'_>) -> Result<Option<Vec<Channel>>, ActionError> {
    let names = match (ctx.action.parameters.get("channels"), ctx.action.parameters.get("channel")) {
        (Some(list), _) => string_list(list, ctx.variables),
        (None, Some(one)) => string_list(one, ctx.variables),
        (None, None) => return Ok(None),
    };
    names
        .iter()
        .map(|name| {
            name.parse::<Channel>().map_err(|err| ActionError::InvalidParameter {
                name: "channels",
                reason: err.to_string(),
            })
        })
        .collect::<Result<Vec<_>, _>>()
        .map(Some)
}

/// A string or an array of strings, each rendered against `variables`.
fn string_list(value: &Value, variables: &Value) -> Vec<String> {
    match value {
        Value::String(one) => vec![template::render(one, variables)],
        Value::Array(items) => items
            .iter()
            .filter_map(Value::as_str)
            .map(|item| template::render(item, variables))
            .filter(|item| !item.is_empty())
            .collect(),
        _ => Vec::new(),
    }
}

fn priority(ctx: &ActionContext<'_>, default: Priority) -> Result<Priority, ActionError> {
    match ctx.action.parameters.get("priority") {
        None => Ok(default),
        Some(value) => serde_json::from_value(value.clone()).map_err(|err| ActionError::InvalidParameter {
            name: "priority",
            reason: err.to_string(),
        }),
    }
}

fn template_id(ctx: &ActionContext<'_>) -> Result<Option<TemplateId>, ActionError> {
    ctx.action
        .str_param("template_id")
        .map(|raw| {
            raw.parse().map_err(|_| ActionError::InvalidParameter {
                name: "template_id",
                reason: format!("{raw} is not a template id"),
            })
        })
        .transpose()
}

fn request(ctx: &ActionContext<'_>, channels: Vec<Channel>, recipients: Vec<String>) -> SendRequest {
    let mut request = SendRequest {
        channels,
        recipients,
        subject: ctx.action.str_param("subject").map(str::to_string),
        body: ctx.action.str_param("body").map(str::to_string),
        origin: Some(MessageOrigin::Automation(ctx.rule.id)),
        ..SendRequest::default()
    }
    .about(ctx.entity);
    request.metadata.triggered_by = Some(ctx.rule.name.clone());
    request
}

fn summary(messages: &[NotificationMessage]) -> Value {
    json!({
        "messages": messages.iter().map(|m| m.id.to_string()).collect::<Vec<_>>(),
        "count": messages.len(),
    })
}

/// Queues a notification about the entity. Queuing is success; delivery
/// outcomes are tracked on the messages.
pub struct SendNotificationHandler<S> {
    dispatcher: Arc<Dispatcher<S>>,
}

impl<S> SendNotificationHandler<S> {
    pub fn new(dispatcher: Arc<Dispatcher<S>>) -> Self {
        Self { dispatcher }
    }
}

#[async_trait]
impl<S: KeyValueStore + Send + Sync + 'static> ActionHandler for SendNotificationHandler<S> {
    async fn handle(&self, ctx: &ActionContext<'_>) -> Result<Option<Value>, ActionError> {
        let channels = channels(ctx)?.ok_or(ActionError::MissingParameter("channel"))?;
        let recipients = ctx
            .action
            .parameters
            .get("recipients")
            .map(|value| string_list(value, ctx.variables))
            .unwrap_or_default();

        let mut request = request(ctx, channels, recipients);
        request.template_id = template_id(ctx)?;
        request.priority = priority(ctx, Priority::Normal)?;
        if request.template_id.is_none() && request.body.is_none() {
            request.body = Some(format!(
                "{} triggered for {} {}",
                ctx.rule.name, ctx.entity.entity_type, ctx.entity.id
            ));
        }

        let messages = self.dispatcher.send_at(request, ctx.now).await?;
        Ok(Some(summary(&messages)))
    }
}

/// Sends an urgent notification to `escalate_to` and asks the host to
/// escalate the entity itself.
pub struct EscalateHandler<S> {
    dispatcher: Arc<Dispatcher<S>>,
    sink: Arc<dyn CommandSink>,
}

impl<S> EscalateHandler<S> {
    pub fn new(dispatcher: Arc<Dispatcher<S>>, sink: Arc<dyn CommandSink>) -> Self {
        Self { dispatcher, sink }
    }
}

#[async_trait]
impl<S: KeyValueStore + Send + Sync + 'static> ActionHandler for EscalateHandler<S> {
    async fn handle(&self, ctx: &ActionContext<'_>) -> Result<Option<Value>, ActionError> {
        let escalate_to = ctx
            .action
            .parameters
            .get("escalate_to")
            .map(|value| string_list(value, ctx.variables))
            .filter(|targets| !targets.is_empty())
            .ok_or(ActionError::MissingParameter("escalate_to"))?;
        let channels = channels(ctx)?.unwrap_or_else(|| vec![Channel::Email]);

        let mut request = request(ctx, channels, escalate_to);
        request.priority = priority(ctx, Priority::Urgent)?;
        if request.body.is_none() {
            request.body = Some(ctx.action.str_param("message").map_or_else(
                || {
                    format!(
                        "Escalation: {} {} requires attention ({})",
                        ctx.entity.entity_type, ctx.entity.id, ctx.rule.name
                    )
                },
                str::to_string,
            ));
        }

        let messages = self.dispatcher.send_at(request, ctx.now).await?;
        let host = self.sink.execute(command(ctx, ActionKind::Escalate)).await?;
        tracing::info!(rule_id = %ctx.rule.id, entity_id = %ctx.entity.id, "entity escalated");

        let mut result = summary(&messages);
        result["host"] = host.unwrap_or(Value::Null);
        Ok(Some(result))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatcher::DispatcherSettings;
    use crate::ports::EmptyDirectory;
    use crate::testing::{InMemoryStore, ProviderMode, RecordingProvider, RecordingSink};
    use upkeep_domain::automation::{ActionConfig, AutomationRule};
    use upkeep_domain::event::EntitySnapshot;
    use upkeep_domain::notification::MessageStatus;
    use upkeep_domain::time;

    struct Fixture {
        dispatcher: Arc<Dispatcher<InMemoryStore>>,
        provider: Arc<RecordingProvider>,
        sink: Arc<RecordingSink>,
    }

    async fn fixture() -> Fixture {
        let dispatcher = Arc::new(Dispatcher::new(
            Arc::new(InMemoryStore::default()),
            Arc::new(EmptyDirectory),
            DispatcherSettings::default(),
        ));
        let provider = Arc::new(RecordingProvider::new(ProviderMode::Accept));
        dispatcher.set_provider(Channel::Email, provider.clone()).await;
        Fixture {
            dispatcher,
            provider,
            sink: Arc::new(RecordingSink::default()),
        }
    }

    fn rule(action: ActionConfig) -> AutomationRule {
        AutomationRule::builder().name("Overdue").action(action).build().unwrap()
    }

    fn entity() -> EntitySnapshot {
        EntitySnapshot::new("wo-3", "work_order", json!({"title": "Chiller", "owner": "u4"}))
    }

    async fn run(handler: &dyn ActionHandler, rule: &AutomationRule) -> Result<Option<Value>, ActionError> {
        let entity = entity();
        let variables = entity.variables();
        let ctx = ActionContext {
            rule,
            action: &rule.actions[0],
            entity: &entity,
            variables: &variables,
            now: time::now(),
        };
        handler.handle(&ctx).await
    }

    #[tokio::test]
    async fn should_send_rendered_notification() {
        let f = fixture().await;
        let rule = rule(
            ActionConfig::new(ActionKind::SendNotification)
                .with_parameter("channel", json!("email"))
                .with_parameter("recipients", json!(["{{owner}}"]))
                .with_parameter("subject", json!("{{title}} overdue")),
        );

        let result = run(&SendNotificationHandler::new(f.dispatcher.clone()), &rule)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(result["count"], json!(1));
        let messages = f.dispatcher.get_messages(10).await;
        assert_eq!(messages[0].recipients, vec!["u4"]);
        assert_eq!(messages[0].subject.as_deref(), Some("Chiller overdue"));
        assert_eq!(messages[0].body, "Overdue triggered for work_order wo-3");
        assert_eq!(messages[0].origin, Some(MessageOrigin::Automation(rule.id)));
        assert_eq!(f.provider.calls(), 1);
    }

    #[tokio::test]
    async fn should_require_a_channel() {
        let f = fixture().await;
        let rule = rule(ActionConfig::new(ActionKind::SendNotification));
        let err = run(&SendNotificationHandler::new(f.dispatcher), &rule).await.unwrap_err();
        assert_eq!(err.to_string(), "missing parameter channel");
    }

    #[tokio::test]
    async fn should_reject_unknown_channel_name() {
        let f = fixture().await;
        let rule = rule(ActionConfig::new(ActionKind::SendNotification).with_parameter("channels", json!(["email", "fax"])));
        let err = run(&SendNotificationHandler::new(f.dispatcher), &rule).await.unwrap_err();
        assert!(matches!(err, ActionError::InvalidParameter { name: "channels", .. }));
    }

    #[tokio::test]
    async fn should_escalate_with_urgent_message_and_host_command() {
        let f = fixture().await;
        let rule = rule(ActionConfig::new(ActionKind::Escalate).with_parameter("escalate_to", json!("supervisor")));

        let result = run(&EscalateHandler::new(f.dispatcher.clone(), f.sink.clone()), &rule)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(result["host"], json!({"applied": "escalate"}));
        let messages = f.dispatcher.get_messages(10).await;
        assert_eq!(messages[0].priority, Priority::Urgent);
        assert_eq!(messages[0].recipients, vec!["supervisor"]);
        assert_eq!(messages[0].status, MessageStatus::Sent);
        assert_eq!(f.sink.actions(), vec![ActionKind::Escalate]);
    }

    #[tokio::test]
    async fn should_require_escalation_target() {
        let f = fixture().await;
        let rule = rule(ActionConfig::new(ActionKind::Escalate));
        let err = run(&EscalateHandler::new(f.dispatcher, f.sink.clone()), &rule)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "missing parameter escalate_to");
        assert!(f.sink.actions().is_empty());
    }
}
