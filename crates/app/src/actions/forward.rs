//! Hand host-owned changes to the [`CommandSink`].

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};

use upkeep_domain::automation::ActionKind;
use upkeep_domain::template;

use super::{ActionContext, ActionError, ActionHandler};
use crate::ports::{CommandSink, EntityCommand};

/// Render every string inside `parameters` against `variables`.
pub(crate) fn render_parameters(parameters: &Map<String, Value>, variables: &Value) -> Map<String, Value> {
    parameters
        .iter()
        .map(|(key, value)| (key.clone(), render_value(value, variables)))
        .collect()
}

fn render_value(value: &Value, variables: &Value) -> Value {
    match value {
        Value::String(text) => Value::String(template::render(text, variables)),
        Value::Array(items) => Value::Array(items.iter().map(|v| render_value(v, variables)).collect()),
        Value::Object(map) => Value::Object(render_parameters(map, variables)),
        other => other.clone(),
    }
}

/// Build the command for `ctx` with its parameters rendered.
pub(crate) fn command(ctx: &ActionContext<'_>, action: ActionKind) -> EntityCommand {
    EntityCommand {
        action,
        rule_id: ctx.rule.id,
        entity_id: ctx.entity.id.clone(),
        entity_type: ctx.entity.entity_type.clone(),
        parameters: render_parameters(&ctx.action.parameters, ctx.variables),
    }
}

/// Forwards the action unchanged to the host.
pub struct ForwardHandler {
    sink: Arc<dyn CommandSink>,
}

impl ForwardHandler {
    pub fn new(sink: Arc<dyn CommandSink>) -> Self {
        Self { sink }
    }
}

#[async_trait]
impl ActionHandler for ForwardHandler {
    async fn handle(&self, ctx: &ActionContext<'_>) -> Result<Option<Value>, ActionError> {
        let command = command(ctx, ctx.action.kind);
        tracing::debug!(action = %command.action, entity_id = %command.entity_id, "forwarding command");
        Ok(self.sink.execute(command).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingSink;
    use serde_json::json;
    use upkeep_domain::automation::{ActionConfig, AutomationRule};
    use upkeep_domain::event::EntitySnapshot;
    use upkeep_domain::time;

    #[tokio::test]
    async fn should_forward_rendered_parameters() {
        let rule = AutomationRule::builder()
            .name("assign")
            .action(
                ActionConfig::new(ActionKind::AssignTechnician)
                    .with_parameter("technician", json!("{{site.lead}}"))
                    .with_parameter("notes", json!(["for {{id}}", 3])),
            )
            .build()
            .unwrap();
        let entity = EntitySnapshot::new("wo-7", "work_order", json!({"site": {"lead": "u9"}}));
        let variables = entity.variables();
        let ctx = ActionContext {
            rule: &rule,
            action: &rule.actions[0],
            entity: &entity,
            variables: &variables,
            now: time::now(),
        };
        let sink = Arc::new(RecordingSink::default());

        let result = ForwardHandler::new(sink.clone()).handle(&ctx).await.unwrap();

        assert_eq!(result, Some(json!({"applied": "assign_technician"})));
        let commands = sink.commands.lock().unwrap();
        assert_eq!(commands[0].entity_id, "wo-7");
        assert_eq!(commands[0].parameters["technician"], json!("u9"));
        assert_eq!(commands[0].parameters["notes"], json!(["for wo-7", 3]));
    }

    #[tokio::test]
    async fn should_surface_host_rejection() {
        let rule = AutomationRule::builder()
            .name("status")
            .action(ActionConfig::new(ActionKind::ChangeStatus))
            .build()
            .unwrap();
        let entity = EntitySnapshot::new("wo-7", "work_order", json!({}));
        let variables = entity.variables();
        let ctx = ActionContext {
            rule: &rule,
            action: &rule.actions[0],
            entity: &entity,
            variables: &variables,
            now: time::now(),
        };
        let sink = Arc::new(RecordingSink::failing_on(ActionKind::ChangeStatus));

        let err = ForwardHandler::new(sink).handle(&ctx).await.unwrap_err();
        assert_eq!(err.to_string(), "host rejected change_status");
    }
}
