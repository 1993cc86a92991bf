//! Local command sink — plays the host application against the snapshot
//! cache.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Value, json};

use upkeep_app::ports::{CommandError, CommandSink, EntityCommand};
use upkeep_domain::automation::ActionKind;
use upkeep_domain::event::EntitySnapshot;

/// Applies entity commands to a [`SnapshotCache`](crate::SnapshotCache).
///
/// Field changes are merged into the target entity; create actions add a
/// new entity with a generated id; anything else is logged and
/// acknowledged.
pub struct LocalCommandSink {
    cache: Arc<crate::SnapshotCache>,
}

impl LocalCommandSink {
    #[must_use]
    pub fn new(cache: Arc<crate::SnapshotCache>) -> Self {
        Self { cache }
    }

    async fn create(&self, entity_type: &str, command: &EntityCommand) -> Value {
        let mut data = command.parameters.clone();
        data.insert(
            "source".to_string(),
            json!({"id": command.entity_id, "type": command.entity_type}),
        );
        let snapshot = EntitySnapshot::new(uuid::Uuid::new_v4().to_string(), entity_type, Value::Object(data));
        let created = json!({"id": snapshot.id, "entity_type": snapshot.entity_type});
        self.cache.upsert(snapshot).await;
        json!({"created": created})
    }
}

#[async_trait]
impl CommandSink for LocalCommandSink {
    async fn execute(&self, command: EntityCommand) -> Result<Option<Value>, CommandError> {
        tracing::info!(
            action = %command.action,
            rule_id = %command.rule_id,
            entity_type = %command.entity_type,
            entity_id = %command.entity_id,
            "applying command locally"
        );
        let result = match command.action {
            ActionKind::CreateWorkOrder => self.create("work_order", &command).await,
            ActionKind::CreateRequest => self.create("request", &command).await,
            ActionKind::ChangeStatus
            | ActionKind::ChangePriority
            | ActionKind::AssignTechnician
            | ActionKind::ScheduleMaintenance
            | ActionKind::UpdateAsset => {
                if command.parameters.is_empty() {
                    return Err(CommandError(format!("{} needs at least one field", command.action)));
                }
                let updated = self
                    .cache
                    .merge(&command.entity_type, &command.entity_id, &command.parameters)
                    .await;
                json!({"entity": updated})
            }
            ActionKind::SendNotification | ActionKind::Escalate => {
                json!({"acknowledged": command.action})
            }
        };
        Ok(Some(result))
    }
}
