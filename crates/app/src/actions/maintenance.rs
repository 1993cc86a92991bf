//! `schedule_maintenance`: work out the next due date and hand it to the
//! host.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate};
use serde_json::{Value, json};

use upkeep_domain::path;
use upkeep_domain::recurrence::{self, RecurrenceSpec};

use super::forward::command;
use super::{ActionContext, ActionError, ActionHandler};
use crate::ports::CommandSink;

const DEFAULT_FROM_FIELD: &str = "due_date";

/// Parses `YYYY-MM-DD` or an RFC 3339 timestamp.
fn parse_date(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .or_else(|| DateTime::parse_from_rfc3339(raw).ok().map(|dt| dt.date_naive()))
}

pub struct ScheduleMaintenanceHandler {
    sink: Arc<dyn CommandSink>,
}

impl ScheduleMaintenanceHandler {
    pub fn new(sink: Arc<dyn CommandSink>) -> Self {
        Self { sink }
    }
}

#[async_trait]
impl ActionHandler for ScheduleMaintenanceHandler {
    async fn handle(&self, ctx: &ActionContext<'_>) -> Result<Option<Value>, ActionError> {
        let spec: RecurrenceSpec = ctx
            .action
            .parameters
            .get("recurrence")
            .cloned()
            .ok_or(ActionError::MissingParameter("recurrence"))
            .and_then(|raw| {
                serde_json::from_value(raw).map_err(|err| ActionError::InvalidParameter {
                    name: "recurrence",
                    reason: err.to_string(),
                })
            })?;

        let field = ctx.action.str_param("from_field").unwrap_or(DEFAULT_FROM_FIELD);
        // No usable date on the entity: count from today.
        let current = path::resolve(ctx.variables, field)
            .and_then(Value::as_str)
            .and_then(parse_date)
            .unwrap_or_else(|| ctx.now.date_naive());

        let next = recurrence::next_due_date(current, &spec).ok_or_else(|| ActionError::InvalidParameter {
            name: "recurrence",
            reason: "no next occurrence".to_string(),
        })?;

        let mut command = command(ctx, ctx.action.kind);
        command
            .parameters
            .insert("next_due_date".to_string(), json!(next.to_string()));
        let host = self.sink.execute(command).await?;
        tracing::debug!(entity_id = %ctx.entity.id, %current, %next, "maintenance scheduled");

        Ok(Some(json!({
            "next_due_date": next.to_string(),
            "host": host,
        })))
    }
}
