//! Action — one step of a rule's pipeline.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::condition::Condition;

/// The closed set of actions a rule can run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    CreateWorkOrder,
    AssignTechnician,
    SendNotification,
    Escalate,
    ChangePriority,
    ChangeStatus,
    CreateRequest,
    ScheduleMaintenance,
    UpdateAsset,
}

impl ActionKind {
    pub const ALL: [Self; 9] = [
        Self::CreateWorkOrder,
        Self::AssignTechnician,
        Self::SendNotification,
        Self::Escalate,
        Self::ChangePriority,
        Self::ChangeStatus,
        Self::CreateRequest,
        Self::ScheduleMaintenance,
        Self::UpdateAsset,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::CreateWorkOrder => "create_work_order",
            Self::AssignTechnician => "assign_technician",
            Self::SendNotification => "send_notification",
            Self::Escalate => "escalate",
            Self::ChangePriority => "change_priority",
            Self::ChangeStatus => "change_status",
            Self::CreateRequest => "create_request",
            Self::ScheduleMaintenance => "schedule_maintenance",
            Self::UpdateAsset => "update_asset",
        }
    }
}

impl std::fmt::Display for ActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A configured action: what to do, with which parameters, after how long,
/// and under which guard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionConfig {
    #[serde(rename = "type")]
    pub kind: ActionKind,
    #[serde(default)]
    pub parameters: Map<String, Value>,
    /// Minutes to wait before running this action. Only this pipeline waits.
    #[serde(default, rename = "delay")]
    pub delay_minutes: u32,
    /// When present and false for the entity, the action is skipped.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<Condition>,
}

impl ActionConfig {
    #[must_use]
    pub fn new(kind: ActionKind) -> Self {
        Self {
            kind,
            parameters: Map::new(),
            delay_minutes: 0,
            condition: None,
        }
    }

    #[must_use]
    pub fn with_parameter(mut self, key: impl Into<String>, value: Value) -> Self {
        self.parameters.insert(key.into(), value);
        self
    }

    #[must_use]
    pub fn with_delay(mut self, minutes: u32) -> Self {
        self.delay_minutes = minutes;
        self
    }

    #[must_use]
    pub fn with_condition(mut self, condition: Condition) -> Self {
        self.condition = Some(condition);
        self
    }

    #[must_use]
    pub fn delay(&self) -> Duration {
        Duration::from_secs(u64::from(self.delay_minutes) * 60)
    }

    /// A string parameter, if present.
    #[must_use]
    pub fn str_param(&self, key: &str) -> Option<&str> {
        self.parameters.get(key).and_then(Value::as_str)
    }
}
