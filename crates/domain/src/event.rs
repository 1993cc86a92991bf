//! Event — an immutable record of something that happened in the host
//! application, carrying a snapshot of the entity it happened to.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::time::{self, Timestamp};

/// Well-known event names emitted by the host application. Any other name
/// is accepted as well.
pub mod names {
    pub const WORK_ORDER_CREATED: &str = "work_order_created";
    pub const WORK_ORDER_UPDATED: &str = "work_order_updated";
    pub const STATUS_CHANGED: &str = "status_changed";
    pub const PRIORITY_CHANGED: &str = "priority_changed";
    pub const WORK_ORDER_ASSIGNED: &str = "work_order_assigned";
    pub const WORK_ORDER_COMPLETED: &str = "work_order_completed";
    pub const ASSET_CREATED: &str = "asset_created";
    pub const ASSET_UPDATED: &str = "asset_updated";
    pub const REQUEST_CREATED: &str = "request_created";
    pub const MAINTENANCE_DUE: &str = "maintenance_due";
}

/// The state of a host-owned entity at the moment an event was emitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntitySnapshot {
    pub id: String,
    pub entity_type: String,
    #[serde(default = "empty_object")]
    pub data: Value,
}

fn empty_object() -> Value {
    Value::Object(Map::new())
}

impl EntitySnapshot {
    #[must_use]
    pub fn new(id: impl Into<String>, entity_type: impl Into<String>, data: Value) -> Self {
        Self {
            id: id.into(),
            entity_type: entity_type.into(),
            data,
        }
    }

    /// The variables conditions and templates are evaluated against.
    ///
    /// The snapshot's own fields sit at the top level; `id` and
    /// `entity_type` are added unless the data already defines them, and
    /// the whole snapshot is also reachable under `entity`.
    #[must_use]
    pub fn variables(&self) -> Value {
        let mut vars = match &self.data {
            Value::Object(map) => map.clone(),
            _ => Map::new(),
        };
        vars.entry("id").or_insert_with(|| Value::String(self.id.clone()));
        vars.entry("entity_type")
            .or_insert_with(|| Value::String(self.entity_type.clone()));
        vars.insert(
            "entity".to_string(),
            serde_json::json!({
                "id": self.id,
                "type": self.entity_type,
                "data": self.data,
            }),
        );
        Value::Object(vars)
    }
}

/// A named event about one entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainEvent {
    pub name: String,
    pub entity: EntitySnapshot,
    pub occurred_at: Timestamp,
}

impl DomainEvent {
    /// Create an event stamped with the current time.
    #[must_use]
    pub fn new(name: impl Into<String>, entity: EntitySnapshot) -> Self {
        Self {
            name: name.into(),
            entity,
            occurred_at: time::now(),
        }
    }
}
