//! Command sink port — actions that change host-owned entities.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use upkeep_domain::automation::ActionKind;
use upkeep_domain::id::RuleId;

/// A request for the host to change one of its entities.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityCommand {
    pub action: ActionKind,
    pub rule_id: RuleId,
    pub entity_id: String,
    pub entity_type: String,
    /// Action parameters with string values already rendered against the
    /// entity.
    pub parameters: Map<String, Value>,
}

/// The host refused or failed a command.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct CommandError(pub String);

/// Receives commands for work orders, assets and requests.
#[async_trait]
pub trait CommandSink: Send + Sync {
    /// Apply `command`, returning an optional result recorded on the action.
    async fn execute(&self, command: EntityCommand) -> Result<Option<Value>, CommandError>;
}
