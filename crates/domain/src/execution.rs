//! Execution — one run of a rule's action pipeline against one entity.
//!
//! An [`Execution`] starts `running` with every [`ActionExecution`]
//! `pending`. Actions are marked as the pipeline advances; [`Execution::finish`]
//! derives the final status from them.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::automation::{ActionConfig, ActionKind};
use crate::event::EntitySnapshot;
use crate::id::{ExecutionId, RuleId};
use crate::time::Timestamp;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl ExecutionStatus {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Skipped,
}

/// Outcome of one action within an execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionExecution {
    pub action_type: ActionKind,
    pub status: ActionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<Timestamp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<Timestamp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
}

impl ActionExecution {
    #[must_use]
    pub fn pending(action_type: ActionKind) -> Self {
        Self {
            action_type,
            status: ActionStatus::Pending,
            started_at: None,
            completed_at: None,
            error: None,
            result: None,
        }
    }
}

/// A rule firing and the state of each of its actions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Execution {
    pub id: ExecutionId,
    pub rule_id: RuleId,
    pub entity_id: String,
    pub entity_type: String,
    pub status: ExecutionStatus,
    pub started_at: Timestamp,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<Timestamp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub actions: Vec<ActionExecution>,
}

impl Execution {
    /// Start an execution for `entity` with one pending entry per action.
    #[must_use]
    pub fn start(
        rule_id: RuleId,
        entity: &EntitySnapshot,
        actions: &[ActionConfig],
        at: Timestamp,
    ) -> Self {
        Self {
            id: ExecutionId::new(),
            rule_id,
            entity_id: entity.id.clone(),
            entity_type: entity.entity_type.clone(),
            status: ExecutionStatus::Running,
            started_at: at,
            completed_at: None,
            error: None,
            actions: actions
                .iter()
                .map(|action| ActionExecution::pending(action.kind))
                .collect(),
        }
    }

    // Out-of-range indexes are ignored; the engine only ever passes
    // positions of the pipeline it started with.
    fn action_mut(&mut self, index: usize) -> Option<&mut ActionExecution> {
        self.actions.get_mut(index)
    }

    pub fn mark_running(&mut self, index: usize, at: Timestamp) {
        if let Some(action) = self.action_mut(index) {
            action.status = ActionStatus::Running;
            action.started_at = Some(at);
        }
    }

    pub fn mark_completed(&mut self, index: usize, result: Option<Value>, at: Timestamp) {
        if let Some(action) = self.action_mut(index) {
            action.status = ActionStatus::Completed;
            action.completed_at = Some(at);
            action.result = result;
        }
    }

    pub fn mark_failed(&mut self, index: usize, error: impl Into<String>, at: Timestamp) {
        if let Some(action) = self.action_mut(index) {
            action.status = ActionStatus::Failed;
            action.completed_at = Some(at);
            action.error = Some(error.into());
        }
    }

    pub fn mark_skipped(&mut self, index: usize, at: Timestamp) {
        if let Some(action) = self.action_mut(index) {
            action.status = ActionStatus::Skipped;
            action.completed_at = Some(at);
        }
    }

    /// Derive the terminal status from the actions.
    ///
    /// `completed` only when every action is completed or skipped;
    /// otherwise `failed` with the first action error recorded.
    pub fn finish(&mut self, at: Timestamp) {
        let all_done = self
            .actions
            .iter()
            .all(|a| matches!(a.status, ActionStatus::Completed | ActionStatus::Skipped));
        if all_done {
            self.status = ExecutionStatus::Completed;
        } else {
            self.status = ExecutionStatus::Failed;
            self.error = self
                .actions
                .iter()
                .find(|a| a.status == ActionStatus::Failed)
                .and_then(|a| a.error.clone())
                .or_else(|| Some("execution ended with unfinished actions".to_string()));
        }
        self.completed_at = Some(at);
    }

    /// Cancel a running execution, leaving unfinished actions as they are.
    pub fn cancel(&mut self, at: Timestamp) {
        if !self.status.is_terminal() {
            self.status = ExecutionStatus::Cancelled;
            self.completed_at = Some(at);
        }
    }

    /// Wall-clock run time, once finished.
    #[must_use]
    pub fn duration_ms(&self) -> Option<i64> {
        self.completed_at
            .map(|end| (end - self.started_at).num_milliseconds())
    }
}

/// Read-only aggregate over the execution log.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionStats {
    pub total: usize,
    pub running: usize,
    pub completed: usize,
    pub failed: usize,
    pub cancelled: usize,
    /// Completed over finished executions, `0.0` when none finished.
    pub success_rate: f64,
    /// Mean duration of finished executions in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub average_duration_ms: Option<f64>,
}

impl ExecutionStats {
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn from_executions<'a>(executions: impl IntoIterator<Item = &'a Execution>) -> Self {
        let mut stats = Self::default();
        let mut durations: Vec<i64> = Vec::new();
        for execution in executions {
            stats.total += 1;
            match execution.status {
                ExecutionStatus::Pending | ExecutionStatus::Running => stats.running += 1,
                ExecutionStatus::Completed => stats.completed += 1,
                ExecutionStatus::Failed => stats.failed += 1,
                ExecutionStatus::Cancelled => stats.cancelled += 1,
            }
            if let Some(ms) = execution.duration_ms() {
                durations.push(ms);
            }
        }
        let finished = stats.completed + stats.failed + stats.cancelled;
        if finished > 0 {
            stats.success_rate = stats.completed as f64 / finished as f64;
        }
        if !durations.is_empty() {
            let sum: i64 = durations.iter().sum();
            stats.average_duration_ms = Some(sum as f64 / durations.len() as f64);
        }
        stats
    }
}
