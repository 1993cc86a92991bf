//! Trigger — what activates a rule, and the conditions that must hold.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::schedule::Schedule;
use crate::condition::{self, Condition};
use crate::error::ValidationError;

/// The activation source of a rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TriggerKind {
    /// Fires when one of the named domain events is emitted.
    EventBased { events: BTreeSet<String> },
    /// Fires on a recurring schedule against every known entity.
    TimeBased { schedule: Schedule },
    /// Fires when the conditions start holding for an entity.
    ConditionBased,
    /// Fires only when run explicitly.
    Manual,
}

/// A trigger: its kind plus conditions that are ANDed against the
/// entity snapshot before the rule fires.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trigger {
    #[serde(flatten)]
    pub kind: TriggerKind,
    #[serde(default)]
    pub conditions: Vec<Condition>,
}

impl Trigger {
    #[must_use]
    pub fn event_based<I, S>(events: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::from_kind(TriggerKind::EventBased {
            events: events.into_iter().map(Into::into).collect(),
        })
    }

    #[must_use]
    pub fn time_based(schedule: Schedule) -> Self {
        Self::from_kind(TriggerKind::TimeBased { schedule })
    }

    #[must_use]
    pub fn condition_based() -> Self {
        Self::from_kind(TriggerKind::ConditionBased)
    }

    #[must_use]
    pub fn manual() -> Self {
        Self::from_kind(TriggerKind::Manual)
    }

    fn from_kind(kind: TriggerKind) -> Self {
        Self {
            kind,
            conditions: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_condition(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    /// Whether an event with this name activates the trigger.
    ///
    /// Only event-based triggers ever match; the others are activated by
    /// the scheduler, the condition tick or an explicit run.
    #[must_use]
    pub fn matches_event(&self, name: &str) -> bool {
        match &self.kind {
            TriggerKind::EventBased { events } => events.contains(name),
            _ => false,
        }
    }

    /// Whether the trigger's conditions hold for a snapshot.
    #[must_use]
    pub fn conditions_hold(&self, snapshot: &serde_json::Value) -> bool {
        condition::evaluate(&self.conditions, snapshot)
    }

    #[must_use]
    pub fn schedule(&self) -> Option<&Schedule> {
        match &self.kind {
            TriggerKind::TimeBased { schedule } => Some(schedule),
            _ => None,
        }
    }

    /// Check the trigger's shape.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::NoEvents`] for an event-based trigger
    /// without events, or the schedule's error for a time-based one.
    pub fn validate(&self) -> Result<(), ValidationError> {
        match &self.kind {
            TriggerKind::EventBased { events } if events.is_empty() => Err(ValidationError::NoEvents),
            TriggerKind::TimeBased { schedule } => schedule.validate(),
            _ => Ok(()),
        }
    }
}

impl std::fmt::Display for Trigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.kind {
            TriggerKind::EventBased { events } => {
                let names: Vec<&str> = events.iter().map(String::as_str).collect();
                write!(f, "event_based({})", names.join(","))
            }
            TriggerKind::TimeBased { schedule } => write!(f, "time_based({schedule})"),
            TriggerKind::ConditionBased => f.write_str("condition_based"),
            TriggerKind::Manual => f.write_str("manual"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::automation::Frequency;
    use crate::condition::Operator;
    use serde_json::json;

    #[test]
    fn should_match_listed_event_only() {
        let trigger = Trigger::event_based(["work_order_created", "status_changed"]);
        assert!(trigger.matches_event("work_order_created"));
        assert!(trigger.matches_event("status_changed"));
        assert!(!trigger.matches_event("asset_created"));
    }

    #[test]
    fn should_never_match_events_for_other_kinds() {
        assert!(!Trigger::manual().matches_event("work_order_created"));
        assert!(!Trigger::condition_based().matches_event("work_order_created"));
        let timed = Trigger::time_based(Schedule::new(Frequency::Daily));
        assert!(!timed.matches_event("work_order_created"));
    }

    #[test]
    fn should_reject_event_trigger_without_events() {
        let trigger = Trigger::event_based(Vec::<String>::new());
        assert_eq!(trigger.validate(), Err(ValidationError::NoEvents));
    }

    #[test]
    fn should_propagate_schedule_validation() {
        let trigger = Trigger::time_based(Schedule::new(Frequency::Daily).every(0));
        assert!(matches!(
            trigger.validate(),
            Err(ValidationError::InvalidSchedule(_))
        ));
    }

    #[test]
    fn should_evaluate_conditions_against_snapshot() {
        let trigger = Trigger::event_based(["work_order_created"]).with_condition(Condition::new(
            "priority",
            Operator::Equals,
            json!("critical"),
        ));
        assert!(trigger.conditions_hold(&json!({"priority": "critical"})));
        assert!(!trigger.conditions_hold(&json!({"priority": "low"})));
    }

    #[test]
    fn should_deserialize_flattened_trigger() {
        let trigger: Trigger = serde_json::from_value(json!({
            "type": "time_based",
            "schedule": {"frequency": "weekly", "days": [1], "time": "08:00"},
            "conditions": [{"field": "status", "operator": "equals", "value": "open"}]
        }))
        .unwrap();
        assert_eq!(trigger.schedule().map(|s| s.frequency), Some(Frequency::Weekly));
        assert_eq!(trigger.conditions.len(), 1);

        let manual: Trigger = serde_json::from_value(json!({"type": "manual"})).unwrap();
        assert_eq!(manual, Trigger::manual());
    }

    #[test]
    fn should_display_trigger_kind() {
        assert_eq!(
            Trigger::event_based(["b", "a"]).to_string(),
            "event_based(a,b)"
        );
        assert_eq!(Trigger::manual().to_string(), "manual");
    }
}
