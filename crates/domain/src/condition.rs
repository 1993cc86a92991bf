//! Condition — a field/operator/value predicate over an entity snapshot.
//!
//! Conditions are evaluated after a trigger matches. All conditions of a
//! rule must hold (logical AND). Evaluation is total: a malformed path, a
//! type mismatch or an operator this build does not know all evaluate to
//! `false` rather than failing, so one bad rule cannot stop the engine.

use std::cmp::Ordering;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::path;

/// Comparison applied between the resolved field and the expected value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    Equals,
    NotEquals,
    GreaterThan,
    LessThan,
    Contains,
    IsEmpty,
    IsNotEmpty,
    In,
    Between,
    /// Any operator name not listed above. Always evaluates to `false`.
    #[serde(other)]
    Unknown,
}

impl Operator {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Equals => "equals",
            Self::NotEquals => "not_equals",
            Self::GreaterThan => "greater_than",
            Self::LessThan => "less_than",
            Self::Contains => "contains",
            Self::IsEmpty => "is_empty",
            Self::IsNotEmpty => "is_not_empty",
            Self::In => "in",
            Self::Between => "between",
            Self::Unknown => "unknown",
        }
    }
}

/// How the expected value should be interpreted when comparing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueType {
    #[default]
    String,
    Number,
    Boolean,
    Date,
    Array,
}

/// A single predicate evaluated against an entity snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Condition {
    /// Dotted path into the snapshot, e.g. `asset.criticality`.
    pub field: String,
    pub operator: Operator,
    #[serde(default)]
    pub value: Value,
    #[serde(default)]
    pub value_type: ValueType,
}

impl Condition {
    #[must_use]
    pub fn new(field: impl Into<String>, operator: Operator, value: Value) -> Self {
        Self {
            field: field.into(),
            operator,
            value,
            value_type: ValueType::default(),
        }
    }

    #[must_use]
    pub fn with_value_type(mut self, value_type: ValueType) -> Self {
        self.value_type = value_type;
        self
    }

    /// Evaluate this condition against `snapshot`.
    #[must_use]
    pub fn evaluate(&self, snapshot: &Value) -> bool {
        let actual = path::resolve(snapshot, &self.field);

        if self.operator == Operator::IsEmpty {
            return actual.is_none_or(is_empty_value);
        }
        let Some(actual) = actual else {
            return false;
        };

        match self.operator {
            Operator::Equals => loosely_equal(actual, &self.value, self.value_type),
            Operator::NotEquals => !loosely_equal(actual, &self.value, self.value_type),
            Operator::GreaterThan => {
                compare(actual, &self.value, self.value_type) == Some(Ordering::Greater)
            }
            Operator::LessThan => {
                compare(actual, &self.value, self.value_type) == Some(Ordering::Less)
            }
            Operator::Contains => {
                path::stringify(actual).contains(path::stringify(&self.value).as_str())
            }
            Operator::IsNotEmpty => !is_empty_value(actual),
            Operator::In => candidates(&self.value)
                .iter()
                .any(|candidate| loosely_equal(actual, candidate, self.value_type)),
            Operator::Between => match self.value.as_array().map(Vec::as_slice) {
                Some([low, high]) => {
                    matches!(
                        compare(actual, low, self.value_type),
                        Some(Ordering::Greater | Ordering::Equal)
                    ) && matches!(
                        compare(actual, high, self.value_type),
                        Some(Ordering::Less | Ordering::Equal)
                    )
                }
                _ => false,
            },
            Operator::IsEmpty | Operator::Unknown => false,
        }
    }
}

impl std::fmt::Display for Condition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.operator {
            Operator::IsEmpty | Operator::IsNotEmpty => {
                write!(f, "{} {}", self.field, self.operator.as_str())
            }
            _ => write!(f, "{} {} {}", self.field, self.operator.as_str(), self.value),
        }
    }
}

/// Evaluate every condition against `snapshot`. An empty list holds.
#[must_use]
pub fn evaluate(conditions: &[Condition], snapshot: &Value) -> bool {
    conditions.iter().all(|condition| condition.evaluate(snapshot))
}

fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        Value::Bool(_) | Value::Number(_) => false,
    }
}

/// The list an `in` condition tests membership against. Anything but an
/// array matches nothing.
fn candidates(value: &Value) -> &[Value] {
    value.as_array().map_or(&[], Vec::as_slice)
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|n| n.is_finite()),
        _ => None,
    }
}

fn as_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn as_date(value: &Value) -> Option<DateTime<Utc>> {
    let text = value.as_str()?.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(text) {
        return Some(ts.to_utc());
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S") {
        return Some(naive.and_utc());
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// Equality that tolerates the representation drift between stored
/// snapshots and values typed into rule forms: numbers compare by value,
/// and a string matches a scalar with the same text.
fn loosely_equal(actual: &Value, expected: &Value, value_type: ValueType) -> bool {
    if actual == expected {
        return true;
    }
    match value_type {
        ValueType::Number => {
            return matches!((as_number(actual), as_number(expected)), (Some(a), Some(b)) if a == b);
        }
        ValueType::Boolean => {
            return matches!((as_bool(actual), as_bool(expected)), (Some(a), Some(b)) if a == b);
        }
        ValueType::Date => {
            return matches!((as_date(actual), as_date(expected)), (Some(a), Some(b)) if a == b);
        }
        ValueType::String | ValueType::Array => {}
    }
    match (actual, expected) {
        (Value::Number(a), Value::Number(b)) => a.as_f64() == b.as_f64(),
        (Value::String(s), other @ (Value::Number(_) | Value::Bool(_)))
        | (other @ (Value::Number(_) | Value::Bool(_)), Value::String(s)) => {
            *s == path::stringify(other)
        }
        _ => false,
    }
}

fn compare(actual: &Value, expected: &Value, value_type: ValueType) -> Option<Ordering> {
    if value_type == ValueType::Date {
        return as_date(actual)?.partial_cmp(&as_date(expected)?);
    }
    if let (Some(a), Some(b)) = (as_number(actual), as_number(expected)) {
        return a.partial_cmp(&b);
    }
    match (actual, expected) {
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn cond(field: &str, operator: Operator, value: Value) -> Condition {
        Condition::new(field, operator, value)
    }

    #[test]
    fn should_hold_for_empty_condition_list() {
        assert!(evaluate(&[], &json!({})));
        assert!(evaluate(&[], &Value::Null));
        assert!(evaluate(&[], &json!([1, 2, 3])));
    }

    #[test]
    fn should_require_all_conditions_to_hold() {
        let snapshot = json!({"priority": "critical", "status": "open"});
        let both = [
            cond("priority", Operator::Equals, json!("critical")),
            cond("status", Operator::Equals, json!("open")),
        ];
        assert!(evaluate(&both, &snapshot));

        let one_fails = [
            cond("priority", Operator::Equals, json!("critical")),
            cond("status", Operator::Equals, json!("closed")),
        ];
        assert!(!evaluate(&one_fails, &snapshot));
    }

    #[test]
    fn should_compare_equals_on_nested_field() {
        let snapshot = json!({"asset": {"criticality": "high"}});
        assert!(cond("asset.criticality", Operator::Equals, json!("high")).evaluate(&snapshot));
        assert!(!cond("asset.criticality", Operator::Equals, json!("low")).evaluate(&snapshot));
    }

    #[test]
    fn should_treat_integer_and_float_as_equal() {
        let snapshot = json!({"cost": 5});
        assert!(cond("cost", Operator::Equals, json!(5.0)).evaluate(&snapshot));
    }

    #[test]
    fn should_match_form_string_against_number() {
        let snapshot = json!({"floor": 3});
        assert!(cond("floor", Operator::Equals, json!("3")).evaluate(&snapshot));
        let typed = cond("floor", Operator::Equals, json!("3.0")).with_value_type(ValueType::Number);
        assert!(typed.evaluate(&snapshot));
    }

    #[test]
    fn should_fail_every_operator_but_is_empty_on_missing_field() {
        let snapshot = json!({"other": 1});
        for operator in [
            Operator::Equals,
            Operator::NotEquals,
            Operator::GreaterThan,
            Operator::LessThan,
            Operator::Contains,
            Operator::IsNotEmpty,
            Operator::In,
            Operator::Between,
            Operator::Unknown,
        ] {
            assert!(
                !cond("missing", operator, json!([0, 10])).evaluate(&snapshot),
                "{operator:?} should fail on a missing field"
            );
        }
        assert!(cond("missing", Operator::IsEmpty, Value::Null).evaluate(&snapshot));
    }

    #[test]
    fn should_negate_equality_with_not_equals() {
        let snapshot = json!({"status": "open"});
        assert!(cond("status", Operator::NotEquals, json!("closed")).evaluate(&snapshot));
        assert!(!cond("status", Operator::NotEquals, json!("open")).evaluate(&snapshot));
    }

    #[test]
    fn should_compare_numbers_and_numeric_strings() {
        let snapshot = json!({"hours": 12, "reading": "98.5"});
        assert!(cond("hours", Operator::GreaterThan, json!(10)).evaluate(&snapshot));
        assert!(!cond("hours", Operator::GreaterThan, json!(12)).evaluate(&snapshot));
        assert!(cond("hours", Operator::LessThan, json!("20")).evaluate(&snapshot));
        assert!(cond("reading", Operator::GreaterThan, json!(90)).evaluate(&snapshot));
    }

    #[test]
    fn should_compare_dates_when_value_type_is_date() {
        let snapshot = json!({"due_date": "2024-05-01"});
        let overdue = cond("due_date", Operator::LessThan, json!("2024-05-02T08:00:00Z"))
            .with_value_type(ValueType::Date);
        assert!(overdue.evaluate(&snapshot));
        let not_yet = cond("due_date", Operator::GreaterThan, json!("2024-06-01"))
            .with_value_type(ValueType::Date);
        assert!(!not_yet.evaluate(&snapshot));
    }

    #[test]
    fn should_return_false_when_ordering_types_mismatch() {
        let snapshot = json!({"flag": true});
        assert!(!cond("flag", Operator::GreaterThan, json!(1)).evaluate(&snapshot));
        assert!(!cond("flag", Operator::LessThan, json!("x")).evaluate(&snapshot));
    }

    #[test]
    fn should_stringify_both_sides_for_contains() {
        let snapshot = json!({"title": "Pump failure in B2", "code": 4711, "tags": ["hvac", "roof"]});
        assert!(cond("title", Operator::Contains, json!("failure")).evaluate(&snapshot));
        assert!(cond("code", Operator::Contains, json!(71)).evaluate(&snapshot));
        assert!(cond("tags", Operator::Contains, json!("roof")).evaluate(&snapshot));
        assert!(!cond("title", Operator::Contains, json!("Failure")).evaluate(&snapshot));
    }

    #[test]
    fn should_detect_empty_and_non_empty_values() {
        let snapshot = json!({"blank": "", "none": null, "list": [], "map": {}, "zero": 0, "text": "x"});
        for field in ["blank", "none", "list", "map"] {
            assert!(cond(field, Operator::IsEmpty, Value::Null).evaluate(&snapshot), "{field}");
            assert!(!cond(field, Operator::IsNotEmpty, Value::Null).evaluate(&snapshot), "{field}");
        }
        for field in ["zero", "text"] {
            assert!(!cond(field, Operator::IsEmpty, Value::Null).evaluate(&snapshot), "{field}");
            assert!(cond(field, Operator::IsNotEmpty, Value::Null).evaluate(&snapshot), "{field}");
        }
    }

    #[test]
    fn should_test_membership_with_in() {
        let snapshot = json!({"status": "on_hold", "floor": 2});
        assert!(cond("status", Operator::In, json!(["open", "on_hold"])).evaluate(&snapshot));
        assert!(!cond("status", Operator::In, json!(["closed"])).evaluate(&snapshot));
        assert!(!cond("status", Operator::In, json!("open, on_hold")).evaluate(&snapshot));
        assert!(cond("floor", Operator::In, json!([1, 2, 3])).evaluate(&snapshot));
        assert!(!cond("floor", Operator::In, json!(2)).evaluate(&snapshot));
    }

    #[test]
    fn should_not_split_string_values_for_in() {
        let snapshot = json!({"status": "closed"});
        assert!(!cond("status", Operator::In, json!("open, closed")).evaluate(&snapshot));
        assert!(!cond("status", Operator::In, json!("closed")).evaluate(&snapshot));
    }

    #[test]
    fn should_evaluate_between_inclusively() {
        let snapshot = json!({"temp": 30});
        assert!(cond("temp", Operator::Between, json!([30, 40])).evaluate(&snapshot));
        assert!(cond("temp", Operator::Between, json!([20, 30])).evaluate(&snapshot));
        assert!(!cond("temp", Operator::Between, json!([31, 40])).evaluate(&snapshot));
    }

    #[test]
    fn should_reject_between_without_two_bounds() {
        let snapshot = json!({"temp": 30});
        assert!(!cond("temp", Operator::Between, json!([20])).evaluate(&snapshot));
        assert!(!cond("temp", Operator::Between, json!([20, 30, 40])).evaluate(&snapshot));
        assert!(!cond("temp", Operator::Between, json!("20-40")).evaluate(&snapshot));
    }

    #[test]
    fn should_deserialize_unknown_operator_and_evaluate_false() {
        let c: Condition = serde_json::from_value(json!({
            "field": "priority",
            "operator": "matches_regex",
            "value": ".*"
        }))
        .unwrap();
        assert_eq!(c.operator, Operator::Unknown);
        assert!(!c.evaluate(&json!({"priority": "high"})));
    }

    #[test]
    fn should_never_panic_on_odd_snapshot_shapes() {
        let conditions = [
            cond("a.b", Operator::GreaterThan, json!(1)),
            cond("0", Operator::Contains, json!(null)),
            cond("", Operator::Equals, json!("")),
        ];
        for snapshot in [
            Value::Null,
            json!(1),
            json!("text"),
            json!([1, 2]),
            json!({"a": [1]}),
            json!({"a": {"b": {"c": []}}}),
        ] {
            let _ = evaluate(&conditions, &snapshot);
        }
    }

    #[test]
    fn should_display_condition() {
        assert_eq!(
            cond("priority", Operator::Equals, json!("critical")).to_string(),
            "priority equals \"critical\""
        );
        assert_eq!(
            cond("assignee", Operator::IsEmpty, Value::Null).to_string(),
            "assignee is_empty"
        );
    }
}
