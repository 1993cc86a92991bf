//! Dotted-path lookup into JSON snapshots.

use serde_json::Value;

/// Resolve a dotted path such as `asset.location.building` against `root`.
///
/// Object keys are matched exactly; a segment that parses as an index walks
/// into arrays. Empty segments, missing keys and walking through scalars
/// all resolve to `None`.
#[must_use]
pub fn resolve<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    if path.is_empty() {
        return None;
    }
    path.split('.').try_fold(root, |current, segment| {
        if segment.is_empty() {
            return None;
        }
        match current {
            Value::Object(map) => map.get(segment),
            Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => None,
        }
    })
}

/// Render a JSON value the way it should appear inside text.
///
/// Strings are used verbatim, `null` becomes an empty string, and arrays
/// and objects are written as compact JSON.
#[must_use]
pub fn stringify(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Array(_) | Value::Object(_) => value.to_string(),
    }
}
