//! `{{ placeholder }}` substitution for notification subjects and bodies.

use serde_json::Value;

use crate::path;

const OPEN: &str = "{{";
const CLOSE: &str = "}}";

/// Substitute every `{{ a.b.c }}` token in `template` from `variables`.
///
/// Whitespace inside the braces is ignored. A token whose path does not
/// resolve, or resolves to `null`, is left exactly as written so a missing
/// variable stays visible in the output.
#[must_use]
pub fn render(template: &str, variables: &Value) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find(OPEN) {
        let after_open = &rest[start + OPEN.len()..];
        let Some(end) = after_open.find(CLOSE) else {
            break;
        };
        out.push_str(&rest[..start]);

        let token = &rest[start..start + OPEN.len() + end + CLOSE.len()];
        match path::resolve(variables, after_open[..end].trim()) {
            Some(Value::Null) | None => out.push_str(token),
            Some(value) => out.push_str(&path::stringify(value)),
        }
        rest = &after_open[end + CLOSE.len()..];
    }

    out.push_str(rest);
    out
}

/// List the distinct placeholder paths referenced by `template`, in order
/// of first appearance.
#[must_use]
pub fn placeholders(template: &str) -> Vec<String> {
    let mut found: Vec<String> = Vec::new();
    let mut rest = template;

    while let Some(start) = rest.find(OPEN) {
        let after_open = &rest[start + OPEN.len()..];
        let Some(end) = after_open.find(CLOSE) else {
            break;
        };
        let name = after_open[..end].trim();
        if !name.is_empty() && !found.iter().any(|existing| existing == name) {
            found.push(name.to_string());
        }
        rest = &after_open[end + CLOSE.len()..];
    }

    found
}
