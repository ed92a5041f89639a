//! `{{path}}` placeholder resolution against an execution context.
//!
//! Paths are dotted (`payload.client.email`); numeric segments index into
//! arrays (`payload.items.0`).

use actions::JsonMap;
use serde_json::Value;

/// Resolve a dotted path inside `context`.
pub fn lookup<'a>(context: &'a JsonMap, path: &str) -> Option<&'a Value> {
    let mut segments = path.split('.');
    let mut current = context.get(segments.next()?)?;
    for segment in segments {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Render every string inside `value`.
///
/// A string that is exactly one placeholder becomes the referenced value
/// with its JSON type intact; anything else is text interpolation.
pub fn render(value: &Value, context: &JsonMap) -> Value {
    match value {
        Value::String(s) => render_str(s, context),
        Value::Array(items) => Value::Array(items.iter().map(|v| render(v, context)).collect()),
        Value::Object(map) => Value::Object(render_map(map, context)),
        other => other.clone(),
    }
}

pub fn render_map(map: &JsonMap, context: &JsonMap) -> JsonMap {
    map.iter()
        .map(|(k, v)| (k.clone(), render(v, context)))
        .collect()
}

fn render_str(s: &str, context: &JsonMap) -> Value {
    if let Some(path) = sole_placeholder(s) {
        return lookup(context, path).cloned().unwrap_or(Value::Null);
    }
    Value::String(interpolate(s, context))
}

fn sole_placeholder(s: &str) -> Option<&str> {
    let inner = s.trim().strip_prefix("{{")?.strip_suffix("}}")?;
    if inner.contains("{{") || inner.contains("}}") {
        return None;
    }
    Some(inner.trim())
}

/// Replace every `{{path}}` in `s` with the text form of its value.
///
/// Missing paths render as nothing; an unterminated `{{` is kept verbatim.
pub fn interpolate(s: &str, context: &JsonMap) -> String {
    let mut out = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find("}}") else {
            out.push_str(&rest[start..]);
            return out;
        };
        if let Some(value) = lookup(context, after[..end].trim()) {
            push_text(&mut out, value);
        }
        rest = &after[end + 2..];
    }
    out.push_str(rest);
    out
}

fn push_text(out: &mut String, value: &Value) {
    match value {
        Value::String(s) => out.push_str(s),
        Value::Null => {}
        other => out.push_str(&other.to_string()),
    }
}
