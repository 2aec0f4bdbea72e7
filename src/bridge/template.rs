//! Template expansion engine
//!
//! Templates are JSON documents containing `{{dotted.path}}` placeholders
//! that address fields of a source value. Expansion is two text passes over
//! the template:
//!
//! 1. full-value: a placeholder that is the entire quoted value of a field
//!    (`"key": "{{path}}"`) is replaced by the raw JSON value at that path,
//!    preserving its type;
//! 2. embedded: any remaining placeholder inside a longer string is replaced
//!    by the string form of the resolved value, with `\`, `"` and newlines
//!    escaped so the surrounding JSON string stays valid.
//!
//! The result must reparse as JSON; otherwise a typed error carrying the
//! original template is returned. This function never panics.

use regex::{Captures, Regex};
use serde_json::Value;
use std::sync::OnceLock;

use super::{BridgeError, BridgeResult};

fn full_value_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#":\s*"\{\{([^}]+)\}\}""#).expect("static pattern"))
}

fn embedded_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"\{\{([^{}":]+)\}\}"#).expect("static pattern"))
}

/// Walk a dot-separated path through `source`.
///
/// Numeric segments index arrays; everything else is an object key lookup.
/// Resolving through `null` or a missing field yields `None`, not an error.
pub fn resolve_path<'a>(source: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = source;
    for segment in path.split('.') {
        current = match current {
            Value::Array(items) => segment
                .parse::<usize>()
                .ok()
                .and_then(|index| items.get(index))?,
            Value::Object(map) => map.get(segment)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Expand `template` against `source` and parse the result as JSON.
pub fn expand(template: &str, source: &Value) -> BridgeResult<Value> {
    // Pass 1: typed replacement of whole-string placeholders.
    let pass_one = full_value_re().replace_all(template, |caps: &Captures| {
        let replacement = match resolve_path(source, &caps[1]) {
            Some(value) => {
                serde_json::to_string(value).unwrap_or_else(|_| "null".to_string())
            }
            None => "\"\"".to_string(),
        };
        format!(": {}", replacement)
    });

    // Pass 2: escaped string interpolation for anything left.
    let pass_two = embedded_re().replace_all(&pass_one, |caps: &Captures| {
        let text = match resolve_path(source, &caps[1]) {
            Some(value) => display_string(value),
            None => String::new(),
        };
        text.replace('\\', "\\\\")
            .replace('"', "\\\"")
            .replace('\n', "\\n")
    });

    serde_json::from_str(&pass_two).map_err(|e| BridgeError::Template {
        template: template.to_string(),
        reason: e.to_string(),
    })
}

/// String form of a value for embedded interpolation.
///
/// Strings interpolate verbatim; everything else uses its JSON text.
fn display_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
