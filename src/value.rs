//! Helpers for working with JSON values the way every GrowthBook SDK does.
//!
//! Attribute and condition trees are plain [`serde_json::Value`]s. Cross-SDK parity requires the
//! same loose coercions JavaScript applies when comparing values, so they are collected here
//! instead of being spread over the evaluators.

use serde_json::{Map, Number, Value};

/// User attributes: a JSON object describing the current user.
pub type Attributes = Map<String, Value>;

/// Saved groups: mapping from group id to the list of values in the group.
pub type SavedGroups = Map<String, Value>;

pub(crate) static NULL: Value = Value::Null;

/// Look up `path` (dot-separated) in `root`. Missing segments and non-object intermediate values
/// resolve to `null`.
pub(crate) fn get_path<'a>(root: Option<&'a Attributes>, path: &str) -> &'a Value {
    let Some(root) = root else {
        return &NULL;
    };

    let mut segments = path.split('.');
    let mut current = match segments.next().and_then(|first| root.get(first)) {
        Some(value) => value,
        None => return &NULL,
    };
    for segment in segments {
        current = match current.as_object().and_then(|object| object.get(segment)) {
            Some(value) => value,
            None => return &NULL,
        };
    }
    current
}

/// String coercion (`value + ""`).
pub(crate) fn js_string(value: &Value) -> String {
    match value {
        Value::Null => "null".to_owned(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => number_to_string(n),
        Value::String(s) => s.clone(),
        Value::Array(items) => items
            .iter()
            .map(|item| match item {
                Value::Null => String::new(),
                other => js_string(other),
            })
            .collect::<Vec<_>>()
            .join(","),
        Value::Object(_) => "[object Object]".to_owned(),
    }
}

fn number_to_string(n: &Number) -> String {
    if let Some(i) = n.as_i64() {
        return i.to_string();
    }
    if let Some(u) = n.as_u64() {
        return u.to_string();
    }
    match n.as_f64() {
        Some(f) if f == 0.0 => "0".to_owned(),
        // f64's Display omits the fractional part for integral values, matching JavaScript.
        Some(f) => f.to_string(),
        None => String::new(),
    }
}

/// Numeric coercion (`value * 1`). Returns `None` where JavaScript would produce `NaN`.
pub(crate) fn js_number(value: &Value) -> Option<f64> {
    match value {
        Value::Null => Some(0.0),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        Value::Number(n) => n.as_f64(),
        Value::String(s) => {
            let s = s.trim();
            if s.is_empty() {
                Some(0.0)
            } else {
                s.parse::<f64>().ok().filter(|n| n.is_finite())
            }
        }
        Value::Array(items) => match items.as_slice() {
            [] => Some(0.0),
            [single] => js_number(&Value::String(js_string(single))),
            _ => None,
        },
        Value::Object(_) => None,
    }
}

/// JavaScript truthiness (`!!value`).
pub(crate) fn js_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0 && !n.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Whether a feature value counts as "on".
///
/// Differs from plain truthiness in that empty arrays and objects are off.
pub fn is_on(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

/// Runtime type name used by the `$type` operator.
pub(crate) fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Structural equality where numbers compare by value (`1 == 1.0`).
pub(crate) fn deep_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(a), Value::Number(b)) => a.as_f64() == b.as_f64(),
        (Value::Array(a), Value::Array(b)) => {
            a.len() == b.len() && a.iter().zip(b).all(|(a, b)| deep_equal(a, b))
        }
        (Value::Object(a), Value::Object(b)) => {
            a.len() == b.len()
                && a.iter()
                    .all(|(key, a)| b.get(key).is_some_and(|b| deep_equal(a, b)))
        }
        (a, b) => a == b,
    }
}

/// Value of a hash attribute as a string: numbers are printed without a trailing `.0`, and `null`
/// or missing values become an empty string.
pub(crate) fn attribute_to_hash_value(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => number_to_string(n),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
