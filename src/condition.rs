use std::cmp::Ordering;

use derive_more::From;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    padded_version_string,
    value::{deep_equal, get_path, js_number, js_string, js_truthy, type_name},
    Attributes, SavedGroups,
};

/// Targeting condition: a MongoDB-style query over user attributes.
///
/// ```
/// # use growthbook::Condition;
/// # use serde_json::json;
/// let condition = Condition::from(json!({"country": {"$in": ["US", "CA"]}}));
/// let attributes = json!({"country": "CA"}).as_object().cloned().unwrap();
/// assert!(condition.eval(&attributes, &Default::default()));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, From)]
#[serde(transparent)]
pub struct Condition(Value);

impl Condition {
    /// Evaluate the condition against `attributes`. Malformed conditions evaluate to `false`.
    pub fn eval(&self, attributes: &Attributes, saved_groups: &SavedGroups) -> bool {
        eval_condition(attributes, self, saved_groups)
    }

    /// Underlying JSON tree.
    pub fn as_value(&self) -> &Value {
        &self.0
    }
}

/// Evaluate `condition` against `attributes`.
///
/// Evaluation fails closed: a malformed condition (invalid regex, logical operator applied to a
/// non-array, etc.) makes the whole condition evaluate to `false`.
pub fn eval_condition(
    attributes: &Attributes,
    condition: &Condition,
    saved_groups: &SavedGroups,
) -> bool {
    match eval_condition_tree(Some(attributes), &condition.0, saved_groups) {
        Some(result) => result,
        None => {
            log::debug!(target: "growthbook",
                        condition:serde = condition.0;
                        "malformed condition, treating as not matched");
            false
        }
    }
}

/// An object whose every key is an operator (starts with `$`). Empty objects count.
pub(crate) fn is_operator_object(value: &Value) -> bool {
    value
        .as_object()
        .is_some_and(|object| object.keys().all(|key| key.starts_with('$')))
}

/// Try evaluating a condition tree, returning `None` if the condition is malformed.
fn eval_condition_tree(
    attributes: Option<&Attributes>,
    condition: &Value,
    saved_groups: &SavedGroups,
) -> Option<bool> {
    for (key, child) in condition.as_object()? {
        let passed = match key.as_str() {
            "$or" => eval_or(attributes, child, saved_groups)?,
            "$nor" => !eval_or(attributes, child, saved_groups)?,
            "$and" => eval_and(attributes, child, saved_groups)?,
            "$not" => !eval_condition_tree(attributes, child, saved_groups)?,
            path => eval_condition_value(child, get_path(attributes, path), saved_groups)?,
        };
        if !passed {
            return Some(false);
        }
    }
    Some(true)
}

fn eval_or(
    attributes: Option<&Attributes>,
    conditions: &Value,
    saved_groups: &SavedGroups,
) -> Option<bool> {
    let conditions = conditions.as_array()?;
    if conditions.is_empty() {
        return Some(true);
    }
    for condition in conditions {
        if eval_condition_tree(attributes, condition, saved_groups)? {
            return Some(true);
        }
    }
    Some(false)
}

fn eval_and(
    attributes: Option<&Attributes>,
    conditions: &Value,
    saved_groups: &SavedGroups,
) -> Option<bool> {
    for condition in conditions.as_array()? {
        if !eval_condition_tree(attributes, condition, saved_groups)? {
            return Some(false);
        }
    }
    Some(true)
}

/// Compare a single attribute value against a condition.
///
/// Scalars are compared after coercing `actual` to the condition's type, operator objects apply
/// every operator, and anything else is compared structurally.
fn eval_condition_value(
    condition: &Value,
    actual: &Value,
    saved_groups: &SavedGroups,
) -> Option<bool> {
    match condition {
        Value::String(expected) => Some(js_string(actual) == *expected),
        Value::Number(expected) => {
            Some(js_number(actual).is_some_and(|n| Some(n) == expected.as_f64()))
        }
        Value::Bool(expected) => Some(!actual.is_null() && js_truthy(actual) == *expected),
        Value::Null => Some(actual.is_null()),
        Value::Object(operators) if is_operator_object(condition) => {
            for (operator, expected) in operators {
                if !eval_operator_condition(operator, actual, expected, saved_groups)? {
                    return Some(false);
                }
            }
            Some(true)
        }
        _ => Some(deep_equal(actual, condition)),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Operator {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    In,
    Nin,
    Regex,
    Size,
    ElemMatch,
    All,
    Not,
    Type,
    Exists,
    Veq,
    Vne,
    Vgt,
    Vgte,
    Vlt,
    Vlte,
    InGroup,
    NotInGroup,
}

impl Operator {
    fn parse(s: &str) -> Option<Operator> {
        let operator = match s {
            "$eq" => Self::Eq,
            "$ne" => Self::Ne,
            "$gt" => Self::Gt,
            "$gte" => Self::Gte,
            "$lt" => Self::Lt,
            "$lte" => Self::Lte,
            "$in" => Self::In,
            "$nin" => Self::Nin,
            "$regex" => Self::Regex,
            "$size" => Self::Size,
            "$elemMatch" => Self::ElemMatch,
            "$all" => Self::All,
            "$not" => Self::Not,
            "$type" => Self::Type,
            "$exists" => Self::Exists,
            "$veq" => Self::Veq,
            "$vne" => Self::Vne,
            "$vgt" => Self::Vgt,
            "$vgte" => Self::Vgte,
            "$vlt" => Self::Vlt,
            "$vlte" => Self::Vlte,
            "$inGroup" => Self::InGroup,
            "$notInGroup" => Self::NotInGroup,
            _ => return None,
        };
        Some(operator)
    }
}

fn eval_operator_condition(
    operator: &str,
    actual: &Value,
    expected: &Value,
    saved_groups: &SavedGroups,
) -> Option<bool> {
    let Some(op) = Operator::parse(operator) else {
        log::warn!(target: "growthbook", operator; "unknown condition operator");
        return Some(false);
    };

    let result = match op {
        Operator::Eq => deep_equal(actual, expected),
        Operator::Ne => !deep_equal(actual, expected),
        Operator::Gt => compare(actual, expected).is_some_and(Ordering::is_gt),
        Operator::Gte => compare(actual, expected).is_some_and(Ordering::is_ge),
        Operator::Lt => compare(actual, expected).is_some_and(Ordering::is_lt),
        Operator::Lte => compare(actual, expected).is_some_and(Ordering::is_le),
        Operator::In => match expected {
            Value::Array(values) => is_in(actual, values),
            _ => false,
        },
        Operator::Nin => match expected {
            Value::Array(values) => !is_in(actual, values),
            _ => false,
        },
        Operator::InGroup => is_in(actual, saved_group(expected, saved_groups)),
        Operator::NotInGroup => !is_in(actual, saved_group(expected, saved_groups)),
        Operator::Regex => {
            let pattern = expected.as_str()?;
            let regex = Regex::new(pattern)
                .map_err(|err| {
                    log::warn!(target: "growthbook", pattern; "invalid regex in condition: {err}");
                })
                .ok()?;
            regex.is_match(&js_string(actual))
        }
        Operator::Size => match actual {
            Value::Array(items) => {
                eval_condition_value(expected, &Value::from(items.len()), saved_groups)?
            }
            _ => false,
        },
        Operator::ElemMatch => elem_match(actual, expected, saved_groups)?,
        Operator::All => {
            let Value::Array(items) = actual else {
                return Some(false);
            };
            for condition in expected.as_array()? {
                let mut passed = false;
                for item in items {
                    if eval_condition_value(condition, item, saved_groups)? {
                        passed = true;
                        break;
                    }
                }
                if !passed {
                    return Some(false);
                }
            }
            true
        }
        Operator::Not => !eval_condition_value(expected, actual, saved_groups)?,
        Operator::Type => expected.as_str() == Some(type_name(actual)),
        Operator::Exists => {
            if js_truthy(expected) {
                !actual.is_null()
            } else {
                actual.is_null()
            }
        }
        Operator::Veq => version(actual) == version(expected),
        Operator::Vne => version(actual) != version(expected),
        Operator::Vgt => version(actual) > version(expected),
        Operator::Vgte => version(actual) >= version(expected),
        Operator::Vlt => version(actual) < version(expected),
        Operator::Vlte => version(actual) <= version(expected),
    };

    Some(result)
}

/// Ordering used by `$gt`/`$gte`/`$lt`/`$lte`.
///
/// Two strings compare lexicographically. If either side is a number, both are coerced to numbers
/// (`null` becomes `0`). Anything else is incomparable.
fn compare(actual: &Value, expected: &Value) -> Option<Ordering> {
    match (actual, expected) {
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        (Value::Number(_), _) | (_, Value::Number(_)) => {
            js_number(actual)?.partial_cmp(&js_number(expected)?)
        }
        _ => None,
    }
}

/// Membership test. For array attributes, any element being in `values` is enough.
fn is_in(actual: &Value, values: &[Value]) -> bool {
    match actual {
        Value::Array(items) => items
            .iter()
            .any(|item| values.iter().any(|value| deep_equal(item, value))),
        _ => values.iter().any(|value| deep_equal(actual, value)),
    }
}

fn saved_group<'a>(group_id: &Value, saved_groups: &'a SavedGroups) -> &'a [Value] {
    group_id
        .as_str()
        .and_then(|id| saved_groups.get(id))
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

fn elem_match(actual: &Value, expected: &Value, saved_groups: &SavedGroups) -> Option<bool> {
    let Value::Array(items) = actual else {
        return Some(false);
    };

    let compare_values = is_operator_object(expected);
    for item in items.iter().filter(|item| js_truthy(item)) {
        let matched = if compare_values {
            eval_condition_value(expected, item, saved_groups)?
        } else {
            eval_condition_tree(item.as_object(), expected, saved_groups)?
        };
        if matched {
            return Some(true);
        }
    }
    Some(false)
}

fn version(value: &Value) -> String {
    let raw = match value {
        Value::String(s) if !s.is_empty() => s.clone(),
        Value::Number(_) => js_string(value),
        _ => "0".to_owned(),
    };
    padded_version_string(&raw)
}
