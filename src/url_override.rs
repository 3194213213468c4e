//! Overrides carried in the page URL: `?experiment-key=1` forces a variation and
//! `?gb~feature-key=value` forces a feature value.
use serde_json::Value;
use url::Url;

/// Type a forced feature value from the URL should be converted to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum FeatureValueType {
    Boolean,
    Integer,
    Numeric,
    String,
    Json,
}

fn query_value(url: &Url, key: &str) -> Option<String> {
    url.query_pairs()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.into_owned())
}

/// Variation index forced for experiment `id`, if the URL has a valid one (an integer in
/// `0..num_variations`).
pub fn get_query_string_override(id: &str, url: &Url, num_variations: usize) -> Option<usize> {
    let raw = query_value(url, id)?;
    let variation = raw.trim().parse::<usize>().ok().filter(|v| *v < num_variations);
    if variation.is_none() {
        log::debug!(target: "growthbook",
                    experiment_key = id,
                    value:display = raw;
                    "ignoring invalid variation override in url");
    }
    variation
}

/// Value forced for feature `feature_key` through the `gb~<feature_key>` query parameter.
///
/// Without an expected type, the raw value is parsed as JSON and falls back to a plain string.
pub fn get_forced_feature_value(
    url: &Url,
    feature_key: &str,
    expected_type: Option<FeatureValueType>,
) -> Option<Value> {
    let raw = query_value(url, &format!("gb~{feature_key}"))?;

    let value = match expected_type {
        Some(FeatureValueType::Boolean) => match raw.to_lowercase().as_str() {
            "true" | "1" | "on" => Some(Value::Bool(true)),
            "false" | "0" | "off" => Some(Value::Bool(false)),
            _ => None,
        },
        Some(FeatureValueType::Integer) => raw.trim().parse::<i64>().ok().map(Value::from),
        Some(FeatureValueType::Numeric) => raw
            .trim()
            .parse::<f64>()
            .ok()
            .and_then(serde_json::Number::from_f64)
            .map(Value::Number),
        Some(FeatureValueType::String) => Some(Value::String(raw.clone())),
        Some(FeatureValueType::Json) => serde_json::from_str(&raw).ok(),
        None => Some(serde_json::from_str(&raw).unwrap_or_else(|_| Value::String(raw.clone()))),
    };

    if value.is_none() {
        log::warn!(target: "growthbook",
                   feature_key,
                   value:display = raw;
                   "url override has unexpected type, ignoring");
    }
    value
}
