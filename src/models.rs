//! Wire models for feature definitions and experiments.
use std::collections::HashMap;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use crate::{
    bucketing::{BucketRange, Filter, Namespace},
    result::ExperimentResult,
    Condition,
};

/// Feature definitions keyed by feature key.
///
/// Each value is wrapped in `TryParse` so that if we fail to parse one feature (e.g., new server
/// format), we can still serve other features.
pub type Features = HashMap<String, TryParse<Feature>>;

/// `TryParse` allows the subfield to fail parsing without failing the parsing of the whole
/// structure.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(untagged)]
pub enum TryParse<T> {
    /// Successfully parsed.
    Parsed(T),
    /// Parsing failed.
    ParseFailed(Value),
}

impl<T> From<T> for TryParse<T> {
    fn from(value: T) -> TryParse<T> {
        TryParse::Parsed(value)
    }
}

impl<'a, T> From<&'a TryParse<T>> for Option<&'a T> {
    fn from(value: &TryParse<T>) -> Option<&T> {
        match value {
            TryParse::Parsed(v) => Some(v),
            TryParse::ParseFailed(_) => None,
        }
    }
}

/// A feature: a default value and an ordered list of override rules. The first matching rule
/// wins.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Feature {
    /// Value served when no rule matches.
    #[serde(default)]
    pub default_value: Value,
    /// Override rules, in precedence order.
    #[serde(default)]
    pub rules: Vec<FeatureRule>,
}

/// Tri-state value distinguishing "not configured" from "configured to `null`".
///
/// In JSON, an absent field is [`Force::NotSet`] and `"force": null` is `Force::Set(Value::Null)`.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Force<T> {
    /// The field is absent.
    #[default]
    NotSet,
    /// The field is present (possibly `null`).
    Set(T),
}

impl<T> Force<T> {
    /// Return `true` if the field is absent.
    pub fn is_not_set(&self) -> bool {
        matches!(self, Force::NotSet)
    }

    /// Borrow the forced value if set.
    pub fn as_option(&self) -> Option<&T> {
        match self {
            Force::NotSet => None,
            Force::Set(value) => Some(value),
        }
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for Force<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        T::deserialize(deserializer).map(Force::Set)
    }
}

impl<T: Serialize> Serialize for Force<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Force::NotSet => serializer.serialize_none(),
            Force::Set(value) => value.serialize(serializer),
        }
    }
}

/// A single override rule of a feature.
///
/// A rule either forces a value (`force` is set), runs an experiment (`variations` is set), or is
/// skipped.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
#[allow(missing_docs)]
pub struct FeatureRule {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub condition: Option<Condition>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub parent_conditions: Vec<ParentCondition>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub coverage: Option<f64>,
    #[serde(skip_serializing_if = "Force::is_not_set")]
    pub force: Force<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub variations: Option<Vec<Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weights: Option<Vec<f64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace: Option<Namespace>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hash_attribute: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback_attribute: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hash_version: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub range: Option<BucketRange>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ranges: Option<Vec<BucketRange>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<Vec<VariationMeta>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filters: Option<Vec<Filter>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phase: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tracks: Vec<TrackData>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub disable_sticky_bucketing: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bucket_version: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_bucket_version: Option<i64>,
}

impl FeatureRule {
    /// Build the experiment described by an experiment rule of feature `feature_key`.
    ///
    /// Returns `None` if the rule has no `variations`.
    pub fn to_experiment(&self, feature_key: &str) -> Option<Experiment> {
        let variations = self.variations.clone()?;
        Some(Experiment {
            key: self.key.clone().unwrap_or_else(|| feature_key.to_owned()),
            variations,
            weights: self.weights.clone(),
            is_active: true,
            coverage: self.coverage,
            ranges: self.ranges.clone(),
            condition: self.condition.clone(),
            parent_conditions: Vec::new(),
            namespace: self.namespace.clone(),
            force: None,
            hash_attribute: self.hash_attribute.clone(),
            fallback_attribute: self.fallback_attribute.clone(),
            hash_version: self.hash_version,
            meta: self.meta.clone(),
            filters: self.filters.clone(),
            seed: self.seed.clone(),
            name: self.name.clone(),
            phase: self.phase.clone(),
            disable_sticky_bucketing: self.disable_sticky_bucketing,
            bucket_version: self.bucket_version,
            min_bucket_version: self.min_bucket_version,
        })
    }
}

/// Prerequisite: the feature `feature_id` must evaluate to a value matching `condition`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParentCondition {
    /// Key of the parent feature.
    #[serde(rename = "id")]
    pub feature_id: String,
    /// Condition evaluated against `{"value": <parent value>}`.
    pub condition: Condition,
    /// When `true`, a failed prerequisite blocks the whole feature instead of skipping the rule.
    #[serde(default)]
    pub gate: bool,
}

/// Per-variation metadata.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[allow(missing_docs)]
pub struct VariationMeta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub passthrough: Option<bool>,
}

/// Tracking data attached to a force rule produced by remote evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackData {
    /// The experiment the user was assigned to.
    pub experiment: Experiment,
    /// The assignment.
    pub result: TrackedResult,
}

/// Result part of [`TrackData`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackedResult {
    #[allow(missing_docs)]
    pub experiment_result: ExperimentResult,
}

/// An experiment: randomly (or stickily) assign users to one of `variations`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[allow(missing_docs)]
pub struct Experiment<T = Value> {
    pub key: String,
    #[serde(default = "Vec::new")]
    pub variations: Vec<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weights: Option<Vec<f64>>,
    #[serde(rename = "active", alias = "isActive", default = "default_true")]
    pub is_active: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coverage: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ranges: Option<Vec<BucketRange>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<Condition>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parent_conditions: Vec<ParentCondition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<Namespace>,
    /// Variation index to force all included users into.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub force: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash_attribute: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_attribute: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash_version: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<Vec<VariationMeta>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filters: Option<Vec<Filter>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub disable_sticky_bucketing: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bucket_version: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_bucket_version: Option<i64>,
}

fn default_true() -> bool {
    true
}

impl<T> Experiment<T> {
    /// Create an active experiment with equal weights and full coverage.
    pub fn new(key: impl Into<String>, variations: Vec<T>) -> Experiment<T> {
        Experiment {
            key: key.into(),
            variations,
            weights: None,
            is_active: true,
            coverage: None,
            ranges: None,
            condition: None,
            parent_conditions: Vec::new(),
            namespace: None,
            force: None,
            hash_attribute: None,
            fallback_attribute: None,
            hash_version: None,
            meta: None,
            filters: None,
            seed: None,
            name: None,
            phase: None,
            disable_sticky_bucketing: false,
            bucket_version: None,
            min_bucket_version: None,
        }
    }

    /// Transform variations, keeping every other field.
    pub fn try_map_variations<U, E>(
        self,
        f: impl FnMut(T) -> Result<U, E>,
    ) -> Result<Experiment<U>, E> {
        Ok(Experiment {
            key: self.key,
            variations: self.variations.into_iter().map(f).collect::<Result<_, _>>()?,
            weights: self.weights,
            is_active: self.is_active,
            coverage: self.coverage,
            ranges: self.ranges,
            condition: self.condition,
            parent_conditions: self.parent_conditions,
            namespace: self.namespace,
            force: self.force,
            hash_attribute: self.hash_attribute,
            fallback_attribute: self.fallback_attribute,
            hash_version: self.hash_version,
            meta: self.meta,
            filters: self.filters,
            seed: self.seed,
            name: self.name,
            phase: self.phase,
            disable_sticky_bucketing: self.disable_sticky_bucketing,
            bucket_version: self.bucket_version,
            min_bucket_version: self.min_bucket_version,
        })
    }
}
