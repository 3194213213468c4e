use serde::{ser::SerializeStruct, Deserialize, Serialize, Serializer};
use serde_json::Value;

use crate::{value::is_on, Experiment};

/// Outcome of running an experiment for a user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExperimentResult<T = Value> {
    /// Value of the assigned variation. `None` only if the experiment has no variations.
    pub value: Option<T>,
    /// Index of the assigned variation. `0` when the user is not in the experiment.
    pub variation_id: usize,
    /// Whether the user was randomly (or stickily) assigned.
    pub in_experiment: bool,
    /// Attribute used for hashing.
    pub hash_attribute: String,
    /// Value of the hash attribute.
    pub hash_value: String,
    /// Variation key from `meta`, or the index as a string.
    pub key: String,
    /// Variation name from `meta`.
    #[serde(default)]
    pub name: Option<String>,
    /// Hash bucket of the user, if a hash was used.
    #[serde(default)]
    pub bucket: Option<f64>,
    /// Passthrough variations do not serve their value from feature rules.
    #[serde(default)]
    pub passthrough: bool,
    /// Whether the hash decided the assignment.
    #[serde(default)]
    pub hash_used: bool,
    /// Whether the assignment came from a sticky bucket.
    #[serde(default)]
    pub sticky_bucket_used: bool,
    /// Key of the feature that triggered this experiment, if any.
    #[serde(default)]
    pub feature_id: Option<String>,
}

impl<T> ExperimentResult<T> {
    /// Transform the variation value, keeping every other field.
    pub fn try_map<U, E>(self, f: impl FnOnce(T) -> Result<U, E>) -> Result<ExperimentResult<U>, E> {
        Ok(ExperimentResult {
            value: self.value.map(f).transpose()?,
            variation_id: self.variation_id,
            in_experiment: self.in_experiment,
            hash_attribute: self.hash_attribute,
            hash_value: self.hash_value,
            key: self.key,
            name: self.name,
            bucket: self.bucket,
            passthrough: self.passthrough,
            hash_used: self.hash_used,
            sticky_bucket_used: self.sticky_bucket_used,
            feature_id: self.feature_id,
        })
    }
}

/// Where a feature value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[allow(missing_docs)]
pub enum FeatureSource {
    UnknownFeature,
    DefaultValue,
    Force,
    UrlOverride,
    Experiment,
    CyclicPrerequisite,
    Override,
    Prerequisite,
}

/// Result of evaluating a feature. Each variant carries only what is relevant to its source.
#[derive(Debug, Clone, PartialEq)]
pub enum FeatureResult<T = Value> {
    /// Feature is not defined (or failed to parse).
    UnknownFeature,
    /// No rule matched.
    DefaultValue {
        #[allow(missing_docs)]
        value: T,
    },
    /// A force rule matched.
    Force {
        #[allow(missing_docs)]
        value: T,
        #[allow(missing_docs)]
        rule_id: Option<String>,
    },
    /// Value forced through the page URL.
    UrlOverride {
        #[allow(missing_docs)]
        value: T,
    },
    /// User was assigned to an experiment rule.
    Experiment {
        #[allow(missing_docs)]
        value: T,
        #[allow(missing_docs)]
        rule_id: Option<String>,
        #[allow(missing_docs)]
        experiment: Box<Experiment>,
        #[allow(missing_docs)]
        experiment_result: Box<ExperimentResult<T>>,
    },
    /// Prerequisites of the feature form a cycle.
    CyclicPrerequisite,
    /// Value forced through forced feature values.
    Override {
        #[allow(missing_docs)]
        value: T,
    },
    /// A gating prerequisite was not met.
    Prerequisite,
}

impl<T> FeatureResult<T> {
    /// Resolved value. `None` means `null`.
    pub fn value(&self) -> Option<&T> {
        match self {
            FeatureResult::DefaultValue { value }
            | FeatureResult::Force { value, .. }
            | FeatureResult::UrlOverride { value }
            | FeatureResult::Experiment { value, .. }
            | FeatureResult::Override { value } => Some(value),
            FeatureResult::UnknownFeature
            | FeatureResult::CyclicPrerequisite
            | FeatureResult::Prerequisite => None,
        }
    }

    /// Consume the result, returning the value.
    pub fn into_value(self) -> Option<T> {
        match self {
            FeatureResult::DefaultValue { value }
            | FeatureResult::Force { value, .. }
            | FeatureResult::UrlOverride { value }
            | FeatureResult::Experiment { value, .. }
            | FeatureResult::Override { value } => Some(value),
            FeatureResult::UnknownFeature
            | FeatureResult::CyclicPrerequisite
            | FeatureResult::Prerequisite => None,
        }
    }

    #[allow(missing_docs)]
    pub fn source(&self) -> FeatureSource {
        match self {
            FeatureResult::UnknownFeature => FeatureSource::UnknownFeature,
            FeatureResult::DefaultValue { .. } => FeatureSource::DefaultValue,
            FeatureResult::Force { .. } => FeatureSource::Force,
            FeatureResult::UrlOverride { .. } => FeatureSource::UrlOverride,
            FeatureResult::Experiment { .. } => FeatureSource::Experiment,
            FeatureResult::CyclicPrerequisite => FeatureSource::CyclicPrerequisite,
            FeatureResult::Override { .. } => FeatureSource::Override,
            FeatureResult::Prerequisite => FeatureSource::Prerequisite,
        }
    }

    /// Id of the rule that produced the value.
    pub fn rule_id(&self) -> Option<&str> {
        match self {
            FeatureResult::Force { rule_id, .. } | FeatureResult::Experiment { rule_id, .. } => {
                rule_id.as_deref()
            }
            _ => None,
        }
    }

    #[allow(missing_docs)]
    pub fn experiment(&self) -> Option<&Experiment> {
        match self {
            FeatureResult::Experiment { experiment, .. } => Some(experiment),
            _ => None,
        }
    }

    #[allow(missing_docs)]
    pub fn experiment_result(&self) -> Option<&ExperimentResult<T>> {
        match self {
            FeatureResult::Experiment {
                experiment_result, ..
            } => Some(experiment_result),
            _ => None,
        }
    }

    /// Transform the value, keeping the source and every other field.
    pub fn try_map<U, E>(self, f: impl Fn(T) -> Result<U, E>) -> Result<FeatureResult<U>, E> {
        Ok(match self {
            FeatureResult::UnknownFeature => FeatureResult::UnknownFeature,
            FeatureResult::DefaultValue { value } => FeatureResult::DefaultValue { value: f(value)? },
            FeatureResult::Force { value, rule_id } => FeatureResult::Force {
                value: f(value)?,
                rule_id,
            },
            FeatureResult::UrlOverride { value } => FeatureResult::UrlOverride { value: f(value)? },
            FeatureResult::Experiment {
                value,
                rule_id,
                experiment,
                experiment_result,
            } => FeatureResult::Experiment {
                value: f(value)?,
                rule_id,
                experiment,
                experiment_result: Box::new(experiment_result.try_map(&f)?),
            },
            FeatureResult::CyclicPrerequisite => FeatureResult::CyclicPrerequisite,
            FeatureResult::Override { value } => FeatureResult::Override { value: f(value)? },
            FeatureResult::Prerequisite => FeatureResult::Prerequisite,
        })
    }
}

impl FeatureResult<Value> {
    /// Whether the value counts as "on": non-null, non-zero, non-empty and not `false`.
    pub fn is_on(&self) -> bool {
        self.value().is_some_and(is_on)
    }

    #[allow(missing_docs)]
    pub fn is_off(&self) -> bool {
        !self.is_on()
    }
}

impl Serialize for FeatureResult<Value> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("FeatureResult", 7)?;
        state.serialize_field("value", self.value().unwrap_or(&Value::Null))?;
        state.serialize_field("on", &self.is_on())?;
        state.serialize_field("off", &self.is_off())?;
        state.serialize_field("source", &self.source())?;
        state.serialize_field("ruleId", self.rule_id().unwrap_or(""))?;
        if let FeatureResult::Experiment {
            experiment,
            experiment_result,
            ..
        } = self
        {
            state.serialize_field("experiment", experiment)?;
            state.serialize_field("experimentResult", experiment_result)?;
        }
        state.end()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Value};

    use super::*;

    fn experiment_result() -> ExperimentResult {
        ExperimentResult {
            value: Some(json!("b")),
            variation_id: 1,
            in_experiment: true,
            hash_attribute: "id".to_owned(),
            hash_value: "123".to_owned(),
            key: "1".to_owned(),
            name: None,
            bucket: Some(0.7),
            passthrough: false,
            hash_used: true,
            sticky_bucket_used: false,
            feature_id: Some("feature".to_owned()),
        }
    }

    #[test]
    fn experiment_result_field_names() {
        let json = serde_json::to_value(experiment_result()).unwrap();
        assert_eq!(
            json,
            json!({
                "value": "b",
                "variationId": 1,
                "inExperiment": true,
                "hashAttribute": "id",
                "hashValue": "123",
                "key": "1",
                "name": null,
                "bucket": 0.7,
                "passthrough": false,
                "hashUsed": true,
                "stickyBucketUsed": false,
                "featureId": "feature"
            })
        );
    }

    #[test]
    fn feature_result_serialization() {
        let result = FeatureResult::Force {
            value: json!("bonjour"),
            rule_id: Some("r1".to_owned()),
        };
        assert_eq!(
            serde_json::to_value(&result).unwrap(),
            json!({"value": "bonjour", "on": true, "off": false, "source": "force", "ruleId": "r1"})
        );

        let result: FeatureResult = FeatureResult::CyclicPrerequisite;
        assert_eq!(
            serde_json::to_value(&result).unwrap(),
            json!({"value": null, "on": false, "off": true, "source": "cyclicPrerequisite", "ruleId": ""})
        );

        let result = FeatureResult::Experiment {
            value: json!("b"),
            rule_id: None,
            experiment: Box::new(Experiment::new("exp", vec![json!("a"), json!("b")])),
            experiment_result: Box::new(experiment_result()),
        };
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["source"], json!("experiment"));
        assert_eq!(json["experiment"]["key"], json!("exp"));
        assert_eq!(json["experimentResult"]["variationId"], json!(1));
    }

    #[test]
    fn on_off() {
        let on = |value: Value| FeatureResult::DefaultValue { value }.is_on();
        assert!(on(json!(true)));
        assert!(on(json!(1)));
        assert!(on(json!("x")));
        assert!(on(json!([0])));
        assert!(!on(json!(false)));
        assert!(!on(json!(0)));
        assert!(!on(json!("")));
        assert!(!on(json!(null)));
        assert!(!on(json!({})));
        assert!(FeatureResult::<Value>::UnknownFeature.is_off());
    }

    #[test]
    fn map_value() {
        let result = FeatureResult::Force {
            value: json!(3),
            rule_id: None,
        };
        let typed: FeatureResult<i64> = result.try_map(serde_json::from_value).unwrap();
        assert_eq!(typed.value(), Some(&3));
        assert_eq!(typed.source(), FeatureSource::Force);

        let result = FeatureResult::DefaultValue { value: json!("x") };
        assert!(result.try_map(serde_json::from_value::<i64>).is_err());
    }
}
