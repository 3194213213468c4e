use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::{
    error::EvaluationFailure,
    models::{Feature, Features, TryParse},
    sticky_bucket::derive_sticky_bucket_identifier_attributes,
    Result, SavedGroups,
};

/// Feature definitions and saved groups. It's a central piece that defines evaluation behavior.
///
/// `Configuration` is immutable: updates build a new configuration and swap it in the
/// [`ConfigurationStore`](crate::ConfigurationStore).
#[derive(Debug, Clone)]
pub struct Configuration {
    /// Timestamp when configuration was loaded.
    pub fetched_at: DateTime<Utc>,
    /// Feature definitions.
    pub features: Features,
    /// Saved groups referenced by `$inGroup`/`$notInGroup`.
    pub saved_groups: SavedGroups,
    sticky_bucket_identifier_attributes: BTreeSet<String>,
}

/// Full SDK payload: `{"features": {...}, "savedGroups": {...}}`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Payload {
    #[serde(default)]
    features: Features,
    #[serde(default)]
    saved_groups: SavedGroups,
}

impl Configuration {
    /// Create a new configuration.
    pub fn new(features: Features, saved_groups: SavedGroups) -> Configuration {
        let sticky_bucket_identifier_attributes =
            derive_sticky_bucket_identifier_attributes(&features);
        Configuration {
            fetched_at: Utc::now(),
            features,
            saved_groups,
            sticky_bucket_identifier_attributes,
        }
    }

    /// Parse a features JSON (`{"featureKey": {...}}`) and an optional saved groups JSON.
    ///
    /// Features that fail to parse are kept and evaluate as unknown features; only a payload that
    /// is not a JSON object of features is an error.
    pub fn from_json(features_json: &str, saved_groups_json: Option<&str>) -> Result<Configuration> {
        let features: Features = serde_json::from_str(features_json)?;
        let saved_groups = match saved_groups_json {
            Some(json) => serde_json::from_str(json)?,
            None => SavedGroups::new(),
        };

        for (key, feature) in &features {
            if let TryParse::ParseFailed(_) = feature {
                log::warn!(target: "growthbook", feature_key = key.as_str(); "failed to parse feature definition");
            }
        }

        Ok(Configuration::new(features, saved_groups))
    }

    /// Parse a full SDK payload with `features` and `savedGroups`.
    pub fn from_payload_json(payload_json: &str) -> Result<Configuration> {
        let payload: Payload = serde_json::from_str(payload_json)?;
        Ok(Configuration::new(payload.features, payload.saved_groups))
    }

    /// Copy of this configuration with features replaced.
    pub fn with_features(&self, features: Features) -> Configuration {
        Configuration::new(features, self.saved_groups.clone())
    }

    /// Copy of this configuration with saved groups replaced.
    pub fn with_saved_groups(&self, saved_groups: SavedGroups) -> Configuration {
        Configuration {
            fetched_at: Utc::now(),
            features: self.features.clone(),
            saved_groups,
            sticky_bucket_identifier_attributes: self.sticky_bucket_identifier_attributes.clone(),
        }
    }

    pub(crate) fn get_feature(&self, key: &str) -> std::result::Result<&Feature, EvaluationFailure> {
        match self.features.get(key) {
            None => Err(EvaluationFailure::UnknownFeature),
            Some(TryParse::Parsed(feature)) => Ok(feature),
            Some(TryParse::ParseFailed(_)) => Err(EvaluationFailure::FeatureParseFailed),
        }
    }

    /// Attributes sticky bucket documents are keyed by.
    pub fn sticky_bucket_identifier_attributes(&self) -> &BTreeSet<String> {
        &self.sticky_bucket_identifier_attributes
    }
}

impl Default for Configuration {
    fn default() -> Self {
        Configuration::new(Features::new(), SavedGroups::new())
    }
}
