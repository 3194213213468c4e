use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

use serde_json::Value;
use url::Url;

use crate::{
    sticky_bucket::{StickyAssignmentsDocuments, StickyBucketService},
    tracking::{
        ExperimentTracker, FeatureUsageCallback, NoopFeatureUsageCallback, NoopTrackingCallback,
        TrackingCallback,
    },
    Attributes, Configuration, Experiment, ExperimentResult, Result,
};

/// Everything known about the user being evaluated.
#[derive(Debug, Clone, Default)]
pub struct UserContext {
    /// User attributes used for targeting and hashing.
    pub attributes: Attributes,
    /// Current page URL. Used for query string overrides.
    pub url: Option<Url>,
    /// Experiment key to forced variation index. Takes precedence over
    /// [`EvalOptions::forced_variations`].
    pub forced_variations: HashMap<String, usize>,
    /// Feature key to forced value. Takes precedence over [`EvalOptions::forced_feature_values`].
    pub forced_feature_values: HashMap<String, Value>,
    /// Sticky bucket documents loaded for this user.
    pub sticky_bucket_assignment_docs: StickyAssignmentsDocuments,
}

impl UserContext {
    /// Create a context for a user with the given attributes.
    pub fn new(attributes: Attributes) -> UserContext {
        UserContext {
            attributes,
            ..Default::default()
        }
    }

    /// Parse attributes from a JSON object.
    pub fn from_attributes_json(attributes_json: &str) -> Result<UserContext> {
        let value: Value = serde_json::from_str(attributes_json)?;
        match value {
            Value::Object(attributes) => Ok(UserContext::new(attributes)),
            _ => Err(crate::Error::AttributesNotAnObject),
        }
    }
}

/// Evaluation settings shared by all users.
pub struct EvalOptions {
    /// When `false`, every experiment evaluates to "not in experiment".
    pub enabled: bool,
    /// When `true`, users are never randomly assigned (forced variations still apply).
    pub qa_mode: bool,
    /// Allow `?gb~feature=value` query parameters to override feature values.
    pub allow_url_overrides: bool,
    /// Experiment key to forced variation index.
    pub forced_variations: HashMap<String, usize>,
    /// Feature key to forced value.
    pub forced_feature_values: HashMap<String, Value>,
    /// Storage for sticky bucket assignments. Sticky bucketing is disabled when `None`.
    pub sticky_bucket_service: Option<Arc<dyn StickyBucketService + Send + Sync>>,
    /// Receives experiment exposures.
    pub tracking_callback: Box<dyn TrackingCallback + Send + Sync>,
    /// Receives every feature evaluation.
    pub feature_usage_callback: Box<dyn FeatureUsageCallback + Send + Sync>,
    /// De-duplicates exposures passed to `tracking_callback`.
    pub experiment_tracker: ExperimentTracker,
}

impl Default for EvalOptions {
    fn default() -> Self {
        EvalOptions {
            enabled: true,
            qa_mode: false,
            allow_url_overrides: false,
            forced_variations: HashMap::new(),
            forced_feature_values: HashMap::new(),
            sticky_bucket_service: None,
            tracking_callback: Box::new(NoopTrackingCallback),
            feature_usage_callback: Box::new(NoopFeatureUsageCallback),
            experiment_tracker: ExperimentTracker::default(),
        }
    }
}

impl std::fmt::Debug for EvalOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EvalOptions")
            .field("enabled", &self.enabled)
            .field("qa_mode", &self.qa_mode)
            .field("allow_url_overrides", &self.allow_url_overrides)
            .field("forced_variations", &self.forced_variations)
            .field("forced_feature_values", &self.forced_feature_values)
            .field(
                "sticky_bucketing",
                &self.sticky_bucket_service.is_some(),
            )
            .finish_non_exhaustive()
    }
}

/// State of a single top-level evaluation. Holds the stack of features being evaluated, used to
/// detect prerequisite cycles.
pub(super) struct EvalContext<'a> {
    pub(super) configuration: &'a Configuration,
    pub(super) options: &'a EvalOptions,
    pub(super) user: &'a mut UserContext,
    pub(super) stack: HashSet<String>,
}

impl<'a> EvalContext<'a> {
    pub(super) fn new(
        configuration: &'a Configuration,
        options: &'a EvalOptions,
        user: &'a mut UserContext,
    ) -> EvalContext<'a> {
        EvalContext {
            configuration,
            options,
            user,
            stack: HashSet::new(),
        }
    }

    pub(super) fn forced_variation(&self, experiment_key: &str) -> Option<usize> {
        self.user
            .forced_variations
            .get(experiment_key)
            .or_else(|| self.options.forced_variations.get(experiment_key))
            .copied()
    }

    pub(super) fn forced_feature_value(&self, feature_key: &str) -> Option<&Value> {
        self.user
            .forced_feature_values
            .get(feature_key)
            .or_else(|| self.options.forced_feature_values.get(feature_key))
    }

    pub(super) fn sticky_bucket_service(
        &self,
        disable_sticky_bucketing: bool,
    ) -> Option<&'a (dyn StickyBucketService + Send + Sync)> {
        if disable_sticky_bucketing {
            return None;
        }
        self.options.sticky_bucket_service.as_deref()
    }

    /// Report an exposure unless it was reported recently.
    pub(super) fn track(&self, experiment: &Experiment, result: &ExperimentResult) {
        let key = ExperimentTracker::tracking_key(experiment, result);
        if !self.options.experiment_tracker.track(key) {
            return;
        }

        log::trace!(target: "growthbook",
                    experiment_key = experiment.key.as_str(),
                    variation_id = result.variation_id;
                    "tracking experiment exposure");
        self.options.tracking_callback.on_track(experiment, result);
    }
}
