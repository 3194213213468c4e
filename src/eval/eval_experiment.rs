use std::collections::HashMap;

use serde_json::{Map, Value};

use crate::{
    bucketing::{choose_variation, get_bucket_ranges, in_namespace, is_filtered_out},
    hashing::hash,
    models::ParentCondition,
    sticky_bucket::{
        generate_sticky_bucket_assignment_doc, get_hash_attribute,
        get_sticky_bucket_experiment_key, get_sticky_bucket_variation, HashAttribute,
        StickyBucketExperiment, StickyBucketService, StickyBucketVariation,
    },
    url_override::get_query_string_override,
    Configuration, Experiment, ExperimentResult, FeatureResult,
};

use super::{context::EvalContext, EvalOptions, UserContext};

/// Run an experiment for the user and report the exposure through the tracking callback.
///
/// Prerequisites of the experiment are evaluated against `configuration`. Without a configuration,
/// any prerequisite feature is unknown.
pub fn run_experiment(
    configuration: Option<&Configuration>,
    options: &EvalOptions,
    user: &mut UserContext,
    experiment: &Experiment,
) -> ExperimentResult {
    let empty;
    let configuration = match configuration {
        Some(configuration) => configuration,
        None => {
            empty = Configuration::default();
            &empty
        }
    };

    let result = EvalContext::new(configuration, options, user).eval_experiment(experiment, None);

    log::trace!(target: "growthbook",
                experiment_key = experiment.key.as_str(),
                variation_id = result.variation_id,
                in_experiment = result.in_experiment;
                "ran an experiment");

    result
}

pub(super) enum ParentConditions {
    Passed,
    Cyclic,
    Failed { gate: bool },
}

impl<'a> EvalContext<'a> {
    pub(super) fn eval_experiment(
        &mut self,
        experiment: &Experiment,
        feature_id: Option<&str>,
    ) -> ExperimentResult {
        let key = experiment.key.as_str();
        let num_variations = experiment.variations.len();

        if num_variations < 2 {
            log::debug!(target: "growthbook",
                        experiment_key = key;
                        "experiment has fewer than two variations");
            return self.not_in_experiment(experiment, feature_id);
        }
        if !self.options.enabled {
            return self.not_in_experiment(experiment, feature_id);
        }

        if let Some(url) = &self.user.url {
            if let Some(variation) = get_query_string_override(key, url, num_variations) {
                return self.forced_result(experiment, variation, feature_id);
            }
        }

        if let Some(variation) = self.forced_variation(key) {
            return self.forced_result(experiment, variation, feature_id);
        }

        if !experiment.is_active {
            return self.not_in_experiment(experiment, feature_id);
        }

        let sticky_bucket_service = self.sticky_bucket_service(experiment.disable_sticky_bucketing);
        let hash_attribute = self.hash_attribute(experiment, sticky_bucket_service.is_some());
        if hash_attribute.value.is_empty() || hash_attribute.value == "null" {
            log::debug!(target: "growthbook",
                        experiment_key = key;
                        "user has no value for the hash attribute");
            return self.not_in_experiment(experiment, feature_id);
        }

        let sticky = match sticky_bucket_service {
            Some(_) => get_sticky_bucket_variation(
                &StickyBucketExperiment {
                    key,
                    bucket_version: experiment.bucket_version,
                    min_bucket_version: experiment.min_bucket_version,
                    meta: experiment.meta.as_deref().unwrap_or_default(),
                    hash_attribute: experiment.hash_attribute.as_deref(),
                    fallback_attribute: experiment.fallback_attribute.as_deref(),
                },
                &self.user.sticky_bucket_assignment_docs,
                &self.user.attributes,
            ),
            None => StickyBucketVariation::default(),
        };
        let found_sticky_bucket = sticky.variation.is_some();

        if !found_sticky_bucket && !self.is_targeted(experiment, &hash_attribute) {
            return self.not_in_experiment(experiment, feature_id);
        }

        let Some(n) = hash(
            experiment.seed.as_deref().unwrap_or(key),
            &hash_attribute.value,
            experiment.hash_version.unwrap_or(1),
        ) else {
            log::warn!(target: "growthbook",
                       experiment_key = key;
                       "unsupported hash version");
            return self.not_in_experiment(experiment, feature_id);
        };

        let assigned = match sticky.variation {
            Some(variation) => Some(variation),
            None => {
                let ranges = match &experiment.ranges {
                    Some(ranges) => ranges.clone(),
                    None => get_bucket_ranges(
                        num_variations,
                        experiment.coverage.unwrap_or(1.0),
                        experiment.weights.as_deref(),
                    ),
                };
                choose_variation(n, &ranges)
            }
        };

        if sticky.version_is_blocked {
            log::debug!(target: "growthbook",
                        experiment_key = key;
                        "sticky bucket version is blocked");
            let mut result = self.not_in_experiment(experiment, feature_id);
            result.sticky_bucket_used = true;
            return result;
        }

        let Some(assigned) = assigned else {
            return self.not_in_experiment(experiment, feature_id);
        };

        if let Some(force) = experiment.force {
            let variation = usize::try_from(force).unwrap_or(usize::MAX);
            return self.forced_result(experiment, variation, feature_id);
        }

        if self.options.qa_mode {
            return self.not_in_experiment(experiment, feature_id);
        }

        let result = self.experiment_result(
            experiment,
            Some(assigned),
            true,
            feature_id,
            Some(n),
            found_sticky_bucket,
        );

        if let Some(service) = sticky_bucket_service {
            self.save_sticky_bucket_assignment(service, experiment, &hash_attribute, &result);
        }

        self.track(experiment, &result);

        result
    }

    /// Filters (or the deprecated namespace), targeting condition and prerequisites.
    fn is_targeted(&mut self, experiment: &Experiment, hash_attribute: &HashAttribute) -> bool {
        let key = experiment.key.as_str();

        if let Some(filters) = &experiment.filters {
            if is_filtered_out(filters, &self.user.attributes) {
                log::debug!(target: "growthbook", experiment_key = key; "filtered out");
                return false;
            }
        } else if let Some(namespace) = &experiment.namespace {
            if !in_namespace(&hash_attribute.value, namespace) {
                log::debug!(target: "growthbook", experiment_key = key; "not in namespace");
                return false;
            }
        }

        if let Some(condition) = &experiment.condition {
            if !condition.eval(&self.user.attributes, &self.configuration.saved_groups) {
                log::debug!(target: "growthbook", experiment_key = key; "condition not met");
                return false;
            }
        }

        match self.eval_parent_conditions(&experiment.parent_conditions) {
            ParentConditions::Passed => true,
            ParentConditions::Cyclic | ParentConditions::Failed { .. } => {
                log::debug!(target: "growthbook", experiment_key = key; "prerequisite not met");
                false
            }
        }
    }

    /// Evaluate prerequisite features in order, stopping at the first one that fails.
    pub(super) fn eval_parent_conditions(
        &mut self,
        parent_conditions: &[ParentCondition],
    ) -> ParentConditions {
        for parent in parent_conditions {
            let parent_result = self.eval_feature(&parent.feature_id, None);
            if let FeatureResult::CyclicPrerequisite = parent_result {
                return ParentConditions::Cyclic;
            }

            let mut attributes = Map::new();
            attributes.insert(
                "value".to_owned(),
                parent_result.into_value().unwrap_or(Value::Null),
            );
            if !parent
                .condition
                .eval(&attributes, &self.configuration.saved_groups)
            {
                return ParentConditions::Failed { gate: parent.gate };
            }
        }
        ParentConditions::Passed
    }

    /// The fallback attribute is only used when sticky bucketing is enabled.
    fn hash_attribute(&self, experiment: &Experiment, sticky_bucketing: bool) -> HashAttribute {
        let fallback = experiment
            .fallback_attribute
            .as_deref()
            .filter(|_| sticky_bucketing);
        get_hash_attribute(
            experiment.hash_attribute.as_deref(),
            fallback,
            &self.user.attributes,
        )
    }

    fn save_sticky_bucket_assignment(
        &mut self,
        service: &(dyn StickyBucketService + Send + Sync),
        experiment: &Experiment,
        hash_attribute: &HashAttribute,
        result: &ExperimentResult,
    ) {
        let experiment_key =
            get_sticky_bucket_experiment_key(&experiment.key, experiment.bucket_version);
        let generated = generate_sticky_bucket_assignment_doc(
            &self.user.sticky_bucket_assignment_docs,
            &hash_attribute.attribute,
            &hash_attribute.value,
            HashMap::from([(experiment_key, result.key.clone())]),
        );
        if !generated.changed {
            return;
        }

        log::trace!(target: "growthbook",
                    experiment_key = experiment.key.as_str(),
                    document_key = generated.key.as_str();
                    "saving sticky bucket assignment");
        self.user
            .sticky_bucket_assignment_docs
            .insert(generated.key, generated.doc.clone());
        service.save_assignments(generated.doc);
    }

    fn forced_result(
        &self,
        experiment: &Experiment,
        variation: usize,
        feature_id: Option<&str>,
    ) -> ExperimentResult {
        self.experiment_result(experiment, Some(variation), false, feature_id, None, false)
    }

    fn not_in_experiment(
        &self,
        experiment: &Experiment,
        feature_id: Option<&str>,
    ) -> ExperimentResult {
        self.experiment_result(experiment, None, false, feature_id, None, false)
    }

    /// Build a result for `variation`. A missing or out of range variation means the user is not
    /// in the experiment and gets variation `0`.
    fn experiment_result(
        &self,
        experiment: &Experiment,
        variation: Option<usize>,
        hash_used: bool,
        feature_id: Option<&str>,
        bucket: Option<f64>,
        sticky_bucket_used: bool,
    ) -> ExperimentResult {
        let (variation_id, in_experiment) = match variation {
            Some(v) if v < experiment.variations.len() => (v, true),
            _ => (0, false),
        };

        let meta = experiment
            .meta
            .as_ref()
            .and_then(|meta| meta.get(variation_id));

        let sticky_bucketing = self
            .sticky_bucket_service(experiment.disable_sticky_bucketing)
            .is_some();
        let hash_attribute = self.hash_attribute(experiment, sticky_bucketing);

        ExperimentResult {
            value: experiment.variations.get(variation_id).cloned(),
            variation_id,
            in_experiment,
            hash_attribute: hash_attribute.attribute,
            hash_value: hash_attribute.value,
            key: meta
                .and_then(|meta| meta.key.clone())
                .unwrap_or_else(|| variation_id.to_string()),
            name: meta.and_then(|meta| meta.name.clone()),
            bucket,
            passthrough: meta.and_then(|meta| meta.passthrough).unwrap_or(false),
            hash_used,
            sticky_bucket_used,
            feature_id: feature_id.map(ToOwned::to_owned),
        }
    }
}
