use crate::{
    bucketing::{is_filtered_out, is_included_in_rollout},
    error::EvaluationFailure,
    models::Force,
    url_override::{get_forced_feature_value, FeatureValueType},
    Configuration, FeatureResult,
};

use super::{
    context::EvalContext, eval_experiment::ParentConditions, EvalOptions, UserContext,
};

/// Evaluate the feature `feature_key` for the user.
///
/// Evaluation never fails. Unknown features (including features that failed to parse) evaluate
/// to [`FeatureResult::UnknownFeature`].
pub fn eval_feature(
    configuration: Option<&Configuration>,
    options: &EvalOptions,
    user: &mut UserContext,
    feature_key: &str,
    expected_type: Option<FeatureValueType>,
) -> FeatureResult {
    let empty;
    let configuration = match configuration {
        Some(configuration) => configuration,
        None => {
            log::warn!(target: "growthbook",
                       feature_key;
                       "evaluating a feature before configuration has been loaded");
            empty = Configuration::default();
            &empty
        }
    };

    let result = EvalContext::new(configuration, options, user).eval_feature(feature_key, expected_type);

    log::trace!(target: "growthbook",
                feature_key,
                source:serde = result.source(),
                value:serde = result.value();
                "evaluated a feature");

    result
}

impl<'a> EvalContext<'a> {
    pub(super) fn eval_feature(
        &mut self,
        feature_key: &str,
        expected_type: Option<FeatureValueType>,
    ) -> FeatureResult {
        let result = if self.stack.contains(feature_key) {
            log::debug!(target: "growthbook",
                        feature_key;
                        "cyclic prerequisite detected");
            FeatureResult::CyclicPrerequisite
        } else {
            self.stack.insert(feature_key.to_owned());
            let result = self.eval_feature_rules(feature_key, expected_type);
            self.stack.remove(feature_key);
            result
        };

        self.options
            .feature_usage_callback
            .on_feature_usage(feature_key, &result);

        result
    }

    fn eval_feature_rules(
        &mut self,
        feature_key: &str,
        expected_type: Option<FeatureValueType>,
    ) -> FeatureResult {
        if let Some(value) = self.forced_feature_value(feature_key) {
            return FeatureResult::Override {
                value: value.clone(),
            };
        }

        if self.options.allow_url_overrides {
            if let Some(url) = &self.user.url {
                if let Some(value) = get_forced_feature_value(url, feature_key, expected_type) {
                    return FeatureResult::UrlOverride { value };
                }
            }
        }

        let configuration: &'a Configuration = self.configuration;
        let feature = match configuration.get_feature(feature_key) {
            Ok(feature) => feature,
            Err(EvaluationFailure::FeatureParseFailed) => {
                log::warn!(target: "growthbook",
                           feature_key;
                           "feature definition failed to parse, treating as unknown");
                return FeatureResult::UnknownFeature;
            }
            Err(failure) => {
                log::debug!(target: "growthbook",
                            feature_key;
                            "{failure}");
                return FeatureResult::UnknownFeature;
            }
        };

        for rule in &feature.rules {
            match self.eval_parent_conditions(&rule.parent_conditions) {
                ParentConditions::Passed => {}
                ParentConditions::Cyclic => return FeatureResult::CyclicPrerequisite,
                ParentConditions::Failed { gate: true } => {
                    log::debug!(target: "growthbook",
                                feature_key;
                                "feature blocked by a prerequisite");
                    return FeatureResult::Prerequisite;
                }
                ParentConditions::Failed { gate: false } => continue,
            }

            if let Some(filters) = &rule.filters {
                if is_filtered_out(filters, &self.user.attributes) {
                    continue;
                }
            }

            if let Force::Set(value) = &rule.force {
                if let Some(condition) = &rule.condition {
                    if !condition.eval(&self.user.attributes, &configuration.saved_groups) {
                        continue;
                    }
                }

                let fallback_attribute = rule
                    .fallback_attribute
                    .as_deref()
                    .filter(|_| self.sticky_bucket_service(rule.disable_sticky_bucketing).is_some());
                if !is_included_in_rollout(
                    &self.user.attributes,
                    rule.seed.as_deref().unwrap_or(feature_key),
                    rule.hash_attribute.as_deref(),
                    fallback_attribute,
                    rule.range.as_ref(),
                    rule.coverage,
                    rule.hash_version,
                ) {
                    continue;
                }

                for track in &rule.tracks {
                    self.track(&track.experiment, &track.result.experiment_result);
                }

                return FeatureResult::Force {
                    value: value.clone(),
                    rule_id: rule.id.clone(),
                };
            }

            let Some(experiment) = rule.to_experiment(feature_key) else {
                continue;
            };

            let result = self.eval_experiment(&experiment, Some(feature_key));
            if result.in_experiment && !result.passthrough {
                return FeatureResult::Experiment {
                    value: result.value.clone().unwrap_or_default(),
                    rule_id: rule.id.clone(),
                    experiment: Box::new(experiment),
                    experiment_result: Box::new(result),
                };
            }
        }

        FeatureResult::DefaultValue {
            value: feature.default_value.clone(),
        }
    }
}
