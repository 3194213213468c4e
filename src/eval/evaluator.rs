use std::sync::Arc;

use crate::{
    configuration_store::ConfigurationStore, sticky_bucket::get_sticky_bucket_attributes,
    url_override::FeatureValueType, Configuration, Experiment, ExperimentResult, FeatureResult,
};

use super::{eval_feature, run_experiment, EvalOptions, UserContext};

/// Configuration of an [`Evaluator`].
#[allow(missing_docs)]
pub struct EvaluatorConfig {
    pub configuration_store: Arc<ConfigurationStore>,
    pub options: EvalOptions,
}

/// Evaluator simplifies calling into evaluation functions: it takes a configuration snapshot from
/// the store for every call and applies shared options. Safe to share between threads; per-user
/// state lives in [`UserContext`].
pub struct Evaluator {
    config: EvaluatorConfig,
}

impl Evaluator {
    #[allow(missing_docs)]
    pub fn new(config: EvaluatorConfig) -> Evaluator {
        Evaluator { config }
    }

    /// Evaluate a feature for the user.
    pub fn eval_feature(
        &self,
        feature_key: &str,
        user: &mut UserContext,
        expected_type: Option<FeatureValueType>,
    ) -> FeatureResult {
        let configuration = self.get_configuration();
        eval_feature(
            configuration.as_deref(),
            &self.config.options,
            user,
            feature_key,
            expected_type,
        )
    }

    /// Run an inline experiment for the user.
    pub fn run_experiment(&self, experiment: &Experiment, user: &mut UserContext) -> ExperimentResult {
        let configuration = self.get_configuration();
        run_experiment(
            configuration.as_deref(),
            &self.config.options,
            user,
            experiment,
        )
    }

    /// Reload the user's sticky bucket documents from the sticky bucket service. Does nothing if
    /// sticky bucketing is not configured.
    pub fn refresh_sticky_buckets(&self, user: &mut UserContext) {
        let Some(service) = &self.config.options.sticky_bucket_service else {
            return;
        };

        let configuration = self.get_configuration().unwrap_or_default();
        let attributes = get_sticky_bucket_attributes(
            configuration.sticky_bucket_identifier_attributes(),
            &user.attributes,
        );
        user.sticky_bucket_assignment_docs = service.get_all_assignments(&attributes);

        log::trace!(target: "growthbook",
                    documents = user.sticky_bucket_assignment_docs.len();
                    "refreshed sticky buckets");
    }

    #[allow(missing_docs)]
    pub fn options(&self) -> &EvalOptions {
        &self.config.options
    }

    #[allow(missing_docs)]
    pub fn configuration_store(&self) -> &Arc<ConfigurationStore> {
        &self.config.configuration_store
    }

    fn get_configuration(&self) -> Option<Arc<Configuration>> {
        self.config.configuration_store.get_configuration()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use crate::{
        configuration_store::ConfigurationStore,
        eval::{EvalOptions, Evaluator, EvaluatorConfig, UserContext},
        sticky_bucket::{InMemoryStickyBucketService, StickyAssignmentsDocument, StickyBucketService},
        Configuration, FeatureSource,
    };

    const FEATURES: &str = r#"{
        "exp-feature": {
            "defaultValue": "default",
            "rules": [{
                "key": "exp1",
                "variations": ["control", "treatment"],
                "hashVersion": 2,
                "hashAttribute": "deviceId",
                "meta": [{"key": "c"}, {"key": "t"}]
            }]
        }
    }"#;

    fn evaluator(options: EvalOptions) -> Evaluator {
        let store = Arc::new(ConfigurationStore::new());
        store.set_configuration(Arc::new(Configuration::from_json(FEATURES, None).unwrap()));
        Evaluator::new(EvaluatorConfig {
            configuration_store: store,
            options,
        })
    }

    #[test]
    fn unknown_feature_without_configuration() {
        let _ = env_logger::builder().is_test(true).try_init();

        let evaluator = Evaluator::new(EvaluatorConfig {
            configuration_store: Arc::new(ConfigurationStore::new()),
            options: EvalOptions::default(),
        });
        let result = evaluator.eval_feature("exp-feature", &mut UserContext::default(), None);
        assert_eq!(result.source(), FeatureSource::UnknownFeature);
    }

    #[test]
    fn evaluates_against_current_configuration() {
        let evaluator = evaluator(EvalOptions::default());
        let mut user = UserContext::new(json!({"deviceId": "123"}).as_object().cloned().unwrap());

        let result = evaluator.eval_feature("exp-feature", &mut user, None);
        assert_eq!(result.source(), FeatureSource::Experiment);
        assert_eq!(result.value(), Some(&json!("control")));
    }

    #[test]
    fn refresh_sticky_buckets_loads_documents() {
        let service = Arc::new(InMemoryStickyBucketService::new());
        service.save_assignments(StickyAssignmentsDocument {
            attribute_name: "deviceId".to_owned(),
            attribute_value: "123".to_owned(),
            assignments: [("exp1__0".to_owned(), "t".to_owned())].into(),
        });
        service.save_assignments(StickyAssignmentsDocument {
            attribute_name: "id".to_owned(),
            attribute_value: "123".to_owned(),
            assignments: [("other__0".to_owned(), "x".to_owned())].into(),
        });

        let evaluator = evaluator(EvalOptions {
            sticky_bucket_service: Some(service),
            ..Default::default()
        });
        let mut user = UserContext::new(json!({"deviceId": "123", "id": "123"}).as_object().cloned().unwrap());

        evaluator.refresh_sticky_buckets(&mut user);
        // Only identifier attributes used by experiment rules are loaded.
        assert_eq!(user.sticky_bucket_assignment_docs.len(), 1);

        let result = evaluator.eval_feature("exp-feature", &mut user, None);
        assert_eq!(result.value(), Some(&json!("treatment")));
        assert!(result.experiment_result().unwrap().sticky_bucket_used);
    }
}
