use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use url::Url;

use crate::{
    configuration_store::ConfigurationStore,
    eval::{Evaluator, EvaluatorConfig, UserContext},
    Attributes, ClientConfig, Configuration, Error, Experiment, ExperimentResult, FeatureResult,
    Features, Result, SavedGroups,
};

/// A GrowthBook client for a single user.
///
/// In order to create a client instance, first create [`ClientConfig`].
///
/// # Examples
/// ```
/// # use growthbook::{Client, ClientConfig};
/// let client = Client::new(ClientConfig::new());
/// client.set_features_json(r#"{"dark-mode": {"defaultValue": true}}"#).unwrap();
/// assert!(client.is_on("dark-mode"));
/// ```
pub struct Client {
    evaluator: Evaluator,
    user: Mutex<UserContext>,
}

impl Client {
    /// Create a new `Client` using the specified configuration.
    pub fn new(config: ClientConfig) -> Self {
        Client::new_with_configuration_store(config, Arc::new(ConfigurationStore::new()))
    }

    /// Create a new `Client` reading features from a shared configuration store.
    pub fn new_with_configuration_store(
        config: ClientConfig,
        configuration_store: Arc<ConfigurationStore>,
    ) -> Self {
        let client = Client {
            evaluator: Evaluator::new(EvaluatorConfig {
                configuration_store,
                options: config.options,
            }),
            user: Mutex::new(UserContext {
                attributes: config.attributes,
                url: config.url,
                ..Default::default()
            }),
        };
        client.refresh_sticky_buckets();
        client
    }

    /// Replace feature definitions, keeping saved groups.
    pub fn set_features_json(&self, features_json: &str) -> Result<()> {
        let features: Features = serde_json::from_str(features_json)?;
        self.configuration_store()
            .update_configuration(|current| current.with_features(features));
        self.refresh_sticky_buckets();
        Ok(())
    }

    /// Replace saved groups, keeping feature definitions.
    pub fn set_saved_groups_json(&self, saved_groups_json: &str) -> Result<()> {
        let saved_groups: SavedGroups = serde_json::from_str(saved_groups_json)?;
        self.configuration_store()
            .update_configuration(|current| current.with_saved_groups(saved_groups));
        Ok(())
    }

    /// Replace the whole configuration.
    pub fn set_configuration(&self, configuration: Configuration) {
        self.configuration_store()
            .set_configuration(Arc::new(configuration));
        self.refresh_sticky_buckets();
    }

    /// Replace user attributes with a JSON object.
    pub fn set_attributes_json(&self, attributes_json: &str) -> Result<()> {
        let value: Value = serde_json::from_str(attributes_json)?;
        let Value::Object(attributes) = value else {
            return Err(Error::AttributesNotAnObject);
        };
        self.set_attributes(attributes);
        Ok(())
    }

    /// Replace user attributes.
    pub fn set_attributes(&self, attributes: Attributes) {
        self.lock_user().attributes = attributes;
        self.refresh_sticky_buckets();
    }

    /// Set the current page URL.
    pub fn set_url(&self, url: &str) -> Result<()> {
        let url = Url::parse(url)?;
        self.lock_user().url = Some(url);
        Ok(())
    }

    /// Force an experiment to a variation for this user.
    pub fn set_forced_variation(&self, experiment_key: impl Into<String>, variation: usize) {
        self.lock_user()
            .forced_variations
            .insert(experiment_key.into(), variation);
    }

    /// Force a feature to a value for this user.
    pub fn set_forced_feature_value(&self, feature_key: impl Into<String>, value: Value) {
        self.lock_user()
            .forced_feature_values
            .insert(feature_key.into(), value);
    }

    /// Evaluate a feature.
    pub fn eval_feature(&self, feature_key: &str) -> FeatureResult {
        self.evaluator
            .eval_feature(feature_key, &mut self.lock_user(), None)
    }

    /// Whether the feature value is "on".
    pub fn is_on(&self, feature_key: &str) -> bool {
        self.eval_feature(feature_key).is_on()
    }

    #[allow(missing_docs)]
    pub fn is_off(&self, feature_key: &str) -> bool {
        !self.is_on(feature_key)
    }

    /// Get the feature value converted to `T`, or `Ok(None)` if the feature has no value.
    pub fn try_get_feature_value<T: DeserializeOwned>(&self, feature_key: &str) -> Result<Option<T>> {
        self.eval_feature(feature_key)
            .into_value()
            .map(|value| {
                serde_json::from_value(value).map_err(|err| Error::TypeMismatch(Arc::new(err)))
            })
            .transpose()
    }

    /// Get the feature value converted to `T`, or `default` if the feature has no value or the value
    /// has a different type.
    pub fn get_feature_value<T: DeserializeOwned>(&self, feature_key: &str, default: T) -> T {
        match self.try_get_feature_value(feature_key) {
            Ok(Some(value)) => value,
            Ok(None) => default,
            Err(err) => {
                log::warn!(target: "growthbook",
                           feature_key;
                           "feature value has unexpected type, using default: {err}");
                default
            }
        }
    }

    /// Run an inline experiment. Variations are converted through their JSON representation.
    pub fn run<T>(&self, experiment: &Experiment<T>) -> Result<ExperimentResult<T>>
    where
        T: Serialize + DeserializeOwned + Clone,
    {
        let experiment = experiment.clone().try_map_variations(serde_json::to_value)?;
        let result = self
            .evaluator
            .run_experiment(&experiment, &mut self.lock_user());
        result
            .try_map(serde_json::from_value)
            .map_err(|err| Error::TypeMismatch(Arc::new(err)))
    }

    /// Reload sticky bucket assignments for the current attributes from the sticky bucket
    /// service.
    pub fn refresh_sticky_buckets(&self) {
        self.evaluator
            .refresh_sticky_buckets(&mut self.lock_user());
    }

    /// Store holding the current configuration. Can be shared with other clients.
    pub fn configuration_store(&self) -> &Arc<ConfigurationStore> {
        self.evaluator.configuration_store()
    }

    // Callbacks are invoked while the lock is held and must not call back into the client.
    fn lock_user(&self) -> MutexGuard<'_, UserContext> {
        self.user.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use std::{
        collections::HashMap,
        sync::{Arc, Mutex},
    };

    use serde::{Deserialize, Serialize};
    use serde_json::json;

    use crate::{
        configuration_store::ConfigurationStore, Client, ClientConfig, Configuration, Error,
        Experiment, ExperimentResult, FeatureSource, InMemoryStickyBucketService,
    };

    #[test]
    fn returns_unknown_while_no_configuration() {
        let client = Client::new(ClientConfig::new());
        assert_eq!(
            client.eval_feature("feature").source(),
            FeatureSource::UnknownFeature
        );
        assert!(client.is_off("feature"));
        assert_eq!(client.get_feature_value("feature", 3), 3);
    }

    #[test]
    fn returns_proper_value_once_configuration_is_set() {
        let configuration_store = Arc::new(ConfigurationStore::new());
        let client =
            Client::new_with_configuration_store(ClientConfig::new(), configuration_store.clone());

        // updating configuration after client is created
        configuration_store.set_configuration(Arc::new(
            Configuration::from_json(r#"{"feature": {"defaultValue": 42}}"#, None).unwrap(),
        ));

        assert_eq!(client.get_feature_value("feature", 0), 42);
        assert!(client.is_on("feature"));
    }

    #[test]
    fn saved_groups_survive_feature_updates() {
        let client = Client::new(ClientConfig::new());
        client
            .set_saved_groups_json(r#"{"beta": ["1", "2"]}"#)
            .unwrap();
        client
            .set_features_json(
                r#"{"beta-feature": {"defaultValue": false, "rules": [{"condition": {"id": {"$inGroup": "beta"}}, "force": true}]}}"#,
            )
            .unwrap();

        client.set_attributes_json(r#"{"id": "2"}"#).unwrap();
        assert!(client.is_on("beta-feature"));

        client.set_attributes_json(r#"{"id": "3"}"#).unwrap();
        assert!(client.is_off("beta-feature"));
    }

    #[test]
    fn invalid_inputs() {
        let client = Client::new(ClientConfig::new());
        assert!(matches!(
            client.set_attributes_json("[1]"),
            Err(Error::AttributesNotAnObject)
        ));
        assert!(matches!(
            client.set_features_json("nope"),
            Err(Error::InvalidJson(_))
        ));
        assert!(matches!(client.set_url("not a url"), Err(Error::InvalidUrl(_))));
    }

    #[test]
    fn typed_values() {
        #[derive(Debug, PartialEq, Deserialize)]
        struct Banner {
            text: String,
        }

        let client = Client::new(ClientConfig::new());
        client
            .set_features_json(r#"{"banner": {"defaultValue": {"text": "hi"}}, "count": {"defaultValue": "x"}}"#)
            .unwrap();

        assert_eq!(
            client.try_get_feature_value::<Banner>("banner").unwrap(),
            Some(Banner {
                text: "hi".to_owned()
            })
        );
        assert!(matches!(
            client.try_get_feature_value::<i64>("count"),
            Err(Error::TypeMismatch(_))
        ));
        assert_eq!(client.get_feature_value("count", 7), 7);
    }

    #[test]
    fn typed_experiment() {
        #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
        enum Color {
            Red,
            Blue,
        }

        let tracked = Arc::new(Mutex::new(Vec::new()));
        let mut config = ClientConfig::new();
        config.tracking_callback({
            let tracked = tracked.clone();
            move |experiment: &Experiment, result: &ExperimentResult| {
                tracked
                    .lock()
                    .unwrap()
                    .push((experiment.key.clone(), result.variation_id));
            }
        });
        let client = config.to_client();
        client.set_attributes_json(r#"{"id": "123"}"#).unwrap();

        let mut experiment = Experiment::new("exp1", vec![Color::Red, Color::Blue]);
        experiment.hash_version = Some(2);

        let result = client.run(&experiment).unwrap();
        assert!(result.in_experiment);
        assert_eq!(result.value, Some(Color::Red));
        assert_eq!(*tracked.lock().unwrap(), vec![("exp1".to_owned(), 0)]);
    }

    #[test]
    fn forced_values_and_url() {
        let mut config = ClientConfig::new();
        config
            .allow_url_overrides(true)
            .forced_feature_values(HashMap::from([("a".to_owned(), json!("forced"))]));
        let client = config.to_client();
        client
            .set_features_json(r#"{"a": {"defaultValue": "x"}, "b": {"defaultValue": "x"}}"#)
            .unwrap();

        assert_eq!(client.get_feature_value("a", String::new()), "forced");

        client.set_url("https://example.com/?gb~b=%22url%22").unwrap();
        assert_eq!(client.eval_feature("b").source(), FeatureSource::UrlOverride);
        assert_eq!(client.get_feature_value("b", String::new()), "url");

        client.set_forced_feature_value("b", json!("user"));
        assert_eq!(client.get_feature_value("b", String::new()), "user");
    }

    #[test]
    fn sticky_bucketing_through_client() {
        let service = Arc::new(InMemoryStickyBucketService::new());
        let mut config = ClientConfig::new();
        config.sticky_bucket_service(service.clone());
        let client = config.to_client();
        client
            .set_features_json(
                r#"{"f": {"defaultValue": "d", "rules": [{"key": "exp1", "variations": ["a", "b"], "hashVersion": 2, "meta": [{"key": "a"}, {"key": "b"}]}]}}"#,
            )
            .unwrap();
        client.set_attributes_json(r#"{"id": "123"}"#).unwrap();

        assert_eq!(client.get_feature_value("f", String::new()), "a");

        // A second client for the same user picks up the stored assignment.
        let mut config = ClientConfig::new();
        config.sticky_bucket_service(service);
        let other = config.to_client();
        other
            .set_features_json(
                r#"{"f": {"defaultValue": "d", "rules": [{"key": "exp1", "variations": ["a", "b"], "weights": [0, 1], "meta": [{"key": "a"}, {"key": "b"}]}]}}"#,
            )
            .unwrap();
        other.set_attributes_json(r#"{"id": "123"}"#).unwrap();

        let result = other.eval_feature("f");
        assert_eq!(result.value(), Some(&json!("a")));
        assert!(result.experiment_result().unwrap().sticky_bucket_used);
    }
}
