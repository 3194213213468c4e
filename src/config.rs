use std::{collections::HashMap, sync::Arc};

use serde_json::Value;
use url::Url;

use crate::{
    eval::EvalOptions, Attributes, Client, FeatureUsageCallback, StickyBucketService,
    TrackingCallback,
};

/// Configuration for [`Client`].
pub struct ClientConfig {
    pub(crate) options: EvalOptions,
    pub(crate) attributes: Attributes,
    pub(crate) url: Option<Url>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig::new()
    }
}

impl ClientConfig {
    /// Create a default configuration: experiments enabled, no overrides, no sticky bucketing.
    ///
    /// ```
    /// # use growthbook::ClientConfig;
    /// ClientConfig::new();
    /// ```
    pub fn new() -> Self {
        ClientConfig {
            options: EvalOptions::default(),
            attributes: Attributes::new(),
            url: None,
        }
    }

    /// Set the callback receiving experiment exposures. Use it to save assignments to your data
    /// warehouse.
    ///
    /// ```
    /// # use growthbook::{ClientConfig, Experiment, ExperimentResult};
    /// let mut config = ClientConfig::new();
    /// config.tracking_callback(|experiment: &Experiment, result: &ExperimentResult| {
    ///   println!("{} {}", experiment.key, result.variation_id);
    /// });
    /// ```
    pub fn tracking_callback(
        &mut self,
        tracking_callback: impl TrackingCallback + Send + Sync + 'static,
    ) -> &mut Self {
        self.options.tracking_callback = Box::new(tracking_callback);
        self
    }

    /// Set the callback receiving every feature evaluation.
    pub fn feature_usage_callback(
        &mut self,
        feature_usage_callback: impl FeatureUsageCallback + Send + Sync + 'static,
    ) -> &mut Self {
        self.options.feature_usage_callback = Box::new(feature_usage_callback);
        self
    }

    /// Enable sticky bucketing with the given storage.
    pub fn sticky_bucket_service(
        &mut self,
        sticky_bucket_service: Arc<dyn StickyBucketService + Send + Sync>,
    ) -> &mut Self {
        self.options.sticky_bucket_service = Some(sticky_bucket_service);
        self
    }

    /// Disable all experiments when `false`. Enabled by default.
    pub fn enabled(&mut self, enabled: bool) -> &mut Self {
        self.options.enabled = enabled;
        self
    }

    /// In QA mode, users are never randomly assigned to experiments.
    pub fn qa_mode(&mut self, qa_mode: bool) -> &mut Self {
        self.options.qa_mode = qa_mode;
        self
    }

    /// Allow `?gb~feature=value` in the page URL to override feature values.
    pub fn allow_url_overrides(&mut self, allow_url_overrides: bool) -> &mut Self {
        self.options.allow_url_overrides = allow_url_overrides;
        self
    }

    /// Current page URL.
    pub fn url(&mut self, url: Url) -> &mut Self {
        self.url = Some(url);
        self
    }

    /// Initial user attributes.
    pub fn attributes(&mut self, attributes: Attributes) -> &mut Self {
        self.attributes = attributes;
        self
    }

    /// Force experiments to a variation index.
    pub fn forced_variations(&mut self, forced_variations: HashMap<String, usize>) -> &mut Self {
        self.options.forced_variations = forced_variations;
        self
    }

    /// Force features to a value.
    pub fn forced_feature_values(
        &mut self,
        forced_feature_values: HashMap<String, Value>,
    ) -> &mut Self {
        self.options.forced_feature_values = forced_feature_values;
        self
    }

    /// Create a new [`Client`] using the specified configuration.
    ///
    /// ```
    /// # use growthbook::{Client, ClientConfig};
    /// let client: Client = ClientConfig::new().to_client();
    /// ```
    pub fn to_client(self) -> Client {
        Client::new(self)
    }
}
