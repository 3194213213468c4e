//! The Rust SDK for GrowthBook, an open-source feature flagging and experimentation platform.
//!
//! # Overview
//!
//! Features are defined in a JSON payload: a default value plus an ordered list of rules. A rule
//! either forces a value (optionally to a percentage of users) or runs an experiment that
//! deterministically assigns the user to one of several variations by hashing a user attribute.
//! Rules are targeted with MongoDB-style [`Condition`]s and may depend on other features through
//! prerequisites.
//!
//! The SDK revolves around a [`Client`] that evaluates features for a single user. Services
//! evaluating features for many users should share an [`Evaluator`] and keep a [`UserContext`]
//! per user.
//!
//! A [`TrackingCallback`] should be provided to save experiment exposures to your storage,
//! facilitating analysis of which user saw which variation. A [`StickyBucketService`] keeps
//! users in their variation when an experiment changes.
//!
//! # Error Handling
//!
//! Errors are represented by the [`Error`] enum and are only returned for invalid inputs (malformed
//! payloads, URLs or mismatching value types).
//!
//! Evaluation itself never fails: problems found while evaluating are logged and reported through
//! [`FeatureResult`] sources such as [`FeatureResult::UnknownFeature`] or
//! [`FeatureResult::CyclicPrerequisite`].
//!
//! # Logging
//!
//! The package uses the [`log`](https://docs.rs/log/latest/log/) crate for logging
//! messages under the `growthbook` target. Consider integrating a `log`-compatible logger
//! implementation for better visibility into SDK operations.
//!
//! # Examples
//!
//! A runnable example can be found in the `demos` directory of the repository.

#![warn(rustdoc::missing_crate_level_docs)]
#![warn(missing_docs)]

mod bucketing;
mod client;
mod condition;
mod config;
mod configuration;
mod configuration_store;
mod error;
mod eval;
mod hashing;
mod models;
mod result;
mod sticky_bucket;
mod tracking;
mod url_override;
mod value;
mod version;

pub use bucketing::{
    choose_variation, get_bucket_ranges, get_equal_weights, in_namespace, in_range,
    is_filtered_out, is_included_in_rollout, BucketRange, Filter, Namespace,
};
pub use client::Client;
pub use condition::{eval_condition, Condition};
pub use config::ClientConfig;
pub use configuration::Configuration;
pub use configuration_store::ConfigurationStore;
pub use error::{Error, Result};
pub use eval::{eval_feature, run_experiment, EvalOptions, Evaluator, EvaluatorConfig, UserContext};
pub use hashing::hash;
pub use models::{
    Experiment, Feature, FeatureRule, Features, Force, ParentCondition, TrackData, TrackedResult,
    TryParse, VariationMeta,
};
pub use result::{ExperimentResult, FeatureResult, FeatureSource};
pub use sticky_bucket::{
    derive_sticky_bucket_identifier_attributes, generate_sticky_bucket_assignment_doc,
    get_hash_attribute, get_sticky_bucket_assignments, get_sticky_bucket_experiment_key,
    get_sticky_bucket_variation, GeneratedStickyBucketDocument, HashAttribute,
    InMemoryStickyBucketService, StickyAssignmentsDocument, StickyAssignmentsDocuments,
    StickyBucketExperiment, StickyBucketService, StickyBucketVariation,
};
pub use tracking::{ExperimentTracker, FeatureUsageCallback, TrackingCallback, TrackingKey};
pub use url_override::{get_forced_feature_value, get_query_string_override, FeatureValueType};
pub use value::{is_on, Attributes, SavedGroups};
pub use version::padded_version_string;
