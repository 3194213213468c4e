use std::{collections::VecDeque, sync::Mutex};

use crate::{Experiment, ExperimentResult, FeatureResult};

/// Receives experiment exposures. Use it to save assignments to your data warehouse.
///
/// Called synchronously during evaluation, at most once per distinct
/// `(hash attribute, hash value, experiment, variation)` among the recently tracked ones.
pub trait TrackingCallback {
    /// Called when a user is put into an experiment.
    fn on_track(&self, experiment: &Experiment, result: &ExperimentResult);
}

pub(crate) struct NoopTrackingCallback;
impl TrackingCallback for NoopTrackingCallback {
    fn on_track(&self, _experiment: &Experiment, _result: &ExperimentResult) {}
}

impl<T: Fn(&Experiment, &ExperimentResult)> TrackingCallback for T {
    fn on_track(&self, experiment: &Experiment, result: &ExperimentResult) {
        self(experiment, result);
    }
}

/// Receives every feature evaluation.
pub trait FeatureUsageCallback {
    /// Called with the feature key and the result of its evaluation.
    fn on_feature_usage(&self, feature_key: &str, result: &FeatureResult);
}

pub(crate) struct NoopFeatureUsageCallback;
impl FeatureUsageCallback for NoopFeatureUsageCallback {
    fn on_feature_usage(&self, _feature_key: &str, _result: &FeatureResult) {}
}

impl<T: Fn(&str, &FeatureResult)> FeatureUsageCallback for T {
    fn on_feature_usage(&self, feature_key: &str, result: &FeatureResult) {
        self(feature_key, result);
    }
}

/// Identifies an exposure: who was exposed to which variation of which experiment.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TrackingKey {
    /// Attribute used to hash the user.
    pub hash_attribute: String,
    /// Value of the hash attribute.
    pub hash_value: String,
    /// Experiment key.
    pub experiment_key: String,
    /// Assigned variation.
    pub variation_id: usize,
}

/// Remembers the most recently tracked exposures so the same exposure is not reported twice.
#[derive(Debug)]
pub struct ExperimentTracker {
    capacity: usize,
    tracked: Mutex<VecDeque<TrackingKey>>,
}

impl Default for ExperimentTracker {
    fn default() -> Self {
        ExperimentTracker::new(ExperimentTracker::DEFAULT_CAPACITY)
    }
}

impl ExperimentTracker {
    /// Number of exposures remembered by default.
    pub const DEFAULT_CAPACITY: usize = 30;

    /// Create a tracker remembering up to `capacity` exposures.
    pub fn new(capacity: usize) -> ExperimentTracker {
        ExperimentTracker {
            capacity,
            tracked: Mutex::new(VecDeque::with_capacity(capacity)),
        }
    }

    /// Deduplication key of an exposure.
    pub fn tracking_key(experiment: &Experiment, result: &ExperimentResult) -> TrackingKey {
        TrackingKey {
            hash_attribute: result.hash_attribute.clone(),
            hash_value: result.hash_value.clone(),
            experiment_key: experiment.key.clone(),
            variation_id: result.variation_id,
        }
    }

    /// Record an exposure. Returns `false` if it was already recorded.
    pub fn track(&self, key: TrackingKey) -> bool {
        // lock() only fails if another thread panicked while holding it. Reporting a duplicate
        // exposure is better than dropping one.
        let Ok(mut tracked) = self.tracked.lock() else {
            return true;
        };

        if tracked.contains(&key) {
            return false;
        }
        if self.capacity == 0 {
            return true;
        }
        if tracked.len() >= self.capacity {
            tracked.pop_front();
        }
        tracked.push_back(key);
        true
    }

    /// Forget all recorded exposures.
    pub fn clear(&self) {
        if let Ok(mut tracked) = self.tracked.lock() {
            tracked.clear();
        }
    }
}
