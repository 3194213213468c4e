//! A thread-safe in-memory storage for currently active configuration. [`ConfigurationStore`]
//! provides concurrent access for readers (e.g., feature evaluation) and writers (e.g., updates
//! from a feature payload).
use std::sync::{Arc, RwLock};

use crate::Configuration;

/// `ConfigurationStore` provides a thread-safe (`Sync`) storage for configuration that allows
/// concurrent access for readers and writers.
///
/// `Configuration` itself is always immutable and can only be replaced completely. Readers hold an
/// `Arc` snapshot, so an evaluation in flight is not affected by a concurrent update.
#[derive(Debug, Default)]
pub struct ConfigurationStore {
    configuration: RwLock<Option<Arc<Configuration>>>,
}

impl ConfigurationStore {
    /// Create a new empty configuration store.
    pub fn new() -> Self {
        ConfigurationStore::default()
    }

    /// Get currently-active configuration. Returns None if configuration hasn't been set yet.
    pub fn get_configuration(&self) -> Option<Arc<Configuration>> {
        // self.configuration.read() should always return Ok(). Err() is possible only if the lock
        // is poisoned (writer panicked while holding the lock), which should never happen. Still,
        // using .ok()? here to not crash the app.
        let configuration = self.configuration.read().ok()?;
        configuration.clone()
    }

    /// Set new configuration, returning the previous one.
    pub fn set_configuration(&self, config: Arc<Configuration>) -> Option<Arc<Configuration>> {
        let mut configuration_slot = self.configuration.write().ok()?;
        std::mem::replace(&mut *configuration_slot, Some(config))
    }

    /// Replace configuration with `f(current)`. The current configuration is empty if none was
    /// set yet.
    pub fn update_configuration(&self, f: impl FnOnce(&Configuration) -> Configuration) {
        let Ok(mut configuration_slot) = self.configuration.write() else {
            log::warn!(target: "growthbook", "configuration lock is poisoned, update dropped");
            return;
        };
        let updated = match configuration_slot.as_deref() {
            Some(current) => f(current),
            None => f(&Configuration::default()),
        };
        *configuration_slot = Some(Arc::new(updated));
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::ConfigurationStore;
    use crate::Configuration;

    #[test]
    fn can_set_configuration_from_another_thread() {
        let store = Arc::new(ConfigurationStore::new());

        {
            let store = store.clone();
            let _ = std::thread::spawn(move || {
                store.set_configuration(Arc::new(Configuration::default()));
            })
            .join();
        }

        assert!(store.get_configuration().is_some());
    }

    #[test]
    fn snapshot_is_not_affected_by_updates() {
        let store = ConfigurationStore::new();
        store.set_configuration(Arc::new(
            Configuration::from_json(r#"{"a": {"defaultValue": 1}}"#, None).unwrap(),
        ));

        let snapshot = store.get_configuration().unwrap();
        store.update_configuration(|current| {
            current.with_features(serde_json::from_str(r#"{"b": {}}"#).unwrap())
        });

        assert!(snapshot.features.contains_key("a"));
        let current = store.get_configuration().unwrap();
        assert!(current.features.contains_key("b"));
        assert!(!current.features.contains_key("a"));
    }
}
