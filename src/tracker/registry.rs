//! One tracker per group key.

use dashmap::DashMap;
use std::sync::Arc;

use crate::clock::{Clock, TokioClock};
use crate::config::{ServiceConfig, TrackerConfig};
use crate::error::{TrackerError, TrackerResult};
use crate::health::{CheckStats, SharedProbe};
use crate::persistence::SharedStore;
use crate::ranking::{MeanLatency, QualityScore};
use crate::tracker::tracker::{FallbackTracker, TrackerBuilder};

/// Creates trackers on first use and tears them down explicitly.
///
/// All trackers share the probe, scorer, store and clock given here.
pub struct TrackerRegistry<S> {
    trackers: DashMap<String, FallbackTracker<S>>,
    defaults: TrackerConfig,
    probe: SharedProbe<S>,
    scorer: Arc<dyn QualityScore<S>>,
    store: SharedStore,
    clock: Arc<dyn Clock>,
}

impl<S: CheckStats> TrackerRegistry<S> {
    pub fn new(probe: SharedProbe<S>, store: SharedStore) -> Self {
        Self {
            trackers: DashMap::new(),
            defaults: TrackerConfig::default(),
            probe,
            scorer: Arc::new(MeanLatency::default()),
            store,
            clock: Arc::new(TokioClock::new()),
        }
    }

    pub fn with_defaults(mut self, defaults: TrackerConfig) -> Self {
        self.defaults = defaults;
        self
    }

    pub fn with_scorer(mut self, scorer: Arc<dyn QualityScore<S>>) -> Self {
        self.scorer = scorer;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Create a tracker for every configured group.
    pub fn register_groups(&self, config: &ServiceConfig) {
        for group in &config.groups {
            self.get_or_create_with(&group.key, &group.endpoints, config.tracker_for(group));
        }
    }

    /// Tracker for `key`, created with the default tuning if absent.
    ///
    /// An existing tracker is returned as is; `endpoints` only apply on
    /// creation.
    pub fn get_or_create(&self, key: &str, endpoints: &[String]) -> FallbackTracker<S> {
        self.get_or_create_with(key, endpoints, self.defaults.clone())
    }

    pub fn get_or_create_with(&self, key: &str, endpoints: &[String], config: TrackerConfig) -> FallbackTracker<S> {
        self.trackers
            .entry(key.to_string())
            .or_insert_with(|| {
                tracing::info!(tracker = %key, endpoints = endpoints.len(), "Creating tracker");
                TrackerBuilder::new(key, endpoints.to_vec(), self.probe.clone())
                    .config(config)
                    .scorer(self.scorer.clone())
                    .store(self.store.clone())
                    .clock(self.clock.clone())
                    .build()
            })
            .clone()
    }

    pub fn get(&self, key: &str) -> Option<FallbackTracker<S>> {
        self.trackers.get(key).map(|t| t.clone())
    }

    pub fn try_get(&self, key: &str) -> TrackerResult<FallbackTracker<S>> {
        self.get(key).ok_or_else(|| TrackerError::UnknownTracker(key.to_string()))
    }

    /// Registered keys, sorted.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.trackers.iter().map(|e| e.key().clone()).collect();
        keys.sort();
        keys
    }

    /// All trackers, sorted by key.
    pub fn trackers(&self) -> Vec<FallbackTracker<S>> {
        let mut trackers: Vec<FallbackTracker<S>> = self.trackers.iter().map(|e| e.value().clone()).collect();
        trackers.sort_by(|a, b| a.tracker_key().cmp(b.tracker_key()));
        trackers
    }

    pub fn len(&self) -> usize {
        self.trackers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trackers.is_empty()
    }

    /// Stop and forget the tracker for `key`. A snapshot still held back
    /// by the throttle is persisted first.
    pub async fn disable(&self, key: &str) -> TrackerResult<()> {
        let (_, tracker) = self
            .trackers
            .remove(key)
            .ok_or_else(|| TrackerError::UnknownTracker(key.to_string()))?;
        tracker.shutdown().await;
        tracing::info!(tracker = %key, "Tracker disabled");
        Ok(())
    }

    /// Stop every tracker.
    pub async fn shutdown(&self) {
        let trackers = self.trackers();
        tracing::info!(count = trackers.len(), "Stopping trackers");
        for tracker in trackers {
            tracker.shutdown().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProbeError;
    use crate::health::probe_fn;
    use crate::persistence::MemoryStore;

    fn registry() -> TrackerRegistry<u64> {
        let probe: SharedProbe<u64> = Arc::new(probe_fn(|_e: String| async { Ok::<u64, ProbeError>(0) }));
        TrackerRegistry::new(probe, Arc::new(MemoryStore::new()))
    }

    #[tokio::test(start_paused = true)]
    async fn test_create_once_per_key() {
        let registry = registry();
        let endpoints = vec!["https://a.example".to_string()];
        let first = registry.get_or_create("eth", &endpoints);
        let second = registry.get_or_create("eth", &["https://other.example".to_string()]);

        assert_eq!(registry.len(), 1);
        assert_eq!(second.peek().primary, first.peek().primary);
        assert_eq!(second.peek().primary.as_deref(), Some("https://a.example"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_disable_removes() {
        let registry = registry();
        registry.get_or_create("eth", &["https://a.example".to_string()]);
        registry.get_or_create("arb", &["https://b.example".to_string()]);
        assert_eq!(registry.keys(), vec!["arb", "eth"]);

        registry.disable("eth").await.unwrap();
        assert!(registry.get("eth").is_none());
        assert!(matches!(
            registry.disable("eth").await,
            Err(TrackerError::UnknownTracker(_))
        ));
        assert!(registry.try_get("arb").is_ok());
    }
}
