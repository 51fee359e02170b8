//! Fallback tracker for one endpoint group.
//!
//! # Responsibilities
//! - Own the endpoint table and the Idle/Tracking state machine
//! - Run probe cycles on a fixed cadence while consumers keep asking
//! - Publish ranked snapshots through the throttle, then persist them
//! - Seed itself from a fresh persisted snapshot on construction

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use futures_util::future::join_all;
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};

use crate::clock::{Clock, TokioClock};
use crate::config::TrackerConfig;
use crate::error::{ProbeError, TrackerResult};
use crate::health::{
    run_probe, CheckResult, CheckStats, CurrentEndpoints, EndpointTable, FailurePolicy, Selection,
    SharedProbe, Transition,
};
use crate::lifecycle::{Shutdown, ShutdownSignal};
use crate::observability::metrics;
use crate::persistence::{MemoryStore, SharedStore, SnapshotStore, StoredSnapshot};
use crate::ranking::{MeanLatency, QualityScore, RankingPolicy};
use crate::tracker::throttle::Throttle;

/// Whether a tracker is currently probing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackingStatus {
    Idle,
    Tracking,
}

/// Handle to one group's tracker. Cheap to clone.
pub struct FallbackTracker<S> {
    inner: Arc<Inner<S>>,
}

impl<S> Clone for FallbackTracker<S> {
    fn clone(&self) -> Self {
        Self { inner: Arc::clone(&self.inner) }
    }
}

/// Builder for [`FallbackTracker`].
pub struct TrackerBuilder<S> {
    key: String,
    endpoints: Vec<String>,
    config: TrackerConfig,
    probe: SharedProbe<S>,
    scorer: Arc<dyn QualityScore<S>>,
    store: SharedStore,
    clock: Arc<dyn Clock>,
}

impl<S: CheckStats> TrackerBuilder<S> {
    /// Defaults: default tuning, mean-latency scoring, in-memory store and a
    /// clock driven by tokio time.
    pub fn new(key: impl Into<String>, endpoints: Vec<String>, probe: SharedProbe<S>) -> Self {
        Self {
            key: key.into(),
            endpoints,
            config: TrackerConfig::default(),
            probe,
            scorer: Arc::new(MeanLatency::default()),
            store: Arc::new(MemoryStore::new()),
            clock: Arc::new(TokioClock::new()),
        }
    }

    pub fn config(mut self, config: TrackerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn scorer(mut self, scorer: Arc<dyn QualityScore<S>>) -> Self {
        self.scorer = scorer;
        self
    }

    pub fn store(mut self, store: SharedStore) -> Self {
        self.store = store;
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Build the tracker, seeding it from the store when a fresh snapshot
    /// exists. The tracker starts Idle.
    pub fn build(self) -> FallbackTracker<S> {
        let now = self.clock.now_ms();
        let policy = FailurePolicy::from(self.config.failures_before_ban);
        let ranking = RankingPolicy::new(self.scorer, self.config.primary_tolerance);

        let mut table = EndpointTable::new(&self.key, &self.endpoints, self.config.check_history);
        let mut primary = None;
        let mut last_available = None;

        if let Some(cached) = load_snapshot::<S>(&*self.store, &self.key, now, self.config.cache_timeout_ms) {
            let seeded = table.seed(&cached, &policy, now);
            primary = cached.primary.filter(|p| table.contains(p));
            last_available = cached.last_available;
            tracing::info!(
                tracker = %self.key,
                seeded,
                age_ms = now.saturating_sub(cached.updated_at),
                "Seeded tracker from cached snapshot"
            );
        }

        let mut health = HealthState { table, primary, last_available };
        let initial = Arc::new(rerank(&self.key, &ranking, &mut health, now));

        let (tx, _) = watch::channel(initial);
        let published = Arc::new(tx);
        let publisher = Arc::new(Publisher {
            key: self.key.clone(),
            tx: published.clone(),
            store: self.store.clone(),
            clock: self.clock.clone(),
        });
        let sink = publisher.clone();
        let throttle = Throttle::new(self.config.set_endpoints_throttle(), move |snapshot| {
            sink.publish(snapshot)
        });

        FallbackTracker {
            inner: Arc::new(Inner {
                key: self.key,
                config: self.config,
                policy,
                ranking,
                probe: self.probe,
                clock: self.clock,
                health: Mutex::new(health),
                published,
                publisher,
                throttle,
                cycle_guard: tokio::sync::Mutex::new(()),
                last_access: Mutex::new(Instant::now()),
                control: Mutex::new(Control::Idle),
                generation: AtomicU64::new(0),
                cycles: AtomicU64::new(0),
            }),
        }
    }
}

struct Inner<S> {
    key: String,
    config: TrackerConfig,
    policy: FailurePolicy,
    ranking: RankingPolicy<S>,
    probe: SharedProbe<S>,
    clock: Arc<dyn Clock>,
    health: Mutex<HealthState<S>>,
    published: Arc<watch::Sender<Arc<CurrentEndpoints<S>>>>,
    publisher: Arc<Publisher<S>>,
    throttle: Throttle<Arc<CurrentEndpoints<S>>>,
    /// Held for a whole cycle so a restarted loop never overlaps one still
    /// finishing from a stopped loop.
    cycle_guard: tokio::sync::Mutex<()>,
    last_access: Mutex<Instant>,
    control: Mutex<Control>,
    generation: AtomicU64,
    cycles: AtomicU64,
}

struct HealthState<S> {
    table: EndpointTable<S>,
    primary: Option<String>,
    last_available: Option<Selection>,
}

enum Control {
    Idle,
    Tracking {
        generation: u64,
        stop: Shutdown,
        handle: JoinHandle<()>,
    },
}

/// Throttle sink: publish first, then persist.
struct Publisher<S> {
    key: String,
    tx: Arc<watch::Sender<Arc<CurrentEndpoints<S>>>>,
    store: SharedStore,
    clock: Arc<dyn Clock>,
}

impl<S: CheckStats> Publisher<S> {
    fn publish(&self, snapshot: Arc<CurrentEndpoints<S>>) {
        self.tx.send_replace(snapshot.clone());
        metrics::record_publish(&self.key);
        tracing::debug!(
            tracker = %self.key,
            primary = ?snapshot.primary,
            fallbacks = snapshot.fallbacks.len(),
            "Published endpoints"
        );
        self.persist(&snapshot);
    }

    fn persist(&self, snapshot: &CurrentEndpoints<S>) {
        let payload = match serde_json::to_value(snapshot) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::warn!(tracker = %self.key, error = %e, "Failed to encode snapshot");
                metrics::record_persistence_error(&self.key, "encode");
                return;
            }
        };
        let stored = StoredSnapshot {
            written_at: self.clock.now_ms(),
            payload,
        };
        if let Err(e) = self.store.set(&self.key, stored) {
            tracing::warn!(tracker = %self.key, error = %e, "Failed to persist snapshot");
            metrics::record_persistence_error(&self.key, "write");
        }
    }
}

/// Read the cached snapshot for `key`. Misses, stale entries and read
/// errors all come back as `None`.
fn load_snapshot<S: CheckStats>(
    store: &dyn SnapshotStore,
    key: &str,
    now: u64,
    cache_timeout_ms: u64,
) -> Option<CurrentEndpoints<S>> {
    let stored = match store.get(key) {
        Ok(Some(stored)) => stored,
        Ok(None) => {
            tracing::debug!(tracker = %key, "No cached snapshot");
            return None;
        }
        Err(e) => {
            tracing::warn!(tracker = %key, error = %e, "Failed to read cached snapshot");
            metrics::record_persistence_error(key, "read");
            return None;
        }
    };

    if stored.is_stale(now, cache_timeout_ms) {
        tracing::info!(
            tracker = %key,
            age_ms = now.saturating_sub(stored.written_at),
            cache_timeout_ms,
            "Discarding stale cached snapshot"
        );
        if let Err(e) = store.remove(key) {
            tracing::warn!(tracker = %key, error = %e, "Failed to remove stale snapshot");
            metrics::record_persistence_error(key, "remove");
        }
        return None;
    }

    match serde_json::from_value::<CurrentEndpoints<S>>(stored.payload) {
        Ok(snapshot) if snapshot.tracker_key == key => Some(snapshot),
        Ok(snapshot) => {
            tracing::warn!(tracker = %key, found = %snapshot.tracker_key, "Cached snapshot belongs to another tracker");
            None
        }
        Err(e) => {
            tracing::warn!(tracker = %key, error = %e, "Failed to decode cached snapshot");
            metrics::record_persistence_error(key, "read");
            None
        }
    }
}

/// Rank the table and build a snapshot, updating primary and
/// `last_available`.
fn rerank<S: CheckStats>(
    key: &str,
    ranking: &RankingPolicy<S>,
    health: &mut HealthState<S>,
    now: u64,
) -> CurrentEndpoints<S> {
    let selection = ranking.rank(health.table.entries(), health.primary.as_deref());
    let primary = selection.as_ref().map(|s| s.primary.clone());

    if primary != health.primary {
        match &primary {
            Some(p) => tracing::info!(
                tracker = %key,
                primary = %p,
                previous = ?health.primary,
                "Primary endpoint changed"
            ),
            None => tracing::error!(tracker = %key, "All endpoints banned, no primary available"),
        }
    }

    health.primary = primary;
    if let Some(selection) = &selection {
        health.last_available = Some(selection.clone());
    }
    metrics::record_eligible(key, health.table.eligible_count());
    health.table.snapshot(selection, health.last_available.clone(), now)
}

impl<S: CheckStats> Inner<S> {
    fn lock_health(&self) -> MutexGuard<'_, HealthState<S>> {
        self.health.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_control(&self) -> MutexGuard<'_, Control> {
        self.control.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn last_access(&self) -> Instant {
        *self.last_access.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn touch(&self) {
        *self.last_access.lock().unwrap_or_else(|e| e.into_inner()) = Instant::now();
    }

    fn idle_deadline(&self) -> Instant {
        self.last_access() + self.config.disable_unused_tracking_timeout()
    }

    /// Apply one result under the health lock, logging transitions.
    fn apply(&self, health: &mut HealthState<S>, result: CheckResult<S>, now: u64) -> TrackerResult<Transition> {
        let endpoint = result.endpoint.clone();
        let error = result.error.clone();
        let transition = health.table.record(result, &self.policy, now)?;

        match &transition {
            Transition::Banned { reason } => {
                tracing::warn!(tracker = %self.key, endpoint = %endpoint, reason = %reason, "Endpoint banned");
                metrics::record_ban_transition(&self.key, &endpoint, true);
            }
            Transition::Unbanned => {
                tracing::info!(tracker = %self.key, endpoint = %endpoint, "Endpoint recovered, ban lifted");
                metrics::record_ban_transition(&self.key, &endpoint, false);
            }
            Transition::FailureCounted { failures } => {
                tracing::debug!(
                    tracker = %self.key,
                    endpoint = %endpoint,
                    failures,
                    error = ?error,
                    "Endpoint check failed"
                );
            }
            Transition::FailureCoalesced | Transition::Unchanged => {}
        }
        Ok(transition)
    }

    /// Probe every endpoint once and apply the results atomically. Banned
    /// endpoints are skipped on cycles `banned_check_every` says to skip.
    async fn run_cycle(&self) {
        let _cycle = self.cycle_guard.lock().await;
        let cycle = self.cycles.fetch_add(1, Ordering::Relaxed);
        let check_banned = cycle % u64::from(self.config.banned_check_every.max(1)) == 0;
        let endpoints: Vec<String> = {
            let health = self.lock_health();
            let endpoints = health
                .table
                .entries()
                .iter()
                .filter(|e| check_banned || !e.is_banned())
                .map(|e| e.endpoint().to_string())
                .collect();
            endpoints
        };

        let timeout = self.config.check_timeout();
        let results = join_all(
            endpoints
                .iter()
                .map(|endpoint| run_probe(&*self.probe, endpoint, timeout, &*self.clock)),
        )
        .await;

        let snapshot = {
            let mut health = self.lock_health();
            for result in results {
                metrics::record_probe(&self.key, &result.endpoint, result.success, result.duration_ms);
                let checked_at = result.checked_at;
                if let Err(e) = self.apply(&mut health, result, checked_at) {
                    tracing::warn!(tracker = %self.key, error = %e, "Dropping check result");
                }
            }
            let now = self.clock.now_ms();
            Arc::new(rerank(&self.key, &self.ranking, &mut health, now))
        };
        self.throttle.offer(snapshot);
    }

    /// Leave Tracking if nobody asked for the endpoints within the idle
    /// timeout. Returns true when the loop for `generation` should exit.
    fn try_go_idle(&self, generation: u64) -> bool {
        let mut control = self.lock_control();
        match &*control {
            Control::Tracking { generation: current, .. } if *current == generation => {}
            _ => return true,
        }

        let idle_for = self.last_access().elapsed();
        if idle_for < self.config.disable_unused_tracking_timeout() {
            return false;
        }

        *control = Control::Idle;
        tracing::info!(
            tracker = %self.key,
            idle_ms = idle_for.as_millis() as u64,
            "No consumers, tracking paused"
        );
        metrics::record_tracking(&self.key, false);
        true
    }
}

async fn tracking_loop<S: CheckStats>(inner: Arc<Inner<S>>, generation: u64, mut stop: ShutdownSignal) {
    let mut next_cycle = Instant::now() + inner.config.delay();

    loop {
        let idle_at = inner.idle_deadline();
        tokio::select! {
            biased;

            _ = stop.wait() => break,
            _ = time::sleep_until(idle_at) => {
                if inner.try_go_idle(generation) {
                    return;
                }
            }
            _ = time::sleep_until(next_cycle) => {
                if inner.try_go_idle(generation) {
                    return;
                }
                inner.run_cycle().await;
                next_cycle = (next_cycle + inner.config.track_interval()).max(Instant::now());
            }
        }
    }

    tracing::debug!(tracker = %inner.key, "Tracking loop stopped");
}

impl<S: CheckStats> FallbackTracker<S> {
    pub fn builder(key: impl Into<String>, endpoints: Vec<String>, probe: SharedProbe<S>) -> TrackerBuilder<S> {
        TrackerBuilder::new(key, endpoints, probe)
    }

    pub fn tracker_key(&self) -> &str {
        &self.inner.key
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.inner.config
    }

    /// Consumer access: the latest published snapshot.
    ///
    /// Counts as use, so it starts tracking when Idle and postpones the idle
    /// timeout. Must be called within a tokio runtime.
    pub fn current_endpoints(&self) -> Arc<CurrentEndpoints<S>> {
        self.inner.touch();
        self.ensure_tracking();
        self.peek()
    }

    /// The latest published snapshot, without counting as use.
    pub fn peek(&self) -> Arc<CurrentEndpoints<S>> {
        self.inner.published.borrow().clone()
    }

    /// Receive every published snapshot.
    pub fn subscribe(&self) -> watch::Receiver<Arc<CurrentEndpoints<S>>> {
        self.inner.published.subscribe()
    }

    pub fn status(&self) -> TrackingStatus {
        match &*self.inner.lock_control() {
            Control::Tracking { handle, .. } if !handle.is_finished() => TrackingStatus::Tracking,
            _ => TrackingStatus::Idle,
        }
    }

    fn ensure_tracking(&self) {
        let mut control = self.inner.lock_control();
        if let Control::Tracking { handle, .. } = &*control {
            if !handle.is_finished() {
                return;
            }
            tracing::warn!(tracker = %self.inner.key, "Tracking loop exited unexpectedly, restarting");
        }

        let generation = self.inner.generation.fetch_add(1, Ordering::Relaxed) + 1;
        let stop = Shutdown::new();
        let handle = tokio::spawn(tracking_loop(Arc::clone(&self.inner), generation, stop.subscribe()));
        *control = Control::Tracking { generation, stop, handle };

        tracing::info!(
            tracker = %self.inner.key,
            endpoints = self.inner.lock_health().table.entries().len(),
            "Tracking started"
        );
        metrics::record_tracking(&self.inner.key, true);
    }

    /// Report a failure seen outside the probe loop (for example by request
    /// routing). Goes through the same ledger and publish path as probes.
    pub fn report_failure(&self, endpoint: &str, error: ProbeError) -> TrackerResult<Transition> {
        let (transition, snapshot) = {
            let mut health = self.inner.lock_health();
            let now = self.inner.clock.now_ms();
            let result = CheckResult::failure(endpoint, error, now, 0);
            let transition = self.inner.apply(&mut health, result, now)?;
            let snapshot = Arc::new(rerank(&self.inner.key, &self.inner.ranking, &mut health, now));
            (transition, snapshot)
        };
        self.inner.throttle.offer(snapshot);
        Ok(transition)
    }

    /// Ban an endpoint until a probe succeeds against it again. Returns
    /// false if it was already banned.
    pub fn ban(&self, endpoint: &str, reason: &str) -> TrackerResult<bool> {
        let snapshot = {
            let mut health = self.inner.lock_health();
            let now = self.inner.clock.now_ms();
            if !health.table.ban(endpoint, reason, now)? {
                return Ok(false);
            }
            tracing::warn!(tracker = %self.inner.key, endpoint = %endpoint, reason = %reason, "Endpoint banned manually");
            metrics::record_ban_transition(&self.inner.key, endpoint, true);
            Arc::new(rerank(&self.inner.key, &self.inner.ranking, &mut health, now))
        };
        self.inner.throttle.offer(snapshot);
        Ok(true)
    }

    /// Stop tracking without waiting for an in-flight cycle. A loop started
    /// afterwards waits for that cycle before running its own.
    pub fn stop(&self) {
        self.stop_loop();
    }

    fn stop_loop(&self) -> Option<JoinHandle<()>> {
        let mut control = self.inner.lock_control();
        match std::mem::replace(&mut *control, Control::Idle) {
            Control::Tracking { stop, handle, .. } => {
                stop.trigger();
                tracing::info!(tracker = %self.inner.key, "Tracking stopped");
                metrics::record_tracking(&self.inner.key, false);
                Some(handle)
            }
            Control::Idle => None,
        }
    }

    /// Stop tracking and wait for the loop to finish. A snapshot still
    /// held back by the throttle is persisted but not published, so
    /// subscribers never see two publishes inside one throttle window.
    pub async fn shutdown(&self) {
        if let Some(handle) = self.stop_loop() {
            if let Err(e) = handle.await {
                tracing::warn!(tracker = %self.inner.key, error = %e, "Tracking loop failed");
            }
        }
        if let Some(pending) = self.inner.throttle.take_pending() {
            tracing::debug!(tracker = %self.inner.key, "Persisting held-back snapshot");
            self.inner.publisher.persist(&pending);
        }
    }
}

impl<S> std::fmt::Debug for FallbackTracker<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FallbackTracker")
            .field("key", &self.inner.key)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::health::probe_fn;
    use std::time::Duration;

    fn endpoints() -> Vec<String> {
        vec!["https://a.example".to_string(), "https://b.example".to_string()]
    }

    fn healthy_probe() -> SharedProbe<u64> {
        Arc::new(probe_fn(|_endpoint: String| async { Ok::<u64, ProbeError>(1) }))
    }

    #[tokio::test(start_paused = true)]
    async fn test_initial_snapshot_uses_config_order() {
        let tracker = FallbackTracker::builder("arb", endpoints(), healthy_probe()).build();
        let snapshot = tracker.peek();
        assert_eq!(snapshot.primary.as_deref(), Some("https://a.example"));
        assert_eq!(snapshot.fallbacks, vec!["https://b.example"]);
        assert_eq!(tracker.status(), TrackingStatus::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_current_endpoints_starts_tracking() {
        let tracker = FallbackTracker::builder("arb", endpoints(), healthy_probe()).build();
        tracker.current_endpoints();
        assert_eq!(tracker.status(), TrackingStatus::Tracking);

        tracker.shutdown().await;
        assert_eq!(tracker.status(), TrackingStatus::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_manual_ban_moves_primary() {
        let tracker = FallbackTracker::builder("arb", endpoints(), healthy_probe()).build();
        assert!(tracker.ban("https://a.example", "maintenance").unwrap());
        assert!(!tracker.ban("https://a.example", "maintenance").unwrap());

        let snapshot = tracker.peek();
        assert_eq!(snapshot.primary.as_deref(), Some("https://b.example"));
        assert!(snapshot.fallbacks.is_empty());
        assert!(tracker.ban("https://zzz.example", "x").is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_seed_from_fresh_snapshot() {
        let store: SharedStore = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(1_000_000));

        let first = FallbackTracker::builder("arb", endpoints(), healthy_probe())
            .store(store.clone())
            .clock(clock.clone())
            .build();
        first.ban("https://a.example", "manual").unwrap();
        assert!(store.get("arb").unwrap().is_some());

        clock.advance(1_000);
        let second = FallbackTracker::builder("arb", endpoints(), healthy_probe())
            .store(store)
            .clock(clock)
            .build();
        let snapshot = second.peek();
        assert!(snapshot.stats_for("https://a.example").unwrap().is_banned());
        assert_eq!(snapshot.primary.as_deref(), Some("https://b.example"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_snapshot_is_removed() {
        let store: SharedStore = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(1_000_000));
        let config = TrackerConfig {
            cache_timeout_ms: 10_000,
            ..TrackerConfig::default()
        };

        let first = FallbackTracker::builder("arb", endpoints(), healthy_probe())
            .config(config.clone())
            .store(store.clone())
            .clock(clock.clone())
            .build();
        first.ban("https://a.example", "manual").unwrap();

        clock.advance(10_001);
        let second = FallbackTracker::builder("arb", endpoints(), healthy_probe())
            .config(config)
            .store(store.clone())
            .clock(clock)
            .build();
        assert!(!second.peek().stats_for("https://a.example").unwrap().is_banned());
        assert!(store.get("arb").unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_subscribe_sees_publish() {
        let config = TrackerConfig {
            set_endpoints_throttle_ms: 0,
            ..TrackerConfig::default()
        };
        let tracker = FallbackTracker::builder("arb", endpoints(), healthy_probe())
            .config(config)
            .build();
        let mut rx = tracker.subscribe();

        tracker.current_endpoints();
        tokio::time::timeout(Duration::from_secs(1), rx.changed())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(rx.borrow().endpoint_stats[0].check_results.len(), 1);
        tracker.shutdown().await;
    }
}
