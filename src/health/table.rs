//! In-memory endpoint state for one tracker group.
//!
//! # Responsibilities
//! - Hold exactly one `EndpointStats` per configured endpoint, in config order
//! - Seed from a persisted snapshot
//! - Apply check results through the failure ledger

use crate::error::{ProbeError, TrackerError};
use crate::health::ledger::{next_state, FailurePolicy, Transition};
use crate::health::state::{BanState, CheckResult, CurrentEndpoints, EndpointStats, Selection};

/// Endpoint stats for one group.
#[derive(Debug, Clone)]
pub struct EndpointTable<S> {
    tracker_key: String,
    entries: Vec<EndpointStats<S>>,
    history: usize,
}

impl<S: Clone> EndpointTable<S> {
    /// Fresh table: every endpoint active, no history. Duplicate endpoints
    /// are dropped, keeping the first occurrence.
    pub fn new(tracker_key: impl Into<String>, endpoints: &[String], history: usize) -> Self {
        let mut entries: Vec<EndpointStats<S>> = Vec::with_capacity(endpoints.len());
        for endpoint in endpoints {
            if entries.iter().any(|e| e.endpoint() == endpoint) {
                tracing::warn!(endpoint = %endpoint, "Ignoring duplicate endpoint");
                continue;
            }
            entries.push(EndpointStats::new(endpoint.clone()));
        }
        Self {
            tracker_key: tracker_key.into(),
            entries,
            history: history.max(1),
        }
    }

    /// Copy state for configured endpoints out of a persisted snapshot.
    ///
    /// Endpoints no longer configured are ignored; newly configured
    /// endpoints keep their fresh state. Seeded failures outside the
    /// policy window as of `now` are dropped. Returns how many were seeded.
    pub fn seed(&mut self, snapshot: &CurrentEndpoints<S>, policy: &FailurePolicy, now: u64) -> usize {
        let mut seeded = 0;
        for entry in &mut self.entries {
            if let Some(saved) = snapshot.stats_for(entry.endpoint()) {
                entry.state = saved.state.clone();
                entry.state.prune(now, policy.window_ms);
                entry.check_results = saved.check_results.clone();
                entry.check_results.truncate(self.history);
                seeded += 1;
            }
        }
        seeded
    }

    pub fn tracker_key(&self) -> &str {
        &self.tracker_key
    }

    pub fn endpoints(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.endpoint())
    }

    pub fn entries(&self) -> &[EndpointStats<S>] {
        &self.entries
    }

    pub fn get(&self, endpoint: &str) -> Option<&EndpointStats<S>> {
        self.entries.iter().find(|e| e.endpoint() == endpoint)
    }

    pub fn contains(&self, endpoint: &str) -> bool {
        self.get(endpoint).is_some()
    }

    fn entry_mut(&mut self, endpoint: &str) -> Result<&mut EndpointStats<S>, TrackerError> {
        let tracker_key = &self.tracker_key;
        self.entries
            .iter_mut()
            .find(|e| e.endpoint() == endpoint)
            .ok_or_else(|| TrackerError::UnknownEndpoint {
                tracker_key: tracker_key.clone(),
                endpoint: endpoint.to_string(),
            })
    }

    /// Apply a check result: ledger transition plus history.
    pub fn record(
        &mut self,
        result: CheckResult<S>,
        policy: &FailurePolicy,
        now: u64,
    ) -> Result<Transition, TrackerError> {
        let history = self.history;
        let entry = self.entry_mut(&result.endpoint)?;

        let update = next_state(&entry.state, &result, policy, now);
        entry.state = update.state;
        entry.push_result(result, history);
        Ok(update.transition)
    }

    /// Record a failure observed outside the probe loop.
    pub fn record_failure(
        &mut self,
        endpoint: &str,
        error: ProbeError,
        policy: &FailurePolicy,
        now: u64,
    ) -> Result<Transition, TrackerError> {
        self.record(CheckResult::failure(endpoint, error, now, 0), policy, now)
    }

    /// Ban an endpoint immediately. Returns false if it was already banned.
    pub fn ban(&mut self, endpoint: &str, reason: &str, now: u64) -> Result<bool, TrackerError> {
        let entry = self.entry_mut(endpoint)?;
        if entry.is_banned() {
            return Ok(false);
        }
        entry.state.ban = BanState::Banned {
            timestamp: now,
            reason: reason.to_string(),
        };
        Ok(true)
    }

    pub fn eligible_count(&self) -> usize {
        self.entries.iter().filter(|e| !e.is_banned()).count()
    }

    /// Build an immutable snapshot of the table.
    pub fn snapshot(
        &self,
        selection: Option<Selection>,
        last_available: Option<Selection>,
        now: u64,
    ) -> CurrentEndpoints<S> {
        let (primary, fallbacks) = match selection {
            Some(sel) => (Some(sel.primary), sel.fallbacks),
            None => (None, Vec::new()),
        };
        CurrentEndpoints {
            primary,
            fallbacks,
            tracker_key: self.tracker_key.clone(),
            endpoint_stats: self.entries.clone(),
            last_available,
            updated_at: now,
        }
    }
}
