//! Endpoint health state.
//!
//! # States
//! - Active: endpoint is eligible for selection
//! - Banned: endpoint excluded from selection (but still probed)
//!
//! # State Transitions
//! ```text
//! Active → Banned: failures within window >= failures_before_ban.count
//! Banned → Active: first successful probe after the ban
//! ```
//!
//! # Design Decisions
//! - Ban is a tagged variant, so a ban always carries its timestamp and reason
//! - Failure history survives successes; only an unban clears it
//! - Check results are kept most-recent-first with a fixed bound

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use crate::error::{ProbeError, TrackerError};

/// Bounds required of caller-defined check statistics.
pub trait CheckStats:
    Clone + std::fmt::Debug + Send + Sync + Serialize + DeserializeOwned + 'static
{
}

impl<T> CheckStats for T where
    T: Clone + std::fmt::Debug + Send + Sync + Serialize + DeserializeOwned + 'static
{
}

/// Ban state of an endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BanState {
    #[default]
    Active,
    Banned {
        /// When the ban started (epoch ms).
        timestamp: u64,
        reason: String,
    },
}

impl BanState {
    pub fn is_banned(&self) -> bool {
        matches!(self, BanState::Banned { .. })
    }
}

/// Identity and health summary for one endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointState {
    pub endpoint: String,
    pub ban: BanState,
    /// Counted failure times (epoch ms), oldest first.
    pub failure_timestamps: Vec<u64>,
    /// Failures before this time are coalesced into the last counted one.
    pub failure_throttle_until: Option<u64>,
}

impl EndpointState {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            ban: BanState::Active,
            failure_timestamps: Vec::new(),
            failure_throttle_until: None,
        }
    }

    pub fn is_banned(&self) -> bool {
        self.ban.is_banned()
    }

    /// Drop failures older than `window_ms` relative to `now`.
    pub fn prune(&mut self, now: u64, window_ms: u64) {
        self.failure_timestamps
            .retain(|&ts| now.saturating_sub(ts) <= window_ms);
    }
}

/// Outcome of one probe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckResult<S> {
    pub endpoint: String,
    pub success: bool,
    pub error: Option<ProbeError>,
    pub stats: Option<S>,
    /// When the probe finished (epoch ms).
    pub checked_at: u64,
    /// Probe wall time.
    pub duration_ms: u64,
}

impl<S> CheckResult<S> {
    pub fn success(endpoint: impl Into<String>, stats: S, checked_at: u64, duration_ms: u64) -> Self {
        Self {
            endpoint: endpoint.into(),
            success: true,
            error: None,
            stats: Some(stats),
            checked_at,
            duration_ms,
        }
    }

    pub fn failure(endpoint: impl Into<String>, error: ProbeError, checked_at: u64, duration_ms: u64) -> Self {
        Self {
            endpoint: endpoint.into(),
            success: false,
            error: Some(error),
            stats: None,
            checked_at,
            duration_ms,
        }
    }
}

/// Endpoint state plus its recent check history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndpointStats<S> {
    #[serde(flatten)]
    pub state: EndpointState,
    /// Most recent first.
    pub check_results: VecDeque<CheckResult<S>>,
}

impl<S> EndpointStats<S> {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            state: EndpointState::new(endpoint),
            check_results: VecDeque::new(),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.state.endpoint
    }

    pub fn is_banned(&self) -> bool {
        self.state.is_banned()
    }

    /// Number of counted failures currently in the window.
    pub fn recent_failures(&self) -> usize {
        self.state.failure_timestamps.len()
    }

    /// Record a check result, keeping at most `limit` entries.
    pub fn push_result(&mut self, result: CheckResult<S>, limit: usize) {
        self.check_results.push_front(result);
        self.check_results.truncate(limit);
    }

    pub fn last_result(&self) -> Option<&CheckResult<S>> {
        self.check_results.front()
    }
}

/// A primary endpoint with its ordered fallbacks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selection {
    pub primary: String,
    pub fallbacks: Vec<String>,
}

/// Published view of one tracker group.
///
/// `primary`/`fallbacks` are strict: they only ever name non-banned
/// endpoints and are empty during a full outage. `last_available` keeps the
/// last non-empty selection for readers that prefer a best-effort answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrentEndpoints<S> {
    pub primary: Option<String>,
    pub fallbacks: Vec<String>,
    pub tracker_key: String,
    /// Per-endpoint detail, in configuration order.
    pub endpoint_stats: Vec<EndpointStats<S>>,
    pub last_available: Option<Selection>,
    /// When this snapshot was built (epoch ms).
    pub updated_at: u64,
}

impl<S> CurrentEndpoints<S> {
    /// Strict primary, or `NoEligibleEndpoint` during an outage.
    pub fn require_primary(&self) -> Result<&str, TrackerError> {
        self.primary
            .as_deref()
            .ok_or_else(|| TrackerError::NoEligibleEndpoint {
                tracker_key: self.tracker_key.clone(),
            })
    }

    /// Current selection, or the last non-empty one during an outage.
    pub fn best_effort(&self) -> Option<Selection> {
        match &self.primary {
            Some(primary) => Some(Selection {
                primary: primary.clone(),
                fallbacks: self.fallbacks.clone(),
            }),
            None => self.last_available.clone(),
        }
    }

    /// Primary followed by fallbacks.
    pub fn ordered(&self) -> Vec<&str> {
        self.primary
            .iter()
            .chain(self.fallbacks.iter())
            .map(String::as_str)
            .collect()
    }

    pub fn stats_for(&self, endpoint: &str) -> Option<&EndpointStats<S>> {
        self.endpoint_stats.iter().find(|s| s.endpoint() == endpoint)
    }

    pub fn is_outage(&self) -> bool {
        self.primary.is_none()
    }
}
