//! Configuration schema definitions.
//!
//! All types derive Serde traits for deserialization from TOML. Durations are
//! plain millisecond counts so they read the same in config files, persisted
//! snapshots and logs.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Root configuration for the tracker daemon.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ServiceConfig {
    /// Default tracker tuning, used by every group without an override.
    pub tracker: TrackerConfig,

    /// Endpoint groups to track.
    pub groups: Vec<GroupConfig>,

    /// JSON-RPC probe settings.
    pub probe: ProbeConfig,

    /// Snapshot persistence.
    pub persistence: PersistenceConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    #[serde(default)]
    pub admin: AdminConfig,
}

impl ServiceConfig {
    /// Effective tracker config for a group.
    pub fn tracker_for(&self, group: &GroupConfig) -> TrackerConfig {
        group.tracker.clone().unwrap_or_else(|| self.tracker.clone())
    }
}

/// Tuning of one fallback tracker.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Time between probe cycles while tracking.
    pub track_interval_ms: u64,

    /// Stop probing when nobody asked for the current endpoints for this long.
    pub disable_unused_tracking_timeout_ms: u64,

    /// Persisted snapshots older than this are ignored on load.
    pub cache_timeout_ms: u64,

    /// Abort a probe that takes longer than this.
    pub check_timeout_ms: u64,

    pub failures_before_ban: FailuresBeforeBan,

    /// Minimum spacing between published (and persisted) snapshots.
    pub set_endpoints_throttle_ms: u64,

    /// Delay before the first probe cycle after activation.
    pub delay_ms: Option<u64>,

    /// Number of check results kept per endpoint.
    pub check_history: usize,

    /// Probe banned endpoints only every Nth cycle (1 = every cycle, 0 is
    /// treated as 1).
    pub banned_check_every: u32,

    /// How much worse (in score units) the current primary may be than the
    /// best candidate before it is replaced.
    pub primary_tolerance: f64,
}

impl TrackerConfig {
    pub fn track_interval(&self) -> Duration {
        Duration::from_millis(self.track_interval_ms)
    }

    pub fn disable_unused_tracking_timeout(&self) -> Duration {
        Duration::from_millis(self.disable_unused_tracking_timeout_ms)
    }

    pub fn check_timeout(&self) -> Duration {
        Duration::from_millis(self.check_timeout_ms)
    }

    pub fn set_endpoints_throttle(&self) -> Duration {
        Duration::from_millis(self.set_endpoints_throttle_ms)
    }

    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms.unwrap_or(0))
    }
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            track_interval_ms: 10_000,
            disable_unused_tracking_timeout_ms: 60_000,
            cache_timeout_ms: 5 * 60_000,
            check_timeout_ms: 10_000,
            failures_before_ban: FailuresBeforeBan::default(),
            set_endpoints_throttle_ms: 5_000,
            delay_ms: None,
            check_history: 10,
            banned_check_every: 1,
            primary_tolerance: 50.0,
        }
    }
}

/// Ban threshold: `count` failures within `window_ms`, counted at most once
/// per `throttle_ms`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct FailuresBeforeBan {
    pub count: usize,
    pub window_ms: u64,
    pub throttle_ms: u64,
}

impl Default for FailuresBeforeBan {
    fn default() -> Self {
        Self {
            count: 3,
            window_ms: 60_000,
            throttle_ms: 2_000,
        }
    }
}

/// A group of interchangeable endpoints.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GroupConfig {
    /// Tracker key (e.g. "arbitrum"), also the persistence key.
    pub key: String,

    /// Candidate endpoints in preference order.
    pub endpoints: Vec<String>,

    /// Per-group tuning override.
    #[serde(default)]
    pub tracker: Option<TrackerConfig>,
}

/// JSON-RPC probe configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ProbeConfig {
    /// When set, endpoints reporting another chain id fail the probe.
    pub expected_chain_id: Option<u64>,

    /// Ranking penalty (in latency milliseconds) per block an endpoint lags
    /// behind the highest block seen in its group.
    pub block_lag_penalty_ms: f64,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            expected_chain_id: None,
            block_lag_penalty_ms: 100.0,
        }
    }
}

/// Snapshot persistence configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct PersistenceConfig {
    /// Directory for snapshot files. In-memory only when unset.
    pub dir: Option<String>,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error). `RUST_LOG` wins when set.
    pub log_level: String,

    /// Emit JSON log lines instead of the human-readable format.
    pub json_logs: bool,

    /// Enable the Prometheus metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
            metrics_enabled: true,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Admin API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Enable the admin API.
    pub enabled: bool,

    /// API key for authentication (Bearer token).
    pub api_key: String,

    /// Admin API bind address.
    pub bind_address: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            // WARNING: This is a placeholder! Change this in production.
            api_key: "CHANGE_ME_IN_PRODUCTION".to_string(),
            bind_address: "127.0.0.1:8081".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config: ServiceConfig = toml::from_str(
            r#"
            [[groups]]
            key = "arbitrum"
            endpoints = ["https://arb1.arbitrum.io/rpc"]
            "#,
        )
        .unwrap();

        assert_eq!(config.groups.len(), 1);
        assert_eq!(config.tracker, TrackerConfig::default());
        assert_eq!(config.tracker.failures_before_ban.count, 3);
        assert!(config.persistence.dir.is_none());
    }

    #[test]
    fn test_group_override() {
        let config: ServiceConfig = toml::from_str(
            r#"
            [tracker]
            track_interval_ms = 5000

            [[groups]]
            key = "arbitrum"
            endpoints = ["https://a.example", "https://b.example"]

            [[groups]]
            key = "optimism"
            endpoints = ["https://c.example"]

            [groups.tracker]
            track_interval_ms = 1000
            delay_ms = 250

            [groups.tracker.failures_before_ban]
            count = 5
            "#,
        )
        .unwrap();

        let arb = config.tracker_for(&config.groups[0]);
        assert_eq!(arb.track_interval_ms, 5000);

        let op = config.tracker_for(&config.groups[1]);
        assert_eq!(op.track_interval_ms, 1000);
        assert_eq!(op.delay(), Duration::from_millis(250));
        assert_eq!(op.failures_before_ban.count, 5);
        assert_eq!(op.failures_before_ban.window_ms, 60_000);
    }
}
