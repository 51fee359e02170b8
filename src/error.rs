//! Error definitions shared across the tracker.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Why a single probe did not succeed.
///
/// Probe errors are recorded in the endpoint history and fed to the failure
/// ledger; they never reach consumers of `CurrentEndpoints`.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum ProbeError {
    /// The check did not complete within `check_timeout`.
    #[error("probe timed out after {after_ms} ms")]
    Timeout { after_ms: u64 },

    /// Connection or protocol failure.
    #[error("transport error: {0}")]
    Transport(String),

    /// The endpoint answered, but with an error or an invalid response.
    #[error("application error: {0}")]
    Application(String),
}

impl ProbeError {
    /// Short error class, used for ban reasons and metric labels.
    pub fn class(&self) -> &'static str {
        match self {
            ProbeError::Timeout { .. } => "timeout",
            ProbeError::Transport(_) => "transport",
            ProbeError::Application(_) => "application",
        }
    }
}

/// Errors surfaced by trackers, the registry and snapshot stores.
#[derive(Debug, Error)]
pub enum TrackerError {
    #[error(transparent)]
    Probe(#[from] ProbeError),

    /// Every configured endpoint of the group is banned.
    #[error("no eligible endpoint for tracker '{tracker_key}'")]
    NoEligibleEndpoint { tracker_key: String },

    #[error("failed to read snapshot '{key}': {reason}")]
    PersistenceRead { key: String, reason: String },

    #[error("failed to write snapshot '{key}': {reason}")]
    PersistenceWrite { key: String, reason: String },

    #[error("unknown tracker '{0}'")]
    UnknownTracker(String),

    #[error("endpoint '{endpoint}' is not tracked by '{tracker_key}'")]
    UnknownEndpoint { tracker_key: String, endpoint: String },
}

/// Result type for tracker operations.
pub type TrackerResult<T> = Result<T, TrackerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_probe_error_classes() {
        assert_eq!(ProbeError::Timeout { after_ms: 10 }.class(), "timeout");
        assert_eq!(ProbeError::Transport("refused".into()).class(), "transport");
        assert_eq!(ProbeError::Application("bad".into()).class(), "application");
    }

    #[test]
    fn test_probe_error_serde_shape() {
        let json = serde_json::to_value(ProbeError::Timeout { after_ms: 250 }).unwrap();
        assert_eq!(json["kind"], "timeout");
        assert_eq!(json["detail"]["after_ms"], 250);

        let back: ProbeError = serde_json::from_value(json).unwrap();
        assert_eq!(back, ProbeError::Timeout { after_ms: 250 });
    }
}
