//! Configuration validation.
//!
//! Serde handles syntax; this module checks semantics (unique group keys,
//! parseable endpoint URLs, non-zero intervals) and reports every problem it
//! finds, not just the first.

use std::collections::HashSet;
use std::fmt;
use crate::config::schema::{ServiceConfig, TrackerConfig};

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    EmptyGroupKey,
    DuplicateGroup(String),
    NoEndpoints(String),
    DuplicateEndpoint { group: String, endpoint: String },
    InvalidEndpoint { group: String, endpoint: String, reason: String },
    ZeroDuration { scope: String, field: &'static str },
    ZeroBanCount(String),
    InvalidTolerance(String),
    InvalidAddress { field: &'static str, value: String },
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::EmptyGroupKey => write!(f, "group key must not be empty"),
            ValidationError::DuplicateGroup(key) => write!(f, "group '{}' is defined twice", key),
            ValidationError::NoEndpoints(key) => write!(f, "group '{}' has no endpoints", key),
            ValidationError::DuplicateEndpoint { group, endpoint } => {
                write!(f, "group '{}' lists '{}' more than once", group, endpoint)
            }
            ValidationError::InvalidEndpoint { group, endpoint, reason } => {
                write!(f, "group '{}': invalid endpoint '{}': {}", group, endpoint, reason)
            }
            ValidationError::ZeroDuration { scope, field } => {
                write!(f, "{}: {} must be greater than zero", scope, field)
            }
            ValidationError::ZeroBanCount(scope) => {
                write!(f, "{}: failures_before_ban.count must be at least 1", scope)
            }
            ValidationError::InvalidTolerance(scope) => {
                write!(f, "{}: primary_tolerance must be a finite, non-negative number", scope)
            }
            ValidationError::InvalidAddress { field, value } => {
                write!(f, "{} '{}' is not a valid socket address", field, value)
            }
        }
    }
}

/// Validate a parsed configuration.
pub fn validate_config(config: &ServiceConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    validate_tracker("tracker", &config.tracker, &mut errors);

    let mut keys = HashSet::new();
    for group in &config.groups {
        if group.key.is_empty() {
            errors.push(ValidationError::EmptyGroupKey);
        } else if !keys.insert(group.key.as_str()) {
            errors.push(ValidationError::DuplicateGroup(group.key.clone()));
        }

        if group.endpoints.is_empty() {
            errors.push(ValidationError::NoEndpoints(group.key.clone()));
        }

        let mut seen = HashSet::new();
        for endpoint in &group.endpoints {
            if !seen.insert(endpoint.as_str()) {
                errors.push(ValidationError::DuplicateEndpoint {
                    group: group.key.clone(),
                    endpoint: endpoint.clone(),
                });
            }
            if let Err(e) = url::Url::parse(endpoint) {
                errors.push(ValidationError::InvalidEndpoint {
                    group: group.key.clone(),
                    endpoint: endpoint.clone(),
                    reason: e.to_string(),
                });
            }
        }

        if let Some(tracker) = &group.tracker {
            validate_tracker(&format!("groups.{}.tracker", group.key), tracker, &mut errors);
        }
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<std::net::SocketAddr>().is_err()
    {
        errors.push(ValidationError::InvalidAddress {
            field: "observability.metrics_address",
            value: config.observability.metrics_address.clone(),
        });
    }

    if config.admin.enabled
        && config.admin.bind_address.parse::<std::net::SocketAddr>().is_err()
    {
        errors.push(ValidationError::InvalidAddress {
            field: "admin.bind_address",
            value: config.admin.bind_address.clone(),
        });
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn validate_tracker(scope: &str, tracker: &TrackerConfig, errors: &mut Vec<ValidationError>) {
    let durations = [
        ("track_interval_ms", tracker.track_interval_ms),
        ("disable_unused_tracking_timeout_ms", tracker.disable_unused_tracking_timeout_ms),
        ("check_timeout_ms", tracker.check_timeout_ms),
        ("failures_before_ban.window_ms", tracker.failures_before_ban.window_ms),
    ];
    for (field, value) in durations {
        if value == 0 {
            errors.push(ValidationError::ZeroDuration { scope: scope.to_string(), field });
        }
    }

    if tracker.check_history == 0 {
        errors.push(ValidationError::ZeroDuration {
            scope: scope.to_string(),
            field: "check_history",
        });
    }

    if tracker.failures_before_ban.count == 0 {
        errors.push(ValidationError::ZeroBanCount(scope.to_string()));
    }

    if !tracker.primary_tolerance.is_finite() || tracker.primary_tolerance < 0.0 {
        errors.push(ValidationError::InvalidTolerance(scope.to_string()));
    }
}
