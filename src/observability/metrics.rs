//! Metrics collection and exposition.
//!
//! # Metrics
//! - `fallback_tracker_probes_total` (counter): probes by tracker, endpoint, outcome
//! - `fallback_tracker_probe_duration_seconds` (histogram): probe latency
//! - `fallback_tracker_bans_total` (counter): ban/unban transitions
//! - `fallback_tracker_endpoint_banned` (gauge): 1=banned, 0=active
//! - `fallback_tracker_eligible_endpoints` (gauge): non-banned endpoints per tracker
//! - `fallback_tracker_publishes_total` (counter): published snapshots
//! - `fallback_tracker_persistence_errors_total` (counter): by operation
//! - `fallback_tracker_tracking` (gauge): 1=tracking, 0=idle
//!
//! Without an installed recorder these calls are no-ops.

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};
use std::net::SocketAddr;

/// Install the Prometheus recorder with an HTTP scrape listener.
///
/// Must be called from within a tokio runtime.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

pub fn record_probe(tracker: &str, endpoint: &str, success: bool, duration_ms: u64) {
    let outcome = if success { "success" } else { "failure" };
    counter!(
        "fallback_tracker_probes_total",
        "tracker" => tracker.to_string(),
        "endpoint" => endpoint.to_string(),
        "outcome" => outcome
    )
    .increment(1);
    histogram!(
        "fallback_tracker_probe_duration_seconds",
        "tracker" => tracker.to_string(),
        "endpoint" => endpoint.to_string()
    )
    .record(duration_ms as f64 / 1000.0);
}

pub fn record_ban_transition(tracker: &str, endpoint: &str, banned: bool) {
    let transition = if banned { "ban" } else { "unban" };
    counter!(
        "fallback_tracker_bans_total",
        "tracker" => tracker.to_string(),
        "endpoint" => endpoint.to_string(),
        "transition" => transition
    )
    .increment(1);
    gauge!(
        "fallback_tracker_endpoint_banned",
        "tracker" => tracker.to_string(),
        "endpoint" => endpoint.to_string()
    )
    .set(if banned { 1.0 } else { 0.0 });
}

pub fn record_eligible(tracker: &str, eligible: usize) {
    gauge!("fallback_tracker_eligible_endpoints", "tracker" => tracker.to_string()).set(eligible as f64);
}

pub fn record_publish(tracker: &str) {
    counter!("fallback_tracker_publishes_total", "tracker" => tracker.to_string()).increment(1);
}

pub fn record_persistence_error(tracker: &str, operation: &'static str) {
    counter!(
        "fallback_tracker_persistence_errors_total",
        "tracker" => tracker.to_string(),
        "operation" => operation
    )
    .increment(1);
}

pub fn record_tracking(tracker: &str, tracking: bool) {
    gauge!("fallback_tracker_tracking", "tracker" => tracker.to_string())
        .set(if tracking { 1.0 } else { 0.0 });
}
