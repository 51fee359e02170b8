//! Probe execution.
//!
//! # Responsibilities
//! - Define the pluggable probe seam (`Probe<S>`)
//! - Run one probe with a hard deadline
//! - Normalize every outcome into a `CheckResult`
//!
//! # Design Decisions
//! - The check runs in its own task; on timeout the task is aborted so a
//!   late answer can never be reported
//! - A panicking check is a failed probe, not a crashed tracker

use futures_util::future::BoxFuture;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{self, Instant};

use crate::clock::Clock;
use crate::error::ProbeError;
use crate::health::state::{CheckResult, CheckStats};

/// A health check against one endpoint.
pub trait Probe<S>: Send + Sync {
    fn check(&self, endpoint: &str) -> BoxFuture<'static, Result<S, ProbeError>>;
}

/// Probe backed by a closure.
pub struct FnProbe<F> {
    f: F,
}

/// Wrap a closure `Fn(String) -> impl Future<Output = Result<S, ProbeError>>`
/// as a [`Probe`].
pub fn probe_fn<S, F, Fut>(f: F) -> FnProbe<F>
where
    F: Fn(String) -> Fut + Send + Sync,
    Fut: Future<Output = Result<S, ProbeError>> + Send + 'static,
{
    FnProbe { f }
}

impl<S, F, Fut> Probe<S> for FnProbe<F>
where
    F: Fn(String) -> Fut + Send + Sync,
    Fut: Future<Output = Result<S, ProbeError>> + Send + 'static,
{
    fn check(&self, endpoint: &str) -> BoxFuture<'static, Result<S, ProbeError>> {
        Box::pin((self.f)(endpoint.to_string()))
    }
}

/// Run a single probe, bounded by `timeout`.
pub async fn run_probe<S, P>(
    probe: &P,
    endpoint: &str,
    timeout: Duration,
    clock: &dyn Clock,
) -> CheckResult<S>
where
    S: CheckStats,
    P: Probe<S> + ?Sized,
{
    let started = Instant::now();
    let mut task = tokio::spawn(probe.check(endpoint));

    let outcome = match time::timeout(timeout, &mut task).await {
        Ok(Ok(outcome)) => outcome,
        Ok(Err(join_err)) => Err(ProbeError::Application(format!(
            "probe task failed: {}",
            join_err
        ))),
        Err(_) => {
            task.abort();
            Err(ProbeError::Timeout {
                after_ms: timeout.as_millis() as u64,
            })
        }
    };

    let duration_ms = started.elapsed().as_millis() as u64;
    let checked_at = clock.now_ms();

    match outcome {
        Ok(stats) => CheckResult::success(endpoint, stats, checked_at, duration_ms),
        Err(err) => {
            tracing::debug!(endpoint = %endpoint, error = %err, "Probe failed");
            CheckResult::failure(endpoint, err, checked_at, duration_ms)
        }
    }
}

/// Shared probe handle.
pub type SharedProbe<S> = Arc<dyn Probe<S>>;
