//! Quality scorers.

use crate::health::{EndpointStats, RpcCheckStats};
use crate::ranking::QualityScore;

/// No quality signal: order by failures and config order only.
#[derive(Debug, Default, Clone, Copy)]
pub struct Unscored;

impl<S> QualityScore<S> for Unscored {
    fn score(&self, _candidate: &EndpointStats<S>, _peers: &[&EndpointStats<S>]) -> Option<f64> {
        None
    }
}

/// Mean probe duration (ms) of the recent successful checks.
#[derive(Debug, Clone, Copy)]
pub struct MeanLatency {
    /// How many recent results to consider.
    pub window: usize,
}

impl Default for MeanLatency {
    fn default() -> Self {
        Self { window: 5 }
    }
}

impl MeanLatency {
    fn mean<S>(&self, stats: &EndpointStats<S>) -> Option<f64> {
        let (sum, n) = stats
            .check_results
            .iter()
            .take(self.window)
            .filter(|r| r.success)
            .fold((0u64, 0u64), |(sum, n), r| (sum + r.duration_ms, n + 1));
        (n > 0).then(|| sum as f64 / n as f64)
    }
}

impl<S> QualityScore<S> for MeanLatency {
    fn score(&self, candidate: &EndpointStats<S>, _peers: &[&EndpointStats<S>]) -> Option<f64> {
        self.mean(candidate)
    }
}

/// Scorer from a closure over one endpoint's stats.
pub struct ScoreFn<F>(pub F);

impl<S, F> QualityScore<S> for ScoreFn<F>
where
    F: Fn(&EndpointStats<S>) -> Option<f64> + Send + Sync,
{
    fn score(&self, candidate: &EndpointStats<S>, _peers: &[&EndpointStats<S>]) -> Option<f64> {
        (self.0)(candidate)
    }
}

/// RPC quality: mean latency plus a penalty per block the endpoint lags
/// behind the highest block reported in its group.
#[derive(Debug, Clone, Copy)]
pub struct BlockLagLatency {
    pub latency: MeanLatency,
    pub penalty_per_block_ms: f64,
}

impl BlockLagLatency {
    pub fn new(penalty_per_block_ms: f64) -> Self {
        Self {
            latency: MeanLatency::default(),
            penalty_per_block_ms,
        }
    }
}

fn latest_block(stats: &EndpointStats<RpcCheckStats>) -> Option<u64> {
    stats
        .check_results
        .iter()
        .find_map(|r| r.stats.map(|s| s.block_number))
}

impl QualityScore<RpcCheckStats> for BlockLagLatency {
    fn score(
        &self,
        candidate: &EndpointStats<RpcCheckStats>,
        peers: &[&EndpointStats<RpcCheckStats>],
    ) -> Option<f64> {
        let latency = self.latency.mean(candidate)?;
        let head = peers.iter().filter_map(|p| latest_block(p)).max();
        let lag = match (head, latest_block(candidate)) {
            (Some(head), Some(own)) => head.saturating_sub(own),
            _ => 0,
        };
        Some(latency + lag as f64 * self.penalty_per_block_ms)
    }
}
