//! Endpoint ranking subsystem.
//!
//! # Data Flow
//! ```text
//! Cycle results applied to EndpointTable
//!     → policy.rs (drop banned, sort by failures / score / config order)
//!     → hysteresis against the current primary
//!     → Selection { primary, fallbacks } or empty on full outage
//! ```
//!
//! # Design Decisions
//! - Check statistics are opaque; quality comes from a pluggable scorer
//! - Lower score is better; unscored endpoints sort after scored ones
//! - Configuration order is the final tie-break, so ticks never reshuffle
//!   equal endpoints

pub mod policy;
pub mod score;

use crate::health::EndpointStats;

pub use policy::RankingPolicy;
pub use score::{BlockLagLatency, MeanLatency, ScoreFn, Unscored};

/// Quality score of one endpoint (lower is better).
///
/// `peers` holds every eligible endpoint of the group (the candidate
/// included), for scores that are relative to the group.
pub trait QualityScore<S>: Send + Sync {
    fn score(&self, candidate: &EndpointStats<S>, peers: &[&EndpointStats<S>]) -> Option<f64>;
}
