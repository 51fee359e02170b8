//! Endpoint health tracking and fallback selection.

pub mod admin;
pub mod clock;
pub mod config;
pub mod error;
pub mod health;
pub mod lifecycle;
pub mod observability;
pub mod persistence;
pub mod ranking;
pub mod tracker;

pub use config::schema::ServiceConfig;
pub use error::{ProbeError, TrackerError, TrackerResult};
pub use health::{CurrentEndpoints, Probe};
pub use lifecycle::Shutdown;
pub use tracker::{FallbackTracker, TrackerRegistry};
