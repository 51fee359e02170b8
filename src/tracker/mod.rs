//! Tracker orchestration subsystem.
//!
//! # Data Flow
//! ```text
//! Consumer → current_endpoints()
//!     → touch last access, start tracking if Idle
//!     → latest Arc<CurrentEndpoints> from the watch channel
//!
//! Tracking loop (every track_interval):
//!     → run_probe for every endpoint, concurrently
//!     → ledger transitions applied under one lock
//!     → ranking → snapshot
//!     → throttle.rs (set_endpoints_throttle)
//!     → watch channel publish → SnapshotStore::set
//!
//! Idle timeout (disable_unused_tracking_timeout since last access):
//!     → loop exits, state kept
//! ```
//!
//! # Design Decisions
//! - The loop never runs without consumers
//! - Readers only ever see immutable snapshots
//! - Publishing never waits on the store

pub mod registry;
pub mod throttle;
#[allow(clippy::module_inception)]
pub mod tracker;

pub use registry::TrackerRegistry;
pub use throttle::Throttle;
pub use tracker::{FallbackTracker, TrackerBuilder, TrackingStatus};
