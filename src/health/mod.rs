//! Health checking subsystem.
//!
//! # Data Flow
//! ```text
//! Probe cycle (probe.rs):
//!     Tracker timer
//!     → run_probe per endpoint (bounded by check_timeout)
//!     → CheckResult
//!
//! Failure ledger (ledger.rs):
//!     CheckResult
//!     → prune window, coalesce bursts
//!     → ban / unban decision
//!
//! Endpoint table (table.rs):
//!     One EndpointStats per endpoint
//!     → seeded from persisted snapshot
//!     → mutated only by the owning tracker
//! ```
//!
//! # Design Decisions
//! - Probe transport is pluggable; rpc.rs is the JSON-RPC implementation
//! - Banned endpoints are still probed so recovery is noticed quickly
//! - Health state is per-endpoint, per-group

pub mod ledger;
pub mod probe;
pub mod rpc;
pub mod state;
pub mod table;

pub use ledger::{FailurePolicy, Transition};
pub use probe::{probe_fn, run_probe, Probe, SharedProbe};
pub use rpc::{RpcCheckStats, RpcProbe};
pub use state::{BanState, CheckResult, CheckStats, CurrentEndpoints, EndpointState, EndpointStats, Selection};
pub use table::EndpointTable;
