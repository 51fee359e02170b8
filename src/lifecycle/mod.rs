//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (main.rs):
//!     Load config → Init logging/metrics → Build registry → Start admin API
//!
//! Shutdown (shutdown.rs):
//!     Signal received → Stop admin API → Stop trackers → Exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//! ```
//!
//! # Design Decisions
//! - Trackers finish an in-flight probe cycle before stopping
//! - Shutdown is a latched flag: late subscribers still observe it

pub mod shutdown;
pub mod signals;

pub use shutdown::{Shutdown, ShutdownSignal};
