//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Trackers, probes and stores produce:
//!     → logging.rs (structured tracing events)
//!     → metrics.rs (counters, gauges, histograms)
//!
//! Consumers:
//!     → Log aggregation (stdout, JSON lines)
//!     → Metrics endpoint (Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - Every ban/unban and tracking transition is logged with tracker + endpoint fields
//! - Metrics are labelled by tracker key and endpoint

pub mod logging;
pub mod metrics;
