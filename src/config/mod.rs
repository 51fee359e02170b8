//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → ServiceConfig (validated, immutable)
//!     → TrackerConfig per group handed to the registry
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; trackers copy their tuning at creation
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use schema::ServiceConfig;
pub use schema::TrackerConfig;
pub use schema::FailuresBeforeBan;
pub use schema::GroupConfig;
pub use schema::{AdminConfig, ObservabilityConfig, PersistenceConfig, ProbeConfig};
