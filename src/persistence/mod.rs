//! Snapshot persistence.
//!
//! # Data Flow
//! ```text
//! Tracker publish
//!     → StoredSnapshot { written_at, payload: JSON }
//!     → SnapshotStore::set(tracker_key)
//!
//! Tracker startup
//!     → SnapshotStore::get(tracker_key)
//!     → stale (older than cache_timeout)? remove + ignore
//!     → otherwise seed endpoint state
//! ```
//!
//! # Design Decisions
//! - Stores are key-value with last-write-wins; no transactions assumed
//! - Payloads are JSON so one store serves any check-stats type
//! - Store errors never stop tracking; the caller logs and moves on

pub mod file;
pub mod memory;

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::TrackerResult;

pub use file::FileStore;
pub use memory::MemoryStore;

/// A persisted snapshot with its write time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredSnapshot {
    /// Epoch milliseconds at write time.
    pub written_at: u64,
    pub payload: serde_json::Value,
}

impl StoredSnapshot {
    /// Older than `cache_timeout_ms` at `now`.
    pub fn is_stale(&self, now: u64, cache_timeout_ms: u64) -> bool {
        now.saturating_sub(self.written_at) > cache_timeout_ms
    }
}

/// Key-value store for tracker snapshots.
pub trait SnapshotStore: Send + Sync {
    fn get(&self, key: &str) -> TrackerResult<Option<StoredSnapshot>>;
    fn set(&self, key: &str, snapshot: StoredSnapshot) -> TrackerResult<()>;
    fn remove(&self, key: &str) -> TrackerResult<()>;
}

/// Shared store handle.
pub type SharedStore = Arc<dyn SnapshotStore>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_staleness_boundary() {
        let snapshot = StoredSnapshot { written_at: 1_000, payload: serde_json::Value::Null };
        assert!(!snapshot.is_stale(6_000, 10_000));
        assert!(!snapshot.is_stale(11_000, 10_000));
        assert!(snapshot.is_stale(11_001, 10_000));
        // Clock went backwards: treat as fresh.
        assert!(!snapshot.is_stale(500, 10_000));
    }
}
