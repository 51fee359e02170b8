//! In-memory snapshot store.

use dashmap::DashMap;

use crate::error::TrackerResult;
use crate::persistence::{SnapshotStore, StoredSnapshot};

/// Process-local store; contents are lost on restart.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: DashMap<String, StoredSnapshot>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

impl SnapshotStore for MemoryStore {
    fn get(&self, key: &str) -> TrackerResult<Option<StoredSnapshot>> {
        Ok(self.inner.get(key).map(|r| r.value().clone()))
    }

    fn set(&self, key: &str, snapshot: StoredSnapshot) -> TrackerResult<()> {
        self.inner.insert(key.to_string(), snapshot);
        Ok(())
    }

    fn remove(&self, key: &str) -> TrackerResult<()> {
        self.inner.remove(key);
        Ok(())
    }
}
