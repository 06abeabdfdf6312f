//! In-memory snapshot store for testing and development

use super::{Snapshot, SnapshotStore};
use anyhow::Result;
use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

/// In-memory snapshot store (non-persistent)
#[derive(Clone, Default)]
pub struct MemorySnapshotStore {
    snapshot: Arc<RwLock<Snapshot>>,
    saves: Arc<AtomicU64>,
}

impl MemorySnapshotStore {
    /// Create an empty in-memory store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-populated with records, as if left by a previous run
    pub fn with_snapshot(snapshot: Snapshot) -> Self {
        Self {
            snapshot: Arc::new(RwLock::new(snapshot)),
            saves: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Number of completed saves
    pub fn save_count(&self) -> u64 {
        self.saves.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SnapshotStore for MemorySnapshotStore {
    async fn load(&self) -> Snapshot {
        self.snapshot
            .read()
            .map(|s| s.clone())
            .unwrap_or_default()
    }

    async fn save(&self, snapshot: &Snapshot) -> Result<()> {
        let mut guard = self
            .snapshot
            .write()
            .map_err(|_| anyhow::anyhow!("snapshot lock poisoned"))?;
        guard.clone_from(snapshot);
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
