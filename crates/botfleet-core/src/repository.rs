//! Serialized access to the instance snapshot
//!
//! Backends can only overwrite the whole mapping, so every mutation here is
//! a read-modify-write of the full snapshot inside one critical section.
//! That keeps concurrent updates to different instances from clobbering
//! each other.

use crate::instance::{InstanceId, InstanceRecord, InstanceStatus};
use crate::storage::{Snapshot, SnapshotStore};
use anyhow::Result;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;

/// Transactional view over a [`SnapshotStore`]
pub struct InstanceRepository {
    backend: Arc<dyn SnapshotStore>,
    write_lock: Mutex<()>,
}

impl InstanceRepository {
    pub fn new(backend: Arc<dyn SnapshotStore>) -> Self {
        Self {
            backend,
            write_lock: Mutex::new(()),
        }
    }

    /// Fetch one record
    pub async fn get(&self, id: InstanceId) -> Option<InstanceRecord> {
        let _guard = self.write_lock.lock().await;
        self.backend.load().await.remove(&id)
    }

    /// All records, oldest first
    pub async fn list(&self) -> Vec<InstanceRecord> {
        let snapshot = {
            let _guard = self.write_lock.lock().await;
            self.backend.load().await
        };
        let mut records: Vec<_> = snapshot.into_values().collect();
        records.sort_by_key(|r| r.created_at);
        records
    }

    /// Insert or replace a record
    pub async fn insert(&self, record: InstanceRecord) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut snapshot = self.backend.load().await;
        snapshot.insert(record.id, record);
        self.backend.save(&snapshot).await
    }

    /// Apply `f` to one record and persist the result.
    ///
    /// Returns `Ok(None)` without writing when the record does not exist.
    pub async fn update<F>(&self, id: InstanceId, f: F) -> Result<Option<InstanceRecord>>
    where
        F: FnOnce(&mut InstanceRecord),
    {
        let _guard = self.write_lock.lock().await;
        let mut snapshot = self.backend.load().await;
        let Some(record) = snapshot.get_mut(&id) else {
            return Ok(None);
        };
        f(record);
        record.touch();
        let updated = record.clone();
        self.backend.save(&snapshot).await?;
        Ok(Some(updated))
    }

    /// Remove a record, returning it if it existed
    pub async fn remove(&self, id: InstanceId) -> Result<Option<InstanceRecord>> {
        let _guard = self.write_lock.lock().await;
        let mut snapshot = self.backend.load().await;
        let removed = snapshot.remove(&id);
        if removed.is_some() {
            self.backend.save(&snapshot).await?;
        }
        Ok(removed)
    }

    /// Demote every record that claims a live worker to `stopped`.
    ///
    /// Run once at supervisor boot, when no worker is tracked in memory.
    /// Returns how many records were demoted.
    pub async fn reconcile_on_boot(&self) -> Result<usize> {
        let _guard = self.write_lock.lock().await;
        let mut snapshot = self.backend.load().await;
        let demoted = demote_live(&mut snapshot);
        if demoted > 0 {
            self.backend.save(&snapshot).await?;
            info!(demoted, "demoted previously running instances to stopped");
        }
        Ok(demoted)
    }

    /// Highest port recorded on any instance
    pub async fn max_port(&self) -> Option<u16> {
        let _guard = self.write_lock.lock().await;
        self.backend.load().await.values().filter_map(|r| r.port).max()
    }
}

fn demote_live(snapshot: &mut Snapshot) -> usize {
    let mut count = 0;
    for record in snapshot.values_mut() {
        if matches!(
            record.status,
            InstanceStatus::Running | InstanceStatus::Starting
        ) {
            record.set_status(InstanceStatus::Stopped);
            record.touch();
            count += 1;
        }
    }
    count
}
