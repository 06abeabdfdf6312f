//! Storage backends for instance snapshots
//!
//! Backends only ever read or overwrite the whole mapping. Serialized
//! per-record access is layered on top by [`crate::InstanceRepository`].

pub mod json_store;
pub mod memory_store;

pub use json_store::JsonFileStore;
pub use memory_store::MemorySnapshotStore;

use crate::instance::{InstanceId, InstanceRecord};
use anyhow::Result;
use std::collections::BTreeMap;

/// Full durable mapping from instance id to record
pub type Snapshot = BTreeMap<InstanceId, InstanceRecord>;

/// Snapshot store trait for different storage backends
#[async_trait::async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Load the full mapping. A missing or unreadable backing store yields an empty mapping.
    async fn load(&self) -> Snapshot;

    /// Overwrite the full mapping
    async fn save(&self, snapshot: &Snapshot) -> Result<()>;
}
