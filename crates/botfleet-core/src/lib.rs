//! Botfleet Core
//!
//! Durable side of the bot fleet supervisor:
//! - Instance records and their lifecycle status
//! - Whole-snapshot persistence with JSON and in-memory backends
//! - Serialized read-modify-write access through the instance repository
//! - Monotonic port allocation for new workers

pub mod instance;
pub mod ports;
pub mod repository;
pub mod storage;

pub use instance::{InstanceId, InstanceRecord, InstanceStatus, NewInstance};
pub use ports::PortAllocator;
pub use repository::InstanceRepository;
pub use storage::{JsonFileStore, MemorySnapshotStore, Snapshot, SnapshotStore};
