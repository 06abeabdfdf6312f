//! Botfleet Supervisor
//!
//! Lifecycle management for bot worker processes:
//! - Create, start, stop, restart and delete instances
//! - Boot-time reconciliation of persisted state against live processes
//! - Graceful terminate with forced kill after a bounded wait
//! - Read-time overlay of each worker's self-reported status

pub mod error;
pub mod launcher;
pub mod registry;
pub mod status;
pub mod supervisor;
pub mod testing;

pub use error::SupervisorError;
pub use launcher::{LaunchSpec, OsLauncher, ProcessLauncher, WorkerProcess};
pub use registry::{Liveness, ProcessRegistry, TrackedWorker};
pub use status::{InstanceView, LiveStatus, PairingInfo, StatusAggregator, WorkerStatus};
pub use supervisor::{StartOutcome, Supervisor, SupervisorConfig};
