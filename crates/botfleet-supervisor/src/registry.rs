//! In-memory registry of workers spawned by this supervisor run
//!
//! Nothing here is persisted. After a supervisor restart the registry is
//! empty, whatever the durable records say.

use crate::launcher::WorkerProcess;
use botfleet_core::InstanceId;
use dashmap::DashMap;
use tracing::debug;

/// A worker owned by the current supervisor process
pub struct TrackedWorker {
    pub process: Box<dyn WorkerProcess>,
    pub port: u16,
}

/// What the registry knows about one instance's worker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Liveness {
    /// No worker is tracked for the instance
    Untracked,
    Live,
    /// The tracked worker had exited and its handle was just dropped.
    /// Reported exactly once per worker.
    Exited { pid: Option<u32>, port: u16 },
}

/// Map from instance id to its live worker handle
#[derive(Default)]
pub struct ProcessRegistry {
    workers: DashMap<InstanceId, TrackedWorker>,
}

impl ProcessRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a worker, returning any handle it replaced
    pub fn insert(&self, id: InstanceId, worker: TrackedWorker) -> Option<TrackedWorker> {
        self.workers.insert(id, worker)
    }

    /// Stop tracking a worker and hand its handle to the caller.
    ///
    /// Callers wait on the returned handle, never on a map guard.
    pub fn take(&self, id: InstanceId) -> Option<TrackedWorker> {
        self.workers.remove(&id).map(|(_, worker)| worker)
    }

    pub fn is_tracked(&self, id: InstanceId) -> bool {
        self.workers.contains_key(&id)
    }

    /// Check a tracked worker, dropping its handle if it already exited.
    ///
    /// An exit status that cannot be read counts as still running.
    pub fn liveness(&self, id: InstanceId) -> Liveness {
        let exited = match self.workers.get_mut(&id) {
            None => return Liveness::Untracked,
            Some(mut worker) => match worker.process.try_exited() {
                Ok(exited) => exited,
                Err(e) => {
                    debug!(instance = %id, error = %e, "could not read worker exit status");
                    false
                }
            },
        };

        if !exited {
            return Liveness::Live;
        }
        match self.take(id) {
            Some(worker) => Liveness::Exited {
                pid: worker.process.pid(),
                port: worker.port,
            },
            // Reaped concurrently by another caller
            None => Liveness::Untracked,
        }
    }

    pub fn port_of(&self, id: InstanceId) -> Option<u16> {
        self.workers.get(&id).map(|w| w.port)
    }

    pub fn pid_of(&self, id: InstanceId) -> Option<u32> {
        self.workers.get(&id).and_then(|w| w.process.pid())
    }

    pub fn tracked_ids(&self) -> Vec<InstanceId> {
        self.workers.iter().map(|entry| *entry.key()).collect()
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }
}
