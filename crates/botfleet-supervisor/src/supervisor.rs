//! Instance supervisor
//!
//! Owns the process registry and port allocator, drives the per-instance
//! lifecycle and mirrors every transition into the instance store before
//! returning.

use crate::error::{Result, SupervisorError};
use crate::launcher::{LaunchSpec, ProcessLauncher};
use crate::registry::{Liveness, ProcessRegistry, TrackedWorker};
use crate::status::{InstanceView, LiveStatus, PairingInfo, StatusAggregator};
use botfleet_core::ports::DEFAULT_BASE_PORT;
use botfleet_core::{
    InstanceId, InstanceRecord, InstanceRepository, InstanceStatus, NewInstance, PortAllocator,
    SnapshotStore,
};
use dashmap::DashMap;
use futures::future::join_all;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Configuration for the supervisor
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// Interpreter or binary that runs a worker
    pub worker_program: PathBuf,

    /// First argument passed to the program, ahead of id, phone number and port
    pub worker_script: String,

    /// Working directory of every worker
    pub worker_dir: PathBuf,

    /// Parent of the per-instance directories workers write into
    pub instances_dir: PathBuf,

    /// Ports are issued above this floor
    pub base_port: u16,

    /// Host worker status endpoints are reached on
    pub status_host: String,

    /// Bound on one worker status poll
    pub status_timeout: Duration,

    /// How long a worker gets to exit after the terminate signal
    pub stop_timeout: Duration,

    /// Pause between the stop and start halves of a restart
    pub restart_delay: Duration,

    /// A worker exiting within this window counts as a failed spawn
    pub spawn_grace: Duration,
}

impl SupervisorConfig {
    /// Point worker and instance directories at `dir` and `dir/instances`
    #[must_use]
    pub fn with_worker_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.worker_dir = dir.into();
        self.instances_dir = self.worker_dir.join("instances");
        self
    }
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            worker_program: PathBuf::from("node"),
            worker_script: "instance.js".to_string(),
            worker_dir: PathBuf::from("bot"),
            instances_dir: PathBuf::from("bot").join("instances"),
            base_port: DEFAULT_BASE_PORT,
            status_host: "localhost".to_string(),
            status_timeout: Duration::from_secs(5),
            stop_timeout: Duration::from_secs(5),
            restart_delay: Duration::from_secs(2),
            spawn_grace: Duration::from_millis(500),
        }
    }
}

/// Result of a `start` or `restart`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    /// A live worker was already tracked; nothing was spawned
    AlreadyRunning,
    Started { port: u16, pid: Option<u32> },
}

/// The bot fleet supervisor
pub struct Supervisor {
    config: SupervisorConfig,
    store: InstanceRepository,
    ports: PortAllocator,
    registry: ProcessRegistry,
    launcher: Arc<dyn ProcessLauncher>,
    status: StatusAggregator,
    /// One lifecycle operation at a time per instance
    slots: DashMap<InstanceId, Arc<Mutex<()>>>,
}

impl Supervisor {
    /// Load persisted state, reconcile it and return a ready supervisor.
    ///
    /// Any record left `running` by a previous run is demoted to `stopped`:
    /// this run tracks no workers yet, so it cannot vouch for any of them.
    pub async fn boot(
        config: SupervisorConfig,
        backend: Arc<dyn SnapshotStore>,
        launcher: Arc<dyn ProcessLauncher>,
    ) -> Result<Self> {
        let store = InstanceRepository::new(backend);
        let demoted = store.reconcile_on_boot().await?;
        let ports = PortAllocator::seeded(config.base_port, store.max_port().await);
        let status = StatusAggregator::new(config.status_host.clone(), config.status_timeout);

        info!(demoted, port_floor = ports.last_issued(), "supervisor ready");

        Ok(Self {
            config,
            store,
            ports,
            registry: ProcessRegistry::new(),
            launcher,
            status,
            slots: DashMap::new(),
        })
    }

    pub fn config(&self) -> &SupervisorConfig {
        &self.config
    }

    /// Number of workers currently tracked
    pub fn tracked_count(&self) -> usize {
        self.registry.len()
    }

    /// Number of per-instance lifecycle locks currently held in memory
    pub fn lock_count(&self) -> usize {
        self.slots.len()
    }

    /// Whether this run owns a live worker for `id`
    pub async fn is_running(&self, id: InstanceId) -> bool {
        self.worker_live(id).await
    }

    /// Directory the worker of `id` keeps its own data in
    pub fn workdir_of(&self, id: InstanceId) -> PathBuf {
        self.config.instances_dir.join(id.to_string())
    }

    /// Register a new instance and launch its worker.
    ///
    /// Returns as soon as the worker is launched, with status `starting`.
    /// Promotion to the worker's live status happens on later reads.
    pub async fn create(&self, details: NewInstance) -> Result<InstanceRecord> {
        let id = InstanceId::new();
        let port = self.ports.next();
        let record = InstanceRecord::new(id, details, port);

        let slot = self.slot_entry(id);
        let _guard = slot.lock().await;

        self.store.insert(record.clone()).await?;
        info!(instance = %id, port, phone = %record.phone_number, "instance created");

        let pid = self.spawn_worker(&record, port).await?;
        self.store
            .update(id, |r| r.pid = pid)
            .await?
            .ok_or(SupervisorError::NotFound(id))
    }

    /// All instances with their live status overlaid
    pub async fn list(&self) -> Vec<InstanceView> {
        let records = self.store.list().await;
        join_all(records.into_iter().map(|record| async move {
            let (record, live) = self.overlay(record).await;
            InstanceView::merge(record, live)
        }))
        .await
    }

    /// One instance with its live status overlaid
    pub async fn get(&self, id: InstanceId) -> Result<InstanceView> {
        let record = self.record(id).await?;
        let (record, live) = self.overlay(record).await;
        Ok(InstanceView::merge(record, live))
    }

    /// Effective status of one instance
    pub async fn query_status(&self, id: InstanceId) -> Result<LiveStatus> {
        let record = self.record(id).await?;
        Ok(self.overlay(record).await.1)
    }

    /// Pairing data of one instance; empty with the durable status when no worker runs
    pub async fn get_pairing_code(&self, id: InstanceId) -> Result<PairingInfo> {
        let live = self.query_status(id).await?;
        Ok(PairingInfo::merge(id, live))
    }

    /// Launch the worker of a stopped, failed or never-started instance
    pub async fn start(&self, id: InstanceId) -> Result<StartOutcome> {
        let slot = self.slot(id).await?;
        let result = {
            let _guard = slot.lock().await;
            self.start_locked(id).await
        };
        self.release_if_gone(id, result)
    }

    /// Terminate the worker, escalating to a kill after `stop_timeout`
    pub async fn stop(&self, id: InstanceId) -> Result<()> {
        let slot = self.slot(id).await?;
        let result = {
            let _guard = slot.lock().await;
            self.stop_locked(id).await
        };
        self.release_if_gone(id, result)
    }

    /// Stop if running, wait `restart_delay`, then start
    pub async fn restart(&self, id: InstanceId) -> Result<StartOutcome> {
        let slot = self.slot(id).await?;
        let result = {
            let _guard = slot.lock().await;
            self.restart_locked(id).await
        };
        self.release_if_gone(id, result)
    }

    /// Stop the worker if any, erase its working directory and drop the record
    pub async fn delete(&self, id: InstanceId) -> Result<()> {
        let slot = self.slot(id).await?;
        let result = {
            let _guard = slot.lock().await;
            self.delete_locked(id).await
        };

        match result {
            Ok(()) => {
                self.slots.remove(&id);
                info!(instance = %id, "instance deleted");
                Ok(())
            }
            Err(e) => self.release_if_gone(id, Err(e)),
        }
    }

    /// Stop every tracked worker before the supervisor exits.
    ///
    /// Failures are logged per instance and never stop the others.
    pub async fn shutdown(&self) {
        let ids = self.registry.tracked_ids();
        info!(count = ids.len(), "stopping tracked workers");

        let results = join_all(ids.into_iter().map(|id| async move {
            (id, self.retire(id).await)
        }))
        .await;

        for (id, result) in results {
            if let Err(e) = result {
                warn!(instance = %id, error = %e, "worker cleanup failed");
            }
        }
    }

    async fn record(&self, id: InstanceId) -> Result<InstanceRecord> {
        self.store
            .get(id)
            .await
            .ok_or(SupervisorError::NotFound(id))
    }

    /// Overlay the worker's live view on a record. A crash noticed along
    /// the way is persisted first and the refreshed record returned.
    async fn overlay(&self, mut record: InstanceRecord) -> (InstanceRecord, LiveStatus) {
        let tracked_port = match self.registry.liveness(record.id) {
            Liveness::Live => self.registry.port_of(record.id),
            Liveness::Untracked => None,
            Liveness::Exited { pid, port } => {
                if let Some(updated) = self.record_crash(record.id, pid, port).await {
                    record = updated;
                }
                None
            }
        };

        let live = self
            .status
            .query(&record, tracked_port, self.launcher.as_ref())
            .await;
        (record, live)
    }

    /// Whether the tracked worker of `id` is running. A worker found to have
    /// exited on its own is recorded as failed.
    async fn worker_live(&self, id: InstanceId) -> bool {
        match self.registry.liveness(id) {
            Liveness::Live => true,
            Liveness::Untracked => false,
            Liveness::Exited { pid, port } => {
                self.record_crash(id, pid, port).await;
                false
            }
        }
    }

    async fn record_crash(
        &self,
        id: InstanceId,
        pid: Option<u32>,
        port: u16,
    ) -> Option<InstanceRecord> {
        warn!(instance = %id, pid, port, "worker exited on its own");
        // A start that raced ahead owns the record now
        let result = self
            .store
            .update(id, move |r| {
                if r.pid == pid {
                    r.fail("worker exited unexpectedly");
                    r.pid = None;
                }
            })
            .await;
        match result {
            Ok(updated) => updated,
            Err(e) => {
                warn!(instance = %id, error = %e, "could not record worker exit");
                None
            }
        }
    }

    /// Lifecycle lock of an existing instance
    async fn slot(&self, id: InstanceId) -> Result<Arc<Mutex<()>>> {
        self.record(id).await?;
        Ok(self.slot_entry(id))
    }

    fn slot_entry(&self, id: InstanceId) -> Arc<Mutex<()>> {
        self.slots.entry(id).or_default().clone()
    }

    /// Drop the lock of an instance that vanished while we waited for it
    fn release_if_gone<T>(&self, id: InstanceId, result: Result<T>) -> Result<T> {
        if matches!(result, Err(SupervisorError::NotFound(_))) {
            self.slots.remove(&id);
        }
        result
    }

    async fn start_locked(&self, id: InstanceId) -> Result<StartOutcome> {
        let record = self.record(id).await?;

        if self.worker_live(id).await {
            debug!(instance = %id, "start requested but worker already running");
            return Ok(StartOutcome::AlreadyRunning);
        }

        let port = record.port.unwrap_or_else(|| self.ports.next());
        let pid = self.spawn_worker(&record, port).await?;

        self.store
            .update(id, |r| {
                r.set_status(InstanceStatus::Running);
                r.port = Some(port);
                r.pid = pid;
            })
            .await?;

        info!(instance = %id, port, pid, "instance started");
        Ok(StartOutcome::Started { port, pid })
    }

    async fn stop_locked(&self, id: InstanceId) -> Result<()> {
        self.record(id).await?;
        if !self.worker_live(id).await {
            return Err(SupervisorError::NotRunning(id));
        }
        let Some(mut worker) = self.registry.take(id) else {
            return Err(SupervisorError::NotRunning(id));
        };

        if let Err(e) = self.halt(id, &mut worker).await {
            self.registry.insert(id, worker);
            return Err(e);
        }

        self.store
            .update(id, |r| r.set_status(InstanceStatus::Stopped))
            .await?;
        info!(instance = %id, "instance stopped");
        Ok(())
    }

    async fn restart_locked(&self, id: InstanceId) -> Result<StartOutcome> {
        self.record(id).await?;
        if self.worker_live(id).await {
            self.stop_locked(id).await?;
            tokio::time::sleep(self.config.restart_delay).await;
        }
        self.start_locked(id).await
    }

    async fn delete_locked(&self, id: InstanceId) -> Result<()> {
        self.record(id).await?;

        if let Some(mut worker) = self.registry.take(id) {
            if let Err(e) = self.halt(id, &mut worker).await {
                warn!(instance = %id, error = %e, "could not stop worker during delete");
            }
        }

        let dir = self.workdir_of(id);
        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => debug!(instance = %id, dir = %dir.display(), "removed working directory"),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(source) => {
                // The record stays for a retry but no worker is tracked any more
                self.store
                    .update(id, |r| {
                        if matches!(r.status, InstanceStatus::Running | InstanceStatus::Starting) {
                            r.set_status(InstanceStatus::Stopped);
                        }
                    })
                    .await?;
                return Err(SupervisorError::Workspace { id, source });
            }
        }

        self.store.remove(id).await?;
        Ok(())
    }

    /// Shutdown path: stop whatever is tracked and mark the record stopped
    async fn retire(&self, id: InstanceId) -> Result<()> {
        let slot = self.slot_entry(id);
        let _guard = slot.lock().await;

        if let Some(mut worker) = self.registry.take(id) {
            self.halt(id, &mut worker).await?;
        }
        self.store
            .update(id, |r| r.set_status(InstanceStatus::Stopped))
            .await?;
        Ok(())
    }

    /// Graceful terminate, bounded wait, then forced kill
    async fn halt(&self, id: InstanceId, worker: &mut TrackedWorker) -> Result<()> {
        let process = &mut worker.process;
        let pid = process.pid();

        if let Err(e) = process.terminate() {
            debug!(instance = %id, pid, error = %e, "terminate signal failed");
        }

        match process.wait_timeout(self.config.stop_timeout).await {
            Ok(true) => return Ok(()),
            Ok(false) => {
                warn!(instance = %id, pid, timeout = ?self.config.stop_timeout, "worker ignored terminate, killing");
            }
            Err(e) => warn!(instance = %id, pid, error = %e, "waiting on worker failed, killing"),
        }

        process
            .kill()
            .await
            .map_err(|e| SupervisorError::Signal {
                id,
                message: e.to_string(),
            })
    }

    fn launch_spec(&self, record: &InstanceRecord, port: u16) -> LaunchSpec {
        LaunchSpec {
            program: self.config.worker_program.clone(),
            args: vec![
                self.config.worker_script.clone(),
                record.id.to_string(),
                record.phone_number.clone(),
                port.to_string(),
            ],
            workdir: self.config.worker_dir.clone(),
            label: record.id.to_string(),
        }
    }

    /// Launch and track a worker. On failure the record moves to `error`.
    async fn spawn_worker(&self, record: &InstanceRecord, port: u16) -> Result<Option<u32>> {
        let id = record.id;
        let spec = self.launch_spec(record, port);

        let mut process = match self.launcher.spawn(&spec).await {
            Ok(process) => process,
            Err(e) => {
                return Err(self
                    .record_spawn_failure(id, format!("failed to launch worker: {e}"))
                    .await)
            }
        };

        if process
            .wait_timeout(self.config.spawn_grace)
            .await
            .unwrap_or(false)
        {
            return Err(self
                .record_spawn_failure(id, "worker exited immediately after launch".to_string())
                .await);
        }

        let pid = process.pid();
        self.registry.insert(id, TrackedWorker { process, port });
        debug!(instance = %id, pid, port, "worker launched");
        Ok(pid)
    }

    async fn record_spawn_failure(&self, id: InstanceId, message: String) -> SupervisorError {
        warn!(instance = %id, %message, "worker spawn failed");
        let recorded = message.clone();
        if let Err(e) = self.store.update(id, move |r| r.fail(recorded)).await {
            warn!(instance = %id, error = %e, "could not record spawn failure");
        }
        SupervisorError::SpawnFailure { id, message }
    }
}
