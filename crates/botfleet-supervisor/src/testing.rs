//! In-memory process launcher
//!
//! Drives the supervisor without touching real OS processes. Pids are
//! handed out from a counter and "alive" is just set membership.

use crate::launcher::{LaunchSpec, ProcessLauncher, WorkerProcess};
use async_trait::async_trait;
use dashmap::DashSet;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

const FIRST_FAKE_PID: u32 = 10_000;

struct FakeState {
    next_pid: AtomicU32,
    alive: DashSet<u32>,
    launches: Mutex<Vec<LaunchSpec>>,
    refuse_spawn: AtomicBool,
    exit_on_spawn: AtomicBool,
    ignore_terminate: AtomicBool,
    unreadable_exit: AtomicBool,
}

/// Launcher whose workers exist only in memory
#[derive(Clone)]
pub struct FakeLauncher {
    state: Arc<FakeState>,
}

impl FakeLauncher {
    pub fn new() -> Self {
        Self {
            state: Arc::new(FakeState {
                next_pid: AtomicU32::new(FIRST_FAKE_PID),
                alive: DashSet::new(),
                launches: Mutex::new(Vec::new()),
                refuse_spawn: AtomicBool::new(false),
                exit_on_spawn: AtomicBool::new(false),
                ignore_terminate: AtomicBool::new(false),
                unreadable_exit: AtomicBool::new(false),
            }),
        }
    }

    /// Make `spawn` fail as if the OS refused to create the process
    pub fn set_refuse_spawn(&self, refuse: bool) {
        self.state.refuse_spawn.store(refuse, Ordering::SeqCst);
    }

    /// Make spawned workers exit straight away
    pub fn set_exit_on_spawn(&self, exit: bool) {
        self.state.exit_on_spawn.store(exit, Ordering::SeqCst);
    }

    /// Make workers spawned from now on ignore the graceful terminate signal
    pub fn set_ignore_terminate(&self, ignore: bool) {
        self.state.ignore_terminate.store(ignore, Ordering::SeqCst);
    }

    /// Make exit status checks fail with an I/O error
    pub fn set_unreadable_exit(&self, unreadable: bool) {
        self.state.unreadable_exit.store(unreadable, Ordering::SeqCst);
    }

    /// Simulate a worker dying on its own
    pub fn crash(&self, pid: u32) {
        self.state.alive.remove(&pid);
    }

    /// Pretend some unrelated process holds this pid
    pub fn mark_alive(&self, pid: u32) {
        self.state.alive.insert(pid);
    }

    pub fn alive_count(&self) -> usize {
        self.state.alive.len()
    }

    /// Every spec passed to `spawn`, including refused ones
    pub fn launches(&self) -> Vec<LaunchSpec> {
        self.state
            .launches
            .lock()
            .map(|l| l.clone())
            .unwrap_or_default()
    }
}

impl Default for FakeLauncher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProcessLauncher for FakeLauncher {
    async fn spawn(&self, spec: &LaunchSpec) -> io::Result<Box<dyn WorkerProcess>> {
        if let Ok(mut launches) = self.state.launches.lock() {
            launches.push(spec.clone());
        }

        if self.state.refuse_spawn.load(Ordering::SeqCst) {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("{}: no such file or directory", spec.program.display()),
            ));
        }

        let pid = self.state.next_pid.fetch_add(1, Ordering::SeqCst);
        if !self.state.exit_on_spawn.load(Ordering::SeqCst) {
            self.state.alive.insert(pid);
        }

        Ok(Box::new(FakeProcess {
            pid,
            state: self.state.clone(),
            ignore_terminate: self.state.ignore_terminate.load(Ordering::SeqCst),
        }))
    }

    fn is_alive(&self, pid: u32) -> bool {
        self.state.alive.contains(&pid)
    }
}

struct FakeProcess {
    pid: u32,
    state: Arc<FakeState>,
    ignore_terminate: bool,
}

impl FakeProcess {
    fn alive(&self) -> bool {
        self.state.alive.contains(&self.pid)
    }
}

#[async_trait]
impl WorkerProcess for FakeProcess {
    fn pid(&self) -> Option<u32> {
        Some(self.pid)
    }

    fn terminate(&mut self) -> io::Result<()> {
        if !self.ignore_terminate {
            self.state.alive.remove(&self.pid);
        }
        Ok(())
    }

    async fn kill(&mut self) -> io::Result<()> {
        self.state.alive.remove(&self.pid);
        Ok(())
    }

    async fn wait_timeout(&mut self, timeout: Duration) -> io::Result<bool> {
        if !self.alive() {
            return Ok(true);
        }
        tokio::time::sleep(timeout).await;
        Ok(!self.alive())
    }

    fn try_exited(&mut self) -> io::Result<bool> {
        if self.state.unreadable_exit.load(Ordering::SeqCst) {
            return Err(io::Error::other("exit status unavailable"));
        }
        Ok(!self.alive())
    }
}
