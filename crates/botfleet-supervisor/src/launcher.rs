//! Process launching
//!
//! The supervisor never touches OS processes directly. It goes through a
//! [`ProcessLauncher`], so the lifecycle state machine can be driven by the
//! in-memory launcher in [`crate::testing`] as well as by [`OsLauncher`].

use async_trait::async_trait;
use std::io;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tracing::{debug, warn};

/// Everything needed to launch one worker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSpec {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub workdir: PathBuf,
    /// Tag attached to forwarded worker output
    pub label: String,
}

/// Handle to a spawned worker
#[async_trait]
pub trait WorkerProcess: Send + Sync {
    /// OS process id, `None` once the process has been reaped
    fn pid(&self) -> Option<u32>;

    /// Ask the worker to exit (SIGTERM on unix)
    fn terminate(&mut self) -> io::Result<()>;

    /// Force the worker down and reap it
    async fn kill(&mut self) -> io::Result<()>;

    /// Wait up to `timeout` for the worker to exit. Returns whether it did.
    async fn wait_timeout(&mut self, timeout: Duration) -> io::Result<bool>;

    /// Non-blocking exit check
    fn try_exited(&mut self) -> io::Result<bool>;
}

/// Spawns workers and probes arbitrary pids for liveness
#[async_trait]
pub trait ProcessLauncher: Send + Sync {
    async fn spawn(&self, spec: &LaunchSpec) -> io::Result<Box<dyn WorkerProcess>>;

    /// Whether some process with this pid exists. Says nothing about who owns it.
    fn is_alive(&self, pid: u32) -> bool;
}

/// Launcher backed by real OS processes
#[derive(Debug, Clone, Copy, Default)]
pub struct OsLauncher;

#[async_trait]
impl ProcessLauncher for OsLauncher {
    async fn spawn(&self, spec: &LaunchSpec) -> io::Result<Box<dyn WorkerProcess>> {
        let mut child = Command::new(&spec.program)
            .args(&spec.args)
            .current_dir(&spec.workdir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        // Drain both pipes so a chatty worker never blocks on a full buffer
        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(forward_output(spec.label.clone(), stdout, OutputStream::Stdout));
        }
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(forward_output(spec.label.clone(), stderr, OutputStream::Stderr));
        }

        Ok(Box::new(OsProcess { child }))
    }

    fn is_alive(&self, pid: u32) -> bool {
        pid_exists(pid)
    }
}

#[derive(Clone, Copy)]
enum OutputStream {
    Stdout,
    Stderr,
}

async fn forward_output<R>(label: String, reader: R, stream: OutputStream)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let mut lines = BufReader::new(reader).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => match stream {
                OutputStream::Stdout => debug!(instance = %label, "{line}"),
                OutputStream::Stderr => warn!(instance = %label, "{line}"),
            },
            Ok(None) => break,
            Err(e) => {
                debug!(instance = %label, error = %e, "worker output closed");
                break;
            }
        }
    }
}

struct OsProcess {
    child: Child,
}

#[async_trait]
impl WorkerProcess for OsProcess {
    fn pid(&self) -> Option<u32> {
        self.child.id()
    }

    #[cfg(unix)]
    fn terminate(&mut self) -> io::Result<()> {
        use nix::sys::signal::{self, Signal};
        use nix::unistd::Pid;

        let Some(pid) = self.child.id() else {
            return Ok(());
        };
        let raw = i32::try_from(pid).map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
        signal::kill(Pid::from_raw(raw), Signal::SIGTERM)?;
        Ok(())
    }

    #[cfg(not(unix))]
    fn terminate(&mut self) -> io::Result<()> {
        self.child.start_kill()
    }

    async fn kill(&mut self) -> io::Result<()> {
        self.child.kill().await
    }

    async fn wait_timeout(&mut self, timeout: Duration) -> io::Result<bool> {
        match tokio::time::timeout(timeout, self.child.wait()).await {
            Ok(status) => status.map(|_| true),
            Err(_) => Ok(false),
        }
    }

    fn try_exited(&mut self) -> io::Result<bool> {
        Ok(self.child.try_wait()?.is_some())
    }
}

#[cfg(unix)]
fn pid_exists(pid: u32) -> bool {
    use nix::errno::Errno;
    use nix::sys::signal;
    use nix::unistd::Pid;

    // pid 0 would address our own process group
    let Ok(raw) = i32::try_from(pid) else {
        return false;
    };
    if raw <= 0 {
        return false;
    }

    // Null signal: existence check only. EPERM means it exists but is not ours.
    match signal::kill(Pid::from_raw(raw), None) {
        Ok(()) | Err(Errno::EPERM) => true,
        Err(_) => false,
    }
}

#[cfg(not(unix))]
fn pid_exists(_pid: u32) -> bool {
    false
}
