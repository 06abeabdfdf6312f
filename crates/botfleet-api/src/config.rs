//! Configuration for the botfleet server
//!
//! CLI arguments with environment variable fallbacks, using clap.

use botfleet_supervisor::SupervisorConfig;
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Botfleet - supervisor for a fleet of messaging bot workers
#[derive(Parser, Debug, Clone)]
#[command(name = "botfleet")]
#[command(about = "Create, run and inspect bot worker processes over HTTP")]
pub struct Args {
    /// Address to listen on
    #[arg(long, env = "BOTFLEET_LISTEN", default_value = "0.0.0.0:8000")]
    pub listen: SocketAddr,

    /// JSON document holding every instance record
    #[arg(long, env = "BOTFLEET_STATE_FILE", default_value = "instances.json")]
    pub state_file: PathBuf,

    /// Program that runs a worker
    #[arg(long, env = "BOTFLEET_WORKER_PROGRAM", default_value = "node")]
    pub worker_program: PathBuf,

    /// Script handed to the worker program before id, phone number and port
    #[arg(long, env = "BOTFLEET_WORKER_SCRIPT", default_value = "instance.js")]
    pub worker_script: String,

    /// Bot runtime directory, used as every worker's working directory
    #[arg(long, env = "BOTFLEET_WORKER_DIR", default_value = "bot")]
    pub worker_dir: PathBuf,

    /// Per-instance data directories (defaults to <worker-dir>/instances)
    #[arg(long, env = "BOTFLEET_INSTANCES_DIR")]
    pub instances_dir: Option<PathBuf>,

    /// Worker ports are issued above this number
    #[arg(long, env = "BOTFLEET_BASE_PORT", default_value_t = 4000)]
    pub base_port: u16,

    /// Host worker status endpoints listen on
    #[arg(long, env = "BOTFLEET_STATUS_HOST", default_value = "localhost")]
    pub status_host: String,

    /// Timeout for one worker status poll, in seconds
    #[arg(long, env = "BOTFLEET_STATUS_TIMEOUT_SECS", default_value_t = 5)]
    pub status_timeout_secs: u64,

    /// Grace period between terminate and kill, in seconds
    #[arg(long, env = "BOTFLEET_STOP_TIMEOUT_SECS", default_value_t = 5)]
    pub stop_timeout_secs: u64,

    /// Pause between stop and start during a restart, in milliseconds
    #[arg(long, env = "BOTFLEET_RESTART_DELAY_MS", default_value_t = 2000)]
    pub restart_delay_ms: u64,

    /// Exit within this many milliseconds of launch counts as a failed spawn
    #[arg(long, env = "BOTFLEET_SPAWN_GRACE_MS", default_value_t = 500)]
    pub spawn_grace_ms: u64,

    /// Log level (trace, debug, info, warn, error), overridden by RUST_LOG
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Emit logs as JSON lines
    #[arg(long, env = "LOG_JSON", default_value = "false")]
    pub log_json: bool,
}

impl Args {
    pub fn supervisor_config(&self) -> SupervisorConfig {
        let mut config = SupervisorConfig {
            worker_program: self.worker_program.clone(),
            worker_script: self.worker_script.clone(),
            base_port: self.base_port,
            status_host: self.status_host.clone(),
            status_timeout: Duration::from_secs(self.status_timeout_secs),
            stop_timeout: Duration::from_secs(self.stop_timeout_secs),
            restart_delay: Duration::from_millis(self.restart_delay_ms),
            spawn_grace: Duration::from_millis(self.spawn_grace_ms),
            ..SupervisorConfig::default()
        }
        .with_worker_dir(&self.worker_dir);

        if let Some(dir) = &self.instances_dir {
            config.instances_dir = dir.clone();
        }
        config
    }
}
