//! Supervisor error taxonomy

use botfleet_core::InstanceId;
use thiserror::Error;

/// Errors surfaced by lifecycle operations.
///
/// An unreachable worker is not an error: status reads degrade to `offline`.
#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("instance {0} not found")]
    NotFound(InstanceId),

    #[error("instance {0} is not running")]
    NotRunning(InstanceId),

    #[error("failed to start instance {id}: {message}")]
    SpawnFailure { id: InstanceId, message: String },

    #[error("failed to stop instance {id}: {message}")]
    Signal { id: InstanceId, message: String },

    #[error("failed to remove working directory of instance {id}: {source}")]
    Workspace {
        id: InstanceId,
        #[source]
        source: std::io::Error,
    },

    #[error("instance store write failed: {0}")]
    Store(#[from] anyhow::Error),
}

pub type Result<T, E = SupervisorError> = std::result::Result<T, E>;
