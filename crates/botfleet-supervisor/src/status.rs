//! Status aggregation
//!
//! Merges what a worker reports about itself with the durable record.
//! This is a read-time overlay only: nothing polled here is ever written
//! back to the store.

use crate::launcher::ProcessLauncher;
use botfleet_core::{InstanceId, InstanceRecord, InstanceStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::time::Duration;
use tracing::debug;

/// Status reported for a worker that could not be reached
pub const OFFLINE: &str = "offline";

/// Body of a worker's `GET /status`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerStatus {
    pub status: String,
    #[serde(default)]
    pub pairing_code: Option<String>,
    #[serde(default)]
    pub pairing_code_valid: bool,
    #[serde(default)]
    pub pairing_code_remaining_seconds: i64,
    #[serde(default)]
    pub pairing_code_expires_at: Option<JsonValue>,
    #[serde(default)]
    pub user: Option<JsonValue>,
}

/// Effective status of an instance at read time
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LiveStatus {
    pub status: String,
    pub pairing_code: Option<String>,
    pub pairing_code_valid: bool,
    pub remaining_seconds: i64,
    pub expires_at: Option<JsonValue>,
    pub connected_user: Option<JsonValue>,
}

impl LiveStatus {
    /// Worker could not be reached or answered garbage
    pub fn offline() -> Self {
        Self::bare(OFFLINE.to_string())
    }

    /// No worker: fall back to the last persisted status
    pub fn durable(status: InstanceStatus) -> Self {
        Self::bare(status.to_string())
    }

    fn bare(status: String) -> Self {
        Self {
            status,
            pairing_code: None,
            pairing_code_valid: false,
            remaining_seconds: 0,
            expires_at: None,
            connected_user: None,
        }
    }

    pub fn is_offline(&self) -> bool {
        self.status == OFFLINE
    }
}

impl From<WorkerStatus> for LiveStatus {
    fn from(reported: WorkerStatus) -> Self {
        Self {
            status: reported.status,
            pairing_code: reported.pairing_code,
            pairing_code_valid: reported.pairing_code_valid,
            remaining_seconds: reported.pairing_code_remaining_seconds,
            expires_at: reported.pairing_code_expires_at,
            connected_user: reported.user,
        }
    }
}

/// Instance as returned by `list` and `get`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InstanceView {
    pub id: InstanceId,
    pub name: String,
    pub phone_number: String,
    pub owner_id: Option<String>,
    pub port: Option<u16>,
    pub status: String,
    pub pairing_code: Option<String>,
    pub connected_user: Option<JsonValue>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl InstanceView {
    pub fn merge(record: InstanceRecord, live: LiveStatus) -> Self {
        Self {
            id: record.id,
            name: record.name,
            phone_number: record.phone_number,
            owner_id: record.owner_id,
            port: record.port,
            status: live.status,
            pairing_code: live.pairing_code,
            connected_user: live.connected_user,
            created_at: record.created_at,
            updated_at: record.updated_at,
            error: record.error,
        }
    }
}

/// Pairing data for one instance
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PairingInfo {
    pub instance_id: InstanceId,
    pub pairing_code: Option<String>,
    pub pairing_code_valid: bool,
    pub pairing_code_remaining_seconds: i64,
    pub pairing_code_expires_at: Option<JsonValue>,
    pub status: String,
}

impl PairingInfo {
    pub fn merge(instance_id: InstanceId, live: LiveStatus) -> Self {
        Self {
            instance_id,
            pairing_code: live.pairing_code,
            pairing_code_valid: live.pairing_code_valid,
            pairing_code_remaining_seconds: live.remaining_seconds,
            pairing_code_expires_at: live.expires_at,
            status: live.status,
        }
    }
}

/// Polls worker status endpoints
pub struct StatusAggregator {
    client: reqwest::Client,
    host: String,
    timeout: Duration,
}

impl StatusAggregator {
    pub fn new(host: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            host: host.into(),
            timeout,
        }
    }

    /// Effective status for `record`.
    ///
    /// `tracked_port` is the port of a live worker this supervisor owns.
    /// Without one, the recorded pid is probed: if nothing holds it the
    /// durable status is authoritative and the worker is not polled.
    /// An unreachable worker reads as `offline`, except while the record is
    /// still `starting`.
    pub async fn query(
        &self,
        record: &InstanceRecord,
        tracked_port: Option<u16>,
        launcher: &dyn ProcessLauncher,
    ) -> LiveStatus {
        let port = match tracked_port {
            Some(port) => Some(port),
            None if record.pid.is_some_and(|pid| launcher.is_alive(pid)) => record.port,
            None => None,
        };

        let Some(port) = port else {
            return LiveStatus::durable(record.status);
        };

        let live = self.poll(port).await;
        // Not listening yet is expected while the worker boots
        if live.is_offline() && record.status == InstanceStatus::Starting {
            return LiveStatus::durable(InstanceStatus::Starting);
        }
        live
    }

    /// Fetch `/status` from the worker on `port`. Never fails: any transport
    /// or decoding problem comes back as [`LiveStatus::offline`].
    pub async fn poll(&self, port: u16) -> LiveStatus {
        let url = format!("http://{}:{}/status", self.host, port);

        let response = match self
            .client
            .get(&url)
            .timeout(self.timeout)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
        {
            Ok(response) => response,
            Err(e) => {
                debug!(%url, error = %e, "worker unreachable");
                return LiveStatus::offline();
            }
        };

        match response.json::<WorkerStatus>().await {
            Ok(reported) => reported.into(),
            Err(e) => {
                debug!(%url, error = %e, "malformed worker status");
                LiveStatus::offline()
            }
        }
    }
}
