//! Instance records
//!
//! An instance is one worker process bound to one phone number. The record
//! is the durable half of its state; the live half lives in the supervisor.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Unique identifier for an instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstanceId(pub Uuid);

impl InstanceId {
    /// Create a new unique instance ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for InstanceId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for InstanceId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Last known lifecycle status of an instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstanceStatus {
    Starting,
    Running,
    Stopped,
    Error,
}

impl InstanceStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Stopped => "stopped",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for InstanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// User-supplied metadata for a new instance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewInstance {
    pub name: String,
    pub phone_number: String,
    #[serde(default)]
    pub owner_id: Option<String>,
}

/// Durable record of an instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceRecord {
    pub id: InstanceId,
    pub name: String,
    pub phone_number: String,
    #[serde(default)]
    pub owner_id: Option<String>,
    #[serde(default)]
    pub port: Option<u16>,
    pub status: InstanceStatus,
    /// PID of the last spawned worker. Only a liveness hint, never proof of ownership.
    #[serde(default)]
    pub pid: Option<u32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl InstanceRecord {
    /// Create a fresh record in the `starting` state
    pub fn new(id: InstanceId, details: NewInstance, port: u16) -> Self {
        let now = Utc::now();
        Self {
            id,
            name: details.name,
            phone_number: details.phone_number,
            owner_id: details.owner_id,
            port: Some(port),
            status: InstanceStatus::Starting,
            pid: None,
            created_at: now,
            updated_at: now,
            error: None,
        }
    }

    /// Move to a non-error status, clearing any previous error message
    pub fn set_status(&mut self, status: InstanceStatus) {
        self.status = status;
        if status != InstanceStatus::Error {
            self.error = None;
        }
    }

    /// Move to `error`, keeping the message for display
    pub fn fail(&mut self, message: impl Into<String>) {
        self.status = InstanceStatus::Error;
        self.error = Some(message.into());
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> InstanceRecord {
        InstanceRecord::new(
            InstanceId::new(),
            NewInstance {
                name: "support".to_string(),
                phone_number: "1555000".to_string(),
                owner_id: None,
            },
            4001,
        )
    }

    #[test]
    fn test_new_record_is_starting() {
        let record = sample();
        assert_eq!(record.status, InstanceStatus::Starting);
        assert_eq!(record.port, Some(4001));
        assert!(record.pid.is_none());
        assert_eq!(record.created_at, record.updated_at);
    }

    #[test]
    fn test_error_cleared_on_recovery() {
        let mut record = sample();
        record.fail("spawn refused");
        assert_eq!(record.status, InstanceStatus::Error);
        assert_eq!(record.error.as_deref(), Some("spawn refused"));

        record.set_status(InstanceStatus::Running);
        assert!(record.error.is_none());
    }

    #[test]
    fn test_status_serializes_lowercase() {
        let json = serde_json::to_string(&InstanceStatus::Stopped).unwrap();
        assert_eq!(json, "\"stopped\"");
    }

    #[test]
    fn test_id_round_trips_through_str() {
        let id = InstanceId::new();
        let parsed: InstanceId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
        assert!("not-an-id".parse::<InstanceId>().is_err());
    }
}
