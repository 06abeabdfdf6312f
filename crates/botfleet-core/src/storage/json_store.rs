//! JSON file snapshot store
//!
//! The whole mapping lives in one flat JSON document keyed by instance id.
//! Writes go to a sibling temp file that is renamed over the target.

use super::{Snapshot, SnapshotStore};
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::warn;

/// JSON document backed snapshot store
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "instances.json".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[async_trait]
impl SnapshotStore for JsonFileStore {
    async fn load(&self) -> Snapshot {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Snapshot::new(),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "unreadable instance store, starting empty");
                return Snapshot::new();
            }
        };

        match serde_json::from_slice(&bytes) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "corrupt instance store, starting empty");
                Snapshot::new()
            }
        }
    }

    async fn save(&self, snapshot: &Snapshot) -> Result<()> {
        let encoded = serde_json::to_vec_pretty(snapshot).context("encoding instance store")?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("creating {}", parent.display()))?;
        }

        let tmp = self.temp_path();
        tokio::fs::write(&tmp, &encoded)
            .await
            .with_context(|| format!("writing {}", tmp.display()))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .with_context(|| format!("replacing {}", self.path.display()))?;

        Ok(())
    }
}
