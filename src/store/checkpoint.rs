// SPDX-License-Identifier: MIT

//! File-backed checkpoint store.
//!
//! The checkpoint is a single-field JSON record committed to the repo by
//! the CI job (`{"last_sync_date": "..."}`), so the layout is stable.

use crate::error::SyncError;
use crate::models::SyncCheckpoint;
use crate::services::sync::CheckpointStore;
use chrono::{DateTime, Utc};
use std::path::PathBuf;

/// Checkpoint persisted as a small JSON file.
#[derive(Debug, Clone)]
pub struct FileCheckpointStore {
    path: PathBuf,
}

impl FileCheckpointStore {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }
}

impl CheckpointStore for FileCheckpointStore {
    fn load(&self) -> Result<Option<DateTime<Utc>>, SyncError> {
        if !self.path.exists() {
            return Ok(None);
        }
        let raw = std::fs::read_to_string(&self.path)
            .map_err(|e| SyncError::Checkpoint(format!("read {}: {}", self.path.display(), e)))?;
        let checkpoint: SyncCheckpoint = serde_json::from_str(&raw)
            .map_err(|e| SyncError::Checkpoint(format!("parse {}: {}", self.path.display(), e)))?;
        Ok(Some(checkpoint.last_sync_date))
    }

    fn save(&self, last_sync_date: DateTime<Utc>) -> Result<(), SyncError> {
        let checkpoint = SyncCheckpoint { last_sync_date };
        let json = serde_json::to_string(&checkpoint)
            .map_err(|e| SyncError::Checkpoint(format!("serialize checkpoint: {}", e)))?;
        std::fs::write(&self.path, json)
            .map_err(|e| SyncError::Checkpoint(format!("write {}: {}", self.path.display(), e)))?;
        Ok(())
    }
}
