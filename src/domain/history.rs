//! Deployment history entries.
//!
//! Entries are immutable records of completed deploy and rollback attempts.
//! Rollback selection reads them back in order, so nothing ever edits or
//! removes an entry once it has been appended.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One completed deployment attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeploymentHistoryEntry {
    /// Unique identifier for this entry
    pub id: Uuid,

    /// Target the attempt ran against
    pub target_id: String,

    /// Artifact that was (or would have been) deployed
    pub artifact_ref: Option<String>,

    /// Outcome
    pub status: HistoryStatus,

    /// When the attempt finished
    pub timestamp: DateTime<Utc>,

    /// Time taken in milliseconds
    pub duration_ms: u64,

    /// Total artifact size
    pub size_bytes: Option<u64>,

    /// URL reported by the adapter on success
    #[serde(default)]
    pub url: Option<String>,

    /// For rollbacks: the entry whose artifact was restored
    #[serde(default)]
    pub restored_from: Option<Uuid>,

    /// Error message if failed
    #[serde(default)]
    pub error: Option<String>,

    /// Ordered log lines (pipeline and adapter)
    pub logs: Vec<String>,
}

impl DeploymentHistoryEntry {
    /// Create a new entry with the current timestamp
    pub fn new(target_id: impl Into<String>, status: HistoryStatus, duration_ms: u64) -> Self {
        Self {
            id: Uuid::new_v4(),
            target_id: target_id.into(),
            artifact_ref: None,
            status,
            timestamp: Utc::now(),
            duration_ms,
            size_bytes: None,
            url: None,
            restored_from: None,
            error: None,
            logs: Vec::new(),
        }
    }

    pub fn with_artifact(mut self, artifact_ref: impl Into<String>, size_bytes: Option<u64>) -> Self {
        self.artifact_ref = Some(artifact_ref.into());
        self.size_bytes = size_bytes;
        self
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    pub fn with_logs(mut self, logs: Vec<String>) -> Self {
        self.logs = logs;
        self
    }

    pub fn restored_from(mut self, entry: Uuid) -> Self {
        self.restored_from = Some(entry);
        self
    }
}

/// Outcome of a recorded attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryStatus {
    Success,
    Failed,
    Rollback,
}

impl fmt::Display for HistoryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            HistoryStatus::Success => "success",
            HistoryStatus::Failed => "failed",
            HistoryStatus::Rollback => "rollback",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_serialization() {
        let entry = DeploymentHistoryEntry::new("t1", HistoryStatus::Success, 1200)
            .with_artifact("rel-abc-123", Some(42))
            .with_url("https://t1.example")
            .with_logs(vec!["[install] ok".to_string()]);

        let json = serde_json::to_string(&entry).unwrap();
        let parsed: DeploymentHistoryEntry = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed, entry);
        assert!(json.contains("\"status\":\"success\""));
    }

    #[test]
    fn test_entry_with_error() {
        let entry = DeploymentHistoryEntry::new("t1", HistoryStatus::Failed, 5)
            .with_error("step 'test' failed");

        assert_eq!(entry.error.as_deref(), Some("step 'test' failed"));
        assert!(entry.artifact_ref.is_none());
    }
}
