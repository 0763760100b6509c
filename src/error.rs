//! Error types for the orchestrator.
//!
//! `DeployError` is what callers see. Runner, adapter and history failures
//! have their own types and are folded into it by the coordinator.

use thiserror::Error;
use uuid::Uuid;

use crate::domain::TargetStatus;

/// Errors returned by coordinator operations
#[derive(Debug, Error)]
pub enum DeployError {
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("Target already registered: {0}")]
    DuplicateTarget(String),

    #[error("Target {0} already has a deployment in progress")]
    AlreadyInProgress(String),

    #[error("Target {target_id} is {status}: {reason}")]
    InvalidState {
        target_id: String,
        status: TargetStatus,
        reason: String,
    },

    #[error("Target {target_id}: step '{step}' failed: {message}")]
    StepFailed {
        target_id: String,
        step: String,
        message: String,
    },

    #[error("Target {target_id}: provider '{provider}' failed: {message}")]
    AdapterFailed {
        target_id: String,
        provider: String,
        message: String,
        logs: Vec<String>,
    },

    #[error("Target {0} has no previous successful deployment to roll back to")]
    NoPreviousDeployment(String),

    #[error("Deployment of target {0} was cancelled")]
    Cancelled(String),

    #[error("Operation on target {target_id} finished as {status} before the cancellation took effect")]
    CancelTooLate {
        target_id: String,
        status: TargetStatus,
    },

    #[error("History store error: {0}")]
    History(#[from] HistoryError),
}

impl DeployError {
    pub fn target_not_found(id: impl Into<String>) -> Self {
        Self::NotFound {
            kind: "Target",
            id: id.into(),
        }
    }

    pub fn deployment_not_found(id: Uuid) -> Self {
        Self::NotFound {
            kind: "Deployment",
            id: id.to_string(),
        }
    }
}

/// A build step's runner reported failure
#[derive(Debug, Clone, Error)]
pub enum StepError {
    #[error("{0}")]
    Failed(String),

    #[error("command exited with code {code}: {stderr}")]
    Exit { code: i32, stderr: String },

    #[error("timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("I/O error: {0}")]
    Io(String),
}

impl From<std::io::Error> for StepError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

/// A provider adapter could not deploy or roll back
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct AdapterError {
    pub message: String,

    /// Log lines the adapter produced before failing
    pub logs: Vec<String>,
}

impl AdapterError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            logs: Vec::new(),
        }
    }

    pub fn with_logs(mut self, logs: Vec<String>) -> Self {
        self.logs = logs;
        self
    }
}

/// Errors from a history backend
#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Entry already exists: {0}")]
    Duplicate(Uuid),
}
