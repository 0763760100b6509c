//! Target registry.
//!
//! Owns the set of deployment targets. Status changes go through `update`
//! or `try_begin`, which validate them against the target state machine
//! while holding the write lock. `release` is the one exception: it hands
//! an untouched target back to whatever status it had before `try_begin`.

use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::domain::{DeploymentTarget, TargetConfig, TargetStatus, TargetUpdate};
use crate::error::DeployError;

/// In-memory target registry with optional JSON snapshot persistence
#[derive(Debug, Default)]
pub struct TargetRegistry {
    targets: RwLock<HashMap<String, DeploymentTarget>>,
}

/// On-disk snapshot format
#[derive(Debug, Serialize, Deserialize)]
struct Snapshot {
    version: u32,
    targets: Vec<DeploymentTarget>,
}

impl TargetRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new idle target, returning its id
    pub async fn register(&self, config: TargetConfig) -> Result<String, DeployError> {
        let target = DeploymentTarget::new(config);
        let mut targets = self.targets.write().await;

        if targets.contains_key(&target.id) {
            return Err(DeployError::DuplicateTarget(target.id));
        }

        let id = target.id.clone();
        debug!(target_id = %id, provider = %target.provider, "Registered target");
        targets.insert(id.clone(), target);
        Ok(id)
    }

    /// Get a snapshot of a target
    pub async fn get(&self, id: &str) -> Result<DeploymentTarget, DeployError> {
        self.targets
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| DeployError::target_not_found(id))
    }

    /// List all targets (order is unspecified)
    pub async fn list(&self) -> Vec<DeploymentTarget> {
        self.targets.read().await.values().cloned().collect()
    }

    /// Apply a partial update to a target
    pub async fn update(&self, id: &str, update: TargetUpdate) -> Result<(), DeployError> {
        let mut targets = self.targets.write().await;
        let target = targets
            .get_mut(id)
            .ok_or_else(|| DeployError::target_not_found(id))?;

        if let Some(next) = update.status {
            if !target.status.can_transition_to(next) {
                return Err(DeployError::InvalidState {
                    target_id: id.to_string(),
                    status: target.status,
                    reason: format!("cannot transition to {}", next),
                });
            }
        }

        target.apply(update);
        Ok(())
    }

    /// Atomically move a target into `deploying`.
    ///
    /// Fails with `AlreadyInProgress` if another operation holds the target.
    /// Returns the target as it was before the transition.
    pub async fn try_begin(&self, id: &str) -> Result<DeploymentTarget, DeployError> {
        let mut targets = self.targets.write().await;
        let target = targets
            .get_mut(id)
            .ok_or_else(|| DeployError::target_not_found(id))?;

        if target.status == TargetStatus::Deploying {
            return Err(DeployError::AlreadyInProgress(id.to_string()));
        }

        let before = target.clone();
        target.status = TargetStatus::Deploying;
        Ok(before)
    }

    /// Hand the gate back after an operation gave up without doing any work.
    ///
    /// Restores `previous` directly, bypassing the state machine, and only
    /// while the target is still `deploying`.
    pub async fn release(&self, id: &str, previous: TargetStatus) -> Result<(), DeployError> {
        let mut targets = self.targets.write().await;
        let target = targets
            .get_mut(id)
            .ok_or_else(|| DeployError::target_not_found(id))?;

        if target.status == TargetStatus::Deploying {
            target.status = previous;
        }
        Ok(())
    }

    /// Remove a target (not allowed while deploying)
    pub async fn remove(&self, id: &str) -> Result<DeploymentTarget, DeployError> {
        let mut targets = self.targets.write().await;
        let target = targets
            .get(id)
            .ok_or_else(|| DeployError::target_not_found(id))?;

        if target.status == TargetStatus::Deploying {
            return Err(DeployError::InvalidState {
                target_id: id.to_string(),
                status: target.status,
                reason: "cannot remove a target while a deployment is in flight".to_string(),
            });
        }

        targets
            .remove(id)
            .ok_or_else(|| DeployError::target_not_found(id))
    }

    /// Number of registered targets
    pub async fn len(&self) -> usize {
        self.targets.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.targets.read().await.is_empty()
    }

    /// Load a registry snapshot from disk (empty if the file is missing).
    ///
    /// Targets left `deploying` by a crashed process are restored as `failed`.
    pub async fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::new());
        }

        let content = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read targets: {}", path.display()))?;
        let snapshot: Snapshot =
            serde_json::from_str(&content).context("Failed to parse targets JSON")?;

        let mut targets = HashMap::new();
        for mut target in snapshot.targets {
            if target.status == TargetStatus::Deploying {
                warn!(target_id = %target.id, "Target was left deploying; marking failed");
                target.status = TargetStatus::Failed;
            }
            targets.insert(target.id.clone(), target);
        }

        Ok(Self {
            targets: RwLock::new(targets),
        })
    }

    /// Write a snapshot of all targets to disk
    pub async fn save(&self, path: &Path) -> Result<()> {
        let mut targets = self.list().await;
        targets.sort_by(|a, b| a.created_at.cmp(&b.created_at));

        let snapshot = Snapshot {
            version: 1,
            targets,
        };

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }

        let json = serde_json::to_string_pretty(&snapshot).context("Failed to serialize targets")?;
        fs::write(path, json)
            .await
            .with_context(|| format!("Failed to write targets: {}", path.display()))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ProviderKind;
    use tempfile::TempDir;

    fn site(id: &str) -> TargetConfig {
        TargetConfig::new("site", ProviderKind::StaticHost).with_id(id)
    }

    #[tokio::test]
    async fn test_register_and_get() {
        let registry = TargetRegistry::new();
        let id = registry.register(site("t1")).await.unwrap();

        assert_eq!(id, "t1");
        let target = registry.get("t1").await.unwrap();
        assert_eq!(target.status, TargetStatus::Idle);
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn test_duplicate_id_rejected() {
        let registry = TargetRegistry::new();
        registry.register(site("t1")).await.unwrap();

        let err = registry.register(site("t1")).await.unwrap_err();
        assert!(matches!(err, DeployError::DuplicateTarget(id) if id == "t1"));
    }

    #[tokio::test]
    async fn test_update_missing_target() {
        let registry = TargetRegistry::new();
        let err = registry
            .update("ghost", TargetUpdate::status(TargetStatus::Deploying))
            .await
            .unwrap_err();
        assert!(matches!(err, DeployError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_update_rejects_invalid_transition() {
        let registry = TargetRegistry::new();
        registry.register(site("t1")).await.unwrap();

        let err = registry
            .update("t1", TargetUpdate::status(TargetStatus::Deployed))
            .await
            .unwrap_err();
        assert!(matches!(err, DeployError::InvalidState { .. }));
        assert_eq!(registry.get("t1").await.unwrap().status, TargetStatus::Idle);
    }

    #[tokio::test]
    async fn test_try_begin_is_exclusive() {
        let registry = TargetRegistry::new();
        registry.register(site("t1")).await.unwrap();

        let before = registry.try_begin("t1").await.unwrap();
        assert_eq!(before.status, TargetStatus::Idle);

        let err = registry.try_begin("t1").await.unwrap_err();
        assert!(matches!(err, DeployError::AlreadyInProgress(_)));
    }

    #[tokio::test]
    async fn test_release_restores_previous_status() {
        let registry = TargetRegistry::new();
        registry.register(site("t1")).await.unwrap();
        registry.try_begin("t1").await.unwrap();
        registry
            .update("t1", TargetUpdate::deployed("https://t1.example".into(), uuid::Uuid::new_v4()))
            .await
            .unwrap();

        let before = registry.try_begin("t1").await.unwrap();
        registry.release("t1", before.status).await.unwrap();

        let target = registry.get("t1").await.unwrap();
        assert_eq!(target.status, TargetStatus::Deployed);
        assert_eq!(target.url.as_deref(), Some("https://t1.example"));

        // No-op once the target has left deploying
        registry.release("t1", TargetStatus::Idle).await.unwrap();
        assert_eq!(registry.get("t1").await.unwrap().status, TargetStatus::Deployed);
    }

    #[tokio::test]
    async fn test_remove_while_deploying() {
        let registry = TargetRegistry::new();
        registry.register(site("t1")).await.unwrap();
        registry.try_begin("t1").await.unwrap();

        let err = registry.remove("t1").await.unwrap_err();
        assert!(matches!(err, DeployError::InvalidState { .. }));

        registry
            .update("t1", TargetUpdate::status(TargetStatus::Idle))
            .await
            .unwrap();
        registry.remove("t1").await.unwrap();
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_snapshot_roundtrip_resets_deploying() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("targets.json");

        let registry = TargetRegistry::new();
        registry.register(site("t1")).await.unwrap();
        registry.register(site("t2")).await.unwrap();
        registry.try_begin("t2").await.unwrap();
        registry.save(&path).await.unwrap();

        let loaded = TargetRegistry::load(&path).await.unwrap();
        assert_eq!(loaded.len().await, 2);
        assert_eq!(loaded.get("t1").await.unwrap().status, TargetStatus::Idle);
        assert_eq!(loaded.get("t2").await.unwrap().status, TargetStatus::Failed);
    }

    #[tokio::test]
    async fn test_load_missing_file_is_empty() {
        let temp = TempDir::new().unwrap();
        let registry = TargetRegistry::load(&temp.path().join("none.json")).await.unwrap();
        assert!(registry.is_empty().await);
    }
}
