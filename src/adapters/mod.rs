//! Provider deploy adapters.
//!
//! Each hosting provider kind has one adapter that turns build artifacts
//! into a reachable URL. Adapters see the target read-only; updating the
//! target and the history is the coordinator's job.

pub mod container;
pub mod generic;
pub mod object_storage;
pub mod static_host;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::{Artifact, DeploymentTarget, ProviderKind};
use crate::error::AdapterError;

pub use container::ContainerAdapter;
pub use generic::GenericAdapter;
pub use object_storage::ObjectStorageCdnAdapter;
pub use static_host::StaticHostAdapter;

/// Output from a successful deploy or rollback
#[derive(Debug, Clone, PartialEq)]
pub struct DeployResult {
    /// Where the deployment is reachable
    pub url: String,

    /// What the adapter did, in order
    pub logs: Vec<String>,
}

impl DeployResult {
    pub fn new(url: impl Into<String>, logs: Vec<String>) -> Self {
        Self {
            url: url.into(),
            logs,
        }
    }
}

/// Trait for hosting provider adapters
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Provider kind this adapter serves
    fn kind(&self) -> ProviderKind;

    /// Publish build artifacts for a target
    async fn deploy(
        &self,
        artifacts: &[Artifact],
        target: &DeploymentTarget,
    ) -> Result<DeployResult, AdapterError>;

    /// Re-publish a previously deployed artifact
    async fn rollback(
        &self,
        artifact_ref: &str,
        target: &DeploymentTarget,
    ) -> Result<DeployResult, AdapterError>;
}

/// Lookup table from provider kind to adapter
#[derive(Clone, Default)]
pub struct AdapterRegistry {
    adapters: HashMap<ProviderKind, Arc<dyn ProviderAdapter>>,
}

impl AdapterRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in adapters
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(StaticHostAdapter::new()));
        registry.register(Arc::new(ContainerAdapter::new()));
        registry.register(Arc::new(ObjectStorageCdnAdapter::new()));
        registry.register(Arc::new(GenericAdapter::new()));
        registry
    }

    /// Add an adapter, replacing any previous one for the same kind
    pub fn register(&mut self, adapter: Arc<dyn ProviderAdapter>) {
        self.adapters.insert(adapter.kind(), adapter);
    }

    pub fn get(&self, kind: &ProviderKind) -> Option<Arc<dyn ProviderAdapter>> {
        self.adapters.get(kind).cloned()
    }

    /// Registered provider kinds
    pub fn kinds(&self) -> Vec<ProviderKind> {
        self.adapters.keys().cloned().collect()
    }
}

/// Fail early when a deploy has nothing to publish
pub(crate) fn primary_artifact(artifacts: &[Artifact]) -> Result<&Artifact, AdapterError> {
    artifacts
        .first()
        .ok_or_else(|| AdapterError::new("no artifacts to deploy"))
}

/// Fail early on an empty rollback reference
pub(crate) fn require_ref(artifact_ref: &str) -> Result<&str, AdapterError> {
    let trimmed = artifact_ref.trim();
    if trimmed.is_empty() {
        return Err(AdapterError::new("rollback requires an artifact reference"));
    }
    Ok(trimmed)
}

/// Combined size of a set of artifacts
pub(crate) fn total_size(artifacts: &[Artifact]) -> u64 {
    artifacts.iter().map(|a| a.size_bytes).sum()
}
