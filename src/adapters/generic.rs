//! Generic adapter for self-managed hosts.
//!
//! The target must name its own `endpoint`; the adapter records the
//! handoff and reports that endpoint as the URL.

use async_trait::async_trait;
use tracing::info;

use super::{primary_artifact, require_ref, DeployResult, ProviderAdapter};
use crate::domain::{Artifact, DeploymentTarget, ProviderKind};
use crate::error::AdapterError;

#[derive(Debug, Clone, Default)]
pub struct GenericAdapter;

impl GenericAdapter {
    pub fn new() -> Self {
        Self
    }

    fn endpoint(target: &DeploymentTarget) -> Result<String, AdapterError> {
        let endpoint = target
            .setting("endpoint")
            .map(str::trim)
            .filter(|e| !e.is_empty())
            .ok_or_else(|| AdapterError::new("generic provider requires an 'endpoint' setting"))?;

        if !(endpoint.starts_with("http://") || endpoint.starts_with("https://")) {
            return Err(AdapterError::new(format!(
                "endpoint '{}' must start with http:// or https://",
                endpoint
            )));
        }

        Ok(endpoint.trim_end_matches('/').to_string())
    }
}

#[async_trait]
impl ProviderAdapter for GenericAdapter {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Generic
    }

    async fn deploy(
        &self,
        artifacts: &[Artifact],
        target: &DeploymentTarget,
    ) -> Result<DeployResult, AdapterError> {
        let release = primary_artifact(artifacts)?;
        let url = Self::endpoint(target)?;

        let mut logs = vec![format!("Handing off release {} to {}", release.reference, url)];
        for artifact in artifacts {
            logs.push(format!(
                "  {} ({} bytes, sha256 {})",
                artifact.name,
                artifact.size_bytes,
                artifact.short_digest()
            ));
        }

        info!(target_id = %target.id, %url, "Generic deploy handed off");
        Ok(DeployResult::new(url, logs))
    }

    async fn rollback(
        &self,
        artifact_ref: &str,
        target: &DeploymentTarget,
    ) -> Result<DeployResult, AdapterError> {
        let reference = require_ref(artifact_ref)?;
        let url = Self::endpoint(target)?;

        Ok(DeployResult::new(
            url.clone(),
            vec![format!("Requested {} to restore release {}", url, reference)],
        ))
    }
}
