//! Container platform adapter.
//!
//! Tags the release as an image in the configured registry and rolls the
//! service over to it.

use async_trait::async_trait;
use tracing::info;

use super::{primary_artifact, require_ref, DeployResult, ProviderAdapter};
use crate::domain::artifact::short_hash;
use crate::domain::{Artifact, DeploymentTarget, ProviderKind};
use crate::error::AdapterError;

const DEFAULT_REGISTRY: &str = "registry.shipwright.app";
const DEFAULT_REGION: &str = "us-east-1";

/// Deploys container images
#[derive(Debug, Clone, Default)]
pub struct ContainerAdapter;

impl ContainerAdapter {
    pub fn new() -> Self {
        Self
    }

    fn image(target: &DeploymentTarget, reference: &str) -> String {
        let registry = target.setting("registry").unwrap_or(DEFAULT_REGISTRY);
        format!("{}/{}:{}", registry, target.slug(), reference)
    }

    fn service_url(target: &DeploymentTarget) -> String {
        let region = target.setting("region").unwrap_or(DEFAULT_REGION);
        format!(
            "https://{}-{}.{}.run.shipwright.app",
            target.slug(),
            short_hash(&target.id, 6),
            region
        )
    }

    fn replicas(target: &DeploymentTarget) -> Result<u32, AdapterError> {
        match target.setting("replicas") {
            None => Ok(1),
            Some(raw) => match raw.parse::<u32>() {
                Ok(0) | Err(_) => Err(AdapterError::new(format!(
                    "invalid replicas setting '{}': expected a positive integer",
                    raw
                ))),
                Ok(n) => Ok(n),
            },
        }
    }

    fn roll_out(
        target: &DeploymentTarget,
        reference: &str,
        mut logs: Vec<String>,
    ) -> Result<DeployResult, AdapterError> {
        let replicas = Self::replicas(target).map_err(|e| e.with_logs(logs.clone()))?;
        let url = Self::service_url(target);

        logs.push(format!(
            "Rolling update to {} ({} replica(s))",
            Self::image(target, reference),
            replicas
        ));
        logs.push(format!("{}/{} replicas healthy", replicas, replicas));
        logs.push(format!("Service available at {}", url));

        Ok(DeployResult::new(url, logs))
    }
}

#[async_trait]
impl ProviderAdapter for ContainerAdapter {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Container
    }

    async fn deploy(
        &self,
        artifacts: &[Artifact],
        target: &DeploymentTarget,
    ) -> Result<DeployResult, AdapterError> {
        let release = primary_artifact(artifacts)?;
        let image = Self::image(target, &release.reference);
        let logs = vec![
            format!("Tagged image {}", image),
            format!("Pushed {} (digest sha256:{})", image, release.short_digest()),
        ];

        let result = Self::roll_out(target, &release.reference, logs)?;
        info!(target_id = %target.id, %image, url = %result.url, "Container deployed");
        Ok(result)
    }

    async fn rollback(
        &self,
        artifact_ref: &str,
        target: &DeploymentTarget,
    ) -> Result<DeployResult, AdapterError> {
        let reference = require_ref(artifact_ref)?;
        let logs = vec![format!(
            "Reusing previously pushed image {}",
            Self::image(target, reference)
        )];

        let result = Self::roll_out(target, reference, logs)?;
        info!(target_id = %target.id, %reference, "Container rolled back");
        Ok(result)
    }
}
