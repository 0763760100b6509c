//! Object storage bucket fronted by a CDN.

use async_trait::async_trait;
use tracing::info;

use super::{primary_artifact, require_ref, total_size, DeployResult, ProviderAdapter};
use crate::domain::artifact::short_hash;
use crate::domain::{Artifact, DeploymentTarget, ProviderKind};
use crate::error::AdapterError;

/// Syncs artifacts to a bucket and invalidates the CDN
#[derive(Debug, Clone, Default)]
pub struct ObjectStorageCdnAdapter;

impl ObjectStorageCdnAdapter {
    pub fn new() -> Self {
        Self
    }

    fn bucket(target: &DeploymentTarget) -> String {
        target
            .setting("bucket")
            .map(str::to_string)
            .unwrap_or_else(|| target.slug())
    }

    /// Distribution URL derived from target id and bucket
    fn distribution_url(target: &DeploymentTarget) -> String {
        let bucket = Self::bucket(target);
        let key = format!("{}/{}", target.id, bucket);
        format!("https://{}.cdn.shipwright.app", short_hash(&key, 10))
    }

    fn publish(target: &DeploymentTarget, reference: &str, mut logs: Vec<String>) -> DeployResult {
        let url = Self::distribution_url(target);
        logs.push(format!(
            "Pointed distribution at s3://{}/releases/{}/",
            Self::bucket(target),
            reference
        ));
        logs.push("Created cache invalidation for /*".to_string());
        logs.push(format!("Available at {}", url));
        DeployResult::new(url, logs)
    }
}

#[async_trait]
impl ProviderAdapter for ObjectStorageCdnAdapter {
    fn kind(&self) -> ProviderKind {
        ProviderKind::ObjectStorageCdn
    }

    async fn deploy(
        &self,
        artifacts: &[Artifact],
        target: &DeploymentTarget,
    ) -> Result<DeployResult, AdapterError> {
        let release = primary_artifact(artifacts)?;
        let logs = vec![format!(
            "Synced {} bytes to s3://{}/releases/{}/",
            total_size(artifacts),
            Self::bucket(target),
            release.reference
        )];

        let result = Self::publish(target, &release.reference, logs);
        info!(target_id = %target.id, release = %release.reference, url = %result.url, "Bucket deployed");
        Ok(result)
    }

    async fn rollback(
        &self,
        artifact_ref: &str,
        target: &DeploymentTarget,
    ) -> Result<DeployResult, AdapterError> {
        let reference = require_ref(artifact_ref)?;
        let result = Self::publish(target, reference, Vec::new());
        info!(target_id = %target.id, %reference, "Bucket rolled back");
        Ok(result)
    }
}
