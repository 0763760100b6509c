//! Static hosting adapter (Vercel/Netlify-style atomic releases).

use async_trait::async_trait;
use tracing::info;

use super::{primary_artifact, require_ref, total_size, DeployResult, ProviderAdapter};
use crate::domain::artifact::short_hash;
use crate::domain::{Artifact, DeploymentTarget, ProviderKind};
use crate::error::AdapterError;

const DEFAULT_DOMAIN: &str = "static.shipwright.app";

/// Publishes release bundles to a static host
#[derive(Debug, Clone, Default)]
pub struct StaticHostAdapter;

impl StaticHostAdapter {
    pub fn new() -> Self {
        Self
    }

    /// `https://{slug}-{hash6}.{domain}`, stable for a target
    fn site_url(target: &DeploymentTarget) -> String {
        let domain = target.setting("domain").unwrap_or(DEFAULT_DOMAIN);
        format!(
            "https://{}-{}.{}",
            target.slug(),
            short_hash(&target.id, 6),
            domain
        )
    }
}

#[async_trait]
impl ProviderAdapter for StaticHostAdapter {
    fn kind(&self) -> ProviderKind {
        ProviderKind::StaticHost
    }

    async fn deploy(
        &self,
        artifacts: &[Artifact],
        target: &DeploymentTarget,
    ) -> Result<DeployResult, AdapterError> {
        let release = primary_artifact(artifacts)?;
        let url = Self::site_url(target);

        let logs = vec![
            format!(
                "Uploading {} artifact(s), {} bytes",
                artifacts.len(),
                total_size(artifacts)
            ),
            format!("Created release {}", release.reference),
            format!("Promoted release {} to production", release.reference),
            format!("Live at {}", url),
        ];

        info!(target_id = %target.id, release = %release.reference, %url, "Static site deployed");
        Ok(DeployResult::new(url, logs))
    }

    async fn rollback(
        &self,
        artifact_ref: &str,
        target: &DeploymentTarget,
    ) -> Result<DeployResult, AdapterError> {
        let reference = require_ref(artifact_ref)?;
        let url = Self::site_url(target);

        let logs = vec![
            format!("Re-promoting release {}", reference),
            format!("Live at {}", url),
        ];

        info!(target_id = %target.id, release = %reference, "Static site rolled back");
        Ok(DeployResult::new(url, logs))
    }
}
