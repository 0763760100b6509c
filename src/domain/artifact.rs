//! Build artifacts handed from the pipeline to provider adapters.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Name of the primary artifact every completed pipeline produces
pub const RELEASE_ARTIFACT: &str = "release";

/// An artifact produced by a build pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
    /// Logical name (e.g. "release", "dist")
    pub name: String,

    /// Stable reference an adapter can redeploy from
    pub reference: String,

    /// SHA256 of the artifact content (hex)
    pub digest: String,

    /// Size in bytes
    pub size_bytes: u64,

    /// When the artifact was created
    pub created_at: DateTime<Utc>,
}

impl Artifact {
    /// Create an artifact
    pub fn new(
        name: impl Into<String>,
        reference: impl Into<String>,
        digest: impl Into<String>,
        size_bytes: u64,
    ) -> Self {
        Self {
            name: name.into(),
            reference: reference.into(),
            digest: digest.into(),
            size_bytes,
            created_at: Utc::now(),
        }
    }

    /// Create an artifact from in-memory content, digesting it
    pub fn from_content(name: impl Into<String>, reference: impl Into<String>, content: &[u8]) -> Self {
        Self::new(name, reference, digest_bytes(content), content.len() as u64)
    }

    /// The release artifact of a pipeline.
    ///
    /// Reference format: `rel-{digest12}-{pipeline8}`, so two pipelines over
    /// identical sources still get distinct references.
    pub fn release(pipeline_id: Uuid, source_digest: &str, size_bytes: u64) -> Self {
        let pipeline = pipeline_id.simple().to_string();
        let reference = format!("rel-{}-{}", prefix(source_digest, 12), prefix(&pipeline, 8));
        Self::new(RELEASE_ARTIFACT, reference, source_digest, size_bytes)
    }

    /// First 12 characters of the digest, for display
    pub fn short_digest(&self) -> String {
        prefix(&self.digest, 12)
    }
}

/// Leading `len` characters of `s`; runners may hand back any digest text
fn prefix(s: &str, len: usize) -> String {
    s.chars().take(len).collect()
}

/// SHA256 hex digest of a byte slice
pub fn digest_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Short hex hash of a string (first `len` hex chars of its SHA256)
pub fn short_hash(input: &str, len: usize) -> String {
    prefix(&digest_bytes(input.as_bytes()), len)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_artifact_from_content() {
        let artifact = Artifact::from_content("dist", "dist-1", b"hello world");

        assert_eq!(artifact.name, "dist");
        assert_eq!(artifact.size_bytes, 11);
        assert_eq!(artifact.digest.len(), 64);
    }

    #[test]
    fn test_release_reference_is_unique_per_pipeline() {
        let digest = digest_bytes(b"same sources");
        let a = Artifact::release(Uuid::new_v4(), &digest, 12);
        let b = Artifact::release(Uuid::new_v4(), &digest, 12);

        assert_eq!(a.name, RELEASE_ARTIFACT);
        assert!(a.reference.starts_with(&format!("rel-{}", &digest[..12])));
        assert_ne!(a.reference, b.reference);
    }

    #[test]
    fn test_short_digest_of_non_hex_digest() {
        let artifact = Artifact::new("dist", "dist-1", "ünïcödé-dïgëst-from-a-runner", 4);
        assert_eq!(artifact.short_digest(), "ünïcödé-dïgë");

        let short = Artifact::new("dist", "dist-1", "é", 4);
        assert_eq!(short.short_digest(), "é");

        let release = Artifact::release(Uuid::new_v4(), "ééééééééééééééé", 4);
        assert!(release.reference.starts_with("rel-éééééééééééé-"));
    }

    #[test]
    fn test_short_hash_consistency() {
        assert_eq!(short_hash("target-1", 6), short_hash("target-1", 6));
        assert_ne!(short_hash("target-1", 6), short_hash("target-2", 6));
        assert_eq!(short_hash("x", 10).len(), 10);
    }
}
