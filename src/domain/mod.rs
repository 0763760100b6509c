//! Domain types for the deployment orchestrator.
//!
//! This module contains the core data structures:
//! - Target: Deployment destinations and their lifecycle
//! - Pipeline: Build pipelines, steps and sources
//! - Artifact: Build outputs handed to adapters
//! - History: Immutable records of deployment attempts

pub mod artifact;
pub mod history;
pub mod pipeline;
pub mod target;

// Re-export commonly used types
pub use artifact::{Artifact, RELEASE_ARTIFACT};
pub use history::{DeploymentHistoryEntry, HistoryStatus};
pub use pipeline::{
    BuildConfig, BuildPipeline, BuildStep, PipelineStatus, ProjectFile, SourceBundle, StepStatus,
};
pub use target::{DeploymentTarget, ProviderKind, TargetConfig, TargetStatus, TargetUpdate};
