//! Step runners.
//!
//! The executor never shells out itself. It hands each step to a
//! `StepRunner`, so production can run real commands while tests script
//! results deterministically.

pub mod process;
pub mod simulated;

use async_trait::async_trait;
use uuid::Uuid;

use crate::core::CancellationToken;
use crate::domain::{Artifact, BuildConfig, BuildStep, ProjectFile};
use crate::error::StepError;

pub use process::ProcessStepRunner;
pub use simulated::SimulatedStepRunner;

/// Everything a runner may look at while executing one step
#[derive(Debug)]
pub struct StepContext<'a> {
    pub pipeline_id: Uuid,
    pub target_id: &'a str,
    pub step: &'a BuildStep,
    pub files: &'a [ProjectFile],
    pub config: &'a BuildConfig,
    pub cancel: &'a CancellationToken,
}

/// Output from a successful step
#[derive(Debug, Clone, Default)]
pub struct StepOutput {
    /// Captured output text
    pub output: String,

    /// Artifacts produced by this step
    pub artifacts: Vec<Artifact>,
}

impl StepOutput {
    /// Create a step output with just text
    pub fn new(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            artifacts: Vec::new(),
        }
    }

    pub fn with_artifact(mut self, artifact: Artifact) -> Self {
        self.artifacts.push(artifact);
        self
    }
}

/// Executes individual build steps
#[async_trait]
pub trait StepRunner: Send + Sync {
    /// Human-readable runner name
    fn name(&self) -> &str;

    /// Run one step to completion
    async fn run(&self, ctx: &StepContext<'_>) -> Result<StepOutput, StepError>;

    /// Release per-pipeline resources once the pipeline is finished
    async fn finish(&self, _pipeline_id: Uuid) {}
}
