//! Deterministic simulated runner.
//!
//! Produces canned output for every step without touching the filesystem.
//! Useful for demos and for exercising the orchestration flow end to end.

use std::time::Duration;

use async_trait::async_trait;

use super::{StepContext, StepOutput, StepRunner};
use crate::core::builder::{STEP_BUILD, STEP_INSTALL, STEP_LINT, STEP_TEST};
use crate::domain::Artifact;
use crate::error::StepError;

/// Runner that fakes step execution
#[derive(Debug, Clone, Default)]
pub struct SimulatedStepRunner {
    /// Artificial latency per step
    delay: Duration,

    /// Step name that should fail
    fail_on: Option<String>,
}

impl SimulatedStepRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep this long in every step
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Make the named step fail
    pub fn failing_on(mut self, step: impl Into<String>) -> Self {
        self.fail_on = Some(step.into());
        self
    }
}

#[async_trait]
impl StepRunner for SimulatedStepRunner {
    fn name(&self) -> &str {
        "simulated"
    }

    async fn run(&self, ctx: &StepContext<'_>) -> Result<StepOutput, StepError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let step = ctx.step.name.as_str();
        if self.fail_on.as_deref() == Some(step) {
            return Err(StepError::Failed(format!(
                "simulated failure in '{}' ({})",
                step, ctx.step.command
            )));
        }

        let files = ctx.files.len();
        let output = match step {
            STEP_INSTALL => StepOutput::new(format!("added {} packages", files * 12 + 3)),
            STEP_LINT => StepOutput::new(format!("checked {} files, 0 problems", files)),
            STEP_TEST => StepOutput::new(format!("{} passed, 0 failed", files.max(1) * 4)),
            STEP_BUILD => {
                let mut bundle = Vec::new();
                for file in ctx.files {
                    bundle.extend_from_slice(file.path.as_bytes());
                    bundle.extend_from_slice(file.content.as_bytes());
                }
                let out_dir = ctx.config.output_dir();
                let reference = format!("{}/{}", out_dir, ctx.pipeline_id.simple());
                StepOutput::new(format!("built {} files into {}", files, out_dir))
                    .with_artifact(Artifact::from_content(out_dir, reference, &bundle))
            }
            other => StepOutput::new(format!("{}: {}", other, ctx.step.command)),
        };

        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::CancellationToken;
    use crate::domain::{BuildConfig, BuildStep, ProjectFile};
    use uuid::Uuid;

    async fn run_step(runner: &SimulatedStepRunner, name: &str) -> Result<StepOutput, StepError> {
        let step = BuildStep::new(name, "cmd");
        let files = vec![ProjectFile::new("index.html", "<h1>hi</h1>")];
        let config = BuildConfig::new();
        let cancel = CancellationToken::new();
        let ctx = StepContext {
            pipeline_id: Uuid::new_v4(),
            target_id: "t1",
            step: &step,
            files: &files,
            config: &config,
            cancel: &cancel,
        };
        runner.run(&ctx).await
    }

    #[tokio::test]
    async fn test_build_produces_artifact() {
        let output = run_step(&SimulatedStepRunner::new(), "build").await.unwrap();

        assert_eq!(output.artifacts.len(), 1);
        assert_eq!(output.artifacts[0].name, "dist");
        assert!(output.output.contains("1 files"));
    }

    #[tokio::test]
    async fn test_failing_step() {
        let runner = SimulatedStepRunner::new().failing_on("lint");

        assert!(run_step(&runner, "install").await.is_ok());
        let err = run_step(&runner, "lint").await.unwrap_err();
        assert!(err.to_string().contains("lint"));
    }
}
