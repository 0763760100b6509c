//! Pipeline execution.
//!
//! Steps run strictly one after another in array order. The first failure
//! halts the pipeline and leaves every later step `pending`. There is no
//! retry here; re-running a deploy is the caller's decision.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, error, info, instrument, warn};

use crate::domain::{Artifact, BuildPipeline, BuildStep, PipelineStatus, StepStatus};
use crate::error::StepError;
use crate::runner::{StepContext, StepOutput, StepRunner};

use super::cancel::CancellationToken;

/// Progress callbacks, invoked synchronously from the executor
pub trait PipelineObserver: Send + Sync {
    fn pipeline_started(&self, _pipeline: &BuildPipeline) {}

    fn step_started(&self, _pipeline: &BuildPipeline, _step: &BuildStep) {}

    fn step_finished(&self, _pipeline: &BuildPipeline, _step: &BuildStep) {}

    fn pipeline_finished(&self, _pipeline: &BuildPipeline) {}
}

/// Observer that ignores everything
#[derive(Debug, Default)]
pub struct NoopObserver;

impl PipelineObserver for NoopObserver {}

/// The step that stopped a pipeline
#[derive(Debug, Clone, PartialEq)]
pub struct StepFailure {
    pub step: String,
    pub message: String,
}

/// Result of executing a pipeline
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionResult {
    /// All steps completed
    Completed { artifacts: Vec<Artifact> },

    /// A step failed; later steps never ran
    Failed(StepFailure),

    /// Cancellation was observed at a step boundary
    Cancelled,
}

impl ExecutionResult {
    pub fn is_success(&self) -> bool {
        matches!(self, ExecutionResult::Completed { .. })
    }

    pub fn artifacts(&self) -> &[Artifact] {
        match self {
            ExecutionResult::Completed { artifacts } => artifacts,
            _ => &[],
        }
    }

    pub fn error(&self) -> Option<&StepFailure> {
        match self {
            ExecutionResult::Failed(failure) => Some(failure),
            _ => None,
        }
    }
}

/// Runs pipelines through a step runner
pub struct PipelineExecutor {
    runner: Arc<dyn StepRunner>,
    observer: Arc<dyn PipelineObserver>,
    step_timeout: Option<Duration>,
}

impl PipelineExecutor {
    /// Create an executor with no observer and no step timeout
    pub fn new(runner: Arc<dyn StepRunner>) -> Self {
        Self {
            runner,
            observer: Arc::new(NoopObserver),
            step_timeout: None,
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn PipelineObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Fail any step that runs longer than `timeout`
    pub fn with_step_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.step_timeout = timeout;
        self
    }

    pub fn runner_name(&self) -> &str {
        self.runner.name()
    }

    /// Execute every step of an idle pipeline
    #[instrument(skip(self, pipeline, cancel), fields(pipeline_id = %pipeline.id, target_id = %pipeline.target_id))]
    pub async fn execute(
        &self,
        pipeline: &mut BuildPipeline,
        cancel: &CancellationToken,
    ) -> ExecutionResult {
        if pipeline.status != PipelineStatus::Idle {
            warn!(status = ?pipeline.status, "Refusing to execute a pipeline that is not idle");
            return ExecutionResult::Failed(StepFailure {
                step: "pipeline".to_string(),
                message: format!("pipeline {} is not idle", pipeline.id),
            });
        }

        let started = Instant::now();
        pipeline.status = PipelineStatus::Running;
        pipeline.logs.push(format!(
            "Pipeline {} started: {} steps via {} runner",
            pipeline.id,
            pipeline.steps.len(),
            self.runner.name()
        ));
        self.observer.pipeline_started(pipeline);
        info!(steps = pipeline.steps.len(), "Executing pipeline");

        let mut produced: Vec<Artifact> = Vec::new();
        let mut result = None;

        for idx in 0..pipeline.steps.len() {
            if cancel.is_cancelled() {
                let name = &pipeline.steps[idx].name;
                info!(step = %name, "Cancellation requested, not starting step");
                pipeline
                    .logs
                    .push(format!("Cancelled before step '{}'", name));
                result = Some(ExecutionResult::Cancelled);
                break;
            }

            pipeline.steps[idx].status = StepStatus::Running;
            let name = pipeline.steps[idx].name.clone();
            pipeline
                .logs
                .push(format!("[{}] $ {}", name, pipeline.steps[idx].command));
            self.observer.step_started(pipeline, &pipeline.steps[idx]);
            debug!(step = %name, "Step started");

            let step_start = Instant::now();
            let outcome = {
                let ctx = StepContext {
                    pipeline_id: pipeline.id,
                    target_id: &pipeline.target_id,
                    step: &pipeline.steps[idx],
                    files: &pipeline.source.files,
                    config: &pipeline.source.config,
                    cancel,
                };
                self.run_step(&ctx).await
            };
            let duration_ms = step_start.elapsed().as_millis() as u64;

            let step = &mut pipeline.steps[idx];
            step.duration_ms = Some(duration_ms);

            match outcome {
                Ok(output) => {
                    step.status = StepStatus::Completed;
                    let lines: Vec<String> = output
                        .output
                        .lines()
                        .filter(|l| !l.trim().is_empty())
                        .map(|l| format!("[{}] {}", name, l))
                        .collect();
                    step.output = Some(output.output);
                    produced.extend(output.artifacts);

                    pipeline.logs.extend(lines);
                    pipeline
                        .logs
                        .push(format!("[{}] completed in {}ms", name, duration_ms));
                    debug!(step = %name, duration_ms, "Step completed");
                    self.observer.step_finished(pipeline, &pipeline.steps[idx]);
                }
                Err(e) => {
                    let message = e.to_string();
                    step.status = StepStatus::Failed;
                    step.error = Some(message.clone());

                    pipeline
                        .logs
                        .push(format!("[{}] failed after {}ms: {}", name, duration_ms, message));
                    error!(step = %name, duration_ms, error = %message, "Step failed");
                    self.observer.step_finished(pipeline, &pipeline.steps[idx]);

                    result = Some(ExecutionResult::Failed(StepFailure {
                        step: name,
                        message,
                    }));
                    break;
                }
            }
        }

        let result = result.unwrap_or_else(|| {
            let size_bytes = if produced.is_empty() {
                pipeline.source.size_bytes()
            } else {
                produced.iter().map(|a| a.size_bytes).sum()
            };
            let mut artifacts = vec![Artifact::release(
                pipeline.id,
                &pipeline.source.digest,
                size_bytes,
            )];
            artifacts.extend(produced);
            ExecutionResult::Completed { artifacts }
        });

        pipeline.status = match &result {
            ExecutionResult::Completed { artifacts } => {
                pipeline.artifacts = artifacts.clone();
                PipelineStatus::Completed
            }
            ExecutionResult::Failed(_) => PipelineStatus::Failed,
            ExecutionResult::Cancelled => PipelineStatus::Cancelled,
        };

        let duration_ms = started.elapsed().as_millis() as u64;
        pipeline.duration_ms = Some(duration_ms);
        pipeline.logs.push(format!(
            "Pipeline {} {:?} in {}ms",
            pipeline.id, pipeline.status, duration_ms
        ));

        self.runner.finish(pipeline.id).await;
        self.observer.pipeline_finished(pipeline);
        info!(status = ?pipeline.status, duration_ms, "Pipeline finished");

        result
    }

    async fn run_step(&self, ctx: &StepContext<'_>) -> Result<StepOutput, StepError> {
        match self.step_timeout {
            Some(limit) => match tokio::time::timeout(limit, self.runner.run(ctx)).await {
                Ok(result) => result,
                Err(_) => Err(StepError::Timeout(limit)),
            },
            None => self.runner.run(ctx).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::builder::PipelineBuilder;
    use crate::domain::{BuildConfig, DeploymentTarget, ProjectFile, ProviderKind, TargetConfig};
    use crate::runner::SimulatedStepRunner;

    fn pipeline() -> BuildPipeline {
        let target = DeploymentTarget::new(TargetConfig::new("site", ProviderKind::StaticHost));
        PipelineBuilder::new().build(
            &target,
            vec![ProjectFile::new("index.html", "<p>hi</p>")],
            BuildConfig::new(),
        )
    }

    #[tokio::test]
    async fn test_successful_pipeline() {
        let executor = PipelineExecutor::new(Arc::new(SimulatedStepRunner::new()));
        let mut pipeline = pipeline();

        let result = executor.execute(&mut pipeline, &CancellationToken::new()).await;

        assert!(result.is_success());
        assert_eq!(pipeline.status, PipelineStatus::Completed);
        assert!(pipeline.steps.iter().all(|s| s.status == StepStatus::Completed));
        assert!(pipeline.duration_ms.is_some());
        // release + dist from the build step
        assert_eq!(result.artifacts().len(), 2);
        assert_eq!(result.artifacts()[0].name, "release");
    }

    #[tokio::test]
    async fn test_cannot_execute_twice() {
        let executor = PipelineExecutor::new(Arc::new(SimulatedStepRunner::new()));
        let mut pipeline = pipeline();
        let cancel = CancellationToken::new();

        executor.execute(&mut pipeline, &cancel).await;
        let again = executor.execute(&mut pipeline, &cancel).await;

        assert!(!again.is_success());
        assert_eq!(pipeline.status, PipelineStatus::Completed);
    }

    #[tokio::test]
    async fn test_pre_cancelled_runs_nothing() {
        let executor = PipelineExecutor::new(Arc::new(SimulatedStepRunner::new()));
        let mut pipeline = pipeline();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = executor.execute(&mut pipeline, &cancel).await;

        assert_eq!(result, ExecutionResult::Cancelled);
        assert_eq!(pipeline.status, PipelineStatus::Cancelled);
        assert!(pipeline.steps.iter().all(|s| s.status == StepStatus::Pending));
    }

    #[derive(Default)]
    struct RecordingObserver {
        events: std::sync::Mutex<Vec<String>>,
    }

    impl PipelineObserver for RecordingObserver {
        fn pipeline_started(&self, _pipeline: &BuildPipeline) {
            self.events.lock().unwrap().push("start".to_string());
        }

        fn step_started(&self, _pipeline: &BuildPipeline, step: &BuildStep) {
            self.events.lock().unwrap().push(format!("+{}", step.name));
        }

        fn step_finished(&self, _pipeline: &BuildPipeline, step: &BuildStep) {
            self.events.lock().unwrap().push(format!("-{}", step.name));
        }

        fn pipeline_finished(&self, _pipeline: &BuildPipeline) {
            self.events.lock().unwrap().push("finish".to_string());
        }
    }

    #[tokio::test]
    async fn test_observer_sees_every_step() {
        let observer = Arc::new(RecordingObserver::default());
        let executor = PipelineExecutor::new(Arc::new(SimulatedStepRunner::new()))
            .with_observer(observer.clone());
        let mut pipeline = pipeline();
        let steps: Vec<String> = pipeline.steps.iter().map(|s| s.name.clone()).collect();

        executor.execute(&mut pipeline, &CancellationToken::new()).await;

        let mut expected = vec!["start".to_string()];
        for name in &steps {
            expected.push(format!("+{}", name));
            expected.push(format!("-{}", name));
        }
        expected.push("finish".to_string());
        assert_eq!(*observer.events.lock().unwrap(), expected);
    }
}
