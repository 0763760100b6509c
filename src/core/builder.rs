//! Pipeline construction.
//!
//! Every pipeline starts with the same four baseline steps. Provider kinds
//! may append packaging steps of their own; this is the only place outside
//! the adapters that branches on provider kind.

use tracing::debug;

use crate::domain::{
    BuildConfig, BuildPipeline, BuildStep, DeploymentTarget, ProjectFile, ProviderKind,
    SourceBundle,
};

/// Baseline step names, in execution order
pub const STEP_INSTALL: &str = "install";
pub const STEP_LINT: &str = "lint";
pub const STEP_TEST: &str = "test";
pub const STEP_BUILD: &str = "build";

/// Builds ordered step lists for deploy attempts
#[derive(Debug, Clone, Default)]
pub struct PipelineBuilder;

impl PipelineBuilder {
    pub fn new() -> Self {
        Self
    }

    /// Build an idle pipeline for `target` over the given sources
    pub fn build(
        &self,
        target: &DeploymentTarget,
        files: Vec<ProjectFile>,
        config: BuildConfig,
    ) -> BuildPipeline {
        let mut steps = Self::baseline_steps(&config);
        steps.extend(Self::provider_steps(&target.provider, target, &config));

        let pipeline = BuildPipeline::new(
            target.id.clone(),
            target.provider.clone(),
            steps,
            SourceBundle::new(files, config),
        );

        debug!(
            target_id = %target.id,
            pipeline_id = %pipeline.id,
            steps = ?pipeline.step_names(),
            "Built pipeline"
        );

        pipeline
    }

    fn baseline_steps(config: &BuildConfig) -> Vec<BuildStep> {
        vec![
            BuildStep::new(STEP_INSTALL, config.install_command()),
            BuildStep::new(STEP_LINT, config.lint_command()),
            BuildStep::new(STEP_TEST, config.test_command()),
            BuildStep::new(STEP_BUILD, config.build_command()),
        ]
    }

    fn provider_steps(
        provider: &ProviderKind,
        target: &DeploymentTarget,
        config: &BuildConfig,
    ) -> Vec<BuildStep> {
        match provider {
            ProviderKind::StaticHost => vec![BuildStep::new(
                "optimize",
                format!("minify and compress assets in {}", config.output_dir()),
            )],
            ProviderKind::Container => {
                let image = config
                    .get("image")
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("{}:latest", target.slug()));
                let dockerfile = config.get_or("dockerfile", "Dockerfile");
                vec![
                    BuildStep::new("image", format!("docker build -f {} -t {} .", dockerfile, image)),
                    BuildStep::new("push", format!("docker push {}", image)),
                ]
            }
            ProviderKind::ObjectStorageCdn => vec![BuildStep::new(
                "fingerprint",
                format!("content-hash asset names in {}", config.output_dir()),
            )],
            ProviderKind::Generic | ProviderKind::Custom(_) => Vec::new(),
        }
    }
}
