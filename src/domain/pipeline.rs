//! Build pipelines, their steps, and the sources they build.
//!
//! A pipeline lives for exactly one deploy call. The builder creates it
//! `idle` with every step `pending`; only the executor mutates it afterwards.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::artifact::{digest_bytes, Artifact};
use super::target::ProviderKind;

/// An ordered set of build steps for one deploy attempt
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildPipeline {
    /// Unique identifier for this pipeline
    pub id: Uuid,

    /// Target the pipeline builds for
    pub target_id: String,

    /// Provider kind the step list was selected for
    pub provider: ProviderKind,

    /// Steps, executed strictly in order
    pub steps: Vec<BuildStep>,

    /// Aggregate status
    pub status: PipelineStatus,

    /// Wall-clock time from start to terminal state
    pub duration_ms: Option<u64>,

    /// Artifacts produced (empty until completed)
    pub artifacts: Vec<Artifact>,

    /// Files and build config the steps operate on
    pub source: SourceBundle,

    /// Human-readable execution log
    pub logs: Vec<String>,
}

impl BuildPipeline {
    /// Create an idle pipeline
    pub fn new(
        target_id: impl Into<String>,
        provider: ProviderKind,
        steps: Vec<BuildStep>,
        source: SourceBundle,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            target_id: target_id.into(),
            provider,
            steps,
            status: PipelineStatus::Idle,
            duration_ms: None,
            artifacts: Vec::new(),
            source,
            logs: Vec::new(),
        }
    }

    /// Names of all steps, in execution order
    pub fn step_names(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.name.as_str()).collect()
    }

    /// Get a step by name
    pub fn step(&self, name: &str) -> Option<&BuildStep> {
        self.steps.iter().find(|s| s.name == name)
    }

    /// First failed step, if any
    pub fn failed_step(&self) -> Option<&BuildStep> {
        self.steps.iter().find(|s| s.status == StepStatus::Failed)
    }

    /// Whether the pipeline reached a terminal state
    pub fn is_finished(&self) -> bool {
        matches!(
            self.status,
            PipelineStatus::Completed | PipelineStatus::Failed | PipelineStatus::Cancelled
        )
    }
}

/// A single unit of build work
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildStep {
    pub id: Uuid,

    /// Step name (unique within a pipeline)
    pub name: String,

    /// Descriptive command; runners decide how to execute it
    pub command: String,

    pub status: StepStatus,

    /// Captured output on success
    pub output: Option<String>,

    /// Error message on failure
    pub error: Option<String>,

    /// Time taken in milliseconds
    pub duration_ms: Option<u64>,
}

impl BuildStep {
    /// Create a pending step
    pub fn new(name: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            command: command.into(),
            status: StepStatus::Pending,
            output: None,
            error: None,
            duration_ms: None,
        }
    }
}

/// Aggregate status of a pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStatus {
    Idle,
    Running,
    Completed,
    Failed,
    /// Stopped at a step boundary by a cancellation request
    Cancelled,
}

impl Default for PipelineStatus {
    fn default() -> Self {
        Self::Idle
    }
}

/// Status of a build step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    /// Not yet started (or never reached)
    Pending,

    /// Currently executing
    Running,

    /// Completed successfully
    Completed,

    /// Failed (with error)
    Failed,
}

impl Default for StepStatus {
    fn default() -> Self {
        Self::Pending
    }
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StepStatus::Pending => "pending",
            StepStatus::Running => "running",
            StepStatus::Completed => "completed",
            StepStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// A project file handed in by the caller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectFile {
    /// Path relative to the project root
    pub path: String,

    pub content: String,
}

impl ProjectFile {
    pub fn new(path: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
        }
    }
}

/// Build configuration map.
///
/// Opaque to the orchestrator except for the command and output keys
/// documented on the accessors below.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BuildConfig(BTreeMap<String, String>);

impl BuildConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// Value for `key`, or `default` when unset or blank
    pub fn get_or<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        match self.get(key) {
            Some(v) if !v.trim().is_empty() => v,
            _ => default,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &String)> {
        self.0.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// `install_command` (default `npm install`)
    pub fn install_command(&self) -> &str {
        self.get_or("install_command", "npm install")
    }

    /// `lint_command` (default `npm run lint`)
    pub fn lint_command(&self) -> &str {
        self.get_or("lint_command", "npm run lint")
    }

    /// `test_command` (default `npm test`)
    pub fn test_command(&self) -> &str {
        self.get_or("test_command", "npm test")
    }

    /// `build_command` (default `npm run build`)
    pub fn build_command(&self) -> &str {
        self.get_or("build_command", "npm run build")
    }

    /// `output_dir` (default `dist`)
    pub fn output_dir(&self) -> &str {
        self.get_or("output_dir", "dist")
    }
}

impl FromIterator<(String, String)> for BuildConfig {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Files plus build config, as handed to the builder
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SourceBundle {
    pub files: Vec<ProjectFile>,
    pub config: BuildConfig,

    /// SHA256 over paths and contents, in path order
    pub digest: String,
}

impl SourceBundle {
    pub fn new(files: Vec<ProjectFile>, config: BuildConfig) -> Self {
        let digest = Self::compute_digest(&files);
        Self {
            files,
            config,
            digest,
        }
    }

    /// Total content size in bytes
    pub fn size_bytes(&self) -> u64 {
        self.files.iter().map(|f| f.content.len() as u64).sum()
    }

    fn compute_digest(files: &[ProjectFile]) -> String {
        let mut sorted: Vec<&ProjectFile> = files.iter().collect();
        sorted.sort_by(|a, b| a.path.cmp(&b.path));

        let mut buf = Vec::new();
        for file in sorted {
            buf.extend_from_slice(file.path.as_bytes());
            buf.push(0);
            buf.extend_from_slice(file.content.as_bytes());
            buf.push(0);
        }
        digest_bytes(&buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_digest_ignores_file_order() {
        let a = SourceBundle::new(
            vec![ProjectFile::new("a.js", "1"), ProjectFile::new("b.js", "2")],
            BuildConfig::new(),
        );
        let b = SourceBundle::new(
            vec![ProjectFile::new("b.js", "2"), ProjectFile::new("a.js", "1")],
            BuildConfig::new(),
        );
        let c = SourceBundle::new(vec![ProjectFile::new("a.js", "changed")], BuildConfig::new());

        assert_eq!(a.digest, b.digest);
        assert_ne!(a.digest, c.digest);
        assert_eq!(a.size_bytes(), 2);
    }

    #[test]
    fn test_build_config_defaults() {
        let config = BuildConfig::new()
            .with("test_command", "cargo test")
            .with("output_dir", "  ");

        assert_eq!(config.test_command(), "cargo test");
        assert_eq!(config.install_command(), "npm install");
        assert_eq!(config.output_dir(), "dist");
    }

    #[test]
    fn test_pipeline_starts_idle() {
        let pipeline = BuildPipeline::new(
            "t1",
            ProviderKind::Generic,
            vec![BuildStep::new("install", "npm install")],
            SourceBundle::default(),
        );

        assert_eq!(pipeline.status, PipelineStatus::Idle);
        assert_eq!(pipeline.steps[0].status, StepStatus::Pending);
        assert!(!pipeline.is_finished());
        assert!(pipeline.failed_step().is_none());
    }
}
