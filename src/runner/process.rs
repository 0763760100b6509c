//! Shell-backed step runner.
//!
//! Materializes the project files into a scratch workspace on the first
//! step of a pipeline, then runs each step's command through a shell in
//! that directory. Later steps see whatever earlier steps left behind.

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use tempfile::TempDir;
use tokio::process::Command;
use tokio::sync::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;

use super::{StepContext, StepOutput, StepRunner};
use crate::core::builder::STEP_BUILD;
use crate::domain::{Artifact, ProjectFile};
use crate::error::StepError;

/// Runner that executes step commands in a per-pipeline workspace
pub struct ProcessStepRunner {
    /// Shell binary used as `<shell> -c <command>`
    shell: String,

    /// Live workspaces keyed by pipeline id
    workspaces: Mutex<HashMap<Uuid, TempDir>>,
}

impl Default for ProcessStepRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessStepRunner {
    /// Create a runner using `sh`
    pub fn new() -> Self {
        Self::with_shell("sh")
    }

    /// Create a runner with a custom shell
    pub fn with_shell(shell: impl Into<String>) -> Self {
        Self {
            shell: shell.into(),
            workspaces: Mutex::new(HashMap::new()),
        }
    }

    /// Workspace directory for a pipeline, creating it on first use
    async fn workspace(&self, pipeline_id: Uuid, files: &[ProjectFile]) -> Result<PathBuf, StepError> {
        let mut workspaces = self.workspaces.lock().await;
        if let Some(dir) = workspaces.get(&pipeline_id) {
            return Ok(dir.path().to_path_buf());
        }

        let dir = tempfile::Builder::new()
            .prefix("shipwright-")
            .tempdir()?;
        materialize(dir.path(), files).await?;
        debug!(%pipeline_id, path = %dir.path().display(), files = files.len(), "Created workspace");

        let path = dir.path().to_path_buf();
        workspaces.insert(pipeline_id, dir);
        Ok(path)
    }
}

#[async_trait]
impl StepRunner for ProcessStepRunner {
    fn name(&self) -> &str {
        "process"
    }

    async fn run(&self, ctx: &StepContext<'_>) -> Result<StepOutput, StepError> {
        let workdir = self.workspace(ctx.pipeline_id, ctx.files).await?;

        let output = Command::new(&self.shell)
            .arg("-c")
            .arg(&ctx.step.command)
            .current_dir(&workdir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let stdout = String::from_utf8_lossy(&output.stdout);
            let detail = if stderr.trim().is_empty() { stdout } else { stderr };
            return Err(StepError::Exit {
                code: output.status.code().unwrap_or(-1),
                stderr: detail.trim().to_string(),
            });
        }

        let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
        let mut result = StepOutput::new(stdout);

        if ctx.step.name == STEP_BUILD {
            let out_dir = ctx.config.output_dir();
            match collect_output(&workdir.join(out_dir), ctx.pipeline_id, out_dir).await? {
                Some(artifact) => result = result.with_artifact(artifact),
                None => warn!(step = %ctx.step.name, out_dir, "Build produced no output directory"),
            }
        }

        Ok(result)
    }

    async fn finish(&self, pipeline_id: Uuid) {
        // Dropping the TempDir removes the workspace
        if self.workspaces.lock().await.remove(&pipeline_id).is_some() {
            debug!(%pipeline_id, "Removed workspace");
        }
    }
}

/// Write project files below `root`, refusing paths that escape it
async fn materialize(root: &Path, files: &[ProjectFile]) -> Result<(), StepError> {
    for file in files {
        let relative = Path::new(&file.path);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if escapes {
            return Err(StepError::Failed(format!(
                "refusing to write file outside workspace: {}",
                file.path
            )));
        }

        let path = root.join(relative);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, &file.content).await?;
    }
    Ok(())
}

/// Digest every file under `dir` into a single artifact
async fn collect_output(dir: &Path, pipeline_id: Uuid, name: &str) -> Result<Option<Artifact>, StepError> {
    if !dir.is_dir() {
        return Ok(None);
    }

    let pattern = format!("{}/**/*", dir.display());
    let mut paths: Vec<PathBuf> = glob::glob(&pattern)
        .map_err(|e| StepError::Failed(format!("invalid output pattern: {}", e)))?
        .filter_map(|entry| entry.ok())
        .filter(|p| p.is_file())
        .collect();
    paths.sort();

    let mut hasher = Sha256::new();
    let mut size_bytes = 0u64;
    for path in &paths {
        let bytes = tokio::fs::read(path).await?;
        size_bytes += bytes.len() as u64;
        hasher.update(path.strip_prefix(dir).unwrap_or(path).to_string_lossy().as_bytes());
        hasher.update(&bytes);
    }

    let reference = format!("{}/{}", name, pipeline_id.simple());
    Ok(Some(Artifact::new(
        name,
        reference,
        hex::encode(hasher.finalize()),
        size_bytes,
    )))
}
