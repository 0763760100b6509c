//! Command-line interface for shipwright.
//!
//! Provides commands for managing targets, deploying project directories,
//! rolling back, and inspecting deployment history and logs.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use uuid::Uuid;

use crate::adapters::AdapterRegistry;
use crate::config::{self, HistoryBackend, ResolvedConfig, RunnerKind};
use crate::core::{
    DeploymentCoordinator, HistoryStore, JsonlHistoryStore, MemoryHistoryStore, PipelineExecutor,
    PipelineObserver, TargetRegistry,
};
use crate::domain::{BuildConfig, BuildPipeline, BuildStep, DeploymentHistoryEntry, StepStatus};
use crate::error::DeployError;
use crate::runner::{ProcessStepRunner, SimulatedStepRunner, StepRunner};
use crate::sources::SourceCollector;

pub mod target;

/// shipwright - Build, test and ship projects to hosting targets
#[derive(Parser, Debug)]
#[command(name = "shipwright")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Manage deployment targets
    Target {
        #[command(subcommand)]
        command: target::TargetCommands,
    },

    /// Build, test and deploy a project directory to a target
    Deploy {
        /// Target ID
        target_id: String,

        /// Project directory (defaults to the current directory)
        #[arg(short, long, env = "SHIPWRIGHT_PROJECT_DIR")]
        dir: Option<PathBuf>,

        /// Build setting (repeatable), e.g. --set build_command="npm run build"
        #[arg(long = "set", value_name = "KEY=VALUE", value_parser = parse_key_val)]
        settings: Vec<(String, String)>,
    },

    /// Restore the previous successful deployment of a target
    Rollback {
        /// Target ID
        target_id: String,
    },

    /// Show deployment history
    History {
        /// Only show this target (newest first)
        target_id: Option<String>,

        /// Maximum number of entries to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },

    /// Print the logs of a recorded deployment
    Logs {
        /// Deployment ID (UUID)
        deployment_id: String,
    },

    /// Show resolved configuration (debug)
    Config,
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(self) -> Result<()> {
        match self.command {
            Commands::Target { command } => {
                let ws = Workspace::open().await?;
                target::execute(&ws, command).await
            }
            Commands::Deploy {
                target_id,
                dir,
                settings,
            } => {
                let ws = Workspace::open().await?;
                deploy(&ws, &target_id, dir, settings).await
            }
            Commands::Rollback { target_id } => {
                let ws = Workspace::open().await?;
                rollback(&ws, &target_id).await
            }
            Commands::History { target_id, limit } => {
                let ws = Workspace::open().await?;
                show_history(&ws, target_id.as_deref(), limit).await
            }
            Commands::Logs { deployment_id } => {
                let ws = Workspace::open().await?;
                show_logs(&ws, &deployment_id).await
            }
            Commands::Config => show_config(),
        }
    }
}

/// Parse a `KEY=VALUE` pair
fn parse_key_val(s: &str) -> std::result::Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{}'", s))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("empty key in '{}'", s));
    }
    Ok((key.to_string(), value.to_string()))
}

// ============================================================================
// Workspace: coordinator wired from configuration
// ============================================================================

/// A coordinator over the persisted registry and configured history
pub struct Workspace {
    pub config: &'static ResolvedConfig,
    pub coordinator: DeploymentCoordinator,
}

impl Workspace {
    pub async fn open() -> Result<Self> {
        let config = config::config()?;

        let registry = TargetRegistry::load(&config.targets_path()).await?;
        let history: Arc<dyn HistoryStore> = match config.history {
            HistoryBackend::Jsonl => Arc::new(
                JsonlHistoryStore::open(config.history_path())
                    .await
                    .context("Failed to open deployment history")?,
            ),
            HistoryBackend::Memory => Arc::new(MemoryHistoryStore::new()),
        };
        let runner: Arc<dyn StepRunner> = match config.runner {
            RunnerKind::Simulated => Arc::new(SimulatedStepRunner::new()),
            RunnerKind::Process => Arc::new(ProcessStepRunner::with_shell(&config.build.shell)),
        };

        let executor = PipelineExecutor::new(runner).with_step_timeout(config.build.step_timeout());
        let coordinator = DeploymentCoordinator::with_parts(
            Arc::new(registry),
            history,
            AdapterRegistry::with_defaults(),
            executor,
        )
        .with_observer(Arc::new(ConsoleObserver));

        Ok(Self { config, coordinator })
    }

    /// Persist the target registry snapshot
    pub async fn save(&self) -> Result<()> {
        self.coordinator
            .registry()
            .save(&self.config.targets_path())
            .await
    }
}

/// Prints pipeline progress to stderr
struct ConsoleObserver;

impl PipelineObserver for ConsoleObserver {
    fn pipeline_started(&self, pipeline: &BuildPipeline) {
        eprintln!(
            "Pipeline {} ({} steps: {})",
            pipeline.id,
            pipeline.steps.len(),
            pipeline.step_names().join(" -> ")
        );
    }

    fn step_started(&self, _pipeline: &BuildPipeline, step: &BuildStep) {
        eprintln!("  ▶ {:<12} {}", step.name, step.command);
    }

    fn step_finished(&self, _pipeline: &BuildPipeline, step: &BuildStep) {
        let ms = step.duration_ms.unwrap_or(0);
        match step.status {
            StepStatus::Completed => eprintln!("  ✓ {:<12} {}ms", step.name, ms),
            _ => eprintln!(
                "  ✗ {:<12} {}ms: {}",
                step.name,
                ms,
                step.error.as_deref().unwrap_or("failed")
            ),
        }
    }
}

// ============================================================================
// Commands
// ============================================================================

async fn deploy(
    ws: &Workspace,
    target_id: &str,
    dir: Option<PathBuf>,
    settings: Vec<(String, String)>,
) -> Result<()> {
    let dir = match dir {
        Some(dir) => dir,
        None => std::env::current_dir().context("Failed to determine current directory")?,
    };

    let collected = SourceCollector::new(ws.config.max_file_bytes).collect(&dir)?;
    for skipped in &collected.skipped {
        eprintln!("Skipping {}: {}", skipped.path, skipped.reason);
    }
    if collected.files.is_empty() {
        bail!("No deployable files found in {}", dir.display());
    }

    let build_config: BuildConfig = settings.into_iter().collect();
    eprintln!(
        "Deploying {} file(s) from {} to {}",
        collected.files.len(),
        dir.display(),
        target_id
    );

    let coordinator = &ws.coordinator;
    let deploy = coordinator.deploy(target_id, collected.files, build_config);
    tokio::pin!(deploy);

    let outcome = tokio::select! {
        res = &mut deploy => res,
        _ = tokio::signal::ctrl_c() => {
            eprintln!("\nCancelling after the current step...");
            let (cancelled, res) = tokio::join!(coordinator.cancel_deployment(target_id), &mut deploy);
            match cancelled {
                Ok(()) => {}
                Err(DeployError::CancelTooLate { status, .. }) => {
                    eprintln!("Too late to cancel: the deployment finished as {}", status);
                }
                Err(e) => tracing::warn!(error = %e, "Cancel request failed"),
            }
            res
        }
    };

    ws.save().await?;

    match outcome {
        Ok(url) => {
            eprintln!("\n✓ Deployed {}", target_id);
            println!("{}", url);
            Ok(())
        }
        Err(DeployError::Cancelled(_)) => {
            eprintln!("\nDeployment cancelled; target is idle");
            Ok(())
        }
        Err(DeployError::AdapterFailed { provider, message, logs, .. }) => {
            for line in logs {
                eprintln!("  [{}] {}", provider, line);
            }
            bail!("Deployment to {} failed: {}", target_id, message)
        }
        Err(e) => Err(e).with_context(|| format!("Deployment to {} failed", target_id)),
    }
}

async fn rollback(ws: &Workspace, target_id: &str) -> Result<()> {
    let outcome = ws.coordinator.rollback(target_id).await;
    ws.save().await?;
    outcome.with_context(|| format!("Rollback of {} failed", target_id))?;

    let target = ws.coordinator.get_target(target_id).await?;
    eprintln!("✓ Rolled back {}", target_id);
    if let Some(url) = target.url {
        println!("{}", url);
    }
    Ok(())
}

async fn show_history(ws: &Workspace, target_id: Option<&str>, limit: usize) -> Result<()> {
    let entries = ws.coordinator.deployment_history(target_id).await?;
    if entries.is_empty() {
        println!("No deployments recorded");
        return Ok(());
    }

    // Per-target queries are newest-first; the global log is append order
    let shown: Vec<&DeploymentHistoryEntry> = match target_id {
        Some(_) => entries.iter().take(limit).collect(),
        None => entries.iter().skip(entries.len().saturating_sub(limit)).collect(),
    };

    println!(
        "{:<38} {:<20} {:<9} {:<20} {:>8}  {}",
        "DEPLOYMENT ID", "TARGET", "STATUS", "WHEN", "MS", "ARTIFACT"
    );
    println!("{}", "-".repeat(120));
    for entry in shown {
        println!(
            "{:<38} {:<20} {:<9} {:<20} {:>8}  {}",
            entry.id,
            truncate(&entry.target_id, 20),
            entry.status,
            entry.timestamp.format("%Y-%m-%d %H:%M:%S"),
            entry.duration_ms,
            entry.artifact_ref.as_deref().unwrap_or("-")
        );
    }

    if entries.len() > limit {
        println!("\n({} of {} shown)", limit, entries.len());
    }
    Ok(())
}

async fn show_logs(ws: &Workspace, deployment_id: &str) -> Result<()> {
    let id = Uuid::parse_str(deployment_id)
        .with_context(|| format!("Invalid deployment ID: {}", deployment_id))?;

    for line in ws.coordinator.deployment_logs(id).await? {
        println!("{}", line);
    }
    Ok(())
}

fn show_config() -> Result<()> {
    let cfg = config::config()?;

    println!("Shipwright configuration");
    println!();
    println!(
        "Config file: {}",
        cfg.config_file
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(none - using defaults)".to_string())
    );
    println!();
    println!("Paths:");
    println!("  Home:    {}", cfg.home.display());
    println!("  Targets: {}", cfg.targets_path().display());
    println!("  History: {} ({})", cfg.history_path().display(), cfg.history);
    println!();
    println!("Build:");
    println!("  Runner:       {}", cfg.runner);
    println!("  Shell:        {}", cfg.build.shell);
    match cfg.build.step_timeout() {
        Some(t) => println!("  Step timeout: {}s", t.as_secs()),
        None => println!("  Step timeout: (none)"),
    }
    println!();
    println!("Sources:");
    println!("  Max file size: {} bytes", cfg.max_file_bytes);
    println!();

    let mut kinds: Vec<String> = AdapterRegistry::with_defaults()
        .kinds()
        .iter()
        .map(|k| k.to_string())
        .collect();
    kinds.sort();
    println!("Providers: {}", kinds.join(", "));

    Ok(())
}

/// Truncate for table display
fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let head: String = s.chars().take(max.saturating_sub(1)).collect();
        format!("{}…", head)
    }
}
