//! Deployment coordinator.
//!
//! Drives deploy, rollback and cancel for targets. The coordinator is the
//! only writer of target state and history; builder, executor and adapters
//! report back to it. A target's `deploying` status is the per-target
//! mutual-exclusion gate, so a second operation on a busy target fails fast
//! instead of queueing.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::{watch, Mutex};
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::adapters::{AdapterRegistry, DeployResult, ProviderAdapter};
use crate::domain::{
    Artifact, BuildConfig, DeploymentHistoryEntry, DeploymentTarget, HistoryStatus, ProjectFile,
    TargetConfig, TargetStatus, TargetUpdate,
};
use crate::error::{AdapterError, DeployError};
use crate::runner::StepRunner;

use super::builder::PipelineBuilder;
use super::cancel::CancellationToken;
use super::executor::{ExecutionResult, PipelineExecutor, PipelineObserver};
use super::history::{HistoryStore, MemoryHistoryStore};
use super::registry::TargetRegistry;

/// Bookkeeping for one in-flight deploy or rollback
struct InFlight {
    op_id: Uuid,
    cancel: CancellationToken,

    /// Closed when the operation has unwound; `true` once it honored a cancel
    done: watch::Receiver<bool>,
}

/// Releases the in-flight slot and signals waiters when dropped
struct InFlightGuard {
    op_id: Uuid,
    target_id: String,
    active: Arc<Mutex<HashMap<String, InFlight>>>,
    done: watch::Sender<bool>,
}

impl InFlightGuard {
    fn mark_cancelled(&self) {
        self.done.send_replace(true);
    }

    fn release(active: &mut HashMap<String, InFlight>, target_id: &str, op_id: Uuid) {
        // A newer operation may already own the slot
        if active.get(target_id).is_some_and(|op| op.op_id == op_id) {
            active.remove(target_id);
        }
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        // The map lock is only held for a registry lookup, so this rarely misses
        if let Ok(mut active) = self.active.try_lock() {
            Self::release(&mut active, &self.target_id, self.op_id);
        } else {
            let active = self.active.clone();
            let target_id = std::mem::take(&mut self.target_id);
            let op_id = self.op_id;
            tokio::spawn(async move {
                Self::release(&mut *active.lock().await, &target_id, op_id);
            });
        }
    }
}

/// A target held by one operation, from `try_begin` until the guard drops
struct Held {
    /// The target as it was before the gate was taken
    before: DeploymentTarget,
    cancel: CancellationToken,
    guard: InFlightGuard,
}

impl Held {
    fn target(&self) -> DeploymentTarget {
        DeploymentTarget {
            status: TargetStatus::Deploying,
            ..self.before.clone()
        }
    }
}

/// Orchestrates deploys, rollbacks and cancellations
pub struct DeploymentCoordinator {
    registry: Arc<TargetRegistry>,
    history: Arc<dyn HistoryStore>,
    adapters: AdapterRegistry,
    builder: PipelineBuilder,
    executor: PipelineExecutor,
    active: Arc<Mutex<HashMap<String, InFlight>>>,
}

impl DeploymentCoordinator {
    /// Coordinator with an empty registry, in-memory history and the
    /// built-in adapters
    pub fn new(runner: Arc<dyn StepRunner>) -> Self {
        Self::with_parts(
            Arc::new(TargetRegistry::new()),
            Arc::new(MemoryHistoryStore::new()),
            AdapterRegistry::with_defaults(),
            PipelineExecutor::new(runner),
        )
    }

    /// Coordinator over explicit collaborators
    pub fn with_parts(
        registry: Arc<TargetRegistry>,
        history: Arc<dyn HistoryStore>,
        adapters: AdapterRegistry,
        executor: PipelineExecutor,
    ) -> Self {
        Self {
            registry,
            history,
            adapters,
            builder: PipelineBuilder::new(),
            executor,
            active: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Report pipeline progress to `observer`
    pub fn with_observer(mut self, observer: Arc<dyn PipelineObserver>) -> Self {
        self.executor = self.executor.with_observer(observer);
        self
    }

    pub fn registry(&self) -> &Arc<TargetRegistry> {
        &self.registry
    }

    pub fn history(&self) -> &Arc<dyn HistoryStore> {
        &self.history
    }

    // ------------------------------------------------------------------
    // Targets
    // ------------------------------------------------------------------

    pub async fn register_target(&self, config: TargetConfig) -> Result<String, DeployError> {
        let id = self.registry.register(config).await?;
        info!(target_id = %id, "Target registered");
        Ok(id)
    }

    pub async fn list_targets(&self) -> Vec<DeploymentTarget> {
        self.registry.list().await
    }

    pub async fn get_target(&self, target_id: &str) -> Result<DeploymentTarget, DeployError> {
        self.registry.get(target_id).await
    }

    pub async fn remove_target(&self, target_id: &str) -> Result<DeploymentTarget, DeployError> {
        let removed = self.registry.remove(target_id).await?;
        info!(target_id, "Target removed");
        Ok(removed)
    }

    // ------------------------------------------------------------------
    // Deploy
    // ------------------------------------------------------------------

    /// Build, test and publish `files` to a target, returning its URL
    #[instrument(skip(self, files, config), fields(files = files.len()))]
    pub async fn deploy(
        &self,
        target_id: &str,
        files: Vec<ProjectFile>,
        config: BuildConfig,
    ) -> Result<String, DeployError> {
        let held = self.begin(target_id).await?;
        let target = held.target();

        let started = Instant::now();
        info!(provider = %target.provider, "Starting deployment");

        let mut pipeline = self.builder.build(&target, files, config);
        let execution = self.executor.execute(&mut pipeline, &held.cancel).await;
        let mut logs = pipeline.logs.clone();

        let artifacts = match execution {
            ExecutionResult::Completed { artifacts } => artifacts,
            ExecutionResult::Cancelled => return self.finish_cancelled(&held, target_id).await,
            ExecutionResult::Failed(failure) => {
                let err = DeployError::StepFailed {
                    target_id: target_id.to_string(),
                    step: failure.step.clone(),
                    message: failure.message.clone(),
                };
                let entry = DeploymentHistoryEntry::new(
                    target_id,
                    HistoryStatus::Failed,
                    started.elapsed().as_millis() as u64,
                )
                .with_error(format!("step '{}' failed: {}", failure.step, failure.message))
                .with_logs(logs);
                return self.record_failure(target_id, entry, err).await;
            }
        };

        // Cancelled between the last step and publishing: nothing went live
        if held.cancel.is_cancelled() {
            return self.finish_cancelled(&held, target_id).await;
        }

        let release = artifacts.first().cloned();

        match self.publish(&target, &artifacts).await {
            Ok(result) => {
                logs.extend(result.logs.iter().map(|l| format!("[{}] {}", target.provider, l)));
                let mut entry = DeploymentHistoryEntry::new(
                    target_id,
                    HistoryStatus::Success,
                    started.elapsed().as_millis() as u64,
                )
                .with_url(result.url.clone())
                .with_logs(logs);
                if let Some(release) = release {
                    entry = entry.with_artifact(release.reference, Some(release.size_bytes));
                }

                self.record_success(target_id, entry, result.url).await
            }
            Err(adapter_err) => {
                let err = self.adapter_failed(&target, adapter_err, &mut logs);
                let mut entry = DeploymentHistoryEntry::new(
                    target_id,
                    HistoryStatus::Failed,
                    started.elapsed().as_millis() as u64,
                )
                .with_error(err.to_string())
                .with_logs(logs);
                if let Some(release) = release {
                    entry = entry.with_artifact(release.reference, Some(release.size_bytes));
                }

                self.record_failure(target_id, entry, err).await
            }
        }
    }

    // ------------------------------------------------------------------
    // Rollback
    // ------------------------------------------------------------------

    /// Redeploy the artifact of the second-most-recent successful deploy.
    ///
    /// The most recent success is taken to be the live one. That holds
    /// because the candidate is chosen while the status gate is held, so no
    /// other deploy can land in between.
    #[instrument(skip(self))]
    pub async fn rollback(&self, target_id: &str) -> Result<(), DeployError> {
        let held = self.begin(target_id).await?;
        let target = held.target();
        let started = Instant::now();

        let previous = match self.history.successes(target_id).await {
            Ok(successes) => successes.get(1).cloned(),
            Err(e) => {
                self.release(&held, target_id).await;
                return Err(e.into());
            }
        };
        let Some(previous) = previous else {
            self.release(&held, target_id).await;
            return Err(DeployError::NoPreviousDeployment(target_id.to_string()));
        };
        let artifact_ref = previous.artifact_ref.clone().unwrap_or_default();

        if held.cancel.is_cancelled() {
            return self.finish_cancelled(&held, target_id).await;
        }
        info!(restore = %previous.id, artifact = %artifact_ref, "Rolling back");

        let mut logs = vec![format!(
            "Rolling back to deployment {} ({})",
            previous.id, artifact_ref
        )];

        let outcome = match self.adapters.get(&target.provider) {
            Some(adapter) => adapter.rollback(&artifact_ref, &target).await,
            None => Err(Self::missing_adapter(&target)),
        };

        match outcome {
            Ok(result) => {
                logs.extend(result.logs.iter().map(|l| format!("[{}] {}", target.provider, l)));
                let entry = DeploymentHistoryEntry::new(
                    target_id,
                    HistoryStatus::Rollback,
                    started.elapsed().as_millis() as u64,
                )
                .with_artifact(artifact_ref, previous.size_bytes)
                .with_url(result.url.clone())
                .restored_from(previous.id)
                .with_logs(logs);

                self.record_success(target_id, entry, result.url).await?;
                Ok(())
            }
            Err(adapter_err) => {
                let err = self.adapter_failed(&target, adapter_err, &mut logs);
                let entry = DeploymentHistoryEntry::new(
                    target_id,
                    HistoryStatus::Failed,
                    started.elapsed().as_millis() as u64,
                )
                .with_artifact(artifact_ref, previous.size_bytes)
                .with_error(err.to_string())
                .with_logs(logs);

                self.record_failure(target_id, entry, err).await
            }
        }
    }

    // ------------------------------------------------------------------
    // Cancel
    // ------------------------------------------------------------------

    /// Cooperatively cancel the in-flight operation on a target.
    ///
    /// Waits until the operation has unwound. A step that is already
    /// running finishes first. If the operation got past its last
    /// cancellation point it completes normally and this returns
    /// `CancelTooLate` with the status it ended in.
    #[instrument(skip(self))]
    pub async fn cancel_deployment(&self, target_id: &str) -> Result<(), DeployError> {
        // `begin` publishes the status and the in-flight entry under this lock
        let mut done = {
            let active = self.active.lock().await;
            let target = self.registry.get(target_id).await?;
            match active.get(target_id) {
                Some(op) if target.status == TargetStatus::Deploying => {
                    op.cancel.cancel();
                    op.done.clone()
                }
                _ => {
                    return Err(DeployError::InvalidState {
                        target_id: target_id.to_string(),
                        status: target.status,
                        reason: "no deployment in progress".to_string(),
                    })
                }
            }
        };

        info!("Cancellation requested, waiting for in-flight step");
        // Err means the sender was dropped: the operation is over
        while done.changed().await.is_ok() {}

        let honored = *done.borrow();
        if honored {
            return Ok(());
        }

        let status = self.registry.get(target_id).await?.status;
        warn!(%status, "Operation finished before the cancellation took effect");
        Err(DeployError::CancelTooLate {
            target_id: target_id.to_string(),
            status,
        })
    }

    // ------------------------------------------------------------------
    // History
    // ------------------------------------------------------------------

    /// History newest-first for a target, or everything in append order
    pub async fn deployment_history(
        &self,
        target_id: Option<&str>,
    ) -> Result<Vec<DeploymentHistoryEntry>, DeployError> {
        Ok(self.history.query(target_id).await?)
    }

    /// Log lines of one recorded deployment
    pub async fn deployment_logs(&self, deployment_id: Uuid) -> Result<Vec<String>, DeployError> {
        self.history
            .get(deployment_id)
            .await?
            .map(|entry| entry.logs)
            .ok_or_else(|| DeployError::deployment_not_found(deployment_id))
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    /// Take the per-target gate and register the operation for cancellation.
    ///
    /// Both happen under the in-flight lock, so `cancel_deployment` never
    /// sees a `deploying` target without its token.
    async fn begin(&self, target_id: &str) -> Result<Held, DeployError> {
        let mut active = self.active.lock().await;
        let before = self.registry.try_begin(target_id).await.map_err(|e| {
            if matches!(e, DeployError::AlreadyInProgress(_)) {
                warn!(target_id, "Rejected: deployment already in progress");
            }
            e
        })?;

        let op_id = Uuid::new_v4();
        let cancel = CancellationToken::new();
        let (done_tx, done_rx) = watch::channel(false);
        active.insert(
            target_id.to_string(),
            InFlight {
                op_id,
                cancel: cancel.clone(),
                done: done_rx,
            },
        );

        Ok(Held {
            before,
            cancel,
            guard: InFlightGuard {
                op_id,
                target_id: target_id.to_string(),
                active: self.active.clone(),
                done: done_tx,
            },
        })
    }

    /// Give the gate back without recording anything
    async fn release(&self, held: &Held, target_id: &str) {
        if let Err(e) = self.registry.release(target_id, held.before.status).await {
            error!(target_id, error = %e, "Failed to release target");
        }
    }

    async fn publish(
        &self,
        target: &DeploymentTarget,
        artifacts: &[Artifact],
    ) -> Result<DeployResult, AdapterError> {
        let adapter: Arc<dyn ProviderAdapter> = self
            .adapters
            .get(&target.provider)
            .ok_or_else(|| Self::missing_adapter(target))?;
        adapter.deploy(artifacts, target).await
    }

    fn missing_adapter(target: &DeploymentTarget) -> AdapterError {
        AdapterError::new(format!(
            "no adapter registered for provider '{}'",
            target.provider
        ))
    }

    fn adapter_failed(
        &self,
        target: &DeploymentTarget,
        adapter_err: AdapterError,
        logs: &mut Vec<String>,
    ) -> DeployError {
        logs.extend(
            adapter_err
                .logs
                .iter()
                .map(|l| format!("[{}] {}", target.provider, l)),
        );
        logs.push(format!("[{}] failed: {}", target.provider, adapter_err.message));

        DeployError::AdapterFailed {
            target_id: target.id.clone(),
            provider: target.provider.to_string(),
            message: adapter_err.message,
            logs: adapter_err.logs,
        }
    }

    async fn record_success(
        &self,
        target_id: &str,
        entry: DeploymentHistoryEntry,
        url: String,
    ) -> Result<String, DeployError> {
        let status = entry.status;
        let entry_id = match self.history.append(entry).await {
            Ok(id) => id,
            Err(e) => {
                error!(target_id, error = %e, "Failed to record deployment");
                self.set_status(target_id, TargetStatus::Failed).await;
                return Err(e.into());
            }
        };

        self.registry
            .update(target_id, TargetUpdate::deployed(url.clone(), entry_id))
            .await?;
        info!(target_id, %entry_id, %url, %status, "Deployment live");
        Ok(url)
    }

    async fn record_failure<T>(
        &self,
        target_id: &str,
        entry: DeploymentHistoryEntry,
        err: DeployError,
    ) -> Result<T, DeployError> {
        error!(target_id, error = %err, "Deployment failed");

        let appended = self.history.append(entry).await;
        self.set_status(target_id, TargetStatus::Failed).await;
        appended?;

        Err(err)
    }

    async fn finish_cancelled<T>(&self, held: &Held, target_id: &str) -> Result<T, DeployError> {
        info!(target_id, "Deployment cancelled");
        self.set_status(target_id, TargetStatus::Idle).await;
        held.guard.mark_cancelled();
        Err(DeployError::Cancelled(target_id.to_string()))
    }

    /// Status change out of `deploying`; the gate guarantees the edge is valid
    async fn set_status(&self, target_id: &str, status: TargetStatus) {
        if let Err(e) = self
            .registry
            .update(target_id, TargetUpdate::status(status))
            .await
        {
            error!(target_id, error = %e, "Failed to update target status");
        }
    }
}
