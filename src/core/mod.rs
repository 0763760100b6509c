//! Core orchestration logic.
//!
//! This module contains:
//! - TargetRegistry: Target records and the per-target status gate
//! - PipelineBuilder: Ordered build steps per provider kind
//! - PipelineExecutor: Sequential step execution
//! - HistoryStore: Append-only deployment history
//! - DeploymentCoordinator: Deploy, rollback and cancel

pub mod builder;
pub mod cancel;
pub mod coordinator;
pub mod executor;
pub mod history;
pub mod registry;

// Re-export commonly used types
pub use builder::PipelineBuilder;
pub use cancel::CancellationToken;
pub use coordinator::DeploymentCoordinator;
pub use executor::{ExecutionResult, NoopObserver, PipelineExecutor, PipelineObserver, StepFailure};
pub use history::{HistoryStore, JsonlHistoryStore, MemoryHistoryStore};
pub use registry::TargetRegistry;
