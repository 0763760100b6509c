//! shipwright - Deployment orchestration engine
//!
//! Takes a project's source files, runs them through a provider-specific
//! build pipeline, publishes the result through a provider adapter, and
//! keeps an append-only history that rollbacks are driven from.
//!
//! # Architecture
//!
//! Everything funnels through the `DeploymentCoordinator`:
//! - A target's status doubles as its lock: one deploy or rollback at a time
//! - Pipelines run step by step through an injected `StepRunner`
//! - Every finished attempt is recorded; cancelled ones are not
//!
//! # Modules
//!
//! - `adapters`: Provider integrations (static host, container, CDN, generic)
//! - `core`: Registry, builder, executor, history and coordinator
//! - `domain`: Data structures (Target, Pipeline, Artifact, History)
//! - `runner`: Step runners (simulated, local process)
//! - `sources`: Project file collection with secret denylist
//! - `cli`: Command-line interface
//!
//! # Usage
//!
//! ```bash
//! # Register a target
//! shipwright target add docs --provider static-host
//!
//! # Deploy the current directory
//! shipwright deploy <target-id>
//!
//! # Go back to the previous release
//! shipwright rollback <target-id>
//! ```

pub mod adapters;
pub mod cli;
pub mod config;
pub mod core;
pub mod domain;
pub mod error;
pub mod runner;
pub mod sources;

// Re-export main types at crate root for convenience
pub use core::{DeploymentCoordinator, HistoryStore, PipelineObserver, TargetRegistry};
pub use domain::{
    Artifact, BuildConfig, DeploymentHistoryEntry, DeploymentTarget, HistoryStatus, ProjectFile,
    ProviderKind, TargetConfig, TargetStatus,
};
pub use error::DeployError;
