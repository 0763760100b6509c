//! Target CLI subcommands.
//!
//! Provides commands to:
//! - `add`: Register a deployment target
//! - `list`: Show all targets and their status
//! - `show`: Display one target with its settings
//! - `remove`: Unregister an idle target

use anyhow::{Context, Result};
use clap::Subcommand;

use super::{parse_key_val, truncate, Workspace};
use crate::domain::{ProviderKind, TargetConfig};

/// Target-related subcommands
#[derive(Subcommand, Debug)]
pub enum TargetCommands {
    /// Register a new deployment target
    Add {
        /// Display name
        name: String,

        /// Provider kind: static-host, container, object-storage-cdn, generic,
        /// or any custom name
        #[arg(short, long)]
        provider: String,

        /// Explicit target ID (a UUID is generated if omitted)
        #[arg(long)]
        id: Option<String>,

        /// Provider setting (repeatable), e.g. --set region=eu-west-1
        #[arg(long = "set", value_name = "KEY=VALUE", value_parser = parse_key_val)]
        settings: Vec<(String, String)>,
    },

    /// List registered targets
    List,

    /// Show details of a target
    Show {
        /// Target ID
        target_id: String,
    },

    /// Remove a target
    Remove {
        /// Target ID
        target_id: String,
    },
}

/// Execute target subcommands
pub async fn execute(ws: &Workspace, command: TargetCommands) -> Result<()> {
    match command {
        TargetCommands::Add {
            name,
            provider,
            id,
            settings,
        } => add(ws, name, &provider, id, settings).await,
        TargetCommands::List => list(ws).await,
        TargetCommands::Show { target_id } => show(ws, &target_id).await,
        TargetCommands::Remove { target_id } => remove(ws, &target_id).await,
    }
}

async fn add(
    ws: &Workspace,
    name: String,
    provider: &str,
    id: Option<String>,
    settings: Vec<(String, String)>,
) -> Result<()> {
    let provider = ProviderKind::from(provider.to_string());
    if let ProviderKind::Custom(ref custom) = provider {
        eprintln!(
            "Note: '{}' is a custom provider; deploys need an adapter registered for it",
            custom
        );
    }

    let mut config = TargetConfig::new(name, provider);
    if let Some(id) = id {
        config = config.with_id(id);
    }
    for (key, value) in settings {
        config = config.with_setting(key, value);
    }

    let target_id = ws.coordinator.register_target(config).await?;
    ws.save().await?;

    eprintln!("✓ Registered target");
    println!("{}", target_id);
    Ok(())
}

async fn list(ws: &Workspace) -> Result<()> {
    let mut targets = ws.coordinator.list_targets().await;
    if targets.is_empty() {
        println!("No targets registered. Use 'shipwright target add' to create one.");
        return Ok(());
    }
    targets.sort_by(|a, b| a.created_at.cmp(&b.created_at));

    println!(
        "{:<38} {:<20} {:<18} {:<10} {}",
        "ID", "NAME", "PROVIDER", "STATUS", "URL"
    );
    println!("{}", "-".repeat(110));
    for target in &targets {
        println!(
            "{:<38} {:<20} {:<18} {:<10} {}",
            target.id,
            truncate(&target.name, 20),
            target.provider,
            target.status,
            target.url.as_deref().unwrap_or("-")
        );
    }

    println!("\nTotal: {} target(s)", targets.len());
    Ok(())
}

async fn show(ws: &Workspace, target_id: &str) -> Result<()> {
    let target = ws.coordinator.get_target(target_id).await?;

    println!("Target ID: {}", target.id);
    println!("Name: {}", target.name);
    println!("Provider: {}", target.provider);
    println!("Status: {}", target.status);
    println!("Created: {}", target.created_at);
    if let Some(deployed) = target.last_deployed_at {
        println!("Last deployed: {}", deployed);
    }
    if let Some(url) = &target.url {
        println!("URL: {}", url);
    }
    if let Some(entry) = target.live_entry {
        println!("Live deployment: {}", entry);
    }

    if !target.config.is_empty() {
        println!("\nSettings:");
        for (key, value) in &target.config {
            println!("  {}: {}", key, value);
        }
    }
    Ok(())
}

async fn remove(ws: &Workspace, target_id: &str) -> Result<()> {
    let removed = ws
        .coordinator
        .remove_target(target_id)
        .await
        .with_context(|| format!("Failed to remove target {}", target_id))?;
    ws.save().await?;

    eprintln!("✓ Removed target {} ({})", removed.id, removed.name);
    Ok(())
}
