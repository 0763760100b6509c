//! Deployment targets and their lifecycle state.
//!
//! A target is a named deployment destination bound to a provider kind.
//! Its `status` field doubles as the per-target mutual-exclusion gate:
//! only one deploy, rollback or cancel may be in flight while it reads
//! `deploying`.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A configured deployment destination
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeploymentTarget {
    /// Unique identifier
    pub id: String,

    /// Display name
    pub name: String,

    /// Hosting provider this target deploys to
    pub provider: ProviderKind,

    /// Current lifecycle status
    pub status: TargetStatus,

    /// When the last successful deploy or rollback finished
    pub last_deployed_at: Option<DateTime<Utc>>,

    /// Reachable URL of the live deployment
    pub url: Option<String>,

    /// Provider-specific settings (opaque to the orchestrator)
    #[serde(default)]
    pub config: BTreeMap<String, String>,

    /// When the target was registered
    pub created_at: DateTime<Utc>,

    /// History entry currently serving traffic
    #[serde(default)]
    pub live_entry: Option<Uuid>,
}

impl DeploymentTarget {
    /// Create a freshly registered, idle target
    pub fn new(config: TargetConfig) -> Self {
        Self {
            id: config.id.unwrap_or_else(|| Uuid::new_v4().to_string()),
            name: config.name,
            provider: config.provider,
            status: TargetStatus::Idle,
            last_deployed_at: None,
            url: None,
            config: config.config,
            created_at: Utc::now(),
            live_entry: None,
        }
    }

    /// Lowercase, dash-separated form of the name, usable in hostnames
    pub fn slug(&self) -> String {
        let mut slug = String::with_capacity(self.name.len());
        for c in self.name.chars() {
            if c.is_ascii_alphanumeric() {
                slug.push(c.to_ascii_lowercase());
            } else if !slug.ends_with('-') {
                slug.push('-');
            }
        }
        let slug = slug.trim_matches('-').to_string();
        if slug.is_empty() {
            "site".to_string()
        } else {
            slug
        }
    }

    /// Look up a provider config value
    pub fn setting(&self, key: &str) -> Option<&str> {
        self.config.get(key).map(String::as_str)
    }

    /// Apply a partial update (status validity is checked by the registry)
    pub fn apply(&mut self, update: TargetUpdate) {
        if let Some(status) = update.status {
            self.status = status;
        }
        if let Some(url) = update.url {
            self.url = Some(url);
        }
        if let Some(at) = update.last_deployed_at {
            self.last_deployed_at = Some(at);
        }
        if let Some(entry) = update.live_entry {
            self.live_entry = Some(entry);
        }
    }
}

/// Registration input for a new target
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetConfig {
    /// Explicit id (a UUID is generated when absent)
    #[serde(default)]
    pub id: Option<String>,

    pub name: String,

    pub provider: ProviderKind,

    #[serde(default)]
    pub config: BTreeMap<String, String>,
}

impl TargetConfig {
    pub fn new(name: impl Into<String>, provider: ProviderKind) -> Self {
        Self {
            id: None,
            name: name.into(),
            provider,
            config: BTreeMap::new(),
        }
    }

    /// Use a caller-chosen id
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Add a provider setting
    pub fn with_setting(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.insert(key.into(), value.into());
        self
    }
}

/// Partial update of the mutable target fields
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TargetUpdate {
    pub status: Option<TargetStatus>,
    pub url: Option<String>,
    pub last_deployed_at: Option<DateTime<Utc>>,
    pub live_entry: Option<Uuid>,
}

impl TargetUpdate {
    /// An update that only changes status
    pub fn status(status: TargetStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    /// Mark a successful deploy or rollback
    pub fn deployed(url: String, entry: Uuid) -> Self {
        Self {
            status: Some(TargetStatus::Deployed),
            url: Some(url),
            last_deployed_at: Some(Utc::now()),
            live_entry: Some(entry),
        }
    }
}

/// Lifecycle status of a target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetStatus {
    /// Registered, nothing in flight
    Idle,

    /// A deploy or rollback is in flight
    Deploying,

    /// Last operation succeeded
    Deployed,

    /// Last operation failed
    Failed,
}

impl TargetStatus {
    /// Whether `self -> next` is an edge of the deployment state machine.
    ///
    /// ```text
    /// idle ─┐
    /// deployed ─┼─> deploying ─> deployed | failed | idle (cancel)
    /// failed ───┘
    /// ```
    pub fn can_transition_to(self, next: TargetStatus) -> bool {
        use TargetStatus::*;
        matches!(
            (self, next),
            (Idle, Deploying)
                | (Deployed, Deploying)
                | (Failed, Deploying)
                | (Deploying, Deployed)
                | (Deploying, Failed)
                | (Deploying, Idle)
        )
    }
}

impl Default for TargetStatus {
    fn default() -> Self {
        Self::Idle
    }
}

impl fmt::Display for TargetStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TargetStatus::Idle => "idle",
            TargetStatus::Deploying => "deploying",
            TargetStatus::Deployed => "deployed",
            TargetStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Hosting provider kinds.
///
/// Unknown names deserialize to `Custom` so new providers only need an
/// adapter registration, not a change to this enum.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ProviderKind {
    StaticHost,
    Container,
    ObjectStorageCdn,
    Generic,
    Custom(String),
}

impl ProviderKind {
    pub fn as_str(&self) -> &str {
        match self {
            ProviderKind::StaticHost => "static-host",
            ProviderKind::Container => "container",
            ProviderKind::ObjectStorageCdn => "object-storage-cdn",
            ProviderKind::Generic => "generic",
            ProviderKind::Custom(name) => name,
        }
    }
}

impl From<String> for ProviderKind {
    fn from(s: String) -> Self {
        match s.as_str() {
            "static-host" => ProviderKind::StaticHost,
            "container" => ProviderKind::Container,
            "object-storage-cdn" => ProviderKind::ObjectStorageCdn,
            "generic" => ProviderKind::Generic,
            _ => ProviderKind::Custom(s),
        }
    }
}

impl From<ProviderKind> for String {
    fn from(kind: ProviderKind) -> Self {
        kind.as_str().to_string()
    }
}

impl FromStr for ProviderKind {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(ProviderKind::from(s.to_string()))
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
