//! Configuration for shipwright.
//!
//! Configuration sources (highest priority first):
//! 1. Environment variables (SHIPWRIGHT_HOME, SHIPWRIGHT_RUNNER)
//! 2. Config file (.shipwright/config.yaml)
//! 3. Defaults (~/.shipwright)
//!
//! Config file discovery:
//! - Searches current directory and parents for .shipwright/config.yaml
//! - `home` in the config file is relative to the .shipwright/ directory

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::OnceLock;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::Deserialize;

/// Global cached configuration (stores Result to handle init errors)
static CONFIG: OnceLock<Result<ResolvedConfig, String>> = OnceLock::new();

const DEFAULT_STEP_TIMEOUT_SECONDS: u64 = 600;
const DEFAULT_SHELL: &str = "sh";
const DEFAULT_MAX_FILE_BYTES: u64 = 1_048_576;

/// Raw config file schema (matches YAML structure)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub version: Option<String>,
    /// Engine state directory (relative to .shipwright/)
    pub home: Option<String>,
    pub history: Option<String>,
    pub runner: Option<String>,
    #[serde(default)]
    pub build: BuildSection,
    #[serde(default)]
    pub sources: SourcesSection,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BuildSection {
    pub step_timeout_seconds: Option<u64>,
    pub shell: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SourcesSection {
    pub max_file_bytes: Option<u64>,
}

/// Where deployment history is kept
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HistoryBackend {
    #[default]
    Jsonl,
    Memory,
}

impl FromStr for HistoryBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "jsonl" => Ok(Self::Jsonl),
            "memory" => Ok(Self::Memory),
            other => bail!("Unknown history backend '{}' (expected jsonl or memory)", other),
        }
    }
}

impl fmt::Display for HistoryBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Jsonl => write!(f, "jsonl"),
            Self::Memory => write!(f, "memory"),
        }
    }
}

/// Which step runner executes build commands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunnerKind {
    #[default]
    Simulated,
    Process,
}

impl FromStr for RunnerKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "simulated" => Ok(Self::Simulated),
            "process" => Ok(Self::Process),
            other => bail!("Unknown runner '{}' (expected simulated or process)", other),
        }
    }
}

impl fmt::Display for RunnerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Simulated => write!(f, "simulated"),
            Self::Process => write!(f, "process"),
        }
    }
}

/// Resolved configuration with absolute paths
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    /// Absolute path to shipwright home (engine state)
    pub home: PathBuf,
    pub history: HistoryBackend,
    pub runner: RunnerKind,
    pub build: BuildSettings,
    /// Files larger than this are left out of deploys
    pub max_file_bytes: u64,
    /// Path to config file (if found)
    pub config_file: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct BuildSettings {
    pub step_timeout_seconds: u64,
    pub shell: String,
}

impl Default for BuildSettings {
    fn default() -> Self {
        Self {
            step_timeout_seconds: DEFAULT_STEP_TIMEOUT_SECONDS,
            shell: DEFAULT_SHELL.to_string(),
        }
    }
}

impl BuildSettings {
    /// Per-step timeout; zero disables it
    pub fn step_timeout(&self) -> Option<Duration> {
        (self.step_timeout_seconds > 0).then(|| Duration::from_secs(self.step_timeout_seconds))
    }
}

impl ResolvedConfig {
    /// Registry snapshot ($SHIPWRIGHT_HOME/targets.json)
    pub fn targets_path(&self) -> PathBuf {
        self.home.join("targets.json")
    }

    /// History log ($SHIPWRIGHT_HOME/history.jsonl)
    pub fn history_path(&self) -> PathBuf {
        self.home.join("history.jsonl")
    }
}

/// Find config file by searching `start` and its parents
fn find_config_file(start: &Path) -> Option<PathBuf> {
    let mut current = start.to_path_buf();

    loop {
        let config_path = current.join(".shipwright").join("config.yaml");
        if config_path.exists() {
            return Some(config_path);
        }

        if !current.pop() {
            break;
        }
    }

    None
}

/// Load and parse config file
fn load_config_file(path: &Path) -> Result<ConfigFile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Resolve a path that may be relative to `base`
fn resolve_path(base: &Path, path_str: &str) -> PathBuf {
    let path = PathBuf::from(path_str);
    if path.is_absolute() {
        path
    } else {
        base.join(path)
            .canonicalize()
            .unwrap_or_else(|_| base.join(path_str))
    }
}

/// Combine file settings and environment overrides
fn resolve(
    file: ConfigFile,
    config_file: Option<PathBuf>,
    env_home: Option<String>,
    env_runner: Option<String>,
    default_home: PathBuf,
) -> Result<ResolvedConfig> {
    let home = if let Some(env_home) = env_home {
        PathBuf::from(env_home)
    } else if let (Some(home_path), Some(config_path)) = (&file.home, &config_file) {
        let dot_dir = config_path.parent().unwrap_or(Path::new("."));
        resolve_path(dot_dir, home_path)
    } else {
        default_home
    };

    let history = match file.history {
        Some(raw) => raw.parse()?,
        None => HistoryBackend::default(),
    };

    let runner = match env_runner.or(file.runner) {
        Some(raw) => raw.parse()?,
        None => RunnerKind::default(),
    };

    let defaults = BuildSettings::default();
    let build = BuildSettings {
        step_timeout_seconds: file
            .build
            .step_timeout_seconds
            .unwrap_or(defaults.step_timeout_seconds),
        shell: file.build.shell.unwrap_or(defaults.shell),
    };

    Ok(ResolvedConfig {
        home,
        history,
        runner,
        build,
        max_file_bytes: file.sources.max_file_bytes.unwrap_or(DEFAULT_MAX_FILE_BYTES),
        config_file,
    })
}

/// Load configuration from all sources
fn load_config() -> Result<ResolvedConfig> {
    let default_home = dirs::home_dir()
        .context("Failed to determine home directory")?
        .join(".shipwright");

    let cwd = std::env::current_dir().context("Failed to determine current directory")?;
    let config_file = find_config_file(&cwd);
    let file = match &config_file {
        Some(path) => load_config_file(path)?,
        None => ConfigFile::default(),
    };

    resolve(
        file,
        config_file,
        std::env::var("SHIPWRIGHT_HOME").ok(),
        std::env::var("SHIPWRIGHT_RUNNER").ok(),
        default_home,
    )
}

/// Get the global configuration (loads once, then cached)
pub fn config() -> Result<&'static ResolvedConfig> {
    let result = CONFIG.get_or_init(|| load_config().map_err(|e| format!("{:#}", e)));

    match result {
        Ok(config) => Ok(config),
        Err(e) => bail!("{}", e),
    }
}

/// Get the shipwright home directory (engine state)
pub fn shipwright_home() -> Result<PathBuf> {
    Ok(config()?.home.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    fn write_config(root: &Path, body: &str) -> PathBuf {
        let dot_dir = root.join(".shipwright");
        std::fs::create_dir_all(&dot_dir).unwrap();
        let config_path = dot_dir.join("config.yaml");
        let mut file = std::fs::File::create(&config_path).unwrap();
        writeln!(file, "{}", body).unwrap();
        config_path
    }

    #[test]
    fn test_defaults_without_file() {
        let config = resolve(
            ConfigFile::default(),
            None,
            None,
            None,
            PathBuf::from("/home/dev/.shipwright"),
        )
        .unwrap();

        assert_eq!(config.home, PathBuf::from("/home/dev/.shipwright"));
        assert_eq!(config.history, HistoryBackend::Jsonl);
        assert_eq!(config.runner, RunnerKind::Simulated);
        assert_eq!(config.build.step_timeout_seconds, 600);
        assert_eq!(config.build.shell, "sh");
        assert_eq!(config.max_file_bytes, 1_048_576);
        assert_eq!(
            config.history_path(),
            PathBuf::from("/home/dev/.shipwright/history.jsonl")
        );
    }

    #[test]
    fn test_config_file_parsing() {
        let temp = TempDir::new().unwrap();
        let config_path = write_config(
            temp.path(),
            r#"
version: "1"
home: ./state
history: memory
runner: process
build:
  step_timeout_seconds: 30
  shell: bash
sources:
  max_file_bytes: 2048
"#,
        );

        let file = load_config_file(&config_path).unwrap();
        let config = resolve(file, Some(config_path.clone()), None, None, PathBuf::from("/unused")).unwrap();

        assert_eq!(config.home, temp.path().join(".shipwright").join("state"));
        assert_eq!(config.history, HistoryBackend::Memory);
        assert_eq!(config.runner, RunnerKind::Process);
        assert_eq!(config.build.step_timeout(), Some(Duration::from_secs(30)));
        assert_eq!(config.build.shell, "bash");
        assert_eq!(config.max_file_bytes, 2048);
        assert_eq!(config.config_file, Some(config_path));
    }

    #[test]
    fn test_env_overrides_file() {
        let file = ConfigFile {
            home: Some("/from/file".to_string()),
            runner: Some("process".to_string()),
            ..Default::default()
        };

        let config = resolve(
            file,
            Some(PathBuf::from("/project/.shipwright/config.yaml")),
            Some("/from/env".to_string()),
            Some("simulated".to_string()),
            PathBuf::from("/unused"),
        )
        .unwrap();

        assert_eq!(config.home, PathBuf::from("/from/env"));
        assert_eq!(config.runner, RunnerKind::Simulated);
    }

    #[test]
    fn test_unknown_backend_rejected() {
        let file = ConfigFile {
            history: Some("sqlite".to_string()),
            ..Default::default()
        };
        assert!(resolve(file, None, None, None, PathBuf::from("/h")).is_err());
    }

    #[test]
    fn test_find_config_walks_up() {
        let temp = TempDir::new().unwrap();
        let config_path = write_config(temp.path(), "runner: simulated");
        let nested = temp.path().join("apps").join("web");
        std::fs::create_dir_all(&nested).unwrap();

        assert_eq!(find_config_file(&nested), Some(config_path));
    }

    #[test]
    fn test_zero_timeout_disables() {
        let build = BuildSettings {
            step_timeout_seconds: 0,
            ..Default::default()
        };
        assert_eq!(build.step_timeout(), None);
    }

    #[test]
    fn test_resolve_relative_path() {
        let base = PathBuf::from("/home/user/project");

        assert_eq!(
            resolve_path(&base, "/absolute/path"),
            PathBuf::from("/absolute/path")
        );
        assert_eq!(
            resolve_path(&base, "./subdir"),
            PathBuf::from("/home/user/project/subdir")
        );
    }
}
