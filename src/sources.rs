//! Project source collection.
//!
//! Walks a project directory and turns it into `ProjectFile`s for a deploy.
//! Secret-looking files and oversized files never leave the machine.

use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use glob::Pattern;
use tracing::{debug, warn};

use crate::domain::ProjectFile;

/// File name patterns that are never collected
pub const DEFAULT_DENYLIST: &[&str] = &[
    ".env",
    ".env.*",
    "*.pem",
    "*.key",
    "*secret*",
    "*credential*",
];

/// Directories that are never descended into
const SKIPPED_DIRS: &[&str] = &[".git", ".shipwright", "node_modules", "target"];

/// Why a file was left out
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    Denylisted,
    TooLarge(u64),
    NotUtf8,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Denylisted => write!(f, "matches secret denylist"),
            Self::TooLarge(size) => write!(f, "too large ({} bytes)", size),
            Self::NotUtf8 => write!(f, "not valid UTF-8"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedFile {
    pub path: String,
    pub reason: SkipReason,
}

/// Files gathered from a project directory
#[derive(Debug, Clone, Default)]
pub struct CollectedSources {
    pub files: Vec<ProjectFile>,
    pub skipped: Vec<SkippedFile>,
}

/// Gathers deployable files from a directory tree
#[derive(Debug, Clone)]
pub struct SourceCollector {
    denylist: Vec<Pattern>,
    max_file_bytes: u64,
}

impl SourceCollector {
    pub fn new(max_file_bytes: u64) -> Self {
        let denylist = DEFAULT_DENYLIST
            .iter()
            .filter_map(|p| Pattern::new(p).ok())
            .collect();

        Self {
            denylist,
            max_file_bytes,
        }
    }

    /// Check a file name (not a full path) against the denylist
    pub fn is_denylisted(&self, file_name: &str) -> bool {
        let lower = file_name.to_ascii_lowercase();
        self.denylist.iter().any(|p| p.matches(&lower))
    }

    /// Collect every eligible file under `root`, sorted by relative path
    pub fn collect(&self, root: &Path) -> Result<CollectedSources> {
        let root = root
            .canonicalize()
            .with_context(|| format!("Failed to open project directory: {}", root.display()))?;

        let escaped = Pattern::escape(&root.to_string_lossy());
        let walk = glob::glob(&format!("{}/**/*", escaped))
            .with_context(|| format!("Invalid project path: {}", root.display()))?;

        let mut collected = CollectedSources::default();

        for entry in walk {
            let path = match entry {
                Ok(path) => path,
                Err(e) => {
                    warn!(error = %e, "Unreadable path during source walk");
                    continue;
                }
            };

            if !path.is_file() {
                continue;
            }

            let Some(relative) = Self::relative(&root, &path) else {
                continue;
            };
            if relative
                .split('/')
                .rev()
                .skip(1)
                .any(|dir| SKIPPED_DIRS.contains(&dir))
            {
                continue;
            }

            let file_name = relative.rsplit('/').next().unwrap_or(&relative);
            if self.is_denylisted(file_name) {
                debug!(path = %relative, "Skipping denylisted file");
                collected.skipped.push(SkippedFile {
                    path: relative,
                    reason: SkipReason::Denylisted,
                });
                continue;
            }

            let size = std::fs::metadata(&path)
                .with_context(|| format!("Failed to stat {}", path.display()))?
                .len();
            if size > self.max_file_bytes {
                collected.skipped.push(SkippedFile {
                    path: relative,
                    reason: SkipReason::TooLarge(size),
                });
                continue;
            }

            let bytes = std::fs::read(&path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            match String::from_utf8(bytes) {
                Ok(content) => collected.files.push(ProjectFile {
                    path: relative,
                    content,
                }),
                Err(_) => collected.skipped.push(SkippedFile {
                    path: relative,
                    reason: SkipReason::NotUtf8,
                }),
            }
        }

        collected.files.sort_by(|a, b| a.path.cmp(&b.path));
        debug!(
            root = %root.display(),
            files = collected.files.len(),
            skipped = collected.skipped.len(),
            "Collected sources"
        );
        Ok(collected)
    }

    /// Path relative to `root` with `/` separators
    fn relative(root: &Path, path: &Path) -> Option<String> {
        let rel: PathBuf = path.strip_prefix(root).ok()?.to_path_buf();
        let parts: Vec<String> = rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        Some(parts.join("/"))
    }
}
