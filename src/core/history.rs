//! Append-only deployment history.
//!
//! Two backends share one contract: the in-memory store for tests and
//! embedding, and a JSONL file store for durability across restarts.
//! Entries are never updated or deleted; rollback selection depends on
//! their append order.

use std::collections::HashSet;
use std::io::SeekFrom;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use fs2::FileExt;
use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncBufReadExt, AsyncSeekExt, AsyncWriteExt, BufReader};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::domain::{DeploymentHistoryEntry, HistoryStatus};
use crate::error::HistoryError;

/// Storage contract for deployment history
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Append an entry; appends are atomic and ordered
    async fn append(&self, entry: DeploymentHistoryEntry) -> Result<Uuid, HistoryError>;

    /// Entries for one target newest-first, or all entries in append order
    async fn query(&self, target_id: Option<&str>) -> Result<Vec<DeploymentHistoryEntry>, HistoryError>;

    /// Look up a single entry
    async fn get(&self, id: Uuid) -> Result<Option<DeploymentHistoryEntry>, HistoryError>;

    /// Successful deploys of a target, newest-first
    async fn successes(&self, target_id: &str) -> Result<Vec<DeploymentHistoryEntry>, HistoryError> {
        Ok(self
            .query(Some(target_id))
            .await?
            .into_iter()
            .filter(|e| e.status == HistoryStatus::Success)
            .collect())
    }
}

/// Apply the query ordering contract to entries in append order
fn select(entries: Vec<DeploymentHistoryEntry>, target_id: Option<&str>) -> Vec<DeploymentHistoryEntry> {
    match target_id {
        Some(id) => entries
            .into_iter()
            .rev()
            .filter(|e| e.target_id == id)
            .collect(),
        None => entries,
    }
}

// ============================================================================
// In-memory backend
// ============================================================================

/// History kept in a vector behind a lock
#[derive(Debug, Default)]
pub struct MemoryHistoryStore {
    entries: RwLock<Vec<DeploymentHistoryEntry>>,
}

impl MemoryHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl HistoryStore for MemoryHistoryStore {
    async fn append(&self, entry: DeploymentHistoryEntry) -> Result<Uuid, HistoryError> {
        let mut entries = self.entries.write().await;
        if entries.iter().any(|e| e.id == entry.id) {
            return Err(HistoryError::Duplicate(entry.id));
        }

        let id = entry.id;
        entries.push(entry);
        Ok(id)
    }

    async fn query(&self, target_id: Option<&str>) -> Result<Vec<DeploymentHistoryEntry>, HistoryError> {
        let entries = self.entries.read().await.clone();
        Ok(select(entries, target_id))
    }

    async fn get(&self, id: Uuid) -> Result<Option<DeploymentHistoryEntry>, HistoryError> {
        Ok(self.entries.read().await.iter().find(|e| e.id == id).cloned())
    }
}

// ============================================================================
// JSONL file backend
// ============================================================================

/// File-based history using newline-delimited JSON.
///
/// Entries are indexed in memory on open. Later reads only parse what was
/// appended since, so lines written by another process still show up.
pub struct JsonlHistoryStore {
    /// Path to the history.jsonl file
    path: PathBuf,

    /// Index of the file up to `Index::offset`; also serializes appends
    index: Mutex<Index>,
}

#[derive(Default)]
struct Index {
    entries: Vec<DeploymentHistoryEntry>,
    ids: HashSet<Uuid>,

    /// Bytes of the file already consumed (always at a line boundary)
    offset: u64,
    line_no: usize,
}

impl JsonlHistoryStore {
    /// Open (or create) a history file and index its entries
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, HistoryError> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let store = Self {
            path,
            index: Mutex::new(Index::default()),
        };
        {
            let mut index = store.index.lock().await;
            store.catch_up(&mut index).await?;
            debug!(path = %store.path.display(), entries = index.entries.len(), "Opened history");
        }
        Ok(store)
    }

    /// Get the path to the history file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Parse complete lines appended since the last read
    async fn catch_up(&self, index: &mut Index) -> Result<(), HistoryError> {
        if !self.path.exists() {
            return Ok(());
        }

        let mut file = File::open(&self.path).await?;
        file.seek(SeekFrom::Start(index.offset)).await?;
        let mut reader = BufReader::new(file);
        let mut buf = Vec::new();

        loop {
            buf.clear();
            let read = reader.read_until(b'\n', &mut buf).await?;
            // EOF, or a line still being written
            if read == 0 || buf.last() != Some(&b'\n') {
                break;
            }
            index.offset += read as u64;
            index.line_no += 1;

            let line = String::from_utf8_lossy(&buf);
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<DeploymentHistoryEntry>(&line) {
                Ok(entry) => {
                    index.ids.insert(entry.id);
                    index.entries.push(entry);
                }
                // A torn write from a crash; earlier entries stay valid
                Err(e) => warn!(path = %self.path.display(), line = index.line_no, error = %e, "Skipping unreadable history line"),
            }
        }

        Ok(())
    }
}

#[async_trait]
impl HistoryStore for JsonlHistoryStore {
    async fn append(&self, entry: DeploymentHistoryEntry) -> Result<Uuid, HistoryError> {
        let mut index = self.index.lock().await;

        let mut line = serde_json::to_string(&entry)?;
        line.push('\n');

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;

        // Exclusive lock keeps lines whole and ids unique across processes
        let std_file = file.into_std().await;
        std_file.lock_exclusive()?;
        let mut file = File::from_std(std_file);
        let written = async {
            self.catch_up(&mut index).await?;
            if index.ids.contains(&entry.id) {
                return Err(HistoryError::Duplicate(entry.id));
            }
            file.write_all(line.as_bytes()).await?;
            file.flush().await?;
            file.sync_data().await?;
            Ok::<(), HistoryError>(())
        }
        .await;
        let std_file = file.into_std().await;
        let unlocked = std_file.unlock();
        written?;
        unlocked?;

        self.catch_up(&mut index).await?;
        debug!(entry_id = %entry.id, target_id = %entry.target_id, status = %entry.status, "Appended history entry");
        Ok(entry.id)
    }

    async fn query(&self, target_id: Option<&str>) -> Result<Vec<DeploymentHistoryEntry>, HistoryError> {
        let mut index = self.index.lock().await;
        self.catch_up(&mut index).await?;
        Ok(select(index.entries.clone(), target_id))
    }

    async fn get(&self, id: Uuid) -> Result<Option<DeploymentHistoryEntry>, HistoryError> {
        let mut index = self.index.lock().await;
        self.catch_up(&mut index).await?;
        if !index.ids.contains(&id) {
            return Ok(None);
        }
        Ok(index.entries.iter().find(|e| e.id == id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn entry(target: &str, status: HistoryStatus) -> DeploymentHistoryEntry {
        DeploymentHistoryEntry::new(target, status, 10)
    }

    #[tokio::test]
    async fn test_memory_query_ordering() {
        let store = MemoryHistoryStore::new();
        let a = store.append(entry("t1", HistoryStatus::Success)).await.unwrap();
        let b = store.append(entry("t2", HistoryStatus::Success)).await.unwrap();
        let c = store.append(entry("t1", HistoryStatus::Failed)).await.unwrap();

        let t1: Vec<Uuid> = store.query(Some("t1")).await.unwrap().iter().map(|e| e.id).collect();
        assert_eq!(t1, vec![c, a]);

        let all: Vec<Uuid> = store.query(None).await.unwrap().iter().map(|e| e.id).collect();
        assert_eq!(all, vec![a, b, c]);
    }

    #[tokio::test]
    async fn test_memory_rejects_duplicate() {
        let store = MemoryHistoryStore::new();
        let e = entry("t1", HistoryStatus::Success);
        store.append(e.clone()).await.unwrap();

        assert!(matches!(
            store.append(e).await,
            Err(HistoryError::Duplicate(_))
        ));
    }

    #[tokio::test]
    async fn test_successes_filter() {
        let store = MemoryHistoryStore::new();
        store.append(entry("t1", HistoryStatus::Success)).await.unwrap();
        store.append(entry("t1", HistoryStatus::Failed)).await.unwrap();
        store.append(entry("t1", HistoryStatus::Rollback)).await.unwrap();

        assert_eq!(store.successes("t1").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_jsonl_append_and_replay() {
        let temp = TempDir::new().unwrap();
        let store = JsonlHistoryStore::open(temp.path().join("history.jsonl")).await.unwrap();

        let first = entry("t1", HistoryStatus::Success).with_artifact("rel-1", Some(3));
        let id = store.append(first.clone()).await.unwrap();
        store.append(entry("t1", HistoryStatus::Failed)).await.unwrap();

        let fetched = store.get(id).await.unwrap().unwrap();
        assert_eq!(fetched, first);
        assert_eq!(store.query(None).await.unwrap().len(), 2);

        let content = std::fs::read_to_string(store.path()).unwrap();
        assert_eq!(content.lines().count(), 2);
    }

    #[tokio::test]
    async fn test_jsonl_skips_torn_line() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("history.jsonl");
        let store = JsonlHistoryStore::open(&path).await.unwrap();
        store.append(entry("t1", HistoryStatus::Success)).await.unwrap();

        let mut content = std::fs::read_to_string(&path).unwrap();
        content.push_str("{\"id\": \"trunc");
        std::fs::write(&path, content).unwrap();

        assert_eq!(store.query(Some("t1")).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_jsonl_sees_appends_from_another_handle() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("history.jsonl");
        let ours = JsonlHistoryStore::open(&path).await.unwrap();
        let theirs = JsonlHistoryStore::open(&path).await.unwrap();

        let shared = entry("t1", HistoryStatus::Success);
        ours.append(entry("t1", HistoryStatus::Success)).await.unwrap();
        theirs.append(shared.clone()).await.unwrap();

        let ids: Vec<Uuid> = ours.query(Some("t1")).await.unwrap().iter().map(|e| e.id).collect();
        assert_eq!(ids.len(), 2);
        assert_eq!(ids[0], shared.id);
        assert_eq!(ours.get(shared.id).await.unwrap(), Some(shared.clone()));

        // Ids stay unique across handles
        assert!(matches!(
            ours.append(shared.clone()).await,
            Err(HistoryError::Duplicate(id)) if id == shared.id
        ));
        assert_eq!(std::fs::read_to_string(&path).unwrap().lines().count(), 2);
    }
}
