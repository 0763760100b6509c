//! History Store Integration Tests
//!
//! Durability and append-only behavior of the JSONL store.

use shipwright::core::{HistoryStore, JsonlHistoryStore};
use shipwright::error::HistoryError;
use shipwright::{DeploymentHistoryEntry, HistoryStatus};
use tempfile::TempDir;
use tokio_test::assert_ok;

fn success(target: &str, reference: &str) -> DeploymentHistoryEntry {
    DeploymentHistoryEntry::new(target, HistoryStatus::Success, 120)
        .with_artifact(reference, Some(2048))
        .with_url(format!("https://{}.example.test", target))
        .with_logs(vec!["[build] completed in 3ms".to_string()])
}

#[tokio::test]
async fn test_history_survives_reopen() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("state").join("history.jsonl");

    let first = success("web", "rel-aaa");
    let second = success("web", "rel-bbb");
    {
        let store = JsonlHistoryStore::open(&path).await.unwrap();
        store.append(first.clone()).await.unwrap();
        store.append(second.clone()).await.unwrap();
    }

    let reopened = JsonlHistoryStore::open(&path).await.unwrap();
    let entries = reopened.query(Some("web")).await.unwrap();
    assert_eq!(entries, vec![second, first.clone()]);
    assert_eq!(reopened.get(first.id).await.unwrap(), Some(first));
}

#[tokio::test]
async fn test_entries_are_immutable() {
    let temp = TempDir::new().unwrap();
    let store = JsonlHistoryStore::open(temp.path().join("history.jsonl")).await.unwrap();

    let entry = success("api", "rel-1");
    store.append(entry.clone()).await.unwrap();

    let mut changed = entry.clone();
    changed.status = HistoryStatus::Failed;
    assert!(matches!(
        store.append(changed).await,
        Err(HistoryError::Duplicate(id)) if id == entry.id
    ));

    store.append(success("api", "rel-2")).await.unwrap();
    assert_eq!(store.get(entry.id).await.unwrap(), Some(entry));
}

#[tokio::test]
async fn test_query_all_keeps_append_order() {
    let temp = TempDir::new().unwrap();
    let store = JsonlHistoryStore::open(temp.path().join("history.jsonl")).await.unwrap();

    let a = assert_ok!(store.append(success("a", "rel-a")).await);
    let b = store.append(success("b", "rel-b")).await.unwrap();
    let c = store
        .append(DeploymentHistoryEntry::new("a", HistoryStatus::Failed, 5).with_error("boom"))
        .await
        .unwrap();

    let ids: Vec<_> = store.query(None).await.unwrap().into_iter().map(|e| e.id).collect();
    assert_eq!(ids, vec![a, b, c]);

    let successes = store.successes("a").await.unwrap();
    assert_eq!(successes.len(), 1);
    assert_eq!(successes[0].id, a);
}

#[tokio::test]
async fn test_empty_history() {
    let temp = TempDir::new().unwrap();
    let store = JsonlHistoryStore::open(temp.path().join("history.jsonl")).await.unwrap();

    assert!(store.query(None).await.unwrap().is_empty());
    assert!(store.successes("web").await.unwrap().is_empty());
}
