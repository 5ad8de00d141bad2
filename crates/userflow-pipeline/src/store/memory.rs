use super::KeyedStore;
use crate::events::{ChangeKind, ChangeLogEntry};
use crate::lock;
use anyhow::{bail, Result};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use userflow_common::UserRecord;

/// Keyed store held in memory that keeps its own change feed.
///
/// A new id yields an `INSERT` entry and a changed row a `MODIFY` entry.
/// Rewriting an identical row changes nothing and emits nothing.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    rows: Mutex<BTreeMap<String, UserRecord>>,
    changes: Mutex<Vec<ChangeLogEntry>>,
    failing_ids: Mutex<HashSet<String>>,
    sequence: AtomicU64,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_on_id(&self, id: impl Into<String>) {
        lock(&self.failing_ids).insert(id.into());
    }

    pub fn get(&self, id: &str) -> Option<UserRecord> {
        lock(&self.rows).get(id).cloned()
    }

    pub fn len(&self) -> usize {
        lock(&self.rows).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All rows ordered by id.
    pub fn rows(&self) -> Vec<UserRecord> {
        lock(&self.rows).values().cloned().collect()
    }

    pub fn remove(&self, id: &str) -> Option<UserRecord> {
        let mut rows = lock(&self.rows);
        let removed = rows.remove(id);
        if removed.is_some() {
            self.record_change(ChangeKind::Remove, id);
        }
        removed
    }

    /// Take the change-feed entries accumulated since the last drain.
    pub fn drain_changes(&self) -> Vec<ChangeLogEntry> {
        std::mem::take(&mut *lock(&self.changes))
    }

    /// Callers hold the `rows` guard so feed order follows write order.
    fn record_change(&self, kind: ChangeKind, id: &str) {
        let sequence = self.sequence.fetch_add(1, Ordering::SeqCst) + 1;
        lock(&self.changes).push(ChangeLogEntry {
            event_id: Some(sequence.to_string()),
            event_kind: kind,
            keys: BTreeMap::from([("id".to_string(), id.to_string())]),
        });
    }
}

#[async_trait]
impl KeyedStore for InMemoryStore {
    async fn upsert(&self, record: &UserRecord) -> Result<()> {
        if lock(&self.failing_ids).contains(&record.id) {
            bail!("Conditional write rejected for record {}", record.id);
        }

        let mut rows = lock(&self.rows);
        match rows.insert(record.id.clone(), record.clone()) {
            None => self.record_change(ChangeKind::Insert, &record.id),
            Some(old) if &old != record => self.record_change(ChangeKind::Modify, &record.id),
            Some(_) => {}
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_upsert_is_idempotent() {
        let store = InMemoryStore::new();
        let record = UserRecord::new("1", "Alice", "alice@x.com");

        store.upsert(&record).await.unwrap();
        store.upsert(&record).await.unwrap();

        assert_eq!(store.len(), 1);
        let changes = store.drain_changes();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].event_kind, ChangeKind::Insert);
        assert_eq!(changes[0].keys.get("id").map(String::as_str), Some("1"));
    }

    #[tokio::test]
    async fn test_changed_row_emits_modify() {
        let store = InMemoryStore::new();
        store.upsert(&UserRecord::new("1", "Alice", "a@x.com")).await.unwrap();
        store.upsert(&UserRecord::new("1", "Alicia", "a@x.com")).await.unwrap();

        assert_eq!(store.get("1").unwrap().name, "Alicia");
        let kinds: Vec<_> = store.drain_changes().iter().map(|c| c.event_kind).collect();
        assert_eq!(kinds, vec![ChangeKind::Insert, ChangeKind::Modify]);
        assert!(store.drain_changes().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_writes_keep_feed_in_write_order() {
        let store = std::sync::Arc::new(InMemoryStore::new());
        let writers: Vec<_> = (0..8)
            .map(|n| {
                let store = store.clone();
                tokio::spawn(async move {
                    for round in 0..25 {
                        let name = format!("w{}-{}", n, round);
                        store.upsert(&UserRecord::new("1", name, "a@x.com")).await.unwrap();
                    }
                })
            })
            .collect();
        for writer in writers {
            writer.await.unwrap();
        }

        let changes = store.drain_changes();
        assert_eq!(changes.len(), 200);
        assert_eq!(changes[0].event_kind, ChangeKind::Insert);
        let sequences: Vec<u64> = changes
            .iter()
            .map(|c| c.event_id.as_deref().unwrap().parse().unwrap())
            .collect();
        assert!(sequences.windows(2).all(|pair| pair[0] < pair[1]));
    }

    #[tokio::test]
    async fn test_remove_and_failure_injection() {
        let store = InMemoryStore::new();
        store.fail_on_id("bad");
        assert!(store.upsert(&UserRecord::new("bad", "", "")).await.is_err());
        assert!(store.is_empty());

        store.upsert(&UserRecord::new("1", "A", "a@x.com")).await.unwrap();
        assert!(store.remove("1").is_some());
        assert!(store.remove("1").is_none());

        let changes = store.drain_changes();
        assert_eq!(changes.last().unwrap().event_kind, ChangeKind::Remove);
    }
}
