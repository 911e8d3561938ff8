//! In-process record store
//!
//! Runs the full protocol without touching the filesystem. Every mutation
//! is appended to a history log so tests can check ordering properties.

use parking_lot::Mutex;
use std::collections::HashMap;
use tokio::sync::mpsc;

use super::{RecordKey, RecordStore, RecordWatch, UpdateFn};
use crate::error::Result;

/// One mutation observed by the store, in global order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordEvent {
    /// Record that changed
    pub key: RecordKey,
    /// New payload, `None` for a removal
    pub contents: Option<String>,
}

#[derive(Default)]
struct MemoryInner {
    records: HashMap<RecordKey, String>,
    watchers: HashMap<RecordKey, Vec<mpsc::UnboundedSender<()>>>,
    history: Vec<RecordEvent>,
}

impl MemoryInner {
    fn notify(&mut self, key: &RecordKey) {
        if let Some(senders) = self.watchers.get_mut(key) {
            senders.retain(|tx| tx.send(()).is_ok());
        }
    }

    fn store(&mut self, key: &RecordKey, contents: String) {
        self.history.push(RecordEvent {
            key: *key,
            contents: Some(contents.clone()),
        });
        self.records.insert(*key, contents);
        self.notify(key);
    }
}

/// Record store held entirely in memory
#[derive(Default)]
pub struct MemoryRecordStore {
    inner: Mutex<MemoryInner>,
}

impl MemoryRecordStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Every mutation so far, oldest first
    pub fn history(&self) -> Vec<RecordEvent> {
        self.inner.lock().history.clone()
    }

    /// Number of records currently present
    pub fn len(&self) -> usize {
        self.inner.lock().records.len()
    }

    /// Whether no records are present
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl RecordStore for MemoryRecordStore {
    fn read(&self, key: &RecordKey) -> Result<Option<String>> {
        Ok(self.inner.lock().records.get(key).cloned())
    }

    fn write(&self, key: &RecordKey, contents: &str) -> Result<()> {
        self.inner.lock().store(key, contents.to_string());
        Ok(())
    }

    fn update(&self, key: &RecordKey, f: &mut UpdateFn<'_>) -> Result<()> {
        let mut inner = self.inner.lock();
        let next = f(inner.records.get(key).map(String::as_str))?;
        inner.store(key, next);
        Ok(())
    }

    fn remove(&self, key: &RecordKey) -> Result<()> {
        let mut inner = self.inner.lock();
        if inner.records.remove(key).is_some() {
            inner.history.push(RecordEvent {
                key: *key,
                contents: None,
            });
            inner.notify(key);
        }
        Ok(())
    }

    fn exists(&self, key: &RecordKey) -> bool {
        self.inner.lock().records.contains_key(key)
    }

    fn watch(&self, key: &RecordKey) -> Result<RecordWatch> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner.lock().watchers.entry(*key).or_default().push(tx);
        Ok(RecordWatch::new(self.describe(key), rx, None))
    }

    fn describe(&self, key: &RecordKey) -> String {
        format!("memory:{}", key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_history_records_mutations() {
        let store = MemoryRecordStore::new();
        let key = RecordKey::State(1);

        store.write(&key, "0").unwrap();
        store.write(&key, "1").unwrap();
        store.remove(&key).unwrap();
        // Removing a missing record is not a mutation
        store.remove(&key).unwrap();

        let history = store.history();
        assert_eq!(history.len(), 3);
        assert_eq!(history[1].contents.as_deref(), Some("1"));
        assert_eq!(history[2].contents, None);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_watch_sees_write_after_arming() {
        let store = MemoryRecordStore::new();
        let key = RecordKey::Batch(2);

        let mut watch = store.watch(&key).unwrap();
        store.write(&key, "payload").unwrap();
        watch.changed().await.unwrap();

        // Unrelated records do not wake the watch
        let mut other = store.watch(&RecordKey::Batch(3)).unwrap();
        store.write(&key, "again").unwrap();
        assert!(
            tokio::time::timeout(std::time::Duration::from_millis(20), other.changed())
                .await
                .is_err()
        );
    }
}
