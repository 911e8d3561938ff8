//! Blocking change notification
//!
//! Stands in for a cross-process condition variable. Waiting follows the
//! check-arm-recheck order: a transition that lands between the first
//! read and arming the watch is caught by the second read, so a waiter
//! can never sleep through it.

use std::sync::Arc;
use tracing::trace;

use crate::error::Result;
use crate::storage::{RecordKey, RecordStore};

/// Waits for shared records to change
#[derive(Clone)]
pub struct ChangeWatcher {
    store: Arc<dyn RecordStore>,
}

impl ChangeWatcher {
    /// Wrap a record store
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    /// Arm a watch and block until the record is next modified
    pub async fn wait_for_change(&self, key: &RecordKey) -> Result<()> {
        let mut watch = self.store.watch(key)?;
        watch.changed().await
    }

    /// Block until `read` yields a value `accept` takes, and return it
    pub async fn wait_until<T, R, P>(&self, key: &RecordKey, read: R, accept: P) -> Result<T>
    where
        R: Fn() -> Result<T>,
        P: Fn(&T) -> bool,
    {
        loop {
            let value = read()?;
            if accept(&value) {
                return Ok(value);
            }

            let mut watch = self.store.watch(key)?;

            let value = read()?;
            if accept(&value) {
                return Ok(value);
            }

            trace!("Waiting on {}", self.store.describe(key));
            watch.changed().await?;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryRecordStore;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_returns_immediately_when_satisfied() {
        let store = Arc::new(MemoryRecordStore::new());
        let key = RecordKey::State(1);
        store.write(&key, "0").unwrap();

        let watcher = ChangeWatcher::new(store.clone());
        let value = watcher
            .wait_until(&key, || store.read(&key), |v| v.as_deref() == Some("0"))
            .await
            .unwrap();
        assert_eq!(value.as_deref(), Some("0"));
    }

    #[tokio::test]
    async fn test_recheck_catches_change_before_arming() {
        let store = Arc::new(MemoryRecordStore::new());
        let key = RecordKey::State(1);
        let watcher = ChangeWatcher::new(store.clone());
        let reads = AtomicUsize::new(0);

        // The transition happens right after the first read, before the
        // watch is armed. Nothing writes afterwards, so only the re-read
        // can observe it.
        let value = tokio::time::timeout(
            Duration::from_secs(1),
            watcher.wait_until(
                &key,
                || {
                    let current = store.read(&key)?;
                    if reads.fetch_add(1, Ordering::SeqCst) == 0 {
                        store.write(&key, "1")?;
                    }
                    Ok(current)
                },
                |v| v.as_deref() == Some("1"),
            ),
        )
        .await
        .expect("lost wakeup")
        .unwrap();

        assert_eq!(value.as_deref(), Some("1"));
        assert_eq!(reads.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_wakes_on_later_write() {
        let store = Arc::new(MemoryRecordStore::new());
        let key = RecordKey::State(2);
        let watcher = ChangeWatcher::new(store.clone());

        let writer = {
            let store = store.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(20)).await;
                store.write(&key, "0").unwrap();
                store.write(&key, "2").unwrap();
            })
        };

        let value = watcher
            .wait_until(&key, || store.read(&key), |v| v.as_deref() == Some("2"))
            .await
            .unwrap();
        assert_eq!(value.as_deref(), Some("2"));
        writer.await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_wait_for_change() {
        let store = Arc::new(MemoryRecordStore::new());
        let key = RecordKey::Batch(1);
        let watcher = ChangeWatcher::new(store.clone());

        let waiter = {
            let watcher = watcher.clone();
            tokio::spawn(async move { watcher.wait_for_change(&key).await })
        };

        // Keep writing until the spawned waiter has armed and woken
        while !waiter.is_finished() {
            store.write(&key, "x").unwrap();
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        waiter.await.unwrap().unwrap();
    }
}
