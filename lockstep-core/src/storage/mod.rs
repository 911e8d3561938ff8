//! Shared record storage
//!
//! Every piece of cross-worker state lives in a small record guarded by its
//! own lock. `FsRecordStore` is the production backend; `MemoryRecordStore`
//! runs the same protocol inside one process.

pub mod fs;
pub mod memory;

use std::any::Any;
use std::fmt;
use tokio::sync::mpsc;

use crate::error::{LockstepError, Result};
use crate::WorkerId;

pub use fs::{FsLayout, FsRecordStore};
pub use memory::MemoryRecordStore;

/// Identifies one shared record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordKey {
    /// Registration counter
    Counter,
    /// Follower state (IDLE/RUNNING/EXITED)
    State(WorkerId),
    /// Follower command batch for the current phase
    Batch(WorkerId),
    /// Follower outcome report for the last phase it ran
    Report(WorkerId),
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordKey::Counter => write!(f, "counter"),
            RecordKey::State(id) => write!(f, "state[{}]", id),
            RecordKey::Batch(id) => write!(f, "batch[{}]", id),
            RecordKey::Report(id) => write!(f, "report[{}]", id),
        }
    }
}

/// Read-modify-write callback: receives the current payload (None if the
/// record does not exist) and returns the payload to store
pub type UpdateFn<'a> = dyn FnMut(Option<&str>) -> Result<String> + 'a;

/// Backing store for shared records
///
/// Each call takes the record's lock, does its I/O, and releases the lock
/// before returning. No call holds two locks and no lock outlives a call.
pub trait RecordStore: Send + Sync {
    /// Read a record, `None` if it does not exist
    fn read(&self, key: &RecordKey) -> Result<Option<String>>;

    /// Replace a record's payload, creating it if needed
    fn write(&self, key: &RecordKey, contents: &str) -> Result<()>;

    /// Read-modify-write under a single lock acquisition. A missing record
    /// is created exclusively.
    fn update(&self, key: &RecordKey, f: &mut UpdateFn<'_>) -> Result<()>;

    /// Delete a record and its lock; missing records are not an error
    fn remove(&self, key: &RecordKey) -> Result<()>;

    /// Whether the record or its lock is still present
    fn exists(&self, key: &RecordKey) -> bool;

    /// Arm a change notification for a record
    fn watch(&self, key: &RecordKey) -> Result<RecordWatch>;

    /// Human-readable location of a record, used in logs and errors
    fn describe(&self, key: &RecordKey) -> String;
}

/// Armed change notification for one record
///
/// Events that arrive after arming are buffered, so a modification between
/// arming and the first `changed()` call is never lost.
pub struct RecordWatch {
    record: String,
    events: mpsc::UnboundedReceiver<()>,
    _backend: Option<Box<dyn Any + Send>>,
}

impl RecordWatch {
    pub(crate) fn new(
        record: String,
        events: mpsc::UnboundedReceiver<()>,
        backend: Option<Box<dyn Any + Send>>,
    ) -> Self {
        Self {
            record,
            events,
            _backend: backend,
        }
    }

    /// Block until the record is modified, created, or removed
    pub async fn changed(&mut self) -> Result<()> {
        match self.events.recv().await {
            Some(()) => {
                // Coalesce a burst (truncate + write) into one wakeup
                while self.events.try_recv().is_ok() {}
                Ok(())
            }
            None => Err(LockstepError::WatchFailed {
                record: self.record.clone(),
                reason: "notification source closed".into(),
            }),
        }
    }
}

impl fmt::Debug for RecordWatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordWatch")
            .field("record", &self.record)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_key_display() {
        assert_eq!(RecordKey::Counter.to_string(), "counter");
        assert_eq!(RecordKey::State(3).to_string(), "state[3]");
        assert_eq!(RecordKey::Batch(1).to_string(), "batch[1]");
        assert_eq!(RecordKey::Report(2).to_string(), "report[2]");
    }

    #[tokio::test]
    async fn test_watch_reports_closed_source() {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut watch = RecordWatch::new("state[1]".into(), rx, None);

        tx.send(()).unwrap();
        tx.send(()).unwrap();
        watch.changed().await.unwrap();

        drop(tx);
        let err = watch.changed().await.unwrap_err();
        assert!(matches!(err, LockstepError::WatchFailed { .. }));
    }
}
