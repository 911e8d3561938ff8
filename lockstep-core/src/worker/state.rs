//! Follower state records
//!
//! One record per follower. The leader writes RUNNING and EXITED, the
//! follower writes IDLE. Payloads are the integers 0, 1 and 2.

use std::fmt;
use std::sync::Arc;
use tracing::debug;

use crate::error::{LockstepError, Result};
use crate::storage::{RecordKey, RecordStore, RecordWatch};
use crate::WorkerId;

/// Follower state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkerState {
    /// Waiting for the next phase, or done with the current one
    Idle,
    /// Signalled to run its batch
    Running,
    /// Told to clean up and terminate
    Exited,
}

impl WorkerState {
    /// On-record encoding
    pub fn as_record(self) -> &'static str {
        match self {
            WorkerState::Idle => "0",
            WorkerState::Running => "1",
            WorkerState::Exited => "2",
        }
    }

    /// Decode a payload. Any integer other than IDLE or EXITED reads as a
    /// start signal.
    pub fn parse(record: &str, payload: &str) -> Result<Self> {
        let value: i64 = payload
            .trim()
            .parse()
            .map_err(|_| LockstepError::corrupt(record, format!("invalid state {:?}", payload)))?;
        Ok(match value {
            0 => WorkerState::Idle,
            2 => WorkerState::Exited,
            _ => WorkerState::Running,
        })
    }
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WorkerState::Idle => "IDLE",
            WorkerState::Running => "RUNNING",
            WorkerState::Exited => "EXITED",
        };
        f.write_str(name)
    }
}

/// Lock-guarded access to follower state records
#[derive(Clone)]
pub struct StateStore {
    store: Arc<dyn RecordStore>,
}

impl StateStore {
    /// Wrap a record store
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    /// Record key for a follower's state
    pub fn key(worker_id: WorkerId) -> RecordKey {
        RecordKey::State(worker_id)
    }

    /// Read a follower's state. A record that does not exist yet reads as
    /// IDLE, covering the gap before the leader primes it.
    pub fn read(&self, worker_id: WorkerId) -> Result<WorkerState> {
        let key = Self::key(worker_id);
        match self.store.read(&key)? {
            Some(payload) => WorkerState::parse(&self.store.describe(&key), &payload),
            None => Ok(WorkerState::Idle),
        }
    }

    /// Write a follower's state
    pub fn write(&self, worker_id: WorkerId, state: WorkerState) -> Result<()> {
        self.store.write(&Self::key(worker_id), state.as_record())?;
        debug!("Worker {} state -> {}", worker_id, state);
        Ok(())
    }

    /// Arm a change notification on a follower's state
    pub fn watch(&self, worker_id: WorkerId) -> Result<RecordWatch> {
        self.store.watch(&Self::key(worker_id))
    }

    /// Delete a follower's state record and lock
    pub fn remove(&self, worker_id: WorkerId) -> Result<()> {
        self.store.remove(&Self::key(worker_id))
    }

    /// Whether a follower's state record or lock is present
    pub fn exists(&self, worker_id: WorkerId) -> bool {
        self.store.exists(&Self::key(worker_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryRecordStore;

    #[test]
    fn test_parse_states() {
        assert_eq!(WorkerState::parse("r", "0").unwrap(), WorkerState::Idle);
        assert_eq!(WorkerState::parse("r", "1\n").unwrap(), WorkerState::Running);
        assert_eq!(WorkerState::parse("r", "2").unwrap(), WorkerState::Exited);
        assert_eq!(WorkerState::parse("r", "7").unwrap(), WorkerState::Running);
        assert!(WorkerState::parse("r", "").unwrap_err().is_state_io());
        assert!(WorkerState::parse("r", "IDLE").is_err());
    }

    #[test]
    fn test_missing_record_reads_idle() {
        let states = StateStore::new(Arc::new(MemoryRecordStore::new()));
        assert_eq!(states.read(4).unwrap(), WorkerState::Idle);
        assert!(!states.exists(4));
    }

    #[test]
    fn test_write_read_remove() {
        let states = StateStore::new(Arc::new(MemoryRecordStore::new()));

        for state in [WorkerState::Running, WorkerState::Idle, WorkerState::Exited] {
            states.write(1, state).unwrap();
            assert_eq!(states.read(1).unwrap(), state);
        }

        states.remove(1).unwrap();
        assert!(!states.exists(1));
    }
}
