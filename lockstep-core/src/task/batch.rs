//! Command batch and report records
//!
//! The leader writes one batch record per follower per phase; the follower
//! reads it once, runs it, and answers with a report record.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

use super::command::Task;
use crate::error::{LockstepError, Result};
use crate::report::BatchReport;
use crate::storage::{RecordKey, RecordStore};
use crate::WorkerId;

/// Tasks assigned to one worker for one phase
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandBatch {
    /// 1-based phase number this batch belongs to
    pub phase: u64,
    /// Tasks in execution order
    pub tasks: Vec<Task>,
}

impl CommandBatch {
    /// Create a batch
    pub fn new(phase: u64, tasks: Vec<Task>) -> Self {
        Self { phase, tasks }
    }
}

/// Access to batch and report records
#[derive(Clone)]
pub struct BatchStore {
    store: Arc<dyn RecordStore>,
}

impl BatchStore {
    /// Wrap a record store
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    /// Write a follower's batch for the coming phase
    pub fn write(&self, worker_id: WorkerId, batch: &CommandBatch) -> Result<()> {
        let key = RecordKey::Batch(worker_id);
        let payload = encode(&self.store.describe(&key), batch)?;
        self.store.write(&key, &payload)?;
        debug!(
            "Wrote phase {} batch for worker {} ({} tasks)",
            batch.phase,
            worker_id,
            batch.tasks.len()
        );
        Ok(())
    }

    /// Read a follower's batch. A missing batch is a state error: the
    /// leader always writes it before signalling.
    pub fn read(&self, worker_id: WorkerId) -> Result<CommandBatch> {
        let key = RecordKey::Batch(worker_id);
        let record = self.store.describe(&key);
        let payload = self.store.read(&key)?.ok_or_else(|| {
            LockstepError::state_io(
                &record,
                std::io::Error::new(std::io::ErrorKind::NotFound, "batch record missing"),
            )
        })?;
        decode(&record, &payload)
    }

    /// Read a batch and check it belongs to `expected_phase`
    pub fn read_for_phase(&self, worker_id: WorkerId, expected_phase: u64) -> Result<CommandBatch> {
        let batch = self.read(worker_id)?;
        if batch.phase != expected_phase {
            return Err(LockstepError::StaleBatch {
                worker_id,
                expected: expected_phase,
                found: batch.phase,
            });
        }
        Ok(batch)
    }

    /// Delete a follower's batch record and lock
    pub fn remove(&self, worker_id: WorkerId) -> Result<()> {
        self.store.remove(&RecordKey::Batch(worker_id))
    }

    /// Publish a follower's report for the phase it just ran
    pub fn write_report(&self, report: &BatchReport) -> Result<()> {
        let key = RecordKey::Report(report.worker_id);
        let payload = encode(&self.store.describe(&key), report)?;
        self.store.write(&key, &payload)
    }

    /// Read and delete a follower's report, if it left one
    pub fn take_report(&self, worker_id: WorkerId) -> Result<Option<BatchReport>> {
        let key = RecordKey::Report(worker_id);
        let record = self.store.describe(&key);
        let report = match self.store.read(&key)? {
            Some(payload) => Some(decode(&record, &payload)?),
            None => None,
        };
        self.store.remove(&key)?;
        Ok(report)
    }

    /// Delete a follower's report record and lock
    pub fn remove_report(&self, worker_id: WorkerId) -> Result<()> {
        self.store.remove(&RecordKey::Report(worker_id))
    }
}

fn encode<T: Serialize>(record: &str, value: &T) -> Result<String> {
    serde_json::to_string(value).map_err(|e| LockstepError::Internal {
        message: format!("Failed to encode {}: {}", record, e),
    })
}

fn decode<T: for<'de> Deserialize<'de>>(record: &str, payload: &str) -> Result<T> {
    serde_json::from_str(payload).map_err(|e| LockstepError::corrupt(record, e.to_string()))
}
