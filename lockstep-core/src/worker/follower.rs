//! Follower loop
//!
//! IDLE -> (start signal) -> run batch -> IDLE ... -> EXITED. The follower
//! only ever touches its own state, batch and report records.

use std::time::Duration;
use tracing::{debug, info};

use super::state::{StateStore, WorkerState};
use super::watcher::ChangeWatcher;
use crate::error::{LockstepError, Result};
use crate::metrics::standard;
use crate::report::FollowerSummary;
use crate::task::{BatchStore, TaskExecutor};
use crate::WorkerId;

/// Follower side of the protocol
pub struct Follower {
    worker_id: WorkerId,
    states: StateStore,
    batches: BatchStore,
    watcher: ChangeWatcher,
    executor: TaskExecutor,
    signal_timeout: Option<Duration>,
}

impl Follower {
    /// Create a follower for `worker_id` (must be > 0)
    pub fn new(
        worker_id: WorkerId,
        states: StateStore,
        batches: BatchStore,
        watcher: ChangeWatcher,
        executor: TaskExecutor,
    ) -> Self {
        Self {
            worker_id,
            states,
            batches,
            watcher,
            executor,
            signal_timeout: None,
        }
    }

    /// Bound each wait for the leader's next signal
    pub fn with_signal_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.signal_timeout = timeout;
        self
    }

    /// Follower id
    pub fn worker_id(&self) -> WorkerId {
        self.worker_id
    }

    /// Run until the leader signals EXITED, then remove own records
    pub async fn run(self) -> Result<FollowerSummary> {
        let mut summary = FollowerSummary {
            worker_id: self.worker_id,
            phases_run: 0,
            failed_tasks: 0,
        };

        let mut state = self.states.read(self.worker_id)?;
        info!("Follower {} starting in state {}", self.worker_id, state);

        loop {
            match state {
                WorkerState::Idle => {
                    state = self.next_signal().await?;
                }
                WorkerState::Running => {
                    summary.phases_run += 1;
                    let phase = summary.phases_run;
                    standard::CURRENT_PHASE.set(phase as i64);

                    let batch = self.batches.read_for_phase(self.worker_id, phase)?;
                    let report = self.executor.run_batch(phase, &batch.tasks).await;
                    summary.failed_tasks += report.failed_count();

                    self.batches.write_report(&report)?;
                    self.states.write(self.worker_id, WorkerState::Idle)?;
                    standard::PHASES_COMPLETED.inc();
                    debug!("Follower {} finished phase {}", self.worker_id, phase);
                    state = WorkerState::Idle;
                }
                WorkerState::Exited => break,
            }
        }

        self.cleanup()?;
        info!(
            "Follower {} exiting after {} phases ({} failed tasks)",
            self.worker_id, summary.phases_run, summary.failed_tasks
        );
        Ok(summary)
    }

    async fn next_signal(&self) -> Result<WorkerState> {
        let key = StateStore::key(self.worker_id);
        let wait = self.watcher.wait_until(
            &key,
            || self.states.read(self.worker_id),
            |state| *state != WorkerState::Idle,
        );

        match self.signal_timeout {
            Some(limit) => tokio::time::timeout(limit, wait).await.map_err(|_| {
                LockstepError::LeaderUnresponsive {
                    worker_id: self.worker_id,
                    waited: limit,
                }
            })?,
            None => wait.await,
        }
    }

    fn cleanup(&self) -> Result<()> {
        self.states.remove(self.worker_id)?;
        self.batches.remove(self.worker_id)?;
        self.batches.remove_report(self.worker_id)?;
        debug!("Follower {} removed its records", self.worker_id);
        Ok(())
    }
}
