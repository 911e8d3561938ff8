//! Phase barrier
//!
//! The leader waits for every follower's state to read IDLE again before
//! the next phase may start, then collects the reports they left behind.

use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::error::{LockstepError, Result};
use crate::metrics::standard;
use crate::report::BatchReport;
use crate::task::BatchStore;
use crate::worker::{ChangeWatcher, StateStore, WorkerState};
use crate::WorkerId;

/// Leader-side barrier over follower state records
pub struct PhaseBarrier {
    states: StateStore,
    batches: BatchStore,
    watcher: ChangeWatcher,
    timeout: Option<Duration>,
}

impl PhaseBarrier {
    /// Create a barrier; `timeout` bounds the wait for each follower
    pub fn new(
        states: StateStore,
        batches: BatchStore,
        watcher: ChangeWatcher,
        timeout: Option<Duration>,
    ) -> Self {
        Self {
            states,
            batches,
            watcher,
            timeout,
        }
    }

    /// Block until every follower has returned to IDLE for `phase`, and
    /// return their reports in id order
    pub async fn wait(&self, phase: u64, followers: &[WorkerId]) -> Result<Vec<BatchReport>> {
        let start = Instant::now();
        let mut reports = Vec::with_capacity(followers.len());

        for &worker_id in followers {
            self.wait_idle(phase, worker_id).await?;
            debug!("Worker {} arrived at barrier for phase {}", worker_id, phase);

            match self.batches.take_report(worker_id)? {
                Some(report) if report.phase == phase => reports.push(report),
                Some(report) => warn!(
                    "Worker {} reported phase {} during phase {}; ignoring",
                    worker_id, report.phase, phase
                ),
                None => warn!("Worker {} left no report for phase {}", worker_id, phase),
            }
        }

        standard::BARRIER_WAIT.observe_since(start);
        Ok(reports)
    }

    async fn wait_idle(&self, phase: u64, worker_id: WorkerId) -> Result<()> {
        let key = StateStore::key(worker_id);
        let wait = self.watcher.wait_until(
            &key,
            || self.states.read(worker_id),
            |state| *state == WorkerState::Idle,
        );

        match self.timeout {
            Some(limit) => tokio::time::timeout(limit, wait)
                .await
                .map_err(|_| LockstepError::WorkerUnresponsive {
                    worker_id,
                    phase,
                    waited: limit,
                })?
                .map(|_| ()),
            None => wait.await.map(|_| ()),
        }
    }
}
