//! Job entry point
//!
//! Every process of a job calls `run_commands` with the same plan. It
//! registers, and the assigned id decides whether this process leads or
//! follows.

use std::sync::Arc;

use crate::config::LockstepConfig;
use crate::coordinator::{Orchestrator, OrchestratorConfig, Registrar};
use crate::error::Result;
use crate::report::{FollowerSummary, JobReport};
use crate::storage::RecordStore;
use crate::task::{BatchStore, JobPlan, TaskExecutor};
use crate::worker::{ChangeWatcher, Follower, StateStore};
use crate::{WorkerId, LEADER_ID};

/// What `run_commands` returns, depending on the role this process got
#[derive(Debug, Clone)]
pub enum WorkerOutcome {
    /// This process was the leader; the whole job's report
    Leader(JobReport),
    /// This process was a follower
    Follower(FollowerSummary),
}

impl WorkerOutcome {
    /// Worker id assigned at registration
    pub fn worker_id(&self) -> WorkerId {
        match self {
            WorkerOutcome::Leader(_) => LEADER_ID,
            WorkerOutcome::Follower(summary) => summary.worker_id,
        }
    }

    /// Failed tasks this outcome knows about: the whole job on the leader,
    /// the follower's own batches otherwise
    pub fn failed_tasks(&self) -> usize {
        match self {
            WorkerOutcome::Leader(report) => report.failed_count(),
            WorkerOutcome::Follower(summary) => summary.failed_tasks,
        }
    }
}

/// Register with the job and run as leader or follower
pub async fn run_commands(
    config: &LockstepConfig,
    store: Arc<dyn RecordStore>,
    plan: &JobPlan,
) -> Result<WorkerOutcome> {
    let worker_id = Registrar::new(store.clone()).register(config.total_workers)?;

    let states = StateStore::new(store.clone());
    let batches = BatchStore::new(store.clone());
    let watcher = ChangeWatcher::new(store);
    let executor = TaskExecutor::new(worker_id, config.output_limit);

    if worker_id == LEADER_ID {
        let orchestrator = Orchestrator::new(
            OrchestratorConfig {
                total_workers: config.total_workers,
                barrier_timeout: config.barrier_timeout,
            },
            states,
            batches,
            watcher,
            executor,
        );
        orchestrator.run_job(plan).await.map(WorkerOutcome::Leader)
    } else {
        Follower::new(worker_id, states, batches, watcher, executor)
            .with_signal_timeout(config.signal_timeout)
            .run()
            .await
            .map(WorkerOutcome::Follower)
    }
}
