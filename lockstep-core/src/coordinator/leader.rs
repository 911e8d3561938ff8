//! Leader orchestration
//!
//! Drives the job phase by phase: hand out batches, signal RUNNING, run
//! the leader's own batch inline, wait at the barrier, repeat. Ends by
//! signalling EXITED to every follower.

use chrono::Utc;
use std::time::Duration;
use tracing::{error, info, warn};

use super::barrier::PhaseBarrier;
use crate::error::Result;
use crate::metrics::standard;
use crate::report::{JobReport, PhaseReport};
use crate::task::{BatchStore, CommandBatch, JobPlan, Task, TaskExecutor};
use crate::worker::{ChangeWatcher, StateStore, WorkerState};
use crate::{WorkerId, LEADER_ID};

/// Configuration for the orchestrator
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Total workers, leader included
    pub total_workers: u32,
    /// Bound on the wait for each follower at the barrier
    pub barrier_timeout: Option<Duration>,
}

/// Leader side of the protocol
pub struct Orchestrator {
    config: OrchestratorConfig,
    states: StateStore,
    batches: BatchStore,
    barrier: PhaseBarrier,
    executor: TaskExecutor,
}

impl Orchestrator {
    /// Create the orchestrator
    pub fn new(
        config: OrchestratorConfig,
        states: StateStore,
        batches: BatchStore,
        watcher: ChangeWatcher,
        executor: TaskExecutor,
    ) -> Self {
        let barrier = PhaseBarrier::new(
            states.clone(),
            batches.clone(),
            watcher,
            config.barrier_timeout,
        );
        Self {
            config,
            states,
            batches,
            barrier,
            executor,
        }
    }

    fn followers(&self) -> Vec<WorkerId> {
        (1..self.config.total_workers).collect()
    }

    /// Run every phase of `plan` and signal termination
    pub async fn run_job(&self, plan: &JobPlan) -> Result<JobReport> {
        let resolved = plan.resolve(self.config.total_workers)?;
        let followers = self.followers();
        let started_at = Utc::now();

        info!(
            "Leader starting job: {} phases across {} workers",
            resolved.len(),
            self.config.total_workers
        );

        if let Err(e) = self.prime(&followers) {
            error!("Could not prime follower states: {}", e);
            self.signal_exit(&followers);
            return Err(e);
        }

        let mut phases = Vec::with_capacity(resolved.len());
        for (index, mut batches) in resolved.into_iter().enumerate() {
            let phase = index as u64 + 1;
            match self.run_phase(phase, &mut batches, &followers).await {
                Ok(report) => phases.push(report),
                Err(e) => {
                    error!("Phase {} aborted: {}", phase, e);
                    self.signal_exit(&followers);
                    return Err(e);
                }
            }
        }

        self.finish(&followers)?;

        let report = JobReport {
            total_workers: self.config.total_workers,
            started_at,
            finished_at: Utc::now(),
            phases,
        };
        info!(
            "Job finished: {} phases, {} failed tasks",
            report.phases.len(),
            report.failed_count()
        );
        Ok(report)
    }

    async fn run_phase(
        &self,
        phase: u64,
        batches: &mut [Vec<Task>],
        followers: &[WorkerId],
    ) -> Result<PhaseReport> {
        standard::CURRENT_PHASE.set(phase as i64);

        for &worker_id in followers {
            let tasks = std::mem::take(&mut batches[worker_id as usize]);
            self.batches
                .write(worker_id, &CommandBatch::new(phase, tasks))?;
        }
        for &worker_id in followers {
            self.states.write(worker_id, WorkerState::Running)?;
        }
        info!("Phase {} started", phase);

        let leader_report = self
            .executor
            .run_batch(phase, &batches[LEADER_ID as usize])
            .await;

        let follower_reports = self.barrier.wait(phase, followers).await?;
        standard::PHASES_COMPLETED.inc();

        let mut report = PhaseReport {
            phase,
            batches: Vec::with_capacity(followers.len() + 1),
        };
        report.batches.push(leader_report);
        report.batches.extend(follower_reports);

        info!(
            "Phase {} complete ({} tasks, {} failed)",
            phase,
            report.task_count(),
            report.failed_count()
        );
        Ok(report)
    }

    fn prime(&self, followers: &[WorkerId]) -> Result<()> {
        for &worker_id in followers {
            self.states.write(worker_id, WorkerState::Idle)?;
        }
        Ok(())
    }

    /// Signal EXITED to every follower, even past a failed write, and
    /// report the first failure
    fn finish(&self, followers: &[WorkerId]) -> Result<()> {
        let mut first_error = None;
        for &worker_id in followers {
            if let Err(e) = self.states.write(worker_id, WorkerState::Exited) {
                error!("Could not signal exit to worker {}: {}", worker_id, e);
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Best-effort termination signal after an aborted phase
    fn signal_exit(&self, followers: &[WorkerId]) {
        for &worker_id in followers {
            if let Err(e) = self.states.write(worker_id, WorkerState::Exited) {
                warn!("Could not signal exit to worker {}: {}", worker_id, e);
            }
        }
    }
}
