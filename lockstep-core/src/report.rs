//! Job outcome reporting
//!
//! Followers hand a `BatchReport` back through their report record; the
//! leader folds every worker's report into one `JobReport`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::task::TaskOutcome;
use crate::WorkerId;

/// Outcome of one worker's batch for one phase
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchReport {
    /// Worker that ran the batch
    pub worker_id: WorkerId,
    /// 1-based phase number
    pub phase: u64,
    /// One outcome per task, in execution order
    pub outcomes: Vec<TaskOutcome>,
}

impl BatchReport {
    /// Empty report for a worker/phase
    pub fn new(worker_id: WorkerId, phase: u64) -> Self {
        Self {
            worker_id,
            phase,
            outcomes: Vec::new(),
        }
    }

    /// Tasks that did not succeed
    pub fn failed_count(&self) -> usize {
        self.outcomes.iter().filter(|o| !o.success).count()
    }
}

/// All workers' reports for one phase
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseReport {
    /// 1-based phase number
    pub phase: u64,
    /// Leader first, then followers by id. A follower whose report record
    /// was missing contributes no entry.
    pub batches: Vec<BatchReport>,
}

impl PhaseReport {
    /// Failed tasks across every worker in this phase
    pub fn failed_count(&self) -> usize {
        self.batches.iter().map(BatchReport::failed_count).sum()
    }

    /// Tasks run across every worker in this phase
    pub fn task_count(&self) -> usize {
        self.batches.iter().map(|b| b.outcomes.len()).sum()
    }
}

/// Aggregate result of a whole job, returned on the leader
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobReport {
    /// Worker count the job ran with
    pub total_workers: u32,
    /// When the leader started the first phase
    pub started_at: DateTime<Utc>,
    /// When the leader signalled termination
    pub finished_at: DateTime<Utc>,
    /// Per-phase results, in order
    pub phases: Vec<PhaseReport>,
}

impl JobReport {
    /// Failed task count per phase
    pub fn failures_per_phase(&self) -> Vec<usize> {
        self.phases.iter().map(PhaseReport::failed_count).collect()
    }

    /// Failed tasks across the whole job
    pub fn failed_count(&self) -> usize {
        self.phases.iter().map(PhaseReport::failed_count).sum()
    }

    /// True if every task in every phase succeeded
    pub fn is_success(&self) -> bool {
        self.failed_count() == 0
    }
}

/// What a follower reports when it exits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FollowerSummary {
    /// Follower id
    pub worker_id: WorkerId,
    /// Phases this follower executed
    pub phases_run: u64,
    /// Failed tasks across those phases
    pub failed_tasks: usize,
}
