//! Lockstep Core - phase-synchronized execution across worker processes
//!
//! A fixed number of independently launched processes cooperate through a
//! shared filesystem only:
//! - Worker id assignment (the first registrant leads)
//! - Per-follower state records with change notification
//! - Leader-driven phases separated by a barrier
//! - Aggregate reporting of task failures

pub mod config;
pub mod coordinator;
pub mod error;
pub mod job;
pub mod metrics;
pub mod report;
pub mod runtime;
pub mod storage;
pub mod task;
pub mod worker;

pub use config::LockstepConfig;
pub use error::{LockstepError, Result};
pub use job::{run_commands, WorkerOutcome};
pub use report::{BatchReport, FollowerSummary, JobReport, PhaseReport};
pub use runtime::LockstepRuntime;
pub use task::{JobPlan, Phase, Task};

/// Zero-based worker id assigned at registration
pub type WorkerId = u32;

/// Id of the leader
pub const LEADER_ID: WorkerId = 0;
