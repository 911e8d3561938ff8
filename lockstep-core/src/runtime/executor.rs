//! Tokio runtime for a worker process
//!
//! Each worker is a single-threaded process: one current-thread runtime
//! drives the protocol and the child processes it spawns. The OS watch
//! backend delivers its events from its own thread.

use std::sync::Arc;
use tokio::runtime::{Builder, Runtime};
use tracing::info;

use crate::config::LockstepConfig;
use crate::error::{LockstepError, Result};
use crate::job::{self, WorkerOutcome};
use crate::storage::FsRecordStore;
use crate::task::JobPlan;

/// Blocking front door for processes that are not already async
pub struct LockstepRuntime {
    runtime: Runtime,
}

impl LockstepRuntime {
    /// Build a current-thread runtime
    pub fn new() -> Result<Self> {
        let runtime = Builder::new_current_thread()
            .thread_name("lockstep-worker")
            .enable_all()
            .build()
            .map_err(|e| LockstepError::Internal {
                message: format!("Failed to create runtime: {}", e),
            })?;
        Ok(Self { runtime })
    }

    /// Run a future to completion on this runtime
    pub fn block_on<F: std::future::Future>(&self, future: F) -> F::Output {
        self.runtime.block_on(future)
    }

    /// Open the filesystem store described by `config` and run this
    /// process's part of the job
    pub fn run_commands(&self, config: &LockstepConfig, plan: &JobPlan) -> Result<WorkerOutcome> {
        let store = Arc::new(FsRecordStore::open(config.layout.clone())?);
        info!(
            "Worker process starting: {} workers, state dir {}",
            config.total_workers,
            config.layout.state_dir.display()
        );
        self.block_on(job::run_commands(config, store, plan))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::FsLayout;
    use crate::task::Phase;
    use tempfile::tempdir;

    #[test]
    fn test_single_worker_job() {
        let dir = tempdir().unwrap();
        let mut config = LockstepConfig::new(1);
        config.layout = FsLayout::under(dir.path());

        let marker = dir.path().join("ran");
        let plan = JobPlan::new(vec![Phase::shell([vec![format!(
            "touch {}",
            marker.display()
        )]])]);

        let runtime = LockstepRuntime::new().unwrap();
        let outcome = runtime.run_commands(&config, &plan).unwrap();

        assert_eq!(outcome.worker_id(), 0);
        assert_eq!(outcome.failed_tasks(), 0);
        assert!(marker.exists());
        assert!(!config.layout.counter_path.exists());
    }
}
