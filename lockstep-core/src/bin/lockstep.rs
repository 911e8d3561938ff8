//! Worker process binary
//!
//! Launch the same command N times with the same environment; the first
//! process to register leads.

use lockstep_core::metrics::gather_metrics;
use lockstep_core::{JobPlan, LockstepConfig, LockstepRuntime, WorkerOutcome};
use std::process::ExitCode;
use tracing::{error, info, warn};

fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt::init();

    let plan_path = match std::env::args().nth(1).or_else(|| std::env::var("LOCKSTEP_PLAN").ok()) {
        Some(path) => path,
        None => {
            error!("Usage: lockstep <plan.json> (or set LOCKSTEP_PLAN)");
            return Ok(ExitCode::from(2));
        }
    };

    let config = LockstepConfig::from_env()?;
    let plan = JobPlan::load(&plan_path)?;
    info!(
        "Starting lockstep worker: plan {} ({} phases), {} workers",
        plan_path,
        plan.phases.len(),
        config.total_workers
    );

    let runtime = LockstepRuntime::new()?;
    let outcome = match runtime.run_commands(&config, &plan) {
        Ok(outcome) => outcome,
        Err(e) => {
            error!("Worker failed: {}", e);
            return Err(e.into());
        }
    };

    if let Ok(path) = std::env::var("LOCKSTEP_METRICS_FILE") {
        if let Err(e) = std::fs::write(&path, gather_metrics()) {
            warn!("Failed to write metrics to {}: {}", path, e);
        }
    }

    match outcome {
        WorkerOutcome::Leader(report) => {
            for phase in &report.phases {
                info!("Phase {}: {} failed tasks", phase.phase, phase.failed_count());
            }
            if report.is_success() {
                info!("Job finished: {} phases", report.phases.len());
                Ok(ExitCode::SUCCESS)
            } else {
                error!("Job finished with {} failed tasks", report.failed_count());
                Ok(ExitCode::FAILURE)
            }
        }
        WorkerOutcome::Follower(summary) => {
            info!(
                "Worker {} done: {} phases, {} failed tasks",
                summary.worker_id, summary.phases_run, summary.failed_tasks
            );
            Ok(ExitCode::SUCCESS)
        }
    }
}
