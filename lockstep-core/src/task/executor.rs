//! Batch execution
//!
//! Runs a batch one task at a time, in order. A failing task is logged and
//! recorded; the rest of the batch still runs.

use std::process::Stdio;
use std::time::Instant;
use tokio::process::Command;
use tracing::{debug, info, warn};

use super::command::{Task, TaskOutcome};
use crate::metrics::standard;
use crate::report::BatchReport;
use crate::WorkerId;

/// Default number of trailing stdout/stderr bytes kept per task
pub const DEFAULT_OUTPUT_LIMIT: usize = 4096;

/// Executes batches for one worker
#[derive(Debug, Clone)]
pub struct TaskExecutor {
    worker_id: WorkerId,
    output_limit: usize,
}

impl TaskExecutor {
    /// Create an executor for `worker_id`
    pub fn new(worker_id: WorkerId, output_limit: usize) -> Self {
        Self {
            worker_id,
            output_limit,
        }
    }

    /// Run every task in order, continuing past failures
    pub async fn run_batch(&self, phase: u64, tasks: &[Task]) -> BatchReport {
        let mut report = BatchReport::new(self.worker_id, phase);

        for task in tasks {
            info!("Worker {} running command: {}", self.worker_id, task);
            let outcome = self.run_task(task).await;
            if let Err(e) = outcome.check() {
                warn!("Worker {} phase {}: {}", self.worker_id, phase, e);
                if !outcome.stderr_tail.is_empty() {
                    warn!("stderr: {}", outcome.stderr_tail.trim_end());
                }
            }
            report.outcomes.push(outcome);
        }

        debug!(
            "Worker {} finished phase {} batch: {} tasks, {} failed",
            self.worker_id,
            phase,
            report.outcomes.len(),
            report.failed_count()
        );
        report
    }

    /// Run a single task to completion
    pub async fn run_task(&self, task: &Task) -> TaskOutcome {
        let start = Instant::now();

        let mut command = Command::new(&task.program);
        command
            .args(&task.args)
            .envs(&task.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = &task.cwd {
            command.current_dir(dir);
        }

        let result = command.output().await;
        standard::TASKS_EXECUTED.inc();
        standard::TASK_DURATION.observe_since(start);
        let duration_ms = start.elapsed().as_millis() as u64;

        let outcome = match result {
            Ok(output) => TaskOutcome {
                command: task.to_string(),
                exit_code: output.status.code(),
                success: output.status.success(),
                duration_ms,
                stdout_tail: tail(&output.stdout, self.output_limit),
                stderr_tail: tail(&output.stderr, self.output_limit),
                spawn_error: None,
            },
            Err(e) => TaskOutcome {
                command: task.to_string(),
                exit_code: None,
                success: false,
                duration_ms,
                stdout_tail: String::new(),
                stderr_tail: String::new(),
                spawn_error: Some(e.to_string()),
            },
        };

        if !outcome.success {
            standard::TASKS_FAILED.inc();
        }
        outcome
    }
}

/// Last `limit` bytes of captured output
fn tail(bytes: &[u8], limit: usize) -> String {
    let start = bytes.len().saturating_sub(limit);
    String::from_utf8_lossy(&bytes[start..]).into_owned()
}
