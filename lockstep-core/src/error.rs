//! Error types for Lockstep
//!
//! Covers registration, shared-record I/O, command execution, and the
//! timeout conditions raised when a peer stops responding.

use std::time::Duration;
use thiserror::Error;

use crate::WorkerId;

/// Primary error type for all Lockstep operations
#[derive(Debug, Error)]
pub enum LockstepError {
    // ========== Registration Errors ==========

    /// Worker counter could not be read, parsed, or advanced
    #[error("Registration failed at {record}: {reason}")]
    Registration { record: String, reason: String },

    // ========== State Errors ==========

    /// Lock or record I/O failed
    #[error("State I/O failed for {record}: {source}")]
    StateIo {
        record: String,
        #[source]
        source: std::io::Error,
    },

    /// Record exists but its payload is not what the protocol wrote
    #[error("Corrupt record {record}: {reason}")]
    CorruptRecord { record: String, reason: String },

    /// Change notification could not be armed or stopped delivering
    #[error("Watch on {record} failed: {reason}")]
    WatchFailed { record: String, reason: String },

    /// Batch record belongs to a different phase than the one signalled
    #[error("Stale batch for worker {worker_id}: expected phase {expected}, found {found}")]
    StaleBatch {
        worker_id: WorkerId,
        expected: u64,
        found: u64,
    },

    // ========== Execution Errors ==========

    /// A task exited non-zero or could not be spawned
    #[error("Command `{command}` failed: {reason}")]
    CommandExecution {
        command: String,
        exit_code: Option<i32>,
        reason: String,
    },

    // ========== Timeout Errors ==========

    /// Follower did not return to IDLE within the barrier timeout
    #[error("Worker {worker_id} unresponsive in phase {phase} after {waited:?}")]
    WorkerUnresponsive {
        worker_id: WorkerId,
        phase: u64,
        waited: Duration,
    },

    /// Leader did not signal the follower within the signal timeout
    #[error("No signal from leader for worker {worker_id} after {waited:?}")]
    LeaderUnresponsive { worker_id: WorkerId, waited: Duration },

    // ========== Job Errors ==========

    /// Job plan does not fit the worker count or failed to parse
    #[error("Invalid job plan: {reason}")]
    InvalidPlan { reason: String },

    /// Configuration value missing or malformed
    #[error("Invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    /// Internal error
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl LockstepError {
    /// Returns true for the shared-record failure family
    pub fn is_state_io(&self) -> bool {
        matches!(
            self,
            LockstepError::StateIo { .. }
                | LockstepError::CorruptRecord { .. }
                | LockstepError::WatchFailed { .. }
                | LockstepError::StaleBatch { .. }
        )
    }

    /// Returns true if a bounded wait expired
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            LockstepError::WorkerUnresponsive { .. } | LockstepError::LeaderUnresponsive { .. }
        )
    }

    pub(crate) fn state_io(record: impl std::fmt::Display, source: std::io::Error) -> Self {
        LockstepError::StateIo {
            record: record.to_string(),
            source,
        }
    }

    pub(crate) fn corrupt(record: impl std::fmt::Display, reason: impl Into<String>) -> Self {
        LockstepError::CorruptRecord {
            record: record.to_string(),
            reason: reason.into(),
        }
    }
}

/// Result type alias for Lockstep operations
pub type Result<T> = std::result::Result<T, LockstepError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_families() {
        let io = LockstepError::state_io(
            "worker_state_1",
            std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        );
        assert!(io.is_state_io());
        assert!(!io.is_timeout());

        let stale = LockstepError::StaleBatch {
            worker_id: 2,
            expected: 3,
            found: 2,
        };
        assert!(stale.is_state_io());

        let timeout = LockstepError::WorkerUnresponsive {
            worker_id: 1,
            phase: 1,
            waited: Duration::from_secs(1),
        };
        assert!(timeout.is_timeout());
        assert!(!timeout.is_state_io());
    }

    #[test]
    fn test_display_names_record() {
        let err = LockstepError::corrupt("/tmp/num_sync", "not an integer");
        assert_eq!(err.to_string(), "Corrupt record /tmp/num_sync: not an integer");
    }
}
