//! Worker configuration
//!
//! Every process of a job must see the same values. They come from the
//! environment the launcher sets up.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::{LockstepError, Result};
use crate::storage::FsLayout;
use crate::task::executor::DEFAULT_OUTPUT_LIMIT;

/// Total worker count
pub const ENV_NUM_WORKERS: &str = "NUMBER_OF_WORKERS";
/// Counter record path
pub const ENV_COUNTER_PATH: &str = "LOCKSTEP_COUNTER_PATH";
/// State and report directory
pub const ENV_STATE_DIR: &str = "LOCKSTEP_STATE_DIR";
/// Batch directory
pub const ENV_BATCH_DIR: &str = "LOCKSTEP_BATCH_DIR";
/// Leader barrier timeout, seconds
pub const ENV_BARRIER_TIMEOUT: &str = "LOCKSTEP_BARRIER_TIMEOUT_SECS";
/// Follower signal timeout, seconds
pub const ENV_SIGNAL_TIMEOUT: &str = "LOCKSTEP_SIGNAL_TIMEOUT_SECS";
/// Captured output bytes per task
pub const ENV_OUTPUT_LIMIT: &str = "LOCKSTEP_OUTPUT_LIMIT";

/// Configuration shared by every worker of a job
#[derive(Debug, Clone)]
pub struct LockstepConfig {
    /// Total workers, leader included
    pub total_workers: u32,
    /// Record locations
    pub layout: FsLayout,
    /// Bound on the leader's wait for each follower per phase
    pub barrier_timeout: Option<Duration>,
    /// Bound on a follower's wait for the leader's next signal
    pub signal_timeout: Option<Duration>,
    /// Trailing stdout/stderr bytes kept per task
    pub output_limit: usize,
}

impl LockstepConfig {
    /// Defaults for a job of `total_workers`
    pub fn new(total_workers: u32) -> Self {
        Self {
            total_workers,
            layout: FsLayout::default(),
            barrier_timeout: None,
            signal_timeout: None,
            output_limit: DEFAULT_OUTPUT_LIMIT,
        }
    }

    /// Load from the process environment
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load using an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let total_workers: u32 = match lookup(ENV_NUM_WORKERS) {
            Some(raw) => parse(ENV_NUM_WORKERS, &raw)?,
            None => {
                return Err(LockstepError::InvalidConfig {
                    reason: format!("{} is not set", ENV_NUM_WORKERS),
                })
            }
        };
        if total_workers == 0 {
            return Err(LockstepError::InvalidConfig {
                reason: format!("{} must be at least 1", ENV_NUM_WORKERS),
            });
        }

        let mut config = Self::new(total_workers);
        if let Some(path) = lookup(ENV_COUNTER_PATH) {
            config.layout.counter_path = PathBuf::from(path);
        }
        if let Some(dir) = lookup(ENV_STATE_DIR) {
            config.layout.state_dir = PathBuf::from(dir);
        }
        if let Some(dir) = lookup(ENV_BATCH_DIR) {
            config.layout.batch_dir = PathBuf::from(dir);
        }
        if let Some(raw) = lookup(ENV_BARRIER_TIMEOUT) {
            config.barrier_timeout = Some(Duration::from_secs(parse(ENV_BARRIER_TIMEOUT, &raw)?));
        }
        if let Some(raw) = lookup(ENV_SIGNAL_TIMEOUT) {
            config.signal_timeout = Some(Duration::from_secs(parse(ENV_SIGNAL_TIMEOUT, &raw)?));
        }
        if let Some(raw) = lookup(ENV_OUTPUT_LIMIT) {
            config.output_limit = parse(ENV_OUTPUT_LIMIT, &raw)?;
        }

        Ok(config)
    }
}

fn parse<T: std::str::FromStr>(name: &str, raw: &str) -> Result<T> {
    raw.trim().parse().map_err(|_| LockstepError::InvalidConfig {
        reason: format!("{}={:?} is not a valid number", name, raw),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name: &str| vars.get(name).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = LockstepConfig::from_lookup(lookup(&[("NUMBER_OF_WORKERS", "4")])).unwrap();
        assert_eq!(config.total_workers, 4);
        assert_eq!(config.layout, FsLayout::default());
        assert_eq!(config.barrier_timeout, None);
        assert_eq!(config.output_limit, DEFAULT_OUTPUT_LIMIT);
    }

    #[test]
    fn test_overrides() {
        let config = LockstepConfig::from_lookup(lookup(&[
            ("NUMBER_OF_WORKERS", "2"),
            ("LOCKSTEP_STATE_DIR", "/shared/state"),
            ("LOCKSTEP_BARRIER_TIMEOUT_SECS", "30"),
            ("LOCKSTEP_SIGNAL_TIMEOUT_SECS", " 600 "),
        ]))
        .unwrap();
        assert_eq!(config.layout.state_dir, PathBuf::from("/shared/state"));
        assert_eq!(config.barrier_timeout, Some(Duration::from_secs(30)));
        assert_eq!(config.signal_timeout, Some(Duration::from_secs(600)));
    }

    #[test]
    fn test_missing_or_bad_worker_count() {
        assert!(LockstepConfig::from_lookup(lookup(&[])).is_err());
        assert!(LockstepConfig::from_lookup(lookup(&[("NUMBER_OF_WORKERS", "0")])).is_err());
        assert!(LockstepConfig::from_lookup(lookup(&[("NUMBER_OF_WORKERS", "many")])).is_err());
    }
}
