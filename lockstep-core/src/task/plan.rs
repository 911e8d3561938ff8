//! Job plans
//!
//! A plan is an ordered list of phases. A phase either names each worker's
//! batch explicitly (index = worker id, 0 = leader) or gives a flat task
//! list that is split evenly across all workers.

use serde::{Deserialize, Serialize};
use std::path::Path;

use super::command::Task;
use crate::coordinator::BatchAssigner;
use crate::error::{LockstepError, Result};

/// One synchronized round of work
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Phase {
    /// Explicit per-worker batches; missing trailing workers get nothing
    Assigned { batches: Vec<Vec<Task>> },
    /// Flat task list split across all workers
    Split { tasks: Vec<Task> },
}

impl Phase {
    /// Phase from per-worker shell command lines
    pub fn shell<I, B, S>(batches: I) -> Self
    where
        I: IntoIterator<Item = B>,
        B: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Phase::Assigned {
            batches: batches
                .into_iter()
                .map(|batch| batch.into_iter().map(Task::shell).collect())
                .collect(),
        }
    }

    /// One batch per worker, exactly `total_workers` long
    pub fn batches_for(&self, total_workers: u32) -> Result<Vec<Vec<Task>>> {
        if total_workers == 0 {
            return Err(LockstepError::InvalidPlan {
                reason: "job needs at least one worker".into(),
            });
        }

        match self {
            Phase::Assigned { batches } => {
                if batches.len() > total_workers as usize {
                    return Err(LockstepError::InvalidPlan {
                        reason: format!(
                            "phase assigns {} batches but only {} workers exist",
                            batches.len(),
                            total_workers
                        ),
                    });
                }
                let mut resolved = batches.clone();
                resolved.resize(total_workers as usize, Vec::new());
                Ok(resolved)
            }
            Phase::Split { tasks } => Ok(BatchAssigner::new(total_workers).split(tasks.clone())),
        }
    }
}

/// Ordered phases making up a job
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobPlan {
    pub phases: Vec<Phase>,
}

impl JobPlan {
    /// Plan from phases
    pub fn new(phases: Vec<Phase>) -> Self {
        Self { phases }
    }

    /// Parse a plan from JSON text
    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| LockstepError::InvalidPlan {
            reason: e.to_string(),
        })
    }

    /// Load a plan from a JSON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| LockstepError::InvalidPlan {
            reason: format!("cannot read {}: {}", path.display(), e),
        })?;
        Self::from_json(&text)
    }

    /// Resolve every phase to exactly `total_workers` batches
    pub fn resolve(&self, total_workers: u32) -> Result<Vec<Vec<Vec<Task>>>> {
        self.phases
            .iter()
            .map(|phase| phase.batches_for(total_workers))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_both_phase_forms() {
        let plan = JobPlan::from_json(
            r#"{
                "phases": [
                    {"tasks": ["convert 0.jpg 0.png", "convert 1.jpg 1.png", "convert 2.jpg 2.png"]},
                    {"batches": [["cat *.png | ffmpeg -f image2pipe -i - out.mp4"]]}
                ]
            }"#,
        )
        .unwrap();

        let resolved = plan.resolve(2).unwrap();
        assert_eq!(resolved[0][0].len(), 1);
        assert_eq!(resolved[0][1].len(), 2);
        assert_eq!(resolved[1][0].len(), 1);
        assert!(resolved[1][1].is_empty());
    }

    #[test]
    fn test_too_many_batches_rejected() {
        let phase = Phase::shell([vec!["a"], vec!["b"], vec!["c"]]);
        let err = phase.batches_for(2).unwrap_err();
        assert!(matches!(err, LockstepError::InvalidPlan { .. }));
    }

    #[test]
    fn test_zero_workers_rejected() {
        let phase = Phase::Split { tasks: vec![] };
        assert!(phase.batches_for(0).is_err());
    }

    #[test]
    fn test_malformed_plan() {
        assert!(JobPlan::from_json(r#"{"phases": [{"nope": 1}]}"#).is_err());
    }
}
