//! Worker registration
//!
//! Hands out sequential worker ids from a shared counter record. The first
//! registrant creates the counter exclusively and becomes the leader; the
//! last one deletes it so the next job starts from a clean slate.

use std::sync::Arc;
use tracing::{debug, info};

use crate::error::{LockstepError, Result};
use crate::storage::{RecordKey, RecordStore};
use crate::WorkerId;

/// Issues worker ids
#[derive(Clone)]
pub struct Registrar {
    store: Arc<dyn RecordStore>,
}

impl Registrar {
    /// Wrap a record store
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    /// Register this process and return its worker id
    pub fn register(&self, total_workers: u32) -> Result<WorkerId> {
        let record = self.store.describe(&RecordKey::Counter);
        if total_workers == 0 {
            return Err(LockstepError::Registration {
                record,
                reason: "total worker count is 0".into(),
            });
        }

        let mut issued = None;
        self.store.update(&RecordKey::Counter, &mut |current: Option<&str>| {
            let worker_id = match current {
                None => 0,
                Some(payload) => payload.trim().parse::<WorkerId>().map_err(|_| {
                    LockstepError::Registration {
                        record: record.clone(),
                        reason: format!("unreadable counter value {:?}", payload),
                    }
                })?,
            };
            if worker_id >= total_workers {
                return Err(LockstepError::Registration {
                    record: record.clone(),
                    reason: format!(
                        "counter at {} but only {} workers expected; stale counter from an earlier job?",
                        worker_id, total_workers
                    ),
                });
            }
            issued = Some(worker_id);
            Ok((worker_id + 1).to_string())
        })?;

        let worker_id = issued.ok_or_else(|| LockstepError::Internal {
            message: "counter update did not issue an id".into(),
        })?;

        if worker_id + 1 == total_workers {
            self.store.remove(&RecordKey::Counter)?;
            debug!("Last registrant removed {}", record);
        }

        info!("Got worker number: {} of {}", worker_id, total_workers);
        Ok(worker_id)
    }
}
