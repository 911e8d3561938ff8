//! Even split of work across workers
//!
//! Divides a flat list into contiguous, order-preserving slices. With
//! `q = len / n` and `r = len % n`, the first `n - r` workers get `q`
//! items and the last `r` workers get `q + 1`.

use tracing::debug;

use crate::WorkerId;

/// Deterministic contiguous partitioner
#[derive(Debug, Clone, Copy)]
pub struct BatchAssigner {
    num_workers: u32,
}

impl BatchAssigner {
    /// Create an assigner for `num_workers` workers
    pub fn new(num_workers: u32) -> Self {
        Self { num_workers }
    }

    /// Split `items` into one slice per worker, indexed by worker id
    pub fn split<T>(&self, items: Vec<T>) -> Vec<Vec<T>> {
        let n = self.num_workers as usize;
        if n == 0 {
            return Vec::new();
        }

        let len = items.len();
        let mut batches: Vec<Vec<T>> = (0..n)
            .map(|worker| Vec::with_capacity(self.slice_len(worker, len)))
            .collect();

        let mut worker = 0;
        for item in items {
            while batches[worker].len() >= self.slice_len(worker, len) {
                worker += 1;
            }
            batches[worker].push(item);
        }

        debug!("Split {} items across {} workers", len, n);
        batches
    }

    /// Worker that receives item `index` out of `len`
    pub fn worker_for(&self, index: usize, len: usize) -> Option<WorkerId> {
        let n = self.num_workers as usize;
        if n == 0 || index >= len {
            return None;
        }

        let (q, r) = (len / n, len % n);
        let short = (n - r) * q;
        let worker = if index < short {
            index / q
        } else {
            (n - r) + (index - short) / (q + 1)
        };
        Some(worker as WorkerId)
    }

    fn slice_len(&self, worker: usize, len: usize) -> usize {
        let n = self.num_workers as usize;
        let (q, r) = (len / n, len % n);
        if worker < n - r {
            q
        } else {
            q + 1
        }
    }
}
