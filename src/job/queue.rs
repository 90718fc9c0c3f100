// src/job/queue.rs

use std::collections::{HashSet, VecDeque};

use tracing::{debug, warn};

use crate::errors::{Result, ScanError};
use crate::types::JobId;

/// FIFO admission bookkeeping for jobs.
///
/// Semantics:
/// - At most `parallel` jobs are running at once.
/// - Up to `capacity` further jobs may wait; admitting another one fails
///   with `QueueFull`.
/// - `next_ready()` promotes waiting jobs into free running slots in
///   arrival order.
///
/// Pure state: no Tokio types, no IO. The async shell in
/// [`super::manager`] drives it.
#[derive(Debug)]
pub struct AdmissionQueue {
    parallel: usize,
    capacity: usize,
    waiting: VecDeque<JobId>,
    running: HashSet<JobId>,
}

impl AdmissionQueue {
    /// Both bounds are clamped to at least 1.
    pub fn new(parallel: usize, capacity: usize) -> Self {
        Self {
            parallel: parallel.max(1),
            capacity: capacity.max(1),
            waiting: VecDeque::new(),
            running: HashSet::new(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn parallel(&self) -> usize {
        self.parallel
    }

    pub fn waiting_len(&self) -> usize {
        self.waiting.len()
    }

    pub fn running_len(&self) -> usize {
        self.running.len()
    }

    pub fn is_idle(&self) -> bool {
        self.waiting.is_empty() && self.running.is_empty()
    }

    pub fn is_waiting(&self, id: &str) -> bool {
        self.waiting.iter().any(|w| w == id)
    }

    pub fn is_running(&self, id: &str) -> bool {
        self.running.contains(id)
    }

    /// Append `id` to the waiting line.
    pub fn admit(&mut self, id: JobId) -> Result<()> {
        if self.waiting.len() >= self.capacity {
            warn!(
                job_id = %id,
                capacity = self.capacity,
                "admission rejected; queue full"
            );
            return Err(ScanError::QueueFull {
                capacity: self.capacity,
            });
        }
        debug!(job_id = %id, position = self.waiting.len(), "job admitted");
        self.waiting.push_back(id);
        Ok(())
    }

    /// Promote waiting jobs into free slots, oldest first.
    pub fn next_ready(&mut self) -> Vec<JobId> {
        let mut ready = Vec::new();
        while self.running.len() < self.parallel {
            let Some(id) = self.waiting.pop_front() else {
                break;
            };
            self.running.insert(id.clone());
            ready.push(id);
        }
        if !ready.is_empty() {
            debug!(?ready, running = self.running.len(), "promoted jobs to running");
        }
        ready
    }

    /// Free the slot held by a running job.
    pub fn finish(&mut self, id: &str) -> bool {
        self.running.remove(id)
    }

    /// Remove a job that has not started yet.
    pub fn withdraw(&mut self, id: &str) -> bool {
        let before = self.waiting.len();
        self.waiting.retain(|w| w != id);
        before != self.waiting.len()
    }
}
