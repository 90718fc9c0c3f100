// src/job/manager.rs

//! Async job queue: admission, FIFO dispatch onto the engine, cancellation,
//! and retention of finished jobs.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::clock::{Clock, elapsed_between};
use crate::engine::ExecutionEngine;
use crate::errors::{Result, ScanError};
use crate::types::{JobId, JobStatus};

use super::handle::{JobHandle, JobSnapshot};
use super::queue::AdmissionQueue;

#[derive(Debug, Clone)]
pub struct QueueSettings {
    /// Jobs running at the same time.
    pub parallel_repos: usize,
    /// Jobs allowed to wait for a slot.
    pub capacity: usize,
    /// How long finished jobs stay visible.
    pub retention: Duration,
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            parallel_repos: 1,
            capacity: 100,
            retention: Duration::from_secs(24 * 60 * 60),
        }
    }
}

/// Counts of retained jobs by status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    pub queued: usize,
    pub running: usize,
    pub done: usize,
    pub error: usize,
    pub cancelled: usize,
}

impl QueueStats {
    pub fn total(&self) -> usize {
        self.queued + self.running + self.done + self.error + self.cancelled
    }
}

struct QueueInner {
    engine: Arc<ExecutionEngine>,
    clock: Arc<dyn Clock>,
    settings: QueueSettings,
    admission: Mutex<AdmissionQueue>,
    jobs: RwLock<HashMap<JobId, JobHandle>>,
}

/// Cloneable front of the job machinery. Must be used from within a Tokio
/// runtime, since admitted jobs are spawned onto it.
///
/// Lock order: `jobs` before `admission`; neither is held across an await.
#[derive(Clone)]
pub struct JobQueue {
    inner: Arc<QueueInner>,
}

impl std::fmt::Debug for JobQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobQueue")
            .field("settings", &self.inner.settings)
            .field("stats", &self.stats())
            .finish()
    }
}

impl JobQueue {
    pub fn new(engine: Arc<ExecutionEngine>, clock: Arc<dyn Clock>, settings: QueueSettings) -> Self {
        let admission = AdmissionQueue::new(settings.parallel_repos, settings.capacity);
        Self {
            inner: Arc::new(QueueInner {
                engine,
                clock,
                settings,
                admission: Mutex::new(admission),
                jobs: RwLock::new(HashMap::new()),
            }),
        }
    }

    pub fn settings(&self) -> &QueueSettings {
        &self.inner.settings
    }

    /// Admit `job`, starting it right away when a slot is free.
    ///
    /// Fails with `ConflictingRun` when an active job for the same target
    /// already covers one of the analyzers in this job's plan, and with
    /// `QueueFull` when the waiting line is at capacity.
    pub fn enqueue(&self, job: JobHandle) -> Result<JobId> {
        self.prune_expired();

        let snapshot = job.snapshot();
        let id = snapshot.id.clone();
        {
            let mut jobs = self.inner.jobs.write();
            if jobs.contains_key(&id) {
                return Err(ScanError::ConfigError(format!("job id '{id}' already in use")));
            }

            for other in jobs.values() {
                let other = other.snapshot();
                if other.status.is_terminal() || other.target != snapshot.target {
                    continue;
                }
                if let Some(analyzer) = snapshot.plan.analyzers().find(|a| other.plan.contains(a)) {
                    warn!(
                        job_id = %id,
                        conflicting_job = %other.id,
                        analyzer = %analyzer,
                        "rejecting job; overlapping run in progress"
                    );
                    return Err(ScanError::ConflictingRun {
                        target: snapshot.target.clone(),
                        analyzer: analyzer.clone(),
                    });
                }
            }

            self.inner.admission.lock().admit(id.clone())?;
            jobs.insert(id.clone(), job);
        }

        info!(
            job_id = %id,
            scan_target = %snapshot.target,
            analyzers = snapshot.plan.analyzer_count(),
            "job enqueued"
        );
        self.pump();
        Ok(id)
    }

    /// Start as many waiting jobs as there are free slots.
    fn pump(&self) {
        let ready = self.inner.admission.lock().next_ready();
        for id in ready {
            let handle = self.inner.jobs.read().get(&id).cloned();
            let Some(handle) = handle else {
                self.inner.admission.lock().finish(&id);
                continue;
            };

            let queue = self.clone();
            tokio::spawn(async move {
                let result = queue.inner.engine.execute(&handle).await;
                if let Err(e) = result {
                    warn!(job_id = %id, error = %e, "job execution failed");
                    handle.finish(JobStatus::Error, Some(e.to_string()));
                }
                queue.on_finished(&id);
            });
        }
    }

    fn on_finished(&self, id: &str) {
        self.inner.admission.lock().finish(id);
        debug!(job_id = %id, "job slot released");
        self.pump();
    }

    pub fn get(&self, id: &str) -> Option<JobSnapshot> {
        self.handle(id).map(|h| h.snapshot())
    }

    pub fn handle(&self, id: &str) -> Option<JobHandle> {
        self.inner.jobs.read().get(id).cloned()
    }

    /// Cancel a job.
    ///
    /// A waiting job becomes `Cancelled` immediately; a running job is
    /// signalled and reaches `Cancelled` once its current wave settles.
    pub fn cancel(&self, id: &str) -> Result<()> {
        let handle = self
            .handle(id)
            .ok_or_else(|| ScanError::NotFound(id.to_string()))?;

        let status = handle.status();
        if status.is_terminal() {
            return Err(ScanError::AlreadyTerminal {
                id: id.to_string(),
                status,
            });
        }

        handle.request_cancel();
        let withdrawn = self.inner.admission.lock().withdraw(id);
        settle_cancel(id, &handle, withdrawn)
    }

    /// Resolve once job `id` is terminal.
    pub async fn wait(&self, id: &str) -> Result<JobSnapshot> {
        let handle = self
            .handle(id)
            .ok_or_else(|| ScanError::NotFound(id.to_string()))?;
        Ok(handle.wait().await)
    }

    /// Queued and running jobs, oldest first.
    pub fn list_active(&self) -> Vec<JobSnapshot> {
        let mut active: Vec<JobSnapshot> = self
            .snapshots()
            .into_iter()
            .filter(|s| s.status.is_active())
            .collect();
        active.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        active
    }

    /// Jobs that finished within `window`, most recent first.
    pub fn list_recent(&self, window: Duration) -> Vec<JobSnapshot> {
        let now = self.inner.clock.now();
        let mut recent: Vec<JobSnapshot> = self
            .snapshots()
            .into_iter()
            .filter(|s| {
                s.finished_at
                    .is_some_and(|at| elapsed_between(at, now) <= window)
            })
            .collect();
        recent.sort_by(|a, b| b.finished_at.cmp(&a.finished_at));
        recent
    }

    /// Evict finished jobs older than the retention window. Returns how many
    /// were evicted.
    pub fn prune_expired(&self) -> usize {
        let now = self.inner.clock.now();
        let retention = self.inner.settings.retention;
        let mut jobs = self.inner.jobs.write();
        let before = jobs.len();
        jobs.retain(|_, handle| {
            let snapshot = handle.snapshot();
            match snapshot.finished_at {
                Some(at) => elapsed_between(at, now) <= retention,
                None => true,
            }
        });
        let evicted = before - jobs.len();
        if evicted > 0 {
            debug!(evicted, "evicted expired jobs");
        }
        evicted
    }

    pub fn stats(&self) -> QueueStats {
        let mut stats = QueueStats::default();
        for snapshot in self.snapshots() {
            match snapshot.status {
                JobStatus::Queued => stats.queued += 1,
                JobStatus::Running => stats.running += 1,
                JobStatus::Done => stats.done += 1,
                JobStatus::Error => stats.error += 1,
                JobStatus::Cancelled => stats.cancelled += 1,
            }
        }
        stats
    }

    fn snapshots(&self) -> Vec<JobSnapshot> {
        self.inner
            .jobs
            .read()
            .values()
            .map(JobHandle::snapshot)
            .collect()
    }
}

/// Decide the outcome of a cancel request after the token fired. The job may
/// have finished between the caller's status check and the signal.
fn settle_cancel(id: &str, handle: &JobHandle, withdrawn: bool) -> Result<()> {
    let already_terminal = |status| ScanError::AlreadyTerminal {
        id: id.to_string(),
        status,
    };

    if withdrawn {
        handle.skip_pending(crate::engine::CANCELLED_REASON);
        if !handle.finish(JobStatus::Cancelled, None) {
            return Err(already_terminal(handle.status()));
        }
        info!(job_id = %id, "cancelled queued job");
        return Ok(());
    }

    let status = handle.status();
    if status.is_terminal() && status != JobStatus::Cancelled {
        return Err(already_terminal(status));
    }
    info!(job_id = %id, "cancellation requested for running job");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::dag::ExecutionPlan;
    use crate::types::CachePolicy;

    fn handle() -> JobHandle {
        let plan = ExecutionPlan::new(vec![vec!["sbom".into()]], vec!["sbom".into()]);
        JobHandle::new(
            "scan-1",
            "acme/widgets",
            plan,
            CachePolicy::Default,
            Arc::new(ManualClock::starting_now()),
        )
    }

    #[test]
    fn withdrawn_job_is_cancelled() {
        let h = handle();
        h.request_cancel();
        settle_cancel("scan-1", &h, true).unwrap();
        assert_eq!(h.status(), JobStatus::Cancelled);
    }

    #[test]
    fn job_finishing_before_the_signal_reports_already_terminal() {
        for withdrawn in [false, true] {
            let h = handle();
            h.finish(JobStatus::Done, None);
            h.request_cancel();
            match settle_cancel("scan-1", &h, withdrawn) {
                Err(ScanError::AlreadyTerminal { status, .. }) => {
                    assert_eq!(status, JobStatus::Done)
                }
                other => panic!("expected AlreadyTerminal, got {other:?}"),
            }
            assert_eq!(h.status(), JobStatus::Done);
        }
    }

    #[test]
    fn running_job_accepts_the_request() {
        let h = handle();
        h.request_cancel();
        settle_cancel("scan-1", &h, false).unwrap();
        assert!(h.is_cancel_requested());
    }
}
