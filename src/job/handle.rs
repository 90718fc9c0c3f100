// src/job/handle.rs

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::cache::FreshnessLevel;
use crate::clock::Clock;
use crate::dag::ExecutionPlan;
use crate::types::{AnalyzerId, AnalyzerStatus, CachePolicy, JobId, JobStatus, Target};

/// Progress of one analyzer inside a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AnalyzerState {
    pub status: AnalyzerStatus,
    pub wave: usize,
    pub requested: bool,
    pub error: Option<String>,
    pub skip_reason: Option<String>,
    /// Set when the result came from the cache instead of a run.
    pub reused: Option<FreshnessLevel>,
    pub digest: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl AnalyzerState {
    fn pending(wave: usize, requested: bool) -> Self {
        Self {
            status: AnalyzerStatus::Pending,
            wave,
            requested,
            error: None,
            skip_reason: None,
            reused: None,
            digest: None,
            started_at: None,
            finished_at: None,
        }
    }
}

/// Immutable copy of a job taken under its lock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobSnapshot {
    pub id: JobId,
    pub target: Target,
    pub policy: CachePolicy,
    pub status: JobStatus,
    pub plan: ExecutionPlan,
    pub analyzers: BTreeMap<AnalyzerId, AnalyzerState>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

impl JobSnapshot {
    pub fn analyzer(&self, id: &str) -> Option<&AnalyzerState> {
        self.analyzers.get(id)
    }

    pub fn status_of(&self, id: &str) -> Option<AnalyzerStatus> {
        self.analyzers.get(id).map(|s| s.status)
    }

    pub fn total(&self) -> usize {
        self.analyzers.len()
    }

    /// Analyzers that reached a terminal state.
    pub fn completed(&self) -> usize {
        self.analyzers
            .values()
            .filter(|s| s.status.is_terminal())
            .count()
    }

    /// Analyzers currently executing.
    pub fn running(&self) -> Vec<&str> {
        self.analyzers
            .iter()
            .filter(|(_, s)| s.status == AnalyzerStatus::Running)
            .map(|(id, _)| id.as_str())
            .collect()
    }

    pub fn count(&self, status: AnalyzerStatus) -> usize {
        self.analyzers.values().filter(|s| s.status == status).count()
    }
}

/// Shared, cloneable handle on a live job.
///
/// Every read goes through [`snapshot`](Self::snapshot); the lock is never
/// held across an await point. Once the job is terminal all mutators are
/// no-ops.
#[derive(Clone)]
pub struct JobHandle {
    state: Arc<RwLock<JobSnapshot>>,
    cancel: CancellationToken,
    status_tx: Arc<watch::Sender<JobStatus>>,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for JobHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.read();
        f.debug_struct("JobHandle")
            .field("id", &state.id)
            .field("target", &state.target)
            .field("status", &state.status)
            .finish()
    }
}

impl JobHandle {
    pub fn new(
        id: impl Into<JobId>,
        target: impl Into<Target>,
        plan: ExecutionPlan,
        policy: CachePolicy,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let analyzers = plan
            .waves()
            .iter()
            .flat_map(|wave| {
                wave.analyzers.iter().map(|id| {
                    (
                        id.clone(),
                        AnalyzerState::pending(wave.index, plan.is_requested(id)),
                    )
                })
            })
            .collect();

        let snapshot = JobSnapshot {
            id: id.into(),
            target: target.into(),
            policy,
            status: JobStatus::Queued,
            plan,
            analyzers,
            created_at: clock.now(),
            started_at: None,
            finished_at: None,
            error: None,
        };
        let (status_tx, _) = watch::channel(JobStatus::Queued);

        Self {
            state: Arc::new(RwLock::new(snapshot)),
            cancel: CancellationToken::new(),
            status_tx: Arc::new(status_tx),
            clock,
        }
    }

    pub fn snapshot(&self) -> JobSnapshot {
        self.state.read().clone()
    }

    pub fn id(&self) -> JobId {
        self.state.read().id.clone()
    }

    pub fn target(&self) -> Target {
        self.state.read().target.clone()
    }

    pub fn policy(&self) -> CachePolicy {
        self.state.read().policy
    }

    pub fn plan(&self) -> ExecutionPlan {
        self.state.read().plan.clone()
    }

    pub fn status(&self) -> JobStatus {
        self.state.read().status
    }

    pub fn analyzer_statuses(&self) -> HashMap<AnalyzerId, AnalyzerStatus> {
        self.state
            .read()
            .analyzers
            .iter()
            .map(|(id, s)| (id.clone(), s.status))
            .collect()
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Signal cancellation. The engine decides what that means for the
    /// current wave.
    pub fn request_cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancel_requested(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Apply `f` to the live state unless the job is already terminal.
    fn update<F>(&self, f: F) -> bool
    where
        F: FnOnce(&mut JobSnapshot, DateTime<Utc>),
    {
        let now = self.clock.now();
        let mut state = self.state.write();
        if state.status.is_terminal() {
            return false;
        }
        f(&mut state, now);
        true
    }

    /// Apply `f` to one analyzer unless it (or the job) is terminal.
    fn update_analyzer<F>(&self, id: &str, f: F)
    where
        F: FnOnce(&mut AnalyzerState, DateTime<Utc>),
    {
        self.update(|state, now| {
            if let Some(a) = state.analyzers.get_mut(id) {
                if !a.status.is_terminal() {
                    f(a, now);
                }
            }
        });
    }

    pub fn mark_running(&self) {
        if self.update(|state, now| {
            state.status = JobStatus::Running;
            state.started_at = Some(now);
        }) {
            self.status_tx.send_replace(JobStatus::Running);
        }
    }

    pub fn start_analyzer(&self, id: &str) {
        self.update_analyzer(id, |a, now| {
            a.status = AnalyzerStatus::Running;
            a.started_at = Some(now);
        });
    }

    pub fn complete_analyzer(&self, id: &str, digest: &str) {
        self.update_analyzer(id, |a, now| {
            a.status = AnalyzerStatus::Done;
            a.digest = Some(digest.to_string());
            a.finished_at = Some(now);
        });
    }

    pub fn reuse_analyzer(&self, id: &str, digest: &str, level: FreshnessLevel) {
        self.update_analyzer(id, |a, now| {
            a.status = AnalyzerStatus::Done;
            a.reused = Some(level);
            a.digest = Some(digest.to_string());
            a.finished_at = Some(now);
        });
    }

    pub fn fail_analyzer(&self, id: &str, error: impl Into<String>) {
        let error = error.into();
        self.update_analyzer(id, |a, now| {
            a.status = AnalyzerStatus::Failed;
            a.error = Some(error);
            a.finished_at = Some(now);
        });
    }

    pub fn skip_analyzer(&self, id: &str, reason: impl Into<String>) {
        let reason = reason.into();
        self.update_analyzer(id, |a, now| {
            a.status = AnalyzerStatus::Skipped;
            a.skip_reason = Some(reason);
            a.finished_at = Some(now);
        });
    }

    /// Skip every analyzer that has not started yet.
    pub fn skip_pending(&self, reason: &str) -> usize {
        let mut skipped = 0;
        self.update(|state, now| {
            for a in state.analyzers.values_mut() {
                if a.status == AnalyzerStatus::Pending {
                    a.status = AnalyzerStatus::Skipped;
                    a.skip_reason = Some(reason.to_string());
                    a.finished_at = Some(now);
                    skipped += 1;
                }
            }
        });
        skipped
    }

    /// Move the job to a terminal status. Returns `false` if it already was
    /// terminal (the first terminal status wins).
    pub fn finish(&self, status: JobStatus, error: Option<String>) -> bool {
        debug_assert!(status.is_terminal());
        let finished = self.update(|state, now| {
            state.status = status;
            state.error = error;
            state.finished_at = Some(now);
        });
        if finished {
            let snapshot = self.state.read();
            info!(
                job_id = %snapshot.id,
                scan_target = %snapshot.target,
                status = %status,
                done = snapshot.count(AnalyzerStatus::Done),
                failed = snapshot.count(AnalyzerStatus::Failed),
                skipped = snapshot.count(AnalyzerStatus::Skipped),
                "job finished"
            );
            drop(snapshot);
            self.status_tx.send_replace(status);
        } else {
            debug!(?status, "ignoring finish on terminal job");
        }
        finished
    }

    /// Resolve once the job reaches a terminal status.
    pub async fn wait(&self) -> JobSnapshot {
        let mut rx = self.status_tx.subscribe();
        // `wait_for` checks the current value first, so a job that finished
        // before we subscribed resolves immediately.
        let _ = rx.wait_for(|s| s.is_terminal()).await;
        self.snapshot()
    }
}
