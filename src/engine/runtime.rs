// src/engine/runtime.rs

//! Async shell around the pure engine core.
//!
//! For each wave the engine:
//! - skips analyzers blocked by a failed/skipped dependency,
//! - reuses usable cache hits,
//! - dispatches the rest onto a per-job semaphore, each under its own
//!   timeout, and waits for the whole wave to settle.
//!
//! Cancellation is observed at wave boundaries; in-flight runs see it through
//! a child token and runs still waiting for a slot are skipped.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::cache::{Artifact, CacheDecision, CacheManager};
use crate::errors::Result;
use crate::exec::{Analyzer, RunContext};
use crate::job::JobHandle;
use crate::registry::AnalyzerRegistry;
use crate::types::{AnalyzerId, AnalyzerStatus, JobStatus, Target};

use super::EngineSettings;
use super::core::{CANCELLED_REASON, effective_timeout, final_status, partition_wave};

#[derive(Debug, Clone)]
pub struct ExecutionEngine {
    registry: Arc<AnalyzerRegistry>,
    cache: Arc<CacheManager>,
    settings: EngineSettings,
}

impl ExecutionEngine {
    pub fn new(
        registry: Arc<AnalyzerRegistry>,
        cache: Arc<CacheManager>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            registry,
            cache,
            settings,
        }
    }

    pub fn registry(&self) -> &Arc<AnalyzerRegistry> {
        &self.registry
    }

    pub fn cache(&self) -> &Arc<CacheManager> {
        &self.cache
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Run `job` to a terminal status, mutating it as analyzers progress.
    ///
    /// A job that is already terminal (e.g. cancelled while queued) is left
    /// untouched.
    pub async fn execute(&self, job: &JobHandle) -> Result<JobStatus> {
        if job.status().is_terminal() {
            return Ok(job.status());
        }

        let cancel = job.cancel_token();
        let plan = job.plan();
        let target = job.target();
        let policy = job.policy();

        job.mark_running();
        info!(
            job_id = %job.id(),
            scan_target = %target,
            waves = plan.len(),
            analyzers = plan.analyzer_count(),
            ?policy,
            "job started"
        );

        let slots = Arc::new(Semaphore::new(self.settings.parallel_scanners.max(1)));
        let mut cancelled = false;

        for wave in plan.waves() {
            if cancel.is_cancelled() {
                cancelled = true;
                break;
            }

            let statuses = job.analyzer_statuses();
            let partition = partition_wave(wave, &self.registry, &statuses);

            for blocked in &partition.blocked {
                info!(
                    analyzer = %blocked.analyzer,
                    dependency = %blocked.dependency,
                    "skipping analyzer; dependency did not complete"
                );
                job.skip_analyzer(&blocked.analyzer, blocked.reason());
            }

            let mut dispatch: Vec<AnalyzerId> = Vec::new();
            for id in partition.runnable {
                match self.cache.decide(&target, &id, policy) {
                    Ok(CacheDecision::Hit { artifact, level }) => {
                        info!(analyzer = %id, %level, "reusing cached artifact");
                        job.reuse_analyzer(&id, &artifact.digest, level);
                    }
                    Ok(CacheDecision::Stale { level, .. }) => {
                        debug!(analyzer = %id, %level, "cached artifact too old; re-running");
                        dispatch.push(id);
                    }
                    Ok(CacheDecision::Miss) => dispatch.push(id),
                    Err(e) => {
                        warn!(analyzer = %id, error = %e, "cache lookup failed; treating as miss");
                        dispatch.push(id);
                    }
                }
            }

            debug!(
                wave = wave.index,
                dispatched = dispatch.len(),
                "dispatching wave"
            );

            let mut runs = JoinSet::new();
            for id in dispatch {
                let Some(analyzer) = self.registry.analyzer(&id) else {
                    job.fail_analyzer(&id, "analyzer is not registered");
                    continue;
                };
                let dependencies = self
                    .registry
                    .get(&id)
                    .map(|d| d.dependencies.clone())
                    .unwrap_or_default();
                let run = AnalyzerRun {
                    job: job.clone(),
                    target: target.clone(),
                    timeout: effective_timeout(&self.registry, &self.settings, &id),
                    id,
                    analyzer,
                    dependencies,
                    cache: Arc::clone(&self.cache),
                    slots: Arc::clone(&slots),
                    cancel: cancel.clone(),
                };
                runs.spawn(run.execute());
            }

            while let Some(res) = runs.join_next().await {
                if let Err(e) = res {
                    warn!(error = %e, "analyzer task aborted");
                }
            }

            // A panicking run never reports back; don't leave it Running.
            let statuses = job.analyzer_statuses();
            for id in &wave.analyzers {
                if statuses.get(id) == Some(&AnalyzerStatus::Running) {
                    job.fail_analyzer(id, "analyzer task aborted");
                }
            }

            if cancel.is_cancelled() {
                cancelled = true;
                break;
            }
        }

        if cancelled {
            let skipped = job.skip_pending(CANCELLED_REASON);
            info!(job_id = %job.id(), skipped, "job cancelled; remaining analyzers skipped");
        }

        let (status, error) = final_status(&plan, &job.analyzer_statuses(), cancelled);
        job.finish(status, error);
        Ok(job.status())
    }
}

/// Everything one spawned analyzer run owns.
struct AnalyzerRun {
    job: JobHandle,
    target: Target,
    id: AnalyzerId,
    analyzer: Arc<dyn Analyzer>,
    dependencies: Vec<AnalyzerId>,
    cache: Arc<CacheManager>,
    slots: Arc<Semaphore>,
    timeout: Duration,
    cancel: CancellationToken,
}

impl AnalyzerRun {
    async fn execute(self) {
        let permit = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => {
                self.job.skip_analyzer(&self.id, CANCELLED_REASON);
                return;
            }
            permit = Arc::clone(&self.slots).acquire_owned() => match permit {
                Ok(p) => p,
                Err(_) => {
                    self.job.fail_analyzer(&self.id, "worker pool closed");
                    return;
                }
            },
        };

        let _claim = match self.cache.claim(&self.target, &self.id) {
            Ok(claim) => claim,
            Err(e) => {
                warn!(analyzer = %self.id, error = %e, "analyzer already running elsewhere");
                self.job.fail_analyzer(&self.id, e.to_string());
                return;
            }
        };

        let inputs = self.collect_inputs();
        let token = self.cancel.child_token();
        let ctx = RunContext {
            target: self.target.clone(),
            analyzer: self.id.clone(),
            inputs,
            cancel: token.clone(),
            timeout: self.timeout,
        };

        self.job.start_analyzer(&self.id);
        let started = Instant::now();
        let outcome = tokio::time::timeout(self.timeout, self.analyzer.run(ctx)).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        match outcome {
            Ok(Ok(payload)) => match self.cache.store(&self.target, &self.id, payload) {
                Ok(artifact) => {
                    info!(
                        analyzer = %self.id,
                        elapsed_ms,
                        digest = %artifact.digest,
                        "analyzer completed"
                    );
                    self.job.complete_analyzer(&self.id, &artifact.digest);
                }
                Err(e) => {
                    warn!(analyzer = %self.id, error = %e, "failed to store artifact");
                    self.job
                        .fail_analyzer(&self.id, format!("storing artifact: {e}"));
                }
            },
            Ok(Err(e)) => {
                let message = format!("{e:#}");
                warn!(analyzer = %self.id, elapsed_ms, error = %message, "analyzer failed");
                self.job.fail_analyzer(&self.id, message);
            }
            Err(_) => {
                token.cancel();
                let message = format!("timed out after {:?}", self.timeout);
                warn!(analyzer = %self.id, "analyzer {message}");
                self.job.fail_analyzer(&self.id, message);
            }
        }

        drop(permit);
    }

    /// Latest artifacts of the declared dependencies, fresh or not.
    fn collect_inputs(&self) -> BTreeMap<AnalyzerId, Artifact> {
        let mut inputs = BTreeMap::new();
        for dep in &self.dependencies {
            match self.cache.load(&self.target, dep) {
                Ok(Some(artifact)) => {
                    inputs.insert(dep.clone(), artifact);
                }
                Ok(None) => debug!(analyzer = %self.id, dependency = %dep, "no artifact for dependency"),
                Err(e) => warn!(analyzer = %self.id, dependency = %dep, error = %e, "loading dependency artifact"),
            }
        }
        inputs
    }
}
