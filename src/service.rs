// src/service.rs

//! The callable surface of the core: submit and inspect scans, read
//! artifacts. Transports (CLI here, anything else elsewhere) sit on top.

use std::sync::Arc;
use std::time::Duration;

use tracing::info;
use uuid::Uuid;

use crate::cache::{
    Artifact, CacheManager, CacheSettings, FileArtifactStore, FreshnessLevel, MemoryArtifactStore,
};
use crate::clock::{Clock, SystemClock};
use crate::config::ConfigFile;
use crate::dag::{ExecutionPlan, Scheduler};
use crate::engine::{EngineSettings, ExecutionEngine};
use crate::errors::{Result, ScanError};
use crate::exec::CommandAnalyzer;
use crate::job::{JobHandle, JobQueue, JobSnapshot, QueueSettings, QueueStats};
use crate::registry::{AnalyzerRegistry, AnalyzerSelection, ProfileResolver};
use crate::types::{AnalyzerId, CachePolicy, JobId, StorageMode, Target};

/// Per-request knobs for [`ScanService::submit_job`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SubmitOptions {
    pub policy: CachePolicy,
}

impl SubmitOptions {
    pub fn with_policy(policy: CachePolicy) -> Self {
        Self { policy }
    }
}

/// Everything needed to build a [`ScanService`] by hand.
pub struct ServiceParts {
    pub registry: AnalyzerRegistry,
    pub profiles: ProfileResolver,
    pub cache: CacheManager,
    pub engine: EngineSettings,
    pub queue: QueueSettings,
    pub clock: Arc<dyn Clock>,
}

#[derive(Debug, Clone)]
pub struct ScanService {
    registry: Arc<AnalyzerRegistry>,
    profiles: Arc<ProfileResolver>,
    cache: Arc<CacheManager>,
    queue: JobQueue,
    clock: Arc<dyn Clock>,
}

impl ScanService {
    /// Validate the registry and wire up cache, engine and queue.
    pub fn new(parts: ServiceParts) -> Result<Self> {
        parts.registry.validate()?;

        let registry = Arc::new(parts.registry);
        let cache = Arc::new(parts.cache.with_registry(&registry));
        let engine = Arc::new(ExecutionEngine::new(
            Arc::clone(&registry),
            Arc::clone(&cache),
            parts.engine,
        ));
        let queue = JobQueue::new(engine, Arc::clone(&parts.clock), parts.queue);

        Ok(Self {
            registry,
            profiles: Arc::new(parts.profiles),
            cache,
            queue,
            clock: parts.clock,
        })
    }

    /// Build from a validated config: every `[analyzer.<id>]` becomes a
    /// command analyzer.
    pub fn from_config(cfg: &ConfigFile) -> Result<Self> {
        Self::from_config_with_clock(cfg, Arc::new(SystemClock))
    }

    pub fn from_config_with_clock(cfg: &ConfigFile, clock: Arc<dyn Clock>) -> Result<Self> {
        let mut registry = AnalyzerRegistry::new();
        for (descriptor, cmd) in cfg.analyzer_descriptors() {
            registry.register(descriptor, CommandAnalyzer::new(cmd))?;
        }

        let store: Box<dyn crate::cache::ArtifactStore> = match cfg.settings.storage {
            StorageMode::File => Box::new(FileArtifactStore::new(cfg.settings.storage_path.clone())),
            StorageMode::Memory => Box::new(MemoryArtifactStore::new()),
        };
        let cache_settings: CacheSettings = cfg.cache_settings();
        let cache = CacheManager::new(store, Arc::clone(&clock), cache_settings);

        Self::new(ServiceParts {
            registry,
            profiles: cfg.profile_resolver(),
            cache,
            engine: cfg.engine_settings(),
            queue: cfg.queue_settings(),
            clock,
        })
    }

    pub fn registry(&self) -> &Arc<AnalyzerRegistry> {
        &self.registry
    }

    pub fn profiles(&self) -> &ProfileResolver {
        &self.profiles
    }

    pub fn cache(&self) -> &Arc<CacheManager> {
        &self.cache
    }

    pub fn queue(&self) -> &JobQueue {
        &self.queue
    }

    /// Resolve a selection and compute its plan without running anything.
    pub fn plan(&self, selection: &AnalyzerSelection) -> Result<ExecutionPlan> {
        let requested = self.profiles.resolve(selection, &self.registry)?;
        Scheduler::new(&self.registry).plan(&requested)
    }

    /// Plan and enqueue a scan of `target`. Plan errors surface here, before
    /// anything runs.
    pub fn submit_job(
        &self,
        target: impl Into<Target>,
        selection: &AnalyzerSelection,
        options: SubmitOptions,
    ) -> Result<JobId> {
        let target = target.into();
        let plan = self.plan(selection)?;
        let id = new_job_id();

        info!(
            job_id = %id,
            scan_target = %target,
            requested = ?plan.requested(),
            "submitting job"
        );

        let job = JobHandle::new(id, target, plan, options.policy, Arc::clone(&self.clock));
        self.queue.enqueue(job)
    }

    pub fn get_job(&self, id: &str) -> Result<JobSnapshot> {
        self.queue
            .get(id)
            .ok_or_else(|| ScanError::NotFound(id.to_string()))
    }

    pub fn cancel_job(&self, id: &str) -> Result<()> {
        self.queue.cancel(id)
    }

    pub async fn wait_for_job(&self, id: &str) -> Result<JobSnapshot> {
        self.queue.wait(id).await
    }

    pub fn list_active_jobs(&self) -> Vec<JobSnapshot> {
        self.queue.list_active()
    }

    pub fn list_recent_jobs(&self, window: Duration) -> Vec<JobSnapshot> {
        self.queue.list_recent(window)
    }

    pub fn queue_stats(&self) -> QueueStats {
        self.queue.stats()
    }

    /// Latest artifact for (target, analyzer) with its current freshness.
    pub fn get_artifact(&self, target: &str, analyzer: &str) -> Result<(Artifact, FreshnessLevel)> {
        self.get_artifact_with_ttl(target, analyzer, None)
    }

    pub fn get_artifact_with_ttl(
        &self,
        target: &str,
        analyzer: &str,
        ttl: Option<Duration>,
    ) -> Result<(Artifact, FreshnessLevel)> {
        if !self.registry.contains(analyzer) {
            return Err(ScanError::UnknownId(analyzer.to_string()));
        }
        self.cache
            .lookup(target, analyzer, ttl)?
            .ok_or_else(|| ScanError::ArtifactNotFound {
                target: target.to_string(),
                analyzer: analyzer.to_string(),
            })
    }

    /// Freshness of every registered analyzer's artifact for `target`, in
    /// registry order. `None` means nothing is stored.
    pub fn freshness_report(&self, target: &str) -> Result<Vec<(AnalyzerId, Option<FreshnessLevel>)>> {
        self.registry
            .ids()
            .map(|id| {
                let level = self.cache.lookup(target, id, None)?.map(|(_, level)| level);
                Ok((id.to_string(), level))
            })
            .collect()
    }

    pub fn invalidate(&self, target: &str, analyzer: Option<&str>) -> Result<usize> {
        if let Some(id) = analyzer {
            if !self.registry.contains(id) {
                return Err(ScanError::UnknownId(id.to_string()));
            }
        }
        self.cache.invalidate(target, analyzer)
    }
}

fn new_job_id() -> JobId {
    format!("scan-{}", Uuid::new_v4().simple())
}
