// src/cache/manager.rs

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, info};

use crate::cache::artifact::{Artifact, ArtifactKey, ArtifactStatus};
use crate::cache::freshness::{FreshnessLevel, FreshnessThresholds};
use crate::cache::store::{ArtifactStore, MemoryArtifactStore};
use crate::clock::{Clock, SystemClock};
use crate::errors::{Result, ScanError};
use crate::registry::AnalyzerRegistry;
use crate::types::{AnalyzerId, CachePolicy};

/// Default TTL for analyzers that declare none.
pub const DEFAULT_TTL: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub thresholds: FreshnessThresholds,
    /// Configured per-analyzer TTLs; these beat descriptor defaults.
    pub ttl_overrides: HashMap<AnalyzerId, Duration>,
    pub default_ttl: Duration,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            thresholds: FreshnessThresholds::default(),
            ttl_overrides: HashMap::new(),
            default_ttl: DEFAULT_TTL,
        }
    }
}

/// Result of consulting the cache before dispatching an analyzer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheDecision {
    /// Reuse `artifact` without running.
    Hit {
        artifact: Artifact,
        level: FreshnessLevel,
    },
    /// An artifact exists but is too old for the policy; run again.
    Stale {
        artifact: Artifact,
        level: FreshnessLevel,
    },
    /// Nothing usable stored (or the policy forces a run).
    Miss,
}

impl CacheDecision {
    pub fn is_hit(&self) -> bool {
        matches!(self, CacheDecision::Hit { .. })
    }
}

/// Freshness-aware front of an [`ArtifactStore`].
///
/// Also tracks which (target, analyzer) pairs are currently being produced so
/// that two runs never write the same key concurrently.
pub struct CacheManager {
    store: Mutex<Box<dyn ArtifactStore>>,
    clock: Arc<dyn Clock>,
    settings: CacheSettings,
    /// Descriptor default TTLs, filled from the registry.
    default_ttls: HashMap<AnalyzerId, Duration>,
    in_flight: Mutex<HashSet<ArtifactKey>>,
}

impl std::fmt::Debug for CacheManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheManager")
            .field("settings", &self.settings)
            .field("in_flight", &self.in_flight.lock().len())
            .finish()
    }
}

impl CacheManager {
    pub fn new(store: Box<dyn ArtifactStore>, clock: Arc<dyn Clock>, settings: CacheSettings) -> Self {
        Self {
            store: Mutex::new(store),
            clock,
            settings,
            default_ttls: HashMap::new(),
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    /// Memory-backed manager on the system clock.
    pub fn in_memory() -> Self {
        Self::new(
            Box::new(MemoryArtifactStore::new()),
            Arc::new(SystemClock),
            CacheSettings::default(),
        )
    }

    /// Pick up each analyzer's declared default TTL.
    pub fn with_registry(mut self, registry: &AnalyzerRegistry) -> Self {
        self.default_ttls = registry
            .descriptors()
            .map(|d| (d.id.clone(), d.default_ttl))
            .collect();
        self
    }

    pub fn settings(&self) -> &CacheSettings {
        &self.settings
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// TTL precedence: explicit override, configured TTL, descriptor default,
    /// global default.
    pub fn ttl_for(&self, analyzer: &str, ttl_override: Option<Duration>) -> Duration {
        ttl_override
            .or_else(|| self.settings.ttl_overrides.get(analyzer).copied())
            .or_else(|| self.default_ttls.get(analyzer).copied())
            .unwrap_or(self.settings.default_ttl)
    }

    /// Raw stored artifact regardless of age.
    pub fn load(&self, target: &str, analyzer: &str) -> Result<Option<Artifact>> {
        let key = ArtifactKey::new(target, analyzer);
        Ok(self.store.lock().load(&key)?)
    }

    /// Stored artifact with its current freshness. Calling this repeatedly
    /// without a `store` in between yields the same answer (modulo the clock).
    pub fn lookup(
        &self,
        target: &str,
        analyzer: &str,
        ttl_override: Option<Duration>,
    ) -> Result<Option<(Artifact, FreshnessLevel)>> {
        let Some(artifact) = self.load(target, analyzer)? else {
            return Ok(None);
        };
        let ttl = self.ttl_for(analyzer, ttl_override);
        let level = self
            .settings
            .thresholds
            .classify(artifact.age(self.clock.now()), ttl);
        Ok(Some((artifact, level)))
    }

    /// Persist a successful payload stamped with the current time.
    pub fn store(&self, target: &str, analyzer: &str, payload: Vec<u8>) -> Result<Artifact> {
        let artifact = Artifact::new(
            target,
            analyzer,
            payload,
            self.clock.now(),
            ArtifactStatus::Ok,
        );
        self.store_artifact(&artifact)?;
        Ok(artifact)
    }

    pub fn store_artifact(&self, artifact: &Artifact) -> Result<()> {
        self.store.lock().save(artifact)?;
        Ok(())
    }

    /// Drop one artifact, or every artifact for `target` when `analyzer` is
    /// `None`. Returns how many were removed.
    pub fn invalidate(&self, target: &str, analyzer: Option<&str>) -> Result<usize> {
        let mut store = self.store.lock();
        let removed = match analyzer {
            Some(id) => usize::from(store.remove(&ArtifactKey::new(target, id))?),
            None => store.remove_target(target)?,
        };
        info!(scan_target = %target, analyzer = ?analyzer, removed, "invalidated cache");
        Ok(removed)
    }

    /// Decide whether `analyzer` must run for `target` under `policy`.
    ///
    /// Artifacts recorded with an error status are never reused.
    pub fn decide(&self, target: &str, analyzer: &str, policy: CachePolicy) -> Result<CacheDecision> {
        if policy == CachePolicy::Force {
            debug!(scan_target = %target, analyzer = %analyzer, "cache bypassed (force)");
            return Ok(CacheDecision::Miss);
        }

        let decision = match self.lookup(target, analyzer, None)? {
            None => CacheDecision::Miss,
            Some((artifact, _)) if !artifact.is_ok() => CacheDecision::Miss,
            Some((artifact, level)) if level.is_reusable(policy) => {
                CacheDecision::Hit { artifact, level }
            }
            Some((artifact, level)) => CacheDecision::Stale { artifact, level },
        };

        debug!(
            scan_target = %target,
            analyzer = %analyzer,
            ?policy,
            hit = decision.is_hit(),
            "cache decision"
        );
        Ok(decision)
    }

    /// Reserve (target, analyzer) for one run. The reservation is released
    /// when the returned guard is dropped.
    pub fn claim(self: &Arc<Self>, target: &str, analyzer: &str) -> Result<RunClaim> {
        let key = ArtifactKey::new(target, analyzer);
        let mut in_flight = self.in_flight.lock();
        if !in_flight.insert(key.clone()) {
            return Err(ScanError::ConflictingRun {
                target: key.target,
                analyzer: key.analyzer,
            });
        }
        Ok(RunClaim {
            cache: Arc::clone(self),
            key,
        })
    }

    pub fn is_in_flight(&self, target: &str, analyzer: &str) -> bool {
        self.in_flight
            .lock()
            .contains(&ArtifactKey::new(target, analyzer))
    }
}

/// Exclusive right to produce one artifact; see [`CacheManager::claim`].
#[derive(Debug)]
pub struct RunClaim {
    cache: Arc<CacheManager>,
    key: ArtifactKey,
}

impl RunClaim {
    pub fn key(&self) -> &ArtifactKey {
        &self.key
    }
}

impl Drop for RunClaim {
    fn drop(&mut self) {
        self.cache.in_flight.lock().remove(&self.key);
    }
}
