#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use scandag::cache::{CacheManager, CacheSettings, MemoryArtifactStore};
use scandag::clock::{Clock, ManualClock};
use scandag::engine::EngineSettings;
use scandag::job::QueueSettings;
use scandag::registry::{AnalyzerRegistry, ProfileResolver};
use scandag::service::{ScanService, ServiceParts};

pub use scandag_test_utils::builders::{AnalyzerConfigBuilder, ConfigFileBuilder, RegistryBuilder};
pub use scandag_test_utils::fake_analyzer::{Behaviour, Gate, RunLog};
pub use scandag_test_utils::{eventually, init_tracing, with_timeout};

pub type TestResult = Result<(), Box<dyn std::error::Error>>;

pub const HOUR: Duration = Duration::from_secs(60 * 60);
pub const MINUTE: Duration = Duration::from_secs(60);

pub fn engine_settings(parallel_scanners: usize) -> EngineSettings {
    EngineSettings {
        parallel_scanners,
        ..EngineSettings::default()
    }
}

pub fn memory_cache(clock: &ManualClock) -> CacheManager {
    let clock: Arc<dyn Clock> = Arc::new(clock.clone());
    CacheManager::new(
        Box::new(MemoryArtifactStore::new()),
        clock,
        CacheSettings::default(),
    )
}

/// Service over an in-memory cache driven by `clock`.
pub fn service(
    registry: AnalyzerRegistry,
    clock: &ManualClock,
    engine: EngineSettings,
    queue: QueueSettings,
) -> ScanService {
    ScanService::new(ServiceParts {
        registry,
        profiles: ProfileResolver::new(),
        cache: memory_cache(clock),
        engine,
        queue,
        clock: Arc::new(clock.clone()),
    })
    .expect("valid registry")
}

pub fn simple_service(registry: AnalyzerRegistry, clock: &ManualClock) -> ScanService {
    service(registry, clock, engine_settings(4), QueueSettings::default())
}
