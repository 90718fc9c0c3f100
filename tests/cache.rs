mod common;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use scandag::cache::artifact::digest_of;
use scandag::cache::{
    Artifact, ArtifactKey, ArtifactStatus, ArtifactStore, CacheDecision, CacheManager,
    CacheSettings, FileArtifactStore, FreshnessLevel, MemoryArtifactStore,
};
use scandag::clock::{Clock, ManualClock};
use scandag::errors::ScanError;
use scandag::fs::mock::MockFileSystem;
use scandag::types::CachePolicy;

use common::{Behaviour, HOUR, MINUTE, RegistryBuilder, TestResult};

const TARGET: &str = "acme/widgets";

/// Cache whose only analyzer, `vulns`, has a one-hour TTL.
fn cache_with_clock(settings: CacheSettings) -> (CacheManager, ManualClock) {
    let clock = ManualClock::starting_now();
    let (registry, _) = RegistryBuilder::new()
        .default_ttl(HOUR)
        .analyzer("vulns", &[], Behaviour::Succeed)
        .build();
    let shared: Arc<dyn Clock> = Arc::new(clock.clone());
    let cache = CacheManager::new(Box::new(MemoryArtifactStore::new()), shared, settings)
        .with_registry(&registry);
    (cache, clock)
}

#[test]
fn store_then_lookup_is_fresh_and_repeatable() -> TestResult {
    let (cache, _clock) = cache_with_clock(CacheSettings::default());
    let stored = cache.store(TARGET, "vulns", br#"{"count":3}"#.to_vec())?;
    assert_eq!(stored.digest, digest_of(br#"{"count":3}"#));

    let (first, level) = cache.lookup(TARGET, "vulns", None)?.expect("artifact");
    assert_eq!(level, FreshnessLevel::Fresh);
    assert_eq!(first, stored);
    assert_eq!(first.payload_json().unwrap()["count"], 3);

    let (second, level_again) = cache.lookup(TARGET, "vulns", None)?.expect("artifact");
    assert_eq!(first, second);
    assert_eq!(level, level_again);

    assert!(cache.lookup("other/repo", "vulns", None)?.is_none());
    Ok(())
}

#[test]
fn freshness_degrades_with_age() -> TestResult {
    let (cache, clock) = cache_with_clock(CacheSettings::default());
    cache.store(TARGET, "vulns", b"[]".to_vec())?;

    let level = |cache: &CacheManager| cache.lookup(TARGET, "vulns", None).unwrap().unwrap().1;

    clock.advance(30 * MINUTE);
    assert_eq!(level(&cache), FreshnessLevel::Fresh);
    clock.advance(90 * MINUTE);
    assert_eq!(level(&cache), FreshnessLevel::Stale);
    clock.advance(6 * HOUR);
    assert_eq!(level(&cache), FreshnessLevel::VeryStale);
    clock.advance(24 * HOUR);
    assert_eq!(level(&cache), FreshnessLevel::Expired);
    Ok(())
}

#[test]
fn decide_follows_cache_policy() -> TestResult {
    let (cache, clock) = cache_with_clock(CacheSettings::default());
    cache.store(TARGET, "vulns", b"[]".to_vec())?;

    assert!(cache.decide(TARGET, "vulns", CachePolicy::Default)?.is_hit());
    assert_eq!(
        cache.decide(TARGET, "vulns", CachePolicy::Force)?,
        CacheDecision::Miss
    );

    clock.advance(2 * HOUR);
    assert!(matches!(
        cache.decide(TARGET, "vulns", CachePolicy::Default)?,
        CacheDecision::Stale { level: FreshnessLevel::Stale, .. }
    ));
    assert!(matches!(
        cache.decide(TARGET, "vulns", CachePolicy::BestEffort)?,
        CacheDecision::Hit { level: FreshnessLevel::Stale, .. }
    ));

    clock.advance(8 * HOUR);
    assert!(matches!(
        cache.decide(TARGET, "vulns", CachePolicy::BestEffort)?,
        CacheDecision::Stale { level: FreshnessLevel::VeryStale, .. }
    ));

    assert_eq!(
        cache.decide(TARGET, "never-ran", CachePolicy::BestEffort)?,
        CacheDecision::Miss
    );
    Ok(())
}

#[test]
fn ttl_precedence() -> TestResult {
    let mut settings = CacheSettings::default();
    settings.ttl_overrides.insert("vulns".into(), 4 * HOUR);
    let (cache, clock) = cache_with_clock(settings);

    assert_eq!(cache.ttl_for("vulns", None), 4 * HOUR);
    assert_eq!(cache.ttl_for("vulns", Some(MINUTE)), MINUTE);
    assert_eq!(cache.ttl_for("unregistered", None), 24 * HOUR);

    cache.store(TARGET, "vulns", b"[]".to_vec())?;
    clock.advance(2 * HOUR);
    let (_, level) = cache.lookup(TARGET, "vulns", None)?.unwrap();
    assert_eq!(level, FreshnessLevel::Fresh);
    let (_, level) = cache.lookup(TARGET, "vulns", Some(MINUTE * 30))?.unwrap();
    assert_eq!(level, FreshnessLevel::Stale);
    Ok(())
}

#[test]
fn error_artifacts_are_never_reused() -> TestResult {
    let (cache, clock) = cache_with_clock(CacheSettings::default());
    let failed = Artifact::new(
        TARGET,
        "vulns",
        br#"{"error":"boom"}"#.to_vec(),
        clock.now(),
        ArtifactStatus::Error,
    );
    cache.store_artifact(&failed)?;

    assert_eq!(
        cache.decide(TARGET, "vulns", CachePolicy::BestEffort)?,
        CacheDecision::Miss
    );
    // Still visible to readers.
    let (artifact, _) = cache.lookup(TARGET, "vulns", None)?.unwrap();
    assert!(!artifact.is_ok());
    Ok(())
}

#[test]
fn invalidate_single_and_whole_target() -> TestResult {
    let (cache, _clock) = cache_with_clock(CacheSettings::default());
    cache.store(TARGET, "vulns", b"1".to_vec())?;
    cache.store(TARGET, "sbom", b"2".to_vec())?;
    cache.store("other/repo", "vulns", b"3".to_vec())?;

    assert_eq!(cache.invalidate(TARGET, Some("vulns"))?, 1);
    assert_eq!(cache.invalidate(TARGET, Some("vulns"))?, 0);
    assert_eq!(cache.invalidate(TARGET, None)?, 1);
    assert!(cache.load(TARGET, "sbom")?.is_none());
    assert!(cache.load("other/repo", "vulns")?.is_some());
    Ok(())
}

#[test]
fn claim_guards_concurrent_runs_of_one_key() -> TestResult {
    let (cache, _clock) = cache_with_clock(CacheSettings::default());
    let cache = Arc::new(cache);

    let claim = cache.claim(TARGET, "vulns")?;
    assert!(cache.is_in_flight(TARGET, "vulns"));
    assert_eq!(claim.key(), &ArtifactKey::new(TARGET, "vulns"));

    let err = cache.claim(TARGET, "vulns").unwrap_err();
    assert!(matches!(err, ScanError::ConflictingRun { ref analyzer, .. } if analyzer == "vulns"));

    // Other keys are independent.
    let _other = cache.claim("other/repo", "vulns")?;

    drop(claim);
    assert!(!cache.is_in_flight(TARGET, "vulns"));
    let _again = cache.claim(TARGET, "vulns")?;
    Ok(())
}

#[test]
fn file_store_persists_json_per_target() -> TestResult {
    let dir = tempfile::tempdir()?;
    let clock = ManualClock::starting_now();
    let artifact = Artifact::new(TARGET, "sbom", b"{}".to_vec(), clock.now(), ArtifactStatus::Ok);

    let mut store = FileArtifactStore::new(dir.path());
    store.save(&artifact)?;

    let expected = dir.path().join("acme/widgets/analysis/sbom.json");
    assert!(expected.is_file());
    assert!(!expected.with_extension("json.tmp").exists());

    // A fresh store over the same directory sees the artifact.
    let reopened = FileArtifactStore::new(dir.path());
    let loaded = reopened.load(&artifact.key())?.expect("persisted");
    assert_eq!(loaded, artifact);

    assert_eq!(store.remove_target(TARGET)?, 1);
    assert!(store.load(&artifact.key())?.is_none());
    Ok(())
}

#[test]
fn file_store_over_mock_filesystem() -> TestResult {
    let fs = MockFileSystem::new();
    let mut store = FileArtifactStore::with_fs("/store", fs.clone());
    let now = ManualClock::starting_now().now();

    store.save(&Artifact::new(TARGET, "sbom", b"a".to_vec(), now, ArtifactStatus::Ok))?;
    store.save(&Artifact::new(TARGET, "vulns", b"b".to_vec(), now, ArtifactStatus::Ok))?;

    assert_eq!(
        fs.paths(),
        vec![
            PathBuf::from("/store/acme/widgets/analysis/sbom.json"),
            PathBuf::from("/store/acme/widgets/analysis/vulns.json"),
        ]
    );

    assert!(store.remove(&ArtifactKey::new(TARGET, "sbom"))?);
    assert!(!store.remove(&ArtifactKey::new(TARGET, "sbom"))?);
    assert_eq!(fs.paths().len(), 1);

    fs.add_file("/store/acme/widgets/analysis/broken.json", "not json");
    assert!(store.load(&ArtifactKey::new(TARGET, "broken")).is_err());
    Ok(())
}

#[test]
fn file_store_keeps_lookalike_targets_apart() -> TestResult {
    let dir = tempfile::tempdir()?;
    let now = ManualClock::starting_now().now();
    let mut store = FileArtifactStore::new(dir.path());
    store.save(&Artifact::new("acme/a b", "sbom", b"A".to_vec(), now, ArtifactStatus::Ok))?;

    for other in ["acme/a_b", "../acme/a b", "acme//a b", "acme/a b/", "acme/a%20b"] {
        assert!(
            store.load(&ArtifactKey::new(other, "sbom"))?.is_none(),
            "{other:?} must not see acme/a b"
        );
        assert_eq!(store.remove_target(other)?, 0);
    }

    let own = store.load(&ArtifactKey::new("acme/a b", "sbom"))?.expect("stored");
    assert_eq!(own.target, "acme/a b");
    assert_eq!(own.payload_str(), Some("A"));
    for entry in std::fs::read_dir(dir.path())? {
        assert_eq!(entry?.file_name(), "acme");
    }
    Ok(())
}

#[test]
fn file_store_ignores_artifact_written_for_another_key() -> TestResult {
    let fs = MockFileSystem::new();
    let store = FileArtifactStore::with_fs("/store", fs.clone());
    let now = ManualClock::starting_now().now();
    let foreign = Artifact::new("acme/other", "sbom", b"x".to_vec(), now, ArtifactStatus::Ok);

    fs.add_file("/store/acme/widgets/analysis/sbom.json", serde_json::to_vec(&foreign)?);
    assert!(store.load(&ArtifactKey::new(TARGET, "sbom"))?.is_none());
    Ok(())
}

#[test]
fn manual_clock_drives_artifact_age() {
    let clock = ManualClock::starting_now();
    let artifact = Artifact::new(TARGET, "sbom", vec![], clock.now(), ArtifactStatus::Ok);
    clock.advance(Duration::from_secs(90));
    assert_eq!(artifact.age(clock.now()), Duration::from_secs(90));
}
