mod common;

use scandag::cache::FreshnessLevel;
use scandag::clock::ManualClock;
use scandag::errors::ScanError;
use scandag::job::QueueSettings;
use scandag::registry::{AnalyzerDescriptor, AnalyzerSelection};
use scandag::service::{ScanService, SubmitOptions};
use scandag::types::{AnalyzerStatus, CachePolicy, JobStatus};

use common::{
    Behaviour, HOUR, MINUTE, RegistryBuilder, RunLog, TestResult, engine_settings, init_tracing,
    service, with_timeout,
};

const TARGET: &str = "acme/widgets";

/// `sbom` (24h TTL) feeds `vulns` (1h TTL); two analyzers may run at once.
fn sbom_vulns() -> (ScanService, RunLog, ManualClock) {
    let clock = ManualClock::starting_now();
    let (registry, log) = RegistryBuilder::new()
        .descriptor(
            AnalyzerDescriptor::new("sbom", 24 * HOUR),
            Behaviour::Payload(br#"{"packages":["serde"]}"#.to_vec()),
        )
        .descriptor(
            AnalyzerDescriptor::new("vulns", HOUR).with_dependency("sbom"),
            Behaviour::Succeed,
        )
        .build();
    let svc = service(registry, &clock, engine_settings(2), QueueSettings::default());
    (svc, log, clock)
}

async fn scan(svc: &ScanService, policy: CachePolicy) -> Result<scandag::job::JobSnapshot, ScanError> {
    let selection = AnalyzerSelection::Analyzers(vec!["vulns".into()]);
    let id = svc.submit_job(TARGET, &selection, SubmitOptions::with_policy(policy))?;
    with_timeout(svc.wait_for_job(&id)).await
}

#[tokio::test]
async fn repeated_scans_reuse_fresh_artifacts() -> TestResult {
    init_tracing();
    let (svc, log, clock) = sbom_vulns();

    let plan = svc.plan(&AnalyzerSelection::Analyzers(vec!["vulns".into()]))?;
    assert_eq!(
        plan.as_names(),
        vec![vec!["sbom".to_string()], vec!["vulns".to_string()]]
    );

    // First scan runs both.
    let first = scan(&svc, CachePolicy::Default).await?;
    assert_eq!(first.status, JobStatus::Done);
    assert_eq!(log.order(), vec!["sbom", "vulns"]);
    assert!(first.analyzers.values().all(|a| a.reused.is_none()));

    // Ten minutes later both are still fresh: nothing runs.
    clock.advance(10 * MINUTE);
    let second = scan(&svc, CachePolicy::Default).await?;
    assert_eq!(second.status, JobStatus::Done);
    assert_eq!(log.calls().len(), 2);
    for id in ["sbom", "vulns"] {
        assert_eq!(
            second.analyzer(id).unwrap().reused,
            Some(FreshnessLevel::Fresh),
            "{id} should be reused"
        );
    }

    // Past vulns' 1h TTL: sbom is reused, vulns runs again.
    clock.advance(70 * MINUTE);
    let third = scan(&svc, CachePolicy::Default).await?;
    assert_eq!(third.status, JobStatus::Done);
    assert_eq!(log.count("sbom"), 1);
    assert_eq!(log.count("vulns"), 2);
    assert_eq!(third.analyzer("sbom").unwrap().reused, Some(FreshnessLevel::Fresh));
    assert_eq!(third.analyzer("vulns").unwrap().reused, None);
    Ok(())
}

#[tokio::test]
async fn best_effort_reuses_stale_artifacts() -> TestResult {
    let (svc, log, clock) = sbom_vulns();
    scan(&svc, CachePolicy::Default).await?;

    clock.advance(2 * HOUR);
    let (_, level) = svc.get_artifact(TARGET, "vulns")?;
    assert_eq!(level, FreshnessLevel::Stale);

    let snap = scan(&svc, CachePolicy::BestEffort).await?;
    assert_eq!(snap.analyzer("vulns").unwrap().reused, Some(FreshnessLevel::Stale));
    assert_eq!(log.count("vulns"), 1);

    let forced = scan(&svc, CachePolicy::Force).await?;
    assert_eq!(forced.count(AnalyzerStatus::Done), 2);
    assert_eq!(log.count("sbom"), 2);
    assert_eq!(log.count("vulns"), 2);
    Ok(())
}

#[tokio::test]
async fn artifacts_and_freshness_report() -> TestResult {
    let (svc, _log, clock) = sbom_vulns();

    assert!(matches!(
        svc.get_artifact(TARGET, "sbom"),
        Err(ScanError::ArtifactNotFound { .. })
    ));
    assert!(matches!(
        svc.get_artifact(TARGET, "nope"),
        Err(ScanError::UnknownId(_))
    ));

    scan(&svc, CachePolicy::Default).await?;
    let (sbom, level) = svc.get_artifact(TARGET, "sbom")?;
    assert_eq!(level, FreshnessLevel::Fresh);
    assert_eq!(sbom.payload_str(), Some(r#"{"packages":["serde"]}"#));

    clock.advance(3 * HOUR);
    let report = svc.freshness_report(TARGET)?;
    assert_eq!(
        report,
        vec![
            ("sbom".to_string(), Some(FreshnessLevel::Fresh)),
            ("vulns".to_string(), Some(FreshnessLevel::Stale)),
        ]
    );

    assert_eq!(svc.invalidate(TARGET, Some("vulns"))?, 1);
    assert_eq!(svc.freshness_report(TARGET)?[1].1, None);
    assert!(matches!(
        svc.invalidate(TARGET, Some("nope")),
        Err(ScanError::UnknownId(_))
    ));
    Ok(())
}

#[tokio::test]
async fn plan_errors_surface_at_submission() {
    let (svc, log, _clock) = sbom_vulns();
    let err = svc
        .submit_job(
            TARGET,
            &AnalyzerSelection::Analyzers(vec!["ghost".into()]),
            SubmitOptions::default(),
        )
        .unwrap_err();
    assert!(matches!(err, ScanError::UnknownId(id) if id == "ghost"));
    assert!(svc.list_active_jobs().is_empty());
    assert!(log.calls().is_empty());
}
