#![cfg(unix)]

mod common;

use std::collections::BTreeMap;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use scandag::cache::{Artifact, ArtifactStatus};
use scandag::clock::{Clock, SystemClock};
use scandag::config::{ConfigFile, parse_str};
use scandag::exec::{Analyzer, CommandAnalyzer, RunContext};
use scandag::registry::AnalyzerSelection;
use scandag::service::{ScanService, SubmitOptions};
use scandag::types::{AnalyzerStatus, JobStatus};

use common::{TestResult, init_tracing, with_timeout};

fn ctx(inputs: BTreeMap<String, Artifact>) -> RunContext {
    RunContext {
        target: "acme/widgets".into(),
        analyzer: "probe".into(),
        inputs,
        cancel: CancellationToken::new(),
        timeout: Duration::from_secs(5),
    }
}

#[tokio::test]
async fn stdout_becomes_payload_and_env_is_set() -> TestResult {
    let analyzer = CommandAnalyzer::new(r#"printf '%s|%s' "$SCANDAG_TARGET" "$SCANDAG_ANALYZER""#);
    let out = with_timeout(analyzer.run(ctx(BTreeMap::new()))).await?;
    assert_eq!(out, b"acme/widgets|probe");
    Ok(())
}

#[tokio::test]
async fn dependency_payloads_arrive_on_stdin() -> TestResult {
    let sbom = Artifact::new(
        "acme/widgets",
        "sbom",
        br#"{"packages":1}"#.to_vec(),
        SystemClock.now(),
        ArtifactStatus::Ok,
    );
    let mut inputs = BTreeMap::new();
    inputs.insert("sbom".to_string(), sbom);

    let out = with_timeout(CommandAnalyzer::new("cat").run(ctx(inputs))).await?;
    let parsed: serde_json::Value = serde_json::from_slice(&out)?;
    assert_eq!(parsed["sbom"]["packages"], 1);
    Ok(())
}

#[tokio::test]
async fn non_zero_exit_reports_stderr_tail() {
    let analyzer = CommandAnalyzer::new("echo 'no lockfile found' >&2; exit 3");
    let err = with_timeout(analyzer.run(ctx(BTreeMap::new())))
        .await
        .unwrap_err();
    let msg = err.to_string();
    assert!(msg.contains("status 3"), "{msg}");
    assert!(msg.contains("no lockfile found"), "{msg}");
}

#[tokio::test]
async fn cancellation_kills_the_process() {
    let context = ctx(BTreeMap::new());
    let token = context.cancel.clone();
    let analyzer = CommandAnalyzer::new("sleep 30");

    let run = tokio::spawn(async move { analyzer.run(context).await });
    tokio::time::sleep(Duration::from_millis(50)).await;
    token.cancel();

    let res = with_timeout(run).await.expect("task joined");
    assert!(res.unwrap_err().to_string().contains("cancelled"));
}

#[tokio::test]
async fn configured_pipeline_runs_through_shell_commands() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let toml = format!(
        r#"
[settings]
storage_path = "{}"
default_timeout = "10s"

[analyzer.sbom]
cmd = "echo '{{\"packages\":[\"serde\"]}}'"

[analyzer.vulns]
cmd = "cat"
after = ["sbom"]

[analyzer.broken]
cmd = "exit 1"

[analyzer.after-broken]
cmd = "echo never"
after = ["broken"]
"#,
        dir.path().display()
    );
    let cfg = ConfigFile::try_from(parse_str(&toml)?)?;
    let svc = ScanService::from_config(&cfg)?;

    let id = svc.submit_job(
        "acme/widgets",
        &AnalyzerSelection::Analyzers(vec!["vulns".into(), "after-broken".into()]),
        SubmitOptions::default(),
    )?;
    let snap = with_timeout(svc.wait_for_job(&id)).await?;

    assert_eq!(snap.status, JobStatus::Done);
    assert_eq!(snap.status_of("broken"), Some(AnalyzerStatus::Failed));
    assert_eq!(snap.status_of("after-broken"), Some(AnalyzerStatus::Skipped));

    let (vulns, _) = svc.get_artifact("acme/widgets", "vulns")?;
    let parsed = vulns.payload_json().expect("json payload");
    assert_eq!(parsed["sbom"]["packages"][0], "serde");
    assert!(
        dir.path()
            .join("acme/widgets/analysis/vulns.json")
            .is_file()
    );
    Ok(())
}
