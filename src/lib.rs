// src/lib.rs

pub mod cache;
pub mod cli;
pub mod clock;
pub mod config;
pub mod dag;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod fs;
pub mod job;
pub mod logging;
pub mod registry;
pub mod service;
pub mod types;

use anyhow::{Result, bail};
use tracing::{debug, info, warn};

use crate::cache::age_string;
use crate::cli::{CliArgs, Command, cache_policy};
use crate::config::{ConfigFile, default_config_path, format_duration, load_and_validate};
use crate::job::JobSnapshot;
use crate::service::{ScanService, SubmitOptions};
use crate::types::{AnalyzerStatus, JobStatus};

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config loading
/// - registry / cache / engine / queue (via `ScanService`)
/// - Ctrl-C handling for running scans
pub async fn run(args: CliArgs) -> Result<()> {
    let config_path = args.config.clone().unwrap_or_else(default_config_path);
    let cfg = load_and_validate(&config_path)?;
    debug!(path = ?config_path, analyzers = cfg.analyzer.len(), "loaded config");

    let service = ScanService::from_config(&cfg)?;

    match args.command {
        Command::Scan {
            target,
            selection,
            best_effort,
            force,
            dry_run,
        } => {
            let selection = selection.to_selection();
            if dry_run {
                let plan = service.plan(&selection)?;
                println!("scandag dry-run for {target}");
                print!("{plan}");
                return Ok(());
            }

            let options = SubmitOptions::with_policy(cache_policy(best_effort, force));
            let id = service.submit_job(target, &selection, options)?;

            // Ctrl-C → cancel the job; the engine lets the current wave settle.
            {
                let service = service.clone();
                let id = id.clone();
                tokio::spawn(async move {
                    if let Err(e) = tokio::signal::ctrl_c().await {
                        eprintln!("failed to listen for Ctrl+C: {e}");
                        return;
                    }
                    info!(job_id = %id, "Ctrl+C received; cancelling scan");
                    if let Err(e) = service.cancel_job(&id) {
                        warn!(job_id = %id, error = %e, "could not cancel scan");
                    }
                });
            }

            let snapshot = service.wait_for_job(&id).await?;
            print_job(&snapshot);
            scan_outcome(&snapshot)?;
        }

        Command::Plan { selection } => {
            let plan = service.plan(&selection.to_selection())?;
            print!("{plan}");
        }

        Command::Analyzers => print_analyzers(&cfg, &service),

        Command::Artifact {
            target,
            analyzer,
            ttl,
        } => {
            let (artifact, level) =
                service.get_artifact_with_ttl(&target, &analyzer, ttl.map(|t| t.as_duration()))?;
            let now = service.cache().clock().now();
            eprintln!(
                "{}::{} status={:?} freshness={} produced {} digest={}",
                artifact.target,
                artifact.analyzer,
                artifact.status,
                level,
                age_string(artifact.age(now)),
                artifact.digest
            );
            match artifact.payload_str() {
                Some(text) => println!("{text}"),
                None => println!("<{} bytes of binary payload>", artifact.payload.len()),
            }
        }

        Command::Status { target } => {
            for (id, level) in service.freshness_report(&target)? {
                match level {
                    Some(level) => println!("{id:<24} {level}"),
                    None => println!("{id:<24} missing"),
                }
            }
        }

        Command::Invalidate { target, analyzer } => {
            let removed = service.invalidate(&target, analyzer.as_deref())?;
            println!("removed {removed} artifact(s) for {target}");
        }
    }

    Ok(())
}

/// Map a finished scan onto the process outcome: only `Done` succeeds.
fn scan_outcome(snapshot: &JobSnapshot) -> Result<()> {
    match snapshot.status {
        JobStatus::Error => bail!(
            "scan finished with errors: {}",
            snapshot.error.as_deref().unwrap_or_default()
        ),
        JobStatus::Cancelled => bail!("scan {} was cancelled", snapshot.id),
        _ => Ok(()),
    }
}

fn print_job(snapshot: &JobSnapshot) {
    println!(
        "job {} [{}] target={} status={}",
        snapshot.id,
        snapshot.policy,
        snapshot.target,
        snapshot.status
    );
    for wave in snapshot.plan.waves() {
        for id in &wave.analyzers {
            let Some(state) = snapshot.analyzer(id) else {
                continue;
            };
            let detail = match state.status {
                AnalyzerStatus::Done => match state.reused {
                    Some(level) => format!("cached ({level})"),
                    None => "ran".to_string(),
                },
                AnalyzerStatus::Failed => state.error.clone().unwrap_or_default(),
                AnalyzerStatus::Skipped => state.skip_reason.clone().unwrap_or_default(),
                _ => String::new(),
            };
            println!("  wave {} {:<24} {:<8} {}", wave.index, id, state.status, detail);
        }
    }
}

fn print_analyzers(cfg: &ConfigFile, service: &ScanService) {
    println!("analyzers ({}):", service.registry().len());
    for descriptor in service.registry().descriptors() {
        println!("  - {}", descriptor.id);
        if let Some(desc) = &descriptor.description {
            println!("      description: {desc}");
        }
        if let Some(analyzer) = cfg.analyzer.get(&descriptor.id) {
            println!("      cmd: {}", analyzer.cmd);
        }
        if !descriptor.dependencies.is_empty() {
            println!("      after: {:?}", descriptor.dependencies);
        }
        println!(
            "      ttl: {}",
            format_duration(service.cache().ttl_for(&descriptor.id, None))
        );
        if let Some(timeout) = descriptor.timeout {
            println!("      timeout: {}", format_duration(timeout));
        }
    }

    let profiles: Vec<_> = service.profiles().profiles().collect();
    if !profiles.is_empty() {
        println!();
        println!("profiles ({}):", profiles.len());
        for profile in profiles {
            let marker = if service.profiles().default_profile() == Some(profile.name.as_str()) {
                " (default)"
            } else {
                ""
            };
            println!("  - {}{marker}: {:?}", profile.name, profile.analyzers);
        }
    }
}
