// src/engine/core.rs

//! Pure decision logic for wave execution.
//!
//! Nothing here touches Tokio, the cache, or analyzers. The async shell in
//! [`super::runtime`] feeds in the current per-analyzer statuses and acts on
//! the answers, which keeps the semantics unit-testable.

use std::collections::HashMap;
use std::time::Duration;

use crate::dag::{ExecutionPlan, Wave};
use crate::registry::AnalyzerRegistry;
use crate::types::{AnalyzerId, AnalyzerStatus, JobStatus};

use super::EngineSettings;

/// Reason recorded for analyzers never reached because the job was cancelled.
pub const CANCELLED_REASON: &str = "job cancelled";

/// An analyzer that cannot run because a dependency did not produce output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Blocked {
    pub analyzer: AnalyzerId,
    pub dependency: AnalyzerId,
    pub dependency_status: AnalyzerStatus,
}

impl Blocked {
    pub fn reason(&self) -> String {
        match self.dependency_status {
            AnalyzerStatus::Failed => format!("dependency '{}' failed", self.dependency),
            _ => format!("dependency '{}' was skipped", self.dependency),
        }
    }
}

/// Split of a wave's pending analyzers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WavePartition {
    pub blocked: Vec<Blocked>,
    /// Candidates for a cache check and, failing that, dispatch.
    pub runnable: Vec<AnalyzerId>,
}

/// Classify the pending analyzers of `wave` given what earlier waves did.
pub fn partition_wave(
    wave: &Wave,
    registry: &AnalyzerRegistry,
    statuses: &HashMap<AnalyzerId, AnalyzerStatus>,
) -> WavePartition {
    let mut partition = WavePartition::default();

    for id in &wave.analyzers {
        if statuses.get(id).copied() != Some(AnalyzerStatus::Pending) {
            continue;
        }
        let blocker = registry.get(id).and_then(|d| {
            d.dependencies.iter().find_map(|dep| {
                statuses
                    .get(dep)
                    .copied()
                    .filter(|s| s.blocks_dependents())
                    .map(|s| (dep.clone(), s))
            })
        });
        match blocker {
            Some((dependency, dependency_status)) => partition.blocked.push(Blocked {
                analyzer: id.clone(),
                dependency,
                dependency_status,
            }),
            None => partition.runnable.push(id.clone()),
        }
    }

    partition
}

/// Terminal status of a job once execution stopped.
///
/// - `Cancelled` if cancellation was observed before natural completion
/// - `Error` if any explicitly requested analyzer failed
/// - `Done` otherwise
pub fn final_status(
    plan: &ExecutionPlan,
    statuses: &HashMap<AnalyzerId, AnalyzerStatus>,
    cancelled: bool,
) -> (JobStatus, Option<String>) {
    if cancelled {
        return (JobStatus::Cancelled, None);
    }

    let failed: Vec<&str> = plan
        .requested()
        .iter()
        .filter(|id| statuses.get(*id) == Some(&AnalyzerStatus::Failed))
        .map(String::as_str)
        .collect();

    if failed.is_empty() {
        (JobStatus::Done, None)
    } else {
        (
            JobStatus::Error,
            Some(format!("requested analyzers failed: {}", failed.join(", "))),
        )
    }
}

/// Per-analyzer timeout: configured override, then descriptor value, then
/// the engine default.
pub fn effective_timeout(
    registry: &AnalyzerRegistry,
    settings: &EngineSettings,
    analyzer: &str,
) -> Duration {
    settings
        .timeouts
        .get(analyzer)
        .copied()
        .or_else(|| registry.get(analyzer).and_then(|d| d.timeout))
        .unwrap_or(settings.default_timeout)
}
