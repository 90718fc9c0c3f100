use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Canonical analyzer identifier.
pub type AnalyzerId = String;

/// Opaque identifier of the thing being analyzed (e.g. `"owner/repo"`).
pub type Target = String;

/// Identifier handed out by the job queue.
pub type JobId = String;

/// How the cache is consulted before an analyzer is dispatched.
///
/// - `Default`: only `Fresh` artifacts are reused.
/// - `BestEffort`: `Stale` artifacts are reused as well.
/// - `Force`: nothing is reused, every analyzer in the plan runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CachePolicy {
    #[default]
    Default,
    BestEffort,
    Force,
}

impl FromStr for CachePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "default" => Ok(CachePolicy::Default),
            "best-effort" | "best_effort" => Ok(CachePolicy::BestEffort),
            "force" => Ok(CachePolicy::Force),
            other => Err(format!(
                "invalid cache policy: {other} (expected \"default\", \"best-effort\" or \"force\")"
            )),
        }
    }
}

impl fmt::Display for CachePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CachePolicy::Default => "default",
            CachePolicy::BestEffort => "best-effort",
            CachePolicy::Force => "force",
        };
        f.write_str(s)
    }
}

/// Where artifacts are persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageMode {
    /// One JSON file per artifact under the storage path.
    #[default]
    File,
    /// Kept in memory only (lost on restart).
    Memory,
}

/// Lifecycle of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Running,
    Done,
    Error,
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Done | JobStatus::Error | JobStatus::Cancelled)
    }

    pub fn is_active(self) -> bool {
        !self.is_terminal()
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobStatus::Queued => "queued",
            JobStatus::Running => "running",
            JobStatus::Done => "done",
            JobStatus::Error => "error",
            JobStatus::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// Per-analyzer state inside a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalyzerStatus {
    Pending,
    Running,
    Done,
    Failed,
    Skipped,
}

impl AnalyzerStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            AnalyzerStatus::Done | AnalyzerStatus::Failed | AnalyzerStatus::Skipped
        )
    }

    /// Whether dependents of an analyzer in this state must be skipped.
    pub fn blocks_dependents(self) -> bool {
        matches!(self, AnalyzerStatus::Failed | AnalyzerStatus::Skipped)
    }
}

impl fmt::Display for AnalyzerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AnalyzerStatus::Pending => "pending",
            AnalyzerStatus::Running => "running",
            AnalyzerStatus::Done => "done",
            AnalyzerStatus::Failed => "failed",
            AnalyzerStatus::Skipped => "skipped",
        };
        f.pad(s)
    }
}
