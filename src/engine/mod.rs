// src/engine/mod.rs

//! Wave-by-wave execution of a job's plan.
//!
//! The pure decisions (who is blocked, what the job's final status is, which
//! timeout applies) live in [`core`]; the async shell that consults the
//! cache, bounds concurrency and drives analyzers is [`runtime`].

use std::collections::HashMap;
use std::time::Duration;

use crate::types::AnalyzerId;

pub mod core;
pub mod runtime;

pub use self::core::{Blocked, CANCELLED_REASON, WavePartition, final_status, partition_wave};
pub use runtime::ExecutionEngine;

/// Default per-analyzer timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

/// Plain settings the engine consumes.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// Analyzers of one job running at the same time.
    pub parallel_scanners: usize,
    pub default_timeout: Duration,
    /// Configured per-analyzer timeouts.
    pub timeouts: HashMap<AnalyzerId, Duration>,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            parallel_scanners: 4,
            default_timeout: DEFAULT_TIMEOUT,
            timeouts: HashMap::new(),
        }
    }
}
