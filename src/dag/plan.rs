// src/dag/plan.rs

use std::fmt;

use serde::Serialize;

use crate::types::AnalyzerId;

/// Analyzers that may run concurrently once every earlier wave has settled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Wave {
    pub index: usize,
    pub analyzers: Vec<AnalyzerId>,
}

/// Ordered waves covering the requested analyzers and their transitive
/// dependencies. Every analyzer appears exactly once and sits in a strictly
/// later wave than each of its dependencies.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct ExecutionPlan {
    waves: Vec<Wave>,
    requested: Vec<AnalyzerId>,
}

impl ExecutionPlan {
    pub(crate) fn new(waves: Vec<Vec<AnalyzerId>>, requested: Vec<AnalyzerId>) -> Self {
        let waves = waves
            .into_iter()
            .enumerate()
            .map(|(index, analyzers)| Wave { index, analyzers })
            .collect();
        Self { waves, requested }
    }

    pub fn waves(&self) -> &[Wave] {
        &self.waves
    }

    /// Number of waves.
    pub fn len(&self) -> usize {
        self.waves.len()
    }

    pub fn is_empty(&self) -> bool {
        self.waves.is_empty()
    }

    /// Analyzers the caller asked for, before dependency expansion.
    pub fn requested(&self) -> &[AnalyzerId] {
        &self.requested
    }

    pub fn is_requested(&self, id: &str) -> bool {
        self.requested.iter().any(|r| r == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.wave_of(id).is_some()
    }

    pub fn wave_of(&self, id: &str) -> Option<usize> {
        self.waves
            .iter()
            .find(|w| w.analyzers.iter().any(|a| a == id))
            .map(|w| w.index)
    }

    /// Every analyzer in plan order.
    pub fn analyzers(&self) -> impl Iterator<Item = &AnalyzerId> + '_ {
        self.waves.iter().flat_map(|w| w.analyzers.iter())
    }

    pub fn analyzer_count(&self) -> usize {
        self.waves.iter().map(|w| w.analyzers.len()).sum()
    }

    /// Plain nested-vector form, e.g. `[["sbom"], ["vulns"]]`.
    pub fn as_names(&self) -> Vec<Vec<String>> {
        self.waves.iter().map(|w| w.analyzers.clone()).collect()
    }
}

impl fmt::Display for ExecutionPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for wave in &self.waves {
            writeln!(f, "wave {}: {}", wave.index, wave.analyzers.join(", "))?;
        }
        Ok(())
    }
}
