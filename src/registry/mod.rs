// src/registry/mod.rs

//! Analyzer catalog and profile resolution.
//!
//! - [`AnalyzerRegistry`] owns every registered analyzer together with its
//!   [`AnalyzerDescriptor`]. It is built once at startup and shared by `Arc`.
//! - [`profiles`] maps named profiles (or explicit lists) onto analyzer ids.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::dag::Scheduler;
use crate::errors::{Result, ScanError};
use crate::exec::Analyzer;
use crate::types::AnalyzerId;

pub mod profiles;

pub use profiles::{AnalyzerSelection, Profile, ProfileResolver};

/// Static metadata about an analyzer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalyzerDescriptor {
    pub id: AnalyzerId,
    /// Analyzers whose artifacts this one consumes. Order is preserved,
    /// duplicates are ignored.
    pub dependencies: Vec<AnalyzerId>,
    pub default_ttl: Duration,
    /// Per-analyzer timeout; the engine default applies when `None`.
    pub timeout: Option<Duration>,
    pub description: Option<String>,
}

impl AnalyzerDescriptor {
    pub fn new(id: impl Into<AnalyzerId>, default_ttl: Duration) -> Self {
        Self {
            id: id.into(),
            dependencies: Vec::new(),
            default_ttl,
            timeout: None,
            description: None,
        }
    }

    pub fn with_dependency(mut self, dep: impl Into<AnalyzerId>) -> Self {
        let dep = dep.into();
        if !self.dependencies.contains(&dep) {
            self.dependencies.push(dep);
        }
        self
    }

    pub fn with_dependencies<I, S>(self, deps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<AnalyzerId>,
    {
        deps.into_iter().fold(self, |d, dep| d.with_dependency(dep))
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

struct RegisteredAnalyzer {
    descriptor: AnalyzerDescriptor,
    analyzer: Arc<dyn Analyzer>,
}

/// Registration-ordered catalog of analyzers.
///
/// Registration order doubles as the deterministic tie-break order inside a
/// plan wave.
#[derive(Default)]
pub struct AnalyzerRegistry {
    entries: Vec<RegisteredAnalyzer>,
    index: HashMap<AnalyzerId, usize>,
}

impl fmt::Debug for AnalyzerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnalyzerRegistry")
            .field("analyzers", &self.ids().collect::<Vec<_>>())
            .finish()
    }
}

impl AnalyzerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an analyzer. Dependencies are not checked here; they may be
    /// registered later. Call [`validate`](Self::validate) once done.
    pub fn register(
        &mut self,
        descriptor: AnalyzerDescriptor,
        analyzer: impl Analyzer + 'static,
    ) -> Result<()> {
        self.register_arc(descriptor, Arc::new(analyzer))
    }

    pub fn register_arc(
        &mut self,
        descriptor: AnalyzerDescriptor,
        analyzer: Arc<dyn Analyzer>,
    ) -> Result<()> {
        if self.index.contains_key(&descriptor.id) {
            return Err(ScanError::DuplicateId(descriptor.id));
        }
        debug!(
            analyzer = %descriptor.id,
            deps = ?descriptor.dependencies,
            "registered analyzer"
        );
        self.index.insert(descriptor.id.clone(), self.entries.len());
        self.entries.push(RegisteredAnalyzer {
            descriptor,
            analyzer,
        });
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    /// Registration position of `id`.
    pub fn position(&self, id: &str) -> Option<usize> {
        self.index.get(id).copied()
    }

    pub fn get(&self, id: &str) -> Option<&AnalyzerDescriptor> {
        self.position(id).and_then(|i| self.descriptor_at(i))
    }

    pub fn descriptor_at(&self, position: usize) -> Option<&AnalyzerDescriptor> {
        self.entries.get(position).map(|e| &e.descriptor)
    }

    pub fn analyzer(&self, id: &str) -> Option<Arc<dyn Analyzer>> {
        self.position(id)
            .map(|i| Arc::clone(&self.entries[i].analyzer))
    }

    /// Ids in registration order.
    pub fn ids(&self) -> impl Iterator<Item = &str> + '_ {
        self.entries.iter().map(|e| e.descriptor.id.as_str())
    }

    pub fn descriptors(&self) -> impl Iterator<Item = &AnalyzerDescriptor> + '_ {
        self.entries.iter().map(|e| &e.descriptor)
    }

    /// Look up descriptors for `ids`, failing on the first unknown one.
    pub fn resolve<S: AsRef<str>>(&self, ids: &[S]) -> Result<Vec<&AnalyzerDescriptor>> {
        ids.iter()
            .map(|id| {
                let id = id.as_ref();
                self.get(id)
                    .ok_or_else(|| ScanError::UnknownId(id.to_string()))
            })
            .collect()
    }

    /// Check that every dependency is registered and the dependency relation
    /// is acyclic.
    pub fn validate(&self) -> Result<()> {
        for descriptor in self.descriptors() {
            for dep in &descriptor.dependencies {
                if !self.contains(dep) {
                    return Err(ScanError::UnknownDependency {
                        id: descriptor.id.clone(),
                        missing: dep.clone(),
                    });
                }
            }
        }
        let all: Vec<AnalyzerId> = self.ids().map(str::to_string).collect();
        Scheduler::new(self).plan(&all)?;
        Ok(())
    }
}
