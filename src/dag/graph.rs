// src/dag/graph.rs

use std::collections::HashMap;

use crate::errors::{Result, ScanError};
use crate::registry::AnalyzerRegistry;
use crate::types::AnalyzerId;

/// Internal node structure: stores immediate deps and dependents as indices
/// into `DagGraph::nodes`.
#[derive(Debug, Clone, Default)]
struct DagNode {
    deps: Vec<usize>,
    dependents: Vec<usize>,
}

/// Dependency graph restricted to the transitive closure of a request.
///
/// Nodes are stored in registry order, so iterating indices gives the
/// deterministic tie-break order used by the scheduler.
#[derive(Debug, Clone)]
pub struct DagGraph {
    ids: Vec<AnalyzerId>,
    index: HashMap<AnalyzerId, usize>,
    nodes: Vec<DagNode>,
}

impl DagGraph {
    /// Collect `requested` plus everything they transitively depend on.
    ///
    /// Fails with `UnknownId` for an unregistered requested id and with
    /// `UnknownDependency` for a dependency that is not registered.
    pub fn closure<S: AsRef<str>>(requested: &[S], registry: &AnalyzerRegistry) -> Result<Self> {
        let mut included: Vec<usize> = Vec::new();
        let mut seen = vec![false; registry.len()];
        let mut stack: Vec<usize> = Vec::new();

        for id in requested {
            let id = id.as_ref();
            let pos = registry
                .position(id)
                .ok_or_else(|| ScanError::UnknownId(id.to_string()))?;
            stack.push(pos);
        }

        while let Some(pos) = stack.pop() {
            if seen[pos] {
                continue;
            }
            seen[pos] = true;
            included.push(pos);

            let descriptor = registry
                .descriptor_at(pos)
                .ok_or_else(|| ScanError::UnknownId(format!("#{pos}")))?;
            for dep in &descriptor.dependencies {
                let dep_pos =
                    registry
                        .position(dep)
                        .ok_or_else(|| ScanError::UnknownDependency {
                            id: descriptor.id.clone(),
                            missing: dep.clone(),
                        })?;
                if !seen[dep_pos] {
                    stack.push(dep_pos);
                }
            }
        }

        included.sort_unstable();

        let ids: Vec<AnalyzerId> = included
            .iter()
            .filter_map(|&pos| registry.descriptor_at(pos))
            .map(|d| d.id.clone())
            .collect();
        let index: HashMap<AnalyzerId, usize> = ids
            .iter()
            .enumerate()
            .map(|(i, id)| (id.clone(), i))
            .collect();

        let mut nodes = vec![DagNode::default(); ids.len()];
        for (i, id) in ids.iter().enumerate() {
            let Some(descriptor) = registry.get(id) else {
                continue;
            };
            for dep in &descriptor.dependencies {
                if let Some(&d) = index.get(dep) {
                    nodes[i].deps.push(d);
                    nodes[d].dependents.push(i);
                }
            }
        }

        Ok(Self { ids, index, nodes })
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Ids in registry order.
    pub fn ids(&self) -> &[AnalyzerId] {
        &self.ids
    }

    pub fn id(&self, idx: usize) -> &str {
        &self.ids[idx]
    }

    pub fn index_of(&self, id: &str) -> Option<usize> {
        self.index.get(id).copied()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    pub fn deps(&self, idx: usize) -> &[usize] {
        &self.nodes[idx].deps
    }

    pub fn dependents(&self, idx: usize) -> &[usize] {
        &self.nodes[idx].dependents
    }

    /// Immediate dependencies of an analyzer, by id.
    pub fn dependencies_of(&self, id: &str) -> Vec<&str> {
        self.index_of(id)
            .map(|i| self.deps(i).iter().map(|&d| self.id(d)).collect())
            .unwrap_or_default()
    }
}
