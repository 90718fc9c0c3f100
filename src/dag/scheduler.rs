// src/dag/scheduler.rs

use petgraph::algo::tarjan_scc;
use petgraph::graphmap::DiGraphMap;
use tracing::{debug, warn};

use crate::dag::graph::DagGraph;
use crate::dag::plan::ExecutionPlan;
use crate::errors::{Result, ScanError};
use crate::registry::AnalyzerRegistry;
use crate::types::AnalyzerId;

/// Turns a set of requested analyzers into an [`ExecutionPlan`].
///
/// It borrows the registry; it never caches anything between calls.
#[derive(Debug, Clone, Copy)]
pub struct Scheduler<'a> {
    registry: &'a AnalyzerRegistry,
}

impl<'a> Scheduler<'a> {
    pub fn new(registry: &'a AnalyzerRegistry) -> Self {
        Self { registry }
    }

    /// Layered topological sort of the closure of `requested`.
    ///
    /// - wave 0: analyzers with no dependency inside the closure
    /// - wave k: analyzers whose dependencies all sit in waves `< k`
    /// - inside a wave: registry order
    pub fn plan<S: AsRef<str>>(&self, requested: &[S]) -> Result<ExecutionPlan> {
        let graph = DagGraph::closure(requested, self.registry)?;

        let mut remaining: Vec<usize> = (0..graph.len()).map(|i| graph.deps(i).len()).collect();
        let mut current: Vec<usize> = (0..graph.len()).filter(|&i| remaining[i] == 0).collect();
        let mut waves: Vec<Vec<AnalyzerId>> = Vec::new();
        let mut placed = 0usize;

        while !current.is_empty() {
            placed += current.len();
            let mut next = Vec::new();
            for &node in &current {
                for &dependent in graph.dependents(node) {
                    remaining[dependent] -= 1;
                    if remaining[dependent] == 0 {
                        next.push(dependent);
                    }
                }
            }
            waves.push(current.iter().map(|&i| graph.id(i).to_string()).collect());
            next.sort_unstable();
            current = next;
        }

        if placed < graph.len() {
            let ids = cycle_members(&graph, &remaining);
            warn!(?ids, "dependency cycle detected while planning");
            return Err(ScanError::CycleDetected { ids });
        }

        let mut requested_ids: Vec<AnalyzerId> = Vec::new();
        for id in requested {
            let id = id.as_ref().to_string();
            if !requested_ids.contains(&id) {
                requested_ids.push(id);
            }
        }

        let plan = ExecutionPlan::new(waves, requested_ids);
        debug!(
            waves = plan.len(),
            analyzers = plan.analyzer_count(),
            "computed execution plan"
        );
        Ok(plan)
    }
}

/// Names the analyzers that sit on a cycle among the nodes the sort could not
/// place (strongly connected components larger than one node, or self-loops).
/// Nodes merely downstream of a cycle are left out.
fn cycle_members(graph: &DagGraph, remaining: &[usize]) -> Vec<AnalyzerId> {
    let mut g: DiGraphMap<usize, ()> = DiGraphMap::new();
    for (idx, &left) in remaining.iter().enumerate() {
        if left > 0 {
            g.add_node(idx);
        }
    }
    for idx in 0..graph.len() {
        if remaining[idx] == 0 {
            continue;
        }
        for &dep in graph.deps(idx) {
            if remaining[dep] > 0 {
                g.add_edge(dep, idx, ());
            }
        }
    }

    let mut members: Vec<usize> = tarjan_scc(&g)
        .into_iter()
        .filter(|scc| scc.len() > 1 || scc.iter().any(|&n| g.contains_edge(n, n)))
        .flatten()
        .collect();

    if members.is_empty() {
        members = g.nodes().collect();
    }
    members.sort_unstable();
    members.into_iter().map(|i| graph.id(i).to_string()).collect()
}
