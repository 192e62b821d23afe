//! Dependency graph passes: ordering of named declarations and build plans.

use std::collections::{BTreeMap, BTreeSet};

use petgraph::algo::{tarjan_scc, toposort};
use petgraph::graph::DiGraph;

use crate::error::EngineResult;
use crate::session::Session;
use crate::target::TargetId;

/// Orders named nodes so that every edge `(from, to)` has `from` first.
///
/// On a cycle, returns the names of every node on one, sorted.
pub fn order_named(names: &[String], edges: &[(usize, usize)]) -> Result<Vec<usize>, Vec<String>> {
    let mut graph: DiGraph<usize, ()> = DiGraph::with_capacity(names.len(), edges.len());
    let nodes: Vec<_> = (0..names.len()).map(|i| graph.add_node(i)).collect();
    for &(from, to) in edges {
        graph.add_edge(nodes[from], nodes[to], ());
    }
    match toposort(&graph, None) {
        Ok(order) => Ok(order.into_iter().map(|n| graph[n]).collect()),
        Err(_) => {
            let mut members: Vec<String> = tarjan_scc(&graph)
                .into_iter()
                .filter(|scc| scc.len() > 1 || graph.contains_edge(scc[0], scc[0]))
                .flatten()
                .map(|n| names[graph[n]].clone())
                .collect();
            members.sort();
            Err(members)
        }
    }
}

impl Session {
    /// Targets reachable from `roots`, roots included.
    fn reachable(&self, roots: &[TargetId]) -> BTreeSet<TargetId> {
        let mut visited = BTreeSet::new();
        let mut stack: Vec<TargetId> = roots.to_vec();
        while let Some(id) = stack.pop() {
            if visited.insert(id) {
                stack.extend(self.target(id).dependencies.values().copied());
            }
        }
        visited
    }

    /// Targets reachable from `roots`, every dependency before its dependents.
    ///
    /// A target only ever depends on targets registered before it, so the
    /// target graph is acyclic and registration order is a topological order.
    pub fn topological_order(&self, roots: &[TargetId]) -> Vec<TargetId> {
        self.reachable(roots).into_iter().collect()
    }

    /// Stale targets reachable from `roots`, grouped by depth.
    ///
    /// Targets within one stage do not depend on each other, so an external
    /// scheduler may run each stage in parallel, guided by the hints.
    pub fn plan(&self, roots: &[TargetId]) -> EngineResult<Vec<PlanStage>> {
        let mut stages: BTreeMap<usize, Vec<PlannedJob>> = BTreeMap::new();
        for id in self.topological_order(roots) {
            let staleness = self.staleness(id)?;
            if staleness.is_up_to_date() {
                continue;
            }
            let target = self.target(id);
            stages.entry(target.depth).or_default().push(PlannedJob {
                target: id,
                reason: staleness.to_string(),
                parallelism_hint: target.parallelism_hint.clone(),
            });
        }
        Ok(stages
            .into_iter()
            .map(|(depth, jobs)| PlanStage { depth, jobs })
            .collect())
    }
}

/// Jobs sharing a depth.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanStage {
    /// Depth of every job in the stage.
    pub depth: usize,
    /// The jobs, dependencies of later stages first.
    pub jobs: Vec<PlannedJob>,
}

/// A stale target scheduled by [`Session::plan`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedJob {
    /// The target.
    pub target: TargetId,
    /// Why it is stale.
    pub reason: String,
    /// The target's parallelism hint.
    pub parallelism_hint: String,
}
