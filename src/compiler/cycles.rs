//! Circular reference detection over the construction graph.

use std::collections::{HashMap, HashSet};

use crate::error::{DiError, DiResult};
use crate::graph::ServiceGraph;

/// Index of an edge in [`ServiceGraph::edges`].
pub type EdgeId = usize;

/// Outcome of a successful analysis.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Edges that must receive a lazy proxy, in the order they were chosen.
    /// Undeferring any one of them brings back a construction cycle.
    pub deferred: Vec<EdgeId>,
    /// For each entry of `deferred`, the `a -> b -> a` chain it was chosen to break.
    pub cycles: Vec<Vec<String>>,
}

impl CycleReport {
    pub fn is_acyclic(&self) -> bool {
        self.cycles.is_empty()
    }
}

/// Finds construction cycles and decides which edges break them.
///
/// Only construction edges take part: edges already deferred and edges into
/// explicitly lazy services are satisfied by a proxy and never close a cycle.
/// A cycle containing a method-call or property edge is resolvable: the last
/// such edge along the cycle (the one closest to closing it in traversal
/// order) is deferred. A cycle made only of constructor and factory edges is
/// fatal.
///
/// Once no cycle is left, deferrals made redundant by later ones are undone,
/// newest first, so every remaining proxy is needed.
///
/// Traversal follows registration order for nodes and declaration order for
/// edges, so identical input always defers the same edges.
///
/// # Examples
///
/// ```rust
/// use di_compiler::compiler::CycleDetector;
/// use di_compiler::{Definition, GraphBuilder, Reference, Registry};
///
/// let mut registry = Registry::new();
/// registry.register("a", Definition::new("A").arg(Reference::new("b")));
/// registry.register("b", Definition::new("B").call("setA", vec![Reference::new("a").into()]));
///
/// let graph = GraphBuilder::new().build(&registry).unwrap();
/// let report = CycleDetector::new().analyze(&graph).unwrap();
/// assert_eq!(report.cycles, vec![vec!["a".to_string(), "b".into(), "a".into()]]);
/// assert_eq!(graph.edge(report.deferred[0]).unwrap().from, "b");
/// ```
#[derive(Debug, Default)]
pub struct CycleDetector;

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    OnStack,
    Done,
}

impl CycleDetector {
    pub fn new() -> Self {
        Self
    }

    pub fn analyze(&self, graph: &ServiceGraph) -> DiResult<CycleReport> {
        let ids: Vec<&str> = graph.nodes().map(|n| n.id.as_str()).collect();
        let index: HashMap<&str, usize> = ids.iter().enumerate().map(|(i, id)| (*id, i)).collect();
        let edges = graph.edges();

        let mut report = CycleReport::default();
        let mut deferred: HashSet<EdgeId> = HashSet::new();

        // Every round either finishes cleanly or defers one more edge.
        while let Some(cycle) = self.find_cycle(graph, &ids, &index, &deferred) {
            let chain = cycle_chain(graph, &cycle);
            let breaker = cycle.iter().rev().copied().find(|&edge| edges[edge].kind.is_deferrable());

            match breaker {
                Some(edge) => {
                    let e = &edges[edge];
                    tracing::debug!(from = %e.from, to = %e.to, slot = %e.slot, "deferring edge to break cycle");
                    deferred.insert(edge);
                    report.deferred.push(edge);
                    report.cycles.push(chain);
                }
                None => return Err(DiError::FatalCircularReference { chain }),
            }
        }

        for i in (0..report.deferred.len()).rev() {
            let edge = report.deferred[i];
            deferred.remove(&edge);
            if self.find_cycle(graph, &ids, &index, &deferred).is_some() {
                deferred.insert(edge);
            } else {
                let e = &edges[edge];
                tracing::debug!(from = %e.from, to = %e.to, "deferral made redundant by a later one");
                report.deferred.remove(i);
                report.cycles.remove(i);
            }
        }
        Ok(report)
    }

    /// First cycle reachable by an iterative DFS, as the edges along it; the
    /// closing edge comes last.
    fn find_cycle(
        &self,
        graph: &ServiceGraph,
        ids: &[&str],
        index: &HashMap<&str, usize>,
        deferred: &HashSet<EdgeId>,
    ) -> Option<Vec<EdgeId>> {
        let edges = graph.edges();
        let mut marks = vec![Mark::Unvisited; ids.len()];

        for root in 0..ids.len() {
            if marks[root] != Mark::Unvisited {
                continue;
            }
            // (node, position in its outgoing list); path[i] entered stack[i + 1]
            let mut stack: Vec<(usize, usize)> = vec![(root, 0)];
            let mut path: Vec<EdgeId> = Vec::new();
            marks[root] = Mark::OnStack;

            while let Some(&(node, cursor)) = stack.last() {
                let outgoing = graph.node(ids[node]).map(|n| n.outgoing.as_slice()).unwrap_or_default();
                let Some(&edge_id) = outgoing.get(cursor) else {
                    marks[node] = Mark::Done;
                    stack.pop();
                    path.pop();
                    continue;
                };
                if let Some(top) = stack.last_mut() {
                    top.1 += 1;
                }

                let edge = &edges[edge_id];
                if !edge.is_construction_edge() || deferred.contains(&edge_id) {
                    continue;
                }
                let Some(&target) = index.get(edge.to.as_str()) else {
                    continue;
                };
                match marks[target] {
                    Mark::Unvisited => {
                        marks[target] = Mark::OnStack;
                        stack.push((target, 0));
                        path.push(edge_id);
                    }
                    Mark::OnStack => {
                        let start = stack.iter().position(|(n, _)| *n == target).unwrap_or(0);
                        let mut cycle = path[start..].to_vec();
                        cycle.push(edge_id);
                        return Some(cycle);
                    }
                    Mark::Done => {}
                }
            }
        }
        None
    }
}

fn cycle_chain(graph: &ServiceGraph, cycle: &[EdgeId]) -> Vec<String> {
    let edges = graph.edges();
    let mut chain: Vec<String> = cycle.iter().map(|&e| edges[e].from.clone()).collect();
    if let Some(&last) = cycle.last() {
        chain.push(edges[last].to.clone());
    }
    chain
}
