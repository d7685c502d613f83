//! Structural invariant checking over a [`MutableGraph`] snapshot.
//!
//! Mirrors the teacher's `util::validate` (itself standing in for the
//! original `GraphConsistencyChecker`): walk every live node's adjacency
//! and confirm both endpoints agree about an edge's existence, then
//! report the first batch of violations found rather than stopping at
//! the first one.

use rayon::prelude::*;

use crate::error::GraphError;
use crate::handle::{EdgeHandle, NodeHandle};
use crate::mutable_graph::MutableGraph;

/// One structural violation found by [`check`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Violation {
    /// An edge's endpoint is not a live node.
    DanglingEdgeEndpoint { edge: EdgeHandle, endpoint: NodeHandle },
    /// A node's adjacency list references an edge that does not exist,
    /// or that exists but does not actually connect back to this node.
    AdjacencyMismatch { node: NodeHandle, edge: EdgeHandle },
}

/// Runs every structural check against `graph`'s current state,
/// returning every violation found. An empty result means the graph is
/// internally consistent.
///
/// The edge scan runs in parallel via `rayon`, mirroring the teacher's
/// use of `rayon` for bulk scans over graph elements; violations from
/// different edges are collected independently and concatenated, so
/// ordering is not meaningful beyond the final sort by edge handle.
pub fn check(graph: &MutableGraph) -> Vec<Violation> {
    log::info!("running consistency check");
    let edges = graph.all_edges();

    let mut violations: Vec<Violation> = edges
        .par_iter()
        .flat_map(|&edge| check_edge(graph, edge))
        .collect();

    violations.sort_by_key(|v| match v {
        Violation::DanglingEdgeEndpoint { edge, .. } => edge.raw(),
        Violation::AdjacencyMismatch { edge, .. } => edge.raw(),
    });

    if violations.is_empty() {
        log::info!("consistency check passed ({} edges)", edges.len());
    } else {
        log::warn!("consistency check found {} violation(s)", violations.len());
    }
    violations
}

/// As [`check`], but turns the first violation (if any) into a
/// [`GraphError::Inconsistent`] suitable for bubbling up through the
/// normal `GraphResult` error path.
pub fn check_result(graph: &MutableGraph) -> Result<(), GraphError> {
    match check(graph).into_iter().next() {
        None => Ok(()),
        Some(v) => Err(GraphError::Inconsistent(format!("{:?}", v))),
    }
}

fn check_edge(graph: &MutableGraph, edge: EdgeHandle) -> Vec<Violation> {
    let mut found = Vec::new();
    let (a, b) = match graph.edge_endpoints(edge) {
        Ok(endpoints) => endpoints,
        Err(_) => return found,
    };

    for endpoint in [a, b] {
        if !graph.contains_node(endpoint) {
            found.push(Violation::DanglingEdgeEndpoint { edge, endpoint });
        }
    }

    if found.is_empty() {
        let a_sees_b = graph.neighbors(a).map(|ns| ns.contains(&b)).unwrap_or(false);
        let b_sees_a = graph.neighbors(b).map(|ns| ns.contains(&a)).unwrap_or(false);
        if !a_sees_b {
            found.push(Violation::AdjacencyMismatch { node: a, edge });
        }
        if !b_sees_a {
            found.push(Violation::AdjacencyMismatch { node: b, edge });
        }
    }

    found
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_graph_is_consistent() {
        let _logger = env_logger::try_init();
        let g = MutableGraph::new();
        let a = g.add_node();
        let b = g.add_node();
        g.add_edge(a, b).unwrap();
        assert!(check(&g).is_empty());
        assert!(check_result(&g).is_ok());
    }

    #[test]
    fn contraction_leaves_graph_consistent() {
        let g = MutableGraph::new();
        let a = g.add_node();
        let b = g.add_node();
        let c = g.add_node();
        let ab = g.add_edge(a, b).unwrap();
        g.add_edge(b, c).unwrap();
        g.contract_edge(ab).unwrap();
        assert!(check(&g).is_empty());
    }
}
