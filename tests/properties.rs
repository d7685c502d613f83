//! Quickcheck-driven invariants over randomly generated operation
//! scripts, complementing the fixed scenarios in `tests/scenarios.rs`.

use graphcore::distinct_set::Position;
use graphcore::MutableGraph;
use quickcheck::{quickcheck, Arbitrary, Gen};

#[derive(Clone, Debug)]
enum Op {
    AddNode,
    AddEdge(u8, u8),
    RemoveNode(u8),
    RemoveEdge(u8),
    ContractEdge(u8),
}

impl Arbitrary for Op {
    fn arbitrary<G: Gen>(g: &mut G) -> Self {
        match u8::arbitrary(g) % 5 {
            0 => Op::AddNode,
            1 => Op::AddEdge(u8::arbitrary(g), u8::arbitrary(g)),
            2 => Op::RemoveNode(u8::arbitrary(g)),
            3 => Op::RemoveEdge(u8::arbitrary(g)),
            _ => Op::ContractEdge(u8::arbitrary(g)),
        }
    }
}

/// Replays `ops` against a fresh graph, indexing `u8` operands modulo
/// however many nodes/edges currently exist so most operations are
/// actually legal rather than immediately rejected.
fn replay(ops: &[Op]) -> MutableGraph {
    let g = MutableGraph::new();
    for op in ops {
        match *op {
            Op::AddNode => {
                g.add_node();
            }
            Op::AddEdge(a, b) => {
                let nodes = g.all_nodes();
                if !nodes.is_empty() {
                    let a = nodes[a as usize % nodes.len()];
                    let b = nodes[b as usize % nodes.len()];
                    let _ = g.add_edge(a, b);
                }
            }
            Op::RemoveNode(i) => {
                let nodes = g.all_nodes();
                if !nodes.is_empty() {
                    let _ = g.remove_node(nodes[i as usize % nodes.len()]);
                }
            }
            Op::RemoveEdge(i) => {
                let edges = g.all_edges();
                if !edges.is_empty() {
                    let _ = g.remove_edge(edges[i as usize % edges.len()]);
                }
            }
            Op::ContractEdge(i) => {
                let edges = g.all_edges();
                if !edges.is_empty() {
                    let _ = g.contract_edge(edges[i as usize % edges.len()]);
                }
            }
        }
    }
    g
}

quickcheck! {
    /// Invariant 1/2: every live edge's endpoints are live nodes, and
    /// each endpoint's adjacency actually contains the edge back.
    fn prop_edges_reference_live_adjacent_nodes(ops: Vec<Op>) -> bool {
        let g = replay(&ops);
        g.all_edges().into_iter().all(|e| {
            let (a, b) = match g.edge_endpoints(e) {
                Ok(ab) => ab,
                Err(_) => return false,
            };
            g.contains_node(a)
                && g.contains_node(b)
                && g.neighbors(a).map(|ns| ns.contains(&b)).unwrap_or(false)
                && g.neighbors(b).map(|ns| ns.contains(&a)).unwrap_or(false)
        })
    }

    /// Invariant 3: every handle is exactly one of Not/Head/Tail, and a
    /// Head's merge group always contains the head itself.
    fn prop_merge_group_classification_is_consistent(ops: Vec<Op>) -> bool {
        let g = replay(&ops);
        g.all_nodes().into_iter().all(|n| match g.node_type(n) {
            Position::Head => g.merge_group(n).map(|m| m.contains(&n)).unwrap_or(false),
            Position::Not => g.node_multiplicity(n) == 1,
            Position::Tail => false, // tails are never returned by all_nodes()
        })
    }

    /// Invariant 6 (restricted to nodes): every live node handle is
    /// strictly below the graph's running allocation counter, i.e. it
    /// came from either the free list or the counter itself.
    fn prop_node_handles_never_exceed_allocation_counter(ops: Vec<Op>) -> bool {
        let g = replay(&ops);
        let capacity = g.new_node_array(()).len();
        g.all_nodes().into_iter().all(|n| n.index().map(|i| i < capacity).unwrap_or(false))
    }

    /// add(e); remove(e) leaves node/edge counts unchanged.
    fn prop_add_then_remove_edge_is_a_no_op(a_is_first: bool) -> bool {
        let g = MutableGraph::new();
        let a = g.add_node();
        let b = g.add_node();
        let before_nodes = g.node_count();
        let before_edges = g.edge_count();

        let e = if a_is_first { g.add_edge(a, b) } else { g.add_edge(b, a) }.unwrap();
        g.remove_edge(e).unwrap();

        g.node_count() == before_nodes && g.edge_count() == before_edges
    }
}

/// merge(a, b) and merge(b, a) are equivalent, and the surviving handle
/// is always the smaller of the two (contraction has no left/right
/// bias).
#[test]
fn contraction_is_order_independent() {
    for &swap in &[false, true] {
        let g = MutableGraph::new();
        let a = g.add_node();
        let b = g.add_node();
        let e = if swap { g.add_edge(b, a) } else { g.add_edge(a, b) }.unwrap();
        let survivor = g.contract_edge(e).unwrap();
        assert_eq!(survivor, a.min(b));
    }
}
