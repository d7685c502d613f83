//! Incremental(-ish) connected-components tracking.
//!
//! [`ComponentTracker`] keeps a [`HandleArray`] mapping every live node
//! to the [`ComponentHandle`] of the connected component it currently
//! belongs to, classifying each refresh as a plain continuation, a
//! merge of two or more previously-distinct components, or a split of
//! one component into several — firing the matching notifications in
//! the order documented on [`GraphEvent`].
//!
//! A tracker does not hold a back-reference to the graph it watches:
//! [`ComponentTracker::update`] takes `&MutableGraph` as a plain,
//! transient parameter, so the two never form an ownership cycle.
//! [`MutableGraph`] is the one that owns a tracker (behind
//! `enable_component_management`/`disable_component_management`) and
//! calls `update` itself at the close of every outermost transaction
//! that actually changed something; constructing and driving a
//! `ComponentTracker` directly, as the tests below do, is also
//! supported for callers that want component tracking decoupled from a
//! particular graph's lifecycle. See `DESIGN.md` for the ownership
//! rationale.

use std::collections::VecDeque;
use std::sync::Arc;

use fnv::{FnvHashMap, FnvHashSet};
use parking_lot::RwLock;

use crate::filter::FilterSet;
use crate::handle::{ComponentHandle, NodeHandle};
use crate::handle_array::HandleArray;
use crate::mutable_graph::MutableGraph;
use crate::notify::{EventBus, GraphEvent};

struct TrackerState {
    members: FnvHashMap<ComponentHandle, Vec<NodeHandle>>,
    reuse_queue: VecDeque<ComponentHandle>,
    next_handle: i64,
}

impl TrackerState {
    fn alloc(&mut self) -> ComponentHandle {
        if let Some(h) = self.reuse_queue.pop_front() {
            h
        } else {
            let h = ComponentHandle::new(self.next_handle);
            self.next_handle += 1;
            h
        }
    }
}

/// A connected component as of the tracker's last [`ComponentTracker::update`]:
/// its node set and the edges induced on them (both already filtered to
/// the graph's visible, non-tail elements).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphComponent {
    pub handle: ComponentHandle,
    pub nodes: Vec<NodeHandle>,
    pub edges: Vec<crate::handle::EdgeHandle>,
}

pub struct ComponentTracker {
    component_of: HandleArray<crate::handle::NodeKind, ComponentHandle>,
    state: RwLock<TrackerState>,
    filter: FilterSet,
    events: Arc<EventBus>,
}

impl ComponentTracker {
    /// Builds a tracker over `graph` and runs an initial [`update`](Self::update)
    /// so every currently-live node already has a component assigned.
    pub fn new(graph: &MutableGraph) -> Self {
        let tracker = Self {
            component_of: graph.new_node_array(ComponentHandle::null()),
            state: RwLock::new(TrackerState {
                members: FnvHashMap::default(),
                reuse_queue: VecDeque::new(),
                next_handle: 0,
            }),
            filter: FilterSet::new(),
            events: Arc::clone(graph.events()),
        };
        tracker.update(graph);
        tracker
    }

    /// Installs additional predicates (ANDed on top of the graph's own
    /// default visibility) applied by [`Self::nodes_in_component`].
    pub fn with_filter(mut self, filter: FilterSet) -> Self {
        self.filter = filter;
        self
    }

    pub fn component_of(&self, node: NodeHandle) -> Option<ComponentHandle> {
        match self.component_of.get(node) {
            Ok(h) if !h.is_null() => Some(h),
            _ => None,
        }
    }

    pub fn num_components(&self) -> usize {
        self.state.read().members.len()
    }

    /// Every live component handle, ordered by node count descending,
    /// ties broken by ascending handle — the ordering described for
    /// `Component` itself.
    pub fn components(&self) -> Vec<ComponentHandle> {
        let state = self.state.read();
        let mut handles: Vec<ComponentHandle> = state.members.keys().copied().collect();
        handles.sort_by(|&a, &b| {
            let size_a = state.members.get(&a).map(Vec::len).unwrap_or(0);
            let size_b = state.members.get(&b).map(Vec::len).unwrap_or(0);
            size_b.cmp(&size_a).then(a.cmp(&b))
        });
        handles
    }

    pub fn nodes_in_component(&self, component: ComponentHandle) -> Vec<NodeHandle> {
        let state = self.state.read();
        let members = state.members.get(&component).cloned().unwrap_or_default();
        members.into_iter().filter(|&n| self.filter.node_passes(n)).collect()
    }

    /// The component of an edge is the (shared) component of its two
    /// endpoints; edges are never tracked independently since both
    /// endpoints always resolve to the same component handle.
    pub fn component_of_edge(&self, graph: &MutableGraph, edge: crate::handle::EdgeHandle) -> Option<ComponentHandle> {
        let (a, _b) = graph.edge_endpoints(edge).ok()?;
        self.component_of(a)
    }

    pub fn component_by_id(&self, graph: &MutableGraph, component: ComponentHandle) -> Option<GraphComponent> {
        let nodes = self.nodes_in_component(component);
        if nodes.is_empty() {
            return None;
        }
        let node_set: FnvHashSet<NodeHandle> = nodes.iter().copied().collect();
        let edges: Vec<crate::handle::EdgeHandle> = graph
            .all_edges()
            .into_iter()
            .filter(|&e| {
                graph
                    .edge_endpoints(e)
                    .map(|(a, _)| node_set.contains(&a))
                    .unwrap_or(false)
            })
            .collect();
        Some(GraphComponent {
            handle: component,
            nodes,
            edges,
        })
    }

    /// The component with the most nodes, ties broken by the smallest
    /// handle; `None` if there are no components at all.
    pub fn largest_component(&self, graph: &MutableGraph) -> Option<GraphComponent> {
        let handle = self.components().into_iter().next()?;
        self.component_by_id(graph, handle)
    }

    /// Recomputes connected components over `graph`'s currently visible
    /// nodes and fires the merge/split/added/removed/per-element
    /// notifications documented on [`GraphEvent`], in that order.
    ///
    /// Recomputation is a full BFS over the live node set rather than a
    /// strictly local, touched-region-only scan; classification against
    /// the previous assignment (same handle vs. merge vs. split) is
    /// still exact, only the work to get there is simpler than the
    /// minimal incremental algorithm.
    pub fn update(&self, graph: &MutableGraph) {
        let live_nodes: FnvHashSet<NodeHandle> = graph.all_nodes().into_iter().collect();
        let groups = filtered_connected_components(graph, &self.filter, &live_nodes);

        let mut state = self.state.write();

        let mut group_predecessors: Vec<FnvHashSet<ComponentHandle>> = Vec::with_capacity(groups.len());
        for group in &groups {
            let mut preds = FnvHashSet::default();
            for &n in group {
                if let Ok(h) = self.component_of.get(n) {
                    if !h.is_null() {
                        preds.insert(h);
                    }
                }
            }
            group_predecessors.push(preds);
        }

        let mut successors: FnvHashMap<ComponentHandle, Vec<usize>> = FnvHashMap::default();
        for (i, preds) in group_predecessors.iter().enumerate() {
            for &h in preds {
                successors.entry(h).or_default().push(i);
            }
        }

        let mut assignment: Vec<ComponentHandle> = vec![ComponentHandle::null(); groups.len()];
        let mut merges: Vec<Vec<ComponentHandle>> = Vec::new();
        let mut removed: Vec<ComponentHandle> = Vec::new();
        let mut added: Vec<ComponentHandle> = Vec::new();

        // Old components with no surviving members at all are gone outright.
        for &old_handle in state.members.keys() {
            if !successors.contains_key(&old_handle) {
                removed.push(old_handle);
            }
        }

        for (i, preds) in group_predecessors.iter().enumerate() {
            match preds.len() {
                0 => {
                    let h = state.alloc();
                    added.push(h);
                    assignment[i] = h;
                }
                1 => {
                    let h = *preds.iter().next().unwrap();
                    if successors[&h].len() == 1 {
                        assignment[i] = h; // plain continuation; resolved below if it's actually a split
                    }
                    // else: left null here, resolved in the split pass below
                }
                _ => {
                    let mut sorted: Vec<ComponentHandle> = preds.iter().copied().collect();
                    sorted.sort();
                    let winner = sorted[0];
                    for &loser in &sorted[1..] {
                        removed.push(loser);
                    }
                    merges.push(sorted);
                    added.push(winner);
                    assignment[i] = winner;
                }
            }
        }

        let mut splits: Vec<(ComponentHandle, Vec<ComponentHandle>)> = Vec::new();
        for (&old_handle, group_indices) in successors.iter() {
            if group_indices.len() <= 1 {
                continue;
            }
            let mut pieces: Vec<usize> = group_indices
                .iter()
                .copied()
                .filter(|&gi| group_predecessors[gi].len() == 1)
                .collect();
            if pieces.len() < 2 {
                continue;
            }
            // largest surviving piece keeps the old handle; the rest get
            // fresh ones, deterministically ordered by minimum member handle.
            pieces.sort_by_key(|&gi| std::cmp::Reverse(groups[gi].len()));
            let winner = pieces[0];
            assignment[winner] = old_handle;
            let mut new_handles = Vec::new();
            for &gi in &pieces[1..] {
                let h = state.alloc();
                added.push(h);
                assignment[gi] = h;
                new_handles.push(h);
            }
            new_handles.sort();
            splits.push((old_handle, new_handles));
        }

        let mut new_members: FnvHashMap<ComponentHandle, Vec<NodeHandle>> = FnvHashMap::default();
        let mut changed: Vec<(NodeHandle, ComponentHandle)> = Vec::new();
        for (i, group) in groups.into_iter().enumerate() {
            let handle = assignment[i];
            debug_assert!(!handle.is_null(), "every group must resolve to a handle");
            for &node in &group {
                if self.component_of.get(node).ok() != Some(handle) {
                    let _ = self.component_of.set(node, handle);
                    changed.push((node, handle));
                }
            }
            new_members.insert(handle, group);
        }
        state.members = new_members;
        for &h in &removed {
            state.reuse_queue.push_back(h);
        }
        drop(state);

        for group in &merges {
            self.events.publish(&GraphEvent::ComponentsWillMerge(group.clone()));
        }
        for h in &removed {
            self.events.publish(&GraphEvent::ComponentWillBeRemoved(*h));
        }
        for h in &added {
            self.events.publish(&GraphEvent::ComponentAdded(*h));
        }
        for (old, news) in &splits {
            self.events.publish(&GraphEvent::ComponentSplit(*old, news.clone()));
        }
        let changed_nodes: FnvHashSet<NodeHandle> = changed.iter().map(|&(n, _)| n).collect();
        for (node, handle) in &changed {
            self.events.publish(&GraphEvent::NodeComponentChanged(*node, *handle));
        }
        if !changed_nodes.is_empty() {
            for edge in graph.all_edges() {
                if let Ok((a, b)) = graph.edge_endpoints(edge) {
                    if changed_nodes.contains(&a) || changed_nodes.contains(&b) {
                        if let Some(handle) = self.component_of(a) {
                            self.events.publish(&GraphEvent::EdgeComponentChanged(edge, handle));
                        }
                    }
                }
            }
        }

        if !merges.is_empty() || !removed.is_empty() || !added.is_empty() || !splits.is_empty() {
            log::debug!(
                "component update: {} merge(s), {} removed, {} added, {} split(s)",
                merges.len(),
                removed.len(),
                added.len(),
                splits.len()
            );
        }
    }

}

/// BFS over `live_nodes`, respecting `filter`: a node not passing the
/// filter is never enqueued (so never appears in any group), and an
/// edge not passing the filter is never traversed even when both of its
/// endpoints are otherwise visible. Shared between
/// [`ComponentTracker::update`] and [`MutableGraph::contract_edges`],
/// which runs this directly over a batch-only edge filter rather than
/// standing up a whole tracker (and its event-publishing side effects)
/// just to compute a one-off grouping.
pub(crate) fn filtered_connected_components(
    graph: &MutableGraph,
    filter: &FilterSet,
    live_nodes: &FnvHashSet<NodeHandle>,
) -> Vec<Vec<NodeHandle>> {
    let mut visited: FnvHashSet<NodeHandle> = FnvHashSet::default();
    let mut groups = Vec::new();
    let mut ordered_nodes: Vec<NodeHandle> = live_nodes.iter().copied().filter(|&n| filter.node_passes(n)).collect();
    ordered_nodes.sort();

    for start in ordered_nodes {
        if visited.contains(&start) {
            continue;
        }
        let mut group = Vec::new();
        let mut queue = VecDeque::new();
        queue.push_back(start);
        visited.insert(start);
        while let Some(n) = queue.pop_front() {
            group.push(n);
            if let Ok(edges) = graph.edges_of(n) {
                for e in edges {
                    if !filter.edge_passes(e) {
                        continue;
                    }
                    let (a, b) = match graph.edge_endpoints(e) {
                        Ok(ab) => ab,
                        Err(_) => continue,
                    };
                    let nb = if a == n { b } else { a };
                    if live_nodes.contains(&nb) && filter.node_passes(nb) && visited.insert(nb) {
                        queue.push_back(nb);
                    }
                }
            }
        }
        group.sort();
        groups.push(group);
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn collect_events(graph: &MutableGraph) -> Arc<Mutex<Vec<GraphEvent>>> {
        let log = Arc::new(Mutex::new(Vec::new()));
        let log2 = Arc::clone(&log);
        graph.events().subscribe(move |ev| log2.lock().unwrap().push(ev.clone()));
        log
    }

    #[test]
    fn isolated_nodes_are_separate_components() {
        let g = MutableGraph::new();
        let a = g.add_node();
        let b = g.add_node();
        let tracker = ComponentTracker::new(&g);
        assert_eq!(tracker.num_components(), 2);
        assert_ne!(tracker.component_of(a), tracker.component_of(b));
    }

    #[test]
    fn adding_edge_merges_components() {
        let g = MutableGraph::new();
        let a = g.add_node();
        let b = g.add_node();
        let tracker = ComponentTracker::new(&g);
        let log = collect_events(&g);

        g.add_edge(a, b).unwrap();
        tracker.update(&g);

        assert_eq!(tracker.num_components(), 1);
        assert_eq!(tracker.component_of(a), tracker.component_of(b));

        let events = log.lock().unwrap();
        assert!(events.iter().any(|e| matches!(e, GraphEvent::ComponentsWillMerge(_))));
        assert!(events.iter().any(|e| matches!(e, GraphEvent::ComponentWillBeRemoved(_))));
    }

    #[test]
    fn removing_bridge_edge_splits_component() {
        let g = MutableGraph::new();
        let a = g.add_node();
        let b = g.add_node();
        let c = g.add_node();
        g.add_edge(a, b).unwrap();
        let bridge = g.add_edge(b, c).unwrap();
        let tracker = ComponentTracker::new(&g);
        assert_eq!(tracker.num_components(), 1);

        g.remove_edge(bridge).unwrap();
        let log = collect_events(&g);
        tracker.update(&g);

        assert_eq!(tracker.num_components(), 2);
        assert_ne!(tracker.component_of(a), tracker.component_of(c));
        let events = log.lock().unwrap();
        assert!(events.iter().any(|e| matches!(e, GraphEvent::ComponentSplit(_, _))));
    }

    #[test]
    fn stable_component_handles_are_reused() {
        let g = MutableGraph::new();
        let a = g.add_node();
        let tracker = ComponentTracker::new(&g);
        let original = tracker.component_of(a).unwrap();
        g.remove_node(a).unwrap();
        tracker.update(&g);
        assert_eq!(tracker.num_components(), 0);

        let b = g.add_node();
        tracker.update(&g);
        assert_eq!(tracker.component_of(b), Some(original));
    }
}
