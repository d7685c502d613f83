//! The mutable graph core: node/edge storage, transactional mutation,
//! and edge contraction.
//!
//! Every public mutator runs inside a transaction (explicit, via
//! [`MutableGraph::transaction`], or implicit — a bare call to
//! [`MutableGraph::add_node`] opens and closes one of its own). Per-
//! element notifications ([`GraphEvent::NodeAdded`] and friends) fire
//! immediately as each operation runs; the aggregate
//! [`GraphEvent::GraphChanged`] fires once, when the outermost
//! transaction closes.
//!
//! Contracting an edge does not delete its absorbed endpoint outright:
//! the absorbed node becomes a `Tail` member of a merge group headed by
//! the surviving node (see [`crate::distinct_set`]), and is hidden from
//! the graph's default node/edge iteration by the graph's built-in
//! "hide tails" filter layered under any caller-supplied [`FilterSet`].

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use fnv::{FnvHashMap, FnvHashSet};
use parking_lot::RwLock;

use crate::component_tracker::{filtered_connected_components, ComponentTracker, GraphComponent};
use crate::distinct_set::{DistinctSetCollection, Position};
use crate::error::{GraphError, GraphResult};
use crate::filter::{EdgePredicate, FilterSet, NodePredicate};
use crate::handle::{ComponentHandle, EdgeHandle, EdgeKind, HandleId, NodeHandle, NodeKind, UndirectedEdge};
use crate::handle_array::{HandleArray, HandleArrayRegistry};
use crate::notify::{EventBus, GraphEvent};
use crate::transaction::{TransactionController, TransactionState};

struct NodeRecord {
    alive: bool,
    /// Head of this node's outgoing-edge incidence chain (null if empty),
    /// threaded through the graph's `outgoing_edges` distinct-set
    /// collection rather than stored as a list here.
    outgoing_head: EdgeHandle,
    /// Head of this node's incoming-edge incidence chain (null if empty).
    /// A self-loop's handle is threaded through both chains.
    incoming_head: EdgeHandle,
}

impl Default for NodeRecord {
    fn default() -> Self {
        Self {
            alive: false,
            outgoing_head: EdgeHandle::null(),
            incoming_head: EdgeHandle::null(),
        }
    }
}

struct EdgeRecord {
    alive: bool,
    source: NodeHandle,
    target: NodeHandle,
}

impl Default for EdgeRecord {
    fn default() -> Self {
        Self {
            alive: false,
            source: NodeHandle::null(),
            target: NodeHandle::null(),
        }
    }
}

/// Applies `lo`/`hi` (`lo` numerically smaller, always the resulting
/// head) to whichever of [`DistinctSetCollection::link`]/`add`/`merge`
/// fits their current grouping state. Handles the case the single
/// `is_grouped(lo)` check misses: `hi` already heading its own group
/// while `lo` is still a singleton.
fn union_merge<K>(set: &mut DistinctSetCollection<K>, lo: HandleId<K>, hi: HandleId<K>) -> HandleId<K> {
    match (set.is_grouped(lo), set.is_grouped(hi)) {
        (false, false) => set.link(lo, hi),
        (true, false) => set.add(lo, hi),
        (false, true) => set.add(hi, lo),
        (true, true) => set.merge(lo, hi),
    }
}

/// Threads `edge` onto a node's incidence chain, whose current head is
/// `head` (null if the chain is empty). Returns the chain's new head.
fn link_incidence(set: &mut DistinctSetCollection<EdgeKind>, head: EdgeHandle, edge: EdgeHandle) -> EdgeHandle {
    if head.is_null() {
        edge
    } else if set.classify(head) == Position::Head {
        set.add(head, edge)
    } else {
        set.link(head, edge)
    }
}

/// Removes `edge` from the incidence chain headed by `head`. Returns the
/// chain's new head (null if `edge` was the chain's sole member).
fn unlink_incidence(set: &mut DistinctSetCollection<EdgeKind>, head: EdgeHandle, edge: EdgeHandle) -> EdgeHandle {
    if set.classify(edge) == Position::Not {
        debug_assert_eq!(head, edge, "a singleton incidence chain's sole member is its own head");
        return EdgeHandle::null();
    }
    let other = set.iter(head).find(|&m| m != edge).unwrap_or(EdgeHandle::null());
    set.remove(head, edge).unwrap_or(other)
}

/// Every edge in the incidence chain headed by `head` (empty if `head` is
/// null, a single-element vector if the chain never grew past one edge).
fn chain_members(set: &DistinctSetCollection<EdgeKind>, head: EdgeHandle) -> Vec<EdgeHandle> {
    if head.is_null() {
        Vec::new()
    } else if set.classify(head) == Position::Not {
        vec![head]
    } else {
        set.iter(head).collect()
    }
}

pub(crate) struct GraphStorage {
    nodes: Vec<NodeRecord>,
    edges: Vec<EdgeRecord>,
    node_free: VecDeque<NodeHandle>,
    edge_free: VecDeque<EdgeHandle>,
    next_node: i64,
    next_edge: i64,
    /// Every edge between a pair of endpoints, keyed by the unordered
    /// pair. Order within a bucket is insertion order; nothing in this
    /// crate needs the *map itself* iterated in pair order, so a hash
    /// map is used here rather than the `BTreeMap` a strict reading of
    /// the data model might suggest — see DESIGN.md.
    undirected_index: FnvHashMap<UndirectedEdge, Vec<EdgeHandle>>,
    node_merge: DistinctSetCollection<NodeKind>,
    edge_merge: DistinctSetCollection<EdgeKind>,
    /// Per-node outgoing-edge incidence chains, one distinct-set
    /// collection shared across every node (a node's chain is identified
    /// by its `NodeRecord::outgoing_head`), independent of `edge_merge`.
    outgoing_edges: DistinctSetCollection<EdgeKind>,
    /// As `outgoing_edges`, for incoming incidence chains.
    incoming_edges: DistinctSetCollection<EdgeKind>,
    node_count: usize,
    edge_count: usize,
    tx_depth: usize,
    tx_changed: bool,
}

impl GraphStorage {
    fn new() -> Self {
        Self {
            nodes: Vec::new(),
            edges: Vec::new(),
            node_free: VecDeque::new(),
            edge_free: VecDeque::new(),
            next_node: 0,
            next_edge: 0,
            undirected_index: FnvHashMap::default(),
            node_merge: DistinctSetCollection::new(),
            edge_merge: DistinctSetCollection::new(),
            outgoing_edges: DistinctSetCollection::new(),
            incoming_edges: DistinctSetCollection::new(),
            node_count: 0,
            edge_count: 0,
            tx_depth: 0,
            tx_changed: false,
        }
    }

    fn node_capacity(&self) -> usize {
        self.nodes.len()
    }

    fn edge_capacity(&self) -> usize {
        self.edges.len()
    }

    fn node_record(&self, h: NodeHandle) -> GraphResult<&NodeRecord> {
        let index = h.index().ok_or(GraphError::NullHandle)?;
        self.nodes.get(index).filter(|r| r.alive).ok_or(GraphError::NoSuchNode(h))
    }

    fn edge_record(&self, h: EdgeHandle) -> GraphResult<&EdgeRecord> {
        let index = h.index().ok_or(GraphError::NullHandle)?;
        self.edges.get(index).filter(|r| r.alive).ok_or(GraphError::NoSuchEdge(h))
    }

    /// Every edge touching `node`, each counted once even if it is a
    /// self-loop (which otherwise heads both incidence chains).
    fn incident_edges(&self, node: NodeHandle) -> Vec<EdgeHandle> {
        let rec = &self.nodes[node.index().unwrap()];
        let mut seen: FnvHashSet<EdgeHandle> = FnvHashSet::default();
        chain_members(&self.outgoing_edges, rec.outgoing_head)
            .into_iter()
            .chain(chain_members(&self.incoming_edges, rec.incoming_head))
            .filter(|e| seen.insert(*e))
            .collect()
    }
}

impl TransactionState for GraphStorage {
    fn tx_depth_mut(&mut self) -> &mut usize {
        &mut self.tx_depth
    }
    fn tx_changed_mut(&mut self) -> &mut bool {
        &mut self.tx_changed
    }
}

/// The in-memory, transactional graph engine.
///
/// Nodes and edges absorbed by [`MutableGraph::contract_edge`] are
/// hidden from [`MutableGraph::all_nodes`]/[`MutableGraph::all_edges`]
/// directly (checked against `node_merge`/`edge_merge`'s `Tail`
/// classification), rather than through the general [`FilterSet`]
/// mechanism — `default_filter` is reserved for caller-installed,
/// graph-wide predicates layered on top via [`MutableGraph::with_filter`].
pub struct MutableGraph {
    controller: TransactionController<GraphStorage>,
    events: Arc<EventBus>,
    registry: HandleArrayRegistry,
    default_filter: FilterSet,
    component_tracker: RwLock<Option<ComponentTracker>>,
}

/// Counts of added/removed elements between two points in time, as
/// produced by [`MutableGraph::diff_since`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GraphDiff {
    pub added_nodes: Vec<NodeHandle>,
    pub removed_nodes: Vec<NodeHandle>,
    pub added_edges: Vec<EdgeHandle>,
    pub removed_edges: Vec<EdgeHandle>,
}

/// A cheap, point-in-time record of which nodes/edges are alive, used as
/// the baseline for [`MutableGraph::diff_since`].
#[derive(Debug, Clone)]
pub struct GraphSnapshot {
    nodes: FnvHashSet<NodeHandle>,
    edges: FnvHashSet<EdgeHandle>,
}

impl Default for MutableGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl MutableGraph {
    pub fn new() -> Self {
        Self::with_slow_lock_threshold(Duration::from_millis(100))
    }

    pub fn with_slow_lock_threshold(threshold: Duration) -> Self {
        Self {
            controller: TransactionController::with_threshold(GraphStorage::new(), threshold),
            events: Arc::new(EventBus::new()),
            registry: HandleArrayRegistry::new(),
            default_filter: FilterSet::new(),
            component_tracker: RwLock::new(None),
        }
    }

    /// The shared event bus. Subscribe here (or via
    /// [`crate::attribute_bridge::AttributeBridge`]) to observe the
    /// ordered notification sequence documented on [`GraphEvent`].
    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    pub(crate) fn registry(&self) -> &HandleArrayRegistry {
        &self.registry
    }

    /// Allocates a new [`HandleArray`] keyed by node handle, pre-sized to
    /// the graph's current node capacity and kept in step with it as the
    /// graph grows.
    pub fn new_node_array<V>(&self, default: V) -> HandleArray<NodeKind, V>
    where
        V: Clone + Send + Sync + 'static,
    {
        let (guard, _) = self.controller.enter();
        let capacity = guard.borrow().node_capacity();
        self.controller.exit(&guard);
        self.registry.create(default, capacity)
    }

    /// As [`MutableGraph::new_node_array`], keyed by edge handle.
    pub fn new_edge_array<V>(&self, default: V) -> HandleArray<EdgeKind, V>
    where
        V: Clone + Send + Sync + 'static,
    {
        let (guard, _) = self.controller.enter();
        let capacity = guard.borrow().edge_capacity();
        self.controller.exit(&guard);
        self.registry.create(default, capacity)
    }

    /// Groups one or more operations into a single outermost
    /// transaction: the leading (`TransactionWillBegin`/`GraphWillChange`)
    /// and trailing (`GraphChanged`/`TransactionEnded`) notifications
    /// fire once, around the whole closure, instead of once per call.
    pub fn transaction<R>(&self, f: impl FnOnce(&MutableGraph) -> R) -> R {
        let (guard, is_outer) = self.controller.enter();
        if is_outer {
            self.events.publish(&GraphEvent::TransactionWillBegin);
            self.events.publish(&GraphEvent::GraphWillChange);
        }
        let result = f(self);
        if let Some(changed) = self.controller.exit(&guard) {
            self.finish_transaction(changed);
        }
        result
    }

    /// Runs `f` against the storage, inside a transaction of its own if
    /// one is not already open on this thread.
    fn mutate<R>(&self, f: impl FnOnce(&mut GraphStorage) -> R) -> R {
        let (guard, is_outer) = self.controller.enter();
        if is_outer {
            self.events.publish(&GraphEvent::TransactionWillBegin);
            self.events.publish(&GraphEvent::GraphWillChange);
        }
        let result = {
            let mut storage = guard.borrow_mut();
            f(&mut storage)
        };
        if let Some(changed) = self.controller.exit(&guard) {
            self.finish_transaction(changed);
        }
        result
    }

    /// Runs the component tracker's update (events 4-8, if component
    /// management is enabled and something actually changed) before
    /// firing the aggregate `GraphChanged`/`TransactionEnded` pair (9-10).
    /// Called with the outermost transaction's writer guard still held by
    /// this thread; `ComponentTracker::update` re-enters the same
    /// reentrant lock rather than racing a second writer.
    fn finish_transaction(&self, changed: bool) {
        if changed {
            if let Some(tracker) = self.component_tracker.read().as_ref() {
                tracker.update(self);
            }
        }
        self.events.publish(&GraphEvent::GraphChanged(changed));
        self.events.publish(&GraphEvent::TransactionEnded);
    }

    // -- component management --------------------------------------------

    pub fn component_management_enabled(&self) -> bool {
        self.component_tracker.read().is_some()
    }

    /// Turns on incremental component tracking, building it fresh from
    /// the graph's current state. Re-enabling after a `disable` rebuilds
    /// from scratch rather than resuming stale bookkeeping.
    pub fn enable_component_management(&self) {
        let mut slot = self.component_tracker.write();
        if slot.is_none() {
            *slot = Some(ComponentTracker::new(self));
        }
    }

    /// Turns off component tracking. Mutations continue to apply to the
    /// graph as normal; no component events fire until re-enabled.
    pub fn disable_component_management(&self) {
        *self.component_tracker.write() = None;
    }

    pub fn component_handles(&self) -> Vec<ComponentHandle> {
        self.component_tracker.read().as_ref().map(|t| t.components()).unwrap_or_default()
    }

    pub fn num_components(&self) -> usize {
        self.component_tracker.read().as_ref().map(|t| t.num_components()).unwrap_or(0)
    }

    pub fn contains_component(&self, component: ComponentHandle) -> bool {
        self.component_tracker
            .read()
            .as_ref()
            .map(|t| t.components().contains(&component))
            .unwrap_or(false)
    }

    pub fn component_by_id(&self, component: ComponentHandle) -> Option<GraphComponent> {
        self.component_tracker.read().as_ref().and_then(|t| t.component_by_id(self, component))
    }

    pub fn component_of_node(&self, node: NodeHandle) -> Option<ComponentHandle> {
        self.component_tracker.read().as_ref().and_then(|t| t.component_of(node))
    }

    pub fn component_of_edge(&self, edge: EdgeHandle) -> Option<ComponentHandle> {
        self.component_tracker.read().as_ref().and_then(|t| t.component_of_edge(self, edge))
    }

    /// The component with the most nodes; ties broken by the smallest
    /// component handle.
    pub fn largest_component(&self) -> Option<GraphComponent> {
        self.component_tracker.read().as_ref().and_then(|t| t.largest_component(self))
    }

    // -- node / edge mutation -------------------------------------------------

    pub fn add_node(&self) -> NodeHandle {
        self.mutate(|storage| {
            let handle = if let Some(h) = storage.node_free.pop_front() {
                h
            } else {
                let h = NodeHandle::new(storage.next_node);
                storage.next_node += 1;
                h
            };
            let index = handle.index().unwrap();
            if index >= storage.nodes.len() {
                storage.nodes.resize_with(index + 1, NodeRecord::default);
                storage.node_merge.ensure_capacity(storage.nodes.len());
                self.registry.resize_all(storage.nodes.len());
            }
            storage.nodes[index] = NodeRecord {
                alive: true,
                outgoing_head: EdgeHandle::null(),
                incoming_head: EdgeHandle::null(),
            };
            storage.node_count += 1;
            storage.tx_changed = true;
            self.events.publish(&GraphEvent::NodeAdded(handle));
            log::debug!("node added: {}", handle);
            handle
        })
    }

    /// Adds a directed edge from `source` to `target`. Parallel edges
    /// (including more than one edge between the same pair, in either
    /// direction, and self-loops where `source == target`) are allowed;
    /// see [`MutableGraph::edges_between`].
    pub fn add_edge(&self, source: NodeHandle, target: NodeHandle) -> GraphResult<EdgeHandle> {
        self.mutate(|storage| {
            storage.node_record(source)?;
            storage.node_record(target)?;

            let handle = if let Some(h) = storage.edge_free.pop_front() {
                h
            } else {
                let h = EdgeHandle::new(storage.next_edge);
                storage.next_edge += 1;
                h
            };
            let index = handle.index().unwrap();
            if index >= storage.edges.len() {
                storage.edges.resize_with(index + 1, EdgeRecord::default);
                storage.edge_merge.ensure_capacity(storage.edges.len());
                storage.outgoing_edges.ensure_capacity(storage.edges.len());
                storage.incoming_edges.ensure_capacity(storage.edges.len());
                self.registry.resize_all(storage.edges.len());
            }
            storage.edges[index] = EdgeRecord {
                alive: true,
                source,
                target,
            };
            storage
                .undirected_index
                .entry(UndirectedEdge::new(source, target))
                .or_insert_with(Vec::new)
                .push(handle);
            {
                let src_head = storage.nodes[source.index().unwrap()].outgoing_head;
                let new_head = link_incidence(&mut storage.outgoing_edges, src_head, handle);
                storage.nodes[source.index().unwrap()].outgoing_head = new_head;
            }
            {
                let tgt_head = storage.nodes[target.index().unwrap()].incoming_head;
                let new_head = link_incidence(&mut storage.incoming_edges, tgt_head, handle);
                storage.nodes[target.index().unwrap()].incoming_head = new_head;
            }
            storage.edge_count += 1;
            storage.tx_changed = true;
            self.events.publish(&GraphEvent::EdgeAdded(handle));
            log::debug!("edge added: {} ({} -> {})", handle, source, target);
            Ok(handle)
        })
    }

    pub fn remove_edge(&self, edge: EdgeHandle) -> GraphResult<()> {
        self.mutate(|storage| Self::remove_edge_locked(storage, &self.events, edge))
    }

    /// Detaches `edge` from its current endpoints' adjacency lists and
    /// from the undirected-edge index, without changing its liveness,
    /// merge-group membership, or free-list status. Used mid-contraction
    /// to pick an edge back up before either folding it into another
    /// edge's identity or re-seating it at new endpoints.
    fn detach_edge_locked(storage: &mut GraphStorage, edge: EdgeHandle) {
        let (source, target) = {
            let rec = &storage.edges[edge.index().unwrap()];
            (rec.source, rec.target)
        };
        let key = UndirectedEdge::new(source, target);
        if let Some(bucket) = storage.undirected_index.get_mut(&key) {
            bucket.retain(|&e| e != edge);
            if bucket.is_empty() {
                storage.undirected_index.remove(&key);
            }
        }
        if let Some(index) = source.index().filter(|&i| i < storage.nodes.len()) {
            let head = storage.nodes[index].outgoing_head;
            storage.nodes[index].outgoing_head = unlink_incidence(&mut storage.outgoing_edges, head, edge);
        }
        if let Some(index) = target.index().filter(|&i| i < storage.nodes.len()) {
            let head = storage.nodes[index].incoming_head;
            storage.nodes[index].incoming_head = unlink_incidence(&mut storage.incoming_edges, head, edge);
        }
    }

    /// Permanently retires `handle`'s slot: marks it dead and, only if it
    /// was never folded into a merge group, returns it to the free list
    /// for reuse. A handle that is (or was) part of a merge group keeps
    /// its slot forever, so that `DistinctSetCollection` links into it
    /// never dangle.
    fn remove_edge_locked(storage: &mut GraphStorage, events: &EventBus, edge: EdgeHandle) -> GraphResult<()> {
        let record = storage.edge_record(edge)?;
        let _ = record;
        let was_head = storage.edge_merge.classify(edge) == Position::Head;

        if was_head {
            // Removing the head of a merge group removes the whole
            // group: every duplicate folded into it over past
            // contractions is retired too.
            let members: Vec<EdgeHandle> = storage.edge_merge.iter(edge).collect();
            let mut current = edge;
            while let Some(new_head) = storage.edge_merge.remove(current, current) {
                current = new_head;
            }
            for member in members {
                if member != edge {
                    storage.edges[member.index().unwrap()].alive = false;
                    storage.edge_free.push_back(member);
                    events.publish(&GraphEvent::EdgeRemoved(member));
                }
            }
        }

        Self::detach_edge_locked(storage, edge);
        storage.edges[edge.index().unwrap()].alive = false;
        storage.edge_free.push_back(edge);
        storage.edge_count -= 1;
        storage.tx_changed = true;
        events.publish(&GraphEvent::EdgeRemoved(edge));
        log::debug!("edge removed: {}", edge);
        Ok(())
    }

    /// Removes `node` and every edge incident to it.
    pub fn remove_node(&self, node: NodeHandle) -> GraphResult<()> {
        self.mutate(|storage| {
            storage.node_record(node)?;
            let incident: Vec<EdgeHandle> = storage.incident_edges(node);
            for edge in incident {
                Self::remove_edge_locked(storage, &self.events, edge)?;
            }

            let was_head = storage.node_merge.classify(node) == Position::Head;
            if was_head {
                let members: Vec<NodeHandle> = storage.node_merge.iter(node).collect();
                let mut current = node;
                while let Some(new_head) = storage.node_merge.remove(current, current) {
                    current = new_head;
                }
                for member in members {
                    if member != node {
                        storage.nodes[member.index().unwrap()].alive = false;
                        storage.node_free.push_back(member);
                        self.events.publish(&GraphEvent::NodeRemoved(member));
                    }
                }
            }

            let index = node.index().unwrap();
            storage.nodes[index].alive = false;
            storage.nodes[index].outgoing_head = EdgeHandle::null();
            storage.nodes[index].incoming_head = EdgeHandle::null();
            storage.node_free.push_back(node);
            storage.node_count -= 1;
            storage.tx_changed = true;
            self.events.publish(&GraphEvent::NodeRemoved(node));
            log::debug!("node removed: {}", node);
            Ok(())
        })
    }

    // -- contraction ------------------------------------------------------

    /// Merges `edge`'s two endpoints into one node and removes the edge.
    /// The surviving node is the numerically smaller of the two (the
    /// merge group's `Head`); the other becomes a hidden `Tail` member,
    /// its slot permanently retired rather than returned to the free
    /// list, so that the merge group's links never dangle.
    ///
    /// Every remaining edge of the absorbed node is reparented onto the
    /// survivor, reusing its own handle and preserving its direction —
    /// an edge that pointed at the absorbed node now points at the
    /// survivor, and likewise for one that pointed away from it. This
    /// can produce parallel edges (two edges already connected the
    /// absorbed node to the same neighbor) or a self-loop (the absorbed
    /// node had a direct edge to the survivor); both are left as-is,
    /// since the graph allows them.
    ///
    /// Returns the surviving node's handle.
    ///
    /// The absorbed node is not removed: it remains alive, still
    /// answering `true` to [`MutableGraph::contains_node`], but is
    /// folded into `survivor`'s `node_merge` group as a `Tail` and so
    /// disappears from `all_nodes`/`all_edges`-style default iteration.
    /// No `NodeRemoved` fires for it; the only removal notification is
    /// for `edge` itself.
    pub fn contract_edge(&self, edge: EdgeHandle) -> GraphResult<NodeHandle> {
        self.transaction(|g| {
            g.mutate(|storage| {
                let record = storage.edge_record(edge)?;
                let (a, b) = (record.source, record.target);
                let (survivor, absorbed) = if a < b { (a, b) } else { (b, a) };

                Self::remove_edge_locked(storage, &g.events, edge)?;
                Self::absorb_node_locked(storage, survivor, absorbed);
                Ok(survivor)
            })
        })
    }

    /// Reparents every remaining edge incident to `absorbed` onto
    /// `survivor`, then declares the two nodes equivalent via
    /// `node_merge`. Shared between [`MutableGraph::contract_edge`] (the
    /// contracted edge is already gone by the time this runs) and
    /// [`MutableGraph::contract_edges`] (the batch's edges are removed
    /// afterward instead).
    fn absorb_node_locked(storage: &mut GraphStorage, survivor: NodeHandle, absorbed: NodeHandle) {
        let absorbed_edges: Vec<EdgeHandle> = storage.incident_edges(absorbed);

        for old_edge in absorbed_edges {
            Self::detach_edge_locked(storage, old_edge);

            let index = old_edge.index().unwrap();
            let (new_source, new_target) = {
                let rec = &storage.edges[index];
                let new_source = if rec.source == absorbed { survivor } else { rec.source };
                let new_target = if rec.target == absorbed { survivor } else { rec.target };
                (new_source, new_target)
            };
            storage.edges[index] = EdgeRecord {
                alive: true,
                source: new_source,
                target: new_target,
            };
            storage
                .undirected_index
                .entry(UndirectedEdge::new(new_source, new_target))
                .or_insert_with(Vec::new)
                .push(old_edge);
            {
                let head = storage.nodes[new_source.index().unwrap()].outgoing_head;
                storage.nodes[new_source.index().unwrap()].outgoing_head =
                    link_incidence(&mut storage.outgoing_edges, head, old_edge);
            }
            {
                let head = storage.nodes[new_target.index().unwrap()].incoming_head;
                storage.nodes[new_target.index().unwrap()].incoming_head =
                    link_incidence(&mut storage.incoming_edges, head, old_edge);
            }
            log::debug!(
                "edge {} reparented onto {} -> {} (was incident to {})",
                old_edge,
                new_source,
                new_target,
                absorbed
            );
        }

        let new_head = union_merge(&mut storage.node_merge, survivor, absorbed);
        debug_assert_eq!(new_head, survivor);

        storage.tx_changed = true;
        log::debug!("node {} contracted into {}", absorbed, survivor);
    }

    /// Contracts every edge in `edges` within a single transaction,
    /// merging each connected group of their endpoints into one node
    /// rather than contracting edge-by-edge (which would repeatedly
    /// re-walk edges already folded into an earlier group this batch).
    /// Groups endpoints by connectivity through `edges` alone, via
    /// [`filtered_connected_components`] with an edge filter admitting
    /// only the batch. This deliberately bypasses `ComponentTracker`:
    /// a real tracker shares the graph's event bus, so building one just
    /// to compute a one-off grouping would publish bogus component
    /// events to every subscriber watching `events()`.
    ///
    /// Returns the surviving node for each input edge, in input order —
    /// an edge whose endpoints end up in the same group after earlier
    /// edges in the batch already merged them still resolves to that
    /// group's head.
    pub fn contract_edges(&self, edges: &[EdgeHandle]) -> GraphResult<Vec<NodeHandle>> {
        self.transaction(|g| {
            let batch: FnvHashSet<EdgeHandle> = edges.iter().copied().collect();
            let mut original_source: Vec<NodeHandle> = Vec::with_capacity(edges.len());
            let mut endpoints: FnvHashSet<NodeHandle> = FnvHashSet::default();
            for &e in edges {
                let (a, b) = g.edge_endpoints(e)?;
                original_source.push(a);
                endpoints.insert(a);
                endpoints.insert(b);
            }

            let edge_filter: FilterSet =
                FilterSet::new().pushed(Arc::new(EdgePredicate(move |e: EdgeHandle| batch.contains(&e))));
            let live_nodes: FnvHashSet<NodeHandle> = g.all_nodes().into_iter().collect();
            let groups = filtered_connected_components(g, &edge_filter, &live_nodes);

            let mut survivor_of: FnvHashMap<NodeHandle, NodeHandle> = FnvHashMap::default();
            g.mutate(|storage| {
                for group in groups {
                    let mut members: Vec<NodeHandle> = group.into_iter().filter(|n| endpoints.contains(n)).collect();
                    if members.len() < 2 {
                        continue;
                    }
                    members.sort();
                    let survivor = members[0];
                    for &absorbed in &members[1..] {
                        Self::absorb_node_locked(storage, survivor, absorbed);
                    }
                    for &member in &members {
                        survivor_of.insert(member, survivor);
                    }
                }
                for &e in edges {
                    Self::remove_edge_locked(storage, &g.events, e)?;
                }
                Ok::<_, GraphError>(())
            })?;

            Ok(original_source
                .into_iter()
                .map(|a| *survivor_of.get(&a).unwrap_or(&a))
                .collect())
        })
    }

    // -- queries ------------------------------------------------------------

    pub fn node_count(&self) -> usize {
        let (guard, _) = self.controller.enter();
        let n = guard.borrow().node_count;
        self.controller.exit(&guard);
        n
    }

    pub fn edge_count(&self) -> usize {
        let (guard, _) = self.controller.enter();
        let n = guard.borrow().edge_count;
        self.controller.exit(&guard);
        n
    }

    pub fn contains_node(&self, node: NodeHandle) -> bool {
        let (guard, _) = self.controller.enter();
        let present = guard.borrow().node_record(node).is_ok();
        self.controller.exit(&guard);
        present
    }

    pub fn contains_edge(&self, edge: EdgeHandle) -> bool {
        let (guard, _) = self.controller.enter();
        let present = guard.borrow().edge_record(edge).is_ok();
        self.controller.exit(&guard);
        present
    }

    /// `(source, target)`.
    pub fn edge_endpoints(&self, edge: EdgeHandle) -> GraphResult<(NodeHandle, NodeHandle)> {
        let (guard, _) = self.controller.enter();
        let result = guard.borrow().edge_record(edge).map(|r| (r.source, r.target));
        self.controller.exit(&guard);
        result
    }

    /// Every node reachable from `node` via one incident edge,
    /// regardless of direction. A self-loop contributes `node` itself
    /// once for each of its two incidence-list entries.
    pub fn neighbors(&self, node: NodeHandle) -> GraphResult<Vec<NodeHandle>> {
        let (guard, _) = self.controller.enter();
        let result = {
            let storage = guard.borrow();
            storage.node_record(node).map(|rec| {
                let targets = chain_members(&storage.outgoing_edges, rec.outgoing_head)
                    .into_iter()
                    .map(|e| storage.edges[e.index().unwrap()].target);
                let sources = chain_members(&storage.incoming_edges, rec.incoming_head)
                    .into_iter()
                    .map(|e| storage.edges[e.index().unwrap()].source);
                targets.chain(sources).collect()
            })
        };
        self.controller.exit(&guard);
        result
    }

    /// All edges with `node` as their source.
    pub fn outgoing_edges_of(&self, node: NodeHandle) -> GraphResult<Vec<EdgeHandle>> {
        let (guard, _) = self.controller.enter();
        let result = {
            let storage = guard.borrow();
            storage.node_record(node).map(|rec| chain_members(&storage.outgoing_edges, rec.outgoing_head))
        };
        self.controller.exit(&guard);
        result
    }

    /// All edges with `node` as their target.
    pub fn incoming_edges_of(&self, node: NodeHandle) -> GraphResult<Vec<EdgeHandle>> {
        let (guard, _) = self.controller.enter();
        let result = {
            let storage = guard.borrow();
            storage.node_record(node).map(|rec| chain_members(&storage.incoming_edges, rec.incoming_head))
        };
        self.controller.exit(&guard);
        result
    }

    /// The union of `node`'s outgoing and incoming edges, each counted
    /// once even for a self-loop.
    pub fn edges_of(&self, node: NodeHandle) -> GraphResult<Vec<EdgeHandle>> {
        let (guard, _) = self.controller.enter();
        let result = {
            let storage = guard.borrow();
            storage.node_record(node).map(|_| storage.incident_edges(node))
        };
        self.controller.exit(&guard);
        result
    }

    /// The source of every edge incoming to `node` — its predecessors.
    pub fn sources_of(&self, node: NodeHandle) -> GraphResult<Vec<NodeHandle>> {
        let (guard, _) = self.controller.enter();
        let result = {
            let storage = guard.borrow();
            storage.node_record(node).map(|rec| {
                chain_members(&storage.incoming_edges, rec.incoming_head)
                    .into_iter()
                    .map(|e| storage.edges[e.index().unwrap()].source)
                    .collect()
            })
        };
        self.controller.exit(&guard);
        result
    }

    /// The target of every edge outgoing from `node` — its successors.
    pub fn targets_of(&self, node: NodeHandle) -> GraphResult<Vec<NodeHandle>> {
        let (guard, _) = self.controller.enter();
        let result = {
            let storage = guard.borrow();
            storage.node_record(node).map(|rec| {
                chain_members(&storage.outgoing_edges, rec.outgoing_head)
                    .into_iter()
                    .map(|e| storage.edges[e.index().unwrap()].target)
                    .collect()
            })
        };
        self.controller.exit(&guard);
        result
    }

    /// Every edge currently connecting `u` and `v`, regardless of
    /// direction. Empty (not an error) if there are none.
    pub fn edges_between(&self, u: NodeHandle, v: NodeHandle) -> Vec<EdgeHandle> {
        let (guard, _) = self.controller.enter();
        let result = guard
            .borrow()
            .undirected_index
            .get(&UndirectedEdge::new(u, v))
            .cloned()
            .unwrap_or_default();
        self.controller.exit(&guard);
        result
    }

    /// The first edge connecting `u` and `v` in insertion order, if any.
    pub fn first_edge_between(&self, u: NodeHandle, v: NodeHandle) -> Option<EdgeHandle> {
        let (guard, _) = self.controller.enter();
        let result = guard
            .borrow()
            .undirected_index
            .get(&UndirectedEdge::new(u, v))
            .and_then(|bucket| bucket.first().copied());
        self.controller.exit(&guard);
        result
    }

    pub fn edge_exists_between(&self, u: NodeHandle, v: NodeHandle) -> bool {
        let (guard, _) = self.controller.enter();
        let result = guard.borrow().undirected_index.contains_key(&UndirectedEdge::new(u, v));
        self.controller.exit(&guard);
        result
    }

    /// Whether `node` is the live representative of its contraction
    /// merge group (or not part of one at all) — i.e. whether it would
    /// be visible under the graph's default filter.
    pub fn is_node_visible(&self, node: NodeHandle) -> bool {
        let (guard, _) = self.controller.enter();
        let visible = guard.borrow().node_merge.classify(node) != Position::Tail;
        self.controller.exit(&guard);
        visible
    }

    /// All currently-live node handles, in handle order, filtered
    /// through `self`'s default filter (hides contraction `Tail`s) ANDed
    /// with `extra`.
    pub fn nodes_matching(&self, extra: &FilterSet) -> Vec<NodeHandle> {
        let (guard, _) = self.controller.enter();
        let result = {
            let storage = guard.borrow();
            (0..storage.nodes.len())
                .filter_map(|i| {
                    if !storage.nodes[i].alive {
                        return None;
                    }
                    let h = NodeHandle::new(i as i64);
                    if storage.node_merge.classify(h) == Position::Tail {
                        return None;
                    }
                    if !self.default_filter.node_passes(h) || !extra.node_passes(h) {
                        return None;
                    }
                    Some(h)
                })
                .collect()
        };
        self.controller.exit(&guard);
        result
    }

    pub fn all_nodes(&self) -> Vec<NodeHandle> {
        self.nodes_matching(&FilterSet::new())
    }

    /// `Not`, `Head`, or `Tail` — `node`'s classification within its
    /// contraction merge group, if any.
    pub fn node_type(&self, node: NodeHandle) -> Position {
        let (guard, _) = self.controller.enter();
        let position = guard.borrow().node_merge.classify(node);
        self.controller.exit(&guard);
        position
    }

    /// 1 for `Not`, the group's cardinality for `Head`, 0 for `Tail`.
    pub fn node_multiplicity(&self, node: NodeHandle) -> usize {
        let (guard, _) = self.controller.enter();
        let result = {
            let storage = guard.borrow();
            match storage.node_merge.classify(node) {
                Position::Not => 1,
                Position::Tail => 0,
                Position::Head => storage.node_merge.iter(node).count(),
            }
        };
        self.controller.exit(&guard);
        result
    }

    pub fn edge_type(&self, edge: EdgeHandle) -> Position {
        let (guard, _) = self.controller.enter();
        let position = guard.borrow().edge_merge.classify(edge);
        self.controller.exit(&guard);
        position
    }

    pub fn edge_multiplicity(&self, edge: EdgeHandle) -> usize {
        let (guard, _) = self.controller.enter();
        let result = {
            let storage = guard.borrow();
            match storage.edge_merge.classify(edge) {
                Position::Not => 1,
                Position::Tail => 0,
                Position::Head => storage.edge_merge.iter(edge).count(),
            }
        };
        self.controller.exit(&guard);
        result
    }

    /// Every node ever merged into `head`'s group, in handle order,
    /// including `head` itself — ignores the default visibility filter.
    pub fn merge_group(&self, head: NodeHandle) -> GraphResult<Vec<NodeHandle>> {
        let (guard, _) = self.controller.enter();
        let result = {
            let storage = guard.borrow();
            if storage.node_merge.classify(head) == Position::Head {
                Ok(storage.node_merge.iter(head).collect())
            } else if storage.node_merge.classify(head) == Position::Not {
                Ok(vec![head])
            } else {
                Err(GraphError::NotAMember)
            }
        };
        self.controller.exit(&guard);
        result
    }

    /// Alias for [`MutableGraph::merge_group`], matching the external
    /// interface's `mergedNodesOf` naming.
    pub fn merged_nodes_of(&self, node: NodeHandle) -> GraphResult<Vec<NodeHandle>> {
        self.merge_group(node)
    }

    /// Every edge ever merged into `head`'s group, in handle order,
    /// including `head` itself — the edge analogue of
    /// [`MutableGraph::merge_group`].
    pub fn merged_edges_of(&self, head: EdgeHandle) -> GraphResult<Vec<EdgeHandle>> {
        let (guard, _) = self.controller.enter();
        let result = {
            let storage = guard.borrow();
            match storage.edge_merge.classify(head) {
                Position::Head => Ok(storage.edge_merge.iter(head).collect()),
                Position::Not => Ok(vec![head]),
                Position::Tail => Err(GraphError::NotAMember),
            }
        };
        self.controller.exit(&guard);
        result
    }

    /// Declares `a` and `b` equivalent via the node multi-element
    /// collection, without touching either node's edges — unlike
    /// [`MutableGraph::contract_edge`], which additionally removes an
    /// edge and reparents the absorbed node's incidence. The group's
    /// head is always `a.min(b)`.
    pub fn merge_nodes(&self, a: NodeHandle, b: NodeHandle) -> GraphResult<NodeHandle> {
        self.mutate(|storage| {
            storage.node_record(a)?;
            storage.node_record(b)?;
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            if lo == hi {
                return Ok(lo);
            }
            let new_head = union_merge(&mut storage.node_merge, lo, hi);
            debug_assert_eq!(new_head, lo);
            storage.tx_changed = true;
            log::debug!("nodes {} and {} declared equivalent (head {})", a, b, lo);
            Ok(lo)
        })
    }

    /// Merges every node in `nodes` into one group headed by their
    /// minimum. A no-op for fewer than two nodes.
    pub fn merge_nodes_all(&self, nodes: &[NodeHandle]) -> GraphResult<Option<NodeHandle>> {
        self.transaction(|g| {
            let mut head = None;
            for &n in nodes {
                head = Some(match head {
                    None => n,
                    Some(h) => g.merge_nodes(h, n)?,
                });
            }
            Ok(head)
        })
    }

    /// As [`MutableGraph::merge_nodes`], for edges.
    pub fn merge_edges(&self, a: EdgeHandle, b: EdgeHandle) -> GraphResult<EdgeHandle> {
        self.mutate(|storage| {
            storage.edge_record(a)?;
            storage.edge_record(b)?;
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            if lo == hi {
                return Ok(lo);
            }
            let new_head = union_merge(&mut storage.edge_merge, lo, hi);
            debug_assert_eq!(new_head, lo);
            storage.tx_changed = true;
            log::debug!("edges {} and {} declared equivalent (head {})", a, b, lo);
            Ok(lo)
        })
    }

    /// As [`MutableGraph::merge_nodes_all`], for edges.
    pub fn merge_edges_all(&self, edges: &[EdgeHandle]) -> GraphResult<Option<EdgeHandle>> {
        self.transaction(|g| {
            let mut head = None;
            for &e in edges {
                head = Some(match head {
                    None => e,
                    Some(h) => g.merge_edges(h, e)?,
                });
            }
            Ok(head)
        })
    }

    /// Grows node storage to cover `h`, pushing every newly-created slot
    /// from the current allocation counter up to and including `h` onto
    /// the free list — `h` is left available for an immediate
    /// `add_node()` to pick back up, not allocated by this call itself.
    /// Fails with [`GraphError::DuplicateHandle`] if `h` is already
    /// live.
    pub fn reserve_node_handle(&self, h: NodeHandle) -> GraphResult<()> {
        self.mutate(|storage| {
            let index = h.index().ok_or(GraphError::NullHandle)?;
            if storage.nodes.get(index).map(|r| r.alive).unwrap_or(false) {
                return Err(GraphError::DuplicateHandle(format!("{}", h)));
            }
            if index >= storage.nodes.len() {
                let start = storage.nodes.len() as i64;
                storage.nodes.resize_with(index + 1, NodeRecord::default);
                storage.node_merge.ensure_capacity(storage.nodes.len());
                self.registry.resize_all(storage.nodes.len());
                storage.next_node = storage.next_node.max(index as i64 + 1);
                for raw in start..=index as i64 {
                    storage.node_free.push_back(NodeHandle::new(raw));
                }
                storage.tx_changed = true;
            } else if !storage.node_free.contains(&h) {
                storage.node_free.push_back(h);
                storage.tx_changed = true;
            }
            Ok(())
        })
    }

    /// As [`MutableGraph::reserve_node_handle`], for edges.
    pub fn reserve_edge_handle(&self, h: EdgeHandle) -> GraphResult<()> {
        self.mutate(|storage| {
            let index = h.index().ok_or(GraphError::NullHandle)?;
            if storage.edges.get(index).map(|r| r.alive).unwrap_or(false) {
                return Err(GraphError::DuplicateHandle(format!("{}", h)));
            }
            if index >= storage.edges.len() {
                let start = storage.edges.len() as i64;
                storage.edges.resize_with(index + 1, EdgeRecord::default);
                storage.edge_merge.ensure_capacity(storage.edges.len());
                storage.outgoing_edges.ensure_capacity(storage.edges.len());
                storage.incoming_edges.ensure_capacity(storage.edges.len());
                self.registry.resize_all(storage.edges.len());
                storage.next_edge = storage.next_edge.max(index as i64 + 1);
                for raw in start..=index as i64 {
                    storage.edge_free.push_back(EdgeHandle::new(raw));
                }
                storage.tx_changed = true;
            } else if !storage.edge_free.contains(&h) {
                storage.edge_free.push_back(h);
                storage.tx_changed = true;
            }
            Ok(())
        })
    }

    pub fn snapshot(&self) -> GraphSnapshot {
        GraphSnapshot {
            nodes: self.all_nodes().into_iter().collect(),
            edges: self.all_edges().into_iter().collect(),
        }
    }

    pub fn all_edges(&self) -> Vec<EdgeHandle> {
        let (guard, _) = self.controller.enter();
        let result = {
            let storage = guard.borrow();
            (0..storage.edges.len())
                .filter_map(|i| {
                    if !storage.edges[i].alive {
                        return None;
                    }
                    let h = EdgeHandle::new(i as i64);
                    if storage.edge_merge.classify(h) == Position::Tail {
                        return None;
                    }
                    Some(h)
                })
                .collect()
        };
        self.controller.exit(&guard);
        result
    }

    /// Computes which nodes/edges were added or removed since `baseline`
    /// was captured.
    pub fn diff_since(&self, baseline: &GraphSnapshot) -> GraphDiff {
        let now = self.snapshot();
        GraphDiff {
            added_nodes: now.nodes.difference(&baseline.nodes).copied().collect(),
            removed_nodes: baseline.nodes.difference(&now.nodes).copied().collect(),
            added_edges: now.edges.difference(&baseline.edges).copied().collect(),
            removed_edges: baseline.edges.difference(&now.edges).copied().collect(),
        }
    }

    /// Pre-sizes node/edge storage to match `other`'s current capacity,
    /// ahead of a bulk load expected to reach a similar size. A pure
    /// capacity hint: performs no mutation and fires no events, so it is
    /// safe to call outside a transaction.
    pub fn reserve(&self, other: &MutableGraph) {
        let (their_guard, _) = other.controller.enter();
        let (node_capacity, edge_capacity) = {
            let storage = their_guard.borrow();
            (storage.node_capacity(), storage.edge_capacity())
        };
        other.controller.exit(&their_guard);

        let (guard, _) = self.controller.enter();
        {
            let mut storage = guard.borrow_mut();
            if node_capacity > storage.nodes.len() {
                storage.nodes.resize_with(node_capacity, NodeRecord::default);
                storage.node_merge.ensure_capacity(storage.nodes.len());
            }
            if edge_capacity > storage.edges.len() {
                storage.edges.resize_with(edge_capacity, EdgeRecord::default);
                storage.edge_merge.ensure_capacity(storage.edges.len());
                storage.outgoing_edges.ensure_capacity(storage.edges.len());
                storage.incoming_edges.ensure_capacity(storage.edges.len());
            }
        }
        let (new_node_len, new_edge_len) = {
            let storage = guard.borrow();
            (storage.nodes.len(), storage.edges.len())
        };
        self.controller.exit(&guard);
        self.registry.resize_all(new_node_len);
        self.registry.resize_all(new_edge_len);
    }

    /// Returns a filter that additionally hides any node not satisfying
    /// `predicate`, composed with the graph's own default (hide-tails)
    /// filter and whatever `base` already contains.
    pub fn with_filter<F>(&self, base: &FilterSet, predicate: F) -> FilterSet
    where
        F: Fn(NodeHandle) -> bool + Send + Sync + 'static,
    {
        base.pushed(Arc::new(NodePredicate(predicate)))
    }
}

impl Drop for MutableGraph {
    fn drop(&mut self) {
        self.registry.invalidate_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_and_remove_node() {
        let g = MutableGraph::new();
        let n = g.add_node();
        assert!(g.contains_node(n));
        assert_eq!(g.node_count(), 1);
        g.remove_node(n).unwrap();
        assert!(!g.contains_node(n));
        assert_eq!(g.node_count(), 0);
    }

    #[test]
    fn add_edge_allows_parallel_edges_between_the_same_pair() {
        let g = MutableGraph::new();
        let a = g.add_node();
        let b = g.add_node();
        let e1 = g.add_edge(a, b).unwrap();
        let e2 = g.add_edge(a, b).unwrap();
        let e3 = g.add_edge(b, a).unwrap();
        assert_ne!(e1, e2);
        let mut between = g.edges_between(a, b);
        between.sort();
        let mut expected = vec![e1, e2, e3];
        expected.sort();
        assert_eq!(between, expected);
        assert!(g.edge_exists_between(a, b));
    }

    #[test]
    fn directed_incidence_distinguishes_source_and_target() {
        let g = MutableGraph::new();
        let a = g.add_node();
        let b = g.add_node();
        let e = g.add_edge(a, b).unwrap();
        assert_eq!(g.outgoing_edges_of(a).unwrap(), vec![e]);
        assert_eq!(g.incoming_edges_of(b).unwrap(), vec![e]);
        assert!(g.incoming_edges_of(a).unwrap().is_empty());
        assert!(g.outgoing_edges_of(b).unwrap().is_empty());
        assert_eq!(g.targets_of(a).unwrap(), vec![b]);
        assert_eq!(g.sources_of(b).unwrap(), vec![a]);
        assert_eq!(g.edges_of(a).unwrap(), vec![e]);
    }

    #[test]
    fn self_loop_is_its_own_incoming_and_outgoing_edge() {
        let g = MutableGraph::new();
        let a = g.add_node();
        let e = g.add_edge(a, a).unwrap();
        assert_eq!(g.outgoing_edges_of(a).unwrap(), vec![e]);
        assert_eq!(g.incoming_edges_of(a).unwrap(), vec![e]);
        assert_eq!(g.edges_of(a).unwrap(), vec![e]);
        assert_eq!(g.neighbors(a).unwrap(), vec![a, a]);
    }

    #[test]
    fn merge_nodes_declares_equivalence_without_touching_edges() {
        let g = MutableGraph::new();
        let a = g.add_node();
        let b = g.add_node();
        let e = g.add_edge(a, b).unwrap();
        let head = g.merge_nodes(b, a).unwrap();
        assert_eq!(head, a);
        assert_eq!(g.node_type(b), Position::Tail);
        // the edge is untouched: still live, endpoints unchanged.
        assert!(g.contains_edge(e));
        assert_eq!(g.edge_endpoints(e).unwrap(), (a, b));
    }

    #[test]
    fn reserve_node_handle_grows_storage_and_frees_the_gap() {
        let g = MutableGraph::new();
        let target = NodeHandle::new(3);
        g.reserve_node_handle(target).unwrap();
        let a = g.add_node();
        let b = g.add_node();
        let c = g.add_node();
        assert_eq!((a.raw(), b.raw(), c.raw()), (0, 1, 2));
        let d = g.add_node();
        assert_eq!(d, target);
    }

    #[test]
    fn reserve_node_handle_rejects_an_already_live_handle() {
        let g = MutableGraph::new();
        let a = g.add_node();
        assert_eq!(g.reserve_node_handle(a), Err(GraphError::DuplicateHandle(format!("{}", a))));
    }

    #[test]
    fn removing_node_cascades_to_edges() {
        let g = MutableGraph::new();
        let a = g.add_node();
        let b = g.add_node();
        let e = g.add_edge(a, b).unwrap();
        g.remove_node(a).unwrap();
        assert!(!g.contains_edge(e));
        assert_eq!(g.neighbors(b).unwrap(), Vec::<NodeHandle>::new());
    }

    #[test]
    fn transaction_fires_events_once_for_multiple_ops() {
        let g = MutableGraph::new();
        let events = Arc::new(RwLock::new(Vec::new()));
        let events2 = Arc::clone(&events);
        g.events().subscribe(move |ev| events2.write().push(ev.clone()));

        g.transaction(|g| {
            let a = g.add_node();
            let b = g.add_node();
            g.add_edge(a, b).unwrap();
        });

        let log = events.read();
        let begins = log.iter().filter(|e| **e == GraphEvent::TransactionWillBegin).count();
        let ends = log.iter().filter(|e| **e == GraphEvent::TransactionEnded).count();
        assert_eq!(begins, 1);
        assert_eq!(ends, 1);
        let adds = log
            .iter()
            .filter(|e| matches!(e, GraphEvent::NodeAdded(_) | GraphEvent::EdgeAdded(_)))
            .count();
        assert_eq!(adds, 3);
    }

    #[test]
    fn contract_edge_hides_absorbed_node_but_keeps_it_present() {
        let g = MutableGraph::new();
        let a = g.add_node();
        let b = g.add_node();
        let e = g.add_edge(a, b).unwrap();

        let events = Arc::new(RwLock::new(Vec::new()));
        let events2 = Arc::clone(&events);
        g.events().subscribe(move |ev| events2.write().push(ev.clone()));

        let survivor = g.contract_edge(e).unwrap();
        assert_eq!(survivor, a.min(b));
        let absorbed = if survivor == a { b } else { a };

        // hidden from default iteration and from component-style
        // visibility...
        assert!(!g.is_node_visible(absorbed));
        assert!(!g.all_nodes().contains(&absorbed));
        assert!(g.all_nodes().contains(&survivor));
        // ...but never actually removed: it's a Tail, not gone.
        assert!(g.contains_node(absorbed));
        assert_eq!(g.node_type(absorbed), Position::Tail);

        let log = events.read();
        assert!(!log.iter().any(|ev| matches!(ev, GraphEvent::NodeRemoved(n) if *n == absorbed)));
    }

    #[test]
    fn contract_edge_reparents_into_parallel_edges() {
        let g = MutableGraph::new();
        let a = g.add_node();
        let b = g.add_node();
        let c = g.add_node();
        let ab = g.add_edge(a, b).unwrap();
        g.add_edge(a, c).unwrap();
        g.add_edge(b, c).unwrap();

        let survivor = g.contract_edge(ab).unwrap();
        assert_eq!(survivor, a.min(b));
        // After contracting a-b, both former a-c and b-c edges connect
        // the survivor to c; the graph allows parallel edges, so both
        // remain distinct rather than being folded into one.
        let neighbors = g.neighbors(survivor).unwrap();
        let to_c = neighbors.iter().filter(|&&n| n == c).count();
        assert_eq!(to_c, 2);
        assert_eq!(g.edges_between(survivor, c).len(), 2);
    }

    #[test]
    fn contract_edge_of_a_triangle_produces_a_self_loop() {
        // a-b, a-c, b-c: contracting a-b leaves a direct edge between
        // the survivor and the absorbed node's other self, i.e. the
        // b-c edge (now survivor-c) is distinct from a-c (also
        // survivor-c); contracting *that* one too collapses to a
        // single node with a self-loop from the original a-c/b-c pair
        // that pointed back at the triangle's third corner once it
        // becomes the same node.
        let g = MutableGraph::new();
        let a = g.add_node();
        let b = g.add_node();
        let ab = g.add_edge(a, b).unwrap();
        let ba = g.add_edge(b, a).unwrap();
        let survivor = g.contract_edge(ab).unwrap();
        assert_eq!(survivor, a.min(b));
        assert!(g.contains_edge(ba));
        let (source, target) = g.edge_endpoints(ba).unwrap();
        assert_eq!(source, survivor);
        assert_eq!(target, survivor);
    }

    #[test]
    fn diff_since_reports_additions() {
        let g = MutableGraph::new();
        let baseline = g.snapshot();
        let a = g.add_node();
        let b = g.add_node();
        let e = g.add_edge(a, b).unwrap();
        let diff = g.diff_since(&baseline);
        assert_eq!(diff.added_nodes.len(), 2);
        assert_eq!(diff.added_edges, vec![e]);
        assert!(diff.removed_nodes.is_empty());
    }

    #[test]
    fn component_management_tracks_merges_through_a_transaction() {
        let g = MutableGraph::new();
        g.enable_component_management();
        let a = g.add_node();
        let b = g.add_node();
        assert_eq!(g.num_components(), 2);
        assert_ne!(g.component_of_node(a), g.component_of_node(b));

        g.add_edge(a, b).unwrap();
        assert_eq!(g.num_components(), 1);
        assert_eq!(g.component_of_node(a), g.component_of_node(b));

        let component = g.largest_component().unwrap();
        assert_eq!(component.nodes.len(), 2);
    }

    #[test]
    fn disabling_component_management_stops_tracking() {
        let g = MutableGraph::new();
        g.enable_component_management();
        g.add_node();
        assert_eq!(g.num_components(), 1);
        g.disable_component_management();
        g.add_node();
        assert_eq!(g.num_components(), 0);
        assert!(!g.component_management_enabled());
    }

    #[test]
    fn handle_arrays_track_node_growth() {
        let g = MutableGraph::new();
        let labels = g.new_node_array(String::new());
        let a = g.add_node();
        labels.set(a, "hello".to_string()).unwrap();
        let b = g.add_node();
        assert_eq!(labels.get(b).unwrap(), "");
        assert_eq!(labels.get(a).unwrap(), "hello");
    }
}
