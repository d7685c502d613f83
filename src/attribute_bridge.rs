//! Narrow interface consumed by an external attribute/user-data layer.
//!
//! A parallel node- or edge-keyed data store (node labels, edge
//! weights, anything the graph core itself doesn't know about) needs
//! exactly three things from the graph: a place to register storage
//! that grows/shrinks in step with the graph, a way to hear about
//! adds and removals so it can initialise or drop slots, and a
//! deterministic way to enumerate what currently exists. `AttributeBridge`
//! is that narrow view, borrowed rather than owned, so it never competes
//! with the graph for lifetime control.
use std::sync::Arc;

use crate::handle::{EdgeHandle, EdgeKind, NodeHandle, NodeKind};
use crate::handle_array::HandleArray;
use crate::mutable_graph::MutableGraph;
use crate::notify::{EventBus, GraphEvent};

/// A borrowed view of [`MutableGraph`]'s registration/subscription
/// surface, scoped to what an attribute store needs.
pub struct AttributeBridge<'g> {
    graph: &'g MutableGraph,
}

impl<'g> AttributeBridge<'g> {
    pub fn new(graph: &'g MutableGraph) -> Self {
        Self { graph }
    }

    /// Allocates node-keyed parallel storage, pre-sized to the graph's
    /// current capacity and resized automatically as the graph grows.
    /// There is no separate "unregister": dropping the returned array
    /// is enough, since the registry only holds a `Weak` reference to it.
    pub fn register_node_array<V>(&self, default: V) -> HandleArray<NodeKind, V>
    where
        V: Clone + Send + Sync + 'static,
    {
        self.graph.new_node_array(default)
    }

    pub fn register_edge_array<V>(&self, default: V) -> HandleArray<EdgeKind, V>
    where
        V: Clone + Send + Sync + 'static,
    {
        self.graph.new_edge_array(default)
    }

    /// Registers a callback for every [`GraphEvent`], so an attribute
    /// store can react to `NodeAdded`/`NodeRemoved`/`EdgeAdded`/`EdgeRemoved`
    /// (and, if it cares, component changes too) without the graph core
    /// knowing anything about what it stores.
    pub fn subscribe<F>(&self, callback: F)
    where
        F: FnMut(&GraphEvent) + Send + 'static,
    {
        self.graph.events().subscribe(callback);
    }

    pub fn events(&self) -> &Arc<EventBus> {
        self.graph.events()
    }

    /// Every currently-visible node handle, in the same deterministic
    /// order `MutableGraph` itself iterates them in.
    pub fn node_handles(&self) -> Vec<NodeHandle> {
        self.graph.all_nodes()
    }

    pub fn edge_handles(&self) -> Vec<EdgeHandle> {
        self.graph.all_edges()
    }
}
