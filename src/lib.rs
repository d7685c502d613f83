/*!
An in-memory, transactional graph engine: handle-indexed element
storage, a disjoint doubly-linked set collection used both for edge
incidence and multi-element grouping, a reentrant transaction
protocol with ordered change notifications, and an incremental
connected-components tracker that classifies merges and splits across
a batch of mutations.

# Overview

* [`handle`] — the compact, nullable integer identities ([`handle::NodeHandle`],
  [`handle::EdgeHandle`], [`handle::ComponentHandle`]) every other module is keyed by.
* [`error`] — the crate's single [`error::GraphError`] enum and [`error::GraphResult`] alias.
* [`distinct_set`] — [`distinct_set::DistinctSetCollection`], the intrusive
  doubly-linked disjoint-set structure backing multi-element merge groups.
* [`handle_array`] — [`handle_array::HandleArray`]/[`handle_array::LockingHandleArray`],
  dense parallel storage that grows and invalidates in step with the graph.
* [`filter`] — [`filter::FilterSet`]/[`filter::ElementFilter`], the predicate
  stack that hides elements from traversal and component membership.
* [`notify`] — [`notify::EventBus`]/[`notify::GraphEvent`], the ordered
  change-notification fan-out every mutation flows through.
* [`transaction`] — [`transaction::TransactionController`], the reentrant
  writer-lock discipline shared by every mutator.
* [`mutable_graph`] — [`mutable_graph::MutableGraph`], the graph core itself:
  storage, mutation, edge contraction, and (optionally) component management.
* [`component_tracker`] — [`component_tracker::ComponentTracker`], incremental
  connected-components tracking with split/merge classification.
* [`consistency`] — structural invariant checking over a [`mutable_graph::MutableGraph`].
* [`attribute_bridge`] — [`attribute_bridge::AttributeBridge`], the narrow
  registration/subscription surface an external attribute layer needs.
*/

pub mod attribute_bridge;
pub mod component_tracker;
pub mod consistency;
pub mod distinct_set;
pub mod error;
pub mod filter;
pub mod handle;
pub mod handle_array;
pub mod mutable_graph;
pub mod notify;
pub mod transaction;

pub use attribute_bridge::AttributeBridge;
pub use component_tracker::{ComponentTracker, GraphComponent};
pub use error::{GraphError, GraphResult};
pub use handle::{ComponentHandle, EdgeHandle, NodeHandle, UndirectedEdge};
pub use mutable_graph::{GraphDiff, GraphSnapshot, MutableGraph};
pub use notify::GraphEvent;
