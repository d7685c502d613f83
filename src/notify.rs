//! Typed publish/subscribe event delivery for graph mutations.
//!
//! All graph-level notifications flow through one [`GraphEvent`] enum and
//! one [`EventBus`], so that the strict emission order documented on
//! [`GraphEvent`] is a property of a single ordered dispatch rather than
//! something callers have to reconstruct from several independent signal
//! lists.

use std::fmt;
use std::sync::Mutex;

use crate::handle::{ComponentHandle, EdgeHandle, NodeHandle};

/// One notification emitted by the graph over the course of a
/// transaction. Listed here in the exact order a single outermost
/// transaction fires them:
///
/// 1. [`TransactionWillBegin`](GraphEvent::TransactionWillBegin)
/// 2. [`GraphWillChange`](GraphEvent::GraphWillChange)
/// 3. [`NodeAdded`](GraphEvent::NodeAdded) / [`NodeRemoved`](GraphEvent::NodeRemoved) /
///    [`EdgeAdded`](GraphEvent::EdgeAdded) / [`EdgeRemoved`](GraphEvent::EdgeRemoved),
///    interleaved in the order the operations were actually performed
/// 4. [`ComponentsWillMerge`](GraphEvent::ComponentsWillMerge)
/// 5. [`ComponentWillBeRemoved`](GraphEvent::ComponentWillBeRemoved)
/// 6. [`ComponentAdded`](GraphEvent::ComponentAdded)
/// 7. [`ComponentSplit`](GraphEvent::ComponentSplit)
/// 8. per-element [`NodeComponentChanged`](GraphEvent::NodeComponentChanged) /
///    [`EdgeComponentChanged`](GraphEvent::EdgeComponentChanged)
/// 9. [`GraphChanged`](GraphEvent::GraphChanged)
/// 10. [`TransactionEnded`](GraphEvent::TransactionEnded)
///
/// Nested (re-entrant) transactions only fire 1/2 on the outermost
/// `begin` and only fire 4-10 on the outermost `end`; per-element events
/// (3) fire immediately as each operation runs, regardless of nesting
/// depth.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GraphEvent {
    TransactionWillBegin,
    GraphWillChange,
    NodeAdded(NodeHandle),
    NodeRemoved(NodeHandle),
    EdgeAdded(EdgeHandle),
    EdgeRemoved(EdgeHandle),
    ComponentsWillMerge(Vec<ComponentHandle>),
    ComponentWillBeRemoved(ComponentHandle),
    ComponentAdded(ComponentHandle),
    ComponentSplit(ComponentHandle, Vec<ComponentHandle>),
    NodeComponentChanged(NodeHandle, ComponentHandle),
    EdgeComponentChanged(EdgeHandle, ComponentHandle),
    /// Fired once at the close of the outermost transaction. `true` if
    /// any mutation occurred anywhere in the (possibly nested) call tree.
    GraphChanged(bool),
    TransactionEnded,
}

impl fmt::Display for GraphEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

type Subscriber = Box<dyn FnMut(&GraphEvent) + Send>;

/// An ordered list of subscribers, invoked synchronously and in
/// subscription order whenever an event is [`publish`](EventBus::publish)ed.
///
/// Dispatch happens on the mutating thread, inside the writer lock held
/// by [`crate::transaction::TransactionController`] — subscribers run
/// to completion before the next mutation can begin. A subscriber that
/// panics unwinds past `publish`; callers constructing long-lived
/// subscribers should avoid panicking in the callback.
pub struct EventBus {
    subscribers: Mutex<Vec<Subscriber>>,
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let count = self.subscribers.lock().unwrap().len();
        f.debug_struct("EventBus").field("subscribers", &count).finish()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            subscribers: Mutex::new(Vec::new()),
        }
    }

    /// Registers a callback invoked for every subsequently published
    /// event. There is no unsubscribe handle; subscribers are expected to
    /// live as long as the bus itself (matching the teacher's and the
    /// source app's "connect once, for the graph's lifetime" idiom).
    pub fn subscribe<F>(&self, callback: F)
    where
        F: FnMut(&GraphEvent) + Send + 'static,
    {
        self.subscribers.lock().unwrap().push(Box::new(callback));
    }

    /// Delivers `event` to every subscriber, in subscription order.
    pub fn publish(&self, event: &GraphEvent) {
        let mut subs = self.subscribers.lock().unwrap();
        for sub in subs.iter_mut() {
            sub(event);
        }
    }

    #[cfg(test)]
    pub(crate) fn subscriber_count(&self) -> usize {
        self.subscribers.lock().unwrap().len()
    }
}
