//! Error taxonomy for graph operations.
//!
//! Two families, per the spec's taxonomy: programmer errors
//! (`BadHandle`, `NullHandle`, `OutOfRange`, `NotInGraph`, `NotAMember`,
//! `Invalidated`) that indicate a caller bug and are never expected in
//! normal operation, and structural rejections (`NoSuchNode`,
//! `NoSuchEdge`, `DuplicateHandle`) that a caller can hit legitimately
//! and is expected to handle. Both live in one enum rather than two
//! types, since `?` propagation doesn't care which family a given
//! call site can produce. `BadHandle`/`NotInGraph` are included for
//! taxonomy parity but are not reachable through the public API today:
//! `node_record`/`edge_record` already turn "null" and "missing" into
//! `NullHandle`/`NoSuchNode`/`NoSuchEdge` before anything downstream
//! would need them.

use thiserror::Error;

use crate::handle::{EdgeHandle, NodeHandle};

/// Errors returned by [`crate::mutable_graph::MutableGraph`] and the
/// other public entry points.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GraphError {
    /// A handle argument does not belong to the handle space it was
    /// used against (e.g. a handle minted by a different graph).
    #[error("handle does not belong to this graph: {0}")]
    BadHandle(String),

    /// A handle argument was the null sentinel where a live element was
    /// required.
    #[error("null handle passed where a live handle was required")]
    NullHandle,

    /// A non-null handle's index fell outside the array currently backing
    /// it (e.g. a stale handle from a since-shrunk graph).
    #[error("handle index {index} out of range (capacity {capacity})")]
    OutOfRange { index: usize, capacity: usize },

    /// A handle is well-formed and in range but the internal invariant
    /// that it name something currently tracked does not hold.
    #[error("handle is not tracked by the graph: {0}")]
    NotInGraph(String),

    /// A handle was well-formed and in range, but does not currently name
    /// a live element (it was never allocated, or was removed).
    #[error("node {0} is not in the graph")]
    NoSuchNode(NodeHandle),

    /// As [`GraphError::NoSuchNode`], for edges.
    #[error("edge {0} is not in the graph")]
    NoSuchEdge(EdgeHandle),

    /// A handle is well-formed but does not belong to the
    /// `DistinctSetCollection` set it was asked to operate on.
    #[error("handle is not a member of the expected set")]
    NotAMember,

    /// A `reserveNodeHandle`/`reserveEdgeHandle` call named a handle
    /// that is already live.
    #[error("handle already in use: {0}")]
    DuplicateHandle(String),

    /// A `HandleArray` was read or written after the graph that owns it
    /// was dropped.
    #[error("handle array used after its owning graph was invalidated")]
    Invalidated,

    /// The `ConsistencyChecker` found a structural violation. Carries a
    /// human-readable description of the offending invariant.
    #[error("consistency check failed: {0}")]
    Inconsistent(String),
}

/// Convenience alias used throughout the crate's public API.
pub type GraphResult<T> = Result<T, GraphError>;
