//! Error types for tree operations.

use std::fmt;

use thiserror::Error;

use crate::node::NodeId;
use crate::store::StoreError;
use crate::value::Key;

/// Result type alias using [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by tree operations. None are retried or swallowed
/// internally; recovery belongs to the caller's transaction layer.
#[derive(Debug, Error)]
pub enum Error {
    #[error("tree `{name}` has not been initialized")]
    UninitializedTree { name: String },

    #[error("key {key} already exists in node {node}")]
    DuplicateKey { key: Key, node: NodeId },

    #[error("index {index} is out of range for a tree of {count} items")]
    IndexOutOfRange { index: u64, count: u64 },

    #[error("node {id} is missing from the store")]
    MissingNode { id: NodeId },

    #[error("{kind} at node {node}: {detail}")]
    InvariantViolation { kind: ViolationKind, node: NodeId, detail: String },

    #[error("invalid max node size {0}: must be even and at least 4")]
    InvalidMaxNodeSize(usize),

    #[error("node {node} is corrupt: {detail}")]
    CorruptNode { node: NodeId, detail: String },

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

/// The invariant a [`Error::InvariantViolation`] reports as broken.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum ViolationKind {
    /// More than `max_node_size` items.
    Oversized,
    /// A non-root node with fewer than `max_node_size / 2` items.
    Undersized,
    /// An internal node whose child count is not its item count plus one.
    ChildCountMismatch,
    /// An internal node with no items.
    EmptyInternal,
    /// Items not strictly increasing.
    Unsorted,
    /// A child holding a key outside the range its separators allow.
    KeyRange,
    /// Children of one node at different heights.
    HeightMismatch,
    /// A stored count that differs from the recomputed one.
    CountMismatch,
    /// A stored sum that differs from the recomputed one.
    SumMismatch,
}

impl fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ViolationKind::Oversized => "node exceeds max size",
            ViolationKind::Undersized => "non-root node below min size",
            ViolationKind::ChildCountMismatch => "child count does not match item count",
            ViolationKind::EmptyInternal => "internal node has no items",
            ViolationKind::Unsorted => "items out of order",
            ViolationKind::KeyRange => "subtree key out of range",
            ViolationKind::HeightMismatch => "subtrees of unequal height",
            ViolationKind::CountMismatch => "count does not match subtrees",
            ViolationKind::SumMismatch => "sum does not match subtrees",
        };
        f.write_str(s)
    }
}
