//! The boundary between the tree algorithms and the document store that
//! holds their nodes.

use serde::{Deserialize, Serialize};

use crate::config::TreeConfig;
use crate::node::{Node, NodeId, NodePatch};

mod memory;

pub use memory::{AccessStats, MemoryStore};

/// Error type surfaced by a [`NodeStore`] implementation.
pub type StoreError = Box<dyn std::error::Error + Send + Sync>;

/// The per-tree record naming the current root and the tree's configuration.
///
/// `root` is the only pointer-like field that ever changes: it moves when the
/// root splits (the tree grows) or collapses into its only child (the tree
/// shrinks).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TreeDescriptor {
    pub root: NodeId,
    pub config: TreeConfig,
}

/// A document store able to hold tree nodes and tree descriptors.
///
/// Every tree operation is a sequence of these calls. The tree performs no
/// locking or retries of its own; a host that runs operations concurrently
/// must apply each top-level operation's reads and writes atomically and
/// serializably.
pub trait NodeStore {
    /// Fetches a node, or `None` if `id` does not name a live node.
    ///
    /// # Errors
    ///
    /// Fails only on a storage failure.
    fn get_node(&self, id: NodeId) -> Result<Option<Node>, StoreError>;

    /// Stores a new node and returns its ID.
    ///
    /// # Errors
    ///
    /// Fails if the store is full or unavailable.
    fn create_node(&mut self, node: Node) -> Result<NodeId, StoreError>;

    /// Merges the fields present in `patch` into an existing node.
    ///
    /// # Errors
    ///
    /// Fails if `id` does not name a live node.
    fn overwrite_node(&mut self, id: NodeId, patch: NodePatch) -> Result<(), StoreError>;

    /// Removes a node.
    ///
    /// # Errors
    ///
    /// Fails if `id` does not name a live node.
    fn delete_node(&mut self, id: NodeId) -> Result<(), StoreError>;

    /// Looks up the descriptor of the tree called `name`.
    ///
    /// # Errors
    ///
    /// Fails only on a storage failure.
    fn get_descriptor(&self, name: &str) -> Result<Option<TreeDescriptor>, StoreError>;

    /// Creates or replaces the descriptor of the tree called `name`.
    ///
    /// # Errors
    ///
    /// Fails only on a storage failure.
    fn put_descriptor(&mut self, name: &str, descriptor: TreeDescriptor) -> Result<(), StoreError>;

    /// Removes the descriptor of the tree called `name`, if any.
    ///
    /// # Errors
    ///
    /// Fails only on a storage failure.
    fn delete_descriptor(&mut self, name: &str) -> Result<(), StoreError>;
}

impl<S: NodeStore + ?Sized> NodeStore for &mut S {
    fn get_node(&self, id: NodeId) -> Result<Option<Node>, StoreError> {
        (**self).get_node(id)
    }

    fn create_node(&mut self, node: Node) -> Result<NodeId, StoreError> {
        (**self).create_node(node)
    }

    fn overwrite_node(&mut self, id: NodeId, patch: NodePatch) -> Result<(), StoreError> {
        (**self).overwrite_node(id, patch)
    }

    fn delete_node(&mut self, id: NodeId) -> Result<(), StoreError> {
        (**self).delete_node(id)
    }

    fn get_descriptor(&self, name: &str) -> Result<Option<TreeDescriptor>, StoreError> {
        (**self).get_descriptor(name)
    }

    fn put_descriptor(&mut self, name: &str, descriptor: TreeDescriptor) -> Result<(), StoreError> {
        (**self).put_descriptor(name, descriptor)
    }

    fn delete_descriptor(&mut self, name: &str) -> Result<(), StoreError> {
        (**self).delete_descriptor(name)
    }
}
