use std::cell::Cell;
use std::collections::HashMap;

use super::{NodeStore, StoreError, TreeDescriptor};
use crate::node::{Node, NodeId, NodePatch};

/// Counts of node documents read and written, for checking access bounds.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct AccessStats {
    pub reads: u64,
    pub writes: u64,
}

/// An in-process [`NodeStore`].
///
/// Nodes live in a slot vector; deleted slots go on a free list and their IDs
/// are handed out again by later creates. Descriptors are keyed by tree name.
///
/// # Examples
///
/// ```
/// use agg_btree::{BTree, MemoryStore, TreeConfig};
///
/// let mut tree = BTree::new(MemoryStore::new());
/// tree.init(TreeConfig::new(4))?;
/// tree.insert(1.0, "a")?;
/// assert_eq!(tree.store().len(), 1);
/// # Ok::<(), agg_btree::Error>(())
/// ```
#[derive(Clone, Debug, Default)]
pub struct MemoryStore {
    slots: Vec<Option<Node>>,
    free: Vec<NodeId>,
    descriptors: HashMap<String, TreeDescriptor>,
    reads: Cell<u64>,
    writes: u64,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: Vec::with_capacity(capacity),
            ..Self::default()
        }
    }

    /// Returns the number of live nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len().saturating_sub(self.free.len())
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the node and descriptor accesses made so far.
    #[must_use]
    pub fn stats(&self) -> AccessStats {
        AccessStats {
            reads: self.reads.get(),
            writes: self.writes,
        }
    }

    pub fn reset_stats(&mut self) {
        self.reads.set(0);
        self.writes = 0;
    }

    fn slot_mut(&mut self, id: NodeId) -> Result<&mut Node, StoreError> {
        self.slots
            .get_mut(id.to_index())
            .and_then(Option::as_mut)
            .ok_or_else(|| format!("node {id} does not exist").into())
    }
}

impl NodeStore for MemoryStore {
    fn get_node(&self, id: NodeId) -> Result<Option<Node>, StoreError> {
        self.reads.set(self.reads.get() + 1);
        Ok(self.slots.get(id.to_index()).cloned().flatten())
    }

    fn create_node(&mut self, node: Node) -> Result<NodeId, StoreError> {
        self.writes += 1;
        if let Some(id) = self.free.pop() {
            // Reuse a free slot/ID.
            self.slots[id.to_index()] = Some(node);
            Ok(id)
        } else {
            if self.slots.len() > NodeId::MAX {
                return Err(format!("store is at maximum capacity ({})", NodeId::MAX).into());
            }
            self.slots.push(Some(node));
            Ok(NodeId::from_index(self.slots.len() - 1))
        }
    }

    fn overwrite_node(&mut self, id: NodeId, patch: NodePatch) -> Result<(), StoreError> {
        self.writes += 1;
        self.slot_mut(id)?.apply(patch);
        Ok(())
    }

    fn delete_node(&mut self, id: NodeId) -> Result<(), StoreError> {
        self.writes += 1;
        let slot = self.slots.get_mut(id.to_index()).ok_or_else(|| format!("node {id} does not exist"))?;
        if slot.take().is_none() {
            return Err(format!("node {id} was already deleted").into());
        }
        self.free.push(id);
        Ok(())
    }

    fn get_descriptor(&self, name: &str) -> Result<Option<TreeDescriptor>, StoreError> {
        self.reads.set(self.reads.get() + 1);
        Ok(self.descriptors.get(name).cloned())
    }

    fn put_descriptor(&mut self, name: &str, descriptor: TreeDescriptor) -> Result<(), StoreError> {
        self.writes += 1;
        self.descriptors.insert(name.to_owned(), descriptor);
        Ok(())
    }

    fn delete_descriptor(&mut self, name: &str) -> Result<(), StoreError> {
        self.writes += 1;
        self.descriptors.remove(name);
        Ok(())
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::aggregate::Aggregate;
    use proptest::prelude::*;

    fn node(count: u64) -> Node {
        Node {
            aggregate: Aggregate::new(count, 0.0),
            ..Node::default()
        }
    }

    #[test]
    fn store_capacity() {
        let store = MemoryStore::with_capacity(10);
        assert!(store.slots.capacity() >= 10);
        assert!(store.is_empty());
    }

    #[test]
    fn unknown_ids_are_errors() {
        let mut store = MemoryStore::new();
        let id = store.create_node(node(1)).unwrap();
        store.delete_node(id).unwrap();

        assert_eq!(store.get_node(id).unwrap(), None);
        assert!(store.delete_node(id).is_err());
        assert!(store.overwrite_node(id, NodePatch::new()).is_err());
        assert!(store.delete_node(NodeId::from_index(99)).is_err());
    }

    #[test]
    fn stats_count_accesses() {
        let mut store = MemoryStore::new();
        let id = store.create_node(node(1)).unwrap();
        let _ = store.get_node(id).unwrap();
        let _ = store.get_descriptor("btree").unwrap();
        assert_eq!(store.stats(), AccessStats { reads: 2, writes: 1 });

        store.reset_stats();
        assert_eq!(store.stats(), AccessStats::default());
    }

    proptest! {
        #[test]
        fn store_behaves_like_vec(operations in prop::collection::vec(strategy(), 0..256)) {
            let mut model: Vec<(NodeId, u64)> = Vec::new();
            let mut store = MemoryStore::new();

            for operation in operations {
                match operation {
                    Operation::Create(count) => {
                        let id = store.create_node(node(count)).unwrap();
                        model.push((id, count));
                    }
                    Operation::Get(which) => {
                        if model.is_empty() {
                            continue;
                        }

                        let index = which % model.len();
                        let (id, count) = model[index];
                        prop_assert_eq!(store.get_node(id).unwrap(), Some(node(count)));
                    }
                    Operation::Overwrite(which, count) => {
                        if model.is_empty() {
                            continue;
                        }

                        let index = which % model.len();
                        let id = model[index].0;
                        store.overwrite_node(id, NodePatch::new().aggregate(Aggregate::new(count, 0.0))).unwrap();
                        model[index].1 = count;
                    }
                    Operation::Delete(which) => {
                        if model.is_empty() {
                            continue;
                        }

                        let index = which % model.len();
                        let id = model[index].0;
                        store.delete_node(id).unwrap();
                        model.swap_remove(index);
                    }
                }

                prop_assert_eq!(store.len(), model.len());
                prop_assert_eq!(store.is_empty(), model.is_empty());

                for &(id, count) in &model {
                    prop_assert_eq!(store.get_node(id).unwrap(), Some(node(count)));
                }
            }
        }
    }

    #[derive(Clone, Debug)]
    enum Operation {
        Create(u64),
        Get(usize),
        Overwrite(usize, u64),
        Delete(usize),
    }

    fn strategy() -> impl Strategy<Value = Operation> {
        prop_oneof![
            20 => any::<u64>().prop_map(Operation::Create),
            5 => any::<usize>().prop_map(Operation::Get),
            5 => (any::<usize>(), any::<u64>()).prop_map(|(which, count)| Operation::Overwrite(which, count)),
            5 => any::<usize>().prop_map(Operation::Delete),
        ]
    }
}
