use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::aggregate::Aggregate;
use crate::value::{Key, Value};

mod id;

pub use id::NodeId;

/// Items held inline before a node's item list spills to the heap.
/// Sized for the default maximum node size plus the transient overflow item.
pub const INLINE_ITEMS: usize = 17;

pub type ItemVec = SmallVec<[Item; INLINE_ITEMS]>;
pub type ChildVec = SmallVec<[NodeId; INLINE_ITEMS + 1]>;

/// One stored key/value pair and its contribution to the running sum.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub key: Key,
    pub value: Value,
    pub summand: f64,
}

impl Item {
    #[must_use]
    pub fn new(key: impl Into<Key>, value: impl Into<Value>, summand: f64) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            summand,
        }
    }

    /// The aggregate this single item contributes: `{count: 1, sum: summand}`.
    #[must_use]
    pub const fn aggregate(&self) -> Aggregate {
        Aggregate::new(1, self.summand)
    }
}

/// A B-tree node as stored in a [`NodeStore`](crate::NodeStore).
///
/// Unlike a B+tree, every node holds items: an internal node with `k` items
/// has exactly `k + 1` children, and every key in `children[i]` lies strictly
/// between `items[i - 1].key` and `items[i].key`. `aggregate` covers the whole
/// subtree, the node's own items included.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub items: ItemVec,
    pub children: ChildVec,
    pub aggregate: Aggregate,
}

/// Result of searching for a key among a node's items.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum SearchResult {
    /// Key was found at the given index.
    Found(usize),
    /// Key was not found; index is the child to descend into, or the
    /// insertion point in a leaf.
    NotFound(usize),
}

impl Node {
    /// Creates a new empty leaf node.
    #[must_use]
    pub fn new_leaf() -> Self {
        Self::default()
    }

    /// Returns true if this node has no children.
    #[must_use]
    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// Sums the aggregates of this node's own items, children excluded.
    #[must_use]
    pub fn items_aggregate(&self) -> Aggregate {
        self.items.iter().map(Item::aggregate).sum()
    }

    /// Searches for a key among this node's items.
    #[inline]
    pub(crate) fn search(&self, key: &Key) -> SearchResult {
        match self.items.binary_search_by(|item| item.key.cmp(key)) {
            Ok(idx) => SearchResult::Found(idx),
            Err(idx) => SearchResult::NotFound(idx),
        }
    }

    /// Merges the fields present in `patch` into this node.
    pub fn apply(&mut self, patch: NodePatch) {
        if let Some(items) = patch.items {
            self.items = items;
        }
        if let Some(children) = patch.children {
            self.children = children;
        }
        if let Some(aggregate) = patch.aggregate {
            self.aggregate = aggregate;
        }
    }
}

/// A partial set of node fields for [`NodeStore::overwrite_node`](crate::NodeStore::overwrite_node).
/// Fields left as `None` keep their stored value.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct NodePatch {
    pub items: Option<ItemVec>,
    pub children: Option<ChildVec>,
    pub aggregate: Option<Aggregate>,
}

impl NodePatch {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn items(mut self, items: ItemVec) -> Self {
        self.items = Some(items);
        self
    }

    #[must_use]
    pub fn children(mut self, children: ChildVec) -> Self {
        self.children = Some(children);
        self
    }

    #[must_use]
    pub fn aggregate(mut self, aggregate: Aggregate) -> Self {
        self.aggregate = Some(aggregate);
        self
    }

    /// A patch replacing every field with those of `node`.
    #[must_use]
    pub fn replace(node: Node) -> Self {
        Self {
            items: Some(node.items),
            children: Some(node.children),
            aggregate: Some(node.aggregate),
        }
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use smallvec::smallvec;

    fn leaf(keys: &[f64]) -> Node {
        let items: ItemVec = keys.iter().map(|&k| Item::new(k, "v", k)).collect();
        let aggregate = items.iter().map(Item::aggregate).sum();
        Node {
            items,
            children: SmallVec::new(),
            aggregate,
        }
    }

    #[test]
    fn search_reports_child_index() {
        let node = leaf(&[1.0, 3.0, 5.0]);
        assert_eq!(node.search(&Key::from(3.0)), SearchResult::Found(1));
        assert_eq!(node.search(&Key::from(0.0)), SearchResult::NotFound(0));
        assert_eq!(node.search(&Key::from(4.0)), SearchResult::NotFound(2));
        assert_eq!(node.search(&Key::from(9.0)), SearchResult::NotFound(3));
    }

    #[test]
    fn items_aggregate_ignores_children() {
        let mut node = leaf(&[1.0, 2.0]);
        node.children = smallvec![NodeId::from_index(0), NodeId::from_index(1), NodeId::from_index(2)];
        node.aggregate = Aggregate::new(10, 10.0);
        assert_eq!(node.items_aggregate(), Aggregate::new(2, 3.0));
        assert!(!node.is_leaf());
    }

    #[test]
    fn apply_keeps_absent_fields() {
        let mut node = leaf(&[1.0]);
        node.apply(NodePatch::new().aggregate(Aggregate::new(7, 0.5)));
        assert_eq!(node.items.len(), 1);
        assert_eq!(node.aggregate, Aggregate::new(7, 0.5));

        node.apply(NodePatch::replace(Node::new_leaf()));
        assert_eq!(node, Node::new_leaf());
    }

    #[test]
    fn node_round_trips_as_document() {
        let node = leaf(&[1.0, 2.0]);
        let json = serde_json::to_string(&node).unwrap();
        let back: Node = serde_json::from_str(&json).unwrap();
        assert_eq!(back, node);
    }
}
