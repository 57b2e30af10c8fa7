use smallvec::smallvec;
use tracing::debug;

use super::{Layout, load, recompute_aggregate};
use crate::aggregate::Aggregate;
use crate::error::{Error, Result};
use crate::node::{ChildVec, Item, ItemVec, Node, NodeId, NodePatch, SearchResult};
use crate::store::NodeStore;
use crate::value::{Key, Value};

/// Result of inserting into a subtree.
enum InsertResult {
    /// Insertion completed without split.
    Done,
    /// The subtree's root split; the parent must splice in `separator` and
    /// `right` next to `left`.
    Split {
        separator: Item,
        left: NodeId,
        right: NodeId,
        left_aggregate: Aggregate,
        right_aggregate: Aggregate,
    },
}

/// Inserts an item under `key`, returning the (possibly new) root.
///
/// Fails with [`Error::DuplicateKey`] before writing anything if the key is
/// already present.
pub(crate) fn insert<S: NodeStore + ?Sized>(
    store: &mut S,
    layout: Layout,
    root: NodeId,
    key: Key,
    value: Value,
    summand: f64,
) -> Result<NodeId> {
    let item = Item { key, value, summand };
    match insert_into(store, layout, root, item)? {
        InsertResult::Done => Ok(root),
        InsertResult::Split {
            separator,
            left,
            right,
            left_aggregate,
            right_aggregate,
        } => {
            let aggregate = left_aggregate + right_aggregate + separator.aggregate();
            debug!(separator = %separator.key, %left, %right, "root split, growing tree");
            let new_root = store.create_node(Node {
                items: smallvec![separator],
                children: smallvec![left, right],
                aggregate,
            })?;
            Ok(new_root)
        }
    }
}

fn insert_into<S: NodeStore + ?Sized>(store: &mut S, layout: Layout, id: NodeId, item: Item) -> Result<InsertResult> {
    let mut node = load(store, id)?;
    let idx = match node.search(&item.key) {
        SearchResult::Found(_) => return Err(Error::DuplicateKey { key: item.key, node: id }),
        SearchResult::NotFound(idx) => idx,
    };
    let delta = item.aggregate();

    if node.is_leaf() {
        node.items.insert(idx, item);
    } else if let InsertResult::Split { separator, right, .. } = insert_into(store, layout, node.children[idx], item)? {
        // children[idx] kept its identity as the left half.
        node.items.insert(idx, separator);
        node.children.insert(idx + 1, right);
    }
    node.aggregate += delta;

    if node.items.len() <= layout.max {
        store.overwrite_node(id, NodePatch::replace(node))?;
        return Ok(InsertResult::Done);
    }

    split(store, layout, id, node)
}

/// Splits an overflowing node around its middle item. The left half keeps
/// `id`; the right half becomes a new node.
fn split<S: NodeStore + ?Sized>(store: &mut S, layout: Layout, id: NodeId, mut node: Node) -> Result<InsertResult> {
    debug_assert_eq!(node.items.len(), layout.max + 1, "overflowing node must hold exactly max + 1 items");
    debug_assert_eq!(node.items.len(), 2 * layout.min + 1);

    let mid = layout.min;
    let right_items: ItemVec = node.items.drain(mid + 1..).collect();
    let right_children: ChildVec = if node.is_leaf() {
        ChildVec::new()
    } else {
        node.children.drain(mid + 1..).collect()
    };
    let Some(separator) = node.items.pop() else {
        return Err(Error::CorruptNode {
            node: id,
            detail: "overflowing node has no middle item".into(),
        });
    };
    debug!(node = %id, separator = %separator.key, "splitting node");

    let mut right = Node {
        items: right_items,
        children: right_children,
        aggregate: Aggregate::ZERO,
    };
    let left_aggregate = recompute_aggregate(store, &node)?;
    let right_aggregate = recompute_aggregate(store, &right)?;
    debug_assert_eq!(
        left_aggregate.count + right_aggregate.count + 1,
        node.aggregate.count,
        "split must conserve the item count"
    );
    right.aggregate = right_aggregate;

    store.overwrite_node(
        id,
        NodePatch::new()
            .items(node.items)
            .children(node.children)
            .aggregate(left_aggregate),
    )?;
    let right_id = store.create_node(right)?;

    Ok(InsertResult::Split {
        separator,
        left: id,
        right: right_id,
        left_aggregate,
        right_aggregate,
    })
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::raw::test_support::{Fixture, key_of};
    use proptest::prelude::*;

    #[test]
    fn duplicate_key_writes_nothing() {
        let mut fixture = Fixture::new(4);
        for key in 0..20 {
            fixture.insert(f64::from(key), 1.0);
        }
        let before = fixture.store.stats().writes;
        let err = insert(&mut fixture.store, fixture.layout, fixture.root, key_of(7.0), Value::Null, 3.0).unwrap_err();
        assert!(matches!(err, Error::DuplicateKey { ref key, .. } if *key == key_of(7.0)));
        assert_eq!(fixture.store.stats().writes, before);
        fixture.validate();
    }

    #[test]
    fn root_split_pushes_middle_item_up() {
        let mut fixture = Fixture::new(4);
        let first_root = fixture.root;
        for key in [1.0, 4.0, 3.0, 2.0] {
            fixture.insert(key, key);
        }
        assert_eq!(fixture.root, first_root);

        fixture.insert(5.0, 5.0);
        assert_ne!(fixture.root, first_root);
        let root = load(&fixture.store, fixture.root).unwrap();
        assert_eq!(root.items.iter().map(|i| i.key.clone()).collect::<Vec<_>>(), vec![key_of(3.0)]);
        assert_eq!(root.children[0], first_root);
        assert_eq!(root.aggregate, Aggregate::new(5, 15.0));

        let left = load(&fixture.store, root.children[0]).unwrap();
        let right = load(&fixture.store, root.children[1]).unwrap();
        assert_eq!(left.aggregate, Aggregate::new(2, 3.0));
        assert_eq!(right.aggregate, Aggregate::new(2, 9.0));
        fixture.validate();
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(50))]

        #[test]
        fn tree_invariants_maintained_after_inserts(keys in prop::collection::vec(-1000i32..1000, 0..400), max_half in 2usize..6) {
            let mut fixture = Fixture::new(max_half * 2);
            let mut seen = std::collections::BTreeSet::new();
            for key in keys {
                let result = insert(
                    &mut fixture.store,
                    fixture.layout,
                    fixture.root,
                    key_of(f64::from(key)),
                    Value::Null,
                    f64::from(key),
                );
                if seen.insert(key) {
                    fixture.root = result.unwrap();
                } else {
                    let is_duplicate = matches!(result, Err(Error::DuplicateKey { .. }));
                    prop_assert!(is_duplicate);
                }
                fixture.validate();
            }
            let root = load(&fixture.store, fixture.root).unwrap();
            prop_assert_eq!(root.aggregate.count, seen.len() as u64);
        }
    }
}
