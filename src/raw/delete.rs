use tracing::debug;

use super::{Layout, load};
use crate::aggregate::Aggregate;
use crate::error::{Error, Result};
use crate::node::{Item, Node, NodeId, NodePatch, SearchResult};
use crate::store::NodeStore;
use crate::value::Key;

/// Removes the item stored under `key`, returning the (possibly new) root and
/// the removed item. Deleting an absent key changes nothing.
pub(crate) fn delete<S: NodeStore + ?Sized>(
    store: &mut S,
    layout: Layout,
    root: NodeId,
    key: &Key,
) -> Result<(NodeId, Option<Item>)> {
    let Some(removed) = delete_from(store, layout, root, key)? else {
        debug!(%key, "delete of absent key is a no-op");
        return Ok((root, None));
    };

    let node = load(store, root)?;
    if node.items.is_empty() && node.children.len() == 1 {
        let child = node.children[0];
        debug!(old_root = %root, new_root = %child, "collapsing root into its only child");
        store.delete_node(root)?;
        return Ok((child, Some(removed)));
    }
    Ok((root, Some(removed)))
}

/// Deletes `key` from the subtree at `id`, leaving `id` possibly deficient
/// for its parent to repair.
fn delete_from<S: NodeStore + ?Sized>(store: &mut S, layout: Layout, id: NodeId, key: &Key) -> Result<Option<Item>> {
    let mut node = load(store, id)?;

    let (idx, matched, target) = match node.search(key) {
        SearchResult::Found(idx) if node.is_leaf() => {
            let item = node.items.remove(idx);
            node.aggregate -= item.aggregate();
            store.overwrite_node(
                id,
                NodePatch::new()
                    .items(node.items)
                    .aggregate(node.aggregate),
            )?;
            return Ok(Some(item));
        }
        SearchResult::Found(idx) => {
            // Swap in the in-order predecessor, then delete the predecessor
            // from the left subtree instead.
            let left = node.children[idx];
            let left_count = load(store, left)?.aggregate.count;
            let Some(last) = left_count.checked_sub(1) else {
                return Err(Error::CorruptNode {
                    node: left,
                    detail: "left subtree of a matched separator is empty".into(),
                });
            };
            let predecessor = super::at_index(store, left, last)?;
            debug!(%key, predecessor = %predecessor.key, node = %id, "replacing with predecessor");
            let target = predecessor.key.clone();
            let matched = std::mem::replace(&mut node.items[idx], predecessor);
            (idx, Some(matched), target)
        }
        SearchResult::NotFound(_) if node.is_leaf() => return Ok(None),
        SearchResult::NotFound(idx) => (idx, None, key.clone()),
    };

    let Some(deleted) = delete_from(store, layout, node.children[idx], &target)? else {
        if matched.is_some() {
            return Err(Error::CorruptNode {
                node: node.children[idx],
                detail: format!("predecessor {target} vanished during delete"),
            });
        }
        return Ok(None);
    };

    // The subtree lost the matched item, not the predecessor that moved up.
    let removed = matched.unwrap_or(deleted);
    node.aggregate -= removed.aggregate();

    rebalance(store, layout, &mut node, idx)?;
    store.overwrite_node(id, NodePatch::replace(node))?;
    Ok(Some(removed))
}

/// Restores the minimum size of `parent.children[idx]` by rotating an item
/// in from a sibling, or failing that, merging with a sibling. `parent` is
/// updated in memory; the caller writes it back.
fn rebalance<S: NodeStore + ?Sized>(store: &mut S, layout: Layout, parent: &mut Node, idx: usize) -> Result<()> {
    let child_id = parent.children[idx];
    let child = load(store, child_id)?;
    if child.items.len() >= layout.min {
        return Ok(());
    }
    debug!(node = %child_id, items = child.items.len(), "deficient node");

    let left = if idx > 0 {
        let left_id = parent.children[idx - 1];
        let left = load(store, left_id)?;
        if left.items.len() > layout.min {
            return rotate_right(store, parent, idx, (left_id, left), (child_id, child));
        }
        Some((left_id, left))
    } else {
        None
    };

    if idx + 1 < parent.children.len() {
        let right_id = parent.children[idx + 1];
        let right = load(store, right_id)?;
        if right.items.len() > layout.min {
            return rotate_left(store, parent, idx, (child_id, child), (right_id, right));
        }
        if left.is_none() {
            return merge(store, parent, idx, (child_id, child), (right_id, right));
        }
    }

    match left {
        Some(left) => merge(store, parent, idx - 1, left, (child_id, child)),
        None => Err(Error::CorruptNode {
            node: child_id,
            detail: "deficient node has no siblings".into(),
        }),
    }
}

/// Moves the separator `parent.items[idx - 1]` down to the front of the
/// deficient child and the left sibling's last item up in its place.
fn rotate_right<S: NodeStore + ?Sized>(
    store: &mut S,
    parent: &mut Node,
    idx: usize,
    (left_id, mut left): (NodeId, Node),
    (child_id, mut child): (NodeId, Node),
) -> Result<()> {
    debug!(node = %child_id, sibling = %left_id, "rotating right");
    let Some(moved) = left.items.pop() else {
        return Err(Error::CorruptNode {
            node: left_id,
            detail: "lending sibling has no items".into(),
        });
    };
    let grandchild = left.children.pop();
    let grandchild_aggregate = match grandchild {
        Some(grandchild) => load(store, grandchild)?.aggregate,
        None => Aggregate::ZERO,
    };

    left.aggregate -= moved.aggregate() + grandchild_aggregate;
    let separator = std::mem::replace(&mut parent.items[idx - 1], moved);
    child.aggregate += separator.aggregate() + grandchild_aggregate;
    child.items.insert(0, separator);
    if let Some(grandchild) = grandchild {
        child.children.insert(0, grandchild);
    }

    store.overwrite_node(child_id, NodePatch::replace(child))?;
    store.overwrite_node(left_id, NodePatch::replace(left))?;
    Ok(())
}

/// Moves the separator `parent.items[idx]` down to the end of the deficient
/// child and the right sibling's first item up in its place.
fn rotate_left<S: NodeStore + ?Sized>(
    store: &mut S,
    parent: &mut Node,
    idx: usize,
    (child_id, mut child): (NodeId, Node),
    (right_id, mut right): (NodeId, Node),
) -> Result<()> {
    debug!(node = %child_id, sibling = %right_id, "rotating left");
    if right.items.is_empty() {
        return Err(Error::CorruptNode {
            node: right_id,
            detail: "lending sibling has no items".into(),
        });
    }
    let moved = right.items.remove(0);
    let grandchild = (!right.is_leaf()).then(|| right.children.remove(0));
    let grandchild_aggregate = match grandchild {
        Some(grandchild) => load(store, grandchild)?.aggregate,
        None => Aggregate::ZERO,
    };

    right.aggregate -= moved.aggregate() + grandchild_aggregate;
    let separator = std::mem::replace(&mut parent.items[idx], moved);
    child.aggregate += separator.aggregate() + grandchild_aggregate;
    child.items.push(separator);
    if let Some(grandchild) = grandchild {
        child.children.push(grandchild);
    }

    store.overwrite_node(child_id, NodePatch::replace(child))?;
    store.overwrite_node(right_id, NodePatch::replace(right))?;
    Ok(())
}

/// Folds `parent.children[left_idx + 1]` and the separator between the two
/// into `parent.children[left_idx]`, then deletes the absorbed node.
fn merge<S: NodeStore + ?Sized>(
    store: &mut S,
    parent: &mut Node,
    left_idx: usize,
    (left_id, mut left): (NodeId, Node),
    (right_id, right): (NodeId, Node),
) -> Result<()> {
    debug!(node = %left_id, absorbed = %right_id, "merging siblings");
    let separator = parent.items.remove(left_idx);
    parent.children.remove(left_idx + 1);

    left.aggregate += separator.aggregate() + right.aggregate;
    left.items.push(separator);
    left.items.extend(right.items);
    left.children.extend(right.children);

    store.overwrite_node(left_id, NodePatch::replace(left))?;
    store.delete_node(right_id)?;
    Ok(())
}
