use tracing::trace;

use super::{child_aggregates, load};
use crate::aggregate::Aggregate;
use crate::error::{Error, Result};
use crate::node::{Item, NodeId, SearchResult};
use crate::store::NodeStore;
use crate::value::Key;

/// Returns the item stored under `key`.
pub(crate) fn get<S: NodeStore + ?Sized>(store: &S, root: NodeId, key: &Key) -> Result<Option<Item>> {
    let mut current = root;

    loop {
        let node = load(store, current)?;
        trace!(node = %current, %key, "get: visiting node");
        match node.search(key) {
            SearchResult::Found(idx) => return Ok(node.items.into_iter().nth(idx)),
            SearchResult::NotFound(_) if node.is_leaf() => return Ok(None),
            SearchResult::NotFound(idx) => current = node.children[idx],
        }
    }
}

/// Returns the number of items strictly less than `key`, or `None` if `key`
/// is not present.
pub(crate) fn rank<S: NodeStore + ?Sized>(store: &S, root: NodeId, key: &Key) -> Result<Option<u64>> {
    let mut current = root;
    let mut rank = 0u64;

    loop {
        let node = load(store, current)?;
        trace!(node = %current, %key, rank, "rank: visiting node");
        match node.search(key) {
            SearchResult::Found(idx) if node.is_leaf() => return Ok(Some(rank + idx as u64)),
            SearchResult::NotFound(_) if node.is_leaf() => return Ok(None),
            SearchResult::Found(idx) => {
                // Everything in children[0..=idx] and items[0..idx] precedes the match.
                let before: Aggregate = child_aggregates(store, &node)?[..=idx].iter().sum();
                return Ok(Some(rank + before.count + idx as u64));
            }
            SearchResult::NotFound(idx) => {
                let before: Aggregate = child_aggregates(store, &node)?[..idx].iter().sum();
                rank += before.count + idx as u64;
                current = node.children[idx];
            }
        }
    }
}

/// Returns the item at 0-based position `index` in key order.
pub(crate) fn at_index<S: NodeStore + ?Sized>(store: &S, root: NodeId, index: u64) -> Result<Item> {
    let mut current = root;
    let mut node = load(store, current)?;
    if index >= node.aggregate.count {
        return Err(Error::IndexOutOfRange {
            index,
            count: node.aggregate.count,
        });
    }
    let mut remaining = index;

    loop {
        trace!(node = %current, remaining, "at_index: visiting node");
        if node.is_leaf() {
            let count = node.items.len();
            return node.items.into_iter().nth(usize::try_from(remaining).unwrap_or(usize::MAX)).ok_or_else(|| {
                Error::CorruptNode {
                    node: current,
                    detail: format!("leaf holds {count} items but index {remaining} was routed to it"),
                }
            });
        }

        let sizes = child_aggregates(store, &node)?;
        let mut next = None;
        for (i, size) in sizes.iter().enumerate() {
            if remaining < size.count {
                next = Some(i);
                break;
            }
            remaining -= size.count;
            if i < node.items.len() {
                if remaining == 0 {
                    return Ok(node.items.swap_remove(i));
                }
                remaining -= 1;
            }
        }

        let Some(i) = next else {
            return Err(Error::CorruptNode {
                node: current,
                detail: format!("index {index} not found among children (node count {})", node.aggregate.count),
            });
        };
        current = node.children[i];
        node = load(store, current)?;
    }
}

/// Returns the count and sum of items with `lower < key < upper`. An absent
/// bound is unbounded on that side.
///
/// Only the nodes on the paths to the two bounds are searched item by item;
/// every subtree strictly between them contributes its stored aggregate.
pub(crate) fn count_between<S: NodeStore + ?Sized>(
    store: &S,
    root: NodeId,
    lower: Option<&Key>,
    upper: Option<&Key>,
) -> Result<Aggregate> {
    let node = load(store, root)?;
    if lower.is_none() && upper.is_none() {
        return Ok(node.aggregate);
    }
    trace!(node = %root, ?lower, ?upper, "count_between: visiting node");

    // items[first..end] are exactly the items of this node inside the range.
    let first = lower.map_or(0, |lower| node.items.partition_point(|item| item.key <= *lower));
    let end = upper.map_or(node.items.len(), |upper| node.items.partition_point(|item| item.key < *upper));
    if first > end {
        return Ok(Aggregate::ZERO);
    }

    let mut total: Aggregate = node.items[first..end].iter().map(Item::aggregate).sum();
    if node.is_leaf() {
        return Ok(total);
    }

    if first == end {
        // Both bounds fall inside the same child.
        return Ok(total + count_between(store, node.children[first], lower, upper)?);
    }

    total += count_between(store, node.children[first], lower, None)?;
    for &child in &node.children[first + 1..end] {
        total += load(store, child)?.aggregate;
    }
    total += count_between(store, node.children[end], None, upper)?;
    Ok(total)
}
