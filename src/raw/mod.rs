mod delete;
mod insert;
mod lookup;
mod validate;

use smallvec::SmallVec;

use crate::aggregate::Aggregate;
use crate::config::TreeConfig;
use crate::error::{Error, Result};
use crate::node::{INLINE_ITEMS, Node, NodeId};
use crate::store::NodeStore;

pub(crate) use delete::delete;
pub(crate) use insert::insert;
pub(crate) use lookup::{at_index, count_between, get, rank};
pub(crate) use validate::validate;

pub(crate) type AggregateVec = SmallVec<[Aggregate; INLINE_ITEMS + 1]>;

/// Node size bounds, read from a tree's configuration at the start of each
/// mutation.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Layout {
    pub(crate) max: usize,
    pub(crate) min: usize,
}

impl Layout {
    pub(crate) fn new(config: &TreeConfig) -> Self {
        Self {
            max: config.max_node_size,
            min: config.min_node_size(),
        }
    }
}

/// Fetches a node that must exist.
pub(crate) fn load<S: NodeStore + ?Sized>(store: &S, id: NodeId) -> Result<Node> {
    store.get_node(id)?.ok_or(Error::MissingNode { id })
}

/// Fetches the stored aggregate of every child of `node`, in order.
pub(crate) fn child_aggregates<S: NodeStore + ?Sized>(store: &S, node: &Node) -> Result<AggregateVec> {
    node.children.iter().map(|&child| Ok(load(store, child)?.aggregate)).collect()
}

/// Recomputes a node's aggregate from its items and its children's stored
/// aggregates.
pub(crate) fn recompute_aggregate<S: NodeStore + ?Sized>(store: &S, node: &Node) -> Result<Aggregate> {
    let children: Aggregate = child_aggregates(store, node)?.iter().sum();
    Ok(node.items_aggregate() + children)
}
