//! An order-statistic B-tree stored in a document store.
//!
//! [`BTree`] keeps its nodes as independent records in a [`NodeStore`],
//! addressed by opaque [`NodeId`]s rather than in-memory pointers. Every node
//! caches an [`Aggregate`] (item count and summand total) for its subtree,
//! which makes these O(log n) in store accesses:
//!
//! - [`get`](BTree::get), [`insert`](BTree::insert), [`delete`](BTree::delete)
//! - [`at_index`](BTree::at_index) - the item at a given sorted position
//! - [`rank`](BTree::rank) - the sorted position of a key
//! - [`count_between`](BTree::count_between) - count and sum over an open key range
//!
//! [`count`](BTree::count) and [`sum`](BTree::sum) read the root alone.
//!
//! # Example
//!
//! ```
//! use agg_btree::{BTree, Key, MemoryStore, TreeConfig};
//!
//! let mut sales = BTree::new(MemoryStore::new());
//! sales.init(TreeConfig::default())?;
//!
//! // Compound keys keep equal amounts apart.
//! for (id, amount) in [(1i64, 40.0), (2, 15.0), (3, 40.0), (4, 90.0)] {
//!     sales.insert_with_summand((amount, id), id, amount)?;
//! }
//!
//! assert_eq!(sales.count()?, 4);
//! assert_eq!(sales.sum()?, 185.0);
//!
//! // The median-ish sale, and how many sales were cheaper than sale 4.
//! assert_eq!(sales.at_index(2)?.value, Key::from(3i64));
//! assert_eq!(sales.rank(&Key::from((90.0, 4i64)))?, Some(3));
//! sales.validate()?;
//! # Ok::<(), agg_btree::Error>(())
//! ```
//!
//! # Storage
//!
//! Nodes are only ever read, created, patched or deleted through
//! [`NodeStore`], one call per node touched. The tree holds no locks and no
//! cached state; a host that serves calls concurrently must run each tree
//! operation inside one atomic, serializable transaction. [`MemoryStore`] is
//! an in-process store that also counts accesses.

// These forbid rules and lint groups are meant to be very restrictive.
#![forbid(unsafe_code)]
#![forbid(keyword_idents)]
#![forbid(non_ascii_idents)]
#![forbid(unreachable_pub)]
#![warn(clippy::all)]
#![warn(clippy::cargo)]
#![warn(clippy::pedantic)]
// Enable coverage attributes for nightly builds.
#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

mod aggregate;
mod config;
mod error;
mod node;
mod raw;
mod store;
mod tree;
mod value;

pub use aggregate::Aggregate;
pub use config::{DEFAULT_MAX_NODE_SIZE, TreeConfig};
pub use error::{Error, Result, ViolationKind};
pub use node::{ChildVec, INLINE_ITEMS, Item, ItemVec, Node, NodeId, NodePatch};
pub use store::{AccessStats, MemoryStore, NodeStore, StoreError, TreeDescriptor};
pub use tree::{BTree, DEFAULT_TREE_NAME};
pub use value::{Key, Value};
