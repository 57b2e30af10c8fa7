use tracing::{debug, info};

use crate::aggregate::Aggregate;
use crate::config::TreeConfig;
use crate::error::{Error, Result};
use crate::node::{Item, Node, NodeId};
use crate::raw::{self, Layout};
use crate::store::{NodeStore, TreeDescriptor};
use crate::value::{Key, Value};

/// Name a tree gets when none is given.
pub const DEFAULT_TREE_NAME: &str = "btree";

/// An order-statistic B-tree whose nodes live in a [`NodeStore`].
///
/// Every node caches the count and summand total of its subtree, so besides
/// point lookups the tree answers "what is the k-th key", "how many keys come
/// before this one" and "how many keys, summing to what, lie strictly between
/// these two" while touching only O(log n) nodes.
///
/// The tree itself holds nothing but the store and its own name. Each call
/// starts by reading the tree's descriptor, so several `BTree` values (or
/// several processes sharing one store) see each other's changes. The tree
/// does no locking; a host running calls concurrently must make each call's
/// store accesses atomic.
///
/// # Examples
///
/// ```
/// use agg_btree::{BTree, Key, MemoryStore, TreeConfig};
///
/// let mut scores = BTree::new(MemoryStore::new());
/// scores.init(TreeConfig::new(4))?;
/// for (name, score) in [("alice", 100.0), ("bob", 85.0), ("carol", 92.0)] {
///     scores.insert_with_summand(name, score, score)?;
/// }
///
/// assert_eq!(scores.count()?, 3);
/// assert_eq!(scores.sum()?, 277.0);
/// assert_eq!(scores.at_index(1)?.key, Key::from("bob"));
/// assert_eq!(scores.rank(&Key::from("carol"))?, Some(2));
///
/// let between = scores.count_between(Some(&Key::from("alice")), None)?;
/// assert_eq!((between.count, between.sum), (2, 177.0));
/// # Ok::<(), agg_btree::Error>(())
/// ```
#[derive(Debug)]
pub struct BTree<S> {
    store: S,
    name: String,
}

impl<S: NodeStore> BTree<S> {
    /// Addresses the tree called `"btree"` in `store`.
    ///
    /// The tree must be [`init`](Self::init)ialized before any other call,
    /// unless `store` already holds it.
    #[must_use]
    pub fn new(store: S) -> Self {
        Self::named(store, DEFAULT_TREE_NAME)
    }

    /// Addresses the tree called `name` in `store`. Trees with different
    /// names share the store but nothing else.
    ///
    /// # Examples
    ///
    /// ```
    /// use agg_btree::{BTree, MemoryStore, TreeConfig};
    ///
    /// let mut store = MemoryStore::new();
    /// let mut scores = BTree::named(&mut store, "scores");
    /// scores.init(TreeConfig::default())?;
    /// scores.insert(1.0, "x")?;
    ///
    /// let mut ages = BTree::named(&mut store, "ages");
    /// ages.init(TreeConfig::default())?;
    /// assert_eq!(ages.count()?, 0);
    /// # Ok::<(), agg_btree::Error>(())
    /// ```
    #[must_use]
    pub fn named(store: S, name: impl Into<String>) -> Self {
        Self {
            store,
            name: name.into(),
        }
    }

    /// The name this tree's descriptor is stored under.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Borrows the underlying store.
    #[must_use]
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Gives direct access to the underlying store. Writing tree nodes
    /// through it can break the tree; [`validate`](Self::validate) will say so.
    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    /// Gives the store back, leaving the tree in it.
    #[must_use]
    pub fn into_store(self) -> S {
        self.store
    }

    fn descriptor(&self) -> Result<TreeDescriptor> {
        self.store.get_descriptor(&self.name)?.ok_or_else(|| Error::UninitializedTree {
            name: self.name.clone(),
        })
    }

    /// Points the descriptor at `root` if a mutation moved it.
    fn update_root(&mut self, descriptor: TreeDescriptor, root: NodeId) -> Result<()> {
        if root != descriptor.root {
            debug!(tree = %self.name, old_root = %descriptor.root, new_root = %root, "root moved");
            self.store.put_descriptor(&self.name, TreeDescriptor { root, ..descriptor })?;
        }
        Ok(())
    }

    /// Returns true if the store holds a descriptor for this tree.
    ///
    /// # Errors
    ///
    /// Fails only if the store does.
    pub fn is_initialized(&self) -> Result<bool> {
        Ok(self.store.get_descriptor(&self.name)?.is_some())
    }

    /// Creates an empty tree, replacing any tree of the same name.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidMaxNodeSize`] if `config.max_node_size` is odd or
    /// below 4. Nothing is written in that case.
    pub fn init(&mut self, config: TreeConfig) -> Result<()> {
        config.validate()?;
        if self.is_initialized()? {
            self.clear()?;
        }
        let root = self.store.create_node(Node::new_leaf())?;
        info!(tree = %self.name, max_node_size = config.max_node_size, %root, "initialized tree");
        self.store.put_descriptor(&self.name, TreeDescriptor { root, config })?;
        Ok(())
    }

    /// Deletes every node of the tree and then its descriptor. Clearing a
    /// tree that was never initialized does nothing.
    ///
    /// # Errors
    ///
    /// [`Error::MissingNode`] if a reachable node is gone, or whatever the
    /// store reports. Nodes deleted before the failure stay deleted.
    ///
    /// # Complexity
    ///
    /// O(n) store accesses.
    pub fn clear(&mut self) -> Result<()> {
        let Some(descriptor) = self.store.get_descriptor(&self.name)? else {
            return Ok(());
        };

        let mut pending = vec![descriptor.root];
        let mut deleted = 0usize;
        while let Some(id) = pending.pop() {
            let node = raw::load(&self.store, id)?;
            pending.extend(node.children.iter().copied());
            self.store.delete_node(id)?;
            deleted += 1;
        }
        self.store.delete_descriptor(&self.name)?;
        info!(tree = %self.name, nodes = deleted, "cleared tree");
        Ok(())
    }

    /// Returns the configuration the tree was initialized with.
    ///
    /// # Errors
    ///
    /// [`Error::UninitializedTree`] before [`init`](Self::init), or
    /// [`Error::Store`] if the descriptor cannot be read.
    pub fn config(&self) -> Result<TreeConfig> {
        Ok(self.descriptor()?.config)
    }

    /// Returns the ID of the current root node.
    ///
    /// # Errors
    ///
    /// [`Error::UninitializedTree`] before [`init`](Self::init), or
    /// [`Error::Store`] if the descriptor cannot be read.
    pub fn root(&self) -> Result<NodeId> {
        Ok(self.descriptor()?.root)
    }

    /// Inserts `key` with a summand of zero.
    ///
    /// # Errors
    ///
    /// [`Error::DuplicateKey`] if `key` is already present; the tree is left
    /// untouched.
    ///
    /// # Complexity
    ///
    /// O(log n)
    pub fn insert(&mut self, key: impl Into<Key>, value: impl Into<Value>) -> Result<()> {
        self.insert_with_summand(key, value, 0.0)
    }

    /// Inserts `key`, adding `summand` to the sum of every subtree it joins.
    ///
    /// # Examples
    ///
    /// ```
    /// use agg_btree::{BTree, Error, MemoryStore, TreeConfig};
    ///
    /// let mut tree = BTree::new(MemoryStore::new());
    /// tree.init(TreeConfig::new(4))?;
    /// tree.insert_with_summand(3.0, "c", 30.0)?;
    /// tree.insert_with_summand(1.0, "a", 10.0)?;
    /// assert_eq!(tree.sum()?, 40.0);
    ///
    /// let err = tree.insert_with_summand(3.0, "again", 1.0).unwrap_err();
    /// assert!(matches!(err, Error::DuplicateKey { .. }));
    /// assert_eq!(tree.sum()?, 40.0);
    /// # Ok::<(), agg_btree::Error>(())
    /// ```
    ///
    /// # Errors
    ///
    /// [`Error::DuplicateKey`] if `key` is already present.
    ///
    /// # Complexity
    ///
    /// O(log n)
    pub fn insert_with_summand(&mut self, key: impl Into<Key>, value: impl Into<Value>, summand: f64) -> Result<()> {
        let descriptor = self.descriptor()?;
        let layout = Layout::new(&descriptor.config);
        let root = raw::insert(&mut self.store, layout, descriptor.root, key.into(), value.into(), summand)?;
        self.update_root(descriptor, root)
    }

    /// Removes `key`, returning the removed item. Deleting a key that is not
    /// present is not an error: it returns `None` and writes nothing, so
    /// replayed deletes are harmless.
    ///
    /// # Examples
    ///
    /// ```
    /// use agg_btree::{BTree, Key, MemoryStore, TreeConfig};
    ///
    /// let mut tree = BTree::new(MemoryStore::new());
    /// tree.init(TreeConfig::new(4))?;
    /// tree.insert_with_summand(1.0, "a", 5.0)?;
    ///
    /// let removed = tree.delete(&Key::from(1.0))?.unwrap();
    /// assert_eq!(removed.summand, 5.0);
    /// assert_eq!(tree.delete(&Key::from(1.0))?, None);
    /// assert_eq!(tree.count()?, 0);
    /// # Ok::<(), agg_btree::Error>(())
    /// ```
    ///
    /// # Errors
    ///
    /// [`Error::UninitializedTree`] before [`init`](Self::init). A missing
    /// node or store failure aborts the delete part way; recovery belongs to
    /// the store's transaction.
    ///
    /// # Complexity
    ///
    /// O(log n)
    pub fn delete(&mut self, key: &Key) -> Result<Option<Item>> {
        let descriptor = self.descriptor()?;
        let layout = Layout::new(&descriptor.config);
        let (root, removed) = raw::delete(&mut self.store, layout, descriptor.root, key)?;
        self.update_root(descriptor, root)?;
        Ok(removed)
    }

    /// Returns the item stored under `key`.
    ///
    /// # Errors
    ///
    /// [`Error::UninitializedTree`] before [`init`](Self::init), or a store
    /// error such as [`Error::MissingNode`].
    ///
    /// # Complexity
    ///
    /// O(log n)
    pub fn get(&self, key: &Key) -> Result<Option<Item>> {
        raw::get(&self.store, self.descriptor()?.root, key)
    }

    /// Returns the item at 0-based position `index` in key order.
    ///
    /// # Errors
    ///
    /// [`Error::IndexOutOfRange`] unless `index < count()`.
    ///
    /// # Complexity
    ///
    /// O(log n)
    pub fn at_index(&self, index: u64) -> Result<Item> {
        raw::at_index(&self.store, self.descriptor()?.root, index)
    }

    /// Returns the number of keys strictly less than `key`, or `None` if
    /// `key` is not present.
    ///
    /// # Errors
    ///
    /// [`Error::UninitializedTree`] before [`init`](Self::init), or a store
    /// error such as [`Error::MissingNode`].
    ///
    /// # Complexity
    ///
    /// O(log n)
    pub fn rank(&self, key: &Key) -> Result<Option<u64>> {
        raw::rank(&self.store, self.descriptor()?.root, key)
    }

    /// Returns the number of items, read from the root.
    ///
    /// # Errors
    ///
    /// [`Error::UninitializedTree`] before [`init`](Self::init), or a store
    /// error such as [`Error::MissingNode`].
    ///
    /// # Complexity
    ///
    /// O(1)
    pub fn count(&self) -> Result<u64> {
        Ok(self.aggregate()?.count)
    }

    /// Returns the total of all summands, read from the root.
    ///
    /// # Errors
    ///
    /// [`Error::UninitializedTree`] before [`init`](Self::init), or a store
    /// error such as [`Error::MissingNode`].
    ///
    /// # Complexity
    ///
    /// O(1)
    pub fn sum(&self) -> Result<f64> {
        Ok(self.aggregate()?.sum)
    }

    /// Returns the root's aggregate: count and sum together.
    ///
    /// # Errors
    ///
    /// [`Error::UninitializedTree`] before [`init`](Self::init), or a store
    /// error such as [`Error::MissingNode`].
    pub fn aggregate(&self) -> Result<Aggregate> {
        Ok(raw::load(&self.store, self.descriptor()?.root)?.aggregate)
    }

    /// Returns the count and sum of items with `lower < key < upper`. Both
    /// bounds are exclusive; `None` leaves that side open.
    ///
    /// # Examples
    ///
    /// ```
    /// use agg_btree::{BTree, Key, MemoryStore, TreeConfig};
    ///
    /// let mut tree = BTree::new(MemoryStore::new());
    /// tree.init(TreeConfig::new(4))?;
    /// for k in 1..=10 {
    ///     tree.insert_with_summand(f64::from(k), "v", 1.5)?;
    /// }
    ///
    /// let mid = tree.count_between(Some(&Key::from(3.0)), Some(&Key::from(7.0)))?;
    /// assert_eq!((mid.count, mid.sum), (3, 4.5));
    /// assert_eq!(tree.count_between(None, None)?.count, tree.count()?);
    /// # Ok::<(), agg_btree::Error>(())
    /// ```
    ///
    /// # Errors
    ///
    /// [`Error::UninitializedTree`] before [`init`](Self::init), or a store
    /// error such as [`Error::MissingNode`].
    ///
    /// # Complexity
    ///
    /// O(log n) store accesses, independent of how many items match.
    pub fn count_between(&self, lower: Option<&Key>, upper: Option<&Key>) -> Result<Aggregate> {
        raw::count_between(&self.store, self.descriptor()?.root, lower, upper)
    }

    /// Walks the whole tree checking every structural and aggregate
    /// invariant.
    ///
    /// # Errors
    ///
    /// [`Error::InvariantViolation`] naming the first broken invariant and the
    /// node it was found at.
    ///
    /// # Complexity
    ///
    /// O(n)
    pub fn validate(&self) -> Result<()> {
        let descriptor = self.descriptor()?;
        raw::validate(&self.store, Layout::new(&descriptor.config), descriptor.root)
    }
}
