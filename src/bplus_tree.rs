use alloc::string::String;
use core::borrow::Borrow;
use core::fmt;

use crate::error::{InvariantViolation, Result};
use crate::order::Order;
use crate::raw::RawTree;

/// An in-memory ordered index based on a [B+Tree].
///
/// Keys are unique and must implement [`Ord`]; values are opaque. All entries
/// live in the leaves. Internal nodes hold separator keys that route every
/// lookup to exactly one leaf, so [`find`], [`insert`] and [`remove`] visit
/// one node per level.
///
/// Every mutation restores the structural invariants before returning:
/// overflowing nodes split (possibly growing a new root), underflowing nodes
/// borrow from a sibling or merge with it (possibly collapsing the root).
/// [`check_invariants`] verifies them on demand.
///
/// The tree is not synchronized. Wrap it in a lock to share it between
/// threads.
///
/// # Examples
///
/// ```
/// use bplus_tree::BPlusTree;
///
/// let mut index = BPlusTree::new(4)?;
/// index.insert(1, "a");
/// index.insert(2, "b");
/// index.insert(3, "c");
/// index.insert(4, "d");
///
/// // The fourth key split the root leaf in two.
/// assert_eq!(index.height(), 2);
/// assert_eq!(index.find(&3), Some(&"c"));
/// assert_eq!(index.key_count(), 4);
///
/// assert_eq!(index.remove(&3), Some("c"));
/// assert_eq!(index.remove(&3), None);
/// index.check_invariants()?;
/// # Ok::<(), bplus_tree::Error>(())
/// ```
///
/// [B+Tree]: https://en.wikipedia.org/wiki/B%2B_tree
/// [`find`]: BPlusTree::find
/// [`insert`]: BPlusTree::insert
/// [`remove`]: BPlusTree::remove
/// [`check_invariants`]: BPlusTree::check_invariants
pub struct BPlusTree<K, V> {
    raw: RawTree<K, V>,
}

impl<K, V> BPlusTree<K, V> {
    /// Creates an empty tree with branching factor `order`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidOrder`](crate::Error::InvalidOrder) if
    /// `order < 4`.
    ///
    /// # Examples
    ///
    /// ```
    /// use bplus_tree::{BPlusTree, Error};
    ///
    /// let tree: BPlusTree<u32, u32> = BPlusTree::new(16).unwrap();
    /// assert!(tree.is_empty());
    ///
    /// let err = BPlusTree::<u32, u32>::new(3).err();
    /// assert_eq!(err, Some(Error::InvalidOrder { order: 3 }));
    /// ```
    pub fn new(order: usize) -> Result<Self> {
        Ok(Self::with_order(Order::new(order)?))
    }

    /// Creates an empty tree with an already validated order.
    #[must_use]
    pub fn with_order(order: Order) -> Self {
        BPlusTree {
            raw: RawTree::new(order),
        }
    }

    /// Returns the branching factor.
    #[must_use]
    pub fn order(&self) -> Order {
        self.raw.order()
    }

    /// Returns the number of keys in the tree.
    ///
    /// # Complexity
    ///
    /// O(1)
    #[must_use]
    pub fn key_count(&self) -> usize {
        self.raw.len()
    }

    /// Returns `true` if the tree holds no keys.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.raw.len() == 0
    }

    /// Returns how many nodes this tree has created over its lifetime.
    ///
    /// Node ids are drawn from the same counter, so this is also the next id
    /// to be handed out. Nodes removed by merges or root collapse still
    /// count; see [`live_node_count`](Self::live_node_count) for the current
    /// size.
    ///
    /// # Complexity
    ///
    /// O(1)
    #[must_use]
    pub fn node_count(&self) -> u64 {
        self.raw.allocated_nodes()
    }

    /// Returns the number of nodes currently in the tree.
    #[must_use]
    pub fn live_node_count(&self) -> usize {
        self.raw.live_nodes()
    }

    /// Returns the number of levels; a tree whose root is a leaf has height 1.
    #[must_use]
    pub fn height(&self) -> usize {
        self.raw.height()
    }

    /// Removes every key, leaving a single empty leaf as root.
    pub fn clear(&mut self) {
        self.raw.clear();
    }
}

impl<K: Clone + Ord, V> BPlusTree<K, V> {
    /// Returns a reference to the value stored for `key`.
    ///
    /// # Examples
    ///
    /// ```
    /// use bplus_tree::BPlusTree;
    ///
    /// let mut tree = BPlusTree::new(4).unwrap();
    /// tree.insert(String::from("k"), 1);
    /// assert_eq!(tree.find("k"), Some(&1));
    /// assert_eq!(tree.find("j"), None);
    /// ```
    pub fn find<Q>(&self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: ?Sized + Ord,
    {
        self.raw.get(key)
    }

    /// Returns a mutable reference to the value stored for `key`.
    pub fn find_mut<Q>(&mut self, key: &Q) -> Option<&mut V>
    where
        K: Borrow<Q>,
        Q: ?Sized + Ord,
    {
        self.raw.get_mut(key)
    }

    /// Returns `true` if the tree holds `key`.
    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: ?Sized + Ord,
    {
        self.raw.get(key).is_some()
    }

    /// Inserts `value` under `key`, overwriting any existing value.
    ///
    /// Returns the overwritten value. The key count grows only when this
    /// returns `None`.
    ///
    /// # Examples
    ///
    /// ```
    /// use bplus_tree::BPlusTree;
    ///
    /// let mut tree = BPlusTree::new(4).unwrap();
    /// assert_eq!(tree.insert(7, "first"), None);
    /// assert_eq!(tree.insert(7, "second"), Some("first"));
    /// assert_eq!(tree.key_count(), 1);
    /// ```
    pub fn insert(&mut self, key: K, value: V) -> Option<V> {
        self.raw.insert(key, value)
    }

    /// Removes `key`, returning its value if it was present.
    ///
    /// Removing an absent key, including from an empty tree, changes nothing.
    pub fn remove<Q>(&mut self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: ?Sized + Ord,
    {
        self.raw.remove(key)
    }

    /// Verifies every structural invariant of the tree.
    ///
    /// # Errors
    ///
    /// Returns the first [`InvariantViolation`] found.
    pub fn check_invariants(&self) -> core::result::Result<(), InvariantViolation> {
        self.raw.validate()
    }
}

impl<K: fmt::Debug, V> BPlusTree<K, V> {
    /// Renders the tree level by level for debugging.
    ///
    /// # Examples
    ///
    /// ```
    /// use bplus_tree::BPlusTree;
    ///
    /// let mut tree = BPlusTree::new(4).unwrap();
    /// for k in 1..=4 {
    ///     tree.insert(k, ());
    /// }
    /// assert_eq!(tree.dump(), "N2|root|1|3|\nN0|P2|1|2|  N1|P2|3|4|");
    /// ```
    #[must_use]
    pub fn dump(&self) -> String {
        self.raw.dump()
    }
}

impl<K, V> Default for BPlusTree<K, V> {
    /// Creates an empty tree of order [`Order::DEFAULT`].
    fn default() -> Self {
        Self::with_order(Order::DEFAULT)
    }
}

impl<K, V> fmt::Debug for BPlusTree<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BPlusTree")
            .field("order", &self.order().get())
            .field("key_count", &self.key_count())
            .field("height", &self.height())
            .finish_non_exhaustive()
    }
}

impl<K: Clone + Ord, V> Extend<(K, V)> for BPlusTree<K, V> {
    fn extend<T: IntoIterator<Item = (K, V)>>(&mut self, iter: T) {
        for (key, value) in iter {
            self.insert(key, value);
        }
    }
}

impl<K: Clone + Ord, V> FromIterator<(K, V)> for BPlusTree<K, V> {
    /// Builds a tree of order [`Order::DEFAULT`]; later duplicates win.
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut tree = Self::default();
        tree.extend(iter);
        tree
    }
}

/// Verifies every structural invariant of `tree`.
///
/// Walks the tree from the root with the key range each subtree may hold and
/// stops at the first violation: node shape, fill bounds, key order, key
/// range, leaf depth, parent links and the key count.
///
/// # Errors
///
/// Returns the first [`InvariantViolation`] found, naming the offending node
/// and rule.
///
/// # Examples
///
/// ```
/// use bplus_tree::{check_invariants, BPlusTree};
///
/// let mut tree = BPlusTree::new(4).unwrap();
/// for k in 0..1000 {
///     tree.insert(k, k);
/// }
/// for k in 0..1000 {
///     tree.remove(&k);
///     check_invariants(&tree).unwrap();
/// }
/// assert_eq!(tree.height(), 1);
/// ```
pub fn check_invariants<K: Clone + Ord, V>(tree: &BPlusTree<K, V>) -> core::result::Result<(), InvariantViolation> {
    tree.check_invariants()
}
