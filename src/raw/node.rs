use core::borrow::Borrow;
use core::cmp::Ordering;

use smallvec::SmallVec;

use super::handle::{Handle, NodeId};

/// Slots kept inline before a node's arrays spill to the heap.
///
/// Covers every order up to 8 including the transient overflow slot.
pub(crate) const INLINE_SLOTS: usize = 9;

pub(crate) type Keys<K> = SmallVec<[K; INLINE_SLOTS]>;
pub(crate) type Children = SmallVec<[Handle; INLINE_SLOTS]>;

/// Fields shared by both node kinds.
#[derive(Clone, Copy, Debug)]
pub(crate) struct NodeHeader {
    /// Diagnostic id, fixed at creation.
    pub(crate) id: NodeId,
    /// Non-owning back-reference; `None` only for the root.
    pub(crate) parent: Option<Handle>,
}

#[allow(private_interfaces)]
#[allow(clippy::large_enum_variant)]
pub(crate) enum Node<K, V> {
    Internal(InternalNode<K>),
    Leaf(LeafNode<K, V>),
}

// `children[i]` covers `[keys[i], keys[i + 1])`. `keys[0]` only keeps the two
// arrays index-aligned and is never compared against.
pub(crate) struct InternalNode<K> {
    header: NodeHeader,
    keys: Keys<K>,
    children: Children,
}

pub(crate) struct LeafNode<K, V> {
    header: NodeHeader,
    keys: Keys<K>,
    values: SmallVec<[V; INLINE_SLOTS]>,
}

/// Result of scanning a leaf for a key.
pub(crate) enum SearchResult {
    /// Key was found at the given index.
    Found(usize),
    /// Key was not found; index is where it would be inserted.
    NotFound(usize),
}

impl<K, V> Node<K, V> {
    pub(crate) fn header(&self) -> &NodeHeader {
        match self {
            Node::Internal(internal) => &internal.header,
            Node::Leaf(leaf) => &leaf.header,
        }
    }

    pub(crate) fn header_mut(&mut self) -> &mut NodeHeader {
        match self {
            Node::Internal(internal) => &mut internal.header,
            Node::Leaf(leaf) => &mut leaf.header,
        }
    }

    pub(crate) fn id(&self) -> NodeId {
        self.header().id
    }

    pub(crate) fn parent(&self) -> Option<Handle> {
        self.header().parent
    }

    pub(crate) fn set_parent(&mut self, parent: Option<Handle>) {
        self.header_mut().parent = parent;
    }

    pub(crate) fn is_leaf(&self) -> bool {
        matches!(self, Node::Leaf(_))
    }

    /// Returns the leaf node, panicking if this is not a leaf.
    pub(crate) fn as_leaf(&self) -> &LeafNode<K, V> {
        match self {
            Node::Leaf(leaf) => leaf,
            Node::Internal(internal) => panic!("expected leaf node, {} is internal", internal.header.id),
        }
    }

    /// Returns the leaf node mutably, panicking if this is not a leaf.
    pub(crate) fn as_leaf_mut(&mut self) -> &mut LeafNode<K, V> {
        match self {
            Node::Leaf(leaf) => leaf,
            Node::Internal(internal) => panic!("expected leaf node, {} is internal", internal.header.id),
        }
    }

    /// Returns the internal node, panicking if this is not internal.
    pub(crate) fn as_internal(&self) -> &InternalNode<K> {
        match self {
            Node::Internal(internal) => internal,
            Node::Leaf(leaf) => panic!("expected internal node, {} is a leaf", leaf.header.id),
        }
    }

    /// Returns the internal node mutably, panicking if this is not internal.
    pub(crate) fn as_internal_mut(&mut self) -> &mut InternalNode<K> {
        match self {
            Node::Internal(internal) => internal,
            Node::Leaf(leaf) => panic!("expected internal node, {} is a leaf", leaf.header.id),
        }
    }

    /// Occupancy used for fill bounds: entries for a leaf, children for an
    /// internal node.
    pub(crate) fn occupancy(&self) -> usize {
        match self {
            Node::Internal(internal) => internal.child_count(),
            Node::Leaf(leaf) => leaf.len(),
        }
    }

    /// All keys, including the placeholder slot of an internal node.
    pub(crate) fn keys(&self) -> &[K] {
        match self {
            Node::Internal(internal) => &internal.keys,
            Node::Leaf(leaf) => &leaf.keys,
        }
    }
}

impl<K: Clone, V> Node<K, V> {
    /// Moves the last entry of `left` to the front of `self`.
    ///
    /// `separator` is the parent's key for `self`; an internal node pulls it
    /// down as the lower bound of its old first child. Returns the new parent
    /// key for `self`.
    pub(crate) fn borrow_from_left(&mut self, left: &mut Self, separator: K) -> K {
        match (self, left) {
            (Node::Leaf(node), Node::Leaf(left)) => node.borrow_from_left(left),
            (Node::Internal(node), Node::Internal(left)) => node.borrow_from_left(left, separator),
            (node, left) => kind_mismatch(node.header(), left.header()),
        }
    }

    /// Moves the first entry of `right` to the back of `self`.
    ///
    /// `separator` is the parent's key for `right`. Returns the new parent key
    /// for `right`.
    pub(crate) fn borrow_from_right(&mut self, right: &mut Self, separator: K) -> K {
        match (self, right) {
            (Node::Leaf(node), Node::Leaf(right)) => node.borrow_from_right(right),
            (Node::Internal(node), Node::Internal(right)) => node.borrow_from_right(right, separator),
            (node, right) => kind_mismatch(node.header(), right.header()),
        }
    }

    /// Appends every entry of `right`, which must be the immediate right
    /// sibling. `separator` is the parent's key for `right`.
    pub(crate) fn absorb(&mut self, right: Self, separator: K) {
        match (self, right) {
            (Node::Leaf(node), Node::Leaf(right)) => node.absorb(right),
            (Node::Internal(node), Node::Internal(right)) => node.absorb(right, separator),
            (node, right) => kind_mismatch(node.header(), right.header()),
        }
    }
}

fn kind_mismatch(a: &NodeHeader, b: &NodeHeader) -> ! {
    tracing::error!(node = %a.id, sibling = %b.id, "sibling node kinds differ");
    panic!("siblings {} and {} are not the same node kind", a.id, b.id)
}

impl<K> InternalNode<K> {
    /// Creates an empty internal node.
    pub(crate) fn new(id: NodeId, parent: Option<Handle>) -> Self {
        Self {
            header: NodeHeader { id, parent },
            keys: SmallVec::new(),
            children: SmallVec::new(),
        }
    }

    pub(crate) fn id(&self) -> NodeId {
        self.header.id
    }

    pub(crate) fn parent(&self) -> Option<Handle> {
        self.header.parent
    }

    pub(crate) fn child_count(&self) -> usize {
        self.children.len()
    }

    /// Number of stored keys, placeholder included.
    pub(crate) fn key_count(&self) -> usize {
        self.keys.len()
    }

    #[inline]
    pub(crate) fn key(&self, index: usize) -> &K {
        &self.keys[index]
    }

    pub(crate) fn keys(&self) -> &[K] {
        &self.keys
    }

    #[inline]
    pub(crate) fn child(&self, index: usize) -> Handle {
        self.children[index]
    }

    pub(crate) fn children(&self) -> &[Handle] {
        &self.children
    }

    /// Index of `child` in this node, matched by identity.
    pub(crate) fn position_of(&self, child: Handle) -> Option<usize> {
        self.children.iter().position(|&c| c == child)
    }

    /// Picks the child whose range contains `key`: the slot left of the first
    /// separator strictly greater than `key`, else the last child.
    pub(crate) fn child_index_for<Q>(&self, key: &Q) -> usize
    where
        K: Borrow<Q>,
        Q: ?Sized + Ord,
    {
        for (i, separator) in self.keys.iter().enumerate().skip(1) {
            let separator: &Q = separator.borrow();
            if key < separator {
                return i - 1;
            }
        }
        self.children.len().saturating_sub(1)
    }

    /// Appends a key/child pair.
    pub(crate) fn push(&mut self, key: K, child: Handle) {
        self.keys.push(key);
        self.children.push(child);
    }

    /// Inserts a key/child pair immediately after slot `index`.
    pub(crate) fn insert_after(&mut self, index: usize, key: K, child: Handle) {
        self.keys.insert(index + 1, key);
        self.children.insert(index + 1, child);
    }

    /// Removes the key/child pair at slot `index`.
    pub(crate) fn remove_at(&mut self, index: usize) -> (K, Handle) {
        let key = self.keys.remove(index);
        let child = self.children.remove(index);
        (key, child)
    }

    pub(crate) fn set_key(&mut self, index: usize, key: K) {
        self.keys[index] = key;
    }

    /// Splits this node at the midpoint; the upper half moves to a new node
    /// with the same parent. The new node's first key is its separator.
    ///
    /// Children of the returned node still point at `self` until the caller
    /// re-parents them.
    pub(crate) fn split(&mut self, id: NodeId) -> InternalNode<K> {
        let keep = self.children.len().div_ceil(2);
        let mut right = InternalNode::new(id, self.header.parent);
        right.keys = self.keys.drain(keep..).collect();
        right.children = self.children.drain(keep..).collect();
        right
    }

    fn borrow_from_left(&mut self, left: &mut Self, separator: K) -> K
    where
        K: Clone,
    {
        let (Some(key), Some(child)) = (left.keys.pop(), left.children.pop()) else {
            panic!("`InternalNode::borrow_from_left()` - lender {} is empty!", left.header.id);
        };
        // The old placeholder becomes a real separator for the old first child.
        if let Some(first) = self.keys.first_mut() {
            *first = separator;
        }
        self.keys.insert(0, key.clone());
        self.children.insert(0, child);
        key
    }

    fn borrow_from_right(&mut self, right: &mut Self, separator: K) -> K
    where
        K: Clone,
    {
        assert!(
            right.children.len() > 1,
            "`InternalNode::borrow_from_right()` - lender {} cannot spare a child!",
            right.header.id
        );
        let (_, child) = right.remove_at(0);
        self.push(separator, child);
        right.keys[0].clone()
    }

    fn absorb(&mut self, mut right: Self, separator: K) {
        if let Some(first) = right.keys.first_mut() {
            *first = separator;
        }
        self.keys.append(&mut right.keys);
        self.children.append(&mut right.children);
    }
}

impl<K, V> LeafNode<K, V> {
    /// Creates an empty leaf node.
    pub(crate) fn new(id: NodeId, parent: Option<Handle>) -> Self {
        Self {
            header: NodeHeader { id, parent },
            keys: SmallVec::new(),
            values: SmallVec::new(),
        }
    }

    pub(crate) fn id(&self) -> NodeId {
        self.header.id
    }

    pub(crate) fn parent(&self) -> Option<Handle> {
        self.header.parent
    }

    pub(crate) fn len(&self) -> usize {
        self.keys.len()
    }

    pub(crate) fn value_count(&self) -> usize {
        self.values.len()
    }

    #[inline]
    pub(crate) fn key(&self, index: usize) -> &K {
        &self.keys[index]
    }

    pub(crate) fn keys(&self) -> &[K] {
        &self.keys
    }

    #[cfg(test)]
    pub(crate) fn values(&self) -> &[V] {
        &self.values
    }

    /// Linear scan for `key`.
    #[inline]
    pub(crate) fn search<Q>(&self, key: &Q) -> SearchResult
    where
        K: Borrow<Q>,
        Q: ?Sized + Ord,
    {
        for (i, k) in self.keys.iter().enumerate() {
            let k: &Q = k.borrow();
            match k.cmp(key) {
                Ordering::Less => {}
                Ordering::Equal => return SearchResult::Found(i),
                Ordering::Greater => return SearchResult::NotFound(i),
            }
        }
        SearchResult::NotFound(self.keys.len())
    }

    pub(crate) fn get<Q>(&self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: ?Sized + Ord,
    {
        match self.search(key) {
            SearchResult::Found(idx) => Some(&self.values[idx]),
            SearchResult::NotFound(_) => None,
        }
    }

    pub(crate) fn get_mut<Q>(&mut self, key: &Q) -> Option<&mut V>
    where
        K: Borrow<Q>,
        Q: ?Sized + Ord,
    {
        match self.search(key) {
            SearchResult::Found(idx) => Some(&mut self.values[idx]),
            SearchResult::NotFound(_) => None,
        }
    }

    /// Inserts a key and value at the given position, shifting the tail right.
    pub(crate) fn insert_at(&mut self, index: usize, key: K, value: V) {
        self.keys.insert(index, key);
        self.values.insert(index, value);
    }

    /// Removes the key and value at the given position, shifting the tail left.
    pub(crate) fn remove_at(&mut self, index: usize) -> (K, V) {
        let key = self.keys.remove(index);
        let value = self.values.remove(index);
        (key, value)
    }

    /// Overwrites the value at `index`, returning the old one.
    pub(crate) fn replace_value(&mut self, index: usize, value: V) -> V {
        core::mem::replace(&mut self.values[index], value)
    }

    /// Splits this leaf in two. The lower `len / 2` entries stay; the rest move
    /// to a new leaf with the same parent.
    pub(crate) fn split(&mut self, id: NodeId) -> LeafNode<K, V> {
        let keep = self.keys.len() / 2;
        let mut right = LeafNode::new(id, self.header.parent);
        right.keys = self.keys.drain(keep..).collect();
        right.values = self.values.drain(keep..).collect();
        right
    }

    fn borrow_from_left(&mut self, left: &mut Self) -> K
    where
        K: Clone,
    {
        let (Some(key), Some(value)) = (left.keys.pop(), left.values.pop()) else {
            panic!("`LeafNode::borrow_from_left()` - lender {} is empty!", left.header.id);
        };
        self.keys.insert(0, key.clone());
        self.values.insert(0, value);
        key
    }

    fn borrow_from_right(&mut self, right: &mut Self) -> K
    where
        K: Clone,
    {
        assert!(
            right.keys.len() > 1,
            "`LeafNode::borrow_from_right()` - lender {} cannot spare an entry!",
            right.header.id
        );
        let (key, value) = right.remove_at(0);
        self.keys.push(key);
        self.values.push(value);
        right.keys[0].clone()
    }

    fn absorb(&mut self, mut right: Self) {
        self.keys.append(&mut right.keys);
        self.values.append(&mut right.values);
    }
}
