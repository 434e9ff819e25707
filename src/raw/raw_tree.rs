use core::borrow::Borrow;

use tracing::{debug, error, trace};

use super::arena::Arena;
use super::handle::{Handle, NodeId};
use super::node::{Children, InternalNode, LeafNode, Node, SearchResult};
use crate::order::Order;

/// The core B+Tree backing `BPlusTree`.
///
/// Nodes live in an arena and are owned top-down: the tree owns the root,
/// internal nodes name their children by handle. Each node also records its
/// parent handle, which is only followed upward while splitting or
/// rebalancing.
pub(crate) struct RawTree<K, V> {
    /// Arena storing all tree nodes.
    nodes: Arena<Node<K, V>>,
    /// Handle to the root node; a leaf while the tree fits in one node.
    root: Handle,
    /// Branching factor.
    order: Order,
    /// Number of key/value pairs in the tree.
    len: usize,
    /// Next diagnostic id to hand out.
    next_id: u64,
}

/// Separator removal a merge leaves behind in a parent.
struct PendingRemoval {
    /// Internal node losing a key/child pair.
    node: Handle,
    /// Slot of the pair to remove.
    slot: usize,
}

impl<K, V> RawTree<K, V> {
    /// Creates a tree whose root is a single empty leaf.
    pub(crate) fn new(order: Order) -> Self {
        let mut nodes = Arena::new();
        let root = nodes.alloc(Node::Leaf(LeafNode::new(NodeId(0), None)));
        debug!(order = order.get(), "created B+Tree");
        Self {
            nodes,
            root,
            order,
            len: 0,
            next_id: 1,
        }
    }

    /// Returns the number of key/value pairs in the tree.
    pub(crate) const fn len(&self) -> usize {
        self.len
    }

    pub(crate) const fn order(&self) -> Order {
        self.order
    }

    /// Number of node ids handed out so far.
    pub(crate) const fn allocated_nodes(&self) -> u64 {
        self.next_id
    }

    /// Number of nodes currently reachable from the root.
    pub(crate) const fn live_nodes(&self) -> usize {
        self.nodes.len()
    }

    pub(crate) fn root(&self) -> Handle {
        self.root
    }

    pub(crate) fn node(&self, handle: Handle) -> &Node<K, V> {
        self.nodes.get(handle)
    }

    /// Like [`RawTree::node`], but `None` for a dangling handle.
    pub(crate) fn try_node(&self, handle: Handle) -> Option<&Node<K, V>> {
        self.nodes.try_get(handle)
    }

    #[cfg(test)]
    pub(crate) fn node_mut(&mut self, handle: Handle) -> &mut Node<K, V> {
        self.nodes.get_mut(handle)
    }

    #[cfg(test)]
    pub(crate) fn alloc_node(&mut self, node: Node<K, V>) -> Handle {
        self.nodes.alloc(node)
    }

    #[cfg(test)]
    pub(crate) fn set_len(&mut self, len: usize) {
        self.len = len;
    }

    /// Number of levels from the root down to the leaves.
    pub(crate) fn height(&self) -> usize {
        let mut height = 1;
        let mut current = self.root;
        while let Node::Internal(internal) = self.nodes.get(current) {
            height += 1;
            current = internal.child(0);
        }
        height
    }

    /// Drops every node and starts over with a single empty leaf root.
    pub(crate) fn clear(&mut self) {
        self.nodes.clear();
        let id = self.next_node_id();
        self.root = self.nodes.alloc(Node::Leaf(LeafNode::new(id, None)));
        self.len = 0;
    }

    fn next_node_id(&mut self) -> NodeId {
        let id = NodeId(self.next_id);
        self.next_id += 1;
        id
    }

    /// Index of `child` within `parent`, found by identity.
    fn child_slot(&self, parent: Handle, child: Handle) -> usize {
        let internal = self.nodes.get(parent).as_internal();
        match internal.position_of(child) {
            Some(slot) => slot,
            None => corrupted(internal.id(), self.nodes.get(child).id()),
        }
    }

    /// Points every child of `handle` back at it.
    fn adopt_children(&mut self, handle: Handle) {
        let children: Children = match self.nodes.get(handle) {
            Node::Internal(internal) => internal.children().iter().copied().collect(),
            Node::Leaf(_) => return,
        };
        for child in children {
            self.nodes.get_mut(child).set_parent(Some(handle));
        }
    }
}

impl<K: Clone + Ord, V> RawTree<K, V> {
    /// Descends from the root to the only leaf whose range can hold `key`.
    pub(crate) fn find_leaf<Q>(&self, key: &Q) -> Handle
    where
        K: Borrow<Q>,
        Q: ?Sized + Ord,
    {
        let mut current = self.root;
        while let Node::Internal(internal) = self.nodes.get(current) {
            current = internal.child(internal.child_index_for(key));
        }
        current
    }

    /// Returns a reference to the value corresponding to the key.
    pub(crate) fn get<Q>(&self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: ?Sized + Ord,
    {
        let leaf = self.find_leaf(key);
        self.nodes.get(leaf).as_leaf().get(key)
    }

    /// Returns a mutable reference to the value corresponding to the key.
    pub(crate) fn get_mut<Q>(&mut self, key: &Q) -> Option<&mut V>
    where
        K: Borrow<Q>,
        Q: ?Sized + Ord,
    {
        let leaf = self.find_leaf(key);
        self.nodes.get_mut(leaf).as_leaf_mut().get_mut(key)
    }

    /// Inserts or overwrites `key`. Returns the previous value on overwrite.
    pub(crate) fn insert(&mut self, key: K, value: V) -> Option<V> {
        let leaf_handle = self.find_leaf(&key);
        let leaf = self.nodes.get_mut(leaf_handle).as_leaf_mut();
        match leaf.search(&key) {
            SearchResult::Found(idx) => Some(leaf.replace_value(idx, value)),
            SearchResult::NotFound(idx) => {
                leaf.insert_at(idx, key, value);
                self.len += 1;

                if leaf.len() > self.order.max_leaf_keys() {
                    let (separator, right) = self.split_leaf(leaf_handle);
                    self.propagate_split(leaf_handle, separator, right);
                }

                None
            }
        }
    }

    /// Splits an overflowing leaf. Returns the new sibling and its first key.
    fn split_leaf(&mut self, handle: Handle) -> (K, Handle) {
        let id = self.next_node_id();
        let leaf = self.nodes.get_mut(handle).as_leaf_mut();
        let right = leaf.split(id);
        let separator = right.key(0).clone();
        trace!(node = %leaf.id(), sibling = %id, left = leaf.len(), right = right.len(), "split leaf");

        let right = self.nodes.alloc(Node::Leaf(right));
        (separator, right)
    }

    /// Splits an overflowing internal node. Returns the new sibling and its
    /// separator.
    fn split_internal(&mut self, handle: Handle) -> (K, Handle) {
        let id = self.next_node_id();
        let internal = self.nodes.get_mut(handle).as_internal_mut();
        let right = internal.split(id);
        let separator = right.key(0).clone();
        trace!(
            node = %internal.id(),
            sibling = %id,
            left = internal.child_count(),
            right = right.child_count(),
            "split internal node"
        );

        let right = self.nodes.alloc(Node::Internal(right));
        self.adopt_children(right);
        (separator, right)
    }

    /// Hooks `right` in next to `left` after a split, splitting ancestors as
    /// long as they overflow and growing a new root if the old one split.
    fn propagate_split(&mut self, mut left: Handle, mut separator: K, mut right: Handle) {
        loop {
            let Some(parent) = self.nodes.get(left).parent() else {
                self.grow_root(left, separator, right);
                return;
            };

            let slot = self.child_slot(parent, left);
            let internal = self.nodes.get_mut(parent).as_internal_mut();
            internal.insert_after(slot, separator, right);
            let overflow = internal.child_count() > self.order.max_children();
            self.nodes.get_mut(right).set_parent(Some(parent));

            if !overflow {
                return;
            }

            (separator, right) = self.split_internal(parent);
            left = parent;
        }
    }

    /// Puts a new internal root above the two halves of the old root.
    fn grow_root(&mut self, left: Handle, separator: K, right: Handle) {
        let id = self.next_node_id();
        let mut root = InternalNode::new(id, None);
        let placeholder = self.nodes.get(left).keys().first().cloned().unwrap_or_else(|| separator.clone());
        root.push(placeholder, left);
        root.push(separator, right);

        let root = self.nodes.alloc(Node::Internal(root));
        self.nodes.get_mut(left).set_parent(Some(root));
        self.nodes.get_mut(right).set_parent(Some(root));
        self.root = root;
        trace!(root = %id, height = self.height(), "grew new root");
    }

    /// Removes `key`, returning its value if it was present.
    pub(crate) fn remove<Q>(&mut self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: ?Sized + Ord,
    {
        let leaf_handle = self.find_leaf(key);
        let leaf = self.nodes.get_mut(leaf_handle).as_leaf_mut();
        let SearchResult::Found(idx) = leaf.search(key) else {
            return None;
        };

        let (_, value) = leaf.remove_at(idx);
        self.len -= 1;

        if leaf.parent().is_some() && leaf.len() < self.order.min_leaf_keys() {
            let mut pending = self.rebalance(leaf_handle);
            while let Some(removal) = pending {
                pending = self.remove_separator(removal);
            }
        }

        Some(value)
    }

    /// Drops a key/child pair from an internal node after a merge, then
    /// restores the node's own bounds. Returns the next removal if fixing
    /// this node needed another merge one level up.
    fn remove_separator(&mut self, removal: PendingRemoval) -> Option<PendingRemoval> {
        let PendingRemoval { node, slot } = removal;
        let internal = self.nodes.get_mut(node).as_internal_mut();
        internal.remove_at(slot);

        if internal.parent().is_none() {
            if internal.child_count() == 1 {
                self.collapse_root(node);
            }
            return None;
        }

        if internal.child_count() < self.order.min_children() {
            return self.rebalance(node);
        }

        None
    }

    /// Replaces an internal root that has a single child by that child.
    fn collapse_root(&mut self, old_root: Handle) {
        let Node::Internal(internal) = self.nodes.take(old_root) else {
            unreachable!("only internal roots collapse");
        };
        let child = internal.child(0);
        self.nodes.get_mut(child).set_parent(None);
        self.root = child;
        trace!(old_root = %internal.id(), root = %self.nodes.get(child).id(), "collapsed root");
    }

    /// Restores minimum occupancy of an underflowing non-root node.
    ///
    /// Borrows a boundary entry from the left or right sibling when one can
    /// spare it, otherwise merges with a sibling sitting at the minimum. A
    /// merge leaves a separator to remove from the parent, which is returned.
    fn rebalance(&mut self, handle: Handle) -> Option<PendingRemoval> {
        let node = self.nodes.get(handle);
        let Some(parent) = node.parent() else {
            unreachable!("the root never rebalances");
        };
        let minimum = if node.is_leaf() {
            self.order.min_leaf_keys()
        } else {
            self.order.min_children()
        };

        let slot = self.child_slot(parent, handle);
        let siblings = self.nodes.get(parent).as_internal();
        let left = slot.checked_sub(1).map(|i| siblings.child(i));
        let right = (slot + 1 < siblings.child_count()).then(|| siblings.child(slot + 1));

        if let Some(left) = left
            && self.nodes.get(left).occupancy() > minimum
        {
            let separator = siblings.key(slot).clone();
            let (node, lender) = self.nodes.get_pair_mut(handle, left);
            let separator = node.borrow_from_left(lender, separator);
            trace!(node = %node.id(), sibling = %lender.id(), "borrowed from left sibling");
            self.nodes.get_mut(parent).as_internal_mut().set_key(slot, separator);
            self.adopt_children(handle);
            return None;
        }

        if let Some(right) = right
            && self.nodes.get(right).occupancy() > minimum
        {
            let separator = siblings.key(slot + 1).clone();
            let (node, lender) = self.nodes.get_pair_mut(handle, right);
            let separator = node.borrow_from_right(lender, separator);
            trace!(node = %node.id(), sibling = %lender.id(), "borrowed from right sibling");
            self.nodes.get_mut(parent).as_internal_mut().set_key(slot + 1, separator);
            self.adopt_children(handle);
            return None;
        }

        // Neither sibling can lend, so whichever exists sits at the minimum.
        let (survivor, absorbed, separator_slot) = match (left, right) {
            (Some(left), _) => (left, handle, slot),
            (None, Some(right)) => (handle, right, slot + 1),
            (None, None) => corrupted(self.nodes.get(parent).id(), self.nodes.get(handle).id()),
        };
        let separator = self.nodes.get(parent).as_internal().key(separator_slot).clone();
        let absorbed_node = self.nodes.take(absorbed);
        let absorbed_id = absorbed_node.id();
        let target = self.nodes.get_mut(survivor);
        target.absorb(absorbed_node, separator);
        trace!(node = %target.id(), absorbed = %absorbed_id, "merged siblings");
        self.adopt_children(survivor);

        Some(PendingRemoval {
            node: parent,
            slot: separator_slot,
        })
    }
}

/// Reports a parent that does not list a child it should, then panics.
fn corrupted(parent: NodeId, child: NodeId) -> ! {
    error!(parent = %parent, child = %child, "child missing from parent");
    panic!("corrupted tree: {child} is not a child of {parent}")
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use alloc::collections::BTreeMap;
    use alloc::vec::Vec;
    use proptest::prelude::*;

    fn tree(order: usize) -> RawTree<i32, i32> {
        RawTree::new(Order::new(order).unwrap())
    }

    fn leaf_keys(tree: &RawTree<i32, i32>, handle: Handle) -> Vec<i32> {
        tree.node(handle).keys().to_vec()
    }

    #[test]
    fn fourth_insert_splits_root_leaf() {
        let mut tree = tree(4);
        for k in 1..=3 {
            tree.insert(k, k * 10);
        }
        assert!(tree.node(tree.root()).is_leaf());

        tree.insert(4, 40);
        let root = tree.node(tree.root()).as_internal();
        assert_eq!(root.child_count(), 2);
        assert_eq!(root.key(1), &3);
        assert_eq!(leaf_keys(&tree, root.child(0)), [1, 2]);
        assert_eq!(leaf_keys(&tree, root.child(1)), [3, 4]);
        assert_eq!(tree.get(&3), Some(&30));
        assert_eq!(tree.len(), 4);
        assert_eq!(tree.allocated_nodes(), 3);
        assert_eq!(tree.height(), 2);
        tree.validate().unwrap();
    }

    #[test]
    fn upsert_keeps_count() {
        let mut tree = tree(4);
        assert_eq!(tree.insert(1, 1), None);
        assert_eq!(tree.insert(1, 2), Some(1));
        assert_eq!(tree.len(), 1);
        assert_eq!(tree.get(&1), Some(&2));
    }

    #[test]
    fn borrow_from_right_leaf_updates_separator() {
        let mut tree = tree(4);
        for k in [10, 20, 30, 40, 50] {
            tree.insert(k, k);
        }
        // Leaves are {10, 20} and {30, 40, 50}.
        tree.remove(&10);
        tree.remove(&20);
        tree.validate().unwrap();

        let root = tree.node(tree.root()).as_internal();
        assert_eq!(root.key(1), &40);
        assert_eq!(leaf_keys(&tree, root.child(0)), [30]);
        assert_eq!(leaf_keys(&tree, root.child(1)), [40, 50]);
    }

    #[test]
    fn merge_collapses_root() {
        let mut tree = tree(4);
        for k in 1..=4 {
            tree.insert(k, k);
        }
        // Leaves {1, 2} and {3, 4} shrink to {2} and {4}, then merge.
        tree.remove(&1);
        tree.remove(&3);
        tree.remove(&2);
        tree.validate().unwrap();

        let root = tree.node(tree.root());
        assert!(root.is_leaf() && root.parent().is_none());
        assert_eq!(root.keys(), &[4]);
        assert_eq!(tree.live_nodes(), 1);
    }

    #[test]
    fn sequential_fill_and_drain() {
        let mut tree = tree(4);
        for k in 0..1000 {
            tree.insert(k, k);
            tree.validate().unwrap();
        }
        assert!(tree.height() > 3);

        for k in 0..1000 {
            assert_eq!(tree.remove(&k), Some(k));
            tree.validate().unwrap();
        }

        let root = tree.node(tree.root());
        assert!(root.is_leaf());
        assert!(root.keys().is_empty());
        assert_eq!(tree.len(), 0);
        assert_eq!(tree.live_nodes(), 1);
    }

    #[test]
    fn reverse_drain_exercises_left_borrows() {
        let mut tree = tree(5);
        for k in 0..500 {
            tree.insert(k, k);
        }
        for k in (0..500).rev() {
            assert_eq!(tree.remove(&k), Some(k));
            tree.validate().unwrap();
        }
        assert_eq!(tree.height(), 1);
    }

    #[test]
    fn remove_missing_is_noop() {
        let mut tree = tree(4);
        assert_eq!(tree.remove(&1), None);
        tree.insert(1, 1);
        assert_eq!(tree.remove(&2), None);
        assert_eq!(tree.len(), 1);
        assert_eq!(tree.live_nodes(), 1);
    }

    #[test]
    fn clear_resets_to_single_leaf() {
        let mut tree = tree(4);
        for k in 0..50 {
            tree.insert(k, k);
        }
        let allocated = tree.allocated_nodes();
        tree.clear();
        assert_eq!(tree.len(), 0);
        assert_eq!(tree.live_nodes(), 1);
        assert_eq!(tree.height(), 1);
        assert_eq!(tree.allocated_nodes(), allocated + 1);
        tree.validate().unwrap();
    }

    #[test]
    #[should_panic(expected = "corrupted tree")]
    fn detached_child_is_fatal() {
        let mut tree = tree(4);
        for k in 1..=4 {
            tree.insert(k, k);
        }
        // A leaf that names the root as parent without being listed there.
        let root = tree.root();
        let orphan = tree.nodes.alloc(Node::Leaf(LeafNode::new(NodeId(99), Some(root))));
        let _ = tree.child_slot(root, orphan);
    }

    // Test operations enum for property testing
    #[derive(Clone, Debug)]
    enum Op {
        Insert(i32),
        Remove(i32),
    }

    fn op_strategy() -> impl Strategy<Value = Op> {
        prop_oneof![
            3 => (0i32..1000).prop_map(Op::Insert),
            2 => (0i32..1000).prop_map(Op::Remove),
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(50))]

        #[test]
        fn invariants_hold_after_every_operation(
            order in 4usize..10,
            ops in prop::collection::vec(op_strategy(), 0..500),
        ) {
            let mut tree = tree(order);
            let mut model = BTreeMap::new();

            for op in ops {
                match op {
                    Op::Insert(key) => {
                        prop_assert_eq!(tree.insert(key, key * 2), model.insert(key, key * 2));
                    }
                    Op::Remove(key) => {
                        prop_assert_eq!(tree.remove(&key), model.remove(&key));
                    }
                }
                if let Err(violation) = tree.validate() {
                    return Err(TestCaseError::fail(alloc::format!("{violation}")));
                }
                prop_assert_eq!(tree.len(), model.len());
            }

            for (key, value) in &model {
                prop_assert_eq!(tree.get(key), Some(value));
            }
        }
    }
}
