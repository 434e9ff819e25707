use alloc::format;

use super::handle::{Handle, NodeId};
use super::node::Node;
use super::raw_tree::RawTree;
use crate::error::{InvariantViolation, Rule};

type Checked = Result<usize, InvariantViolation>;

/// Key-range bounds inherited from ancestors: `[lower, upper)`, open-ended
/// when `None`.
struct Bounds<'a, K> {
    lower: Option<&'a K>,
    upper: Option<&'a K>,
}

// Not derived: a derive would demand `K: Copy`.
impl<K> Clone for Bounds<'_, K> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<K> Copy for Bounds<'_, K> {}

impl<K: Ord> Bounds<'_, K> {
    fn contains(&self, key: &K) -> bool {
        self.lower.is_none_or(|lower| key >= lower) && self.upper.is_none_or(|upper| key < upper)
    }
}

/// State carried through one validation walk.
struct Walk {
    /// Depth of the first leaf reached.
    leaf_depth: Option<usize>,
}

impl<K: Ord, V> RawTree<K, V> {
    /// Walks the tree top-down and reports the first broken invariant.
    ///
    /// Checks, per node: counts consistent with the node kind, fill bounds
    /// for its position, strictly ascending keys, containment in the range
    /// routed to it, uniform leaf depth and a parent link that matches the
    /// slot the parent lists it in. Finally the key count must equal the
    /// number of leaf entries.
    pub(crate) fn validate(&self) -> Result<(), InvariantViolation> {
        let root = self.node(self.root());
        if let Some(parent) = root.parent() {
            return Err(InvariantViolation::new(
                root.id(),
                Rule::RootLink,
                format!("root has parent link to slot {}", parent.to_index()),
            ));
        }

        let mut walk = Walk { leaf_depth: None };
        let bounds = Bounds {
            lower: None,
            upper: None,
        };
        let counted = self.validate_node(self.root(), None, bounds, 0, &mut walk)?;

        if counted != self.len() {
            return Err(InvariantViolation::new(
                root.id(),
                Rule::KeyCount,
                format!("tree counts {} keys but leaves hold {counted}", self.len()),
            ));
        }
        Ok(())
    }

    /// Validates the subtree at `handle`, returning the number of keys its
    /// leaves hold.
    fn validate_node(
        &self,
        handle: Handle,
        parent: Option<(Handle, usize)>,
        bounds: Bounds<'_, K>,
        depth: usize,
        walk: &mut Walk,
    ) -> Checked {
        let Some(node) = self.try_node(handle) else {
            let parent_id = parent.map(|(p, _)| self.node(p).id()).unwrap_or(self.node(self.root()).id());
            return Err(InvariantViolation::new(
                parent_id,
                Rule::NodeShape,
                format!("child handle {} does not name a live node", handle.to_index()),
            ));
        };
        let id = node.id();

        if let Some((parent_handle, slot)) = parent {
            if node.parent() != Some(parent_handle) {
                return Err(InvariantViolation::new(
                    id,
                    Rule::ParentLink,
                    format!("listed in slot {slot} of {} but links elsewhere", self.node(parent_handle).id()),
                ));
            }
            if self.node(parent_handle).as_internal().position_of(handle) != Some(slot) {
                return Err(InvariantViolation::new(
                    id,
                    Rule::ParentLink,
                    format!("listed more than once by {}", self.node(parent_handle).id()),
                ));
            }
        }

        self.check_fill(node, depth)?;

        match node {
            Node::Leaf(leaf) => {
                if leaf.len() != leaf.value_count() {
                    return Err(InvariantViolation::new(
                        id,
                        Rule::NodeShape,
                        format!("leaf holds {} keys but {} values", leaf.len(), leaf.value_count()),
                    ));
                }

                match walk.leaf_depth {
                    None => walk.leaf_depth = Some(depth),
                    Some(expected) if expected != depth => {
                        return Err(InvariantViolation::new(
                            id,
                            Rule::LeafDepth,
                            format!("leaf at depth {depth}, expected {expected}"),
                        ));
                    }
                    Some(_) => {}
                }

                check_keys(id, leaf.keys(), 0, bounds)?;
                Ok(leaf.len())
            }
            Node::Internal(internal) => {
                if internal.child_count() == 0 || internal.key_count() != internal.child_count() {
                    return Err(InvariantViolation::new(
                        id,
                        Rule::NodeShape,
                        format!(
                            "internal node holds {} keys for {} children",
                            internal.key_count(),
                            internal.child_count()
                        ),
                    ));
                }

                // The placeholder at slot 0 is never compared against.
                check_keys(id, internal.keys(), 1, bounds)?;

                let last = internal.child_count() - 1;
                let mut total = 0;
                for (slot, &child) in internal.children().iter().enumerate() {
                    let child_bounds = Bounds {
                        lower: if slot == 0 { bounds.lower } else { Some(internal.key(slot)) },
                        upper: if slot == last { bounds.upper } else { Some(internal.key(slot + 1)) },
                    };
                    total += self.validate_node(child, Some((handle, slot)), child_bounds, depth + 1, walk)?;
                }
                Ok(total)
            }
        }
    }

    fn check_fill(&self, node: &Node<K, V>, depth: usize) -> Result<(), InvariantViolation> {
        let order = self.order();
        let root = depth == 0;
        let (kind, min, max) = match (node.is_leaf(), root) {
            (true, true) => ("root leaf", 0, order.max_leaf_keys()),
            (true, false) => ("leaf", order.min_leaf_keys(), order.max_leaf_keys()),
            (false, true) => ("root internal node", 2, order.max_children()),
            (false, false) => ("internal node", order.min_children(), order.max_children()),
        };
        let occupancy = node.occupancy();
        if occupancy < min || occupancy > max {
            let unit = if node.is_leaf() { "keys" } else { "children" };
            return Err(InvariantViolation::new(
                node.id(),
                Rule::FillBounds,
                format!("{kind} holds {occupancy} {unit}, expected {min}..={max}"),
            ));
        }
        Ok(())
    }
}

/// Checks that `keys[from..]` ascend strictly and stay inside `bounds`.
fn check_keys<K: Ord>(
    id: NodeId,
    keys: &[K],
    from: usize,
    bounds: Bounds<'_, K>,
) -> Result<(), InvariantViolation> {
    for (slot, key) in keys.iter().enumerate().skip(from) {
        if slot > from && keys[slot - 1] >= *key {
            return Err(InvariantViolation::new(
                id,
                Rule::KeyOrder,
                format!("key in slot {slot} does not exceed key in slot {}", slot - 1),
            ));
        }
        if !bounds.contains(key) {
            return Err(InvariantViolation::new(
                id,
                Rule::KeyRange,
                format!("key in slot {slot} falls outside the range routed to this node"),
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::super::node::{InternalNode, LeafNode};
    use super::*;
    use crate::order::Order;

    fn tree(order: usize, keys: impl IntoIterator<Item = i32>) -> RawTree<i32, i32> {
        let mut tree = RawTree::new(Order::new(order).unwrap());
        for k in keys {
            tree.insert(k, k);
        }
        tree.validate().unwrap();
        tree
    }

    fn child(tree: &RawTree<i32, i32>, parent: Handle, slot: usize) -> Handle {
        tree.node(parent).as_internal().child(slot)
    }

    #[test]
    fn empty_tree_is_valid() {
        tree(4, []);
    }

    #[test]
    fn detects_key_count_drift() {
        let mut tree = tree(4, 0..10);
        tree.set_len(11);
        let violation = tree.validate().unwrap_err();
        assert_eq!(violation.rule, Rule::KeyCount);
    }

    #[test]
    fn detects_root_with_parent() {
        let mut tree = tree(4, 0..10);
        let root = tree.root();
        let first = child(&tree, root, 0);
        tree.node_mut(root).set_parent(Some(first));
        let violation = tree.validate().unwrap_err();
        assert_eq!(violation.rule, Rule::RootLink);
        assert_eq!(violation.node, tree.node(root).id());
    }

    #[test]
    fn detects_broken_parent_link() {
        let mut tree = tree(4, 0..20);
        let root = tree.root();
        let left = child(&tree, root, 0);
        let right = child(&tree, root, 1);
        let grandchild = child(&tree, right, 0);
        tree.node_mut(grandchild).set_parent(Some(left));

        let violation = tree.validate().unwrap_err();
        assert_eq!(violation.rule, Rule::ParentLink);
        assert_eq!(violation.node, tree.node(grandchild).id());
    }

    #[test]
    fn detects_underfull_leaf() {
        let mut tree = tree(4, 0..4);
        let root = tree.root();
        let left = child(&tree, root, 0);
        tree.node_mut(left).as_leaf_mut().remove_at(0);
        tree.node_mut(left).as_leaf_mut().remove_at(0);
        tree.set_len(2);

        let violation = tree.validate().unwrap_err();
        assert_eq!(violation.rule, Rule::FillBounds);
        assert_eq!(violation.detail, "leaf holds 0 keys, expected 1..=3");
    }

    #[test]
    fn detects_unsorted_leaf() {
        let mut tree = tree(8, [1, 2, 3]);
        let root = tree.root();
        tree.node_mut(root).as_leaf_mut().insert_at(3, 0, 0);
        tree.set_len(4);

        let violation = tree.validate().unwrap_err();
        assert_eq!(violation.rule, Rule::KeyOrder);
    }

    #[test]
    fn detects_key_outside_routed_range() {
        let mut tree = tree(4, 0..4);
        let root = tree.root();
        let left = child(&tree, root, 0);
        // Leaves are {0, 1} and {2, 3}; 5 belongs right of separator 2.
        tree.node_mut(left).as_leaf_mut().insert_at(2, 5, 5);
        tree.set_len(5);

        let violation = tree.validate().unwrap_err();
        assert_eq!(violation.rule, Rule::KeyRange);
        assert_eq!(violation.node, tree.node(left).id());
    }

    #[test]
    fn detects_uneven_leaf_depth() {
        let mut tree = tree(4, 0..4);
        let root = tree.root();
        let right = child(&tree, root, 1);

        // Push the right leaf {2, 3} one level down: {2} and {3} under a new
        // internal node, leaving {0, 1} at depth 1.
        tree.node_mut(right).as_leaf_mut().remove_at(1);
        let mut lower = LeafNode::new(NodeId(90), None);
        lower.insert_at(0, 3, 3);
        let lower = tree.alloc_node(Node::Leaf(lower));
        let mut middle = InternalNode::new(NodeId(91), Some(root));
        middle.push(2, right);
        middle.push(3, lower);
        let middle = tree.alloc_node(Node::Internal(middle));
        tree.node_mut(right).set_parent(Some(middle));
        tree.node_mut(lower).set_parent(Some(middle));
        tree.node_mut(root).as_internal_mut().remove_at(1);
        tree.node_mut(root).as_internal_mut().push(2, middle);

        let violation = tree.validate().unwrap_err();
        assert_eq!(violation.rule, Rule::LeafDepth);
        assert_eq!(violation.detail, "leaf at depth 2, expected 1");
    }
}
