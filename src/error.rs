//! Error types for the B+Tree.

use alloc::string::String;
use core::fmt;

use thiserror::Error;

use crate::raw::NodeId;

/// Result type alias for tree operations.
pub type Result<T> = core::result::Result<T, Error>;

/// Errors reported by the tree.
///
/// A missing key is not an error: lookups and removals return `None`.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum Error {
    /// The requested order is below [`Order::MIN`](crate::Order::MIN).
    #[error("invalid order {order}: a B+Tree needs an order of at least 4")]
    InvalidOrder {
        /// The rejected order.
        order: usize,
    },

    /// The invariant checker found a structural violation.
    #[error(transparent)]
    Invariant(#[from] InvariantViolation),
}

/// A structural rule checked by [`check_invariants`](crate::check_invariants).
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum Rule {
    /// The root must have no parent.
    RootLink,
    /// Key, value and child counts must match the node kind.
    NodeShape,
    /// All leaves sit at the same depth.
    LeafDepth,
    /// Occupancy stays within the bounds set by the order.
    FillBounds,
    /// Keys are strictly ascending within a node.
    KeyOrder,
    /// Every key lies in the range its ancestors route to it.
    KeyRange,
    /// A child's parent link points at the node that lists it.
    ParentLink,
    /// The tree's key count equals the number of leaf entries.
    KeyCount,
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Rule::RootLink => "root link",
            Rule::NodeShape => "node shape",
            Rule::LeafDepth => "leaf depth",
            Rule::FillBounds => "fill bounds",
            Rule::KeyOrder => "key order",
            Rule::KeyRange => "key range",
            Rule::ParentLink => "parent link",
            Rule::KeyCount => "key count",
        };
        f.write_str(name)
    }
}

/// The first structural violation found in a tree.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
#[error("{rule} violated at node {node}: {detail}")]
pub struct InvariantViolation {
    /// The offending node.
    pub node: NodeId,
    /// The rule that does not hold.
    pub rule: Rule,
    /// What was observed.
    pub detail: String,
}

impl InvariantViolation {
    pub(crate) fn new(node: NodeId, rule: Rule, detail: impl Into<String>) -> Self {
        Self {
            node,
            rule,
            detail: detail.into(),
        }
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use alloc::string::ToString;

    #[test]
    fn display_invalid_order() {
        let err = Error::InvalidOrder { order: 3 };
        assert_eq!(err.to_string(), "invalid order 3: a B+Tree needs an order of at least 4");
    }

    #[test]
    fn display_violation() {
        let violation = InvariantViolation::new(NodeId(12), Rule::FillBounds, "leaf holds 0 keys, expected 1..=3");
        assert_eq!(violation.to_string(), "fill bounds violated at node N12: leaf holds 0 keys, expected 1..=3");

        let err: Error = violation.clone().into();
        assert_eq!(err, Error::Invariant(violation));
        assert_eq!(err.to_string(), "fill bounds violated at node N12: leaf holds 0 keys, expected 1..=3");
    }
}
