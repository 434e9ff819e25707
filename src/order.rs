use core::fmt;

use crate::error::{Error, Result};

/// The branching factor of a [`BPlusTree`](crate::BPlusTree).
///
/// An order `B` bounds every node:
///
/// | node            | minimum          | maximum     |
/// |-----------------|------------------|-------------|
/// | root leaf       | 0 keys           | `B - 1` keys |
/// | leaf            | `⌈B/2⌉ - 1` keys | `B - 1` keys |
/// | root internal   | 2 children       | `B` children |
/// | internal        | `⌈B/2⌉` children | `B` children |
///
/// A leaf splits when it reaches `B` keys and an internal node when it reaches
/// `B + 1` children.
///
/// # Examples
///
/// ```
/// use bplus_tree::Order;
///
/// let order = Order::new(5).unwrap();
/// assert_eq!(order.get(), 5);
/// assert!(Order::new(3).is_err());
/// ```
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Order(usize);

impl Order {
    /// Smallest order for which a split always leaves both halves within bounds.
    pub const MIN: usize = 4;

    /// Order used by [`BPlusTree::default`](crate::BPlusTree::default).
    pub const DEFAULT: Order = Order(128);

    /// Validates `order`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidOrder`] if `order < Order::MIN`.
    pub fn new(order: usize) -> Result<Self> {
        if order < Self::MIN {
            return Err(Error::InvalidOrder { order });
        }
        Ok(Self(order))
    }

    /// Returns the branching factor.
    #[must_use]
    pub const fn get(self) -> usize {
        self.0
    }

    pub(crate) const fn max_leaf_keys(self) -> usize {
        self.0 - 1
    }

    pub(crate) const fn min_leaf_keys(self) -> usize {
        self.0.div_ceil(2) - 1
    }

    pub(crate) const fn max_children(self) -> usize {
        self.0
    }

    pub(crate) const fn min_children(self) -> usize {
        self.0.div_ceil(2)
    }
}

impl Default for Order {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl TryFrom<usize> for Order {
    type Error = Error;

    fn try_from(order: usize) -> Result<Self> {
        Self::new(order)
    }
}

impl From<Order> for usize {
    fn from(order: Order) -> Self {
        order.0
    }
}

impl fmt::Display for Order {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}
