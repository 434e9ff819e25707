//! An in-memory B+Tree index for Rust.
//!
//! This crate provides [`BPlusTree`], an ordered key-value index with a
//! configurable branching factor ([`Order`]). Values live only in the leaves;
//! internal nodes hold separator keys that route each lookup to one leaf.
//!
//! # Example
//!
//! ```
//! use bplus_tree::{check_invariants, BPlusTree};
//!
//! let mut index = BPlusTree::new(4)?;
//! for (key, value) in [(1, "a"), (2, "b"), (3, "c"), (4, "d")] {
//!     index.insert(key, value);
//! }
//!
//! assert_eq!(index.find(&3), Some(&"c"));
//! assert_eq!(index.key_count(), 4);
//!
//! // Inserting an existing key overwrites it.
//! assert_eq!(index.insert(3, "C"), Some("c"));
//! assert_eq!(index.key_count(), 4);
//!
//! assert_eq!(index.remove(&1), Some("a"));
//! check_invariants(&index)?;
//! # Ok::<(), bplus_tree::Error>(())
//! ```
//!
//! # Features
//!
//! - **`no_std` compatible** - Only requires `alloc`, no standard library dependency
//! - **Self-balancing** - Splits on overflow; borrows from or merges with a sibling on underflow
//! - **Checkable** - [`check_invariants`] verifies every structural rule and reports the first [`InvariantViolation`]
//! - **Inspectable** - [`BPlusTree::dump`] renders the tree level by level
//!
//! # Implementation
//!
//! Nodes are stored in a slot arena and linked by compact handles, children to
//! parent as well as parent to children. Structural changes are logged through
//! [`tracing`] at `trace` level.

#![no_std]
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

extern crate alloc;

mod error;
mod order;
mod raw;

pub mod bplus_tree;

pub use bplus_tree::{BPlusTree, check_invariants};
pub use error::{Error, InvariantViolation, Result, Rule};
pub use order::Order;
pub use raw::NodeId;
