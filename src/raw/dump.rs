use alloc::collections::VecDeque;
use alloc::string::String;
use core::fmt::{Debug, Write};

use super::node::Node;
use super::raw_tree::RawTree;

impl<K: Debug, V> RawTree<K, V> {
    /// Renders the tree level by level, one line per level.
    ///
    /// Each node prints as `N<id>|root|` or `N<id>|P<parent id>|` followed by
    /// its keys, each closed by `|`. An internal node's first key is the
    /// placeholder of its first child.
    pub(crate) fn dump(&self) -> String {
        let mut out = String::new();
        let mut level = VecDeque::from([self.root()]);

        while !level.is_empty() {
            if !out.is_empty() {
                out.push('\n');
            }
            for i in 0..level.len() {
                let Some(handle) = level.pop_front() else { break };
                let node = self.node(handle);
                if i > 0 {
                    out.push_str("  ");
                }

                // Writing into a `String` cannot fail.
                let _ = write!(out, "{}|", node.id());
                match node.parent() {
                    Some(parent) => {
                        let _ = write!(out, "P{}|", self.node(parent).id().0);
                    }
                    None => out.push_str("root|"),
                }
                for key in node.keys() {
                    let _ = write!(out, "{key:?}|");
                }

                if let Node::Internal(internal) = node {
                    level.extend(internal.children().iter().copied());
                }
            }
        }
        out
    }
}
