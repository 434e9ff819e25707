mod arena;
mod dump;
mod handle;
mod node;
mod raw_tree;
mod validate;

pub use handle::NodeId;
pub(crate) use raw_tree::RawTree;
