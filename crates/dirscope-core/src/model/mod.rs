/// Data model for the dirscope scan tree.
///
/// Re-exports the arena-allocated tree structure and supporting types.
pub mod column;
pub mod node;
pub mod size;
pub mod tree;

pub use column::{compare, Column};
pub use node::{extension_of, Node, NodeIndex, NodeKind, NodeRef, Rect};
pub use tree::{FileTree, Totals, TreeError};
