//! B+-tree layer: tree handle, cursor and the insert/remove algorithms.

mod cursor;
mod insert;
mod remove;
mod tree;

pub use cursor::Cursor;
pub use tree::{BTree, TreeNode};
