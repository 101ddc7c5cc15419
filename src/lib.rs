//! # B+-tree index
//!
//! An in-memory ordered index mapping u64 keys to u64 values, organized
//! as a page-oriented B+-tree over a fixed pool of 4KB pages.
//!
//! ## Architecture
//!
//! - **Types** (`types`): page identifiers and the fixed-width integer
//!   codec cells are built from
//! - **Page layer** (`page`): slotted page format with bump-allocated
//!   cells, a per-page free-cell chain and in-page compaction
//! - **Pager** (`pager`): owns every page, allocates by extending or
//!   reusing reclaimed pages, hands out lock guards
//! - **B-tree layer** (`btree`): bulk build, cursor navigation, insert
//!   with node split, delete with node merge
//!
//! ## Usage
//!
//! ```rust
//! use btree_index::{BTree, LockMode, Pager};
//! use std::sync::Arc;
//!
//! let pager = Arc::new(Pager::new(64, LockMode::Coarse));
//! let tree = BTree::create(pager, &[1, 2, 3], &[10, 20, 30]);
//!
//! let mut cursor = tree.cursor(true);
//! cursor.move_to(4);
//! cursor.insert(4, 40);
//!
//! assert!(cursor.move_to(2));
//! assert_eq!(cursor.read_data().unwrap(), (2, 20));
//! ```
//!
//! The store is volatile: there is no disk I/O, durability or recovery.

pub mod btree;
pub mod error;
pub mod page;
pub mod pager;
pub mod types;

pub use btree::{BTree, Cursor, TreeNode};
pub use error::{IndexError, Result};
pub use page::Page;
pub use pager::Pager;
pub use types::{LockMode, PageId, PageKind, HEADER_SIZE, MAX_TREE_DEPTH, MIN_CELL_SIZE, PAGE_SIZE};
