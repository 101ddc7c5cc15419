//! B+-tree handle and bulk construction.
//!
//! A [`BTree`] is a root page index, the pager that owns its pages and a
//! tree-wide lock for the coarse locking mode. Bulk construction packs a
//! pre-sorted batch bottom-up: entries stream into leaves left to right,
//! then each level's `(max_key, page_index)` pairs stream into parents
//! until a level fits on a single page, which becomes the root. The root
//! page never moves afterwards; splits grow the tree in place.

use crate::btree::Cursor;
use crate::page::cell;
use crate::pager::{PageMut, Pager};
use crate::types::{LockMode, PageId, PageKind, HEADER_SIZE, PAGE_SIZE};
use log::debug;
use parking_lot::{RwLock, RwLockWriteGuard};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// An in-memory B+-tree mapping u64 keys to u64 values.
pub struct BTree {
    pub(crate) pager: Arc<Pager>,
    pub(crate) root: PageId,
    pub(crate) lock: RwLock<()>,
}

impl BTree {
    /// Bulk-build a tree from strictly increasing `keys` and their
    /// `values`. An empty batch produces an empty tree. Unsorted or
    /// duplicate keys violate the precondition and leave the tree
    /// unspecified.
    pub fn create(pager: Arc<Pager>, keys: &[u64], values: &[u64]) -> Self {
        assert_eq!(keys.len(), values.len());
        debug_assert!(
            keys.windows(2).all(|pair| pair[0] < pair[1]),
            "bulk input must be strictly increasing"
        );

        let entries: Vec<(u64, u64)> = keys.iter().copied().zip(values.iter().copied()).collect();
        let root = build_level(&pager, &entries, PageKind::Leaf);
        debug!("bulk build: {} entries, root page {}", entries.len(), root);

        Self {
            pager,
            root,
            lock: RwLock::new(()),
        }
    }

    /// The root page; fixed for the tree's lifetime.
    pub fn root(&self) -> PageId {
        self.root
    }

    /// Open a cursor. Under coarse locking this takes the tree lock
    /// (write mode for write cursors) until the cursor is dropped.
    pub fn cursor(&self, write: bool) -> Cursor<'_> {
        Cursor::new(self, write)
    }

    /// Per-operation write serialization for the per-page locking mode;
    /// coarse mode already excludes other cursors for the cursor's whole
    /// lifetime.
    pub(crate) fn op_lock(&self) -> Option<RwLockWriteGuard<'_, ()>> {
        match self.pager.mode() {
            LockMode::PerPage => Some(self.lock.write()),
            LockMode::Coarse => None,
        }
    }

    /// Snapshot the tree structure for diagnostics.
    pub fn export(&self) -> TreeNode {
        self.export_page(self.root)
    }

    fn export_page(&self, id: PageId) -> TreeNode {
        let (is_leaf, entries) = {
            let page = self.pager.read(id);
            let entries: Vec<(u64, u64)> =
                (0..page.n_slots()).map(|slot| page.read_cell(slot)).collect();
            (page.is_leaf(), entries)
        };

        if is_leaf {
            TreeNode {
                page_index: id.value(),
                is_leaf: true,
                keys: entries.iter().map(|&(key, _)| key).collect(),
                values: entries.iter().map(|&(_, value)| value).collect(),
                children: Vec::new(),
            }
        } else {
            TreeNode {
                page_index: id.value(),
                is_leaf: false,
                keys: entries.iter().map(|&(key, _)| key).collect(),
                values: Vec::new(),
                children: entries
                    .iter()
                    .map(|&(_, child)| self.export_page(PageId::new(child as u32)))
                    .collect(),
            }
        }
    }
}

/// Pack one level of `(key, value)` entries into pages and recurse over
/// the resulting separators until a single page remains.
fn build_level(pager: &Pager, entries: &[(u64, u64)], kind: PageKind) -> PageId {
    let mut level: Vec<(u64, PageId)> = Vec::new();
    let mut used = PAGE_SIZE; // forces a page for the first entry
    let mut current: Option<PageMut<'_>> = None;

    for &(key, value) in entries {
        let needed = cell::required_size(key, value) as usize + 2;
        if used + needed > PAGE_SIZE {
            drop(current.take());
            let id = pager.allocate(kind);
            current = Some(pager.write(id));
            level.push((key, id));
            used = HEADER_SIZE;
        }
        if let Some(page) = current.as_mut() {
            page.push_cell(key, value);
        }
        if let Some(last) = level.last_mut() {
            last.0 = key;
        }
        used += needed;
    }
    drop(current);

    match level.len() {
        0 => pager.allocate(PageKind::Leaf),
        1 => level[0].1,
        _ => {
            let separators: Vec<(u64, u64)> = level
                .iter()
                .map(|&(max_key, id)| (max_key, id.value() as u64))
                .collect();
            build_level(pager, &separators, PageKind::Internal)
        }
    }
}

/// One node of an exported tree snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TreeNode {
    /// Page index in the pager
    pub page_index: u32,
    /// Whether this is a leaf node
    pub is_leaf: bool,
    /// Keys in this node (separators on internal nodes)
    pub keys: Vec<u64>,
    /// Values (only for leaf nodes)
    pub values: Vec<u64>,
    /// Child nodes (only for internal nodes)
    pub children: Vec<TreeNode>,
}

impl fmt::Display for TreeNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[ ")?;
        if self.is_leaf {
            for (key, value) in self.keys.iter().zip(&self.values) {
                write!(f, "({}, {}) ", key, value)?;
            }
        } else {
            for (key, child) in self.keys.iter().zip(&self.children) {
                write!(f, "{} {} ", key, child)?;
            }
        }
        write!(f, "]")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::btree::checks::check_tree;

    fn pager() -> Arc<Pager> {
        Arc::new(Pager::new(2048, LockMode::PerPage))
    }

    #[test]
    fn test_empty_tree() {
        let tree = BTree::create(pager(), &[], &[]);
        let root = tree.pager.read(tree.root());
        assert!(root.is_leaf());
        assert_eq!(root.n_slots(), 0);
        drop(root);

        let mut cursor = tree.cursor(false);
        cursor.first_leaf();
        assert!(!cursor.next_entry());
        assert_eq!(check_tree(&tree), 0);
    }

    #[test]
    fn test_small_batch_fits_one_leaf() {
        let tree = BTree::create(pager(), &[1, 2, 3, 4, 5], &[10, 20, 30, 40, 50]);
        let root = tree.pager.read(tree.root());
        assert!(root.is_leaf());
        assert_eq!(root.n_slots(), 5);
        assert_eq!(root.read_cell(2), (3, 30));
        drop(root);
        assert_eq!(check_tree(&tree), 5);
    }

    #[test]
    fn test_large_batch_builds_levels() {
        let count = 20_000u64;
        let keys: Vec<u64> = (0..count).collect();
        let values: Vec<u64> = (0..count).map(|i| i * 3).collect();
        let tree = BTree::create(pager(), &keys, &values);

        let root = tree.pager.read(tree.root());
        assert!(!root.is_leaf());
        drop(root);
        assert_eq!(check_tree(&tree), count);

        let mut cursor = tree.cursor(false);
        assert!(cursor.move_to(12_345));
        assert_eq!(cursor.read_data().unwrap(), (12_345, 12_345 * 3));
    }

    #[test]
    fn test_bulk_pages_fill_near_capacity() {
        // uniform entries: key and value both two bytes wide
        let keys: Vec<u64> = (0..2000u64).map(|i| 256 + i).collect();
        let values: Vec<u64> = vec![256; 2000];
        let tree = BTree::create(pager(), &keys, &values);
        check_tree(&tree);

        // every leaf but the last is too full to take another entry
        let root = tree.pager.read(tree.root());
        assert!(!root.is_leaf());
        let per_entry = (3 + 2 + 2 + 2) as usize;
        for slot in 0..root.n_slots() - 1 {
            let (_, child) = root.read_cell(slot);
            let leaf = tree.pager.read(PageId::new(child as u32));
            assert!(leaf.total_size(true) + per_entry > PAGE_SIZE);
        }
    }

    #[test]
    fn test_export_snapshot_roundtrips_as_json() {
        let tree = BTree::create(pager(), &[1, 2, 3], &[10, 20, 30]);
        let node = tree.export();
        assert!(node.is_leaf);
        assert_eq!(node.keys, vec![1, 2, 3]);

        let json = serde_json::to_string(&node).unwrap();
        let back: TreeNode = serde_json::from_str(&json).unwrap();
        assert_eq!(back.values, vec![10, 20, 30]);
        assert_eq!(format!("{}", back), "[ (1, 10) (2, 20) (3, 30) ]");
    }
}
