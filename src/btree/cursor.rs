//! Cursor: positioning and traversal state for one tree walk.
//!
//! A cursor records the spine of its last descent: the page index and
//! slot taken at every level down to the current leaf. Navigation descends
//! hand-over-hand: the child's read lock is taken before the parent's is
//! released, and no page lock outlives the call that took it. Mutating
//! operations (in `insert`/`remove`) reuse the recorded spine to find the
//! ancestors they must update.

use crate::btree::BTree;
use crate::error::{IndexError, Result};
use crate::types::{LockMode, PageId, MAX_TREE_DEPTH};
use log::trace;
use parking_lot::{RwLockReadGuard, RwLockWriteGuard};

/// Tree-wide lock held for a cursor's lifetime under coarse locking.
enum TreeGuard<'t> {
    Read { _guard: RwLockReadGuard<'t, ()> },
    Write { _guard: RwLockWriteGuard<'t, ()> },
}

/// A cursor over a [`BTree`].
pub struct Cursor<'t> {
    pub(crate) tree: &'t BTree,
    /// Page indices from the root (level 0) down to the current leaf.
    pub(crate) path: [PageId; MAX_TREE_DEPTH],
    /// Slot taken within each page of `path`.
    pub(crate) indices: [u16; MAX_TREE_DEPTH],
    /// Number of internal levels above the leaf; `path[depth]` is the
    /// current leaf.
    pub(crate) depth: usize,
    pub(crate) write: bool,
    _guard: Option<TreeGuard<'t>>,
}

impl<'t> Cursor<'t> {
    pub(crate) fn new(tree: &'t BTree, write: bool) -> Self {
        let guard = match tree.pager.mode() {
            LockMode::Coarse => Some(if write {
                TreeGuard::Write {
                    _guard: tree.lock.write(),
                }
            } else {
                TreeGuard::Read {
                    _guard: tree.lock.read(),
                }
            }),
            LockMode::PerPage => None,
        };
        trace!("cursor: created (write = {})", write);
        Self {
            tree,
            path: [tree.root; MAX_TREE_DEPTH],
            indices: [0; MAX_TREE_DEPTH],
            depth: 0,
            write,
            _guard: guard,
        }
    }

    /// Whether this cursor may mutate the tree.
    pub fn is_write(&self) -> bool {
        self.write
    }

    /// Position the cursor at `key`, or at its insertion point when the
    /// key is absent. Returns whether an exact match was found.
    pub fn move_to(&mut self, key: u64) -> bool {
        let pager = &self.tree.pager;
        self.depth = 0;

        let mut page = pager.read(self.tree.root);
        while !page.is_leaf() {
            if page.n_slots() == 0 {
                // an emptied-out internal root; the tree holds nothing
                self.path[self.depth] = page.page_index();
                self.indices[self.depth] = 0;
                return false;
            }
            debug_assert!(self.depth + 1 < MAX_TREE_DEPTH);
            self.path[self.depth] = page.page_index();

            let (_, mut slot) = page.binary_search(key);
            if slot >= page.n_slots() {
                // past the last separator: stay on the rightmost child so
                // appends land where they belong
                slot = page.n_slots() - 1;
            }
            self.indices[self.depth] = slot;
            self.depth += 1;

            let (_, child) = page.read_cell(slot);
            page = pager.read(PageId::new(child as u32));
        }

        self.path[self.depth] = page.page_index();
        let (found, slot) = page.binary_search(key);
        self.indices[self.depth] = slot;
        found
    }

    /// Position the cursor at the first entry of the leftmost leaf.
    pub fn first_leaf(&mut self) {
        let pager = &self.tree.pager;
        self.depth = 0;

        let mut page = pager.read(self.tree.root);
        while !page.is_leaf() && page.n_slots() > 0 {
            self.path[self.depth] = page.page_index();
            self.indices[self.depth] = 0;
            self.depth += 1;

            let (_, child) = page.read_cell(0);
            page = pager.read(PageId::new(child as u32));
        }
        self.path[self.depth] = page.page_index();
        self.indices[self.depth] = 0;
    }

    /// Advance to the next entry in key order, walking up the recorded
    /// spine and down the next sibling when the current leaf runs out.
    /// Returns false iff the cursor already sat on the last entry.
    pub fn next_entry(&mut self) -> bool {
        let pager = &self.tree.pager;
        {
            let page = pager.read(self.path[self.depth]);
            if self.indices[self.depth] + 1 < page.n_slots() {
                self.indices[self.depth] += 1;
                return true;
            }
        }

        let mut level = self.depth;
        while level > 0 {
            level -= 1;
            let sibling = {
                let parent = pager.read(self.path[level]);
                let slot = self.indices[level];
                if slot + 1 < parent.n_slots() {
                    Some(parent.read_cell(slot + 1).1)
                } else {
                    None
                }
            };

            let Some(child) = sibling else { continue };
            self.indices[level] += 1;

            // descend to the leftmost leaf under the sibling
            let mut page = pager.read(PageId::new(child as u32));
            level += 1;
            while !page.is_leaf() {
                self.path[level] = page.page_index();
                self.indices[level] = 0;
                level += 1;

                let (_, grandchild) = page.read_cell(0);
                page = pager.read(PageId::new(grandchild as u32));
            }
            self.path[level] = page.page_index();
            self.indices[level] = 0;
            self.depth = level;
            return true;
        }
        false
    }

    /// Read the entry under the cursor.
    pub fn read_data(&self) -> Result<(u64, u64)> {
        let page = self.tree.pager.read(self.path[self.depth]);
        if !page.is_leaf() {
            return Err(IndexError::NotLeaf);
        }
        if self.indices[self.depth] >= page.n_slots() {
            return Err(IndexError::NoEntry);
        }
        Ok(page.read_cell(self.indices[self.depth]))
    }
}
