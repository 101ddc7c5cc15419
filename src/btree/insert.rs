//! Insertion and node splitting.
//!
//! `insert_cell` is the write primitive for every level: the public
//! insert uses it on the leaf, separator maintenance uses it on
//! ancestors, and splits use it to place the new sibling's separator.
//! When a page overflows, the cell is inserted again after a split at the
//! (possibly shifted) depth; when a write changes a page's max key, the
//! change propagates up the recorded spine through
//! `replace_key_in_parent`. Page locks are scoped tightly: no lock is
//! held across a recursive cascade step, so the cascade never re-locks a
//! page it still holds.

use crate::btree::Cursor;
use crate::page::CellWrite;
use crate::types::MAX_TREE_DEPTH;
use log::debug;

impl<'t> Cursor<'t> {
    /// Insert or overwrite `key`, which the cursor must already be
    /// positioned on (see [`Cursor::move_to`]). A read cursor ignores the
    /// call, as does a cursor not sitting on a leaf.
    pub fn insert(&mut self, key: u64, value: u64) {
        if !self.write {
            return;
        }
        let _op = self.tree.op_lock();

        let new_slot = {
            let page = self.tree.pager.read(self.path[self.depth]);
            if !page.is_leaf() {
                return;
            }
            let slot = self.indices[self.depth];
            !(slot < page.n_slots() && page.read_cell(slot).0 == key)
        };

        self.insert_cell(self.depth, key, value, new_slot);
    }

    /// Write a cell at the cursor's recorded slot for `depth`, splitting
    /// and retrying on overflow and propagating a changed max key to the
    /// parent separator.
    pub(crate) fn insert_cell(&mut self, mut depth: usize, key: u64, value: u64, new_slot: bool) {
        loop {
            let outcome = {
                let mut page = self.tree.pager.write(self.path[depth]);
                page.try_insert_cell(self.indices[depth], key, value, new_slot)
            };

            match outcome {
                CellWrite::Done { old_max, new_max } => {
                    if old_max != Some(new_max) {
                        self.replace_key_in_parent(depth, new_max);
                    }
                    return;
                }
                CellWrite::Overflow => {
                    debug!(
                        "insert: page {} full at depth {}, splitting",
                        self.path[depth], depth
                    );
                    let before = self.depth;
                    self.split(depth);
                    // a root split shifts every recorded level down
                    depth += self.depth - before;
                }
            }
        }
    }

    /// Rewrite the parent separator for the subtree at `depth` with that
    /// subtree's new max key, cascading further up whenever the parent's
    /// own max changes. No-op at the root.
    pub(crate) fn replace_key_in_parent(&mut self, depth: usize, new_key: u64) {
        if depth == 0 {
            return;
        }
        let child = self.path[depth].value() as u64;
        self.insert_cell(depth - 1, new_key, child, false);
    }

    fn split(&mut self, depth: usize) {
        if depth == 0 {
            self.split_root();
        } else {
            self.split_inner(depth);
        }
    }

    /// Split the root in place: its content moves into two fresh
    /// children and the root page itself becomes their parent, keeping
    /// the tree's root index stable. Every cursor level shifts down one.
    fn split_root(&mut self) {
        assert!(
            self.depth + 1 < MAX_TREE_DEPTH,
            "tree exceeded its maximum depth of {}",
            MAX_TREE_DEPTH
        );
        let pager = &self.tree.pager;
        let root_id = self.path[0];

        let (left_id, right_id, mid) = {
            let mut root = pager.write(root_id);
            let left_id = pager.allocate(root.kind());
            let right_id = pager.allocate(root.kind());
            let mut left = pager.write(left_id);
            let mut right = pager.write(right_id);

            let (mid, left_max, right_max) = root.split_root_into(&mut left, &mut right);
            root.push_cell(left_max, left_id.value() as u64);
            root.push_cell(right_max, right_id.value() as u64);
            (left_id, right_id, mid)
        };
        debug!("split: root {} into {} + {}", root_id, left_id, right_id);

        let transfer_right = self.indices[0] >= mid;
        for level in (0..=self.depth).rev() {
            self.path[level + 1] = self.path[level];
            self.indices[level + 1] = self.indices[level];
        }
        self.depth += 1;

        self.path[0] = root_id;
        if transfer_right {
            self.indices[0] = 1;
            self.path[1] = right_id;
            self.indices[1] -= mid;
        } else {
            self.indices[0] = 0;
            self.path[1] = left_id;
        }
    }

    /// Split a non-root page: it keeps the lower half and a fresh right
    /// sibling takes the rest. The parent separator is re-keyed to the
    /// left half's max and the sibling's separator inserted after it;
    /// either step may cascade further splits, shifting the recorded
    /// depth.
    fn split_inner(&mut self, depth: usize) {
        let pager = &self.tree.pager;
        let current_id = self.path[depth];

        let (right_id, mid, left_max, right_max) = {
            let mut current = pager.write(current_id);
            let right_id = pager.allocate(current.kind());
            let mut right = pager.write(right_id);
            let (mid, left_max, right_max) = current.split_to_right(&mut right);
            (right_id, mid, left_max, right_max)
        };
        debug!("split: page {} grew sibling {}", current_id, right_id);

        let transfer_right = self.indices[depth] >= mid;

        let before = self.depth;
        self.replace_key_in_parent(depth, left_max);
        let depth = depth + (self.depth - before);

        self.indices[depth - 1] += 1;
        let before = self.depth;
        self.insert_cell(depth - 1, right_max, right_id.value() as u64, true);
        let depth = depth + (self.depth - before);

        if transfer_right {
            self.indices[depth] -= mid;
            self.path[depth] = right_id;
        } else {
            self.indices[depth - 1] -= 1;
        }
    }
}
