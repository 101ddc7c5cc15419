//! Deletion and node merging.
//!
//! Removing a cell may ripple upward: when the deleted key was the
//! page's max, the parent separator is re-keyed (or removed outright
//! when the page emptied, freeing the page); afterwards the page tries
//! to merge with one sibling (right first, left as the fallback), and a
//! successful merge removes a separator from the parent, which may
//! cascade the same way. The root is never merged or freed, so a tree
//! deleted down to nothing keeps its (possibly internal, empty) root.

use crate::btree::Cursor;
use crate::types::{PageId, HEADER_SIZE, PAGE_SIZE};
use log::{debug, trace};

impl<'t> Cursor<'t> {
    /// Remove the entry under the cursor. Returns false without touching
    /// the tree on a read cursor, off-leaf position or exhausted slot;
    /// callers position the cursor with a successful
    /// [`Cursor::move_to`] first.
    pub fn remove(&mut self) -> bool {
        if !self.write {
            return false;
        }
        let _op = self.tree.op_lock();

        {
            let page = self.tree.pager.read(self.path[self.depth]);
            if !page.is_leaf() || self.indices[self.depth] >= page.n_slots() {
                return false;
            }
        }

        let slot = self.indices[self.depth];
        self.remove_cell(self.depth, slot);
        true
    }

    /// Delete the cell at `slot` of the page recorded for `depth`,
    /// maintaining ancestor separators and attempting at most one merge.
    pub(crate) fn remove_cell(&mut self, depth: usize, slot: u16) {
        let pager = &self.tree.pager;
        let page_id = self.path[depth];

        let (deleted_key, slots_left, new_max) = {
            let mut page = pager.write(page_id);
            let (deleted_key, _) = page.read_cell(slot);
            page.clean_cell(slot, true);
            (deleted_key, page.n_slots(), page.max_key())
        };
        trace!(
            "remove: key {} from page {} (depth {})",
            deleted_key,
            page_id,
            depth
        );

        if depth == 0 {
            return;
        }

        let separator = {
            let parent = pager.read(self.path[depth - 1]);
            parent.read_cell(self.indices[depth - 1]).0
        };

        if separator == deleted_key {
            if slots_left == 0 {
                debug!("remove: page {} emptied, dropping its separator", page_id);
                let parent_slot = self.indices[depth - 1];
                self.remove_cell(depth - 1, parent_slot);
                pager.free(page_id);
                return;
            } else if let Some(max) = new_max {
                // the new max is never wider than the deleted key, so the
                // separator rewrite always fits in place
                self.replace_key_in_parent(depth, max);
            }
        }

        let (right_sibling, left_sibling) = {
            let parent = pager.read(self.path[depth - 1]);
            let parent_slot = self.indices[depth - 1];
            let right = if parent_slot + 1 < parent.n_slots() {
                Some(PageId::new(parent.read_cell(parent_slot + 1).1 as u32))
            } else {
                None
            };
            let left = if parent_slot > 0 {
                Some(PageId::new(parent.read_cell(parent_slot - 1).1 as u32))
            } else {
                None
            };
            (right, left)
        };

        let mut merged = false;
        if let Some(right) = right_sibling {
            merged = self.merge(depth, page_id, right);
        }
        if !merged {
            if let Some(left) = left_sibling {
                self.merge(depth, left, page_id);
            }
        }
    }

    /// Fold `right_id` into `left_id` when their live content fits one
    /// page. On success the right page is freed, its separator removed
    /// from the parent and the left separator re-keyed with the merged
    /// max; the cursor is rewritten onto the left page when it sat on the
    /// right one.
    fn merge(&mut self, depth: usize, left_id: PageId, right_id: PageId) -> bool {
        debug_assert!(depth > 0);
        let pager = &self.tree.pager;

        {
            let left = pager.read(left_id);
            let right = pager.read(right_id);
            if HEADER_SIZE + left.relevant_size(false) + right.relevant_size(false) >= PAGE_SIZE {
                trace!("merge: {} + {} would overflow, skipping", left_id, right_id);
                return false;
            }
        }

        let (left_slots_before, new_max) = {
            let mut left = pager.write(left_id);
            let mut right = pager.write(right_id);
            let before = left.n_slots();
            let new_max = left.absorb(&mut right);
            (before, new_max)
        };
        debug!("merge: {} absorbed {} (depth {})", left_id, right_id, depth);

        if self.path[depth] == right_id {
            self.path[depth] = left_id;
            self.indices[depth] += left_slots_before;
            self.indices[depth - 1] -= 1;
        }

        pager.free(right_id);

        let right_separator = self.indices[depth - 1] + 1;
        self.remove_cell(depth - 1, right_separator);
        self.replace_key_in_parent(depth, new_max);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::btree::checks::check_tree;
    use crate::btree::BTree;
    use crate::pager::Pager;
    use crate::types::LockMode;
    use std::sync::Arc;

    fn tree_of(keys: &[u64], values: &[u64]) -> BTree {
        let pager = Arc::new(Pager::new(2048, LockMode::PerPage));
        BTree::create(pager, keys, values)
    }

    fn remove_key(tree: &BTree, key: u64) -> bool {
        let mut cursor = tree.cursor(true);
        cursor.move_to(key) && cursor.remove()
    }

    fn contains(tree: &BTree, key: u64) -> bool {
        tree.cursor(false).move_to(key)
    }

    #[test]
    fn test_remove_from_single_leaf() {
        let keys: Vec<u64> = (0..15).collect();
        let values: Vec<u64> = (0..15).map(|i| 10_000 - i).collect();
        let tree = tree_of(&keys, &values);

        for key in [11u64, 22, 33, 44, 55, 66, 77, 88] {
            let removed = remove_key(&tree, key);
            assert_eq!(removed, key == 11, "only 11 is in range");
        }
        assert_eq!(check_tree(&tree), 14);

        let mut cursor = tree.cursor(false);
        cursor.first_leaf();
        assert_eq!(cursor.read_data().unwrap(), (0, 10_000));
    }

    #[test]
    fn test_remove_is_idempotent() {
        let tree = tree_of(&[1, 2, 3], &[1, 2, 3]);
        assert!(remove_key(&tree, 2));
        assert!(!remove_key(&tree, 2));
        assert!(!contains(&tree, 2));
        assert_eq!(check_tree(&tree), 2);
    }

    #[test]
    fn test_remove_missing_key_leaves_tree_unchanged() {
        let keys: Vec<u64> = (0..5000u64).map(|i| i * 2).collect();
        let values = keys.clone();
        let tree = tree_of(&keys, &values);

        assert!(!remove_key(&tree, 4001));
        assert_eq!(check_tree(&tree), 5000);
    }

    #[test]
    fn test_remove_every_second_key() {
        let count = 10_000u64;
        let keys: Vec<u64> = (0..count).collect();
        let values = keys.clone();
        let tree = tree_of(&keys, &values);

        for key in (0..count).step_by(2) {
            assert!(remove_key(&tree, key));
        }
        assert_eq!(check_tree(&tree), count / 2);

        let mut cursor = tree.cursor(false);
        cursor.first_leaf();
        let mut expected = 1u64;
        loop {
            assert_eq!(cursor.read_data().unwrap().0, expected);
            expected += 2;
            if !cursor.next_entry() {
                break;
            }
        }
        assert_eq!(expected, count + 1);
    }

    #[test]
    fn test_remove_max_key_rewrites_separators() {
        let count = 3000u64;
        let keys: Vec<u64> = (0..count).collect();
        let values = keys.clone();
        let tree = tree_of(&keys, &values);

        assert!(remove_key(&tree, count - 1));
        let root = tree.pager.read(tree.root());
        assert_eq!(root.max_key(), Some(count - 2));
        drop(root);
        assert_eq!(check_tree(&tree), count - 1);
    }

    #[test]
    fn test_merges_reclaim_pages() {
        let count = 20_000u64;
        let keys: Vec<u64> = (0..count).collect();
        let values = keys.clone();
        let tree = tree_of(&keys, &values);
        let pages_full = tree.pager.active_pages();

        // thin the tree out; merges must fold pages back together
        for key in 0..count {
            if key % 8 != 0 {
                assert!(remove_key(&tree, key));
            }
        }
        assert_eq!(check_tree(&tree), count / 8);
        assert!(
            tree.pager.active_pages() < pages_full / 2,
            "merges reclaimed pages: {} -> {}",
            pages_full,
            tree.pager.active_pages()
        );
    }

    #[test]
    fn test_delete_everything_collapses_to_the_root() {
        let count = 5000u64;
        let keys: Vec<u64> = (0..count).collect();
        let values = keys.clone();
        let tree = tree_of(&keys, &values);
        assert!(tree.pager.active_pages() > 1);

        for key in 0..count {
            assert!(remove_key(&tree, key), "key {}", key);
        }
        assert_eq!(check_tree(&tree), 0);
        assert_eq!(tree.pager.active_pages(), 1, "only the root survives");

        let mut cursor = tree.cursor(false);
        cursor.first_leaf();
        assert!(!cursor.next_entry());
        assert!(!cursor.move_to(0));
    }

    #[test]
    fn test_randomized_churn_preserves_invariants() {
        use rand::rngs::StdRng;
        use rand::{Rng, SeedableRng};

        let mut rng = StdRng::seed_from_u64(0xB7EE);
        let tree = tree_of(&[], &[]);
        let mut live = std::collections::BTreeSet::new();

        for round in 0..20_000u64 {
            let key = rng.gen_range(0..2_000u64);
            if rng.gen_bool(0.6) {
                let mut cursor = tree.cursor(true);
                cursor.move_to(key);
                cursor.insert(key, round);
                live.insert(key);
            } else {
                let removed = remove_key(&tree, key);
                assert_eq!(removed, live.remove(&key));
            }
        }
        assert_eq!(check_tree(&tree), live.len() as u64);

        let mut cursor = tree.cursor(false);
        cursor.first_leaf();
        let mut seen = Vec::new();
        if !live.is_empty() {
            loop {
                seen.push(cursor.read_data().unwrap().0);
                if !cursor.next_entry() {
                    break;
                }
            }
        }
        assert_eq!(seen, live.iter().copied().collect::<Vec<_>>());
    }
}
