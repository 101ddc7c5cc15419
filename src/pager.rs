//! In-memory pager: owns every page and hands out locked references.
//!
//! The backing array is sized once at construction; allocation either
//! extends into never-used slots or pops the freelist of reclaimed pages,
//! whose successor links live in the freed pages' own `slots[0]` (index+1
//! encoded, 0 ends the chain). Running out of never-used slots with an
//! empty freelist is fatal; callers size the pager for their workload.

use crate::page::Page;
use crate::types::{LockMode, PageId, PageKind};
use log::trace;
use parking_lot::{Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Shared (read-locked) reference to a page.
pub type PageRef<'a> = RwLockReadGuard<'a, Page>;

/// Exclusive (write-locked) reference to a page.
pub type PageMut<'a> = RwLockWriteGuard<'a, Page>;

struct AllocState {
    /// Head of the freelist of reclaimed pages, index+1 encoded.
    first_free_page: u16,
    /// Pages handed out at least once; the high-water mark of the array.
    page_count: u32,
    /// Pages currently allocated to a tree.
    active_pages: u32,
}

/// Owner of the page array.
pub struct Pager {
    pages: Box<[RwLock<Page>]>,
    state: Mutex<AllocState>,
    mode: LockMode,
}

impl Pager {
    /// Build a pager with room for `capacity` pages.
    ///
    /// The freelist successor encoding caps `capacity` at `u16::MAX`
    /// pages (256MB of 4KB pages).
    pub fn new(capacity: usize, mode: LockMode) -> Self {
        assert!(capacity > 0, "pager needs at least one page");
        assert!(
            capacity <= u16::MAX as usize,
            "pager capacity is limited to {} pages",
            u16::MAX
        );
        let pages = (0..capacity)
            .map(|i| RwLock::new(Page::new(PageId::new(i as u32))))
            .collect::<Vec<_>>()
            .into_boxed_slice();
        Self {
            pages,
            state: Mutex::new(AllocState {
                first_free_page: 0,
                page_count: 0,
                active_pages: 0,
            }),
            mode,
        }
    }

    pub fn mode(&self) -> LockMode {
        self.mode
    }

    /// Total pages the pager can ever hand out.
    pub fn capacity(&self) -> usize {
        self.pages.len()
    }

    /// Pages handed out at least once (freed pages included).
    pub fn page_count(&self) -> u32 {
        self.state.lock().page_count
    }

    /// Pages currently in use by a tree.
    pub fn active_pages(&self) -> u32 {
        self.state.lock().active_pages
    }

    /// Allocate a page of the given kind, reusing a reclaimed page when
    /// one is available and extending into the array otherwise.
    pub fn allocate(&self, kind: PageKind) -> PageId {
        let mut state = self.state.lock();

        let index = if state.first_free_page == 0 {
            let index = state.page_count;
            assert!(
                (index as usize) < self.pages.len(),
                "pager capacity exhausted ({} pages)",
                self.pages.len()
            );
            state.page_count += 1;
            trace!("pager: extend to page {}", index);
            index
        } else {
            let index = (state.first_free_page - 1) as u32;
            state.first_free_page = self.pages[index as usize].read().free_successor();
            trace!("pager: reuse free page {}", index);
            index
        };

        state.active_pages += 1;
        self.pages[index as usize].write().reset(kind);
        PageId::new(index)
    }

    /// Return a page to the freelist.
    pub fn free(&self, id: PageId) {
        let mut state = self.state.lock();
        trace!(
            "pager: free page {}, active = {}",
            id,
            state.active_pages - 1
        );
        self.pages[id.index()].write().recycle(state.first_free_page);
        state.first_free_page = id.value() as u16 + 1;
        state.active_pages -= 1;
    }

    /// Take the page's lock in read mode.
    pub fn read(&self, id: PageId) -> PageRef<'_> {
        self.pages[id.index()].read()
    }

    /// Take the page's lock in write mode.
    pub fn write(&self, id: PageId) -> PageMut<'_> {
        self.pages[id.index()].write()
    }
}
