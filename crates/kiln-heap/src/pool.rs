//! First-fit free-list allocator.
//!
//! [`Pool`] tracks extents of the address space as [`Page`]s. Allocation
//! scans for the first free page that fits and splits the tail off it;
//! freeing merges the page with free neighbours so that no two adjacent
//! pages are ever both free. Both operations are O(pages), which suits
//! small bounded pools rather than millions of live allocations.
//!
//! The pool tracks extents only; the bytes themselves live in the
//! [`AddressSpace`](kiln_core::AddressSpace) owned by
//! [`Memory`](crate::Memory).

use kiln_core::{align_up, MemError, Ptr, NULL_GUARD};

use crate::page::{Page, PageList};

/// Free-list allocator over `[0, size)`.
///
/// The first [`NULL_GUARD`] bytes form a permanently claimed page, so no
/// allocation ever returns offset 0.
pub struct Pool {
    pages: PageList,
    total: u32,
    reserved: u32,
}

impl Pool {
    /// Create a pool with `capacity` allocatable bytes (rounded up to 8).
    ///
    /// The pool covers `align8(capacity) + NULL_GUARD` bytes in total.
    ///
    /// # Panics
    ///
    /// Panics if the total does not fit in 32 bits.
    pub fn new(capacity: u32) -> Self {
        let usable = align_up(capacity as usize, 8);
        let total = u32::try_from(usable + NULL_GUARD)
            .expect("pool size exceeds the 32-bit address space");
        let guard = NULL_GUARD as u32;

        let mut pages = PageList::new();
        let head = pages.insert_after(None, Page::claimed(0, guard));
        if total > guard {
            pages.insert_after(Some(head), Page::free(guard, total - guard));
        }
        Self {
            pages,
            total,
            reserved: 0,
        }
    }

    /// Claim `n` bytes with first-fit placement.
    ///
    /// Returns `None` for `n == 0` or when no free page is large enough;
    /// the page list is unchanged in both cases.
    pub fn allocate(&mut self, n: u32) -> Option<Ptr> {
        if n == 0 {
            return None;
        }
        let mut cursor = self.pages.head();
        while let Some(id) = cursor {
            let page = *self.pages.get(id);
            if !page.claimed && page.size >= n {
                let claimed = if page.size > n {
                    // Split: the tail becomes the allocation, the head
                    // stays free in place.
                    self.pages.get_mut(id).size -= n;
                    let tail = Page::claimed(page.end() - n, n);
                    log::trace!("pool split {page} -> claim {tail}");
                    self.pages.insert_after(Some(id), tail)
                } else {
                    self.pages.get_mut(id).claimed = true;
                    id
                };
                self.reserved += n;
                return Some(Ptr(self.pages.get(claimed).offset));
            }
            cursor = self.pages.next(id);
        }
        None
    }

    /// Release the allocation starting at `ptr`.
    ///
    /// Fails with [`MemError::BadPointer`] if `ptr` is not the start of a
    /// claimed page (null, interior, already freed, or never allocated);
    /// the pool is unchanged in that case.
    pub fn free(&mut self, ptr: Ptr) -> Result<(), MemError> {
        if ptr.is_null() {
            return Err(MemError::BadPointer { ptr });
        }
        let mut prev = None;
        let mut cursor = self.pages.head();
        let found = loop {
            let Some(id) = cursor else {
                break None;
            };
            let page = self.pages.get(id);
            if page.offset == ptr.0 {
                break Some(id);
            }
            if page.offset > ptr.0 {
                break None;
            }
            prev = Some(id);
            cursor = self.pages.next(id);
        };
        let id = match found {
            Some(id) if self.pages.get(id).claimed => id,
            _ => return Err(MemError::BadPointer { ptr }),
        };

        self.reserved -= self.pages.get(id).size;

        // Coalesce right.
        if let Some(next) = self.pages.next(id) {
            let next_page = *self.pages.get(next);
            if !next_page.claimed {
                self.pages.get_mut(id).size += next_page.size;
                self.pages.remove_after(Some(id));
                log::trace!("pool merge right into {:#x}", ptr.0);
            }
        }
        self.pages.get_mut(id).claimed = false;

        // Coalesce left.
        if let Some(prev) = prev {
            if !self.pages.get(prev).claimed {
                let size = self.pages.get(id).size;
                self.pages.get_mut(prev).size += size;
                self.pages.remove_after(Some(prev));
                log::trace!("pool merge {:#x} left", ptr.0);
            }
        }
        Ok(())
    }

    /// Total bytes covered by the pool, null guard included.
    pub fn size(&self) -> usize {
        self.total as usize
    }

    /// Bytes currently claimed by allocations (null guard excluded).
    pub fn reserved(&self) -> usize {
        self.reserved as usize
    }

    /// Bytes in free pages.
    pub fn free_bytes(&self) -> usize {
        self.pages
            .iter()
            .filter(|p| !p.claimed)
            .map(|p| p.size as usize)
            .sum()
    }

    /// Size of the largest free page, i.e. the largest request that can
    /// currently succeed.
    pub fn largest_free(&self) -> usize {
        self.pages
            .iter()
            .filter(|p| !p.claimed)
            .map(|p| p.size as usize)
            .max()
            .unwrap_or(0)
    }

    /// Size of the claimed page starting at `ptr`, if there is one.
    pub fn allocation_size(&self, ptr: Ptr) -> Option<usize> {
        if ptr.is_null() {
            return None;
        }
        self.pages
            .iter()
            .find(|p| p.offset == ptr.0 && p.claimed)
            .map(|p| p.size as usize)
    }

    /// Number of pages, null guard included.
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// Iterate pages in offset order, starting with the null guard.
    pub fn pages(&self) -> impl Iterator<Item = &Page> {
        self.pages.iter()
    }
}
