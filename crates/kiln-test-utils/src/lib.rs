//! Test utilities for Kiln development.
//!
//! Provides [`assert_pool_invariants`] for checking the page list after
//! arbitrary allocator churn, a [`ChurnLog`] that mirrors the live
//! allocations a test expects, and ready-made contexts and field lists in
//! [`fixtures`].

#![forbid(unsafe_code)]
#![allow(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod fixtures;

use kiln_core::Ptr;
use kiln_heap::{Memory, Pool};

/// Panic unless the pool's pages partition `[0, size)` in offset order,
/// every page is non-empty, no two neighbouring pages are both free, and
/// the reserved counter matches the claimed pages (guard excluded).
pub fn assert_pool_invariants(pool: &Pool) {
    let mut cursor = 0u32;
    let mut prev_free = false;
    let mut claimed = 0usize;
    for (i, page) in pool.pages().enumerate() {
        assert_eq!(page.offset, cursor, "page {i} ({page}) leaves a gap or overlaps");
        assert!(page.size > 0, "page {i} is empty");
        assert!(
            !(prev_free && !page.claimed),
            "pages {} and {i} are both free at {page}",
            i.saturating_sub(1)
        );
        if i == 0 {
            assert!(page.claimed && page.offset == 0, "first page is not the null guard");
        } else if page.claimed {
            claimed += page.size as usize;
        }
        prev_free = !page.claimed;
        cursor = page.end();
    }
    assert_eq!(cursor as usize, pool.size(), "pages do not cover the pool");
    assert_eq!(claimed, pool.reserved(), "reserved counter drifted");
}

/// Expected live allocations, for comparing against a [`Memory`] after
/// a sequence of allocate/free calls.
#[derive(Debug, Default)]
pub struct ChurnLog {
    live: Vec<(Ptr, usize)>,
}

impl ChurnLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, ptr: Ptr, size: usize) {
        self.live.push((ptr, size));
    }

    /// Record a fresh allocation and fill it with its stamp byte.
    pub fn record(&mut self, mem: &Memory, ptr: Ptr, size: usize) {
        mem.space().fill(ptr, stamp_byte(ptr), size);
        self.push(ptr, size);
    }

    /// Remove and return the entry at `pick % len`.
    pub fn take(&mut self, pick: usize) -> Option<(Ptr, usize)> {
        if self.live.is_empty() {
            return None;
        }
        let i = pick % self.live.len();
        Some(self.live.swap_remove(i))
    }

    pub fn len(&self) -> usize {
        self.live.len()
    }

    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }

    /// Panic if any live allocation no longer holds its stamp, which means
    /// two allocations overlapped.
    pub fn assert_stamps(&self, mem: &Memory) {
        for &(ptr, size) in &self.live {
            for offset in 0..size as u32 {
                let byte = mem.space().read::<u8>(ptr.add(offset));
                assert_eq!(byte, stamp_byte(ptr), "allocation at {ptr} overwritten at +{offset}");
            }
        }
    }
}

fn stamp_byte(ptr: Ptr) -> u8 {
    (ptr.0 >> 3) as u8
}
