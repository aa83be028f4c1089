//! The shared backing buffer.
//!
//! [`SharedBuffer`] is the unit handed between threads: an `Arc` over a
//! slice of `AtomicU64` words plus the futex [`WaitTable`] that
//! parks threads blocked on words inside it. Cloning is cheap and every
//! clone aliases the same bytes.

use std::fmt;
use std::sync::atomic::AtomicU64;
use std::sync::Arc;

use crate::futex::WaitTable;
use crate::raw::{self, AtomicCell};

struct BufferInner {
    words: Box<[AtomicU64]>,
    waiters: WaitTable,
}

/// A fixed-size, zero-initialised byte buffer shareable across threads.
#[derive(Clone)]
pub struct SharedBuffer {
    inner: Arc<BufferInner>,
}

// Compile-time assertion: SharedBuffer must be Send + Sync.
const _: fn() = || {
    fn assert<T: Send + Sync>() {}
    assert::<SharedBuffer>();
};

impl SharedBuffer {
    /// Allocate a buffer of at least `bytes` bytes, rounded up to whole
    /// 8-byte words.
    pub fn new(bytes: usize) -> Self {
        let word_count = bytes.div_ceil(8);
        let words: Box<[AtomicU64]> = (0..word_count).map(|_| AtomicU64::new(0)).collect();
        Self {
            inner: Arc::new(BufferInner {
                words,
                waiters: WaitTable::new(),
            }),
        }
    }

    /// Length in bytes (always a multiple of 8).
    pub fn len(&self) -> usize {
        self.inner.words.len() * 8
    }

    /// Whether the buffer has zero length.
    pub fn is_empty(&self) -> bool {
        self.inner.words.is_empty()
    }

    /// Whether two handles alias the same allocation.
    pub fn same_buffer(&self, other: &SharedBuffer) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Number of live handles to this buffer.
    pub fn handle_count(&self) -> usize {
        Arc::strong_count(&self.inner)
    }

    pub(crate) fn cell<A: AtomicCell>(&self, byte: usize) -> &A {
        raw::cell(&self.inner.words, byte)
    }

    pub(crate) fn waiters(&self) -> &WaitTable {
        &self.inner.waiters
    }
}

impl fmt::Debug for SharedBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedBuffer")
            .field("len", &self.len())
            .field("handles", &self.handle_count())
            .finish()
    }
}
