//! The address space: a byte-offset view over a [`SharedBuffer`].
//!
//! An [`AddressSpace`] covers `[start, start + len)` of its buffer and is
//! addressed with [`Ptr`] offsets relative to `start`. Plain reads and
//! writes use `Relaxed` ordering. The `atomic_*`, `wait` and `notify`
//! methods are sequentially consistent and are the only cross-thread
//! synchronisation the memory layer provides.

use std::ops::Range;
use std::sync::atomic::{AtomicU32, AtomicU64, AtomicU8, Ordering};
use std::time::Duration;

use crate::buffer::SharedBuffer;
use crate::element::{AtomicElement, Element};
use crate::error::MemError;
use crate::futex::WaitOutcome;
use crate::ptr::{align_up, Ptr};

/// Typed, bounds-checked access to a window of a shared buffer.
///
/// Cloning produces another handle onto the same bytes.
///
/// # Panics
///
/// Every accessor panics if the addressed range falls outside the view or
/// is not aligned to the element width. Allocators only hand out aligned
/// in-bounds offsets, so a panic here indicates a caller bug.
#[derive(Clone, Debug)]
pub struct AddressSpace {
    buffer: SharedBuffer,
    start: usize,
    len: usize,
}

impl AddressSpace {
    /// Create a view over a fresh zeroed buffer of `len` bytes (rounded up
    /// to a multiple of 8).
    pub fn new(len: usize) -> Self {
        let buffer = SharedBuffer::new(len);
        let len = buffer.len();
        Self {
            buffer,
            start: 0,
            len,
        }
    }

    /// Create a view over an existing buffer.
    ///
    /// With `range = None` the view spans the whole buffer. Otherwise the
    /// range start is aligned up and the end aligned down to 8 bytes, so
    /// every element width sees the same aligned base.
    pub fn from_shared(
        buffer: SharedBuffer,
        range: Option<Range<usize>>,
    ) -> Result<Self, MemError> {
        let (start, end) = match range {
            None => (0, buffer.len()),
            Some(r) => (align_up(r.start, 8), r.end & !7),
        };
        if end > buffer.len() {
            return Err(MemError::RegionTooSmall {
                required: end,
                available: buffer.len(),
            });
        }
        if end <= start {
            return Err(MemError::InvalidConfig {
                reason: format!("empty view range {start}..{end}"),
            });
        }
        Ok(Self {
            buffer,
            start,
            len: end - start,
        })
    }

    /// Length of the view in bytes.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the view is empty.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Byte range of the view within its buffer.
    pub fn view_range(&self) -> Range<usize> {
        self.start..self.start + self.len
    }

    /// The backing buffer, for handoff to another thread.
    pub fn shared_buffer(&self) -> &SharedBuffer {
        &self.buffer
    }

    /// Absolute buffer offset of `[ptr + extra, ptr + extra + width)`.
    fn locate(&self, ptr: Ptr, extra: usize, width: usize) -> usize {
        let rel = ptr.addr() + extra;
        assert!(
            rel.checked_add(width).is_some_and(|end| end <= self.len),
            "access of {width} bytes at {rel:#x} is outside the {}-byte address space",
            self.len
        );
        self.start + rel
    }

    // ── Typed views ─────────────────────────────────────────────────

    /// Read a `T` at `ptr`.
    pub fn read<T: Element>(&self, ptr: Ptr) -> T {
        T::load_raw(&self.buffer, self.locate(ptr, 0, T::WIDTH), Ordering::Relaxed)
    }

    /// Write a `T` at `ptr`.
    pub fn write<T: Element>(&self, ptr: Ptr, value: T) {
        T::store_raw(
            &self.buffer,
            self.locate(ptr, 0, T::WIDTH),
            value,
            Ordering::Relaxed,
        )
    }

    /// Read element `index` of a `T` array starting at `ptr`.
    pub fn read_at<T: Element>(&self, ptr: Ptr, index: usize) -> T {
        let byte = self.locate(ptr, index * T::WIDTH, T::WIDTH);
        T::load_raw(&self.buffer, byte, Ordering::Relaxed)
    }

    /// Write element `index` of a `T` array starting at `ptr`.
    pub fn write_at<T: Element>(&self, ptr: Ptr, index: usize, value: T) {
        let byte = self.locate(ptr, index * T::WIDTH, T::WIDTH);
        T::store_raw(&self.buffer, byte, value, Ordering::Relaxed)
    }

    // ── Atomic operations ──────────────────────────────────────────

    /// Sequentially consistent load.
    pub fn atomic_load<T: AtomicElement>(&self, ptr: Ptr) -> T {
        T::load_raw(&self.buffer, self.locate(ptr, 0, T::WIDTH), Ordering::SeqCst)
    }

    /// Sequentially consistent store.
    pub fn atomic_store<T: AtomicElement>(&self, ptr: Ptr, value: T) {
        T::store_raw(
            &self.buffer,
            self.locate(ptr, 0, T::WIDTH),
            value,
            Ordering::SeqCst,
        )
    }

    /// Store `new` if the value equals `current`. Returns the previous
    /// value, as `Ok` on success and `Err` on mismatch.
    pub fn compare_exchange<T: AtomicElement>(&self, ptr: Ptr, current: T, new: T) -> Result<T, T> {
        T::compare_exchange_raw(&self.buffer, self.locate(ptr, 0, T::WIDTH), current, new)
    }

    /// Store `value`, returning the previous value.
    pub fn swap<T: AtomicElement>(&self, ptr: Ptr, value: T) -> T {
        T::swap_raw(&self.buffer, self.locate(ptr, 0, T::WIDTH), value)
    }

    /// Wrapping add, returning the previous value.
    pub fn fetch_add<T: AtomicElement>(&self, ptr: Ptr, value: T) -> T {
        T::fetch_add_raw(&self.buffer, self.locate(ptr, 0, T::WIDTH), value)
    }

    /// Wrapping subtract, returning the previous value.
    pub fn fetch_sub<T: AtomicElement>(&self, ptr: Ptr, value: T) -> T {
        T::fetch_sub_raw(&self.buffer, self.locate(ptr, 0, T::WIDTH), value)
    }

    /// Bitwise and, returning the previous value.
    pub fn fetch_and<T: AtomicElement>(&self, ptr: Ptr, value: T) -> T {
        T::fetch_and_raw(&self.buffer, self.locate(ptr, 0, T::WIDTH), value)
    }

    /// Bitwise or, returning the previous value.
    pub fn fetch_or<T: AtomicElement>(&self, ptr: Ptr, value: T) -> T {
        T::fetch_or_raw(&self.buffer, self.locate(ptr, 0, T::WIDTH), value)
    }

    /// Bitwise xor, returning the previous value.
    pub fn fetch_xor<T: AtomicElement>(&self, ptr: Ptr, value: T) -> T {
        T::fetch_xor_raw(&self.buffer, self.locate(ptr, 0, T::WIDTH), value)
    }

    // ── Futex ──────────────────────────────────────────────────────

    /// Block while the 32-bit word at `ptr` holds `expected`, until
    /// notified or until `timeout` elapses.
    pub fn wait(&self, ptr: Ptr, expected: u32, timeout: Option<Duration>) -> WaitOutcome {
        let byte = self.locate(ptr, 0, 4);
        let word = self.buffer.cell::<AtomicU32>(byte);
        self.buffer.waiters().wait(byte, word, expected, timeout)
    }

    /// Wake up to `count` threads (all if `None`) waiting on the 32-bit
    /// word at `ptr`. Returns how many were woken.
    pub fn notify(&self, ptr: Ptr, count: Option<u32>) -> u32 {
        let byte = self.locate(ptr, 0, 4);
        self.buffer.waiters().notify(byte, count)
    }

    /// Number of threads currently waiting on the word at `ptr`.
    pub fn waiter_count(&self, ptr: Ptr) -> usize {
        self.buffer.waiters().waiter_count(self.locate(ptr, 0, 4))
    }

    // ── Block operations ───────────────────────────────────────────

    fn byte_cell(&self, abs: usize) -> &AtomicU8 {
        self.buffer.cell::<AtomicU8>(abs)
    }

    /// Copy `len` bytes from `src` to `dst`. Overlapping ranges are
    /// handled like `memmove`.
    pub fn copy(&self, dst: Ptr, src: Ptr, len: usize) {
        if len == 0 {
            return;
        }
        let d = self.locate(dst, 0, len);
        let s = self.locate(src, 0, len);
        let mv = |i: usize| {
            let b = self.byte_cell(s + i).load(Ordering::Relaxed);
            self.byte_cell(d + i).store(b, Ordering::Relaxed);
        };
        if d <= s {
            (0..len).for_each(mv);
        } else {
            (0..len).rev().for_each(mv);
        }
    }

    /// Set `len` bytes starting at `ptr` to `value`.
    pub fn fill(&self, ptr: Ptr, value: u8, len: usize) {
        if len == 0 {
            return;
        }
        let mut at = self.locate(ptr, 0, len);
        let end = at + len;
        while at < end && at % 8 != 0 {
            self.byte_cell(at).store(value, Ordering::Relaxed);
            at += 1;
        }
        let pattern = u64::from_ne_bytes([value; 8]);
        while at + 8 <= end {
            self.buffer
                .cell::<AtomicU64>(at)
                .store(pattern, Ordering::Relaxed);
            at += 8;
        }
        while at < end {
            self.byte_cell(at).store(value, Ordering::Relaxed);
            at += 1;
        }
    }

    /// Zero `len` bytes starting at `ptr`.
    pub fn zero(&self, ptr: Ptr, len: usize) {
        self.fill(ptr, 0, len);
    }

    /// Whether the `len` bytes at `a` and `b` are identical.
    pub fn compare(&self, a: Ptr, b: Ptr, len: usize) -> bool {
        if len == 0 {
            return true;
        }
        let a = self.locate(a, 0, len);
        let b = self.locate(b, 0, len);
        (0..len).all(|i| {
            self.byte_cell(a + i).load(Ordering::Relaxed)
                == self.byte_cell(b + i).load(Ordering::Relaxed)
        })
    }

    /// Write `text` as bytes followed by a NUL terminator. Returns the
    /// number of bytes written, terminator included.
    pub fn write_cstr(&self, ptr: Ptr, text: &str) -> usize {
        let bytes = text.as_bytes();
        let at = self.locate(ptr, 0, bytes.len() + 1);
        for (i, &b) in bytes.iter().enumerate() {
            self.byte_cell(at + i).store(b, Ordering::Relaxed);
        }
        self.byte_cell(at + bytes.len()).store(0, Ordering::Relaxed);
        bytes.len() + 1
    }

    /// Read the NUL-terminated byte run at `ptr` as text. Invalid UTF-8 is
    /// replaced; a run that reaches the end of the view stops there.
    pub fn read_cstr(&self, ptr: Ptr) -> String {
        let start = self.locate(ptr, 0, 0);
        let end = self.start + self.len;
        let bytes: Vec<u8> = (start..end)
            .map(|abs| self.byte_cell(abs).load(Ordering::Relaxed))
            .take_while(|&b| b != 0)
            .collect();
        String::from_utf8_lossy(&bytes).into_owned()
    }
}
