//! LIFO frame allocator.
//!
//! [`StackAllocator`] is a bump pointer over one region of the pool.
//! [`begin`](StackAllocator::begin) saves the pointer and hands out an
//! 8-byte-aligned block; [`end`](StackAllocator::end) rewinds to the saved
//! value, discarding everything allocated since. Frames must be ended in
//! reverse order of creation.

use kiln_core::{align_up, MemError, Ptr};

/// A frame opened by [`StackAllocator::begin`].
///
/// Pass it back to [`StackAllocator::end`] to release the frame and every
/// frame opened after it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[must_use = "a stack frame must be ended to release its bytes"]
pub struct StackFrame {
    saved: u32,
    data: Ptr,
}

impl StackFrame {
    /// First byte of the frame's data block.
    pub fn data(&self) -> Ptr {
        self.data
    }

    /// Stack pointer as it was before the frame was opened.
    pub fn saved(&self) -> Ptr {
        Ptr(self.saved)
    }
}

/// Bump allocator over `[base, end)`.
#[derive(Debug)]
pub struct StackAllocator {
    base: u32,
    end: u32,
    sp: u32,
}

impl StackAllocator {
    /// Create a stack over `[base, base + size)`.
    pub fn new(base: Ptr, size: u32) -> Self {
        Self {
            base: base.0,
            end: base.0 + size,
            sp: base.0,
        }
    }

    /// Open a frame of `size` bytes.
    ///
    /// The data pointer is the current pointer rounded up to 8. Fails with
    /// [`MemError::StackOverflow`] if the frame would run past the end of
    /// the region; the pointer is unchanged in that case.
    pub fn begin(&mut self, size: usize) -> Result<StackFrame, MemError> {
        let data = align_up(self.sp as usize, 8);
        let remaining = (self.end as usize).saturating_sub(data);
        if size > remaining {
            return Err(MemError::StackOverflow {
                requested: size,
                remaining,
            });
        }
        let frame = StackFrame {
            saved: self.sp,
            data: Ptr(data as u32),
        };
        self.sp = (data + size) as u32;
        Ok(frame)
    }

    /// Close `frame`, rewinding the pointer to where it was before the
    /// frame was opened.
    ///
    /// # Panics
    ///
    /// Panics if the frame does not belong to this stack, or if a frame
    /// opened before `frame` has already been ended.
    pub fn end(&mut self, frame: StackFrame) {
        assert!(
            frame.saved >= self.base && frame.saved <= self.sp,
            "stack frame {:#x} ended out of order (sp {:#x})",
            frame.saved,
            self.sp
        );
        self.sp = frame.saved;
    }

    /// Drop every open frame.
    pub fn reset(&mut self) {
        self.sp = self.base;
    }

    /// Bytes between the base and the current pointer.
    pub fn used(&self) -> usize {
        (self.sp - self.base) as usize
    }

    /// Size of the region in bytes.
    pub fn capacity(&self) -> usize {
        (self.end - self.base) as usize
    }

    /// Current stack pointer.
    pub fn pointer(&self) -> Ptr {
        Ptr(self.sp)
    }

    /// First byte of the region.
    pub fn base(&self) -> Ptr {
        Ptr(self.base)
    }
}
