//! Byte offsets into the address space.

use std::fmt;

/// Alignment, in bytes, of every heap allocation and stack frame.
pub const ALIGN: usize = 8;

/// Size of the permanently claimed region at offset 0.
///
/// Reserving it guarantees that no allocation ever starts at [`Ptr::NULL`].
pub const NULL_GUARD: usize = 8;

/// A byte offset into an [`AddressSpace`](crate::AddressSpace).
///
/// Offsets are relative to the start of the address space's view, not to
/// the underlying buffer. `Ptr(0)` is the null sentinel.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Ptr(pub u32);

impl Ptr {
    /// The null offset. Never returned by an allocator.
    pub const NULL: Ptr = Ptr(0);

    /// Whether this is the null offset.
    pub fn is_null(self) -> bool {
        self.0 == 0
    }

    /// The offset as a `usize` byte index.
    pub fn addr(self) -> usize {
        self.0 as usize
    }

    /// Offset `bytes` further into the address space.
    ///
    /// # Panics
    ///
    /// Panics if the result does not fit in 32 bits.
    pub fn add(self, bytes: u32) -> Ptr {
        Ptr(self
            .0
            .checked_add(bytes)
            .expect("pointer arithmetic overflowed the 32-bit address space"))
    }
}

impl fmt::Display for Ptr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

impl From<u32> for Ptr {
    fn from(v: u32) -> Self {
        Self(v)
    }
}

/// Round `value` up to the next multiple of `align` (a power of two).
///
/// # Panics
///
/// Panics on overflow. Use [`checked_align_up`] for caller-supplied sizes.
pub fn align_up(value: usize, align: usize) -> usize {
    debug_assert!(align.is_power_of_two());
    (value + align - 1) & !(align - 1)
}

/// [`align_up`], returning `None` if the rounded value overflows `usize`.
pub fn checked_align_up(value: usize, align: usize) -> Option<usize> {
    debug_assert!(align.is_power_of_two());
    value.checked_add(align - 1).map(|v| v & !(align - 1))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_is_zero() {
        assert!(Ptr::NULL.is_null());
        assert!(!Ptr(8).is_null());
    }

    #[test]
    fn align_up_rounds_to_boundary() {
        assert_eq!(align_up(0, 8), 0);
        assert_eq!(align_up(1, 8), 8);
        assert_eq!(align_up(8, 8), 8);
        assert_eq!(align_up(13, 4), 16);
    }

    #[test]
    fn checked_align_up_detects_overflow() {
        assert_eq!(checked_align_up(13, 8), Some(16));
        assert_eq!(checked_align_up(usize::MAX - 7, 8), Some(usize::MAX - 7));
        assert_eq!(checked_align_up(usize::MAX, 8), None);
        assert_eq!(checked_align_up(usize::MAX - 6, 8), None);
    }

    #[test]
    fn display_is_hex() {
        assert_eq!(Ptr(255).to_string(), "0xff");
    }
}
