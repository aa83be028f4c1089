//! Reinterpreting the word-backed buffer as narrower atomic cells.
//!
//! The buffer is a slice of `AtomicU64`, which fixes its base alignment at
//! 8 bytes. Typed access to 1, 2 and 4 byte values reinterprets a sub-range
//! of that slice as the matching std atomic. This is the only module in the
//! workspace that contains `unsafe` code.

#![allow(unsafe_code)]

use std::mem::{align_of, size_of};
use std::sync::atomic::{
    AtomicI16, AtomicI32, AtomicI64, AtomicI8, AtomicU16, AtomicU32, AtomicU64, AtomicU8,
};

/// A std atomic type with the same size, alignment and bit validity as
/// its underlying integer.
///
/// # Safety
///
/// Implementors must be `#[repr(C, align(N))]` wrappers around an
/// integer of `N` bytes with no invalid bit patterns.
pub(crate) unsafe trait AtomicCell: Sized {}

// SAFETY: the std atomics are documented to have the same in-memory
// representation as the integer they wrap, and every bit pattern of that
// integer is valid.
unsafe impl AtomicCell for AtomicU8 {}
// SAFETY: as above.
unsafe impl AtomicCell for AtomicI8 {}
// SAFETY: as above.
unsafe impl AtomicCell for AtomicU16 {}
// SAFETY: as above.
unsafe impl AtomicCell for AtomicI16 {}
// SAFETY: as above.
unsafe impl AtomicCell for AtomicU32 {}
// SAFETY: as above.
unsafe impl AtomicCell for AtomicI32 {}
// SAFETY: as above.
unsafe impl AtomicCell for AtomicU64 {}
// SAFETY: as above.
unsafe impl AtomicCell for AtomicI64 {}

/// View the bytes `[byte, byte + size_of::<A>())` of `words` as an `A`.
///
/// # Panics
///
/// Panics if the range is out of bounds or `byte` is not a multiple of
/// `align_of::<A>()`.
pub(crate) fn cell<A: AtomicCell>(words: &[AtomicU64], byte: usize) -> &A {
    let width = size_of::<A>();
    assert!(
        byte % align_of::<A>() == 0,
        "misaligned {width}-byte access at byte {byte}"
    );
    assert!(
        byte
            .checked_add(width)
            .is_some_and(|end| end <= words.len() * size_of::<AtomicU64>()),
        "{width}-byte access at byte {byte} is out of bounds"
    );
    // SAFETY: `words` is a live allocation of `words.len() * 8` bytes and
    // the asserts above keep `[byte, byte + width)` inside it. The slice
    // base is 8-aligned and `byte` is a multiple of `align_of::<A>()`, so
    // the cell is aligned. `A` has no invalid bit patterns (AtomicCell),
    // and handing out shared references is sound because every write to
    // the buffer goes through an atomic cell.
    unsafe { &*words.as_ptr().cast::<u8>().add(byte).cast::<A>() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::Ordering;

    fn words(n: usize) -> Vec<AtomicU64> {
        (0..n).map(|_| AtomicU64::new(0)).collect()
    }

    #[test]
    fn narrow_cells_alias_the_word() {
        let w = words(1);
        cell::<AtomicU8>(&w, 0).store(0xAA, Ordering::Relaxed);
        cell::<AtomicU16>(&w, 2).store(0xBBCC, Ordering::Relaxed);
        let full = w[0].load(Ordering::Relaxed);
        assert_eq!(full.to_le_bytes()[0], 0xAA);
        assert_eq!(cell::<AtomicU16>(&w, 2).load(Ordering::Relaxed), 0xBBCC);
    }

    #[test]
    #[should_panic(expected = "misaligned")]
    fn misaligned_access_panics() {
        let w = words(1);
        cell::<AtomicU32>(&w, 2);
    }

    #[test]
    #[should_panic(expected = "out of bounds")]
    fn out_of_bounds_access_panics() {
        let w = words(1);
        cell::<AtomicU32>(&w, 8);
    }
}
