//! Bit-packed arrays of narrow unsigned integers.
//!
//! Element `i` of a `w`-bit array occupies bits `[i*w, i*w + w)` of a run
//! of little-endian `u32` words. Elements may straddle a word boundary, in
//! which case loads and stores combine or split across both words.

use kiln_core::{AddressSpace, MemError, Ptr};
use kiln_heap::Memory;

/// A packed array of `count` unsigned integers of `bits` bits each.
///
/// Holds only the location and shape; the bits live in the address space.
/// Access is not atomic.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BitfieldArray {
    base: Ptr,
    count: usize,
    bits: u32,
}

impl BitfieldArray {
    /// Widest supported element.
    pub const MAX_BITS: u32 = 31;

    /// Bytes of backing storage for `count` elements of `bits` bits,
    /// rounded up to whole 32-bit words. `None` if the bit count overflows.
    pub fn bytes_required(count: usize, bits: u32) -> Option<usize> {
        count
            .checked_mul(bits as usize)
            .map(|total| total.div_ceil(32) * 4)
    }

    /// View `[ptr, ptr + bytes_required(count, bits))` as a packed array.
    ///
    /// Fails with [`MemError::InvalidBitWidth`] unless `1 <= bits <= 31`,
    /// with [`MemError::BadPointer`] if `ptr` is not 4-byte aligned, and
    /// with [`MemError::InvalidConfig`] if the array cannot be addressed.
    pub fn create(ptr: Ptr, count: usize, bits: u32) -> Result<Self, MemError> {
        if !(1..=Self::MAX_BITS).contains(&bits) {
            return Err(MemError::InvalidBitWidth { bits });
        }
        if ptr.0 % 4 != 0 {
            return Err(MemError::BadPointer { ptr });
        }
        if Self::bytes_required(count, bits).is_none() {
            return Err(MemError::InvalidConfig {
                reason: format!("bitfield of {count} x {bits} bits overflows"),
            });
        }
        Ok(Self {
            base: ptr,
            count,
            bits,
        })
    }

    /// Allocate zeroed backing storage from `mem` and view it as an array.
    pub fn allocate(mem: &mut Memory, count: usize, bits: u32) -> Result<Self, MemError> {
        if !(1..=Self::MAX_BITS).contains(&bits) {
            return Err(mem.report(MemError::InvalidBitWidth { bits }));
        }
        let Some(bytes) = Self::bytes_required(count, bits) else {
            return Err(mem.report(MemError::OutOfMemory {
                requested: usize::MAX,
            }));
        };
        let base = mem.allocate_zeroed(bytes.max(4))?;
        Self::create(base, count, bits).map_err(|err| mem.report(err))
    }

    /// First byte of the backing storage.
    pub fn base(&self) -> Ptr {
        self.base
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        self.count
    }

    /// Whether the array has no elements.
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Bits per element.
    pub fn bits(&self) -> u32 {
        self.bits
    }

    fn mask(&self) -> u64 {
        (1u64 << self.bits) - 1
    }

    /// Word index and bit shift of element `index`.
    fn locate(&self, index: usize) -> (usize, u32) {
        assert!(
            index < self.count,
            "bitfield index {index} out of bounds (len {})",
            self.count
        );
        let bit = index * self.bits as usize;
        (bit / 32, (bit % 32) as u32)
    }

    /// Read element `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index >= len()`.
    pub fn load(&self, space: &AddressSpace, index: usize) -> u32 {
        let (word, shift) = self.locate(index);
        let lo = u64::from(space.read_at::<u32>(self.base, word));
        let packed = if shift + self.bits > 32 {
            lo | u64::from(space.read_at::<u32>(self.base, word + 1)) << 32
        } else {
            lo
        };
        ((packed >> shift) & self.mask()) as u32
    }

    /// Write element `index`. Bits of `value` above the element width are
    /// dropped.
    ///
    /// # Panics
    ///
    /// Panics if `index >= len()`.
    pub fn store(&self, space: &AddressSpace, index: usize, value: u32) {
        let (word, shift) = self.locate(index);
        let mask = self.mask() << shift;
        let bits = (u64::from(value) << shift) & mask;
        if shift + self.bits > 32 {
            let lo = u64::from(space.read_at::<u32>(self.base, word));
            let hi = u64::from(space.read_at::<u32>(self.base, word + 1));
            let packed = ((lo | hi << 32) & !mask) | bits;
            space.write_at::<u32>(self.base, word, packed as u32);
            space.write_at::<u32>(self.base, word + 1, (packed >> 32) as u32);
        } else {
            let lo = u64::from(space.read_at::<u32>(self.base, word));
            space.write_at::<u32>(self.base, word, ((lo & !mask) | bits) as u32);
        }
    }
}
