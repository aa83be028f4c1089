//! Fixed-size record slabs.
//!
//! A [`LookasidePool`] carves one pool allocation into equal slots and
//! threads the free ones into a singly linked list. The link lives in the
//! first four bytes of each free slot. A one-bit-per-slot map records which
//! slots are free, so a slot cannot be released twice. `alloc` and
//! `release` are O(1).

use kiln_core::{checked_align_up, AddressSpace, MemError, Ptr};

/// End-of-list marker stored in the last free slot.
const END: u32 = 0;

/// A slab of `count` fixed-size slots.
///
/// Built and destroyed through [`Memory`](crate::Memory), which owns the
/// pool the slab is carved from.
#[derive(Debug)]
pub struct LookasidePool {
    base: Ptr,
    stride: u32,
    count: u32,
    head: u32,
    available: u32,
    free: Vec<u64>,
}

impl LookasidePool {
    /// Slot stride for `record_size`: a multiple of 4, at least 4.
    ///
    /// `None` if rounding overflows.
    pub fn stride_for(record_size: usize) -> Option<usize> {
        checked_align_up(record_size.max(4), 4)
    }

    /// Thread the slots of the slab at `base` onto a free list, lowest
    /// offset first.
    pub(crate) fn format(space: &AddressSpace, base: Ptr, stride: u32, count: u32) -> Self {
        for i in 0..count {
            let slot = base.add(i * stride);
            let next = if i + 1 < count {
                base.add((i + 1) * stride).0
            } else {
                END
            };
            space.write::<u32>(slot, next);
        }
        let mut free = vec![0u64; (count as usize).div_ceil(64)];
        for i in 0..count as usize {
            free[i / 64] |= 1 << (i % 64);
        }
        Self {
            base,
            stride,
            count,
            head: if count > 0 { base.0 } else { END },
            available: count,
            free,
        }
    }

    fn slot_index(&self, ptr: Ptr) -> usize {
        ((ptr.0 - self.base.0) / self.stride) as usize
    }

    fn is_free(&self, index: usize) -> bool {
        self.free[index / 64] & (1 << (index % 64)) != 0
    }

    fn set_free(&mut self, index: usize, free: bool) {
        let bit = 1u64 << (index % 64);
        if free {
            self.free[index / 64] |= bit;
        } else {
            self.free[index / 64] &= !bit;
        }
    }

    /// Pop a free slot, or `None` when every slot is in use.
    pub fn alloc(&mut self, space: &AddressSpace) -> Option<Ptr> {
        if self.head == END {
            return None;
        }
        let slot = Ptr(self.head);
        self.head = space.read::<u32>(slot);
        self.set_free(self.slot_index(slot), false);
        self.available -= 1;
        Some(slot)
    }

    /// Return `ptr` to the free list.
    ///
    /// Fails with [`MemError::BadPointer`] if `ptr` is not a slot boundary
    /// inside this slab or the slot is already free.
    pub fn release(&mut self, space: &AddressSpace, ptr: Ptr) -> Result<(), MemError> {
        if !self.contains_slot(ptr) {
            return Err(MemError::BadPointer { ptr });
        }
        let index = self.slot_index(ptr);
        if self.is_free(index) {
            return Err(MemError::BadPointer { ptr });
        }
        space.write::<u32>(ptr, self.head);
        self.head = ptr.0;
        self.set_free(index, true);
        self.available += 1;
        Ok(())
    }

    /// Whether `ptr` is the start of one of this slab's slots.
    pub fn contains_slot(&self, ptr: Ptr) -> bool {
        ptr.0 >= self.base.0
            && ptr.0 < self.base.0 + self.bytes()
            && (ptr.0 - self.base.0) % self.stride == 0
    }

    /// First byte of the slab.
    pub fn base(&self) -> Ptr {
        self.base
    }

    /// Bytes per slot.
    pub fn stride(&self) -> usize {
        self.stride as usize
    }

    /// Total number of slots.
    pub fn count(&self) -> usize {
        self.count as usize
    }

    /// Number of free slots.
    pub fn available(&self) -> usize {
        self.available as usize
    }

    pub(crate) fn bytes(&self) -> u32 {
        self.stride * self.count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slab(stride: u32, count: u32) -> (AddressSpace, LookasidePool) {
        let space = AddressSpace::new(1024);
        let pool = LookasidePool::format(&space, Ptr(64), stride, count);
        (space, pool)
    }

    #[test]
    fn stride_rounds_to_four() {
        assert_eq!(LookasidePool::stride_for(1), Some(4));
        assert_eq!(LookasidePool::stride_for(4), Some(4));
        assert_eq!(LookasidePool::stride_for(5), Some(8));
        assert_eq!(LookasidePool::stride_for(12), Some(12));
        assert_eq!(LookasidePool::stride_for(usize::MAX), None);
    }

    #[test]
    fn alloc_hands_out_lowest_first() {
        let (space, mut pool) = slab(8, 3);
        assert_eq!(pool.alloc(&space), Some(Ptr(64)));
        assert_eq!(pool.alloc(&space), Some(Ptr(72)));
        assert_eq!(pool.alloc(&space), Some(Ptr(80)));
        assert_eq!(pool.alloc(&space), None);
        assert_eq!(pool.available(), 0);
    }

    #[test]
    fn release_is_lifo() {
        let (space, mut pool) = slab(8, 3);
        let a = pool.alloc(&space).unwrap();
        let b = pool.alloc(&space).unwrap();
        pool.release(&space, a).unwrap();
        pool.release(&space, b).unwrap();
        assert_eq!(pool.alloc(&space), Some(b));
        assert_eq!(pool.alloc(&space), Some(a));
    }

    #[test]
    fn release_rejects_foreign_pointers() {
        let (space, mut pool) = slab(8, 3);
        let a = pool.alloc(&space).unwrap();
        assert!(pool.release(&space, Ptr(60)).is_err());
        assert!(pool.release(&space, a.add(4)).is_err());
        assert!(pool.release(&space, Ptr(88)).is_err());
        assert_eq!(pool.available(), 2);
    }

    #[test]
    fn release_into_full_slab_is_rejected() {
        let (space, mut pool) = slab(8, 2);
        assert!(pool.release(&space, Ptr(64)).is_err());
    }

    #[test]
    fn double_release_is_rejected() {
        let (space, mut pool) = slab(8, 3);
        let a = pool.alloc(&space).unwrap();
        let b = pool.alloc(&space).unwrap();
        pool.release(&space, a).unwrap();
        assert_eq!(pool.release(&space, a), Err(MemError::BadPointer { ptr: a }));
        assert_eq!(pool.available(), 2);

        // The free list still hands out distinct slots.
        let c = pool.alloc(&space).unwrap();
        let d = pool.alloc(&space).unwrap();
        assert_ne!(c, d);
        assert_ne!(c, b);
        assert_ne!(d, b);
        assert_eq!(pool.alloc(&space), None);
    }

    #[test]
    fn slab_wider_than_one_map_word() {
        let space = AddressSpace::new(4096);
        let mut pool = LookasidePool::format(&space, Ptr(64), 4, 100);
        let slots: Vec<Ptr> = (0..100).map(|_| pool.alloc(&space).unwrap()).collect();
        assert_eq!(pool.alloc(&space), None);
        pool.release(&space, slots[70]).unwrap();
        assert!(pool.release(&space, slots[70]).is_err());
        assert_eq!(pool.alloc(&space), Some(slots[70]));
    }

    #[test]
    fn records_survive_until_release() {
        let (space, mut pool) = slab(8, 4);
        let slots: Vec<Ptr> = (0..4).map(|_| pool.alloc(&space).unwrap()).collect();
        for (i, &slot) in slots.iter().enumerate() {
            space.write::<u64>(slot, i as u64 * 1000);
        }
        for (i, &slot) in slots.iter().enumerate() {
            assert_eq!(space.read::<u64>(slot), i as u64 * 1000);
        }
    }
}
