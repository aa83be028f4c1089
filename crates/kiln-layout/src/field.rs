//! Typed field accessors.
//!
//! Each accessor is a small `Copy` value holding a field's offset, handed
//! out by [`StructLayout`](crate::StructLayout) after its kind and
//! atomicity have been checked. Accessors take the address space and the
//! instance base explicitly, so one accessor serves every instance of a
//! struct type on every thread that holds the buffer.

use std::marker::PhantomData;
use std::time::Duration;

use kiln_core::{AddressSpace, AtomicElement, MemError, Ptr, Reporter, WaitOutcome};
use kiln_heap::Memory;

use crate::half;
use crate::kind::{FieldKind, NativeKind};

// ── Plain scalars ───────────────────────────────────────────────

/// Load/store accessor for a non-atomic native scalar field.
#[derive(Clone, Copy, Debug)]
pub struct ScalarField<T> {
    offset: u32,
    _kind: PhantomData<fn() -> T>,
}

impl<T: NativeKind> ScalarField<T> {
    pub(crate) fn new(offset: u32) -> Self {
        Self {
            offset,
            _kind: PhantomData,
        }
    }

    /// Byte offset within the struct.
    pub fn offset(&self) -> u32 {
        self.offset
    }

    /// Read the field of the instance at `base`.
    pub fn load(&self, space: &AddressSpace, base: Ptr) -> T {
        space.read(base.add(self.offset))
    }

    /// Write the field of the instance at `base`.
    pub fn store(&self, space: &AddressSpace, base: Ptr, value: T) {
        space.write(base.add(self.offset), value)
    }
}

// ── Encoded kinds ───────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Encoding {
    Half,
    Unorm8,
    Unorm16,
}

/// Accessor for `f16`, `unorm8` and `unorm16` fields, read and written as
/// `f32`.
///
/// Unorm stores clamp to `[0, 1]` and round to the nearest step.
#[derive(Clone, Copy, Debug)]
pub struct EncodedField {
    offset: u32,
    encoding: Encoding,
}

impl EncodedField {
    pub(crate) fn for_kind(kind: FieldKind, offset: u32) -> Option<Self> {
        let encoding = match kind {
            FieldKind::F16 => Encoding::Half,
            FieldKind::Unorm8 => Encoding::Unorm8,
            FieldKind::Unorm16 => Encoding::Unorm16,
            _ => return None,
        };
        Some(Self { offset, encoding })
    }

    /// Byte offset within the struct.
    pub fn offset(&self) -> u32 {
        self.offset
    }

    /// Read and decode the field.
    pub fn load(&self, space: &AddressSpace, base: Ptr) -> f32 {
        let at = base.add(self.offset);
        match self.encoding {
            Encoding::Half => half::decode(space.read::<u16>(at)),
            Encoding::Unorm8 => f32::from(space.read::<u8>(at)) / 255.0,
            Encoding::Unorm16 => f32::from(space.read::<u16>(at)) / 65535.0,
        }
    }

    /// Encode and write the field.
    pub fn store(&self, space: &AddressSpace, base: Ptr, value: f32) {
        let at = base.add(self.offset);
        match self.encoding {
            Encoding::Half => space.write::<u16>(at, half::encode(value)),
            Encoding::Unorm8 => space.write::<u8>(at, unorm(value, 255.0) as u8),
            Encoding::Unorm16 => space.write::<u16>(at, unorm(value, 65535.0) as u16),
        }
    }
}

/// Scale `value` from `[0, 1]` to `[0, max]`. NaN maps to zero.
fn unorm(value: f32, max: f32) -> f32 {
    if value.is_nan() {
        return 0.0;
    }
    (value.clamp(0.0, 1.0) * max).round()
}

// ── Atomics ─────────────────────────────────────────────────────

/// Accessor for a field declared atomic. Every operation is sequentially
/// consistent; arithmetic wraps.
#[derive(Clone, Copy, Debug)]
pub struct AtomicField<T> {
    offset: u32,
    _kind: PhantomData<fn() -> T>,
}

impl<T: NativeKind + AtomicElement> AtomicField<T> {
    pub(crate) fn new(offset: u32) -> Self {
        Self {
            offset,
            _kind: PhantomData,
        }
    }

    /// Byte offset within the struct.
    pub fn offset(&self) -> u32 {
        self.offset
    }

    /// Atomic load.
    pub fn load(&self, space: &AddressSpace, base: Ptr) -> T {
        space.atomic_load(base.add(self.offset))
    }

    /// Atomic store.
    pub fn store(&self, space: &AddressSpace, base: Ptr, value: T) {
        space.atomic_store(base.add(self.offset), value)
    }

    /// Store `new` if the field holds `current`. Returns the previous
    /// value, as `Ok` on success and `Err` on failure.
    pub fn compare_exchange(
        &self,
        space: &AddressSpace,
        base: Ptr,
        current: T,
        new: T,
    ) -> Result<T, T> {
        space.compare_exchange(base.add(self.offset), current, new)
    }

    /// Store `value`, returning the previous value.
    pub fn exchange(&self, space: &AddressSpace, base: Ptr, value: T) -> T {
        space.swap(base.add(self.offset), value)
    }

    /// Add, returning the previous value.
    pub fn fetch_add(&self, space: &AddressSpace, base: Ptr, value: T) -> T {
        space.fetch_add(base.add(self.offset), value)
    }

    /// Subtract, returning the previous value.
    pub fn fetch_sub(&self, space: &AddressSpace, base: Ptr, value: T) -> T {
        space.fetch_sub(base.add(self.offset), value)
    }

    /// Bitwise and, returning the previous value.
    pub fn fetch_and(&self, space: &AddressSpace, base: Ptr, value: T) -> T {
        space.fetch_and(base.add(self.offset), value)
    }

    /// Bitwise or, returning the previous value.
    pub fn fetch_or(&self, space: &AddressSpace, base: Ptr, value: T) -> T {
        space.fetch_or(base.add(self.offset), value)
    }

    /// Bitwise xor, returning the previous value.
    pub fn fetch_xor(&self, space: &AddressSpace, base: Ptr, value: T) -> T {
        space.fetch_xor(base.add(self.offset), value)
    }
}

/// A 32-bit atomic kind usable as a futex word.
pub trait FutexWord: NativeKind + AtomicElement {
    /// The value's bit pattern.
    fn to_word(self) -> u32;
}

impl FutexWord for i32 {
    fn to_word(self) -> u32 {
        self as u32
    }
}

impl FutexWord for u32 {
    fn to_word(self) -> u32 {
        self
    }
}

/// Wait/notify accessor for an atomic `i32` or `u32` field.
///
/// Unlike the other accessors it is `Clone` but not `Copy`: it carries the
/// context's [`Reporter`] so a refused `wait` reaches the error handler.
#[derive(Clone, Debug)]
pub struct FutexField<T> {
    value: AtomicField<T>,
    can_block: bool,
    reporter: Reporter,
}

impl<T: FutexWord> FutexField<T> {
    pub(crate) fn new(offset: u32, can_block: bool, reporter: Reporter) -> Self {
        Self {
            value: AtomicField::new(offset),
            can_block,
            reporter,
        }
    }

    /// The atomic accessor for the same field.
    pub fn value(&self) -> AtomicField<T> {
        self.value
    }

    /// Block while the field holds `expected`, until notified or until
    /// `timeout` elapses.
    ///
    /// Fails with [`MemError::BlockingDisallowed`] when the context was
    /// built without the `can_block` capability. The error is reported
    /// before it is returned.
    pub fn wait(
        &self,
        space: &AddressSpace,
        base: Ptr,
        expected: T,
        timeout: Option<Duration>,
    ) -> Result<WaitOutcome, MemError> {
        if !self.can_block {
            return Err(self.reporter.report(MemError::BlockingDisallowed));
        }
        Ok(space.wait(base.add(self.value.offset), expected.to_word(), timeout))
    }

    /// Wake up to `count` waiters (all if `None`). Returns how many woke.
    pub fn notify(&self, space: &AddressSpace, base: Ptr, count: Option<u32>) -> u32 {
        space.notify(base.add(self.value.offset), count)
    }
}

// ── Strings ─────────────────────────────────────────────────────

/// Accessor for an owned `str8` field.
///
/// The field stores the offset of a NUL-terminated heap buffer, or null
/// for the empty string.
#[derive(Clone, Copy, Debug)]
pub struct StringField {
    offset: u32,
}

impl StringField {
    pub(crate) fn new(offset: u32) -> Self {
        Self { offset }
    }

    /// Byte offset within the struct.
    pub fn offset(&self) -> u32 {
        self.offset
    }

    /// Offset of the current string buffer, null if none.
    pub fn buffer(&self, space: &AddressSpace, base: Ptr) -> Ptr {
        Ptr(space.read::<u32>(base.add(self.offset)))
    }

    /// Read the string. A null buffer reads as `""`.
    pub fn get(&self, space: &AddressSpace, base: Ptr) -> String {
        let buffer = self.buffer(space, base);
        if buffer.is_null() {
            String::new()
        } else {
            space.read_cstr(buffer)
        }
    }

    /// Replace the string with a fresh heap copy of `text`, then free the
    /// previous buffer.
    ///
    /// Fails with [`MemError::InvalidString`] if `text` contains NUL and
    /// with [`MemError::OutOfMemory`] if the heap is exhausted; the field
    /// is unchanged in both cases.
    pub fn set(&self, mem: &mut Memory, base: Ptr, text: &str) -> Result<(), MemError> {
        if text.contains('\0') {
            return Err(mem.report(MemError::InvalidString {
                reason: "interior NUL byte".into(),
            }));
        }
        let len = text.len() + 1;
        let Some(fresh) = mem.allocate(len) else {
            return Err(mem.report(MemError::OutOfMemory { requested: len }));
        };
        mem.space().write_cstr(fresh, text);
        let old = self.buffer(mem.space(), base);
        mem.space().write::<u32>(base.add(self.offset), fresh.0);
        if !old.is_null() {
            mem.free(old)?;
        }
        Ok(())
    }

    /// Free the string buffer and reset the field to null.
    pub fn release(&self, mem: &mut Memory, base: Ptr) -> Result<(), MemError> {
        let old = self.buffer(mem.space(), base);
        if old.is_null() {
            return Ok(());
        }
        mem.space().write::<u32>(base.add(self.offset), 0);
        mem.free(old)
    }
}
