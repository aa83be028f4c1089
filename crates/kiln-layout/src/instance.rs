//! Struct types and their instances.
//!
//! A struct type is a shared [`StructLayout`] tagged with its lifecycle:
//! [`HeapStruct`] instances live in a pool allocation and
//! [`StackStruct`] instances in a stack frame. Instances are zeroed on
//! allocation, and deallocating one releases every owned string buffer
//! before the instance's own bytes.

use std::ops::Deref;
use std::sync::Arc;

use kiln_core::{AddressSpace, MemError, Ptr};
use kiln_heap::{Memory, StackFrame};

use crate::field::{AtomicField, EncodedField, ScalarField, StringField};
use crate::kind::FieldKind;
use crate::layout::{FieldSlot, StructLayout};
use crate::value::Value;

// ── Struct types ────────────────────────────────────────────────

/// A struct type whose instances are allocated from the heap.
#[derive(Clone, Debug)]
pub struct HeapStruct {
    layout: Arc<StructLayout>,
}

impl HeapStruct {
    /// Wrap a compiled layout.
    pub fn new(layout: StructLayout) -> Self {
        Self {
            layout: Arc::new(layout),
        }
    }

    /// The shared layout.
    pub fn layout(&self) -> &Arc<StructLayout> {
        &self.layout
    }

    /// Allocate a zeroed instance.
    pub fn allocate(&self, mem: &mut Memory) -> Result<HeapObject, MemError> {
        let ptr = mem.allocate_zeroed(self.layout.size())?;
        Ok(HeapObject {
            ptr,
            layout: Arc::clone(&self.layout),
        })
    }
}

impl Deref for HeapStruct {
    type Target = StructLayout;

    fn deref(&self) -> &StructLayout {
        &self.layout
    }
}

/// A struct type whose instances live in stack frames.
#[derive(Clone, Debug)]
pub struct StackStruct {
    layout: Arc<StructLayout>,
}

impl StackStruct {
    /// Wrap a compiled layout.
    pub fn new(layout: StructLayout) -> Self {
        Self {
            layout: Arc::new(layout),
        }
    }

    /// The shared layout.
    pub fn layout(&self) -> &Arc<StructLayout> {
        &self.layout
    }

    /// Open a stack frame holding one zeroed instance.
    pub fn allocate(&self, mem: &mut Memory) -> Result<StackObject, MemError> {
        let frame = mem.stack_frame_begin(self.layout.size())?;
        mem.space().zero(frame.data(), self.layout.size());
        Ok(StackObject {
            frame,
            layout: Arc::clone(&self.layout),
        })
    }
}

impl Deref for StackStruct {
    type Target = StructLayout;

    fn deref(&self) -> &StructLayout {
        &self.layout
    }
}

// ── Instances ───────────────────────────────────────────────────

/// An instance in a heap allocation.
///
/// Not freed on drop; call [`deallocate`](Self::deallocate).
#[derive(Debug)]
#[must_use = "heap instances must be deallocated explicitly"]
pub struct HeapObject {
    ptr: Ptr,
    layout: Arc<StructLayout>,
}

impl HeapObject {
    /// Base offset of the instance.
    pub fn ptr(&self) -> Ptr {
        self.ptr
    }

    /// The instance's layout.
    pub fn layout(&self) -> &StructLayout {
        &self.layout
    }

    /// Read a field by name.
    pub fn get(&self, space: &AddressSpace, name: &str) -> Result<Value, MemError> {
        read_field(&self.layout, space, self.ptr, name)
    }

    /// Write a field by name. The value's type must match the field's kind.
    pub fn set(
        &self,
        mem: &mut Memory,
        name: &str,
        value: impl Into<Value>,
    ) -> Result<(), MemError> {
        let slot = self.layout.lookup(name).map_err(|err| mem.report(err))?;
        store_value(slot, mem, self.ptr, value.into())
    }

    /// Release owned strings, then the instance itself.
    ///
    /// The instance is freed even if a string release fails; the first
    /// error is returned.
    pub fn deallocate(self, mem: &mut Memory) -> Result<(), MemError> {
        let strings = release_strings(&self.layout, mem, self.ptr);
        let block = mem.free(self.ptr);
        strings.and(block)
    }
}

/// An instance in a stack frame.
///
/// Deallocating ends the frame, which also discards any frame opened
/// after it.
#[derive(Debug)]
#[must_use = "stack instances must be deallocated to end their frame"]
pub struct StackObject {
    frame: StackFrame,
    layout: Arc<StructLayout>,
}

impl StackObject {
    /// Base offset of the instance.
    pub fn ptr(&self) -> Ptr {
        self.frame.data()
    }

    /// The instance's layout.
    pub fn layout(&self) -> &StructLayout {
        &self.layout
    }

    /// Read a field by name.
    pub fn get(&self, space: &AddressSpace, name: &str) -> Result<Value, MemError> {
        read_field(&self.layout, space, self.ptr(), name)
    }

    /// Write a field by name. The value's type must match the field's kind.
    pub fn set(
        &self,
        mem: &mut Memory,
        name: &str,
        value: impl Into<Value>,
    ) -> Result<(), MemError> {
        let slot = self.layout.lookup(name).map_err(|err| mem.report(err))?;
        store_value(slot, mem, self.ptr(), value.into())
    }

    /// Release owned strings, then end the frame.
    ///
    /// The frame is ended even if a string release fails; the first error
    /// is returned.
    pub fn deallocate(self, mem: &mut Memory) -> Result<(), MemError> {
        let strings = release_strings(&self.layout, mem, self.ptr());
        mem.stack_frame_end(self.frame);
        strings
    }
}

// ── Dynamic access ──────────────────────────────────────────────

/// Release every owned string, continuing past failures. Returns the first
/// error.
fn release_strings(layout: &StructLayout, mem: &mut Memory, base: Ptr) -> Result<(), MemError> {
    let mut first = Ok(());
    for field in layout.string_fields() {
        let released = field.release(mem, base);
        if first.is_ok() {
            first = released;
        }
    }
    first
}

fn read_field(
    layout: &StructLayout,
    space: &AddressSpace,
    base: Ptr,
    name: &str,
) -> Result<Value, MemError> {
    layout
        .lookup(name)
        .and_then(|slot| load_value(slot, space, base))
        .map_err(|err| layout.reporter().report(err))
}

fn load_value(slot: &FieldSlot, space: &AddressSpace, base: Ptr) -> Result<Value, MemError> {
    let offset = slot.offset();

    macro_rules! small_int {
        ($t:ty, $variant:ident) => {
            if slot.is_atomic() {
                Value::$variant(AtomicField::<$t>::new(offset).load(space, base))
            } else {
                Value::$variant(ScalarField::<$t>::new(offset).load(space, base))
            }
        };
    }

    Ok(match slot.kind() {
        FieldKind::I8 => small_int!(i8, I8),
        FieldKind::U8 => small_int!(u8, U8),
        FieldKind::I16 => small_int!(i16, I16),
        FieldKind::U16 => small_int!(u16, U16),
        FieldKind::I32 => small_int!(i32, I32),
        FieldKind::U32 => small_int!(u32, U32),
        FieldKind::I64 => Value::I64(ScalarField::new(offset).load(space, base)),
        FieldKind::U64 => Value::U64(ScalarField::new(offset).load(space, base)),
        FieldKind::F32 => Value::F32(ScalarField::new(offset).load(space, base)),
        FieldKind::F64 => Value::F64(ScalarField::new(offset).load(space, base)),
        kind @ (FieldKind::F16 | FieldKind::Unorm8 | FieldKind::Unorm16) => {
            let field = EncodedField::for_kind(kind, offset)
                .ok_or_else(|| slot.mismatch("f32"))?;
            Value::F32(field.load(space, base))
        }
        FieldKind::Str8 => Value::Str(StringField::new(offset).get(space, base)),
    })
}

fn store_value(
    slot: &FieldSlot,
    mem: &mut Memory,
    base: Ptr,
    value: Value,
) -> Result<(), MemError> {
    let offset = slot.offset();
    let atomic = slot.is_atomic();
    let space = mem.space().clone();

    macro_rules! small_int {
        ($t:ty, $v:expr) => {
            if atomic {
                AtomicField::<$t>::new(offset).store(&space, base, $v)
            } else {
                ScalarField::<$t>::new(offset).store(&space, base, $v)
            }
        };
    }

    match (slot.kind(), value) {
        (FieldKind::I8, Value::I8(v)) => small_int!(i8, v),
        (FieldKind::U8, Value::U8(v)) => small_int!(u8, v),
        (FieldKind::I16, Value::I16(v)) => small_int!(i16, v),
        (FieldKind::U16, Value::U16(v)) => small_int!(u16, v),
        (FieldKind::I32, Value::I32(v)) => small_int!(i32, v),
        (FieldKind::U32, Value::U32(v)) => small_int!(u32, v),
        (FieldKind::I64, Value::I64(v)) => ScalarField::new(offset).store(&space, base, v),
        (FieldKind::U64, Value::U64(v)) => ScalarField::new(offset).store(&space, base, v),
        (FieldKind::F32, Value::F32(v)) => ScalarField::new(offset).store(&space, base, v),
        (FieldKind::F64, Value::F64(v)) => ScalarField::new(offset).store(&space, base, v),
        (kind @ (FieldKind::F16 | FieldKind::Unorm8 | FieldKind::Unorm16), Value::F32(v)) => {
            match EncodedField::for_kind(kind, offset) {
                Some(field) => field.store(&space, base, v),
                None => return Err(mem.report(slot.mismatch("f32"))),
            }
        }
        (FieldKind::Str8, Value::Str(text)) => {
            return StringField::new(offset).set(mem, base, &text);
        }
        (_, other) => return Err(mem.report(slot.mismatch(other.type_name()))),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::{define_heap_struct, define_stack_struct};
    use kiln_core::MemoryConfig;

    fn mem() -> Memory {
        Memory::new(MemoryConfig::new(2048, 256)).unwrap()
    }

    #[test]
    fn heap_instances_start_zeroed() {
        let mut mem = mem();
        let ty = define_heap_struct(&mem, &[("a", "u32"), ("b", "f64")]).unwrap();
        let scratch = mem.allocate(ty.size()).unwrap();
        mem.space().fill(scratch, 0xff, ty.size());
        mem.free(scratch).unwrap();

        let obj = ty.allocate(&mut mem).unwrap();
        assert_eq!(obj.get(mem.space(), "a").unwrap(), Value::U32(0));
        assert_eq!(obj.get(mem.space(), "b").unwrap(), Value::F64(0.0));
        obj.deallocate(&mut mem).unwrap();
    }

    #[test]
    fn dynamic_round_trip_every_kind() {
        let mut mem = mem();
        let ty = define_heap_struct(
            &mem,
            &[
                ("i8", "i8"),
                ("u8", "au8"),
                ("i16", "i16"),
                ("u16", "u16"),
                ("i32", "ai32"),
                ("u32", "u32"),
                ("i64", "i64"),
                ("u64", "u64"),
                ("f32", "f32"),
                ("f64", "f64"),
                ("half", "f16"),
                ("n8", "unorm8"),
                ("n16", "unorm16"),
                ("label", "str8"),
            ],
        )
        .unwrap();
        let obj = ty.allocate(&mut mem).unwrap();

        let exact = [
            ("i8", Value::I8(-5)),
            ("u8", Value::U8(200)),
            ("i16", Value::I16(-30000)),
            ("u16", Value::U16(60000)),
            ("i32", Value::I32(-123_456)),
            ("u32", Value::U32(4_000_000_000)),
            ("i64", Value::I64(-1 << 40)),
            ("u64", Value::U64(u64::MAX)),
            ("f32", Value::F32(1.25)),
            ("f64", Value::F64(-0.1)),
            ("half", Value::F32(0.5)),
            ("label", Value::Str("kiln".into())),
        ];
        for (name, value) in &exact {
            obj.set(&mut mem, name, value.clone()).unwrap();
        }
        for (name, value) in &exact {
            assert_eq!(&obj.get(mem.space(), name).unwrap(), value, "{name}");
        }

        obj.set(&mut mem, "n8", 0.4f32).unwrap();
        obj.set(&mut mem, "n16", 0.4f32).unwrap();
        let n8 = obj.get(mem.space(), "n8").unwrap().as_f64().unwrap();
        let n16 = obj.get(mem.space(), "n16").unwrap().as_f64().unwrap();
        assert!((n8 - 0.4).abs() <= 1.0 / 255.0);
        assert!((n16 - 0.4).abs() <= 1.0 / 65535.0);

        obj.deallocate(&mut mem).unwrap();
    }

    #[test]
    fn set_with_wrong_type_is_rejected() {
        let mut mem = mem();
        let ty = define_heap_struct(&mem, &[("n", "u16"), ("s", "str8")]).unwrap();
        let obj = ty.allocate(&mut mem).unwrap();
        assert!(matches!(
            obj.set(&mut mem, "n", 1u32),
            Err(MemError::FieldTypeMismatch { .. })
        ));
        assert!(matches!(
            obj.set(&mut mem, "s", 1.0f32),
            Err(MemError::FieldTypeMismatch { .. })
        ));
        assert!(matches!(
            obj.set(&mut mem, "nope", 1u16),
            Err(MemError::UnknownField { .. })
        ));
        obj.deallocate(&mut mem).unwrap();
    }

    #[test]
    fn deallocate_cascades_to_strings() {
        let mut mem = mem();
        let before = mem.reserved();
        let fields = [("first", "str8"), ("id", "u32"), ("last", "str8")];
        let ty = define_heap_struct(&mem, &fields).unwrap();
        let obj = ty.allocate(&mut mem).unwrap();
        obj.set(&mut mem, "first", "Ada").unwrap();
        obj.set(&mut mem, "last", "Lovelace").unwrap();
        assert!(mem.reserved() > before);
        obj.deallocate(&mut mem).unwrap();
        assert_eq!(mem.reserved(), before);
    }

    #[test]
    fn stack_instances_use_frames() {
        let mut mem = mem();
        let ty = define_stack_struct(&mem, &[("x", "f32"), ("y", "f32"), ("tag", "str8")]).unwrap();
        let sp = mem.stack().pointer();
        let heap = mem.reserved();

        let obj = ty.allocate(&mut mem).unwrap();
        assert_eq!(mem.stack().used(), ty.size());
        let x = ty.scalar::<f32>("x").unwrap();
        x.store(mem.space(), obj.ptr(), 3.5);
        obj.set(&mut mem, "tag", "tmp").unwrap();
        assert_eq!(obj.get(mem.space(), "x").unwrap(), Value::F32(3.5));

        obj.deallocate(&mut mem).unwrap();
        assert_eq!(mem.stack().pointer(), sp);
        assert_eq!(mem.reserved(), heap);
    }

    #[test]
    fn stack_overflow_is_reported() {
        let mut mem = Memory::new(MemoryConfig::new(256, 16)).unwrap();
        let ty = define_stack_struct(&mem, &[("a", "f64"), ("b", "f64"), ("c", "f64")]).unwrap();
        assert!(matches!(
            ty.allocate(&mut mem),
            Err(MemError::StackOverflow { .. })
        ));
    }

    #[test]
    fn deallocate_completes_when_a_string_release_fails() {
        let mut mem = mem();
        let heap = mem.reserved();
        let sp = mem.stack().pointer();

        let ty = define_stack_struct(&mem, &[("tag", "str8"), ("n", "u32")]).unwrap();
        let obj = ty.allocate(&mut mem).unwrap();
        let tag = ty.string("tag").unwrap();
        mem.space().write::<u32>(obj.ptr().add(tag.offset()), 12);
        assert_eq!(
            obj.deallocate(&mut mem),
            Err(MemError::BadPointer { ptr: Ptr(12) })
        );
        assert_eq!(mem.stack().pointer(), sp);

        let ty = define_heap_struct(&mem, &[("a", "str8"), ("b", "str8")]).unwrap();
        let obj = ty.allocate(&mut mem).unwrap();
        obj.set(&mut mem, "b", "kept").unwrap();
        let a = ty.string("a").unwrap();
        mem.space().write::<u32>(obj.ptr().add(a.offset()), 12);
        assert!(obj.deallocate(&mut mem).is_err());
        assert_eq!(mem.reserved(), heap);
    }

    #[test]
    fn failed_reads_reach_handler() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        let hits = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&hits);
        let mut config = MemoryConfig::new(1024, 64);
        config.error_handler = Some(Arc::new(move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        }));
        let mut mem = Memory::new(config).unwrap();
        let ty = define_heap_struct(&mem, &[("n", "u16")]).unwrap();
        let obj = ty.allocate(&mut mem).unwrap();
        assert!(matches!(
            obj.get(mem.space(), "missing"),
            Err(MemError::UnknownField { .. })
        ));
        assert!(obj.set(&mut mem, "missing", 1u16).is_err());
        assert_eq!(hits.load(Ordering::SeqCst), 2);
        obj.deallocate(&mut mem).unwrap();
    }
}
