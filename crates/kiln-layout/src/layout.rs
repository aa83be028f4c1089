//! The layout compiler.
//!
//! [`LayoutBuilder`] collects [`FieldDescriptor`]s in declaration order and
//! compiles them against the context's [`Capabilities`] into a
//! [`StructLayout`]: each field placed at the next offset aligned to its own
//! width, `size` being the final cursor. Accessors are then requested from
//! the layout by name, and the request fails unless the accessor matches
//! the field's declared kind and atomicity.

use indexmap::IndexMap;
use smallvec::SmallVec;

use kiln_core::{align_up, AtomicElement, Capabilities, MemError, Reporter};
use kiln_heap::Memory;

use crate::descriptor::{parse_flat, parse_pairs, FieldDescriptor};
use crate::field::{AtomicField, EncodedField, FutexField, FutexWord, ScalarField, StringField};
use crate::instance::{HeapStruct, StackStruct};
use crate::kind::{FieldKind, NativeKind};

/// A placed field: its descriptor and byte offset.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldSlot {
    descriptor: FieldDescriptor,
    offset: u32,
}

impl FieldSlot {
    /// Field name.
    pub fn name(&self) -> &str {
        self.descriptor.name()
    }

    /// Storage kind.
    pub fn kind(&self) -> FieldKind {
        self.descriptor.kind()
    }

    /// Whether the field is atomic.
    pub fn is_atomic(&self) -> bool {
        self.descriptor.is_atomic()
    }

    /// Byte offset within the struct.
    pub fn offset(&self) -> u32 {
        self.offset
    }

    /// The descriptor the field was declared with.
    pub fn descriptor(&self) -> &FieldDescriptor {
        &self.descriptor
    }

    pub(crate) fn mismatch(&self, requested: impl Into<String>) -> MemError {
        MemError::FieldTypeMismatch {
            name: self.name().to_string(),
            declared: self.descriptor.tag(),
            requested: requested.into(),
        }
    }
}

/// Ordered field descriptors, compiled into a [`StructLayout`].
#[derive(Clone, Debug, Default)]
pub struct LayoutBuilder {
    fields: SmallVec<[FieldDescriptor; 8]>,
}

impl LayoutBuilder {
    /// An empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a plain field.
    pub fn field(mut self, name: impl Into<String>, kind: FieldKind) -> Self {
        self.fields.push(FieldDescriptor::new(name, kind));
        self
    }

    /// Append an atomic field.
    pub fn atomic_field(mut self, name: impl Into<String>, kind: FieldKind) -> Self {
        self.fields.push(FieldDescriptor::atomic(name, kind));
        self
    }

    /// Append a descriptor.
    pub fn push(&mut self, descriptor: FieldDescriptor) {
        self.fields.push(descriptor);
    }

    /// Number of descriptors so far.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether no descriptors have been added.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Place every field and check it against `capabilities`.
    pub fn build(&self, capabilities: Capabilities) -> Result<StructLayout, MemError> {
        if self.fields.is_empty() {
            return Err(MemError::MalformedDescriptors {
                reason: "a struct needs at least one field".into(),
            });
        }
        let mut fields = IndexMap::with_capacity(self.fields.len());
        let mut cursor = 0usize;
        for descriptor in &self.fields {
            check_capabilities(descriptor, capabilities)?;
            let size = descriptor.byte_size();
            cursor = align_up(cursor, size);
            let offset = u32::try_from(cursor).map_err(|_| MemError::MalformedDescriptors {
                reason: "struct exceeds the 32-bit address space".into(),
            })?;
            let name = descriptor.name().to_string();
            if fields.contains_key(&name) {
                return Err(MemError::DuplicateField { name });
            }
            fields.insert(
                name,
                FieldSlot {
                    descriptor: descriptor.clone(),
                    offset,
                },
            );
            cursor += size;
        }
        log::trace!("compiled struct layout: {} fields, {cursor} bytes", fields.len());
        Ok(StructLayout {
            fields,
            size: cursor,
            capabilities,
            reporter: Reporter::default(),
        })
    }
}

impl FromIterator<FieldDescriptor> for LayoutBuilder {
    fn from_iter<I: IntoIterator<Item = FieldDescriptor>>(iter: I) -> Self {
        Self {
            fields: iter.into_iter().collect(),
        }
    }
}

fn check_capabilities(d: &FieldDescriptor, caps: Capabilities) -> Result<(), MemError> {
    let name = || d.name().to_string();
    if d.is_atomic() {
        if !d.kind().atomic_eligible() {
            return Err(MemError::AtomicIneligible {
                name: name(),
                kind: d.kind().tag().to_string(),
            });
        }
        if !caps.shared_memory {
            return Err(MemError::AtomicsUnavailable { name: name() });
        }
    }
    if d.kind().is_int64() && !caps.int64 {
        return Err(MemError::Int64Unavailable { name: name() });
    }
    Ok(())
}

/// A compiled struct type: named fields at fixed offsets and a total size.
///
/// Layouts defined through [`define_heap_struct`] and friends pass every
/// accessor error to the context's error handler before returning it.
#[derive(Clone, Debug)]
pub struct StructLayout {
    fields: IndexMap<String, FieldSlot>,
    size: usize,
    capabilities: Capabilities,
    reporter: Reporter,
}

impl StructLayout {
    /// Route accessor errors through `reporter`.
    pub fn with_reporter(mut self, reporter: Reporter) -> Self {
        self.reporter = reporter;
        self
    }

    /// The reporter accessor errors go through.
    pub fn reporter(&self) -> &Reporter {
        &self.reporter
    }

    /// Bytes one instance occupies.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Number of fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Always false; a layout has at least one field.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Capabilities the layout was compiled against.
    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    /// Fields in declaration order.
    pub fn fields(&self) -> impl Iterator<Item = &FieldSlot> {
        self.fields.values()
    }

    /// Look up a field by name.
    pub fn field(&self, name: &str) -> Result<&FieldSlot, MemError> {
        self.lookup(name).map_err(|err| self.reporter.report(err))
    }

    /// Byte offset of the named field.
    pub fn offset_of(&self, name: &str) -> Result<usize, MemError> {
        self.field(name).map(|slot| slot.offset() as usize)
    }

    /// Plain load/store accessor for a non-atomic field of type `T`.
    pub fn scalar<T: NativeKind>(&self, name: &str) -> Result<ScalarField<T>, MemError> {
        let slot = self.field(name)?;
        if slot.kind() != T::KIND || slot.is_atomic() {
            return Err(self.reporter.report(slot.mismatch(T::KIND.tag())));
        }
        Ok(ScalarField::new(slot.offset()))
    }

    /// Accessor for an `f16`, `unorm8` or `unorm16` field.
    pub fn encoded(&self, name: &str) -> Result<EncodedField, MemError> {
        let slot = self.field(name)?;
        EncodedField::for_kind(slot.kind(), slot.offset())
            .ok_or_else(|| self.reporter.report(slot.mismatch("f16, unorm8 or unorm16")))
    }

    /// Atomic accessor for a field declared atomic with type `T`.
    pub fn atomic<T: NativeKind + AtomicElement>(
        &self,
        name: &str,
    ) -> Result<AtomicField<T>, MemError> {
        let slot = self.field(name)?;
        if slot.kind() != T::KIND || !slot.is_atomic() {
            let requested = format!("a{}", T::KIND.tag());
            return Err(self.reporter.report(slot.mismatch(requested)));
        }
        Ok(AtomicField::new(slot.offset()))
    }

    /// Futex accessor for an atomic `i32` or `u32` field.
    ///
    /// The accessor's `wait` reports through this layout's reporter.
    pub fn futex<T: FutexWord>(&self, name: &str) -> Result<FutexField<T>, MemError> {
        let slot = self.field(name)?;
        if !slot.is_atomic() || !slot.kind().futex_eligible() {
            let err = MemError::FutexIneligible { name: name.into() };
            return Err(self.reporter.report(err));
        }
        if slot.kind() != T::KIND {
            let requested = format!("a{}", T::KIND.tag());
            return Err(self.reporter.report(slot.mismatch(requested)));
        }
        Ok(FutexField::new(
            slot.offset(),
            self.capabilities.can_block,
            self.reporter.clone(),
        ))
    }

    /// Accessor for a `str8` field.
    pub fn string(&self, name: &str) -> Result<StringField, MemError> {
        let slot = self.field(name)?;
        if slot.kind() != FieldKind::Str8 {
            return Err(self.reporter.report(slot.mismatch(FieldKind::Str8.tag())));
        }
        Ok(StringField::new(slot.offset()))
    }

    /// Look up a field without reporting a miss.
    pub(crate) fn lookup(&self, name: &str) -> Result<&FieldSlot, MemError> {
        self.fields
            .get(name)
            .ok_or_else(|| MemError::UnknownField { name: name.into() })
    }

    /// Accessors for every `str8` field, for teardown.
    pub(crate) fn string_fields(&self) -> impl Iterator<Item = StringField> + '_ {
        self.fields
            .values()
            .filter(|slot| slot.kind() == FieldKind::Str8)
            .map(|slot| StringField::new(slot.offset()))
    }
}

// ── Definition entry points ─────────────────────────────────────

fn compile(
    mem: &Memory,
    descriptors: Result<Vec<FieldDescriptor>, MemError>,
) -> Result<StructLayout, MemError> {
    descriptors
        .and_then(|d| d.into_iter().collect::<LayoutBuilder>().build(mem.capabilities()))
        .map(|layout| layout.with_reporter(mem.reporter().clone()))
        .map_err(|err| mem.report(err))
}

/// Define a heap-allocated struct type from `(name, tag)` pairs.
///
/// Errors are passed to the context's error handler before being returned.
pub fn define_heap_struct(mem: &Memory, fields: &[(&str, &str)]) -> Result<HeapStruct, MemError> {
    compile(mem, parse_pairs(fields)).map(HeapStruct::new)
}

/// Define a stack-allocated struct type from `(name, tag)` pairs.
pub fn define_stack_struct(mem: &Memory, fields: &[(&str, &str)]) -> Result<StackStruct, MemError> {
    compile(mem, parse_pairs(fields)).map(StackStruct::new)
}

/// Define a heap-allocated struct type from a flat `[name, tag, ...]` list.
pub fn define_heap_struct_flat(mem: &Memory, list: &[&str]) -> Result<HeapStruct, MemError> {
    compile(mem, parse_flat(list)).map(HeapStruct::new)
}

/// Define a stack-allocated struct type from a flat `[name, tag, ...]` list.
pub fn define_stack_struct_flat(mem: &Memory, list: &[&str]) -> Result<StackStruct, MemError> {
    compile(mem, parse_flat(list)).map(StackStruct::new)
}
