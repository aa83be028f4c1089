//! Struct layouts and packed arrays over a Kiln address space.
//!
//! Field lists are compiled once into a [`StructLayout`]; typed accessors
//! are then requested by name and applied to any instance base offset.
//!
//! # Architecture
//!
//! ```text
//! (name, tag) pairs / LayoutBuilder
//! └── StructLayout (IndexMap name -> FieldSlot{descriptor, offset}, size)
//!     ├── ScalarField<T>   plain load/store, ten native kinds
//!     ├── EncodedField     f16 / unorm8 / unorm16 as f32
//!     ├── AtomicField<T>   SeqCst load/store/CAS/fetch_*
//!     ├── FutexField<T>    wait/notify on atomic i32/u32
//!     └── StringField      owned NUL-terminated heap string
//! HeapStruct / StackStruct (lifecycle wrappers around Arc<StructLayout>)
//! └── HeapObject / StackObject (instances: get/set by name, deallocate)
//! BitfieldArray (1..=31-bit elements packed across u32 words)
//! ```

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod bitfield;
pub mod descriptor;
pub mod field;
pub mod half;
pub mod instance;
pub mod kind;
pub mod layout;
pub mod value;

// Public re-exports for the primary API surface.
pub use bitfield::BitfieldArray;
pub use descriptor::FieldDescriptor;
pub use field::{AtomicField, EncodedField, FutexField, FutexWord, ScalarField, StringField};
pub use instance::{HeapObject, HeapStruct, StackObject, StackStruct};
pub use kind::{parse_tag, FieldKind, NativeKind};
pub use layout::{
    define_heap_struct, define_heap_struct_flat, define_stack_struct, define_stack_struct_flat,
    FieldSlot, LayoutBuilder, StructLayout,
};
pub use value::Value;

// Compile-time assertion: layouts can be shared across threads.
const _: fn() = || {
    fn assert<T: Send + Sync>() {}
    assert::<StructLayout>();
    assert::<HeapStruct>();
    assert::<AtomicField<u32>>();
};
