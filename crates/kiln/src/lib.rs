//! Kiln: manual memory management over one contiguous, shareable byte
//! buffer.
//!
//! This is the top-level facade crate that re-exports the public API from
//! all Kiln sub-crates. For most users, adding `kiln` as a single dependency
//! is sufficient.
//!
//! # Quick start
//!
//! ```rust
//! use kiln::prelude::*;
//!
//! let mut mem = Memory::new(MemoryConfig::new(4096, 1024)).unwrap();
//!
//! // Define a struct type and allocate an instance on the heap.
//! let particle = define_heap_struct(
//!     &mem,
//!     &[("id", "u32"), ("mass", "f32"), ("hits", "au32"), ("name", "str8")],
//! )
//! .unwrap();
//! let p = particle.allocate(&mut mem).unwrap();
//!
//! // Typed accessors are resolved once, then applied to any instance.
//! let mass = particle.scalar::<f32>("mass").unwrap();
//! mass.store(mem.space(), p.ptr(), 1.5);
//! let hits = particle.atomic::<u32>("hits").unwrap();
//! hits.fetch_add(mem.space(), p.ptr(), 1);
//!
//! // Or go through the name-based path.
//! p.set(&mut mem, "name", "proton").unwrap();
//! assert_eq!(p.get(mem.space(), "name").unwrap(), Value::Str("proton".into()));
//!
//! // Deallocation releases the owned string first.
//! p.deallocate(&mut mem).unwrap();
//! ```
//!
//! # Modules
//!
//! | Module | Sub-crate | Contents |
//! |--------|-----------|----------|
//! | [`core`] | `kiln-core` | `SharedBuffer`, `AddressSpace`, `Ptr`, config, errors |
//! | [`heap`] | `kiln-heap` | `Memory`, `Pool`, `StackAllocator`, `LookasidePool` |
//! | [`layout`] | `kiln-layout` | Struct layouts, field accessors, `BitfieldArray` |

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

/// Shared buffer, typed views, configuration and errors (`kiln-core`).
pub use kiln_core as core;

/// Allocators and the memory context (`kiln-heap`).
pub use kiln_heap as heap;

/// Struct layouts, field accessors and bitfield arrays (`kiln-layout`).
pub use kiln_layout as layout;

/// Common imports for typical Kiln usage.
///
/// ```rust
/// use kiln::prelude::*;
/// ```
pub mod prelude {
    // Core
    pub use kiln_core::{
        AddressSpace, Capabilities, MemError, MemoryConfig, Ptr, SharedBuffer, WaitOutcome,
    };

    // Allocators
    pub use kiln_heap::{LookasidePool, Memory, StackFrame};

    // Layouts
    pub use kiln_layout::{
        define_heap_struct, define_stack_struct, BitfieldArray, FieldKind, HeapStruct,
        LayoutBuilder, StackStruct, Value,
    };
}
