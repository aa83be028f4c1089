//! Allocators for the Kiln memory layer.
//!
//! Everything here hands out [`Ptr`](kiln_core::Ptr) offsets into one
//! [`AddressSpace`](kiln_core::AddressSpace):
//!
//! ```text
//! Memory (context: owns the address space and both allocators)
//! ├── Pool            first-fit free list over PageList (split + coalesce)
//! │   └── PageList    index-addressed arena of pages, offset order
//! ├── StackAllocator  LIFO frames inside one Pool allocation
//! └── LookasidePool   fixed-size slots inside one Pool allocation,
//!                     free-list links stored inline in the slots
//! ```
//!
//! None of these types are internally synchronised. Mutation goes through
//! `&mut Memory`; share the context across threads behind a lock, or keep
//! allocation on one owning thread and hand other threads the buffer.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod lookaside;
pub mod memory;
pub mod page;
pub mod pool;
pub mod stack;

// Public re-exports for the primary API surface.
pub use lookaside::LookasidePool;
pub use memory::Memory;
pub use page::{Page, PageList};
pub use pool::Pool;
pub use stack::{StackAllocator, StackFrame};
