//! Core types for the Kiln memory layer.
//!
//! This is the leaf crate of the workspace. It owns the shared byte buffer
//! every other crate allocates from, the typed numeric views over it, the
//! futex wait table, and the error and configuration types used throughout.
//!
//! # Architecture
//!
//! ```text
//! SharedBuffer (Arc<[AtomicU64]> + WaitTable, handed across threads)
//! └── AddressSpace (byte-offset view: start..end)
//!     ├── read/write::<T>        plain (Relaxed) typed access
//!     ├── load/store/fetch_*::<T> SeqCst atomic access
//!     ├── wait/notify            futex-style blocking on 32-bit words
//!     └── copy/fill/zero/cstr    block operations
//! ```
//!
//! Every byte is reached through an atomic cell, so an `AddressSpace` is
//! `Send + Sync` and can be shared without data races. Only `raw.rs`
//! contains `unsafe` code.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![deny(unsafe_code)]

pub mod buffer;
pub mod config;
pub mod element;
pub mod error;
pub mod futex;
pub mod ptr;
mod raw;
pub mod space;

// Public re-exports for the primary API surface.
pub use buffer::SharedBuffer;
pub use config::{Capabilities, ErrorHandler, MemoryConfig, Reporter};
pub use element::{AtomicElement, Element};
pub use error::MemError;
pub use futex::WaitOutcome;
pub use ptr::{align_up, checked_align_up, Ptr, ALIGN, NULL_GUARD};
pub use space::AddressSpace;
