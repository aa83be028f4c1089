//! Reusable contexts and field lists.
//!
//! - [`small_memory`]: 1 KiB heap, 256 B stack, default capabilities.
//! - [`memory_with`]: arbitrary sizes and capabilities.
//! - [`counting_memory`]: like `memory_with`, plus a handler that counts
//!   reported errors.
//! - [`MIXED_FIELDS`], [`PARTICLE_FIELDS`], [`COUNTER_FIELDS`]: tag lists
//!   for struct definitions.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use kiln_core::{Capabilities, MemoryConfig};
use kiln_heap::Memory;

/// Mixed widths that force padding: offsets 0, 4, 8, 16.
pub const MIXED_FIELDS: &[(&str, &str)] = &[("a", "u8"), ("b", "u32"), ("c", "u16"), ("d", "f64")];

/// One of every encoded kind plus an owned string.
pub const PARTICLE_FIELDS: &[(&str, &str)] = &[
    ("id", "u32"),
    ("mass", "f32"),
    ("charge", "f16"),
    ("alpha", "unorm8"),
    ("depth", "unorm16"),
    ("label", "str8"),
];

/// A futex-capable counter and an atomic byte flag.
pub const COUNTER_FIELDS: &[(&str, &str)] = &[("count", "ai32"), ("flag", "au8")];

pub fn small_memory() -> Memory {
    memory_with(1024, 256, Capabilities::default())
}

pub fn memory_with(heap: usize, stack: usize, capabilities: Capabilities) -> Memory {
    let mut config = MemoryConfig::new(heap, stack);
    config.capabilities = capabilities;
    Memory::new(config).expect("fixture config is valid")
}

pub fn counting_memory(
    heap: usize,
    stack: usize,
    capabilities: Capabilities,
) -> (Memory, Arc<AtomicUsize>) {
    let hits = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&hits);
    let mut config = MemoryConfig::new(heap, stack);
    config.capabilities = capabilities;
    config.error_handler = Some(Arc::new(move |_| {
        seen.fetch_add(1, Ordering::SeqCst);
    }));
    let mem = Memory::new(config).expect("fixture config is valid");
    (mem, hits)
}
