//! Benchmark profiles and workloads for the Kiln memory layer.
//!
//! - [`reference_memory`]: 1 MiB heap, 64 KiB stack
//! - [`churn_sizes`]: deterministic allocation size sequence
//! - [`fragment`]: leave the heap checkerboarded before a measurement

#![forbid(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]

use kiln_core::{MemError, MemoryConfig, Ptr};
use kiln_heap::Memory;

/// A context sized for benchmarks: 1 MiB heap, 64 KiB stack.
pub fn reference_memory() -> Result<Memory, MemError> {
    Memory::new(MemoryConfig::new(1024 * 1024, 64 * 1024))
}

/// `n` allocation sizes between 8 and 256 bytes from a fixed linear
/// congruential sequence, so every run measures the same workload.
pub fn churn_sizes(n: usize, seed: u64) -> Vec<usize> {
    let mut state = seed;
    (0..n)
        .map(|_| {
            state = state
                .wrapping_mul(6_364_136_223_846_793_005)
                .wrapping_add(1_442_695_040_888_963_407);
            8 + (state >> 33) as usize % 249
        })
        .collect()
}

/// Allocate `count` blocks of `size` bytes and free every other one,
/// leaving `count / 2` free holes between live blocks. Returns the live
/// blocks.
pub fn fragment(mem: &mut Memory, count: usize, size: usize) -> Vec<Ptr> {
    let blocks: Vec<Ptr> = (0..count).filter_map(|_| mem.allocate(size)).collect();
    let mut live = Vec::with_capacity(blocks.len() / 2 + 1);
    for (i, ptr) in blocks.into_iter().enumerate() {
        if i % 2 == 0 {
            // Holes come from blocks the heap handed out, so free cannot fail.
            let _ = mem.free(ptr);
        } else {
            live.push(ptr);
        }
    }
    live
}
