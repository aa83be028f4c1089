//! The memory context.
//!
//! [`Memory`] owns the address space, the pool that manages it, and the
//! stack allocator carved out of the pool at construction. Every
//! higher-level object (struct layouts, bitfield arrays, lookaside slabs)
//! works against a `Memory` passed in explicitly.

use std::fmt;

use kiln_core::{
    align_up, checked_align_up, AddressSpace, Capabilities, MemError, MemoryConfig, Ptr, Reporter,
    SharedBuffer, NULL_GUARD,
};

use crate::lookaside::LookasidePool;
use crate::pool::Pool;
use crate::stack::{StackAllocator, StackFrame};

/// An address space with its heap and stack allocators.
///
/// Built once from a [`MemoryConfig`]. The stack region is the first pool
/// allocation; the rest of the pool serves [`allocate`](Self::allocate).
pub struct Memory {
    space: AddressSpace,
    pool: Pool,
    stack: StackAllocator,
    capabilities: Capabilities,
    reporter: Reporter,
}

impl Memory {
    /// Build a context from `config`.
    ///
    /// Configuration errors are passed to the configured error handler
    /// before being returned.
    pub fn new(config: MemoryConfig) -> Result<Self, MemError> {
        let reporter = Reporter::new(config.error_handler.clone());
        let raise = |err: MemError| reporter.report(err);

        let space = config.address_space().map_err(raise)?;
        let capacity = (space.len() - NULL_GUARD) & !7;
        let capacity = u32::try_from(capacity).map_err(|_| {
            raise(MemError::InvalidConfig {
                reason: "address space exceeds 32 bits".into(),
            })
        })?;
        let mut pool = Pool::new(capacity);

        let stack_bytes = align_up(config.stack_size, 8);
        let stack_base = match u32::try_from(stack_bytes).ok().and_then(|n| pool.allocate(n)) {
            Some(base) => base,
            None => {
                return Err(raise(MemError::RegionTooSmall {
                    required: stack_bytes + NULL_GUARD,
                    available: pool.size(),
                }));
            }
        };
        let stack = StackAllocator::new(stack_base, stack_bytes as u32);

        log::debug!(
            "kiln: memory context {} bytes (heap {}, stack {} at {stack_base})",
            space.len(),
            pool.largest_free(),
            stack_bytes
        );

        Ok(Self {
            space,
            pool,
            stack,
            capabilities: config.capabilities,
            reporter,
        })
    }

    /// Build a context with [`MemoryConfig::default`].
    pub fn with_defaults() -> Result<Self, MemError> {
        Self::new(MemoryConfig::default())
    }

    /// Log `err`, pass it to the error handler, and hand it back for
    /// returning.
    pub fn report(&self, err: MemError) -> MemError {
        self.reporter.report(err)
    }

    /// The reporter behind [`report`](Self::report), for objects that raise
    /// errors without access to the context.
    pub fn reporter(&self) -> &Reporter {
        &self.reporter
    }

    // ── Heap ────────────────────────────────────────────────────

    /// Allocate `n` bytes (rounded up to 8) from the heap.
    ///
    /// Returns `None` for `n == 0` or when the heap is exhausted, including
    /// requests too large to address. The bytes are not cleared.
    pub fn allocate(&mut self, n: usize) -> Option<Ptr> {
        if n == 0 {
            return None;
        }
        let rounded = checked_align_up(n, 8).and_then(|r| u32::try_from(r).ok())?;
        self.pool.allocate(rounded)
    }

    /// Allocate `n` zeroed bytes, failing with [`MemError::OutOfMemory`]
    /// when the heap is exhausted.
    pub fn allocate_zeroed(&mut self, n: usize) -> Result<Ptr, MemError> {
        match self.allocate(n) {
            Some(ptr) => {
                self.space.zero(ptr, n);
                Ok(ptr)
            }
            None => Err(self.report(MemError::OutOfMemory { requested: n })),
        }
    }

    /// Release a heap allocation.
    pub fn free(&mut self, ptr: Ptr) -> Result<(), MemError> {
        self.pool.free(ptr).map_err(|err| self.report(err))
    }

    // ── Stack ───────────────────────────────────────────────────

    /// Open a stack frame of `size` bytes.
    pub fn stack_frame_begin(&mut self, size: usize) -> Result<StackFrame, MemError> {
        self.stack.begin(size).map_err(|err| self.report(err))
    }

    /// Close a stack frame and every frame opened after it.
    pub fn stack_frame_end(&mut self, frame: StackFrame) {
        self.stack.end(frame);
    }

    // ── Lookaside ───────────────────────────────────────────────

    /// Carve a slab of `count` records of `record_size` bytes out of the
    /// heap.
    pub fn build_lookaside(
        &mut self,
        record_size: usize,
        count: usize,
    ) -> Result<LookasidePool, MemError> {
        let sizes = LookasidePool::stride_for(record_size)
            .filter(|_| record_size > 0)
            .and_then(|stride| Some((stride, stride.checked_mul(count)?)))
            .filter(|&(_, b)| b > 0 && b <= u32::MAX as usize);
        let Some((stride, bytes)) = sizes else {
            return Err(self.report(MemError::InvalidRecordSize { record_size, count }));
        };
        let Some(base) = self.allocate(bytes) else {
            return Err(self.report(MemError::OutOfMemory { requested: bytes }));
        };
        log::debug!("kiln: lookaside slab {count} x {stride} bytes at {base}");
        Ok(LookasidePool::format(
            &self.space,
            base,
            stride as u32,
            count as u32,
        ))
    }

    /// Take a record from `slab`, or `None` when every slot is in use.
    pub fn alloc_record(&self, slab: &mut LookasidePool) -> Option<Ptr> {
        slab.alloc(&self.space)
    }

    /// Return a record to `slab`.
    ///
    /// Releasing a pointer that is not an allocated slot of `slab` is a
    /// [`MemError::BadPointer`], passed to the error handler.
    pub fn release_record(&self, slab: &mut LookasidePool, ptr: Ptr) -> Result<(), MemError> {
        slab.release(&self.space, ptr).map_err(|err| self.report(err))
    }

    /// Return a slab's bytes to the heap. Outstanding records become
    /// invalid.
    pub fn destroy_lookaside(&mut self, slab: LookasidePool) -> Result<(), MemError> {
        log::debug!(
            "kiln: destroy lookaside slab at {} ({} of {} free)",
            slab.base(),
            slab.available(),
            slab.count()
        );
        self.free(slab.base())
    }

    // ── Introspection ───────────────────────────────────────────

    /// The address space.
    pub fn space(&self) -> &AddressSpace {
        &self.space
    }

    /// The heap pool.
    pub fn pool(&self) -> &Pool {
        &self.pool
    }

    /// The stack allocator.
    pub fn stack(&self) -> &StackAllocator {
        &self.stack
    }

    /// Capabilities this context was built with.
    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    /// A handle to the backing buffer, for handing to other threads.
    pub fn shared_buffer(&self) -> SharedBuffer {
        self.space.shared_buffer().clone()
    }

    /// Total bytes managed by the pool.
    pub fn size(&self) -> usize {
        self.pool.size()
    }

    /// Bytes currently claimed from the pool, stack region included.
    pub fn reserved(&self) -> usize {
        self.pool.reserved()
    }
}

impl fmt::Debug for Memory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Memory")
            .field("size", &self.pool.size())
            .field("reserved", &self.pool.reserved())
            .field("stack", &self.stack)
            .field("capabilities", &self.capabilities)
            .field("error_handler", &self.reporter.has_handler())
            .finish()
    }
}

// Compile-time assertion: Memory is Send + Sync.
const _: fn() = || {
    fn assert<T: Send + Sync>() {}
    assert::<Memory>();
};
