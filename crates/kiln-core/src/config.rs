//! Memory context configuration.

use std::fmt;
use std::ops::Range;
use std::sync::Arc;

use crate::buffer::SharedBuffer;
use crate::error::MemError;
use crate::ptr::{checked_align_up, NULL_GUARD};
use crate::space::AddressSpace;

/// Callback invoked with every fatal error before it is returned.
///
/// The handler observes; it cannot suppress the error. A handler that
/// panics or aborts turns fatal errors into process termination.
pub type ErrorHandler = Arc<dyn Fn(&MemError) + Send + Sync>;

/// Routes fatal errors to the log and the configured [`ErrorHandler`].
///
/// Cloned into every object that can raise a fatal error away from the
/// owning context, so all of them reach the same handler.
#[derive(Clone, Default)]
pub struct Reporter {
    handler: Option<ErrorHandler>,
}

impl Reporter {
    /// A reporter that calls `handler`, if any, after logging.
    pub fn new(handler: Option<ErrorHandler>) -> Self {
        Self { handler }
    }

    /// Whether a handler is installed.
    pub fn has_handler(&self) -> bool {
        self.handler.is_some()
    }

    /// Log `err`, pass it to the handler, and hand it back for returning.
    pub fn report(&self, err: MemError) -> MemError {
        log::error!("kiln: {err}");
        if let Some(handler) = &self.handler {
            handler(&err);
        }
        err
    }
}

impl fmt::Debug for Reporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reporter")
            .field("handler", &self.handler.is_some())
            .finish()
    }
}

/// Host capabilities, resolved once when the context is built.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Capabilities {
    /// Whether the buffer may be shared across threads. Atomic and futex
    /// field accessors are only generated when this is set.
    pub shared_memory: bool,
    /// Whether 64-bit integer field kinds are available.
    pub int64: bool,
    /// Whether the owning thread may block. Futex `wait` fails with
    /// [`MemError::BlockingDisallowed`] when this is clear.
    pub can_block: bool,
}

impl Default for Capabilities {
    fn default() -> Self {
        Self {
            shared_memory: true,
            int64: true,
            can_block: true,
        }
    }
}

/// Configuration for a memory context.
///
/// Controls region sizing, the backing buffer, and the capabilities that
/// gate atomic and blocking operations. All values are read once at
/// construction.
#[derive(Clone)]
pub struct MemoryConfig {
    /// Bytes available to general-purpose allocation.
    ///
    /// Default: 128 KiB.
    pub heap_size: usize,

    /// Bytes reserved for the stack allocator.
    ///
    /// Default: 32 KiB. Must be non-zero.
    pub stack_size: usize,

    /// Called with each fatal error before it is returned to the caller.
    pub error_handler: Option<ErrorHandler>,

    /// Externally supplied backing buffer. `None` allocates a fresh one
    /// sized to fit `heap_size + stack_size`.
    pub backing: Option<SharedBuffer>,

    /// First byte of the view into the buffer (aligned up to 8).
    ///
    /// Together with `view_end`, zero means "not set".
    pub view_start: usize,

    /// One past the last byte of the view (aligned down to 8).
    pub view_end: usize,

    /// Host capability flags.
    pub capabilities: Capabilities,
}

impl MemoryConfig {
    /// Default general-purpose heap size: 128 KiB.
    pub const DEFAULT_HEAP_SIZE: usize = 128 * 1024;

    /// Default stack size: 32 KiB.
    pub const DEFAULT_STACK_SIZE: usize = 32 * 1024;

    /// Create a config with the given heap and stack sizes and defaults
    /// for everything else.
    pub fn new(heap_size: usize, stack_size: usize) -> Self {
        Self {
            heap_size,
            stack_size,
            error_handler: None,
            backing: None,
            view_start: 0,
            view_end: 0,
            capabilities: Capabilities::default(),
        }
    }

    /// The requested view range, realigned to 8 bytes, if one was set.
    pub fn view_range(&self) -> Option<Range<usize>> {
        if (self.view_start | self.view_end) == 0 {
            return None;
        }
        Some((self.view_start.saturating_add(7) & !7)..(self.view_end & !7))
    }

    /// Bytes the pool needs: both regions rounded to 8, plus the null
    /// guard.
    pub fn required_bytes(&self) -> Result<usize, MemError> {
        checked_align_up(self.heap_size, 8)
            .zip(checked_align_up(self.stack_size, 8))
            .and_then(|(heap, stack)| heap.checked_add(stack))
            .and_then(|n| n.checked_add(NULL_GUARD))
            .filter(|&n| n <= u32::MAX as usize)
            .ok_or_else(|| MemError::InvalidConfig {
                reason: format!(
                    "heap {} + stack {} bytes exceeds the 32-bit address space",
                    self.heap_size, self.stack_size
                ),
            })
    }

    /// Check structural invariants without allocating.
    pub fn validate(&self) -> Result<(), MemError> {
        if self.stack_size == 0 {
            return Err(MemError::InvalidConfig {
                reason: "stack_size must be non-zero".into(),
            });
        }
        let required = self.required_bytes()?;
        if let Some(range) = self.view_range() {
            if range.end <= range.start {
                return Err(MemError::InvalidConfig {
                    reason: format!(
                        "view range {}..{} is empty after alignment",
                        self.view_start, self.view_end
                    ),
                });
            }
            if range.end - range.start < required {
                return Err(MemError::RegionTooSmall {
                    required,
                    available: range.end - range.start,
                });
            }
            if range.end - range.start > u32::MAX as usize {
                return Err(MemError::InvalidConfig {
                    reason: "view range exceeds the 32-bit address space".into(),
                });
            }
        }
        if let Some(buffer) = &self.backing {
            let available = match self.view_range() {
                Some(range) if range.end > buffer.len() => {
                    return Err(MemError::RegionTooSmall {
                        required: range.end,
                        available: buffer.len(),
                    });
                }
                Some(_) => return Ok(()),
                None => buffer.len(),
            };
            if available < required {
                return Err(MemError::RegionTooSmall {
                    required,
                    available,
                });
            }
            if available > u32::MAX as usize {
                return Err(MemError::InvalidConfig {
                    reason: "backing buffer exceeds the 32-bit address space".into(),
                });
            }
        }
        Ok(())
    }

    /// Validate and build the address space this config describes.
    ///
    /// With a view range or an external buffer, the whole view is used;
    /// otherwise a buffer of exactly [`required_bytes`](Self::required_bytes)
    /// is allocated.
    pub fn address_space(&self) -> Result<AddressSpace, MemError> {
        self.validate()?;
        let range = self.view_range();
        match (&self.backing, range) {
            (Some(buffer), range) => AddressSpace::from_shared(buffer.clone(), range),
            (None, Some(range)) => {
                // A view range without a buffer: allocate enough to cover it.
                AddressSpace::from_shared(SharedBuffer::new(range.end), Some(range))
            }
            (None, None) => Ok(AddressSpace::new(self.required_bytes()?)),
        }
    }
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self::new(Self::DEFAULT_HEAP_SIZE, Self::DEFAULT_STACK_SIZE)
    }
}

impl fmt::Debug for MemoryConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryConfig")
            .field("heap_size", &self.heap_size)
            .field("stack_size", &self.stack_size)
            .field("error_handler", &self.error_handler.is_some())
            .field("backing", &self.backing)
            .field("view_start", &self.view_start)
            .field("view_end", &self.view_end)
            .field("capabilities", &self.capabilities)
            .finish()
    }
}
