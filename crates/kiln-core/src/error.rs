//! Error types for the Kiln memory layer.
//!
//! One enum covers the three failure classes: configuration errors raised
//! while building a context or defining a struct type, exhaustion of a
//! region, and usage errors such as freeing an untracked offset.

use std::error::Error;
use std::fmt;

use crate::ptr::Ptr;

/// Errors that can occur while configuring or operating on memory.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MemError {
    /// An operation that must allocate to keep its contract could not.
    OutOfMemory {
        /// Number of bytes requested.
        requested: usize,
    },
    /// `free` (or a slab release) was given an offset that is not a live
    /// allocation: a double free, an interior pointer, or corruption.
    BadPointer {
        /// The offending offset.
        ptr: Ptr,
    },
    /// A stack frame would run past the end of the reserved stack region.
    StackOverflow {
        /// Number of bytes requested by the frame.
        requested: usize,
        /// Bytes left between the stack pointer and the region end.
        remaining: usize,
    },
    /// The backing region cannot hold the configured heap and stack.
    RegionTooSmall {
        /// Bytes required.
        required: usize,
        /// Bytes available.
        available: usize,
    },
    /// Configuration rejected for a reason other than size.
    InvalidConfig {
        /// Description of the problem.
        reason: String,
    },
    /// A field type tag that names no supported kind.
    InvalidFieldType {
        /// The unrecognised tag.
        tag: String,
    },
    /// A descriptor list that is not a sequence of `name, type` pairs.
    MalformedDescriptors {
        /// Description of the problem.
        reason: String,
    },
    /// Two fields of one struct share a name.
    DuplicateField {
        /// The repeated name.
        name: String,
    },
    /// A field name that the struct does not declare.
    UnknownField {
        /// The requested name.
        name: String,
    },
    /// An accessor or value whose type does not match the field's kind.
    FieldTypeMismatch {
        /// The field name.
        name: String,
        /// The kind the field was declared with.
        declared: String,
        /// The kind the caller asked for.
        requested: String,
    },
    /// An atomic declaration on a kind that has no atomic operations.
    AtomicIneligible {
        /// The field name.
        name: String,
        /// The field's kind.
        kind: String,
    },
    /// An atomic declaration or accessor while shared memory is disabled.
    AtomicsUnavailable {
        /// The field name.
        name: String,
    },
    /// A 64-bit integer field while 64-bit views are disabled.
    Int64Unavailable {
        /// The field name.
        name: String,
    },
    /// Futex wait/notify requested on a field that is not an atomic
    /// 32-bit integer.
    FutexIneligible {
        /// The field name.
        name: String,
    },
    /// A blocking wait in a context configured as non-blocking.
    BlockingDisallowed,
    /// A bitfield element width outside `1..=31`.
    InvalidBitWidth {
        /// The rejected width.
        bits: u32,
    },
    /// A lookaside pool with zero records or zero-sized records.
    InvalidRecordSize {
        /// Requested record size in bytes.
        record_size: usize,
        /// Requested record count.
        count: usize,
    },
    /// A string that cannot be stored as NUL-terminated bytes.
    InvalidString {
        /// Description of the problem.
        reason: String,
    },
}

impl fmt::Display for MemError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OutOfMemory { requested } => {
                write!(f, "out of memory: requested {requested} bytes")
            }
            Self::BadPointer { ptr } => {
                write!(f, "bad pointer {ptr} passed to free")
            }
            Self::StackOverflow {
                requested,
                remaining,
            } => {
                write!(
                    f,
                    "stack overflow: frame of {requested} bytes, {remaining} bytes remaining"
                )
            }
            Self::RegionTooSmall {
                required,
                available,
            } => {
                write!(
                    f,
                    "region too small: {required} bytes required, {available} bytes available"
                )
            }
            Self::InvalidConfig { reason } => write!(f, "invalid config: {reason}"),
            Self::InvalidFieldType { tag } => write!(f, "type {tag} is not a valid type"),
            Self::MalformedDescriptors { reason } => {
                write!(f, "malformed descriptor list: {reason}")
            }
            Self::DuplicateField { name } => write!(f, "duplicate field '{name}'"),
            Self::UnknownField { name } => write!(f, "unknown field '{name}'"),
            Self::FieldTypeMismatch {
                name,
                declared,
                requested,
            } => {
                write!(
                    f,
                    "field '{name}' is declared {declared}, requested as {requested}"
                )
            }
            Self::AtomicIneligible { name, kind } => {
                write!(f, "field '{name}' of type {kind} cannot be atomic")
            }
            Self::AtomicsUnavailable { name } => {
                write!(f, "field '{name}' is atomic but shared memory is disabled")
            }
            Self::Int64Unavailable { name } => {
                write!(f, "field '{name}' needs 64-bit views, which are disabled")
            }
            Self::FutexIneligible { name } => {
                write!(f, "only atomic 32-bit fields may use futex wait/notify ('{name}')")
            }
            Self::BlockingDisallowed => write!(f, "blocking wait is not allowed in this context"),
            Self::InvalidBitWidth { bits } => {
                write!(f, "bitfield width {bits} is outside 1..=31")
            }
            Self::InvalidRecordSize { record_size, count } => {
                write!(
                    f,
                    "invalid lookaside pool: {count} records of {record_size} bytes"
                )
            }
            Self::InvalidString { reason } => write!(f, "invalid string: {reason}"),
        }
    }
}

impl Error for MemError {}
