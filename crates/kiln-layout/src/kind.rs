//! Field kinds and their type tags.

use std::fmt;

use kiln_core::{Element, MemError};

/// Storage kind of a struct field.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FieldKind {
    /// Signed 8-bit integer.
    I8,
    /// Unsigned 8-bit integer.
    U8,
    /// Signed 16-bit integer.
    I16,
    /// Unsigned 16-bit integer.
    U16,
    /// Signed 32-bit integer.
    I32,
    /// Unsigned 32-bit integer.
    U32,
    /// Signed 64-bit integer. Requires the `int64` capability.
    I64,
    /// Unsigned 64-bit integer. Requires the `int64` capability.
    U64,
    /// 32-bit float.
    F32,
    /// 64-bit float.
    F64,
    /// IEEE half float, read and written as `f32`.
    F16,
    /// `u8` scaled to `[0, 1]`.
    Unorm8,
    /// `u16` scaled to `[0, 1]`.
    Unorm16,
    /// Owned NUL-terminated string; the field holds a 4-byte heap offset.
    Str8,
}

impl FieldKind {
    /// Every kind, in tag-table order.
    pub const ALL: [FieldKind; 14] = [
        Self::I8,
        Self::U8,
        Self::I16,
        Self::U16,
        Self::I32,
        Self::U32,
        Self::I64,
        Self::U64,
        Self::F32,
        Self::F64,
        Self::F16,
        Self::Unorm8,
        Self::Unorm16,
        Self::Str8,
    ];

    /// Bytes occupied in a struct, which is also the field's alignment.
    pub fn size(self) -> usize {
        match self {
            Self::I8 | Self::U8 | Self::Unorm8 => 1,
            Self::I16 | Self::U16 | Self::F16 | Self::Unorm16 => 2,
            Self::I32 | Self::U32 | Self::F32 | Self::Str8 => 4,
            Self::I64 | Self::U64 | Self::F64 => 8,
        }
    }

    /// The tag string, e.g. `"unorm16"`.
    pub fn tag(self) -> &'static str {
        match self {
            Self::I8 => "i8",
            Self::U8 => "u8",
            Self::I16 => "i16",
            Self::U16 => "u16",
            Self::I32 => "i32",
            Self::U32 => "u32",
            Self::I64 => "i64",
            Self::U64 => "u64",
            Self::F32 => "f32",
            Self::F64 => "f64",
            Self::F16 => "f16",
            Self::Unorm8 => "unorm8",
            Self::Unorm16 => "unorm16",
            Self::Str8 => "str8",
        }
    }

    /// Look up a kind by its tag, without an atomic prefix.
    pub fn from_tag(tag: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.tag() == tag)
    }

    /// Whether the kind may be declared atomic.
    pub fn atomic_eligible(self) -> bool {
        matches!(
            self,
            Self::I8 | Self::U8 | Self::I16 | Self::U16 | Self::I32 | Self::U32
        )
    }

    /// Whether an atomic field of this kind supports futex wait/notify.
    pub fn futex_eligible(self) -> bool {
        matches!(self, Self::I32 | Self::U32)
    }

    /// Whether the kind needs 64-bit integer support.
    pub fn is_int64(self) -> bool {
        matches!(self, Self::I64 | Self::U64)
    }

    /// Whether the kind is stored in an encoded form and read as `f32`.
    pub fn is_encoded(self) -> bool {
        matches!(self, Self::F16 | Self::Unorm8 | Self::Unorm16)
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Parse a tag such as `"u16"` or `"ai32"` into a kind and an atomic flag.
///
/// A leading `a` marks the field atomic. Unknown tags fail with
/// [`MemError::InvalidFieldType`].
pub fn parse_tag(tag: &str) -> Result<(FieldKind, bool), MemError> {
    if let Some(kind) = FieldKind::from_tag(tag) {
        return Ok((kind, false));
    }
    tag.strip_prefix('a')
        .and_then(FieldKind::from_tag)
        .map(|kind| (kind, true))
        .ok_or_else(|| MemError::InvalidFieldType { tag: tag.into() })
}

/// A native scalar type that backs exactly one [`FieldKind`].
pub trait NativeKind: Element {
    /// The kind this type reads and writes.
    const KIND: FieldKind;
}

macro_rules! native_kind {
    ($($t:ty => $kind:ident),* $(,)?) => {
        $(impl NativeKind for $t {
            const KIND: FieldKind = FieldKind::$kind;
        })*
    };
}

native_kind! {
    i8 => I8,
    u8 => U8,
    i16 => I16,
    u16 => U16,
    i32 => I32,
    u32 => U32,
    i64 => I64,
    u64 => U64,
    f32 => F32,
    f64 => F64,
}
