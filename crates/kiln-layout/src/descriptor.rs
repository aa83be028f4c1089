//! Field descriptors.

use std::fmt;

use kiln_core::MemError;

use crate::kind::{parse_tag, FieldKind};

/// Name, kind and atomicity of one struct field.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldDescriptor {
    name: String,
    kind: FieldKind,
    atomic: bool,
}

impl FieldDescriptor {
    /// A plain field.
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
            atomic: false,
        }
    }

    /// An atomic field. Eligibility is checked when the layout is built.
    pub fn atomic(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
            atomic: true,
        }
    }

    /// Build a descriptor from a tag string such as `"au16"`.
    pub fn parse(name: impl Into<String>, tag: &str) -> Result<Self, MemError> {
        let (kind, atomic) = parse_tag(tag)?;
        Ok(Self {
            name: name.into(),
            kind,
            atomic,
        })
    }

    /// Field name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Storage kind.
    pub fn kind(&self) -> FieldKind {
        self.kind
    }

    /// Whether the field was declared atomic.
    pub fn is_atomic(&self) -> bool {
        self.atomic
    }

    /// Bytes the field occupies.
    pub fn byte_size(&self) -> usize {
        self.kind.size()
    }

    /// The tag this descriptor would be declared with, e.g. `"ai32"`.
    pub fn tag(&self) -> String {
        if self.atomic {
            format!("a{}", self.kind.tag())
        } else {
            self.kind.tag().to_string()
        }
    }
}

impl fmt::Display for FieldDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name, self.tag())
    }
}

/// Parse a flat `[name, tag, name, tag, ...]` list.
///
/// An odd-length list fails with [`MemError::MalformedDescriptors`].
pub fn parse_flat(list: &[&str]) -> Result<Vec<FieldDescriptor>, MemError> {
    if list.len() % 2 != 0 {
        return Err(MemError::MalformedDescriptors {
            reason: format!(
                "expected name/type pairs, got {} entries",
                list.len()
            ),
        });
    }
    list.chunks_exact(2)
        .map(|pair| FieldDescriptor::parse(pair[0], pair[1]))
        .collect()
}

/// Parse `(name, tag)` pairs.
pub fn parse_pairs(pairs: &[(&str, &str)]) -> Result<Vec<FieldDescriptor>, MemError> {
    pairs
        .iter()
        .map(|&(name, tag)| FieldDescriptor::parse(name, tag))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_reflects_atomicity() {
        assert_eq!(FieldDescriptor::atomic("n", FieldKind::U16).tag(), "au16");
        assert_eq!(FieldDescriptor::new("n", FieldKind::Str8).tag(), "str8");
        assert_eq!(
            FieldDescriptor::parse("lock", "ai32").unwrap().to_string(),
            "lock: ai32"
        );
    }

    #[test]
    fn flat_list_pairs_up() {
        let fields = parse_flat(&["x", "f32", "y", "f32", "hits", "au32"]).unwrap();
        assert_eq!(fields.len(), 3);
        assert_eq!(fields[2].name(), "hits");
        assert!(fields[2].is_atomic());
    }

    #[test]
    fn odd_flat_list_is_malformed() {
        assert!(matches!(
            parse_flat(&["x", "f32", "y"]),
            Err(MemError::MalformedDescriptors { .. })
        ));
    }

    #[test]
    fn bad_tag_in_pairs_is_reported() {
        assert_eq!(
            parse_pairs(&[("x", "f32"), ("y", "f128")]),
            Err(MemError::InvalidFieldType { tag: "f128".into() })
        );
    }
}
