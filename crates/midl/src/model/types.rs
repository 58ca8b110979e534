// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Type variants: scalars, strings, arrays, maps, handles, and references.

use serde::{Deserialize, Serialize};

use crate::registry::TypeKey;

// ============================================================================
// ScalarKind
// ============================================================================

/// Simple scalar kinds.
///
/// Width and alignment drive the struct field-layout policy in
/// [`crate::version`], so they are defined here next to the kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScalarKind {
    Bool,
    Int8,
    Int16,
    Int32,
    Int64,
    Uint8,
    Uint16,
    Uint32,
    Uint64,
    Float,
    Double,
}

impl ScalarKind {
    /// Size in bytes inside a serialized struct payload.
    ///
    /// Booleans report 1 here; the layout policy packs them 8 per byte and
    /// never consumes a full byte per flag.
    pub const fn size(self) -> u32 {
        match self {
            ScalarKind::Bool | ScalarKind::Int8 | ScalarKind::Uint8 => 1,
            ScalarKind::Int16 | ScalarKind::Uint16 => 2,
            ScalarKind::Int32 | ScalarKind::Uint32 | ScalarKind::Float => 4,
            ScalarKind::Int64 | ScalarKind::Uint64 | ScalarKind::Double => 8,
        }
    }

    /// Natural alignment (equals size for every scalar kind).
    pub const fn alignment(self) -> u32 {
        self.size()
    }

    pub const fn is_signed_integer(self) -> bool {
        matches!(
            self,
            ScalarKind::Int8 | ScalarKind::Int16 | ScalarKind::Int32 | ScalarKind::Int64
        )
    }

    pub const fn is_unsigned_integer(self) -> bool {
        matches!(
            self,
            ScalarKind::Uint8 | ScalarKind::Uint16 | ScalarKind::Uint32 | ScalarKind::Uint64
        )
    }

    pub const fn is_floating_point(self) -> bool {
        matches!(self, ScalarKind::Float | ScalarKind::Double)
    }
}

// ============================================================================
// HandleKind
// ============================================================================

/// Transport handle kinds carried through the type graph.
///
/// The semantic core only records the kind; binding a handle to a live
/// channel belongs to the excluded transport layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HandleKind {
    Generic,
    MessagePipe,
    DataPipeConsumer,
    DataPipeProducer,
    SharedBuffer,
}

// ============================================================================
// TypeReference
// ============================================================================

/// A by-name or by-key reference to a user-defined type.
///
/// Invariant: at least one of `identifier` / `type_key` is set, and
/// `type_key` is set exactly when the reference has been resolved. The
/// resolver is the only writer of `type_key`.
///
/// `is_interface_request` marks the request side of an interface binding;
/// the resolved target must then be an interface declaration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeReference {
    pub nullable: bool,
    pub is_interface_request: bool,
    /// Source-level identifier, e.g. `"Rect"` or `"ui.gfx.Rect"`.
    pub identifier: Option<String>,
    /// Registry key of the resolved target.
    pub type_key: Option<TypeKey>,
}

impl TypeReference {
    /// Unresolved reference carrying only a source identifier.
    pub fn by_identifier(identifier: impl Into<String>) -> Self {
        TypeReference {
            nullable: false,
            is_interface_request: false,
            identifier: Some(identifier.into()),
            type_key: None,
        }
    }

    pub const fn is_resolved(&self) -> bool {
        self.type_key.is_some()
    }
}

// ============================================================================
// Type
// ============================================================================

/// The closed type variant.
///
/// Arrays and maps own their element types directly (the element type of an
/// array is structural, not a declaration); only user-defined types go
/// through the keyed [`TypeReference`] indirection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Type {
    Scalar(ScalarKind),
    Str {
        nullable: bool,
    },
    Array {
        nullable: bool,
        /// Fixed element count, or `None` for dynamically sized arrays.
        fixed_length: Option<u32>,
        element: Box<Type>,
    },
    Map {
        nullable: bool,
        /// Restricted to scalar-or-string; enforced by the resolver.
        key: Box<Type>,
        value: Box<Type>,
    },
    Handle {
        nullable: bool,
        kind: HandleKind,
    },
    Reference(TypeReference),
}

impl Type {
    /// Convenience constructor for a non-nullable scalar.
    pub const fn scalar(kind: ScalarKind) -> Self {
        Type::Scalar(kind)
    }

    /// Convenience constructor for a non-nullable string.
    pub const fn string() -> Self {
        Type::Str { nullable: false }
    }

    /// Convenience constructor for an unresolved reference.
    pub fn reference(identifier: impl Into<String>) -> Self {
        Type::Reference(TypeReference::by_identifier(identifier))
    }

    /// True for types admissible as map keys (scalar-or-string).
    pub const fn is_valid_map_key(&self) -> bool {
        matches!(self, Type::Scalar(_) | Type::Str { .. })
    }

    /// Short kind name for error messages.
    pub const fn kind_name(&self) -> &'static str {
        match self {
            Type::Scalar(_) => "scalar",
            Type::Str { .. } => "string",
            Type::Array { .. } => "array",
            Type::Map { .. } => "map",
            Type::Handle { .. } => "handle",
            Type::Reference(_) => "reference",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalar_sizes_and_alignment() {
        assert_eq!(ScalarKind::Bool.size(), 1);
        assert_eq!(ScalarKind::Int16.size(), 2);
        assert_eq!(ScalarKind::Uint32.size(), 4);
        assert_eq!(ScalarKind::Double.size(), 8);
        assert_eq!(ScalarKind::Int64.alignment(), 8);
        assert_eq!(ScalarKind::Float.alignment(), 4);
    }

    #[test]
    fn test_scalar_classification() {
        assert!(ScalarKind::Int8.is_signed_integer());
        assert!(ScalarKind::Uint64.is_unsigned_integer());
        assert!(ScalarKind::Double.is_floating_point());
        assert!(!ScalarKind::Bool.is_signed_integer());
    }

    #[test]
    fn test_reference_resolution_state() {
        let unresolved = TypeReference::by_identifier("Rect");
        assert!(!unresolved.is_resolved());
        assert_eq!(unresolved.identifier.as_deref(), Some("Rect"));
        assert!(unresolved.type_key.is_none());
    }

    #[test]
    fn test_map_key_restriction() {
        assert!(Type::scalar(ScalarKind::Uint32).is_valid_map_key());
        assert!(Type::string().is_valid_map_key());
        assert!(!Type::reference("Rect").is_valid_map_key());
        assert!(!Type::Array {
            nullable: false,
            fixed_length: None,
            element: Box::new(Type::scalar(ScalarKind::Uint8)),
        }
        .is_valid_map_key());
    }
}
