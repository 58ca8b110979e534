// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Value variants and declared constants.

use serde::{Deserialize, Serialize};

use crate::model::{DeclarationData, ScalarKind, Type};
use crate::registry::TypeKey;

// ============================================================================
// LiteralValue
// ============================================================================

/// A typed scalar or string literal.
///
/// Integer literals are widened to 64 bits at parse time; the declared
/// constant type decides the effective width and is checked against the
/// literal during constant resolution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum LiteralValue {
    Bool(bool),
    Int64(i64),
    Uint64(u64),
    Double(f64),
    Str(String),
}

impl LiteralValue {
    /// Whether this literal is assignable to a constant of the given scalar
    /// kind. Non-negative signed literals are accepted for unsigned kinds.
    pub fn matches_scalar(&self, kind: ScalarKind) -> bool {
        match self {
            LiteralValue::Bool(_) => kind == ScalarKind::Bool,
            LiteralValue::Int64(v) => {
                kind.is_signed_integer() || (kind.is_unsigned_integer() && *v >= 0)
            }
            LiteralValue::Uint64(_) => kind.is_unsigned_integer(),
            LiteralValue::Double(_) => kind.is_floating_point(),
            LiteralValue::Str(_) => false,
        }
    }

    pub const fn kind_name(&self) -> &'static str {
        match self {
            LiteralValue::Bool(_) => "bool literal",
            LiteralValue::Int64(_) => "integer literal",
            LiteralValue::Uint64(_) => "unsigned literal",
            LiteralValue::Double(_) => "floating-point literal",
            LiteralValue::Str(_) => "string literal",
        }
    }
}

// ============================================================================
// BuiltinConstant
// ============================================================================

/// Named float/double special constants (`float.INFINITY`, `double.NAN`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BuiltinConstant {
    FloatInfinity,
    FloatNegativeInfinity,
    FloatNan,
    DoubleInfinity,
    DoubleNegativeInfinity,
    DoubleNan,
}

impl BuiltinConstant {
    pub const fn is_float(self) -> bool {
        matches!(
            self,
            BuiltinConstant::FloatInfinity
                | BuiltinConstant::FloatNegativeInfinity
                | BuiltinConstant::FloatNan
        )
    }

    pub const fn is_double(self) -> bool {
        !self.is_float()
    }
}

// ============================================================================
// References
// ============================================================================

/// A by-name or by-key reference to a declared constant.
///
/// `constant_key` is set exactly when the reference has been resolved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConstantReference {
    pub identifier: String,
    pub constant_key: Option<TypeKey>,
}

impl ConstantReference {
    pub fn new(identifier: impl Into<String>) -> Self {
        ConstantReference {
            identifier: identifier.into(),
            constant_key: None,
        }
    }
}

/// A reference to a single enum value (`Color.RED`).
///
/// `enum_type_key` / `enum_value_index` are set exactly when resolved.
/// This is a terminal value kind: constant chains may end here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnumValueReference {
    pub identifier: String,
    pub enum_type_key: Option<TypeKey>,
    pub enum_value_index: Option<u32>,
}

impl EnumValueReference {
    pub fn new(identifier: impl Into<String>) -> Self {
        EnumValueReference {
            identifier: identifier.into(),
            enum_type_key: None,
            enum_value_index: None,
        }
    }
}

// ============================================================================
// Value
// ============================================================================

/// The closed value variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Literal(LiteralValue),
    ConstantReference(ConstantReference),
    EnumValueReference(EnumValueReference),
    Builtin(BuiltinConstant),
}

impl Value {
    /// Shorthand for a constant reference by identifier.
    pub fn constant(identifier: impl Into<String>) -> Self {
        Value::ConstantReference(ConstantReference::new(identifier))
    }

    /// Terminal values end a constant chain: everything except a
    /// [`ConstantReference`].
    pub const fn is_terminal(&self) -> bool {
        !matches!(self, Value::ConstantReference(_))
    }

    pub const fn kind_name(&self) -> &'static str {
        match self {
            Value::Literal(l) => l.kind_name(),
            Value::ConstantReference(_) => "constant reference",
            Value::EnumValueReference(_) => "enum value reference",
            Value::Builtin(_) => "builtin constant",
        }
    }
}

// ============================================================================
// DeclaredConstant
// ============================================================================

/// A named constant declaration.
///
/// `resolved_value`, when present, is the fully dereferenced terminal value
/// of the constant chain: a literal, a builtin, or an enum value reference -
/// never another [`ConstantReference`]. Only the resolver writes it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeclaredConstant {
    pub decl_data: Option<DeclarationData>,
    pub const_type: Type,
    pub value: Value,
    pub resolved_value: Option<Value>,
}

impl DeclaredConstant {
    pub fn new(const_type: Type, value: Value) -> Self {
        DeclaredConstant {
            decl_data: None,
            const_type,
            value,
            resolved_value: None,
        }
    }
}
