// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Type/Value model - the immutable substrate of the semantic core.
//!
//!
//! Tagged-variant data structures describing types, user-defined
//! declarations, and constant values. The model carries no behavior beyond
//! small accessors: registration, resolution, versioning, and serialization
//! all live in the sibling modules and operate on these structures.
//!
//! # Indirection
//!
//! User-defined types are never owned by the references that mention them.
//! A [`TypeReference`] names its target either by source identifier
//! (unresolved) or by [`crate::registry::TypeKey`] (resolved), and the key
//! is looked up in the owning [`crate::registry::Registry`]. This flat
//! keyed store is what permits cyclic type graphs without cyclic ownership.

mod decl;
mod types;
mod values;

pub use decl::{
    DeclKind, DeclarationData, EnumType, EnumValue, InterfaceType, Method, SourceLocation,
    StructField, StructType, StructVersion, UnionField, UnionType, UserDefinedType,
};
pub use types::{HandleKind, ScalarKind, Type, TypeReference};
pub use values::{
    BuiltinConstant, ConstantReference, DeclaredConstant, EnumValueReference, LiteralValue, Value,
};
