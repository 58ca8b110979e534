// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! User-defined declarations: enums, structs, unions, interfaces.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::model::{Type, Value};
use crate::registry::TypeKey;

// ============================================================================
// DeclarationData
// ============================================================================

/// Source location of a declaration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceLocation {
    pub file: String,
    pub line: u32,
    pub column: u32,
}

impl std::fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}:{}", self.file, self.line, self.column)
    }
}

/// Advisory metadata attached to any declared entity.
///
/// Everything here is optional and absence never blocks resolution: a
/// frontend that provides none of it still produces a compilable graph.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeclarationData {
    /// Attribute list (`[Stable]`, `[MinVersion=2]`, ...), values as parsed.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, JsonValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub short_name: Option<String>,
    /// Fully-qualified dotted name, e.g. `"ui.gfx.Rect"`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_identifier: Option<String>,
    /// Position among the sibling declarations in the source file.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub declaration_order: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub serialization_order: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<SourceLocation>,
    /// Keys of declarations nested inside this one.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub contained_declarations: Vec<TypeKey>,
    /// Key of the declaration this one is nested in.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub container_key: Option<TypeKey>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub comments: Vec<String>,
}

impl DeclarationData {
    /// Metadata carrying only a short name (common test/frontend shorthand).
    pub fn named(short_name: impl Into<String>) -> Self {
        DeclarationData {
            short_name: Some(short_name.into()),
            ..DeclarationData::default()
        }
    }
}

// ============================================================================
// Enum
// ============================================================================

/// One enum value, in declaration order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnumValue {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decl_data: Option<DeclarationData>,
    pub name: String,
    pub value: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnumType {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decl_data: Option<DeclarationData>,
    /// Declaration order; runtime consumers traverse by index.
    pub values: Vec<EnumValue>,
}

// ============================================================================
// Struct
// ============================================================================

/// One struct field.
///
/// `offset` is the byte offset from the start of the payload, excluding the
/// fixed 8-byte header. `bit != -1` exactly when the field type is boolean;
/// packed booleans share an offset and are distinguished by bit index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructField {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decl_data: Option<DeclarationData>,
    pub field_type: Type,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_value: Option<Value>,
    pub offset: u32,
    pub bit: i8,
    /// Protocol version the field was introduced in.
    pub min_version: u32,
}

impl StructField {
    /// A field before layout: offset and bit are assigned by the version
    /// computer, which is the only writer of those members.
    pub fn new(field_type: Type, min_version: u32) -> Self {
        StructField {
            decl_data: None,
            field_type,
            default_value: None,
            offset: 0,
            bit: -1,
            min_version,
        }
    }
}

/// One row of a struct's version table.
///
/// Across a struct's table: `version_number` strictly increasing,
/// `num_fields` and `num_bytes` non-decreasing, version 0 always present.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructVersion {
    pub version_number: u32,
    pub num_fields: u32,
    /// Header plus payload size for this version.
    pub num_bytes: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructType {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decl_data: Option<DeclarationData>,
    pub fields: Vec<StructField>,
    /// Filled by the version computer; `None` until then.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version_info: Option<Vec<StructVersion>>,
}

impl StructType {
    pub fn new(fields: Vec<StructField>) -> Self {
        StructType {
            decl_data: None,
            fields,
            version_info: None,
        }
    }

    /// Empty struct: distinct from an absent response struct.
    pub fn empty() -> Self {
        StructType::new(Vec::new())
    }
}

// ============================================================================
// Union
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnionField {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decl_data: Option<DeclarationData>,
    pub field_type: Type,
    /// Wire discriminator for this alternative.
    pub tag: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnionType {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decl_data: Option<DeclarationData>,
    pub fields: Vec<UnionField>,
}

// ============================================================================
// Interface
// ============================================================================

/// One interface method.
///
/// `response: None` means the method has no response message at all;
/// `Some(StructType::empty())` is a present-but-empty response. The two are
/// semantically distinct and must survive serialization round-trips.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Method {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decl_data: Option<DeclarationData>,
    /// Unique per interface.
    pub ordinal: u32,
    pub min_version: u32,
    pub parameters: StructType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<StructType>,
}

impl Method {
    pub fn new(ordinal: u32, parameters: StructType) -> Self {
        Method {
            decl_data: None,
            ordinal,
            min_version: 0,
            parameters,
            response: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterfaceType {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decl_data: Option<DeclarationData>,
    /// Name clients connect to; only top-level interfaces carry one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_name: Option<String>,
    /// Keyed and traversed by ordinal.
    pub methods: BTreeMap<u32, Method>,
    /// Least upper bound of every contained min_version; filled by the
    /// version computer.
    pub current_version: u32,
}

impl InterfaceType {
    pub fn new(methods: Vec<Method>) -> Self {
        InterfaceType {
            decl_data: None,
            service_name: None,
            methods: methods.into_iter().map(|m| (m.ordinal, m)).collect(),
            current_version: 0,
        }
    }
}

// ============================================================================
// UserDefinedType
// ============================================================================

/// Discriminates the four user-defined declaration shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeclKind {
    Enum,
    Struct,
    Union,
    Interface,
}

impl DeclKind {
    pub const fn tag(self) -> &'static str {
        match self {
            DeclKind::Enum => "enum",
            DeclKind::Struct => "struct",
            DeclKind::Union => "union",
            DeclKind::Interface => "interface",
        }
    }
}

impl std::fmt::Display for DeclKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.tag())
    }
}

/// The closed user-defined-type variant, looked up only by key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum UserDefinedType {
    Enum(EnumType),
    Struct(StructType),
    Union(UnionType),
    Interface(InterfaceType),
}

impl UserDefinedType {
    pub const fn kind(&self) -> DeclKind {
        match self {
            UserDefinedType::Enum(_) => DeclKind::Enum,
            UserDefinedType::Struct(_) => DeclKind::Struct,
            UserDefinedType::Union(_) => DeclKind::Union,
            UserDefinedType::Interface(_) => DeclKind::Interface,
        }
    }

    pub const fn decl_data(&self) -> Option<&DeclarationData> {
        match self {
            UserDefinedType::Enum(e) => e.decl_data.as_ref(),
            UserDefinedType::Struct(s) => s.decl_data.as_ref(),
            UserDefinedType::Union(u) => u.decl_data.as_ref(),
            UserDefinedType::Interface(i) => i.decl_data.as_ref(),
        }
    }

    pub fn decl_data_mut(&mut self) -> &mut Option<DeclarationData> {
        match self {
            UserDefinedType::Enum(e) => &mut e.decl_data,
            UserDefinedType::Struct(s) => &mut s.decl_data,
            UserDefinedType::Union(u) => &mut u.decl_data,
            UserDefinedType::Interface(i) => &mut i.decl_data,
        }
    }

    /// Source location when the frontend provided one.
    pub fn source(&self) -> Option<&SourceLocation> {
        self.decl_data().and_then(|d| d.source.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ScalarKind;

    #[test]
    fn test_decl_kind_tags() {
        assert_eq!(DeclKind::Enum.tag(), "enum");
        assert_eq!(DeclKind::Interface.to_string(), "interface");
    }

    #[test]
    fn test_interface_methods_keyed_by_ordinal() {
        let iface = InterfaceType::new(vec![
            Method::new(3, StructType::empty()),
            Method::new(1, StructType::empty()),
        ]);
        let ordinals: Vec<u32> = iface.methods.keys().copied().collect();
        assert_eq!(ordinals, vec![1, 3]);
        assert_eq!(iface.current_version, 0);
    }

    #[test]
    fn test_absent_vs_empty_response() {
        let no_response = Method::new(0, StructType::empty());
        let mut empty_response = Method::new(0, StructType::empty());
        empty_response.response = Some(StructType::empty());
        assert_ne!(no_response, empty_response);
    }

    #[test]
    fn test_new_field_is_unlaid_out() {
        let f = StructField::new(Type::scalar(ScalarKind::Uint32), 1);
        assert_eq!(f.bit, -1);
        assert_eq!(f.offset, 0);
        assert_eq!(f.min_version, 1);
    }
}
