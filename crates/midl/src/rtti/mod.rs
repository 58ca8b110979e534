// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Runtime type info: the self-describing blob embedded in generated code.
//!
//!
//! [`RuntimeTypeInfo`] snapshots one compilation unit's service index and
//! type map after resolution and versioning. The binary encoding is
//! deterministic (BTreeMap traversal order) and self-contained: decoding a
//! blob reproduces the structure exactly, including advisory metadata, so
//! a runtime can answer type queries without the source declarations.
//!
//! Blob layout: an 8-byte header (magic `MRTI`, u16 format version, u16
//! reserved), then the service index and the type map as length-prefixed,
//! variant-tagged little-endian records. Version tables decoded from a
//! blob are re-validated; a blob carrying an inconsistent table is rejected
//! rather than trusted.

pub mod wire;

use std::collections::BTreeMap;
use std::io::Write;

use flate2::write::{DeflateDecoder, DeflateEncoder};
use flate2::Compression;
use serde::{Deserialize, Serialize};

use crate::model::{
    BuiltinConstant, ConstantReference, DeclarationData, EnumType, EnumValue, EnumValueReference,
    HandleKind, InterfaceType, LiteralValue, Method, ScalarKind, StructField, StructType,
    StructVersion, Type, TypeReference, UnionField, UnionType, UserDefinedType, Value,
};
use crate::registry::{Registry, TypeKey};
use crate::version::validate_version_table;

pub use wire::WireError;

/// Starts every blob.
pub const MAGIC: [u8; 4] = *b"MRTI";
/// Format version this build writes and reads.
pub const FORMAT_VERSION: u16 = 1;

// ============================================================================
// RuntimeTypeInfo
// ============================================================================

/// Immutable snapshot of a compilation unit's services and types.
///
/// Restricted to the unit: types reachable through imports live in the
/// importing unit's own blob. Complete graphs are obtained by merging.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuntimeTypeInfo {
    pub services: BTreeMap<String, TypeKey>,
    pub types: BTreeMap<TypeKey, UserDefinedType>,
}

impl RuntimeTypeInfo {
    /// Snapshot a registry after resolution and versioning.
    pub fn from_registry(registry: &Registry) -> Self {
        RuntimeTypeInfo {
            services: registry
                .services()
                .map(|(name, key)| (name.clone(), key.clone()))
                .collect(),
            types: registry
                .types()
                .map(|(key, decl)| (key.clone(), decl.clone()))
                .collect(),
        }
    }

    /// Union another unit's snapshot into this one.
    ///
    /// Content-stable keys make identical entries collide harmlessly; a
    /// genuinely conflicting entry keeps the existing one and is logged,
    /// since runtime lookup has no failure channel for it.
    pub fn merge(&mut self, other: RuntimeTypeInfo) {
        for (key, decl) in other.types {
            match self.types.get(&key) {
                None => {
                    self.types.insert(key, decl);
                }
                Some(existing) if *existing == decl => {}
                Some(_) => {
                    log::warn!("[RTTI] conflicting type under key {}, keeping existing", key);
                }
            }
        }
        for (name, key) in other.services {
            match self.services.get(&name) {
                None => {
                    self.services.insert(name, key);
                }
                Some(existing) if *existing == key => {}
                Some(_) => {
                    log::warn!("[RTTI] conflicting service '{}', keeping existing", name);
                }
            }
        }
    }

    pub fn lookup_service(&self, service_name: &str) -> Option<&TypeKey> {
        self.services.get(service_name)
    }

    pub fn lookup_type(&self, key: &TypeKey) -> Option<&UserDefinedType> {
        self.types.get(key)
    }

    // ------------------------------------------------------------------------
    // Blob encoding
    // ------------------------------------------------------------------------

    /// Serialize to the deterministic binary blob.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(&MAGIC);
        wire::put_u16(&mut buf, FORMAT_VERSION);
        wire::put_u16(&mut buf, 0);

        wire::put_u32(&mut buf, self.services.len() as u32);
        for (name, key) in &self.services {
            wire::put_string(&mut buf, name);
            put_key(&mut buf, key);
        }

        wire::put_u32(&mut buf, self.types.len() as u32);
        for (key, decl) in &self.types {
            put_key(&mut buf, key);
            put_user_defined_type(&mut buf, decl);
        }

        log::debug!(
            "[RTTI] encoded {} services, {} types into {} bytes",
            self.services.len(),
            self.types.len(),
            buf.len()
        );
        buf
    }

    /// Deserialize a blob. `decode(encode(x)) == x` for every value that
    /// `encode` accepts.
    pub fn decode(blob: &[u8]) -> Result<Self, WireError> {
        let mut offset = 0usize;
        let magic = wire::get_u32(blob, &mut offset)?.to_le_bytes();
        if magic != MAGIC {
            return Err(WireError::BadMagic);
        }
        let format = wire::get_u16(blob, &mut offset)?;
        if format != FORMAT_VERSION {
            return Err(WireError::UnsupportedVersion(format));
        }
        let _reserved = wire::get_u16(blob, &mut offset)?;

        let mut services = BTreeMap::new();
        let service_count = wire::get_u32(blob, &mut offset)?;
        for _ in 0..service_count {
            let name = wire::get_string(blob, &mut offset)?;
            let key = get_key(blob, &mut offset)?;
            services.insert(name, key);
        }

        let mut types = BTreeMap::new();
        let type_count = wire::get_u32(blob, &mut offset)?;
        for _ in 0..type_count {
            let key = get_key(blob, &mut offset)?;
            let decl = get_user_defined_type(blob, &mut offset)?;
            validate_decoded(&key, &decl)?;
            types.insert(key, decl);
        }

        if offset != blob.len() {
            return Err(WireError::InvalidEncoding(format!(
                "{} trailing bytes",
                blob.len() - offset
            )));
        }

        Ok(RuntimeTypeInfo { services, types })
    }

    /// DEFLATE the blob for embedding in generated artifacts.
    pub fn compress(blob: &[u8]) -> Result<Vec<u8>, WireError> {
        let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
        encoder
            .write_all(blob)
            .and_then(|_| encoder.finish())
            .map_err(|e| WireError::Compression(e.to_string()))
    }

    pub fn decompress(compressed: &[u8]) -> Result<Vec<u8>, WireError> {
        let mut decoder = DeflateDecoder::new(Vec::new());
        decoder
            .write_all(compressed)
            .and_then(|_| decoder.finish())
            .map_err(|e| WireError::Compression(e.to_string()))
    }
}

/// Version tables inside a decoded blob get the same scrutiny as computed
/// ones.
fn validate_decoded(key: &TypeKey, decl: &UserDefinedType) -> Result<(), WireError> {
    let check = |name: &str, s: &StructType| -> Result<(), WireError> {
        if let Some(table) = &s.version_info {
            validate_version_table(name, table)
                .map_err(|e| WireError::InvalidEncoding(e.to_string()))?;
        }
        Ok(())
    };
    match decl {
        UserDefinedType::Struct(s) => check(&key.to_string(), s),
        UserDefinedType::Interface(i) => {
            for method in i.methods.values() {
                let name = format!("{}#{}", key, method.ordinal);
                check(&name, &method.parameters)?;
                if let Some(response) = &method.response {
                    check(&name, response)?;
                }
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

// ============================================================================
// Single-declaration records (shared with the description responder)
// ============================================================================

/// Encode one declaration as a standalone record.
pub fn encode_type(decl: &UserDefinedType) -> Vec<u8> {
    let mut buf = Vec::new();
    put_user_defined_type(&mut buf, decl);
    buf
}

/// Decode a standalone declaration record, requiring full consumption.
pub fn decode_type(buf: &[u8]) -> Result<UserDefinedType, WireError> {
    let mut offset = 0usize;
    let decl = get_user_defined_type(buf, &mut offset)?;
    if offset != buf.len() {
        return Err(WireError::InvalidEncoding(format!(
            "{} trailing bytes",
            buf.len() - offset
        )));
    }
    Ok(decl)
}

// ============================================================================
// Record writers
// ============================================================================

const DECL_ENUM: u8 = 0;
const DECL_STRUCT: u8 = 1;
const DECL_UNION: u8 = 2;
const DECL_INTERFACE: u8 = 3;

const TYPE_SCALAR: u8 = 0;
const TYPE_STRING: u8 = 1;
const TYPE_ARRAY: u8 = 2;
const TYPE_MAP: u8 = 3;
const TYPE_HANDLE: u8 = 4;
const TYPE_REFERENCE: u8 = 5;

const VALUE_LITERAL: u8 = 0;
const VALUE_CONSTANT_REF: u8 = 1;
const VALUE_ENUM_REF: u8 = 2;
const VALUE_BUILTIN: u8 = 3;

const LITERAL_BOOL: u8 = 0;
const LITERAL_INT64: u8 = 1;
const LITERAL_UINT64: u8 = 2;
const LITERAL_DOUBLE: u8 = 3;
const LITERAL_STR: u8 = 4;

fn put_key(buf: &mut Vec<u8>, key: &TypeKey) {
    wire::put_string(buf, key.as_str());
}

fn put_opt_key(buf: &mut Vec<u8>, key: Option<&TypeKey>) {
    wire::put_opt_string(buf, key.map(TypeKey::as_str));
}

/// Advisory metadata travels as a length-prefixed JSON record: attribute
/// values are already arbitrary JSON, so a bespoke binary layout buys
/// nothing here.
fn put_opt_decl_data(buf: &mut Vec<u8>, data: Option<&DeclarationData>) {
    match data {
        Some(data) => {
            wire::put_bool(buf, true);
            let json = serde_json::to_vec(data).unwrap_or_default();
            wire::put_bytes(buf, &json);
        }
        None => wire::put_bool(buf, false),
    }
}

fn put_scalar_kind(buf: &mut Vec<u8>, kind: ScalarKind) {
    let code = match kind {
        ScalarKind::Bool => 0,
        ScalarKind::Int8 => 1,
        ScalarKind::Int16 => 2,
        ScalarKind::Int32 => 3,
        ScalarKind::Int64 => 4,
        ScalarKind::Uint8 => 5,
        ScalarKind::Uint16 => 6,
        ScalarKind::Uint32 => 7,
        ScalarKind::Uint64 => 8,
        ScalarKind::Float => 9,
        ScalarKind::Double => 10,
    };
    wire::put_u8(buf, code);
}

fn put_handle_kind(buf: &mut Vec<u8>, kind: HandleKind) {
    let code = match kind {
        HandleKind::Generic => 0,
        HandleKind::MessagePipe => 1,
        HandleKind::DataPipeConsumer => 2,
        HandleKind::DataPipeProducer => 3,
        HandleKind::SharedBuffer => 4,
    };
    wire::put_u8(buf, code);
}

fn put_builtin(buf: &mut Vec<u8>, builtin: BuiltinConstant) {
    let code = match builtin {
        BuiltinConstant::FloatInfinity => 0,
        BuiltinConstant::FloatNegativeInfinity => 1,
        BuiltinConstant::FloatNan => 2,
        BuiltinConstant::DoubleInfinity => 3,
        BuiltinConstant::DoubleNegativeInfinity => 4,
        BuiltinConstant::DoubleNan => 5,
    };
    wire::put_u8(buf, code);
}

fn put_type(buf: &mut Vec<u8>, ty: &Type) {
    match ty {
        Type::Scalar(kind) => {
            wire::put_u8(buf, TYPE_SCALAR);
            put_scalar_kind(buf, *kind);
        }
        Type::Str { nullable } => {
            wire::put_u8(buf, TYPE_STRING);
            wire::put_bool(buf, *nullable);
        }
        Type::Array {
            nullable,
            fixed_length,
            element,
        } => {
            wire::put_u8(buf, TYPE_ARRAY);
            wire::put_bool(buf, *nullable);
            match fixed_length {
                Some(len) => {
                    wire::put_bool(buf, true);
                    wire::put_u32(buf, *len);
                }
                None => wire::put_bool(buf, false),
            }
            put_type(buf, element);
        }
        Type::Map {
            nullable,
            key,
            value,
        } => {
            wire::put_u8(buf, TYPE_MAP);
            wire::put_bool(buf, *nullable);
            put_type(buf, key);
            put_type(buf, value);
        }
        Type::Handle { nullable, kind } => {
            wire::put_u8(buf, TYPE_HANDLE);
            wire::put_bool(buf, *nullable);
            put_handle_kind(buf, *kind);
        }
        Type::Reference(reference) => {
            wire::put_u8(buf, TYPE_REFERENCE);
            wire::put_bool(buf, reference.nullable);
            wire::put_bool(buf, reference.is_interface_request);
            wire::put_opt_string(buf, reference.identifier.as_deref());
            put_opt_key(buf, reference.type_key.as_ref());
        }
    }
}

fn put_value(buf: &mut Vec<u8>, value: &Value) {
    match value {
        Value::Literal(literal) => {
            wire::put_u8(buf, VALUE_LITERAL);
            match literal {
                LiteralValue::Bool(v) => {
                    wire::put_u8(buf, LITERAL_BOOL);
                    wire::put_bool(buf, *v);
                }
                LiteralValue::Int64(v) => {
                    wire::put_u8(buf, LITERAL_INT64);
                    wire::put_i64(buf, *v);
                }
                LiteralValue::Uint64(v) => {
                    wire::put_u8(buf, LITERAL_UINT64);
                    wire::put_u64(buf, *v);
                }
                LiteralValue::Double(v) => {
                    wire::put_u8(buf, LITERAL_DOUBLE);
                    wire::put_f64(buf, *v);
                }
                LiteralValue::Str(v) => {
                    wire::put_u8(buf, LITERAL_STR);
                    wire::put_string(buf, v);
                }
            }
        }
        Value::ConstantReference(reference) => {
            wire::put_u8(buf, VALUE_CONSTANT_REF);
            wire::put_string(buf, &reference.identifier);
            put_opt_key(buf, reference.constant_key.as_ref());
        }
        Value::EnumValueReference(reference) => {
            wire::put_u8(buf, VALUE_ENUM_REF);
            wire::put_string(buf, &reference.identifier);
            put_opt_key(buf, reference.enum_type_key.as_ref());
            match reference.enum_value_index {
                Some(index) => {
                    wire::put_bool(buf, true);
                    wire::put_u32(buf, index);
                }
                None => wire::put_bool(buf, false),
            }
        }
        Value::Builtin(builtin) => {
            wire::put_u8(buf, VALUE_BUILTIN);
            put_builtin(buf, *builtin);
        }
    }
}

fn put_opt_value(buf: &mut Vec<u8>, value: Option<&Value>) {
    match value {
        Some(value) => {
            wire::put_bool(buf, true);
            put_value(buf, value);
        }
        None => wire::put_bool(buf, false),
    }
}

fn put_struct(buf: &mut Vec<u8>, s: &StructType) {
    put_opt_decl_data(buf, s.decl_data.as_ref());
    wire::put_u32(buf, s.fields.len() as u32);
    for field in &s.fields {
        put_opt_decl_data(buf, field.decl_data.as_ref());
        put_type(buf, &field.field_type);
        put_opt_value(buf, field.default_value.as_ref());
        wire::put_u32(buf, field.offset);
        wire::put_u8(buf, field.bit as u8);
        wire::put_u32(buf, field.min_version);
    }
    match &s.version_info {
        Some(table) => {
            wire::put_bool(buf, true);
            wire::put_u32(buf, table.len() as u32);
            for row in table {
                wire::put_u32(buf, row.version_number);
                wire::put_u32(buf, row.num_fields);
                wire::put_u32(buf, row.num_bytes);
            }
        }
        None => wire::put_bool(buf, false),
    }
}

fn put_user_defined_type(buf: &mut Vec<u8>, decl: &UserDefinedType) {
    match decl {
        UserDefinedType::Enum(e) => {
            wire::put_u8(buf, DECL_ENUM);
            put_opt_decl_data(buf, e.decl_data.as_ref());
            wire::put_u32(buf, e.values.len() as u32);
            for value in &e.values {
                put_opt_decl_data(buf, value.decl_data.as_ref());
                wire::put_string(buf, &value.name);
                wire::put_i64(buf, value.value);
            }
        }
        UserDefinedType::Struct(s) => {
            wire::put_u8(buf, DECL_STRUCT);
            put_struct(buf, s);
        }
        UserDefinedType::Union(u) => {
            wire::put_u8(buf, DECL_UNION);
            put_opt_decl_data(buf, u.decl_data.as_ref());
            wire::put_u32(buf, u.fields.len() as u32);
            for field in &u.fields {
                put_opt_decl_data(buf, field.decl_data.as_ref());
                put_type(buf, &field.field_type);
                wire::put_u32(buf, field.tag);
            }
        }
        UserDefinedType::Interface(i) => {
            wire::put_u8(buf, DECL_INTERFACE);
            put_opt_decl_data(buf, i.decl_data.as_ref());
            wire::put_opt_string(buf, i.service_name.as_deref());
            wire::put_u32(buf, i.current_version);
            wire::put_u32(buf, i.methods.len() as u32);
            for method in i.methods.values() {
                put_opt_decl_data(buf, method.decl_data.as_ref());
                wire::put_u32(buf, method.ordinal);
                wire::put_u32(buf, method.min_version);
                put_struct(buf, &method.parameters);
                match &method.response {
                    Some(response) => {
                        wire::put_bool(buf, true);
                        put_struct(buf, response);
                    }
                    None => wire::put_bool(buf, false),
                }
            }
        }
    }
}

// ============================================================================
// Record readers
// ============================================================================

fn get_key(buf: &[u8], offset: &mut usize) -> Result<TypeKey, WireError> {
    Ok(TypeKey::new(wire::get_string(buf, offset)?))
}

fn get_opt_key(buf: &[u8], offset: &mut usize) -> Result<Option<TypeKey>, WireError> {
    Ok(wire::get_opt_string(buf, offset)?.map(TypeKey::new))
}

fn get_opt_decl_data(
    buf: &[u8],
    offset: &mut usize,
) -> Result<Option<DeclarationData>, WireError> {
    if !wire::get_bool(buf, offset)? {
        return Ok(None);
    }
    let json = wire::get_bytes(buf, offset)?;
    serde_json::from_slice(json)
        .map(Some)
        .map_err(|e| WireError::InvalidEncoding(format!("declaration metadata: {}", e)))
}

fn get_scalar_kind(buf: &[u8], offset: &mut usize) -> Result<ScalarKind, WireError> {
    Ok(match wire::get_u8(buf, offset)? {
        0 => ScalarKind::Bool,
        1 => ScalarKind::Int8,
        2 => ScalarKind::Int16,
        3 => ScalarKind::Int32,
        4 => ScalarKind::Int64,
        5 => ScalarKind::Uint8,
        6 => ScalarKind::Uint16,
        7 => ScalarKind::Uint32,
        8 => ScalarKind::Uint64,
        9 => ScalarKind::Float,
        10 => ScalarKind::Double,
        tag => {
            return Err(WireError::UnknownTag {
                context: "scalar kind",
                tag,
            })
        }
    })
}

fn get_handle_kind(buf: &[u8], offset: &mut usize) -> Result<HandleKind, WireError> {
    Ok(match wire::get_u8(buf, offset)? {
        0 => HandleKind::Generic,
        1 => HandleKind::MessagePipe,
        2 => HandleKind::DataPipeConsumer,
        3 => HandleKind::DataPipeProducer,
        4 => HandleKind::SharedBuffer,
        tag => {
            return Err(WireError::UnknownTag {
                context: "handle kind",
                tag,
            })
        }
    })
}

fn get_builtin(buf: &[u8], offset: &mut usize) -> Result<BuiltinConstant, WireError> {
    Ok(match wire::get_u8(buf, offset)? {
        0 => BuiltinConstant::FloatInfinity,
        1 => BuiltinConstant::FloatNegativeInfinity,
        2 => BuiltinConstant::FloatNan,
        3 => BuiltinConstant::DoubleInfinity,
        4 => BuiltinConstant::DoubleNegativeInfinity,
        5 => BuiltinConstant::DoubleNan,
        tag => {
            return Err(WireError::UnknownTag {
                context: "builtin constant",
                tag,
            })
        }
    })
}

fn get_type(buf: &[u8], offset: &mut usize) -> Result<Type, WireError> {
    Ok(match wire::get_u8(buf, offset)? {
        TYPE_SCALAR => Type::Scalar(get_scalar_kind(buf, offset)?),
        TYPE_STRING => Type::Str {
            nullable: wire::get_bool(buf, offset)?,
        },
        TYPE_ARRAY => {
            let nullable = wire::get_bool(buf, offset)?;
            let fixed_length = if wire::get_bool(buf, offset)? {
                Some(wire::get_u32(buf, offset)?)
            } else {
                None
            };
            Type::Array {
                nullable,
                fixed_length,
                element: Box::new(get_type(buf, offset)?),
            }
        }
        TYPE_MAP => {
            let nullable = wire::get_bool(buf, offset)?;
            let key = Box::new(get_type(buf, offset)?);
            let value = Box::new(get_type(buf, offset)?);
            Type::Map {
                nullable,
                key,
                value,
            }
        }
        TYPE_HANDLE => {
            let nullable = wire::get_bool(buf, offset)?;
            Type::Handle {
                nullable,
                kind: get_handle_kind(buf, offset)?,
            }
        }
        TYPE_REFERENCE => {
            let nullable = wire::get_bool(buf, offset)?;
            let is_interface_request = wire::get_bool(buf, offset)?;
            let identifier = wire::get_opt_string(buf, offset)?;
            let type_key = get_opt_key(buf, offset)?;
            if identifier.is_none() && type_key.is_none() {
                return Err(WireError::InvalidEncoding(
                    "reference with neither identifier nor key".to_string(),
                ));
            }
            Type::Reference(TypeReference {
                nullable,
                is_interface_request,
                identifier,
                type_key,
            })
        }
        tag => {
            return Err(WireError::UnknownTag {
                context: "type",
                tag,
            })
        }
    })
}

fn get_value(buf: &[u8], offset: &mut usize) -> Result<Value, WireError> {
    Ok(match wire::get_u8(buf, offset)? {
        VALUE_LITERAL => Value::Literal(match wire::get_u8(buf, offset)? {
            LITERAL_BOOL => LiteralValue::Bool(wire::get_bool(buf, offset)?),
            LITERAL_INT64 => LiteralValue::Int64(wire::get_i64(buf, offset)?),
            LITERAL_UINT64 => LiteralValue::Uint64(wire::get_u64(buf, offset)?),
            LITERAL_DOUBLE => LiteralValue::Double(wire::get_f64(buf, offset)?),
            LITERAL_STR => LiteralValue::Str(wire::get_string(buf, offset)?),
            tag => {
                return Err(WireError::UnknownTag {
                    context: "literal",
                    tag,
                })
            }
        }),
        VALUE_CONSTANT_REF => {
            let identifier = wire::get_string(buf, offset)?;
            let constant_key = get_opt_key(buf, offset)?;
            Value::ConstantReference(ConstantReference {
                identifier,
                constant_key,
            })
        }
        VALUE_ENUM_REF => {
            let identifier = wire::get_string(buf, offset)?;
            let enum_type_key = get_opt_key(buf, offset)?;
            let enum_value_index = if wire::get_bool(buf, offset)? {
                Some(wire::get_u32(buf, offset)?)
            } else {
                None
            };
            Value::EnumValueReference(EnumValueReference {
                identifier,
                enum_type_key,
                enum_value_index,
            })
        }
        VALUE_BUILTIN => Value::Builtin(get_builtin(buf, offset)?),
        tag => {
            return Err(WireError::UnknownTag {
                context: "value",
                tag,
            })
        }
    })
}

fn get_opt_value(buf: &[u8], offset: &mut usize) -> Result<Option<Value>, WireError> {
    if wire::get_bool(buf, offset)? {
        Ok(Some(get_value(buf, offset)?))
    } else {
        Ok(None)
    }
}

fn get_struct(buf: &[u8], offset: &mut usize) -> Result<StructType, WireError> {
    let decl_data = get_opt_decl_data(buf, offset)?;
    let field_count = wire::get_u32(buf, offset)?;
    let mut fields = Vec::with_capacity(field_count.min(1024) as usize);
    for _ in 0..field_count {
        let decl_data = get_opt_decl_data(buf, offset)?;
        let field_type = get_type(buf, offset)?;
        let default_value = get_opt_value(buf, offset)?;
        let field_offset = wire::get_u32(buf, offset)?;
        let bit = wire::get_u8(buf, offset)? as i8;
        let min_version = wire::get_u32(buf, offset)?;
        // bit is a packed-boolean position (or -1 before layout); any
        // other value on the wire is corrupt.
        let is_bool = matches!(field_type, Type::Scalar(ScalarKind::Bool));
        if bit < -1 || bit > 7 || (bit >= 0 && !is_bool) {
            return Err(WireError::InvalidEncoding(format!(
                "bit {} invalid for a {} field",
                bit,
                field_type.kind_name()
            )));
        }
        fields.push(StructField {
            decl_data,
            field_type,
            default_value,
            offset: field_offset,
            bit,
            min_version,
        });
    }
    let version_info = if wire::get_bool(buf, offset)? {
        let row_count = wire::get_u32(buf, offset)?;
        let mut table = Vec::with_capacity(row_count.min(1024) as usize);
        for _ in 0..row_count {
            table.push(StructVersion {
                version_number: wire::get_u32(buf, offset)?,
                num_fields: wire::get_u32(buf, offset)?,
                num_bytes: wire::get_u32(buf, offset)?,
            });
        }
        Some(table)
    } else {
        None
    };
    Ok(StructType {
        decl_data,
        fields,
        version_info,
    })
}

fn get_user_defined_type(
    buf: &[u8],
    offset: &mut usize,
) -> Result<UserDefinedType, WireError> {
    Ok(match wire::get_u8(buf, offset)? {
        DECL_ENUM => {
            let decl_data = get_opt_decl_data(buf, offset)?;
            let value_count = wire::get_u32(buf, offset)?;
            let mut values = Vec::with_capacity(value_count.min(1024) as usize);
            for _ in 0..value_count {
                let decl_data = get_opt_decl_data(buf, offset)?;
                let name = wire::get_string(buf, offset)?;
                let value = wire::get_i64(buf, offset)?;
                values.push(EnumValue {
                    decl_data,
                    name,
                    value,
                });
            }
            UserDefinedType::Enum(EnumType { decl_data, values })
        }
        DECL_STRUCT => UserDefinedType::Struct(get_struct(buf, offset)?),
        DECL_UNION => {
            let decl_data = get_opt_decl_data(buf, offset)?;
            let field_count = wire::get_u32(buf, offset)?;
            let mut fields = Vec::with_capacity(field_count.min(1024) as usize);
            for _ in 0..field_count {
                let decl_data = get_opt_decl_data(buf, offset)?;
                let field_type = get_type(buf, offset)?;
                let tag = wire::get_u32(buf, offset)?;
                fields.push(UnionField {
                    decl_data,
                    field_type,
                    tag,
                });
            }
            UserDefinedType::Union(UnionType { decl_data, fields })
        }
        DECL_INTERFACE => {
            let decl_data = get_opt_decl_data(buf, offset)?;
            let service_name = wire::get_opt_string(buf, offset)?;
            let current_version = wire::get_u32(buf, offset)?;
            let method_count = wire::get_u32(buf, offset)?;
            let mut methods = BTreeMap::new();
            for _ in 0..method_count {
                let decl_data = get_opt_decl_data(buf, offset)?;
                let ordinal = wire::get_u32(buf, offset)?;
                let min_version = wire::get_u32(buf, offset)?;
                let parameters = get_struct(buf, offset)?;
                let response = if wire::get_bool(buf, offset)? {
                    Some(get_struct(buf, offset)?)
                } else {
                    None
                };
                methods.insert(
                    ordinal,
                    Method {
                        decl_data,
                        ordinal,
                        min_version,
                        parameters,
                        response,
                    },
                );
            }
            UserDefinedType::Interface(InterfaceType {
                decl_data,
                service_name,
                methods,
                current_version,
            })
        }
        tag => {
            return Err(WireError::UnknownTag {
                context: "declaration",
                tag,
            })
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::DeclarationData;
    use crate::resolve::{collect, resolve, ModuleDecls, QualifiedNamePolicy};
    use crate::version;

    fn sample_unit() -> RuntimeTypeInfo {
        let mut module = ModuleDecls::new("gfx");
        module.types.push((
            "Format".into(),
            UserDefinedType::Enum(EnumType {
                decl_data: None,
                values: vec![
                    EnumValue {
                        decl_data: None,
                        name: "RGBA".into(),
                        value: 0,
                    },
                    EnumValue {
                        decl_data: None,
                        name: "BGRA".into(),
                        value: 1,
                    },
                ],
            }),
        ));
        module.types.push((
            "Rect".into(),
            UserDefinedType::Struct(StructType::new(vec![
                StructField::new(Type::scalar(ScalarKind::Int32), 0),
                StructField::new(Type::scalar(ScalarKind::Int32), 0),
                StructField::new(Type::scalar(ScalarKind::Bool), 1),
            ])),
        ));
        let mut method = Method::new(0, StructType::new(vec![StructField::new(
            Type::reference("Rect"),
            0,
        )]));
        method.response = Some(StructType::empty());
        let mut iface = InterfaceType::new(vec![method]);
        iface.service_name = Some("compositor".into());
        module
            .types
            .push(("Compositor".into(), UserDefinedType::Interface(iface)));

        let collected = collect(module).unwrap();
        let mut resolved = resolve(collected, &[], &QualifiedNamePolicy).unwrap();
        version::compute(&mut resolved, &[]).unwrap();
        RuntimeTypeInfo::from_registry(resolved.registry())
    }

    #[test]
    fn test_blob_round_trip_is_identity() {
        let info = sample_unit();
        let blob = info.encode();
        let decoded = RuntimeTypeInfo::decode(&blob).unwrap();
        assert_eq!(decoded, info);
    }

    #[test]
    fn test_encoding_is_deterministic() {
        let info = sample_unit();
        assert_eq!(info.encode(), info.encode());
    }

    #[test]
    fn test_absent_and_empty_responses_survive_round_trip() {
        let mut without = Method::new(0, StructType::empty());
        without.parameters.version_info = Some(vec![StructVersion {
            version_number: 0,
            num_fields: 0,
            num_bytes: 8,
        }]);
        let mut with_empty = without.clone();
        with_empty.ordinal = 1;
        with_empty.response = Some(with_empty.parameters.clone());
        let iface = UserDefinedType::Interface(InterfaceType::new(vec![without, with_empty]));

        let decoded = decode_type(&encode_type(&iface)).unwrap();
        match decoded {
            UserDefinedType::Interface(i) => {
                assert!(i.methods[&0].response.is_none());
                assert!(i.methods[&1].response.is_some());
            }
            other => panic!("unexpected decl {:?}", other),
        }
    }

    #[test]
    fn test_metadata_survives_round_trip() {
        let mut data = DeclarationData::named("Rect");
        data.attributes
            .insert("Stable".into(), serde_json::Value::Bool(true));
        data.comments.push("bounding box".into());
        let decl = UserDefinedType::Struct(StructType {
            decl_data: Some(data),
            fields: Vec::new(),
            version_info: None,
        });

        assert_eq!(decode_type(&encode_type(&decl)).unwrap(), decl);
    }

    #[test]
    fn test_bad_magic_rejected() {
        let mut blob = sample_unit().encode();
        blob[0] = b'X';
        assert_eq!(RuntimeTypeInfo::decode(&blob).unwrap_err(), WireError::BadMagic);
    }

    #[test]
    fn test_future_format_version_rejected() {
        let mut blob = sample_unit().encode();
        blob[4] = 0xff;
        assert!(matches!(
            RuntimeTypeInfo::decode(&blob).unwrap_err(),
            WireError::UnsupportedVersion(_)
        ));
    }

    #[test]
    fn test_truncated_blob_is_eof() {
        let blob = sample_unit().encode();
        let truncated = &blob[..blob.len() - 3];
        assert_eq!(
            RuntimeTypeInfo::decode(truncated).unwrap_err(),
            WireError::UnexpectedEof
        );
    }

    #[test]
    fn test_trailing_bytes_rejected() {
        let mut blob = sample_unit().encode();
        blob.push(0);
        assert!(matches!(
            RuntimeTypeInfo::decode(&blob).unwrap_err(),
            WireError::InvalidEncoding(_)
        ));
    }

    #[test]
    fn test_decoded_version_tables_are_validated() {
        let bad = UserDefinedType::Struct(StructType {
            decl_data: None,
            fields: Vec::new(),
            version_info: Some(vec![StructVersion {
                version_number: 1,
                num_fields: 0,
                num_bytes: 8,
            }]),
        });
        let mut info = RuntimeTypeInfo::default();
        info.types.insert(TypeKey::from("deadbeef"), bad);

        let blob = info.encode();
        assert!(matches!(
            RuntimeTypeInfo::decode(&blob).unwrap_err(),
            WireError::InvalidEncoding(_)
        ));
    }

    #[test]
    fn test_decoded_bit_must_match_field_type() {
        // A bit position on a non-boolean field is corrupt.
        let mut field = StructField::new(Type::scalar(ScalarKind::Int32), 0);
        field.bit = 3;
        let decl = UserDefinedType::Struct(StructType::new(vec![field]));
        assert!(matches!(
            decode_type(&encode_type(&decl)).unwrap_err(),
            WireError::InvalidEncoding(_)
        ));

        // So is a bit outside -1..=7, even on a boolean.
        let mut flag = StructField::new(Type::scalar(ScalarKind::Bool), 0);
        flag.bit = -5;
        let decl = UserDefinedType::Struct(StructType::new(vec![flag]));
        assert!(matches!(
            decode_type(&encode_type(&decl)).unwrap_err(),
            WireError::InvalidEncoding(_)
        ));

        // An un-laid-out boolean (bit -1) is fine.
        let decl = UserDefinedType::Struct(StructType::new(vec![StructField::new(
            Type::scalar(ScalarKind::Bool),
            0,
        )]));
        assert!(decode_type(&encode_type(&decl)).is_ok());
    }

    #[test]
    fn test_compress_round_trip() {
        let blob = sample_unit().encode();
        let compressed = RuntimeTypeInfo::compress(&blob).unwrap();
        assert_eq!(RuntimeTypeInfo::decompress(&compressed).unwrap(), blob);
    }

    #[test]
    fn test_merge_unions_and_keeps_existing_on_conflict() {
        let mut a = sample_unit();
        let type_count = a.types.len();
        let mut b = RuntimeTypeInfo::default();
        b.types.insert(
            TypeKey::from("0000"),
            UserDefinedType::Struct(StructType::empty()),
        );
        b.services
            .insert("compositor".into(), TypeKey::from("0000"));

        a.merge(b);
        assert_eq!(a.types.len(), type_count + 1);
        // Conflicting service name keeps the original binding.
        assert_ne!(a.services["compositor"], TypeKey::from("0000"));
    }
}
