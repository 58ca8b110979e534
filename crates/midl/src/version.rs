// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Struct layout and version-table computation.
//!
//!
//! Runs after resolution, as the final mutating pass over a module. For
//! every struct (including method parameter and response structs) it
//! assigns wire offsets and bit positions to the fields and derives the
//! version table that lets newer peers size messages for older ones. For
//! every interface it derives `current_version`.
//!
//! Layout policy: fields are placed in `(min_version, declaration ordinal)`
//! order. Booleans pack eight to a byte, sharing an offset with ascending
//! bit index; the open boolean slot persists across interleaved non-boolean
//! fields. Every other field is aligned to its natural width. Payload
//! extent is rounded up to 8 and sits behind a fixed 8-byte message header.
//! Because placement order is append-only across versions, a field's offset
//! and bit never change once published.

use std::collections::BTreeMap;
use std::fmt;

use crate::model::{
    DeclKind, ScalarKind, StructField, StructType, StructVersion, Type, UserDefinedType,
};
use crate::registry::{Registry, TypeKey};
use crate::resolve::ResolvedModule;

/// Payload sizes are rounded up to this, and the fixed header is this wide.
const HEADER_BYTES: u32 = 8;

// ============================================================================
// VersioningError
// ============================================================================

/// A version table (computed or decoded) violates the monotonicity
/// invariants, or layout input is internally inconsistent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersioningError {
    Inconsistent { message: String },
}

impl fmt::Display for VersioningError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VersioningError::Inconsistent { message } => {
                write!(f, "inconsistent version info: {}", message)
            }
        }
    }
}

impl std::error::Error for VersioningError {}

// ============================================================================
// Validation
// ============================================================================

/// Check a version table against the invariants: version 0 present,
/// `version_number` strictly increasing, `num_fields` and `num_bytes`
/// non-decreasing, `num_bytes` at least the header size.
///
/// Applied to every computed table and to tables decoded from blobs.
pub fn validate_version_table(
    name: &str,
    table: &[StructVersion],
) -> Result<(), VersioningError> {
    let fail = |message: String| Err(VersioningError::Inconsistent { message });

    match table.first() {
        None => return fail(format!("{}: empty version table", name)),
        Some(first) if first.version_number != 0 => {
            return fail(format!("{}: version 0 missing", name));
        }
        Some(_) => {}
    }

    for window in table.windows(2) {
        let (prev, next) = (&window[0], &window[1]);
        if next.version_number <= prev.version_number {
            return fail(format!(
                "{}: version {} follows version {}",
                name, next.version_number, prev.version_number
            ));
        }
        if next.num_fields < prev.num_fields || next.num_bytes < prev.num_bytes {
            return fail(format!(
                "{}: version {} shrinks relative to version {}",
                name, next.version_number, prev.version_number
            ));
        }
    }

    if let Some(row) = table.iter().find(|row| row.num_bytes < HEADER_BYTES) {
        return fail(format!(
            "{}: version {} smaller than the message header",
            name, row.version_number
        ));
    }

    Ok(())
}

// ============================================================================
// compute
// ============================================================================

/// Lay out every struct of a resolved module and fill version tables and
/// interface `current_version`s.
///
/// `imports` supply declaration kinds for cross-module references, which
/// decide reference widths (enums are inline, everything else is a pointer
/// or handle slot).
pub fn compute(
    module: &mut ResolvedModule,
    imports: &[&ResolvedModule],
) -> Result<(), VersioningError> {
    // Width decisions need the kind behind every reference key; snapshot
    // them before taking the mutable walk.
    let mut kinds: BTreeMap<TypeKey, DeclKind> = BTreeMap::new();
    collect_kinds(module.registry(), &mut kinds);
    for import in imports {
        collect_kinds(import.registry(), &mut kinds);
    }

    let mut laid_out = 0usize;
    for (key, decl) in module.registry_mut().types_mut() {
        match decl {
            UserDefinedType::Enum(_) | UserDefinedType::Union(_) => {}
            UserDefinedType::Struct(s) => {
                layout_struct(s, &kinds, &key.to_string())?;
                laid_out += 1;
            }
            UserDefinedType::Interface(i) => {
                let mut current = 0u32;
                for method in i.methods.values_mut() {
                    current = current.max(method.min_version);
                    let name = format!("{}#{}", key, method.ordinal);
                    current = current.max(layout_struct(
                        &mut method.parameters,
                        &kinds,
                        &name,
                    )?);
                    if let Some(response) = &mut method.response {
                        current = current.max(layout_struct(response, &kinds, &name)?);
                    }
                    laid_out += 1;
                }
                i.current_version = current;
            }
        }
    }

    log::debug!(
        "[VERSION] '{}': laid out {} structs",
        module.name(),
        laid_out
    );
    Ok(())
}

fn collect_kinds(registry: &Registry, kinds: &mut BTreeMap<TypeKey, DeclKind>) {
    for (key, decl) in registry.types() {
        kinds.insert(key.clone(), decl.kind());
    }
}

// ============================================================================
// Layout
// ============================================================================

struct LayoutState {
    /// Next free payload byte.
    cursor: u32,
    /// Byte currently accepting packed booleans, with the next free bit.
    open_bool: Option<(u32, u8)>,
}

/// Assign offsets and bits, derive the version table, and return the
/// highest `min_version` among the fields.
fn layout_struct(
    s: &mut StructType,
    kinds: &BTreeMap<TypeKey, DeclKind>,
    name: &str,
) -> Result<u32, VersioningError> {
    // Placement order: (min_version, declaration ordinal), with the field's
    // position as the ordinal fallback.
    let mut order: Vec<usize> = (0..s.fields.len()).collect();
    order.sort_by_key(|&i| {
        let f = &s.fields[i];
        let ordinal = f
            .decl_data
            .as_ref()
            .and_then(|d| d.declaration_order)
            .unwrap_or(i as u32);
        (f.min_version, ordinal, i)
    });

    let mut state = LayoutState {
        cursor: 0,
        open_bool: None,
    };
    let mut max_version = 0u32;

    for &i in &order {
        let field = &mut s.fields[i];
        max_version = max_version.max(field.min_version);
        place_field(field, &mut state, kinds, name)?;
    }

    s.version_info = Some(version_table(&s.fields, &order, kinds));

    // Runtime consumers traverse fields in wire order.
    s.fields.sort_by_key(|f| (f.offset, f.bit as i16));

    let table = s.version_info.as_deref().unwrap_or(&[]);
    validate_version_table(name, table)?;
    Ok(max_version)
}

fn place_field(
    field: &mut StructField,
    state: &mut LayoutState,
    kinds: &BTreeMap<TypeKey, DeclKind>,
    name: &str,
) -> Result<(), VersioningError> {
    if matches!(field.field_type, Type::Scalar(ScalarKind::Bool)) {
        let (offset, bit) = match state.open_bool {
            Some((offset, bit)) if bit < 8 => (offset, bit),
            _ => {
                let offset = state.cursor;
                state.cursor += 1;
                (offset, 0)
            }
        };
        state.open_bool = Some((offset, bit + 1));
        field.offset = offset;
        field.bit = bit as i8;
        return Ok(());
    }

    let width = field_width(&field.field_type, kinds).ok_or_else(|| {
        VersioningError::Inconsistent {
            message: format!("{}: unresolved reference reached layout", name),
        }
    })?;
    field.offset = align_up(state.cursor, width);
    field.bit = -1;
    state.cursor = field.offset + width;
    Ok(())
}

/// Wire width of a non-boolean field. Alignment equals width.
///
/// `None` only for a reference whose key is missing, which resolution
/// rules out.
fn field_width(ty: &Type, kinds: &BTreeMap<TypeKey, DeclKind>) -> Option<u32> {
    Some(match ty {
        Type::Scalar(kind) => kind.size() as u32,
        // Pointer slot.
        Type::Str { .. } | Type::Array { .. } | Type::Map { .. } => 8,
        // Handle index.
        Type::Handle { .. } => 4,
        Type::Reference(reference) => {
            if reference.is_interface_request {
                return Some(4);
            }
            let key = reference.type_key.as_ref()?;
            match kinds.get(key)? {
                // Inline 32-bit value.
                DeclKind::Enum => 4,
                // Pointer slot; an interface travels as handle + version.
                DeclKind::Struct | DeclKind::Union | DeclKind::Interface => 8,
            }
        }
    })
}

const fn align_up(value: u32, alignment: u32) -> u32 {
    (value + alignment - 1) / alignment * alignment
}

/// One row per distinct `min_version`, plus version 0 even when no field
/// is that old. `order` is the placement order, so each version's field
/// set is a prefix of it.
fn version_table(
    fields: &[StructField],
    order: &[usize],
    kinds: &BTreeMap<TypeKey, DeclKind>,
) -> Vec<StructVersion> {
    let mut boundaries: Vec<u32> = fields.iter().map(|f| f.min_version).collect();
    boundaries.push(0);
    boundaries.sort_unstable();
    boundaries.dedup();

    boundaries
        .into_iter()
        .map(|version| {
            let mut num_fields = 0u32;
            let mut extent = 0u32;
            for &i in order {
                let field = &fields[i];
                if field.min_version > version {
                    break;
                }
                num_fields += 1;
                let end = if field.bit >= 0 {
                    field.offset + 1
                } else {
                    // Placement already proved the width computable.
                    field.offset + field_width(&field.field_type, kinds).unwrap_or(8)
                };
                extent = extent.max(end);
            }
            StructVersion {
                version_number: version,
                num_fields,
                num_bytes: HEADER_BYTES + align_up(extent, 8),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{
        EnumType, EnumValue, InterfaceType, Method, StructField, StructType, UserDefinedType,
    };
    use crate::resolve::{collect, resolve, ModuleDecls, QualifiedNamePolicy, ResolvedModule};

    fn resolve_and_version(module: ModuleDecls) -> ResolvedModule {
        let collected = collect(module).unwrap();
        let mut resolved = resolve(collected, &[], &QualifiedNamePolicy).unwrap();
        compute(&mut resolved, &[]).unwrap();
        resolved
    }

    fn struct_of(module: &ResolvedModule, qualified: &str) -> StructType {
        let key = TypeKey::for_declaration("struct", qualified);
        match module.registry().lookup_type(&key).unwrap() {
            UserDefinedType::Struct(s) => s.clone(),
            other => panic!("unexpected decl {:?}", other),
        }
    }

    fn field(ty: Type, min_version: u32) -> StructField {
        StructField::new(ty, min_version)
    }

    #[test]
    fn test_natural_alignment_and_padding() {
        let mut module = ModuleDecls::new("m");
        module.types.push((
            "Mixed".into(),
            UserDefinedType::Struct(StructType::new(vec![
                field(Type::scalar(ScalarKind::Uint8), 0),
                field(Type::scalar(ScalarKind::Uint64), 0),
                field(Type::scalar(ScalarKind::Uint16), 0),
            ])),
        ));

        let s = struct_of(&resolve_and_version(module), "m.Mixed");
        let offsets: Vec<u32> = s.fields.iter().map(|f| f.offset).collect();
        assert_eq!(offsets, vec![0, 8, 16]);
        assert_eq!(
            s.version_info.unwrap(),
            vec![StructVersion {
                version_number: 0,
                num_fields: 3,
                num_bytes: 8 + 24,
            }]
        );
    }

    #[test]
    fn test_booleans_pack_eight_per_byte() {
        let mut module = ModuleDecls::new("m");
        let fields: Vec<StructField> = (0..9)
            .map(|_| field(Type::scalar(ScalarKind::Bool), 0))
            .collect();
        module.types.push((
            "Flags".into(),
            UserDefinedType::Struct(StructType::new(fields)),
        ));

        let s = struct_of(&resolve_and_version(module), "m.Flags");
        let placements: Vec<(u32, i8)> = s.fields.iter().map(|f| (f.offset, f.bit)).collect();
        let mut expected: Vec<(u32, i8)> = (0..8).map(|bit| (0, bit)).collect();
        expected.push((1, 0));
        assert_eq!(placements, expected);
        assert_eq!(s.version_info.unwrap()[0].num_bytes, 8 + 8);
    }

    #[test]
    fn test_open_bool_slot_survives_interleaved_fields() {
        let mut module = ModuleDecls::new("m");
        module.types.push((
            "Interleaved".into(),
            UserDefinedType::Struct(StructType::new(vec![
                field(Type::scalar(ScalarKind::Bool), 0),
                field(Type::scalar(ScalarKind::Uint32), 0),
                field(Type::scalar(ScalarKind::Bool), 0),
            ])),
        ));

        let s = struct_of(&resolve_and_version(module), "m.Interleaved");
        // Wire order: both booleans share byte 0, the u32 sits at 4.
        let placements: Vec<(u32, i8)> = s.fields.iter().map(|f| (f.offset, f.bit)).collect();
        assert_eq!(placements, vec![(0, 0), (0, 1), (4, -1)]);
    }

    #[test]
    fn test_version_table_one_row_per_min_version() {
        let mut module = ModuleDecls::new("m");
        module.types.push((
            "Evolving".into(),
            UserDefinedType::Struct(StructType::new(vec![
                field(Type::scalar(ScalarKind::Uint32), 0),
                field(Type::scalar(ScalarKind::Uint32), 1),
                field(Type::scalar(ScalarKind::Uint64), 1),
                field(Type::scalar(ScalarKind::Uint8), 2),
            ])),
        ));

        let s = struct_of(&resolve_and_version(module), "m.Evolving");
        assert_eq!(
            s.version_info.unwrap(),
            vec![
                StructVersion {
                    version_number: 0,
                    num_fields: 1,
                    num_bytes: 8 + 8,
                },
                StructVersion {
                    version_number: 1,
                    num_fields: 3,
                    num_bytes: 8 + 16,
                },
                StructVersion {
                    version_number: 2,
                    num_fields: 4,
                    num_bytes: 8 + 24,
                },
            ]
        );
    }

    #[test]
    fn test_version_zero_emitted_even_without_version_zero_fields() {
        let mut module = ModuleDecls::new("m");
        module.types.push((
            "LateComer".into(),
            UserDefinedType::Struct(StructType::new(vec![field(
                Type::scalar(ScalarKind::Uint32),
                3,
            )])),
        ));

        let s = struct_of(&resolve_and_version(module), "m.LateComer");
        let table = s.version_info.unwrap();
        assert_eq!(
            table[0],
            StructVersion {
                version_number: 0,
                num_fields: 0,
                num_bytes: 8,
            }
        );
        assert_eq!(table[1].version_number, 3);
    }

    #[test]
    fn test_empty_struct_is_header_only() {
        let mut module = ModuleDecls::new("m");
        module.types.push((
            "Nothing".into(),
            UserDefinedType::Struct(StructType::empty()),
        ));

        let s = struct_of(&resolve_and_version(module), "m.Nothing");
        assert_eq!(
            s.version_info.unwrap(),
            vec![StructVersion {
                version_number: 0,
                num_fields: 0,
                num_bytes: 8,
            }]
        );
    }

    #[test]
    fn test_reference_widths_enum_inline_struct_pointer() {
        let mut module = ModuleDecls::new("m");
        module.types.push((
            "Color".into(),
            UserDefinedType::Enum(EnumType {
                decl_data: None,
                values: vec![EnumValue {
                    decl_data: None,
                    name: "RED".into(),
                    value: 0,
                }],
            }),
        ));
        module.types.push((
            "Payload".into(),
            UserDefinedType::Struct(StructType::new(vec![field(
                Type::scalar(ScalarKind::Uint64),
                0,
            )])),
        ));
        module.types.push((
            "Holder".into(),
            UserDefinedType::Struct(StructType::new(vec![
                field(Type::reference("Color"), 0),
                field(Type::reference("Payload"), 0),
            ])),
        ));

        let s = struct_of(&resolve_and_version(module), "m.Holder");
        // Enum inline at 0 (width 4), struct pointer aligned to 8.
        let offsets: Vec<u32> = s.fields.iter().map(|f| f.offset).collect();
        assert_eq!(offsets, vec![0, 8]);
        assert_eq!(s.version_info.unwrap()[0].num_bytes, 8 + 16);
    }

    #[test]
    fn test_interface_current_version_aggregates_nested_min_versions() {
        let mut module = ModuleDecls::new("m");
        let mut open = Method::new(0, StructType::new(vec![field(
            Type::scalar(ScalarKind::Uint32),
            0,
        )]));
        open.min_version = 1;
        let mut close = Method::new(1, StructType::empty());
        close.response = Some(StructType::new(vec![field(
            Type::scalar(ScalarKind::Bool),
            4,
        )]));
        module.types.push((
            "Session".into(),
            UserDefinedType::Interface(InterfaceType::new(vec![open, close])),
        ));

        let resolved = resolve_and_version(module);
        let key = TypeKey::for_declaration("interface", "m.Session");
        match resolved.registry().lookup_type(&key).unwrap() {
            UserDefinedType::Interface(i) => {
                assert_eq!(i.current_version, 4);
                // Nested structs got version tables too.
                let close = &i.methods[&1];
                assert!(close.parameters.version_info.is_some());
                assert!(close.response.as_ref().unwrap().version_info.is_some());
            }
            other => panic!("unexpected decl {:?}", other),
        }
    }

    #[test]
    fn test_interface_without_methods_is_version_zero() {
        let mut module = ModuleDecls::new("m");
        module.types.push((
            "Idle".into(),
            UserDefinedType::Interface(InterfaceType::new(vec![])),
        ));

        let resolved = resolve_and_version(module);
        let key = TypeKey::for_declaration("interface", "m.Idle");
        match resolved.registry().lookup_type(&key).unwrap() {
            UserDefinedType::Interface(i) => assert_eq!(i.current_version, 0),
            other => panic!("unexpected decl {:?}", other),
        }
    }

    #[test]
    fn test_validate_rejects_shrinking_table() {
        let table = vec![
            StructVersion {
                version_number: 0,
                num_fields: 2,
                num_bytes: 24,
            },
            StructVersion {
                version_number: 1,
                num_fields: 3,
                num_bytes: 16,
            },
        ];
        assert!(matches!(
            validate_version_table("m.Bad", &table).unwrap_err(),
            VersioningError::Inconsistent { .. }
        ));
    }

    #[test]
    fn test_validate_rejects_missing_version_zero() {
        let table = vec![StructVersion {
            version_number: 1,
            num_fields: 0,
            num_bytes: 8,
        }];
        assert!(validate_version_table("m.Bad", &table).is_err());
    }

    #[test]
    fn test_validate_rejects_duplicate_version() {
        let row = StructVersion {
            version_number: 0,
            num_fields: 0,
            num_bytes: 8,
        };
        assert!(validate_version_table("m.Bad", &[row, row]).is_err());
    }
}
