// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Constant and enum-value resolution: folding reference chains.
//!
//!
//! Runs after every type reference has been resolved. A declared constant's
//! value may chain through other constants (`const A = B; const B = C;`);
//! this pass follows each chain to its terminal value - a literal, a
//! builtin constant, or an enum value reference - and records it as the
//! constant's `resolved_value`.
//!
//! Termination is provable: a walk visits each constant at most once, so it
//! ends within `|registry|` steps or trips the active-walk check and
//! reports the full cycle. Terminals are memoized per constant, so a value
//! shared by many chains is folded once regardless of fan-in.

use std::collections::BTreeMap;

use crate::model::{
    DeclaredConstant, EnumValueReference, SourceLocation, StructType, Type, UserDefinedType,
    Value,
};
use crate::registry::{Registry, TypeKey};
use crate::resolve::scope::{ScopeEntry, ScopePolicy, ScopeTarget};
use crate::resolve::{display_name, lookup_entry, ResolveError, ResolvedModule};

/// Entry point, called by [`crate::resolve::resolve`] after the type pass.
pub(crate) fn resolve_constants(
    registry: &mut Registry,
    scope: &[ScopeEntry],
    policy: &dyn ScopePolicy,
    imports: &[&ResolvedModule],
) -> Result<(), ResolveError> {
    link_value_references(registry, scope, policy)?;

    let terminals = fold_all(registry, imports)?;

    for (key, constant) in registry.constants_mut() {
        // Every own constant has a memoized terminal by now.
        let terminal = terminals
            .get(key)
            .cloned()
            .ok_or_else(|| ResolveError::UnresolvedReference {
                identifier: key.to_string(),
                location: None,
            })?;
        let location = constant.decl_data.as_ref().and_then(|d| d.source.clone());
        check_terminal(
            &constant.const_type,
            &terminal,
            &display_name(constant.decl_data.as_ref(), key),
            location,
        )?;
        constant.resolved_value = Some(terminal);
    }

    Ok(())
}

// ============================================================================
// Phase 1: link identifiers to keys
// ============================================================================

/// Fill `constant_key` / `enum_type_key` on every value reference: constant
/// initializers and struct field defaults. Identifiers that name an enum
/// value are rewritten from plain constant references to
/// [`EnumValueReference`] terminals.
fn link_value_references(
    registry: &mut Registry,
    scope: &[ScopeEntry],
    policy: &dyn ScopePolicy,
) -> Result<(), ResolveError> {
    for (_, constant) in registry.constants_mut() {
        let location = constant.decl_data.as_ref().and_then(|d| d.source.clone());
        link_value(&mut constant.value, scope, policy, location.as_ref())?;
    }

    for (_, decl) in registry.types_mut() {
        match decl {
            UserDefinedType::Struct(s) => link_field_defaults(s, scope, policy)?,
            // Method parameter and response structs carry defaults too.
            UserDefinedType::Interface(i) => {
                for method in i.methods.values_mut() {
                    link_field_defaults(&mut method.parameters, scope, policy)?;
                    if let Some(response) = &mut method.response {
                        link_field_defaults(response, scope, policy)?;
                    }
                }
            }
            UserDefinedType::Enum(_) | UserDefinedType::Union(_) => {}
        }
    }

    Ok(())
}

fn link_field_defaults(
    s: &mut StructType,
    scope: &[ScopeEntry],
    policy: &dyn ScopePolicy,
) -> Result<(), ResolveError> {
    let location = s.decl_data.as_ref().and_then(|d| d.source.clone());
    for field in &mut s.fields {
        if let Some(default) = &mut field.default_value {
            let loc = field
                .decl_data
                .as_ref()
                .and_then(|d| d.source.clone())
                .or_else(|| location.clone());
            link_value(default, scope, policy, loc.as_ref())?;
        }
    }
    Ok(())
}

fn link_value(
    value: &mut Value,
    scope: &[ScopeEntry],
    policy: &dyn ScopePolicy,
    location: Option<&SourceLocation>,
) -> Result<(), ResolveError> {
    let replacement = match value {
        Value::Literal(_) | Value::Builtin(_) => None,
        Value::ConstantReference(reference) => {
            if reference.constant_key.is_some() {
                return Ok(());
            }
            let entry = lookup_entry(&reference.identifier, scope, policy, location)?;
            match &entry.target {
                ScopeTarget::Constant { key } => {
                    reference.constant_key = Some(key.clone());
                    None
                }
                // A reference that lands on an enum value is already
                // terminal; rewrite it to the terminal kind.
                ScopeTarget::EnumValue { enum_key, index } => {
                    Some(Value::EnumValueReference(EnumValueReference {
                        identifier: reference.identifier.clone(),
                        enum_type_key: Some(enum_key.clone()),
                        enum_value_index: Some(*index),
                    }))
                }
                ScopeTarget::Type { .. } => {
                    return Err(ResolveError::TypeMismatch {
                        message: format!(
                            "'{}' names a type, not a value",
                            entry.qualified_name
                        ),
                        location: location.cloned(),
                    });
                }
            }
        }
        Value::EnumValueReference(reference) => {
            if reference.enum_type_key.is_some() {
                return Ok(());
            }
            let entry = lookup_entry(&reference.identifier, scope, policy, location)?;
            match &entry.target {
                ScopeTarget::EnumValue { enum_key, index } => {
                    reference.enum_type_key = Some(enum_key.clone());
                    reference.enum_value_index = Some(*index);
                    None
                }
                _ => {
                    return Err(ResolveError::TypeMismatch {
                        message: format!(
                            "'{}' does not name an enum value",
                            entry.qualified_name
                        ),
                        location: location.cloned(),
                    });
                }
            }
        }
    };

    if let Some(new_value) = replacement {
        *value = new_value;
    }
    Ok(())
}

// ============================================================================
// Phase 2: fold chains to terminals
// ============================================================================

fn fold_all(
    registry: &Registry,
    imports: &[&ResolvedModule],
) -> Result<BTreeMap<TypeKey, Value>, ResolveError> {
    let mut memo = BTreeMap::new();
    let keys: Vec<TypeKey> = registry.constants().map(|(k, _)| k.clone()).collect();
    for key in keys {
        let mut stack = Vec::new();
        fold_key(&key, registry, imports, &mut memo, &mut stack)?;
    }
    Ok(memo)
}

fn find_constant<'a>(
    key: &TypeKey,
    registry: &'a Registry,
    imports: &[&'a ResolvedModule],
) -> Option<&'a DeclaredConstant> {
    registry.lookup_constant(key).or_else(|| {
        imports
            .iter()
            .find_map(|module| module.registry().lookup_constant(key))
    })
}

fn fold_key(
    key: &TypeKey,
    registry: &Registry,
    imports: &[&ResolvedModule],
    memo: &mut BTreeMap<TypeKey, Value>,
    stack: &mut Vec<(TypeKey, String)>,
) -> Result<Value, ResolveError> {
    if let Some(terminal) = memo.get(key) {
        return Ok(terminal.clone());
    }
    if let Some(first) = stack.iter().position(|(visited, _)| visited == key) {
        return Err(ResolveError::CyclicConstantReference {
            cycle: stack[first..].iter().map(|(_, name)| name.clone()).collect(),
        });
    }

    let constant = find_constant(key, registry, imports).ok_or_else(|| {
        ResolveError::UnresolvedReference {
            identifier: key.to_string(),
            location: None,
        }
    })?;

    // Imported constants are already folded; reuse their terminal.
    if let Some(terminal) = &constant.resolved_value {
        memo.insert(key.clone(), terminal.clone());
        return Ok(terminal.clone());
    }

    let name = display_name(constant.decl_data.as_ref(), key);
    stack.push((key.clone(), name));
    let terminal = match &constant.value {
        Value::ConstantReference(reference) => {
            let location = constant.decl_data.as_ref().and_then(|d| d.source.clone());
            let target =
                reference
                    .constant_key
                    .as_ref()
                    .ok_or_else(|| ResolveError::UnresolvedReference {
                        identifier: reference.identifier.clone(),
                        location,
                    })?;
            fold_key(target, registry, imports, memo, stack)?
        }
        terminal => terminal.clone(),
    };
    stack.pop();

    memo.insert(key.clone(), terminal.clone());
    Ok(terminal)
}

// ============================================================================
// Phase 3: terminal type check
// ============================================================================

fn check_terminal(
    const_type: &Type,
    terminal: &Value,
    constant_name: &str,
    location: Option<SourceLocation>,
) -> Result<(), ResolveError> {
    let ok = match terminal {
        Value::Literal(literal) => match (const_type, literal) {
            (Type::Str { .. }, crate::model::LiteralValue::Str(_)) => true,
            (Type::Scalar(kind), literal) => literal.matches_scalar(*kind),
            _ => false,
        },
        Value::Builtin(builtin) => match const_type {
            Type::Scalar(kind) if kind.is_floating_point() => {
                (builtin.is_float() && *kind == crate::model::ScalarKind::Float)
                    || (builtin.is_double() && *kind == crate::model::ScalarKind::Double)
            }
            _ => false,
        },
        Value::EnumValueReference(reference) => match (const_type, &reference.enum_type_key) {
            (Type::Reference(declared), Some(enum_key)) => {
                declared.type_key.as_ref() == Some(enum_key)
            }
            _ => false,
        },
        // fold_key never produces a constant reference.
        Value::ConstantReference(_) => false,
    };

    if ok {
        Ok(())
    } else {
        Err(ResolveError::TypeMismatch {
            message: format!(
                "constant {} declared as {} but resolves to {}",
                constant_name,
                const_type.kind_name(),
                terminal.kind_name()
            ),
            location,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{
        BuiltinConstant, EnumType, EnumValue, LiteralValue, ScalarKind, StructField, StructType,
    };
    use crate::resolve::{collect, resolve, ModuleDecls, QualifiedNamePolicy};

    fn int_const(value: Value) -> DeclaredConstant {
        DeclaredConstant::new(Type::scalar(ScalarKind::Int32), value)
    }

    fn resolve_single(module: ModuleDecls) -> Result<ResolvedModule, ResolveError> {
        let collected = collect(module)?;
        resolve(collected, &[], &QualifiedNamePolicy)
    }

    fn resolved_value_of(module: &ResolvedModule, qualified: &str) -> Value {
        let key = TypeKey::for_declaration("const", qualified);
        module
            .registry()
            .lookup_constant(&key)
            .unwrap()
            .resolved_value
            .clone()
            .unwrap()
    }

    #[test]
    fn test_chain_folds_to_shared_terminal() {
        // A -> B -> C, C = 42: both A and B end at the literal.
        let mut module = ModuleDecls::new("m");
        module.constants.push(("A".into(), int_const(Value::constant("B"))));
        module.constants.push(("B".into(), int_const(Value::constant("C"))));
        module.constants.push((
            "C".into(),
            int_const(Value::Literal(LiteralValue::Int64(42))),
        ));

        let resolved = resolve_single(module).unwrap();
        let forty_two = Value::Literal(LiteralValue::Int64(42));
        assert_eq!(resolved_value_of(&resolved, "m.A"), forty_two);
        assert_eq!(resolved_value_of(&resolved, "m.B"), forty_two);
        assert_eq!(resolved_value_of(&resolved, "m.C"), forty_two);
    }

    #[test]
    fn test_two_constant_cycle_names_all_participants() {
        let mut module = ModuleDecls::new("m");
        module.constants.push(("A".into(), int_const(Value::constant("B"))));
        module.constants.push(("B".into(), int_const(Value::constant("A"))));

        match resolve_single(module).unwrap_err() {
            ResolveError::CyclicConstantReference { cycle } => {
                assert_eq!(cycle.len(), 2);
                assert!(cycle.contains(&"m.A".to_string()));
                assert!(cycle.contains(&"m.B".to_string()));
            }
            other => panic!("expected cycle error, got {}", other),
        }
    }

    #[test]
    fn test_self_cycle_rejected() {
        let mut module = ModuleDecls::new("m");
        module.constants.push(("A".into(), int_const(Value::constant("A"))));

        match resolve_single(module).unwrap_err() {
            ResolveError::CyclicConstantReference { cycle } => {
                assert_eq!(cycle, vec!["m.A".to_string()]);
            }
            other => panic!("expected cycle error, got {}", other),
        }
    }

    #[test]
    fn test_enum_value_terminal() {
        let mut module = ModuleDecls::new("m");
        module.types.push((
            "Color".into(),
            UserDefinedType::Enum(EnumType {
                decl_data: None,
                values: vec![
                    EnumValue {
                        decl_data: None,
                        name: "RED".into(),
                        value: 0,
                    },
                    EnumValue {
                        decl_data: None,
                        name: "GREEN".into(),
                        value: 1,
                    },
                ],
            }),
        ));
        module.constants.push((
            "kDefault".into(),
            DeclaredConstant::new(Type::reference("Color"), Value::constant("Color.GREEN")),
        ));

        let resolved = resolve_single(module).unwrap();
        let enum_key = TypeKey::for_declaration("enum", "m.Color");
        match resolved_value_of(&resolved, "m.kDefault") {
            Value::EnumValueReference(r) => {
                assert_eq!(r.enum_type_key, Some(enum_key));
                assert_eq!(r.enum_value_index, Some(1));
            }
            other => panic!("expected enum terminal, got {:?}", other),
        }
    }

    #[test]
    fn test_enum_terminal_must_match_declared_enum() {
        let mut module = ModuleDecls::new("m");
        for name in ["Color", "Shape"] {
            module.types.push((
                name.into(),
                UserDefinedType::Enum(EnumType {
                    decl_data: None,
                    values: vec![EnumValue {
                        decl_data: None,
                        name: "FIRST".into(),
                        value: 0,
                    }],
                }),
            ));
        }
        module.constants.push((
            "kBad".into(),
            DeclaredConstant::new(Type::reference("Shape"), Value::constant("Color.FIRST")),
        ));

        assert!(matches!(
            resolve_single(module).unwrap_err(),
            ResolveError::TypeMismatch { .. }
        ));
    }

    #[test]
    fn test_literal_type_mismatch() {
        let mut module = ModuleDecls::new("m");
        module.constants.push((
            "kName".into(),
            DeclaredConstant::new(
                Type::scalar(ScalarKind::Uint32),
                Value::Literal(LiteralValue::Str("nope".into())),
            ),
        ));

        assert!(matches!(
            resolve_single(module).unwrap_err(),
            ResolveError::TypeMismatch { .. }
        ));
    }

    #[test]
    fn test_builtin_width_checked() {
        let mut module = ModuleDecls::new("m");
        module.constants.push((
            "kNan".into(),
            DeclaredConstant::new(
                Type::scalar(ScalarKind::Double),
                Value::Builtin(BuiltinConstant::DoubleNan),
            ),
        ));
        module.constants.push((
            "kWrong".into(),
            DeclaredConstant::new(
                Type::scalar(ScalarKind::Float),
                Value::Builtin(BuiltinConstant::DoubleInfinity),
            ),
        ));

        assert!(matches!(
            resolve_single(module).unwrap_err(),
            ResolveError::TypeMismatch { .. }
        ));
    }

    #[test]
    fn test_field_default_reference_is_linked() {
        let mut module = ModuleDecls::new("m");
        module.constants.push((
            "kLimit".into(),
            int_const(Value::Literal(LiteralValue::Int64(7))),
        ));
        let mut field = StructField::new(Type::scalar(ScalarKind::Int32), 0);
        field.default_value = Some(Value::constant("kLimit"));
        module.types.push((
            "Config".into(),
            UserDefinedType::Struct(StructType::new(vec![field])),
        ));

        let resolved = resolve_single(module).unwrap();
        let key = TypeKey::for_declaration("struct", "m.Config");
        let constant_key = TypeKey::for_declaration("const", "m.kLimit");
        match resolved.registry().lookup_type(&key).unwrap() {
            UserDefinedType::Struct(s) => match &s.fields[0].default_value {
                Some(Value::ConstantReference(r)) => {
                    assert_eq!(r.constant_key, Some(constant_key));
                }
                other => panic!("expected linked default, got {:?}", other),
            },
            other => panic!("unexpected decl {:?}", other),
        }
    }

    #[test]
    fn test_method_field_defaults_are_linked() {
        use crate::model::{InterfaceType, Method};

        let mut module = ModuleDecls::new("m");
        module.constants.push((
            "kLimit".into(),
            int_const(Value::Literal(LiteralValue::Int64(7))),
        ));

        let mut param = StructField::new(Type::scalar(ScalarKind::Int32), 0);
        param.default_value = Some(Value::constant("kLimit"));
        let mut method = Method::new(0, StructType::new(vec![param.clone()]));
        method.response = Some(StructType::new(vec![param]));
        module.types.push((
            "Throttle".into(),
            UserDefinedType::Interface(InterfaceType::new(vec![method])),
        ));

        let resolved = resolve_single(module).unwrap();
        let key = TypeKey::for_declaration("interface", "m.Throttle");
        let constant_key = TypeKey::for_declaration("const", "m.kLimit");
        match resolved.registry().lookup_type(&key).unwrap() {
            UserDefinedType::Interface(i) => {
                let method = &i.methods[&0];
                let linked = |s: &StructType| match &s.fields[0].default_value {
                    Some(Value::ConstantReference(r)) => r.constant_key == Some(constant_key.clone()),
                    _ => false,
                };
                assert!(linked(&method.parameters));
                assert!(linked(method.response.as_ref().unwrap()));
            }
            other => panic!("unexpected decl {:?}", other),
        }
    }

    #[test]
    fn test_cross_module_constant_chain_reuses_import_terminal() {
        let mut base = ModuleDecls::new("base");
        base.constants.push((
            "kAnswer".into(),
            int_const(Value::Literal(LiteralValue::Int64(42))),
        ));
        let base_resolved = resolve_single(base).unwrap();

        let mut app = ModuleDecls::new("app");
        app.imports.push("base".into());
        app.constants
            .push(("kAlias".into(), int_const(Value::constant("base.kAnswer"))));
        let collected = collect(app).unwrap();
        let resolved = resolve(collected, &[&base_resolved], &QualifiedNamePolicy).unwrap();

        assert_eq!(
            resolved_value_of(&resolved, "app.kAlias"),
            Value::Literal(LiteralValue::Int64(42))
        );
    }
}
