// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Two-pass reference resolution.
//!
//!
//! Declarations may forward-reference names that have not been seen yet, so
//! resolution is split:
//!
//! - **Pass 1** ([`collect`]): every declaration of a [`ModuleDecls`] is
//!   registered into a fresh registry segment and its visible names are
//!   indexed, but identifier-bearing references stay untouched.
//! - **Pass 2** ([`resolve`]): requires pass 1 of the module and completed
//!   resolution of all of its imports. Every [`crate::model::TypeReference`]
//!   is matched against the visible scope and gains its `type_key`; constant
//!   value chains are then folded to terminal values (see
//!   [`constants`](self::constants)).
//!
//! The unresolved and resolved forms are distinct types: [`ModuleDecls`] in,
//! [`ResolvedModule`] out, and only this module constructs the latter. Code
//! downstream of the resolver can therefore never observe a half-resolved
//! graph.

pub mod constants;
pub mod scope;

use std::fmt;

use crate::model::{
    DeclKind, DeclarationData, DeclaredConstant, SourceLocation, Type, UserDefinedType,
};
use crate::registry::{Registry, RegistryError, TypeKey};

pub use scope::{LookupOutcome, QualifiedNamePolicy, ScopeEntry, ScopePolicy, ScopeTarget};

// ============================================================================
// ResolveError
// ============================================================================

/// Compile-time resolution failures. All are fatal to the enclosing module:
/// a partially resolved graph cannot safely feed the version computer or
/// the serializer.
#[derive(Debug, Clone, PartialEq)]
pub enum ResolveError {
    /// No declaration in scope matches the identifier.
    UnresolvedReference {
        identifier: String,
        location: Option<SourceLocation>,
    },
    /// More than one equally-qualified declaration matches.
    AmbiguousReference {
        identifier: String,
        candidates: Vec<String>,
        location: Option<SourceLocation>,
    },
    /// A constant reference chain revisited a constant on the active walk.
    /// `cycle` names every participant in walk order.
    CyclicConstantReference { cycle: Vec<String> },
    /// A reference resolved to a declaration of the wrong shape, or a
    /// constant's terminal value does not fit its declared type.
    TypeMismatch {
        message: String,
        location: Option<SourceLocation>,
    },
    Registry(RegistryError),
}

impl fmt::Display for ResolveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let loc = |l: &Option<SourceLocation>| match l {
            Some(l) => format!(" at {}", l),
            None => String::new(),
        };
        match self {
            ResolveError::UnresolvedReference {
                identifier,
                location,
            } => write!(f, "unresolved reference '{}'{}", identifier, loc(location)),
            ResolveError::AmbiguousReference {
                identifier,
                candidates,
                location,
            } => write!(
                f,
                "ambiguous reference '{}'{}: candidates {}",
                identifier,
                loc(location),
                candidates.join(", ")
            ),
            ResolveError::CyclicConstantReference { cycle } => {
                write!(f, "cyclic constant reference: {}", cycle.join(" -> "))
            }
            ResolveError::TypeMismatch { message, location } => {
                write!(f, "type mismatch: {}{}", message, loc(location))
            }
            ResolveError::Registry(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for ResolveError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ResolveError::Registry(e) => Some(e),
            _ => None,
        }
    }
}

impl From<RegistryError> for ResolveError {
    fn from(e: RegistryError) -> Self {
        ResolveError::Registry(e)
    }
}

// ============================================================================
// Module states
// ============================================================================

/// Raw declarations of one module, as handed over by the frontend.
///
/// Short names are relative to the module path; references inside the
/// declarations carry identifiers only.
#[derive(Debug, Clone, Default)]
pub struct ModuleDecls {
    /// Dotted module path, e.g. `"ui.gfx"`.
    pub name: String,
    /// Names of directly imported modules. Transitive imports are not
    /// re-exported into this module's scope.
    pub imports: Vec<String>,
    pub types: Vec<(String, UserDefinedType)>,
    pub constants: Vec<(String, DeclaredConstant)>,
}

impl ModuleDecls {
    pub fn new(name: impl Into<String>) -> Self {
        ModuleDecls {
            name: name.into(),
            ..ModuleDecls::default()
        }
    }
}

/// Output of pass 1: a populated registry segment plus the module's own
/// name index. References are still unresolved.
#[derive(Debug)]
pub struct CollectedModule {
    name: String,
    imports: Vec<String>,
    registry: Registry,
    local_entries: Vec<ScopeEntry>,
}

impl CollectedModule {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn imports(&self) -> &[String] {
        &self.imports
    }
}

/// A fully resolved module: registry segment with every reference keyed and
/// every constant folded. Constructible only by [`resolve`]; immutable to
/// callers and freely shareable once published.
#[derive(Debug)]
pub struct ResolvedModule {
    name: String,
    registry: Registry,
    exports: Vec<ScopeEntry>,
}

impl ResolvedModule {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Names this module contributes to importers' scopes.
    pub fn exports(&self) -> &[ScopeEntry] {
        &self.exports
    }

    pub fn into_registry(self) -> Registry {
        self.registry
    }

    // The version computer appends version tables after resolution; nothing
    // outside the crate can mutate a resolved module.
    pub(crate) fn registry_mut(&mut self) -> &mut Registry {
        &mut self.registry
    }
}

// ============================================================================
// Pass 1: collect
// ============================================================================

fn qualify(module: &str, short_name: &str) -> String {
    if module.is_empty() {
        short_name.to_string()
    } else {
        format!("{}.{}", module, short_name)
    }
}

/// Pass 1: register every declaration and index its visible names.
pub fn collect(module: ModuleDecls) -> Result<CollectedModule, ResolveError> {
    let mut registry = Registry::new();
    let mut local_entries = Vec::new();

    for (short_name, mut decl) in module.types {
        let qualified = qualify(&module.name, &short_name);
        let kind = decl.kind();

        // Advisory naming metadata: fill only what the frontend left empty.
        let data = decl
            .decl_data_mut()
            .get_or_insert_with(DeclarationData::default);
        if data.short_name.is_none() {
            data.short_name = Some(short_name.clone());
        }
        if data.full_identifier.is_none() {
            data.full_identifier = Some(qualified.clone());
        }

        let enum_value_names: Vec<String> = match &decl {
            UserDefinedType::Enum(e) => e.values.iter().map(|v| v.name.clone()).collect(),
            _ => Vec::new(),
        };
        let service_name = match &decl {
            UserDefinedType::Interface(i) => i.service_name.clone(),
            _ => None,
        };

        let key = registry.register_type(&qualified, decl)?;

        if let Some(service) = service_name {
            registry.register_service(service, key.clone());
        }

        for (index, value_name) in enum_value_names.iter().enumerate() {
            local_entries.push(ScopeEntry {
                qualified_name: format!("{}.{}", qualified, value_name),
                target: ScopeTarget::EnumValue {
                    enum_key: key.clone(),
                    index: index as u32,
                },
            });
        }

        local_entries.push(ScopeEntry {
            qualified_name: qualified,
            target: ScopeTarget::Type { key, kind },
        });
    }

    for (short_name, mut constant) in module.constants {
        let qualified = qualify(&module.name, &short_name);
        let data = constant
            .decl_data
            .get_or_insert_with(DeclarationData::default);
        if data.short_name.is_none() {
            data.short_name = Some(short_name.clone());
        }
        if data.full_identifier.is_none() {
            data.full_identifier = Some(qualified.clone());
        }

        let key = registry.register_constant(&qualified, constant)?;
        local_entries.push(ScopeEntry {
            qualified_name: qualified,
            target: ScopeTarget::Constant { key },
        });
    }

    log::debug!(
        "[RESOLVE] pass 1 of '{}': {} types, {} constants",
        module.name,
        registry.type_count(),
        registry.constant_count()
    );

    Ok(CollectedModule {
        name: module.name,
        imports: module.imports,
        registry,
        local_entries,
    })
}

// ============================================================================
// Pass 2: resolve
// ============================================================================

/// Pass 2: resolve every type reference, then fold constants.
///
/// `imports` must be the completed resolutions of exactly the modules named
/// in the collected module's import list; the pipeline enforces the
/// ordering. Visibility is own declarations plus direct imports.
pub fn resolve(
    collected: CollectedModule,
    imports: &[&ResolvedModule],
    policy: &dyn ScopePolicy,
) -> Result<ResolvedModule, ResolveError> {
    let CollectedModule {
        name,
        imports: _,
        mut registry,
        local_entries,
    } = collected;

    let mut visible: Vec<ScopeEntry> = local_entries.clone();
    for import in imports {
        visible.extend_from_slice(import.exports());
    }

    resolve_type_references(&mut registry, &visible, policy)?;
    constants::resolve_constants(&mut registry, &visible, policy, imports)?;

    log::debug!("[RESOLVE] pass 2 of '{}' complete", name);

    Ok(ResolvedModule {
        name,
        registry,
        exports: local_entries,
    })
}

fn resolve_type_references(
    registry: &mut Registry,
    scope: &[ScopeEntry],
    policy: &dyn ScopePolicy,
) -> Result<(), ResolveError> {
    for (_, decl) in registry.types_mut() {
        let location = decl.source().cloned();
        match decl {
            UserDefinedType::Enum(_) => {}
            UserDefinedType::Struct(s) => {
                for field in &mut s.fields {
                    let loc = field
                        .decl_data
                        .as_ref()
                        .and_then(|d| d.source.clone())
                        .or_else(|| location.clone());
                    visit_type(&mut field.field_type, scope, policy, loc.as_ref())?;
                }
            }
            UserDefinedType::Union(u) => {
                for field in &mut u.fields {
                    visit_type(&mut field.field_type, scope, policy, location.as_ref())?;
                }
            }
            UserDefinedType::Interface(i) => {
                for method in i.methods.values_mut() {
                    for field in &mut method.parameters.fields {
                        visit_type(&mut field.field_type, scope, policy, location.as_ref())?;
                    }
                    if let Some(response) = &mut method.response {
                        for field in &mut response.fields {
                            visit_type(&mut field.field_type, scope, policy, location.as_ref())?;
                        }
                    }
                }
            }
        }
    }

    for (_, constant) in registry.constants_mut() {
        let location = constant.decl_data.as_ref().and_then(|d| d.source.clone());
        visit_type(
            &mut constant.const_type,
            scope,
            policy,
            location.as_ref(),
        )?;
    }

    Ok(())
}

fn visit_type(
    ty: &mut Type,
    scope: &[ScopeEntry],
    policy: &dyn ScopePolicy,
    location: Option<&SourceLocation>,
) -> Result<(), ResolveError> {
    match ty {
        Type::Scalar(_) | Type::Str { .. } | Type::Handle { .. } => Ok(()),
        Type::Array { element, .. } => visit_type(element, scope, policy, location),
        Type::Map { key, value, .. } => {
            visit_type(key, scope, policy, location)?;
            visit_type(value, scope, policy, location)?;
            if !key.is_valid_map_key() {
                return Err(ResolveError::TypeMismatch {
                    message: format!(
                        "map key must be a scalar or string, found {}",
                        key.kind_name()
                    ),
                    location: location.cloned(),
                });
            }
            Ok(())
        }
        Type::Reference(reference) => {
            if reference.is_resolved() {
                return Ok(());
            }
            let identifier = reference.identifier.clone().ok_or_else(|| {
                ResolveError::UnresolvedReference {
                    identifier: "<reference without identifier>".to_string(),
                    location: location.cloned(),
                }
            })?;

            let entry = lookup_entry(&identifier, scope, policy, location)?;
            match &entry.target {
                ScopeTarget::Type { key, kind } => {
                    if reference.is_interface_request && *kind != DeclKind::Interface {
                        return Err(ResolveError::TypeMismatch {
                            message: format!(
                                "interface request '{}' resolved to {} {}",
                                identifier, kind, entry.qualified_name
                            ),
                            location: location.cloned(),
                        });
                    }
                    reference.type_key = Some(key.clone());
                    Ok(())
                }
                ScopeTarget::Constant { .. } | ScopeTarget::EnumValue { .. } => {
                    Err(ResolveError::TypeMismatch {
                        message: format!(
                            "'{}' names a value, not a type",
                            entry.qualified_name
                        ),
                        location: location.cloned(),
                    })
                }
            }
        }
    }
}

pub(crate) fn lookup_entry<'a>(
    identifier: &str,
    scope: &'a [ScopeEntry],
    policy: &dyn ScopePolicy,
    location: Option<&SourceLocation>,
) -> Result<&'a ScopeEntry, ResolveError> {
    match policy.lookup(identifier, scope) {
        LookupOutcome::Found(entry) => Ok(entry),
        LookupOutcome::NotFound => Err(ResolveError::UnresolvedReference {
            identifier: identifier.to_string(),
            location: location.cloned(),
        }),
        LookupOutcome::Ambiguous(candidates) => Err(ResolveError::AmbiguousReference {
            identifier: identifier.to_string(),
            candidates,
            location: location.cloned(),
        }),
    }
}

/// Key of a declaration's qualified name for error reporting, falling back
/// to the raw key when metadata is absent.
pub(crate) fn display_name(
    decl_data: Option<&DeclarationData>,
    key: &TypeKey,
) -> String {
    decl_data
        .and_then(|d| d.full_identifier.clone())
        .unwrap_or_else(|| key.to_string())
}
