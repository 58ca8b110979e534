// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Declaration registry: the flat keyed store all references resolve through.
//!
//!
//! The registry maps opaque, content-stable string keys to user-defined
//! types and declared constants. Recursive references are expressed by key
//! rather than ownership, so cyclic type graphs need no cyclic data
//! structures: a struct field that mentions its own struct simply carries
//! the struct's key.
//!
//! # Key stability
//!
//! Keys are derived from the declaration's kind tag and fully-qualified
//! name: MD5, truncated to 14 bytes, hex-rendered. The same declaration
//! keeps its key across incremental recompiles, which keeps generated code
//! stable. Editing a declaration's body does not move its key; only a
//! rename does.
//!
//! Registries from independently compiled units merge by key union. A key
//! that maps to two semantically different declarations is a build-time
//! invariant violation and fails the merge - never a silent overwrite.

use std::collections::BTreeMap;
use std::fmt;

use md5::{Digest, Md5};
use serde::{Deserialize, Serialize};

use crate::model::{DeclKind, DeclaredConstant, UserDefinedType};

// ============================================================================
// TypeKey
// ============================================================================

/// Opaque stable key identifying a declaration in the registry.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TypeKey(String);

/// Truncation length of the MD5 digest used for key material.
const KEY_HASH_LEN: usize = 14;

impl TypeKey {
    /// Wrap an already-produced key string (e.g. decoded from a blob).
    pub fn new(key: impl Into<String>) -> Self {
        TypeKey(key.into())
    }

    /// Derive the content-stable key for a declaration.
    ///
    /// Hashes `"<kind>:<qualified_name>"` so that a struct and an enum with
    /// the same qualified name (illegal, but representable) cannot share a
    /// key by accident.
    pub fn for_declaration(kind: &str, qualified_name: &str) -> Self {
        let mut hasher = Md5::new();
        hasher.update(kind.as_bytes());
        hasher.update(b":");
        hasher.update(qualified_name.as_bytes());
        let digest = hasher.finalize();

        let mut key = String::with_capacity(KEY_HASH_LEN * 2);
        for byte in &digest[..KEY_HASH_LEN] {
            use fmt::Write;
            let _ = write!(key, "{:02x}", byte);
        }
        TypeKey(key)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypeKey({})", self.0)
    }
}

impl From<&str> for TypeKey {
    fn from(s: &str) -> Self {
        TypeKey(s.to_string())
    }
}

// ============================================================================
// RegistryError
// ============================================================================

/// Errors produced by registration and merging.
#[derive(Debug, Clone, PartialEq)]
pub enum RegistryError {
    /// Two semantically different declarations mapped to the same key.
    KeyCollision {
        key: TypeKey,
        existing: String,
        incoming: String,
    },
}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegistryError::KeyCollision {
                key,
                existing,
                incoming,
            } => write!(
                f,
                "key collision on {}: '{}' vs '{}'",
                key, existing, incoming
            ),
        }
    }
}

impl std::error::Error for RegistryError {}

// ============================================================================
// Registry
// ============================================================================

/// Keyed store of user-defined types, declared constants, and the
/// service-name index of a compilation unit.
///
/// A single unit's registry is not guaranteed to contain the transitive
/// closure of types reachable from its services; callers union per-unit
/// registries with [`Registry::merge`] to obtain a complete type set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Registry {
    services: BTreeMap<String, TypeKey>,
    types: BTreeMap<TypeKey, UserDefinedType>,
    constants: BTreeMap<TypeKey, DeclaredConstant>,
}

impl Registry {
    pub fn new() -> Self {
        Registry::default()
    }

    /// Register a user-defined type under its qualified name.
    ///
    /// Registering the identical declaration again reuses the key. A
    /// differing declaration under the same key is fatal.
    pub fn register_type(
        &mut self,
        qualified_name: &str,
        decl: UserDefinedType,
    ) -> Result<TypeKey, RegistryError> {
        let key = TypeKey::for_declaration(decl.kind().tag(), qualified_name);
        if let Some(existing) = self.types.get(&key) {
            if *existing != decl {
                return Err(RegistryError::KeyCollision {
                    key,
                    existing: Self::describe(existing.decl_data(), existing.kind()),
                    incoming: Self::describe(decl.decl_data(), decl.kind()),
                });
            }
            log::debug!("[REGISTRY] re-registered {} -> {}", qualified_name, key);
            return Ok(key);
        }
        log::debug!(
            "[REGISTRY] {} {} -> {}",
            decl.kind(),
            qualified_name,
            key
        );
        self.types.insert(key.clone(), decl);
        Ok(key)
    }

    /// Register a declared constant under its qualified name.
    pub fn register_constant(
        &mut self,
        qualified_name: &str,
        constant: DeclaredConstant,
    ) -> Result<TypeKey, RegistryError> {
        let key = TypeKey::for_declaration("const", qualified_name);
        if let Some(existing) = self.constants.get(&key) {
            if *existing != constant {
                return Err(RegistryError::KeyCollision {
                    key,
                    existing: Self::describe_constant(qualified_name, existing),
                    incoming: Self::describe_constant(qualified_name, &constant),
                });
            }
            return Ok(key);
        }
        log::debug!("[REGISTRY] const {} -> {}", qualified_name, key);
        self.constants.insert(key.clone(), constant);
        Ok(key)
    }

    /// Record a service name pointing at a top-level interface key.
    pub fn register_service(&mut self, service_name: impl Into<String>, key: TypeKey) {
        self.services.insert(service_name.into(), key);
    }

    pub fn lookup_type(&self, key: &TypeKey) -> Option<&UserDefinedType> {
        self.types.get(key)
    }

    pub fn lookup_constant(&self, key: &TypeKey) -> Option<&DeclaredConstant> {
        self.constants.get(key)
    }

    pub fn lookup_service(&self, service_name: &str) -> Option<&TypeKey> {
        self.services.get(service_name)
    }

    /// Deterministic traversal of all types, ordered by key.
    pub fn types(&self) -> impl Iterator<Item = (&TypeKey, &UserDefinedType)> {
        self.types.iter()
    }

    pub fn constants(&self) -> impl Iterator<Item = (&TypeKey, &DeclaredConstant)> {
        self.constants.iter()
    }

    pub fn services(&self) -> impl Iterator<Item = (&String, &TypeKey)> {
        self.services.iter()
    }

    pub fn type_count(&self) -> usize {
        self.types.len()
    }

    pub fn constant_count(&self) -> usize {
        self.constants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty() && self.constants.is_empty() && self.services.is_empty()
    }

    // Mutable access is confined to the crate: the resolver fills reference
    // keys and resolved values, the version computer fills version tables.
    pub(crate) fn types_mut(
        &mut self,
    ) -> impl Iterator<Item = (&TypeKey, &mut UserDefinedType)> {
        self.types.iter_mut()
    }

    pub(crate) fn constants_mut(
        &mut self,
    ) -> impl Iterator<Item = (&TypeKey, &mut DeclaredConstant)> {
        self.constants.iter_mut()
    }

    pub(crate) fn lookup_type_mut(&mut self, key: &TypeKey) -> Option<&mut UserDefinedType> {
        self.types.get_mut(key)
    }

    /// Union another unit's registry into this one.
    ///
    /// Identical entries under the same key are deduplicated; differing
    /// entries under the same key fail the merge.
    pub fn merge(&mut self, other: Registry) -> Result<(), RegistryError> {
        for (key, decl) in other.types {
            match self.types.get(&key) {
                None => {
                    self.types.insert(key, decl);
                }
                Some(existing) if *existing == decl => {}
                Some(existing) => {
                    return Err(RegistryError::KeyCollision {
                        key,
                        existing: Self::describe(existing.decl_data(), existing.kind()),
                        incoming: Self::describe(decl.decl_data(), decl.kind()),
                    });
                }
            }
        }
        for (key, constant) in other.constants {
            match self.constants.get(&key) {
                None => {
                    self.constants.insert(key, constant);
                }
                Some(existing) if *existing == constant => {}
                Some(existing) => {
                    let name = constant
                        .decl_data
                        .as_ref()
                        .and_then(|d| d.full_identifier.clone())
                        .unwrap_or_else(|| key.to_string());
                    return Err(RegistryError::KeyCollision {
                        existing: Self::describe_constant(&name, existing),
                        incoming: Self::describe_constant(&name, &constant),
                        key,
                    });
                }
            }
        }
        for (name, key) in other.services {
            match self.services.get(&name) {
                None => {
                    self.services.insert(name, key);
                }
                Some(existing) if *existing == key => {}
                Some(existing) => {
                    return Err(RegistryError::KeyCollision {
                        key,
                        existing: format!("service '{}' -> {}", name, existing),
                        incoming: format!("service '{}'", name),
                    });
                }
            }
        }
        Ok(())
    }

    fn describe_constant(qualified_name: &str, constant: &DeclaredConstant) -> String {
        format!(
            "const {}: {} = {}",
            qualified_name,
            constant.const_type.kind_name(),
            constant.value.kind_name()
        )
    }

    fn describe(decl_data: Option<&crate::model::DeclarationData>, kind: DeclKind) -> String {
        match decl_data.and_then(|d| d.full_identifier.as_deref()) {
            Some(name) => format!("{} {}", kind, name),
            None => format!("unnamed {}", kind),
        }
    }
}
