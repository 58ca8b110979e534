// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Semantic core of the MIDL interface-definition toolchain.
//!
//! The crate turns raw module declarations into a resolved, versioned,
//! serializable type graph:
//!
//! - [`model`] - the closed type and value variants plus declaration shapes.
//! - [`registry`] - the flat keyed store with content-stable [`TypeKey`]s.
//! - [`resolve`] - two-pass reference resolution and constant folding.
//! - [`version`] - struct layout and version-table computation.
//! - [`rtti`] - the runtime type info blob embedded in generated code.
//! - [`pipeline`] - dependency-wave concurrent resolution of module sets.
//!
//! Parsing, code generation, and transport binding are external
//! collaborators; this crate neither reads source text nor opens channels.

pub mod model;
pub mod pipeline;
pub mod registry;
pub mod resolve;
pub mod rtti;
pub mod version;

pub use model::{Type, UserDefinedType, Value};
pub use pipeline::{resolve_modules, PipelineError};
pub use registry::{Registry, RegistryError, TypeKey};
pub use resolve::{
    collect, resolve, ModuleDecls, QualifiedNamePolicy, ResolveError, ResolvedModule,
    ScopePolicy,
};
pub use rtti::{RuntimeTypeInfo, WireError};
pub use version::{validate_version_table, VersioningError};
