// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Concurrent module resolution.
//!
//!
//! Modules form a DAG through their import lists. Pass 1 runs serially (it
//! is cheap and independent per module); pass 2 and versioning run in
//! dependency waves: a module enters a wave only when every import has
//! already been resolved and published. Within a wave each module gets its
//! own scoped worker thread, and completion flows back over a channel.
//!
//! Publication is moving the finished module into an `Arc`: a one-way
//! transition after which the segment is immutable and freely shared with
//! dependent workers. Import cycles and unknown imports are rejected
//! before any resolution work starts.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use crossbeam::channel;

use crate::resolve::{
    collect, resolve, CollectedModule, ModuleDecls, ResolveError, ResolvedModule, ScopePolicy,
};
use crate::version::{self, VersioningError};

// ============================================================================
// PipelineError
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum PipelineError {
    /// Two input modules share a name.
    DuplicateModule(String),
    /// A module imports a name outside the input set.
    UnknownImport { module: String, import: String },
    /// The import graph is not a DAG.
    ImportCycle { participants: Vec<String> },
    /// Pass 2 failed for a module.
    Resolve {
        module: String,
        error: ResolveError,
    },
    /// Layout or version computation failed for a module.
    Versioning {
        module: String,
        error: VersioningError,
    },
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineError::DuplicateModule(name) => {
                write!(f, "duplicate module '{}'", name)
            }
            PipelineError::UnknownImport { module, import } => {
                write!(f, "module '{}' imports unknown module '{}'", module, import)
            }
            PipelineError::ImportCycle { participants } => {
                write!(f, "import cycle among: {}", participants.join(", "))
            }
            PipelineError::Resolve { module, error } => {
                write!(f, "resolving '{}': {}", module, error)
            }
            PipelineError::Versioning { module, error } => {
                write!(f, "versioning '{}': {}", module, error)
            }
        }
    }
}

impl std::error::Error for PipelineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PipelineError::Resolve { error, .. } => Some(error),
            PipelineError::Versioning { error, .. } => Some(error),
            _ => None,
        }
    }
}

// ============================================================================
// resolve_modules
// ============================================================================

/// Resolve and version a set of modules, honoring import order.
///
/// Returns every module fully resolved, keyed by name and published behind
/// an `Arc`. All-or-nothing: any failing module fails the whole set.
pub fn resolve_modules(
    modules: Vec<ModuleDecls>,
    policy: &dyn ScopePolicy,
) -> Result<BTreeMap<String, Arc<ResolvedModule>>, PipelineError> {
    // Pass 1, serially.
    let mut pending: BTreeMap<String, CollectedModule> = BTreeMap::new();
    for module in modules {
        let name = module.name.clone();
        let collected = collect(module).map_err(|error| PipelineError::Resolve {
            module: name.clone(),
            error,
        })?;
        if pending.insert(name.clone(), collected).is_some() {
            return Err(PipelineError::DuplicateModule(name));
        }
    }

    check_import_graph(&pending)?;

    let mut published: BTreeMap<String, Arc<ResolvedModule>> = BTreeMap::new();
    let mut wave = 0usize;
    while !pending.is_empty() {
        let ready: Vec<String> = pending
            .iter()
            .filter(|(_, collected)| {
                collected
                    .imports()
                    .iter()
                    .all(|import| published.contains_key(import))
            })
            .map(|(name, _)| name.clone())
            .collect();
        // The DAG check guarantees progress.
        debug_assert!(!ready.is_empty());

        log::debug!("[PIPELINE] wave {}: {} module(s)", wave, ready.len());
        wave += 1;

        let (tx, rx) = channel::unbounded();
        let mut outcomes: Vec<(String, Result<ResolvedModule, PipelineError>)> =
            std::thread::scope(|s| {
                for name in &ready {
                    let Some(collected) = pending.remove(name) else {
                        continue;
                    };
                    let imports: Vec<Arc<ResolvedModule>> = collected
                        .imports()
                        .iter()
                        .map(|import| published[import].clone())
                        .collect();
                    let tx = tx.clone();
                    let name = name.clone();
                    s.spawn(move || {
                        let outcome = resolve_one(collected, &imports, policy, &name);
                        let _ = tx.send((name, outcome));
                    });
                }
                drop(tx);
                rx.iter().collect()
            });

        // Channel arrival order is nondeterministic; report deterministically.
        outcomes.sort_by(|a, b| a.0.cmp(&b.0));
        for (name, outcome) in outcomes {
            let resolved = outcome?;
            published.insert(name, Arc::new(resolved));
        }
    }

    Ok(published)
}

fn resolve_one(
    collected: CollectedModule,
    imports: &[Arc<ResolvedModule>],
    policy: &dyn ScopePolicy,
    name: &str,
) -> Result<ResolvedModule, PipelineError> {
    let import_refs: Vec<&ResolvedModule> = imports.iter().map(Arc::as_ref).collect();
    let mut resolved =
        resolve(collected, &import_refs, policy).map_err(|error| PipelineError::Resolve {
            module: name.to_string(),
            error,
        })?;
    version::compute(&mut resolved, &import_refs).map_err(|error| {
        PipelineError::Versioning {
            module: name.to_string(),
            error,
        }
    })?;
    Ok(resolved)
}

/// Reject unknown imports and cycles before starting any worker.
fn check_import_graph(
    pending: &BTreeMap<String, CollectedModule>,
) -> Result<(), PipelineError> {
    for (name, collected) in pending {
        for import in collected.imports() {
            if !pending.contains_key(import) {
                return Err(PipelineError::UnknownImport {
                    module: name.clone(),
                    import: import.clone(),
                });
            }
        }
    }

    // Peel nodes whose imports are all peeled; leftovers sit on a cycle or
    // depend on one.
    let mut remaining: BTreeMap<&str, Vec<&str>> = pending
        .iter()
        .map(|(name, collected)| {
            (
                name.as_str(),
                collected.imports().iter().map(String::as_str).collect(),
            )
        })
        .collect();
    let mut peeled: BTreeSet<&str> = BTreeSet::new();
    loop {
        let ready: Vec<&str> = remaining
            .iter()
            .filter(|(_, imports)| imports.iter().all(|i| peeled.contains(i)))
            .map(|(name, _)| *name)
            .collect();
        if ready.is_empty() {
            break;
        }
        for name in ready {
            remaining.remove(name);
            peeled.insert(name);
        }
    }

    if remaining.is_empty() {
        Ok(())
    } else {
        Err(PipelineError::ImportCycle {
            participants: remaining.keys().map(|s| s.to_string()).collect(),
        })
    }
}
