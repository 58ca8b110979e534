// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Identifier-to-declaration lookup: the pluggable scope policy.
//!
//!
//! Qualification precedence among short, partially-qualified, and
//! fully-qualified names is deliberately isolated behind [`ScopePolicy`] so
//! the rule can be corrected without touching the resolver proper.

use crate::model::DeclKind;
use crate::registry::TypeKey;

// ============================================================================
// Scope entries
// ============================================================================

/// What a scope entry points at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScopeTarget {
    /// A user-defined type declaration.
    Type { key: TypeKey, kind: DeclKind },
    /// A declared constant.
    Constant { key: TypeKey },
    /// A single value of an enum declaration.
    EnumValue { enum_key: TypeKey, index: u32 },
}

/// One name visible in a module's lexical scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopeEntry {
    /// Fully-qualified dotted name, e.g. `"ui.gfx.Rect"`.
    pub qualified_name: String,
    pub target: ScopeTarget,
}

/// Outcome of a scope lookup. Ambiguity is surfaced, never first-wins.
#[derive(Debug)]
pub enum LookupOutcome<'a> {
    Found(&'a ScopeEntry),
    NotFound,
    /// Qualified names of every equally-ranked candidate.
    Ambiguous(Vec<String>),
}

// ============================================================================
// ScopePolicy
// ============================================================================

/// Strategy for matching a source identifier against visible declarations.
///
/// `Sync` so a single policy instance can serve concurrent module workers.
pub trait ScopePolicy: Sync {
    fn lookup<'a>(&self, identifier: &str, scope: &'a [ScopeEntry]) -> LookupOutcome<'a>;
}

/// Default policy.
///
/// 1. Exact fully-qualified match.
/// 2. Dotted-suffix match (`m.Foo` matches `a.m.Foo`; a bare `Foo` matches
///    any `...Foo`), accepted only when exactly one candidate remains.
///
/// A partially-qualified identifier and a short name use the same suffix
/// machinery; the extra qualifier segments simply narrow the candidate set.
#[derive(Debug, Default, Clone, Copy)]
pub struct QualifiedNamePolicy;

impl ScopePolicy for QualifiedNamePolicy {
    fn lookup<'a>(&self, identifier: &str, scope: &'a [ScopeEntry]) -> LookupOutcome<'a> {
        if let Some(exact) = scope.iter().find(|e| e.qualified_name == identifier) {
            return LookupOutcome::Found(exact);
        }

        let suffix = format!(".{}", identifier);
        let candidates: Vec<&ScopeEntry> = scope
            .iter()
            .filter(|e| e.qualified_name.ends_with(&suffix))
            .collect();

        match candidates.as_slice() {
            [] => LookupOutcome::NotFound,
            [single] => LookupOutcome::Found(single),
            many => LookupOutcome::Ambiguous(
                many.iter().map(|e| e.qualified_name.clone()).collect(),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(qualified_name: &str) -> ScopeEntry {
        ScopeEntry {
            qualified_name: qualified_name.to_string(),
            target: ScopeTarget::Type {
                key: TypeKey::for_declaration("struct", qualified_name),
                kind: DeclKind::Struct,
            },
        }
    }

    #[test]
    fn test_exact_match_wins() {
        let scope = vec![entry("a.m.Foo"), entry("m.Foo")];
        match QualifiedNamePolicy.lookup("m.Foo", &scope) {
            LookupOutcome::Found(e) => assert_eq!(e.qualified_name, "m.Foo"),
            other => panic!("expected exact match, got {:?}", other),
        }
    }

    #[test]
    fn test_unambiguous_short_name() {
        let scope = vec![entry("a.m.Foo"), entry("a.m.Bar")];
        match QualifiedNamePolicy.lookup("Foo", &scope) {
            LookupOutcome::Found(e) => assert_eq!(e.qualified_name, "a.m.Foo"),
            other => panic!("expected short-name match, got {:?}", other),
        }
    }

    #[test]
    fn test_partially_qualified_narrows() {
        let scope = vec![entry("a.m.Foo"), entry("b.n.Foo")];
        match QualifiedNamePolicy.lookup("n.Foo", &scope) {
            LookupOutcome::Found(e) => assert_eq!(e.qualified_name, "b.n.Foo"),
            other => panic!("expected suffix match, got {:?}", other),
        }
    }

    #[test]
    fn test_ambiguous_is_reported_not_first_wins() {
        let scope = vec![entry("a.m.Foo"), entry("b.n.Foo")];
        match QualifiedNamePolicy.lookup("Foo", &scope) {
            LookupOutcome::Ambiguous(names) => {
                assert_eq!(names.len(), 2);
                assert!(names.contains(&"a.m.Foo".to_string()));
            }
            other => panic!("expected ambiguity, got {:?}", other),
        }
    }

    #[test]
    fn test_not_found() {
        let scope = vec![entry("a.m.Foo")];
        assert!(matches!(
            QualifiedNamePolicy.lookup("Missing", &scope),
            LookupOutcome::NotFound
        ));
    }

    #[test]
    fn test_suffix_requires_segment_boundary() {
        // "Request" must not match "...FooRequest".
        let scope = vec![entry("m.FooRequest")];
        assert!(matches!(
            QualifiedNamePolicy.lookup("Request", &scope),
            LookupOutcome::NotFound
        ));
    }
}
