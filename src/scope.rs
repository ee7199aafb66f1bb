//! Lexical scope tracking for the transformer.
//!
//! Scopes are arena-indexed nodes with parent links as indices, so the
//! scope tree carries no owning cycles. Each scope records the
//! identifiers declared in it together with their declaration kind, and
//! the arena keeps a monotonic source-location table whose indices are
//! baked into the instrumented output for introspection.

use indexmap::IndexMap;
use serde::Serialize;

use crate::ast::{DeclKind, Span};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct ScopeId(pub u32);

/// Index into the arena's location table.
pub type LocId = u32;

/// How an identifier entered a scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BindingKind {
    Let,
    Var,
    Const,
    Param,
    /// A function's own name inside its body.
    SelfRef,
}

impl From<DeclKind> for BindingKind {
    fn from(kind: DeclKind) -> Self {
        match kind {
            DeclKind::Let => BindingKind::Let,
            DeclKind::Var => BindingKind::Var,
            DeclKind::Const => BindingKind::Const,
        }
    }
}

#[derive(Debug)]
struct Scope {
    parent: Option<ScopeId>,
    decls: IndexMap<String, BindingKind>,
    /// `var` declarations hoist to the nearest function scope.
    is_function: bool,
}

/// Arena of scopes for one compiler pass.
#[derive(Debug, Default)]
pub struct ScopeArena {
    scopes: Vec<Scope>,
    locations: Vec<Span>,
}

impl ScopeArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a scope. The root (program) scope is a function scope.
    pub fn push(&mut self, parent: Option<ScopeId>, is_function: bool) -> ScopeId {
        let id = ScopeId(self.scopes.len() as u32);
        self.scopes.push(Scope {
            parent,
            decls: IndexMap::new(),
            is_function,
        });
        id
    }

    /// Declare an identifier. `var` climbs to the nearest function scope
    /// before landing.
    pub fn declare(&mut self, scope: ScopeId, name: &str, kind: BindingKind) {
        let target = if kind == BindingKind::Var {
            self.function_scope(scope)
        } else {
            scope
        };
        self.scopes[target.0 as usize]
            .decls
            .insert(name.to_string(), kind);
    }

    /// Resolve an identifier to the scope that declares it.
    pub fn lookup(&self, scope: ScopeId, name: &str) -> Option<(ScopeId, BindingKind)> {
        let mut current = Some(scope);
        while let Some(id) = current {
            let entry = &self.scopes[id.0 as usize];
            if let Some(kind) = entry.decls.get(name) {
                return Some((id, *kind));
            }
            current = entry.parent;
        }
        None
    }

    fn function_scope(&self, scope: ScopeId) -> ScopeId {
        let mut current = scope;
        loop {
            let entry = &self.scopes[current.0 as usize];
            if entry.is_function {
                return current;
            }
            match entry.parent {
                Some(parent) => current = parent,
                None => return current,
            }
        }
    }

    /// Record a source location; the returned index is referenced from
    /// instrumented output and the emitted graph.
    pub fn add_location(&mut self, span: Span) -> LocId {
        let id = self.locations.len() as LocId;
        self.locations.push(span);
        id
    }

    pub fn location(&self, id: LocId) -> Option<Span> {
        self.locations.get(id as usize).copied()
    }

    pub fn into_locations(self) -> Vec<Span> {
        self.locations
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_walks_parents() {
        let mut arena = ScopeArena::new();
        let root = arena.push(None, true);
        let inner = arena.push(Some(root), false);
        arena.declare(root, "x", BindingKind::Let);
        assert_eq!(arena.lookup(inner, "x"), Some((root, BindingKind::Let)));
        assert_eq!(arena.lookup(inner, "y"), None);
    }

    #[test]
    fn shadowing_resolves_to_nearest() {
        let mut arena = ScopeArena::new();
        let root = arena.push(None, true);
        let inner = arena.push(Some(root), false);
        arena.declare(root, "x", BindingKind::Const);
        arena.declare(inner, "x", BindingKind::Let);
        assert_eq!(arena.lookup(inner, "x"), Some((inner, BindingKind::Let)));
        assert_eq!(arena.lookup(root, "x"), Some((root, BindingKind::Const)));
    }

    #[test]
    fn var_hoists_to_function_scope() {
        let mut arena = ScopeArena::new();
        let root = arena.push(None, true);
        let func = arena.push(Some(root), true);
        let block = arena.push(Some(func), false);
        arena.declare(block, "v", BindingKind::Var);
        assert_eq!(arena.lookup(func, "v"), Some((func, BindingKind::Var)));
        assert_eq!(arena.lookup(root, "v"), None);
    }

    #[test]
    fn location_table_is_monotonic() {
        let mut arena = ScopeArena::new();
        let a = arena.add_location(Span::new(0, 4));
        let b = arena.add_location(Span::new(5, 9));
        assert_eq!((a, b), (0, 1));
        assert_eq!(arena.location(b), Some(Span::new(5, 9)));
    }
}
