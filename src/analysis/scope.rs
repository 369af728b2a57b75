//! Name resolution scopes.
//!
//! Scopes form a tree: file scope is the root of a module, function
//! bodies and block statements push child scopes. Lookup walks from a
//! scope up to the root, returning the first match.

use crate::arena::{Arena, Handle};
use crate::diagnostics::Span;
use crate::ty::{StorageClass, Type};
use crate::FastHashMap;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScopeOwner {
    File,
    Function,
    Block,
}

#[derive(Clone, Copy, Debug)]
pub enum SymbolKind {
    Var {
        storage: StorageClass,
        ty: Handle<Type>,
        assignable: bool,
    },
    Function {
        ty: Handle<Type>,
    },
    TypeName {
        ty: Handle<Type>,
    },
}

#[derive(Clone, Debug)]
pub struct Symbol {
    pub kind: SymbolKind,
    pub span: Span,
}

pub struct Scope {
    pub owner: ScopeOwner,
    pub parent: Option<Handle<Scope>>,
    symbols: FastHashMap<String, Symbol>,
}

/// Owns every scope created during one compilation.
pub struct ScopeTree {
    arena: Arena<Scope>,
}

impl ScopeTree {
    pub fn new() -> Self {
        ScopeTree {
            arena: Arena::new(),
        }
    }

    pub fn push(&mut self, owner: ScopeOwner, parent: Option<Handle<Scope>>) -> Handle<Scope> {
        self.arena.append(Scope {
            owner,
            parent,
            symbols: FastHashMap::default(),
        })
    }

    /// Defines `name` in `scope`. Returns the previous symbol's span if
    /// `name` was already declared directly in this scope (not a parent).
    pub fn define(&mut self, scope: Handle<Scope>, name: String, symbol: Symbol) -> Option<Span> {
        let node = &mut self.arena[scope];
        if let Some(existing) = node.symbols.get(&name) {
            return Some(existing.span);
        }
        node.symbols.insert(name, symbol);
        None
    }

    /// Replaces `name`'s symbol in `scope` unconditionally. Used by pass 2
    /// to install the fully resolved symbol over pass 1's placeholder.
    pub fn define_overwrite(&mut self, scope: Handle<Scope>, name: String, symbol: Symbol) {
        self.arena[scope].symbols.insert(name, symbol);
    }

    pub fn lookup(&self, scope: Handle<Scope>, name: &str) -> Option<&Symbol> {
        let mut current = Some(scope);
        while let Some(handle) = current {
            let node = &self.arena[handle];
            if let Some(sym) = node.symbols.get(name) {
                return Some(sym);
            }
            current = node.parent;
        }
        None
    }
}

impl Default for ScopeTree {
    fn default() -> Self {
        Self::new()
    }
}
