use std::collections::HashMap;

use thiserror::Error;

use crate::lang::symbol::Symbol;

/// Failures surfaced by scope operations. These never reach the end user
/// directly; callers translate them into positioned diagnostics (analyzer)
/// or runtime errors (VM).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScopeError {
    #[error("name '{0}' is not defined in any enclosing scope")]
    NotFound(String),

    #[error("name '{0}' is already defined in this scope")]
    Exists(String),

    #[error("cannot pop the root scope")]
    RootPop,
}

/// Index of a scope node inside its [`ScopeTree`] arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScopeId(usize);

#[derive(Debug)]
struct ScopeNode {
    level: usize,
    parent: Option<ScopeId>,
    symbols: HashMap<String, Symbol>,
    children: Vec<ScopeId>,
}

/// Nested lexical scopes, stored as an arena of nodes addressed by index.
///
/// `push`/`pop` move the current-scope cursor; nodes are never freed while
/// the tree is alive, so a popped scope remains inspectable and a repeated
/// loop body gets a fresh node on every entry.
#[derive(Debug)]
pub struct ScopeTree {
    nodes: Vec<ScopeNode>,
    current: ScopeId,
}

impl ScopeTree {
    pub fn new() -> Self {
        ScopeTree {
            nodes: vec![ScopeNode {
                level: 0,
                parent: None,
                symbols: HashMap::new(),
                children: Vec::new(),
            }],
            current: ScopeId(0),
        }
    }

    pub fn root(&self) -> ScopeId {
        ScopeId(0)
    }

    pub fn current(&self) -> ScopeId {
        self.current
    }

    /// Re-point the cursor at an existing node. Used by the VM to re-root
    /// into a callee scope and to restore the caller's scope on return.
    pub fn set_current(&mut self, id: ScopeId) {
        self.current = id;
    }

    /// Nesting level of the current scope (root = 0).
    pub fn level(&self) -> usize {
        self.nodes[self.current.0].level
    }

    /// Enter a new child scope of the current one.
    pub fn push(&mut self) -> ScopeId {
        let id = ScopeId(self.nodes.len());
        let level = self.nodes[self.current.0].level + 1;
        self.nodes.push(ScopeNode {
            level,
            parent: Some(self.current),
            symbols: HashMap::new(),
            children: Vec::new(),
        });
        self.nodes[self.current.0].children.push(id);
        self.current = id;
        id
    }

    /// Return to the enclosing scope. Popping the root is a caller-contract
    /// violation reported as [`ScopeError::RootPop`].
    pub fn pop(&mut self) -> Result<(), ScopeError> {
        match self.nodes[self.current.0].parent {
            Some(parent) => {
                self.current = parent;
                Ok(())
            }
            None => Err(ScopeError::RootPop),
        }
    }

    /// Insert a symbol into the current scope. Fails only when the current
    /// scope (not an ancestor) already binds the name.
    pub fn define(&mut self, symbol: Symbol) -> Result<(), ScopeError> {
        let scope = &mut self.nodes[self.current.0];
        if scope.symbols.contains_key(&symbol.name) {
            return Err(ScopeError::Exists(symbol.name));
        }
        scope.symbols.insert(symbol.name.clone(), symbol);
        Ok(())
    }

    /// Search the current scope, then each enclosing scope outward.
    pub fn resolve(&self, name: &str) -> Result<&Symbol, ScopeError> {
        let id = self.resolve_scope(name)?;
        self.nodes[id.0]
            .symbols
            .get(name)
            .ok_or_else(|| ScopeError::NotFound(name.to_string()))
    }

    pub fn resolve_mut(&mut self, name: &str) -> Result<&mut Symbol, ScopeError> {
        let id = self.resolve_scope(name)?;
        self.nodes[id.0]
            .symbols
            .get_mut(name)
            .ok_or_else(|| ScopeError::NotFound(name.to_string()))
    }

    /// Same search as [`resolve`](Self::resolve), but returns the scope that
    /// owns the binding. Callers compare it against `current()` to tell a
    /// same-level redefinition from outer-scope shadowing.
    pub fn resolve_scope(&self, name: &str) -> Result<ScopeId, ScopeError> {
        let mut cursor = Some(self.current);
        while let Some(id) = cursor {
            if self.nodes[id.0].symbols.contains_key(name) {
                return Ok(id);
            }
            cursor = self.nodes[id.0].parent;
        }
        Err(ScopeError::NotFound(name.to_string()))
    }
}

impl Default for ScopeTree {
    fn default() -> Self {
        ScopeTree::new()
    }
}
