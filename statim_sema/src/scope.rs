//! The scope tree built during `syma`, kept separate from the AST per
//! Design Notes §9: a `Decl`/`Block` only carries a `ScopeId` handle, the
//! tree itself lives here.

use cranelift_entity::EntityRef;
use hashbrown::HashMap;
use statim_ast::{DeclRef, NodeId, ScopeId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Binding {
    Variable(NodeId),
    Parameter(NodeId),
    Function(NodeId),
}

impl From<Binding> for DeclRef {
    fn from(b: Binding) -> Self {
        match b {
            Binding::Variable(id) => DeclRef::Variable(id),
            Binding::Parameter(id) => DeclRef::Parameter(id),
            Binding::Function(id) => DeclRef::Function(id),
        }
    }
}

#[derive(Debug, Default)]
struct ScopeData {
    parent: Option<ScopeId>,
    bindings: HashMap<String, Binding>,
}

/// A forest of lexical scopes, indexed by `ScopeId`. Functions and blocks
/// each open one; lookup walks up through `parent` until it runs off the
/// root, matching ordinary lexical shadowing.
#[derive(Debug, Default)]
pub struct ScopeTree {
    scopes: Vec<ScopeData>,
}

impl ScopeTree {
    pub fn new() -> Self {
        Self { scopes: Vec::new() }
    }

    pub fn push_scope(&mut self, parent: Option<ScopeId>) -> ScopeId {
        let id = ScopeId::new(self.scopes.len());
        self.scopes.push(ScopeData { parent, bindings: HashMap::new() });
        id
    }

    /// Binds `name` in `scope`. Returns the previously-bound `Binding` if
    /// `name` already shadows something *in this same scope* (a true
    /// redeclaration, distinct from shadowing an outer scope's binding).
    pub fn bind(&mut self, scope: ScopeId, name: impl Into<String>, binding: Binding) -> Option<Binding> {
        self.scopes[scope.index()].bindings.insert(name.into(), binding)
    }

    pub fn resolve(&self, scope: ScopeId, name: &str) -> Option<Binding> {
        let mut current = Some(scope);
        while let Some(id) = current {
            let data = &self.scopes[id.index()];
            if let Some(&binding) = data.bindings.get(name) {
                return Some(binding);
            }
            current = data.parent;
        }
        None
    }

    pub fn parent_of(&self, scope: ScopeId) -> Option<ScopeId> {
        self.scopes[scope.index()].parent
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inner_scope_shadows_outer_binding() {
        let mut tree = ScopeTree::new();
        let outer = tree.push_scope(None);
        tree.bind(outer, "x", Binding::Variable(1));
        let inner = tree.push_scope(Some(outer));
        tree.bind(inner, "x", Binding::Variable(2));

        assert_eq!(tree.resolve(inner, "x"), Some(Binding::Variable(2)));
        assert_eq!(tree.resolve(outer, "x"), Some(Binding::Variable(1)));
    }

    #[test]
    fn unresolved_name_returns_none() {
        let mut tree = ScopeTree::new();
        let scope = tree.push_scope(None);
        assert_eq!(tree.resolve(scope, "missing"), None);
    }
}
