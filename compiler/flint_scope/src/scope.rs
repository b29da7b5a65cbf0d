//! The scope tree.

use std::fmt;

use flint_ir::{NodeRef, TokenPos};

use crate::VarId;

/// Index of a scope in its [`ScopeTree`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct ScopeId(u32);

impl ScopeId {
    #[inline]
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    #[inline]
    pub const fn raw(self) -> u32 {
        self.0
    }

    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for ScopeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s{}", self.0)
    }
}

/// The construct that opened a scope.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ScopeKind {
    Function,
    Block,
    For,
    ForIn,
    Catch,
    Let,
    Switch,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Scope {
    pub kind: ScopeKind,
    pub parent: Option<ScopeId>,
    pub children: Vec<ScopeId>,
    /// Offset of the opening construct.
    pub node: NodeRef,
    /// Nesting depth of functions, 0 for the function being compiled.
    pub function_level: u32,
    pub loop_level: u32,
    pub begin: TokenPos,
    pub end: TokenPos,
    /// Declared here, in declaration order.
    pub variables: Vec<VarId>,
    /// Lies between a captured variable's declaration and a use of it in a nested
    /// function.
    pub requires_context: bool,
    /// For function scopes of nested functions: variables of enclosing functions
    /// reached through the context chain.
    pub aliases: Vec<VarId>,
    /// Level of the context this scope allocates, if it allocates one.
    pub context_level: Option<u32>,
    pub context_size: u32,
}

/// Arena of scopes; the first scope is the compiled function's root.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ScopeTree {
    scopes: Vec<Scope>,
}

impl ScopeTree {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(
        &mut self,
        kind: ScopeKind,
        parent: Option<ScopeId>,
        node: NodeRef,
        function_level: u32,
        loop_level: u32,
        begin: TokenPos,
    ) -> ScopeId {
        let id = ScopeId::new(flint_ir::node::to_u32(self.scopes.len(), "scopes"));
        self.scopes.push(Scope {
            kind,
            parent,
            children: Vec::new(),
            node,
            function_level,
            loop_level,
            begin,
            end: begin,
            variables: Vec::new(),
            requires_context: false,
            aliases: Vec::new(),
            context_level: None,
            context_size: 0,
        });
        if let Some(parent) = parent {
            self.scopes[parent.index()].children.push(id);
        }
        id
    }

    pub fn root(&self) -> ScopeId {
        ScopeId::new(0)
    }

    pub fn get(&self, id: ScopeId) -> &Scope {
        &self.scopes[id.index()]
    }

    pub(crate) fn get_mut(&mut self, id: ScopeId) -> &mut Scope {
        &mut self.scopes[id.index()]
    }

    pub fn len(&self) -> usize {
        self.scopes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scopes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ScopeId, &Scope)> {
        self.scopes
            .iter()
            .enumerate()
            .map(|(i, s)| (ScopeId::new(flint_ir::node::to_u32(i, "scopes")), s))
    }

    /// `id` and its enclosing scopes, innermost first.
    pub fn ancestors(&self, id: ScopeId) -> impl Iterator<Item = ScopeId> + '_ {
        std::iter::successors(Some(id), |s| self.get(*s).parent)
    }

    /// Level of the innermost context visible in `id`, falling back to
    /// `outer_level` when no scope of this function allocates one.
    pub fn context_level_at(&self, id: ScopeId, outer_level: u32) -> u32 {
        self.ancestors(id)
            .find_map(|s| self.get(s).context_level)
            .unwrap_or(outer_level)
    }

    /// Contexts allocated by this function, outermost first.
    pub fn allocating(&self) -> impl Iterator<Item = (ScopeId, &Scope)> {
        self.iter().filter(|(_, s)| s.context_level.is_some())
    }
}

/// Nesting counters threaded through the scope walk.
///
/// Entering a nested function resets every counter but `functions`: synthetic
/// variables of a closure belong to the closure's own compilation.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct DepthState {
    pub loops: u32,
    pub functions: u32,
    pub tries: u32,
    pub catches: u32,
    pub finallies: u32,
    pub for_ins: u32,
}

impl DepthState {
    pub(crate) fn nested_function(self) -> Self {
        Self {
            functions: self.functions + 1,
            ..Self::default()
        }
    }
}
