use std::sync::Arc;

use rustc_hash::FxHashMap;

use flint_ir::{CanonicalRef, NodeRef};

use crate::context::{ContextScope, ContextVariable};
use crate::{
    FunctionKind, Scope, ScopeId, ScopeTree, SyntheticVariables, TypeCheckPolicy, VarDescriptor,
    VarId, Variable, VariableKind,
};

/// Everything the scope walk learned about one function.
#[derive(Clone, Debug)]
pub struct ScopeResult {
    pub member: CanonicalRef,
    pub kind: FunctionKind,
    pub function: Option<NodeRef>,
    pub tree: ScopeTree,
    /// In calling-convention order.
    pub parameters: Vec<VarId>,
    pub synthetic: SyntheticVariables,
    pub policy: TypeCheckPolicy,
    pub num_stack_locals: u32,
    /// Level of the context the function is entered with.
    pub outer_context_level: u32,
    pub(crate) variables: Vec<Variable>,
    pub(crate) locals: FxHashMap<NodeRef, VarId>,
    pub(crate) scopes: FxHashMap<NodeRef, ScopeId>,
    pub(crate) closures: FxHashMap<NodeRef, ScopeId>,
    pub(crate) outer: Option<Arc<ContextScope>>,
}

impl ScopeResult {
    pub fn variable(&self, id: VarId) -> &Variable {
        &self.variables[id.index()]
    }

    pub fn variables(&self) -> impl Iterator<Item = (VarId, &Variable)> {
        self.variables
            .iter()
            .enumerate()
            .map(|(i, v)| (VarId::new(flint_ir::node::to_u32(i, "variables")), v))
    }

    /// Variable declared at `decl`, in this function or reached through its context.
    pub fn lookup(&self, decl: NodeRef) -> Option<VarId> {
        self.locals.get(&decl).copied()
    }

    pub fn scope(&self, id: ScopeId) -> &Scope {
        self.tree.get(id)
    }

    /// Scope opened by the construct at `node`.
    pub fn scope_at(&self, node: NodeRef) -> Option<ScopeId> {
        self.scopes.get(&node).copied()
    }

    /// Whether the construct at `node` opens a scope that allocates a context.
    pub fn allocates_context(&self, node: NodeRef) -> bool {
        self.scope_at(node)
            .is_some_and(|s| self.tree.get(s).context_level.is_some())
    }

    /// Offsets of the closures this function creates directly.
    pub fn closures(&self) -> impl Iterator<Item = NodeRef> + '_ {
        self.closures
            .iter()
            .filter(|(_, s)| self.tree.get(**s).function_level == 0)
            .map(|(node, _)| *node)
    }

    pub fn outer(&self) -> Option<&Arc<ContextScope>> {
        self.outer.as_ref()
    }

    /// The context a closure created at `closure` is compiled against.
    ///
    /// `None` for offsets that are not closures of this function; closures nested
    /// deeper get theirs from the closure that creates them.
    pub fn context_scope_for(&self, closure: NodeRef) -> Option<ContextScope> {
        let declaring = *self.closures.get(&closure)?;
        if self.tree.get(declaring).function_level > 0 {
            return None;
        }
        let mut variables: Vec<ContextVariable> = self
            .variables
            .iter()
            .filter(|v| v.kind == VariableKind::Outer)
            .filter_map(ContextVariable::from_variable)
            .collect();
        for scope in self.tree.ancestors(declaring) {
            for var in &self.tree.get(scope).variables {
                let variable = self.variable(*var);
                if variable.kind != VariableKind::Outer {
                    variables.extend(ContextVariable::from_variable(variable));
                }
            }
        }
        Some(ContextScope {
            variables,
            context_level: self
                .tree
                .context_level_at(declaring, self.outer_context_level),
        })
    }

    /// Debug-info entries for every allocated variable of this function.
    pub fn var_descriptors(&self) -> Vec<VarDescriptor> {
        self.variables
            .iter()
            .filter(|v| v.kind != VariableKind::Outer && v.storage != crate::Storage::Unallocated)
            .map(|v| {
                let scope = self.tree.get(v.scope);
                VarDescriptor {
                    name: Arc::clone(&v.name),
                    storage: v.storage,
                    begin: scope.begin,
                    end: scope.end,
                }
            })
            .collect()
    }
}
