use std::sync::Arc;

use flint_ir::{ConstantId, NodeRef, ResolvedType};

use crate::{Storage, Variable};

/// Variables of enclosing functions a closure can reach through its context.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ContextScope {
    pub variables: Vec<ContextVariable>,
    /// Level of the innermost context at the closure's creation site.
    pub context_level: u32,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContextVariable {
    pub name: Arc<str>,
    pub decl: Option<NodeRef>,
    pub ty: ResolvedType,
    pub level: u32,
    pub index: u32,
    pub is_final: bool,
    pub const_value: Option<ConstantId>,
}

impl ContextVariable {
    /// `None` unless `variable` lives in a context slot.
    pub(crate) fn from_variable(variable: &Variable) -> Option<Self> {
        let Storage::Context { level, index } = variable.storage else {
            return None;
        };
        Some(Self {
            name: Arc::clone(&variable.name),
            decl: variable.decl,
            ty: variable.ty.clone(),
            level,
            index,
            is_final: variable.is_final,
            const_value: variable.const_value,
        })
    }
}

impl ContextScope {
    pub fn find_by_decl(&self, decl: NodeRef) -> Option<&ContextVariable> {
        self.variables.iter().find(|v| v.decl == Some(decl))
    }

    /// Innermost variable named `name`.
    pub fn find_by_name(&self, name: &str) -> Option<&ContextVariable> {
        self.variables
            .iter()
            .filter(|v| &*v.name == name)
            .max_by_key(|v| v.level)
    }
}
