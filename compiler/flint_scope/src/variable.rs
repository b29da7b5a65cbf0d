//! Variables and their storage.

use std::fmt;
use std::sync::Arc;

use flint_ir::{ConstantId, NodeRef, ResolvedType, TokenPos};

use crate::ScopeId;

/// Index of a variable in its [`ScopeResult`](crate::ScopeResult).
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct VarId(u32);

impl VarId {
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

impl fmt::Display for VarId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum VariableKind {
    Parameter,
    Local,
    /// Introduced by the compiler; named with a leading `:`.
    Synthetic,
    /// Declared by an enclosing function and reached through its context.
    Outer,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum Storage {
    #[default]
    Unallocated,
    Parameter {
        index: u32,
    },
    Stack {
        index: u32,
    },
    Context {
        level: u32,
        index: u32,
    },
}

impl Storage {
    pub fn is_context(self) -> bool {
        matches!(self, Storage::Context { .. })
    }
}

impl fmt::Display for Storage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Storage::Unallocated => f.write_str("unallocated"),
            Storage::Parameter { index } => write!(f, "param {index}"),
            Storage::Stack { index } => write!(f, "stack {index}"),
            Storage::Context { level, index } => write!(f, "context {level}.{index}"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Variable {
    pub name: Arc<str>,
    pub kind: VariableKind,
    /// Declaration offset; `None` for synthetic variables.
    pub decl: Option<NodeRef>,
    pub pos: TokenPos,
    pub ty: ResolvedType,
    pub is_final: bool,
    /// Value of a `const` local, or the default value of a parameter.
    pub const_value: Option<ConstantId>,
    pub captured: bool,
    /// Stays on the stack across suspension points.
    pub forced_stack: bool,
    pub needs_type_check: bool,
    /// Position in the calling convention, for parameters.
    pub param_index: Option<u32>,
    pub storage: Storage,
    pub scope: ScopeId,
}

impl Variable {
    pub(crate) fn new(name: Arc<str>, kind: VariableKind, scope: ScopeId) -> Self {
        Self {
            name,
            kind,
            decl: None,
            pos: TokenPos::NO_SOURCE,
            ty: ResolvedType::Dynamic,
            is_final: false,
            const_value: None,
            captured: false,
            forced_stack: false,
            needs_type_check: false,
            param_index: None,
            storage: Storage::Unallocated,
            scope,
        }
    }

    pub fn is_synthetic(&self) -> bool {
        self.kind == VariableKind::Synthetic
    }
}

/// Debug-info entry for one variable.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VarDescriptor {
    pub name: Arc<str>,
    pub storage: Storage,
    pub begin: TokenPos,
    pub end: TokenPos,
}

impl VarDescriptor {
    /// Context level, or 0 for parameter and stack slots.
    pub fn level(&self) -> u32 {
        match self.storage {
            Storage::Context { level, .. } => level,
            _ => 0,
        }
    }

    pub fn index(&self) -> Option<u32> {
        match self.storage {
            Storage::Parameter { index }
            | Storage::Stack { index }
            | Storage::Context { index, .. } => Some(index),
            Storage::Unallocated => None,
        }
    }
}

impl fmt::Display for VarDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} [{}, {}]", self.name, self.storage, self.begin, self.end)
    }
}
