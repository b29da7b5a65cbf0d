//! Scope building for one function of a source unit.
//!
//! [`build_scopes`] walks a function's IR once and records:
//!
//! - a tree of lexical scopes, keyed by the offset of the construct that opens each
//! - every variable declaration, keyed by its declaration offset
//! - which variables nested closures capture, and the scopes that must allocate a
//!   context for them
//! - the synthetic variables the flow builder needs (iterators, exception slots,
//!   generator state)
//!
//! After the walk an allocation pass assigns each variable a parameter, stack or
//! context slot. The resulting [`ScopeResult`] is read-only input to flow building.
//!
//! Closures are compiled separately, against the [`ContextScope`] their parent
//! exports for them.

mod allocate;
mod builder;
mod context;
mod error;
mod kind;
mod result;
mod scope;
mod synthetic;
mod variable;

pub use builder::build_scopes;
pub use context::{ContextScope, ContextVariable};
pub use error::ScopeError;
pub use kind::{FunctionKind, ScopeTarget, TypeCheckPolicy};
pub use result::ScopeResult;
pub use scope::{DepthState, Scope, ScopeId, ScopeKind, ScopeTree};
pub use synthetic::{names, PerDepth, SyntheticVariables};
pub use variable::{Storage, VarDescriptor, VarId, Variable, VariableKind};

#[cfg(test)]
mod tests;
