use thiserror::Error;

use flint_ir::{CanonicalRef, IrError, NodeRef};
use flint_scope::VarId;

use crate::NodeId;

/// Misuse of the fragment arena.
///
/// Always a bug in the flow builder, never in the input.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum FragmentError {
    #[error("cannot append to a closed fragment")]
    AppendToClosed,
    /// Block entries are only reachable through explicit edges.
    #[error("cannot fall into block entry {0}")]
    AppendBlockEntry(NodeId),
    /// Edges only lead to block entries.
    #[error("cannot jump into the middle of {0}")]
    JumpToSegment(NodeId),
    #[error("{0} is already terminated")]
    AlreadyTerminated(NodeId),
    #[error("reachable {0} has no terminator")]
    Unterminated(NodeId),
    #[error("handler {0} was never given an entry")]
    MissingHandler(u32),
}

/// Fatal failure to build the graph of a function.
///
/// Source-level problems never end up here: they are lowered into code that
/// throws at runtime.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum BuildError {
    #[error(transparent)]
    Ir(#[from] IrError),
    #[error(transparent)]
    Fragment(#[from] FragmentError),
    #[error("{0:?} has no compilable body")]
    UnknownMember(CanonicalRef),
    #[error("no variable is declared at {0}")]
    UnknownVariable(NodeRef),
    #[error("{0} has no storage in this function")]
    Unallocated(VarId),
    /// The variable's context is not among the contexts reachable from here.
    #[error("{0} lives in a context deeper than the current one")]
    ContextUnderflow(VarId),
    #[error("synthetic variable '{0}' was not created by the scope builder")]
    MissingSynthetic(String),
    #[error("break to label {0} outside its labeled statement")]
    UnknownLabel(u32),
    #[error("continue to switch case {0} outside its switch")]
    UnknownCase(u32),
    #[error("expression value stack underflow")]
    StackUnderflow,
}
