use thiserror::Error;

use flint_const::ConstError;
use flint_ir::{CanonicalRef, IrError, NodeRef};

/// Failure to build the scopes of a function.
///
/// Every variant aborts the compilation of the function.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ScopeError {
    #[error(transparent)]
    Ir(#[from] IrError),
    /// A constant needed before the function runs failed to evaluate.
    #[error("eager constant evaluation failed: {0}")]
    Const(#[from] ConstError),
    #[error("{0:?} has no compilable body")]
    UnknownMember(CanonicalRef),
    /// A variable reference whose declaration is neither in this function nor in the
    /// context it was compiled against.
    #[error("variable declared at {0} is not visible here")]
    UnknownVariable(NodeRef),
}
