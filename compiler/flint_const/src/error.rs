use thiserror::Error;

use flint_ir::{IrError, SourceError, SourceErrorKind, TokenPos};

/// Failure of a constant evaluation.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ConstError {
    /// The expression is not a valid constant.
    #[error(transparent)]
    Source(#[from] SourceError),
    /// The data section does not follow the grammar.
    #[error(transparent)]
    Internal(#[from] IrError),
}

impl ConstError {
    pub fn at(pos: TokenPos, kind: SourceErrorKind) -> Self {
        ConstError::Source(SourceError::new(pos, kind))
    }

    pub fn as_source(&self) -> Option<&SourceError> {
        match self {
            ConstError::Source(error) => Some(error),
            ConstError::Internal(_) => None,
        }
    }
}
