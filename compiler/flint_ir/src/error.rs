//! Error types shared by every traversal of the binary IR.
//!
//! [`IrError`] is an internal-consistency failure: the encoder and a reader
//! disagree about the grammar. It aborts the current compilation.
//! [`SourceError`] is a user-level problem tied to a source position; callers
//! decide whether to defer it to runtime or fail.

use thiserror::Error;

use crate::{NodeRef, StringRef, Tag, TokenPos};

/// Decoder/builder divergence. Never recoverable locally.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum IrError {
    #[error("unexpected end of data at offset {offset} (wanted {wanted} bytes)")]
    UnexpectedEof { offset: usize, wanted: usize },

    #[error("unknown tag byte 0x{byte:02X} at offset {offset}")]
    UnknownTag { offset: usize, byte: u8 },

    #[error("unexpected tag {tag} at offset {offset}, expected {expected}")]
    UnexpectedTag {
        offset: usize,
        tag: Tag,
        expected: &'static str,
    },

    #[error("invalid {what} byte {value} at offset {offset}")]
    InvalidByte {
        offset: usize,
        what: &'static str,
        value: u8,
    },

    #[error("string reference {0:?} is out of range")]
    StringOutOfRange(StringRef),

    #[error("no variable declared at {0}")]
    UnknownVariable(NodeRef),

    #[error("offset {offset} is outside the data section ({len} bytes)")]
    OffsetOutOfRange { offset: usize, len: usize },

    #[error("encoder: {0}")]
    Encode(String),

    #[error("container: {0}")]
    Container(String),
}

impl IrError {
    /// A tag that is not valid at `offset`.
    pub fn unexpected(offset: usize, tag: Tag, expected: &'static str) -> Self {
        IrError::UnexpectedTag {
            offset,
            tag,
            expected,
        }
    }

    /// Offset associated with the error, where one exists.
    pub fn offset(&self) -> Option<usize> {
        match self {
            IrError::UnexpectedEof { offset, .. }
            | IrError::UnknownTag { offset, .. }
            | IrError::UnexpectedTag { offset, .. }
            | IrError::InvalidByte { offset, .. }
            | IrError::OffsetOutOfRange { offset, .. } => Some(*offset),
            IrError::UnknownVariable(node) => Some(node.offset()),
            IrError::StringOutOfRange(_) | IrError::Encode(_) | IrError::Container(_) => None,
        }
    }
}

/// Kind of a source-level error.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Error)]
pub enum SourceErrorKind {
    #[error("not a constant expression")]
    NotConstant,

    #[error("cyclic initialization of static field '{field}'")]
    CyclicInitialization { field: String },

    #[error("type '{actual}' is not a subtype of '{expected}' in constant cast")]
    FailedCast { actual: String, expected: String },

    #[error("malformed type: {0}")]
    MalformedType(String),

    #[error("{0}")]
    InvalidExpression(String),

    #[error("constant operation '{operator}' is not supported on {receiver}")]
    UnsupportedOperation { operator: String, receiver: String },

    #[error("integer overflow in constant expression")]
    IntegerOverflow,

    #[error("integer division by zero in constant expression")]
    DivisionByZero,

    #[error("integer literal '{0}' does not fit in 64 bits")]
    IntegerLiteralTooLarge(String),

    #[error("switch case falls through to the next case")]
    SwitchFallThrough,

    #[error("unresolved reference '{0}'")]
    Unresolved(String),

    #[error("constant evaluation nested too deeply")]
    TooDeep,
}

/// A user-level error with its source position.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Error)]
#[error("{kind} (at {pos})")]
pub struct SourceError {
    pub pos: TokenPos,
    pub kind: SourceErrorKind,
}

impl SourceError {
    pub fn new(pos: TokenPos, kind: SourceErrorKind) -> Self {
        Self { pos, kind }
    }
}
