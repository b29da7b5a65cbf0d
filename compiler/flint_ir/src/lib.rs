//! Binary IR for the flint compiler frontend.
//!
//! Function bodies arrive as a compact pre-order byte stream. Nothing here
//! materializes nodes during compilation: every consumer walks the bytes with
//! a [`Cursor`] and names nodes by their offset ([`NodeRef`]).
//!
//! - [`node`]: offset-typed handles
//! - [`tag`]: the closed set of node kinds
//! - [`Cursor`]: positioned reader, with `skip_*` and `decode_*` traversals
//! - [`Encoder`]: writes owned [`ast`] trees into the binary form
//! - [`SourceUnit`]: the shared, immutable unit plus its constant state

pub mod ast;
pub mod constant;
mod cursor;
mod decode;
pub mod encode;
mod error;
mod helpers;
pub mod metadata;
pub mod node;
pub mod program;
mod skip;
mod strings;
pub mod tag;
pub mod types;
pub mod unit;

pub use constant::{ConstValue, ConstantCache, ConstantId, ConstantPool};
pub use cursor::{Cursor, MAX_UINT};
pub use encode::Encoder;
pub use error::{IrError, SourceError, SourceErrorKind};
pub use helpers::{
    ArgumentsHead, FunctionHead, FunctionLayout, TypeParameterHead, VariableFlags, VariableHead,
};
pub use metadata::{DirectCall, InferredType, MetadataTables, ProcedureAttributes};
pub use node::{CanonicalRef, NodeRef, StringRef, TokenPos};
pub use program::{NameResolver, ProgramIndex, Symbol, SymbolKind};
pub use strings::StringTable;
pub use tag::{AsyncMarker, Tag};
pub use types::{DefaultTypeTranslator, ResolvedType, TypeTranslator};
pub use unit::{SourceUnit, UnitBuilder};
