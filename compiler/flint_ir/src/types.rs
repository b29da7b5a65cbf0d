//! Resolved types and the type translator seam.
//!
//! Type nodes in the data section are translated on demand. The builders
//! never look at type bytes themselves; they hand the cursor to a
//! [`TypeTranslator`] and get back a [`ResolvedType`].

use std::fmt;
use std::sync::Arc;

use crate::cursor::Cursor;
use crate::tag::Tag;
use crate::{CanonicalRef, IrError, NodeRef};

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ResolvedType {
    Dynamic,
    Void,
    Bottom,
    Interface {
        class: CanonicalRef,
        arguments: Vec<ResolvedType>,
    },
    Function {
        type_parameter_count: u32,
        required: u32,
        positional: Vec<ResolvedType>,
        named: Vec<(Arc<str>, ResolvedType)>,
        return_type: Box<ResolvedType>,
    },
    /// Reference to a type parameter of the enclosing class or function.
    Parameter { index: u32 },
    /// A type the front end could not make sense of. Using it is a source
    /// error deferred to runtime.
    Malformed(String),
}

impl ResolvedType {
    pub fn interface(class: CanonicalRef) -> Self {
        ResolvedType::Interface {
            class,
            arguments: Vec::new(),
        }
    }

    /// Top types accept every value; checks against them are elided.
    pub fn is_top(&self) -> bool {
        matches!(self, ResolvedType::Dynamic | ResolvedType::Void)
    }

    pub fn is_malformed(&self) -> bool {
        matches!(self, ResolvedType::Malformed(_))
    }

    /// Whether the type mentions no type parameters and can be used as a
    /// constant without instantiation.
    pub fn is_instantiated(&self) -> bool {
        match self {
            ResolvedType::Dynamic
            | ResolvedType::Void
            | ResolvedType::Bottom
            | ResolvedType::Malformed(_) => true,
            ResolvedType::Parameter { .. } => false,
            ResolvedType::Interface { arguments, .. } => {
                arguments.iter().all(ResolvedType::is_instantiated)
            }
            ResolvedType::Function {
                positional,
                named,
                return_type,
                ..
            } => {
                positional.iter().all(ResolvedType::is_instantiated)
                    && named.iter().all(|(_, t)| t.is_instantiated())
                    && return_type.is_instantiated()
            }
        }
    }

    /// The class of an interface type.
    pub fn class(&self) -> Option<CanonicalRef> {
        match self {
            ResolvedType::Interface { class, .. } => Some(*class),
            _ => None,
        }
    }
}

impl fmt::Display for ResolvedType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResolvedType::Dynamic => f.write_str("dynamic"),
            ResolvedType::Void => f.write_str("void"),
            ResolvedType::Bottom => f.write_str("Never"),
            ResolvedType::Interface { class, arguments } => {
                write!(f, "{class:?}")?;
                if !arguments.is_empty() {
                    f.write_str("<")?;
                    for (i, arg) in arguments.iter().enumerate() {
                        if i > 0 {
                            f.write_str(", ")?;
                        }
                        write!(f, "{arg}")?;
                    }
                    f.write_str(">")?;
                }
                Ok(())
            }
            ResolvedType::Function {
                positional,
                return_type,
                ..
            } => {
                f.write_str("(")?;
                for (i, p) in positional.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{p}")?;
                }
                write!(f, ") => {return_type}")
            }
            ResolvedType::Parameter { index } => write!(f, "T{index}"),
            ResolvedType::Malformed(message) => write!(f, "<malformed: {message}>"),
        }
    }
}

/// Turns an encoded type node into a [`ResolvedType`].
///
/// Implementations must leave the cursor just past the type node, exactly as
/// `skip_type` would.
pub trait TypeTranslator: Send + Sync {
    fn translate(&self, cursor: &mut Cursor<'_>) -> Result<ResolvedType, IrError>;

    /// Translate the type node at `node` without moving the cursor.
    fn translate_at(&self, cursor: &mut Cursor<'_>, node: NodeRef) -> Result<ResolvedType, IrError> {
        cursor.with_alternate_position(node, |c| self.translate(c))
    }
}

/// Structural translation with no class hierarchy knowledge.
#[derive(Copy, Clone, Debug, Default)]
pub struct DefaultTypeTranslator;

impl TypeTranslator for DefaultTypeTranslator {
    fn translate(&self, cursor: &mut Cursor<'_>) -> Result<ResolvedType, IrError> {
        let offset = cursor.offset();
        let tag = cursor.read_tag()?;
        let ty = match tag {
            Tag::InvalidType => ResolvedType::Malformed(format!("invalid type at {offset}")),
            Tag::DynamicType => ResolvedType::Dynamic,
            Tag::VoidType => ResolvedType::Void,
            Tag::BottomType => ResolvedType::Bottom,
            Tag::InterfaceType => {
                let class = cursor.read_canonical_ref()?;
                let arguments = self.translate_list(cursor)?;
                ResolvedType::Interface { class, arguments }
            }
            Tag::SimpleInterfaceType => ResolvedType::interface(cursor.read_canonical_ref()?),
            Tag::FunctionType => {
                let params = cursor.read_list_length()?;
                for _ in 0..params {
                    cursor.read_byte()?;
                    cursor.skip_string_ref()?;
                    cursor.skip_type()?;
                }
                let type_parameter_count = crate::node::to_u32(params, "type parameters");
                let required = cursor.read_uint()?;
                let positional = self.translate_list(cursor)?;
                let len = cursor.read_list_length()?;
                let mut named = Vec::with_capacity(len);
                for _ in 0..len {
                    let name = cursor.read_string_ref()?;
                    let name = cursor
                        .strings()
                        .get_shared(name)
                        .ok_or(IrError::StringOutOfRange(name))?;
                    named.push((name, self.translate(cursor)?));
                }
                ResolvedType::Function {
                    type_parameter_count,
                    required,
                    positional,
                    named,
                    return_type: Box::new(self.translate(cursor)?),
                }
            }
            Tag::SimpleFunctionType => {
                let positional = self.translate_list(cursor)?;
                ResolvedType::Function {
                    type_parameter_count: 0,
                    required: crate::node::to_u32(positional.len(), "parameters"),
                    positional,
                    named: Vec::new(),
                    return_type: Box::new(self.translate(cursor)?),
                }
            }
            Tag::TypeParameterType => {
                let index = cursor.read_uint()?;
                cursor.skip_option_type()?;
                ResolvedType::Parameter { index }
            }
            other => return Err(IrError::unexpected(offset, other, "type")),
        };
        Ok(ty)
    }
}

impl DefaultTypeTranslator {
    fn translate_list(&self, cursor: &mut Cursor<'_>) -> Result<Vec<ResolvedType>, IrError> {
        let len = cursor.read_list_length()?;
        (0..len).map(|_| self.translate(cursor)).collect()
    }
}
