//! Field-by-field readers for nodes that several traversals take apart.
//!
//! The `read_*_head` helpers consume a node's fixed prefix and leave the
//! cursor at its first variable-length child. [`FunctionLayout`] goes
//! further and records where each part of a function node starts, skipping
//! over the parts so callers can jump straight to the one they need.

use bitflags::bitflags;

use crate::cursor::Cursor;
use crate::tag::{AsyncMarker, Tag};
use crate::{IrError, NodeRef, StringRef, TokenPos};

bitflags! {
    /// Flags byte of a variable declaration.
    #[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Default)]
    pub struct VariableFlags: u8 {
        const FINAL = 1 << 0;
        const CONST = 1 << 1;
        const COVARIANT = 1 << 2;
        const GENERIC_COVARIANT_IMPL = 1 << 3;
        const FIELD_FORMAL = 1 << 4;
    }
}

/// Fixed prefix of a variable declaration.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct VariableHead {
    /// Offset of the declaration (after any statement tag); the variable's key.
    pub offset: NodeRef,
    pub pos: TokenPos,
    pub equals_pos: TokenPos,
    pub flags: VariableFlags,
    pub name: StringRef,
}

impl VariableHead {
    pub fn is_const(&self) -> bool {
        self.flags.contains(VariableFlags::CONST)
    }

    pub fn is_final(&self) -> bool {
        self.flags.intersects(VariableFlags::FINAL | VariableFlags::CONST)
    }

    /// Parameters checked by the callee regardless of the call site.
    pub fn is_covariant(&self) -> bool {
        self.flags
            .intersects(VariableFlags::COVARIANT | VariableFlags::GENERIC_COVARIANT_IMPL)
    }
}

/// Fixed prefix of a function node.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct FunctionHead {
    pub offset: NodeRef,
    pub pos: TokenPos,
    pub end_pos: TokenPos,
    pub async_marker: AsyncMarker,
    pub dart_async_marker: AsyncMarker,
}

/// Where every part of a function node starts.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FunctionLayout {
    pub head: FunctionHead,
    pub type_parameters: Vec<TypeParameterHead>,
    pub required_parameter_count: u32,
    pub positional: Vec<NodeRef>,
    pub named: Vec<NodeRef>,
    pub return_type: NodeRef,
    /// Offset of the body statement, if the function has one.
    pub body: Option<NodeRef>,
    /// Offset just past the function node.
    pub end: NodeRef,
}

impl FunctionLayout {
    pub fn parameter_count(&self) -> usize {
        self.positional.len() + self.named.len()
    }

    /// All parameter declarations, positional first.
    pub fn parameters(&self) -> impl Iterator<Item = NodeRef> + '_ {
        self.positional.iter().chain(self.named.iter()).copied()
    }

    pub fn is_generic(&self) -> bool {
        !self.type_parameters.is_empty()
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct TypeParameterHead {
    pub flags: u8,
    pub name: StringRef,
    pub bound: NodeRef,
}

/// Counts at the front of an argument list.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ArgumentsHead {
    pub total: u32,
    pub type_argument_count: usize,
}

impl Cursor<'_> {
    /// Read the fixed prefix of an untagged variable declaration.
    ///
    /// Leaves the cursor at the declared type.
    pub fn read_variable_head(&mut self) -> Result<VariableHead, IrError> {
        let offset = self.node_ref();
        let pos = self.read_position()?;
        let equals_pos = self.read_position()?;
        let flags = VariableFlags::from_bits_retain(self.read_byte()?);
        let name = self.read_string_ref()?;
        Ok(VariableHead {
            offset,
            pos,
            equals_pos,
            flags,
            name,
        })
    }

    /// Read a variable declaration's head at `node` without moving the cursor.
    pub fn variable_head_at(&mut self, node: NodeRef) -> Result<VariableHead, IrError> {
        self.with_alternate_position(node, Cursor::read_variable_head)
    }

    /// Read the fixed prefix of a tagged function node.
    ///
    /// Leaves the cursor at the type parameter list.
    pub fn read_function_head(&mut self) -> Result<FunctionHead, IrError> {
        let offset = self.node_ref();
        self.expect_tag(Tag::FunctionNode)?;
        let pos = self.read_position()?;
        let end_pos = self.read_position()?;
        let async_marker = self.read_async_marker()?;
        let dart_async_marker = self.read_async_marker()?;
        Ok(FunctionHead {
            offset,
            pos,
            end_pos,
            async_marker,
            dart_async_marker,
        })
    }

    fn read_async_marker(&mut self) -> Result<AsyncMarker, IrError> {
        let offset = self.offset();
        let value = self.read_byte()?;
        AsyncMarker::from_byte(value).ok_or(IrError::InvalidByte {
            offset,
            what: "async marker",
            value,
        })
    }

    /// Scan a function node, recording the offset of each part.
    ///
    /// Leaves the cursor just past the function node.
    pub fn scan_function_node(&mut self) -> Result<FunctionLayout, IrError> {
        let head = self.read_function_head()?;
        let type_parameters = self.scan_type_parameters()?;
        let required_parameter_count = self.read_uint()?;
        let positional = self.scan_variable_declarations()?;
        let named = self.scan_variable_declarations()?;
        let return_type = self.node_ref();
        self.skip_type()?;
        let body = if self.read_option()? {
            let body = self.node_ref();
            self.skip_statement()?;
            Some(body)
        } else {
            None
        };
        Ok(FunctionLayout {
            head,
            type_parameters,
            required_parameter_count,
            positional,
            named,
            return_type,
            body,
            end: self.node_ref(),
        })
    }

    /// Scan the function node at `node` without moving the cursor.
    pub fn function_layout_at(&mut self, node: NodeRef) -> Result<FunctionLayout, IrError> {
        self.with_alternate_position(node, Cursor::scan_function_node)
    }

    fn scan_type_parameters(&mut self) -> Result<Vec<TypeParameterHead>, IrError> {
        let len = self.read_list_length()?;
        let mut heads = Vec::with_capacity(len);
        for _ in 0..len {
            let flags = self.read_byte()?;
            let name = self.read_string_ref()?;
            let bound = self.node_ref();
            self.skip_type()?;
            heads.push(TypeParameterHead { flags, name, bound });
        }
        Ok(heads)
    }

    fn scan_variable_declarations(&mut self) -> Result<Vec<NodeRef>, IrError> {
        let len = self.read_list_length()?;
        let mut offsets = Vec::with_capacity(len);
        for _ in 0..len {
            offsets.push(self.node_ref());
            self.skip_variable_declaration()?;
        }
        Ok(offsets)
    }

    /// Read the counts at the front of an argument list.
    ///
    /// Leaves the cursor at the first type argument.
    pub fn read_arguments_head(&mut self) -> Result<ArgumentsHead, IrError> {
        let total = self.read_uint()?;
        let type_argument_count = self.read_list_length()?;
        Ok(ArgumentsHead {
            total,
            type_argument_count,
        })
    }

    /// Skip a variable declaration's type and initializer, returning the
    /// initializer's offset if present.
    pub fn skip_variable_tail(&mut self) -> Result<Option<NodeRef>, IrError> {
        self.skip_type()?;
        if self.read_option()? {
            let init = self.node_ref();
            self.skip_expression()?;
            Ok(Some(init))
        } else {
            Ok(None)
        }
    }

    /// Offset of the initializer of the declaration at `node`, if any.
    pub fn variable_initializer_at(&mut self, node: NodeRef) -> Result<Option<NodeRef>, IrError> {
        self.with_alternate_position(node, |c| {
            c.read_variable_head()?;
            c.skip_variable_tail()
        })
    }
}
