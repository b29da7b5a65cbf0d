//! Source units: the immutable data section plus everything keyed by it.
//!
//! A [`SourceUnit`] is cheap to clone and safe to share across threads. The
//! data section, string table, program index and metadata never change after
//! construction; the constant pool and constant cache are the only state
//! that grows, and both support concurrent insertion.
//!
//! # Container format
//!
//! ```text
//! "FLNT"  u32 version  u32 side-table length  bincode side tables  data section
//! ```
//!
//! All `u32`s are big-endian.

use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::ast::{Expression, FunctionNode, Initializer, TypeNode};
use crate::constant::{ConstantCache, ConstantPool};
use crate::encode::Encoder;
use crate::metadata::MetadataTables;
use crate::node::to_u32;
use crate::program::{
    ConstructorInfo, FieldFlags, FieldInfo, NameResolver, ProcedureFlags, ProcedureInfo,
    ProcedureKind, ProgramIndex, SymbolKind,
};
use crate::{CanonicalRef, Cursor, IrError, NodeRef, StringTable};

const MAGIC: &[u8; 4] = b"FLNT";
const FORMAT_VERSION: u32 = 1;
const HEADER_LEN: usize = 12;

#[derive(Clone, Debug)]
pub struct SourceUnit {
    data: Arc<[u8]>,
    strings: Arc<StringTable>,
    program: Arc<ProgramIndex>,
    metadata: Arc<MetadataTables>,
    pool: Arc<ConstantPool>,
    cache: Arc<ConstantCache>,
}

#[derive(Serialize)]
struct SideTablesRef<'a> {
    strings: &'a StringTable,
    program: &'a ProgramIndex,
    metadata: &'a MetadataTables,
}

#[derive(Deserialize)]
struct SideTables {
    strings: StringTable,
    program: ProgramIndex,
    metadata: MetadataTables,
}

impl SourceUnit {
    pub fn new(
        data: Vec<u8>,
        strings: StringTable,
        program: ProgramIndex,
        metadata: MetadataTables,
    ) -> Self {
        Self {
            data: Arc::from(data),
            strings: Arc::new(strings),
            program: Arc::new(program),
            metadata: Arc::new(metadata),
            pool: Arc::new(ConstantPool::new()),
            cache: Arc::new(ConstantCache::new()),
        }
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn strings(&self) -> &StringTable {
        &self.strings
    }

    pub fn program(&self) -> &ProgramIndex {
        &self.program
    }

    pub fn metadata(&self) -> &MetadataTables {
        &self.metadata
    }

    pub fn pool(&self) -> &ConstantPool {
        &self.pool
    }

    pub fn cache(&self) -> &ConstantCache {
        &self.cache
    }

    pub fn cursor(&self) -> Cursor<'_> {
        Cursor::new(&self.data, &self.strings)
    }

    pub fn cursor_at(&self, node: NodeRef) -> Cursor<'_> {
        Cursor::at(&self.data, &self.strings, node)
    }

    /// Members with a function node, in table order.
    pub fn functions(&self) -> impl Iterator<Item = (CanonicalRef, NodeRef)> + '_ {
        self.program
            .iter()
            .filter_map(|(r, symbol)| symbol.function().map(|f| (r, f)))
    }

    /// Reference for a member by qualified name.
    pub fn member(&self, qualified: &str) -> Option<CanonicalRef> {
        self.program.lookup(qualified)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, IrError> {
        let tables = SideTablesRef {
            strings: &self.strings,
            program: &self.program,
            metadata: &self.metadata,
        };
        let side = bincode::serialize(&tables).map_err(|e| IrError::Container(e.to_string()))?;
        let mut out = Vec::with_capacity(HEADER_LEN + side.len() + self.data.len());
        out.extend_from_slice(MAGIC);
        out.extend_from_slice(&FORMAT_VERSION.to_be_bytes());
        out.extend_from_slice(&to_u32(side.len(), "side tables").to_be_bytes());
        out.extend_from_slice(&side);
        out.extend_from_slice(&self.data);
        Ok(out)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, IrError> {
        if bytes.len() < HEADER_LEN || &bytes[..4] != MAGIC {
            return Err(IrError::Container("not a flint unit".to_owned()));
        }
        let word = |at: usize| {
            u32::from_be_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
        };
        let version = word(4);
        if version != FORMAT_VERSION {
            return Err(IrError::Container(format!(
                "unsupported format version {version}"
            )));
        }
        let side_len = word(8) as usize;
        let side_end = HEADER_LEN
            .checked_add(side_len)
            .filter(|end| *end <= bytes.len())
            .ok_or_else(|| IrError::Container("truncated side tables".to_owned()))?;
        let mut tables: SideTables = bincode::deserialize(&bytes[HEADER_LEN..side_end])
            .map_err(|e| IrError::Container(e.to_string()))?;
        tables.program.reindex();
        tracing::debug!(
            data = bytes.len() - side_end,
            strings = tables.strings.len(),
            symbols = tables.program.len(),
            "loaded unit"
        );
        Ok(Self::new(
            bytes[side_end..].to_vec(),
            tables.strings,
            tables.program,
            tables.metadata,
        ))
    }

    pub fn load(path: &Path) -> Result<Self, IrError> {
        let bytes = std::fs::read(path)
            .map_err(|e| IrError::Container(format!("{}: {e}", path.display())))?;
        Self::from_bytes(&bytes)
    }

    pub fn save(&self, path: &Path) -> Result<(), IrError> {
        let bytes = self.to_bytes()?;
        std::fs::write(path, bytes)
            .map_err(|e| IrError::Container(format!("{}: {e}", path.display())))
    }
}

/// Assembles a unit from owned trees.
///
/// Symbols are declared before their bodies are written, so bodies may refer
/// to any symbol, including themselves.
#[derive(Debug)]
pub struct UnitBuilder {
    encoder: Encoder,
    program: ProgramIndex,
    metadata: MetadataTables,
}

impl Default for UnitBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl UnitBuilder {
    /// A builder whose program already declares `dart:core`.
    pub fn new() -> Self {
        let mut program = ProgramIndex::new();
        program.add_core_library();
        Self {
            encoder: Encoder::new(),
            program,
            metadata: MetadataTables::new(),
        }
    }

    pub fn program(&self) -> &ProgramIndex {
        &self.program
    }

    pub fn program_mut(&mut self) -> &mut ProgramIndex {
        &mut self.program
    }

    pub fn metadata_mut(&mut self) -> &mut MetadataTables {
        &mut self.metadata
    }

    pub fn encoder(&self) -> &Encoder {
        &self.encoder
    }

    pub fn encoder_mut(&mut self) -> &mut Encoder {
        &mut self.encoder
    }

    /// Reference to a `dart:core` class, or null if unknown.
    pub fn core_class(&self, name: &str) -> CanonicalRef {
        self.program
            .lookup(&format!("{}::{name}", crate::program::core::LIBRARY))
            .unwrap_or(CanonicalRef::NULL)
    }

    pub fn declare_procedure(
        &mut self,
        parent: CanonicalRef,
        name: &str,
        kind: ProcedureKind,
        flags: ProcedureFlags,
    ) -> CanonicalRef {
        self.program.add_procedure(
            parent,
            name,
            ProcedureInfo {
                kind,
                flags,
                function: NodeRef::new(0),
            },
        )
    }

    /// Write the body of a declared procedure or constructor.
    pub fn define_function(
        &mut self,
        member: CanonicalRef,
        function: &FunctionNode,
    ) -> Result<NodeRef, IrError> {
        let offset = self.encoder.write_function_node(function)?;
        match self.program.symbol_kind_mut(member) {
            Some(SymbolKind::Procedure(info)) => info.function = offset,
            Some(SymbolKind::Constructor(info)) => info.function = offset,
            _ => return Err(IrError::Encode(format!("{member:?} has no function"))),
        }
        Ok(offset)
    }

    /// Declare and define a procedure in one step.
    pub fn add_procedure(
        &mut self,
        parent: CanonicalRef,
        name: &str,
        kind: ProcedureKind,
        flags: ProcedureFlags,
        function: &FunctionNode,
    ) -> Result<CanonicalRef, IrError> {
        let r = self.declare_procedure(parent, name, kind, flags);
        self.define_function(r, function)?;
        Ok(r)
    }

    /// A static top-level function in `library`.
    pub fn add_static_function(
        &mut self,
        library: CanonicalRef,
        name: &str,
        function: &FunctionNode,
    ) -> Result<CanonicalRef, IrError> {
        self.add_procedure(
            library,
            name,
            ProcedureKind::Method,
            ProcedureFlags::STATIC,
            function,
        )
    }

    pub fn declare_field(
        &mut self,
        parent: CanonicalRef,
        name: &str,
        flags: FieldFlags,
        ty: &TypeNode,
    ) -> Result<CanonicalRef, IrError> {
        let ty = self.encoder.write_type(ty)?;
        Ok(self.program.add_field(
            parent,
            name,
            FieldInfo {
                flags,
                ty,
                initializer: None,
            },
        ))
    }

    pub fn define_field_initializer(
        &mut self,
        field: CanonicalRef,
        value: &Expression,
    ) -> Result<NodeRef, IrError> {
        let offset = self.encoder.write_expression(value)?;
        match self.program.symbol_kind_mut(field) {
            Some(SymbolKind::Field(info)) => info.initializer = Some(offset),
            _ => return Err(IrError::Encode(format!("{field:?} is not a field"))),
        }
        Ok(offset)
    }

    /// Declare a field and write its initializer, if any.
    pub fn add_field(
        &mut self,
        parent: CanonicalRef,
        name: &str,
        flags: FieldFlags,
        ty: &TypeNode,
        initializer: Option<&Expression>,
    ) -> Result<CanonicalRef, IrError> {
        let field = self.declare_field(parent, name, flags, ty)?;
        if let Some(value) = initializer {
            self.define_field_initializer(field, value)?;
        }
        Ok(field)
    }

    pub fn declare_constructor(
        &mut self,
        class: CanonicalRef,
        name: &str,
        is_const: bool,
    ) -> CanonicalRef {
        self.program.add_constructor(
            class,
            name,
            ConstructorInfo {
                is_const,
                function: NodeRef::new(0),
                initializers: NodeRef::new(0),
            },
        )
    }

    /// Write a declared constructor's initializer list and function node.
    pub fn define_constructor(
        &mut self,
        constructor: CanonicalRef,
        function: &FunctionNode,
        initializers: &[Initializer],
    ) -> Result<(), IrError> {
        // Parameters are declared by the function node; initializers refer to them.
        self.define_function(constructor, function)?;
        let offset = self.encoder.write_initializers(initializers)?;
        match self.program.symbol_kind_mut(constructor) {
            Some(SymbolKind::Constructor(info)) => info.initializers = offset,
            _ => return Err(IrError::Encode(format!("{constructor:?} is not a constructor"))),
        }
        Ok(())
    }

    pub fn add_constructor(
        &mut self,
        class: CanonicalRef,
        name: &str,
        is_const: bool,
        function: &FunctionNode,
        initializers: &[Initializer],
    ) -> Result<CanonicalRef, IrError> {
        let r = self.declare_constructor(class, name, is_const);
        self.define_constructor(r, function, initializers)?;
        Ok(r)
    }

    pub fn finish(self) -> SourceUnit {
        let (data, strings) = self.encoder.finish();
        tracing::trace!(bytes = data.len(), strings = strings.len(), "unit assembled");
        SourceUnit::new(data, strings, self.program, self.metadata)
    }
}

#[cfg(test)]
mod tests;
