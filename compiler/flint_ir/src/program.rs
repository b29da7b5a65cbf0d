//! Canonical-name table: the symbols canonical references point at.
//!
//! [`NameResolver`] is the seam the builders see. [`ProgramIndex`] is the
//! table stored in a unit container; fixtures build one with its `add_*`
//! methods.

use bitflags::bitflags;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::node::to_u32;
use crate::{CanonicalRef, NodeRef};

/// Qualified names of the core classes the evaluator and builder rely on.
pub mod core {
    pub const LIBRARY: &str = "dart:core";
    pub const OBJECT: &str = "dart:core::Object";
    pub const NULL: &str = "dart:core::Null";
    pub const BOOL: &str = "dart:core::bool";
    pub const INT: &str = "dart:core::int";
    pub const DOUBLE: &str = "dart:core::double";
    pub const STRING: &str = "dart:core::String";
    pub const SYMBOL: &str = "dart:core::Symbol";
    pub const TYPE: &str = "dart:core::Type";
    pub const LIST: &str = "dart:core::List";
    pub const MAP: &str = "dart:core::Map";
    pub const FUNCTION: &str = "dart:core::Function";
    pub const ITERATOR: &str = "dart:core::Iterator";
    pub const IDENTICAL: &str = "dart:core::identical";
    pub const BOOL_FROM_ENVIRONMENT: &str = "dart:core::bool::fromEnvironment";
    pub const INT_FROM_ENVIRONMENT: &str = "dart:core::int::fromEnvironment";
    pub const STRING_FROM_ENVIRONMENT: &str = "dart:core::String::fromEnvironment";
}

bitflags! {
    #[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct FieldFlags: u8 {
        const STATIC = 1 << 0;
        const CONST = 1 << 1;
        const FINAL = 1 << 2;
        /// Static field whose initializer runs on first access.
        const LAZY = 1 << 3;
    }
}

bitflags! {
    #[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct ProcedureFlags: u8 {
        const STATIC = 1 << 0;
        const ABSTRACT = 1 << 1;
        const EXTERNAL = 1 << 2;
        const CONST = 1 << 3;
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProcedureKind {
    Method,
    Getter,
    Setter,
    Operator,
    Factory,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassInfo {
    pub superclass: CanonicalRef,
    pub type_parameter_count: u32,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldInfo {
    pub flags: FieldFlags,
    /// Offset of the declared type node.
    pub ty: NodeRef,
    /// Offset of the initializer expression.
    pub initializer: Option<NodeRef>,
}

impl FieldInfo {
    pub fn is_static(&self) -> bool {
        self.flags.contains(FieldFlags::STATIC)
    }

    pub fn is_const(&self) -> bool {
        self.flags.contains(FieldFlags::CONST)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcedureInfo {
    pub kind: ProcedureKind,
    pub flags: ProcedureFlags,
    /// Offset of the function node.
    pub function: NodeRef,
}

impl ProcedureInfo {
    pub fn is_static(&self) -> bool {
        self.flags.contains(ProcedureFlags::STATIC)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConstructorInfo {
    pub is_const: bool,
    pub function: NodeRef,
    /// Offset of the initializer list.
    pub initializers: NodeRef,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SymbolKind {
    Library,
    Class(ClassInfo),
    Field(FieldInfo),
    Procedure(ProcedureInfo),
    Constructor(ConstructorInfo),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Symbol {
    pub name: String,
    pub parent: CanonicalRef,
    pub kind: SymbolKind,
}

impl Symbol {
    pub fn as_class(&self) -> Option<&ClassInfo> {
        match &self.kind {
            SymbolKind::Class(info) => Some(info),
            _ => None,
        }
    }

    pub fn as_field(&self) -> Option<&FieldInfo> {
        match &self.kind {
            SymbolKind::Field(info) => Some(info),
            _ => None,
        }
    }

    pub fn as_procedure(&self) -> Option<&ProcedureInfo> {
        match &self.kind {
            SymbolKind::Procedure(info) => Some(info),
            _ => None,
        }
    }

    pub fn as_constructor(&self) -> Option<&ConstructorInfo> {
        match &self.kind {
            SymbolKind::Constructor(info) => Some(info),
            _ => None,
        }
    }

    /// Offset of the symbol's function node, for procedures and constructors.
    pub fn function(&self) -> Option<NodeRef> {
        match &self.kind {
            SymbolKind::Procedure(info) => Some(info.function),
            SymbolKind::Constructor(info) => Some(info.function),
            _ => None,
        }
    }
}

/// Maps canonical references to symbols.
pub trait NameResolver: Send + Sync {
    fn resolve(&self, r: CanonicalRef) -> Option<&Symbol>;

    /// Reference for a `::`-separated qualified name.
    fn lookup(&self, qualified: &str) -> Option<CanonicalRef>;

    /// `library::Class::member` style name, for diagnostics and builtins.
    fn qualified_name(&self, r: CanonicalRef) -> String {
        let mut parts = Vec::new();
        let mut current = r;
        while let Some(symbol) = self.resolve(current) {
            parts.push(symbol.name.as_str());
            current = symbol.parent;
        }
        if parts.is_empty() {
            return format!("{r:?}");
        }
        parts.reverse();
        parts.join("::")
    }

    /// Members declared directly in `parent`, in declaration order.
    fn members(&self, parent: CanonicalRef) -> Vec<CanonicalRef>;

    /// Whether `class` is `ancestor` or inherits from it.
    fn is_subclass_of(&self, class: CanonicalRef, ancestor: CanonicalRef) -> bool {
        let mut current = class;
        // Bounded by the table size so a malformed cycle cannot hang.
        for _ in 0..=u16::MAX {
            if current == ancestor {
                return true;
            }
            match self.resolve(current).and_then(Symbol::as_class) {
                Some(info) if !info.superclass.is_null() => current = info.superclass,
                _ => return false,
            }
        }
        false
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgramIndex {
    symbols: Vec<Symbol>,
    #[serde(skip)]
    by_name: FxHashMap<String, CanonicalRef>,
}

impl ProgramIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild the name index after deserialization.
    pub(crate) fn reindex(&mut self) {
        let names: Vec<(String, CanonicalRef)> = (0..self.symbols.len())
            .map(|i| {
                let r = CanonicalRef::from_index(to_u32(i, "symbols"));
                (self.qualified_name(r), r)
            })
            .collect();
        self.by_name = names.into_iter().collect();
    }

    fn add(&mut self, parent: CanonicalRef, name: &str, kind: SymbolKind) -> CanonicalRef {
        let r = CanonicalRef::from_index(to_u32(self.symbols.len(), "symbols"));
        self.symbols.push(Symbol {
            name: name.to_owned(),
            parent,
            kind,
        });
        let qualified = self.qualified_name(r);
        self.by_name.insert(qualified, r);
        r
    }

    pub fn add_library(&mut self, name: &str) -> CanonicalRef {
        self.add(CanonicalRef::NULL, name, SymbolKind::Library)
    }

    pub fn add_class(
        &mut self,
        library: CanonicalRef,
        name: &str,
        superclass: CanonicalRef,
    ) -> CanonicalRef {
        self.add(
            library,
            name,
            SymbolKind::Class(ClassInfo {
                superclass,
                type_parameter_count: 0,
            }),
        )
    }

    pub fn add_field(&mut self, parent: CanonicalRef, name: &str, info: FieldInfo) -> CanonicalRef {
        self.add(parent, name, SymbolKind::Field(info))
    }

    pub fn add_procedure(
        &mut self,
        parent: CanonicalRef,
        name: &str,
        info: ProcedureInfo,
    ) -> CanonicalRef {
        self.add(parent, name, SymbolKind::Procedure(info))
    }

    pub fn add_constructor(
        &mut self,
        class: CanonicalRef,
        name: &str,
        info: ConstructorInfo,
    ) -> CanonicalRef {
        self.add(class, name, SymbolKind::Constructor(info))
    }

    /// Declare `dart:core` and its classes, so builtins resolve.
    pub fn add_core_library(&mut self) -> CanonicalRef {
        let lib = self.add_library(core::LIBRARY);
        let object = self.add_class(lib, "Object", CanonicalRef::NULL);
        for name in [
            "Null", "bool", "int", "double", "String", "Symbol", "Type", "List", "Map",
            "Function", "Iterator",
        ] {
            self.add_class(lib, name, object);
        }
        lib
    }

    pub(crate) fn symbol_kind_mut(&mut self, r: CanonicalRef) -> Option<&mut SymbolKind> {
        r.index()
            .and_then(|i| self.symbols.get_mut(i))
            .map(|s| &mut s.kind)
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    /// Every symbol with its reference.
    pub fn iter(&self) -> impl Iterator<Item = (CanonicalRef, &Symbol)> {
        self.symbols
            .iter()
            .enumerate()
            .map(|(i, s)| (CanonicalRef::from_index(to_u32(i, "symbols")), s))
    }
}

impl NameResolver for ProgramIndex {
    fn resolve(&self, r: CanonicalRef) -> Option<&Symbol> {
        r.index().and_then(|i| self.symbols.get(i))
    }

    fn lookup(&self, qualified: &str) -> Option<CanonicalRef> {
        self.by_name.get(qualified).copied()
    }

    fn members(&self, parent: CanonicalRef) -> Vec<CanonicalRef> {
        self.iter()
            .filter(|(_, s)| s.parent == parent)
            .map(|(r, _)| r)
            .collect()
    }
}
