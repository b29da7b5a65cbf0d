//! Constant values, their interning pool and the per-unit constant cache.
//!
//! [`ConstantPool`] interns evaluated values so structurally equal constants
//! share one [`ConstantId`]; identity of constants is id equality.
//! [`ConstantCache`] maps the offset of an evaluated expression to its id.
//! Both live on the source unit and outlive any single compilation.

use std::fmt;
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::RwLock;

use crate::node::to_u32;
use crate::types::ResolvedType;
use crate::{CanonicalRef, NodeRef};

/// Index into a [`ConstantPool`].
#[derive(Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd)]
#[repr(transparent)]
pub struct ConstantId(u32);

impl ConstantId {
    #[inline]
    pub const fn new(index: u32) -> Self {
        Self(index)
    }

    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }

    #[inline]
    pub const fn raw(self) -> u32 {
        self.0
    }
}

impl fmt::Debug for ConstantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ConstantId({})", self.0)
    }
}

/// An evaluated compile-time constant.
///
/// Aggregates refer to their elements by id, so hashing and comparing a
/// value is shallow.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ConstValue {
    Null,
    Bool(bool),
    Int(i64),
    /// IEEE-754 bits; `0.0` and `-0.0` are distinct constants.
    Double(u64),
    String(Arc<str>),
    Symbol(Arc<str>),
    Type(ResolvedType),
    List {
        element: ResolvedType,
        elements: Vec<ConstantId>,
    },
    Map {
        key: ResolvedType,
        value: ResolvedType,
        entries: Vec<(ConstantId, ConstantId)>,
    },
    Instance {
        class: CanonicalRef,
        type_arguments: Vec<ResolvedType>,
        /// Sorted by field reference.
        fields: Vec<(CanonicalRef, ConstantId)>,
    },
    /// Closure over a static function.
    TearOff(CanonicalRef),
}

impl ConstValue {
    pub fn double(value: f64) -> Self {
        ConstValue::Double(value.to_bits())
    }

    pub fn string(text: &str) -> Self {
        ConstValue::String(Arc::from(text))
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ConstValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            ConstValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_double(&self) -> Option<f64> {
        match self {
            ConstValue::Double(bits) => Some(f64::from_bits(*bits)),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ConstValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Null, bool, numbers and strings: the values interpolation accepts.
    pub fn is_primitive(&self) -> bool {
        matches!(
            self,
            ConstValue::Null
                | ConstValue::Bool(_)
                | ConstValue::Int(_)
                | ConstValue::Double(_)
                | ConstValue::String(_)
        )
    }

    /// Name of the value's kind, for diagnostics.
    pub fn kind_name(&self) -> &'static str {
        match self {
            ConstValue::Null => "Null",
            ConstValue::Bool(_) => "bool",
            ConstValue::Int(_) => "int",
            ConstValue::Double(_) => "double",
            ConstValue::String(_) => "String",
            ConstValue::Symbol(_) => "Symbol",
            ConstValue::Type(_) => "Type",
            ConstValue::List { .. } => "List",
            ConstValue::Map { .. } => "Map",
            ConstValue::Instance { .. } => "instance",
            ConstValue::TearOff(_) => "Function",
        }
    }
}

impl fmt::Display for ConstValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConstValue::Null => f.write_str("null"),
            ConstValue::Bool(b) => write!(f, "{b}"),
            ConstValue::Int(i) => write!(f, "{i}"),
            ConstValue::Double(bits) => write!(f, "{:?}", f64::from_bits(*bits)),
            ConstValue::String(s) => write!(f, "{s:?}"),
            ConstValue::Symbol(s) => write!(f, "#{s}"),
            ConstValue::Type(t) => write!(f, "{t}"),
            ConstValue::List { elements, .. } => write!(f, "const List({})", elements.len()),
            ConstValue::Map { entries, .. } => write!(f, "const Map({})", entries.len()),
            ConstValue::Instance { class, .. } => write!(f, "const {class:?}"),
            ConstValue::TearOff(target) => write!(f, "tear-off {target:?}"),
        }
    }
}

/// Interning store for constant values, shared across threads.
///
/// Pre-interns null, true, false and the empty string.
#[derive(Debug)]
pub struct ConstantPool {
    values: RwLock<Vec<ConstValue>>,
    dedup: DashMap<ConstValue, ConstantId>,
}

impl ConstantPool {
    pub const NULL: ConstantId = ConstantId(0);
    pub const TRUE: ConstantId = ConstantId(1);
    pub const FALSE: ConstantId = ConstantId(2);
    pub const EMPTY_STR: ConstantId = ConstantId(3);

    const SENTINELS: usize = 4;

    pub fn new() -> Self {
        let sentinels = vec![
            ConstValue::Null,
            ConstValue::Bool(true),
            ConstValue::Bool(false),
            ConstValue::String(Arc::from("")),
        ];
        let dedup = DashMap::default();
        for (i, v) in sentinels.iter().enumerate() {
            dedup.insert(v.clone(), ConstantId::new(to_u32(i, "constant sentinels")));
        }
        Self {
            values: RwLock::new(sentinels),
            dedup,
        }
    }

    /// Intern a value. Returns the existing id if an equal value is present.
    pub fn intern(&self, value: ConstValue) -> ConstantId {
        if let Some(id) = self.dedup.get(&value) {
            return *id;
        }
        // The entry lock serializes racing inserts of the same value.
        match self.dedup.entry(value) {
            Entry::Occupied(entry) => *entry.get(),
            Entry::Vacant(entry) => {
                let mut values = self.values.write();
                let id = ConstantId::new(to_u32(values.len(), "constants"));
                values.push(entry.key().clone());
                entry.insert(id);
                id
            }
        }
    }

    pub fn bool(value: bool) -> ConstantId {
        if value {
            Self::TRUE
        } else {
            Self::FALSE
        }
    }

    /// Value for `id`, or `None` if `id` came from another pool.
    pub fn get(&self, id: ConstantId) -> Option<ConstValue> {
        self.values.read().get(id.index()).cloned()
    }

    pub fn len(&self) -> usize {
        self.values.read().len()
    }

    /// Whether only the sentinels are present.
    pub fn is_empty(&self) -> bool {
        self.len() <= Self::SENTINELS
    }
}

impl Default for ConstantPool {
    fn default() -> Self {
        Self::new()
    }
}

/// Offset-keyed memo of evaluated constants.
///
/// Concurrent inserts for the same key are last-writer-wins; values are
/// interned, so racing writers store the same id.
#[derive(Debug, Default)]
pub struct ConstantCache {
    entries: DashMap<NodeRef, ConstantId>,
}

impl ConstantCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, node: NodeRef) -> Option<ConstantId> {
        self.entries.get(&node).map(|id| *id)
    }

    pub fn insert(&self, node: NodeRef, id: ConstantId) {
        self.entries.insert(node, id);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every entry. Only used to recover from a cyclic initialization.
    pub fn clear(&self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests;
