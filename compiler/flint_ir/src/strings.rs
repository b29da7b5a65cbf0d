//! String table of a source unit.
//!
//! Names and string literals are referenced by [`StringRef`]. The table
//! deduplicates on insertion, so within one unit equal strings have equal
//! references and name comparison never needs the text.

use std::sync::Arc;

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::node::to_u32;
use crate::StringRef;

#[derive(Clone, Debug, Default)]
pub struct StringTable {
    strings: Vec<Arc<str>>,
    index: FxHashMap<Arc<str>, StringRef>,
}

impl StringTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `text`, returning the existing reference if already present.
    pub fn intern(&mut self, text: &str) -> StringRef {
        if let Some(&r) = self.index.get(text) {
            return r;
        }
        let r = StringRef::new(to_u32(self.strings.len(), "string table"));
        let text: Arc<str> = Arc::from(text);
        self.strings.push(Arc::clone(&text));
        self.index.insert(text, r);
        r
    }

    pub fn get(&self, r: StringRef) -> Option<&str> {
        self.strings.get(r.index()).map(|s| &**s)
    }

    /// Shared handle to a string, for values that outlive a borrow of the table.
    pub fn get_shared(&self, r: StringRef) -> Option<Arc<str>> {
        self.strings.get(r.index()).cloned()
    }

    /// Reference for `text` if it is in the table.
    pub fn lookup(&self, text: &str) -> Option<StringRef> {
        self.index.get(text).copied()
    }

    pub fn len(&self) -> usize {
        self.strings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strings.is_empty()
    }
}

impl Serialize for StringTable {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let plain: Vec<&str> = self.strings.iter().map(|s| &**s).collect();
        plain.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for StringTable {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let plain = Vec::<String>::deserialize(deserializer)?;
        let mut table = StringTable::new();
        for text in &plain {
            table.intern(text);
        }
        Ok(table)
    }
}
