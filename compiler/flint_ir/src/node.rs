//! Offset-typed handles into a source unit.
//!
//! Nodes are never materialized as objects during compilation. Every
//! reference is a byte offset (or a table index) into the unit's immutable
//! buffer, so two reads of the same handle always denote the same node.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Byte offset of a node in the unit's data section.
///
/// The same offset always denotes the same syntactic node within one
/// source unit, which makes it the key for variable lookup and for the
/// constant cache.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[repr(transparent)]
pub struct NodeRef(u32);

impl NodeRef {
    #[inline]
    pub const fn new(offset: u32) -> Self {
        Self(offset)
    }

    #[inline]
    pub const fn offset(self) -> usize {
        self.0 as usize
    }

    #[inline]
    pub const fn raw(self) -> u32 {
        self.0
    }
}

impl fmt::Debug for NodeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}", self.0)
    }
}

impl fmt::Display for NodeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}", self.0)
    }
}

/// Source position of a token, or [`TokenPos::NO_SOURCE`].
///
/// Encoded on the wire as `pos + 1` so that zero can mean "no position".
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Default, Serialize, Deserialize)]
#[repr(transparent)]
pub struct TokenPos(i32);

impl TokenPos {
    /// Synthetic code with no source location.
    pub const NO_SOURCE: TokenPos = TokenPos(-1);

    #[inline]
    pub const fn new(pos: i32) -> Self {
        Self(pos)
    }

    #[inline]
    pub const fn raw(self) -> i32 {
        self.0
    }

    /// Whether this position points into real source text.
    #[inline]
    pub const fn is_real(self) -> bool {
        self.0 >= 0
    }

    /// The smaller real position of the two, or whichever one is real.
    #[must_use]
    pub fn min_real(self, other: TokenPos) -> TokenPos {
        match (self.is_real(), other.is_real()) {
            (true, true) => TokenPos(self.0.min(other.0)),
            (true, false) => self,
            _ => other,
        }
    }

    /// The larger real position of the two, or whichever one is real.
    #[must_use]
    pub fn max_real(self, other: TokenPos) -> TokenPos {
        match (self.is_real(), other.is_real()) {
            (true, true) => TokenPos(self.0.max(other.0)),
            (true, false) => self,
            _ => other,
        }
    }
}

impl fmt::Debug for TokenPos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_real() {
            write!(f, "pos:{}", self.0)
        } else {
            f.write_str("pos:none")
        }
    }
}

impl fmt::Display for TokenPos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_real() {
            write!(f, "{}", self.0)
        } else {
            f.write_str("<no source>")
        }
    }
}

/// Index into the unit's string table.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[repr(transparent)]
pub struct StringRef(u32);

impl StringRef {
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

impl fmt::Debug for StringRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "str#{}", self.0)
    }
}

/// Reference into the unit's canonical-name table.
///
/// Zero is the null reference. Non-null references are `index + 1`.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Default, Serialize, Deserialize)]
#[repr(transparent)]
pub struct CanonicalRef(u32);

impl CanonicalRef {
    pub const NULL: CanonicalRef = CanonicalRef(0);

    /// Reference to the entry at `index` of the canonical-name table.
    #[inline]
    pub const fn from_index(index: u32) -> Self {
        Self(index + 1)
    }

    #[inline]
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    #[inline]
    pub const fn raw(self) -> u32 {
        self.0
    }

    #[inline]
    pub const fn is_null(self) -> bool {
        self.0 == 0
    }

    /// Table index, or `None` for the null reference.
    #[inline]
    pub const fn index(self) -> Option<usize> {
        if self.0 == 0 {
            None
        } else {
            Some((self.0 - 1) as usize)
        }
    }
}

impl fmt::Debug for CanonicalRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.index() {
            Some(i) => write!(f, "ref#{i}"),
            None => f.write_str("ref#null"),
        }
    }
}

/// Convert a buffer length or table size to `u32`.
///
/// Units are capped at 4GiB; exceeding that is an encoder bug.
#[inline]
pub fn to_u32(value: usize, what: &str) -> u32 {
    u32::try_from(value).unwrap_or_else(|_| panic!("{what} exceeds u32::MAX"))
}

#[cfg(test)]
mod tests;
