//! Positioned reader over a unit's data section.
//!
//! Every readable construct has a `read_*` (or `decode_*`) operation and a
//! matching `skip_*` operation in [`crate::skip`]. Both must leave the cursor
//! at the same offset when started at the same offset; every look-ahead in
//! the higher traversals depends on it.

use crate::tag::Tag;
use crate::{CanonicalRef, IrError, NodeRef, StringRef, StringTable, TokenPos};

/// Largest value representable by the prefix varint encoding.
pub const MAX_UINT: u32 = 0x3FFF_FFFF;

/// Reader over an immutable byte buffer.
///
/// Cheap to copy; several traversals of one function each own a cursor over
/// the same shared buffer.
#[derive(Clone, Copy)]
pub struct Cursor<'a> {
    data: &'a [u8],
    strings: &'a StringTable,
    offset: usize,
}

impl<'a> Cursor<'a> {
    pub fn new(data: &'a [u8], strings: &'a StringTable) -> Self {
        Self {
            data,
            strings,
            offset: 0,
        }
    }

    /// A cursor positioned at `node`.
    pub fn at(data: &'a [u8], strings: &'a StringTable, node: NodeRef) -> Self {
        Self {
            data,
            strings,
            offset: node.offset(),
        }
    }

    #[inline]
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Current position as a node handle.
    #[inline]
    pub fn node_ref(&self) -> NodeRef {
        NodeRef::new(crate::node::to_u32(self.offset, "cursor offset"))
    }

    /// Permanently reposition the cursor.
    pub fn set_offset(&mut self, node: NodeRef) -> Result<(), IrError> {
        if node.offset() > self.data.len() {
            return Err(IrError::OffsetOutOfRange {
                offset: node.offset(),
                len: self.data.len(),
            });
        }
        self.offset = node.offset();
        Ok(())
    }

    /// Whether the cursor has consumed the whole buffer.
    pub fn at_end(&self) -> bool {
        self.offset >= self.data.len()
    }

    pub fn strings(&self) -> &'a StringTable {
        self.strings
    }

    /// Run `body` with the cursor at `node`, then restore the current offset.
    ///
    /// The offset is restored whether or not `body` fails.
    pub fn with_alternate_position<R, E: From<IrError>>(
        &mut self,
        node: NodeRef,
        body: impl FnOnce(&mut Self) -> Result<R, E>,
    ) -> Result<R, E> {
        let saved = self.offset;
        self.set_offset(node)?;
        let result = body(self);
        self.offset = saved;
        result
    }

    /// Run `body` with the cursor at `node` and leave it wherever `body` ends.
    pub fn with_alternate_position_and_stay<R, E: From<IrError>>(
        &mut self,
        node: NodeRef,
        body: impl FnOnce(&mut Self) -> Result<R, E>,
    ) -> Result<R, E> {
        self.set_offset(node)?;
        body(self)
    }

    // Scalars

    fn take(&mut self, n: usize) -> Result<&'a [u8], IrError> {
        let end = self.offset.checked_add(n).filter(|end| *end <= self.data.len());
        match end {
            Some(end) => {
                let bytes = &self.data[self.offset..end];
                self.offset = end;
                Ok(bytes)
            }
            None => Err(IrError::UnexpectedEof {
                offset: self.offset,
                wanted: n,
            }),
        }
    }

    pub fn peek_byte(&self) -> Result<u8, IrError> {
        self.data
            .get(self.offset)
            .copied()
            .ok_or(IrError::UnexpectedEof {
                offset: self.offset,
                wanted: 1,
            })
    }

    pub fn read_byte(&mut self) -> Result<u8, IrError> {
        let byte = self.peek_byte()?;
        self.offset += 1;
        Ok(byte)
    }

    pub fn read_bool(&mut self) -> Result<bool, IrError> {
        let offset = self.offset;
        match self.read_byte()? {
            0 => Ok(false),
            1 => Ok(true),
            value => Err(IrError::InvalidByte {
                offset,
                what: "bool",
                value,
            }),
        }
    }

    /// Prefix varint: 7, 14 or 30 payload bits, big-endian.
    pub fn read_uint(&mut self) -> Result<u32, IrError> {
        let first = u32::from(self.read_byte()?);
        if first & 0x80 == 0 {
            return Ok(first);
        }
        if first & 0x40 == 0 {
            let next = u32::from(self.read_byte()?);
            return Ok(((first & 0x3F) << 8) | next);
        }
        let rest = self.take(3)?;
        Ok(((first & 0x3F) << 24)
            | (u32::from(rest[0]) << 16)
            | (u32::from(rest[1]) << 8)
            | u32::from(rest[2]))
    }

    /// Fixed-width big-endian `u32`.
    pub fn read_uint32(&mut self) -> Result<u32, IrError> {
        let bytes = self.take(4)?;
        Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    pub fn read_double(&mut self) -> Result<f64, IrError> {
        let bytes = self.take(8)?;
        let mut raw = [0u8; 8];
        raw.copy_from_slice(bytes);
        Ok(f64::from_le_bytes(raw))
    }

    pub fn read_position(&mut self) -> Result<TokenPos, IrError> {
        let raw = self.read_uint()?;
        // `raw <= MAX_UINT`, so the shifted value always fits.
        Ok(TokenPos::new(i32::try_from(raw).unwrap_or(i32::MAX) - 1))
    }

    pub fn read_string_ref(&mut self) -> Result<StringRef, IrError> {
        self.read_uint().map(StringRef::new)
    }

    /// Read a string reference and resolve it against the string table.
    pub fn read_string(&mut self) -> Result<&'a str, IrError> {
        let index = self.read_string_ref()?;
        self.string(index)
    }

    pub fn string(&self, index: StringRef) -> Result<&'a str, IrError> {
        self.strings
            .get(index)
            .ok_or(IrError::StringOutOfRange(index))
    }

    pub fn read_canonical_ref(&mut self) -> Result<CanonicalRef, IrError> {
        self.read_uint().map(CanonicalRef::from_raw)
    }

    pub fn read_list_length(&mut self) -> Result<usize, IrError> {
        self.read_uint().map(|n| n as usize)
    }

    /// Read a declaration offset written as a varint.
    pub fn read_node_ref(&mut self) -> Result<NodeRef, IrError> {
        self.read_uint().map(NodeRef::new)
    }

    // Tags

    /// Tag at the current offset without consuming it.
    pub fn peek_tag(&self) -> Result<Tag, IrError> {
        let byte = self.peek_byte()?;
        Tag::split(byte)
            .map(|(tag, _)| tag)
            .ok_or(IrError::UnknownTag {
                offset: self.offset,
                byte,
            })
    }

    pub fn read_tag(&mut self) -> Result<Tag, IrError> {
        self.read_tag_and_payload().map(|(tag, _)| tag)
    }

    /// Read a tag byte, returning the tag and its low-bit payload.
    pub fn read_tag_and_payload(&mut self) -> Result<(Tag, u8), IrError> {
        let offset = self.offset;
        let byte = self.read_byte()?;
        Tag::split(byte).ok_or(IrError::UnknownTag { offset, byte })
    }

    /// Read a tag and fail unless it is `expected`.
    pub fn expect_tag(&mut self, expected: Tag) -> Result<(), IrError> {
        let offset = self.offset;
        let tag = self.read_tag()?;
        if tag == expected {
            Ok(())
        } else {
            Err(IrError::UnexpectedTag {
                offset,
                tag,
                expected: expected.name(),
            })
        }
    }

    /// Read an option tag; `true` means a value follows.
    pub fn read_option(&mut self) -> Result<bool, IrError> {
        let offset = self.offset;
        match self.read_tag()? {
            Tag::Nothing => Ok(false),
            Tag::Something => Ok(true),
            tag => Err(IrError::UnexpectedTag {
                offset,
                tag,
                expected: "Nothing or Something",
            }),
        }
    }
}

impl std::fmt::Debug for Cursor<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cursor")
            .field("offset", &self.offset)
            .field("len", &self.data.len())
            .finish_non_exhaustive()
    }
}
