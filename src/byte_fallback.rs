//! Byte-fallback codec.
//!
//! Every raw byte 0x00..=0xFF owns a reserved token id, so any input can be
//! represented even when a symbol has no vocabulary entry. The codec only
//! knows the reserved range; resolving ordinary ids is the vocabulary's job.

use crate::{types::Token, vocab::ReservedIds};

/// Number of byte-fallback ids.
pub const BYTE_FALLBACK_LEN: Token = 256;

/// Maps raw bytes to and from the reserved id range
/// `offset..offset + 256`.
///
/// The whole range always fits in [`Token`], so encoding cannot overflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteFallback {
    offset: Token,
}

impl Default for ByteFallback {
    fn default() -> Self {
        Self {
            offset: ReservedIds::default().byte_offset,
        }
    }
}

impl ByteFallback {
    /// Returns `None` when `offset + 255` does not fit in a [`Token`].
    pub fn new(offset: Token) -> Option<Self> {
        offset
            .checked_add(BYTE_FALLBACK_LEN - 1)
            .map(|_| Self { offset })
    }

    pub fn from_reserved(reserved: &ReservedIds) -> Option<Self> {
        Self::new(reserved.byte_offset)
    }

    /// First id of the reserved range (the id of byte 0x00).
    pub fn offset(&self) -> Token {
        self.offset
    }

    /// Last id of the reserved range (the id of byte 0xFF).
    pub fn last(&self) -> Token {
        self.offset + (BYTE_FALLBACK_LEN - 1)
    }

    /// Maps a byte to its fallback id. Total over all 256 byte values.
    #[inline]
    pub fn encode(&self, byte: u8) -> Token {
        self.offset + Token::from(byte)
    }

    /// Maps a fallback id back to its byte, or `None` outside the range.
    #[inline]
    pub fn decode(&self, id: Token) -> Option<u8> {
        id.checked_sub(self.offset)
            .and_then(|b| u8::try_from(b).ok())
    }

    pub fn contains(&self, id: Token) -> bool {
        self.decode(id).is_some()
    }

    /// Appends one fallback id per byte, preserving byte order.
    pub(crate) fn encode_into(&self, bytes: &[u8], out: &mut Vec<Token>) {
        out.extend(bytes.iter().map(|&b| self.encode(b)));
    }
}
