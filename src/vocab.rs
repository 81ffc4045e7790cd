//! Vocabulary store: ordered token entries with scores and a text index.
//!
//! Ids are positions in the entry list. The store is immutable once built
//! and is shared read-only by every tokenization call.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::types::{ByteSeq, Score, Token};

/// A single vocabulary entry. Its id is its position in the vocabulary.
#[derive(Debug, Clone, PartialEq)]
pub struct TokenEntry {
    /// Raw token text.
    pub text: ByteSeq,
    /// Merge priority; higher merges first.
    pub score: Score,
}

/// Ids the tokenizer treats specially.
///
/// Derived from the vocabulary's own entries where it declares them, with
/// the conventional SentencePiece layout as fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservedIds {
    /// Unknown-token placeholder.
    pub unk: Token,
    /// Beginning-of-sequence marker.
    pub bos: Token,
    /// End-of-sequence marker.
    pub eos: Token,
    /// Id of byte 0x00 in the byte-fallback range; byte `b` maps to `byte_offset + b`.
    pub byte_offset: Token,
}

impl Default for ReservedIds {
    fn default() -> Self {
        Self {
            unk: 0,
            bos: 1,
            eos: 2,
            byte_offset: 3,
        }
    }
}

/// Ordered set of known tokens with id <-> text lookup in both directions.
#[derive(Debug, Clone, Default)]
pub struct Vocabulary {
    /// id -> entry.
    entries: Vec<TokenEntry>,

    /// text -> id.
    ///
    /// A text carried by several entries resolves to the last of them.
    token_to_id: HashMap<ByteSeq, Token>,

    /// Derived once at construction.
    reserved: ReservedIds,
}

impl Vocabulary {
    /// Builds a vocabulary from ordered `(text, score)` pairs.
    ///
    /// Ids are assigned by position. When the same text appears more than
    /// once, lookups by text return the highest id carrying it; empty texts
    /// (control tokens) are not indexed at all.
    pub fn from_entries(entries: impl IntoIterator<Item = (ByteSeq, Score)>) -> Self {
        let entries: Vec<TokenEntry> = entries
            .into_iter()
            .map(|(text, score)| TokenEntry { text, score })
            .collect();

        let mut token_to_id = HashMap::with_capacity(entries.len());
        let mut shadowed = 0usize;
        for (id, entry) in entries.iter().enumerate() {
            if entry.text.is_empty() {
                continue;
            }
            if token_to_id.insert(entry.text.clone(), id as Token).is_some() {
                shadowed += 1;
            }
        }

        if shadowed > 0 {
            tracing::debug!(shadowed, "vocabulary texts shadowed by later entries");
        }

        let mut vocab = Self {
            entries,
            token_to_id,
            reserved: ReservedIds::default(),
        };
        vocab.reserved = vocab.derive_reserved_ids();
        vocab
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Looks up the id of an exact token text.
    #[inline]
    pub fn token_id(&self, text: &[u8]) -> Option<Token> {
        self.token_to_id.get(text).copied()
    }

    /// Returns the text of a token id.
    pub fn token_text(&self, id: Token) -> Option<&[u8]> {
        self.entry(id).map(|e| e.text.as_slice())
    }

    /// Returns the merge score of a token id.
    pub fn score(&self, id: Token) -> Option<Score> {
        self.entry(id).map(|e| e.score)
    }

    pub fn entry(&self, id: Token) -> Option<&TokenEntry> {
        self.entries.get(id as usize)
    }

    /// Iterates `(id, entry)` pairs in id order.
    pub fn iter(&self) -> impl Iterator<Item = (Token, &TokenEntry)> {
        self.entries
            .iter()
            .enumerate()
            .map(|(id, e)| (id as Token, e))
    }

    /// Reserved ids declared by the vocabulary's own entries.
    ///
    /// - `<unk>`, `<s>` and `</s>` give the unknown, BOS and EOS ids.
    /// - The byte-fallback offset is the id of `<0x00>` when `<0x00>`..`<0xFF>`
    ///   are 256 consecutive entries, otherwise the start of the first run of
    ///   256 consecutive raw single-byte entries `0x00`..`0xFF`.
    ///
    /// Anything the vocabulary does not declare falls back to
    /// [`ReservedIds::default`].
    pub fn reserved_ids(&self) -> ReservedIds {
        self.reserved
    }

    fn derive_reserved_ids(&self) -> ReservedIds {
        let defaults = ReservedIds::default();
        let reserved = ReservedIds {
            unk: self.token_id(b"<unk>").unwrap_or(defaults.unk),
            bos: self.token_id(b"<s>").unwrap_or(defaults.bos),
            eos: self.token_id(b"</s>").unwrap_or(defaults.eos),
            byte_offset: self
                .hex_byte_run()
                .or_else(|| self.raw_byte_run())
                .unwrap_or(defaults.byte_offset),
        };
        tracing::debug!(?reserved, "derived reserved ids");
        reserved
    }

    /// Start of a `<0x00>`..`<0xFF>` run of 256 consecutive entries.
    fn hex_byte_run(&self) -> Option<Token> {
        let start = self.token_id(b"<0x00>")?;
        let all_present = (0u32..256).all(|b| {
            self.token_text(start + b)
                .is_some_and(|text| text == format!("<0x{b:02X}>").as_bytes())
        });
        all_present.then_some(start)
    }

    /// Start of the first run of 256 consecutive single-byte entries 0x00..0xFF.
    fn raw_byte_run(&self) -> Option<Token> {
        self.entries
            .iter()
            .position(|e| e.text.as_slice() == [0u8])
            .filter(|&start| {
                (0..256usize).all(|b| {
                    self.entries
                        .get(start + b)
                        .is_some_and(|e| e.text.as_slice() == [b as u8])
                })
            })
            .map(|start| start as Token)
    }
}
