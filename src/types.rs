//! Type aliases and shared types for vocabulary loading and BPE encoding.
//!
//! These type aliases provide semantic clarity throughout the codebase.

/// Represents a token identifier in the vocabulary.
///
/// Ids are dense and follow the vocabulary's insertion order (0..N-1).
pub type Token = u32;

/// Merge priority of a vocabulary entry. Higher scores merge first.
pub type Score = f32;

/// A sequence of raw bytes.
///
/// Token texts are byte strings: byte-fallback entries and partial UTF-8
/// pieces are not guaranteed to be valid UTF-8 on their own.
pub type ByteSeq = Vec<u8>;

/// Index of a symbol in the encoder's arena.
///
/// Stable for the lifetime of a single tokenization call.
pub(crate) type SymbolIdx = usize;
