//! Score-driven BPE tokenizer for SentencePiece-style vocabularies.
//!
//! A [`Vocabulary`] is loaded from disk, then text is split into one symbol
//! per UTF-8 character and adjacent symbols are merged greedily by the score
//! of the vocabulary entry their concatenation forms. Symbols that never
//! become a known token are emitted as byte-fallback ids, so every input
//! byte sequence tokenizes.
//!
//! ```ignore
//! let vocab = sptok::load_vocab_expecting("models/ggml-vocab.bin", 32000)?;
//! let ids = sptok::tokenize(&vocab, b"Hello World", true);
//! assert_eq!(ids, vec![1, 10994, 2787]);
//! ```

#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::panic))]
#![deny(unused_must_use)]

mod byte_fallback;
mod config;
mod encoder;
mod error;
mod loader;
mod normalizer;
mod tokenizer;
mod types;
mod vocab;

#[cfg(feature = "python")]
mod python;

pub use byte_fallback::{ByteFallback, BYTE_FALLBACK_LEN};
pub use config::TokenizerConfig;
pub use error::{ConfigError, DecodeError, EncodeError, ErrorMode, LoadError};
pub use loader::{encode_native, load_vocab, load_vocab_expecting, parse_vocab, save_vocab, VocabFormat};
pub use normalizer::{Normalizer, NormalizerKind, Passthrough, WhitespaceMarker, SPACE_MARKER};
pub use tokenizer::{tokenize, Tokenizer};
pub use types::{ByteSeq, Score, Token};
pub use vocab::{ReservedIds, TokenEntry, Vocabulary};
