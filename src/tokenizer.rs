//! This module provides the complete tokenization pipeline:
//! 1. Whitespace normalization through a pluggable [`Normalizer`].
//! 2. Segmentation into one symbol per UTF-8 character.
//! 3. Score-driven BPE merges over adjacent symbols.
//! 4. Resolution of each surviving symbol to a vocabulary id, or to one
//!    byte-fallback id per byte when the symbol is not a known token.
//!
//! The tokenizer supports both single-text and parallel batch encoding
//! via Rayon.

use indicatif::{ParallelProgressIterator, ProgressBar, ProgressStyle, style::TemplateError};
use rayon::prelude::*;

use crate::{
    byte_fallback::ByteFallback,
    encoder::SpEncoder,
    error::{ConfigError, DecodeError, EncodeError, ErrorMode},
    normalizer::{Normalizer, Passthrough},
    types::Token,
    vocab::{ReservedIds, Vocabulary},
};

/// Tokenizes `text` against `vocab`.
///
/// Uses the reserved ids the vocabulary declares (see
/// [`Vocabulary::reserved_ids`]) and no whitespace rewriting. When
/// `add_leading_marker` is set the BOS id is emitted first.
///
/// Total over every byte sequence, including invalid UTF-8.
pub fn tokenize(vocab: &Vocabulary, text: &[u8], add_leading_marker: bool) -> Vec<Token> {
    let reserved = vocab.reserved_ids();
    encode_normalized(
        vocab,
        &ByteFallback::from_reserved(&reserved).unwrap_or_default(),
        text,
        add_leading_marker.then_some(reserved.bos),
    )
}

/// Merges and resolves already-normalized text.
fn encode_normalized(
    vocab: &Vocabulary,
    fallback: &ByteFallback,
    text: &[u8],
    leading: Option<Token>,
) -> Vec<Token> {
    let mut output = Vec::with_capacity(text.len() / 2 + 1);
    output.extend(leading);

    if text.is_empty() {
        return output;
    }

    let outcome = SpEncoder::new(vocab, text).merge();
    tracing::trace!(
        symbols = outcome.initial_symbols,
        merges = outcome.merges,
        "merged input"
    );
    for span in outcome.pieces {
        let piece = &text[span];
        match vocab.token_id(piece) {
            Some(id) => output.push(id),
            // symbols that did not form tokens are emitted as bytes
            None => fallback.encode_into(piece, &mut output),
        }
    }

    output
}

/// A tokenization session over one immutable vocabulary.
///
/// The vocabulary is shared read-only by every call, so a `Tokenizer` can
/// be used from several threads at once.
pub struct Tokenizer {
    vocab: Vocabulary,
    reserved: ReservedIds,
    fallback: ByteFallback,
    normalizer: Box<dyn Normalizer>,
}

impl std::fmt::Debug for Tokenizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tokenizer")
            .field("vocab_size", &self.vocab.len())
            .field("reserved", &self.reserved)
            .finish_non_exhaustive()
    }
}

impl Tokenizer {
    /// Creates a tokenizer with derived reserved ids and no whitespace rewriting.
    ///
    /// Derived ids fall back to the conventional layout, which may not suit
    /// a small vocabulary; that is logged rather than rejected.
    pub fn new(vocab: Vocabulary) -> Self {
        let reserved = vocab.reserved_ids();
        let fallback = check_reserved(&vocab, &reserved).unwrap_or_else(|err| {
            tracing::warn!(error = %err, "derived reserved ids do not match the vocabulary");
            ByteFallback::from_reserved(&reserved).unwrap_or_default()
        });
        Self {
            vocab,
            reserved,
            fallback,
            normalizer: Box::new(Passthrough),
        }
    }

    /// Replaces the normalization strategy.
    pub fn with_normalizer(mut self, normalizer: impl Normalizer + 'static) -> Self {
        self.normalizer = Box::new(normalizer);
        self
    }

    pub(crate) fn with_boxed_normalizer(mut self, normalizer: Box<dyn Normalizer>) -> Self {
        self.normalizer = normalizer;
        self
    }

    /// Overrides the reserved ids instead of deriving them from the vocabulary.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ByteRangeOutsideVocab`] if the 256 byte-fallback
    /// ids do not all exist in the vocabulary, or
    /// [`ConfigError::ReservedOverlap`] if a control id falls inside them.
    pub fn with_reserved_ids(self, reserved: ReservedIds) -> Result<Self, ConfigError> {
        let fallback = check_reserved(&self.vocab, &reserved)?;
        Ok(Self {
            reserved,
            fallback,
            ..self
        })
    }

    /// Tokenizes a byte string.
    ///
    /// Output is the optional BOS id followed by the resolved ids of every
    /// surviving symbol, left to right.
    pub fn tokenize(&self, text: &[u8], add_bos: bool) -> Vec<Token> {
        let normalized = self.normalizer.normalize(text);
        encode_normalized(
            &self.vocab,
            &self.fallback,
            &normalized,
            add_bos.then_some(self.reserved.bos),
        )
    }

    /// Tokenizes a string slice.
    pub fn tokenize_str(&self, text: &str, add_bos: bool) -> Vec<Token> {
        self.tokenize(text.as_bytes(), add_bos)
    }

    /// Tokenizes many texts in parallel using Rayon.
    ///
    /// Each text is normalized and merged independently on a Rayon worker;
    /// results keep the input order.
    ///
    /// # Errors
    ///
    /// Returns [`EncodeError::ProgressBarSetup`] if the progress bar template
    /// fails to compile.
    pub fn tokenize_batch<T>(
        &self,
        texts: &[T],
        add_bos: bool,
        show_progress: bool,
    ) -> Result<Vec<Vec<Token>>, EncodeError>
    where
        T: AsRef<[u8]> + Sync,
    {
        let pb = self.batch_progress(texts.len() as u64, "Tokenizing texts", show_progress)?;

        Ok(texts
            .par_iter()
            .progress_with(pb)
            .map(|text| self.tokenize(text.as_ref(), add_bos))
            .collect())
    }

    /// Decodes token ids back into text.
    ///
    /// Byte-fallback ids become their raw byte, BOS and EOS are skipped and
    /// every other id contributes its vocabulary text. The normalizer's
    /// inverse is applied to the joined bytes.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::UnknownToken`] if an id is outside the
    /// vocabulary, or [`DecodeError::InvalidUtf8`] if the decoded bytes are
    /// not valid UTF-8 (only in `Strict` mode).
    pub fn decode(&self, tokens: &[Token], errors: ErrorMode) -> Result<String, DecodeError> {
        let bytes = self.normalizer.restore(self.decode_bytes(tokens)?);

        match errors {
            ErrorMode::Strict => String::from_utf8(bytes).map_err(DecodeError::InvalidUtf8),
            ErrorMode::Replace => Ok(String::from_utf8_lossy(&bytes).into_owned()),
        }
    }

    /// Decodes token ids into raw bytes without applying the normalizer's inverse.
    pub fn decode_bytes(&self, tokens: &[Token]) -> Result<Vec<u8>, DecodeError> {
        let mut bytes = Vec::with_capacity(tokens.len() * 4);
        for &token in tokens {
            if let Some(byte) = self.fallback.decode(token) {
                bytes.push(byte);
                continue;
            }
            if token == self.reserved.bos || token == self.reserved.eos {
                continue;
            }
            let text = self
                .vocab
                .token_text(token)
                .ok_or(DecodeError::UnknownToken(token))?;
            bytes.extend_from_slice(text);
        }
        Ok(bytes)
    }

    /// Decodes many token sequences in parallel.
    ///
    /// # Errors
    ///
    /// Same as [`Tokenizer::decode`], plus [`DecodeError::ProgressBarSetup`]
    /// if the progress bar template fails to compile.
    pub fn decode_batch(
        &self,
        token_seqs: &[&[Token]],
        errors: ErrorMode,
        show_progress: bool,
    ) -> Result<Vec<String>, DecodeError> {
        let pb = self.batch_progress(token_seqs.len() as u64, "Decoding tokens", show_progress)?;

        token_seqs
            .par_iter()
            .progress_with(pb)
            .map(|tokens| self.decode(tokens, errors))
            .collect()
    }

    pub fn vocab(&self) -> &Vocabulary {
        &self.vocab
    }

    pub fn vocab_size(&self) -> usize {
        self.vocab.len()
    }

    pub fn reserved_ids(&self) -> ReservedIds {
        self.reserved
    }

    pub fn bos_id(&self) -> Token {
        self.reserved.bos
    }

    pub fn byte_fallback(&self) -> &ByteFallback {
        &self.fallback
    }

    /// Returns a visible progress bar, or a hidden one when `show` is false.
    fn batch_progress(
        &self,
        size: u64,
        msg: &str,
        show: bool,
    ) -> Result<ProgressBar, TemplateError> {
        if show {
            return progress_bar(size, msg);
        }
        // create dummy progress bar and force to not render
        let pb = ProgressBar::new(size);
        pb.set_draw_target(indicatif::ProgressDrawTarget::hidden());
        Ok(pb)
    }
}

/// Checks that the byte-fallback range lies inside the vocabulary and that
/// no control id falls inside it.
fn check_reserved(vocab: &Vocabulary, reserved: &ReservedIds) -> Result<ByteFallback, ConfigError> {
    let out_of_vocab = || ConfigError::ByteRangeOutsideVocab {
        byte_offset: reserved.byte_offset,
        vocab_size: vocab.len(),
    };
    let fallback = ByteFallback::from_reserved(reserved).ok_or_else(out_of_vocab)?;
    if fallback.last() as usize >= vocab.len() {
        return Err(out_of_vocab());
    }

    for (name, id) in [
        ("unk", reserved.unk),
        ("bos", reserved.bos),
        ("eos", reserved.eos),
    ] {
        if fallback.contains(id) {
            return Err(ConfigError::ReservedOverlap {
                name,
                id,
                byte_offset: reserved.byte_offset,
            });
        }
    }
    Ok(fallback)
}

/// Creates a styled progress bar with elapsed time, a fixed-width message
/// label, and position/total counters.
fn progress_bar(size: u64, msg: impl Into<String>) -> Result<ProgressBar, TemplateError> {
    let pb = ProgressBar::new(size);
    let style = ProgressStyle::default_bar()
        .template("[{elapsed_precise}] {msg:<30!} {wide_bar} {pos}/{len}")?;

    pb.set_style(style);
    pb.set_message(msg.into());
    pb.enable_steady_tick(std::time::Duration::from_secs(1));

    Ok(pb)
}
