//! Error types for vocabulary loading, configuration, encoding and decoding.
//!
//! Tokenization itself has no error type: given a loaded vocabulary it is
//! total over every byte sequence.

use std::{path::PathBuf, str::FromStr};

use indicatif::style::TemplateError;
use thiserror::Error;

use crate::types::Token;

/// Errors raised while reading a persisted vocabulary.
///
/// None of these are recovered from: a loader never returns a partial
/// vocabulary.
#[derive(Debug, Error)]
pub enum LoadError {
    /// The file could not be opened or read.
    #[error("failed to read vocabulary '{}': {source}", path.display())]
    IoFailure {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A record is truncated or structurally invalid.
    #[error("corrupt vocabulary '{}' at byte {offset}: {reason}", path.display())]
    CorruptFormat {
        path: PathBuf,
        offset: usize,
        reason: String,
    },

    /// The number of records differs from the declared (or required) count.
    #[error("vocabulary '{}': expected {expected} entries, got {actual}", path.display())]
    CountMismatch {
        path: PathBuf,
        expected: usize,
        actual: usize,
    },
}

impl LoadError {
    /// Path of the vocabulary the error refers to.
    pub fn path(&self) -> &std::path::Path {
        match self {
            Self::IoFailure { path, .. }
            | Self::CorruptFormat { path, .. }
            | Self::CountMismatch { path, .. } => path,
        }
    }
}

/// Errors raised while building a tokenizer from a configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config '{}': {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    Load(#[from] LoadError),

    /// The byte-fallback range does not fit inside the vocabulary.
    #[error(
        "byte-fallback ids starting at {byte_offset} do not fit a vocabulary of {vocab_size} entries"
    )]
    ByteRangeOutsideVocab { byte_offset: Token, vocab_size: usize },

    /// A control id falls inside the byte-fallback range.
    #[error("{name} id {id} overlaps the byte-fallback ids starting at {byte_offset}")]
    ReservedOverlap {
        name: &'static str,
        id: Token,
        byte_offset: Token,
    },
}

/// Errors that can occur during batch encoding.
#[derive(Debug, Error)]
pub enum EncodeError {
    /// Progress bar template string was invalid.
    #[error("template parsing failed: {0}")]
    ProgressBarSetup(#[from] TemplateError),
}

/// Errors that can occur during token decoding.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// Token ID not found in vocabulary.
    #[error("unknown token id: {0}")]
    UnknownToken(Token),

    /// Decoded bytes are not valid UTF-8.
    #[error("invalid UTF-8 in decoded bytes: {0}")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),

    /// Progress bar template string was invalid.
    #[error("template parsing failed: {0}")]
    ProgressBarSetup(#[from] TemplateError),
}

/// Controls how UTF-8 decoding errors are handled.
///
/// Mirrors Python's `bytes.decode(errors=...)` semantics.
/// Unknown token IDs always produce errors regardless of mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ErrorMode {
    /// Raise an error on invalid UTF-8 like Python's "strict".
    #[default]
    Strict,
    /// Replace invalid UTF-8 sequences with U+FFFD (like Python's "replace").
    Replace,
}

impl FromStr for ErrorMode {
    type Err = String;

    /// Parses a Python-style error mode string ("strict" or "replace").
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "strict" => Ok(Self::Strict),
            "replace" => Ok(Self::Replace),
            _ => Err(format!(
                "invalid error mode: {s:?} (expected \"strict\" or \"replace\")"
            )),
        }
    }
}
