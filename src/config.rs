//! JSON tokenizer configuration.
//!
//! ```json
//! {
//!   "vocab_path": "models/ggml-vocab.bin",
//!   "expected_vocab_size": 32000,
//!   "normalizer": { "type": "passthrough" },
//!   "add_bos": true
//! }
//! ```

use std::{
    fs,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

use crate::{
    error::ConfigError,
    loader::{load_vocab, load_vocab_expecting},
    normalizer::NormalizerKind,
    tokenizer::Tokenizer,
    vocab::ReservedIds,
};

/// Settings needed to build a [`Tokenizer`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TokenizerConfig {
    /// Vocabulary file. Relative paths resolve against the config file's directory.
    pub vocab_path: PathBuf,

    /// Required entry count; loading fails on any other size.
    #[serde(default)]
    pub expected_vocab_size: Option<usize>,

    #[serde(default)]
    pub normalizer: NormalizerKind,

    /// Whether callers should prepend the BOS id by default.
    #[serde(default = "default_add_bos")]
    pub add_bos: bool,

    /// Explicit reserved ids. Derived from the vocabulary when absent.
    #[serde(default)]
    pub reserved: Option<ReservedIds>,
}

fn default_add_bos() -> bool {
    true
}

impl TokenizerConfig {
    /// Config for a vocabulary file with every other setting at its default.
    pub fn new(vocab_path: impl Into<PathBuf>) -> Self {
        Self {
            vocab_path: vocab_path.into(),
            expected_vocab_size: None,
            normalizer: NormalizerKind::default(),
            add_bos: default_add_bos(),
            reserved: None,
        }
    }

    /// Reads a JSON config file. A relative `vocab_path` is rebased onto the
    /// file's directory.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config: Self = serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

        if config.vocab_path.is_relative() {
            if let Some(dir) = path.parent() {
                config.vocab_path = dir.join(&config.vocab_path);
            }
        }
        Ok(config)
    }
}

impl Tokenizer {
    /// Loads the configured vocabulary and assembles a tokenizer.
    ///
    /// # Errors
    ///
    /// Any [`crate::LoadError`] from the vocabulary, wrapped in
    /// [`ConfigError::Load`], and the reserved-id checks of
    /// [`Tokenizer::with_reserved_ids`].
    pub fn from_config(config: &TokenizerConfig) -> Result<Self, ConfigError> {
        let vocab = match config.expected_vocab_size {
            Some(expected) => load_vocab_expecting(&config.vocab_path, expected)?,
            None => load_vocab(&config.vocab_path)?,
        };

        let mut tokenizer = Tokenizer::new(vocab).with_boxed_normalizer(config.normalizer.build());
        if let Some(reserved) = config.reserved {
            tokenizer = tokenizer.with_reserved_ids(reserved)?;
        }
        Ok(tokenizer)
    }
}
