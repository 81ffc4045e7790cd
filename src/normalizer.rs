//! Whitespace normalization applied before segmentation.
//!
//! How spaces appear in token texts is a property of the vocabulary's
//! training scheme, so the strategy is pluggable and the merge engine never
//! looks at it.

use std::borrow::Cow;

use serde::{Deserialize, Serialize};

/// SentencePiece's visible space glyph (U+2581).
pub const SPACE_MARKER: &str = "\u{2581}";

/// A byte-level normalization strategy.
///
/// Works on raw bytes so that invalid UTF-8 passes through untouched.
pub trait Normalizer: Send + Sync {
    /// Rewrites input text into the form the vocabulary was trained on.
    fn normalize<'a>(&self, text: &'a [u8]) -> Cow<'a, [u8]>;

    /// Best-effort inverse of [`Normalizer::normalize`], used when decoding.
    fn restore(&self, bytes: Vec<u8>) -> Vec<u8> {
        bytes
    }
}

/// Leaves text unchanged.
///
/// For vocabularies whose learned tokens already store literal spaces.
#[derive(Debug, Clone, Copy, Default)]
pub struct Passthrough;

impl Normalizer for Passthrough {
    fn normalize<'a>(&self, text: &'a [u8]) -> Cow<'a, [u8]> {
        Cow::Borrowed(text)
    }
}

/// Replaces every space with a marker string.
///
/// With `add_dummy_prefix` one marker is also prepended to non-empty input,
/// so the first word matches the same tokens as a word after a space.
#[derive(Debug, Clone)]
pub struct WhitespaceMarker {
    marker: Vec<u8>,
    add_dummy_prefix: bool,
}

impl Default for WhitespaceMarker {
    fn default() -> Self {
        Self::new(SPACE_MARKER, true)
    }
}

impl WhitespaceMarker {
    pub fn new(marker: &str, add_dummy_prefix: bool) -> Self {
        Self {
            marker: marker.as_bytes().to_vec(),
            add_dummy_prefix,
        }
    }
}

impl Normalizer for WhitespaceMarker {
    fn normalize<'a>(&self, text: &'a [u8]) -> Cow<'a, [u8]> {
        if text.is_empty() {
            return Cow::Borrowed(text);
        }
        let prefix = self.add_dummy_prefix;
        if !prefix && (self.marker == b" " || !text.contains(&b' ')) {
            return Cow::Borrowed(text);
        }

        let mut out = Vec::with_capacity(text.len() + self.marker.len() * 4);
        if prefix {
            out.extend_from_slice(&self.marker);
        }
        for &b in text {
            if b == b' ' {
                out.extend_from_slice(&self.marker);
            } else {
                out.push(b);
            }
        }
        Cow::Owned(out)
    }

    fn restore(&self, bytes: Vec<u8>) -> Vec<u8> {
        if self.marker.is_empty() {
            return bytes;
        }
        let mut out = Vec::with_capacity(bytes.len());
        let mut rest = bytes.as_slice();
        while !rest.is_empty() {
            if rest.starts_with(&self.marker) {
                out.push(b' ');
                rest = &rest[self.marker.len()..];
            } else {
                out.push(rest[0]);
                rest = &rest[1..];
            }
        }
        if self.add_dummy_prefix && out.first() == Some(&b' ') {
            out.remove(0);
        }
        out
    }
}

/// Serializable choice of normalizer, used by configuration files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NormalizerKind {
    #[default]
    Passthrough,
    WhitespaceMarker {
        #[serde(default = "default_marker")]
        marker: String,
        #[serde(default = "default_true")]
        add_dummy_prefix: bool,
    },
}

fn default_marker() -> String {
    SPACE_MARKER.to_string()
}

fn default_true() -> bool {
    true
}

impl NormalizerKind {
    pub fn build(&self) -> Box<dyn Normalizer> {
        match self {
            Self::Passthrough => Box::new(Passthrough),
            Self::WhitespaceMarker {
                marker,
                add_dummy_prefix,
            } => Box::new(WhitespaceMarker::new(marker, *add_dummy_prefix)),
        }
    }
}
