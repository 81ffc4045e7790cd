//! Score-driven BPE merge engine.
//!
//! The input is split into one symbol per UTF-8 character. Adjacent pairs
//! whose concatenated text is a vocabulary entry become merge candidates,
//! ordered by the entry's score. The best candidate is merged repeatedly
//! until no candidate remains.
//!
//! Symbols live in a *Vec-as-arena* doubly-linked list. A merge folds the
//! right symbol into the left one and marks the right symbol dead, so stale
//! candidates are detected by checking liveness and length rather than by
//! chasing references.

use std::{cmp::Ordering, collections::BinaryHeap, ops::Range};

use crate::{
    types::{Score, SymbolIdx},
    vocab::Vocabulary,
};

/// A run of input bytes in the in-progress tokenization.
#[derive(Debug, Clone)]
struct Symbol {
    /// Byte offset of the symbol in the normalized input.
    start: usize,

    /// Byte length. Zero marks a symbol consumed by a merge.
    len: usize,

    /// Index of the previous live symbol, if any.
    prev: Option<SymbolIdx>,

    /// Index of the next live symbol, if any.
    next: Option<SymbolIdx>,
}

impl Symbol {
    #[inline]
    fn is_alive(&self) -> bool {
        self.len > 0
    }

    #[inline]
    fn span(&self) -> Range<usize> {
        self.start..self.start + self.len
    }
}

/// Item in the priority queue: a proposal to merge two adjacent symbols.
///
/// The heap may contain stale entries after merges, so candidates are
/// validated against the arena before use.
#[derive(Debug)]
struct MergeCandidate {
    /// Score of the vocabulary entry the merged text would match.
    score: Score,

    /// Left symbol of the pair. Also the position tiebreaker.
    left: SymbolIdx,

    /// Right symbol of the pair.
    right: SymbolIdx,

    /// Byte length of the merged text when the candidate was created.
    size: usize,
}

impl PartialEq for MergeCandidate {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for MergeCandidate {}

impl PartialOrd for MergeCandidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Highest score at the top of the max-heap; among equal scores the
/// left-most pair wins.
impl Ord for MergeCandidate {
    fn cmp(&self, other: &Self) -> Ordering {
        self.score
            .total_cmp(&other.score)
            .then_with(|| other.left.cmp(&self.left))
    }
}

/// Result of running the merge loop over one input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct MergeOutcome {
    /// Byte spans of the surviving symbols, left to right.
    pub(crate) pieces: Vec<Range<usize>>,

    /// Number of symbols produced by segmentation.
    pub(crate) initial_symbols: usize,

    /// Number of merges applied.
    pub(crate) merges: usize,
}

/// Byte length of the UTF-8 character starting with `lead`.
///
/// Continuation and invalid lead bytes count as one byte so that
/// segmentation never fails.
#[inline]
pub(crate) fn utf8_len(lead: u8) -> usize {
    const LOOKUP: [usize; 16] = [1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 2, 2, 3, 4];
    LOOKUP[usize::from(lead >> 4)]
}

/// One-shot merge state for a single input. Not shared across calls.
pub(crate) struct SpEncoder<'v, 't> {
    vocab: &'v Vocabulary,
    text: &'t [u8],
    symbols: Vec<Symbol>,
    heap: BinaryHeap<MergeCandidate>,
}

impl<'v, 't> SpEncoder<'v, 't> {
    /// Segments `text` into one symbol per UTF-8 character.
    ///
    /// Segmentation is purely positional: a character with no vocabulary
    /// entry still becomes a symbol.
    pub(crate) fn new(vocab: &'v Vocabulary, text: &'t [u8]) -> Self {
        let mut symbols = Vec::with_capacity(text.len());
        let mut offset = 0;

        while offset < text.len() {
            let len = utf8_len(text[offset]).min(text.len() - offset);
            let idx = symbols.len();
            symbols.push(Symbol {
                start: offset,
                len,
                prev: idx.checked_sub(1),
                next: None,
            });
            offset += len;
            if offset < text.len() {
                symbols[idx].next = Some(idx + 1);
            }
        }

        Self {
            vocab,
            text,
            symbols,
            heap: BinaryHeap::new(),
        }
    }

    /// Runs the merge loop to completion.
    ///
    /// # Time Complexity
    ///
    /// O(N log N) for N initial symbols: every merge removes one live
    /// symbol and pushes at most two candidates.
    pub(crate) fn merge(mut self) -> MergeOutcome {
        let initial_symbols = self.symbols.len();
        let mut merges = 0;

        // seed the heap with every adjacent pair
        for right in 1..self.symbols.len() {
            self.try_add_candidate(Some(right - 1), Some(right));
        }

        while let Some(candidate) = self.heap.pop() {
            if !self.is_live(&candidate) {
                continue;
            }

            let (left, right) = (candidate.left, candidate.right);

            // fold the right symbol into the left one
            let right_next = self.symbols[right].next;
            self.symbols[left].len += self.symbols[right].len;
            self.symbols[left].next = right_next;
            self.symbols[right].len = 0;
            if let Some(next) = right_next {
                self.symbols[next].prev = Some(left);
            }
            merges += 1;

            // the merged symbol may pair with its new neighbours
            self.try_add_candidate(self.symbols[left].prev, Some(left));
            self.try_add_candidate(Some(left), self.symbols[left].next);
        }

        let mut pieces = Vec::with_capacity(initial_symbols - merges);
        let mut cursor = if self.symbols.is_empty() { None } else { Some(0) };
        while let Some(idx) = cursor {
            let symbol = &self.symbols[idx];
            pieces.push(symbol.span());
            cursor = symbol.next;
        }

        MergeOutcome {
            pieces,
            initial_symbols,
            merges,
        }
    }

    /// Pushes a candidate for `(left, right)` if their concatenation is a
    /// vocabulary entry.
    fn try_add_candidate(&mut self, left: Option<SymbolIdx>, right: Option<SymbolIdx>) {
        let (Some(left), Some(right)) = (left, right) else {
            return;
        };

        let start = self.symbols[left].start;
        let size = self.symbols[left].len + self.symbols[right].len;
        let Some(merged) = self.text.get(start..start + size) else {
            return;
        };
        let Some(score) = self.vocab.token_id(merged).and_then(|id| self.vocab.score(id)) else {
            return;
        };

        self.heap.push(MergeCandidate {
            score,
            left,
            right,
            size,
        });
    }

    /// A candidate is live while both symbols survive, are still adjacent,
    /// and together span the same bytes as when it was created.
    fn is_live(&self, candidate: &MergeCandidate) -> bool {
        let (Some(left), Some(right)) = (
            self.symbols.get(candidate.left),
            self.symbols.get(candidate.right),
        ) else {
            return false;
        };

        left.is_alive()
            && right.is_alive()
            && left.next == Some(candidate.right)
            && left.len + right.len == candidate.size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vocab(entries: &[(&str, Score)]) -> Vocabulary {
        Vocabulary::from_entries(entries.iter().map(|&(t, s)| (t.as_bytes().to_vec(), s)))
    }

    fn pieces<'a>(text: &'a str, outcome: &MergeOutcome) -> Vec<&'a str> {
        outcome.pieces.iter().map(|r| &text[r.clone()]).collect()
    }

    #[test]
    fn test_utf8_len() {
        assert_eq!(utf8_len(b'a'), 1);
        assert_eq!(utf8_len(0xC3), 2);
        assert_eq!(utf8_len(0xE2), 3);
        assert_eq!(utf8_len(0xF0), 4);
        // continuation byte treated as a single unit
        assert_eq!(utf8_len(0x80), 1);
    }

    #[test]
    fn test_segments_one_symbol_per_character() {
        let v = vocab(&[]);
        let text = "aé🦙";
        let outcome = SpEncoder::new(&v, text.as_bytes()).merge();
        assert_eq!(pieces(text, &outcome), vec!["a", "é", "🦙"]);
        assert_eq!(outcome.initial_symbols, 3);
        assert_eq!(outcome.merges, 0);
    }

    #[test]
    fn test_empty_input() {
        let v = vocab(&[("a", 0.0)]);
        let outcome = SpEncoder::new(&v, b"").merge();
        assert!(outcome.pieces.is_empty());
        assert_eq!(outcome.initial_symbols, 0);
    }

    #[test]
    fn test_basic_merge_chain() {
        let v = vocab(&[("a", 0.0), ("b", 0.0), ("c", 0.0), ("ab", -1.0), ("abc", -2.0)]);
        let text = "abc";
        let outcome = SpEncoder::new(&v, text.as_bytes()).merge();
        assert_eq!(pieces(text, &outcome), vec!["abc"]);
        assert_eq!(outcome.merges, 2);
    }

    #[test]
    fn test_higher_score_wins() {
        // "bc" outranks "ab", so "a" is left alone
        let v = vocab(&[("ab", -5.0), ("bc", -1.0)]);
        let text = "abc";
        let outcome = SpEncoder::new(&v, text.as_bytes()).merge();
        assert_eq!(pieces(text, &outcome), vec!["a", "bc"]);
    }

    #[test]
    fn test_tie_break_by_position() {
        // "aa" at positions 0 and 1 with equal score: left-most merges first
        let v = vocab(&[("aa", -1.0)]);
        let text = "aaa";
        let outcome = SpEncoder::new(&v, text.as_bytes()).merge();
        assert_eq!(pieces(text, &outcome), vec!["aa", "a"]);
    }

    #[test]
    fn test_stale_candidate_after_left_grows() {
        // "xa" is queued before "ab" merges; once "a" grows into "ab" the
        // queued "xa" candidate must be discarded rather than merging "xab".
        let v = vocab(&[("ab", -1.0), ("xa", -2.0), ("xab", -10.0)]);
        let text = "xab";
        let outcome = SpEncoder::new(&v, text.as_bytes()).merge();
        assert_eq!(pieces(text, &outcome), vec!["xab"]);
        assert_eq!(outcome.merges, 2);

        let v = vocab(&[("ab", -1.0), ("xa", -2.0)]);
        let outcome = SpEncoder::new(&v, text.as_bytes()).merge();
        assert_eq!(pieces(text, &outcome), vec!["x", "ab"]);
    }

    #[test]
    fn test_merge_count_matches_symbol_reduction() {
        let v = vocab(&[("he", -1.0), ("ll", -2.0), ("hell", -3.0), ("hello", -4.0), ("o", 0.0)]);
        let text = "hello world";
        let outcome = SpEncoder::new(&v, text.as_bytes()).merge();
        assert_eq!(outcome.pieces.len(), outcome.initial_symbols - outcome.merges);
        assert_eq!(pieces(text, &outcome)[0], "hello");
    }

    #[test]
    fn test_truncated_utf8_is_clamped() {
        let v = vocab(&[]);
        // lead byte of a 4-byte sequence with only one continuation byte
        let outcome = SpEncoder::new(&v, &[b'a', 0xF0, 0x9F]).merge();
        assert_eq!(outcome.pieces, vec![0..1, 1..3]);
    }

    #[test]
    fn test_candidate_ordering() {
        let low = MergeCandidate { score: -3.0, left: 0, right: 1, size: 2 };
        let high = MergeCandidate { score: -1.0, left: 5, right: 6, size: 2 };
        let high_left = MergeCandidate { score: -1.0, left: 2, right: 3, size: 2 };

        let mut heap = BinaryHeap::from(vec![low, high, high_left]);
        let order: Vec<SymbolIdx> = std::iter::from_fn(|| heap.pop().map(|c| c.left)).collect();
        assert_eq!(order, vec![2, 5, 0]);
    }
}
