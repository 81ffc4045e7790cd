#![allow(dead_code)]

use sptok::{Score, Vocabulary};

/// Id of the first learned piece in [`small_vocab`].
pub const FIRST_LEARNED: u32 = 259;

/// `<unk>`, `<s>`, `</s>`, `<0x00>`..`<0xFF>`, then learned pieces: every
/// lowercase letter and the space, followed by a few multi-character merges.
pub fn small_vocab() -> Vocabulary {
    let mut entries: Vec<(Vec<u8>, Score)> = vec![
        (b"<unk>".to_vec(), 0.0),
        (b"<s>".to_vec(), 0.0),
        (b"</s>".to_vec(), 0.0),
    ];
    entries.extend((0..=255u8).map(|b| (format!("<0x{b:02X}>").into_bytes(), 0.0)));

    let mut learned: Vec<(String, Score)> = ('a'..='z').map(|c| (c.to_string(), -1000.0)).collect();
    learned.push((" ".into(), -1000.0));
    learned.extend(
        [
            ("th", -1.0),
            ("he", -2.0),
            ("the", -3.0),
            (" th", -3.5),
            (" the", -4.0),
            ("in", -5.0),
            ("an", -5.0),
            ("ing", -6.0),
            (" a", -7.0),
            ("aa", -8.0),
            ("é", -9.0),
        ]
        .map(|(t, s)| (t.to_string(), s)),
    );
    entries.extend(learned.into_iter().map(|(t, s)| (t.into_bytes(), s)));

    Vocabulary::from_entries(entries)
}
