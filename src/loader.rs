//! Vocabulary loading and saving.
//!
//! Three on-disk layouts are recognised from their first bytes. All integers
//! are little-endian.
//!
//! - Native: `b"SPVB"`, `u32` version, `u32` count, then `count` records of
//!   `u32` text length, text bytes, `f32` score.
//! - ggml container (`ggjt`/`ggmf` with a `u32` version, or legacy `ggml`):
//!   seven `i32` hyper-parameters starting with `n_vocab`, then `n_vocab`
//!   records. Legacy files carry no scores. Tensor data after the records is
//!   ignored.
//! - Text: a `#count N` header line, then `N` lines of `piece<TAB>score`,
//!   each terminated by a newline.
//!
//! A loader either returns the whole vocabulary or an error; nothing is
//! silently truncated or padded.

use std::{
    fs,
    io::{BufWriter, Write},
    path::{Path, PathBuf},
};

use crate::{
    error::LoadError,
    types::{ByteSeq, Score},
    vocab::Vocabulary,
};

pub const NATIVE_MAGIC: [u8; 4] = *b"SPVB";
pub const NATIVE_VERSION: u32 = 1;

const GGJT_MAGIC: u32 = 0x6767_6a74;
const GGMF_MAGIC: u32 = 0x6767_6d66;
const GGML_MAGIC: u32 = 0x6767_6d6c;
const GGML_N_HPARAMS: usize = 7;

/// First line of a text vocabulary, followed by the record count.
const TEXT_COUNT_PREFIX: &str = "#count ";

/// Label used in errors for vocabularies parsed from memory.
const MEMORY_PATH: &str = "<memory>";

/// On-disk layout of a vocabulary file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VocabFormat {
    Native,
    Ggml { scored: bool },
    Text,
}

impl VocabFormat {
    /// Detects the layout from the leading bytes.
    pub fn detect(data: &[u8]) -> Self {
        if data.starts_with(&NATIVE_MAGIC) {
            return Self::Native;
        }
        match data.get(..4).map(|m| u32::from_le_bytes([m[0], m[1], m[2], m[3]])) {
            Some(GGJT_MAGIC | GGMF_MAGIC) => Self::Ggml { scored: true },
            Some(GGML_MAGIC) => Self::Ggml { scored: false },
            _ => Self::Text,
        }
    }
}

/// Structural failure found while parsing, before a path is attached.
#[derive(Debug)]
enum ParseError {
    Corrupt { offset: usize, reason: String },
    Count { expected: usize, actual: usize },
}

impl ParseError {
    fn corrupt(offset: usize, reason: impl Into<String>) -> Self {
        Self::Corrupt {
            offset,
            reason: reason.into(),
        }
    }

    fn with_path(self, path: &Path) -> LoadError {
        let path = path.to_path_buf();
        match self {
            Self::Corrupt { offset, reason } => LoadError::CorruptFormat {
                path,
                offset,
                reason,
            },
            Self::Count { expected, actual } => LoadError::CountMismatch {
                path,
                expected,
                actual,
            },
        }
    }
}

/// Bounds-checked little-endian reader over a byte slice.
struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn at_end(&self) -> bool {
        self.pos >= self.data.len()
    }

    fn take(&mut self, n: usize, what: &str) -> Result<&'a [u8], ParseError> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|&end| end <= self.data.len())
            .ok_or_else(|| {
                ParseError::corrupt(
                    self.pos,
                    format!("truncated {what}: need {n} bytes, {} left", self.data.len() - self.pos),
                )
            })?;
        let data = self.data;
        let bytes = &data[self.pos..end];
        self.pos = end;
        Ok(bytes)
    }

    fn u32(&mut self, what: &str) -> Result<u32, ParseError> {
        let b = self.take(4, what)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn i32(&mut self, what: &str) -> Result<i32, ParseError> {
        let b = self.take(4, what)?;
        Ok(i32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn f32(&mut self, what: &str) -> Result<f32, ParseError> {
        let b = self.take(4, what)?;
        Ok(f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    /// Reads one `(len, text[, score])` record.
    fn record(&mut self, scored: bool) -> Result<(ByteSeq, Score), ParseError> {
        let len = self.u32("text length")? as usize;
        let text = self.take(len, "token text")?.to_vec();
        let score = if scored { self.f32("score")? } else { 0.0 };
        Ok((text, score))
    }
}

/// Reads `count` records. A clean end of input on a record boundary is a
/// count mismatch; an end inside a record is corruption.
fn read_records(
    cur: &mut Cursor<'_>,
    count: usize,
    scored: bool,
) -> Result<Vec<(ByteSeq, Score)>, ParseError> {
    // the declared count is untrusted; cap the pre-allocation by what the
    // remaining bytes could hold
    let min_record = if scored { 8 } else { 4 };
    let mut entries = Vec::with_capacity(count.min(cur.data.len() / min_record));

    for _ in 0..count {
        if cur.at_end() {
            return Err(ParseError::Count {
                expected: count,
                actual: entries.len(),
            });
        }
        entries.push(cur.record(scored)?);
    }
    Ok(entries)
}

fn parse_native(data: &[u8]) -> Result<Vec<(ByteSeq, Score)>, ParseError> {
    let mut cur = Cursor::new(data);
    cur.take(4, "magic")?;
    let version = cur.u32("version")?;
    if version != NATIVE_VERSION {
        return Err(ParseError::corrupt(4, format!("unsupported version {version}")));
    }
    let count = cur.u32("entry count")? as usize;
    let entries = read_records(&mut cur, count, true)?;

    if !cur.at_end() {
        // trailing whole records mean the header under-declares the count
        let trailing_start = cur.pos;
        let mut extra = 0usize;
        while !cur.at_end() {
            cur.record(true).map_err(|_| {
                ParseError::corrupt(trailing_start, "trailing bytes after last record")
            })?;
            extra += 1;
        }
        return Err(ParseError::Count {
            expected: count,
            actual: count + extra,
        });
    }

    Ok(entries)
}

fn parse_ggml(data: &[u8], scored: bool) -> Result<Vec<(ByteSeq, Score)>, ParseError> {
    let mut cur = Cursor::new(data);
    let magic = cur.u32("magic")?;
    if magic != GGML_MAGIC {
        cur.u32("version")?;
    }
    let hparams_at = cur.pos;
    let mut hparams = [0i32; GGML_N_HPARAMS];
    for h in &mut hparams {
        *h = cur.i32("hyper-parameters")?;
    }
    let n_vocab = usize::try_from(hparams[0])
        .map_err(|_| ParseError::corrupt(hparams_at, format!("negative n_vocab {}", hparams[0])))?;

    read_records(&mut cur, n_vocab, scored)
}

fn parse_text(data: &[u8]) -> Result<Vec<(ByteSeq, Score)>, ParseError> {
    let text = std::str::from_utf8(data)
        .map_err(|e| ParseError::corrupt(e.valid_up_to(), "text vocabulary is not valid UTF-8"))?;

    let (header, body) = text
        .split_once('\n')
        .ok_or_else(|| ParseError::corrupt(0, "missing '#count N' header line"))?;
    let count: usize = header
        .trim_end_matches('\r')
        .strip_prefix(TEXT_COUNT_PREFIX)
        .and_then(|n| n.trim().parse().ok())
        .ok_or_else(|| ParseError::corrupt(0, format!("expected '#count N' header, found {header:?}")))?;

    // a final line without its newline was cut short
    if !body.is_empty() && !body.ends_with('\n') {
        let last_start = body.rfind('\n').map_or(0, |i| i + 1);
        return Err(ParseError::corrupt(
            header.len() + 1 + last_start,
            "last line is not newline-terminated",
        ));
    }

    // shortest record is "a\t0\n"
    let mut entries = Vec::with_capacity(count.min(body.len() / 4));
    let mut offset = header.len() + 1;
    for (i, raw) in body.split_inclusive('\n').enumerate() {
        let lineno = i + 2;
        let line = raw.trim_end_matches(['\n', '\r']);
        let at = offset;
        offset += raw.len();
        if line.is_empty() {
            continue;
        }

        let (piece, score) = line.rsplit_once('\t').ok_or_else(|| {
            ParseError::corrupt(at, format!("line {lineno}: expected 'piece<TAB>score'"))
        })?;
        let score: Score = score.trim().parse().map_err(|_| {
            ParseError::corrupt(at, format!("line {lineno}: invalid score {score:?}"))
        })?;
        entries.push((piece.as_bytes().to_vec(), score));
    }

    if entries.len() != count {
        return Err(ParseError::Count {
            expected: count,
            actual: entries.len(),
        });
    }
    Ok(entries)
}

/// Parses a vocabulary held in memory, detecting its format.
pub fn parse_vocab(data: &[u8]) -> Result<Vocabulary, LoadError> {
    parse_at(data, Path::new(MEMORY_PATH)).map(|(vocab, _)| vocab)
}

fn parse_at(data: &[u8], path: &Path) -> Result<(Vocabulary, VocabFormat), LoadError> {
    let format = VocabFormat::detect(data);
    let entries = match format {
        VocabFormat::Native => parse_native(data),
        VocabFormat::Ggml { scored } => parse_ggml(data, scored),
        VocabFormat::Text => parse_text(data),
    }
    .map_err(|e| e.with_path(path))?;

    Ok((Vocabulary::from_entries(entries), format))
}

/// Loads a vocabulary file.
///
/// # Errors
///
/// [`LoadError::IoFailure`] if the file cannot be read,
/// [`LoadError::CorruptFormat`] for truncated or malformed records, and
/// [`LoadError::CountMismatch`] when the declared count disagrees with the
/// records present.
pub fn load_vocab(path: impl AsRef<Path>) -> Result<Vocabulary, LoadError> {
    let path = path.as_ref();
    let data = fs::read(path).map_err(|source| LoadError::IoFailure {
        path: path.to_path_buf(),
        source,
    })?;

    let (vocab, format) = parse_at(&data, path)?;
    tracing::info!(
        path = %path.display(),
        ?format,
        entries = vocab.len(),
        "loaded vocabulary"
    );
    Ok(vocab)
}

/// Loads a vocabulary and enforces its size contract.
///
/// # Errors
///
/// Everything [`load_vocab`] returns, plus [`LoadError::CountMismatch`] when
/// the vocabulary does not hold exactly `expected` entries.
pub fn load_vocab_expecting(
    path: impl AsRef<Path>,
    expected: usize,
) -> Result<Vocabulary, LoadError> {
    let path = path.as_ref();
    let vocab = load_vocab(path)?;
    if vocab.len() != expected {
        return Err(LoadError::CountMismatch {
            path: PathBuf::from(path),
            expected,
            actual: vocab.len(),
        });
    }
    Ok(vocab)
}

/// Serializes a vocabulary in the native format.
pub fn encode_native(vocab: &Vocabulary) -> Vec<u8> {
    let body: usize = vocab.iter().map(|(_, e)| 8 + e.text.len()).sum();
    let mut out = Vec::with_capacity(12 + body);
    out.extend_from_slice(&NATIVE_MAGIC);
    out.extend_from_slice(&NATIVE_VERSION.to_le_bytes());
    out.extend_from_slice(&(vocab.len() as u32).to_le_bytes());
    for (_, entry) in vocab.iter() {
        out.extend_from_slice(&(entry.text.len() as u32).to_le_bytes());
        out.extend_from_slice(&entry.text);
        out.extend_from_slice(&entry.score.to_le_bytes());
    }
    out
}

/// Writes a vocabulary to `path` in the native format.
pub fn save_vocab(path: impl AsRef<Path>, vocab: &Vocabulary) -> Result<(), LoadError> {
    let path = path.as_ref();
    let io_err = |source| LoadError::IoFailure {
        path: path.to_path_buf(),
        source,
    };

    let file = fs::File::create(path).map_err(io_err)?;
    let mut writer = BufWriter::new(file);
    writer.write_all(&encode_native(vocab)).map_err(io_err)?;
    writer.flush().map_err(io_err)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_vocab() -> Vocabulary {
        Vocabulary::from_entries(vec![
            (b"<unk>".to_vec(), 0.0),
            (b"<s>".to_vec(), 0.0),
            (" World".as_bytes().to_vec(), -2.5),
            ("\u{2581}h\u{e9}".as_bytes().to_vec(), -7.25),
        ])
    }

    fn record(out: &mut Vec<u8>, text: &[u8], score: Option<f32>) {
        out.extend_from_slice(&(text.len() as u32).to_le_bytes());
        out.extend_from_slice(text);
        if let Some(s) = score {
            out.extend_from_slice(&s.to_le_bytes());
        }
    }

    fn ggml_file(magic: u32, n_vocab: i32, records: &[(&[u8], Option<f32>)]) -> Vec<u8> {
        let mut out = magic.to_le_bytes().to_vec();
        if magic != GGML_MAGIC {
            out.extend_from_slice(&1u32.to_le_bytes());
        }
        out.extend_from_slice(&n_vocab.to_le_bytes());
        for h in [4096i32, 256, 32, 32, 128, 1] {
            out.extend_from_slice(&h.to_le_bytes());
        }
        for &(text, score) in records {
            record(&mut out, text, score);
        }
        out
    }

    #[test]
    fn test_native_round_trip() {
        let vocab = sample_vocab();
        let parsed = parse_vocab(&encode_native(&vocab)).expect("native vocab should parse");

        assert_eq!(parsed.len(), 4);
        for ((_, a), (_, b)) in vocab.iter().zip(parsed.iter()) {
            assert_eq!(a, b);
        }
    }

    #[test]
    fn test_native_truncated_record_is_corrupt() {
        let data = encode_native(&sample_vocab());
        let err = parse_vocab(&data[..data.len() - 2]).expect_err("truncation must fail");
        assert!(matches!(err, LoadError::CorruptFormat { .. }), "{err}");
    }

    #[test]
    fn test_native_declared_count_too_high() {
        let mut data = encode_native(&sample_vocab());
        data[8..12].copy_from_slice(&5u32.to_le_bytes());
        let err = parse_vocab(&data).expect_err("missing records must fail");
        assert!(
            matches!(err, LoadError::CountMismatch { expected: 5, actual: 4, .. }),
            "{err}"
        );
    }

    #[test]
    fn test_native_declared_count_too_low() {
        let mut data = encode_native(&sample_vocab());
        data[8..12].copy_from_slice(&3u32.to_le_bytes());
        let err = parse_vocab(&data).expect_err("extra records must fail");
        assert!(
            matches!(err, LoadError::CountMismatch { expected: 3, actual: 4, .. }),
            "{err}"
        );
    }

    #[test]
    fn test_native_trailing_garbage_is_corrupt() {
        let mut data = encode_native(&sample_vocab());
        data.extend_from_slice(&[1, 2]);
        let err = parse_vocab(&data).expect_err("garbage must fail");
        assert!(matches!(err, LoadError::CorruptFormat { .. }), "{err}");
    }

    #[test]
    fn test_native_bad_version() {
        let mut data = encode_native(&sample_vocab());
        data[4..8].copy_from_slice(&9u32.to_le_bytes());
        assert!(matches!(
            parse_vocab(&data),
            Err(LoadError::CorruptFormat { offset: 4, .. })
        ));
    }

    #[test]
    fn test_huge_declared_count_does_not_allocate() {
        let mut data = NATIVE_MAGIC.to_vec();
        data.extend_from_slice(&NATIVE_VERSION.to_le_bytes());
        data.extend_from_slice(&u32::MAX.to_le_bytes());
        let err = parse_vocab(&data).expect_err("empty body must fail");
        assert!(matches!(err, LoadError::CountMismatch { actual: 0, .. }), "{err}");
    }

    #[test]
    fn test_ggjt_container() {
        let data = ggml_file(
            GGJT_MAGIC,
            3,
            &[(b"", Some(0.0)), (b" Hello", Some(-1.5)), (b"!", Some(-3.0))],
        );
        assert_eq!(VocabFormat::detect(&data), VocabFormat::Ggml { scored: true });

        let vocab = parse_vocab(&data).expect("ggjt vocab should parse");
        assert_eq!(vocab.len(), 3);
        assert_eq!(vocab.token_id(b" Hello"), Some(1));
        assert_eq!(vocab.score(2), Some(-3.0));
    }

    #[test]
    fn test_ggml_tensor_data_is_ignored() {
        let mut data = ggml_file(GGMF_MAGIC, 1, &[(b"a", Some(-1.0))]);
        data.extend_from_slice(&[0xAB; 64]);
        let vocab = parse_vocab(&data).expect("trailing tensors are allowed");
        assert_eq!(vocab.len(), 1);
    }

    #[test]
    fn test_legacy_ggml_has_no_scores() {
        let data = ggml_file(GGML_MAGIC, 2, &[(b"a", None), (b"b", None)]);
        let vocab = parse_vocab(&data).expect("legacy vocab should parse");
        assert_eq!(vocab.score(1), Some(0.0));
    }

    #[test]
    fn test_ggml_missing_records() {
        let data = ggml_file(GGJT_MAGIC, 3, &[(b"a", Some(-1.0))]);
        assert!(matches!(
            parse_vocab(&data),
            Err(LoadError::CountMismatch { expected: 3, actual: 1, .. })
        ));
    }

    #[test]
    fn test_ggml_negative_vocab() {
        let data = ggml_file(GGJT_MAGIC, -1, &[]);
        assert!(matches!(parse_vocab(&data), Err(LoadError::CorruptFormat { .. })));
    }

    const TEXT_VOCAB: &str = "#count 5\n<unk>\t0\n<s>\t0\n</s>\t0\nab\t-1.25\ncd\t-2\n";

    #[test]
    fn test_text_format() {
        let data = "#count 3\n<unk>\t0\n<s>\t0\n\u{2581}the\t-3.5\r\n\n";
        let vocab = parse_vocab(data.as_bytes()).expect("text vocab should parse");
        assert_eq!(vocab.len(), 3);
        assert_eq!(vocab.token_id("\u{2581}the".as_bytes()), Some(2));
        assert_eq!(vocab.score(2), Some(-3.5));

        let vocab = parse_vocab(TEXT_VOCAB.as_bytes()).expect("text vocab should parse");
        assert_eq!(vocab.len(), 5);
        assert_eq!(vocab.score(3), Some(-1.25));
    }

    #[test]
    fn test_text_format_bad_line() {
        let err = parse_vocab(b"#count 2\na\t0\nbroken\n").expect_err("missing tab must fail");
        match err {
            LoadError::CorruptFormat { offset, reason, .. } => {
                assert_eq!(offset, 13);
                assert!(reason.contains("line 3"), "{reason}");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_text_format_requires_count_header() {
        let err = parse_vocab(b"a\t0\nb\t-1\n").expect_err("headerless text must fail");
        assert!(matches!(err, LoadError::CorruptFormat { offset: 0, .. }), "{err}");

        let err = parse_vocab(b"#count many\na\t0\n").expect_err("bad count must fail");
        assert!(matches!(err, LoadError::CorruptFormat { offset: 0, .. }), "{err}");
    }

    #[test]
    fn test_text_cut_on_line_boundary_is_count_mismatch() {
        let cut = TEXT_VOCAB.strip_suffix("cd\t-2\n").expect("fixture ends with cd");
        let err = parse_vocab(cut.as_bytes()).expect_err("missing line must fail");
        assert!(
            matches!(err, LoadError::CountMismatch { expected: 5, actual: 4, .. }),
            "{err}"
        );
    }

    #[test]
    fn test_text_cut_inside_line_is_corrupt() {
        // "-1.25" cut to "-1.2" would still parse as a score
        let at = TEXT_VOCAB.find("-1.25").expect("fixture has -1.25") + 4;
        let err = parse_vocab(&TEXT_VOCAB.as_bytes()[..at]).expect_err("cut line must fail");
        assert!(matches!(err, LoadError::CorruptFormat { .. }), "{err}");

        // cut inside the header
        let err = parse_vocab(b"#cou").expect_err("cut header must fail");
        assert!(matches!(err, LoadError::CorruptFormat { .. }), "{err}");
    }

    #[test]
    fn test_text_extra_lines_are_count_mismatch() {
        let data = format!("{TEXT_VOCAB}ef\t-3\n");
        let err = parse_vocab(data.as_bytes()).expect_err("extra line must fail");
        assert!(
            matches!(err, LoadError::CountMismatch { expected: 5, actual: 6, .. }),
            "{err}"
        );
    }

    #[test]
    fn test_missing_file_is_io_failure() {
        let err = load_vocab("/nonexistent/sptok/vocab.bin").expect_err("missing file must fail");
        assert!(matches!(err, LoadError::IoFailure { .. }));
        assert_eq!(err.path(), Path::new("/nonexistent/sptok/vocab.bin"));
    }
}
