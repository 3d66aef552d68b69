//! Line sequences with comparison-only normalization.
//!
//! A [`LineSequence`] splits a byte buffer into logical lines. Each line keeps
//! its original bytes (terminator included) for output, and a simplified key
//! produced by a [`Simplifier`] that is used only for equality.

use std::io::Read;
use std::ops::Range;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::errors::MergeError;

// ---------------------------------------------------------------------------
// Options and simplifier
// ---------------------------------------------------------------------------

/// Comparison options for diffs and merges. Never affects emitted bytes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffOptions {
    /// Treat `\n`, `\r\n` and `\r` terminators as equal.
    #[serde(default)]
    pub ignore_eol_style: bool,
    /// Ignore all whitespace inside a line.
    #[serde(default)]
    pub ignore_all_whitespace: bool,
    /// Treat any run of whitespace as a single space.
    #[serde(default)]
    pub ignore_amount_of_whitespace: bool,
}

/// How whitespace inside a line is folded into the comparison key.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum WhitespaceMode {
    #[default]
    Keep,
    Reduce,
    Skip,
}

/// EOL folding composed with whitespace folding.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Simplifier {
    fold_eol: bool,
    whitespace: WhitespaceMode,
}

impl Simplifier {
    pub fn new(fold_eol: bool, whitespace: WhitespaceMode) -> Self {
        Self {
            fold_eol,
            whitespace,
        }
    }

    /// Build the simplifier for a set of diff options. Skipping all
    /// whitespace wins over reducing it.
    pub fn from_options(options: &DiffOptions) -> Self {
        let whitespace = if options.ignore_all_whitespace {
            WhitespaceMode::Skip
        } else if options.ignore_amount_of_whitespace {
            WhitespaceMode::Reduce
        } else {
            WhitespaceMode::Keep
        };
        Self::new(options.ignore_eol_style, whitespace)
    }

    /// `true` when keys are the raw line bytes.
    pub fn is_identity(&self) -> bool {
        !self.fold_eol && self.whitespace == WhitespaceMode::Keep
    }

    /// Compute the comparison key for one line (terminator included).
    pub fn simplify(&self, line: &[u8]) -> Vec<u8> {
        let (body, eol) = split_terminator(line);
        let mut key = Vec::with_capacity(line.len());

        match self.whitespace {
            WhitespaceMode::Keep => key.extend_from_slice(body),
            WhitespaceMode::Skip => {
                key.extend(body.iter().copied().filter(|b| !b.is_ascii_whitespace()));
            }
            WhitespaceMode::Reduce => {
                let mut in_space = false;
                for &b in body {
                    if b.is_ascii_whitespace() {
                        in_space = true;
                        continue;
                    }
                    if in_space {
                        key.push(b' ');
                        in_space = false;
                    }
                    key.push(b);
                }
                // trailing whitespace is dropped
            }
        }

        if self.fold_eol && !eol.is_empty() {
            key.push(b'\n');
        } else {
            key.extend_from_slice(eol);
        }
        key
    }
}

/// Split a line into its body and its terminator (`\r\n`, `\n`, `\r` or empty).
pub(crate) fn split_terminator(line: &[u8]) -> (&[u8], &[u8]) {
    if line.ends_with(b"\r\n") {
        line.split_at(line.len() - 2)
    } else if line.ends_with(b"\n") || line.ends_with(b"\r") {
        line.split_at(line.len() - 1)
    } else {
        (line, &[])
    }
}

/// Byte ranges of the lines in `data`. A line ends after `\n`, `\r\n` or a
/// lone `\r`; the last line may be unterminated.
pub fn line_spans(data: &[u8]) -> Vec<Range<usize>> {
    let mut spans = Vec::new();
    let mut start = 0;
    let mut i = 0;
    while i < data.len() {
        match data[i] {
            b'\n' => {
                spans.push(start..i + 1);
                start = i + 1;
            }
            b'\r' => {
                let end = if data.get(i + 1) == Some(&b'\n') {
                    i + 2
                } else {
                    i + 1
                };
                spans.push(start..end);
                start = end;
                i = end;
                continue;
            }
            _ => {}
        }
        i += 1;
    }
    if start < data.len() {
        spans.push(start..data.len());
    }
    spans
}

// ---------------------------------------------------------------------------
// Lines
// ---------------------------------------------------------------------------

/// One logical line: the original bytes and the comparison key.
#[derive(Debug, Clone, Copy)]
pub struct Line<'a> {
    content: &'a [u8],
    key: &'a [u8],
}

impl<'a> Line<'a> {
    /// Original bytes, terminator included.
    pub fn content(&self) -> &'a [u8] {
        self.content
    }

    pub fn key(&self) -> &'a [u8] {
        self.key
    }

    pub fn len(&self) -> usize {
        self.content.len()
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }
}

impl PartialEq for Line<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for Line<'_> {}

/// An indexable, read-only sequence of lines materialized from one input.
#[derive(Debug, Clone)]
pub struct LineSequence {
    data: Vec<u8>,
    spans: Vec<Range<usize>>,
    /// Simplified keys; `None` when the simplifier is the identity.
    keys: Option<Vec<Vec<u8>>>,
}

impl LineSequence {
    pub fn from_bytes(data: impl Into<Vec<u8>>, simplifier: &Simplifier) -> Self {
        let data = data.into();
        let spans = line_spans(&data);
        let keys = if simplifier.is_identity() {
            None
        } else {
            Some(
                spans
                    .iter()
                    .map(|span| simplifier.simplify(&data[span.clone()]))
                    .collect(),
            )
        };
        Self { data, spans, keys }
    }

    pub fn from_reader<R: Read>(mut reader: R, simplifier: &Simplifier) -> std::io::Result<Self> {
        let mut data = Vec::new();
        reader.read_to_end(&mut data)?;
        Ok(Self::from_bytes(data, simplifier))
    }

    /// Read a whole file. The handle is closed before this returns.
    pub fn open(path: &Path, simplifier: &Simplifier) -> Result<Self, MergeError> {
        let file = std::fs::File::open(path).map_err(|e| MergeError::io(path, e))?;
        Self::from_reader(file, simplifier).map_err(|e| MergeError::io(path, e))
    }

    pub fn len(&self) -> usize {
        self.spans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.spans.is_empty()
    }

    /// Line at `index`. Panics when out of range, like slice indexing.
    pub fn line(&self, index: usize) -> Line<'_> {
        let content = &self.data[self.spans[index].clone()];
        let key = match &self.keys {
            Some(keys) => keys[index].as_slice(),
            None => content,
        };
        Line { content, key }
    }

    pub fn content(&self, index: usize) -> &[u8] {
        self.line(index).content()
    }

    pub fn key(&self, index: usize) -> &[u8] {
        self.line(index).key()
    }

    /// Comparison keys of all lines, in order.
    pub fn keys(&self) -> Vec<&[u8]> {
        (0..self.len()).map(|i| self.key(i)).collect()
    }

    /// The raw bytes the sequence was built from.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_spans_mixed_terminators() {
        let data = b"a\nb\r\nc\rd";
        let spans = line_spans(data);
        assert_eq!(spans, vec![0..2, 2..5, 5..7, 7..8]);
    }

    #[test]
    fn test_empty_input_has_no_lines() {
        let seq = LineSequence::from_bytes(Vec::new(), &Simplifier::default());
        assert!(seq.is_empty());
        assert_eq!(seq.len(), 0);
    }

    #[test]
    fn test_content_keeps_original_bytes() {
        let simplifier = Simplifier::new(true, WhitespaceMode::Skip);
        let seq = LineSequence::from_bytes(b"  A a\r\nBb\n".to_vec(), &simplifier);
        assert_eq!(seq.content(0), b"  A a\r\n");
        assert_eq!(seq.key(0), b"Aa\n");
        assert_eq!(seq.key(1), b"Bb\n");
    }

    #[test]
    fn test_eol_folding_equates_terminators() {
        let simplifier = Simplifier::from_options(&DiffOptions {
            ignore_eol_style: true,
            ..Default::default()
        });
        let left = LineSequence::from_bytes(b"x\r\n".to_vec(), &simplifier);
        let right = LineSequence::from_bytes(b"x\r".to_vec(), &simplifier);
        assert_eq!(left.line(0), right.line(0));

        // an unterminated line stays different
        let bare = LineSequence::from_bytes(b"x".to_vec(), &simplifier);
        assert_ne!(left.line(0), bare.line(0));
    }

    #[test]
    fn test_whitespace_reduce() {
        let simplifier = Simplifier::new(false, WhitespaceMode::Reduce);
        assert_eq!(simplifier.simplify(b"a   b \t\n"), b"a b\n");
        assert_eq!(simplifier.simplify(b"  a\n"), b" a\n");
    }

    #[test]
    fn test_skip_wins_over_reduce() {
        let simplifier = Simplifier::from_options(&DiffOptions {
            ignore_eol_style: false,
            ignore_all_whitespace: true,
            ignore_amount_of_whitespace: true,
        });
        assert_eq!(simplifier.simplify(b" a b\n"), b"ab\n");
    }

    #[test]
    fn test_from_reader() {
        let seq = LineSequence::from_reader(&b"one\ntwo"[..], &Simplifier::default()).unwrap();
        assert_eq!(seq.len(), 2);
        assert_eq!(seq.content(1), b"two");
    }
}
