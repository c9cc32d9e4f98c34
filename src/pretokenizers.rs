//! Pre-tokenizer - Split text into words before BPE
//!
//! Letter runs stay whole, every other visible codepoint becomes its own word,
//! and each whitespace run is folded into a boundary marker prefixed to the
//! word that follows it (Metaspace style).

use regex::Regex;
use std::sync::LazyLock;

/// Marker standing in for a whitespace run
pub const BOUNDARY_MARKER: char = '▁';

/// Whitespace runs, letter runs (letters + combining marks), or one other codepoint
static WORD_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[\s\x{2581}]+|[\p{L}\p{M}]+|[^\s\x{2581}\p{L}\p{M}]")
        .expect("word pattern must compile")
});

/// A pre-tokenized word plus the byte span each of its codepoints came from.
///
/// A leading boundary marker covers the whole whitespace run it replaced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Split {
    pub word: String,
    pub offsets: Vec<(usize, usize)>,
}

/// Word splitter shared by training and encoding
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PreTokenizer;

impl PreTokenizer {
    pub fn new() -> Self {
        Self
    }

    /// The marker used for whitespace
    pub fn boundary(&self) -> char {
        BOUNDARY_MARKER
    }

    /// Pre-tokenize text into words
    pub fn split(&self, text: &str) -> Vec<String> {
        self.split_with_offsets(text)
            .into_iter()
            .map(|split| split.word)
            .collect()
    }

    /// Pre-tokenize text, keeping per-codepoint byte offsets into `text`
    pub fn split_with_offsets(&self, text: &str) -> Vec<Split> {
        let mut splits = Vec::new();
        // Whitespace run waiting to be attached to the next word
        let mut pending: Option<(usize, usize)> = None;

        for m in WORD_PATTERN.find_iter(text) {
            let piece = m.as_str();
            if piece.starts_with(is_space) {
                pending = Some((m.start(), m.end()));
                continue;
            }

            let mut word = String::with_capacity(piece.len() + BOUNDARY_MARKER.len_utf8());
            let mut offsets = Vec::with_capacity(piece.len() + 1);

            if let Some(span) = pending.take() {
                word.push(BOUNDARY_MARKER);
                offsets.push(span);
            }

            for (i, c) in piece.char_indices() {
                word.push(c);
                offsets.push((m.start() + i, m.start() + i + c.len_utf8()));
            }

            splits.push(Split { word, offsets });
        }

        // Trailing whitespace becomes a bare marker
        if let Some(span) = pending {
            splits.push(Split {
                word: BOUNDARY_MARKER.to_string(),
                offsets: vec![span],
            });
        }

        splits
    }

    /// The text `decode(encode(text))` reproduces: every whitespace run
    /// collapsed to a single space
    pub fn normalize(&self, text: &str) -> String {
        self.split(text)
            .concat()
            .chars()
            .map(|c| if c == BOUNDARY_MARKER { ' ' } else { c })
            .collect()
    }
}

fn is_space(c: char) -> bool {
    c.is_whitespace() || c == BOUNDARY_MARKER
}
