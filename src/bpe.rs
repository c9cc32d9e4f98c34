//! BPE (Byte Pair Encoding) core algorithm
//!
//! [`BpeTokenizer`] is the immutable context built once from a trained or
//! loaded artifact. It is `Send + Sync`; share it by reference across threads.

use crate::decoders::Decoder;
use crate::encoding::Encoding;
use crate::error::{Error, Result};
use crate::pretokenizers::PreTokenizer;
use crate::serialization;
use crate::vocab::{Vocab, UNKNOWN_ID};
use hashbrown::HashMap;
use log::debug;
use rayon::prelude::*;
use std::path::Path;
use std::sync::Arc;

/// Merge rule learned during training: `left + right -> merged`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeRule {
    pub left: Arc<str>,
    pub right: Arc<str>,
    pub merged: Arc<str>,
}

/// Rank and output of a merge, keyed by its input pair
#[derive(Debug, Clone, Copy)]
struct MergeOp {
    rank: usize,
    new_id: u32,
}

/// A symbol in flight during encoding, with its source byte span
#[derive(Debug, Clone, Copy)]
struct Piece {
    id: u32,
    start: usize,
    end: usize,
}

/// BPE Tokenizer core
#[derive(Debug, Clone)]
pub struct BpeTokenizer {
    vocab: Vocab,
    /// Merge operations in training order
    merges: Vec<MergeRule>,
    alphabet_size: usize,
    /// Single-codepoint symbols -> id
    alphabet: HashMap<char, u32>,
    /// (left id, right id) -> merge rank (lower = applied earlier)
    merge_ranks: HashMap<(u32, u32), MergeOp>,
    pre_tokenizer: PreTokenizer,
    decoder: Decoder,
}

impl BpeTokenizer {
    /// Assemble from a vocabulary whose last `merges.len()` entries are the
    /// merged symbols, in merge order. Callers guarantee that layout.
    pub(crate) fn new(vocab: Vocab, merges: Vec<MergeRule>) -> Self {
        let alphabet_size = vocab.len().saturating_sub(merges.len());

        let alphabet: HashMap<char, u32> = vocab
            .iter()
            .take(alphabet_size)
            .filter_map(|(id, symbol)| symbol.chars().next().map(|c| (c, id)))
            .collect();

        let mut merge_ranks = HashMap::with_capacity(merges.len());
        for (rank, rule) in merges.iter().enumerate() {
            if let (Some(left), Some(right), Some(new_id)) = (
                vocab.get_id(&rule.left),
                vocab.get_id(&rule.right),
                vocab.get_id(&rule.merged),
            ) {
                merge_ranks.insert((left, right), MergeOp { rank, new_id });
            }
        }

        let pre_tokenizer = PreTokenizer::new();
        Self {
            vocab,
            merges,
            alphabet_size,
            alphabet,
            merge_ranks,
            pre_tokenizer,
            decoder: Decoder::new(pre_tokenizer.boundary()),
        }
    }

    /// Load a tokenizer artifact written by [`BpeTokenizer::save`]
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        serialization::load(path)
    }

    /// Persist this tokenizer atomically
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        serialization::save(self, path)
    }

    /// Encode text to token IDs using BPE
    pub fn encode(&self, text: &str) -> Vec<u32> {
        self.encode_to_encoding(text).ids
    }

    /// Encode text, keeping per-token source spans and unknown-symbol counts
    pub fn encode_to_encoding(&self, text: &str) -> Encoding {
        let splits = self.pre_tokenizer.split_with_offsets(text);

        let mut ids = Vec::with_capacity(text.len() / 2);
        let mut offsets = Vec::with_capacity(text.len() / 2);
        let mut tokens = Vec::with_capacity(text.len() / 2);
        let mut unknown_symbols = 0;

        for split in &splits {
            // Start with character-level pieces
            let mut pieces: Vec<Piece> = split
                .word
                .chars()
                .zip(&split.offsets)
                .map(|(c, &(start, end))| {
                    let id = match self.alphabet.get(&c) {
                        Some(&id) => id,
                        None => {
                            unknown_symbols += 1;
                            UNKNOWN_ID
                        }
                    };
                    Piece { id, start, end }
                })
                .collect();

            self.apply_merges(&mut pieces);

            for piece in pieces {
                ids.push(piece.id);
                tokens.push(self.vocab.get_symbol(piece.id).unwrap_or_default().to_string());
                offsets.push((piece.start, piece.end));
            }
        }

        if unknown_symbols > 0 {
            debug!(
                "{} codepoint(s) outside the alphabet encoded as unknown",
                unknown_symbols
            );
        }

        Encoding {
            ids,
            tokens,
            offsets,
            unknown_symbols,
            char_count: text.chars().count(),
        }
    }

    /// Apply merges in rank order.
    ///
    /// Each round takes the lowest-ranked pair present and rewrites all of its
    /// non-overlapping occurrences left to right. A merge only creates pairs
    /// containing its own new symbol, whose rules all rank later, so this
    /// yields the same segmentation as walking the full rule list in order.
    fn apply_merges(&self, pieces: &mut Vec<Piece>) {
        while pieces.len() > 1 {
            let best = pieces
                .windows(2)
                .filter_map(|w| {
                    self.merge_ranks
                        .get(&(w[0].id, w[1].id))
                        .map(|op| (op.rank, w[0].id, w[1].id, op.new_id))
                })
                .min_by_key(|&(rank, ..)| rank);

            let Some((_, left, right, new_id)) = best else {
                break;
            };

            let mut write = 0;
            let mut read = 0;
            while read < pieces.len() {
                if read + 1 < pieces.len() && pieces[read].id == left && pieces[read + 1].id == right
                {
                    pieces[write] = Piece {
                        id: new_id,
                        start: pieces[read].start,
                        end: pieces[read + 1].end,
                    };
                    read += 2;
                } else {
                    pieces[write] = pieces[read];
                    read += 1;
                }
                write += 1;
            }
            pieces.truncate(write);
        }
    }

    /// Encode batch of texts in parallel
    pub fn encode_batch(&self, texts: &[&str]) -> Vec<Vec<u32>> {
        texts.par_iter().map(|text| self.encode(text)).collect()
    }

    /// Encode batch of texts in parallel, with offsets
    pub fn encode_batch_to_encoding(&self, texts: &[&str]) -> Vec<Encoding> {
        texts
            .par_iter()
            .map(|text| self.encode_to_encoding(text))
            .collect()
    }

    /// Decode token IDs to text.
    ///
    /// Fails with [`Error::InvalidTokenId`] on the first id outside the vocabulary.
    pub fn decode(&self, ids: &[u32]) -> Result<String> {
        let mut symbols = Vec::with_capacity(ids.len());
        for &id in ids {
            let symbol = self.vocab.get_symbol(id).ok_or(Error::InvalidTokenId {
                id,
                vocab_size: self.vocab.len(),
            })?;
            symbols.push(symbol);
        }
        Ok(self.decoder.decode(&symbols))
    }

    /// Decode batch in parallel
    pub fn decode_batch(&self, batch: &[Vec<u32>]) -> Result<Vec<String>> {
        batch.par_iter().map(|ids| self.decode(ids)).collect()
    }

    /// Characters per token for `text`
    pub fn compression_ratio(&self, text: &str) -> f64 {
        self.encode_to_encoding(text).compression_ratio()
    }

    /// Get vocab size
    pub fn vocab_size(&self) -> usize {
        self.vocab.len()
    }

    /// Number of entries that are single codepoints (reserved symbols included)
    pub fn alphabet_size(&self) -> usize {
        self.alphabet_size
    }

    /// Token to ID
    pub fn token_to_id(&self, token: &str) -> Option<u32> {
        self.vocab.get_id(token)
    }

    /// ID to token
    pub fn id_to_token(&self, id: u32) -> Option<&str> {
        self.vocab.get_symbol(id)
    }

    /// Get vocab reference
    pub fn vocab(&self) -> &Vocab {
        &self.vocab
    }

    /// Merge rules in application order
    pub fn merges(&self) -> &[MergeRule] {
        &self.merges
    }

    pub fn pre_tokenizer(&self) -> &PreTokenizer {
        &self.pre_tokenizer
    }
}
