//! Artifact persistence
//!
//! A trained tokenizer is stored as a single JSON document:
//!
//! ```json
//! { "version": 1, "vocab": [{"symbol": "▁", "id": 0}, ...], "merges": [["h", "e"], ...] }
//! ```
//!
//! Writes go to a temporary file in the destination directory which is then
//! renamed over the target, so readers never observe a half-written artifact.
//! Loading validates the whole structure before a tokenizer is built.

use crate::bpe::{BpeTokenizer, MergeRule};
use crate::error::{corrupt, Error, Result};
use crate::pretokenizers::BOUNDARY_MARKER;
use crate::vocab::{Vocab, BOUNDARY_ID, RESERVED_SYMBOLS, UNKNOWN_ID, UNKNOWN_SYMBOL};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use tempfile::NamedTempFile;

/// Schema version written into every artifact
pub const SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct VocabEntry {
    symbol: String,
    id: u32,
}

#[derive(Debug, Serialize, Deserialize)]
struct ArtifactJson {
    version: u32,
    vocab: Vec<VocabEntry>,
    merges: Vec<(String, String)>,
}

impl ArtifactJson {
    fn from_tokenizer(tokenizer: &BpeTokenizer) -> Self {
        Self {
            version: SCHEMA_VERSION,
            vocab: tokenizer
                .vocab()
                .iter()
                .map(|(id, symbol)| VocabEntry {
                    symbol: symbol.to_string(),
                    id,
                })
                .collect(),
            merges: tokenizer
                .merges()
                .iter()
                .map(|m| (m.left.to_string(), m.right.to_string()))
                .collect(),
        }
    }

    /// Check every structural rule and build the tokenizer.
    ///
    /// The vocabulary is laid out as reserved symbols, then the single-codepoint
    /// alphabet, then one merged symbol per merge rule in merge order.
    fn into_tokenizer(self) -> Result<BpeTokenizer> {
        if self.version != SCHEMA_VERSION {
            return Err(corrupt(format!(
                "unsupported schema version {} (expected {})",
                self.version, SCHEMA_VERSION
            )));
        }

        for (expected, entry) in self.vocab.iter().enumerate() {
            if entry.id as usize != expected {
                return Err(corrupt(format!(
                    "vocabulary ids are not dense: found id {} at position {}",
                    entry.id, expected
                )));
            }
        }

        let vocab = Vocab::from_symbols(self.vocab.into_iter().map(|e| e.symbol))
            .map_err(corrupt)?;

        if vocab.len() < RESERVED_SYMBOLS + self.merges.len() {
            return Err(corrupt(format!(
                "{} merges cannot fit a vocabulary of size {}",
                self.merges.len(),
                vocab.len()
            )));
        }
        let holds = |id: u32, c: char| {
            let mut chars = vocab.get_symbol(id).unwrap_or_default().chars();
            chars.next() == Some(c) && chars.next().is_none()
        };
        if !holds(BOUNDARY_ID, BOUNDARY_MARKER) || !holds(UNKNOWN_ID, UNKNOWN_SYMBOL) {
            return Err(corrupt("reserved symbols are missing or out of place"));
        }

        let alphabet_size = vocab.len() - self.merges.len();
        for (id, symbol) in vocab.iter().take(alphabet_size) {
            if symbol.chars().count() != 1 {
                return Err(corrupt(format!(
                    "alphabet entry {} ({:?}) is not a single character",
                    id, symbol
                )));
            }
        }

        let mut merges = Vec::with_capacity(self.merges.len());
        for (rank, (left, right)) in self.merges.into_iter().enumerate() {
            let merged_id = (alphabet_size + rank) as u32;
            let known_before = |symbol: &str| vocab.get_id(symbol).is_some_and(|id| id < merged_id);
            if !known_before(left.as_str()) || !known_before(right.as_str()) {
                return Err(corrupt(format!(
                    "merge {} ({:?}, {:?}) uses a symbol not defined before it",
                    rank, left, right
                )));
            }

            let merged = format!("{}{}", left, right);
            let Some(symbol) = vocab.symbol_arc(merged_id) else {
                return Err(corrupt(format!("merge {} has no vocabulary entry", rank)));
            };
            if **symbol != *merged {
                return Err(corrupt(format!(
                    "merge {} produces {:?} but vocabulary id {} is {:?}",
                    rank, merged, merged_id, symbol
                )));
            }

            merges.push(MergeRule {
                left: Arc::from(left),
                right: Arc::from(right),
                merged: Arc::clone(symbol),
            });
        }

        Ok(BpeTokenizer::new(vocab, merges))
    }
}

/// Serialize to a pretty-printed JSON string
pub fn to_json_string(tokenizer: &BpeTokenizer) -> Result<String> {
    Ok(serde_json::to_string_pretty(&ArtifactJson::from_tokenizer(
        tokenizer,
    ))?)
}

/// Parse and validate an artifact from a JSON string
pub fn from_json_str(json: &str) -> Result<BpeTokenizer> {
    from_slice(json.as_bytes())
}

fn from_slice(bytes: &[u8]) -> Result<BpeTokenizer> {
    let artifact: ArtifactJson = serde_json::from_slice(bytes)
        .map_err(|e| corrupt(format!("malformed artifact: {}", e)))?;
    artifact.into_tokenizer()
}

/// Write `tokenizer` to `path`, replacing any existing file atomically
pub fn save<P: AsRef<Path>>(tokenizer: &BpeTokenizer, path: P) -> Result<()> {
    let path = path.as_ref();
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir)?;

    let json = to_json_string(tokenizer)?;
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(json.as_bytes())?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| Error::Io(e.error))?;
    Ok(())
}

/// Read and validate an artifact written by [`save`]
pub fn load<P: AsRef<Path>>(path: P) -> Result<BpeTokenizer> {
    let bytes = fs::read(path)?;
    from_slice(&bytes)
}

impl BpeTokenizer {
    /// Artifact as a JSON string
    pub fn to_json_string(&self) -> Result<String> {
        to_json_string(self)
    }

    /// Build from an artifact JSON string
    pub fn from_json_str(json: &str) -> Result<Self> {
        from_json_str(json)
    }
}
