//! Vocabulary - bijective symbol <-> id mapping
//!
//! Symbols are stored once as `Arc<str>`: the id-ordered list and the reverse
//! map share the same allocation, and merge rules clone the `Arc`.

use crate::pretokenizers::BOUNDARY_MARKER;
use hashbrown::HashMap;
use std::sync::Arc;

/// Reserved id of the boundary marker
pub const BOUNDARY_ID: u32 = 0;
/// Reserved id every out-of-alphabet codepoint encodes to
pub const UNKNOWN_ID: u32 = 1;
/// Symbol behind [`UNKNOWN_ID`]
pub const UNKNOWN_SYMBOL: char = '\u{FFFD}';

/// Number of reserved alphabet entries
pub(crate) const RESERVED_SYMBOLS: usize = 2;

#[derive(Debug, Clone, Default)]
pub struct Vocab {
    /// Id -> symbol (index = id)
    symbols: Vec<Arc<str>>,
    /// Symbol -> id
    ids: HashMap<Arc<str>, u32>,
}

impl Vocab {
    /// Vocabulary holding only the reserved symbols
    pub(crate) fn with_reserved() -> Self {
        let mut vocab = Self::default();
        vocab.push(Arc::from(BOUNDARY_MARKER.to_string()));
        vocab.push(Arc::from(UNKNOWN_SYMBOL.to_string()));
        vocab
    }

    /// Build from id-ordered symbols, rejecting duplicates
    pub(crate) fn from_symbols<I, S>(symbols: I) -> Result<Self, String>
    where
        I: IntoIterator<Item = S>,
        S: Into<Arc<str>>,
    {
        let mut vocab = Self::default();
        for symbol in symbols {
            let symbol: Arc<str> = symbol.into();
            if vocab.ids.contains_key(&symbol) {
                return Err(format!("duplicate symbol {:?}", symbol));
            }
            vocab.push(symbol);
        }
        Ok(vocab)
    }

    /// Append a symbol that is not yet present, returning its new id
    pub(crate) fn push(&mut self, symbol: Arc<str>) -> u32 {
        let id = self.symbols.len() as u32;
        self.ids.insert(Arc::clone(&symbol), id);
        self.symbols.push(symbol);
        id
    }

    /// Id of `symbol`, inserting it at the end when missing
    pub(crate) fn get_or_insert(&mut self, symbol: &str) -> u32 {
        match self.ids.get(symbol) {
            Some(&id) => id,
            None => self.push(Arc::from(symbol)),
        }
    }

    /// Shared handle to a symbol
    pub(crate) fn symbol_arc(&self, id: u32) -> Option<&Arc<str>> {
        self.symbols.get(id as usize)
    }

    /// Get token ID
    pub fn get_id(&self, symbol: &str) -> Option<u32> {
        self.ids.get(symbol).copied()
    }

    /// Get token string
    pub fn get_symbol(&self, id: u32) -> Option<&str> {
        self.symbols.get(id as usize).map(|s| s.as_ref())
    }

    pub fn contains(&self, symbol: &str) -> bool {
        self.ids.contains_key(symbol)
    }

    /// Vocabulary size
    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    /// `(id, symbol)` pairs in id order
    pub fn iter(&self) -> impl Iterator<Item = (u32, &str)> {
        self.symbols
            .iter()
            .enumerate()
            .map(|(id, s)| (id as u32, s.as_ref()))
    }
}
