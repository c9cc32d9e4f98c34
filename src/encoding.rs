//! Encoding - ids plus the metadata a front end needs to highlight tokens

/// Full encoding output
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Encoding {
    /// Token IDs
    pub ids: Vec<u32>,
    /// Symbol of each token
    pub tokens: Vec<String>,
    /// Byte offsets `(start, end)` of each token in the source text
    pub offsets: Vec<(usize, usize)>,
    /// Codepoints that fell outside the alphabet and were encoded as unknown
    pub unknown_symbols: usize,
    /// Number of characters in the source text
    pub char_count: usize,
}

impl Encoding {
    /// Get the number of tokens
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Characters per token; 0.0 for an empty encoding
    pub fn compression_ratio(&self) -> f64 {
        if self.ids.is_empty() {
            0.0
        } else {
            self.char_count as f64 / self.ids.len() as f64
        }
    }

    /// Substring of `text` the token at `index` was produced from.
    ///
    /// `text` must be the string this encoding was computed from.
    pub fn token_span<'a>(&self, text: &'a str, index: usize) -> Option<&'a str> {
        let &(start, end) = self.offsets.get(index)?;
        text.get(start..end)
    }

    /// Offsets converted from bytes to character indices, for consumers that
    /// index strings by codepoint
    pub fn char_offsets(&self, text: &str) -> Vec<(usize, usize)> {
        // byte position -> char index, with one extra slot for text.len()
        let mut char_index = vec![0usize; text.len() + 1];
        let mut count = 0;
        for (byte, c) in text.char_indices() {
            for slot in &mut char_index[byte..byte + c.len_utf8()] {
                *slot = count;
            }
            count += 1;
        }
        char_index[text.len()] = count;

        self.offsets
            .iter()
            .map(|&(start, end)| {
                let start = char_index.get(start).copied().unwrap_or(count);
                let end = char_index.get(end).copied().unwrap_or(count);
                (start, end)
            })
            .collect()
    }
}
