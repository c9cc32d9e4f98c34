//! Decoders - Convert token symbols back to text

use crate::pretokenizers::BOUNDARY_MARKER;

/// Metaspace decoder: joins symbols and turns each boundary marker back into a space
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decoder {
    replacement: char,
}

impl Default for Decoder {
    fn default() -> Self {
        Self {
            replacement: BOUNDARY_MARKER,
        }
    }
}

impl Decoder {
    /// Decoder turning `replacement` back into spaces
    pub fn new(replacement: char) -> Self {
        Self { replacement }
    }

    /// Decode tokens to text
    pub fn decode<S: AsRef<str>>(&self, tokens: &[S]) -> String {
        let capacity = tokens.iter().map(|t| t.as_ref().len()).sum();
        let mut text = String::with_capacity(capacity);

        for token in tokens {
            for c in token.as_ref().chars() {
                text.push(if c == self.replacement { ' ' } else { c });
            }
        }

        text
    }
}
