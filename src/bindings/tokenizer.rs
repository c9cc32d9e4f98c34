//! Python bindings for Tokenizer class

use super::encoding::PyEncoding;
use crate::bpe::BpeTokenizer;
use pyo3::prelude::*;

/// Python-exposed Tokenizer class
#[pyclass(name = "Tokenizer")]
pub struct PyTokenizer {
    pub(crate) inner: BpeTokenizer,
}

#[pymethods]
impl PyTokenizer {
    /// Load tokenizer from an artifact written by `save`
    #[staticmethod]
    fn from_file(path: &str) -> PyResult<Self> {
        let inner = BpeTokenizer::from_file(path)?;
        Ok(Self { inner })
    }

    #[staticmethod]
    fn from_str(json: &str) -> PyResult<Self> {
        let inner = BpeTokenizer::from_json_str(json)?;
        Ok(Self { inner })
    }

    /// Encode text to token IDs
    fn encode(&self, text: &str) -> Vec<u32> {
        self.inner.encode(text)
    }

    /// Encode batch of texts (parallel, GIL released)
    fn encode_batch(&self, py: Python<'_>, texts: Vec<String>) -> Vec<Vec<u32>> {
        py.allow_threads(|| {
            let texts: Vec<&str> = texts.iter().map(|s| s.as_str()).collect();
            self.inner.encode_batch(&texts)
        })
    }

    /// Encode text, keeping tokens and character offsets
    fn encode_with_offsets(&self, text: &str) -> PyEncoding {
        PyEncoding::new(self.inner.encode_to_encoding(text), text)
    }

    /// Decode token IDs to text
    fn decode(&self, ids: Vec<u32>) -> PyResult<String> {
        Ok(self.inner.decode(&ids)?)
    }

    /// Decode batch of token IDs (parallel, GIL released)
    fn decode_batch(&self, py: Python<'_>, batch: Vec<Vec<u32>>) -> PyResult<Vec<String>> {
        Ok(py.allow_threads(|| self.inner.decode_batch(&batch))?)
    }

    /// Characters per token for `text`
    fn compression_ratio(&self, text: &str) -> f64 {
        self.inner.compression_ratio(text)
    }

    #[getter]
    fn vocab_size(&self) -> usize {
        self.inner.vocab_size()
    }

    #[getter]
    fn num_merges(&self) -> usize {
        self.inner.merges().len()
    }

    fn token_to_id(&self, token: &str) -> Option<u32> {
        self.inner.token_to_id(token)
    }

    fn id_to_token(&self, id: u32) -> Option<String> {
        self.inner.id_to_token(id).map(str::to_string)
    }

    /// Save tokenizer artifact
    fn save(&self, path: &str) -> PyResult<()> {
        Ok(self.inner.save(path)?)
    }

    fn to_str(&self) -> PyResult<String> {
        Ok(self.inner.to_json_string()?)
    }

    fn __repr__(&self) -> String {
        format!("Tokenizer(vocab_size={})", self.inner.vocab_size())
    }
}
