//! Python bindings for Encoding

use crate::encoding::Encoding;
use pyo3::prelude::*;

/// Python-exposed Encoding class
#[pyclass(name = "Encoding")]
pub struct PyEncoding {
    pub(crate) inner: Encoding,
    /// Offsets in characters, which is how Python indexes `str`
    pub(crate) char_offsets: Vec<(usize, usize)>,
}

impl PyEncoding {
    pub(crate) fn new(inner: Encoding, text: &str) -> Self {
        let char_offsets = inner.char_offsets(text);
        Self { inner, char_offsets }
    }
}

#[pymethods]
impl PyEncoding {
    #[getter]
    fn ids(&self) -> Vec<u32> {
        self.inner.ids.clone()
    }

    #[getter]
    fn tokens(&self) -> Vec<String> {
        self.inner.tokens.clone()
    }

    #[getter]
    fn offsets(&self) -> Vec<(usize, usize)> {
        self.char_offsets.clone()
    }

    #[getter]
    fn unknown_symbols(&self) -> usize {
        self.inner.unknown_symbols
    }

    #[getter]
    fn compression_ratio(&self) -> f64 {
        self.inner.compression_ratio()
    }

    fn __len__(&self) -> usize {
        self.inner.len()
    }

    fn __repr__(&self) -> String {
        format!(
            "Encoding(num_tokens={}, unknown_symbols={})",
            self.inner.len(),
            self.inner.unknown_symbols
        )
    }
}
