//! Subword Tokenizer - word-frequency BPE with a boundary marker
//!
//! A Byte Pair Encoding tokenizer for natural-language text written in Rust,
//! with optional Python bindings via PyO3 (feature `python`).
//!
//! Features:
//! - Training over a word-frequency table with parallel pair counting
//! - Fast inference (encode/decode), batched over rayon
//! - Whitespace reconstruction through a `▁` boundary marker
//! - Atomic, validated JSON artifacts
//!
//! ```no_run
//! use subword_tokenizer::{BpeTrainerBuilder, BpeTokenizer};
//!
//! let outcome = BpeTrainerBuilder::new()
//!     .vocab_size(500)
//!     .build()
//!     .train(["the quick brown fox", "the lazy dog"])?;
//! outcome.tokenizer.save("tokenizer.json")?;
//!
//! let tokenizer = BpeTokenizer::from_file("tokenizer.json")?;
//! let ids = tokenizer.encode("the fox");
//! assert_eq!(tokenizer.decode(&ids)?, "the fox");
//! # Ok::<(), subword_tokenizer::Error>(())
//! ```

pub mod bpe;
pub mod bpe_trainer;
pub mod decoders;
pub mod encoding;
pub mod error;
pub mod pretokenizers;
pub mod serialization;
pub mod vocab;

#[cfg(feature = "python")]
mod bindings;

pub use bpe::{BpeTokenizer, MergeRule};
pub use bpe_trainer::{
    BpeTrainer, BpeTrainerBuilder, BpeTrainerConfig, CorpusFrequencyTable, StopReason,
    TrainingOutcome, TrainingProgress, TrainingStats,
};
pub use decoders::Decoder;
pub use encoding::Encoding;
pub use error::{Error, Result};
pub use pretokenizers::{PreTokenizer, BOUNDARY_MARKER};
pub use vocab::{Vocab, BOUNDARY_ID, UNKNOWN_ID, UNKNOWN_SYMBOL};

#[cfg(feature = "python")]
use pyo3::prelude::*;

/// Python module
#[cfg(feature = "python")]
#[pymodule]
fn subword_tokenizer(m: &Bound<'_, PyModule>) -> PyResult<()> {
    pyo3_log::init();

    m.add_class::<bindings::PyTokenizer>()?;
    m.add_class::<bindings::PyTrainer>()?;
    m.add_class::<bindings::PyEncoding>()?;
    m.add("__version__", env!("CARGO_PKG_VERSION"))?;
    Ok(())
}
