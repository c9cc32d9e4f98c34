//! Error types shared by training, encoding, decoding and persistence.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// Trainer configuration cannot produce a valid run.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// The corpus yielded no words after pre-tokenization.
    #[error("training corpus contains no usable text")]
    CorpusEmpty,

    /// Decode was asked for an id outside `0..vocab_size`.
    #[error("token id {id} is out of range for a vocabulary of size {vocab_size}")]
    InvalidTokenId { id: u32, vocab_size: usize },

    /// A persisted artifact failed parsing or structural validation.
    #[error("corrupt artifact: {0}")]
    CorruptArtifact(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serde_json error: {0}")]
    Json(#[from] serde_json::Error),
}

pub(crate) fn corrupt<S: Into<String>>(msg: S) -> Error {
    Error::CorruptArtifact(msg.into())
}
