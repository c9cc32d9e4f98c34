//! Python bindings via PyO3

mod encoding;
mod tokenizer;
mod trainers;

pub use encoding::PyEncoding;
pub use tokenizer::PyTokenizer;
pub use trainers::PyTrainer;

use crate::error::Error;
use pyo3::exceptions::{PyIOError, PyValueError};
use pyo3::PyErr;

impl From<Error> for PyErr {
    fn from(err: Error) -> Self {
        match err {
            Error::Io(_) => PyErr::new::<PyIOError, _>(err.to_string()),
            _ => PyErr::new::<PyValueError, _>(err.to_string()),
        }
    }
}
