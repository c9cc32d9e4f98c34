//! Python bindings for the BPE trainer

use super::tokenizer::PyTokenizer;
use crate::bpe::BpeTokenizer;
use crate::bpe_trainer::{
    BpeTrainer, BpeTrainerConfig, CorpusFrequencyTable, StopReason, TrainingOutcome,
};
use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;

/// Python-exposed Trainer class
///
/// Either call `train_from_iterator` once, or feed batches with
/// `count_batch` and then call `finish_training`.
#[pyclass(name = "Trainer")]
pub struct PyTrainer {
    inner: BpeTrainer,
    table: CorpusFrequencyTable,
    tokenizer: Option<BpeTokenizer>,
    stop_reason: Option<StopReason>,
}

impl PyTrainer {
    fn trained(&self) -> PyResult<&BpeTokenizer> {
        self.tokenizer
            .as_ref()
            .ok_or_else(|| PyErr::new::<PyValueError, _>("trainer has not been trained yet"))
    }

    fn fit(&self, py: Python<'_>, table: &CorpusFrequencyTable) -> PyResult<TrainingOutcome> {
        let trainer = &self.inner;
        Ok(py.allow_threads(|| trainer.train_from_table(table))?)
    }

    fn keep(&mut self, outcome: TrainingOutcome) {
        self.stop_reason = Some(outcome.stop_reason);
        self.tokenizer = Some(outcome.tokenizer);
    }
}

#[pymethods]
impl PyTrainer {
    #[new]
    #[pyo3(signature = (vocab_size = 5000, min_frequency = 2, max_iterations = None, show_progress = true))]
    fn new(
        vocab_size: usize,
        min_frequency: u64,
        max_iterations: Option<usize>,
        show_progress: bool,
    ) -> Self {
        let config = BpeTrainerConfig {
            vocab_size,
            min_frequency,
            max_iterations,
            show_progress,
            ..Default::default()
        };
        Self {
            inner: BpeTrainer::new(config),
            table: CorpusFrequencyTable::new(),
            tokenizer: None,
            stop_reason: None,
        }
    }

    /// Train from a list of texts in one pass
    fn train_from_iterator(&mut self, py: Python<'_>, texts: Vec<String>) -> PyResult<()> {
        let table = CorpusFrequencyTable::from_texts(&texts);
        let outcome = self.fit(py, &table)?;
        self.keep(outcome);
        Ok(())
    }

    /// Count words from a batch (streaming - low memory)
    /// Call this multiple times with batches, then call finish_training()
    fn count_batch(&mut self, texts: Vec<String>) {
        for text in &texts {
            self.table.add_text(text);
        }
    }

    /// Finish training after counting all batches.
    /// Counted batches are kept if training fails, so it can be retried.
    fn finish_training(&mut self, py: Python<'_>) -> PyResult<()> {
        let outcome = self.fit(py, &self.table)?;
        self.table = CorpusFrequencyTable::new();
        self.keep(outcome);
        Ok(())
    }

    /// Save trained tokenizer artifact
    fn save(&self, path: &str) -> PyResult<()> {
        Ok(self.trained()?.save(path)?)
    }

    /// Trained tokenizer, ready to encode
    fn tokenizer(&self) -> PyResult<PyTokenizer> {
        Ok(PyTokenizer {
            inner: self.trained()?.clone(),
        })
    }

    /// Why the last training run stopped, e.g. "TargetReached"
    #[getter]
    fn stop_reason(&self) -> Option<String> {
        self.stop_reason.map(|reason| format!("{:?}", reason))
    }

    #[getter]
    fn vocab_size(&self) -> usize {
        self.tokenizer
            .as_ref()
            .map_or(self.inner.config().vocab_size, |t| t.vocab_size())
    }

    #[getter]
    fn min_frequency(&self) -> u64 {
        self.inner.config().min_frequency
    }

    #[getter]
    fn max_iterations(&self) -> Option<usize> {
        self.inner.config().max_iterations
    }

    #[getter]
    fn num_merges(&self) -> usize {
        self.tokenizer.as_ref().map_or(0, |t| t.merges().len())
    }
}
