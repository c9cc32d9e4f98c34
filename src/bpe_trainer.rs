//! BPE (Byte Pair Encoding) Trainer
//!
//! Learns an ordered merge list from a corpus word-frequency table. Pair
//! counting fans out over rayon workers and is summed before each selection;
//! selecting and applying a merge is sequential, one merge per iteration.
//!
//! Ties between equally frequent pairs go to the smallest `(left_id, right_id)`.

use crate::bpe::{BpeTokenizer, MergeRule};
use crate::error::{Error, Result};
use crate::pretokenizers::PreTokenizer;
use crate::vocab::Vocab;
use hashbrown::HashMap;
use log::{debug, info, warn};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// BPE Trainer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BpeTrainerConfig {
    /// Target vocabulary size, reserved symbols and alphabet included
    pub vocab_size: usize,
    /// Minimum weighted frequency for a pair to be merged
    pub min_frequency: u64,
    /// Stop after this many merges even if the target is not reached
    pub max_iterations: Option<usize>,
    /// Whether to log progress
    pub show_progress: bool,
    /// Log every N merges when `show_progress` is set
    pub log_every: usize,
}

impl Default for BpeTrainerConfig {
    fn default() -> Self {
        Self {
            vocab_size: 5000,
            min_frequency: 2,
            max_iterations: None,
            show_progress: true,
            log_every: 1000,
        }
    }
}

impl BpeTrainerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.min_frequency == 0 {
            return Err(Error::Config("min_frequency must be at least 1".into()));
        }
        if self.log_every == 0 {
            return Err(Error::Config("log_every must be greater than zero".into()));
        }
        Ok(())
    }
}

/// Distinct pre-tokenized words and their corpus counts, in first-seen order.
///
/// Feed it text in as many batches as needed, then hand it to
/// [`BpeTrainer::train_from_table`].
#[derive(Debug, Clone, Default)]
pub struct CorpusFrequencyTable {
    pre_tokenizer: PreTokenizer,
    words: Vec<(Arc<str>, u64)>,
    index: HashMap<Arc<str>, usize>,
}

impl CorpusFrequencyTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count every word of every text
    pub fn from_texts<I, S>(texts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut table = Self::new();
        for text in texts {
            table.add_text(text.as_ref());
        }
        table
    }

    /// Pre-tokenize `text` and count its words
    pub fn add_text(&mut self, text: &str) {
        for word in self.pre_tokenizer.split(text) {
            self.add_word(&word, 1);
        }
    }

    fn add_word(&mut self, word: &str, count: u64) {
        if let Some(&i) = self.index.get(word) {
            self.words[i].1 += count;
        } else {
            let word: Arc<str> = Arc::from(word);
            self.index.insert(Arc::clone(&word), self.words.len());
            self.words.push((word, count));
        }
    }

    /// Occurrences of `word`
    pub fn get(&self, word: &str) -> Option<u64> {
        self.index.get(word).map(|&i| self.words[i].1)
    }

    /// Number of distinct words
    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    /// Total word occurrences
    pub fn total_words(&self) -> u64 {
        self.words.iter().map(|(_, count)| count).sum()
    }

    /// `(word, count)` in first-seen order
    pub fn iter(&self) -> impl Iterator<Item = (&str, u64)> {
        self.words.iter().map(|(word, count)| (word.as_ref(), *count))
    }
}

/// Why training stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Vocabulary reached the configured size
    TargetReached,
    /// No pair reached `min_frequency` any more
    NoRepeatingPairs,
    /// `max_iterations` merges were performed
    MaxIterations,
    /// The stop flag was raised by the caller
    Cancelled,
}

impl StopReason {
    /// True for every reason except reaching the target size
    pub fn is_early_stop(&self) -> bool {
        !matches!(self, StopReason::TargetReached)
    }
}

/// Progress event sent after every merge
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrainingProgress {
    /// 1-based merge index
    pub iteration: usize,
    pub vocab_size: usize,
    /// Weighted frequency of the merged pair
    pub frequency: u64,
    pub symbol: String,
}

/// Summary of a finished run
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingStats {
    pub alphabet_size: usize,
    pub merges: usize,
    pub elapsed: Duration,
    /// Corpus symbols before any merge, weighted by word frequency
    pub corpus_chars: u64,
    /// Corpus symbols after the last merge, weighted by word frequency
    pub corpus_tokens: u64,
}

impl TrainingStats {
    /// Compression achieved on the training corpus itself
    pub fn compression_ratio(&self) -> f64 {
        if self.corpus_tokens == 0 {
            0.0
        } else {
            self.corpus_chars as f64 / self.corpus_tokens as f64
        }
    }
}

/// Result of a training run: always a usable tokenizer, plus why it stopped
#[derive(Debug, Clone)]
pub struct TrainingOutcome {
    pub tokenizer: BpeTokenizer,
    pub stop_reason: StopReason,
    pub stats: TrainingStats,
}

/// Word representation: symbol ids + frequency
#[derive(Debug, Clone)]
struct Word {
    symbols: Vec<u32>,
    freq: u64,
}

impl Word {
    /// Replace every non-overlapping `pair`, scanning left to right
    fn merge(&mut self, pair: (u32, u32), new_id: u32) {
        if self.symbols.len() < 2 {
            return;
        }

        let mut write = 0;
        let mut read = 0;
        let len = self.symbols.len();
        while read < len {
            if read + 1 < len && self.symbols[read] == pair.0 && self.symbols[read + 1] == pair.1 {
                self.symbols[write] = new_id;
                read += 2;
            } else {
                self.symbols[write] = self.symbols[read];
                read += 1;
            }
            write += 1;
        }
        self.symbols.truncate(write);
    }
}

/// BPE Trainer
#[derive(Debug, Clone, Default)]
pub struct BpeTrainer {
    config: BpeTrainerConfig,
    progress: Option<Sender<TrainingProgress>>,
    stop: Option<Arc<AtomicBool>>,
}

impl BpeTrainer {
    /// Create new BPE trainer with configuration
    pub fn new(config: BpeTrainerConfig) -> Self {
        Self {
            config,
            progress: None,
            stop: None,
        }
    }

    /// Create trainer with default configuration
    pub fn with_vocab_size(vocab_size: usize) -> Self {
        Self::new(BpeTrainerConfig {
            vocab_size,
            ..Default::default()
        })
    }

    /// Send a [`TrainingProgress`] after every merge. Sends never block and a
    /// dropped receiver is ignored.
    pub fn with_progress(mut self, sender: Sender<TrainingProgress>) -> Self {
        self.progress = Some(sender);
        self
    }

    /// Stop before the next merge once `flag` is set; the merges learned so
    /// far are kept.
    pub fn with_stop_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.stop = Some(flag);
        self
    }

    /// Get configuration reference
    pub fn config(&self) -> &BpeTrainerConfig {
        &self.config
    }

    /// Train BPE model on text data
    pub fn train<I, S>(&self, texts: I) -> Result<TrainingOutcome>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let table = CorpusFrequencyTable::from_texts(texts);
        self.train_from_table(&table)
    }

    /// Train from an already counted corpus
    pub fn train_from_table(&self, table: &CorpusFrequencyTable) -> Result<TrainingOutcome> {
        self.config.validate()?;
        if table.is_empty() {
            return Err(Error::CorpusEmpty);
        }

        let start = Instant::now();

        // Step 1: Build initial alphabet in first-seen order
        let mut vocab = Vocab::with_reserved();
        let mut char_buf = [0u8; 4];
        for (word, _) in table.iter() {
            for c in word.chars() {
                vocab.get_or_insert(c.encode_utf8(&mut char_buf));
            }
        }
        let alphabet_size = vocab.len();

        if self.config.vocab_size <= alphabet_size {
            return Err(Error::Config(format!(
                "target vocabulary size {} must exceed the initial alphabet size {}",
                self.config.vocab_size, alphabet_size
            )));
        }

        // Step 2: Split words into single-codepoint symbols
        let mut words: Vec<Word> = table
            .iter()
            .map(|(word, freq)| Word {
                symbols: word
                    .chars()
                    .filter_map(|c| vocab.get_id(c.encode_utf8(&mut [0u8; 4])))
                    .collect(),
                freq,
            })
            .collect();
        let corpus_chars = weighted_len(&words);

        if self.config.show_progress {
            info!(
                "Starting BPE training: {} distinct words, alphabet {}, target vocab {}",
                words.len(),
                alphabet_size,
                self.config.vocab_size
            );
        }

        // Step 3: Iteratively merge most frequent pairs
        let mut merges: Vec<MergeRule> = Vec::new();
        let stop_reason = loop {
            if vocab.len() >= self.config.vocab_size {
                break StopReason::TargetReached;
            }
            if let Some(max_iterations) = self.config.max_iterations {
                if merges.len() >= max_iterations {
                    break StopReason::MaxIterations;
                }
            }
            if self.stop_requested() {
                break StopReason::Cancelled;
            }

            let mut pair_freqs = count_pairs(&words);
            let Some((pair, freq, merged)) = self.select_pair(&mut pair_freqs, &vocab) else {
                break StopReason::NoRepeatingPairs;
            };

            let (Some(left), Some(right)) = (vocab.symbol_arc(pair.0), vocab.symbol_arc(pair.1))
            else {
                break StopReason::NoRepeatingPairs;
            };
            let (left, right) = (Arc::clone(left), Arc::clone(right));

            let merged: Arc<str> = Arc::from(merged);
            let new_id = vocab.push(Arc::clone(&merged));
            merges.push(MergeRule {
                left,
                right,
                merged: Arc::clone(&merged),
            });

            words.par_iter_mut().for_each(|word| word.merge(pair, new_id));

            self.report(merges.len(), vocab.len(), freq, &merged);
        };

        let stats = TrainingStats {
            alphabet_size,
            merges: merges.len(),
            elapsed: start.elapsed(),
            corpus_chars,
            corpus_tokens: weighted_len(&words),
        };

        match stop_reason {
            StopReason::TargetReached => {
                if self.config.show_progress {
                    info!(
                        "Finished training: vocab size {}, {} merges in {:.2?}, compression {:.2}x",
                        vocab.len(),
                        stats.merges,
                        stats.elapsed,
                        stats.compression_ratio()
                    );
                }
            }
            reason => warn!(
                "Training stopped early ({:?}) at vocab size {} of {}",
                reason,
                vocab.len(),
                self.config.vocab_size
            ),
        }

        Ok(TrainingOutcome {
            tokenizer: BpeTokenizer::new(vocab, merges),
            stop_reason,
            stats,
        })
    }

    /// Highest-frequency eligible pair whose concatenation is not already a
    /// symbol. Conflicting pairs are dropped from `pair_freqs` and the search
    /// repeats.
    fn select_pair(
        &self,
        pair_freqs: &mut HashMap<(u32, u32), u64>,
        vocab: &Vocab,
    ) -> Option<((u32, u32), u64, String)> {
        loop {
            let (&pair, &freq) = pair_freqs
                .iter()
                .filter(|&(_, &freq)| freq >= self.config.min_frequency)
                .max_by(|a, b| compare_candidates((*a.0, *a.1), (*b.0, *b.1)))?;

            let merged = format!(
                "{}{}",
                vocab.get_symbol(pair.0)?,
                vocab.get_symbol(pair.1)?
            );
            if !vocab.contains(&merged) {
                return Some((pair, freq, merged));
            }

            debug!("Skipping pair {:?}: {:?} is already a symbol", pair, merged);
            pair_freqs.remove(&pair);
        }
    }

    fn stop_requested(&self) -> bool {
        self.stop
            .as_ref()
            .is_some_and(|flag| flag.load(AtomicOrdering::Relaxed))
    }

    fn report(&self, iteration: usize, vocab_size: usize, frequency: u64, symbol: &str) {
        if let Some(sender) = &self.progress {
            // A receiver that hung up just stops listening
            let _ = sender.send(TrainingProgress {
                iteration,
                vocab_size,
                frequency,
                symbol: symbol.to_string(),
            });
        }

        if self.config.show_progress && iteration % self.config.log_every == 0 {
            info!(
                "BPE training: {} merges, vocab size: {}",
                iteration, vocab_size
            );
        }
    }
}

/// Order candidates so that `max_by` picks the highest frequency, then the
/// smallest `(left_id, right_id)`
fn compare_candidates(a: ((u32, u32), u64), b: ((u32, u32), u64)) -> Ordering {
    a.1.cmp(&b.1).then_with(|| b.0.cmp(&a.0))
}

/// Count pair frequencies across all words
fn count_pairs(words: &[Word]) -> HashMap<(u32, u32), u64> {
    words
        .par_iter()
        .fold(
            HashMap::new,
            |mut acc: HashMap<(u32, u32), u64>, word| {
                for window in word.symbols.windows(2) {
                    *acc.entry((window[0], window[1])).or_insert(0) += word.freq;
                }
                acc
            },
        )
        .reduce(HashMap::new, |mut a, b| {
            for (pair, count) in b {
                *a.entry(pair).or_insert(0) += count;
            }
            a
        })
}

fn weighted_len(words: &[Word]) -> u64 {
    words
        .iter()
        .map(|word| word.symbols.len() as u64 * word.freq)
        .sum()
}

/// Builder for BpeTrainerConfig
pub struct BpeTrainerBuilder {
    config: BpeTrainerConfig,
}

impl BpeTrainerBuilder {
    pub fn new() -> Self {
        Self {
            config: BpeTrainerConfig::default(),
        }
    }

    pub fn vocab_size(mut self, size: usize) -> Self {
        self.config.vocab_size = size;
        self
    }

    pub fn min_frequency(mut self, freq: u64) -> Self {
        self.config.min_frequency = freq;
        self
    }

    pub fn max_iterations(mut self, iterations: usize) -> Self {
        self.config.max_iterations = Some(iterations);
        self
    }

    pub fn show_progress(mut self, show: bool) -> Self {
        self.config.show_progress = show;
        self
    }

    pub fn log_every(mut self, every: usize) -> Self {
        self.config.log_every = every;
        self
    }

    pub fn build(self) -> BpeTrainer {
        BpeTrainer::new(self.config)
    }
}

impl Default for BpeTrainerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    fn trainer(vocab_size: usize) -> BpeTrainer {
        BpeTrainerBuilder::new()
            .vocab_size(vocab_size)
            .show_progress(false)
            .build()
    }

    #[test]
    fn test_first_merge_is_most_frequent_pair() {
        // alphabet: ▁, �, a, b
        let outcome = trainer(5).train(["aaab", "aaab"]).unwrap();
        let tokenizer = &outcome.tokenizer;

        assert_eq!(outcome.stop_reason, StopReason::TargetReached);
        assert_eq!(tokenizer.alphabet_size(), 4);
        assert_eq!(tokenizer.merges().len(), 1);
        assert_eq!(&*tokenizer.merges()[0].left, "a");
        assert_eq!(&*tokenizer.merges()[0].right, "a");
        assert_eq!(tokenizer.token_to_id("aa"), Some(4));
    }

    #[test]
    fn test_tie_break_prefers_smallest_ids() {
        // "ab" and "cd" both occur twice; first-seen order gives a=2 b=3 c=4 d=5
        let outcome = trainer(7).train(["ab", "cd", "cd", "ab"]).unwrap();
        let tokenizer = &outcome.tokenizer;
        let first = &tokenizer.merges()[0];
        assert_eq!((&*first.left, &*first.right), ("a", "b"));
        assert_eq!(tokenizer.token_to_id("ab"), Some(tokenizer.alphabet_size() as u32));

        // Reversed first-seen order flips the winner
        let outcome = trainer(7).train(["cd", "ab", "ab", "cd"]).unwrap();
        let first = &outcome.tokenizer.merges()[0];
        assert_eq!((&*first.left, &*first.right), ("c", "d"));
        assert_eq!(outcome.tokenizer.token_to_id("cd"), Some(6));
    }

    #[test]
    fn test_select_pair_skips_existing_symbols() {
        let mut vocab = Vocab::with_reserved();
        let a = vocab.get_or_insert("a");
        let b = vocab.get_or_insert("b");
        let aa = vocab.get_or_insert("aa");
        let ab = vocab.get_or_insert("ab");
        // "aab" already learned as a + ab
        vocab.get_or_insert("aab");

        let trainer = trainer(100);
        let mut pair_freqs: HashMap<(u32, u32), u64> =
            [((aa, b), 9), ((a, b), 7), ((b, a), 4)].into_iter().collect();

        let (pair, freq, merged) = trainer.select_pair(&mut pair_freqs, &vocab).unwrap();
        assert_eq!((pair, freq, merged.as_str()), ((b, a), 4, "ba"));
        assert!(!pair_freqs.contains_key(&(aa, b)));
        assert!(!pair_freqs.contains_key(&(a, b)));

        let mut only_collisions: HashMap<(u32, u32), u64> =
            [((aa, b), 3), ((a, ab), 3)].into_iter().collect();
        assert!(trainer.select_pair(&mut only_collisions, &vocab).is_none());
        assert!(only_collisions.is_empty());
    }

    #[test]
    fn test_trained_vocab_is_bijective_and_reloads() {
        let texts = [
            "bbb",
            "aababbaabab",
            "ababaabaabb",
            "abab",
            "bbbaa",
            "baaaaaa",
            "aaabaaba",
        ];
        let trainer = BpeTrainerBuilder::new()
            .vocab_size(200)
            .min_frequency(1)
            .show_progress(false)
            .build();
        let tokenizer = trainer.train(texts).unwrap().tokenizer;

        let mut seen = std::collections::HashSet::new();
        for (_, symbol) in tokenizer.vocab().iter() {
            assert!(seen.insert(symbol.to_string()), "duplicate symbol {:?}", symbol);
        }
        for (rank, rule) in tokenizer.merges().iter().enumerate() {
            assert_eq!(
                tokenizer.token_to_id(&rule.merged),
                Some((tokenizer.alphabet_size() + rank) as u32)
            );
        }

        let json = crate::serialization::to_json_string(&tokenizer).unwrap();
        let reloaded = crate::serialization::from_json_str(&json).unwrap();
        assert_eq!(reloaded.merges(), tokenizer.merges());
        for text in texts {
            assert_eq!(reloaded.encode(text), tokenizer.encode(text));
        }
    }

    #[test]
    fn test_failed_run_keeps_counted_table() {
        let mut table = CorpusFrequencyTable::new();
        table.add_text("abab abab");
        table.add_text("abba");

        // alphabet is 4 (reserved + a, b), so 4 is too small
        assert!(matches!(trainer(4).train_from_table(&table), Err(Error::Config(_))));
        assert_eq!(table.total_words(), 3);

        let outcome = trainer(6).train_from_table(&table).unwrap();
        assert_eq!(outcome.tokenizer.vocab_size(), 6);
    }

    #[test]
    fn test_early_stop_when_pairs_exhausted() {
        let outcome = trainer(100).train(["abc"]).unwrap();
        assert_eq!(outcome.stop_reason, StopReason::NoRepeatingPairs);
        assert!(outcome.stop_reason.is_early_stop());
        let tokenizer = &outcome.tokenizer;
        assert!(tokenizer.vocab_size() < 100);
        assert_eq!(
            tokenizer.merges().len(),
            tokenizer.vocab_size() - tokenizer.alphabet_size()
        );
    }

    #[test]
    fn test_config_error_when_target_too_small() {
        let err = trainer(4).train(["aaab"]).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_empty_corpus() {
        let err = trainer(50).train([""]).unwrap_err();
        assert!(matches!(err, Error::CorpusEmpty));
        let err = trainer(50).train(Vec::<String>::new()).unwrap_err();
        assert!(matches!(err, Error::CorpusEmpty));
    }

    #[test]
    fn test_max_iterations_keeps_partial_vocab() {
        let trainer = BpeTrainerBuilder::new()
            .vocab_size(100)
            .max_iterations(2)
            .show_progress(false)
            .build();
        let outcome = trainer.train(["hello hello hello world world"]).unwrap();
        assert_eq!(outcome.stop_reason, StopReason::MaxIterations);
        assert_eq!(outcome.tokenizer.merges().len(), 2);
    }

    #[test]
    fn test_cancelled_before_first_merge() {
        let flag = Arc::new(AtomicBool::new(true));
        let outcome = trainer(100)
            .with_stop_flag(Arc::clone(&flag))
            .train(["hello hello"])
            .unwrap();
        assert_eq!(outcome.stop_reason, StopReason::Cancelled);
        assert!(outcome.tokenizer.merges().is_empty());
        assert_eq!(outcome.tokenizer.decode(&outcome.tokenizer.encode("hello")).unwrap(), "hello");
    }

    #[test]
    fn test_progress_channel_reports_every_merge() {
        let (tx, rx) = mpsc::channel();
        let outcome = trainer(12)
            .with_progress(tx)
            .train(["banana bandana banana"])
            .unwrap();
        let events: Vec<TrainingProgress> = rx.try_iter().collect();
        assert_eq!(events.len(), outcome.tokenizer.merges().len());
        for (i, event) in events.iter().enumerate() {
            assert_eq!(event.iteration, i + 1);
            assert_eq!(event.vocab_size, outcome.stats.alphabet_size + i + 1);
        }
    }

    #[test]
    fn test_dropped_receiver_does_not_fail_training() {
        let (tx, rx) = mpsc::channel();
        drop(rx);
        assert!(trainer(10).with_progress(tx).train(["abab abab"]).is_ok());
    }

    #[test]
    fn test_word_merge_non_overlapping() {
        let mut word = Word {
            symbols: vec![2, 2, 2, 3],
            freq: 1,
        };
        word.merge((2, 2), 9);
        assert_eq!(word.symbols, vec![9, 2, 3]);
    }

    #[test]
    fn test_frequency_table_counts_words() {
        let table = CorpusFrequencyTable::from_texts(["the cat", "the dog the"]);
        assert_eq!(table.get("the"), Some(2));
        assert_eq!(table.get("▁the"), Some(1));
        assert_eq!(table.total_words(), 5);
        let words: Vec<&str> = table.iter().map(|(w, _)| w).collect();
        assert_eq!(words, vec!["the", "▁cat", "▁dog", "▁the"]);
    }

    #[test]
    fn test_training_stats() {
        let outcome = trainer(5).train(["aaab", "aaab"]).unwrap();
        // 2 x "aaab" = 8 chars -> 2 x [aa, a, b] = 6 tokens
        assert_eq!(outcome.stats.corpus_chars, 8);
        assert_eq!(outcome.stats.corpus_tokens, 6);
        assert!((outcome.stats.compression_ratio() - 8.0 / 6.0).abs() < 1e-9);
    }

    #[test]
    fn test_config_validation() {
        let config = BpeTrainerConfig {
            min_frequency: 0,
            ..Default::default()
        };
        assert!(matches!(BpeTrainer::new(config).train(["aa aa"]), Err(Error::Config(_))));
    }
}
