use std::fs::{self, File};
use std::io::{BufRead, BufReader};
use std::path::PathBuf;
use std::sync::mpsc;
use std::thread;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser};
use env_logger::Env;
use log::{info, LevelFilter};
use subword_tokenizer::{BpeTrainer, BpeTrainerConfig, CorpusFrequencyTable, TrainingProgress};

const DEFAULT_OUTPUT: &str = "model/tokenizer.json";

#[derive(Parser, Debug)]
#[command(author, version, about = "Train a BPE subword tokenizer", long_about = None)]
struct Args {
    /// Line-oriented corpus files; each non-blank line is one text
    #[arg(long = "corpus", value_name = "PATH", required = true)]
    corpus: Vec<PathBuf>,

    /// Output path for the tokenizer artifact
    #[arg(short, long, value_name = "PATH", default_value = DEFAULT_OUTPUT)]
    output: PathBuf,

    /// JSON file holding a trainer configuration; flags below override it
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Target vocabulary size
    #[arg(long, value_name = "SIZE")]
    vocab_size: Option<usize>,

    /// Minimum pair frequency for a merge
    #[arg(long, value_name = "COUNT")]
    min_frequency: Option<u64>,

    /// Maximum merge iterations
    #[arg(long, value_name = "COUNT")]
    max_iterations: Option<usize>,

    /// Read at most this many texts (0 = all)
    #[arg(long, value_name = "N", default_value_t = 10_000)]
    max_texts: usize,

    /// Held-out text file to measure the compression ratio on
    #[arg(long, value_name = "PATH")]
    sample: Option<PathBuf>,

    /// Increase verbosity (-v, -vv)
    #[arg(short = 'v', long, action = ArgAction::Count)]
    verbose: u8,
}

fn main() {
    let args = Args::parse();
    init_logging(args.verbose);

    if let Err(err) = run(args) {
        eprintln!("training failed: {:#}", err);
        std::process::exit(1);
    }
}

/// Level forced by `-v`/`-vv`; without them `RUST_LOG` decides
fn verbosity_filter(verbose: u8) -> Option<LevelFilter> {
    match verbose {
        0 => None,
        1 => Some(LevelFilter::Debug),
        _ => Some(LevelFilter::Trace),
    }
}

fn init_logging(verbose: u8) {
    let mut builder = env_logger::Builder::from_env(Env::default().default_filter_or("info"));
    builder.format_timestamp_millis();
    if let Some(level) = verbosity_filter(verbose) {
        builder.filter_level(level);
    }
    let _ = builder.try_init();
}

fn load_config(args: &Args) -> Result<BpeTrainerConfig> {
    let mut config: BpeTrainerConfig = match &args.config {
        Some(path) => {
            let raw = fs::read_to_string(path)
                .with_context(|| format!("failed to read config {}", path.display()))?;
            serde_json::from_str(&raw)
                .with_context(|| format!("failed to parse config {}", path.display()))?
        }
        None => BpeTrainerConfig::default(),
    };

    if let Some(vocab_size) = args.vocab_size {
        config.vocab_size = vocab_size;
    }
    if let Some(min_frequency) = args.min_frequency {
        config.min_frequency = min_frequency;
    }
    if args.max_iterations.is_some() {
        config.max_iterations = args.max_iterations;
    }
    // Progress is printed from the channel below
    config.show_progress = false;
    Ok(config)
}

/// Count words from the corpus files, stopping after `max_texts` texts
fn count_corpus(paths: &[PathBuf], max_texts: usize) -> Result<(CorpusFrequencyTable, usize)> {
    let mut table = CorpusFrequencyTable::new();
    let mut texts = 0;

    'files: for path in paths {
        let file =
            File::open(path).with_context(|| format!("failed to open corpus {}", path.display()))?;
        for line in BufReader::new(file).lines() {
            let line = line.with_context(|| format!("failed to read {}", path.display()))?;
            if line.trim().is_empty() {
                continue;
            }
            if max_texts > 0 && texts >= max_texts {
                break 'files;
            }
            table.add_text(&line);
            texts += 1;
            if texts % 1000 == 0 {
                info!("Loaded {} texts...", texts);
            }
        }
    }

    Ok((table, texts))
}

fn run(args: Args) -> Result<()> {
    let config = load_config(&args)?;
    let log_every = config.log_every;

    let (table, texts) = count_corpus(&args.corpus, args.max_texts)?;
    info!(
        "Loaded {} texts: {} distinct words, {} word occurrences",
        texts,
        table.len(),
        table.total_words()
    );

    let (tx, rx) = mpsc::channel::<TrainingProgress>();
    let reporter = thread::spawn(move || {
        for event in rx {
            if event.iteration % log_every == 0 {
                info!(
                    "merge {:>6}: vocab {:>6}, freq {:>8}, {:?}",
                    event.iteration, event.vocab_size, event.frequency, event.symbol
                );
            }
        }
    });

    info!("Training tokenizer with vocab size: {}", config.vocab_size);
    let trainer = BpeTrainer::new(config).with_progress(tx);
    let outcome = trainer.train_from_table(&table);
    // Dropping the trainer closes the channel and ends the reporter
    drop(trainer);
    let _ = reporter.join();
    let outcome = outcome?;

    outcome
        .tokenizer
        .save(&args.output)
        .with_context(|| format!("failed to save tokenizer to {}", args.output.display()))?;

    info!(
        "training complete: vocab={} merges={} stop={:?} duration={:.2?}",
        outcome.tokenizer.vocab_size(),
        outcome.stats.merges,
        outcome.stop_reason,
        outcome.stats.elapsed
    );
    info!(
        "training corpus compression: {:.3} chars/token",
        outcome.stats.compression_ratio()
    );

    if let Some(sample) = &args.sample {
        let text = fs::read_to_string(sample)
            .with_context(|| format!("failed to read sample {}", sample.display()))?;
        info!(
            "held-out compression ({}): {:.3} chars/token",
            sample.display(),
            outcome.tokenizer.compression_ratio(&text)
        );
    }

    info!("Saved tokenizer to {}", args.output.display());
    Ok(())
}
