use std::fs;

use subword_tokenizer::{
    BpeTokenizer, BpeTrainerBuilder, Error, PreTokenizer, StopReason, TrainingOutcome,
    UNKNOWN_ID,
};
use tempfile::TempDir;

const CORPUS: &[&str] = &[
    "the quick brown fox jumps over the lazy dog",
    "the dog sleeps, the fox runs  away",
    "a quick test of the tokenizer: 42 tokens or fewer!",
    "मी मराठी शिकतो आणि मराठी बोलतो",
    "पाणी आणि दूध",
    "  leading and trailing whitespace\t",
];

fn train(vocab_size: usize) -> TrainingOutcome {
    BpeTrainerBuilder::new()
        .vocab_size(vocab_size)
        .show_progress(false)
        .build()
        .train(CORPUS)
        .unwrap()
}

#[test]
fn test_roundtrip_reproduces_normalized_text() {
    let tokenizer = train(120).tokenizer;
    let normalizer = PreTokenizer::new();

    for text in CORPUS {
        let ids = tokenizer.encode(text);
        assert!(!ids.contains(&UNKNOWN_ID), "unexpected unknown in {:?}", text);
        assert_eq!(tokenizer.decode(&ids).unwrap(), normalizer.normalize(text));
    }
}

#[test]
fn test_vocab_size_law() {
    for target in [70, 90, 1000] {
        let outcome = train(target);
        let tokenizer = &outcome.tokenizer;
        assert_eq!(
            tokenizer.vocab_size(),
            tokenizer.alphabet_size() + tokenizer.merges().len()
        );
        assert!(tokenizer.vocab_size() <= target);
        if outcome.stop_reason == StopReason::TargetReached {
            assert_eq!(tokenizer.vocab_size(), target);
        }
    }
    assert_eq!(train(1000).stop_reason, StopReason::NoRepeatingPairs);
}

#[test]
fn test_training_is_deterministic() {
    let a = train(100).tokenizer;
    let b = train(100).tokenizer;
    assert_eq!(a.merges(), b.merges());
    assert_eq!(a.to_json_string().unwrap(), b.to_json_string().unwrap());
}

#[test]
fn test_merged_symbols_are_concatenations() {
    let tokenizer = train(100).tokenizer;
    let alphabet = tokenizer.alphabet_size();
    for (rank, rule) in tokenizer.merges().iter().enumerate() {
        let id = tokenizer.token_to_id(&rule.merged).unwrap();
        assert_eq!(id as usize, alphabet + rank);
        assert_eq!(&*rule.merged, format!("{}{}", rule.left, rule.right));
        assert!(tokenizer.token_to_id(&rule.left).unwrap() < id);
        assert!(tokenizer.token_to_id(&rule.right).unwrap() < id);
    }
}

#[test]
fn test_persistence_fidelity() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("model").join("tokenizer.json");
    let sample = "the lazy fox, मराठी पाणी";

    let tokenizer = train(100).tokenizer;
    let before = tokenizer.encode(sample);
    tokenizer.save(&path).unwrap();

    let loaded = BpeTokenizer::from_file(&path).unwrap();
    assert_eq!(loaded.encode(sample), before);
    assert_eq!(loaded.vocab_size(), tokenizer.vocab_size());
    assert_eq!(loaded.decode(&before).unwrap(), tokenizer.decode(&before).unwrap());
}

#[test]
fn test_truncated_artifact_is_corrupt() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("tokenizer.json");
    train(100).tokenizer.save(&path).unwrap();

    let bytes = fs::read(&path).unwrap();
    fs::write(&path, &bytes[..bytes.len() * 2 / 3]).unwrap();

    assert!(matches!(
        BpeTokenizer::from_file(&path),
        Err(Error::CorruptArtifact(_))
    ));
}

#[test]
fn test_tampered_artifacts_are_corrupt() {
    let json = train(100).tokenizer.to_json_string().unwrap();
    let artifact: serde_json::Value = serde_json::from_str(&json).unwrap();

    let mut unknown_symbol = artifact.clone();
    unknown_symbol["merges"][0][0] = serde_json::json!("not a symbol");

    let mut dropped_entry = artifact.clone();
    dropped_entry["vocab"].as_array_mut().unwrap().pop();

    let mut shuffled_ids = artifact;
    shuffled_ids["vocab"][3]["id"] = serde_json::json!(4);

    for tampered in [unknown_symbol, dropped_entry, shuffled_ids] {
        assert!(matches!(
            BpeTokenizer::from_json_str(&tampered.to_string()),
            Err(Error::CorruptArtifact(_))
        ));
    }
}

#[test]
fn test_unknown_codepoints_do_not_abort() {
    let tokenizer = train(100).tokenizer;
    let enc = tokenizer.encode_to_encoding("the ☃ fox");
    assert_eq!(enc.unknown_symbols, 1);
    assert!(enc.ids.contains(&UNKNOWN_ID));
    assert_eq!(enc.ids.len(), enc.offsets.len());
}

#[test]
fn test_decode_rejects_out_of_range_ids() {
    let tokenizer = train(100).tokenizer;
    let id = tokenizer.vocab_size() as u32;
    assert!(matches!(
        tokenizer.decode(&[0, id]),
        Err(Error::InvalidTokenId { .. })
    ));
}

#[test]
fn test_compression_ratio_is_reproducible() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("tokenizer.json");
    train(150).tokenizer.save(&path).unwrap();
    let tokenizer = BpeTokenizer::from_file(&path).unwrap();

    let held_out = "the brown dog runs over the quick fox";
    let first = tokenizer.compression_ratio(held_out);
    assert!(first > 1.0);
    for _ in 0..5 {
        assert_eq!(tokenizer.compression_ratio(held_out), first);
    }
}

#[test]
fn test_concurrent_encoding_shares_tokenizer() {
    let tokenizer = train(100).tokenizer;
    let expected: Vec<Vec<u32>> = CORPUS.iter().map(|t| tokenizer.encode(t)).collect();

    std::thread::scope(|s| {
        let handles: Vec<_> = (0..4)
            .map(|_| s.spawn(|| CORPUS.iter().map(|t| tokenizer.encode(t)).collect::<Vec<_>>()))
            .collect();
        for handle in handles {
            assert_eq!(handle.join().unwrap(), expected);
        }
    });

    assert_eq!(tokenizer.encode_batch(CORPUS), expected);
}
