// ============================================================
// Layer 6 — Vocabulary Store
// ============================================================
// Persists the vocabulary as a plain-text word-counts file:
//
//   <S> 586368
//   </S> 586368
//   a 896457
//   ...
//
// Line i holds the word with id i. The same file is written by
// build-data and read back by training, evaluation and inference
// so every stage agrees on the ids.

use anyhow::{Context, Result};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::domain::vocabulary::Vocabulary;

pub fn save_word_counts(path: impl AsRef<Path>, word_counts: &[(String, usize)]) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let file = File::create(path)
        .with_context(|| format!("Cannot create word counts file '{}'", path.display()))?;
    let mut w = BufWriter::new(file);
    for (word, count) in word_counts {
        writeln!(w, "{word} {count}")?;
    }
    w.flush()?;
    tracing::info!("Wrote {} words to '{}'", word_counts.len(), path.display());
    Ok(())
}

pub fn load_vocabulary(path: impl AsRef<Path>) -> Result<Vocabulary> {
    let path = path.as_ref();
    tracing::info!("Initializing vocabulary from file: {}", path.display());
    let text = fs::read_to_string(path)
        .with_context(|| format!("Cannot read vocabulary file '{}'", path.display()))?;
    let vocab = Vocabulary::from_word_counts(&text)
        .with_context(|| format!("Invalid vocabulary file '{}'", path.display()))?;
    tracing::info!("Created vocabulary with {} words", vocab.len());
    Ok(vocab)
}
