// ============================================================
// Layer 4 — Caption Preprocessor
// ============================================================
// Turns a raw caption sentence into the word list stored in a
// training example:
//
//   "A dog  runs\tacross the grass."
//       │ clean      → "A dog runs across the grass."
//       │ lowercase  → "a dog runs across the grass."
//       │ split      → ["a", "dog", "runs", "across", "the", "grass", "."]
//       ▼ wrap       → ["<S>", "a", ..., ".", "</S>"]
//
// Word splitting uses the HuggingFace `tokenizers` whitespace
// pre-tokenizer, which separates runs of word characters from
// runs of punctuation.
//
// Reference: Rust Book §8 (Strings in Rust)

use anyhow::Result;
use tokenizers::pre_tokenizers::whitespace::Whitespace;
use tokenizers::{OffsetReferential, OffsetType, PreTokenizedString, PreTokenizer};

use crate::domain::vocabulary::{END_WORD, START_WORD};

pub struct Preprocessor {
    splitter:   Whitespace,
    start_word: String,
    end_word:   String,
}

impl Preprocessor {
    pub fn new() -> Self {
        Self::with_reserved_words(START_WORD, END_WORD)
    }

    pub fn with_reserved_words(start_word: &str, end_word: &str) -> Self {
        Self {
            splitter:   Whitespace::default(),
            start_word: start_word.to_string(),
            end_word:   end_word.to_string(),
        }
    }

    /// Normalise whitespace and drop control characters.
    pub fn clean(&self, text: &str) -> String {
        let mapped: String = text
            .chars()
            .map(|c| match c {
                '\u{00A0}' | '\u{200B}' | '\u{FEFF}' => ' ',
                c if c.is_control() => ' ',
                c => c,
            })
            .collect();

        mapped.split_whitespace().collect::<Vec<_>>().join(" ")
    }

    /// Clean, lowercase and split a caption, then wrap it with the
    /// start and end words.
    pub fn process_caption(&self, caption: &str) -> Result<Vec<String>> {
        let cleaned = self.clean(caption).to_lowercase();

        let mut pretokenized = PreTokenizedString::from(cleaned.as_str());
        self.splitter
            .pre_tokenize(&mut pretokenized)
            .map_err(|e| anyhow::anyhow!("Tokenisation error: {e}"))?;

        let mut words = Vec::with_capacity(16);
        words.push(self.start_word.clone());
        words.extend(
            pretokenized
                .get_splits(OffsetReferential::Original, OffsetType::Byte)
                .into_iter()
                .map(|(word, _, _)| word.to_string()),
        );
        words.push(self.end_word.clone());
        Ok(words)
    }
}

impl Default for Preprocessor {
    fn default() -> Self {
        Self::new()
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collapses_multiple_spaces() {
        let p = Preprocessor::new();
        assert_eq!(p.clean("a   dog\t\truns"), "a dog runs");
    }

    #[test]
    fn test_removes_control_chars() {
        let p = Preprocessor::new();
        assert_eq!(p.clean("a\x01dog"), "a dog");
    }

    #[test]
    fn test_caption_is_wrapped_and_lowercased() {
        let p = Preprocessor::new();
        let words = p.process_caption("A Dog runs.").unwrap();
        assert_eq!(words, vec!["<S>", "a", "dog", "runs", ".", "</S>"]);
    }

    #[test]
    fn test_punctuation_is_split_off() {
        let p = Preprocessor::new();
        let words = p.process_caption("man, woman").unwrap();
        assert_eq!(words, vec!["<S>", "man", ",", "woman", "</S>"]);
    }

    #[test]
    fn test_empty_caption_keeps_reserved_words() {
        let p = Preprocessor::new();
        assert_eq!(p.process_caption("   ").unwrap(), vec!["<S>", "</S>"]);
    }
}
