// ============================================================
// Layer 3 — Vocabulary
// ============================================================
// Bidirectional mapping between caption words and integer ids.
//
// The on-disk form is a word-counts file, one "word count" pair
// per line, most frequent first. A word's id is its line index.
//
//   a 2150
//   <S> 1900
//   </S> 1900
//   on 820
//   ...
//
// The start and end words must be present. The unknown word is
// appended as the last id when the file does not contain it.
// The mapping never changes after it is built.

use std::collections::HashMap;

use crate::error::CaptionError;

pub const START_WORD: &str = "<S>";
pub const END_WORD:   &str = "</S>";
pub const UNK_WORD:   &str = "<UNK>";

#[derive(Debug, Clone)]
pub struct Vocabulary {
    vocab:         HashMap<String, u32>,
    reverse_vocab: Vec<String>,
    start_id:      u32,
    end_id:        u32,
    unk_id:        u32,
}

impl Vocabulary {
    /// Build a vocabulary from words in id order using the default
    /// reserved words.
    pub fn from_words<I, S>(words: I) -> Result<Self, CaptionError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::with_reserved_words(words, START_WORD, END_WORD, UNK_WORD)
    }

    pub fn with_reserved_words<I, S>(
        words:      I,
        start_word: &str,
        end_word:   &str,
        unk_word:   &str,
    ) -> Result<Self, CaptionError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut reverse_vocab: Vec<String> = Vec::new();
        let mut vocab: HashMap<String, u32> = HashMap::new();

        for word in words {
            let word = word.into();
            // First occurrence wins so ids stay stable on duplicate lines
            if !vocab.contains_key(&word) {
                vocab.insert(word.clone(), reverse_vocab.len() as u32);
                reverse_vocab.push(word);
            }
        }

        let start_id = *vocab
            .get(start_word)
            .ok_or_else(|| CaptionError::MissingReservedWord(start_word.to_string()))?;
        let end_id = *vocab
            .get(end_word)
            .ok_or_else(|| CaptionError::MissingReservedWord(end_word.to_string()))?;

        let unk_id = match vocab.get(unk_word) {
            Some(&id) => id,
            None => {
                let id = reverse_vocab.len() as u32;
                vocab.insert(unk_word.to_string(), id);
                reverse_vocab.push(unk_word.to_string());
                id
            }
        };

        tracing::debug!(
            "Vocabulary ready: {} words (start={}, end={}, unk={})",
            reverse_vocab.len(), start_id, end_id, unk_id
        );

        Ok(Self { vocab, reverse_vocab, start_id, end_id, unk_id })
    }

    /// Parse the contents of a word-counts file. Only the first
    /// whitespace-separated field of each line is used; blank
    /// lines are ignored.
    pub fn from_word_counts(text: &str) -> Result<Self, CaptionError> {
        let words = text
            .lines()
            .filter_map(|line| line.split_whitespace().next());
        Self::from_words(words)
    }

    pub fn word_to_id(&self, word: &str) -> u32 {
        self.vocab.get(word).copied().unwrap_or(self.unk_id)
    }

    pub fn id_to_word(&self, id: u32) -> &str {
        self.reverse_vocab
            .get(id as usize)
            .map(String::as_str)
            .unwrap_or_else(|| self.reverse_vocab[self.unk_id as usize].as_str())
    }

    pub fn start_id(&self) -> u32 { self.start_id }
    pub fn end_id(&self)   -> u32 { self.end_id }
    pub fn unk_id(&self)   -> u32 { self.unk_id }

    pub fn len(&self) -> usize { self.reverse_vocab.len() }

    pub fn is_empty(&self) -> bool { self.reverse_vocab.is_empty() }

    /// Convert a caption's words (start/end words included) into ids
    pub fn encode(&self, words: &[String]) -> Vec<u32> {
        words.iter().map(|w| self.word_to_id(w)).collect()
    }

    /// Join a generated sentence into text, dropping the start and
    /// end words.
    pub fn decode_sentence(&self, ids: &[u32]) -> String {
        ids.iter()
            .filter(|&&id| id != self.start_id && id != self.end_id)
            .map(|&id| self.id_to_word(id))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

// ─── Word Counting ────────────────────────────────────────────────────────────
/// Count words across tokenized captions and keep those seen at
/// least `min_word_count` times, most frequent first. Equal counts
/// are ordered alphabetically so the output is reproducible.
pub fn count_words<'a, I>(captions: I, min_word_count: usize) -> Vec<(String, usize)>
where
    I: IntoIterator<Item = &'a Vec<String>>,
{
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for caption in captions {
        for word in caption {
            *counts.entry(word.as_str()).or_insert(0) += 1;
        }
    }

    let mut word_counts: Vec<(String, usize)> = counts
        .into_iter()
        .filter(|&(_, c)| c >= min_word_count)
        .map(|(w, c)| (w.to_string(), c))
        .collect();
    word_counts.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    word_counts
}
