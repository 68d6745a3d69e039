// ============================================================
// Layer 5 — Beam Search Caption Generator
// ============================================================
// Generates captions for one image by beam search over any
// CaptionModel:
//
//   feed_image ──▶ [<S>]                       (initial beam)
//                   │
//   repeat up to max_caption_length - 1 times:
//                   │  inference_step on every partial caption
//                   ▼
//      top beam_size words of each distribution
//           ├── word == </S>  → complete (score may be length-normalized)
//           └── otherwise     → partial  (score = logprob)
//      both sets keep only the beam_size best
//                   │
//   stop early once no partial captions remain
//
// If nothing ever emitted </S>, the surviving partial captions
// are returned instead.
//
// Reference: Vinyals et al. (2015) Show and Tell, §3.2

use anyhow::{ensure, Result};
use serde::{Deserialize, Serialize};

use crate::domain::caption::{Caption, TopN};
use crate::domain::traits::CaptionModel;

/// Words below this probability are never expanded.
const MIN_WORD_PROBABILITY: f32 = 1e-12;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BeamSearchConfig {
    pub beam_size:                   usize,
    /// Upper bound on sentence length, start word included
    pub max_caption_length:          usize,
    /// If > 0, completed scores are logprob / len^factor
    pub length_normalization_factor: f64,
}

impl Default for BeamSearchConfig {
    fn default() -> Self {
        Self {
            beam_size:                   3,
            max_caption_length:          20,
            length_normalization_factor: 0.0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CaptionGenerator {
    config:   BeamSearchConfig,
    start_id: u32,
    end_id:   u32,
}

impl CaptionGenerator {
    pub fn new(config: BeamSearchConfig, start_id: u32, end_id: u32) -> Self {
        let config = BeamSearchConfig { beam_size: config.beam_size.max(1), ..config };
        Self { config, start_id, end_id }
    }

    /// Run beam search and return captions sorted by descending score.
    pub fn beam_search<M: CaptionModel>(
        &self,
        model:         &M,
        encoded_image: &[u8],
    ) -> Result<Vec<Caption<M::State>>> {
        let beam_size = self.config.beam_size;

        let initial_state = model.feed_image(encoded_image)?;
        let mut partial  = TopN::new(beam_size);
        let mut complete = TopN::new(beam_size);
        partial.push(Caption::new(vec![self.start_id], initial_state, 0.0, 0.0));

        for _ in 1..self.config.max_caption_length {
            let partial_captions = partial.extract(false);
            partial.reset();

            let input_feed: Vec<u32> = partial_captions.iter().map(Caption::last_word).collect();
            let state_feed: Vec<M::State> =
                partial_captions.iter().map(|c| c.state.clone()).collect();

            let (softmax, new_states) = model.inference_step(&input_feed, &state_feed)?;
            ensure!(
                softmax.len() == partial_captions.len() && new_states.len() == partial_captions.len(),
                "inference_step returned {} distributions and {} states for {} inputs",
                softmax.len(),
                new_states.len(),
                partial_captions.len(),
            );

            let steps = partial_captions.iter().zip(softmax).zip(new_states);
            for ((caption, word_probabilities), state) in steps {
                for (word, p) in top_words(&word_probabilities, beam_size) {
                    if p < MIN_WORD_PROBABILITY {
                        continue;
                    }

                    let mut sentence = caption.sentence.clone();
                    sentence.push(word);
                    let logprob = caption.logprob + f64::from(p).ln();

                    if word == self.end_id {
                        let score = self.completed_score(logprob, sentence.len());
                        let mut beam = Caption::new(sentence, state.clone(), logprob, score);
                        beam.finished = true;
                        complete.push(beam);
                    } else {
                        partial.push(Caption::new(sentence, state.clone(), logprob, logprob));
                    }
                }
            }

            if partial.is_empty() {
                break;
            }
        }

        if complete.is_empty() {
            tracing::debug!("No caption reached the end word; returning partial captions");
            let mut truncated = partial.extract(true);
            for caption in &mut truncated {
                caption.finished = true;
            }
            return Ok(truncated);
        }
        Ok(complete.extract(true))
    }

    fn completed_score(&self, logprob: f64, len: usize) -> f64 {
        let factor = self.config.length_normalization_factor;
        if factor > 0.0 {
            logprob / (len as f64).powf(factor)
        } else {
            logprob
        }
    }
}

/// The `k` most probable (word, probability) pairs, most probable
/// first. Equal probabilities keep ascending word order.
fn top_words(probabilities: &[f32], k: usize) -> Vec<(u32, f32)> {
    let mut words: Vec<(u32, f32)> = probabilities
        .iter()
        .enumerate()
        .map(|(w, &p)| (w as u32, p))
        .collect();
    words.sort_by(|a, b| b.1.total_cmp(&a.1));
    words.truncate(k);
    words
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, Rng, SeedableRng};
    use std::cell::Cell;
    use std::collections::HashMap;

    const START: u32 = 0;
    const END:   u32 = 1;

    /// Next-word distribution depends only on the last word.
    /// The state counts how many words the hypothesis has.
    struct TableModel {
        table: HashMap<u32, Vec<f32>>,
        calls: Cell<usize>,
    }

    impl TableModel {
        fn new(rows: &[(u32, [f32; 5])]) -> Self {
            let table = rows.iter().map(|(w, p)| (*w, p.to_vec())).collect();
            Self { table, calls: Cell::new(0) }
        }
    }

    impl CaptionModel for TableModel {
        type State = usize;

        fn feed_image(&self, _encoded_image: &[u8]) -> Result<usize> {
            Ok(1)
        }

        fn inference_step(&self, input_feed: &[u32], state_feed: &[usize]) -> Result<(Vec<Vec<f32>>, Vec<usize>)> {
            self.calls.set(self.calls.get() + 1);
            let probs = input_feed
                .iter()
                .map(|w| self.table.get(w).cloned().unwrap_or_else(|| vec![0.0; 5]))
                .collect();
            Ok((probs, state_feed.iter().map(|s| s + 1).collect()))
        }
    }

    fn generator(beam_size: usize, max_len: usize, norm: f64) -> CaptionGenerator {
        CaptionGenerator::new(
            BeamSearchConfig {
                beam_size,
                max_caption_length:          max_len,
                length_normalization_factor: norm,
            },
            START,
            END,
        )
    }

    fn sentences<S>(captions: &[Caption<S>]) -> Vec<Vec<u32>> {
        captions.iter().map(|c| c.sentence.clone()).collect()
    }

    #[test]
    fn test_best_two_captions() {
        let model = TableModel::new(&[
            (START, [0.0, 0.1, 0.5, 0.4, 0.0]),
            (2,     [0.0, 0.9, 0.0, 0.0, 0.1]),
            (3,     [0.0, 1.0, 0.0, 0.0, 0.0]),
            (4,     [0.0, 1.0, 0.0, 0.0, 0.0]),
        ]);
        let captions = generator(2, 20, 0.0).beam_search(&model, b"img").unwrap();

        assert_eq!(sentences(&captions), vec![vec![0, 2, 1], vec![0, 3, 1]]);
        assert!((captions[0].probability() - 0.45).abs() < 1e-6);
        assert!((captions[1].probability() - 0.4).abs() < 1e-6);
        assert!(captions.iter().all(|c| c.finished));
        // The state is the one produced by the step that emitted </S>
        assert_eq!(captions[0].state, 3);
        // Stops once the last partial caption has finished
        assert_eq!(model.calls.get(), 3);
    }

    #[test]
    fn test_equal_scores_keep_insertion_order() {
        let model = TableModel::new(&[
            (START, [0.0, 0.3, 0.7, 0.0, 0.0]),
            (2,     [0.0, 0.5, 0.0, 0.5, 0.0]),
            (3,     [0.0, 1.0, 0.0, 0.0, 0.0]),
        ]);
        let captions = generator(2, 20, 0.0).beam_search(&model, b"img").unwrap();

        // [0,2,1] and [0,2,3,1] share a logprob; the earlier one ranks first
        assert_eq!(sentences(&captions), vec![vec![0, 2, 1], vec![0, 2, 3, 1]]);
    }

    #[test]
    fn test_length_normalization_prefers_longer_caption() {
        let model = TableModel::new(&[
            (START, [0.0, 0.3, 0.7, 0.0, 0.0]),
            (2,     [0.0, 0.5, 0.0, 0.5, 0.0]),
            (3,     [0.0, 1.0, 0.0, 0.0, 0.0]),
        ]);
        let captions = generator(2, 20, 1.0).beam_search(&model, b"img").unwrap();

        assert_eq!(sentences(&captions), vec![vec![0, 2, 3, 1], vec![0, 2, 1]]);
        let expected = (0.35f64).ln() / 4.0;
        assert!((captions[0].score - expected).abs() < 1e-6);
        // logprob itself is not normalized
        assert!((captions[0].logprob - (0.35f64).ln()).abs() < 1e-6);
    }

    #[test]
    fn test_returns_partials_when_nothing_finishes() {
        let model = TableModel::new(&[
            (START, [0.0, 0.0, 1.0, 0.0, 0.0]),
            (2,     [0.0, 0.0, 1.0, 0.0, 0.0]),
        ]);
        let captions = generator(3, 4, 0.0).beam_search(&model, b"img").unwrap();

        assert_eq!(sentences(&captions), vec![vec![0, 2, 2, 2]]);
        assert!(captions[0].finished);
    }

    #[test]
    fn test_max_length_one_returns_start_word() {
        let model    = TableModel::new(&[]);
        let captions = generator(3, 1, 0.0).beam_search(&model, b"img").unwrap();
        assert_eq!(sentences(&captions), vec![vec![START]]);
        assert_eq!(model.calls.get(), 0);
    }

    #[test]
    fn test_model_error_propagates() {
        struct Failing;
        impl CaptionModel for Failing {
            type State = ();
            fn feed_image(&self, _: &[u8]) -> Result<()> { Ok(()) }
            fn inference_step(&self, _: &[u32], _: &[()]) -> Result<(Vec<Vec<f32>>, Vec<()>)> {
                anyhow::bail!("device lost")
            }
        }
        let err = generator(3, 20, 0.0).beam_search(&Failing, b"img").unwrap_err();
        assert!(err.to_string().contains("device lost"));
    }

    /// Distribution derived from (last word, sentence length)
    struct RandomModel {
        vocab_size: usize,
    }

    impl CaptionModel for RandomModel {
        type State = u64;

        fn feed_image(&self, encoded_image: &[u8]) -> Result<u64> {
            Ok(encoded_image.len() as u64)
        }

        fn inference_step(&self, input_feed: &[u32], state_feed: &[u64]) -> Result<(Vec<Vec<f32>>, Vec<u64>)> {
            let mut probs = Vec::new();
            for (&w, &s) in input_feed.iter().zip(state_feed) {
                let mut rng = StdRng::seed_from_u64(u64::from(w) * 7919 + s);
                let raw: Vec<f32> = (0..self.vocab_size).map(|_| rng.gen_range(0.0..1.0)).collect();
                let total: f32 = raw.iter().sum();
                probs.push(raw.into_iter().map(|p| p / total).collect());
            }
            Ok((probs, state_feed.iter().map(|s| s + 1).collect()))
        }
    }

    #[test]
    fn test_beam_invariants_over_many_images() {
        let model = RandomModel { vocab_size: 6 };
        for beam_size in 1..=4 {
            for image_len in 0..10 {
                let image    = vec![0u8; image_len];
                let max_len  = 3 + image_len % 5;
                let captions = generator(beam_size, max_len, 0.0).beam_search(&model, &image).unwrap();

                assert!(!captions.is_empty());
                assert!(captions.len() <= beam_size);
                for c in &captions {
                    assert!(c.len() <= max_len);
                    assert_eq!(c.sentence[0], START);
                    // </S> only ever appears as the final word
                    let end_pos = c.sentence.iter().position(|&w| w == END);
                    if let Some(pos) = end_pos {
                        assert_eq!(pos, c.len() - 1);
                    }
                }
                for pair in captions.windows(2) {
                    assert!(pair[0].score >= pair[1].score);
                }
            }
        }
    }
}
