// ============================================================
// Layer 2 — CaptionUseCase
// ============================================================
// Generates captions for images with a trained model:
//
//   Step 1: Load vocabulary           (Layer 6 - infra)
//   Step 2: Load model from checkpoint (Layer 5 - ml)
//   Step 3: Beam search per image      (Layer 5 - ml)
//   Step 4: Decode ids to sentences    (Layer 3 - domain)
//
// Used by the `caption` command for files on disk and, through
// the ImageCaptioner trait, by the web server for uploads.

use anyhow::{Context, Result};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use crate::application::config::CaptionConfig;
use crate::domain::{
    traits::{CaptionModel, ImageCaptioner},
    vocabulary::Vocabulary,
};
use crate::infra::{file_patterns::expand_file_patterns, vocab_store::load_vocabulary};
use crate::ml::{
    caption_generator::{BeamSearchConfig, CaptionGenerator},
    inference_wrapper::{InferBackend, InferenceWrapper},
};

/// A decoded caption and its probability.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredSentence {
    /// Words joined by spaces, start and end words removed
    pub sentence:    String,
    pub probability: f64,
}

impl fmt::Display for ScoredSentence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (p={:.6})", self.sentence, self.probability)
    }
}

/// All captions generated for one input file.
#[derive(Debug, Clone)]
pub struct ImageCaptions {
    pub path:     PathBuf,
    pub captions: Vec<ScoredSentence>,
}

pub struct CaptionUseCase<M: CaptionModel> {
    model:     M,
    vocab:     Vocabulary,
    generator: CaptionGenerator,
}

impl CaptionUseCase<InferenceWrapper<InferBackend>> {
    /// Load the vocabulary and a checkpoint on the default GPU device.
    pub fn load(cfg: &CaptionConfig) -> Result<Self> {
        let vocab = load_vocabulary(&cfg.vocab_file)?;
        let model = InferenceWrapper::from_checkpoint(
            Path::new(&cfg.checkpoint_path),
            Default::default(),
        )?;
        Ok(Self::new(model, vocab, cfg.beam.clone()))
    }
}

impl<M: CaptionModel> CaptionUseCase<M> {
    pub fn new(model: M, vocab: Vocabulary, beam: BeamSearchConfig) -> Self {
        let generator = CaptionGenerator::new(beam, vocab.start_id(), vocab.end_id());
        Self { model, vocab, generator }
    }

    /// Best captions for one encoded image, most probable first.
    pub fn generate(&self, encoded_image: &[u8]) -> Result<Vec<ScoredSentence>> {
        let captions = self.generator.beam_search(&self.model, encoded_image)?;
        Ok(captions
            .iter()
            .map(|c| ScoredSentence {
                sentence:    self.vocab.decode_sentence(&c.sentence),
                probability: c.probability(),
            })
            .collect())
    }

    /// Caption every file matching a comma-separated list of globs.
    pub fn caption_files(&self, input_files: &str) -> Result<Vec<ImageCaptions>> {
        let paths = expand_file_patterns(input_files)?;
        tracing::info!(
            "Running caption generation on {} files matching {}",
            paths.len(),
            input_files
        );

        paths
            .into_iter()
            .map(|path| {
                let bytes = fs::read(&path)
                    .with_context(|| format!("Cannot read image '{}'", path.display()))?;
                let captions = self
                    .generate(&bytes)
                    .with_context(|| format!("Caption generation failed for '{}'", path.display()))?;
                Ok(ImageCaptions { path, captions })
            })
            .collect()
    }
}

impl<M: CaptionModel + Send> ImageCaptioner for CaptionUseCase<M> {
    fn caption(&self, encoded_image: &[u8]) -> Result<Vec<String>> {
        Ok(self.generate(encoded_image)?.iter().map(ToString::to_string).collect())
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    /// <S>=0 </S>=1 a=2 dog=3 cat=4; always "a dog" or "a cat"
    struct FixedModel;

    impl CaptionModel for FixedModel {
        type State = ();

        fn feed_image(&self, encoded_image: &[u8]) -> Result<()> {
            anyhow::ensure!(!encoded_image.is_empty(), "empty image");
            Ok(())
        }

        fn inference_step(&self, input_feed: &[u32], _: &[()]) -> Result<(Vec<Vec<f32>>, Vec<()>)> {
            let probs = input_feed
                .iter()
                .map(|&w| match w {
                    0 => vec![0.0, 0.0, 1.0, 0.0, 0.0],
                    2 => vec![0.0, 0.0, 0.0, 0.75, 0.25],
                    _ => vec![0.0, 1.0, 0.0, 0.0, 0.0],
                })
                .collect();
            Ok((probs, vec![(); input_feed.len()]))
        }
    }

    fn use_case() -> CaptionUseCase<FixedModel> {
        let vocab = Vocabulary::from_words(["<S>", "</S>", "a", "dog", "cat"]).unwrap();
        CaptionUseCase::new(FixedModel, vocab, BeamSearchConfig::default())
    }

    #[test]
    fn test_sentences_drop_reserved_words() {
        let out = use_case().generate(b"jpeg bytes").unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].sentence, "a dog");
        assert!((out[0].probability - 0.75).abs() < 1e-6);
        assert_eq!(out[1].sentence, "a cat");
    }

    #[test]
    fn test_captioner_formats_probability() {
        let lines = use_case().caption(b"jpeg bytes").unwrap();
        assert_eq!(lines, vec!["a dog (p=0.750000)", "a cat (p=0.250000)"]);
    }

    #[test]
    fn test_caption_files_reads_each_match() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("one.jpg"), b"x").unwrap();
        fs::write(dir.path().join("two.jpg"), b"y").unwrap();

        let results = use_case()
            .caption_files(&format!("{}/*.jpg", dir.path().display()))
            .unwrap();
        assert_eq!(results.len(), 2);
        assert!(results[0].path.ends_with("one.jpg"));
        assert_eq!(results[1].captions[0].sentence, "a dog");
    }

    #[test]
    fn test_model_failure_names_the_file() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("empty.jpg"), b"").unwrap();
        let err = use_case()
            .caption_files(&format!("{}/empty.jpg", dir.path().display()))
            .unwrap_err();
        assert!(format!("{err:#}").contains("empty.jpg"));
    }
}
