// ============================================================
// Layer 2 — BuildDataUseCase
// ============================================================
// Turns raw annotations and image files into training shards:
//
//   Step 1: Load image/caption metadata     (Layer 4 - data)
//   Step 2: Split images into train / val   (Layer 4 - data)
//   Step 3: Tokenize every caption          (Layer 4 - data)
//   Step 4: Build + save the vocabulary     (Layer 3 + 6)
//   Step 5: Shuffle image/caption pairs     (seeded)
//   Step 6: Write shards on worker threads  (Layer 4 - data)
//
// Each worker owns a disjoint set of shards; shard i receives
// the i-th contiguous slice of the shuffled pairs.

use anyhow::{anyhow, Context, Result};
use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};
use std::fs;
use std::path::Path;

use crate::application::config::BuildDataConfig;
use crate::data::{
    image_processing::ImageFormatKind,
    loader::CocoCaptionLoader,
    preprocessor::Preprocessor,
    shard::{shard_name, SequenceExample, ShardWriter},
    splitter::split_train_val,
};
use crate::domain::{
    image_metadata::ImageMetadata,
    traits::CaptionSource,
    vocabulary::{count_words, Vocabulary},
};
use crate::infra::vocab_store::save_word_counts;

/// One image/caption pair with its tokenized caption
type Pair = (ImageMetadata, Vec<String>);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuildDataSummary {
    pub train_examples: usize,
    pub val_examples:   usize,
    pub vocab_size:     usize,
}

pub struct BuildDataUseCase {
    config: BuildDataConfig,
}

impl BuildDataUseCase {
    pub fn new(config: BuildDataConfig) -> Self {
        Self { config }
    }

    pub fn execute(&self) -> Result<BuildDataSummary> {
        let cfg = &self.config;
        fs::create_dir_all(&cfg.output_dir)
            .with_context(|| format!("Cannot create output dir '{}'", cfg.output_dir))?;

        // ── Step 1: Load annotations ──────────────────────────────────────────
        let loader   = CocoCaptionLoader::new(&cfg.captions_file, &cfg.image_dir);
        let metadata = loader.load_all()?;

        // ── Step 2: Split at image level ──────────────────────────────────────
        let mut rng = StdRng::seed_from_u64(cfg.seed);
        let (train_images, val_images) = split_train_val(metadata, cfg.train_fraction, &mut rng);
        tracing::info!(
            "Split: {} train images, {} validation images",
            train_images.len(),
            val_images.len()
        );

        // ── Step 3: Tokenize ──────────────────────────────────────────────────
        let preprocessor = Preprocessor::new();
        let train_pairs  = tokenize(&preprocessor, train_images)?;
        let val_pairs    = tokenize(&preprocessor, val_images)?;

        // ── Step 4: Vocabulary from training captions only ────────────────────
        let word_counts = count_words(train_pairs.iter().map(|(_, words)| words), cfg.min_word_count);
        save_word_counts(&cfg.word_counts_file, &word_counts)?;
        let vocab = Vocabulary::from_words(word_counts.iter().map(|(w, _)| w.as_str()))?;

        // ── Steps 5 + 6: Shuffle and write ────────────────────────────────────
        let train_examples = self.process_dataset("train", train_pairs, cfg.train_shards, &vocab, &loader)?;
        let val_examples   = self.process_dataset("val",   val_pairs,   cfg.val_shards,   &vocab, &loader)?;

        Ok(BuildDataSummary { train_examples, val_examples, vocab_size: vocab.len() })
    }

    fn process_dataset(
        &self,
        name:       &str,
        mut pairs:  Vec<Pair>,
        num_shards: usize,
        vocab:      &Vocabulary,
        loader:     &CocoCaptionLoader,
    ) -> Result<usize> {
        let num_shards  = num_shards.max(1);
        let num_threads = self.config.num_threads.clamp(1, num_shards);

        // Same seed for every set, so reruns produce identical shards
        pairs.shuffle(&mut StdRng::seed_from_u64(self.config.seed));
        tracing::info!(
            "Processing {} {} examples into {} shards on {} threads",
            pairs.len(),
            name,
            num_shards,
            num_threads
        );

        let out_dir = Path::new(&self.config.output_dir);
        let format  = self.config.image_format;
        let pairs   = &pairs;

        let written: Vec<Result<usize>> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..num_threads)
                .map(|thread| {
                    scope.spawn(move || -> Result<usize> {
                        let mut total = 0;
                        for shard in (thread..num_shards).step_by(num_threads) {
                            let begin = shard * pairs.len() / num_shards;
                            let end   = (shard + 1) * pairs.len() / num_shards;
                            let path  = out_dir.join(shard_name(name, shard, num_shards));
                            total += write_shard(&path, &pairs[begin..end], vocab, loader, format)?;
                        }
                        Ok(total)
                    })
                })
                .collect();

            handles
                .into_iter()
                .map(|h| -> Result<usize> {
                    h.join().map_err(|_| anyhow!("Shard writer thread panicked"))?
                })
                .collect()
        });

        let mut total = 0;
        for result in written {
            total += result?;
        }
        tracing::info!("Finished processing all {} {} examples", total, name);
        Ok(total)
    }
}

fn tokenize(preprocessor: &Preprocessor, images: Vec<ImageMetadata>) -> Result<Vec<Pair>> {
    images
        .into_iter()
        .flat_map(ImageMetadata::split_captions)
        .map(|meta| {
            let words = preprocessor.process_caption(&meta.captions[0])?;
            Ok((meta, words))
        })
        .collect()
}

/// Write one shard, skipping images that are missing or do not
/// decode in `format`.
fn write_shard(
    path:   &Path,
    pairs:  &[Pair],
    vocab:  &Vocabulary,
    loader: &CocoCaptionLoader,
    format: ImageFormatKind,
) -> Result<usize> {
    let mut writer = ShardWriter::create(path)?;

    for (meta, words) in pairs {
        let image_path = loader.image_path(meta);
        let encoded_image = match fs::read(&image_path) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!("Skipping unreadable file '{}': {e}", image_path.display());
                continue;
            }
        };
        if let Err(e) = format.decode(&encoded_image) {
            tracing::warn!("Skipping file with invalid {format} data '{}': {e}", image_path.display());
            continue;
        }

        writer.write(&SequenceExample {
            image_id:      meta.image_id,
            filename:      meta.filename.clone(),
            caption_ids:   vocab.encode(words),
            caption:       words.clone(),
            encoded_image,
        })?;
    }

    let count = writer.finish()?;
    tracing::debug!("Wrote {} examples to '{}'", count, path.display());
    Ok(count)
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::image_processing::tests::solid_image;
    use crate::data::shard::read_shard;
    use crate::domain::vocabulary::{END_WORD, START_WORD};
    use crate::infra::file_patterns::expand_file_patterns;
    use crate::infra::vocab_store::load_vocabulary;

    fn fixture(dir: &Path) -> BuildDataConfig {
        let images = dir.join("images");
        fs::create_dir_all(&images).unwrap();
        fs::write(images.join("1.png"), solid_image(8, 8, [255, 0, 0], image::ImageFormat::Png)).unwrap();
        fs::write(images.join("2.png"), solid_image(8, 8, [0, 255, 0], image::ImageFormat::Png)).unwrap();
        fs::write(images.join("3.png"), b"corrupt").unwrap();

        let captions = serde_json::json!({
            "images": [
                { "id": 1, "file_name": "1.png" },
                { "id": 2, "file_name": "2.png" },
                { "id": 3, "file_name": "3.png" }
            ],
            "annotations": [
                { "image_id": 1, "caption": "A red square." },
                { "image_id": 1, "caption": "A red box" },
                { "image_id": 2, "caption": "A green square" },
                { "image_id": 3, "caption": "A broken image" },
                { "image_id": 3, "caption": "Nothing to see" }
            ]
        });
        let captions_file = dir.join("captions.json");
        fs::write(&captions_file, captions.to_string()).unwrap();

        let out = dir.join("out");
        BuildDataConfig {
            captions_file:    captions_file.display().to_string(),
            image_dir:        images.display().to_string(),
            output_dir:       out.display().to_string(),
            word_counts_file: out.join("word_counts.txt").display().to_string(),
            image_format:     ImageFormatKind::Png,
            train_fraction:   0.67,
            train_shards:     2,
            val_shards:       1,
            num_threads:      2,
            min_word_count:   1,
            seed:             12345,
        }
    }

    #[test]
    fn test_builds_shards_and_vocabulary() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = fixture(dir.path());

        let summary = BuildDataUseCase::new(cfg.clone()).execute().unwrap();
        // The two captions of the corrupt image are skipped
        assert_eq!(summary.train_examples + summary.val_examples, 3);

        let train = expand_file_patterns(&format!("{}/train-*", cfg.output_dir)).unwrap();
        let val   = expand_file_patterns(&format!("{}/val-*", cfg.output_dir)).unwrap();
        assert_eq!(train.len(), 2);
        assert_eq!(val.len(), 1);

        let vocab = load_vocabulary(&cfg.word_counts_file).unwrap();
        assert_eq!(vocab.len(), summary.vocab_size);

        let examples: Vec<SequenceExample> = train
            .iter()
            .chain(&val)
            .flat_map(|p| read_shard(p).unwrap())
            .collect();
        assert_eq!(examples.len(), 3);
        for ex in &examples {
            assert_eq!(ex.caption.first().map(String::as_str), Some(START_WORD));
            assert_eq!(ex.caption.last().map(String::as_str),  Some(END_WORD));
            assert_eq!(ex.caption_ids, vocab.encode(&ex.caption));
            assert!(ex.image_id == 1 || ex.image_id == 2);
        }
    }

    #[test]
    fn test_images_in_another_format_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = fixture(dir.path());
        let images = Path::new(&cfg.image_dir);
        // 1.png now holds jpeg bytes; 2.png stays a png
        fs::write(images.join("1.png"), solid_image(8, 8, [255, 0, 0], image::ImageFormat::Jpeg)).unwrap();
        cfg.image_format = ImageFormatKind::Jpeg;

        let summary = BuildDataUseCase::new(cfg.clone()).execute().unwrap();
        // Only the two captions of image 1 decode as jpeg
        assert_eq!(summary.train_examples + summary.val_examples, 2);

        let shards = expand_file_patterns(&format!("{}/*-of-*", cfg.output_dir)).unwrap();
        let examples: Vec<SequenceExample> = shards.iter().flat_map(|p| read_shard(p).unwrap()).collect();
        assert!(examples.iter().all(|ex| ex.image_id == 1));
        for ex in &examples {
            assert!(ImageFormatKind::Jpeg.decode(&ex.encoded_image).is_ok());
        }
    }

    #[test]
    fn test_rebuild_is_deterministic() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = fixture(dir.path());

        BuildDataUseCase::new(cfg.clone()).execute().unwrap();
        let first = read_shard(&Path::new(&cfg.output_dir).join(shard_name("train", 0, 2))).unwrap();
        BuildDataUseCase::new(cfg.clone()).execute().unwrap();
        let second = read_shard(&Path::new(&cfg.output_dir).join(shard_name("train", 0, 2))).unwrap();
        assert_eq!(first, second);
    }
}
