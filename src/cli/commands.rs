// ============================================================
// Layer 1 — CLI Commands and Arguments
// ============================================================
// Defines the five subcommands and their flags:
//
//   build-data  annotations + images → shards + word counts
//   train       shards → checkpoints
//   evaluate    checkpoints → perplexity
//   caption     checkpoint + vocabulary + image files → captions
//   serve       checkpoint + vocabulary → upload form
//
// Each Args struct converts into its application config with
// `From`, so the application layer never sees clap types.
//
// Reference: Rust Book §12 (Building a CLI Program)

use clap::{Args, Subcommand};

use crate::application::config::{
    BuildDataConfig, CaptionConfig, EvaluateConfig, ModelConfig, OptimizerKind, ServeConfig,
    TrainConfig, TrainingConfig,
};
use crate::data::image_processing::ImageFormatKind;
use crate::ml::caption_generator::BeamSearchConfig;

/// Environment variable that overrides `serve --addr`
pub const ADDR_ENV: &str = "SHOW_AND_TELL_ADDR";

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Convert COCO-style annotations and images into training shards
    BuildData(BuildDataArgs),

    /// Train the captioning model on shards
    Train(TrainArgs),

    /// Compute perplexity of checkpoints on validation shards
    Evaluate(EvaluateArgs),

    /// Caption image files with a trained checkpoint
    Caption(CaptionArgs),

    /// Serve a web form that captions uploaded images
    Serve(ServeArgs),
}

// ─── build-data ───────────────────────────────────────────────────────────────
#[derive(Args, Debug)]
pub struct BuildDataArgs {
    /// Annotation JSON with `images` and `annotations`
    #[arg(long, default_value = "raw-data/annotations/captions_train2014.json")]
    pub captions_file: String,

    /// Directory holding the image files named in the annotations
    #[arg(long, default_value = "raw-data/train2014")]
    pub image_dir: String,

    #[arg(long, default_value = "data/mscoco")]
    pub output_dir: String,

    /// Word counts file; written next to the shards when omitted
    #[arg(long)]
    pub word_counts_file: Option<String>,

    /// Format every image must decode as (jpeg or png)
    #[arg(long, default_value = "jpeg")]
    pub image_format: ImageFormatKind,

    /// Fraction of images kept for training, the rest is validation
    #[arg(long, default_value_t = 0.95)]
    pub train_fraction: f64,

    #[arg(long, default_value_t = 256)]
    pub train_shards: usize,

    #[arg(long, default_value_t = 4)]
    pub val_shards: usize,

    /// Shard writer threads
    #[arg(long, default_value_t = 8)]
    pub num_threads: usize,

    /// Words seen fewer times than this map to the unknown word
    #[arg(long, default_value_t = 4)]
    pub min_word_count: usize,

    #[arg(long, default_value_t = 12345)]
    pub seed: u64,
}

impl From<BuildDataArgs> for BuildDataConfig {
    fn from(a: BuildDataArgs) -> Self {
        let word_counts_file = a
            .word_counts_file
            .unwrap_or_else(|| format!("{}/word_counts.txt", a.output_dir));
        BuildDataConfig {
            captions_file:  a.captions_file,
            image_dir:      a.image_dir,
            output_dir:     a.output_dir,
            word_counts_file,
            image_format:   a.image_format,
            train_fraction: a.train_fraction,
            train_shards:   a.train_shards,
            val_shards:     a.val_shards,
            num_threads:    a.num_threads,
            min_word_count: a.min_word_count,
            seed:           a.seed,
        }
    }
}

// ─── train ────────────────────────────────────────────────────────────────────
#[derive(Args, Debug)]
pub struct TrainArgs {
    /// Comma-separated glob patterns of training shards
    #[arg(long, default_value = "data/mscoco/train-?????-of-00256")]
    pub input_file_pattern: String,

    /// Directory for checkpoints, train_config.json and metrics.csv
    #[arg(long, default_value = "model/train")]
    pub train_dir: String,

    /// Pretrained encoder weights to start from
    #[arg(long)]
    pub inception_checkpoint_file: Option<String>,

    /// Also update the image encoder
    #[arg(long)]
    pub train_inception: bool,

    #[arg(long, default_value_t = 1_000_000)]
    pub number_of_steps: usize,

    #[arg(long, default_value_t = 1)]
    pub log_every_n_steps: usize,

    #[arg(long, default_value_t = 1000)]
    pub save_every_n_steps: usize,

    /// jpeg or png
    #[arg(long, default_value = "jpeg")]
    pub image_format: ImageFormatKind,

    #[arg(long, default_value_t = 299)]
    pub image_size: u32,

    #[arg(long, default_value_t = 12000)]
    pub vocab_size: usize,

    #[arg(long, default_value_t = 512)]
    pub embedding_size: usize,

    #[arg(long, default_value_t = 512)]
    pub num_lstm_units: usize,

    #[arg(long, default_value_t = 0.7)]
    pub lstm_dropout_keep_prob: f64,

    #[arg(long, default_value_t = 32)]
    pub encoder_base_channels: usize,

    #[arg(long, default_value_t = 32)]
    pub batch_size: usize,

    #[arg(long, default_value_t = 4)]
    pub num_preprocess_threads: usize,

    /// DataLoader worker threads
    #[arg(long, default_value_t = 1)]
    pub num_input_reader_threads: usize,

    /// sgd or adam
    #[arg(long, default_value = "sgd")]
    pub optimizer: OptimizerKind,

    #[arg(long, default_value_t = 2.0)]
    pub initial_learning_rate: f64,

    /// 0 disables the staircase decay
    #[arg(long, default_value_t = 0.5)]
    pub learning_rate_decay_factor: f64,

    #[arg(long, default_value_t = 8.0)]
    pub num_epochs_per_decay: f64,

    #[arg(long, default_value_t = 586_363)]
    pub num_examples_per_epoch: usize,

    #[arg(long, default_value_t = 0.0005)]
    pub train_inception_learning_rate: f64,

    /// Global gradient-norm clip; 0 disables clipping
    #[arg(long, default_value_t = 5.0)]
    pub clip_gradients: f64,

    #[arg(long, default_value_t = 5)]
    pub max_checkpoints_to_keep: usize,

    #[arg(long, default_value_t = 12345)]
    pub seed: u64,
}

impl From<TrainArgs> for TrainConfig {
    fn from(a: TrainArgs) -> Self {
        let model = ModelConfig {
            input_file_pattern:        a.input_file_pattern,
            image_format:              a.image_format,
            image_height:              a.image_size,
            image_width:               a.image_size,
            vocab_size:                a.vocab_size,
            embedding_size:            a.embedding_size,
            num_lstm_units:            a.num_lstm_units,
            lstm_dropout_keep_prob:    a.lstm_dropout_keep_prob,
            encoder_base_channels:     a.encoder_base_channels,
            batch_size:                a.batch_size,
            num_preprocess_threads:    a.num_preprocess_threads,
            num_input_reader_threads:  a.num_input_reader_threads,
            inception_checkpoint_file: a.inception_checkpoint_file,
            ..ModelConfig::default()
        };
        let training = TrainingConfig {
            num_examples_per_epoch:        a.num_examples_per_epoch,
            optimizer:                     a.optimizer,
            initial_learning_rate:         a.initial_learning_rate,
            learning_rate_decay_factor:    a.learning_rate_decay_factor,
            num_epochs_per_decay:          a.num_epochs_per_decay,
            train_inception_learning_rate: a.train_inception_learning_rate,
            clip_gradients:                a.clip_gradients,
            max_checkpoints_to_keep:       a.max_checkpoints_to_keep,
        };
        TrainConfig {
            train_dir:          a.train_dir,
            model,
            training,
            train_inception:    a.train_inception,
            number_of_steps:    a.number_of_steps,
            log_every_n_steps:  a.log_every_n_steps,
            save_every_n_steps: a.save_every_n_steps,
            seed:               a.seed,
        }
    }
}

// ─── evaluate ─────────────────────────────────────────────────────────────────
#[derive(Args, Debug)]
pub struct EvaluateArgs {
    /// Comma-separated glob patterns of validation shards
    #[arg(long, default_value = "data/mscoco/val-?????-of-00004")]
    pub input_file_pattern: String,

    /// Directory the training run writes checkpoints to
    #[arg(long, default_value = "model/train")]
    pub checkpoint_dir: String,

    /// Directory for perplexity.csv
    #[arg(long, default_value = "model/eval")]
    pub eval_dir: String,

    #[arg(long, default_value_t = 600)]
    pub eval_interval_secs: u64,

    #[arg(long, default_value_t = 10_132)]
    pub num_eval_examples: usize,

    /// Skip checkpoints older than this step
    #[arg(long, default_value_t = 5000)]
    pub min_global_step: usize,

    /// Evaluate the latest checkpoint once and exit
    #[arg(long)]
    pub once: bool,
}

impl From<EvaluateArgs> for EvaluateConfig {
    fn from(a: EvaluateArgs) -> Self {
        EvaluateConfig {
            input_file_pattern: a.input_file_pattern,
            checkpoint_dir:     a.checkpoint_dir,
            eval_dir:           a.eval_dir,
            eval_interval_secs: a.eval_interval_secs,
            num_eval_examples:  a.num_eval_examples,
            min_global_step:    a.min_global_step,
            once:               a.once,
        }
    }
}

// ─── caption / serve ──────────────────────────────────────────────────────────
/// Flags shared by `caption` and `serve`
#[derive(Args, Debug)]
pub struct ModelArgs {
    /// Checkpoint file, or a training directory to take the latest from
    #[arg(long, default_value = "model/train")]
    pub checkpoint_path: String,

    /// Word counts file written by build-data
    #[arg(long, default_value = "data/mscoco/word_counts.txt")]
    pub vocab_file: String,

    #[arg(long, default_value_t = 3)]
    pub beam_size: usize,

    #[arg(long, default_value_t = 20)]
    pub max_caption_length: usize,

    /// 0 ranks captions by raw log-probability
    #[arg(long, default_value_t = 0.0)]
    pub length_normalization_factor: f64,
}

impl From<ModelArgs> for CaptionConfig {
    fn from(a: ModelArgs) -> Self {
        CaptionConfig {
            checkpoint_path: a.checkpoint_path,
            vocab_file:      a.vocab_file,
            beam: BeamSearchConfig {
                beam_size:                   a.beam_size,
                max_caption_length:          a.max_caption_length,
                length_normalization_factor: a.length_normalization_factor,
            },
        }
    }
}

#[derive(Args, Debug)]
pub struct CaptionArgs {
    /// Comma-separated glob patterns of image files
    #[arg(long)]
    pub input_files: String,

    #[command(flatten)]
    pub model: ModelArgs,
}

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Bind address; SHOW_AND_TELL_ADDR takes precedence
    #[arg(long, default_value = "127.0.0.1:5000")]
    pub addr: String,

    /// Uploaded images are kept under <upload_dir>/image
    #[arg(long, default_value = "uploads")]
    pub upload_dir: String,

    #[command(flatten)]
    pub model: ModelArgs,
}

impl From<ServeArgs> for ServeConfig {
    fn from(a: ServeArgs) -> Self {
        ServeConfig {
            addr:       std::env::var(ADDR_ENV).unwrap_or(a.addr),
            upload_dir: a.upload_dir,
            captioner:  a.model.into(),
        }
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::Cli;
    use clap::Parser;

    fn parse(args: &[&str]) -> Commands {
        Cli::try_parse_from(std::iter::once("show-and-tell").chain(args.iter().copied()))
            .unwrap()
            .command
    }

    #[test]
    fn test_train_flags_reach_config() {
        let Commands::Train(args) = parse(&[
            "train", "--optimizer", "adam", "--image-size", "64", "--image-format", "png",
            "--number-of-steps", "10",
        ]) else {
            panic!("expected train");
        };
        let cfg: TrainConfig = args.into();
        assert_eq!(cfg.training.optimizer, OptimizerKind::Adam);
        assert_eq!(cfg.model.image_height, 64);
        assert_eq!(cfg.model.image_width, 64);
        assert_eq!(cfg.model.image_format, ImageFormatKind::Png);
        assert_eq!(cfg.number_of_steps, 10);
        assert_eq!(cfg.model.initializer_scale, ModelConfig::default().initializer_scale);
    }

    #[test]
    fn test_unknown_optimizer_is_rejected() {
        let result = Cli::try_parse_from(["show-and-tell", "train", "--optimizer", "rmsprop"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_word_counts_default_follows_output_dir() {
        let Commands::BuildData(args) = parse(&["build-data", "--output-dir", "out"]) else {
            panic!("expected build-data");
        };
        let cfg: BuildDataConfig = args.into();
        assert_eq!(cfg.word_counts_file, "out/word_counts.txt");
        assert_eq!(cfg.image_format, ImageFormatKind::Jpeg);
    }

    #[test]
    fn test_caption_beam_flags() {
        let Commands::Caption(args) = parse(&[
            "caption", "--input-files", "a.jpg,b.jpg", "--beam-size", "5",
            "--checkpoint-path", "model/train/model-100",
        ]) else {
            panic!("expected caption");
        };
        assert_eq!(args.input_files, "a.jpg,b.jpg");
        let cfg: CaptionConfig = args.model.into();
        assert_eq!(cfg.beam.beam_size, 5);
        assert_eq!(cfg.beam.max_caption_length, 20);
        assert_eq!(cfg.checkpoint_path, "model/train/model-100");
    }

    #[test]
    fn test_evaluate_once() {
        let Commands::Evaluate(args) = parse(&["evaluate", "--once"]) else {
            panic!("expected evaluate");
        };
        let cfg: EvaluateConfig = args.into();
        assert!(cfg.once);
        assert_eq!(cfg.min_global_step, 5000);
    }
}
