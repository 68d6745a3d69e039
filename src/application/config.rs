// ============================================================
// Layer 2 — Configuration
// ============================================================
// Plain configuration structs handed from the CLI layer to the
// use cases. Nothing here reads global state: every knob is a
// field, and every field has the default a full-size COCO run
// uses.
//
//   TrainConfig
//     ├── model:    ModelConfig      architecture + input pipeline
//     └── training: TrainingConfig   optimizer + schedule
//
// TrainConfig is written to train_config.json next to the
// checkpoints, so evaluation and inference rebuild exactly the
// architecture that was trained.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::data::image_processing::{ImageFormatKind, DEFAULT_RESIZE};
use crate::ml::caption_generator::BeamSearchConfig;

// ─── Model ────────────────────────────────────────────────────────────────────
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Comma-separated glob patterns of input shards
    pub input_file_pattern:        String,
    pub image_format:              ImageFormatKind,
    pub image_height:              u32,
    pub image_width:               u32,
    pub resize_height:             u32,
    pub resize_width:              u32,
    /// Words in the vocabulary file plus the unknown word
    pub vocab_size:                usize,
    pub embedding_size:            usize,
    pub num_lstm_units:            usize,
    pub lstm_dropout_keep_prob:    f64,
    /// Parameters start uniform in [-scale, scale]
    pub initializer_scale:         f64,
    /// Channel width of the first encoder convolution
    pub encoder_base_channels:     usize,
    pub batch_size:                usize,
    pub num_preprocess_threads:    usize,
    pub num_input_reader_threads:  usize,
    /// Pretrained encoder weights, loaded before step 0
    pub inception_checkpoint_file: Option<String>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            input_file_pattern:        "data/mscoco/train-?????-of-00256".to_string(),
            image_format:              ImageFormatKind::Jpeg,
            image_height:              299,
            image_width:               299,
            resize_height:             DEFAULT_RESIZE,
            resize_width:              DEFAULT_RESIZE,
            vocab_size:                12000,
            embedding_size:            512,
            num_lstm_units:            512,
            lstm_dropout_keep_prob:    0.7,
            initializer_scale:         0.08,
            encoder_base_channels:     32,
            batch_size:                32,
            num_preprocess_threads:    4,
            num_input_reader_threads:  1,
            inception_checkpoint_file: None,
        }
    }
}

// ─── Optimizer ────────────────────────────────────────────────────────────────
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptimizerKind {
    Sgd,
    Adam,
}

impl FromStr for OptimizerKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sgd"  => Ok(OptimizerKind::Sgd),
            "adam" => Ok(OptimizerKind::Adam),
            other  => Err(format!("unknown optimizer '{other}' (expected sgd or adam)")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingConfig {
    /// Size of the training set, used to convert epochs to steps
    pub num_examples_per_epoch:        usize,
    pub optimizer:                     OptimizerKind,
    pub initial_learning_rate:         f64,
    pub learning_rate_decay_factor:    f64,
    pub num_epochs_per_decay:          f64,
    /// Fixed rate used instead of the schedule when the encoder trains
    pub train_inception_learning_rate: f64,
    /// Global gradient-norm clip; 0 disables clipping
    pub clip_gradients:                f64,
    pub max_checkpoints_to_keep:       usize,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            num_examples_per_epoch:        586_363,
            optimizer:                     OptimizerKind::Sgd,
            initial_learning_rate:         2.0,
            learning_rate_decay_factor:    0.5,
            num_epochs_per_decay:          8.0,
            train_inception_learning_rate: 0.0005,
            clip_gradients:                5.0,
            max_checkpoints_to_keep:       5,
        }
    }
}

// ─── Train ────────────────────────────────────────────────────────────────────
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainConfig {
    /// Checkpoints, train_config.json and metrics.csv go here
    pub train_dir:          String,
    pub model:              ModelConfig,
    pub training:           TrainingConfig,
    pub train_inception:    bool,
    pub number_of_steps:    usize,
    pub log_every_n_steps:  usize,
    pub save_every_n_steps: usize,
    pub seed:               u64,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            train_dir:          "model/train".to_string(),
            model:              ModelConfig::default(),
            training:           TrainingConfig::default(),
            train_inception:    false,
            number_of_steps:    1_000_000,
            log_every_n_steps:  1,
            save_every_n_steps: 1000,
            seed:               12345,
        }
    }
}

// ─── Evaluate ─────────────────────────────────────────────────────────────────
#[derive(Debug, Clone)]
pub struct EvaluateConfig {
    pub input_file_pattern: String,
    pub checkpoint_dir:     String,
    pub eval_dir:           String,
    pub eval_interval_secs: u64,
    pub num_eval_examples:  usize,
    /// Checkpoints below this step are skipped
    pub min_global_step:    usize,
    pub once:               bool,
}

impl Default for EvaluateConfig {
    fn default() -> Self {
        Self {
            input_file_pattern: "data/mscoco/val-?????-of-00004".to_string(),
            checkpoint_dir:     "model/train".to_string(),
            eval_dir:           "model/eval".to_string(),
            eval_interval_secs: 600,
            num_eval_examples:  10_132,
            min_global_step:    5000,
            once:               false,
        }
    }
}

// ─── Build Data ───────────────────────────────────────────────────────────────
#[derive(Debug, Clone)]
pub struct BuildDataConfig {
    pub captions_file:     String,
    pub image_dir:         String,
    pub output_dir:        String,
    pub word_counts_file:  String,
    /// Images that do not decode in this format are left out
    pub image_format:      ImageFormatKind,
    pub train_fraction:    f64,
    pub train_shards:      usize,
    pub val_shards:        usize,
    pub num_threads:       usize,
    pub min_word_count:    usize,
    pub seed:              u64,
}

impl Default for BuildDataConfig {
    fn default() -> Self {
        Self {
            captions_file:    "raw-data/annotations/captions_train2014.json".to_string(),
            image_dir:        "raw-data/train2014".to_string(),
            output_dir:       "data/mscoco".to_string(),
            word_counts_file: "data/mscoco/word_counts.txt".to_string(),
            image_format:     ImageFormatKind::Jpeg,
            train_fraction:   0.95,
            train_shards:     256,
            val_shards:       4,
            num_threads:      8,
            min_word_count:   4,
            seed:             12345,
        }
    }
}

// ─── Caption / Serve ──────────────────────────────────────────────────────────
/// Everything needed to load a captioner for inference.
#[derive(Debug, Clone)]
pub struct CaptionConfig {
    /// A checkpoint file or a directory holding checkpoint.json
    pub checkpoint_path: String,
    pub vocab_file:      String,
    pub beam:            BeamSearchConfig,
}

#[derive(Debug, Clone)]
pub struct ServeConfig {
    pub addr:       String,
    pub upload_dir: String,
    pub captioner:  CaptionConfig,
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_train_config_json_roundtrip_keeps_architecture() {
        let mut cfg = TrainConfig::default();
        cfg.model.num_lstm_units    = 64;
        cfg.training.optimizer      = OptimizerKind::Adam;

        let json = serde_json::to_string(&cfg).unwrap();
        assert!(json.contains("\"optimizer\":\"adam\""));

        let back: TrainConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.model.num_lstm_units, 64);
        assert_eq!(back.training.optimizer, OptimizerKind::Adam);
    }

    #[test]
    fn test_optimizer_parse() {
        assert_eq!("SGD".parse::<OptimizerKind>().unwrap(), OptimizerKind::Sgd);
        assert!("rmsprop".parse::<OptimizerKind>().is_err());
    }

    #[test]
    fn test_defaults() {
        let cfg = TrainConfig::default();
        assert_eq!(cfg.model.image_height, 299);
        assert_eq!(cfg.model.vocab_size, 12000);
        assert_eq!(cfg.training.initial_learning_rate, 2.0);
        assert_eq!(cfg.training.max_checkpoints_to_keep, 5);
    }
}
