// ============================================================
// Layer 2 — EvaluateUseCase
// ============================================================
// Watches a training directory and reports perplexity of each
// new checkpoint on held-out shards:
//
//   loop:
//     latest checkpoint? ── none ─────────────▶ wait
//       │ step < min_global_step ─────────────▶ wait
//       │ already evaluated ──────────────────▶ wait
//       ▼
//     rebuild model from train_config.json, load weights,
//     run num_eval_examples through it, log perplexity
//       │
//     --once? ── yes ──▶ stop
//       ▼
//     sleep until eval_interval_secs have passed
//
// The model is rebuilt from the saved config so evaluation
// always matches the architecture that wrote the checkpoint.

use anyhow::{anyhow, Result};
use burn::{
    backend::wgpu::WgpuDevice,
    data::dataloader::{DataLoader, DataLoaderBuilder},
};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::application::config::{EvaluateConfig, ModelConfig};
use crate::data::{
    batcher::{CaptionBatch, CaptionBatcher},
    dataset::ShardDataset,
    image_processing::ImageProcessor,
};
use crate::domain::mode::Mode;
use crate::infra::{
    checkpoint::{self, resolve_checkpoint, step_of},
    metrics::{EvalMetrics, MetricsLogger},
};
use crate::ml::{
    evaluator::{evaluate_model, EvalSummary},
    model::ShowAndTellConfig,
};

type EvalBackend = burn::backend::Wgpu;
type EvalLoader  = Arc<dyn DataLoader<CaptionBatch<EvalBackend>>>;

pub struct EvaluateUseCase {
    config: EvaluateConfig,
}

impl EvaluateUseCase {
    pub fn new(config: EvaluateConfig) -> Self {
        Self { config }
    }

    pub fn execute(&self) -> Result<()> {
        let cfg      = &self.config;
        let ckpt_dir = Path::new(&cfg.checkpoint_dir);
        let metrics  = MetricsLogger::new::<EvalMetrics>(&cfg.eval_dir, "perplexity.csv")?;
        let device   = WgpuDevice::default();

        // The loader needs the trained image size, so it is built on
        // the first evaluation and reused afterwards.
        let mut dataset = Some(ShardDataset::open(&cfg.input_file_pattern)?);
        let mut loader: Option<EvalLoader> = None;
        let mut last_evaluated: Option<usize> = None;

        loop {
            let started = Instant::now();

            match resolve_checkpoint(ckpt_dir) {
                Ok(checkpoint) => {
                    let step = step_of(&checkpoint).unwrap_or(0);
                    if step < cfg.min_global_step {
                        tracing::info!(
                            "Skipping evaluation. Global step = {} < {}",
                            step,
                            cfg.min_global_step
                        );
                    } else if last_evaluated == Some(step) {
                        tracing::info!("Checkpoint at step {} already evaluated", step);
                    } else {
                        tracing::info!("Starting evaluation of checkpoint {}", checkpoint.display());
                        let train_cfg = checkpoint::load_config_for(&checkpoint)?;
                        let eval_loader = match &loader {
                            Some(l) => l.clone(),
                            None => {
                                let ds = dataset
                                    .take()
                                    .ok_or_else(|| anyhow!("Evaluation dataset already consumed"))?;
                                let l = build_loader(&train_cfg.model, ds, device.clone());
                                loader = Some(l.clone());
                                l
                            }
                        };

                        let summary = self.evaluate_checkpoint(
                            &checkpoint, &train_cfg.model, eval_loader, &device,
                        )?;
                        metrics.log(&EvalMetrics {
                            global_step: step,
                            perplexity:  summary.perplexity,
                            num_words:   summary.total_weight,
                        })?;
                        tracing::info!("Finished processing evaluation at global step {}.", step);
                        last_evaluated = Some(step);
                    }
                }
                Err(e) if cfg.once => return Err(e),
                Err(e) => tracing::info!("Skipping evaluation: {e}"),
            }

            if cfg.once {
                return Ok(());
            }

            let wait = Duration::from_secs(cfg.eval_interval_secs).saturating_sub(started.elapsed());
            std::thread::sleep(wait);
        }
    }

    fn evaluate_checkpoint(
        &self,
        checkpoint: &Path,
        model_cfg:  &ModelConfig,
        loader:     EvalLoader,
        device:     &WgpuDevice,
    ) -> Result<EvalSummary> {
        let model = ShowAndTellConfig::from_model_config(model_cfg).init::<EvalBackend>(device);
        let model = checkpoint::load_model(model, checkpoint, device)?;
        evaluate_model(&model, loader, self.config.num_eval_examples, model_cfg.batch_size)
    }
}

fn build_loader(m: &ModelConfig, dataset: ShardDataset, device: WgpuDevice) -> EvalLoader {
    let processor = ImageProcessor::with_resize(
        m.image_height, m.image_width, m.resize_height, m.resize_width, m.image_format,
    );
    let batcher = CaptionBatcher::<EvalBackend>::new(
        device, processor, Mode::Eval, m.num_preprocess_threads,
    );
    DataLoaderBuilder::new(batcher)
        .batch_size(m.batch_size)
        .num_workers(m.num_input_reader_threads.max(1))
        .build(dataset)
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::shard::{SequenceExample, ShardWriter};
    use crate::error::CaptionError;

    fn config(root: &Path) -> EvaluateConfig {
        let shard = root.join("val-00000-of-00001");
        let mut w = ShardWriter::create(&shard).unwrap();
        w.write(&SequenceExample {
            image_id:      1,
            filename:      "1.jpg".into(),
            encoded_image: vec![],
            caption:       vec![],
            caption_ids:   vec![1, 2],
        })
        .unwrap();
        w.finish().unwrap();

        let ckpt_dir = root.join("train");
        std::fs::create_dir_all(&ckpt_dir).unwrap();

        EvaluateConfig {
            input_file_pattern: shard.display().to_string(),
            checkpoint_dir:     ckpt_dir.display().to_string(),
            eval_dir:           root.join("eval").display().to_string(),
            once:               true,
            ..EvaluateConfig::default()
        }
    }

    #[test]
    fn test_once_without_checkpoint_fails() {
        let dir = tempfile::tempdir().unwrap();
        let err = EvaluateUseCase::new(config(dir.path())).execute().unwrap_err();
        assert!(matches!(
            err.downcast_ref::<CaptionError>(),
            Some(CaptionError::NoCheckpoint(_))
        ));
    }

    #[test]
    fn test_early_checkpoint_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(dir.path());
        std::fs::write(
            Path::new(&cfg.checkpoint_dir).join("checkpoint.json"),
            r#"{ "latest_step": 10, "all_steps": [10] }"#,
        )
        .unwrap();

        // Step 10 is below min_global_step, so nothing is loaded
        EvaluateUseCase::new(cfg.clone()).execute().unwrap();
        let csv = std::fs::read_to_string(Path::new(&cfg.eval_dir).join("perplexity.csv")).unwrap();
        assert_eq!(csv.lines().count(), 1);
    }
}
