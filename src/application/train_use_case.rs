// ============================================================
// Layer 2 — TrainUseCase
// ============================================================
// Orchestrates a training run:
//
//   Step 1: Open the input shards        (Layer 4 - data)
//   Step 2: Prepare the train directory  (Layer 6 - infra)
//   Step 3: Save config for inference    (Layer 6 - infra)
//   Step 4: Run the step loop            (Layer 5 - ml)
//
// Re-running with the same train_dir resumes from the latest
// checkpoint found there.

use anyhow::Result;
use burn::backend::wgpu::WgpuDevice;

use crate::application::config::TrainConfig;
use crate::data::dataset::ShardDataset;
use crate::infra::{
    checkpoint::CheckpointManager,
    metrics::{MetricsLogger, StepMetrics},
};
use crate::ml::trainer::run_training;

type TrainBackend = burn::backend::Autodiff<burn::backend::Wgpu>;

pub struct TrainUseCase {
    config: TrainConfig,
}

impl TrainUseCase {
    pub fn new(config: TrainConfig) -> Self {
        Self { config }
    }

    pub fn execute(&self) -> Result<()> {
        let cfg = &self.config;

        // ── Step 1: Input shards ──────────────────────────────────────────────
        tracing::info!("Reading training shards matching '{}'", cfg.model.input_file_pattern);
        let dataset = ShardDataset::open(&cfg.model.input_file_pattern)?;
        tracing::info!("Found {} shards", dataset.num_shards());

        // ── Step 2: Train directory ───────────────────────────────────────────
        tracing::info!("Training directory: {}", cfg.train_dir);
        let ckpt    = CheckpointManager::new(&cfg.train_dir, cfg.training.max_checkpoints_to_keep)?;
        let metrics = MetricsLogger::new::<StepMetrics>(&cfg.train_dir, "metrics.csv")?;

        // ── Step 3: Config next to the checkpoints ────────────────────────────
        ckpt.save_config(cfg)?;

        // ── Step 4: Train ─────────────────────────────────────────────────────
        run_training::<TrainBackend>(cfg, dataset, &ckpt, &metrics, WgpuDevice::default())
    }
}
