// ============================================================
// Layer 5 — Training Loop
// ============================================================
// Step-based training with Burn's DataLoader and SGD or Adam.
//
//   The backend B is any autodiff backend (Autodiff<Wgpu> from the
//   train command, Autodiff<NdArray> in tests). When the
//   encoder is frozen it runs on the inner backend via .valid(),
//   so its BatchNorm statistics stay fixed and no gradients flow
//   into it; only the decoder is updated.
//
// The DataLoader is re-iterated whenever it runs dry, which
// reshuffles the shards, until `number_of_steps` is reached.
// Each checkpoint stores the optimizer state next to the weights;
// a resumed run restores both.
//
// Learning rate:
//   train_inception  → fixed train_inception_learning_rate
//   otherwise        → initial * decay_factor ^ floor(step / decay_steps)
//                      decay_steps = examples_per_epoch / batch_size * epochs_per_decay
//
// Reference: Burn Book §5, Vinyals et al. (2015) §4.3

use anyhow::{ensure, Result};
use burn::{
    data::dataloader::{DataLoader, DataLoaderBuilder},
    grad_clipping::GradientClippingConfig,
    module::AutodiffModule,
    optim::{AdamConfig, GradientsParams, Optimizer, SgdConfig},
    prelude::*,
    tensor::backend::AutodiffBackend,
};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use crate::application::config::{OptimizerKind, TrainConfig};
use crate::data::batcher::{CaptionBatch, CaptionBatcher};
use crate::data::dataset::ShardDataset;
use crate::data::image_processing::ImageProcessor;
use crate::domain::mode::Mode;
use crate::infra::checkpoint::{self, CheckpointManager};
use crate::infra::metrics::{MetricsLogger, StepMetrics};
use crate::ml::model::{ShowAndTellConfig, ShowAndTellModel};

// ─── Learning Rate ────────────────────────────────────────────────────────────
/// Learning rate in effect at global step `step`.
pub fn learning_rate(cfg: &TrainConfig, step: usize) -> f64 {
    let t = &cfg.training;
    if cfg.train_inception {
        return t.train_inception_learning_rate;
    }
    if t.learning_rate_decay_factor <= 0.0 {
        return t.initial_learning_rate;
    }

    let batches_per_epoch = t.num_examples_per_epoch as f64 / cfg.model.batch_size.max(1) as f64;
    let decay_steps       = (batches_per_epoch * t.num_epochs_per_decay) as usize;
    if decay_steps == 0 {
        return t.initial_learning_rate;
    }
    let decays = (step / decay_steps) as i32;
    t.initial_learning_rate * t.learning_rate_decay_factor.powi(decays)
}

fn clipping(cfg: &TrainConfig) -> Option<GradientClippingConfig> {
    let clip = cfg.training.clip_gradients;
    (clip > 0.0).then_some(GradientClippingConfig::Norm(clip as f32))
}

// ─── Entry Point ──────────────────────────────────────────────────────────────
pub fn run_training<B: AutodiffBackend>(
    cfg:     &TrainConfig,
    dataset: ShardDataset,
    ckpt:    &CheckpointManager,
    metrics: &MetricsLogger,
    device:  B::Device,
) -> Result<()> {
    tracing::info!("Using device: {:?}", device);

    // ── Build or restore the model ────────────────────────────────────────────
    let mut model: ShowAndTellModel<B> =
        ShowAndTellConfig::from_model_config(&cfg.model).init(&device);
    tracing::info!("Model ready: {} parameters", model.num_params());

    let start_step = match ckpt.latest_step()? {
        Some(step) => {
            tracing::info!("Resuming from checkpoint at step {}", step);
            model = checkpoint::load_model(model, &ckpt.checkpoint_path(step), &device)?;
            step
        }
        None => {
            if let Some(file) = &cfg.model.inception_checkpoint_file {
                tracing::info!("Restoring encoder weights from {}", file);
                model.encoder = checkpoint::load_encoder(model.encoder, Path::new(file), &device)?;
            }
            0
        }
    };

    // ── Input pipeline ────────────────────────────────────────────────────────
    let m = &cfg.model;
    let processor = ImageProcessor::with_resize(
        m.image_height, m.image_width, m.resize_height, m.resize_width, m.image_format,
    );
    let batcher = CaptionBatcher::<B>::new(
        device.clone(), processor, Mode::Train, m.num_preprocess_threads,
    );
    let loader = DataLoaderBuilder::new(batcher)
        .batch_size(m.batch_size)
        .shuffle(cfg.seed)
        .num_workers(m.num_input_reader_threads.max(1))
        .build(dataset);

    // ── Optimizer ─────────────────────────────────────────────────────────────
    match cfg.training.optimizer {
        OptimizerKind::Sgd => {
            let optim = SgdConfig::new()
                .with_gradient_clipping(clipping(cfg))
                .init::<B, ShowAndTellModel<B>>();
            train_steps(cfg, ckpt, metrics, loader, model, optim, start_step, &device)
        }
        OptimizerKind::Adam => {
            let optim = AdamConfig::new()
                .with_grad_clipping(clipping(cfg))
                .init::<B, ShowAndTellModel<B>>();
            train_steps(cfg, ckpt, metrics, loader, model, optim, start_step, &device)
        }
    }
}

// ─── Step Loop ────────────────────────────────────────────────────────────────
#[allow(clippy::too_many_arguments)]
fn train_steps<B, O>(
    cfg:        &TrainConfig,
    ckpt:       &CheckpointManager,
    metrics:    &MetricsLogger,
    loader:     Arc<dyn DataLoader<CaptionBatch<B>>>,
    mut model:  ShowAndTellModel<B>,
    mut optim:  O,
    start_step: usize,
    device:     &B::Device,
) -> Result<()>
where
    B: AutodiffBackend,
    O: Optimizer<ShowAndTellModel<B>, B>,
{
    let mut step = start_step;
    if step >= cfg.number_of_steps {
        tracing::info!("Already at step {} of {}; nothing to do", step, cfg.number_of_steps);
        return Ok(());
    }

    if step > 0 {
        match ckpt.load_optimizer::<B, O::Record>(step, device)? {
            Some(record) => {
                optim = optim.load_record(record);
                tracing::info!("Restored optimizer state from step {}", step);
            }
            None => tracing::warn!("No optimizer state for step {}; starting it fresh", step),
        }
    }

    let log_every  = cfg.log_every_n_steps.max(1);
    let save_every = cfg.save_every_n_steps.max(1);

    'training: loop {
        let mut produced_batch = false;

        for batch in loader.iter() {
            produced_batch = true;
            let started = Instant::now();
            let lr      = learning_rate(cfg, step);

            // ── Forward ───────────────────────────────────────────────────────
            let features = if cfg.train_inception {
                model.encoder.forward(batch.images)
            } else {
                Tensor::from_inner(model.encoder.valid().forward(batch.images.inner()))
            };
            let out = model.forward_loss_with_features(
                features, batch.input_seqs, batch.target_seqs, batch.input_mask,
            );
            let loss_val: f64 = out.loss.clone().into_scalar().elem::<f64>();

            // ── Backward + update ─────────────────────────────────────────────
            let grads = out.loss.backward();
            let grads = GradientsParams::from_grads(grads, &model);
            model = optim.step(lr, model, grads);
            step += 1;

            if step % log_every == 0 {
                tracing::info!(
                    "global step {}: loss = {:.4} ({:.3} sec/step, lr = {})",
                    step,
                    loss_val,
                    started.elapsed().as_secs_f64(),
                    lr,
                );
                metrics.log(&StepMetrics { step, loss: loss_val, learning_rate: lr })?;
            }
            if step % save_every == 0 {
                ckpt.save_training_state(&model, optim.to_record(), step)?;
                tracing::info!("Checkpoint saved at step {}", step);
            }
            if step >= cfg.number_of_steps {
                break 'training;
            }
        }

        ensure!(produced_batch, "Input pipeline produced no batches");
    }

    if step % save_every != 0 {
        ckpt.save_training_state(&model, optim.to_record(), step)?;
    }
    checkpoint::save_encoder(&model.encoder, &ckpt.encoder_path())?;
    tracing::info!("Training complete at step {}", step);
    Ok(())
}
