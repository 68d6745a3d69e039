// ============================================================
// Layer 5 — Evaluator
// ============================================================
// Computes perplexity of a model over held-out batches:
//
//   perplexity = exp( Σ token NLL / Σ mask weight )
//
// Sums run over ceil(num_eval_examples / batch_size) batches, or
// fewer if the input runs out first.

use anyhow::{ensure, Result};
use burn::{data::dataloader::DataLoader, prelude::*};
use std::sync::Arc;
use std::time::Instant;

use crate::data::batcher::CaptionBatch;
use crate::ml::model::ShowAndTellModel;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EvalSummary {
    pub perplexity:   f64,
    pub total_nll:    f64,
    pub total_weight: f64,
    pub num_batches:  usize,
}

pub fn perplexity(total_nll: f64, total_weight: f64) -> f64 {
    (total_nll / total_weight).exp()
}

pub fn evaluate_model<B: Backend>(
    model:             &ShowAndTellModel<B>,
    loader:            Arc<dyn DataLoader<CaptionBatch<B>>>,
    num_eval_examples: usize,
    batch_size:        usize,
) -> Result<EvalSummary> {
    let num_eval_batches = num_eval_examples.div_ceil(batch_size.max(1));
    let start = Instant::now();

    let mut total_nll    = 0.0f64;
    let mut total_weight = 0.0f64;
    let mut num_batches  = 0usize;

    for batch in loader.iter().take(num_eval_batches) {
        let out = model.forward_loss(batch);
        total_nll    += out.total_nll.into_scalar().elem::<f64>();
        total_weight += out.total_weight.into_scalar().elem::<f64>();
        num_batches  += 1;

        if num_batches % 100 == 0 {
            tracing::info!("Computed losses for {} of {} batches.", num_batches, num_eval_batches);
        }
    }

    ensure!(total_weight > 0.0, "Evaluation saw no caption words");
    let perplexity = perplexity(total_nll, total_weight);
    tracing::info!(
        "Perplexity = {:.6} ({:.2} sec)",
        perplexity,
        start.elapsed().as_secs_f64()
    );

    Ok(EvalSummary { perplexity, total_nll, total_weight, num_batches })
}
