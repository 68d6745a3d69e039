// ============================================================
// Layer 5 — ML / Model Layer (Burn)
// ============================================================
// Everything that touches tensors lives here.
//
//   model.rs             — Inception-style encoder + LSTM decoder,
//                          masked cross-entropy loss, single-step
//                          inference
//
//   trainer.rs           — step loop: learning-rate schedule,
//                          gradient clipping, frozen or trainable
//                          encoder, checkpoint cadence, resume
//
//   evaluator.rs         — perplexity over held-out batches
//
//   inference_wrapper.rs — model behind the CaptionModel trait,
//                          state flattened to [cell ; hidden]
//
//   caption_generator.rs — beam search over any CaptionModel
//
// Reference: Burn Book §3 (Building Blocks), §5 (Training)
//            Vinyals et al. (2015) Show and Tell

/// Encoder/decoder captioning network
pub mod model;

/// Training loop with checkpointing and resume
pub mod trainer;

/// Perplexity evaluation
pub mod evaluator;

/// CaptionModel implementation over a loaded checkpoint
pub mod inference_wrapper;

/// Beam search caption generation
pub mod caption_generator;
