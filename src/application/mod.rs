// ============================================================
// Layer 2 — Application / Use Cases
// ============================================================
// Each use case wires the lower layers together for one
// command. No model math and no printing happen here; the CLI
// prints, the ml layer computes.
//
//   build_data_use_case — annotations + images → shards + vocabulary
//   train_use_case      — shards → checkpoints
//   evaluate_use_case   — checkpoints + held-out shards → perplexity
//   caption_use_case    — checkpoint + vocabulary + image → captions
//
// Reference: Clean Architecture pattern

/// Configuration structs handed over by the CLI
pub mod config;

/// Dataset building: tokenize, build vocabulary, write shards
pub mod build_data_use_case;

/// The training workflow
pub mod train_use_case;

/// Periodic perplexity evaluation of checkpoints
pub mod evaluate_use_case;

/// Caption generation for files and uploads
pub mod caption_use_case;
