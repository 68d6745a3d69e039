// ============================================================
// Layer 6 — Infrastructure Layer
// ============================================================
// Cross-cutting file-system concerns shared by several use cases:
//
//   checkpoint.rs    — model weights via Burn's CompactRecorder,
//                      checkpoint.json pointer with pruning, and
//                      train_config.json so evaluation and inference
//                      rebuild the trained architecture
//
//   vocab_store.rs   — the word-counts vocabulary file
//
//   metrics.rs       — CSV logs of training loss and eval perplexity
//
//   file_patterns.rs — comma-separated glob patterns → file list
//
// Reference: Burn Book §5 (Checkpointing)

/// Model checkpoint saving, pruning and loading
pub mod checkpoint;

/// Word-counts vocabulary persistence
pub mod vocab_store;

/// Training / evaluation metrics CSV logger
pub mod metrics;

/// Glob expansion for input file lists
pub mod file_patterns;
