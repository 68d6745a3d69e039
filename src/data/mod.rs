// ============================================================
// Layer 4 — Data Pipeline
// ============================================================
// Two flows pass through this layer.
//
// Dataset building (offline, once):
//
//   captions JSON + image dir
//       │
//       ▼
//   CocoCaptionLoader   → ImageMetadata per image
//       │
//       ▼
//   splitter            → train / val image sets
//       │
//       ▼
//   Preprocessor        → caption text → word lists with <S> … </S>
//       │
//       ▼
//   ShardWriter         → SequenceExample records in N shards
//
// Training / evaluation (every step):
//
//   ShardDataset        → random access over all shard records
//       │
//       ▼
//   CaptionBatcher      → image preprocessing + dynamic padding
//       │
//       ▼
//   DataLoader          → CaptionBatch tensors for the model

/// Reads the COCO-style captions file
pub mod loader;

/// Caption text cleaning and word splitting
pub mod preprocessor;

/// Shuffles and splits images into train/val sets
pub mod splitter;

/// Decode, resize, crop and distort images
pub mod image_processing;

/// Length-prefixed record shards on disk
pub mod shard;

/// Burn Dataset over a set of shards
pub mod dataset;

/// Burn Batcher with dynamic caption padding
pub mod batcher;
