// ============================================================
// Crate Error Type
// ============================================================
// Failures that callers may want to match on. Everything else
// travels as anyhow::Error with context attached at the
// application boundary.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CaptionError {
    /// The configured or requested image format is not jpeg/png
    #[error("Invalid image format: {0}")]
    InvalidImageFormat(String),

    /// The bytes could not be decoded as the expected format
    #[error("Failed to decode image: {0}")]
    ImageDecode(#[from] image::ImageError),

    /// A reserved vocabulary word (start/end) is absent from the file
    #[error("Vocabulary is missing reserved word '{0}'")]
    MissingReservedWord(String),

    /// A checkpoint directory holds no usable checkpoint
    #[error("No checkpoint file found in: {}", .0.display())]
    NoCheckpoint(PathBuf),

    #[error("Malformed shard '{}': {reason}", .path.display())]
    MalformedShard { path: PathBuf, reason: String },
}
