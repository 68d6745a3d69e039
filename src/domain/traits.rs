// ============================================================
// Layer 3 — Core Traits (Abstractions)
// ============================================================
// The application layer and the web server program against
// these traits; the data and ml layers provide the concrete
// implementations.
//
//   CaptionSource  ← CocoCaptionLoader (annotation JSON + images)
//   CaptionModel   ← InferenceWrapper (burn model), test doubles
//   ImageCaptioner ← CaptionUseCase (model + vocabulary + beam search)
//
// Reference: Rust Book §10 (Traits: Defining Shared Behaviour)

use anyhow::Result;
use crate::domain::image_metadata::ImageMetadata;

// ─── CaptionSource ────────────────────────────────────────────────────────────
/// Any component that can list images with their captions.
pub trait CaptionSource {
    fn load_all(&self) -> Result<Vec<ImageMetadata>>;
}

// ─── CaptionModel ─────────────────────────────────────────────────────────────
/// The two calls beam search needs from a trained model.
///
/// `State` is whatever the model carries between steps; the
/// beam search only clones and hands it back.
pub trait CaptionModel {
    type State: Clone;

    /// Encode an image and return the initial recurrent state.
    fn feed_image(&self, encoded_image: &[u8]) -> Result<Self::State>;

    /// Run one decoder step for a batch of hypotheses.
    ///
    /// `input_feed[i]` is the last word of hypothesis i and
    /// `state_feed[i]` its state. Returns one probability
    /// distribution over the vocabulary and one new state per
    /// hypothesis, in the same order.
    fn inference_step(
        &self,
        input_feed: &[u32],
        state_feed: &[Self::State],
    ) -> Result<(Vec<Vec<f32>>, Vec<Self::State>)>;
}

// ─── ImageCaptioner ───────────────────────────────────────────────────────────
/// Anything that turns an encoded image into ranked caption lines.
pub trait ImageCaptioner: Send {
    /// Returns formatted captions, best first.
    fn caption(&self, encoded_image: &[u8]) -> Result<Vec<String>>;
}
