// ============================================================
// Layer 4 — Caption Batcher
// ============================================================
// Implements Burn's Batcher trait to turn a Vec<SequenceExample>
// into tensors for the model forward pass.
//
// Captions in a batch have different lengths, so they are padded
// dynamically to the longest one in the batch:
//
//   caption:      [<S>, a, dog, </S>]          (length L = 4)
//   input_seq:    [<S>, a, dog]                (caption[..L-1])
//   target_seq:   [a, dog, </S>]               (caption[1..])
//   input_mask:   [1, 1, 1]
//
//   after padding to the batch maximum (pad id 0, mask 0):
//   input_seq:    [<S>, a, dog, 0, 0]
//   target_seq:   [a, dog, </S>, 0, 0]
//   input_mask:   [1, 1, 1, 0, 0]
//
// Images are decoded and preprocessed here too, on the
// DataLoader worker threads.

use burn::{
    data::dataloader::batcher::Batcher,
    prelude::*,
};

use crate::data::image_processing::ImageProcessor;
use crate::data::shard::SequenceExample;
use crate::domain::mode::Mode;

pub const PAD_ID: u32 = 0;

// ─── Dynamic Padding ──────────────────────────────────────────────────────────
/// Row-major `[batch, len]` sequences produced by [`pad_captions`].
#[derive(Debug, Clone, PartialEq)]
pub struct PaddedCaptions {
    pub batch_size:  usize,
    pub len:         usize,
    pub input_seqs:  Vec<u32>,
    pub target_seqs: Vec<u32>,
    pub input_mask:  Vec<u32>,
}

/// Split each caption into input/target sequences and pad them to
/// the longest caption in the batch. `len` is never below 1.
pub fn pad_captions(captions: &[&[u32]]) -> PaddedCaptions {
    let len = captions
        .iter()
        .map(|c| c.len().saturating_sub(1))
        .max()
        .unwrap_or(0)
        .max(1);

    let n = captions.len();
    let mut input_seqs  = vec![PAD_ID; n * len];
    let mut target_seqs = vec![PAD_ID; n * len];
    let mut input_mask  = vec![0u32; n * len];

    for (row, caption) in captions.iter().enumerate() {
        let real = caption.len().saturating_sub(1);
        let base = row * len;
        for t in 0..real {
            input_seqs[base + t]  = caption[t];
            target_seqs[base + t] = caption[t + 1];
            input_mask[base + t]  = 1;
        }
    }

    PaddedCaptions { batch_size: n, len, input_seqs, target_seqs, input_mask }
}

// ─── CaptionBatch ─────────────────────────────────────────────────────────────
#[derive(Debug, Clone)]
pub struct CaptionBatch<B: Backend> {
    /// [batch_size, 3, height, width], values in [-1, 1]
    pub images: Tensor<B, 4>,

    /// [batch_size, len]
    pub input_seqs: Tensor<B, 2, Int>,

    /// [batch_size, len]
    pub target_seqs: Tensor<B, 2, Int>,

    /// [batch_size, len], 1 = real word, 0 = padding
    pub input_mask: Tensor<B, 2, Int>,
}

// ─── CaptionBatcher ───────────────────────────────────────────────────────────
#[derive(Clone, Debug)]
pub struct CaptionBatcher<B: Backend> {
    device:                  B::Device,
    processor:               ImageProcessor,
    mode:                    Mode,
    num_preprocess_threads:  usize,
}

impl<B: Backend> CaptionBatcher<B> {
    pub fn new(
        device:                 B::Device,
        processor:              ImageProcessor,
        mode:                   Mode,
        num_preprocess_threads: usize,
    ) -> Self {
        Self {
            device,
            processor,
            mode,
            num_preprocess_threads: num_preprocess_threads.max(1),
        }
    }

    /// Preprocess every image into one flat CHW buffer.
    ///
    /// An image that fails to decode is logged and replaced by zeros
    /// so one bad record does not abort the step.
    fn images(&self, items: &[SequenceExample]) -> Vec<f32> {
        let mut rng  = rand::thread_rng();
        let per_item = self.processor.output_len();
        let mut flat = Vec::with_capacity(items.len() * per_item);

        for (i, item) in items.iter().enumerate() {
            let thread_id = i % self.num_preprocess_threads;
            match self.processor.process(&item.encoded_image, self.mode, thread_id, &mut rng) {
                Ok(pixels) => flat.extend(pixels),
                Err(e) => {
                    tracing::error!("Cannot preprocess image '{}': {e}", item.filename);
                    flat.extend(std::iter::repeat(0.0).take(per_item));
                }
            }
        }
        flat
    }
}

impl<B: Backend> Batcher<SequenceExample, CaptionBatch<B>> for CaptionBatcher<B> {
    fn batch(&self, items: Vec<SequenceExample>) -> CaptionBatch<B> {
        let batch_size = items.len();
        let (h, w)     = (self.processor.height(), self.processor.width());

        // ── Images ────────────────────────────────────────────────────────────
        let pixels = self.images(&items);
        let images = Tensor::<B, 4>::from_data(
            TensorData::new(pixels, [batch_size, 3, h, w]),
            &self.device,
        );

        // ── Captions ──────────────────────────────────────────────────────────
        let captions: Vec<&[u32]> = items.iter().map(|e| e.caption_ids.as_slice()).collect();
        let padded = pad_captions(&captions);
        let shape  = [padded.batch_size, padded.len];

        let to_tensor = |v: &[u32]| {
            let ints: Vec<i32> = v.iter().map(|&x| x as i32).collect();
            Tensor::<B, 1, Int>::from_ints(ints.as_slice(), &self.device).reshape(shape)
        };

        CaptionBatch {
            images,
            input_seqs:  to_tensor(&padded.input_seqs),
            target_seqs: to_tensor(&padded.target_seqs),
            input_mask:  to_tensor(&padded.input_mask),
        }
    }
}
