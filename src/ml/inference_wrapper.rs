// ============================================================
// Layer 5 — Inference Wrapper
// ============================================================
// Adapts ShowAndTellModel to the CaptionModel trait so the beam
// search never touches tensors.
//
// The recurrent state crosses the boundary as a flat Vec<f32>:
//
//   state = [ cell (num_lstm_units) ; hidden (num_lstm_units) ]
//
// and each inference step batches every live hypothesis into a
// single forward pass.

use anyhow::{anyhow, ensure, Result};
use burn::{nn::LstmState, prelude::*};
use std::path::Path;

use crate::data::image_processing::ImageProcessor;
use crate::domain::mode::Mode;
use crate::domain::traits::CaptionModel;
use crate::infra::checkpoint;
use crate::ml::model::{ShowAndTellConfig, ShowAndTellModel};

pub type InferBackend = burn::backend::Wgpu;

pub struct InferenceWrapper<B: Backend> {
    model:     ShowAndTellModel<B>,
    processor: ImageProcessor,
    device:    B::Device,
}

impl<B: Backend> InferenceWrapper<B> {
    pub fn new(model: ShowAndTellModel<B>, processor: ImageProcessor, device: B::Device) -> Self {
        Self { model, processor, device }
    }

    /// Rebuild the trained architecture and restore its weights.
    /// `checkpoint_path` may be a checkpoint file or a directory.
    pub fn from_checkpoint(checkpoint_path: &Path, device: B::Device) -> Result<Self> {
        let checkpoint = checkpoint::resolve_checkpoint(checkpoint_path)?;
        tracing::info!("Loading model from checkpoint: {}", checkpoint.display());

        let cfg   = checkpoint::load_config_for(&checkpoint)?;
        let model = ShowAndTellConfig::from_model_config(&cfg.model).init::<B>(&device);
        let model = checkpoint::load_model(model, &checkpoint, &device)?;
        tracing::info!("Successfully loaded checkpoint: {}", checkpoint.display());

        let m = &cfg.model;
        let processor = ImageProcessor::with_resize(
            m.image_height, m.image_width, m.resize_height, m.resize_width, m.image_format,
        );
        Ok(Self::new(model, processor, device))
    }

    fn units(&self) -> usize {
        self.model.num_lstm_units
    }

    fn flatten_state(&self, state: LstmState<B, 2>) -> Result<Vec<Vec<f32>>> {
        let joined = Tensor::cat(vec![state.cell, state.hidden], 1);
        let width  = 2 * self.units();
        let flat   = joined
            .into_data()
            .to_vec::<f32>()
            .map_err(|e| anyhow!("Cannot read LSTM state: {e:?}"))?;
        Ok(flat.chunks(width).map(<[f32]>::to_vec).collect())
    }
}

impl<B: Backend> CaptionModel for InferenceWrapper<B> {
    type State = Vec<f32>;

    fn feed_image(&self, encoded_image: &[u8]) -> Result<Vec<f32>> {
        let pixels = self
            .processor
            .process(encoded_image, Mode::Inference, 0, &mut rand::thread_rng())?;
        let images = Tensor::<B, 4>::from_data(
            TensorData::new(pixels, [1, 3, self.processor.height(), self.processor.width()]),
            &self.device,
        );

        let features = self.model.encoder.forward(images);
        let state    = self.model.initial_state(self.model.embed_features(features));
        self.flatten_state(state)?
            .pop()
            .ok_or_else(|| anyhow!("Model returned an empty initial state"))
    }

    fn inference_step(
        &self,
        input_feed: &[u32],
        state_feed: &[Vec<f32>],
    ) -> Result<(Vec<Vec<f32>>, Vec<Vec<f32>>)> {
        let n     = input_feed.len();
        let units = self.units();
        ensure!(state_feed.len() == n, "{} words but {} states", n, state_feed.len());

        // ── Split [cell ; hidden] back into two [n, units] tensors ───────────
        let mut cells   = Vec::with_capacity(n * units);
        let mut hiddens = Vec::with_capacity(n * units);
        for state in state_feed {
            ensure!(state.len() == 2 * units, "State has length {}, expected {}", state.len(), 2 * units);
            cells.extend_from_slice(&state[..units]);
            hiddens.extend_from_slice(&state[units..]);
        }
        let state = LstmState::new(
            Tensor::<B, 2>::from_data(TensorData::new(cells,   [n, units]), &self.device),
            Tensor::<B, 2>::from_data(TensorData::new(hiddens, [n, units]), &self.device),
        );
        let ids: Vec<i32> = input_feed.iter().map(|&w| w as i32).collect();
        let ids = Tensor::<B, 1, Int>::from_ints(ids.as_slice(), &self.device);

        // ── One step for every hypothesis ─────────────────────────────────────
        let (probs, state) = self.model.inference_step(ids, state);
        let [_, vocab_size] = probs.dims();
        let probs = probs
            .into_data()
            .to_vec::<f32>()
            .map_err(|e| anyhow!("Cannot read softmax output: {e:?}"))?;

        let softmax = probs.chunks(vocab_size).map(<[f32]>::to_vec).collect();
        Ok((softmax, self.flatten_state(state)?))
    }
}
