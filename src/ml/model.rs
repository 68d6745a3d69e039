// ============================================================
// Layer 5 — Show and Tell Model
// ============================================================
// Encoder/decoder captioning network:
//
//   image [b,3,H,W]
//     │  ImageEncoder (Inception-style CNN, global average pool)
//     ▼
//   features [b,F]
//     │  image_embedding (Linear, no bias)
//     ▼
//   image_embeddings [b,E] ──▶ LSTM step from zero state ──▶ initial state
//
//   input_seqs [b,T] ─seq_embedding─▶ [b,T,E] ─dropout─▶ LSTM ─dropout─▶ logits [b,T,V]
//
// The encoder is a scaled-down Inception v3: a convolutional
// stem followed by three Inception blocks, each concatenating
// four parallel branches on the channel axis:
//
//   ┌ 1x1 ─────────────────────┐
//   ├ 1x1 → 3x3 ───────────────┤
//   ├ 1x1 → 3x3 → 3x3 ─────────┼──▶ concat
//   └ avgpool 3x3 → 1x1 proj ──┘
//
// Decoder parameters start uniform in ±initializer_scale.
// Dropout is only active on an autodiff backend, so the same
// module serves training, evaluation and inference.
//
// Reference: Vinyals et al. (2015) Show and Tell
//            Szegedy et al. (2016) Rethinking the Inception Architecture

use burn::{
    nn::{
        conv::{Conv2d, Conv2dConfig},
        pool::{
            AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig,
            AvgPool2d, AvgPool2dConfig,
            MaxPool2d, MaxPool2dConfig,
        },
        BatchNorm, BatchNormConfig,
        Dropout, DropoutConfig,
        Embedding, EmbeddingConfig,
        Initializer,
        Linear, LinearConfig,
        Lstm, LstmConfig, LstmState,
        PaddingConfig2d,
    },
    prelude::*,
    tensor::activation::{log_softmax, relu, softmax},
};

use crate::application::config::ModelConfig;
use crate::data::batcher::CaptionBatch;

// NOTE: #[derive(Config)] already generates Clone and Serialize/Deserialize
#[derive(Config, Debug)]
pub struct ShowAndTellConfig {
    pub vocab_size: usize,
    #[config(default = 512)]
    pub embedding_size: usize,
    #[config(default = 512)]
    pub num_lstm_units: usize,
    #[config(default = 0.7)]
    pub lstm_dropout_keep_prob: f64,
    #[config(default = 0.08)]
    pub initializer_scale: f64,
    #[config(default = 32)]
    pub encoder_base_channels: usize,
}

impl ShowAndTellConfig {
    pub fn from_model_config(m: &ModelConfig) -> Self {
        Self::new(m.vocab_size)
            .with_embedding_size(m.embedding_size)
            .with_num_lstm_units(m.num_lstm_units)
            .with_lstm_dropout_keep_prob(m.lstm_dropout_keep_prob)
            .with_initializer_scale(m.initializer_scale)
            .with_encoder_base_channels(m.encoder_base_channels)
    }

    pub fn init<B: Backend>(&self, device: &B::Device) -> ShowAndTellModel<B> {
        let init = Initializer::Uniform {
            min: -self.initializer_scale,
            max:  self.initializer_scale,
        };
        let encoder = ImageEncoder::new(self.encoder_base_channels, device);

        let image_embedding = LinearConfig::new(encoder.feature_size(), self.embedding_size)
            .with_bias(false)
            .with_initializer(init.clone())
            .init(device);
        let seq_embedding = EmbeddingConfig::new(self.vocab_size, self.embedding_size)
            .with_initializer(init.clone())
            .init(device);
        let lstm = LstmConfig::new(self.embedding_size, self.num_lstm_units, true)
            .with_initializer(init.clone())
            .init(device);
        let logits = LinearConfig::new(self.num_lstm_units, self.vocab_size)
            .with_initializer(init)
            .init(device);
        let dropout = DropoutConfig::new(1.0 - self.lstm_dropout_keep_prob).init();

        ShowAndTellModel {
            encoder, image_embedding, seq_embedding, lstm, dropout, logits,
            num_lstm_units: self.num_lstm_units,
        }
    }
}

// ─── Encoder Building Blocks ──────────────────────────────────────────────────
/// Conv (no bias) → BatchNorm → ReLU
#[derive(Module, Debug)]
pub struct ConvBlock<B: Backend> {
    conv: Conv2d<B>,
    bn:   BatchNorm<B, 2>,
}

impl<B: Backend> ConvBlock<B> {
    fn new(
        channels: [usize; 2],
        kernel:   usize,
        stride:   usize,
        padding:  usize,
        device:   &B::Device,
    ) -> Self {
        let conv = Conv2dConfig::new(channels, [kernel, kernel])
            .with_stride([stride, stride])
            .with_padding(PaddingConfig2d::Explicit(padding, padding))
            .with_bias(false)
            .init(device);
        let bn = BatchNormConfig::new(channels[1]).with_epsilon(1e-3).init(device);
        Self { conv, bn }
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        relu(self.bn.forward(self.conv.forward(x)))
    }
}

#[derive(Debug, Clone, Copy)]
struct InceptionBlockConfig {
    in_channels: usize,
    b1:          usize,
    b3_reduce:   usize,
    b3:          usize,
    dbl_reduce:  usize,
    dbl:         usize,
    pool_proj:   usize,
}

impl InceptionBlockConfig {
    fn out_channels(&self) -> usize {
        self.b1 + self.b3 + self.dbl + self.pool_proj
    }
}

#[derive(Module, Debug)]
pub struct InceptionBlock<B: Backend> {
    branch1x1:    ConvBlock<B>,
    branch3x3_1:  ConvBlock<B>,
    branch3x3_2:  ConvBlock<B>,
    branch_dbl_1: ConvBlock<B>,
    branch_dbl_2: ConvBlock<B>,
    branch_dbl_3: ConvBlock<B>,
    branch_pool:  AvgPool2d,
    pool_proj:    ConvBlock<B>,
}

impl<B: Backend> InceptionBlock<B> {
    fn new(c: InceptionBlockConfig, device: &B::Device) -> Self {
        Self {
            branch1x1:    ConvBlock::new([c.in_channels, c.b1],        1, 1, 0, device),
            branch3x3_1:  ConvBlock::new([c.in_channels, c.b3_reduce], 1, 1, 0, device),
            branch3x3_2:  ConvBlock::new([c.b3_reduce,   c.b3],        3, 1, 1, device),
            branch_dbl_1: ConvBlock::new([c.in_channels, c.dbl_reduce], 1, 1, 0, device),
            branch_dbl_2: ConvBlock::new([c.dbl_reduce,  c.dbl],        3, 1, 1, device),
            branch_dbl_3: ConvBlock::new([c.dbl,         c.dbl],        3, 1, 1, device),
            branch_pool:  AvgPool2dConfig::new([3, 3])
                .with_strides([1, 1])
                .with_padding(PaddingConfig2d::Explicit(1, 1))
                .init(),
            pool_proj:    ConvBlock::new([c.in_channels, c.pool_proj], 1, 1, 0, device),
        }
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let b1  = self.branch1x1.forward(x.clone());
        let b3  = self.branch3x3_2.forward(self.branch3x3_1.forward(x.clone()));
        let dbl = self.branch_dbl_3.forward(
            self.branch_dbl_2.forward(self.branch_dbl_1.forward(x.clone())),
        );
        let bp  = self.pool_proj.forward(self.branch_pool.forward(x));
        Tensor::cat(vec![b1, b3, dbl, bp], 1)
    }
}

// ─── ImageEncoder ─────────────────────────────────────────────────────────────
#[derive(Module, Debug)]
pub struct ImageEncoder<B: Backend> {
    stem:         Vec<ConvBlock<B>>,
    stem_pool:    MaxPool2d,
    reduce:       Vec<ConvBlock<B>>,
    reduce_pool:  MaxPool2d,
    blocks:       Vec<InceptionBlock<B>>,
    global_pool:  AdaptiveAvgPool2d,
    feature_size: usize,
}

impl<B: Backend> ImageEncoder<B> {
    /// `c` is the width of the first convolution; every other layer
    /// scales with it (c = 32 gives the Inception v3 stem widths).
    pub fn new(c: usize, device: &B::Device) -> Self {
        let c = c.max(2);
        let stem = vec![
            ConvBlock::new([3, c],     3, 2, 0, device),
            ConvBlock::new([c, c],     3, 1, 0, device),
            ConvBlock::new([c, 2 * c], 3, 1, 1, device),
        ];
        let reduce = vec![
            ConvBlock::new([2 * c, 5 * c / 2], 1, 1, 0, device),
            ConvBlock::new([5 * c / 2, 6 * c], 3, 1, 0, device),
        ];

        let mut in_channels = 6 * c;
        let mut blocks = Vec::new();
        for pool_proj in [c, 2 * c, 2 * c] {
            let cfg = InceptionBlockConfig {
                in_channels,
                b1:         2 * c,
                b3_reduce:  3 * c / 2,
                b3:         2 * c,
                dbl_reduce: 2 * c,
                dbl:        3 * c,
                pool_proj,
            };
            blocks.push(InceptionBlock::new(cfg, device));
            in_channels = cfg.out_channels();
        }

        Self {
            stem,
            stem_pool:    MaxPool2dConfig::new([3, 3]).with_strides([2, 2]).init(),
            reduce,
            reduce_pool:  MaxPool2dConfig::new([3, 3]).with_strides([2, 2]).init(),
            blocks,
            global_pool:  AdaptiveAvgPool2dConfig::new([1, 1]).init(),
            feature_size: in_channels,
        }
    }

    pub fn feature_size(&self) -> usize { self.feature_size }

    /// images: [b, 3, H, W] → features: [b, feature_size]
    pub fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        let mut x = images;
        for layer in &self.stem {
            x = layer.forward(x);
        }
        x = self.stem_pool.forward(x);
        for layer in &self.reduce {
            x = layer.forward(x);
        }
        x = self.reduce_pool.forward(x);
        for block in &self.blocks {
            x = block.forward(x);
        }
        let [batch_size, channels, _, _] = x.dims();
        self.global_pool.forward(x).reshape([batch_size, channels])
    }
}

// ─── ShowAndTellModel ─────────────────────────────────────────────────────────
#[derive(Module, Debug)]
pub struct ShowAndTellModel<B: Backend> {
    pub encoder:         ImageEncoder<B>,
    pub image_embedding: Linear<B>,
    pub seq_embedding:   Embedding<B>,
    pub lstm:            Lstm<B>,
    pub dropout:         Dropout,
    pub logits:          Linear<B>,
    pub num_lstm_units:  usize,
}

/// Masked cross-entropy over one batch.
pub struct CaptionLoss<B: Backend> {
    /// total_nll / total_weight
    pub loss:         Tensor<B, 1>,
    pub total_nll:    Tensor<B, 1>,
    pub total_weight: Tensor<B, 1>,
}

impl<B: Backend> ShowAndTellModel<B> {
    /// features: [b, F] → image embeddings: [b, E]
    pub fn embed_features(&self, features: Tensor<B, 2>) -> Tensor<B, 2> {
        self.image_embedding.forward(features)
    }

    /// Feed the image embedding as the first LSTM input, starting
    /// from a zero state, and return the resulting state.
    pub fn initial_state(&self, image_embeddings: Tensor<B, 2>) -> LstmState<B, 2> {
        let x = self.dropout.forward(image_embeddings).unsqueeze_dim::<3>(1);
        let (_, state) = self.lstm.forward(x, None);
        state
    }

    /// Teacher-forced decoding: input_seqs [b,T] → logits [b,T,V]
    pub fn decode(&self, input_seqs: Tensor<B, 2, Int>, state: LstmState<B, 2>) -> Tensor<B, 3> {
        let x = self.dropout.forward(self.seq_embedding.forward(input_seqs));
        let (outputs, _) = self.lstm.forward(x, Some(state));
        self.logits.forward(self.dropout.forward(outputs))
    }

    /// Loss from precomputed encoder features. The trainer uses this
    /// directly when the encoder is frozen.
    pub fn forward_loss_with_features(
        &self,
        features:    Tensor<B, 2>,
        input_seqs:  Tensor<B, 2, Int>,
        target_seqs: Tensor<B, 2, Int>,
        input_mask:  Tensor<B, 2, Int>,
    ) -> CaptionLoss<B> {
        let state  = self.initial_state(self.embed_features(features));
        let logits = self.decode(input_seqs, state);
        let [batch_size, seq_len, _] = logits.dims();

        // ── Token log-likelihood of each target ───────────────────────────────
        let log_probs = log_softmax(logits, 2);
        let picked    = log_probs
            .gather(2, target_seqs.unsqueeze_dim::<3>(2))
            .reshape([batch_size, seq_len]);

        // ── Masked mean ───────────────────────────────────────────────────────
        let weights      = input_mask.float();
        let total_nll    = (picked.neg() * weights.clone()).sum();
        let total_weight = weights.sum();
        let loss = total_nll.clone() / total_weight.clone().clamp_min(1.0);

        CaptionLoss { loss, total_nll, total_weight }
    }

    pub fn forward_loss(&self, batch: CaptionBatch<B>) -> CaptionLoss<B> {
        let features = self.encoder.forward(batch.images);
        self.forward_loss_with_features(
            features, batch.input_seqs, batch.target_seqs, batch.input_mask,
        )
    }

    /// One decoder step for `n` hypotheses.
    ///
    /// input_ids: [n], state: [n, units] each → (softmax [n, V], new state)
    pub fn inference_step(
        &self,
        input_ids: Tensor<B, 1, Int>,
        state:     LstmState<B, 2>,
    ) -> (Tensor<B, 2>, LstmState<B, 2>) {
        let [n] = input_ids.dims();
        let x = self.seq_embedding.forward(input_ids.unsqueeze_dim::<2>(1));
        let (outputs, state) = self.lstm.forward(x, Some(state));
        let logits = self.logits.forward(outputs.reshape([n, self.num_lstm_units]));
        (softmax(logits, 1), state)
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray;

    fn tiny_config() -> ShowAndTellConfig {
        ShowAndTellConfig::new(11)
            .with_embedding_size(8)
            .with_num_lstm_units(6)
            .with_encoder_base_channels(2)
    }

    fn ints(values: &[i32], shape: [usize; 2]) -> Tensor<TestBackend, 2, Int> {
        Tensor::<TestBackend, 1, Int>::from_ints(values, &Default::default()).reshape(shape)
    }

    #[test]
    fn test_encoder_feature_shape() {
        let device  = Default::default();
        let encoder = ImageEncoder::<TestBackend>::new(2, &device);
        let images  = Tensor::<TestBackend, 4>::zeros([2, 3, 32, 32], &device);
        let out     = encoder.forward(images);
        assert_eq!(out.dims(), [2, encoder.feature_size()]);
        assert_eq!(encoder.feature_size(), 18);
    }

    #[test]
    fn test_initial_state_has_lstm_width() {
        let device = Default::default();
        let model  = tiny_config().init::<TestBackend>(&device);
        let emb    = Tensor::<TestBackend, 2>::ones([3, 8], &device);
        let state  = model.initial_state(emb);
        assert_eq!(state.cell.dims(),   [3, 6]);
        assert_eq!(state.hidden.dims(), [3, 6]);
    }

    #[test]
    fn test_inference_step_returns_distributions() {
        let device = Default::default();
        let model  = tiny_config().init::<TestBackend>(&device);
        let state  = LstmState::new(
            Tensor::<TestBackend, 2>::zeros([2, 6], &device),
            Tensor::<TestBackend, 2>::zeros([2, 6], &device),
        );
        let ids = Tensor::<TestBackend, 1, Int>::from_ints([1, 4], &device);

        let (probs, next) = model.inference_step(ids, state);
        assert_eq!(probs.dims(), [2, 11]);
        assert_eq!(next.hidden.dims(), [2, 6]);

        let sums = probs.sum_dim(1).into_data().to_vec::<f32>().unwrap();
        assert!(sums.iter().all(|s| (s - 1.0).abs() < 1e-4));
    }

    #[test]
    fn test_padding_positions_do_not_change_loss() {
        let device   = Default::default();
        let model    = tiny_config().init::<TestBackend>(&device);
        let features = Tensor::<TestBackend, 2>::ones([1, 18], &device);
        let inputs   = ints(&[1, 4, 0], [1, 3]);
        let mask     = ints(&[1, 1, 0], [1, 3]);

        let a = model.forward_loss_with_features(
            features.clone(), inputs.clone(), ints(&[4, 2, 0], [1, 3]), mask.clone(),
        );
        let b = model.forward_loss_with_features(
            features, inputs, ints(&[4, 2, 9], [1, 3]), mask,
        );

        let la = a.loss.into_scalar().elem::<f64>();
        let lb = b.loss.into_scalar().elem::<f64>();
        assert!((la - lb).abs() < 1e-6);
        assert!(la > 0.0);
        assert_eq!(a.total_weight.into_scalar().elem::<f64>(), 2.0);
    }
}
