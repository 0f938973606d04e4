//! ExcelFormer: transformer encoder for hourly weather forecasting.
//!
//! The last input column holds the integer weather-condition code, which is
//! embedded and concatenated with the continuous columns before the input
//! projection. After `n_layers` encoder blocks the encoded history is mapped to
//! one value per step and then projected along time from `seq_len` steps to
//! `pred_len` steps.
//!
//! ```text
//! (B, seq_len, F) ─┬─ continuous (F-1) ──────────────┐
//!                  └─ code ─> Embedding(codes, e) ───┴─> Linear(F-1+e, d_model)
//!   -> + sinusoidal PE -> Dropout -> EncoderBlock × n_layers
//!   -> LayerNorm -> Linear(d_model, 1) -> Linear(seq_len, pred_len) over time
//!   -> (B, pred_len, 1)
//! ```

mod attention;
mod block;
mod positional;

pub use attention::{AttentionOutput, MultiHeadSelfAttention};
pub use block::EncoderBlock;
pub use positional::{add_positional_encoding, sinusoidal_table};

use burn::module::{ModuleVisitor, ParamId};
use burn::nn::{
    Dropout, DropoutConfig, Embedding, EmbeddingConfig, Initializer, LayerNorm, LayerNormConfig,
    Linear, LinearConfig,
};
use burn::prelude::*;
use metrocast_core::Config as RunConfig;
use serde::{Deserialize, Serialize};

use crate::error::{ModelError, Result};

const XAVIER: Initializer = Initializer::XavierUniform { gain: 1.0 };

/// Linear layer with a Xavier-uniform weight and the default bias.
pub(crate) fn xavier_linear<B: Backend>(d_in: usize, d_out: usize, device: &B::Device) -> Linear<B> {
    let mut linear = LinearConfig::new(d_in, d_out).init(device);
    linear.weight = XAVIER.init_with([d_in, d_out], Some(d_in), Some(d_out), device);
    linear
}

/// Configuration for [`ExcelFormer`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExcelFormerConfig {
    /// Continuous input columns, time features included.
    pub num_continuous: usize,
    /// Size of the weather-code vocabulary.
    pub num_weather_codes: usize,
    /// Width of the weather-code embedding.
    pub weather_code_embed_dim: usize,
    /// Model width.
    pub d_model: usize,
    /// Attention heads per block.
    pub n_heads: usize,
    /// Number of encoder blocks.
    pub n_layers: usize,
    /// Feed-forward width.
    pub d_ff: usize,
    /// History window length.
    pub seq_len: usize,
    /// Forecast window length.
    pub pred_len: usize,
    /// Dropout rate used throughout.
    pub dropout: f64,
}

impl Default for ExcelFormerConfig {
    fn default() -> Self {
        Self {
            num_continuous: 16,
            num_weather_codes: 100,
            weather_code_embed_dim: 8,
            d_model: 128,
            n_heads: 8,
            n_layers: 4,
            d_ff: 512,
            seq_len: 24,
            pred_len: 24,
            dropout: 0.1,
        }
    }
}

impl ExcelFormerConfig {
    /// Create a config for `num_continuous` continuous columns and default
    /// hyperparameters.
    pub fn new(num_continuous: usize, seq_len: usize, pred_len: usize) -> Self {
        Self {
            num_continuous,
            seq_len,
            pred_len,
            ..Default::default()
        }
    }

    /// Derive the model config from a run configuration.
    pub fn from_config(config: &RunConfig) -> Self {
        let model = &config.model;
        Self {
            num_continuous: config.num_continuous_features(),
            num_weather_codes: model.num_weather_codes,
            weather_code_embed_dim: model.weather_code_embed_dim,
            d_model: model.d_model,
            n_heads: model.n_heads,
            n_layers: model.n_layers,
            d_ff: model.d_ff,
            seq_len: config.training.seq_len,
            pred_len: config.training.pred_len,
            dropout: model.dropout,
        }
    }

    /// Set the weather-code vocabulary size and embedding width.
    #[must_use]
    pub fn with_weather_codes(mut self, num_weather_codes: usize, embed_dim: usize) -> Self {
        self.num_weather_codes = num_weather_codes;
        self.weather_code_embed_dim = embed_dim;
        self
    }

    /// Set model width.
    #[must_use]
    pub fn with_d_model(mut self, d_model: usize) -> Self {
        self.d_model = d_model;
        self
    }

    /// Set number of attention heads.
    #[must_use]
    pub fn with_n_heads(mut self, n_heads: usize) -> Self {
        self.n_heads = n_heads;
        self
    }

    /// Set number of encoder blocks.
    #[must_use]
    pub fn with_n_layers(mut self, n_layers: usize) -> Self {
        self.n_layers = n_layers;
        self
    }

    /// Set feed-forward width.
    #[must_use]
    pub fn with_d_ff(mut self, d_ff: usize) -> Self {
        self.d_ff = d_ff;
        self
    }

    /// Set dropout rate.
    #[must_use]
    pub fn with_dropout(mut self, dropout: f64) -> Self {
        self.dropout = dropout;
        self
    }

    /// Input width `F`: continuous columns plus the trailing code column.
    pub fn num_input_features(&self) -> usize {
        self.num_continuous + 1
    }

    /// Positions covered by the positional table.
    pub fn max_len(&self) -> usize {
        self.seq_len + self.pred_len
    }

    /// Check the hyperparameters for consistency.
    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("num_weather_codes", self.num_weather_codes),
            ("weather_code_embed_dim", self.weather_code_embed_dim),
            ("d_model", self.d_model),
            ("n_heads", self.n_heads),
            ("d_ff", self.d_ff),
            ("seq_len", self.seq_len),
            ("pred_len", self.pred_len),
        ];
        if let Some((name, _)) = positive.iter().find(|(_, value)| *value == 0) {
            return Err(ModelError::InvalidConfig(format!("{name} must be positive")));
        }
        if self.d_model % self.n_heads != 0 {
            return Err(ModelError::InvalidConfig(format!(
                "d_model ({}) must be divisible by n_heads ({})",
                self.d_model, self.n_heads
            )));
        }
        if !(0.0..1.0).contains(&self.dropout) {
            return Err(ModelError::InvalidConfig(format!(
                "dropout must be in [0, 1), got {}",
                self.dropout
            )));
        }
        Ok(())
    }

    /// Initialize the model.
    pub fn init<B: Backend>(&self, device: &B::Device) -> Result<ExcelFormer<B>> {
        ExcelFormer::new(self, device)
    }
}

/// Forward output with the attention weights of every block.
#[derive(Debug, Clone)]
pub struct ExcelFormerOutput<B: Backend> {
    /// `(batch, pred_len, 1)` forecast.
    pub forecast: Tensor<B, 3>,
    /// One `(batch, n_heads, seq_len, seq_len)` tensor per block, in order.
    pub attention: Vec<Tensor<B, 4>>,
}

/// Transformer encoder forecaster over a mixed categorical/continuous window.
///
/// # Example
///
/// ```rust,ignore
/// use metrocast_models::ExcelFormerConfig;
///
/// let config = ExcelFormerConfig::new(16, 24, 24).with_d_model(64).with_n_heads(4);
/// let model = config.init::<NdArray>(&device)?;
/// let forecast = model.forward(history); // [batch, 24, 1]
/// ```
#[derive(Module, Debug)]
pub struct ExcelFormer<B: Backend> {
    weather_code_embedding: Embedding<B>,
    input_projection: Linear<B>,
    pe_dropout: Dropout,
    blocks: Vec<EncoderBlock<B>>,
    output_norm: LayerNorm<B>,
    output_projection: Linear<B>,
    temporal_projection: Linear<B>,
    #[module(skip)]
    num_continuous: usize,
    #[module(skip)]
    seq_len: usize,
    #[module(skip)]
    pred_len: usize,
    #[module(skip)]
    max_len: usize,
}

impl<B: Backend> ExcelFormer<B> {
    /// Build the model from a validated config.
    pub fn new(config: &ExcelFormerConfig, device: &B::Device) -> Result<Self> {
        config.validate()?;

        let mut weather_code_embedding =
            EmbeddingConfig::new(config.num_weather_codes, config.weather_code_embed_dim).init(device);
        weather_code_embedding.weight = XAVIER.init_with(
            [config.num_weather_codes, config.weather_code_embed_dim],
            Some(config.weather_code_embed_dim),
            Some(config.num_weather_codes),
            device,
        );

        let blocks = (0..config.n_layers)
            .map(|_| {
                EncoderBlock::new(
                    config.d_model,
                    config.n_heads,
                    config.d_ff,
                    config.dropout,
                    device,
                )
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            weather_code_embedding,
            input_projection: xavier_linear(
                config.num_continuous + config.weather_code_embed_dim,
                config.d_model,
                device,
            ),
            pe_dropout: DropoutConfig::new(config.dropout).init(),
            blocks,
            output_norm: LayerNormConfig::new(config.d_model).init(device),
            output_projection: xavier_linear(config.d_model, 1, device),
            temporal_projection: xavier_linear(config.seq_len, config.pred_len, device),
            num_continuous: config.num_continuous,
            seq_len: config.seq_len,
            pred_len: config.pred_len,
            max_len: config.max_len(),
        })
    }

    /// Forecast `(batch, pred_len, 1)` from `(batch, seq_len, F)`.
    pub fn forward(&self, x: Tensor<B, 3>) -> Tensor<B, 3> {
        let mut h = self.embed(x);
        for block in &self.blocks {
            h = block.forward(h, None);
        }
        self.head(h)
    }

    /// Forecast together with the attention weights of each block.
    pub fn forward_with_attention(&self, x: Tensor<B, 3>) -> ExcelFormerOutput<B> {
        let mut h = self.embed(x);
        let mut attention = Vec::with_capacity(self.blocks.len());
        for block in &self.blocks {
            let out = block.forward_with_attention(h, None);
            h = out.context;
            attention.push(out.weights);
        }
        ExcelFormerOutput {
            forecast: self.head(h),
            attention,
        }
    }

    /// Split, embed and project the input, then add positions.
    fn embed(&self, x: Tensor<B, 3>) -> Tensor<B, 3> {
        let [batch, seq_len, n_features] = x.dims();
        let n_cont = n_features - 1;

        let codes = x
            .clone()
            .slice([0..batch, 0..seq_len, n_cont..n_features])
            .reshape([batch, seq_len])
            .int();
        let continuous = x.slice([0..batch, 0..seq_len, 0..n_cont]);
        let embedded = self.weather_code_embedding.forward(codes);

        let h = self
            .input_projection
            .forward(Tensor::cat(vec![continuous, embedded], 2));
        self.pe_dropout
            .forward(add_positional_encoding(h, self.max_len))
    }

    /// Per-step scalar then projection along time.
    fn head(&self, h: Tensor<B, 3>) -> Tensor<B, 3> {
        let per_step = self.output_projection.forward(self.output_norm.forward(h));
        self.temporal_projection
            .forward(per_step.swap_dims(1, 2))
            .swap_dims(1, 2)
    }

    /// Parameters that receive gradients on this backend.
    ///
    /// On an autodiff backend this equals [`Module::num_params`]; on a plain
    /// inference backend nothing tracks gradients and the count is zero.
    pub fn num_trainable_params(&self) -> usize {
        let mut counter = TrainableCounter { count: 0 };
        self.visit(&mut counter);
        counter.count
    }

    /// Number of encoder blocks.
    pub fn n_layers(&self) -> usize {
        self.blocks.len()
    }

    /// Continuous input columns.
    pub fn num_continuous(&self) -> usize {
        self.num_continuous
    }

    /// History window length.
    pub fn seq_len(&self) -> usize {
        self.seq_len
    }

    /// Forecast window length.
    pub fn pred_len(&self) -> usize {
        self.pred_len
    }
}

struct TrainableCounter {
    count: usize,
}

impl<B: Backend> ModuleVisitor<B> for TrainableCounter {
    fn visit_float<const D: usize>(&mut self, _id: ParamId, tensor: &Tensor<B, D>) {
        if tensor.is_require_grad() {
            self.count += tensor.shape().num_elements();
        }
    }
}
