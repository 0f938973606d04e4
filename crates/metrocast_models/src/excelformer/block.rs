//! Post-norm transformer encoder block.

use burn::nn::{Dropout, DropoutConfig, LayerNorm, LayerNormConfig, Linear};
use burn::prelude::*;
use burn::tensor::activation::gelu;

use super::attention::{AttentionOutput, MultiHeadSelfAttention};
use super::xavier_linear;
use crate::error::Result;

/// Self-attention followed by a GELU feed-forward network, each wrapped in a
/// residual connection and a LayerNorm.
#[derive(Module, Debug)]
pub struct EncoderBlock<B: Backend> {
    attention: MultiHeadSelfAttention<B>,
    attn_dropout: Dropout,
    norm1: LayerNorm<B>,
    ff_linear1: Linear<B>,
    ff_linear2: Linear<B>,
    ff_dropout1: Dropout,
    ff_dropout2: Dropout,
    norm2: LayerNorm<B>,
}

impl<B: Backend> EncoderBlock<B> {
    /// Build a block of width `d_model` with an inner feed-forward width `d_ff`.
    pub fn new(
        d_model: usize,
        n_heads: usize,
        d_ff: usize,
        dropout: f64,
        device: &B::Device,
    ) -> Result<Self> {
        Ok(Self {
            attention: MultiHeadSelfAttention::new(d_model, n_heads, dropout, device)?,
            attn_dropout: DropoutConfig::new(dropout).init(),
            norm1: LayerNormConfig::new(d_model).init(device),
            ff_linear1: xavier_linear(d_model, d_ff, device),
            ff_linear2: xavier_linear(d_ff, d_model, device),
            ff_dropout1: DropoutConfig::new(dropout).init(),
            ff_dropout2: DropoutConfig::new(dropout).init(),
            norm2: LayerNormConfig::new(d_model).init(device),
        })
    }

    /// Forward pass, `(batch, seq_len, d_model)` in and out.
    pub fn forward(&self, x: Tensor<B, 3>, mask: Option<Tensor<B, 3, Bool>>) -> Tensor<B, 3> {
        self.forward_with_attention(x, mask).context
    }

    /// Forward pass that also returns this block's attention weights.
    ///
    /// The returned `context` is the block output, not the raw attention
    /// context.
    pub fn forward_with_attention(
        &self,
        x: Tensor<B, 3>,
        mask: Option<Tensor<B, 3, Bool>>,
    ) -> AttentionOutput<B> {
        let AttentionOutput { context, weights } = self.attention.forward(x.clone(), mask);
        let x = self.norm1.forward(x + self.attn_dropout.forward(context));

        let ff = gelu(self.ff_linear1.forward(x.clone()));
        let ff = self.ff_linear2.forward(self.ff_dropout1.forward(ff));
        let x = self.norm2.forward(x + self.ff_dropout2.forward(ff));

        AttentionOutput {
            context: x,
            weights,
        }
    }
}
