//! Multi-head self-attention over the time axis.

use burn::nn::{Dropout, DropoutConfig, Linear};
use burn::prelude::*;
use burn::tensor::activation::softmax;

use super::xavier_linear;
use crate::error::{ModelError, Result};

/// Output of a self-attention pass.
#[derive(Debug, Clone)]
pub struct AttentionOutput<B: Backend> {
    /// `(batch, seq_len, d_model)` mixed head outputs.
    pub context: Tensor<B, 3>,
    /// `(batch, n_heads, seq_len, seq_len)` attention weights.
    pub weights: Tensor<B, 4>,
}

/// Scaled dot-product self-attention split into `n_heads` sub-spaces.
#[derive(Module, Debug)]
pub struct MultiHeadSelfAttention<B: Backend> {
    query: Linear<B>,
    key: Linear<B>,
    value: Linear<B>,
    output: Linear<B>,
    dropout: Dropout,
    #[module(skip)]
    n_heads: usize,
    #[module(skip)]
    head_dim: usize,
}

impl<B: Backend> MultiHeadSelfAttention<B> {
    /// Build the projections.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::InvalidConfig`] if `d_model` is not divisible by
    /// `n_heads`.
    pub fn new(d_model: usize, n_heads: usize, dropout: f64, device: &B::Device) -> Result<Self> {
        if n_heads == 0 || d_model % n_heads != 0 {
            return Err(ModelError::InvalidConfig(format!(
                "d_model ({d_model}) must be divisible by n_heads ({n_heads})"
            )));
        }
        Ok(Self {
            query: xavier_linear(d_model, d_model, device),
            key: xavier_linear(d_model, d_model, device),
            value: xavier_linear(d_model, d_model, device),
            output: xavier_linear(d_model, d_model, device),
            dropout: DropoutConfig::new(dropout).init(),
            n_heads,
            head_dim: d_model / n_heads,
        })
    }

    /// Attend over `x` of shape `(batch, seq_len, d_model)`.
    ///
    /// `mask` has shape `(batch or 1, seq_len, seq_len)`; `true` marks a
    /// query/key pair that is hidden (its score is set to negative infinity
    /// before the softmax).
    pub fn forward(&self, x: Tensor<B, 3>, mask: Option<Tensor<B, 3, Bool>>) -> AttentionOutput<B> {
        let [batch, seq_len, d_model] = x.dims();

        let q = self.split_heads(self.query.forward(x.clone()));
        let k = self.split_heads(self.key.forward(x.clone()));
        let v = self.split_heads(self.value.forward(x));

        let scores = q
            .matmul(k.swap_dims(2, 3))
            .div_scalar((self.head_dim as f32).sqrt());

        let scores = match mask {
            Some(mask) => {
                let [mask_batch, rows, cols] = mask.dims();
                let mask = mask
                    .reshape([mask_batch, 1, rows, cols])
                    .expand([batch, self.n_heads, seq_len, seq_len]);
                scores.mask_fill(mask, f32::NEG_INFINITY)
            }
            None => scores,
        };

        let weights = softmax(scores, 3);
        let context = self
            .dropout
            .forward(weights.clone())
            .matmul(v)
            .swap_dims(1, 2)
            .reshape([batch, seq_len, d_model]);

        AttentionOutput {
            context: self.output.forward(context),
            weights,
        }
    }

    /// `(batch, seq_len, d_model)` to `(batch, n_heads, seq_len, head_dim)`.
    fn split_heads(&self, x: Tensor<B, 3>) -> Tensor<B, 4> {
        let [batch, seq_len, _] = x.dims();
        x.reshape([batch, seq_len, self.n_heads, self.head_dim])
            .swap_dims(1, 2)
    }

    /// Number of heads.
    #[must_use]
    pub fn n_heads(&self) -> usize {
        self.n_heads
    }

    /// Width of each head.
    #[must_use]
    pub fn head_dim(&self) -> usize {
        self.head_dim
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::tensor::Distribution;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray;

    #[test]
    fn test_shapes() {
        let device = Default::default();
        let attn = MultiHeadSelfAttention::<TestBackend>::new(16, 4, 0.0, &device).unwrap();
        assert_eq!(attn.head_dim(), 4);

        let x = Tensor::<TestBackend, 3>::random([3, 5, 16], Distribution::Normal(0.0, 1.0), &device);
        let out = attn.forward(x, None);
        assert_eq!(out.context.dims(), [3, 5, 16]);
        assert_eq!(out.weights.dims(), [3, 4, 5, 5]);
    }

    #[test]
    fn test_weights_sum_to_one() {
        let device = Default::default();
        let attn = MultiHeadSelfAttention::<TestBackend>::new(8, 2, 0.0, &device).unwrap();
        let x = Tensor::<TestBackend, 3>::random([2, 6, 8], Distribution::Normal(0.0, 1.0), &device);

        let sums: Vec<f32> = attn
            .forward(x, None)
            .weights
            .sum_dim(3)
            .into_data()
            .to_vec()
            .unwrap();
        assert!(sums.iter().all(|s| (s - 1.0).abs() < 1e-5));
    }

    #[test]
    fn test_mask_zeroes_hidden_keys() {
        let device = Default::default();
        let attn = MultiHeadSelfAttention::<TestBackend>::new(8, 2, 0.0, &device).unwrap();
        let x = Tensor::<TestBackend, 3>::random([1, 4, 8], Distribution::Normal(0.0, 1.0), &device);

        // causal mask: hide keys after the query position
        let causal: Vec<bool> = (0..4)
            .flat_map(|q| (0..4).map(move |k| k > q))
            .collect();
        let mask = Tensor::<TestBackend, 1, Bool>::from_bool(
            burn::tensor::TensorData::new(causal, [16]),
            &device,
        )
        .reshape([1, 4, 4]);

        let weights: Vec<f32> = attn
            .forward(x, Some(mask))
            .weights
            .into_data()
            .to_vec()
            .unwrap();
        for head in 0..2 {
            for q in 0..4 {
                for k in (q + 1)..4 {
                    assert_eq!(weights[head * 16 + q * 4 + k], 0.0);
                }
            }
        }
    }

    #[test]
    fn test_indivisible_width_rejected() {
        let device = Default::default();
        let err = MultiHeadSelfAttention::<TestBackend>::new(10, 4, 0.1, &device).unwrap_err();
        assert!(matches!(err, ModelError::InvalidConfig(_)));
    }
}
