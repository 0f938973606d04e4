//! Fixed sinusoidal positional encoding.

use burn::prelude::*;

/// Sinusoidal table of shape `(len, d_model)`.
///
/// `pe[pos, 2i] = sin(pos / 10000^(2i / d_model))` and
/// `pe[pos, 2i + 1] = cos(pos / 10000^(2i / d_model))`. The table is
/// computed, never learned.
pub fn sinusoidal_table<B: Backend>(len: usize, d_model: usize, device: &B::Device) -> Tensor<B, 2> {
    let mut pe = vec![0.0f32; len * d_model];
    for pos in 0..len {
        for i in 0..d_model {
            let exponent = (2 * (i / 2)) as f64 / d_model as f64;
            let angle = pos as f64 / 10000f64.powf(exponent);
            let value = if i % 2 == 0 { angle.sin() } else { angle.cos() };
            pe[pos * d_model + i] = value as f32;
        }
    }
    Tensor::<B, 1>::from_floats(pe.as_slice(), device).reshape([len, d_model])
}

/// Add the first `seq_len` rows of a `max_len` table to `x`.
///
/// `x` is `(batch, seq_len, d_model)`. A sequence longer than `max_len` is a
/// shape failure of the slice.
pub fn add_positional_encoding<B: Backend>(x: Tensor<B, 3>, max_len: usize) -> Tensor<B, 3> {
    let [_, seq_len, d_model] = x.dims();
    let table = sinusoidal_table::<B>(max_len, d_model, &x.device()).slice([0..seq_len, 0..d_model]);
    x + table.unsqueeze::<3>()
}
