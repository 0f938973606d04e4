//! Target scaling and the inverse transform back to physical units.

use burn::prelude::*;
use serde::{Deserialize, Serialize};

/// `(mean, std)` of the forecast target.
///
/// Built from the target's own row in the normalization statistics and never
/// mutated afterwards.
///
/// # Example
///
/// ```rust
/// use metrocast_data::TargetScaler;
///
/// let scaler = TargetScaler::new(15.0, 5.0);
/// assert_eq!(scaler.inverse(1.0), 20.0);
/// assert_eq!(scaler.transform(20.0), 1.0);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TargetScaler {
    mean: f64,
    std: f64,
}

impl TargetScaler {
    /// Create a scaler; `std` is expected to be non-zero.
    #[must_use]
    pub const fn new(mean: f64, std: f64) -> Self {
        Self { mean, std }
    }

    /// Identity scaler.
    #[must_use]
    pub const fn identity() -> Self {
        Self::new(0.0, 1.0)
    }

    /// Target mean.
    #[must_use]
    pub const fn mean(&self) -> f64 {
        self.mean
    }

    /// Target standard deviation.
    #[must_use]
    pub const fn std(&self) -> f64 {
        self.std
    }

    /// Physical value to normalized value.
    #[must_use]
    pub fn transform(&self, value: f64) -> f64 {
        (value - self.mean) / self.std
    }

    /// Normalized value to physical value: `value * std + mean`.
    #[must_use]
    pub fn inverse(&self, value: f64) -> f64 {
        value * self.std + self.mean
    }

    /// Inverse transform of a slice of normalized predictions.
    #[must_use]
    pub fn inverse_slice(&self, values: &[f32]) -> Vec<f32> {
        values
            .iter()
            .map(|&v| self.inverse(f64::from(v)) as f32)
            .collect()
    }

    /// Inverse transform of a tensor of any rank.
    pub fn inverse_tensor<B: Backend, const D: usize>(&self, values: Tensor<B, D>) -> Tensor<B, D> {
        values.mul_scalar(self.std as f32).add_scalar(self.mean as f32)
    }
}

impl Default for TargetScaler {
    fn default() -> Self {
        Self::identity()
    }
}
