//! Regression metrics in normalized and physical units.

use burn::prelude::*;
use metrocast_data::TargetScaler;
use serde::{Deserialize, Serialize};

/// Error summary of a pass over a split.
///
/// `mae`/`rmse` are computed on normalized values, the `_celsius` variants
/// after mapping predictions and targets back through the target scaler.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RegressionMetrics {
    /// Mean absolute error, normalized.
    pub mae: f64,
    /// Root mean squared error, normalized.
    pub rmse: f64,
    /// Mean absolute error in °C.
    pub mae_celsius: f64,
    /// Root mean squared error in °C.
    pub rmse_celsius: f64,
}

impl RegressionMetrics {
    /// Compute from parallel slices of normalized predictions and targets.
    ///
    /// Empty input yields NaN for every metric.
    pub fn compute(preds: &[f32], targets: &[f32], scaler: &TargetScaler) -> Self {
        let n = preds.len().min(targets.len());
        if n == 0 {
            return Self {
                mae: f64::NAN,
                rmse: f64::NAN,
                mae_celsius: f64::NAN,
                rmse_celsius: f64::NAN,
            };
        }

        let (mut abs, mut sq, mut abs_c, mut sq_c) = (0.0f64, 0.0f64, 0.0f64, 0.0f64);
        for (&p, &t) in preds.iter().zip(targets) {
            let diff = f64::from(p) - f64::from(t);
            abs += diff.abs();
            sq += diff * diff;

            let diff_c = scaler.inverse(f64::from(p)) - scaler.inverse(f64::from(t));
            abs_c += diff_c.abs();
            sq_c += diff_c * diff_c;
        }

        let n = n as f64;
        Self {
            mae: abs / n,
            rmse: (sq / n).sqrt(),
            mae_celsius: abs_c / n,
            rmse_celsius: (sq_c / n).sqrt(),
        }
    }
}

/// Collects predictions and targets batch by batch.
#[derive(Debug, Clone, Default)]
pub struct MetricAccumulator {
    preds: Vec<f32>,
    targets: Vec<f32>,
}

impl MetricAccumulator {
    /// Create an empty accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a batch. Both tensors are flattened in row-major order.
    pub fn push<B: Backend, const D: usize, const E: usize>(
        &mut self,
        preds: Tensor<B, D>,
        targets: Tensor<B, E>,
    ) {
        self.preds.extend(tensor_values(preds));
        self.targets.extend(tensor_values(targets));
    }

    /// Number of values collected.
    pub fn len(&self) -> usize {
        self.preds.len()
    }

    /// Whether nothing was collected.
    pub fn is_empty(&self) -> bool {
        self.preds.is_empty()
    }

    /// Collected predictions.
    pub fn preds(&self) -> &[f32] {
        &self.preds
    }

    /// Collected targets.
    pub fn targets(&self) -> &[f32] {
        &self.targets
    }

    /// Summarize everything collected.
    pub fn compute(&self, scaler: &TargetScaler) -> RegressionMetrics {
        RegressionMetrics::compute(&self.preds, &self.targets, scaler)
    }

    /// Take the collected values.
    pub fn into_parts(self) -> (Vec<f32>, Vec<f32>) {
        (self.preds, self.targets)
    }
}

/// Flatten a tensor into host `f32` values.
pub(crate) fn tensor_values<B: Backend, const D: usize>(tensor: Tensor<B, D>) -> Vec<f32> {
    tensor
        .into_data()
        .convert::<f32>()
        .to_vec::<f32>()
        .unwrap_or_default()
}
