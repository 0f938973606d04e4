//! Gradient-free evaluation and prediction.
//!
//! Everything here runs on a plain (non-autodiff) backend, so dropout is
//! inactive and no graph is recorded.

use burn::prelude::*;
use metrocast_data::{TargetScaler, WindowLoader, WindowedDataset};
use metrocast_models::ExcelFormer;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::metrics::{tensor_values, MetricAccumulator, RegressionMetrics};

/// Loss and metrics of one pass over a split.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    /// Mean of the per-batch MSE losses, normalized.
    pub loss: f64,
    /// Error metrics over every predicted value.
    pub metrics: RegressionMetrics,
    /// Batches evaluated.
    pub batches: usize,
}

/// Forecasts and ground truth in °C, one row of `pred_len` values per window.
#[derive(Debug, Clone, PartialEq)]
pub struct Predictions {
    /// Forecasts in °C, row-major.
    pub preds_celsius: Vec<f32>,
    /// Observed values in °C, row-major.
    pub targets_celsius: Vec<f32>,
    /// Values per window.
    pub pred_len: usize,
}

impl Predictions {
    /// Number of windows.
    pub fn len(&self) -> usize {
        self.preds_celsius.len().checked_div(self.pred_len).unwrap_or(0)
    }

    /// Whether no window was predicted.
    pub fn is_empty(&self) -> bool {
        self.preds_celsius.is_empty()
    }

    /// Forecast and target of window `index`.
    pub fn window(&self, index: usize) -> Option<(&[f32], &[f32])> {
        let range = index * self.pred_len..(index + 1) * self.pred_len;
        Some((
            self.preds_celsius.get(range.clone())?,
            self.targets_celsius.get(range)?,
        ))
    }

    /// MAE in °C.
    pub fn mae(&self) -> f64 {
        self.metrics().mae_celsius
    }

    /// RMSE in °C.
    pub fn rmse(&self) -> f64 {
        self.metrics().rmse_celsius
    }

    fn metrics(&self) -> RegressionMetrics {
        // values are already in °C
        RegressionMetrics::compute(
            &self.preds_celsius,
            &self.targets_celsius,
            &TargetScaler::identity(),
        )
    }
}

/// MSE between a `(batch, pred_len, 1)` forecast and a `(batch, pred_len)` target.
pub(crate) fn mse_loss<B: Backend>(forecast: Tensor<B, 3>, target: Tensor<B, 2>) -> Tensor<B, 1> {
    let [batch, pred_len, _] = forecast.dims();
    let diff = forecast.reshape([batch, pred_len]) - target;
    (diff.clone() * diff).mean()
}

/// Evaluate `model` over every batch of `loader`.
pub fn evaluate<B: Backend>(
    model: &ExcelFormer<B>,
    loader: &WindowLoader,
    device: &B::Device,
) -> Result<Evaluation> {
    let mut total_loss = 0.0f64;
    let mut batches = 0usize;
    let mut acc = MetricAccumulator::new();

    for batch in loader.iter::<B>(0, device) {
        let batch = batch?;
        let forecast = model.forward(batch.x);
        let loss = mse_loss(forecast.clone(), batch.y.clone());
        total_loss += f64::from(loss.into_scalar().elem::<f32>());
        acc.push(forecast, batch.y);
        batches += 1;
    }

    let loss = if batches > 0 {
        total_loss / batches as f64
    } else {
        f64::NAN
    };
    Ok(Evaluation {
        loss,
        metrics: acc.compute(&loader.dataset().scaler()),
        batches,
    })
}

/// Forecast every window of `loader` and map both sides back to °C.
pub fn predict<B: Backend>(
    model: &ExcelFormer<B>,
    loader: &WindowLoader,
    device: &B::Device,
) -> Result<Predictions> {
    let scaler = loader.dataset().scaler();
    let mut acc = MetricAccumulator::new();
    for batch in loader.iter::<B>(0, device) {
        let batch = batch?;
        let forecast = model.forward(batch.x);
        acc.push(forecast, batch.y);
    }

    let (preds, targets) = acc.into_parts();
    Ok(Predictions {
        preds_celsius: scaler.inverse_slice(&preds),
        targets_celsius: scaler.inverse_slice(&targets),
        pred_len: loader.dataset().pred_len(),
    })
}

/// Forecast a single window of `dataset` in °C.
pub fn predict_window<B: Backend>(
    model: &ExcelFormer<B>,
    dataset: &WindowedDataset,
    index: usize,
    device: &B::Device,
) -> Result<Predictions> {
    let window = dataset.get(index)?;
    let (seq_len, n_features) = window.history.dim();
    let history: Vec<f32> = window.history.iter().copied().collect();
    let x = Tensor::<B, 1>::from_floats(history.as_slice(), device).reshape([1, seq_len, n_features]);

    let scaler = dataset.scaler();
    let preds = tensor_values(model.forward(x));
    let targets: Vec<f32> = window.target.to_vec();
    Ok(Predictions {
        preds_celsius: scaler.inverse_slice(&preds),
        targets_celsius: scaler.inverse_slice(&targets),
        pred_len: dataset.pred_len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray;

    #[test]
    fn test_mse_loss() {
        let device = Default::default();
        let forecast =
            Tensor::<TestBackend, 1>::from_floats([1.0, 2.0, 3.0, 4.0], &device).reshape([2, 2, 1]);
        let target =
            Tensor::<TestBackend, 1>::from_floats([1.0, 2.0, 3.0, 6.0], &device).reshape([2, 2]);
        let loss: f32 = mse_loss(forecast, target).into_scalar().elem();
        assert_relative_eq!(loss, 1.0);
    }

    #[test]
    fn test_predictions_windows() {
        let preds = Predictions {
            preds_celsius: vec![10.0, 11.0, 12.0, 13.0],
            targets_celsius: vec![10.0, 12.0, 12.0, 15.0],
            pred_len: 2,
        };
        assert_eq!(preds.len(), 2);
        assert_eq!(preds.window(1), Some((&[12.0, 13.0][..], &[12.0, 15.0][..])));
        assert_eq!(preds.window(2), None);
        assert_relative_eq!(preds.mae(), 0.75);
        assert_relative_eq!(preds.rmse(), 1.25f64.sqrt());
    }
}
