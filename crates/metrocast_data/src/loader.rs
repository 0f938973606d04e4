//! Batched iteration over a [`WindowedDataset`].

use burn::prelude::*;
use rand::seq::SliceRandom;

use crate::dataset::WindowedDataset;
use crate::error::{DataError, Result};
use metrocast_core::{Seed, Split};

/// A batch of windows as backend tensors.
#[derive(Debug, Clone)]
pub struct WindowBatch<B: Backend> {
    /// `(batch, seq_len, n_features)` history.
    pub x: Tensor<B, 3>,
    /// `(batch, pred_len)` normalized target.
    pub y: Tensor<B, 2>,
}

impl<B: Backend> WindowBatch<B> {
    /// Number of windows in the batch.
    #[must_use]
    pub fn len(&self) -> usize {
        self.x.dims()[0]
    }

    /// Whether the batch holds no windows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Produces batches from a windowed dataset.
///
/// Training loaders shuffle with a seed derived from the master seed and
/// the epoch number, so every epoch sees a different but reproducible
/// order. Evaluation splits are never shuffled.
///
/// # Example
///
/// ```rust,ignore
/// use metrocast_data::WindowLoader;
/// use metrocast_core::Seed;
///
/// let loader = WindowLoader::builder(train_ds)
///     .batch_size(32)
///     .shuffle(true)
///     .seed(Seed::new(42))
///     .build()?;
///
/// for batch in loader.iter::<NdArray>(epoch, &device) {
///     let batch = batch?;
/// }
/// ```
#[derive(Debug, Clone)]
pub struct WindowLoader {
    dataset: WindowedDataset,
    batch_size: usize,
    shuffle: bool,
    seed: Seed,
}

impl WindowLoader {
    /// Create a new loader builder.
    #[must_use]
    pub fn builder(dataset: WindowedDataset) -> WindowLoaderBuilder {
        WindowLoaderBuilder::new(dataset)
    }

    /// Underlying dataset.
    #[must_use]
    pub fn dataset(&self) -> &WindowedDataset {
        &self.dataset
    }

    /// Batch size.
    #[must_use]
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Whether batches are shuffled.
    #[must_use]
    pub fn is_shuffled(&self) -> bool {
        self.shuffle
    }

    /// Number of batches per pass; the last batch may be partial.
    #[must_use]
    pub fn n_batches(&self) -> usize {
        self.dataset.len().div_ceil(self.batch_size)
    }

    /// Number of windows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.dataset.len()
    }

    /// Whether the dataset has no windows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.dataset.is_empty()
    }

    /// Window indices in the order they are visited during `epoch`.
    #[must_use]
    pub fn order(&self, epoch: usize) -> Vec<usize> {
        let mut indices: Vec<usize> = (0..self.dataset.len()).collect();
        if self.shuffle {
            let mut rng = self.seed.for_epoch(epoch).to_rng();
            indices.shuffle(&mut rng);
        }
        indices
    }

    /// Iterate over the batches of `epoch` on `device`.
    #[must_use]
    pub fn iter<B: Backend>(&self, epoch: usize, device: &B::Device) -> WindowLoaderIter<'_, B> {
        WindowLoaderIter {
            loader: self,
            device: device.clone(),
            indices: self.order(epoch),
            cursor: 0,
        }
    }
}

/// Builder for [`WindowLoader`].
pub struct WindowLoaderBuilder {
    dataset: WindowedDataset,
    batch_size: usize,
    shuffle: Option<bool>,
    seed: Seed,
}

impl WindowLoaderBuilder {
    /// Create a new builder.
    #[must_use]
    pub fn new(dataset: WindowedDataset) -> Self {
        Self {
            dataset,
            batch_size: 32,
            shuffle: None,
            seed: Seed::default(),
        }
    }

    /// Set the batch size.
    #[must_use]
    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Enable or disable shuffling. Defaults to shuffling only the training split.
    #[must_use]
    pub fn shuffle(mut self, shuffle: bool) -> Self {
        self.shuffle = Some(shuffle);
        self
    }

    /// Set the master seed for shuffling.
    #[must_use]
    pub fn seed(mut self, seed: Seed) -> Self {
        self.seed = seed;
        self
    }

    /// Build the loader.
    ///
    /// # Errors
    ///
    /// Fails on a zero batch size, on an empty dataset, or when shuffling is
    /// requested for a validation or test split.
    pub fn build(self) -> Result<WindowLoader> {
        if self.batch_size == 0 {
            return Err(DataError::InvalidConfig(
                "batch size must be greater than 0".to_string(),
            ));
        }
        let split = self.dataset.split();
        if self.dataset.is_empty() {
            return Err(DataError::EmptyDataset(format!(
                "{split} split has {} rows, fewer than seq_len + pred_len = {}",
                self.dataset.split_range().len(),
                self.dataset.seq_len() + self.dataset.pred_len()
            )));
        }
        let shuffle = self.shuffle.unwrap_or(split == Split::Train);
        if shuffle && split.is_eval() {
            return Err(DataError::InvalidConfig(format!(
                "the {split} split must be iterated in chronological order"
            )));
        }

        Ok(WindowLoader {
            dataset: self.dataset,
            batch_size: self.batch_size,
            shuffle,
            seed: self.seed,
        })
    }
}

/// Iterator over the batches of one pass.
pub struct WindowLoaderIter<'a, B: Backend> {
    loader: &'a WindowLoader,
    device: B::Device,
    indices: Vec<usize>,
    cursor: usize,
}

impl<B: Backend> Iterator for WindowLoaderIter<'_, B> {
    type Item = Result<WindowBatch<B>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.cursor >= self.indices.len() {
            return None;
        }
        let end = (self.cursor + self.loader.batch_size).min(self.indices.len());
        let batch = self.create_batch(self.cursor..end);
        self.cursor = end;
        Some(batch)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = (self.indices.len() - self.cursor).div_ceil(self.loader.batch_size);
        (remaining, Some(remaining))
    }
}

impl<B: Backend> ExactSizeIterator for WindowLoaderIter<'_, B> {}

impl<B: Backend> WindowLoaderIter<'_, B> {
    fn create_batch(&self, range: std::ops::Range<usize>) -> Result<WindowBatch<B>> {
        let dataset = &self.loader.dataset;
        let batch_size = range.len();
        let (seq_len, pred_len, n_features) =
            (dataset.seq_len(), dataset.pred_len(), dataset.n_features());

        let mut x_flat = Vec::with_capacity(batch_size * seq_len * n_features);
        let mut y_flat = Vec::with_capacity(batch_size * pred_len);
        for &idx in &self.indices[range] {
            let window = dataset.get(idx)?;
            x_flat.extend(window.history.iter().copied());
            y_flat.extend(window.target.iter().copied());
        }

        let x = Tensor::<B, 1>::from_floats(x_flat.as_slice(), &self.device)
            .reshape([batch_size, seq_len, n_features]);
        let y = Tensor::<B, 1>::from_floats(y_flat.as_slice(), &self.device)
            .reshape([batch_size, pred_len]);
        Ok(WindowBatch { x, y })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::DatasetOptions;
    use crate::stats::Statistics;
    use crate::table::WeatherTable;
    use burn_ndarray::NdArray;
    use chrono::{Duration, NaiveDate};
    use metrocast_core::SplitRatio;
    use ndarray::Array2;

    type TestBackend = NdArray;

    fn dataset(len: usize, split: Split) -> WindowedDataset {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        let ts = (0..len as i64).map(|h| start + Duration::hours(h)).collect();
        let values = Array2::from_shape_fn((len, 2), |(r, c)| if c == 0 { r as f64 } else { 1.0 });
        let cols = vec!["temp".to_string(), "code".to_string()];
        let table = WeatherTable::new(ts, cols, values).unwrap();
        let options = DatasetOptions {
            seq_len: 4,
            pred_len: 2,
            target_col: "temp".to_string(),
            continuous: vec!["temp".to_string()],
            categorical: "code".to_string(),
            split_ratio: SplitRatio::new(0.6, 0.2, 0.2),
        };
        let stats = Statistics::fit(&table, &options.continuous, "code", &options.split_ratio, "temp").unwrap();
        WindowedDataset::from_table(&table, &stats, &options, split).unwrap()
    }

    #[test]
    fn test_batch_shapes_and_partial_last_batch() {
        // 60 train rows -> 55 windows -> 7 batches of 8, last holds 7
        let loader = WindowLoader::builder(dataset(100, Split::Train))
            .batch_size(8)
            .build()
            .unwrap();
        assert_eq!(loader.len(), 55);
        assert_eq!(loader.n_batches(), 7);

        let device = Default::default();
        let batches: Vec<_> = loader
            .iter::<TestBackend>(0, &device)
            .collect::<Result<Vec<_>>>()
            .unwrap();
        assert_eq!(batches.len(), 7);
        assert_eq!(batches[0].x.dims(), [8, 4, 1 + 6 + 1]);
        assert_eq!(batches[0].y.dims(), [8, 2]);
        assert_eq!(batches[6].len(), 7);
    }

    #[test]
    fn test_train_shuffles_reproducibly_per_epoch() {
        let loader = WindowLoader::builder(dataset(100, Split::Train))
            .seed(Seed::new(7))
            .build()
            .unwrap();
        assert!(loader.is_shuffled());

        let epoch0 = loader.order(0);
        assert_eq!(epoch0, loader.order(0));
        assert_ne!(epoch0, loader.order(1));

        let mut sorted = epoch0.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, (0..loader.len()).collect::<Vec<_>>());
    }

    #[test]
    fn test_eval_splits_stay_ordered() {
        let loader = WindowLoader::builder(dataset(100, Split::Val)).build().unwrap();
        assert!(!loader.is_shuffled());
        assert_eq!(loader.order(3), (0..loader.len()).collect::<Vec<_>>());

        let err = WindowLoader::builder(dataset(100, Split::Test))
            .shuffle(true)
            .build()
            .unwrap_err();
        assert!(matches!(err, DataError::InvalidConfig(_)));
    }

    #[test]
    fn test_empty_split_and_zero_batch_rejected() {
        assert!(matches!(
            WindowLoader::builder(dataset(20, Split::Val)).build(),
            Err(DataError::EmptyDataset(_))
        ));
        assert!(WindowLoader::builder(dataset(100, Split::Train))
            .batch_size(0)
            .build()
            .is_err());
    }
}
