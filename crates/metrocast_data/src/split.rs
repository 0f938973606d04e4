//! Chronological split boundaries and window arithmetic.

use std::ops::Range;

use metrocast_core::{Split, SplitRatio};

use crate::error::Result;

/// Number of (history, target) windows in a series of `len` rows.
///
/// ```rust
/// use metrocast_data::window_count;
///
/// assert_eq!(window_count(800, 24, 24), 753);
/// assert_eq!(window_count(40, 24, 24), 0);
/// ```
#[must_use]
pub const fn window_count(len: usize, seq_len: usize, pred_len: usize) -> usize {
    len.saturating_sub((seq_len + pred_len).saturating_sub(1))
}

/// Row boundaries of the three chronological splits.
///
/// `train = [0, train_end)`, `val = [train_end, val_end)`,
/// `test = [val_end, len)`. The test split takes every remaining row, so
/// the three ranges always partition the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SplitBoundaries {
    len: usize,
    train_end: usize,
    val_end: usize,
}

impl SplitBoundaries {
    /// Compute boundaries for a table of `len` rows.
    ///
    /// # Errors
    ///
    /// Returns an error if the ratios are invalid.
    pub fn new(len: usize, ratio: &SplitRatio) -> Result<Self> {
        ratio.validate()?;
        let train_end = ((len as f64) * ratio.train).floor() as usize;
        let val_end = (train_end + ((len as f64) * ratio.val).floor() as usize).min(len);
        Ok(Self {
            len,
            train_end: train_end.min(len),
            val_end,
        })
    }

    /// Total rows.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Whether the table is empty.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// End of the training prefix (exclusive).
    #[must_use]
    pub const fn train_end(&self) -> usize {
        self.train_end
    }

    /// End of the validation range (exclusive).
    #[must_use]
    pub const fn val_end(&self) -> usize {
        self.val_end
    }

    /// Row range of a split.
    #[must_use]
    pub fn range(&self, split: Split) -> Range<usize> {
        match split {
            Split::Train => 0..self.train_end,
            Split::Val => self.train_end..self.val_end,
            Split::Test => self.val_end..self.len,
        }
    }
}
