//! Epoch-boundary decisions: early stopping and best-checkpoint tracking.

use metrocast_core::EarlyStoppingConfig;

/// Stops training when the validation loss stops improving.
///
/// An epoch improves iff `val_loss < best - min_delta`. Improvement resets
/// the counter; anything else increments it, and training stops once the
/// counter reaches `patience`. Once triggered the decision is final.
#[derive(Debug, Clone)]
pub struct EarlyStopping {
    enabled: bool,
    patience: usize,
    min_delta: f64,
    best_loss: f64,
    counter: usize,
    stopped: bool,
}

impl EarlyStopping {
    /// Create an enabled early stopper.
    pub fn new(patience: usize, min_delta: f64) -> Self {
        Self {
            enabled: true,
            patience,
            min_delta,
            best_loss: f64::INFINITY,
            counter: 0,
            stopped: false,
        }
    }

    /// A stopper that never fires.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::new(0, 0.0)
        }
    }

    /// Build from the `early_stopping` config section.
    pub fn from_config(config: &EarlyStoppingConfig) -> Self {
        if config.enabled {
            Self::new(config.patience, config.min_delta)
        } else {
            Self::disabled()
        }
    }

    /// Record the validation loss of a finished epoch.
    ///
    /// Returns true if training should stop.
    pub fn update(&mut self, val_loss: f64) -> bool {
        if !self.enabled {
            return false;
        }
        if self.stopped {
            return true;
        }

        if val_loss < self.best_loss - self.min_delta {
            self.best_loss = val_loss;
            self.counter = 0;
        } else {
            self.counter += 1;
            if self.counter >= self.patience {
                tracing::info!(
                    "Early stopping triggered after {} epochs without improvement",
                    self.counter
                );
                self.stopped = true;
            }
        }
        self.stopped
    }

    /// Whether stopping has been triggered.
    pub fn should_stop(&self) -> bool {
        self.stopped
    }

    /// Epochs since the last improvement.
    pub fn counter(&self) -> usize {
        self.counter
    }

    /// Best loss seen.
    pub fn best_loss(&self) -> f64 {
        self.best_loss
    }
}

/// Decides when the "best" checkpoint is rewritten.
///
/// Unlike [`EarlyStopping`] there is no tolerance: any strict improvement on
/// the best-so-far validation loss counts.
#[derive(Debug, Clone)]
pub struct CheckpointPolicy {
    best_loss: f64,
    best_epoch: Option<usize>,
}

impl Default for CheckpointPolicy {
    fn default() -> Self {
        Self {
            best_loss: f64::INFINITY,
            best_epoch: None,
        }
    }
}

impl CheckpointPolicy {
    /// Create a policy with no best yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the validation loss of `epoch`; returns true if it is a new best.
    pub fn update(&mut self, epoch: usize, val_loss: f64) -> bool {
        if val_loss < self.best_loss {
            self.best_loss = val_loss;
            self.best_epoch = Some(epoch);
            true
        } else {
            false
        }
    }

    /// Best validation loss so far.
    pub fn best_loss(&self) -> f64 {
        self.best_loss
    }

    /// Epoch of the best validation loss.
    pub fn best_epoch(&self) -> Option<usize> {
        self.best_epoch
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fires_at_k_plus_patience() {
        let patience = 3;
        let mut stopper = EarlyStopping::new(patience, 1e-4);

        // improves through epoch 4, then flat
        let losses = [1.0, 0.8, 0.6, 0.5, 0.5, 0.5, 0.5, 0.5];
        let stopped_at = losses
            .iter()
            .enumerate()
            .find_map(|(i, &loss)| stopper.update(loss).then_some(i + 1));
        assert_eq!(stopped_at, Some(4 + patience));
    }

    #[test]
    fn test_min_delta_counts_as_no_improvement() {
        let mut stopper = EarlyStopping::new(2, 0.1);
        assert!(!stopper.update(1.0));
        assert!(!stopper.update(0.95));
        assert_eq!(stopper.counter(), 1);
        assert!(stopper.update(0.91));
        assert_eq!(stopper.best_loss(), 1.0);
    }

    #[test]
    fn test_improvement_resets_counter() {
        let mut stopper = EarlyStopping::new(2, 0.0);
        stopper.update(1.0);
        stopper.update(1.0);
        assert_eq!(stopper.counter(), 1);
        stopper.update(0.5);
        assert_eq!(stopper.counter(), 0);
        assert!(!stopper.should_stop());
    }

    #[test]
    fn test_terminal_once_triggered() {
        let mut stopper = EarlyStopping::new(1, 0.0);
        stopper.update(1.0);
        assert!(stopper.update(2.0));
        assert!(stopper.update(0.1));
        assert!(stopper.should_stop());
    }

    #[test]
    fn test_disabled_never_fires() {
        let mut stopper = EarlyStopping::from_config(&EarlyStoppingConfig {
            enabled: false,
            patience: 1,
            min_delta: 0.0,
        });
        for _ in 0..10 {
            assert!(!stopper.update(1.0));
        }
    }

    #[test]
    fn test_best_checkpoint_epochs() {
        let mut policy = CheckpointPolicy::new();
        let saved: Vec<usize> = [5.0, 3.0, 4.0, 2.0]
            .iter()
            .enumerate()
            .filter_map(|(i, &loss)| policy.update(i + 1, loss).then_some(i + 1))
            .collect();
        assert_eq!(saved, vec![1, 2, 4]);
        assert_eq!(policy.best_epoch(), Some(4));
        assert_eq!(policy.best_loss(), 2.0);
    }

    #[test]
    fn test_nan_is_never_best() {
        let mut policy = CheckpointPolicy::new();
        assert!(!policy.update(1, f64::NAN));
        assert_eq!(policy.best_epoch(), None);
    }
}
