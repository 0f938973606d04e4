//! Per-epoch learning rate schedulers.
//!
//! Every scheduler is queried once per epoch with the 0-based epoch index.
//! [`ReduceLROnPlateau`] additionally observes the validation loss at the end
//! of each epoch.

use metrocast_core::SchedulerKind;

/// Trait for learning rate schedulers.
pub trait Scheduler: Send + Sync {
    /// Learning rate for the given 0-based epoch.
    fn get_lr(&self, epoch: usize) -> f64;

    /// Feed the validation loss observed at the end of an epoch.
    ///
    /// Returns true if the learning rate changed.
    fn observe(&mut self, _val_loss: f64) -> bool {
        false
    }

    /// Get the scheduler name.
    fn name(&self) -> &str;
}

/// Cosine annealing from the initial rate to `min_lr` over `total_epochs`.
#[derive(Debug, Clone)]
pub struct CosineAnnealingLR {
    initial_lr: f64,
    min_lr: f64,
    total_epochs: usize,
}

impl CosineAnnealingLR {
    /// Create a new cosine annealing scheduler.
    pub fn new(initial_lr: f64, min_lr: f64, total_epochs: usize) -> Self {
        Self {
            initial_lr,
            min_lr,
            total_epochs: total_epochs.max(1),
        }
    }
}

impl Scheduler for CosineAnnealingLR {
    fn get_lr(&self, epoch: usize) -> f64 {
        let epoch = epoch.min(self.total_epochs);
        let progress = epoch as f64 / self.total_epochs as f64;
        let cosine = (1.0 + (std::f64::consts::PI * progress).cos()) / 2.0;
        self.min_lr + (self.initial_lr - self.min_lr) * cosine
    }

    fn name(&self) -> &str {
        "CosineAnnealingLR"
    }
}

/// Multiply the rate by `gamma` every `step_size` epochs.
#[derive(Debug, Clone)]
pub struct StepLR {
    initial_lr: f64,
    step_size: usize,
    gamma: f64,
}

impl StepLR {
    /// Epochs between decays.
    pub const DEFAULT_STEP_SIZE: usize = 30;
    /// Decay factor.
    pub const DEFAULT_GAMMA: f64 = 0.1;

    /// Create a new step decay scheduler.
    pub fn new(initial_lr: f64, step_size: usize, gamma: f64) -> Self {
        Self {
            initial_lr,
            step_size: step_size.max(1),
            gamma,
        }
    }
}

impl Scheduler for StepLR {
    fn get_lr(&self, epoch: usize) -> f64 {
        let n_decays = epoch / self.step_size;
        self.initial_lr * self.gamma.powi(n_decays as i32)
    }

    fn name(&self) -> &str {
        "StepLR"
    }
}

/// Reduces the rate when the validation loss stops improving.
///
/// This is stateful and must be updated with metric values.
#[derive(Debug, Clone)]
pub struct ReduceLROnPlateau {
    current_lr: f64,
    factor: f64,
    patience: usize,
    min_lr: f64,
    best_value: f64,
    num_bad_epochs: usize,
}

impl ReduceLROnPlateau {
    /// Reduction factor.
    pub const DEFAULT_FACTOR: f64 = 0.5;
    /// Epochs without improvement tolerated before reducing.
    pub const DEFAULT_PATIENCE: usize = 5;

    /// Create a new ReduceLROnPlateau scheduler.
    ///
    /// # Arguments
    /// * `initial_lr` - Starting learning rate
    /// * `factor` - Factor to reduce LR by (new_lr = old_lr * factor)
    /// * `patience` - Number of epochs with no improvement before reducing
    /// * `min_lr` - Minimum learning rate
    pub fn new(initial_lr: f64, factor: f64, patience: usize, min_lr: f64) -> Self {
        Self {
            current_lr: initial_lr,
            factor,
            patience,
            min_lr,
            best_value: f64::INFINITY,
            num_bad_epochs: 0,
        }
    }

    /// Get the current learning rate.
    pub fn current_lr(&self) -> f64 {
        self.current_lr
    }
}

impl Scheduler for ReduceLROnPlateau {
    fn get_lr(&self, _epoch: usize) -> f64 {
        self.current_lr
    }

    fn observe(&mut self, val_loss: f64) -> bool {
        if val_loss < self.best_value {
            self.best_value = val_loss;
            self.num_bad_epochs = 0;
            return false;
        }

        self.num_bad_epochs += 1;
        if self.num_bad_epochs > self.patience {
            let new_lr = (self.current_lr * self.factor).max(self.min_lr);
            if new_lr < self.current_lr {
                tracing::info!(
                    from = self.current_lr,
                    to = new_lr,
                    "Validation loss plateaued, reducing learning rate"
                );
                self.current_lr = new_lr;
                self.num_bad_epochs = 0;
                return true;
            }
        }
        false
    }

    fn name(&self) -> &str {
        "ReduceLROnPlateau"
    }
}

/// Build the scheduler named by `kind`.
///
/// Cosine anneals over `epochs` down to `min_lr`, step decays by 0.1 every
/// 30 epochs, and plateau halves the rate after 5 epochs without
/// validation improvement, never going below `min_lr`.
pub fn build_scheduler(
    kind: SchedulerKind,
    initial_lr: f64,
    epochs: usize,
    min_lr: f64,
) -> Box<dyn Scheduler> {
    match kind {
        SchedulerKind::Cosine => Box::new(CosineAnnealingLR::new(initial_lr, min_lr, epochs)),
        SchedulerKind::Step => Box::new(StepLR::new(
            initial_lr,
            StepLR::DEFAULT_STEP_SIZE,
            StepLR::DEFAULT_GAMMA,
        )),
        SchedulerKind::Plateau => Box::new(ReduceLROnPlateau::new(
            initial_lr,
            ReduceLROnPlateau::DEFAULT_FACTOR,
            ReduceLROnPlateau::DEFAULT_PATIENCE,
            min_lr,
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_cosine_annealing() {
        let scheduler = CosineAnnealingLR::new(1e-3, 1e-5, 100);

        assert_relative_eq!(scheduler.get_lr(0), 1e-3, max_relative = 1e-12);
        assert_relative_eq!(scheduler.get_lr(50), (1e-3 + 1e-5) / 2.0, max_relative = 1e-12);
        assert_relative_eq!(scheduler.get_lr(100), 1e-5);
        // held at the floor past the horizon
        assert_relative_eq!(scheduler.get_lr(150), 1e-5);
    }

    #[test]
    fn test_cosine_is_monotone() {
        let scheduler = CosineAnnealingLR::new(1e-4, 1e-6, 10);
        let lrs: Vec<f64> = (0..=10).map(|e| scheduler.get_lr(e)).collect();
        assert!(lrs.windows(2).all(|w| w[1] <= w[0]));
    }

    #[test]
    fn test_step_lr() {
        let scheduler = StepLR::new(1.0, 30, 0.1);
        assert_relative_eq!(scheduler.get_lr(0), 1.0);
        assert_relative_eq!(scheduler.get_lr(29), 1.0);
        assert_relative_eq!(scheduler.get_lr(30), 0.1);
        assert_relative_eq!(scheduler.get_lr(65), 0.01, max_relative = 1e-12);
    }

    #[test]
    fn test_plateau_reduces_after_patience() {
        let mut scheduler = ReduceLROnPlateau::new(1e-3, 0.5, 2, 1e-6);

        assert!(!scheduler.observe(1.0));
        assert!(!scheduler.observe(1.0));
        assert!(!scheduler.observe(1.0));
        // third bad epoch exceeds patience
        assert!(scheduler.observe(1.0));
        assert_relative_eq!(scheduler.get_lr(4), 5e-4);

        assert!(!scheduler.observe(0.5));
        assert_relative_eq!(scheduler.current_lr(), 5e-4);
    }

    #[test]
    fn test_plateau_respects_floor() {
        let mut scheduler = ReduceLROnPlateau::new(1e-3, 0.5, 0, 8e-4);
        scheduler.observe(1.0);
        assert!(scheduler.observe(2.0));
        assert_relative_eq!(scheduler.current_lr(), 8e-4);
        assert!(!scheduler.observe(2.0));
        assert_relative_eq!(scheduler.current_lr(), 8e-4);
    }

    #[test]
    fn test_build_scheduler() {
        let cosine = build_scheduler(SchedulerKind::Cosine, 1e-4, 100, 1e-6);
        assert_eq!(cosine.name(), "CosineAnnealingLR");
        assert_relative_eq!(cosine.get_lr(100), 1e-6);

        let step = build_scheduler(SchedulerKind::Step, 1e-4, 100, 1e-6);
        assert_eq!(step.name(), "StepLR");
        assert_relative_eq!(step.get_lr(30), 1e-5, max_relative = 1e-12);

        let plateau = build_scheduler(SchedulerKind::Plateau, 1e-4, 100, 1e-6);
        assert_eq!(plateau.name(), "ReduceLROnPlateau");
        assert_relative_eq!(plateau.get_lr(99), 1e-4);
    }
}
