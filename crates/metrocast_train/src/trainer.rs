//! Training loop for the ExcelFormer forecaster.
//!
//! One call to [`Trainer::fit`] runs the whole procedure: shuffled training
//! epochs with AdamW and gradient-norm clipping, a validation pass per epoch,
//! per-epoch learning rate scheduling, best/final checkpoints, early
//! stopping, and a final test pass on the last model.

use std::path::{Path, PathBuf};
use std::time::Instant;

use burn::module::AutodiffModule;
use burn::optim::{AdamWConfig, GradientsParams, Optimizer};
use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;
use metrocast_core::{Config, EarlyStoppingConfig, SchedulerKind, Seed, Split};
use metrocast_data::{DatasetOptions, SplitDatasets, Statistics, WindowLoader};
use metrocast_models::{
    save_excelformer, save_record, CheckpointMetadata, CheckpointTag, ExcelFormer,
    ExcelFormerConfig,
};
use serde::{Deserialize, Serialize};

use crate::callback::{CheckpointPolicy, EarlyStopping};
use crate::clip::clip_grad_norm;
use crate::device::ExecutionContext;
use crate::error::{Result, TrainError};
use crate::evaluation::{evaluate, mse_loss, Evaluation};
use crate::metrics::{MetricAccumulator, RegressionMetrics};
use crate::scheduler::{build_scheduler, Scheduler};

/// File the per-epoch history is written to inside the models directory.
pub const HISTORY_FILE: &str = "history.json";

/// Configuration for [`Trainer`].
#[derive(Debug, Clone)]
pub struct TrainerConfig {
    /// Number of epochs.
    pub epochs: usize,
    /// Batch size for every split.
    pub batch_size: usize,
    /// Initial learning rate.
    pub learning_rate: f64,
    /// AdamW weight decay.
    pub weight_decay: f64,
    /// Gradient-norm ceiling (<= 0 disables clipping).
    pub gradient_clip: f64,
    /// Learning rate schedule.
    pub scheduler: SchedulerKind,
    /// Learning rate floor for cosine and plateau schedules.
    pub min_lr: f64,
    /// Early stopping settings.
    pub early_stopping: EarlyStoppingConfig,
    /// Master seed; training batches are shuffled with `seed.for_epoch(epoch)`.
    pub seed: Seed,
    /// Directory receiving checkpoints and the history file.
    pub models_dir: PathBuf,
    /// Emit batch-level loss events.
    pub track_batches: bool,
    /// Batches between tracking events.
    pub log_freq: usize,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            epochs: 100,
            batch_size: 32,
            learning_rate: 1e-4,
            weight_decay: 1e-4,
            gradient_clip: 1.0,
            scheduler: SchedulerKind::Cosine,
            min_lr: 1e-6,
            early_stopping: EarlyStoppingConfig::default(),
            seed: Seed::default(),
            models_dir: PathBuf::from("models"),
            track_batches: false,
            log_freq: 10,
        }
    }
}

impl TrainerConfig {
    /// Derive trainer settings from a run configuration.
    ///
    /// # Errors
    ///
    /// Fails on an unknown scheduler name or invalid values.
    pub fn from_config(config: &Config) -> Result<Self> {
        let training = &config.training;
        let trainer = Self {
            epochs: training.epochs,
            batch_size: training.batch_size,
            learning_rate: training.learning_rate,
            weight_decay: training.weight_decay,
            gradient_clip: training.gradient_clip,
            scheduler: training.scheduler.kind()?,
            min_lr: training.scheduler.min_lr,
            early_stopping: training.early_stopping.clone(),
            seed: Seed::new(training.seed),
            models_dir: config.data.models_dir.clone(),
            track_batches: config.wandb.enabled,
            log_freq: config.wandb.log_freq,
        };
        trainer.validate()?;
        Ok(trainer)
    }

    /// Set number of epochs.
    #[must_use]
    pub fn with_epochs(mut self, epochs: usize) -> Self {
        self.epochs = epochs;
        self
    }

    /// Set batch size.
    #[must_use]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Set initial learning rate.
    #[must_use]
    pub fn with_learning_rate(mut self, learning_rate: f64) -> Self {
        self.learning_rate = learning_rate;
        self
    }

    /// Set the learning rate schedule.
    #[must_use]
    pub fn with_scheduler(mut self, scheduler: SchedulerKind) -> Self {
        self.scheduler = scheduler;
        self
    }

    /// Set the global gradient-norm ceiling (<= 0 disables clipping).
    #[must_use]
    pub fn with_gradient_clip(mut self, gradient_clip: f64) -> Self {
        self.gradient_clip = gradient_clip;
        self
    }

    /// Set the learning rate floor.
    #[must_use]
    pub fn with_min_lr(mut self, min_lr: f64) -> Self {
        self.min_lr = min_lr;
        self
    }

    /// Set the early stopping settings.
    #[must_use]
    pub fn with_early_stopping(mut self, early_stopping: EarlyStoppingConfig) -> Self {
        self.early_stopping = early_stopping;
        self
    }

    /// Set the output directory.
    #[must_use]
    pub fn with_models_dir(mut self, models_dir: impl Into<PathBuf>) -> Self {
        self.models_dir = models_dir.into();
        self
    }

    /// Set the master seed.
    #[must_use]
    pub fn with_seed(mut self, seed: Seed) -> Self {
        self.seed = seed;
        self
    }

    /// Check values for consistency.
    pub fn validate(&self) -> Result<()> {
        if self.epochs == 0 {
            return Err(TrainError::InvalidConfig("epochs must be positive".into()));
        }
        if self.batch_size == 0 {
            return Err(TrainError::InvalidConfig("batch_size must be positive".into()));
        }
        if self.learning_rate.is_nan() || self.learning_rate <= 0.0 {
            return Err(TrainError::InvalidConfig(format!(
                "learning_rate must be positive, got {}",
                self.learning_rate
            )));
        }
        if self.weight_decay < 0.0 {
            return Err(TrainError::InvalidConfig(format!(
                "weight_decay must be non-negative, got {}",
                self.weight_decay
            )));
        }
        if self.track_batches && self.log_freq == 0 {
            return Err(TrainError::InvalidConfig("log_freq must be positive".into()));
        }
        Ok(())
    }
}

/// Summary of one finished epoch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpochRecord {
    /// 1-based epoch.
    pub epoch: usize,
    /// Learning rate used during the epoch.
    pub learning_rate: f64,
    /// Mean training batch loss.
    pub train_loss: f64,
    /// Training metrics.
    pub train: RegressionMetrics,
    /// Mean validation batch loss.
    pub val_loss: f64,
    /// Validation metrics.
    pub val: RegressionMetrics,
    /// Training batches skipped for a non-finite loss.
    pub skipped_batches: usize,
    /// Whether this epoch produced a new best checkpoint.
    pub improved: bool,
}

/// Outcome of a training run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingReport {
    /// Per-epoch records, in order.
    pub history: Vec<EpochRecord>,
    /// 1-based epoch of the best checkpoint.
    pub best_epoch: Option<usize>,
    /// Validation loss of the best checkpoint.
    pub best_val_loss: Option<f64>,
    /// Whether early stopping ended the run.
    pub stopped_early: bool,
    /// Test metrics of the final model.
    pub test: RegressionMetrics,
    /// Wall-clock duration in seconds.
    pub training_time_secs: f64,
}

impl TrainingReport {
    /// Number of epochs run.
    pub fn epochs_run(&self) -> usize {
        self.history.len()
    }

    /// Write the report as pretty JSON.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}

/// Trained model plus its report.
#[derive(Debug)]
pub struct TrainingOutput<B: AutodiffBackend> {
    /// Model after the last epoch.
    pub model: ExcelFormer<B>,
    /// Run summary.
    pub report: TrainingReport,
}

struct EpochTrain {
    loss: f64,
    metrics: RegressionMetrics,
    skipped: usize,
}

/// Trainer for the ExcelFormer forecaster.
///
/// # Example
///
/// ```rust,ignore
/// use metrocast_train::{ExecutionContext, Trainer, TrainerConfig};
///
/// let ctx = ExecutionContext::<Autodiff<NdArray>>::detect();
/// let trainer = Trainer::new(TrainerConfig::from_config(&config)?, ctx);
/// let output = trainer.fit(model, &model_config, datasets)?;
/// println!("test MAE {:.2} °C", output.report.test.mae_celsius);
/// ```
pub struct Trainer<B: AutodiffBackend> {
    config: TrainerConfig,
    context: ExecutionContext<B>,
    run_config: Option<Config>,
}

impl<B: AutodiffBackend> Trainer<B> {
    /// Create a new trainer.
    pub fn new(config: TrainerConfig, context: ExecutionContext<B>) -> Self {
        Self {
            config,
            context,
            run_config: None,
        }
    }

    /// Attach the run configuration stored in checkpoint metadata.
    #[must_use]
    pub fn with_run_config(mut self, config: Config) -> Self {
        self.run_config = Some(config);
        self
    }

    /// Trainer settings.
    pub fn config(&self) -> &TrainerConfig {
        &self.config
    }

    /// Train `model` on the splits and evaluate the final model on test.
    ///
    /// # Errors
    ///
    /// Fails before the first epoch if a split is too short, if the data
    /// width does not match the model, or if a weather code exceeds the
    /// embedding. During training, I/O errors while checkpointing and
    /// epochs where every batch diverged abort the run.
    pub fn fit(
        &self,
        model: ExcelFormer<B>,
        model_config: &ExcelFormerConfig,
        datasets: SplitDatasets,
    ) -> Result<TrainingOutput<B>> {
        self.config.validate()?;
        check_datasets(&datasets, model_config)?;
        let start_time = Instant::now();

        let SplitDatasets { train, val, test } = datasets;
        let train_loader = WindowLoader::builder(train)
            .batch_size(self.config.batch_size)
            .shuffle(true)
            .seed(self.config.seed)
            .build()?;
        let val_loader = eval_loader(val, self.config.batch_size)?;
        let test_loader = eval_loader(test, self.config.batch_size)?;
        let target = train_loader.dataset().scaler();

        tracing::info!(
            train_batches = train_loader.n_batches(),
            val_batches = val_loader.n_batches(),
            test_batches = test_loader.n_batches(),
            "Loaded data"
        );
        tracing::info!(
            mean = target.mean(),
            std = target.std(),
            "Target statistics"
        );
        tracing::info!(
            params = model.num_params(),
            trainable = model.num_trainable_params(),
            "Created model"
        );

        let mut optim = AdamWConfig::new()
            .with_weight_decay(self.config.weight_decay as f32)
            .with_epsilon(1e-8)
            .init::<B, ExcelFormer<B>>();
        B::seed(self.config.seed.derive("dropout").value());

        let mut scheduler = build_scheduler(
            self.config.scheduler,
            self.config.learning_rate,
            self.config.epochs,
            self.config.min_lr,
        );
        let mut stopper = EarlyStopping::from_config(&self.config.early_stopping);
        let mut policy = CheckpointPolicy::new();
        let mut history = Vec::with_capacity(self.config.epochs);
        let mut stopped_early = false;

        let mut model = model;
        let inner_device: <B::InnerBackend as Backend>::Device = self.context.device().clone().into();

        tracing::info!(
            epochs = self.config.epochs,
            scheduler = scheduler.name(),
            "Starting training"
        );

        for epoch in 1..=self.config.epochs {
            let lr = scheduler.get_lr(epoch - 1);
            let train_epoch =
                self.train_epoch(&mut model, &mut optim, &train_loader, epoch, lr)?;

            let val = evaluate(&model.clone().valid(), &val_loader, &inner_device)?;
            scheduler.observe(val.loss);

            let improved = policy.update(epoch, val.loss);
            if improved {
                self.save_checkpoint(CheckpointTag::Best, &model, &optim, epoch, val.loss, model_config)?;
            }

            tracing::info!(
                "Epoch {}/{} | Train Loss: {:.4} | Val Loss: {:.4} | Val MAE: {:.2}°C | LR: {:.6}{}",
                epoch,
                self.config.epochs,
                train_epoch.loss,
                val.loss,
                val.metrics.mae_celsius,
                lr,
                if improved { " *" } else { "" }
            );

            history.push(EpochRecord {
                epoch,
                learning_rate: lr,
                train_loss: train_epoch.loss,
                train: train_epoch.metrics,
                val_loss: val.loss,
                val: val.metrics,
                skipped_batches: train_epoch.skipped,
                improved,
            });

            self.context.release_scratch(epoch);

            if stopper.update(val.loss) {
                stopped_early = true;
                tracing::info!(epoch, "Early stopping");
                break;
            }
        }

        if let Some(last) = history.last() {
            self.save_checkpoint(
                CheckpointTag::Final,
                &model,
                &optim,
                last.epoch,
                last.val_loss,
                model_config,
            )?;
        }

        tracing::info!("Evaluating on test set");
        let test = evaluate(&model.clone().valid(), &test_loader, &inner_device)?;
        tracing::info!(
            mae = test.metrics.mae_celsius,
            rmse = test.metrics.rmse_celsius,
            "Test MAE: {:.2}°C | Test RMSE: {:.2}°C",
            test.metrics.mae_celsius,
            test.metrics.rmse_celsius
        );

        let best_val_loss = policy.best_epoch().map(|_| policy.best_loss());
        let report = TrainingReport {
            history,
            best_epoch: policy.best_epoch(),
            best_val_loss,
            stopped_early,
            test: test.metrics,
            training_time_secs: start_time.elapsed().as_secs_f64(),
        };
        report.save(self.config.models_dir.join(HISTORY_FILE))?;

        tracing::info!(
            best_epoch = ?report.best_epoch,
            best_val_loss = ?report.best_val_loss,
            secs = report.training_time_secs,
            "Training complete"
        );

        Ok(TrainingOutput { model, report })
    }

    fn train_epoch<O>(
        &self,
        model: &mut ExcelFormer<B>,
        optim: &mut O,
        loader: &WindowLoader,
        epoch: usize,
        lr: f64,
    ) -> Result<EpochTrain>
    where
        O: Optimizer<ExcelFormer<B>, B>,
    {
        let mut total_loss = 0.0f64;
        let mut stepped = 0usize;
        let mut skipped = 0usize;
        let mut clipped_batches = 0usize;
        let mut acc = MetricAccumulator::new();

        for (batch_idx, batch) in loader.iter::<B>(epoch, self.context.device()).enumerate() {
            let batch = batch?;

            let forecast = model.forward(batch.x);
            let loss = mse_loss(forecast.clone(), batch.y.clone());
            let loss_value = f64::from(loss.clone().into_scalar().elem::<f32>());

            if !loss_value.is_finite() {
                skipped += 1;
                tracing::warn!(epoch, batch = batch_idx, "Non-finite loss, skipping batch");
                continue;
            }

            let grads = loss.backward();
            let mut grads = GradientsParams::from_grads(grads, &*model);
            if self.config.gradient_clip > 0.0 {
                let (clipped, norm) = clip_grad_norm::<B, _>(&*model, grads, self.config.gradient_clip);
                grads = clipped;
                if norm > self.config.gradient_clip {
                    clipped_batches += 1;
                }
            }
            *model = optim.step(lr, model.clone(), grads);

            total_loss += loss_value;
            stepped += 1;
            acc.push(forecast.detach(), batch.y);

            if self.config.track_batches && (batch_idx + 1) % self.config.log_freq == 0 {
                tracing::info!(
                    target: "metrocast::tracking",
                    epoch,
                    batch = batch_idx + 1,
                    batch_loss = loss_value,
                    learning_rate = lr,
                    "train/batch_loss"
                );
            }
        }

        if stepped == 0 {
            return Err(TrainError::NonFiniteLoss {
                epoch,
                batches: skipped,
            });
        }
        tracing::debug!(epoch, stepped, skipped, clipped_batches, "Training pass done");

        Ok(EpochTrain {
            loss: total_loss / stepped as f64,
            metrics: acc.compute(&loader.dataset().scaler()),
            skipped,
        })
    }

    fn save_checkpoint<O>(
        &self,
        tag: CheckpointTag,
        model: &ExcelFormer<B>,
        optim: &O,
        epoch: usize,
        val_loss: f64,
        model_config: &ExcelFormerConfig,
    ) -> Result<()>
    where
        O: Optimizer<ExcelFormer<B>, B>,
    {
        let mut metadata = CheckpointMetadata::new(tag, epoch, val_loss, model_config.clone());
        if let Some(run) = &self.run_config {
            metadata = metadata.with_run_config(run.clone());
        }
        let paths = save_excelformer(model, &metadata, &self.config.models_dir)?;
        save_record::<B, _>(optim.to_record(), paths.optimizer())?;
        if tag == CheckpointTag::Best {
            tracing::info!(epoch, val_loss, "New best model saved");
        }
        Ok(())
    }
}

fn eval_loader(dataset: metrocast_data::WindowedDataset, batch_size: usize) -> Result<WindowLoader> {
    Ok(WindowLoader::builder(dataset)
        .batch_size(batch_size)
        .shuffle(false)
        .build()?)
}

/// Reject data the model cannot consume before any compute is spent.
fn check_datasets(datasets: &SplitDatasets, model_config: &ExcelFormerConfig) -> Result<()> {
    for split in Split::ALL {
        let dataset = datasets.get(split);
        if dataset.n_features() != model_config.num_input_features() {
            return Err(TrainError::InvalidConfig(format!(
                "{split} data has {} feature columns but the model expects {}",
                dataset.n_features(),
                model_config.num_input_features()
            )));
        }
        if dataset.seq_len() != model_config.seq_len || dataset.pred_len() != model_config.pred_len {
            return Err(TrainError::InvalidConfig(format!(
                "{split} windows are {}→{} steps but the model maps {}→{}",
                dataset.seq_len(),
                dataset.pred_len(),
                model_config.seq_len,
                model_config.pred_len
            )));
        }
        if let Some(max_code) = dataset.max_category() {
            if max_code >= model_config.num_weather_codes {
                return Err(TrainError::CategoryOutOfRange {
                    split,
                    max_code,
                    num_codes: model_config.num_weather_codes,
                });
            }
        }
    }
    Ok(())
}

/// Load statistics and data named by `config`, build the model, and train it.
///
/// The statistics artifact must already exist; it is never refit here.
pub fn train_from_config<B: AutodiffBackend>(
    config: &Config,
    context: ExecutionContext<B>,
) -> Result<TrainingOutput<B>> {
    config.validate()?;
    let stats = Statistics::load(&config.data.stats_path)?;
    let options = DatasetOptions::from_config(config);
    let datasets = SplitDatasets::from_csv(&config.data.raw_file_path, &stats, &options)?;

    let seed = Seed::new(config.training.seed);
    B::seed(seed.derive("init").value());
    let model_config = ExcelFormerConfig::from_config(config);
    let model = model_config.init::<B>(context.device())?;

    let trainer = Trainer::new(TrainerConfig::from_config(config)?, context)
        .with_run_config(config.clone());
    trainer.fit(model, &model_config, datasets)
}

/// Evaluate a plain-backend model on one split of `datasets`.
pub fn evaluate_split<B: Backend>(
    model: &ExcelFormer<B>,
    datasets: &SplitDatasets,
    split: Split,
    batch_size: usize,
    device: &B::Device,
) -> Result<Evaluation> {
    let loader = eval_loader(datasets.get(split).clone(), batch_size)?;
    evaluate(model, &loader, device)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trainer_config_from_default_config() {
        let config = TrainerConfig::from_config(&Config::default()).unwrap();
        assert_eq!(config.epochs, 100);
        assert_eq!(config.batch_size, 32);
        assert_eq!(config.scheduler, SchedulerKind::Cosine);
        assert_eq!(config.models_dir, PathBuf::from("models"));
        assert!(!config.track_batches);
    }

    #[test]
    fn test_unknown_scheduler_fails_fast() {
        let mut config = Config::default();
        config.training.scheduler.kind = "linear".to_string();
        let err = TrainerConfig::from_config(&config).unwrap_err();
        assert!(matches!(err, TrainError::Core(_)));
    }

    #[test]
    fn test_invalid_trainer_config() {
        assert!(TrainerConfig::default().with_epochs(0).validate().is_err());
        assert!(TrainerConfig::default().with_batch_size(0).validate().is_err());
        assert!(TrainerConfig::default()
            .with_learning_rate(f64::NAN)
            .validate()
            .is_err());
    }
}
