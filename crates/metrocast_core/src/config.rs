//! Typed run configuration.
//!
//! The configuration is a YAML document with the sections `location`,
//! `data`, `features`, `model`, `training`, and `wandb`. Every section and
//! field has a default, so a partial document is valid. [`Config::validate`]
//! runs once at load time and rejects inconsistent values before any data is
//! read or any model is built.
//!
//! ```yaml
//! features:
//!   inputs: [temperature_2m, relative_humidity_2m, weather_code]
//!   target: temperature_2m
//! training:
//!   seq_len: 24
//!   pred_len: 24
//!   scheduler:
//!     type: cosine
//!     min_lr: 1.0e-6
//! ```

use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};
use crate::NUM_TIME_FEATURES;

/// Complete run configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Site the series was recorded at.
    pub location: LocationConfig,
    /// Artifact locations.
    pub data: DataConfig,
    /// Column selection.
    pub features: FeaturesConfig,
    /// Model hyperparameters.
    pub model: ModelSection,
    /// Optimization and splitting.
    pub training: TrainingConfig,
    /// Experiment tracking toggles.
    pub wandb: TrackingConfig,
}

impl Config {
    /// Load and validate a configuration file.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NotFound`] when the file is missing, a YAML error
    /// when it does not parse, or a validation error.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(CoreError::NotFound(path.to_path_buf()));
        }
        let text = std::fs::read_to_string(path)?;
        let config = Self::from_yaml_str(&text)?;
        tracing::debug!(path = %path.display(), "loaded configuration");
        Ok(config)
    }

    /// Parse and validate a YAML document.
    pub fn from_yaml_str(text: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize to YAML.
    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Write the configuration as YAML.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        std::fs::write(path, self.to_yaml()?)?;
        Ok(())
    }

    /// Check cross-field consistency.
    ///
    /// # Errors
    ///
    /// Fails on the first inconsistent value: bad split ratios, zero lengths,
    /// a target that is not a continuous input, `d_model` not divisible by
    /// `n_heads`, or an unknown scheduler.
    pub fn validate(&self) -> Result<()> {
        self.training.split_ratio.validate()?;

        let t = &self.training;
        if t.seq_len == 0 || t.pred_len == 0 {
            return Err(CoreError::InvalidConfig(format!(
                "seq_len and pred_len must be >= 1 (got {} and {})",
                t.seq_len, t.pred_len
            )));
        }
        if t.batch_size == 0 {
            return Err(CoreError::InvalidConfig("batch_size must be >= 1".into()));
        }
        if t.epochs == 0 {
            return Err(CoreError::InvalidConfig("epochs must be >= 1".into()));
        }
        if t.learning_rate.is_nan() || t.learning_rate <= 0.0 {
            return Err(CoreError::InvalidConfig(format!(
                "learning_rate must be positive (got {})",
                t.learning_rate
            )));
        }
        if t.weight_decay < 0.0 {
            return Err(CoreError::InvalidConfig(format!(
                "weight_decay must be non-negative (got {})",
                t.weight_decay
            )));
        }
        t.scheduler.kind()?;

        let f = &self.features;
        if !f.inputs.iter().any(|c| c == &f.categorical) {
            return Err(CoreError::InvalidConfig(format!(
                "categorical column '{}' must be listed in features.inputs",
                f.categorical
            )));
        }
        let continuous = self.continuous_columns();
        if !continuous.iter().any(|c| c == &f.target) {
            return Err(CoreError::TargetNotFound {
                target: f.target.clone(),
                available: continuous,
            });
        }
        if f.num_time_features != NUM_TIME_FEATURES {
            return Err(CoreError::InvalidConfig(format!(
                "num_time_features must be {NUM_TIME_FEATURES} (got {})",
                f.num_time_features
            )));
        }

        let m = &self.model;
        if m.n_heads == 0 || m.d_model % m.n_heads != 0 {
            return Err(CoreError::InvalidConfig(format!(
                "d_model ({}) must be divisible by n_heads ({})",
                m.d_model, m.n_heads
            )));
        }
        if m.num_weather_codes == 0 || m.weather_code_embed_dim == 0 {
            return Err(CoreError::InvalidConfig(
                "num_weather_codes and weather_code_embed_dim must be >= 1".into(),
            ));
        }
        if !(0.0..1.0).contains(&m.dropout) {
            return Err(CoreError::InvalidConfig(format!(
                "dropout must be in [0, 1) (got {})",
                m.dropout
            )));
        }

        if self.wandb.enabled && self.wandb.log_freq == 0 {
            return Err(CoreError::InvalidConfig("wandb.log_freq must be >= 1".into()));
        }
        Ok(())
    }

    /// Input columns that are normalized, in configured order.
    #[must_use]
    pub fn continuous_columns(&self) -> Vec<String> {
        self.features
            .inputs
            .iter()
            .filter(|c| *c != &self.features.categorical)
            .cloned()
            .collect()
    }

    /// Continuous model inputs: normalized weather columns plus time features.
    #[must_use]
    pub fn num_continuous_features(&self) -> usize {
        self.continuous_columns().len() + self.features.num_time_features
    }

    /// Feature width of a history window, including the categorical column.
    #[must_use]
    pub fn num_input_features(&self) -> usize {
        self.num_continuous_features() + 1
    }
}

/// Site coordinates. Only used for bookkeeping in artifacts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocationConfig {
    /// Latitude in degrees.
    pub latitude: f64,
    /// Longitude in degrees.
    pub longitude: f64,
    /// IANA timezone name or `auto`.
    pub timezone: String,
}

impl Default for LocationConfig {
    fn default() -> Self {
        Self {
            latitude: 41.0082,
            longitude: 28.9784,
            timezone: "auto".to_string(),
        }
    }
}

/// Artifact locations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    /// Raw hourly CSV table.
    pub raw_file_path: PathBuf,
    /// Remote bucket the table is synchronized with (unused by the core).
    pub bucket_name: Option<String>,
    /// Persisted normalization statistics.
    pub stats_path: PathBuf,
    /// Directory receiving checkpoints and training history.
    pub models_dir: PathBuf,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            raw_file_path: PathBuf::from("data/raw/istanbul_weather.csv"),
            bucket_name: None,
            stats_path: PathBuf::from("data/processed/statistics.json"),
            models_dir: PathBuf::from("models"),
        }
    }
}

/// Column selection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeaturesConfig {
    /// Ordered input columns, including the categorical code.
    pub inputs: Vec<String>,
    /// Forecast target; must be a continuous input.
    pub target: String,
    /// Categorical weather-condition column.
    pub categorical: String,
    /// Count of derived calendar features.
    pub num_time_features: usize,
}

impl Default for FeaturesConfig {
    fn default() -> Self {
        let inputs = [
            "temperature_2m",
            "relative_humidity_2m",
            "dew_point_2m",
            "apparent_temperature",
            "pressure_msl",
            "surface_pressure",
            "precipitation",
            "cloud_cover",
            "wind_speed_10m",
            "wind_direction_10m",
            "weather_code",
        ];
        Self {
            inputs: inputs.iter().map(|s| (*s).to_string()).collect(),
            target: "temperature_2m".to_string(),
            categorical: "weather_code".to_string(),
            num_time_features: NUM_TIME_FEATURES,
        }
    }
}

/// Model hyperparameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelSection {
    /// Width of the weather-code embedding.
    pub weather_code_embed_dim: usize,
    /// Number of known weather-condition codes.
    pub num_weather_codes: usize,
    /// Model width.
    pub d_model: usize,
    /// Attention heads.
    pub n_heads: usize,
    /// Encoder blocks.
    pub n_layers: usize,
    /// Feed-forward width.
    pub d_ff: usize,
    /// Dropout probability.
    pub dropout: f64,
}

impl Default for ModelSection {
    fn default() -> Self {
        Self {
            weather_code_embed_dim: 8,
            num_weather_codes: 100,
            d_model: 128,
            n_heads: 8,
            n_layers: 4,
            d_ff: 512,
            dropout: 0.1,
        }
    }
}

/// Optimization and data-splitting settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    /// History window length.
    pub seq_len: usize,
    /// Forecast window length.
    pub pred_len: usize,
    /// Windows per batch.
    pub batch_size: usize,
    /// Maximum number of epochs.
    pub epochs: usize,
    /// Initial learning rate.
    pub learning_rate: f64,
    /// AdamW weight decay.
    pub weight_decay: f64,
    /// Gradient-norm ceiling; values <= 0 disable clipping.
    pub gradient_clip: f64,
    /// Chronological split fractions.
    pub split_ratio: SplitRatio,
    /// Master seed.
    pub seed: u64,
    /// Learning-rate schedule.
    pub scheduler: SchedulerConfig,
    /// Early stopping.
    pub early_stopping: EarlyStoppingConfig,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            seq_len: 24,
            pred_len: 24,
            batch_size: 32,
            epochs: 100,
            learning_rate: 1e-4,
            weight_decay: 1e-4,
            gradient_clip: 1.0,
            split_ratio: SplitRatio::default(),
            seed: 42,
            scheduler: SchedulerConfig::default(),
            early_stopping: EarlyStoppingConfig::default(),
        }
    }
}

/// Fractions of the table assigned to each chronological split.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SplitRatio {
    /// Training fraction.
    pub train: f64,
    /// Validation fraction.
    pub val: f64,
    /// Test fraction; the test split takes every row after validation.
    pub test: f64,
}

impl SplitRatio {
    /// Create split ratios.
    #[must_use]
    pub const fn new(train: f64, val: f64, test: f64) -> Self {
        Self { train, val, test }
    }

    /// Each ratio must lie in [0, 1] and their sum must not exceed 1.
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [("train", self.train), ("val", self.val), ("test", self.test)] {
            if !(0.0..=1.0).contains(&value) {
                return Err(CoreError::InvalidConfig(format!(
                    "split_ratio.{name} must be in [0, 1] (got {value})"
                )));
            }
        }
        let sum = self.train + self.val + self.test;
        if sum > 1.0 + 1e-9 {
            return Err(CoreError::InvalidConfig(format!(
                "split ratios must sum to <= 1.0 (got {sum})"
            )));
        }
        Ok(())
    }
}

impl Default for SplitRatio {
    fn default() -> Self {
        Self::new(0.8, 0.1, 0.1)
    }
}

/// Supported learning-rate schedules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SchedulerKind {
    /// Cosine annealing from the initial rate to `min_lr` over all epochs.
    Cosine,
    /// Multiply the rate by 0.1 every 30 epochs.
    Step,
    /// Halve the rate after 5 epochs without validation improvement.
    Plateau,
}

impl SchedulerKind {
    /// Name used in configuration files.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            SchedulerKind::Cosine => "cosine",
            SchedulerKind::Step => "step",
            SchedulerKind::Plateau => "plateau",
        }
    }
}

impl FromStr for SchedulerKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "cosine" => Ok(SchedulerKind::Cosine),
            "step" => Ok(SchedulerKind::Step),
            "plateau" => Ok(SchedulerKind::Plateau),
            other => Err(CoreError::UnknownScheduler(other.to_string())),
        }
    }
}

impl std::fmt::Display for SchedulerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Learning-rate schedule selection.
///
/// The type is kept as the raw string from the document so that an unknown
/// name is reported as a configuration error rather than a parse error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Schedule name: `cosine`, `step`, or `plateau`.
    #[serde(rename = "type")]
    pub kind: String,
    /// Floor for cosine and plateau schedules.
    pub min_lr: f64,
}

impl SchedulerConfig {
    /// Resolve the schedule name.
    pub fn kind(&self) -> Result<SchedulerKind> {
        self.kind.parse()
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            kind: "cosine".to_string(),
            min_lr: 1e-6,
        }
    }
}

/// Early-stopping settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EarlyStoppingConfig {
    /// Whether early stopping is active.
    pub enabled: bool,
    /// Epochs without improvement before stopping.
    pub patience: usize,
    /// Minimum decrease that counts as an improvement.
    pub min_delta: f64,
}

impl Default for EarlyStoppingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            patience: 10,
            min_delta: 1e-4,
        }
    }
}

/// Experiment-tracking toggles.
///
/// When enabled, batch losses are emitted as structured log events every
/// `log_freq` batches. The remaining fields are carried for external tooling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackingConfig {
    /// Emit batch-level tracking events.
    pub enabled: bool,
    /// Batches between tracking events.
    pub log_freq: usize,
    /// Project name.
    pub project: Option<String>,
    /// Team or user.
    pub entity: Option<String>,
    /// Run name.
    pub run_name: Option<String>,
    /// Free-form tags.
    pub tags: Vec<String>,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            log_freq: 10,
            project: None,
            entity: None,
            run_name: None,
            tags: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        config.validate().unwrap();
        assert_eq!(config.continuous_columns().len(), 10);
        assert_eq!(config.num_continuous_features(), 16);
        assert_eq!(config.num_input_features(), 17);
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let yaml = r#"
training:
  epochs: 5
  scheduler:
    type: plateau
"#;
        let config = Config::from_yaml_str(yaml).unwrap();
        assert_eq!(config.training.epochs, 5);
        assert_eq!(config.training.seq_len, 24);
        assert_eq!(config.training.scheduler.kind().unwrap(), SchedulerKind::Plateau);
        assert_eq!(config.model.d_model, 128);
    }

    #[test]
    fn test_unknown_scheduler_rejected() {
        let yaml = "training:\n  scheduler:\n    type: exponential\n";
        let err = Config::from_yaml_str(yaml).unwrap_err();
        assert!(matches!(err, CoreError::UnknownScheduler(ref s) if s == "exponential"));
    }

    #[test]
    fn test_heads_must_divide_width() {
        let mut config = Config::default();
        config.model.d_model = 100;
        config.model.n_heads = 8;
        assert!(matches!(config.validate(), Err(CoreError::InvalidConfig(_))));
    }

    #[test]
    fn test_target_must_be_continuous_input() {
        let mut config = Config::default();
        config.features.target = "weather_code".to_string();
        assert!(matches!(
            config.validate(),
            Err(CoreError::TargetNotFound { .. })
        ));

        config.features.target = "snowfall".to_string();
        assert!(matches!(
            config.validate(),
            Err(CoreError::TargetNotFound { .. })
        ));
    }

    #[test]
    fn test_split_ratio_bounds() {
        assert!(SplitRatio::new(0.8, 0.1, 0.1).validate().is_ok());
        assert!(SplitRatio::new(0.7, 0.1, 0.1).validate().is_ok());
        assert!(SplitRatio::new(0.8, 0.2, 0.1).validate().is_err());
        assert!(SplitRatio::new(-0.1, 0.5, 0.1).validate().is_err());
    }

    #[test]
    fn test_yaml_roundtrip_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");

        let mut config = Config::default();
        config.training.batch_size = 16;
        config.save(&path).unwrap();

        let loaded = Config::from_file(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_missing_file_is_not_found() {
        let err = Config::from_file("/definitely/not/here.yaml").unwrap_err();
        assert!(matches!(err, CoreError::NotFound(_)));
    }
}
