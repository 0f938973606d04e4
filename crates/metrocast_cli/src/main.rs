//! MetroCast CLI - hourly temperature forecasting from the command line.
//!
//! Wraps the preprocessing, training and inference entry points of the
//! library crates behind one binary.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use burn::module::Module;
use clap::{Parser, Subcommand};
use metrocast_core::{Config, Split};
use metrocast_data::{
    window_count, DatasetOptions, SplitBoundaries, SplitDatasets, Statistics, WeatherTable,
};
use metrocast_models::{load_excelformer, CheckpointTag, ExcelFormerConfig};
use metrocast_train::{
    evaluate_split, predict_window, train_from_config, DefaultAutodiffBackend, DefaultBackend,
    ExecutionContext,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "metrocast")]
#[command(author, version)]
#[command(about = "Hourly temperature forecasting with an attention encoder")]
#[command(long_about = "MetroCast trains and serves an ExcelFormer model that forecasts \
the next hours of 2 m temperature from a window of past weather observations.

EXAMPLES:
    # Fit normalization statistics on the training prefix
    metrocast stats --config config/config.yaml

    # Train with the configured hyperparameters
    metrocast -v train --config config/config.yaml

    # Evaluate the best checkpoint on the test split
    metrocast evaluate --config config/config.yaml --checkpoint best --split test

    # Forecast one test window
    metrocast predict --config config/config.yaml --index 0")]
struct Cli {
    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fit normalization statistics on the training prefix of the raw table
    Stats {
        /// Configuration file
        #[arg(short, long, default_value = "config/config.yaml")]
        config: PathBuf,
    },

    /// Train a model and write checkpoints and history
    Train {
        /// Configuration file
        #[arg(short, long, default_value = "config/config.yaml")]
        config: PathBuf,

        /// Override the number of epochs
        #[arg(long)]
        epochs: Option<usize>,

        /// Override the checkpoint directory
        #[arg(long)]
        models_dir: Option<PathBuf>,
    },

    /// Evaluate a saved checkpoint on one split
    Evaluate {
        /// Configuration file
        #[arg(short, long, default_value = "config/config.yaml")]
        config: PathBuf,

        /// Checkpoint to load (best, final)
        #[arg(long, default_value = "best")]
        checkpoint: CheckpointTag,

        /// Split to evaluate (train, val, test)
        #[arg(long, default_value = "test")]
        split: Split,
    },

    /// Forecast a single window in °C
    Predict {
        /// Configuration file
        #[arg(short, long, default_value = "config/config.yaml")]
        config: PathBuf,

        /// Checkpoint to load (best, final)
        #[arg(long, default_value = "best")]
        checkpoint: CheckpointTag,

        /// Split the window is taken from
        #[arg(long, default_value = "test")]
        split: Split,

        /// Window index within the split
        #[arg(long, default_value = "0")]
        index: usize,
    },

    /// Show model size and window counts for a configuration
    Info {
        /// Configuration file
        #[arg(short, long, default_value = "config/config.yaml")]
        config: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => tracing::Level::WARN,
        1 => tracing::Level::INFO,
        2 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::filter::LevelFilter::from_level(log_level))
        .init();

    match cli.command {
        Commands::Stats { config } => handle_stats(&config),
        Commands::Train {
            config,
            epochs,
            models_dir,
        } => handle_train(&config, epochs, models_dir),
        Commands::Evaluate {
            config,
            checkpoint,
            split,
        } => handle_evaluate(&config, checkpoint, split),
        Commands::Predict {
            config,
            checkpoint,
            split,
            index,
        } => handle_predict(&config, checkpoint, split, index),
        Commands::Info { config } => handle_info(&config),
    }
}

fn load_config(path: &Path) -> Result<Config> {
    Config::from_file(path).context(format!("Failed to load config: {}", path.display()))
}

fn load_datasets(config: &Config) -> Result<SplitDatasets> {
    let stats = Statistics::load(&config.data.stats_path).context(format!(
        "Failed to load statistics: {} (run `metrocast stats` first)",
        config.data.stats_path.display()
    ))?;
    let options = DatasetOptions::from_config(config);
    SplitDatasets::from_csv(&config.data.raw_file_path, &stats, &options).context(format!(
        "Failed to build datasets from {}",
        config.data.raw_file_path.display()
    ))
}

fn handle_stats(config_path: &Path) -> Result<()> {
    let config = load_config(config_path)?;
    let options = DatasetOptions::from_config(&config);

    println!("Fitting normalization statistics");
    println!("  Table: {}", config.data.raw_file_path.display());

    let table = WeatherTable::from_csv(&config.data.raw_file_path, &options.table_columns())
        .context(format!(
            "Failed to read table: {}",
            config.data.raw_file_path.display()
        ))?;
    let stats = Statistics::fit(
        &table,
        &options.continuous,
        &options.categorical,
        &options.split_ratio,
        &options.target_col,
    )?;
    stats.save(&config.data.stats_path).context(format!(
        "Failed to write statistics: {}",
        config.data.stats_path.display()
    ))?;

    println!("\nStatistics (training prefix only)");
    println!("─────────────────────────────────");
    for column in &options.continuous {
        let index = stats.column_index(column)?;
        println!(
            "  {:<24} mean {:>10.4}  std {:>10.4}",
            column, stats.mean[index], stats.std[index]
        );
    }
    println!("  {:<24} (categorical, not normalized)", options.categorical);
    println!("\nSaved to: {}", config.data.stats_path.display());
    Ok(())
}

fn handle_train(config_path: &Path, epochs: Option<usize>, models_dir: Option<PathBuf>) -> Result<()> {
    let mut config = load_config(config_path)?;
    if let Some(epochs) = epochs {
        config.training.epochs = epochs;
    }
    if let Some(dir) = models_dir {
        config.data.models_dir = dir;
    }
    config.validate()?;

    println!("Training ExcelFormer");
    println!("  Data: {}", config.data.raw_file_path.display());
    println!("  Epochs: {}", config.training.epochs);
    println!("  Batch size: {}", config.training.batch_size);
    println!("  Learning rate: {}", config.training.learning_rate);
    println!("  Scheduler: {}", config.training.scheduler.kind);

    let context = ExecutionContext::<DefaultAutodiffBackend>::detect();
    println!("  Device: {}", context.kind());

    let output = train_from_config(&config, context).context("Training failed")?;
    let report = &output.report;

    println!("\nTraining Results");
    println!("────────────────");
    println!("  Epochs run: {}", report.epochs_run());
    if report.stopped_early {
        println!("  Stopped early: yes");
    }
    match (report.best_epoch, report.best_val_loss) {
        (Some(epoch), Some(loss)) => println!("  Best val loss: {loss:.6} (epoch {epoch})"),
        _ => println!("  Best val loss: n/a"),
    }
    println!("  Test MAE: {:.4} °C", report.test.mae_celsius);
    println!("  Test RMSE: {:.4} °C", report.test.rmse_celsius);
    println!("  Time: {:.1}s", report.training_time_secs);
    println!("\nCheckpoints: {}", config.data.models_dir.display());
    Ok(())
}

fn handle_evaluate(config_path: &Path, tag: CheckpointTag, split: Split) -> Result<()> {
    let config = load_config(config_path)?;
    let device = Default::default();

    let (model, meta) = load_excelformer::<DefaultBackend>(&config.data.models_dir, tag, &device)
        .context(format!(
            "Failed to load {tag} checkpoint from {}",
            config.data.models_dir.display()
        ))?;
    let datasets = load_datasets(&config)?;
    let eval = evaluate_split(
        &model,
        &datasets,
        split,
        config.training.batch_size,
        &device,
    )?;

    println!("Evaluation ({tag} checkpoint, epoch {}, {split} split)", meta.epoch);
    println!("─────────────────────────────────────────");
    println!("  Windows: {}", datasets.get(split).len());
    println!("  Loss (MSE, normalized): {:.6}", eval.loss);
    println!("  MAE: {:.4} (normalized), {:.4} °C", eval.metrics.mae, eval.metrics.mae_celsius);
    println!("  RMSE: {:.4} (normalized), {:.4} °C", eval.metrics.rmse, eval.metrics.rmse_celsius);
    Ok(())
}

fn handle_predict(config_path: &Path, tag: CheckpointTag, split: Split, index: usize) -> Result<()> {
    let config = load_config(config_path)?;
    let device = Default::default();

    let (model, _) = load_excelformer::<DefaultBackend>(&config.data.models_dir, tag, &device)
        .context(format!(
            "Failed to load {tag} checkpoint from {}",
            config.data.models_dir.display()
        ))?;
    let datasets = load_datasets(&config)?;
    let dataset = datasets.get(split);
    if index >= dataset.len() {
        bail!(
            "Window index {index} out of range: the {split} split has {} windows",
            dataset.len()
        );
    }

    let preds = predict_window(&model, dataset, index, &device)?;
    let Some((forecast, observed)) = preds.window(0) else {
        bail!("Model returned no forecast");
    };

    println!("Forecast ({split} window {index})");
    println!("───────────────────────────");
    println!("  {:>4}  {:>10}  {:>10}  {:>8}", "h", "forecast", "observed", "error");
    for (h, (p, t)) in forecast.iter().zip(observed).enumerate() {
        println!("  {:>4}  {:>8.2}°C  {:>8.2}°C  {:>+8.2}", h + 1, p, t, p - t);
    }
    println!("\n  MAE: {:.3} °C  RMSE: {:.3} °C", preds.mae(), preds.rmse());
    Ok(())
}

fn handle_info(config_path: &Path) -> Result<()> {
    let config = load_config(config_path)?;
    let device = Default::default();
    let model_config = ExcelFormerConfig::from_config(&config);
    let model = model_config.init::<DefaultAutodiffBackend>(&device)?;

    println!("Model Information");
    println!("─────────────────");
    println!("  Architecture: ExcelFormer");
    println!("  Input features: {}", model_config.num_input_features());
    println!("  d_model: {}", model_config.d_model);
    println!("  Heads: {}", model_config.n_heads);
    println!("  Layers: {}", model_config.n_layers);
    println!("  d_ff: {}", model_config.d_ff);
    println!("  Sequence length: {}", model_config.seq_len);
    println!("  Prediction length: {}", model_config.pred_len);
    println!("  Parameters: {}", model.num_params());
    println!("  Trainable parameters: {}", model.num_trainable_params());

    let options = DatasetOptions::from_config(&config);
    match WeatherTable::from_csv(&config.data.raw_file_path, &options.table_columns()) {
        Ok(table) => {
            let bounds = SplitBoundaries::new(table.len(), &config.training.split_ratio)?;
            println!("\nData");
            println!("────");
            println!("  Rows: {}", table.len());
            for split in Split::ALL {
                let rows = bounds.range(split).len();
                let windows = window_count(rows, config.training.seq_len, config.training.pred_len);
                println!("  {:<6} rows {rows:>8}  windows {windows:>8}", split.as_str());
            }
        }
        Err(err) => {
            tracing::warn!(error = %err, "raw table unavailable, skipping window counts");
        }
    }
    Ok(())
}
