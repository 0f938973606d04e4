//! Shared fixtures for the end-to-end tests.

#![allow(dead_code)]

use std::fmt::Write as _;
use std::path::Path;

use metrocast::prelude::*;

/// Write `rows` hourly observations with a daily temperature cycle.
pub fn write_csv(path: &Path, rows: usize) {
    let mut text = String::from("time,temperature_2m,relative_humidity_2m,pressure_msl,weather_code\n");
    for r in 0..rows {
        let day = r / 24;
        let hour = r % 24;
        let temp = 14.0 + 5.0 * (2.0 * std::f64::consts::PI * hour as f64 / 24.0).sin();
        let humidity = 55.0 + (r % 17) as f64;
        let pressure = 1012.0 + (r % 5) as f64 * 0.5;
        let code = [0, 1, 2, 3, 61][r % 5];
        // 2024-01-01 plus `day` days; January has 31 days
        let (month, dom) = if day < 31 { (1, day + 1) } else { (2, day - 30) };
        writeln!(
            text,
            "2024-{month:02}-{dom:02}T{hour:02}:00,{temp:.2},{humidity:.1},{pressure:.1},{code}"
        )
        .unwrap();
    }
    std::fs::write(path, text).unwrap();
}

pub fn small_config(root: &Path) -> Config {
    let mut config = Config::default();
    config.data.raw_file_path = root.join("raw/weather.csv");
    config.data.stats_path = root.join("processed/statistics.json");
    config.data.models_dir = root.join("models");
    config.features.inputs = [
        "temperature_2m",
        "relative_humidity_2m",
        "pressure_msl",
        "weather_code",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();
    config.model.d_model = 8;
    config.model.n_heads = 2;
    config.model.n_layers = 1;
    config.model.d_ff = 16;
    config.training.seq_len = 8;
    config.training.pred_len = 4;
    config.training.batch_size = 16;
    config.training.epochs = 2;
    config.training.learning_rate = 1e-3;
    config
}

/// Write the raw table for `config` and fit its statistics, as `metrocast stats` does.
pub fn prepare_artifacts(config: &Config, rows: usize) -> Statistics {
    if let Some(parent) = config.data.raw_file_path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    write_csv(&config.data.raw_file_path, rows);
    let options = DatasetOptions::from_config(config);
    let table = WeatherTable::from_csv(&config.data.raw_file_path, &options.table_columns()).unwrap();
    let stats = Statistics::fit(
        &table,
        &options.continuous,
        &options.categorical,
        &options.split_ratio,
        &options.target_col,
    )
    .unwrap();
    stats.save(&config.data.stats_path).unwrap();
    stats
}
