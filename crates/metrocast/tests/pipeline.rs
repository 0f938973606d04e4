//! End-to-end pipeline tests: CSV on disk to a restored checkpoint.

mod common;

use burn_autodiff::Autodiff;
use burn_ndarray::NdArray;
use metrocast::prelude::*;
use metrocast::data::{window_count, SplitBoundaries};
use metrocast::train::{DeviceKind, HISTORY_FILE};

use common::{small_config, write_csv};

type TrainBackend = Autodiff<NdArray>;
type TestBackend = NdArray;

#[test]
fn test_csv_to_checkpoint_pipeline() {
    let dir = tempfile::tempdir().unwrap();
    let config = small_config(dir.path());
    config.validate().unwrap();
    std::fs::create_dir_all(dir.path().join("raw")).unwrap();
    write_csv(&config.data.raw_file_path, 400);

    // fit and persist statistics, as the stats step does
    let options = DatasetOptions::from_config(&config);
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
    let loaded = Statistics::load(&config.data.stats_path).unwrap();
    assert_eq!(loaded.len(), 3);
    assert!((loaded.mean[0] - stats.mean[0]).abs() < 1e-9);

    let ctx = ExecutionContext::<TrainBackend>::new(Default::default(), DeviceKind::Cpu);
    let output = train_from_config(&config, ctx).unwrap();
    assert_eq!(output.report.epochs_run(), 2);
    assert!(output.report.test.mae_celsius.is_finite());

    let models_dir = &config.data.models_dir;
    assert!(models_dir.join(HISTORY_FILE).is_file());

    let device = Default::default();
    let (model, meta) = load_excelformer::<TestBackend>(models_dir, CheckpointTag::Best, &device).unwrap();
    assert_eq!(meta.tag, CheckpointTag::Best);
    assert_eq!(meta.model_config, ExcelFormerConfig::from_config(&config));
    let run_config = meta.run_config.unwrap();
    assert_eq!(run_config.features, config.features);
    assert_eq!(run_config.training.seq_len, 8);

    let datasets = SplitDatasets::from_csv(&config.data.raw_file_path, &stats, &options).unwrap();
    let preds = predict_window(&model, &datasets.test, 0, &device).unwrap();
    assert_eq!(preds.len(), 1);
    assert_eq!(preds.preds_celsius.len(), config.training.pred_len);
    // targets come back in physical units
    let (_, observed) = preds.window(0).unwrap();
    assert!(observed.iter().all(|t| (8.0..=20.0).contains(t)));
}

#[test]
fn test_training_requires_statistics() {
    let dir = tempfile::tempdir().unwrap();
    let config = small_config(dir.path());
    std::fs::create_dir_all(dir.path().join("raw")).unwrap();
    write_csv(&config.data.raw_file_path, 200);

    let ctx = ExecutionContext::<TrainBackend>::new(Default::default(), DeviceKind::Cpu);
    assert!(train_from_config(&config, ctx).is_err());
    assert!(!config.data.models_dir.exists());
}

#[test]
fn test_window_counts_for_default_lengths() {
    let bounds = SplitBoundaries::new(1000, &SplitRatio::default()).unwrap();
    let counts: Vec<usize> = Split::ALL
        .iter()
        .map(|s| window_count(bounds.range(*s).len(), 24, 24))
        .collect();
    assert_eq!(counts, vec![753, 53, 53]);
}
