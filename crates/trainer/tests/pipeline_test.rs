//! End-to-end pipeline tests against a local tracking store

use anyhow::Result;
use std::io::Write;
use std::path::Path;
use taxi_duration_core::{FittedDictVectorizer, Model};
use taxi_duration_tracking::{
    ExperimentRecorder, FileTrackingStore, RunStatus, TrackingConfig, TrackingStore,
};
use taxi_duration_trainer::{
    run_pipeline, train_and_log, DurationPredictor, PipelineConfig, Ride, TripLoader,
    TrainerError,
};
use tempfile::TempDir;

const HEADER: &str =
    "lpep_pickup_datetime,lpep_dropoff_datetime,PULocationID,DOLocationID,trip_distance";

fn write_csv(dir: &Path, name: &str, rows: &[&str]) -> Result<String> {
    let path = dir.join(name);
    let mut file = std::fs::File::create(&path)?;
    writeln!(file, "{HEADER}")?;
    for row in rows {
        writeln!(file, "{row}")?;
    }
    Ok(path.to_string_lossy().into_owned())
}

/// Two training trips (12 and 8 minutes) and one validation trip on an unseen zone pair
fn scenario(dir: &Path) -> Result<PipelineConfig> {
    let train = write_csv(
        dir,
        "train.csv",
        &[
            "2021-01-01 08:00:00,2021-01-01 08:12:00,10,50,5.0",
            "2021-01-01 09:00:00,2021-01-01 09:08:00,20,30,2.0",
        ],
    )?;
    let valid = write_csv(
        dir,
        "valid.csv",
        &["2021-02-01 08:00:00,2021-02-01 08:10:00,99,98,3.0"],
    )?;

    let mut config = PipelineConfig::default();
    config.data.train_source = train;
    config.data.valid_source = valid;
    config.tracking = TrackingConfig::with_uri(dir.join("mlruns").to_string_lossy().into_owned());
    config.artifacts.models_dir = dir.join("models");
    Ok(config)
}

#[test]
fn test_end_to_end_run() -> Result<()> {
    let dir = TempDir::new()?;
    let config = scenario(dir.path())?;

    let outcome = run_pipeline(&config)?;

    assert!(outcome.rmse.is_finite() && outcome.rmse >= 0.0);
    assert_eq!(outcome.train_rows, 2);
    assert_eq!(outcome.valid_rows, 1);
    assert_eq!(
        outcome.model.model_uri,
        format!("runs:/{}/models_mlflow", outcome.run_id)
    );
    assert!(outcome.preprocessor_path.ends_with("models/preprocessor.json"));
    assert!(outcome.preprocessor_path.is_file());

    let store = FileTrackingStore::open(dir.path().join("mlruns"))?;
    let run = store.get_run(&outcome.run_id)?;
    assert_eq!(run.info.status, RunStatus::Finished);
    assert_eq!(run.data.params.len(), 7);
    assert_eq!(run.data.params["max_depth"], "30");
    assert_eq!(run.data.metrics.len(), 1);
    assert_eq!(run.data.metrics[0].key, "rmse");
    assert_eq!(run.data.metrics[0].value, outcome.rmse);
    assert!(store.artifact_exists(&outcome.run_id, "preprocessor/preprocessor.json")?);
    assert!(store.artifact_exists(&outcome.run_id, "models_mlflow/model.json")?);
    assert!(store.artifact_exists(&outcome.run_id, "models_mlflow/MLmodel")?);
    Ok(())
}

#[test]
fn test_logged_artifacts_reproduce_prediction() -> Result<()> {
    let dir = TempDir::new()?;
    let config = scenario(dir.path())?;
    let outcome = run_pipeline(&config)?;

    let store = FileTrackingStore::open(dir.path().join("mlruns"))?;
    let artifacts = store.artifact_dir(&outcome.run_id)?;
    let vectorizer =
        FittedDictVectorizer::load_json(artifacts.join("preprocessor/preprocessor.json"))?;
    let model = Model::load_json(artifacts.join("models_mlflow/model.json"))?;
    assert_eq!(model.hash_hex()?, outcome.model.model_hash);
    assert_eq!(
        vectorizer.feature_names(),
        ["PU_DO=10_50", "PU_DO=20_30", "trip_distance"]
    );

    let predictor = DurationPredictor::new(vectorizer, model)?;
    let ride = Ride {
        pu_location_id: 99,
        do_location_id: 98,
        trip_distance: 3.0,
    };
    let predicted = predictor.predict_ride(&ride)?;
    // A single validation trip of 10 minutes
    assert!((outcome.rmse - (predicted - 10.0).abs()).abs() < 1e-9);
    Ok(())
}

#[test]
fn test_same_inputs_give_same_model() -> Result<()> {
    let dir = TempDir::new()?;
    let config = scenario(dir.path())?;

    let first = run_pipeline(&config)?;
    let second = run_pipeline(&config)?;

    assert_ne!(first.run_id, second.run_id);
    assert_eq!(first.model.model_hash, second.model.model_hash);
    assert_eq!(first.rmse, second.rmse);
    Ok(())
}

#[test]
fn test_failed_training_marks_run_failed() -> Result<()> {
    let dir = TempDir::new()?;
    let config = scenario(dir.path())?;

    // Every validation trip falls outside the duration window
    let loader = TripLoader::new(config.data.columns.clone());
    let train = loader.load(&config.data.train_source)?;
    let too_long = write_csv(
        dir.path(),
        "too_long.csv",
        &["2021-02-01 08:00:00,2021-02-01 10:00:00,10,50,3.0"],
    )?;
    let valid = loader.load(&too_long)?;

    let store = FileTrackingStore::open(dir.path().join("mlruns"))?;
    let recorder = ExperimentRecorder::new(Box::new(store.clone()), "failures")?;
    let err = train_and_log(&recorder, &train, &valid, &config).unwrap_err();
    assert!(matches!(err, TrainerError::Training(_)));

    let experiment_dir = store.root().join(recorder.experiment_id());
    let run_ids: Vec<String> = std::fs::read_dir(&experiment_dir)?
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.path().is_dir())
        .map(|entry| entry.file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(run_ids.len(), 1);
    assert_eq!(store.get_run(&run_ids[0])?.info.status, RunStatus::Failed);
    Ok(())
}

#[test]
fn test_missing_data_file_fails_before_tracking() {
    let dir = TempDir::new().unwrap();
    let mut config = scenario(dir.path()).unwrap();
    config.data.train_source = dir.path().join("absent.csv").to_string_lossy().into_owned();

    let err = run_pipeline(&config).unwrap_err();
    assert!(matches!(err, TrainerError::Io(_)));
    assert!(!dir.path().join("mlruns").exists());
}
