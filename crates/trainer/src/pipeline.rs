//! End-to-end training pipeline
//!
//! Load both splits, engineer features, vectorize (fit on training only),
//! train with early stopping on the validation split, and record params,
//! the RMSE, the preprocessor and the model under a single run.

use std::fs;
use std::path::PathBuf;
use taxi_duration_core::{rmse, DictVectorizer};
use taxi_duration_tracking::{ExperimentRecorder, LoggedModel};
use tracing::info;

use crate::config::PipelineConfig;
use crate::dataset::{TripLoader, TripTable};
use crate::engineering::prepare_features;
use crate::errors::{Result, TrainerError};
use crate::trainer::{GbdtTrainer, LabeledMatrix};

/// Name of the logged evaluation metric
pub const RMSE_METRIC: &str = "rmse";

/// What a finished pipeline run produced
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineOutcome {
    /// Identifier of the finalized tracking run
    pub run_id: String,
    pub rmse: f64,
    pub model: LoggedModel,
    pub best_iteration: usize,
    pub preprocessor_path: PathBuf,
    pub train_rows: usize,
    pub valid_rows: usize,
}

/// Run the whole pipeline against the configured data and tracking store
pub fn run_pipeline(config: &PipelineConfig) -> Result<PipelineOutcome> {
    config.validate()?;

    let loader = TripLoader::new(config.data.columns.clone())
        .with_timeout(config.data.download_timeout());
    let train = loader.load(&config.data.train_source)?;
    let valid = loader.load(&config.data.valid_source)?;

    let recorder = ExperimentRecorder::open(&config.tracking)?;
    train_and_log(&recorder, &train, &valid, config)
}

/// Train on already loaded splits and record the run through `recorder`
pub fn train_and_log(
    recorder: &ExperimentRecorder,
    train: &TripTable,
    valid: &TripTable,
    config: &PipelineConfig,
) -> Result<PipelineOutcome> {
    let train_split = prepare_features(train);
    let valid_split = prepare_features(valid);
    info!(
        train_rows = train_split.len(),
        train_dropped = train_split.dropped,
        valid_rows = valid_split.len(),
        valid_dropped = valid_split.dropped,
        "Engineered features"
    );

    let (vectorizer, x_train) = DictVectorizer::new().fit_transform(&train_split.features);
    let x_valid = vectorizer.transform(&valid_split.features);
    info!(features = vectorizer.n_features(), "Fitted vectorizer");

    let train_data = LabeledMatrix::new(&x_train, &train_split.labels)?;
    let valid_data = LabeledMatrix::new(&x_valid, &valid_split.labels)?;
    let trainer = GbdtTrainer::new(config.training.clone());
    let artifacts = &config.artifacts;

    let recorded = recorder.with_run(artifacts.run_name.as_deref(), |run| {
        run.log_params(&config.training.params.as_param_map())?;

        let booster = trainer.train(train_data, valid_data)?;

        let predictions = booster.model.predict(&x_valid);
        let score = rmse(&predictions, &valid_split.labels)?;
        run.log_metric(RMSE_METRIC, score)?;
        info!(rmse = score, "Validation RMSE");

        fs::create_dir_all(&artifacts.models_dir)?;
        let preprocessor_path = artifacts.preprocessor_path();
        vectorizer.save_json(&preprocessor_path)?;
        run.log_artifact(
            &preprocessor_path,
            Some(artifacts.preprocessor_artifact_path.as_str()),
        )?;

        let model = run.log_model(&booster.model, &artifacts.model_artifact_path)?;

        Ok::<_, TrainerError>(PipelineOutcome {
            run_id: run.run_id().to_string(),
            rmse: score,
            model,
            best_iteration: booster.best_iteration,
            preprocessor_path,
            train_rows: train_split.len(),
            valid_rows: valid_split.len(),
        })
    })?;

    info!(run_id = %recorded.run_id, "Pipeline run finished");
    Ok(recorded.value)
}
