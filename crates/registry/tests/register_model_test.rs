//! `register-model` binary behaviour against local and unreachable registries

use anyhow::Result;
use std::io::Write;
use std::path::Path;
use std::process::{Command, Output};
use taxi_duration_registry::{LocalRegistry, ModelRegistry, ModelUri};
use taxi_duration_tracking::{ExperimentRecorder, FileTrackingStore, TrackingError};
use tempfile::TempDir;

fn register_model(envs: &[(&str, &str)]) -> Output {
    let mut command = Command::new(env!("CARGO_BIN_EXE_register-model"));
    for key in ["MLFLOW_TRACKING_URI", "RUN_ID", "MODEL_NAME", "MODEL_ARTIFACT_PATH"] {
        command.env_remove(key);
    }
    command.envs(envs.iter().copied());
    command.output().expect("register-model should run")
}

/// Log a finished run holding `models_mlflow/model.json` and return its id
fn trained_run(tracking_root: &Path) -> Result<String> {
    let store = FileTrackingStore::open(tracking_root)?;
    let recorder = ExperimentRecorder::new(Box::new(store), "promotion")?;

    let scratch = TempDir::new()?;
    let model = scratch.path().join("model.json");
    writeln!(std::fs::File::create(&model)?, "{{}}")?;

    let recorded = recorder.with_run(None, |run| {
        run.log_artifact(&model, Some("models_mlflow"))?;
        Ok::<_, TrackingError>(())
    })?;
    Ok(recorded.run_id)
}

#[test]
fn test_missing_run_id_exits_1_without_registry_call() {
    let dir = TempDir::new().unwrap();
    let tracking = dir.path().join("mlruns");

    let output = register_model(&[
        ("MLFLOW_TRACKING_URI", tracking.to_str().unwrap()),
        ("MODEL_NAME", "taxi-duration"),
    ]);

    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("RUN_ID"));
    assert!(!tracking.exists());
}

#[test]
fn test_missing_model_name_exits_1() {
    let output = register_model(&[("RUN_ID", "abc123")]);
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("MODEL_NAME"));
}

#[test]
fn test_unreachable_registry_exits_0_with_warning() {
    let output = register_model(&[
        ("MLFLOW_TRACKING_URI", "http://127.0.0.1:1"),
        ("RUN_ID", "abc123"),
        ("MODEL_NAME", "taxi-duration"),
    ]);

    assert_eq!(output.status.code(), Some(0));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("registration failed"), "{stderr}");
    assert!(stderr.contains("abc123"));
    assert!(output.stdout.is_empty());
}

#[test]
fn test_registers_increasing_versions_in_local_registry() -> Result<()> {
    let dir = TempDir::new()?;
    let run_id = trained_run(dir.path())?;
    let envs = [
        ("MLFLOW_TRACKING_URI", dir.path().to_str().unwrap()),
        ("RUN_ID", run_id.as_str()),
        ("MODEL_NAME", "taxi-duration"),
    ];

    let first = register_model(&envs);
    let second = register_model(&envs);

    assert_eq!(first.status.code(), Some(0));
    assert_eq!(String::from_utf8_lossy(&first.stdout).trim(), "1");
    assert_eq!(String::from_utf8_lossy(&second.stdout).trim(), "2");

    let registry = LocalRegistry::open(dir.path())?;
    let versions = registry.versions("taxi-duration")?;
    assert_eq!(versions.len(), 2);
    assert_eq!(versions[1].source, format!("runs:/{run_id}/models_mlflow"));
    Ok(())
}

#[test]
fn test_missing_artifact_exits_0_without_version() -> Result<()> {
    let dir = TempDir::new()?;
    let run_id = trained_run(dir.path())?;

    let output = register_model(&[
        ("MLFLOW_TRACKING_URI", dir.path().to_str().unwrap()),
        ("RUN_ID", run_id.as_str()),
        ("MODEL_NAME", "taxi-duration"),
        ("MODEL_ARTIFACT_PATH", "not_logged"),
    ]);

    assert_eq!(output.status.code(), Some(0));
    assert!(output.stdout.is_empty());

    let registry = LocalRegistry::open(dir.path())?;
    assert!(registry.latest_version("taxi-duration")?.is_none());
    let err = registry
        .register_model(&ModelUri::new(&run_id, "not_logged"), "taxi-duration")
        .unwrap_err();
    assert!(!err.is_transient());
    Ok(())
}
