//! Gradient Boosted Decision Tree (GBDT) trainer
//!
//! Squared-error boosting over sparse rows with validation-based early
//! stopping. Gradient statistics are accumulated in `f64`; the trees and the
//! running predictions are kept in fixed-point, exactly as the stored model
//! evaluates them.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use taxi_duration_core::gbdt::fixed_row;
use taxi_duration_core::{from_fixed, rmse, to_fixed, CoreError, CsrMatrix, Model, Tree};
use tracing::{debug, info};

use crate::cart::{CartBuilder, TreeConfig};
use crate::deterministic::LcgRng;
use crate::errors::{Result, TrainerError};

/// Regression objective. Both names denote squared error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Objective {
    #[serde(rename = "reg:linear")]
    RegLinear,
    #[default]
    #[serde(rename = "reg:squarederror")]
    RegSquaredError,
}

impl Objective {
    pub fn as_str(self) -> &'static str {
        match self {
            Objective::RegLinear => "reg:linear",
            Objective::RegSquaredError => "reg:squarederror",
        }
    }

    /// First and second derivative of the loss at `prediction`
    pub fn gradient(self, prediction: f64, label: f64) -> (f64, f64) {
        match self {
            Objective::RegLinear | Objective::RegSquaredError => (prediction - label, 1.0),
        }
    }
}

impl fmt::Display for Objective {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Objective {
    type Err = TrainerError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "reg:linear" => Ok(Objective::RegLinear),
            "reg:squarederror" => Ok(Objective::RegSquaredError),
            other => Err(TrainerError::Config(format!("unknown objective {other:?}"))),
        }
    }
}

/// Booster hyperparameters, logged with every run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoosterParams {
    pub learning_rate: f64,
    pub max_depth: usize,
    pub min_child_weight: f64,
    pub objective: Objective,
    pub reg_alpha: f64,
    pub reg_lambda: f64,
    pub seed: i64,
    /// Fraction of rows sampled per tree
    pub subsample: f64,
}

impl Default for BoosterParams {
    fn default() -> Self {
        Self {
            learning_rate: 0.3,
            max_depth: 6,
            min_child_weight: 1.0,
            objective: Objective::RegSquaredError,
            reg_alpha: 0.0,
            reg_lambda: 1.0,
            seed: 0,
            subsample: 1.0,
        }
    }
}

impl BoosterParams {
    /// Parameters found by the hyperparameter search for the green-taxi data
    pub fn tuned() -> Self {
        Self {
            learning_rate: 0.09585355369315604,
            max_depth: 30,
            min_child_weight: 1.060597050922164,
            objective: Objective::RegLinear,
            reg_alpha: 0.018060244040060163,
            reg_lambda: 0.011658731377413597,
            seed: 42,
            subsample: 1.0,
        }
    }

    /// Parameters as logged to the tracking store. `subsample` is only
    /// included when rows are actually sampled.
    pub fn as_param_map(&self) -> BTreeMap<String, String> {
        let mut params = BTreeMap::new();
        params.insert("learning_rate".to_string(), self.learning_rate.to_string());
        params.insert("max_depth".to_string(), self.max_depth.to_string());
        params.insert(
            "min_child_weight".to_string(),
            self.min_child_weight.to_string(),
        );
        params.insert("objective".to_string(), self.objective.to_string());
        params.insert("reg_alpha".to_string(), self.reg_alpha.to_string());
        params.insert("reg_lambda".to_string(), self.reg_lambda.to_string());
        params.insert("seed".to_string(), self.seed.to_string());
        if self.subsample < 1.0 {
            params.insert("subsample".to_string(), self.subsample.to_string());
        }
        params
    }

    fn tree_config(&self, quant_step: i64) -> TreeConfig {
        TreeConfig {
            max_depth: self.max_depth,
            min_child_weight: self.min_child_weight,
            reg_alpha: self.reg_alpha,
            reg_lambda: self.reg_lambda,
            learning_rate: self.learning_rate,
            quant_step,
        }
    }
}

/// GBDT training configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainerConfig {
    pub params: BoosterParams,
    pub num_boost_round: usize,
    /// Stop once validation RMSE has not improved for this many rounds
    pub early_stopping_rounds: Option<usize>,
    /// Split-candidate bucket width, fixed-point (10_000 = 0.01)
    pub quant_step: i64,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            params: BoosterParams::tuned(),
            num_boost_round: 30,
            early_stopping_rounds: Some(50),
            quant_step: 10_000,
        }
    }
}

impl TrainerConfig {
    pub fn validate(&self) -> Result<()> {
        let p = &self.params;
        let check = |ok: bool, message: &str| {
            if ok {
                Ok(())
            } else {
                Err(TrainerError::Config(message.to_string()))
            }
        };

        check(
            p.learning_rate.is_finite() && p.learning_rate > 0.0,
            "learning_rate must be positive",
        )?;
        check(
            (1..=62).contains(&p.max_depth),
            "max_depth must be between 1 and 62",
        )?;
        check(
            p.min_child_weight.is_finite() && p.min_child_weight >= 0.0,
            "min_child_weight must be non-negative",
        )?;
        check(
            p.reg_alpha.is_finite() && p.reg_alpha >= 0.0,
            "reg_alpha must be non-negative",
        )?;
        check(
            p.reg_lambda.is_finite() && p.reg_lambda >= 0.0,
            "reg_lambda must be non-negative",
        )?;
        check(
            p.subsample > 0.0 && p.subsample <= 1.0,
            "subsample must be in (0, 1]",
        )?;
        check(self.num_boost_round > 0, "num_boost_round must be positive")?;
        check(
            self.early_stopping_rounds != Some(0),
            "early_stopping_rounds must be positive",
        )?;
        check(self.quant_step > 0, "quant_step must be positive")?;
        Ok(())
    }
}

/// A feature matrix with one label per row
#[derive(Debug, Clone, Copy)]
pub struct LabeledMatrix<'a> {
    pub matrix: &'a CsrMatrix,
    pub labels: &'a [f64],
}

impl<'a> LabeledMatrix<'a> {
    pub fn new(matrix: &'a CsrMatrix, labels: &'a [f64]) -> Result<Self> {
        if matrix.n_rows() != labels.len() {
            return Err(CoreError::ShapeMismatch {
                left: matrix.n_rows(),
                right: labels.len(),
            }
            .into());
        }
        Ok(Self { matrix, labels })
    }

    fn fixed_rows(&self) -> Vec<Vec<(usize, i64)>> {
        (0..self.matrix.n_rows())
            .map(|row| fixed_row(self.matrix, row))
            .collect()
    }
}

/// Output of a training run
#[derive(Debug, Clone, PartialEq)]
pub struct TrainedBooster {
    /// Ensemble truncated to the best round
    pub model: Model,
    /// Zero-based round with the lowest validation RMSE
    pub best_iteration: usize,
    pub best_score: f64,
    /// Number of rounds actually run
    pub rounds_run: usize,
    /// Validation RMSE after each round
    pub history: Vec<f64>,
}

/// GBDT trainer
pub struct GbdtTrainer {
    config: TrainerConfig,
}

impl GbdtTrainer {
    pub fn new(config: TrainerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TrainerConfig {
        &self.config
    }

    /// Train on `train`, evaluating `valid` after every round
    pub fn train(
        &self,
        train: LabeledMatrix<'_>,
        valid: LabeledMatrix<'_>,
    ) -> Result<TrainedBooster> {
        self.config.validate()?;

        if train.labels.is_empty() {
            return Err(TrainerError::Training("training split is empty".to_string()));
        }
        if valid.labels.is_empty() {
            return Err(TrainerError::Training("validation split is empty".to_string()));
        }
        if train.matrix.n_cols() != valid.matrix.n_cols() {
            return Err(CoreError::ShapeMismatch {
                left: train.matrix.n_cols(),
                right: valid.matrix.n_cols(),
            }
            .into());
        }

        let params = &self.config.params;
        let tree_config = params.tree_config(self.config.quant_step);
        let train_rows = train.fixed_rows();
        let valid_rows = valid.fixed_rows();

        let bias = mean_fixed(train.labels);
        let mut train_pred = vec![bias; train_rows.len()];
        let mut valid_pred = vec![bias; valid_rows.len()];

        let mut rng = LcgRng::new(params.seed);
        let mut trees: Vec<Tree> = Vec::with_capacity(self.config.num_boost_round);
        let mut history = Vec::with_capacity(self.config.num_boost_round);
        let mut best_iteration = 0usize;
        let mut best_score = f64::INFINITY;

        info!(
            rows = train_rows.len(),
            features = train.matrix.n_cols(),
            rounds = self.config.num_boost_round,
            "Starting boosting"
        );

        for round in 0..self.config.num_boost_round {
            let (gradients, hessians): (Vec<f64>, Vec<f64>) = train_pred
                .iter()
                .zip(train.labels)
                .map(|(&pred, &label)| params.objective.gradient(from_fixed(pred), label))
                .unzip();

            let sample = rng.sample_rows(train_rows.len(), params.subsample);
            let tree = CartBuilder::new(&train_rows, &gradients, &hessians, tree_config.clone())
                .build(&sample);

            apply_tree(&tree, &train_rows, &mut train_pred);
            apply_tree(&tree, &valid_rows, &mut valid_pred);
            trees.push(tree);

            let predictions: Vec<f64> = valid_pred.iter().map(|&p| from_fixed(p)).collect();
            let score = rmse(&predictions, valid.labels)?;
            history.push(score);
            debug!(round, validation_rmse = score, "Boosting round");

            if score < best_score {
                best_score = score;
                best_iteration = round;
            } else if let Some(patience) = self.config.early_stopping_rounds {
                if round - best_iteration >= patience {
                    info!(round, best_iteration, "Early stopping");
                    break;
                }
            }
        }

        let rounds_run = trees.len();
        if self.config.early_stopping_rounds.is_some() {
            trees.truncate(best_iteration + 1);
        }

        let model = Model::new(trees, bias, train.matrix.n_cols());
        info!(
            rounds_run,
            best_iteration,
            best_score,
            trees = model.num_trees(),
            "Training complete"
        );

        Ok(TrainedBooster {
            model,
            best_iteration,
            best_score,
            rounds_run,
            history,
        })
    }
}

/// Mean label in fixed-point
fn mean_fixed(labels: &[f64]) -> i64 {
    if labels.is_empty() {
        return 0;
    }
    let sum: i128 = labels.iter().map(|&y| to_fixed(y) as i128).sum();
    (sum / labels.len() as i128) as i64
}

/// Add a tree's weighted output to running fixed-point predictions
fn apply_tree(tree: &Tree, rows: &[Vec<(usize, i64)>], predictions: &mut [i64]) {
    for (row, pred) in rows.iter().zip(predictions.iter_mut()) {
        let weighted = (tree.evaluate_sparse(row) as i128 * tree.weight as i128)
            / taxi_duration_core::SCALE as i128;
        *pred = pred.saturating_add(weighted as i64);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matrix(rows: &[&[(usize, f64)]], n_cols: usize) -> CsrMatrix {
        let mut m = CsrMatrix::new(n_cols);
        for row in rows {
            m.push_row(row);
        }
        m
    }

    fn simple_data() -> (CsrMatrix, Vec<f64>) {
        let rows: Vec<Vec<(usize, f64)>> = (0..24)
            .map(|i| vec![(0, (i % 6) as f64), (1 + (i % 2), 1.0)])
            .collect();
        let refs: Vec<&[(usize, f64)]> = rows.iter().map(|r| r.as_slice()).collect();
        let labels = (0..24).map(|i| 5.0 + 3.0 * (i % 6) as f64).collect();
        (matrix(&refs, 3), labels)
    }

    fn quick_config() -> TrainerConfig {
        TrainerConfig {
            params: BoosterParams {
                learning_rate: 0.5,
                max_depth: 3,
                ..BoosterParams::default()
            },
            num_boost_round: 10,
            early_stopping_rounds: None,
            quant_step: 10_000,
        }
    }

    #[test]
    fn test_train_reduces_error() {
        let (x, y) = simple_data();
        let data = LabeledMatrix::new(&x, &y).unwrap();
        let trained = GbdtTrainer::new(quick_config()).train(data, data).unwrap();

        assert_eq!(trained.model.num_trees(), 10);
        assert_eq!(trained.rounds_run, 10);
        assert_eq!(trained.history.len(), 10);
        assert!(trained.history[9] < trained.history[0]);
        assert!(trained.best_score < 0.5, "rmse {}", trained.best_score);

        let predictions = trained.model.predict(&x);
        let score = rmse(&predictions, &y).unwrap();
        assert!((score - trained.history[9]).abs() < 1e-9);
    }

    #[test]
    fn test_bias_is_label_mean() {
        assert_eq!(mean_fixed(&[1.0, 2.0, 3.0]), 2_000_000);
        assert_eq!(mean_fixed(&[12.0, 8.0]), 10_000_000);
    }

    #[test]
    fn test_determinism() {
        let (x, y) = simple_data();
        let data = LabeledMatrix::new(&x, &y).unwrap();
        let mut config = quick_config();
        config.params.subsample = 0.7;
        config.params.seed = 7;

        let a = GbdtTrainer::new(config.clone()).train(data, data).unwrap();
        let b = GbdtTrainer::new(config).train(data, data).unwrap();

        assert_eq!(a.model, b.model);
        assert_eq!(a.model.hash_hex().unwrap(), b.model.hash_hex().unwrap());
    }

    #[test]
    fn test_early_stopping_truncates_to_best_round() {
        let (x, y) = simple_data();
        let train = LabeledMatrix::new(&x, &y).unwrap();

        // Validation labels the features cannot explain: the first round is best
        let vx = matrix(&[&[(0, 0.0)], &[(0, 5.0)]], 3);
        let vy = vec![20.0, 5.0];
        let valid = LabeledMatrix::new(&vx, &vy).unwrap();

        let mut config = quick_config();
        config.num_boost_round = 50;
        config.early_stopping_rounds = Some(3);
        let trained = GbdtTrainer::new(config).train(train, valid).unwrap();

        assert!(trained.rounds_run < 50);
        assert_eq!(trained.rounds_run, trained.best_iteration + 4);
        assert_eq!(trained.model.num_trees(), trained.best_iteration + 1);
        let best = trained
            .history
            .iter()
            .cloned()
            .fold(f64::INFINITY, f64::min);
        assert_eq!(trained.best_score, best);
    }

    #[test]
    fn test_empty_splits_are_rejected() {
        let (x, y) = simple_data();
        let train = LabeledMatrix::new(&x, &y).unwrap();
        let empty = CsrMatrix::new(3);
        let none: Vec<f64> = Vec::new();
        let valid = LabeledMatrix::new(&empty, &none).unwrap();

        let trainer = GbdtTrainer::new(quick_config());
        assert!(matches!(
            trainer.train(train, valid),
            Err(TrainerError::Training(_))
        ));
        assert!(matches!(
            trainer.train(valid, train),
            Err(TrainerError::Training(_))
        ));
    }

    #[test]
    fn test_label_shape_mismatch() {
        let (x, _) = simple_data();
        let y = vec![1.0; 3];
        assert!(LabeledMatrix::new(&x, &y).is_err());
    }

    #[test]
    fn test_param_map() {
        let params = BoosterParams::tuned().as_param_map();
        assert_eq!(params.len(), 7);
        assert_eq!(params["learning_rate"], "0.09585355369315604");
        assert_eq!(params["max_depth"], "30");
        assert_eq!(params["objective"], "reg:linear");
        assert_eq!(params["seed"], "42");
    }

    #[test]
    fn test_config_validation() {
        assert!(TrainerConfig::default().validate().is_ok());

        let mut config = TrainerConfig::default();
        config.params.subsample = 0.0;
        assert!(config.validate().is_err());

        let mut config = TrainerConfig::default();
        config.early_stopping_rounds = Some(0);
        assert!(config.validate().is_err());

        assert_eq!("reg:linear".parse::<Objective>().unwrap(), Objective::RegLinear);
        assert!("binary:logistic".parse::<Objective>().is_err());
    }
}
