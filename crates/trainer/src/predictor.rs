//! Duration predictions from a trained preprocessor and model

use std::path::Path;
use taxi_duration_core::{FittedDictVectorizer, Model};

use crate::engineering::{FeatureRecord, Ride};
use crate::errors::Result;

/// A fitted vectorizer paired with the model trained on its columns
#[derive(Debug, Clone)]
pub struct DurationPredictor {
    vectorizer: FittedDictVectorizer,
    model: Model,
}

impl DurationPredictor {
    pub fn new(vectorizer: FittedDictVectorizer, model: Model) -> Result<Self> {
        model.validate()?;
        Ok(Self { vectorizer, model })
    }

    /// Load the preprocessor and model artifacts written by a training run
    pub fn load<P: AsRef<Path>, Q: AsRef<Path>>(preprocessor: P, model: Q) -> Result<Self> {
        let vectorizer = FittedDictVectorizer::load_json(preprocessor)?;
        let model = Model::load_json(model)?;
        Self::new(vectorizer, model)
    }

    pub fn model(&self) -> &Model {
        &self.model
    }

    pub fn vectorizer(&self) -> &FittedDictVectorizer {
        &self.vectorizer
    }

    /// Predicted duration in minutes
    pub fn predict(&self, features: &FeatureRecord) -> f64 {
        let row = self.vectorizer.transform_one(&features.to_dict());
        self.model.predict(&row).first().copied().unwrap_or(0.0)
    }

    pub fn predict_ride(&self, ride: &Ride) -> Result<f64> {
        Ok(self.predict(&FeatureRecord::from_ride(ride)?))
    }

    pub fn predict_batch(&self, features: &[FeatureRecord]) -> Vec<f64> {
        let dicts: Vec<_> = features.iter().map(FeatureRecord::to_dict).collect();
        self.model.predict(&self.vectorizer.transform(&dicts))
    }
}
