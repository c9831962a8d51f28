//! Prediction engine
//!
//! Wraps the loaded bundle and exposes single and batch inference under a
//! fixed feature-dimension contract. The bundle is shared read-only, so the
//! engine is cheap to clone and safe to call from any number of workers.

use crate::bundle::{ModelBundle, FEATURE_DIMENSION};
use crate::error::{EngineError, ItemError, PredictionError, ValidationError};
use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

/// Known-valid input used to confirm the inference path works
pub const CANARY_FEATURES: [f64; FEATURE_DIMENSION] = [5.1, 3.5, 1.4, 0.2];

/// Class probabilities keyed by class name, in bundle class order
#[derive(Debug, Clone, PartialEq)]
pub struct ClassProbabilities(Vec<(String, f64)>);

impl ClassProbabilities {
    pub fn get(&self, class_name: &str) -> Option<f64> {
        self.0
            .iter()
            .find(|(name, _)| name == class_name)
            .map(|(_, p)| *p)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.0.iter().map(|(name, p)| (name.as_str(), *p))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn total(&self) -> f64 {
        self.0.iter().map(|(_, p)| p).sum()
    }
}

impl Serialize for ClassProbabilities {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (name, p) in &self.0 {
            map.serialize_entry(name, p)?;
        }
        map.end()
    }
}

/// Outcome of one successful inference
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PredictionResult {
    #[serde(rename = "prediction")]
    pub predicted_class_index: usize,
    #[serde(rename = "class")]
    pub predicted_class_name: String,
    #[serde(rename = "probabilities")]
    pub class_probabilities: ClassProbabilities,
    pub confidence: f64,
    #[serde(rename = "processing_time_ms")]
    pub latency_ms: f64,
}

/// One element of a batch request
#[derive(Debug, Clone, PartialEq)]
pub enum BatchItem {
    Features(Vec<f64>),
    /// Element that could not be decoded as a numeric vector
    Malformed(String),
}

impl From<Vec<f64>> for BatchItem {
    fn from(features: Vec<f64>) -> Self {
        BatchItem::Features(features)
    }
}

/// Per-position batch outcome
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum BatchOutcome {
    Prediction(PredictionResult),
    Error(ItemError),
}

impl BatchOutcome {
    pub fn prediction(&self) -> Option<&PredictionResult> {
        match self {
            BatchOutcome::Prediction(result) => Some(result),
            BatchOutcome::Error(_) => None,
        }
    }

    pub fn error(&self) -> Option<&ItemError> {
        match self {
            BatchOutcome::Prediction(_) => None,
            BatchOutcome::Error(err) => Some(err),
        }
    }
}

/// Batch outcomes aligned 1:1 with the input
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchResult {
    pub results: Vec<BatchOutcome>,
    pub count: usize,
}

/// Inference over an immutable, shared model bundle
#[derive(Debug, Clone)]
pub struct PredictionEngine {
    bundle: Arc<ModelBundle>,
}

impl PredictionEngine {
    pub fn new(bundle: ModelBundle) -> Self {
        Self {
            bundle: Arc::new(bundle),
        }
    }

    pub fn bundle(&self) -> &ModelBundle {
        &self.bundle
    }

    pub fn feature_dimension(&self) -> usize {
        self.bundle.feature_dimension()
    }

    /// Check the input contract without running inference
    pub fn validate(&self, features: &[f64]) -> Result<(), ValidationError> {
        let expected = self.feature_dimension();
        if features.len() != expected {
            return Err(ValidationError::FeatureCount {
                expected,
                got: features.len(),
            });
        }
        if let Some(index) = features.iter().position(|f| !f.is_finite()) {
            return Err(ValidationError::NonFinite { index });
        }
        Ok(())
    }

    /// Classify one feature vector
    pub fn predict(&self, features: &[f64]) -> Result<PredictionResult, EngineError> {
        let start = Instant::now();
        self.validate(features)?;

        let raw = self.bundle.classifier().predict_proba(features)?;
        let proba = normalise(raw, self.bundle.class_names().len())?;

        // First maximum wins ties
        let mut predicted = 0;
        for (i, p) in proba.iter().enumerate() {
            if *p > proba[predicted] {
                predicted = i;
            }
        }

        let class_names = self.bundle.class_names();
        let probabilities = ClassProbabilities(
            class_names.iter().cloned().zip(proba.iter().copied()).collect(),
        );

        let latency_ms = start.elapsed().as_secs_f64() * 1000.0;
        debug!(class = %class_names[predicted], latency_ms, "Inference completed");

        Ok(PredictionResult {
            predicted_class_index: predicted,
            predicted_class_name: class_names[predicted].clone(),
            confidence: proba[predicted],
            class_probabilities: probabilities,
            latency_ms,
        })
    }

    /// Classify every item in order.
    ///
    /// Invalid or malformed items yield an [`ItemError`] in place and never
    /// abort their siblings. A classifier failure aborts the whole batch since
    /// it points at the model, not the input.
    pub fn predict_batch(&self, items: &[BatchItem]) -> Result<BatchResult, PredictionError> {
        let mut results = Vec::with_capacity(items.len());

        for item in items {
            let outcome = match item {
                BatchItem::Malformed(reason) => BatchOutcome::Error(ItemError::new(reason.clone())),
                BatchItem::Features(features) => match self.predict(features) {
                    Ok(result) => BatchOutcome::Prediction(result),
                    Err(EngineError::Validation(err)) => BatchOutcome::Error(err.into()),
                    Err(EngineError::Prediction(err)) => return Err(err),
                },
            };
            results.push(outcome);
        }

        Ok(BatchResult {
            count: results.len(),
            results,
        })
    }

    /// Run the canary vector through the full prediction path
    pub fn canary(&self) -> Result<(), EngineError> {
        self.predict(&CANARY_FEATURES).map(|_| ())
    }
}

/// Check the classifier output and rescale it to sum to one
fn normalise(mut proba: Vec<f64>, n_classes: usize) -> Result<Vec<f64>, PredictionError> {
    if proba.len() != n_classes {
        return Err(PredictionError::OutputShape {
            expected: n_classes,
            got: proba.len(),
        });
    }
    if let Some(index) = proba.iter().position(|p| !p.is_finite()) {
        return Err(PredictionError::NonFiniteOutput { index });
    }
    if let Some(index) = proba.iter().position(|p| *p < 0.0) {
        return Err(PredictionError::Classifier(format!(
            "negative probability for class {}",
            index
        )));
    }

    let total: f64 = proba.iter().sum();
    if total <= 0.0 {
        return Err(PredictionError::Degenerate { total });
    }
    proba.iter_mut().for_each(|p| *p /= total);
    Ok(proba)
}
