//! Error taxonomy for bundle loading, inference and readiness probing

use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

/// Fatal, startup-only failure to produce a usable model bundle
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to read bundle from {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to fetch bundle from {url}: {reason}")]
    Fetch { url: String, reason: String },

    #[error("unsupported bundle source: {0}")]
    UnsupportedSource(String),

    #[error("bundle size {size} exceeds maximum {max} bytes")]
    TooLarge { size: usize, max: usize },

    #[error("bundle checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },

    #[error("malformed bundle: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("invalid bundle: {0}")]
    Invalid(String),
}

/// Per-request input rejection; no inference is performed
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("Expected {expected} features, got {got}")]
    FeatureCount { expected: usize, got: usize },

    #[error("Feature {index} is not a finite number")]
    NonFinite { index: usize },
}

/// Unexpected failure inside the classifier call
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PredictionError {
    #[error("classifier returned {got} probabilities for {expected} classes")]
    OutputShape { expected: usize, got: usize },

    #[error("classifier returned a non-finite probability for class {index}")]
    NonFiniteOutput { index: usize },

    #[error("classifier returned a degenerate distribution (total {total})")]
    Degenerate { total: f64 },

    #[error("classifier failure: {0}")]
    Classifier(String),
}

/// Anything [`crate::PredictionEngine::predict`] can fail with
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Prediction(#[from] PredictionError),
}

/// Failure scoped to one batch element; siblings are unaffected
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ItemError {
    #[serde(rename = "error")]
    pub message: String,
}

impl ItemError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<ValidationError> for ItemError {
    fn from(err: ValidationError) -> Self {
        match err {
            ValidationError::FeatureCount { got, .. } => {
                Self::new(format!("Invalid feature count: {}", got))
            }
            other => Self::new(other.to_string()),
        }
    }
}

/// Reason a readiness probe reports `not_ready`
#[derive(Debug, Clone, Error)]
pub enum NotReadyError {
    #[error("model not loaded")]
    ModelNotLoaded,

    #[error("canary prediction failed: {0}")]
    CanaryFailed(#[from] EngineError),

    #[error("canary prediction timed out after {0:?}")]
    CanaryTimedOut(Duration),

    #[error("canary prediction panicked: {0}")]
    CanaryPanicked(String),

    #[error("previous canary prediction still running")]
    CanaryInProgress,
}
