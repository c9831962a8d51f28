//! Classifier implementations behind the prediction engine

mod forest;

pub use forest::{DecisionTree, RandomForest, TreeNode};

use crate::error::PredictionError;

/// Trained classifier producing a class probability distribution.
///
/// Implementations must be immutable after construction: `predict_proba`
/// takes `&self` and is called concurrently from every request worker.
pub trait Classifier: Send + Sync + std::fmt::Debug {
    /// Input dimensionality
    fn n_features(&self) -> usize;

    /// Output cardinality
    fn n_classes(&self) -> usize;

    /// Raw class distribution for one sample, in class index order
    fn predict_proba(&self, features: &[f64]) -> Result<Vec<f64>, PredictionError>;

    /// Structural check run before the classifier may serve; a classifier
    /// that passes must never panic inside `predict_proba`
    fn validate(&self) -> Result<(), String> {
        Ok(())
    }
}
