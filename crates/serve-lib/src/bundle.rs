//! Immutable model bundle: a trained classifier plus its evaluation metadata

use crate::classifier::{Classifier, RandomForest};
use crate::error::LoadError;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Number of input features every bundle must accept
pub const FEATURE_DIMENSION: usize = 4;

/// Feature names assumed when a bundle does not carry its own
pub const DEFAULT_FEATURE_NAMES: [&str; FEATURE_DIMENSION] =
    ["sepal_length", "sepal_width", "petal_length", "petal_width"];

/// Serialized classifier, tagged by model family
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClassifierSpec {
    RandomForest(RandomForest),
}

impl ClassifierSpec {
    fn into_classifier(self) -> Result<Box<dyn Classifier>, LoadError> {
        match self {
            ClassifierSpec::RandomForest(forest) => Ok(Box::new(forest)),
        }
    }
}

/// On-disk bundle layout
#[derive(Debug, Deserialize)]
struct BundleFile {
    #[serde(default = "default_name")]
    name: String,
    #[serde(default = "default_model")]
    model: String,
    #[serde(default = "default_dataset")]
    dataset: String,
    #[serde(default = "default_version")]
    version: String,
    accuracy: f64,
    class_names: Vec<String>,
    #[serde(default = "default_feature_names")]
    feature_names: Vec<String>,
    classifier: ClassifierSpec,
}

fn default_name() -> String {
    "iris".to_string()
}

fn default_model() -> String {
    "Random Forest Classifier".to_string()
}

fn default_dataset() -> String {
    "Iris".to_string()
}

fn default_version() -> String {
    "1.0.0".to_string()
}

fn default_feature_names() -> Vec<String> {
    DEFAULT_FEATURE_NAMES.iter().map(|s| s.to_string()).collect()
}

/// Static description of a loaded bundle
#[derive(Debug, Clone, Serialize)]
pub struct BundleMetadata {
    /// Short label used for the `model` metrics label
    pub name: String,
    pub model: String,
    pub dataset: String,
    pub version: String,
    /// Offline evaluation accuracy in [0, 1]
    pub accuracy: f64,
    pub class_names: Vec<String>,
    pub feature_names: Vec<String>,
}

impl BundleMetadata {
    /// Metadata with default descriptive fields
    pub fn new(class_names: Vec<String>, accuracy: f64) -> Self {
        Self {
            name: default_name(),
            model: default_model(),
            dataset: default_dataset(),
            version: default_version(),
            accuracy,
            class_names,
            feature_names: default_feature_names(),
        }
    }
}

/// Trained classifier with metadata.
///
/// Built once at startup and never mutated; share it behind an `Arc`.
#[derive(Debug)]
pub struct ModelBundle {
    classifier: Box<dyn Classifier>,
    metadata: BundleMetadata,
}

impl ModelBundle {
    /// Assemble a bundle, rejecting any structural mismatch
    pub fn new(classifier: Box<dyn Classifier>, metadata: BundleMetadata) -> Result<Self, LoadError> {
        validate(classifier.as_ref(), &metadata)?;
        Ok(Self {
            classifier,
            metadata,
        })
    }

    /// Decode and validate a JSON bundle
    pub fn from_json(bytes: &[u8]) -> Result<Self, LoadError> {
        let file: BundleFile = serde_json::from_slice(bytes)?;
        let classifier = file.classifier.into_classifier()?;
        let metadata = BundleMetadata {
            name: file.name,
            model: file.model,
            dataset: file.dataset,
            version: file.version,
            accuracy: file.accuracy,
            class_names: file.class_names,
            feature_names: file.feature_names,
        };
        Self::new(classifier, metadata)
    }

    pub fn classifier(&self) -> &dyn Classifier {
        self.classifier.as_ref()
    }

    pub fn metadata(&self) -> &BundleMetadata {
        &self.metadata
    }

    pub fn accuracy(&self) -> f64 {
        self.metadata.accuracy
    }

    pub fn class_names(&self) -> &[String] {
        &self.metadata.class_names
    }

    pub fn feature_names(&self) -> &[String] {
        &self.metadata.feature_names
    }

    pub fn feature_dimension(&self) -> usize {
        self.classifier.n_features()
    }

    /// Label used for the `model` dimension of prediction metrics
    pub fn label(&self) -> &str {
        &self.metadata.name
    }
}

fn validate(classifier: &dyn Classifier, metadata: &BundleMetadata) -> Result<(), LoadError> {
    classifier.validate().map_err(LoadError::Invalid)?;

    if !metadata.accuracy.is_finite() || !(0.0..=1.0).contains(&metadata.accuracy) {
        return Err(LoadError::Invalid(format!(
            "accuracy {} is outside [0, 1]",
            metadata.accuracy
        )));
    }

    if metadata.class_names.is_empty() {
        return Err(LoadError::Invalid("class_names is empty".to_string()));
    }

    let unique: HashSet<&String> = metadata.class_names.iter().collect();
    if unique.len() != metadata.class_names.len() {
        return Err(LoadError::Invalid("class_names contains duplicates".to_string()));
    }

    if metadata.class_names.len() != classifier.n_classes() {
        return Err(LoadError::Invalid(format!(
            "bundle lists {} class names but the classifier outputs {} classes",
            metadata.class_names.len(),
            classifier.n_classes()
        )));
    }

    if classifier.n_features() != FEATURE_DIMENSION {
        return Err(LoadError::Invalid(format!(
            "classifier expects {} features, service requires {}",
            classifier.n_features(),
            FEATURE_DIMENSION
        )));
    }

    if metadata.feature_names.len() != FEATURE_DIMENSION {
        return Err(LoadError::Invalid(format!(
            "bundle lists {} feature names, expected {}",
            metadata.feature_names.len(),
            FEATURE_DIMENSION
        )));
    }

    Ok(())
}
