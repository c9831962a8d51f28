//! Library for serving a pre-trained classifier
//!
//! This crate provides the core functionality for:
//! - Loading and validating immutable model bundles
//! - Single and batch inference with partial-failure semantics
//! - Liveness and canary-based readiness checks
//! - Prometheus metrics and structured logging

pub mod bundle;
pub mod classifier;
pub mod engine;
pub mod error;
pub mod health;
pub mod loader;
pub mod observability;

pub use bundle::{BundleMetadata, ModelBundle, FEATURE_DIMENSION};
pub use engine::{
    BatchItem, BatchOutcome, BatchResult, ClassProbabilities, PredictionEngine, PredictionResult,
    CANARY_FEATURES,
};
pub use error::{EngineError, ItemError, LoadError, NotReadyError, PredictionError, ValidationError};
pub use health::{HealthRegistry, HealthResponse, ReadinessResponse, ReadinessStatus};
pub use loader::{BundleSource, ModelLoader};
pub use observability::{ErrorKind, InFlightGuard, ServingMetrics, StructuredLogger};
