//! Health check infrastructure for the model server
//!
//! Liveness and readiness are independent: liveness only says the process is
//! serving HTTP, readiness runs a canary prediction through the attached
//! engine on every probe. At most one canary runs at a time, so a stuck
//! classifier holds a single blocking thread instead of one per probe.

use crate::engine::PredictionEngine;
use crate::error::NotReadyError;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{RwLock, Semaphore};
use tracing::debug;

/// Upper bound for one canary prediction
pub const CANARY_TIMEOUT: Duration = Duration::from_millis(500);

/// Liveness status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LivenessStatus {
    Healthy,
}

/// Readiness status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadinessStatus {
    Ready,
    NotReady,
}

/// Liveness response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: LivenessStatus,
    pub timestamp: String,
}

/// Readiness response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadinessResponse {
    pub status: ReadinessStatus,
    pub model_loaded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: String,
}

impl ReadinessResponse {
    pub fn is_ready(&self) -> bool {
        self.status == ReadinessStatus::Ready
    }
}

fn now() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// Health registry for liveness and readiness probes
#[derive(Debug, Clone)]
pub struct HealthRegistry {
    engine: Arc<RwLock<Option<PredictionEngine>>>,
    canary_slot: Arc<Semaphore>,
    canary_timeout: Duration,
}

impl Default for HealthRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl HealthRegistry {
    pub fn new() -> Self {
        Self {
            engine: Arc::new(RwLock::new(None)),
            canary_slot: Arc::new(Semaphore::new(1)),
            canary_timeout: CANARY_TIMEOUT,
        }
    }

    pub fn with_canary_timeout(mut self, timeout: Duration) -> Self {
        self.canary_timeout = timeout;
        self
    }

    /// Make readiness depend on `engine`; called once after a successful load
    pub async fn attach_engine(&self, engine: PredictionEngine) {
        let mut slot = self.engine.write().await;
        *slot = Some(engine);
    }

    pub async fn is_model_loaded(&self) -> bool {
        self.engine.read().await.is_some()
    }

    /// Liveness never depends on the model
    pub fn liveness(&self) -> HealthResponse {
        HealthResponse {
            status: LivenessStatus::Healthy,
            timestamp: now(),
        }
    }

    /// Run the canary prediction on the blocking pool, bounded by the canary timeout
    pub async fn check_readiness(&self) -> Result<(), NotReadyError> {
        let engine = self
            .engine
            .read()
            .await
            .clone()
            .ok_or(NotReadyError::ModelNotLoaded)?;

        // Held until the blocking task returns, even after a timeout
        let permit = self
            .canary_slot
            .clone()
            .try_acquire_owned()
            .map_err(|_| NotReadyError::CanaryInProgress)?;

        let canary = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            engine.canary()
        });

        match tokio::time::timeout(self.canary_timeout, canary).await {
            Err(_) => Err(NotReadyError::CanaryTimedOut(self.canary_timeout)),
            Ok(Err(join_err)) => {
                let reason = if join_err.is_panic() {
                    panic_message(join_err.into_panic().as_ref())
                } else {
                    "canary task cancelled".to_string()
                };
                Err(NotReadyError::CanaryPanicked(reason))
            }
            Ok(Ok(result)) => {
                result?;
                debug!("Canary prediction succeeded");
                Ok(())
            }
        }
    }

    /// Get readiness response
    pub async fn readiness(&self) -> ReadinessResponse {
        let model_loaded = self.is_model_loaded().await;

        match self.check_readiness().await {
            Ok(()) => ReadinessResponse {
                status: ReadinessStatus::Ready,
                model_loaded,
                error: None,
                timestamp: now(),
            },
            Err(err) => ReadinessResponse {
                status: ReadinessStatus::NotReady,
                model_loaded,
                error: Some(err.to_string()),
                timestamp: now(),
            },
        }
    }
}

/// Best-effort text of a panic payload
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
