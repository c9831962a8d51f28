//! HTTP API for inference, health probes and Prometheus metrics

use axum::{
    extract::{rejection::JsonRejection, Request, State},
    http::{header, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use serve_lib::health::panic_message;
use serve_lib::{
    BatchItem, BatchResult, EngineError, ErrorKind, HealthRegistry, PredictionEngine,
    PredictionError, PredictionResult, ServingMetrics, StructuredLogger,
};
use std::any::Any;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tower_http::{catch_panic::CatchPanicLayer, cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info, warn};

use crate::SERVICE_VERSION;

/// Shared application state
pub struct AppState {
    pub engine: PredictionEngine,
    pub health: HealthRegistry,
    pub metrics: ServingMetrics,
    pub logger: StructuredLogger,
    started_at: Instant,
}

impl AppState {
    pub fn new(
        engine: PredictionEngine,
        health: HealthRegistry,
        metrics: ServingMetrics,
        logger: StructuredLogger,
    ) -> Self {
        Self {
            engine,
            health,
            metrics,
            logger,
            started_at: Instant::now(),
        }
    }

    pub fn uptime_seconds(&self) -> f64 {
        self.started_at.elapsed().as_secs_f64()
    }
}

/// Request failure, mapped to a fixed status code and error-counter label
#[derive(Debug)]
pub enum ApiError {
    InvalidInput(String),
    Prediction(PredictionError),
    Batch(PredictionError),
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            ApiError::Prediction(_) | ApiError::Batch(_) | ApiError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            ApiError::InvalidInput(_) => ErrorKind::InvalidInput,
            ApiError::Prediction(_) => ErrorKind::PredictionError,
            ApiError::Batch(_) => ErrorKind::BatchError,
            ApiError::Internal(_) => ErrorKind::InternalError,
        }
    }

    fn message(&self) -> String {
        match self {
            ApiError::InvalidInput(msg) => msg.clone(),
            ApiError::Prediction(err) => format!("Prediction failed: {}", err),
            ApiError::Batch(err) => format!("Batch prediction failed: {}", err),
            ApiError::Internal(_) => "Internal server error".to_string(),
        }
    }
}

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::Validation(err) => ApiError::InvalidInput(err.to_string()),
            EngineError::Prediction(err) => ApiError::Prediction(err),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::InvalidInput(format!("Invalid request body: {}", rejection.body_text()))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        match &self {
            ApiError::InvalidInput(msg) => warn!(kind = self.kind().as_str(), "{}", msg),
            ApiError::Prediction(err) | ApiError::Batch(err) => {
                error!(kind = self.kind().as_str(), error = %err, "Inference failed")
            }
            ApiError::Internal(detail) => {
                error!(kind = self.kind().as_str(), detail = %detail, "Internal error")
            }
        }

        (status, Json(ErrorBody { error: self.message() })).into_response()
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

/// Body of `POST /predict`
#[derive(Debug, Deserialize)]
pub struct PredictRequest {
    pub features: Option<Vec<f64>>,
}

/// Body of `POST /batch-predict`; items are decoded one by one
#[derive(Debug, Deserialize)]
pub struct BatchPredictRequest {
    pub batch: Option<Vec<Value>>,
}

#[derive(Debug, Serialize)]
pub struct PredictResponse {
    #[serde(flatten)]
    pub result: PredictionResult,
    pub timestamp: String,
}

#[derive(Debug, Serialize)]
pub struct InfoResponse {
    pub model: String,
    pub dataset: String,
    pub accuracy: f64,
    pub classes: Vec<String>,
    pub features: Vec<String>,
    pub uptime_seconds: f64,
    pub version: String,
}

/// Service overview
async fn index(State(state): State<Arc<AppState>>) -> Json<Value> {
    let metadata = state.engine.bundle().metadata();

    Json(json!({
        "service": "Model Inference API",
        "version": SERVICE_VERSION,
        "model": metadata.model,
        "accuracy": format!("{:.2}%", metadata.accuracy * 100.0),
        "endpoints": {
            "health": "/health",
            "ready": "/ready",
            "info": "/info",
            "predict": "/predict",
            "batch_predict": "/batch-predict",
            "metrics": "/metrics",
        },
    }))
}

/// Liveness probe; never touches the model
async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.health.liveness())
}

/// Readiness probe - returns 200 if the canary succeeds, 503 otherwise
async fn ready(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let readiness = state.health.readiness().await;

    let status_code = if readiness.is_ready() {
        StatusCode::OK
    } else {
        if let Some(reason) = &readiness.error {
            state.logger.log_not_ready(reason);
        }
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(readiness))
}

/// Static bundle metadata
async fn info(State(state): State<Arc<AppState>>) -> Json<InfoResponse> {
    let metadata = state.engine.bundle().metadata();

    Json(InfoResponse {
        model: metadata.model.clone(),
        dataset: metadata.dataset.clone(),
        accuracy: metadata.accuracy,
        classes: metadata.class_names.clone(),
        features: metadata.feature_names.clone(),
        uptime_seconds: state.uptime_seconds(),
        version: metadata.version.clone(),
    })
}

/// Single prediction
async fn predict(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<PredictRequest>, JsonRejection>,
) -> Result<Json<PredictResponse>, ApiError> {
    handle_predict(&state, payload).inspect_err(|err| state.metrics.record_error(err.kind()))
}

fn handle_predict(
    state: &AppState,
    payload: Result<Json<PredictRequest>, JsonRejection>,
) -> Result<Json<PredictResponse>, ApiError> {
    let started = Instant::now();
    let Json(request) = payload?;
    let features = request
        .features
        .ok_or_else(|| ApiError::InvalidInput("Missing 'features' field".to_string()))?;

    let mut result = state.engine.predict(&features)?;

    state.metrics.observe_prediction_latency(result.latency_ms / 1000.0);
    state
        .metrics
        .record_prediction(state.engine.bundle().label(), &result.predicted_class_name);

    result.latency_ms = started.elapsed().as_secs_f64() * 1000.0;
    state
        .logger
        .log_prediction(&result.predicted_class_name, result.confidence, result.latency_ms);

    Ok(Json(PredictResponse {
        result,
        timestamp: chrono::Utc::now().to_rfc3339(),
    }))
}

/// Batch prediction with per-item errors
async fn batch_predict(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<BatchPredictRequest>, JsonRejection>,
) -> Result<Json<BatchResult>, ApiError> {
    handle_batch(&state, payload).inspect_err(|err| state.metrics.record_error(err.kind()))
}

fn handle_batch(
    state: &AppState,
    payload: Result<Json<BatchPredictRequest>, JsonRejection>,
) -> Result<Json<BatchResult>, ApiError> {
    let Json(request) = payload?;
    let batch = request
        .batch
        .ok_or_else(|| ApiError::InvalidInput("Missing 'batch' field".to_string()))?;

    let items: Vec<BatchItem> = batch.into_iter().map(decode_batch_item).collect();
    let result = state.engine.predict_batch(&items).map_err(ApiError::Batch)?;

    let model = state.engine.bundle().label();
    for prediction in result.results.iter().filter_map(|outcome| outcome.prediction()) {
        state
            .metrics
            .observe_prediction_latency(prediction.latency_ms / 1000.0);
        state
            .metrics
            .record_prediction(model, &prediction.predicted_class_name);
    }

    info!(count = result.count, "Batch prediction served");
    Ok(Json(result))
}

fn decode_batch_item(value: Value) -> BatchItem {
    match serde_json::from_value::<Vec<f64>>(value) {
        Ok(features) => BatchItem::Features(features),
        Err(_) => BatchItem::Malformed("Invalid features: expected an array of numbers".to_string()),
    }
}

/// Prometheus metrics endpoint
async fn metrics(State(state): State<Arc<AppState>>) -> Response {
    match state.metrics.encode() {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, state.metrics.content_type())],
            body,
        )
            .into_response(),
        Err(err) => {
            let err = ApiError::Internal(format!("{:#}", err));
            state.metrics.record_error(err.kind());
            err.into_response()
        }
    }
}

async fn not_found() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorBody {
            error: "Endpoint not found".to_string(),
        }),
    )
}

/// Hold an in-flight slot for the whole request
async fn track_in_flight(State(state): State<Arc<AppState>>, request: Request, next: Next) -> Response {
    let _guard = state.metrics.request_started();
    next.run(request).await
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    let panic_metrics = state.metrics.clone();
    let on_panic = move |payload: Box<dyn Any + Send + 'static>| -> Response {
        panic_metrics.record_error(ErrorKind::InternalError);
        ApiError::Internal(panic_message(payload.as_ref())).into_response()
    };

    Router::new()
        .route("/", get(index))
        .route("/health", get(health))
        .route("/ready", get(ready))
        .route("/info", get(info))
        .route("/predict", post(predict))
        .route("/batch-predict", post(batch_predict))
        .route("/metrics", get(metrics))
        .fallback(not_found)
        .layer(CatchPanicLayer::custom(on_panic))
        .layer(middleware::from_fn_with_state(state.clone(), track_in_flight))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the API server and run until `shutdown` resolves
pub async fn serve(
    addr: SocketAddr,
    state: Arc<AppState>,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let app = create_router(state);

    info!(addr = %addr, "Starting API server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    Ok(())
}
