//! Model server - serves a pre-trained classifier over HTTP
//!
//! Loads one immutable model bundle at startup and exposes inference,
//! health probes and Prometheus metrics until SIGINT or SIGTERM.

use anyhow::{Context, Result};
use model_server::{
    api::{self, AppState},
    config::{LogFormat, ServerConfig},
    SERVICE_VERSION,
};
use serve_lib::{HealthRegistry, ModelLoader, PredictionEngine, ServingMetrics, StructuredLogger};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    match format {
        LogFormat::Json => registry.with(fmt::layer().json()).init(),
        LogFormat::Pretty => registry.with(fmt::layer().pretty()).init(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logging comes up before anything can fail
    let config = ServerConfig::load();
    init_tracing(config.as_ref().map(|c| c.log_format).unwrap_or_default());

    let config = config.inspect_err(|err| error!(error = %format!("{:#}", err), "Invalid configuration"))?;
    let logger = StructuredLogger::new(&config.instance_name);

    // Load the bundle; any failure here is fatal
    let source = config.bundle_source()?;
    let mut loader = ModelLoader::new().with_max_bytes(config.max_bundle_bytes);
    if let Some(sha256) = &config.model_sha256 {
        loader = loader.with_checksum(sha256.trim());
    }
    let bundle = loader
        .load(&source)
        .await
        .with_context(|| format!("Failed to load model bundle from {}", source))
        .inspect_err(|err| error!(error = %format!("{:#}", err), "Model load failed"))?;

    let metrics = ServingMetrics::new().context("Failed to register metrics")?;
    metrics.set_model_accuracy(bundle.accuracy());
    logger.log_model_loaded(
        &source.to_string(),
        &bundle.metadata().model,
        bundle.accuracy(),
        bundle.class_names(),
    );

    let engine = PredictionEngine::new(bundle);
    let health = HealthRegistry::new();
    health.attach_engine(engine.clone()).await;

    let state = Arc::new(AppState::new(engine, health, metrics, logger.clone()));
    let addr = config.listen_addr()?;
    logger.log_startup(SERVICE_VERSION, &addr.to_string());

    api::serve(addr, state, shutdown_signal(logger)).await?;
    info!("Shutdown complete");

    Ok(())
}

/// Resolve on SIGINT or SIGTERM
async fn shutdown_signal(logger: StructuredLogger) {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(error = %err, "Failed to listen for SIGINT");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                error!(error = %err, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => logger.log_shutdown("SIGINT received"),
        _ = terminate => logger.log_shutdown("SIGTERM received"),
    }
}
