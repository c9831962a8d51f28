//! Model server - HTTP inference service for a pre-trained classifier

pub mod api;
pub mod config;

/// Service version reported by `/` and startup logs
pub const SERVICE_VERSION: &str = env!("CARGO_PKG_VERSION");
