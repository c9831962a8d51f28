//! Server configuration

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use serve_lib::loader::DEFAULT_MAX_BUNDLE_BYTES;
use serve_lib::BundleSource;
use std::net::{IpAddr, SocketAddr};

/// Environment variable prefix, e.g. `SERVE_MODEL_PATH`
pub const ENV_PREFIX: &str = "SERVE";

/// Log output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Json,
    Pretty,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Model bundle path or `file://` / `http(s)://` URI
    pub model_path: String,

    /// HTTP listen port
    pub port: u16,

    /// HTTP listen address
    #[serde(default = "default_host")]
    pub host: String,

    /// Expected SHA-256 of the bundle bytes
    #[serde(default)]
    pub model_sha256: Option<String>,

    /// Upper bound for the bundle size
    #[serde(default = "default_max_bundle_bytes")]
    pub max_bundle_bytes: usize,

    #[serde(default)]
    pub log_format: LogFormat,

    /// Instance name attached to structured log events
    #[serde(default = "default_instance_name")]
    pub instance_name: String,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_max_bundle_bytes() -> usize {
    DEFAULT_MAX_BUNDLE_BYTES
}

fn default_instance_name() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "model-server".to_string())
}

impl ServerConfig {
    /// Load configuration from `SERVE_*` environment variables
    pub fn load() -> Result<Self> {
        Self::from_environment(config::Environment::with_prefix(ENV_PREFIX))
    }

    /// Load configuration from an explicit environment source
    pub fn from_environment(env: config::Environment) -> Result<Self> {
        let config = config::Config::builder()
            .add_source(env)
            .build()
            .context("Failed to read configuration")?;

        let server: ServerConfig = config.try_deserialize().with_context(|| {
            format!(
                "Invalid configuration: {p}_MODEL_PATH and {p}_PORT are required",
                p = ENV_PREFIX
            )
        })?;

        server.validate()?;
        Ok(server)
    }

    fn validate(&self) -> Result<()> {
        if self.model_path.trim().is_empty() {
            bail!("{}_MODEL_PATH must not be empty", ENV_PREFIX);
        }
        if self.port == 0 {
            bail!("{}_PORT must be between 1 and 65535", ENV_PREFIX);
        }
        if self.max_bundle_bytes == 0 {
            bail!("{}_MAX_BUNDLE_BYTES must be positive", ENV_PREFIX);
        }
        if let Some(sha) = &self.model_sha256 {
            let sha = sha.trim();
            if sha.len() != 64 || !sha.chars().all(|c| c.is_ascii_hexdigit()) {
                bail!("{}_MODEL_SHA256 must be a 64-character hex digest", ENV_PREFIX);
            }
        }
        self.bundle_source()?;
        self.listen_addr()?;
        Ok(())
    }

    /// Parsed bundle location
    pub fn bundle_source(&self) -> Result<BundleSource> {
        self.model_path
            .parse()
            .with_context(|| format!("Invalid {}_MODEL_PATH", ENV_PREFIX))
    }

    /// Socket address to bind
    pub fn listen_addr(&self) -> Result<SocketAddr> {
        let ip: IpAddr = self
            .host
            .parse()
            .with_context(|| format!("Invalid {}_HOST: {}", ENV_PREFIX, self.host))?;
        Ok(SocketAddr::new(ip, self.port))
    }
}
