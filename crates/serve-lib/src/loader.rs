//! Model bundle loading
//!
//! Reads a bundle once at startup from a filesystem path, a `file://` URI or
//! an `http(s)://` URI, checks size and optional checksum, then decodes and
//! validates it. There are no retries: a bad bundle is a deploy-time error.

use crate::bundle::ModelBundle;
use crate::error::LoadError;
use sha2::{Digest, Sha256};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

/// Default upper bound for bundle size
pub const DEFAULT_MAX_BUNDLE_BYTES: usize = 16 * 1024 * 1024;

/// Timeout for fetching a remote bundle
const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Where a bundle is read from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BundleSource {
    File(PathBuf),
    Remote(Url),
}

impl FromStr for BundleSource {
    type Err = LoadError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(LoadError::UnsupportedSource("empty bundle location".to_string()));
        }

        // Single-letter schemes are Windows drive letters, not URIs
        match Url::parse(s) {
            Ok(url) if url.scheme().len() > 1 => match url.scheme() {
                "file" => url
                    .to_file_path()
                    .map(BundleSource::File)
                    .map_err(|_| LoadError::UnsupportedSource(s.to_string())),
                "http" | "https" => Ok(BundleSource::Remote(url)),
                _ => Err(LoadError::UnsupportedSource(s.to_string())),
            },
            _ => Ok(BundleSource::File(PathBuf::from(s))),
        }
    }
}

impl fmt::Display for BundleSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BundleSource::File(path) => write!(f, "{}", path.display()),
            BundleSource::Remote(url) => write!(f, "{}", url),
        }
    }
}

/// Loads and validates model bundles
#[derive(Debug, Clone)]
pub struct ModelLoader {
    max_bytes: usize,
    expected_sha256: Option<String>,
}

impl Default for ModelLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ModelLoader {
    pub fn new() -> Self {
        Self {
            max_bytes: DEFAULT_MAX_BUNDLE_BYTES,
            expected_sha256: None,
        }
    }

    pub fn with_max_bytes(mut self, max_bytes: usize) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    /// Require the bundle bytes to hash to `sha256` (hex, any case)
    pub fn with_checksum(mut self, sha256: impl Into<String>) -> Self {
        self.expected_sha256 = Some(sha256.into().trim().to_ascii_lowercase());
        self
    }

    /// Read, verify and decode a bundle
    pub async fn load(&self, source: &BundleSource) -> Result<ModelBundle, LoadError> {
        info!(source = %source, "Loading model bundle");

        let bytes = match source {
            BundleSource::File(path) => self.read_file(path).await?,
            BundleSource::Remote(url) => self.fetch(url).await?,
        };

        let bundle = self.load_bytes(&bytes)?;
        debug!(source = %source, size = bytes.len(), "Model bundle decoded");
        Ok(bundle)
    }

    /// Verify and decode bundle bytes already in memory
    pub fn load_bytes(&self, bytes: &[u8]) -> Result<ModelBundle, LoadError> {
        self.check_size(bytes.len())?;

        if let Some(expected) = &self.expected_sha256 {
            let actual = compute_checksum(bytes);
            if &actual != expected {
                return Err(LoadError::ChecksumMismatch {
                    expected: expected.clone(),
                    actual,
                });
            }
            debug!(checksum = %actual, "Bundle checksum validated");
        }

        ModelBundle::from_json(bytes)
    }

    fn check_size(&self, size: usize) -> Result<(), LoadError> {
        if size > self.max_bytes {
            return Err(LoadError::TooLarge {
                size,
                max: self.max_bytes,
            });
        }
        Ok(())
    }

    async fn read_file(&self, path: &Path) -> Result<Vec<u8>, LoadError> {
        let io_err = |source| LoadError::Io {
            path: path.display().to_string(),
            source,
        };

        let meta = tokio::fs::metadata(path).await.map_err(io_err)?;
        self.check_size(meta.len() as usize)?;
        tokio::fs::read(path).await.map_err(io_err)
    }

    async fn fetch(&self, url: &Url) -> Result<Vec<u8>, LoadError> {
        let fetch_err = |reason: String| LoadError::Fetch {
            url: url.to_string(),
            reason,
        };

        let client = reqwest::Client::builder()
            .timeout(FETCH_TIMEOUT)
            .build()
            .map_err(|e| fetch_err(e.to_string()))?;

        let mut response = client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| fetch_err(e.to_string()))?;

        if !response.status().is_success() {
            return Err(fetch_err(format!("HTTP {}", response.status())));
        }

        if let Some(len) = response.content_length() {
            self.check_size(len as usize)?;
        }

        // Content-Length may be absent or wrong; enforce the cap while streaming
        let mut body = Vec::new();
        while let Some(chunk) = response.chunk().await.map_err(|e| fetch_err(e.to_string()))? {
            body.extend_from_slice(&chunk);
            self.check_size(body.len())?;
        }
        Ok(body)
    }
}

/// Lowercase hex SHA-256 of `data`
pub fn compute_checksum(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}
