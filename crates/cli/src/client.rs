//! API client for communicating with the model server

use anyhow::{Context, Result};
use reqwest::{Client, Response, StatusCode};
use serde::de::{DeserializeOwned, MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::fmt;
use url::Url;

/// API client for the model server
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: Url,
}

impl ApiClient {
    /// Create a new API client
    pub fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        // Joining relative paths keeps any base path only with a trailing slash
        let mut base_url = Url::parse(base_url).context("Invalid API URL")?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn url(&self, path: &str) -> Result<Url> {
        self.base_url.join(path).context("Invalid path")
    }

    /// Make a GET request
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let response = self
            .client
            .get(self.url(path)?)
            .send()
            .await
            .context("Failed to send request")?;

        decode(check_status(response).await?).await
    }

    /// Make a POST request with JSON body
    pub async fn post<T: DeserializeOwned, B: Serialize>(&self, path: &str, body: &B) -> Result<T> {
        let response = self
            .client
            .post(self.url(path)?)
            .json(body)
            .send()
            .await
            .context("Failed to send request")?;

        decode(check_status(response).await?).await
    }

    pub async fn health(&self) -> Result<HealthResponse> {
        self.get("health").await
    }

    /// Readiness; a 503 is an answer, not a failure
    pub async fn readiness(&self) -> Result<ReadinessResponse> {
        let response = self
            .client
            .get(self.url("ready")?)
            .send()
            .await
            .context("Failed to send request")?;

        if response.status() == StatusCode::SERVICE_UNAVAILABLE {
            return decode(response).await;
        }
        decode(check_status(response).await?).await
    }

    pub async fn info(&self) -> Result<InfoResponse> {
        self.get("info").await
    }

    pub async fn predict(&self, features: &[f64]) -> Result<Prediction> {
        self.post("predict", &PredictRequest { features }).await
    }

    pub async fn batch_predict(&self, batch: &[Value]) -> Result<BatchResponse> {
        self.post("batch-predict", &BatchRequest { batch }).await
    }

    /// Raw Prometheus exposition text
    pub async fn metrics(&self) -> Result<String> {
        let response = self
            .client
            .get(self.url("metrics")?)
            .send()
            .await
            .context("Failed to send request")?;

        check_status(response)
            .await?
            .text()
            .await
            .context("Failed to read response")
    }
}

async fn check_status(response: Response) -> Result<Response> {
    if response.status().is_success() {
        return Ok(response);
    }

    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorResponse>(&body)
        .map(|err| err.error)
        .unwrap_or(body);
    anyhow::bail!("API error ({}): {}", status, message)
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T> {
    response.json().await.context("Failed to parse response")
}

// API request and response types

#[derive(Debug, Serialize)]
struct PredictRequest<'a> {
    features: &'a [f64],
}

#[derive(Debug, Serialize)]
struct BatchRequest<'a> {
    batch: &'a [Value],
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadinessResponse {
    pub status: String,
    pub model_loaded: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: String,
}

impl ReadinessResponse {
    pub fn is_ready(&self) -> bool {
        self.status == "ready"
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InfoResponse {
    pub model: String,
    pub dataset: String,
    pub accuracy: f64,
    pub classes: Vec<String>,
    pub features: Vec<String>,
    pub uptime_seconds: f64,
    pub version: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Prediction {
    pub prediction: usize,
    pub class: String,
    pub probabilities: Probabilities,
    pub confidence: f64,
    pub processing_time_ms: f64,
    /// Only present on single predictions
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

/// Class probabilities in the order the server sent them (bundle class order)
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Probabilities(Vec<(String, f64)>);

impl Probabilities {
    pub fn get(&self, class: &str) -> Option<f64> {
        self.0.iter().find(|(name, _)| name == class).map(|(_, p)| *p)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.0.iter().map(|(name, p)| (name.as_str(), *p))
    }
}

impl Serialize for Probabilities {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (name, p) in &self.0 {
            map.serialize_entry(name, p)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Probabilities {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct ProbabilitiesVisitor;

        impl<'de> Visitor<'de> for ProbabilitiesVisitor {
            type Value = Probabilities;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of class name to probability")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut entries = Vec::with_capacity(access.size_hint().unwrap_or(0));
                while let Some((name, p)) = access.next_entry::<String, f64>()? {
                    entries.push((name, p));
                }
                Ok(Probabilities(entries))
            }
        }

        deserializer.deserialize_map(ProbabilitiesVisitor)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BatchEntry {
    Prediction(Prediction),
    Error { error: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchResponse {
    pub results: Vec<BatchEntry>,
    pub count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_base_url_gets_trailing_slash() {
        let client = ApiClient::new("http://localhost:8080/serving").unwrap();
        assert_eq!(client.base_url().as_str(), "http://localhost:8080/serving/");
        assert_eq!(
            client.url("predict").unwrap().as_str(),
            "http://localhost:8080/serving/predict"
        );
    }

    #[test]
    fn test_invalid_base_url() {
        assert!(ApiClient::new("not a url").is_err());
    }

    #[tokio::test]
    async fn test_predict_decodes_response() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/predict")
            .match_body(mockito::Matcher::Json(json!({"features": [5.1, 3.5, 1.4, 0.2]})))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!({
                    "prediction": 0,
                    "class": "setosa",
                    "probabilities": {"setosa": 1.0, "versicolor": 0.0, "virginica": 0.0},
                    "confidence": 1.0,
                    "processing_time_ms": 0.2,
                    "timestamp": "2024-01-01T00:00:00+00:00"
                })
                .to_string(),
            )
            .create_async()
            .await;

        let client = ApiClient::new(&server.url()).unwrap();
        let prediction = client.predict(&[5.1, 3.5, 1.4, 0.2]).await.unwrap();

        assert_eq!(prediction.class, "setosa");
        assert_eq!(prediction.probabilities.get("setosa"), Some(1.0));
        mock.assert_async().await;
    }

    #[test]
    fn test_probabilities_keep_server_order() {
        let body = r#"{"virginica":0.7,"setosa":0.2,"versicolor":0.1}"#;
        let probabilities: Probabilities = serde_json::from_str(body).unwrap();

        let order: Vec<&str> = probabilities.iter().map(|(name, _)| name).collect();
        assert_eq!(order, ["virginica", "setosa", "versicolor"]);
        assert_eq!(serde_json::to_string(&probabilities).unwrap(), body);
    }

    #[test]
    fn test_probabilities_inside_untagged_batch_entry() {
        let body = r#"{"prediction":1,"class":"setosa","probabilities":{"virginica":0.1,"setosa":0.9},"confidence":0.9,"processing_time_ms":0.1}"#;
        let entry: BatchEntry = serde_json::from_str(body).unwrap();

        match entry {
            BatchEntry::Prediction(p) => {
                let order: Vec<&str> = p.probabilities.iter().map(|(name, _)| name).collect();
                assert_eq!(order, ["virginica", "setosa"]);
            }
            BatchEntry::Error { .. } => panic!("expected a prediction"),
        }
    }

    #[tokio::test]
    async fn test_api_error_message_is_extracted() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/predict")
            .with_status(400)
            .with_header("content-type", "application/json")
            .with_body(r#"{"error":"Expected 4 features, got 2"}"#)
            .create_async()
            .await;

        let client = ApiClient::new(&server.url()).unwrap();
        let err = client.predict(&[1.0, 2.0]).await.unwrap_err();

        assert_eq!(
            err.to_string(),
            "API error (400 Bad Request): Expected 4 features, got 2"
        );
    }

    #[tokio::test]
    async fn test_not_ready_is_not_an_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/ready")
            .with_status(503)
            .with_header("content-type", "application/json")
            .with_body(
                json!({
                    "status": "not_ready",
                    "model_loaded": false,
                    "error": "model not loaded",
                    "timestamp": "2024-01-01T00:00:00+00:00"
                })
                .to_string(),
            )
            .create_async()
            .await;

        let client = ApiClient::new(&server.url()).unwrap();
        let readiness = client.readiness().await.unwrap();

        assert!(!readiness.is_ready());
        assert_eq!(readiness.error.as_deref(), Some("model not loaded"));
    }

    #[tokio::test]
    async fn test_batch_decodes_mixed_results() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/batch-predict")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!({
                    "results": [
                        {
                            "prediction": 2,
                            "class": "virginica",
                            "probabilities": {"setosa": 0.0, "versicolor": 0.2, "virginica": 0.8},
                            "confidence": 0.8,
                            "processing_time_ms": 0.1
                        },
                        {"error": "Invalid feature count: 2"}
                    ],
                    "count": 2
                })
                .to_string(),
            )
            .create_async()
            .await;

        let client = ApiClient::new(&server.url()).unwrap();
        let response = client
            .batch_predict(&[json!([6.7, 3.0, 5.2, 2.3]), json!([1.0, 2.0])])
            .await
            .unwrap();

        assert_eq!(response.count, 2);
        assert!(matches!(&response.results[0], BatchEntry::Prediction(p) if p.class == "virginica"));
        assert!(matches!(&response.results[1], BatchEntry::Error { error } if error.contains("2")));
    }

    #[tokio::test]
    async fn test_metrics_returns_raw_text() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/metrics")
            .with_status(200)
            .with_header("content-type", "text/plain; version=0.0.4")
            .with_body("ml_active_requests 1\n")
            .create_async()
            .await;

        let client = ApiClient::new(&server.url()).unwrap();
        assert_eq!(client.metrics().await.unwrap(), "ml_active_requests 1\n");
    }
}
