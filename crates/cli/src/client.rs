//! API client for the power plant prediction service

use anyhow::{Context, Result};
use reqwest::{Client, Response};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use tracing::debug;
use url::Url;

/// API client for the prediction service
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

        let base_url = Url::parse(base_url).context("Invalid API URL")?;

        Ok(Self { client, base_url })
    }

    /// Make a GET request
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self.base_url.join(path).context("Invalid path")?;
        debug!(url = %url, "GET");

        let response = self
            .client
            .get(url)
            .send()
            .await
            .context("Failed to send request")?;

        Self::parse(response).await
    }

    /// Make a POST request with JSON body
    pub async fn post<T: DeserializeOwned, B: Serialize>(&self, path: &str, body: &B) -> Result<T> {
        let url = self.base_url.join(path).context("Invalid path")?;
        debug!(url = %url, "POST");

        let response = self
            .client
            .post(url)
            .json(body)
            .send()
            .await
            .context("Failed to send request")?;

        Self::parse(response).await
    }

    /// GET a probe endpoint whose body is meaningful on 503 as well
    pub async fn probe<T: DeserializeOwned>(&self, path: &str) -> Result<(u16, T)> {
        let url = self.base_url.join(path).context("Invalid path")?;
        debug!(url = %url, "GET");

        let response = self
            .client
            .get(url)
            .send()
            .await
            .context("Failed to send request")?;

        let status = response.status().as_u16();
        let body = response.json().await.context("Failed to parse response")?;
        Ok((status, body))
    }

    async fn parse<T: DeserializeOwned>(response: Response) -> Result<T> {
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            match serde_json::from_str::<ErrorResponse>(&body) {
                Ok(err) => anyhow::bail!("API error ({}): {}", status, err),
                Err(_) => anyhow::bail!("API error ({}): {}", status, body),
            }
        }

        response.json().await.context("Failed to parse response")
    }

    pub async fn model_info(&self) -> Result<ModelInfo> {
        self.get("api/model_info").await
    }

    pub async fn predict(&self, request: &PredictRequest) -> Result<Prediction> {
        self.post("api/predict", request).await
    }

    pub async fn batch_predict(&self, records: Vec<Value>) -> Result<BatchResponse> {
        self.post("api/batch_predict", &BatchRequest { records }).await
    }
}

// API response types

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputRange {
    pub feature: String,
    pub min: f64,
    pub max: f64,
    pub unit: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlausibleBand {
    pub min: f64,
    pub max: f64,
}

/// Model introspection record, both `loaded` and `not_loaded` variants
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelInfo {
    pub status: String,
    #[serde(default)]
    pub feature_names: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size_bytes: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub loaded_at: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub n_estimators: Option<usize>,
    #[serde(default)]
    pub feature_importance: HashMap<String, f64>,
    #[serde(default)]
    pub calibrated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub calibration: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub calibration_error: Option<String>,
    #[serde(default)]
    pub input_ranges: Vec<InputRange>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plausible_band: Option<PlausibleBand>,
}

impl ModelInfo {
    pub fn is_loaded(&self) -> bool {
        self.status == "loaded"
    }

    /// Scaling mode chosen during calibration (`raw` / `standardized`)
    pub fn scaling(&self) -> Option<&str> {
        self.calibration.as_ref()?.get("policy")?.get("mode")?.as_str()
    }

    pub fn calibration_rule(&self) -> Option<&str> {
        self.calibration.as_ref()?.get("rule")?.as_str()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictRequest {
    pub temperature: f64,
    pub ambient_pressure: f64,
    pub relative_humidity: f64,
    pub exhaust_vacuum: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputValues {
    pub temperature: f64,
    pub ambient_pressure: f64,
    pub relative_humidity: f64,
    pub exhaust_vacuum: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Prediction {
    pub predicted_power: f64,
    pub input_values: InputValues,
    #[serde(default)]
    pub feature_importance: HashMap<String, f64>,
    #[serde(default)]
    pub out_of_range: bool,
    pub scaling: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchRequest {
    pub records: Vec<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchError {
    pub index: usize,
    pub error: String,
    pub kind: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BatchResult {
    Prediction(Prediction),
    Failed(BatchError),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchResponse {
    pub results: Vec<BatchResult>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    #[serde(default)]
    pub components: HashMap<String, ComponentHealth>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadinessResponse {
    pub ready: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}

impl std::fmt::Display for ErrorResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.kind {
            Some(kind) => write!(f, "{} [{}]", self.error, kind),
            None => f.write_str(&self.error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_model_info_loaded() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/api/model_info")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!({
                    "status": "loaded",
                    "model_type": "RandomForestRegressor",
                    "format": "tree-ensemble-json",
                    "feature_names": ["Temperature", "AmbientPressure", "RelativeHumidity", "ExhaustVacuum"],
                    "n_estimators": 100,
                    "feature_importance": {"Temperature": 0.9},
                    "calibrated": true,
                    "calibration": {"policy": {"mode": "raw"}, "rule": "raw_in_band"}
                })
                .to_string(),
            )
            .create_async()
            .await;

        let client = ApiClient::new(&server.url()).unwrap();
        let info = client.model_info().await.unwrap();

        mock.assert_async().await;
        assert!(info.is_loaded());
        assert_eq!(info.n_estimators, Some(100));
        assert_eq!(info.scaling(), Some("raw"));
        assert_eq!(info.calibration_rule(), Some("raw_in_band"));
    }

    #[tokio::test]
    async fn test_model_info_not_loaded() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/model_info")
            .with_status(200)
            .with_body(
                json!({
                    "status": "not_loaded",
                    "message": "model artifact not found: /opt/rf.json",
                    "feature_names": ["Temperature", "AmbientPressure", "RelativeHumidity", "ExhaustVacuum"]
                })
                .to_string(),
            )
            .create_async()
            .await;

        let client = ApiClient::new(&server.url()).unwrap();
        let info = client.model_info().await.unwrap();

        assert!(!info.is_loaded());
        assert!(info.message.as_ref().unwrap().contains("not found"));
        assert_eq!(info.scaling(), None);
    }

    #[tokio::test]
    async fn test_predict_error_surfaces_kind() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/api/predict")
            .with_status(503)
            .with_body(json!({"error": "model not ready: no model", "kind": "model_not_ready"}).to_string())
            .create_async()
            .await;

        let client = ApiClient::new(&server.url()).unwrap();
        let request = PredictRequest {
            temperature: 19.07,
            ambient_pressure: 1013.25,
            relative_humidity: 67.87,
            exhaust_vacuum: 54.30,
        };
        let err = client.predict(&request).await.unwrap_err();

        let message = err.to_string();
        assert!(message.contains("503"));
        assert!(message.contains("model_not_ready"));
    }

    #[tokio::test]
    async fn test_batch_results_mix_predictions_and_errors() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/api/batch_predict")
            .with_status(200)
            .with_body(
                json!({"results": [
                    {
                        "predicted_power": 457.5,
                        "input_values": {"temperature": 19.07, "ambient_pressure": 1013.25,
                                         "relative_humidity": 67.87, "exhaust_vacuum": 54.3},
                        "feature_importance": {},
                        "out_of_range": false,
                        "scaling": "raw"
                    },
                    {"index": 1, "error": "invalid input for 'temperature': 'x' is not a number", "kind": "invalid_input"}
                ]})
                .to_string(),
            )
            .create_async()
            .await;

        let client = ApiClient::new(&server.url()).unwrap();
        let response = client
            .batch_predict(vec![json!({"temperature": 19.07}), json!({"temperature": "x"})])
            .await
            .unwrap();

        assert_eq!(response.results.len(), 2);
        assert!(matches!(response.results[0], BatchResult::Prediction(_)));
        match &response.results[1] {
            BatchResult::Failed(err) => assert_eq!(err.kind, "invalid_input"),
            other => panic!("expected failure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_probe_keeps_body_on_503() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/readyz")
            .with_status(503)
            .with_body(json!({"ready": false, "reason": "Model not serving predictions"}).to_string())
            .create_async()
            .await;

        let client = ApiClient::new(&server.url()).unwrap();
        let (status, readiness): (u16, ReadinessResponse) = client.probe("readyz").await.unwrap();

        assert_eq!(status, 503);
        assert!(!readiness.ready);
    }
}
