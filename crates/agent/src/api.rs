//! HTTP API for predictions, health checks and Prometheus metrics

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use predictor_lib::{
    health::{ComponentStatus, HealthRegistry},
    observability::PredictorMetrics,
    BatchOutcome, InputRecord, Predictor, PredictorError,
};
use prometheus::{Encoder, TextEncoder};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{error, info};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub predictor: Arc<Predictor>,
    pub health_registry: HealthRegistry,
    pub metrics: PredictorMetrics,
}

impl AppState {
    pub fn new(
        predictor: Arc<Predictor>,
        health_registry: HealthRegistry,
        metrics: PredictorMetrics,
    ) -> Self {
        Self {
            predictor,
            health_registry,
            metrics,
        }
    }
}

/// JSON error body: `{"error": "...", "kind": "..."}`
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
    kind: &'static str,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
            kind: "invalid_input",
        }
    }

    fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
            kind: "internal",
        }
    }
}

impl From<PredictorError> for ApiError {
    fn from(err: PredictorError) -> Self {
        let status = match err {
            PredictorError::InvalidInput { .. } => StatusCode::BAD_REQUEST,
            PredictorError::ModelNotReady { .. }
            | PredictorError::InferenceUnavailable { .. }
            | PredictorError::ArtifactNotFound { .. }
            | PredictorError::ArtifactCorrupt { .. } => StatusCode::SERVICE_UNAVAILABLE,
        };
        Self {
            status,
            message: err.to_string(),
            kind: err.kind(),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::bad_request(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(json!({ "error": self.message, "kind": self.kind })),
        )
            .into_response()
    }
}

/// Batch request body
#[derive(Debug, Deserialize)]
pub struct BatchRequest {
    pub records: Vec<Value>,
}

/// Batch response body, one entry per request record
#[derive(Debug, Serialize)]
pub struct BatchResponse {
    pub results: Vec<BatchOutcome>,
}

async fn model_info(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.predictor.get_model_info())
}

async fn predict(
    State(state): State<Arc<AppState>>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(body) = body?;
    let record: InputRecord = serde_json::from_value(body)
        .map_err(|e| ApiError::bad_request(format!("invalid prediction record: {}", e)))?;

    let result = state.predictor.predict_record(&record)?;
    Ok(Json(result))
}

async fn batch_predict(
    State(state): State<Arc<AppState>>,
    body: Result<Json<BatchRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(request) = body?;

    let predictor = state.predictor.clone();
    let results = tokio::task::spawn_blocking(move || predictor.batch_predict_values(&request.records))
        .await
        .map_err(|e| {
            error!(error = %e, "Batch prediction task failed");
            ApiError::internal("batch prediction task failed")
        })?;

    Ok(Json(BatchResponse { results }))
}

/// Health check response - returns 200 if healthy, 503 if unhealthy
async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.health_registry.health().await;

    let status_code = match health.status {
        ComponentStatus::Healthy => StatusCode::OK,
        ComponentStatus::Degraded => StatusCode::OK, // Still answering model info
        ComponentStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(health))
}

/// Readiness check response - returns 200 if a calibrated model is serving
async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let readiness = state.health_registry.readiness().await;

    let status_code = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(readiness))
}

/// Prometheus metrics endpoint
async fn metrics() -> Result<impl IntoResponse, ApiError> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| ApiError::internal(format!("failed to encode metrics: {}", e)))?;

    Ok((
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        buffer,
    ))
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/model_info", get(model_info))
        .route("/api/predict", post(predict))
        .route("/api/batch_predict", post(batch_predict))
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .with_state(state)
}

/// Start the API server, returning once `shutdown` resolves
pub async fn serve<F>(port: u16, state: Arc<AppState>, shutdown: F) -> anyhow::Result<()>
where
    F: std::future::Future<Output = ()> + Send + 'static,
{
    let app = create_router(state);

    let addr = format!("0.0.0.0:{}", port);
    info!(addr = %addr, "Starting API server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    Ok(())
}
