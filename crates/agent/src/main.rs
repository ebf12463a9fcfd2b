//! Power plant agent - serves power output predictions over HTTP
//!
//! Loads and calibrates the model artifact before binding the listener,
//! then answers prediction, model info, health and metrics requests.

use anyhow::{Context, Result};
use powerplant_agent::{api, config::AgentConfig};
use predictor_lib::{
    health::{components, HealthRegistry},
    observability::PredictorMetrics,
    Predictor,
};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const AGENT_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    let config = AgentConfig::load()?;
    info!(node_name = %config.node_name, api_port = config.api_port, "Agent configured");

    let predictor = Arc::new(Predictor::new(config.predictor_config()));
    let logger = predictor.logger().clone();
    logger.log_startup(
        AGENT_VERSION,
        &predictor.config().resolved_model_path().display().to_string(),
    );

    // Load failures are reported through model info and readiness, not fatal
    let loading = predictor.clone();
    let outcome = tokio::task::spawn_blocking(move || loading.load())
        .await
        .context("Model loading task panicked")?;
    match &outcome {
        Ok(summary) => info!(
            model_type = %summary.model_type,
            format = summary.format,
            scaling = summary.scaling.as_str(),
            "Predictor ready"
        ),
        Err(e) => info!(kind = e.kind(), "Predictor started without a serving model"),
    }

    let health_registry = HealthRegistry::new();
    health_registry.register(components::ARTIFACT).await;
    health_registry.register(components::CALIBRATION).await;
    health_registry.register(components::INFERENCE).await;
    health_registry
        .sync_model_state(&predictor.get_model_info())
        .await;

    let app_state = Arc::new(api::AppState::new(
        predictor,
        health_registry,
        PredictorMetrics::new(),
    ));

    api::serve(config.api_port, app_state, async {
        // A failed signal handler install falls through to shutdown
        let _ = tokio::signal::ctrl_c().await;
    })
    .await?;

    logger.log_shutdown("SIGINT received");
    Ok(())
}
