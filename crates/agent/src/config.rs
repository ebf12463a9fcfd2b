//! Agent configuration

use anyhow::{Context, Result};
use predictor_lib::artifact::DEFAULT_MODEL_FILE;
use predictor_lib::PredictorConfig;
use serde::Deserialize;
use std::path::PathBuf;

/// Agent configuration, read from `PREDICTOR_*` environment variables
#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
    /// Name attached to log events
    #[serde(default = "default_node_name")]
    pub node_name: String,

    /// Port for the prediction API and health/metrics endpoints
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    /// Model artifact path, relative to `base_dir` unless absolute
    #[serde(default = "default_model_path")]
    pub model_path: String,

    /// Directory relative artifact paths resolve against
    #[serde(default)]
    pub base_dir: Option<String>,
}

fn default_node_name() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "unknown".to_string())
}

fn default_api_port() -> u16 {
    8080
}

fn default_model_path() -> String {
    DEFAULT_MODEL_FILE.to_string()
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            node_name: default_node_name(),
            api_port: default_api_port(),
            model_path: default_model_path(),
            base_dir: None,
        }
    }
}

impl AgentConfig {
    /// Load configuration from the environment
    pub fn load() -> Result<Self> {
        Self::from_source(config::Environment::with_prefix("PREDICTOR").try_parsing(true))
    }

    fn from_source<S>(source: S) -> Result<Self>
    where
        S: config::Source + Send + Sync + 'static,
    {
        let config = config::Config::builder()
            .add_source(source)
            .build()
            .context("Failed to read configuration")?;

        config
            .try_deserialize()
            .context("Invalid PREDICTOR_* configuration")
    }

    pub fn predictor_config(&self) -> PredictorConfig {
        PredictorConfig {
            model_path: PathBuf::from(&self.model_path),
            base_dir: self.base_dir.as_ref().map(PathBuf::from),
            node_name: self.node_name.clone(),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn from_env(vars: &[(&str, &str)]) -> Result<AgentConfig> {
        let source: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AgentConfig::from_source(
            config::Environment::with_prefix("PREDICTOR")
                .try_parsing(true)
                .source(Some(source)),
        )
    }

    #[test]
    fn test_defaults_when_unset() {
        let config = from_env(&[]).unwrap();
        assert_eq!(config.api_port, 8080);
        assert_eq!(config.model_path, DEFAULT_MODEL_FILE);
        assert!(config.base_dir.is_none());
    }

    #[test]
    fn test_environment_overrides() {
        let config = from_env(&[
            ("PREDICTOR_API_PORT", "9000"),
            ("PREDICTOR_MODEL_PATH", "/models/ccpp.json"),
            ("PREDICTOR_BASE_DIR", "/opt/plant"),
            ("PREDICTOR_NODE_NAME", "unit-2"),
        ])
        .unwrap();

        assert_eq!(config.api_port, 9000);
        assert_eq!(config.node_name, "unit-2");

        let predictor = config.predictor_config();
        assert_eq!(predictor.model_path, PathBuf::from("/models/ccpp.json"));
        assert_eq!(predictor.base_dir, Some(PathBuf::from("/opt/plant")));
    }

    #[test]
    fn test_invalid_port_is_an_error() {
        assert!(from_env(&[("PREDICTOR_API_PORT", "not-a-port")]).is_err());
    }
}
