// ABOUTME: YAML gateway configuration holding connector definitions and routing conditions
// ABOUTME: Validates id uniqueness and condition references before anything is bound

use crate::connector::ConnectorDefinition;
use crate::repository::StaticRepository;
use crate::routing::Condition;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse YAML configuration: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Top-level gateway configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Upper bound on waiting for the initial binds
    #[serde(default = "default_startup_timeout", with = "humantime_serde")]
    pub startup_timeout: Duration,

    #[serde(default)]
    pub connectors: Vec<ConnectorDefinition>,

    #[serde(default)]
    pub conditions: Vec<Condition>,
}

fn default_startup_timeout() -> Duration {
    Duration::from_secs(30)
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            startup_timeout: default_startup_timeout(),
            connectors: Vec::new(),
            conditions: Vec::new(),
        }
    }
}

impl GatewayConfig {
    /// Load configuration from a YAML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        debug!(path = %path.display(), "loading configuration");

        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;

        Self::from_yaml(&contents)
    }

    /// Parse and validate configuration from a YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let config: GatewayConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut ids = HashSet::new();
        for connector in &self.connectors {
            if connector.id.is_empty() {
                return Err(ConfigError::Invalid("connector with empty id".to_string()));
            }
            if !ids.insert(connector.id.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate connector id: {}",
                    connector.id
                )));
            }
        }

        for condition in &self.conditions {
            if !ids.contains(condition.connector_id.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "condition '{}' references unknown connector: {}",
                    condition.name, condition.connector_id
                )));
            }
        }

        info!(
            connectors = self.connectors.len(),
            conditions = self.conditions.len(),
            "configuration validated"
        );
        Ok(())
    }
}

impl StaticRepository {
    /// Serve definitions and conditions from a loaded configuration
    pub fn from_config(config: &GatewayConfig) -> Self {
        Self::new(config.connectors.clone(), config.conditions.clone())
    }
}
