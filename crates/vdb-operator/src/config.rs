//! Operator configuration
//!
//! Loaded from a YAML file mounted from a ConfigMap. Every field has a
//! default so the operator also runs without the file.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

/// Default location of the mounted configuration file
pub const DEFAULT_CONFIG_PATH: &str = "/config/config.yaml";

/// Main operator configuration structure
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct OperatorConfig {
    /// Reporting component on emitted events
    #[serde(rename = "controllerName")]
    pub controller_name: String,

    /// Delay used when an actor asks to be requeued right away
    #[serde(rename = "requeueNowSeconds")]
    pub requeue_now_seconds: u64,

    /// Backoff after a reconcile pass failed with an error
    #[serde(rename = "errorRequeueSeconds")]
    pub error_requeue_seconds: u64,

    /// Wait before retrying a revive while another cluster holds the lease
    #[serde(rename = "clusterLeaseWaitSeconds")]
    pub cluster_lease_wait_seconds: u64,

    /// Upper bound on probing a single pod while collecting pod facts
    #[serde(rename = "probeTimeoutSeconds")]
    pub probe_timeout_seconds: u64,

    /// Periodic resync of a VerticaDB whose last pass converged
    #[serde(rename = "resyncSeconds")]
    pub resync_seconds: u64,
}

impl Default for OperatorConfig {
    fn default() -> Self {
        Self {
            controller_name: "verticadb-operator".to_string(),
            requeue_now_seconds: 1,
            error_requeue_seconds: 30,
            cluster_lease_wait_seconds: 60,
            probe_timeout_seconds: 60,
            resync_seconds: 300,
        }
    }
}

impl OperatorConfig {
    pub fn requeue_now(&self) -> Duration {
        Duration::from_secs(self.requeue_now_seconds)
    }

    pub fn error_requeue(&self) -> Duration {
        Duration::from_secs(self.error_requeue_seconds)
    }

    pub fn cluster_lease_wait(&self) -> Duration {
        Duration::from_secs(self.cluster_lease_wait_seconds)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_seconds)
    }

    pub fn resync(&self) -> Duration {
        Duration::from_secs(self.resync_seconds)
    }

    /// Validate that configuration has required fields
    pub fn validate(&self) -> Result<()> {
        if self.controller_name.trim().is_empty() {
            return Err(Error::ConfigError(
                "controllerName must not be empty".to_string(),
            ));
        }
        if self.probe_timeout_seconds == 0 {
            return Err(Error::ConfigError(
                "probeTimeoutSeconds must be greater than zero".to_string(),
            ));
        }
        if self.resync_seconds == 0 {
            return Err(Error::ConfigError(
                "resyncSeconds must be greater than zero".to_string(),
            ));
        }
        if self.error_requeue_seconds == 0 {
            return Err(Error::ConfigError(
                "errorRequeueSeconds must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Parse configuration from YAML text
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Load configuration from mounted file
    pub fn from_mounted_file(config_path: &str) -> Result<Self> {
        let config_str = std::fs::read_to_string(config_path).map_err(|e| {
            Error::ConfigError(format!("Failed to read config file {config_path}: {e}"))
        })?;
        Self::from_yaml(&config_str)
    }

    /// Load from `config_path` if it exists, otherwise fall back to defaults.
    /// The result is validated either way.
    pub fn load_or_default(config_path: &str) -> Result<Self> {
        let config = if Path::new(config_path).exists() {
            info!(path = config_path, "Loading configuration from mounted file");
            Self::from_mounted_file(config_path)?
        } else {
            warn!(path = config_path, "Config file not found, using defaults");
            Self::default()
        };
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = OperatorConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.requeue_now(), Duration::from_secs(1));
        assert_eq!(config.cluster_lease_wait(), Duration::from_secs(60));
        assert_eq!(config.resync(), Duration::from_secs(300));
    }

    #[test]
    fn partial_yaml_keeps_defaults() {
        let config = OperatorConfig::from_yaml(
            r"
controllerName: vdb-test
clusterLeaseWaitSeconds: 300
",
        )
        .unwrap();
        assert_eq!(config.controller_name, "vdb-test");
        assert_eq!(config.cluster_lease_wait_seconds, 300);
        assert_eq!(config.error_requeue_seconds, 30);
        assert_eq!(config.probe_timeout_seconds, 60);
    }

    #[test]
    fn invalid_yaml_is_a_serialization_error() {
        let err = OperatorConfig::from_yaml("requeueNowSeconds: [1, 2]").unwrap_err();
        assert!(matches!(err, Error::SerializationError(_)));
    }

    #[test]
    fn validate_rejects_zero_probe_timeout() {
        let config = OperatorConfig {
            probe_timeout_seconds: 0,
            ..OperatorConfig::default()
        };
        assert!(matches!(config.validate(), Err(Error::ConfigError(_))));
    }

    #[test]
    fn validate_rejects_zero_resync() {
        let config = OperatorConfig::from_yaml("resyncSeconds: 0").unwrap();
        assert!(matches!(config.validate(), Err(Error::ConfigError(_))));
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let config = OperatorConfig::load_or_default("/nonexistent/vdb-operator/config.yaml")
            .unwrap();
        assert_eq!(config, OperatorConfig::default());
    }

    #[test]
    fn unreadable_file_is_a_config_error() {
        let err = OperatorConfig::from_mounted_file("/nonexistent/vdb-operator/config.yaml")
            .unwrap_err();
        assert!(matches!(err, Error::ConfigError(_)));
    }
}
