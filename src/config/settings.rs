//! # Configuration Settings
//!
//! Defines the configuration structure for the meshcheck analyzer.

use crate::domain::{is_valid_host_format, DEFAULT_CLUSTER_DOMAIN, MESH_GATEWAY};
use crate::errors::{MeshcheckError, Result};
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

/// Name Istio requires for the single MeshPolicy
pub const DEFAULT_MESH_POLICY_NAME: &str = "default";

/// Container name of the injected sidecar
pub const DEFAULT_SIDECAR_CONTAINER: &str = "istio-proxy";

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Analyzer configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct AnalyzerConfig {
    /// DNS suffix short service names expand with
    #[validate(custom(function = "validate_cluster_domain"))]
    pub cluster_domain: String,

    /// Gateway assumed for VirtualServices that name none
    #[validate(length(min = 1, message = "Default gateway cannot be empty"))]
    pub default_gateway: String,

    /// Name the single MeshPolicy must carry
    #[validate(length(min = 1, message = "Mesh policy name cannot be empty"))]
    pub mesh_policy_name: String,

    /// Container name identifying sidecar-injected pods
    #[validate(length(min = 1, message = "Sidecar container name cannot be empty"))]
    pub sidecar_container_name: String,

    /// Mesh-wide HTTP probe rewriting; exempts `httpGet` probes from the probe check
    pub rewrite_app_http_probes: bool,

    /// Log level (trace, debug, info, warn, error)
    #[validate(length(min = 1, message = "Log level cannot be empty"))]
    pub log_level: String,

    /// Enable JSON structured logging
    pub json_logging: bool,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            cluster_domain: DEFAULT_CLUSTER_DOMAIN.to_string(),
            default_gateway: MESH_GATEWAY.to_string(),
            mesh_policy_name: DEFAULT_MESH_POLICY_NAME.to_string(),
            sidecar_container_name: DEFAULT_SIDECAR_CONTAINER.to_string(),
            rewrite_app_http_probes: false,
            log_level: "info".to_string(),
            json_logging: false,
        }
    }
}

impl AnalyzerConfig {
    /// Validate the entire configuration
    pub fn validate(&self) -> Result<()> {
        Validate::validate(self).map_err(MeshcheckError::from)?;
        self.validate_custom()
    }

    fn validate_custom(&self) -> Result<()> {
        if !LOG_LEVELS.contains(&self.log_level.to_ascii_lowercase().as_str()) {
            return Err(MeshcheckError::validation_field(
                format!("Log level must be one of {}", LOG_LEVELS.join(", ")),
                "log_level",
            ));
        }
        Ok(())
    }
}

fn validate_cluster_domain(domain: &str) -> std::result::Result<(), ValidationError> {
    let trimmed = domain.trim_matches('.');
    if trimmed.is_empty() || !is_valid_host_format(trimmed) {
        let mut error = ValidationError::new("cluster_domain");
        error.message = Some("Cluster domain must be a DNS suffix such as svc.cluster.local".into());
        return Err(error);
    }
    Ok(())
}
