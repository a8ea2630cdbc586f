//! # Configuration Management
//!
//! Settings are layered, later sources winning:
//!
//! 1. built-in defaults
//! 2. an optional TOML file
//! 3. environment variables prefixed `MESHCHECK_`, e.g. `MESHCHECK_CLUSTER_DOMAIN`

pub mod settings;

use std::path::Path;

use config::{Config, Environment, File, FileFormat};
use tracing::debug;

use crate::errors::{MeshcheckError, Result};

pub use settings::{AnalyzerConfig, DEFAULT_MESH_POLICY_NAME, DEFAULT_SIDECAR_CONTAINER};

/// Environment variable prefix
pub const ENV_PREFIX: &str = "MESHCHECK";

impl AnalyzerConfig {
    /// Load and validate configuration from defaults, `path` and the environment
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder().add_source(Config::try_from(&AnalyzerConfig::default())?);

        if let Some(path) = path {
            if !path.exists() {
                return Err(MeshcheckError::config(format!(
                    "Configuration file not found: {}",
                    path.display()
                )));
            }
            builder = builder.add_source(File::from(path).format(FileFormat::Toml));
        }

        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX).prefix_separator("_").try_parsing(true),
        );

        let config: AnalyzerConfig = builder.build()?.try_deserialize()?;
        config.validate()?;

        debug!(
            cluster_domain = %config.cluster_domain,
            config_file = ?path.map(|p| p.display().to_string()),
            "Loaded analyzer configuration"
        );
        Ok(config)
    }

    /// Load configuration from environment variables only
    pub fn from_env() -> Result<Self> {
        Self::load(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::io::Write;
    use std::sync::Mutex;

    // Tests in this module mutate process environment
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    const VARS: [&str; 3] =
        ["MESHCHECK_CLUSTER_DOMAIN", "MESHCHECK_REWRITE_APP_HTTP_PROBES", "MESHCHECK_LOG_LEVEL"];

    fn clear_env() {
        for var in VARS {
            env::remove_var(var);
        }
    }

    #[test]
    fn test_config_from_env_defaults() {
        let _guard = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
        clear_env();

        let config = AnalyzerConfig::from_env().unwrap();
        assert_eq!(config, AnalyzerConfig::default());
    }

    #[test]
    fn test_config_from_env() {
        let _guard = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
        clear_env();
        env::set_var("MESHCHECK_CLUSTER_DOMAIN", "svc.corp.internal");
        env::set_var("MESHCHECK_REWRITE_APP_HTTP_PROBES", "true");

        let config = AnalyzerConfig::from_env();
        clear_env();

        let config = config.unwrap();
        assert_eq!(config.cluster_domain, "svc.corp.internal");
        assert!(config.rewrite_app_http_probes);
    }

    #[test]
    fn test_env_overrides_file() {
        let _guard = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
        clear_env();

        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "cluster_domain = \"svc.from.file\"\nlog_level = \"debug\"").unwrap();

        env::set_var("MESHCHECK_LOG_LEVEL", "warn");
        let config = AnalyzerConfig::load(Some(file.path()));
        clear_env();

        let config = config.unwrap();
        assert_eq!(config.cluster_domain, "svc.from.file");
        assert_eq!(config.log_level, "warn");
        assert_eq!(config.mesh_policy_name, "default");
    }

    #[test]
    fn test_invalid_file_values_are_rejected() {
        let _guard = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
        clear_env();

        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "sidecar_container_name = \"\"").unwrap();
        assert!(AnalyzerConfig::load(Some(file.path())).is_err());

        let missing = AnalyzerConfig::load(Some(Path::new("/nonexistent/meshcheck.toml")));
        assert!(matches!(missing, Err(MeshcheckError::Config { .. })));
    }
}
