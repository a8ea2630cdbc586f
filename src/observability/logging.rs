//! # Structured Logging
//!
//! Subscriber setup and span macros. Logs go to stderr so report output on stdout
//! stays machine-readable.

use tracing_subscriber::EnvFilter;

use crate::config::AnalyzerConfig;
use crate::errors::{MeshcheckError, Result};

/// Create a tracing span for one check of an analysis pass.
///
/// ```rust,ignore
/// let span = analysis_span!("route-conflicts");
/// let span = analysis_span!("route-conflicts", objects = 12);
/// ```
#[macro_export]
macro_rules! analysis_span {
    ($vetter:expr) => {
        tracing::debug_span!("analysis", vetter = %$vetter)
    };
    ($vetter:expr, $($field:tt)*) => {
        tracing::debug_span!("analysis", vetter = %$vetter, $($field)*)
    };
}

/// Install the global subscriber.
///
/// `RUST_LOG` wins over the configured level; `verbose` raises the default to debug.
/// Returns without error when a subscriber is already installed.
pub fn init_logging(config: &AnalyzerConfig, verbose: bool) -> Result<()> {
    let default_level = if verbose { "debug" } else { config.log_level.as_str() };
    let filter = match std::env::var("RUST_LOG") {
        Ok(directives) if !directives.is_empty() => EnvFilter::try_new(directives),
        _ => EnvFilter::try_new(default_level),
    }
    .map_err(|e| MeshcheckError::config_with_source("Invalid log filter", Box::new(e)))?;

    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr);
    let installed = if config.json_logging {
        builder.json().try_init()
    } else {
        builder.with_target(false).try_init()
    };

    if installed.is_err() {
        // Subscriber already set elsewhere (e.g. integration tests); ignore.
    }
    Ok(())
}

/// Log configuration at startup
pub fn log_config_info(config: &AnalyzerConfig) {
    tracing::debug!(
        cluster_domain = %config.cluster_domain,
        default_gateway = %config.default_gateway,
        mesh_policy_name = %config.mesh_policy_name,
        sidecar_container = %config.sidecar_container_name,
        rewrite_app_http_probes = config.rewrite_app_http_probes,
        "meshcheck configuration"
    );
}
