//! # Observability Infrastructure
//!
//! Structured logging for the analyzer: subscriber initialisation and the span
//! macros used around each check.

pub mod logging;

pub use logging::{init_logging, log_config_info};
