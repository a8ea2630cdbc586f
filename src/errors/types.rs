//! # Error Types
//!
//! Error types for the meshcheck analyzer using `thiserror`.

use crate::domain::PrecedenceTier;

/// Custom result type for meshcheck operations
pub type Result<T> = std::result::Result<T, MeshcheckError>;

/// Main error type for the meshcheck analyzer
#[derive(thiserror::Error, Debug)]
pub enum MeshcheckError {
    /// Configuration errors
    #[error("Configuration error: {message}")]
    Config {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// I/O errors with additional context
    #[error("I/O error: {context}")]
    Io {
        #[source]
        source: std::io::Error,
        context: String,
    },

    /// Serialization/deserialization errors
    #[error("Serialization error: {context}")]
    Serialization {
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
        context: String,
    },

    /// Validation errors
    #[error("Validation error: {message}")]
    Validation {
        message: String,
        field: Option<String>,
    },

    /// A manifest document of a supported kind that does not decode
    #[error("Invalid {kind} {object}: {reason}")]
    InvalidObject { kind: String, object: String, reason: String },

    /// A host that cannot be normalized
    #[error("Invalid host '{host}': {reason}")]
    InvalidHost { host: String, reason: String },

    /// More than one MeshPolicy, or one not named after the mesh-wide default
    #[error("MeshPolicy configuration error: {message}")]
    MeshPolicyConfiguration {
        message: String,
        policies: Vec<String>,
    },

    /// Several destination rules claim the same specificity tier for one host
    #[error("Conflicting destination rules for '{host}' at {tier} tier: {}", rules.join(", "))]
    DestinationRuleConflict {
        host: String,
        tier: PrecedenceTier,
        rules: Vec<String>,
    },

    /// The object source could not list a resource kind
    #[error("Failed to list {resource}: {message}")]
    Fetch { resource: String, message: String },

    /// Internal errors
    #[error("Internal error: {message}")]
    Internal {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl MeshcheckError {
    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config { message: message.into(), source: None }
    }

    /// Create a configuration error with source
    pub fn config_with_source<S: Into<String>>(
        message: S,
        source: Box<dyn std::error::Error + Send + Sync>,
    ) -> Self {
        Self::Config { message: message.into(), source: Some(source) }
    }

    /// Create a validation error
    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::Validation { message: message.into(), field: None }
    }

    /// Create a validation error with field information
    pub fn validation_field<S: Into<String>, F: Into<String>>(message: S, field: F) -> Self {
        Self::Validation { message: message.into(), field: Some(field.into()) }
    }

    /// Create an undecodable object error
    pub fn invalid_object<K, O, R>(kind: K, object: O, reason: R) -> Self
    where
        K: Into<String>,
        O: Into<String>,
        R: Into<String>,
    {
        Self::InvalidObject { kind: kind.into(), object: object.into(), reason: reason.into() }
    }

    /// Create an invalid host error
    pub fn invalid_host<H: Into<String>, R: Into<String>>(host: H, reason: R) -> Self {
        Self::InvalidHost { host: host.into(), reason: reason.into() }
    }

    /// Create a mesh policy configuration error
    pub fn mesh_policy<S: Into<String>>(message: S, policies: Vec<String>) -> Self {
        Self::MeshPolicyConfiguration { message: message.into(), policies }
    }

    /// Create an upstream listing failure
    pub fn fetch<R: Into<String>, M: Into<String>>(resource: R, message: M) -> Self {
        Self::Fetch { resource: resource.into(), message: message.into() }
    }

    /// Create an internal error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal { message: message.into(), source: None }
    }

    /// Wrap a decode failure with context
    pub fn serialization<C, E>(context: C, source: E) -> Self
    where
        C: Into<String>,
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Serialization { source: Box::new(source), context: context.into() }
    }

    /// Add context to an error
    pub(crate) fn add_context(&mut self, context: String) {
        match self {
            MeshcheckError::Io { context: ref mut ctx, .. }
            | MeshcheckError::Serialization { context: ref mut ctx, .. } => {
                *ctx = format!("{}: {}", context, ctx);
            }
            _ => {}
        }
    }

    /// Whether the failure only concerns a single record, which the pass skips
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            MeshcheckError::InvalidHost { .. }
                | MeshcheckError::InvalidObject { .. }
                | MeshcheckError::MeshPolicyConfiguration { .. }
                | MeshcheckError::DestinationRuleConflict { .. }
        )
    }
}

impl From<std::io::Error> for MeshcheckError {
    fn from(error: std::io::Error) -> Self {
        Self::Io { source: error, context: "I/O operation failed".to_string() }
    }
}

impl From<serde_json::Error> for MeshcheckError {
    fn from(error: serde_json::Error) -> Self {
        Self::serialization("JSON serialization failed", error)
    }
}

impl From<serde_yaml::Error> for MeshcheckError {
    fn from(error: serde_yaml::Error) -> Self {
        Self::serialization("YAML decoding failed", error)
    }
}

impl From<config::ConfigError> for MeshcheckError {
    fn from(error: config::ConfigError) -> Self {
        Self::config_with_source("Configuration loading failed", Box::new(error))
    }
}

impl From<validator::ValidationErrors> for MeshcheckError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let message = errors
            .field_errors()
            .iter()
            .map(|(field, field_errors)| {
                let error_messages: Vec<String> = field_errors
                    .iter()
                    .map(|e| e.message.as_ref().map_or("Invalid value".to_string(), |m| m.to_string()))
                    .collect();
                format!("{}: {}", field, error_messages.join(", "))
            })
            .collect::<Vec<_>>()
            .join("; ");

        Self::validation(format!("Validation failed: {}", message))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let error = MeshcheckError::config("Test configuration error");
        assert!(matches!(error, MeshcheckError::Config { .. }));
        assert_eq!(error.to_string(), "Configuration error: Test configuration error");
    }

    #[test]
    fn test_validation_error() {
        let error = MeshcheckError::validation_field("must not be empty", "cluster_domain");
        if let MeshcheckError::Validation { field, .. } = error {
            assert_eq!(field, Some("cluster_domain".to_string()));
        } else {
            panic!("expected validation error");
        }
    }

    #[test]
    fn test_destination_rule_conflict_display() {
        let error = MeshcheckError::DestinationRuleConflict {
            host: "reviews.bookinfo.svc.cluster.local".to_string(),
            tier: PrecedenceTier::Port,
            rules: vec!["dr-a.bookinfo".to_string(), "dr-b.bookinfo".to_string()],
        };
        assert_eq!(
            error.to_string(),
            "Conflicting destination rules for 'reviews.bookinfo.svc.cluster.local' at port tier: dr-a.bookinfo, dr-b.bookinfo"
        );
    }

    #[test]
    fn test_recoverable_errors() {
        assert!(MeshcheckError::invalid_host("", "empty").is_recoverable());
        assert!(MeshcheckError::invalid_object("Pod", "p.ns", "bad probe").is_recoverable());
        assert!(MeshcheckError::mesh_policy("two mesh policies", vec![]).is_recoverable());
        assert!(!MeshcheckError::fetch("pods", "forbidden").is_recoverable());
        assert!(!MeshcheckError::internal("boom").is_recoverable());
    }

    #[test]
    fn test_error_conversions() {
        let io_error = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let error: MeshcheckError = io_error.into();
        assert!(matches!(error, MeshcheckError::Io { .. }));

        let yaml_error = serde_yaml::from_str::<Vec<u32>>("{ not: a list").unwrap_err();
        let error: MeshcheckError = yaml_error.into();
        assert!(matches!(error, MeshcheckError::Serialization { .. }));
    }

    #[test]
    fn test_add_context() {
        let mut error: MeshcheckError =
            std::io::Error::new(std::io::ErrorKind::NotFound, "missing").into();
        error.add_context("reading manifests".to_string());
        assert_eq!(error.to_string(), "I/O error: reading manifests: I/O operation failed");
    }

    #[test]
    fn test_tier_ordering() {
        assert!(PrecedenceTier::Port < PrecedenceTier::Name);
        assert!(PrecedenceTier::Namespace < PrecedenceTier::Mesh);
        assert_eq!(PrecedenceTier::Namespace.to_string(), "namespace");
    }
}
