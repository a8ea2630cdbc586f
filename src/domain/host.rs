//! Host name normalization
//!
//! Expands bare service names to the fully-qualified cluster hostname so that
//! `reviews` declared in namespace `bookinfo` and
//! `reviews.bookinfo.svc.cluster.local` group together.

use lazy_static::lazy_static;
use regex::Regex;
use std::net::IpAddr;

use crate::errors::{MeshcheckError, Result};

/// Cluster-local DNS suffix used when none is configured
pub const DEFAULT_CLUSTER_DOMAIN: &str = "svc.cluster.local";

lazy_static! {
    /// A single DNS label: alphanumeric and hyphen, not starting or ending with a hyphen
    static ref DNS_LABEL_REGEX: Regex =
        Regex::new(r"^[a-zA-Z0-9]([a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?$").unwrap();
}

/// Expands short host names using a cluster domain suffix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostNormalizer {
    cluster_domain: String,
}

impl Default for HostNormalizer {
    fn default() -> Self {
        Self::new(DEFAULT_CLUSTER_DOMAIN)
    }
}

impl HostNormalizer {
    pub fn new(cluster_domain: impl Into<String>) -> Self {
        let cluster_domain: String = cluster_domain.into();
        Self { cluster_domain: cluster_domain.trim_matches('.').to_string() }
    }

    pub fn cluster_domain(&self) -> &str {
        &self.cluster_domain
    }

    /// Normalize `host` as declared in `namespace`.
    ///
    /// Wildcards, IP literals, names already under the cluster domain and dotted
    /// external names come back unchanged; a bare short name becomes
    /// `<host>.<namespace>.<cluster domain>`.
    pub fn normalize(&self, host: &str, namespace: &str) -> Result<String> {
        if host.is_empty() {
            return Err(MeshcheckError::invalid_host(host, "host cannot be empty"));
        }

        if host.starts_with('*') {
            return Ok(host.to_string());
        }

        if host.parse::<IpAddr>().is_ok() {
            return Ok(host.to_string());
        }

        if !is_valid_host_format(host) {
            return Err(MeshcheckError::invalid_host(host, "host is not a valid DNS name"));
        }

        if self.is_cluster_local(host) {
            return Ok(host.to_string());
        }

        if !host.contains('.') {
            if namespace.is_empty() {
                return Err(MeshcheckError::invalid_host(
                    host,
                    "short host name needs a namespace to expand",
                ));
            }
            return Ok(format!("{}.{}.{}", host, namespace, self.cluster_domain));
        }

        Ok(host.to_string())
    }

    /// FQDN of a service in this cluster
    pub fn service_fqdn(&self, name: &str, namespace: &str) -> String {
        format!("{}.{}.{}", name, namespace, self.cluster_domain)
    }

    /// Wildcard host covering every service of a namespace
    pub fn namespace_wildcard(&self, namespace: &str) -> String {
        format!("*.{}.{}", namespace, self.cluster_domain)
    }

    /// Whether a wildcard host covers every service in the mesh.
    ///
    /// `*` always does; `*.local` and `*.cluster.local` do for the default domain,
    /// i.e. any wildcard whose suffix is a trailing part of the cluster domain.
    pub fn is_mesh_wildcard(&self, host: &str) -> bool {
        if host == "*" {
            return true;
        }
        match host.strip_prefix("*.") {
            Some(suffix) => {
                !suffix.is_empty()
                    && (self.cluster_domain == suffix
                        || self.cluster_domain.ends_with(&format!(".{}", suffix)))
            }
            None => false,
        }
    }

    fn is_cluster_local(&self, host: &str) -> bool {
        host.ends_with(&format!(".{}", self.cluster_domain))
    }
}

/// Whether `host` is a syntactically valid DNS name
pub fn is_valid_host_format(host: &str) -> bool {
    let trimmed = host.strip_suffix('.').unwrap_or(host);
    if trimmed.is_empty() || trimmed.len() > 253 {
        return false;
    }
    trimmed.split('.').all(|label| DNS_LABEL_REGEX.is_match(label))
}
