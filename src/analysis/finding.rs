//! Findings and note rendering
//!
//! A [`Finding`] is a kind, a severity and a flat attribute map. Its identity is a
//! SHA-256 over the kind and the attributes, so two checks reporting the same thing
//! collapse to one. Rendering fills the kind's message template from the attributes.

use lazy_static::lazy_static;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;

lazy_static! {
    /// `${attribute}` placeholders in message templates
    static ref PLACEHOLDER_REGEX: Regex = Regex::new(r"\$\{([a-z_]+)\}").unwrap();
}

/// Finding severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Info => write!(f, "INFO"),
            Severity::Warning => write!(f, "WARNING"),
            Severity::Error => write!(f, "ERROR"),
        }
    }
}

impl std::str::FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "info" => Ok(Severity::Info),
            "warning" | "warn" => Ok(Severity::Warning),
            "error" => Ok(Severity::Error),
            other => Err(format!("unknown severity '{}'", other)),
        }
    }
}

/// What a finding reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FindingKind {
    VsRouteConflict,
    AuthnConflictNamespace,
    AuthnConflictService,
    AuthnConflictPort,
    MeshPolicyInvalid,
    DrConflict,
    MtlsPolicyMismatch,
    MtlsProbeConflict,
    MtlsProbesUnavailable,
    InvalidHost,
    InvalidObject,
}

impl FindingKind {
    /// Stable identifier, as serialized
    pub fn code(&self) -> &'static str {
        match self {
            FindingKind::VsRouteConflict => "vs-route-conflict",
            FindingKind::AuthnConflictNamespace => "authn-conflict-namespace",
            FindingKind::AuthnConflictService => "authn-conflict-service",
            FindingKind::AuthnConflictPort => "authn-conflict-port",
            FindingKind::MeshPolicyInvalid => "mesh-policy-invalid",
            FindingKind::DrConflict => "dr-conflict",
            FindingKind::MtlsPolicyMismatch => "mtls-policy-mismatch",
            FindingKind::MtlsProbeConflict => "mtls-probe-conflict",
            FindingKind::MtlsProbesUnavailable => "mtls-probes-unavailable",
            FindingKind::InvalidHost => "invalid-host",
            FindingKind::InvalidObject => "invalid-object",
        }
    }

    pub fn summary(&self) -> &'static str {
        match self {
            FindingKind::VsRouteConflict => "Conflicting VirtualService routes",
            FindingKind::AuthnConflictNamespace => "Conflicting namespace-wide authentication policies",
            FindingKind::AuthnConflictService => "Conflicting service-level authentication policies",
            FindingKind::AuthnConflictPort => "Conflicting port-level authentication policies",
            FindingKind::MeshPolicyInvalid => "Invalid MeshPolicy configuration",
            FindingKind::DrConflict => "Conflicting DestinationRule TLS settings",
            FindingKind::MtlsPolicyMismatch => "mTLS policy and DestinationRule disagree",
            FindingKind::MtlsProbeConflict => "Health probe incompatible with mTLS",
            FindingKind::MtlsProbesUnavailable => "mTLS probe check unavailable",
            FindingKind::InvalidHost => "Invalid host skipped",
            FindingKind::InvalidObject => "Undecodable object skipped",
        }
    }

    /// Message template with `${attribute}` placeholders
    pub fn template(&self) -> &'static str {
        match self {
            FindingKind::VsRouteConflict => {
                "VirtualServices ${vs_names} define routes ${routes} that can match the same \
                 request for host ${host} on gateway ${gateway}."
            }
            FindingKind::AuthnConflictNamespace => {
                "Authentication policies ${policy_names} in namespace ${namespace} all apply \
                 namespace-wide; only one may."
            }
            FindingKind::AuthnConflictService => {
                "Authentication policies ${policy_names} in namespace ${namespace} all target \
                 service ${target_service}; only one may."
            }
            FindingKind::AuthnConflictPort => {
                "Authentication policies ${policy_names} in namespace ${namespace} all target \
                 port ${target_port} of service ${target_service}; only one may."
            }
            FindingKind::MeshPolicyInvalid => {
                "MeshPolicy configuration is invalid (${policy_names}): ${reason}. \
                 Mesh-wide mTLS cannot be determined."
            }
            FindingKind::DrConflict => {
                "DestinationRules ${rule_names} all set client TLS for ${host} at the ${tier} \
                 tier; the effective TLS mode is undefined."
            }
            FindingKind::MtlsPolicyMismatch => {
                "Port ${port} of service ${service} in namespace ${namespace} has mTLS \
                 ${authn_state} but DestinationRules set client TLS mode ${tls_mode}."
            }
            FindingKind::MtlsProbeConflict => {
                "The ${probe} probe of container ${container} in pod ${pod} (namespace \
                 ${namespace}) targets port ${port} where mTLS is ${mtls_state}; the kubelet \
                 cannot present a mesh certificate, so the probe will fail."
            }
            FindingKind::MtlsProbesUnavailable => "mTLS health probe check skipped: ${reason}.",
            FindingKind::InvalidHost => {
                "${object} in namespace ${namespace} declares host '${host}' which cannot be \
                 normalized (${reason}); the object was skipped."
            }
            FindingKind::InvalidObject => {
                "${kind} ${object} could not be decoded (${reason}); it was left out of the analysis."
            }
        }
    }
}

impl fmt::Display for FindingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// One detected problem
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    pub kind: FindingKind,
    pub severity: Severity,
    pub attributes: BTreeMap<String, String>,
}

/// A finding rendered for display
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Note {
    pub id: String,
    pub kind: FindingKind,
    pub severity: Severity,
    pub summary: String,
    pub message: String,
    pub attributes: BTreeMap<String, String>,
}

impl Finding {
    pub fn new(kind: FindingKind, severity: Severity) -> Self {
        Self { kind, severity, attributes: BTreeMap::new() }
    }

    /// Add an attribute
    pub fn with_attr(mut self, key: impl Into<String>, value: impl fmt::Display) -> Self {
        self.attributes.insert(key.into(), value.to_string());
        self
    }

    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }

    /// Deterministic identity over kind and attributes; severity is not part of it.
    pub fn id(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.kind.code().as_bytes());
        for (key, value) in &self.attributes {
            hasher.update([0u8]);
            hasher.update(key.as_bytes());
            hasher.update([0u8]);
            hasher.update(value.as_bytes());
        }
        hex::encode(hasher.finalize())
    }

    /// Fill the kind's template; unknown placeholders are left as written.
    pub fn message(&self) -> String {
        PLACEHOLDER_REGEX
            .replace_all(self.kind.template(), |caps: &Captures<'_>| {
                self.attributes.get(&caps[1]).cloned().unwrap_or_else(|| caps[0].to_string())
            })
            .into_owned()
    }

    pub fn render(&self) -> Note {
        Note {
            id: self.id(),
            kind: self.kind,
            severity: self.severity,
            summary: self.kind.summary().to_string(),
            message: self.message(),
            attributes: self.attributes.clone(),
        }
    }

    /// Ordering used for presentation: kind, then attributes
    pub fn sort_key(&self) -> (FindingKind, &BTreeMap<String, String>) {
        (self.kind, &self.attributes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service_conflict() -> Finding {
        Finding::new(FindingKind::AuthnConflictService, Severity::Error)
            .with_attr("namespace", "bookinfo")
            .with_attr("policy_names", "A, B")
            .with_attr("target_service", "reviews")
    }

    #[test]
    fn renders_template_from_attributes() {
        assert_eq!(
            service_conflict().message(),
            "Authentication policies A, B in namespace bookinfo all target service reviews; only one may."
        );
    }

    #[test]
    fn missing_attributes_stay_as_placeholders() {
        let finding = Finding::new(FindingKind::MtlsProbesUnavailable, Severity::Info);
        assert_eq!(finding.message(), "mTLS health probe check skipped: ${reason}.");
    }

    #[test]
    fn identity_ignores_severity_and_insertion_order() {
        let a = service_conflict();
        let b = Finding::new(FindingKind::AuthnConflictService, Severity::Warning)
            .with_attr("target_service", "reviews")
            .with_attr("policy_names", "A, B")
            .with_attr("namespace", "bookinfo");
        assert_eq!(a.id(), b.id());
        assert_eq!(a.id().len(), 64);

        let other = service_conflict().with_attr("namespace", "other");
        assert_ne!(a.id(), other.id());
    }

    #[test]
    fn identity_separates_keys_from_values() {
        let a = Finding::new(FindingKind::InvalidHost, Severity::Warning).with_attr("ab", "c");
        let b = Finding::new(FindingKind::InvalidHost, Severity::Warning).with_attr("a", "bc");
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn severity_parsing_and_order() {
        assert_eq!("warn".parse::<Severity>().unwrap(), Severity::Warning);
        assert_eq!("ERROR".parse::<Severity>().unwrap(), Severity::Error);
        assert!("fatal".parse::<Severity>().is_err());
        assert!(Severity::Info < Severity::Warning && Severity::Warning < Severity::Error);
    }

    #[test]
    fn kind_codes_match_serialization() {
        for kind in [FindingKind::VsRouteConflict, FindingKind::MtlsProbesUnavailable, FindingKind::DrConflict] {
            let serialized = serde_json::to_string(&kind).unwrap();
            assert_eq!(serialized, format!("\"{}\"", kind.code()));
        }
    }

    #[test]
    fn rendered_note_carries_summary() {
        let note = service_conflict().render();
        assert_eq!(note.summary, "Conflicting service-level authentication policies");
        assert_eq!(note.id, service_conflict().id());
    }
}
