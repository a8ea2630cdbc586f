//! Authentication policy domain types
//!
//! Istio `authentication.istio.io/v1alpha1` `Policy` (namespaced) and `MeshPolicy`
//! (cluster-scoped). Both share one spec: optional service targets and the peer
//! authentication methods that decide whether callers must present a certificate.

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeSet;
use std::fmt;

use super::id::ObjectMeta;

/// Namespaced authentication policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthenticationPolicy {
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: PolicySpec,
}

/// Cluster-scoped authentication policy; only one named `default` may exist.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeshPolicy {
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: PolicySpec,
}

/// Spec shared by `Policy` and `MeshPolicy`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PolicySpec {
    /// Services the policy applies to; empty means the whole namespace
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub targets: Vec<TargetSelector>,

    /// Peer authentication methods
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub peers: Vec<PeerMethod>,
}

/// Service (and optionally ports) a policy targets
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetSelector {
    /// Short service name, in the policy's namespace
    pub name: String,

    /// Ports the policy is limited to; empty means the whole service
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ports: Vec<PortSelector>,
}

/// Port selector; only numbered ports take part in precedence
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortSelector {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub number: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Mutual TLS mode of an `mtls` peer method
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MtlsMode {
    /// Only mutual TLS traffic is accepted
    Strict,
    /// Both plaintext and mutual TLS traffic are accepted
    Permissive,
    /// No mode given; treated as strict
    #[default]
    #[serde(skip)]
    Unspecified,
}

/// Peer authentication method.
///
/// `Mtls` is kept distinct from an absent entry even when it carries no settings:
/// `peers: [{mtls: }]` requests mutual TLS.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "PeerMethodFields", into = "PeerMethodFields")]
pub enum PeerMethod {
    Mtls { mode: MtlsMode },
    Jwt { issuer: Option<String> },
    /// A peer entry with no method set
    Empty,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct PeerMethodFields {
    #[serde(
        default,
        deserialize_with = "deserialize_present",
        skip_serializing_if = "Option::is_none"
    )]
    mtls: Option<Option<MutualTlsFields>>,
    #[serde(
        default,
        deserialize_with = "deserialize_present",
        skip_serializing_if = "Option::is_none"
    )]
    jwt: Option<Option<JwtFields>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct MutualTlsFields {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    mode: Option<MtlsMode>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct JwtFields {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    issuer: Option<String>,
}

/// Maps a present field to `Some`, keeping an explicit null as `Some(None)`.
fn deserialize_present<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

impl TryFrom<PeerMethodFields> for PeerMethod {
    type Error = String;

    fn try_from(fields: PeerMethodFields) -> Result<Self, Self::Error> {
        match (fields.mtls, fields.jwt) {
            (Some(_), Some(_)) => Err("peer method sets both mtls and jwt".to_string()),
            (Some(mtls), None) => Ok(PeerMethod::Mtls {
                mode: mtls.and_then(|m| m.mode).unwrap_or(MtlsMode::Unspecified),
            }),
            (None, Some(jwt)) => Ok(PeerMethod::Jwt { issuer: jwt.and_then(|j| j.issuer) }),
            (None, None) => Ok(PeerMethod::Empty),
        }
    }
}

impl From<PeerMethod> for PeerMethodFields {
    fn from(peer: PeerMethod) -> Self {
        match peer {
            PeerMethod::Mtls { mode } => Self {
                mtls: Some(Some(MutualTlsFields {
                    mode: (mode != MtlsMode::Unspecified).then_some(mode),
                })),
                jwt: None,
            },
            PeerMethod::Jwt { issuer } => Self { mtls: None, jwt: Some(Some(JwtFields { issuer })) },
            PeerMethod::Empty => Self::default(),
        }
    }
}

impl PeerMethod {
    pub fn strict() -> Self {
        PeerMethod::Mtls { mode: MtlsMode::Strict }
    }

    pub fn permissive() -> Self {
        PeerMethod::Mtls { mode: MtlsMode::Permissive }
    }

    pub fn mtls() -> Self {
        PeerMethod::Mtls { mode: MtlsMode::Unspecified }
    }

    /// Whether this entry asks callers for mutual TLS
    pub fn is_mtls_enabling(&self) -> bool {
        matches!(self, PeerMethod::Mtls { .. } | PeerMethod::Empty)
    }

    /// Whether this entry accepts only mutual TLS
    pub fn is_strict(&self) -> bool {
        match self {
            PeerMethod::Mtls { mode } => *mode != MtlsMode::Permissive,
            PeerMethod::Empty => true,
            PeerMethod::Jwt { .. } => false,
        }
    }
}

impl fmt::Display for PeerMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PeerMethod::Mtls { mode: MtlsMode::Strict } => write!(f, "mtls(STRICT)"),
            PeerMethod::Mtls { mode: MtlsMode::Permissive } => write!(f, "mtls(PERMISSIVE)"),
            PeerMethod::Mtls { mode: MtlsMode::Unspecified } => write!(f, "mtls"),
            PeerMethod::Jwt { .. } => write!(f, "jwt"),
            PeerMethod::Empty => write!(f, "{{}}"),
        }
    }
}

impl TargetSelector {
    /// Target a whole service
    pub fn service(name: impl Into<String>) -> Self {
        Self { name: name.into(), ports: vec![] }
    }

    /// Limit the target to numbered ports
    pub fn with_ports(mut self, ports: impl IntoIterator<Item = u32>) -> Self {
        self.ports
            .extend(ports.into_iter().map(|number| PortSelector { number: Some(number), name: None }));
        self
    }

    /// Whether the target covers every port of the service
    pub fn is_whole_service(&self) -> bool {
        self.ports.is_empty()
    }

    /// Numbered ports of the target
    pub fn port_numbers(&self) -> BTreeSet<u32> {
        self.ports.iter().filter_map(|p| p.number).collect()
    }

    /// Port selectors given only by name
    pub fn named_only_ports(&self) -> impl Iterator<Item = &str> {
        self.ports.iter().filter(|p| p.number.is_none()).filter_map(|p| p.name.as_deref())
    }
}

impl PolicySpec {
    /// Whether the spec applies to a whole namespace (or mesh)
    pub fn is_namespace_wide(&self) -> bool {
        self.targets.is_empty()
    }

    /// Targets naming `service`
    pub fn targets_named<'a>(&'a self, service: &'a str) -> impl Iterator<Item = &'a TargetSelector> {
        self.targets.iter().filter(move |t| t.name == service)
    }
}

impl AuthenticationPolicy {
    pub fn new(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self { metadata: ObjectMeta::new(name, namespace), spec: PolicySpec::default() }
    }

    pub fn with_target(mut self, target: TargetSelector) -> Self {
        self.spec.targets.push(target);
        self
    }

    pub fn with_peer(mut self, peer: PeerMethod) -> Self {
        self.spec.peers.push(peer);
        self
    }

    pub fn namespace(&self) -> &str {
        self.metadata.namespace_or_default()
    }

    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    pub fn qualified_name(&self) -> String {
        self.metadata.qualified_name()
    }
}

impl MeshPolicy {
    pub fn new(name: impl Into<String>) -> Self {
        Self { metadata: ObjectMeta::cluster_scoped(name), spec: PolicySpec::default() }
    }

    pub fn with_peer(mut self, peer: PeerMethod) -> Self {
        self.spec.peers.push(peer);
        self
    }

    pub fn name(&self) -> &str {
        &self.metadata.name
    }
}
