//! Domain layer
//!
//! This module contains pure domain entities for the mesh configuration objects the
//! analyzer inspects. They deserialize straight from Kubernetes manifests and carry
//! no infrastructure dependencies.
//!
//! ## Design Principles
//!
//! - **Read-only snapshots**: the analyzer never mutates a domain object; defaults such
//!   as the implicit `mesh` gateway are applied when reading, not stored
//! - **Tagged variants over nullable structs**: a peer entry that requests mTLS with
//!   no further settings stays distinguishable from an absent entry
//! - **Testability**: every type has builder helpers so analysis tests can construct
//!   objects without YAML
//!
//! ## Module Organization
//!
//! - `id`: object metadata and the `Service` lookup key
//! - `host`: short-name expansion to cluster FQDNs
//! - `virtual_service`: VirtualService routes and URI matches
//! - `authentication`: authentication Policy, MeshPolicy and peer methods
//! - `destination_rule`: DestinationRule client TLS settings
//! - `workload`: Kubernetes Services, Pods and probes

pub mod authentication;
pub mod destination_rule;
pub mod host;
pub mod id;
pub mod virtual_service;
pub mod workload;

use std::fmt;

use serde::Serialize;

pub use authentication::{
    AuthenticationPolicy, MeshPolicy, MtlsMode, PeerMethod, PolicySpec, PortSelector,
    TargetSelector,
};
pub use destination_rule::{DestinationRule, DestinationRuleSpec, PortTrafficPolicy, TlsMode};
pub use host::{is_valid_host_format, HostNormalizer, DEFAULT_CLUSTER_DOMAIN};
pub use id::{ObjectMeta, Service};
pub use virtual_service::{HttpRoute, MatchType, UriMatch, VirtualService, MESH_GATEWAY};
pub use workload::{Container, ContainerPort, IntOrString, KubeService, Pod, Probe, ServicePort};

/// Specificity tier a policy or destination rule applies at, most specific first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PrecedenceTier {
    /// Targets one port of one service
    Port,
    /// Targets a whole service
    Name,
    /// Applies to every service in a namespace
    Namespace,
    /// Applies to the whole mesh
    Mesh,
}

impl fmt::Display for PrecedenceTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PrecedenceTier::Port => write!(f, "port"),
            PrecedenceTier::Name => write!(f, "name"),
            PrecedenceTier::Namespace => write!(f, "namespace"),
            PrecedenceTier::Mesh => write!(f, "mesh"),
        }
    }
}
