//! # Precedence Resolution
//!
//! Effective mTLS for one service port, from two independent tiered searches:
//!
//! - [`authn`]: authentication policies decide whether the server side demands mTLS
//! - [`destination_rule`]: DestinationRules decide what TLS clients originate
//!
//! Both walk their tiers most specific first, as an ordered table of lookup
//! functions, and the first tier with any match decides. A lower tier is never
//! consulted once a higher one matched, even when the higher one is `MIXED`.

pub mod authn;
pub mod destination_rule;

use serde::Serialize;
use std::fmt;

use crate::analysis::{Finding, MeshSnapshot};
use crate::domain::{HostNormalizer, PrecedenceTier, Service, TlsMode};
use crate::errors::{MeshcheckError, Result};

pub use authn::{validate_mesh_policies, AuthnResolver};
pub use destination_rule::DestinationRuleResolver;

/// Server-side mTLS requirement
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MtlsState {
    Enabled,
    Disabled,
    Mixed,
    /// No policy applies at any tier
    #[default]
    Unknown,
}

impl MtlsState {
    /// Boolean view; `Unknown` reads as disabled.
    pub fn is_enabled(&self) -> bool {
        matches!(self, MtlsState::Enabled)
    }

    /// Whether callers may be asked for a client certificate
    pub fn may_require_mtls(&self) -> bool {
        matches!(self, MtlsState::Enabled | MtlsState::Mixed)
    }
}

impl fmt::Display for MtlsState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MtlsState::Enabled => write!(f, "ENABLED"),
            MtlsState::Disabled => write!(f, "DISABLED"),
            MtlsState::Mixed => write!(f, "MIXED"),
            MtlsState::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

/// Client-side TLS towards a destination
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ClientTls {
    /// No client certificate is presented
    Disable,
    Mutual,
    #[default]
    Unknown,
}

impl From<TlsMode> for ClientTls {
    fn from(mode: TlsMode) -> Self {
        if mode.is_mutual() {
            ClientTls::Mutual
        } else {
            ClientTls::Disable
        }
    }
}

impl fmt::Display for ClientTls {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClientTls::Disable => write!(f, "DISABLE"),
            ClientTls::Mutual => write!(f, "MUTUAL"),
            ClientTls::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

/// Outcome of a tiered search, with the evidence behind it
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Resolution<S> {
    pub state: S,
    /// Tier that decided; `None` when nothing applied
    pub tier: Option<PrecedenceTier>,
    /// Qualified names of the objects in the deciding tier
    pub sources: Vec<String>,
    /// More than one object shared the deciding tier
    pub ambiguous: bool,
}

impl<S: Default> Resolution<S> {
    pub fn unknown() -> Self {
        Self { state: S::default(), tier: None, sources: Vec::new(), ambiguous: false }
    }
}

/// Both sides of one service port
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EffectiveMtls {
    pub authn: Resolution<MtlsState>,
    pub client_tls: Resolution<ClientTls>,
}

/// Resolver over one snapshot
pub struct PrecedenceResolver<'a> {
    authn: AuthnResolver<'a>,
    destination_rules: DestinationRuleResolver<'a>,
}

impl<'a> PrecedenceResolver<'a> {
    pub fn new(snapshot: &'a MeshSnapshot, normalizer: &HostNormalizer, mesh_policy_name: &str) -> Self {
        Self {
            authn: AuthnResolver::new(
                &snapshot.authentication_policies,
                &snapshot.mesh_policies,
                mesh_policy_name,
            ),
            destination_rules: DestinationRuleResolver::new(&snapshot.destination_rules, normalizer),
        }
    }

    /// Server-side state for `port` of `service`
    pub fn authn(&self, service: &Service, port: u32) -> Result<Resolution<MtlsState>> {
        self.authn.resolve(service, port)
    }

    /// Client TLS for `port` of `service`
    pub fn client_tls(&self, service: &Service, port: u32) -> Result<Resolution<ClientTls>> {
        self.destination_rules.resolve(service, port)
    }

    /// DestinationRules tied at one tier for the same host, service or not
    pub fn client_tls_conflicts(&self) -> Vec<MeshcheckError> {
        self.destination_rules.conflicts()
    }

    pub fn resolve(&self, service: &Service, port: u32) -> Result<EffectiveMtls> {
        Ok(EffectiveMtls { authn: self.authn(service, port)?, client_tls: self.client_tls(service, port)? })
    }

    /// The MeshPolicy error, if the mesh tier is unusable
    pub fn mesh_policy_error(&self) -> Option<MeshcheckError> {
        self.authn.mesh_policy_error()
    }

    /// Whether any policy or the MeshPolicy asks for mTLS
    pub fn mtls_enabled_anywhere(&self) -> bool {
        self.authn.mtls_enabled_anywhere()
    }

    /// `invalid-host` findings for DestinationRules left out of the search
    pub fn skipped_rules(&self) -> &[Finding] {
        self.destination_rules.skipped()
    }
}
