//! Authentication policy precedence
//!
//! Tiers, most specific first: policies targeting the port, policies targeting the
//! whole service, namespace-wide policies, then the MeshPolicy.

use std::collections::BTreeSet;

use tracing::debug;

use super::{MtlsState, Resolution};
use crate::domain::{AuthenticationPolicy, MeshPolicy, PeerMethod, PolicySpec, PrecedenceTier, Service};
use crate::errors::{MeshcheckError, Result};

/// A policy applicable at some tier
struct Candidate<'a> {
    source: String,
    spec: &'a PolicySpec,
}

enum MeshTier<'a> {
    Absent,
    Valid(&'a MeshPolicy),
    Invalid { message: String, policies: Vec<String> },
}

type TierLookup<'a> = fn(&AuthnResolver<'a>, &Service, u32) -> Result<Vec<Candidate<'a>>>;

/// Check the MeshPolicy singleton rule: at most one, named `expected_name`.
pub fn validate_mesh_policies<'a>(
    mesh_policies: &'a [MeshPolicy],
    expected_name: &str,
) -> Result<Option<&'a MeshPolicy>> {
    match mesh_policies {
        [] => Ok(None),
        [single] if single.name() == expected_name => Ok(Some(single)),
        [single] => Err(MeshcheckError::mesh_policy(
            format!("MeshPolicy must be named '{}', found '{}'", expected_name, single.name()),
            vec![single.name().to_string()],
        )),
        many => {
            let mut names: Vec<String> = many.iter().map(|p| p.name().to_string()).collect();
            names.sort();
            Err(MeshcheckError::mesh_policy(
                format!("only one MeshPolicy may exist, found {}", many.len()),
                names,
            ))
        }
    }
}

/// State requested by one policy's peers.
///
/// Repeated strict mTLS peers ask for the same thing as one.
pub fn peer_state(peers: &[PeerMethod]) -> MtlsState {
    let enabling: Vec<&PeerMethod> = peers.iter().filter(|p| p.is_mtls_enabling()).collect();
    if enabling.is_empty() {
        MtlsState::Disabled
    } else if enabling.len() == peers.len() && enabling.iter().all(|p| p.is_strict()) {
        MtlsState::Enabled
    } else {
        MtlsState::Mixed
    }
}

/// Tiered search over authentication policies
pub struct AuthnResolver<'a> {
    policies: &'a [AuthenticationPolicy],
    mesh: MeshTier<'a>,
}

impl<'a> AuthnResolver<'a> {
    const TIERS: [(PrecedenceTier, TierLookup<'a>); 4] = [
        (PrecedenceTier::Port, Self::port_tier),
        (PrecedenceTier::Name, Self::name_tier),
        (PrecedenceTier::Namespace, Self::namespace_tier),
        (PrecedenceTier::Mesh, Self::mesh_tier),
    ];

    pub fn new(
        policies: &'a [AuthenticationPolicy],
        mesh_policies: &'a [MeshPolicy],
        mesh_policy_name: &str,
    ) -> Self {
        let mesh = match validate_mesh_policies(mesh_policies, mesh_policy_name) {
            Ok(None) => MeshTier::Absent,
            Ok(Some(policy)) => MeshTier::Valid(policy),
            Err(MeshcheckError::MeshPolicyConfiguration { message, policies }) => {
                MeshTier::Invalid { message, policies }
            }
            Err(other) => MeshTier::Invalid { message: other.to_string(), policies: Vec::new() },
        };
        Self { policies, mesh }
    }

    /// Effective state for `port` of `service`.
    ///
    /// Fails only when the search reaches an invalid mesh tier.
    pub fn resolve(&self, service: &Service, port: u32) -> Result<Resolution<MtlsState>> {
        for (tier, lookup) in Self::TIERS {
            let candidates = lookup(self, service, port)?;
            if candidates.is_empty() {
                continue;
            }

            let resolution = evaluate(tier, candidates);
            debug!(
                service = %service,
                port,
                tier = %tier,
                state = %resolution.state,
                "Resolved authentication state"
            );
            return Ok(resolution);
        }

        Ok(Resolution::unknown())
    }

    pub fn mesh_policy_error(&self) -> Option<MeshcheckError> {
        match &self.mesh {
            MeshTier::Invalid { message, policies } => {
                Some(MeshcheckError::mesh_policy(message.clone(), policies.clone()))
            }
            _ => None,
        }
    }

    pub fn mtls_enabled_anywhere(&self) -> bool {
        let enables = |spec: &PolicySpec| spec.peers.iter().any(PeerMethod::is_mtls_enabling);
        let mesh = matches!(self.mesh, MeshTier::Valid(policy) if enables(&policy.spec));
        mesh || self.policies.iter().any(|p| enables(&p.spec))
    }

    fn in_namespace<'s>(&'s self, service: &'s Service) -> impl Iterator<Item = &'a AuthenticationPolicy> + 's {
        self.policies.iter().filter(move |p| p.namespace() == service.namespace)
    }

    fn port_tier(&self, service: &Service, port: u32) -> Result<Vec<Candidate<'a>>> {
        Ok(self
            .in_namespace(service)
            .filter(|p| p.spec.targets_named(&service.name).any(|t| t.port_numbers().contains(&port)))
            .map(candidate)
            .collect())
    }

    fn name_tier(&self, service: &Service, _port: u32) -> Result<Vec<Candidate<'a>>> {
        Ok(self
            .in_namespace(service)
            .filter(|p| p.spec.targets_named(&service.name).any(|t| t.is_whole_service()))
            .map(candidate)
            .collect())
    }

    fn namespace_tier(&self, service: &Service, _port: u32) -> Result<Vec<Candidate<'a>>> {
        Ok(self.in_namespace(service).filter(|p| p.spec.is_namespace_wide()).map(candidate).collect())
    }

    fn mesh_tier(&self, _service: &Service, _port: u32) -> Result<Vec<Candidate<'a>>> {
        match &self.mesh {
            MeshTier::Absent => Ok(Vec::new()),
            MeshTier::Valid(policy) => {
                Ok(vec![Candidate { source: policy.name().to_string(), spec: &policy.spec }])
            }
            MeshTier::Invalid { message, policies } => {
                Err(MeshcheckError::mesh_policy(message.clone(), policies.clone()))
            }
        }
    }
}

fn candidate(policy: &AuthenticationPolicy) -> Candidate<'_> {
    Candidate { source: policy.qualified_name(), spec: &policy.spec }
}

/// Tied policies that disagree make the tier `MIXED`.
fn evaluate(tier: PrecedenceTier, candidates: Vec<Candidate<'_>>) -> Resolution<MtlsState> {
    let states: BTreeSet<MtlsState> = candidates.iter().map(|c| peer_state(&c.spec.peers)).collect();
    let state = match states.len() {
        1 => states.into_iter().next().unwrap_or(MtlsState::Mixed),
        _ => MtlsState::Mixed,
    };

    let mut sources: Vec<String> = candidates.into_iter().map(|c| c.source).collect();
    sources.sort();

    Resolution { state, tier: Some(tier), ambiguous: sources.len() > 1, sources }
}
