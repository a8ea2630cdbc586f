//! Authentication policy key index
//!
//! Each policy claims one or more (namespace, target, port) keys. Two distinct policies
//! claiming the same key conflict: Istio accepts only one policy per scope.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use tracing::warn;

use super::{join_names, AnalysisContext, Finding, FindingKind, Severity, Vetter};
use crate::domain::AuthenticationPolicy;
use crate::errors::Result;

/// Scope claimed by an authentication policy.
///
/// An empty `target_name` with port 0 is namespace-wide; port 0 alone is a whole service.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PolicyKey {
    pub namespace: String,
    pub target_name: String,
    pub target_port: u32,
}

impl PolicyKey {
    pub fn namespace_wide(namespace: impl Into<String>) -> Self {
        Self { namespace: namespace.into(), target_name: String::new(), target_port: 0 }
    }

    pub fn service(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self { namespace: namespace.into(), target_name: name.into(), target_port: 0 }
    }

    pub fn port(namespace: impl Into<String>, name: impl Into<String>, port: u32) -> Self {
        Self { namespace: namespace.into(), target_name: name.into(), target_port: port }
    }

    /// Finding kind for a conflict on this key
    pub fn conflict_kind(&self) -> FindingKind {
        if self.target_port != 0 {
            FindingKind::AuthnConflictPort
        } else if self.target_name.is_empty() {
            FindingKind::AuthnConflictNamespace
        } else {
            FindingKind::AuthnConflictService
        }
    }
}

impl fmt::Display for PolicyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.target_name.is_empty(), self.target_port) {
            (true, _) => write!(f, "{}", self.namespace),
            (false, 0) => write!(f, "{}/{}", self.namespace, self.target_name),
            (false, port) => write!(f, "{}/{}:{}", self.namespace, self.target_name, port),
        }
    }
}

/// Keys claimed by one policy, without duplicates.
///
/// Port selectors given only by name cannot be compared and are left out.
pub fn policy_keys(policy: &AuthenticationPolicy) -> BTreeSet<PolicyKey> {
    let namespace = policy.namespace();
    if policy.spec.is_namespace_wide() {
        return BTreeSet::from([PolicyKey::namespace_wide(namespace)]);
    }

    let mut keys = BTreeSet::new();
    for target in &policy.spec.targets {
        for name in target.named_only_ports() {
            warn!(
                policy = %policy.qualified_name(),
                target = %target.name,
                port_name = %name,
                "Ignoring port selected by name"
            );
        }

        if target.is_whole_service() {
            keys.insert(PolicyKey::service(namespace, &target.name));
        } else {
            keys.extend(
                target.port_numbers().into_iter().map(|port| PolicyKey::port(namespace, &target.name, port)),
            );
        }
    }
    keys
}

/// Conflicts between authentication policies claiming the same key
pub fn notes_for_policies(policies: &[AuthenticationPolicy]) -> Vec<Finding> {
    let mut index: BTreeMap<PolicyKey, Vec<usize>> = BTreeMap::new();
    for (position, policy) in policies.iter().enumerate() {
        for key in policy_keys(policy) {
            index.entry(key).or_default().push(position);
        }
    }

    index
        .into_iter()
        .filter_map(|(key, positions)| {
            let names: BTreeSet<&str> = positions.iter().map(|&i| policies[i].name()).collect();
            (names.len() >= 2).then(|| conflict_finding(&key, names))
        })
        .collect()
}

fn conflict_finding(key: &PolicyKey, names: BTreeSet<&str>) -> Finding {
    let mut finding = Finding::new(key.conflict_kind(), Severity::Error)
        .with_attr("namespace", &key.namespace)
        .with_attr("policy_names", join_names(names));
    if !key.target_name.is_empty() {
        finding = finding.with_attr("target_service", &key.target_name);
    }
    if key.target_port != 0 {
        finding = finding.with_attr("target_port", key.target_port);
    }
    finding
}

/// Checks authentication policies for overlapping scopes
#[derive(Debug, Default, Clone, Copy)]
pub struct PolicyKeyVetter;

impl Vetter for PolicyKeyVetter {
    fn name(&self) -> &'static str {
        "authn-policy-keys"
    }

    fn vet(&self, ctx: &AnalysisContext<'_>) -> Result<Vec<Finding>> {
        Ok(notes_for_policies(&ctx.snapshot.authentication_policies))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{PeerMethod, TargetSelector};

    fn targeting(name: &str, namespace: &str, target: TargetSelector) -> AuthenticationPolicy {
        AuthenticationPolicy::new(name, namespace).with_target(target).with_peer(PeerMethod::mtls())
    }

    #[test]
    fn keys_by_target_shape() {
        let wide = AuthenticationPolicy::new("p", "ns");
        assert_eq!(policy_keys(&wide), BTreeSet::from([PolicyKey::namespace_wide("ns")]));

        let ports = targeting("p", "ns", TargetSelector::service("svc").with_ports([80, 443, 80]));
        assert_eq!(
            policy_keys(&ports),
            BTreeSet::from([PolicyKey::port("ns", "svc", 80), PolicyKey::port("ns", "svc", 443)])
        );

        let whole = targeting("p", "ns", TargetSelector::service("svc"));
        assert_eq!(policy_keys(&whole), BTreeSet::from([PolicyKey::service("ns", "svc")]));
    }

    #[test]
    fn service_level_conflict_sorted_names() {
        let b = targeting("B", "ns1", TargetSelector::service("svc1"));
        let a = targeting("A", "ns1", TargetSelector::service("svc1"));

        let findings = notes_for_policies(&[b, a]);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].kind, FindingKind::AuthnConflictService);
        assert_eq!(findings[0].severity, Severity::Error);
        assert_eq!(findings[0].attr("policy_names"), Some("A, B"));
        assert_eq!(findings[0].attr("target_service"), Some("svc1"));
        assert_eq!(findings[0].attr("target_port"), None);
    }

    #[test]
    fn namespace_isolates_keys() {
        let a = targeting("A", "ns1", TargetSelector::service("svc1"));
        let b = targeting("A", "ns2", TargetSelector::service("svc1"));
        assert!(notes_for_policies(&[a, b]).is_empty());
    }

    #[test]
    fn namespace_and_port_level_conflicts() {
        let findings = notes_for_policies(&[
            AuthenticationPolicy::new("x", "ns"),
            AuthenticationPolicy::new("y", "ns"),
            targeting("p", "ns", TargetSelector::service("svc").with_ports([8080])),
            targeting("q", "ns", TargetSelector::service("svc").with_ports([8080, 9090])),
        ]);

        let kinds: Vec<FindingKind> = findings.iter().map(|f| f.kind).collect();
        assert_eq!(kinds, vec![FindingKind::AuthnConflictNamespace, FindingKind::AuthnConflictPort]);
        assert_eq!(findings[1].attr("target_port"), Some("8080"));
        assert_eq!(findings[1].attr("policy_names"), Some("p, q"));
    }

    #[test]
    fn a_policy_does_not_conflict_with_itself() {
        let repeated = AuthenticationPolicy::new("p", "ns")
            .with_target(TargetSelector::service("svc"))
            .with_target(TargetSelector::service("svc"));
        assert!(notes_for_policies(&[repeated]).is_empty());
        assert!(notes_for_policies(&[]).is_empty());
    }

    #[test]
    fn whole_service_and_port_targets_do_not_collide() {
        let whole = targeting("a", "ns", TargetSelector::service("svc"));
        let port = targeting("b", "ns", TargetSelector::service("svc").with_ports([80]));
        assert!(notes_for_policies(&[whole, port]).is_empty());
    }

    #[test]
    fn key_display() {
        assert_eq!(PolicyKey::namespace_wide("ns").to_string(), "ns");
        assert_eq!(PolicyKey::port("ns", "svc", 80).to_string(), "ns/svc:80");
    }
}
