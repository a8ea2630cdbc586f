//! DestinationRule client TLS precedence
//!
//! Tiers, most specific first: port-level settings of a rule for the service host,
//! the top-level setting of such a rule, a namespace wildcard rule, then a mesh
//! wildcard rule. Unlike authentication policies, two rules in the deciding tier are
//! an error: Istio merges neither of them.

use std::collections::BTreeMap;

use tracing::{debug, warn};

use super::{ClientTls, Resolution};
use crate::analysis::{invalid_host_finding, Finding};
use crate::domain::{DestinationRule, HostNormalizer, PrecedenceTier, Service, TlsMode};
use crate::errors::{MeshcheckError, Result};

/// A rule with its host normalized in the rule's namespace
struct IndexedRule<'a> {
    rule: &'a DestinationRule,
    host: String,
}

/// A rule applicable at some tier, with the mode it sets there
struct TlsCandidate<'r> {
    host: &'r str,
    source: String,
    mode: TlsMode,
}

/// Hosts a service port is looked up under
struct Target<'t> {
    service: &'t Service,
    fqdn: String,
    port: u32,
}

type TierLookup<'a> =
    for<'r, 's, 't> fn(&'r DestinationRuleResolver<'a>, &'s Target<'t>) -> Vec<TlsCandidate<'r>>;

/// Tiered search over destination rules
pub struct DestinationRuleResolver<'a> {
    rules: Vec<IndexedRule<'a>>,
    normalizer: HostNormalizer,
    skipped: Vec<Finding>,
}

impl<'a> DestinationRuleResolver<'a> {
    const TIERS: [(PrecedenceTier, TierLookup<'a>); 4] = [
        (PrecedenceTier::Port, Self::port_tier),
        (PrecedenceTier::Name, Self::name_tier),
        (PrecedenceTier::Namespace, Self::namespace_tier),
        (PrecedenceTier::Mesh, Self::mesh_tier),
    ];

    /// Index `rules`, skipping those whose host is missing or does not normalize.
    pub fn new(rules: &'a [DestinationRule], normalizer: &HostNormalizer) -> Self {
        let mut indexed = Vec::with_capacity(rules.len());
        let mut skipped = Vec::new();

        for rule in rules {
            let raw = rule.host().unwrap_or_default();
            match normalizer.normalize(raw, rule.namespace()) {
                Ok(host) => indexed.push(IndexedRule { rule, host }),
                Err(error) => {
                    warn!(
                        destination_rule = %rule.qualified_name(),
                        host = %raw,
                        error = %error,
                        "Skipping DestinationRule with invalid host"
                    );
                    skipped.push(invalid_host_finding(
                        "DestinationRule",
                        &rule.qualified_name(),
                        rule.namespace(),
                        raw,
                        &error,
                    ));
                }
            }
        }

        Self { rules: indexed, normalizer: normalizer.clone(), skipped }
    }

    pub fn skipped(&self) -> &[Finding] {
        &self.skipped
    }

    /// Client TLS for `port` of `service`.
    ///
    /// Several rules in the deciding tier fail with `DestinationRuleConflict`.
    pub fn resolve(&self, service: &Service, port: u32) -> Result<Resolution<ClientTls>> {
        let target = Target {
            service,
            fqdn: self.normalizer.service_fqdn(&service.name, &service.namespace),
            port,
        };

        for (tier, lookup) in Self::TIERS {
            let mut candidates = lookup(self, &target);
            match candidates.len() {
                0 => continue,
                1 => {
                    let winner = candidates.remove(0);
                    debug!(
                        service = %service,
                        port,
                        tier = %tier,
                        mode = %winner.mode,
                        rule = %winner.source,
                        "Resolved client TLS"
                    );
                    return Ok(Resolution {
                        state: ClientTls::from(winner.mode),
                        tier: Some(tier),
                        sources: vec![winner.source],
                        ambiguous: false,
                    });
                }
                _ => return Err(conflict(tier, candidates)),
            }
        }

        Ok(Resolution::unknown())
    }

    /// Rules tied at one tier for the same host, found without any service.
    ///
    /// Port-level settings group by host and port, top-level settings by host; every
    /// mesh wildcard host shares one group. These are the conflicts [`Self::resolve`]
    /// reports for a service port that reaches the tier.
    pub fn conflicts(&self) -> Vec<MeshcheckError> {
        let mut groups: BTreeMap<(PrecedenceTier, &str, Option<u32>), Vec<TlsCandidate<'_>>> = BTreeMap::new();

        for indexed in &self.rules {
            let host = indexed.host.as_str();
            for port in indexed.rule.tls_ports() {
                if let Some(mode) = indexed.rule.port_tls_mode(port) {
                    groups
                        .entry((PrecedenceTier::Port, host, Some(port)))
                        .or_default()
                        .push(tls_candidate(indexed, mode));
                }
            }

            if let Some(mode) = indexed.rule.top_level_tls_mode() {
                let key = if self.normalizer.is_mesh_wildcard(host) {
                    (PrecedenceTier::Mesh, "*", None)
                } else if host.starts_with("*.") {
                    (PrecedenceTier::Namespace, host, None)
                } else {
                    (PrecedenceTier::Name, host, None)
                };
                groups.entry(key).or_default().push(tls_candidate(indexed, mode));
            }
        }

        groups
            .into_iter()
            .filter(|(_, candidates)| candidates.len() > 1)
            .map(|((tier, _, _), candidates)| conflict(tier, candidates))
            .collect()
    }

    fn port_tier<'r>(&'r self, target: &Target<'_>) -> Vec<TlsCandidate<'r>> {
        self.rules
            .iter()
            .filter(|r| r.host == target.fqdn)
            .filter_map(|r| r.rule.port_tls_mode(target.port).map(|mode| tls_candidate(r, mode)))
            .collect()
    }

    fn name_tier<'r>(&'r self, target: &Target<'_>) -> Vec<TlsCandidate<'r>> {
        self.top_level_where(|host| host == target.fqdn)
    }

    fn namespace_tier<'r>(&'r self, target: &Target<'_>) -> Vec<TlsCandidate<'r>> {
        let wildcard = self.normalizer.namespace_wildcard(&target.service.namespace);
        self.top_level_where(|host| host == wildcard)
    }

    fn mesh_tier<'r>(&'r self, _target: &Target<'_>) -> Vec<TlsCandidate<'r>> {
        self.top_level_where(|host| self.normalizer.is_mesh_wildcard(host))
    }

    fn top_level_where<'r>(&'r self, matches_host: impl Fn(&str) -> bool) -> Vec<TlsCandidate<'r>> {
        self.rules
            .iter()
            .filter(|r| matches_host(r.host.as_str()))
            .filter_map(|r| r.rule.top_level_tls_mode().map(|mode| tls_candidate(r, mode)))
            .collect()
    }
}

fn tls_candidate<'r>(indexed: &'r IndexedRule<'_>, mode: TlsMode) -> TlsCandidate<'r> {
    TlsCandidate { host: &indexed.host, source: indexed.rule.qualified_name(), mode }
}

fn conflict(tier: PrecedenceTier, candidates: Vec<TlsCandidate<'_>>) -> MeshcheckError {
    let mut hosts: Vec<&str> = candidates.iter().map(|c| c.host).collect();
    hosts.sort_unstable();
    hosts.dedup();

    let mut rules: Vec<String> = candidates.into_iter().map(|c| c.source).collect();
    rules.sort();

    MeshcheckError::DestinationRuleConflict { host: hosts.join(", "), tier, rules }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn svc() -> Service {
        Service::new("reviews", "bookinfo")
    }

    fn resolve(rules: &[DestinationRule], port: u32) -> Result<Resolution<ClientTls>> {
        DestinationRuleResolver::new(rules, &HostNormalizer::default()).resolve(&svc(), port)
    }

    #[test]
    fn port_setting_beats_top_level() {
        let rules = vec![DestinationRule::new("dr", "bookinfo", "reviews")
            .with_tls(TlsMode::IstioMutual)
            .with_port_tls(9080, TlsMode::Disable)];

        let on_port = resolve(&rules, 9080).unwrap();
        assert_eq!(on_port.state, ClientTls::Disable);
        assert_eq!(on_port.tier, Some(PrecedenceTier::Port));

        let elsewhere = resolve(&rules, 9443).unwrap();
        assert_eq!(elsewhere.state, ClientTls::Mutual);
        assert_eq!(elsewhere.tier, Some(PrecedenceTier::Name));
        assert_eq!(elsewhere.sources, vec!["dr.bookinfo".to_string()]);
    }

    #[test]
    fn short_host_resolves_in_rule_namespace() {
        let rules = vec![DestinationRule::new("dr", "other", "reviews").with_tls(TlsMode::Mutual)];
        assert_eq!(resolve(&rules, 80).unwrap().state, ClientTls::Unknown);

        let rules = vec![DestinationRule::new("dr", "other", "reviews.bookinfo.svc.cluster.local")
            .with_tls(TlsMode::Mutual)];
        assert_eq!(resolve(&rules, 80).unwrap().state, ClientTls::Mutual);
    }

    #[test]
    fn namespace_then_mesh_wildcards() {
        let mesh = DestinationRule::new("mesh", "istio-system", "*.local").with_tls(TlsMode::IstioMutual);
        let namespace = DestinationRule::new("ns", "bookinfo", "*.bookinfo.svc.cluster.local")
            .with_tls(TlsMode::Simple);

        let resolution = resolve(&[mesh.clone(), namespace], 80).unwrap();
        assert_eq!(resolution.state, ClientTls::Disable);
        assert_eq!(resolution.tier, Some(PrecedenceTier::Namespace));

        let resolution = resolve(&[mesh], 80).unwrap();
        assert_eq!(resolution.state, ClientTls::Mutual);
        assert_eq!(resolution.tier, Some(PrecedenceTier::Mesh));
    }

    #[test]
    fn two_rules_at_deciding_tier_conflict() {
        let rules = vec![
            DestinationRule::new("b", "bookinfo", "reviews").with_tls(TlsMode::Disable),
            DestinationRule::new("a", "bookinfo", "reviews").with_tls(TlsMode::Mutual),
            DestinationRule::new("mesh", "istio-system", "*").with_tls(TlsMode::Mutual),
        ];

        match resolve(&rules, 80).unwrap_err() {
            MeshcheckError::DestinationRuleConflict { host, tier, rules } => {
                assert_eq!(host, "reviews.bookinfo.svc.cluster.local");
                assert_eq!(tier, PrecedenceTier::Name);
                assert_eq!(rules, vec!["a.bookinfo".to_string(), "b.bookinfo".to_string()]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn rules_without_tls_do_not_claim_a_tier() {
        let rules = vec![
            DestinationRule::new("lb-only", "bookinfo", "reviews"),
            DestinationRule::new("tls", "bookinfo", "reviews").with_tls(TlsMode::Mutual),
        ];
        let resolution = resolve(&rules, 80).unwrap();
        assert_eq!(resolution.state, ClientTls::Mutual);
        assert_eq!(resolution.sources, vec!["tls.bookinfo".to_string()]);
    }

    #[test]
    fn conflicts_are_found_without_services() {
        let rules = vec![
            DestinationRule::new("a", "shop", "cart").with_tls(TlsMode::IstioMutual),
            DestinationRule::new("b", "shop", "cart.shop.svc.cluster.local").with_tls(TlsMode::Disable),
            DestinationRule::new("p1", "shop", "pay").with_port_tls(8443, TlsMode::Mutual),
            DestinationRule::new("p2", "shop", "pay").with_port_tls(8443, TlsMode::Disable),
            DestinationRule::new("p3", "shop", "pay").with_port_tls(9443, TlsMode::Disable),
            DestinationRule::new("mesh", "istio-system", "*").with_tls(TlsMode::IstioMutual),
            DestinationRule::new("local", "istio-system", "*.local").with_tls(TlsMode::Disable),
            DestinationRule::new("ns", "shop", "*.shop.svc.cluster.local").with_tls(TlsMode::Disable),
        ];
        let resolver = DestinationRuleResolver::new(&rules, &HostNormalizer::default());

        let found: Vec<(PrecedenceTier, String, Vec<String>)> = resolver
            .conflicts()
            .into_iter()
            .map(|error| match error {
                MeshcheckError::DestinationRuleConflict { host, tier, rules } => (tier, host, rules),
                other => panic!("unexpected error: {other}"),
            })
            .collect();

        assert_eq!(
            found,
            vec![
                (
                    PrecedenceTier::Port,
                    "pay.shop.svc.cluster.local".to_string(),
                    vec!["p1.shop".to_string(), "p2.shop".to_string()]
                ),
                (
                    PrecedenceTier::Name,
                    "cart.shop.svc.cluster.local".to_string(),
                    vec!["a.shop".to_string(), "b.shop".to_string()]
                ),
                (
                    PrecedenceTier::Mesh,
                    "*, *.local".to_string(),
                    vec!["local.istio-system".to_string(), "mesh.istio-system".to_string()]
                ),
            ]
        );
    }

    #[test]
    fn service_conflict_matches_the_service_free_one() {
        let rules = vec![
            DestinationRule::new("b", "bookinfo", "reviews").with_tls(TlsMode::Disable),
            DestinationRule::new("a", "bookinfo", "reviews").with_tls(TlsMode::Mutual),
        ];
        let resolver = DestinationRuleResolver::new(&rules, &HostNormalizer::default());
        let via_service = resolver.resolve(&svc(), 80).unwrap_err().to_string();
        let conflicts: Vec<String> = resolver.conflicts().iter().map(ToString::to_string).collect();
        assert_eq!(conflicts, vec![via_service]);
    }

    #[test]
    fn missing_host_is_skipped_and_reported() {
        let mut broken = DestinationRule::new("broken", "bookinfo", "reviews").with_tls(TlsMode::Disable);
        broken.spec.host = None;
        let rules = vec![broken];

        let resolver = DestinationRuleResolver::new(&rules, &HostNormalizer::default());
        assert_eq!(resolver.skipped().len(), 1);
        assert_eq!(resolver.skipped()[0].attr("object"), Some("DestinationRule broken.bookinfo"));
        assert_eq!(resolver.resolve(&svc(), 80).unwrap(), Resolution::unknown());
    }
}
