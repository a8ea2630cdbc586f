//! mTLS consistency between authentication policies and DestinationRules
//!
//! For every service port, the server side (authentication policies) and the client
//! side (DestinationRules) are resolved independently and compared. Configuration
//! errors met along the way, an invalid MeshPolicy or rules tied at one tier, are
//! reported here and leave the affected side unresolved. Tied DestinationRules are
//! also reported when no Service object exists for their host.

use std::collections::BTreeSet;

use tracing::{debug, warn};

use super::{join_names, AnalysisContext, ClientTls, Finding, FindingKind, MtlsState, Severity, Vetter};
use crate::errors::{MeshcheckError, Result};

/// Checks MeshPolicy validity and authn/DestinationRule agreement
#[derive(Debug, Default, Clone, Copy)]
pub struct MtlsConsistencyVetter;

impl Vetter for MtlsConsistencyVetter {
    fn name(&self) -> &'static str {
        "mtls-consistency"
    }

    fn vet(&self, ctx: &AnalysisContext<'_>) -> Result<Vec<Finding>> {
        let resolver = ctx.resolver;
        let mut findings: Vec<Finding> = resolver.skipped_rules().to_vec();
        let mut reported = BTreeSet::new();

        if let Some(error) = resolver.mesh_policy_error() {
            findings.extend(configuration_finding(&error));
        }

        // Rules no Service reaches still conflict.
        for error in resolver.client_tls_conflicts() {
            if let Some(finding) = configuration_finding(&error) {
                if reported.insert(finding.id()) {
                    warn!(error = %error, "Conflicting DestinationRules");
                    findings.push(finding);
                }
            }
        }

        for kube_service in &ctx.snapshot.services {
            let service = kube_service.service();
            for service_port in &kube_service.spec.ports {
                let port = service_port.port;

                let authn = match resolver.authn(&service, port) {
                    Ok(resolution) => resolution.state,
                    // reported once above
                    Err(_) => MtlsState::Unknown,
                };

                let client_tls = match resolver.client_tls(&service, port) {
                    Ok(resolution) => resolution.state,
                    Err(error) => {
                        if let Some(finding) = configuration_finding(&error) {
                            if reported.insert(finding.id()) {
                                warn!(service = %service, port, error = %error, "Conflicting DestinationRules");
                                findings.push(finding);
                            }
                        }
                        ClientTls::Unknown
                    }
                };

                debug!(service = %service, port, authn = %authn, client_tls = %client_tls, "Compared mTLS sides");

                if let Some(severity) = mismatch_severity(authn, client_tls) {
                    findings.push(
                        Finding::new(FindingKind::MtlsPolicyMismatch, severity)
                            .with_attr("namespace", &service.namespace)
                            .with_attr("service", &service.name)
                            .with_attr("port", port)
                            .with_attr("authn_state", authn)
                            .with_attr("tls_mode", client_tls),
                    );
                }
            }
        }

        Ok(findings)
    }
}

/// Severity of a disagreement, if the two sides disagree.
///
/// A server demanding mTLS from plaintext clients breaks traffic; clients sending mTLS
/// to a server that does not terminate it only wastes a handshake.
pub fn mismatch_severity(authn: MtlsState, client_tls: ClientTls) -> Option<Severity> {
    match (authn, client_tls) {
        (MtlsState::Enabled, ClientTls::Disable) => Some(Severity::Error),
        (MtlsState::Disabled, ClientTls::Mutual) => Some(Severity::Warning),
        _ => None,
    }
}

/// Finding for a configuration invariant violation
pub(crate) fn configuration_finding(error: &MeshcheckError) -> Option<Finding> {
    match error {
        MeshcheckError::MeshPolicyConfiguration { message, policies } => Some(
            Finding::new(FindingKind::MeshPolicyInvalid, Severity::Error)
                .with_attr("policy_names", join_names(policies))
                .with_attr("reason", message),
        ),
        MeshcheckError::DestinationRuleConflict { host, tier, rules } => Some(
            Finding::new(FindingKind::DrConflict, Severity::Error)
                .with_attr("host", host)
                .with_attr("tier", tier)
                .with_attr("rule_names", join_names(rules)),
        ),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::PrecedenceTier;

    #[test]
    fn mismatch_matrix() {
        assert_eq!(mismatch_severity(MtlsState::Enabled, ClientTls::Disable), Some(Severity::Error));
        assert_eq!(mismatch_severity(MtlsState::Disabled, ClientTls::Mutual), Some(Severity::Warning));
        assert_eq!(mismatch_severity(MtlsState::Enabled, ClientTls::Mutual), None);
        assert_eq!(mismatch_severity(MtlsState::Disabled, ClientTls::Disable), None);
        assert_eq!(mismatch_severity(MtlsState::Mixed, ClientTls::Disable), None);
        assert_eq!(mismatch_severity(MtlsState::Unknown, ClientTls::Mutual), None);
        assert_eq!(mismatch_severity(MtlsState::Enabled, ClientTls::Unknown), None);
    }

    #[test]
    fn configuration_errors_become_findings() {
        let finding = configuration_finding(&MeshcheckError::DestinationRuleConflict {
            host: "reviews.bookinfo.svc.cluster.local".to_string(),
            tier: PrecedenceTier::Name,
            rules: vec!["a.bookinfo".to_string(), "b.bookinfo".to_string()],
        })
        .unwrap();
        assert_eq!(finding.kind, FindingKind::DrConflict);
        assert_eq!(finding.attr("tier"), Some("name"));
        assert_eq!(finding.attr("rule_names"), Some("a.bookinfo, b.bookinfo"));

        let finding = configuration_finding(&MeshcheckError::mesh_policy(
            "only one MeshPolicy may exist, found 2",
            vec!["a".to_string(), "b".to_string()],
        ))
        .unwrap();
        assert_eq!(finding.kind, FindingKind::MeshPolicyInvalid);
        assert_eq!(finding.attr("policy_names"), Some("a, b"));

        assert!(configuration_finding(&MeshcheckError::internal("boom")).is_none());
    }
}
