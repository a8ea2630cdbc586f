//! Health probes under mTLS
//!
//! The kubelet sends HTTP and TCP probes straight to the pod without a mesh
//! certificate. Where mTLS may be required on the probed port such a probe fails;
//! `exec` probes run inside the container and are unaffected.

use tracing::{debug, info};

use super::{AnalysisContext, Finding, FindingKind, MtlsState, Severity, Vetter};
use crate::domain::{Container, KubeService, Pod, Probe, Service};
use crate::errors::Result;

/// Pod annotation asking the sidecar injector to rewrite HTTP probes
pub const REWRITE_PROBES_ANNOTATION: &str = "sidecar.istio.io/rewriteAppHTTPProbers";

/// Checks liveness and readiness probes of sidecar-injected pods
#[derive(Debug, Default, Clone, Copy)]
pub struct ProbeVetter;

impl Vetter for ProbeVetter {
    fn name(&self) -> &'static str {
        "mtls-probes"
    }

    fn vet(&self, ctx: &AnalysisContext<'_>) -> Result<Vec<Finding>> {
        if let Some(error) = ctx.resolver.mesh_policy_error() {
            return Ok(vec![unavailable(&format!("the MeshPolicy is invalid: {}", error))]);
        }
        if !ctx.resolver.mtls_enabled_anywhere() {
            return Ok(vec![unavailable("no authentication policy enables mTLS")]);
        }

        let sidecar = ctx.config.sidecar_container_name.as_str();
        let mut findings = Vec::new();

        for pod in ctx.snapshot.pods.iter().filter(|p| p.has_container(sidecar)) {
            let owners: Vec<&KubeService> =
                ctx.snapshot.services.iter().filter(|s| s.selects(pod)).collect();
            let rewrite_http = ctx.config.rewrite_app_http_probes
                || pod.annotation_enabled(REWRITE_PROBES_ANNOTATION);

            for container in pod.spec.containers.iter().filter(|c| c.name != sidecar) {
                for (label, probe) in container.probes() {
                    if matches!(probe, Probe::HttpGet { .. }) && rewrite_http {
                        debug!(
                            pod = %pod.metadata.qualified_name(),
                            container = %container.name,
                            probe = label,
                            "HTTP probe rewritten by sidecar"
                        );
                        continue;
                    }
                    findings.extend(check_probe(ctx, pod, &owners, container, label, probe));
                }
            }
        }

        Ok(findings)
    }
}

fn check_probe(
    ctx: &AnalysisContext<'_>,
    pod: &Pod,
    owners: &[&KubeService],
    container: &Container,
    label: &str,
    probe: &Probe,
) -> Option<Finding> {
    let port = probe.port()?;
    let Some((container_port, port_name)) = container.resolve_port(port) else {
        debug!(
            pod = %pod.metadata.qualified_name(),
            container = %container.name,
            port = %port,
            "Probe names an undeclared container port"
        );
        return None;
    };

    // A pod no service selects is still covered by namespace and mesh policies.
    let lookups: Vec<(Service, u32)> = if owners.is_empty() {
        vec![(Service::new("", pod.namespace()), container_port)]
    } else {
        owners
            .iter()
            .map(|owner| {
                let service_port = owner
                    .port_for_container(container_port, port_name)
                    .map(|p| p.port)
                    .unwrap_or(container_port);
                (owner.service(), service_port)
            })
            .collect()
    };

    // With several owning services the strictest state decides.
    let (severity, state) = lookups
        .into_iter()
        .filter_map(|(service, service_port)| {
            let state: MtlsState =
                ctx.resolver.authn(&service, service_port).map(|r| r.state).unwrap_or_default();
            if !state.may_require_mtls() {
                return None;
            }
            let severity = if state.is_enabled() { Severity::Error } else { Severity::Warning };
            Some((severity, state))
        })
        .max_by_key(|(severity, _)| *severity)?;

    Some(
        Finding::new(FindingKind::MtlsProbeConflict, severity)
            .with_attr("namespace", pod.namespace())
            .with_attr("pod", pod.name())
            .with_attr("container", &container.name)
            .with_attr("probe", format!("{} {}", label, probe.kind()))
            .with_attr("port", container_port)
            .with_attr("mtls_state", state),
    )
}

fn unavailable(reason: &str) -> Finding {
    info!(reason, "Skipping mTLS probe check");
    Finding::new(FindingKind::MtlsProbesUnavailable, Severity::Info).with_attr("reason", reason)
}
