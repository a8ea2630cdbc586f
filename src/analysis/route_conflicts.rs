//! VirtualService route conflicts
//!
//! Routes are grouped by (normalized host, gateway). Within a group every unordered
//! pair of URI matches is tested with [`overlaps`]; a pair that can match the same
//! request is reported once. Pairs inside one route are skipped since a route's
//! matches are alternatives leading to the same destination.

use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, warn};

use super::{invalid_host_finding, join_names, AnalysisContext, Finding, FindingKind, Severity, Vetter};
use crate::domain::{HostNormalizer, MatchType, UriMatch, VirtualService};
use crate::errors::Result;

/// One URI match, by position in the input
#[derive(Debug, Clone, Copy)]
struct RouteEntry<'a> {
    vs: usize,
    route: usize,
    uri: &'a UriMatch,
}

type GroupKey = (String, String);

/// Checks VirtualServices for overlapping routes
#[derive(Debug, Default, Clone, Copy)]
pub struct RouteConflictVetter;

impl Vetter for RouteConflictVetter {
    fn name(&self) -> &'static str {
        "route-conflicts"
    }

    fn vet(&self, ctx: &AnalysisContext<'_>) -> Result<Vec<Finding>> {
        Ok(detect_route_conflicts(
            &ctx.snapshot.virtual_services,
            ctx.normalizer,
            &ctx.config.default_gateway,
        ))
    }
}

/// Whether two URI matches can accept the same request path.
///
/// Prefixes are compared on path-segment boundaries, so `/foo` covers `/foo/bar` but
/// not `/foobar`. Regexes cannot be proven disjoint and always overlap.
pub fn overlaps(a: &UriMatch, b: &UriMatch) -> bool {
    match (a, b) {
        (UriMatch::Regex(_), _) | (_, UriMatch::Regex(_)) => true,
        (UriMatch::Exact(x), UriMatch::Exact(y)) => x == y,
        (UriMatch::Exact(path), UriMatch::Prefix(prefix))
        | (UriMatch::Prefix(prefix), UriMatch::Exact(path)) => is_segment_ancestor(prefix, path),
        (UriMatch::Prefix(x), UriMatch::Prefix(y)) => {
            is_segment_ancestor(x, y) || is_segment_ancestor(y, x)
        }
    }
}

/// `ancestor` equals `path` or is a prefix of it ending on a `/` boundary.
fn is_segment_ancestor(ancestor: &str, path: &str) -> bool {
    match path.strip_prefix(ancestor) {
        Some("") => true,
        Some(rest) => ancestor.ends_with('/') || rest.starts_with('/'),
        None => false,
    }
}

/// Report every overlapping pair of routes sharing a host and gateway.
///
/// VirtualServices with a host that does not normalize are skipped entirely and
/// reported as `invalid-host`.
pub fn detect_route_conflicts(
    virtual_services: &[VirtualService],
    normalizer: &HostNormalizer,
    implicit_gateway: &str,
) -> Vec<Finding> {
    let mut findings = Vec::new();
    let groups = build_groups(virtual_services, normalizer, implicit_gateway, &mut findings);

    let mut seen = BTreeSet::new();
    for ((host, gateway), entries) in &groups {
        if entries.len() < 2 {
            continue;
        }

        for (i, a) in entries.iter().enumerate() {
            for b in &entries[i + 1..] {
                if a.vs == b.vs && a.route == b.route {
                    continue;
                }
                if !overlaps(a.uri, b.uri) {
                    continue;
                }

                let finding = conflict_finding(virtual_services, host, gateway, a, b);
                if seen.insert(finding.id()) {
                    debug!(
                        host = %host,
                        gateway = %gateway,
                        vs_names = finding.attr("vs_names").unwrap_or_default(),
                        "Route overlap detected"
                    );
                    findings.push(finding);
                }
            }
        }
    }

    findings
}

fn build_groups<'a>(
    virtual_services: &'a [VirtualService],
    normalizer: &HostNormalizer,
    implicit_gateway: &str,
    findings: &mut Vec<Finding>,
) -> BTreeMap<GroupKey, Vec<RouteEntry<'a>>> {
    let mut groups: BTreeMap<GroupKey, Vec<RouteEntry<'a>>> = BTreeMap::new();

    for (vs_index, vs) in virtual_services.iter().enumerate() {
        let hosts = match normalized_hosts(vs, normalizer) {
            Ok(hosts) => hosts,
            Err(finding) => {
                findings.push(*finding);
                continue;
            }
        };

        // Ambiguity across several regexes is not resolved; leave them all out.
        let skip_regex = vs.regex_match_count() >= 2;
        if skip_regex {
            debug!(
                virtual_service = %vs.qualified_name(),
                "Excluding regex matches from conflict checks"
            );
        }

        for gateway in vs.effective_gateways(implicit_gateway) {
            for host in &hosts {
                let group = groups.entry((host.clone(), gateway.to_string())).or_default();
                for (route_index, route) in vs.spec.http.iter().enumerate() {
                    for uri in route.uri_matches() {
                        if skip_regex && uri.match_type() == MatchType::Regex {
                            continue;
                        }
                        group.push(RouteEntry { vs: vs_index, route: route_index, uri });
                    }
                }
            }
        }
    }

    groups
}

fn normalized_hosts(
    vs: &VirtualService,
    normalizer: &HostNormalizer,
) -> std::result::Result<BTreeSet<String>, Box<Finding>> {
    let mut hosts = BTreeSet::new();
    for host in &vs.spec.hosts {
        match normalizer.normalize(host, vs.namespace()) {
            Ok(normalized) => {
                hosts.insert(normalized);
            }
            Err(error) => {
                warn!(
                    virtual_service = %vs.qualified_name(),
                    host = %host,
                    error = %error,
                    "Skipping VirtualService with invalid host"
                );
                return Err(Box::new(invalid_host_finding(
                    "VirtualService",
                    &vs.qualified_name(),
                    vs.namespace(),
                    host,
                    &error,
                )));
            }
        }
    }
    Ok(hosts)
}

fn conflict_finding(
    virtual_services: &[VirtualService],
    host: &str,
    gateway: &str,
    a: &RouteEntry<'_>,
    b: &RouteEntry<'_>,
) -> Finding {
    // Route positions stay out of the finding so declaration order cannot change it.
    let describe =
        |entry: &RouteEntry<'_>| (virtual_services[entry.vs].qualified_name(), entry.uri.to_string());
    let mut sides = [describe(a), describe(b)];
    sides.sort();
    let [first, second] = sides;

    Finding::new(FindingKind::VsRouteConflict, Severity::Warning)
        .with_attr("host", host)
        .with_attr("gateway", gateway)
        .with_attr("vs_names", join_names([&first.0, &second.0]))
        .with_attr("routes", join_names([&first.1, &second.1]))
}
