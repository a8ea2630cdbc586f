//! # Analysis Engine
//!
//! Pure checks over one [`MeshSnapshot`]. Every pass builds its indices from scratch,
//! runs each registered [`Vetter`] and hands the findings back; nothing survives
//! between passes.
//!
//! ## Checks
//!
//! - [`route_conflicts`]: overlapping VirtualService URI matches per host and gateway
//! - [`policy_keys`]: authentication policies claiming the same namespace, service or port
//! - [`mtls`]: MeshPolicy validity, conflicting DestinationRules, and authentication
//!   state that disagrees with client TLS
//! - [`probes`]: health probes that cannot pass once mTLS is enforced
//!
//! [`precedence`] holds the tiered resolver the mTLS checks share.

pub mod analyzer;
pub mod finding;
pub mod mtls;
pub mod policy_keys;
pub mod precedence;
pub mod probes;
pub mod route_conflicts;
pub mod snapshot;

use crate::config::AnalyzerConfig;
use crate::domain::HostNormalizer;
use crate::errors::{MeshcheckError, Result};

pub use analyzer::{Analyzer, Report};
pub use finding::{Finding, FindingKind, Note, Severity};
pub use mtls::MtlsConsistencyVetter;
pub use policy_keys::{notes_for_policies, PolicyKey, PolicyKeyVetter};
pub use precedence::{ClientTls, MtlsState, PrecedenceResolver, Resolution};
pub use probes::ProbeVetter;
pub use route_conflicts::{overlaps, RouteConflictVetter};
pub use snapshot::{MeshSnapshot, ObjectSource, RejectedObject};

/// Everything a check may read during one pass
pub struct AnalysisContext<'a> {
    pub snapshot: &'a MeshSnapshot,
    pub config: &'a AnalyzerConfig,
    pub normalizer: &'a HostNormalizer,
    pub resolver: &'a PrecedenceResolver<'a>,
}

/// A single check run by the analyzer
pub trait Vetter {
    /// Short name used in logs
    fn name(&self) -> &'static str;

    /// Inspect the snapshot and report findings.
    ///
    /// Malformed records are skipped and reported as findings; an `Err` aborts the pass.
    fn vet(&self, ctx: &AnalysisContext<'_>) -> Result<Vec<Finding>>;
}

/// Finding for a record skipped because one of its hosts does not normalize
pub(crate) fn invalid_host_finding(
    kind: &str,
    qualified_name: &str,
    namespace: &str,
    host: &str,
    error: &MeshcheckError,
) -> Finding {
    let reason = match error {
        MeshcheckError::InvalidHost { reason, .. } => reason.clone(),
        other => other.to_string(),
    };
    Finding::new(FindingKind::InvalidHost, Severity::Warning)
        .with_attr("object", format!("{} {}", kind, qualified_name))
        .with_attr("namespace", namespace)
        .with_attr("host", host)
        .with_attr("reason", reason)
}

/// Join names the way findings present them
pub(crate) fn join_names<I, S>(names: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    names.into_iter().map(|n| n.as_ref().to_string()).collect::<Vec<_>>().join(", ")
}
