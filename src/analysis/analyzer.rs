//! Analysis passes
//!
//! An [`Analyzer`] owns its configuration and the registered checks. Each call to
//! [`Analyzer::analyze`] lists a fresh snapshot, runs every check against it and
//! returns a deduplicated, ordered [`Report`].

use std::collections::BTreeSet;

use serde::Serialize;
use tracing::{debug, info, warn};

use super::mtls::configuration_finding;
use super::{
    AnalysisContext, Finding, MeshSnapshot, MtlsConsistencyVetter, Note, ObjectSource, PolicyKeyVetter,
    PrecedenceResolver, ProbeVetter, RejectedObject, RouteConflictVetter, Severity, Vetter,
};
use crate::analysis_span;
use crate::config::AnalyzerConfig;
use crate::domain::HostNormalizer;
use crate::errors::Result;

/// Runs the registered checks over object snapshots
pub struct Analyzer {
    config: AnalyzerConfig,
    vetters: Vec<Box<dyn Vetter>>,
}

impl Analyzer {
    /// Analyzer with the built-in checks
    pub fn new(config: AnalyzerConfig) -> Self {
        Self {
            config,
            vetters: vec![
                Box::new(RouteConflictVetter),
                Box::new(PolicyKeyVetter),
                Box::new(MtlsConsistencyVetter),
                Box::new(ProbeVetter),
            ],
        }
    }

    /// Analyzer with no checks registered
    pub fn empty(config: AnalyzerConfig) -> Self {
        Self { config, vetters: Vec::new() }
    }

    pub fn with_vetter(mut self, vetter: Box<dyn Vetter>) -> Self {
        self.vetters.push(vetter);
        self
    }

    pub fn config(&self) -> &AnalyzerConfig {
        &self.config
    }

    /// Names of the registered checks, in run order
    pub fn vetter_names(&self) -> Vec<&'static str> {
        self.vetters.iter().map(|v| v.name()).collect()
    }

    /// List every object kind from `source` and analyze the result.
    ///
    /// A listing failure fails the pass; no partial report is produced.
    pub fn analyze(&self, source: &dyn ObjectSource) -> Result<Report> {
        let snapshot = MeshSnapshot::collect(source)?;
        self.analyze_snapshot(&snapshot)
    }

    /// Analyze an already listed snapshot
    pub fn analyze_snapshot(&self, snapshot: &MeshSnapshot) -> Result<Report> {
        let normalizer = HostNormalizer::new(&self.config.cluster_domain);
        let resolver = PrecedenceResolver::new(snapshot, &normalizer, &self.config.mesh_policy_name);
        let ctx = AnalysisContext { snapshot, config: &self.config, normalizer: &normalizer, resolver: &resolver };

        let mut findings: Vec<Finding> = snapshot.rejected.iter().map(RejectedObject::finding).collect();
        for vetter in &self.vetters {
            let span = analysis_span!(vetter.name(), objects = snapshot.object_count());
            let _enter = span.enter();

            let produced = match vetter.vet(&ctx) {
                Ok(produced) => produced,
                // A check that gives up on one record loses only its own findings.
                Err(error) if error.is_recoverable() => {
                    warn!(error = %error, "Check stopped on a malformed record");
                    configuration_finding(&error).into_iter().collect()
                }
                Err(error) => return Err(error),
            };
            debug!(findings = produced.len(), "Check complete");
            findings.extend(produced);
        }

        let report = Report::from_findings(findings);
        info!(
            findings = report.len(),
            errors = report.count(Severity::Error),
            warnings = report.count(Severity::Warning),
            "Analysis complete"
        );
        Ok(report)
    }
}

/// Findings of one pass, deduplicated by id and ordered by kind and attributes
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Report {
    pub findings: Vec<Finding>,
}

impl Report {
    /// Deduplicate and order `findings`; the first finding with a given id is kept.
    pub fn from_findings(findings: Vec<Finding>) -> Self {
        let mut seen = BTreeSet::new();
        let mut findings: Vec<Finding> = findings.into_iter().filter(|f| seen.insert(f.id())).collect();
        findings.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
        Self { findings }
    }

    pub fn len(&self) -> usize {
        self.findings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.findings.is_empty()
    }

    pub fn count(&self, severity: Severity) -> usize {
        self.findings.iter().filter(|f| f.severity == severity).count()
    }

    pub fn max_severity(&self) -> Option<Severity> {
        self.findings.iter().map(|f| f.severity).max()
    }

    /// Whether any finding is at least `threshold`
    pub fn exceeds(&self, threshold: Severity) -> bool {
        self.max_severity().is_some_and(|s| s >= threshold)
    }

    pub fn notes(&self) -> Vec<Note> {
        self.findings.iter().map(Finding::render).collect()
    }
}
