//! Common test utilities for all integration tests.
//!
//! Provides fixture loading and helpers for running analysis passes.

#![allow(dead_code)]
#![allow(clippy::duplicate_mod)]

use std::path::PathBuf;

use meshcheck::{Analyzer, AnalyzerConfig, Finding, FindingKind, MeshSnapshot, Report};

/// Path of a manifest under `tests/fixtures`
pub fn fixture_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests").join("fixtures").join(name)
}

pub fn load_fixture(name: &str) -> MeshSnapshot {
    MeshSnapshot::from_paths(&[fixture_path(name)]).expect("fixture should load")
}

/// Run a pass with the default configuration
pub fn analyze(snapshot: &MeshSnapshot) -> Report {
    analyze_with(AnalyzerConfig::default(), snapshot)
}

pub fn analyze_with(config: AnalyzerConfig, snapshot: &MeshSnapshot) -> Report {
    Analyzer::new(config).analyze(snapshot).expect("analysis should succeed")
}

/// Findings of one kind, in report order
pub fn of_kind(report: &Report, kind: FindingKind) -> Vec<&Finding> {
    report.findings.iter().filter(|f| f.kind == kind).collect()
}

/// Kinds in report order
pub fn kinds(report: &Report) -> Vec<FindingKind> {
    report.findings.iter().map(|f| f.kind).collect()
}
