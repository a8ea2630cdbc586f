//! Integration tests for the command line layer
//!
//! Configuration files and manifests are written to temporary files; commands run
//! through the same entry points the binary uses.

mod common;

use std::env;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;

use clap::Parser;
use meshcheck::cli::output::{render_table, OutputFormat};
use meshcheck::cli::{analyze_files, fails, load_config, run, Cli};
use meshcheck::{FindingKind, Severity};

// Use a mutex to serialize tests that read or modify environment variables
static ENV_MUTEX: Mutex<()> = Mutex::new(());

const CONFLICTING_RULES: &str = r#"
apiVersion: networking.istio.io/v1alpha3
kind: DestinationRule
metadata:
  name: a
  namespace: shop
spec:
  host: cart
  trafficPolicy:
    tls:
      mode: ISTIO_MUTUAL
---
apiVersion: networking.istio.io/v1alpha3
kind: DestinationRule
metadata:
  name: b
  namespace: shop
spec:
  host: cart.shop.svc.cluster.local
  trafficPolicy:
    tls:
      mode: DISABLE
---
apiVersion: v1
kind: Service
metadata:
  name: cart
  namespace: shop
spec:
  ports:
  - port: 8080
"#;

fn manifest(contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

#[test]
fn test_analyze_fixture_file() {
    let _guard = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());

    let config = load_config(None).unwrap();
    let report = analyze_files(config, &[common::fixture_path("bookinfo.yaml")]).unwrap();
    assert_eq!(report.len(), 6);
    assert!(fails(&report, Some(Severity::Error)));

    let table = render_table(&report.notes(), false);
    assert!(table.contains("vs-route-conflict"));
    assert!(table.contains("6 finding(s): 3 error(s), 3 warning(s)"));
}

#[test]
fn test_analyze_merges_files() {
    let _guard = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());

    let rules = manifest(CONFLICTING_RULES);
    let policies = manifest(
        "apiVersion: authentication.istio.io/v1alpha1\nkind: Policy\nmetadata:\n  name: strict\n  namespace: shop\nspec:\n  peers:\n  - mtls: {}\n",
    );

    let files = vec![rules.path().to_path_buf(), policies.path().to_path_buf()];
    let report = analyze_files(load_config(None).unwrap(), &files).unwrap();
    let kinds: Vec<_> = report.findings.iter().map(|f| f.kind).collect();
    assert_eq!(kinds, vec![FindingKind::DrConflict]);
    assert_eq!(report.findings[0].attr("rule_names"), Some("a.shop, b.shop"));
    assert_eq!(report.findings[0].attr("tier"), Some("name"));
}

#[test]
fn test_hard_failures_are_errors_not_empty_reports() {
    let _guard = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());

    let missing = analyze_files(load_config(None).unwrap(), &[PathBuf::from("/nonexistent/mesh.yaml")]);
    let err = missing.unwrap_err();
    assert!(format!("{:#}", err).contains("Failed to load manifests"));

    let not_yaml = manifest("kind: DestinationRule\nspec: [unterminated\n");
    let err = analyze_files(load_config(None).unwrap(), &[not_yaml.path().to_path_buf()]).unwrap_err();
    assert!(format!("{:#}", err).contains("not valid YAML"));
}

#[test]
fn test_malformed_objects_are_skipped_not_fatal() {
    let _guard = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());

    let manifests = manifest(
        "kind: VirtualService\nmetadata:\n  name: a\n  namespace: shop\nspec:\n  hosts: [cart]\n  http:\n  - match:\n    - uri:\n        prefix: /\n---\nkind: VirtualService\nmetadata:\n  name: b\n  namespace: shop\nspec:\n  hosts: [cart]\n  http:\n  - match:\n    - uri:\n        exact: /checkout\n---\nkind: DestinationRule\nmetadata:\n  name: x\n  namespace: shop\nspec:\n  trafficPolicy: 12\n",
    );
    let report = analyze_files(load_config(None).unwrap(), &[manifests.path().to_path_buf()]).unwrap();

    let invalid: Vec<_> = report.findings.iter().filter(|f| f.kind == FindingKind::InvalidObject).collect();
    assert_eq!(invalid.len(), 1);
    assert_eq!(invalid[0].attr("kind"), Some("DestinationRule"));
    assert_eq!(invalid[0].attr("object"), Some("x.shop"));
    assert_eq!(invalid[0].severity, Severity::Warning);
    assert!(report.findings.iter().any(|f| f.kind == FindingKind::VsRouteConflict));
}

#[test]
fn test_config_file_changes_analysis() {
    let _guard = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());

    let manifests = manifest(
        "kind: VirtualService\nmetadata:\n  name: a\n  namespace: shop\nspec:\n  hosts: [cart]\n  http:\n  - match:\n    - uri:\n        prefix: /\n---\nkind: VirtualService\nmetadata:\n  name: b\n  namespace: shop\nspec:\n  hosts: [cart.shop.svc.corp.internal]\n  http:\n  - match:\n    - uri:\n        exact: /checkout\n",
    );
    let files = vec![manifests.path().to_path_buf()];

    let default_report = analyze_files(load_config(None).unwrap(), &files).unwrap();
    assert!(default_report.findings.iter().all(|f| f.kind != FindingKind::VsRouteConflict));

    let mut config_file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
    writeln!(config_file, "cluster_domain = \"svc.corp.internal\"").unwrap();
    let config = load_config(Some(config_file.path())).unwrap();
    let report = analyze_files(config, &files).unwrap();
    let conflicts: Vec<_> = report.findings.iter().filter(|f| f.kind == FindingKind::VsRouteConflict).collect();
    assert_eq!(conflicts.len(), 1);
    assert_eq!(conflicts[0].attr("host"), Some("cart.shop.svc.corp.internal"));
}

#[test]
fn test_environment_overrides_config_file() {
    let _guard = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());

    let mut config_file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
    writeln!(config_file, "sidecar_container_name = \"envoy\"\nrewrite_app_http_probes = false").unwrap();

    env::set_var("MESHCHECK_REWRITE_APP_HTTP_PROBES", "true");
    let config = load_config(Some(config_file.path()));
    env::remove_var("MESHCHECK_REWRITE_APP_HTTP_PROBES");

    let config = config.unwrap();
    assert_eq!(config.sidecar_container_name, "envoy");
    assert!(config.rewrite_app_http_probes);
}

#[test]
fn test_invalid_config_is_a_hard_failure() {
    let _guard = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());

    let mut config_file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
    writeln!(config_file, "cluster_domain = \"not a domain\"").unwrap();

    let err = load_config(Some(config_file.path())).unwrap_err();
    assert!(format!("{:#}", err).contains("Failed to load configuration"));
}

#[test]
fn test_run_commands() {
    let _guard = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());

    let fixture = common::fixture_path("bookinfo.yaml");
    let fixture = fixture.to_str().unwrap();

    let cli = Cli::try_parse_from(["meshcheck", "analyze", "-f", fixture, "-o", "json"]).unwrap();
    assert!(run(cli).is_ok());

    let cli = Cli::try_parse_from(["meshcheck", "analyze", "-f", fixture, "-o", "xml"]).unwrap();
    assert!(run(cli).is_err());

    let cli = Cli::try_parse_from(["meshcheck", "config", "-o", "yaml"]).unwrap();
    assert!(run(cli).is_ok());

    let cli = Cli::try_parse_from(["meshcheck", "--config", "/nonexistent/meshcheck.toml", "config"]).unwrap();
    assert!(run(cli).is_err());
}

#[test]
fn test_output_formats() {
    assert_eq!("json".parse::<OutputFormat>().unwrap(), OutputFormat::Json);
    assert!("csv".parse::<OutputFormat>().is_err());
}
