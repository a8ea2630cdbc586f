//! # Command Line Interface
//!
//! `meshcheck analyze` loads manifest files, runs one analysis pass and prints the
//! findings; `meshcheck config` prints the effective configuration.
//!
//! Exit status: `0` when the pass completed and nothing met `--fail-on`, `2` when a
//! finding met it, `1` on a hard failure (unreadable input, invalid configuration).

pub mod output;

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::info;

use crate::analysis::{Analyzer, MeshSnapshot, Report, Severity};
use crate::config::AnalyzerConfig;
use crate::observability::{init_logging, log_config_info};
use output::OutputFormat;

/// Exit status when a finding meets `--fail-on`
pub const FINDINGS_EXIT_CODE: u8 = 2;

#[derive(Parser)]
#[command(name = "meshcheck")]
#[command(about = "Istio routing and mTLS policy conflict analyzer")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// TOML configuration file
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Analyze Kubernetes manifests for conflicting mesh configuration
    Analyze {
        /// Manifest files; `-` reads standard input
        #[arg(short = 'f', long = "file", required = true, num_args = 1..)]
        files: Vec<PathBuf>,

        /// Output format (table, json, or yaml)
        #[arg(short, long, default_value = "table")]
        output: String,

        /// Exit with status 2 when any finding is at least this severe (info, warning, error)
        #[arg(long)]
        fail_on: Option<Severity>,
    },

    /// Show the effective configuration
    Config {
        /// Output format (toml, json, or yaml)
        #[arg(short, long, default_value = "toml")]
        output: String,
    },
}

/// Run CLI commands
pub fn run_cli() -> anyhow::Result<ExitCode> {
    run(Cli::parse())
}

/// Run a parsed command line
pub fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let config = load_config(cli.config.as_deref())?;
    init_logging(&config, cli.verbose).context("Failed to initialise logging")?;
    log_config_info(&config);

    match cli.command {
        Commands::Analyze { files, output, fail_on } => {
            let format: OutputFormat = output.parse()?;
            let report = analyze_files(config, &files)?;
            output::print_report(&report, format)?;

            if fails(&report, fail_on) {
                info!(threshold = ?fail_on, "Findings met the failure threshold");
                return Ok(ExitCode::from(FINDINGS_EXIT_CODE));
            }
        }
        Commands::Config { output } => show_config(&config, &output)?,
    }

    Ok(ExitCode::SUCCESS)
}

/// Load and validate configuration from defaults, `path` and the environment
pub fn load_config(path: Option<&Path>) -> anyhow::Result<AnalyzerConfig> {
    AnalyzerConfig::load(path).context("Failed to load configuration")
}

/// Load `files` and run one analysis pass over them
pub fn analyze_files(config: AnalyzerConfig, files: &[PathBuf]) -> anyhow::Result<Report> {
    let snapshot = MeshSnapshot::from_paths(files).context("Failed to load manifests")?;
    info!(files = files.len(), objects = snapshot.object_count(), "Loaded manifests");

    Analyzer::new(config).analyze(&snapshot).context("Analysis failed")
}

/// Whether `report` meets the `--fail-on` threshold
pub fn fails(report: &Report, fail_on: Option<Severity>) -> bool {
    fail_on.is_some_and(|threshold| report.exceeds(threshold))
}

fn show_config(config: &AnalyzerConfig, output_format: &str) -> anyhow::Result<()> {
    match output_format.to_lowercase().as_str() {
        "toml" => output::print_toml(config),
        "json" => output::print_json(config),
        "yaml" => output::print_yaml(config),
        other => anyhow::bail!("Unsupported output format: '{}'. Use 'toml', 'json', or 'yaml'.", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{Finding, FindingKind};
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_analyze() {
        let cli = Cli::try_parse_from([
            "meshcheck", "analyze", "-f", "a.yaml", "b.yaml", "-o", "json", "--fail-on", "warn", "-v",
        ])
        .unwrap();
        assert!(cli.verbose);
        match cli.command {
            Commands::Analyze { files, output, fail_on } => {
                assert_eq!(files, vec![PathBuf::from("a.yaml"), PathBuf::from("b.yaml")]);
                assert_eq!(output, "json");
                assert_eq!(fail_on, Some(Severity::Warning));
            }
            Commands::Config { .. } => panic!("expected analyze"),
        }
    }

    #[test]
    fn test_analyze_requires_files() {
        assert!(Cli::try_parse_from(["meshcheck", "analyze"]).is_err());
        assert!(Cli::try_parse_from(["meshcheck", "analyze", "-f", "x", "--fail-on", "fatal"]).is_err());
    }

    #[test]
    fn test_fail_on_threshold() {
        let report = Report::from_findings(vec![Finding::new(FindingKind::VsRouteConflict, Severity::Warning)]);
        assert!(!fails(&report, None));
        assert!(fails(&report, Some(Severity::Warning)));
        assert!(fails(&report, Some(Severity::Info)));
        assert!(!fails(&report, Some(Severity::Error)));
        assert!(!fails(&Report::default(), Some(Severity::Info)));
    }

    #[test]
    fn test_show_config_rejects_unknown_format() {
        assert!(show_config(&AnalyzerConfig::default(), "ini").is_err());
    }
}
