//! Output formatting for CLI commands
//!
//! Reports and configuration print as JSON, YAML or a table. Machine formats go to
//! stdout untouched; only the table is colored.

use anyhow::{Context, Result};
use owo_colors::OwoColorize;
use serde::Serialize;

use crate::analysis::{Note, Report, Severity};

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Json,
    Yaml,
    Table,
}

impl std::str::FromStr for OutputFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "json" => Ok(OutputFormat::Json),
            "yaml" => Ok(OutputFormat::Yaml),
            "table" => Ok(OutputFormat::Table),
            _ => anyhow::bail!("Unsupported output format: '{}'. Use 'json', 'yaml', or 'table'.", s),
        }
    }
}

/// Print an analysis report
pub fn print_report(report: &Report, format: OutputFormat) -> Result<()> {
    let notes = report.notes();
    match format {
        OutputFormat::Json => print_json(&notes),
        OutputFormat::Yaml => print_yaml(&notes),
        OutputFormat::Table => {
            print!("{}", render_table(&notes, true));
            Ok(())
        }
    }
}

/// Print data as JSON
pub fn print_json<T: Serialize>(data: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(data).context("Failed to serialize to JSON")?;
    println!("{}", json);
    Ok(())
}

/// Print data as YAML
pub fn print_yaml<T: Serialize>(data: &T) -> Result<()> {
    let yaml = serde_yaml::to_string(data).context("Failed to serialize to YAML")?;
    println!("{}", yaml);
    Ok(())
}

/// Print data as TOML
pub fn print_toml<T: Serialize>(data: &T) -> Result<()> {
    let toml = toml::to_string_pretty(data).context("Failed to serialize to TOML")?;
    println!("{}", toml);
    Ok(())
}

const COLUMNS: [(&str, usize); 4] = [("SEVERITY", 8), ("ID", 12), ("KIND", 24), ("MESSAGE", 0)];

/// Render notes as a table, one row per note with the full message last
pub fn render_table(notes: &[Note], color: bool) -> String {
    if notes.is_empty() {
        return "No findings.\n".to_string();
    }

    let mut out = String::new();
    for (name, width) in COLUMNS {
        out.push_str(&format!("{:<width$} ", name, width = width));
    }
    out = out.trim_end().to_string();
    out.push('\n');
    let total_width: usize = COLUMNS.iter().map(|(_, w)| w + 1).sum::<usize>() + "MESSAGE".len();
    out.push_str(&"-".repeat(total_width));
    out.push('\n');

    for note in notes {
        let severity = format!("{:<8}", note.severity.to_string());
        let severity = if color { colored(&severity, note.severity) } else { severity };
        out.push_str(&format!(
            "{} {:<12} {:<24} {}\n",
            severity,
            truncate(&note.id, 12),
            truncate(note.kind.code(), 24),
            note.message
        ));
    }

    let errors = notes.iter().filter(|n| n.severity == Severity::Error).count();
    let warnings = notes.iter().filter(|n| n.severity == Severity::Warning).count();
    out.push_str(&format!("\n{} finding(s): {} error(s), {} warning(s)\n", notes.len(), errors, warnings));
    out
}

fn colored(text: &str, severity: Severity) -> String {
    match severity {
        Severity::Error => text.red().to_string(),
        Severity::Warning => text.yellow().to_string(),
        Severity::Info => text.cyan().to_string(),
    }
}

/// Truncate string to at most `max_len` characters
pub fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        s.chars().take(max_len).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{Finding, FindingKind};

    #[test]
    fn test_output_format_from_str() {
        assert_eq!("json".parse::<OutputFormat>().unwrap(), OutputFormat::Json);
        assert_eq!("YAML".parse::<OutputFormat>().unwrap(), OutputFormat::Yaml);
        assert_eq!("table".parse::<OutputFormat>().unwrap(), OutputFormat::Table);
        assert!("xml".parse::<OutputFormat>().is_err());
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("hello", 10), "hello");
        assert_eq!(truncate("hello world", 5), "hello");
        assert_eq!(truncate("héllo", 2), "hé");
    }

    #[test]
    fn test_render_table() {
        let report = Report::from_findings(vec![Finding::new(FindingKind::DrConflict, Severity::Error)
            .with_attr("host", "reviews.bookinfo.svc.cluster.local")
            .with_attr("tier", "name")
            .with_attr("rule_names", "a.bookinfo, b.bookinfo")]);

        let table = render_table(&report.notes(), false);
        let lines: Vec<&str> = table.lines().collect();
        assert!(lines[0].starts_with("SEVERITY ID"));
        assert!(lines[2].starts_with("ERROR    "));
        assert!(lines[2].contains("dr-conflict"));
        assert!(lines[2].contains("DestinationRules a.bookinfo, b.bookinfo"));
        assert!(table.contains("1 finding(s): 1 error(s), 0 warning(s)"));
    }

    #[test]
    fn test_render_empty_table() {
        assert_eq!(render_table(&[], false), "No findings.\n");
    }
}
