//! Output formatting for pipeline results.
//!
//! Two outputs are produced:
//! - JSON on stdout, consumed by telemetry and upload tooling
//! - a colored one-line summary on stderr for humans

use std::io::{self, Write};

use colored::*;
use serde::Serialize;

use crate::error::AnalysisError;
use crate::status::{DatabaseCreationTimings, QueriesStatusReport};

/// JSON document printed for a run.
#[derive(Debug, Serialize)]
pub struct RunOutput<'a> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database_creation: Option<&'a DatabaseCreationTimings>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub queries: Option<&'a QueriesStatusReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Write `output` as pretty JSON to stdout.
pub fn write_json(output: &RunOutput<'_>) -> anyhow::Result<()> {
    let stdout = io::stdout();
    let mut handle = stdout.lock();
    serde_json::to_writer_pretty(&mut handle, output)?;
    writeln!(handle)?;
    Ok(())
}

/// Total of all recorded durations.
fn total_ms(report: &QueriesStatusReport) -> u64 {
    report.durations().values().sum()
}

fn format_ms(ms: u64) -> String {
    if ms >= 1000 {
        format!("{:.1}s", ms as f64 / 1000.0)
    } else {
        format!("{}ms", ms)
    }
}

/// Summary of a finished finalize step.
pub fn write_finalize_summary(timings: &DatabaseCreationTimings) {
    eprintln!(
        "  {}  Extraction: {}  Finalization: {}",
        "✓ FINALIZED".green(),
        format_ms(timings.scanned_language_extraction_duration_ms).bold(),
        format_ms(timings.trap_import_duration_ms).bold()
    );
}

/// Summary of a successful query run.
pub fn write_analysis_summary(report: &QueriesStatusReport) {
    let interpreted = report
        .durations()
        .keys()
        .filter(|k| k.starts_with("interpret_results_"))
        .count();
    let plural = if interpreted != 1 { "s" } else { "" };
    eprintln!(
        "  {}  {} language{} analyzed in {}",
        "✓ PASS".green(),
        interpreted.to_string().bold(),
        plural,
        format_ms(total_ms(report)).bold()
    );
}

/// Summary of a failed query run.
pub fn write_failure_summary(err: &AnalysisError) {
    let language = err
        .language
        .map(|l| l.to_string())
        .unwrap_or_else(|| "-".to_string());
    eprintln!(
        "  {}  Language: {}  {}",
        "✗ FAIL".red(),
        language.yellow().bold(),
        format!("({} collected before failure)", format_ms(total_ms(&err.report))).dimmed()
    );
    eprintln!("    {}", err.source);
}
