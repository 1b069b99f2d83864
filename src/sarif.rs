//! Lines-of-code baseline injection into findings reports.
//!
//! A run declares metric results that point at rules through the run's
//! tool extensions. Metrics whose rule is tagged `lines-of-code` receive the
//! independently counted baseline; every other metric is left untouched.

use std::fs;
use std::path::Path;

use serde_json::Value;
use tracing::{debug, info};

use crate::count_loc::LineCounts;
use crate::error::Result;
use crate::languages::Language;

/// Rule tag marking the lines-of-code metric.
pub const LINES_OF_CODE_TAG: &str = "lines-of-code";

/// Resolve the rule a metric result refers to.
fn resolve_rule<'a>(run: &'a Value, metric: &Value) -> Option<&'a Value> {
    let rule = metric.get("rule")?;
    let component = rule.get("toolComponent")?.get("index")?.as_u64()? as usize;
    let index = rule.get("index")?.as_u64()? as usize;
    run.get("tool")?
        .get("extensions")?
        .get(component)?
        .get("rules")?
        .get(index)
}

fn is_lines_of_code_rule(rule: &Value) -> bool {
    rule.get("properties")
        .and_then(|p| p.get("tags"))
        .and_then(Value::as_array)
        .map(|tags| tags.iter().any(|t| t.as_str() == Some(LINES_OF_CODE_TAG)))
        .unwrap_or(false)
}

/// Indices of the metric results in `run` that point at a lines-of-code rule.
fn lines_of_code_metrics(run: &Value) -> Vec<usize> {
    let metrics = match run
        .get("properties")
        .and_then(|p| p.get("metricResults"))
        .and_then(Value::as_array)
    {
        Some(metrics) => metrics,
        None => return Vec::new(),
    };
    metrics
        .iter()
        .enumerate()
        .filter(|(_, metric)| {
            resolve_rule(run, metric)
                .map(is_lines_of_code_rule)
                .unwrap_or(false)
        })
        .map(|(i, _)| i)
        .collect()
}

/// Set the baseline of every lines-of-code metric in `sarif` to `count`.
///
/// Returns the number of metrics updated. Runs without properties or metric
/// results are skipped.
pub fn inject_baseline(sarif: &mut Value, count: u64) -> usize {
    let runs = match sarif.get_mut("runs").and_then(Value::as_array_mut) {
        Some(runs) => runs,
        None => return 0,
    };

    let mut updated = 0;
    for run in runs.iter_mut() {
        let targets = lines_of_code_metrics(run);
        if targets.is_empty() {
            continue;
        }

        if let Some(metrics) = run
            .get_mut("properties")
            .and_then(|p| p.get_mut("metricResults"))
            .and_then(Value::as_array_mut)
        {
            for i in targets {
                if let Some(metric) = metrics.get_mut(i).and_then(Value::as_object_mut) {
                    metric.insert("baseline".to_string(), Value::from(count));
                    updated += 1;
                }
            }
        }
    }
    updated
}

/// Inject the counted baseline for `language` into the report at `sarif_file`.
///
/// Does nothing when no count exists for the language.
pub fn inject_lines_of_code(
    sarif_file: &Path,
    language: Language,
    line_counts: &LineCounts,
) -> Result<()> {
    let count = match line_counts.get(&language) {
        Some(count) => *count,
        None => return Ok(()),
    };

    let content = fs::read_to_string(sarif_file)?;
    let mut sarif: Value = serde_json::from_str(&content)?;
    let updated = inject_baseline(&mut sarif, count);
    debug!(
        "Injected a baseline of {} into {} metric(s) for {}",
        count, updated, language
    );
    if updated > 0 {
        fs::write(sarif_file, serde_json::to_string(&sarif)?)?;
    }
    Ok(())
}

/// Log the counted baseline for a language, if one was counted.
pub fn print_lines_of_code_summary(language: Language, line_counts: &LineCounts) {
    if let Some(count) = line_counts.get(&language) {
        info!(
            "Counted a baseline of {} lines of code for {}.",
            count, language
        );
    }
}
