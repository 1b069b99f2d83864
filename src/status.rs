//! Timing and status reporting for a pipeline run.
//!
//! The report is built incrementally as languages are processed and is either
//! returned at the end of a run or attached to the error that ended it.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::languages::Language;

/// The timed phases of query execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Running the builtin suite (or the single unified suite).
    BuiltinQueries,
    /// Running custom query groups and packs.
    CustomQueries,
    /// Converting raw results into a findings report.
    InterpretResults,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::BuiltinQueries => "analyze_builtin_queries",
            Phase::CustomQueries => "analyze_custom_queries",
            Phase::InterpretResults => "interpret_results",
        }
    }

    /// Report key for this phase and language, e.g. `interpret_results_go_duration_ms`.
    pub fn key(&self, language: Language) -> String {
        format!("{}_{}_duration_ms", self.as_str(), language)
    }
}

/// Per-language, per-phase timings plus the first language that failed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueriesStatusReport {
    #[serde(flatten)]
    durations: BTreeMap<String, u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    analyze_failure_language: Option<Language>,
}

impl QueriesStatusReport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the duration of a phase for a language.
    pub fn record(&mut self, phase: Phase, language: Language, duration: Duration) {
        self.durations
            .insert(phase.key(language), duration.as_millis() as u64);
    }

    /// Look up a recorded duration by its full key.
    pub fn get(&self, key: &str) -> Option<u64> {
        self.durations.get(key).copied()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.durations.contains_key(key)
    }

    /// All recorded durations, ordered by key.
    pub fn durations(&self) -> &BTreeMap<String, u64> {
        &self.durations
    }

    /// Mark the language whose analysis failed.
    ///
    /// Only the first failure is kept; returns false if one was already set.
    pub fn set_failure_language(&mut self, language: Language) -> bool {
        if self.analyze_failure_language.is_some() {
            return false;
        }
        self.analyze_failure_language = Some(language);
        true
    }

    pub fn failure_language(&self) -> Option<Language> {
        self.analyze_failure_language
    }

    pub fn is_empty(&self) -> bool {
        self.durations.is_empty() && self.analyze_failure_language.is_none()
    }
}

/// Timings for the extraction and finalization steps.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseCreationTimings {
    pub scanned_language_extraction_duration_ms: u64,
    pub trap_import_duration_ms: u64,
}
