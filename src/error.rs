//! Error types for the analysis pipeline.

use thiserror::Error;

use crate::engine::EngineError;
use crate::languages::Language;
use crate::status::QueriesStatusReport;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Unable to analyse {language} as no queries were selected for this language")]
    NoQueriesSelected { language: Language },

    #[error("{0}")]
    MalformedInput(String),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("Could not check whether database for {language} was finalized: {reason}")]
    DatabaseStateUnknown { language: Language, reason: String },

    #[error("{command} failed with exit code {code}: {stderr}")]
    CommandFailed {
        command: String,
        code: i32,
        stderr: String,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub fn malformed<S: Into<String>>(msg: S) -> Self {
        Self::MalformedInput(msg.into())
    }

    pub fn config<E: std::fmt::Display>(e: E) -> Self {
        Self::Config(e.to_string())
    }
}

/// The error that ends a query run.
///
/// Carries every timing collected before the failure, along with the language
/// that failed. Failures found before any language is analyzed carry none.
#[derive(Error, Debug)]
#[error(
    "Error running analysis{}: {source}",
    .language.map(|l| format!(" for {}", l)).unwrap_or_default()
)]
pub struct AnalysisError {
    pub report: QueriesStatusReport,
    pub language: Option<Language>,
    #[source]
    pub source: Error,
}

impl AnalysisError {
    /// Record `language` as the failure in `report` and wrap `source`.
    pub fn new(mut report: QueriesStatusReport, language: Option<Language>, source: Error) -> Self {
        if let Some(language) = language {
            report.set_failure_language(language);
        }
        Self {
            report,
            language,
            source,
        }
    }
}
