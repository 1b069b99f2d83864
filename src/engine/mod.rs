//! Command interface to the external analysis engine.
//!
//! The pipeline only talks to the engine through the [`Engine`] trait. The
//! production implementation, [`CodeQl`], runs the engine's command-line
//! interface as a child process; tests substitute a recording fake.

mod codeql;
pub mod version;

pub use codeql::CodeQl;
pub use version::{Capabilities, EngineVersion, ExecutionStrategy};

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use thiserror::Error;

use crate::environment::EnvironmentContext;
use crate::languages::Language;

/// Errors raised while invoking the engine.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("failed to run {command}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{command} failed with exit code {code}: {stderr}")]
    CommandFailed {
        command: String,
        code: i32,
        stderr: String,
    },
    #[error("could not parse engine version {0:?}")]
    Version(String),
    #[error("unexpected engine output: {0}")]
    Output(String),
}

/// Arguments for interpreting raw query results into a findings report.
#[derive(Debug, Clone)]
pub struct InterpretOptions<'a> {
    /// Suite files whose results should be interpreted; `None` interprets
    /// everything the database holds.
    pub queries: Option<&'a [PathBuf]>,
    pub output: &'a Path,
    pub snippets_flag: &'a str,
    pub threads_flag: &'a str,
    pub verbosity: &'a str,
    pub automation_details_id: Option<&'a str>,
}

/// The verbs the pipeline consumes from the engine.
///
/// Flags are opaque strings forwarded verbatim. Every call that spawns an
/// engine process receives the environment context it must run under.
#[async_trait]
pub trait Engine: Send + Sync {
    /// Report the engine version.
    async fn version(&self) -> Result<EngineVersion, EngineError>;

    /// Extract a database for a language that is not traced from a build.
    async fn extract_scanned_language(
        &self,
        database_path: &Path,
        language: Language,
        env: &EnvironmentContext,
    ) -> Result<(), EngineError>;

    /// Seal a database so it can be queried.
    async fn finalize_database(
        &self,
        database_path: &Path,
        threads_flag: &str,
        memory_flag: &str,
        env: &EnvironmentContext,
    ) -> Result<(), EngineError>;

    /// Run a query suite (or the configured defaults) against a database.
    async fn database_run_queries(
        &self,
        database_path: &Path,
        search_path: Option<&str>,
        suite_path: Option<&Path>,
        memory_flag: &str,
        threads_flag: &str,
        env: &EnvironmentContext,
    ) -> Result<(), EngineError>;

    /// Write a findings report and return the engine's analysis summary.
    async fn database_interpret_results(
        &self,
        database_path: &Path,
        options: InterpretOptions<'_>,
        env: &EnvironmentContext,
    ) -> Result<String, EngineError>;

    /// Return the engine's own lines-of-code summary for a database.
    async fn database_print_baseline(
        &self,
        database_path: &Path,
        env: &EnvironmentContext,
    ) -> Result<String, EngineError>;

    /// Trim a database down to the given cleanup level.
    async fn database_cleanup(
        &self,
        database_path: &Path,
        cleanup_level: &str,
        env: &EnvironmentContext,
    ) -> Result<(), EngineError>;
}
