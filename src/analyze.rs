//! Query execution and results interpretation.
//!
//! Languages are analyzed one after another against their finalized
//! databases. The execution strategy is chosen once per run from the engine's
//! capabilities. The first failure stops the run; the status report collected
//! up to that point travels with the error.

use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use tracing::{debug, info, info_span, Instrument};

use crate::config::Config;
use crate::count_loc::LineCountTask;
use crate::engine::{Capabilities, Engine, ExecutionStrategy, InterpretOptions};
use crate::environment::{EnvironmentContext, DEBUG_LOC};
use crate::error::{AnalysisError, Error, Result};
use crate::filters::{validate_query_filters, QueryFilter};
use crate::languages::Language;
use crate::sarif::{inject_lines_of_code, print_lines_of_code_summary};
use crate::status::{Phase, QueriesStatusReport};
use crate::suite::{create_pack_suite_contents, create_query_suite_contents};

/// Flags and locations for a query run. Flags are forwarded to the engine
/// verbatim; empty flags are omitted.
#[derive(Debug, Clone, Default)]
pub struct QueryRunOptions {
    /// Directory receiving one findings report per language.
    pub sarif_folder: PathBuf,
    pub memory_flag: String,
    pub threads_flag: String,
    pub add_snippets_flag: String,
    /// Category attached to every findings report.
    pub automation_details_id: Option<String>,
    /// Root of the checked-out sources, used for independent line counting.
    pub source_root: PathBuf,
}

/// Path of the suite descriptor written for one query group,
/// `<database>-queries-<kind>.qls`.
pub fn query_suite_path(database_path: &Path, kind: &str) -> PathBuf {
    let mut path = OsString::from(database_path.as_os_str());
    path.push(format!("-queries-{}.qls", kind));
    PathBuf::from(path)
}

/// Fail on the first language with nothing configured to run.
fn check_queries_selected(config: &Config) -> Result<()> {
    for &language in &config.languages {
        if !config.has_queries(language) {
            return Err(Error::NoQueriesSelected { language });
        }
    }
    Ok(())
}

/// Run the configured queries for every language and interpret the results.
///
/// Filters and query selection are checked for all languages before any
/// engine process is started. Returns the per-language timings, or an
/// [`AnalysisError`] carrying the timings collected before the failure.
pub async fn run_queries<E: Engine + ?Sized>(
    engine: &E,
    config: &Config,
    env: &EnvironmentContext,
    options: &QueryRunOptions,
) -> std::result::Result<QueriesStatusReport, AnalysisError> {
    let mut report = QueriesStatusReport::new();

    let filters = match validate_query_filters(config.query_filters.as_ref()) {
        Ok(filters) => filters,
        Err(e) => return Err(AnalysisError::new(report, None, e)),
    };
    if let Err(e) = check_queries_selected(config) {
        let language = match &e {
            Error::NoQueriesSelected { language } => Some(*language),
            _ => None,
        };
        return Err(AnalysisError::new(report, language, e));
    }

    let capabilities =
        match Capabilities::probe(engine, config.code_scanning_config_in_cli).await {
            Ok(capabilities) => capabilities,
            Err(e) => return Err(AnalysisError::new(report, None, e.into())),
        };
    let strategy = capabilities.execution_strategy();
    debug!(version = %capabilities.version, ?strategy, "selected execution strategy");

    let count_independently =
        !capabilities.counts_lines || config.debug_mode || env.is_set(DEBUG_LOC);
    // Counting overlaps with query execution and is awaited only when needed.
    let line_counts = count_independently.then(|| {
        LineCountTask::spawn(
            options.source_root.clone(),
            config.paths.clone(),
            config.paths_ignore.clone(),
            config.languages.clone(),
        )
    });

    let run = LanguageRun {
        engine,
        config,
        env,
        options,
        filters: &filters,
        capabilities,
        strategy,
        line_counts: line_counts.as_ref(),
    };

    for &language in &config.languages {
        if let Err(e) = run.analyze(language, &mut report).await {
            info!("{}", e);
            return Err(AnalysisError::new(report, Some(language), e));
        }
    }

    Ok(report)
}

/// Shared state for analyzing each language of a run.
struct LanguageRun<'a, E: ?Sized> {
    engine: &'a E,
    config: &'a Config,
    env: &'a EnvironmentContext,
    options: &'a QueryRunOptions,
    filters: &'a [QueryFilter],
    capabilities: Capabilities,
    strategy: ExecutionStrategy,
    line_counts: Option<&'a LineCountTask>,
}

impl<E: Engine + ?Sized> LanguageRun<'_, E> {
    async fn analyze(&self, language: Language, report: &mut QueriesStatusReport) -> Result<()> {
        let database_path = self.config.database_path(language);

        let suite_paths = match self.strategy {
            ExecutionStrategy::Unified => {
                self.run_unified(language, &database_path, report)
                    .instrument(info_span!("run_queries", %language))
                    .await?;
                None
            }
            ExecutionStrategy::Legacy => Some(
                self.run_legacy(language, &database_path, report)
                    .instrument(info_span!("run_queries", %language))
                    .await?,
            ),
        };

        let summary = self
            .interpret(language, &database_path, suite_paths.as_deref(), report)
            .instrument(info_span!("interpret_results", %language))
            .await?;
        info!("{}", summary);

        if let Some(task) = self.line_counts {
            print_lines_of_code_summary(language, &*task.get().await);
        }
        if self.capabilities.counts_lines {
            let baseline = self
                .engine
                .database_print_baseline(&database_path, self.env)
                .await?;
            info!("{}", baseline.trim());
        }
        Ok(())
    }

    /// One engine call runs the whole configuration for the language.
    async fn run_unified(
        &self,
        language: Language,
        database_path: &Path,
        report: &mut QueriesStatusReport,
    ) -> Result<()> {
        info!("Running queries for {}", language);
        let start = Instant::now();
        self.engine
            .database_run_queries(
                database_path,
                None,
                None,
                &self.options.memory_flag,
                &self.options.threads_flag,
                self.env,
            )
            .await?;
        // The report has no key for the combined run.
        report.record(Phase::BuiltinQueries, language, start.elapsed());
        Ok(())
    }

    /// Builtin, custom and pack groups each run from their own suite file.
    /// Returns the suite files that were run.
    async fn run_legacy(
        &self,
        language: Language,
        database_path: &Path,
        report: &mut QueriesStatusReport,
    ) -> Result<Vec<PathBuf>> {
        info!("Running queries for {}", language);
        let queries = self.config.queries_for(language);
        let packs = self.config.packs_for(language);
        let mut suite_paths = Vec::new();

        if !queries.builtin.is_empty() {
            let start = Instant::now();
            let contents = create_query_suite_contents(&queries.builtin, self.filters)?;
            suite_paths.push(
                self.run_query_group(language, database_path, "builtin", &contents, None)
                    .await?,
            );
            report.record(Phase::BuiltinQueries, language, start.elapsed());
        }

        let mut custom_time = Duration::ZERO;
        let mut ran_custom = false;
        for (i, group) in queries.custom.iter().enumerate() {
            if group.queries.is_empty() {
                continue;
            }
            let start = Instant::now();
            let contents = create_query_suite_contents(&group.queries, self.filters)?;
            suite_paths.push(
                self.run_query_group(
                    language,
                    database_path,
                    &format!("custom-{}", i),
                    &contents,
                    group.search_path.as_deref(),
                )
                .await?,
            );
            custom_time += start.elapsed();
            ran_custom = true;
        }

        if !packs.is_empty() {
            let start = Instant::now();
            let contents = create_pack_suite_contents(packs, self.filters)?;
            suite_paths.push(
                self.run_query_group(language, database_path, "packs", &contents, None)
                    .await?,
            );
            custom_time += start.elapsed();
            ran_custom = true;
        }

        if ran_custom {
            report.record(Phase::CustomQueries, language, custom_time);
        }
        Ok(suite_paths)
    }

    /// Write a suite descriptor next to the database and run it.
    async fn run_query_group(
        &self,
        language: Language,
        database_path: &Path,
        kind: &str,
        contents: &str,
        search_path: Option<&str>,
    ) -> Result<PathBuf> {
        // Suites go through a file rather than the command line, which has
        // length limits on some platforms.
        let suite_path = query_suite_path(database_path, kind);
        fs::write(&suite_path, contents)?;
        debug!(
            "Query suite file for {}-{}...\n{}",
            language, kind, contents
        );

        self.engine
            .database_run_queries(
                database_path,
                search_path,
                Some(&suite_path),
                &self.options.memory_flag,
                &self.options.threads_flag,
                self.env,
            )
            .await?;
        debug!("BQRS results produced for {} (queries: {})", language, kind);
        Ok(suite_path)
    }

    /// Interpret results into `<sarif_folder>/<language>.sarif`, injecting
    /// the counted baseline when the engine cannot provide one.
    async fn interpret(
        &self,
        language: Language,
        database_path: &Path,
        suite_paths: Option<&[PathBuf]>,
        report: &mut QueriesStatusReport,
    ) -> Result<String> {
        info!("Interpreting results for {}", language);
        let start = Instant::now();
        let sarif_file = self.options.sarif_folder.join(format!("{}.sarif", language));
        let verbosity = if self.config.debug_mode { "-vv" } else { "-v" };

        let summary = self
            .engine
            .database_interpret_results(
                database_path,
                InterpretOptions {
                    queries: suite_paths,
                    output: &sarif_file,
                    snippets_flag: &self.options.add_snippets_flag,
                    threads_flag: &self.options.threads_flag,
                    verbosity,
                    automation_details_id: self.options.automation_details_id.as_deref(),
                },
                self.env,
            )
            .await?;

        if !self.capabilities.counts_lines {
            if let Some(task) = self.line_counts {
                inject_lines_of_code(&sarif_file, language, &*task.get().await)?;
            }
        }
        report.record(Phase::InterpretResults, language, start.elapsed());
        Ok(summary)
    }
}
