//! Command-line interface for qlrun.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::analyze::{run_queries, QueryRunOptions};
use crate::config::{self, Config};
use crate::database::{run_cleanup, run_finalize};
use crate::engine::CodeQl;
use crate::environment::EnvironmentContext;
use crate::report::{self, RunOutput};

/// Exit codes.
pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_FAILED: i32 = 1;
pub const EXIT_ERROR: i32 = 2;

/// Default configuration file names to search for.
const DEFAULT_CONFIG_NAMES: &[&str] = &["qlrun.yaml", "qlrun.yml", ".qlrun.yaml"];

/// Multi-language CodeQL analysis pipeline.
///
/// Extracts and finalizes one database per configured language, runs the
/// configured queries and packs against each, and writes one SARIF report
/// per language.
#[derive(Parser)]
#[command(name = "qlrun")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Verbose engine output and debug logging
    #[arg(long, global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Extract and finalize the databases
    Finalize(FinalizeArgs),
    /// Finalize the databases, then run queries and interpret the results
    Analyze(AnalyzeArgs),
    /// Clean up the databases
    Cleanup(CleanupArgs),
}

/// Options shared by every command.
#[derive(Args)]
pub struct CommonArgs {
    /// Path to the configuration file (default: auto-discover)
    #[arg(short, long)]
    pub config: Option<PathBuf>,
}

/// Resource hints forwarded to the engine.
#[derive(Args)]
pub struct ResourceArgs {
    /// Number of threads the engine may use
    #[arg(long)]
    pub threads: Option<i32>,

    /// Memory the engine may use, in MB
    #[arg(long)]
    pub ram: Option<u32>,
}

impl ResourceArgs {
    fn threads_flag(&self) -> String {
        self.threads
            .map(|n| format!("--threads={}", n))
            .unwrap_or_default()
    }

    fn memory_flag(&self) -> String {
        self.ram.map(|mb| format!("--ram={}", mb)).unwrap_or_default()
    }
}

/// Arguments for the finalize command.
#[derive(Parser)]
pub struct FinalizeArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    #[command(flatten)]
    pub resources: ResourceArgs,

    /// Directory for the SARIF reports (recreated empty)
    #[arg(short, long, default_value = "results")]
    pub output: PathBuf,
}

/// Arguments for the analyze command.
#[derive(Parser)]
pub struct AnalyzeArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    #[command(flatten)]
    pub resources: ResourceArgs,

    /// Directory for the SARIF reports (recreated empty)
    #[arg(short, long, default_value = "results")]
    pub output: PathBuf,

    /// Root of the source tree, used for counting lines of code
    #[arg(long, default_value = ".")]
    pub source_root: PathBuf,

    /// Include code snippets in the SARIF reports
    #[arg(long)]
    pub add_snippets: bool,

    /// Category attached to the SARIF reports
    #[arg(long)]
    pub category: Option<String>,
}

/// Arguments for the cleanup command.
#[derive(Parser)]
pub struct CleanupArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    /// How aggressively to clean up: brutal, normal, light, ...
    #[arg(long, default_value = "brutal")]
    pub cleanup_level: String,
}

/// Discover a configuration file in the current directory.
fn discover_config() -> anyhow::Result<PathBuf> {
    for name in DEFAULT_CONFIG_NAMES {
        let path = PathBuf::from(name);
        if path.exists() {
            return Ok(path);
        }
    }
    anyhow::bail!(
        "no configuration file found (looked for {})",
        DEFAULT_CONFIG_NAMES.join(", ")
    )
}

/// Load and validate the configuration, reporting problems on stderr.
fn load_config(args: &CommonArgs, debug: bool) -> Option<Config> {
    let path = match &args.config {
        Some(p) => p.clone(),
        None => match discover_config() {
            Ok(p) => p,
            Err(e) => {
                eprintln!("Error: {}", e);
                return None;
            }
        },
    };

    let mut config = match Config::parse_file(&path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error parsing configuration {}: {}", path.display(), e);
            return None;
        }
    };

    if let Err(e) = config::validate(&config) {
        eprintln!("Error: invalid configuration: {}", e);
        return None;
    }

    config.debug_mode |= debug;
    Some(config)
}

fn snippets_flag(add_snippets: bool) -> &'static str {
    if add_snippets {
        "--sarif-add-snippets"
    } else {
        "--no-sarif-add-snippets"
    }
}

/// Run the finalize command.
pub fn run_finalize_command(args: &FinalizeArgs, debug: bool) -> anyhow::Result<i32> {
    let config = match load_config(&args.common, debug) {
        Some(c) => c,
        None => return Ok(EXIT_ERROR),
    };
    let engine = CodeQl::new(config.codeql_cmd());
    let mut env = EnvironmentContext::from_process();

    let runtime = tokio::runtime::Runtime::new()?;
    let result = runtime.block_on(run_finalize(
        &engine,
        &config,
        &mut env,
        &args.output,
        &args.resources.threads_flag(),
        &args.resources.memory_flag(),
    ));

    match result {
        Ok(timings) => {
            report::write_json(&RunOutput {
                success: true,
                database_creation: Some(&timings),
                queries: None,
                error: None,
            })?;
            report::write_finalize_summary(&timings);
            Ok(EXIT_SUCCESS)
        }
        Err(e) => {
            report::write_json(&RunOutput {
                success: false,
                database_creation: None,
                queries: None,
                error: Some(e.to_string()),
            })?;
            eprintln!("Error: {}", e);
            Ok(EXIT_FAILED)
        }
    }
}

/// Run the analyze command.
pub fn run_analyze_command(args: &AnalyzeArgs, debug: bool) -> anyhow::Result<i32> {
    let config = match load_config(&args.common, debug) {
        Some(c) => c,
        None => return Ok(EXIT_ERROR),
    };
    let engine = CodeQl::new(config.codeql_cmd());
    let mut env = EnvironmentContext::from_process();

    let source_root = match args.source_root.canonicalize() {
        Ok(p) => p,
        Err(e) => {
            eprintln!(
                "Error: cannot access source root {}: {}",
                args.source_root.display(),
                e
            );
            return Ok(EXIT_ERROR);
        }
    };

    let threads_flag = args.resources.threads_flag();
    let memory_flag = args.resources.memory_flag();
    let options = QueryRunOptions {
        sarif_folder: args.output.clone(),
        memory_flag: memory_flag.clone(),
        threads_flag: threads_flag.clone(),
        add_snippets_flag: snippets_flag(args.add_snippets).to_string(),
        automation_details_id: args.category.clone(),
        source_root,
    };

    let runtime = tokio::runtime::Runtime::new()?;
    let timings = match runtime.block_on(run_finalize(
        &engine,
        &config,
        &mut env,
        &args.output,
        &threads_flag,
        &memory_flag,
    )) {
        Ok(timings) => timings,
        Err(e) => {
            report::write_json(&RunOutput {
                success: false,
                database_creation: None,
                queries: None,
                error: Some(e.to_string()),
            })?;
            eprintln!("Error: {}", e);
            return Ok(EXIT_FAILED);
        }
    };

    match runtime.block_on(run_queries(&engine, &config, &env, &options)) {
        Ok(status) => {
            report::write_json(&RunOutput {
                success: true,
                database_creation: Some(&timings),
                queries: Some(&status),
                error: None,
            })?;
            report::write_analysis_summary(&status);
            Ok(EXIT_SUCCESS)
        }
        Err(e) => {
            report::write_json(&RunOutput {
                success: false,
                database_creation: Some(&timings),
                queries: Some(&e.report),
                error: Some(e.to_string()),
            })?;
            report::write_failure_summary(&e);
            Ok(EXIT_FAILED)
        }
    }
}

/// Run the cleanup command.
pub fn run_cleanup_command(args: &CleanupArgs, debug: bool) -> anyhow::Result<i32> {
    let config = match load_config(&args.common, debug) {
        Some(c) => c,
        None => return Ok(EXIT_ERROR),
    };
    let engine = CodeQl::new(config.codeql_cmd());
    let env = EnvironmentContext::from_process();

    let runtime = tokio::runtime::Runtime::new()?;
    match runtime.block_on(run_cleanup(&engine, &config, &env, &args.cleanup_level)) {
        Ok(()) => Ok(EXIT_SUCCESS),
        Err(e) => {
            eprintln!("Error: {}", e);
            Ok(EXIT_FAILED)
        }
    }
}
