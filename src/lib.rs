//! qlrun - multi-language CodeQL analysis pipeline.
//!
//! For every configured language qlrun extracts a database, finalizes it,
//! runs the configured queries and packs against it, interprets the raw
//! results into a SARIF report and, for engines that cannot do it
//! themselves, injects a lines-of-code baseline into that report.
//!
//! # Architecture
//!
//! - `engine`: the `Engine` trait and the CodeQL CLI runner, plus version
//!   capability gating
//! - `database`: extraction, finalization and cleanup of per-language databases
//! - `analyze`: query execution and results interpretation
//! - `filters` / `suite`: query filter validation and suite composition
//! - `environment`: variables handed to engine processes, tracing teardown
//! - `count_loc` / `sarif`: independent line counting and baseline injection
//! - `status`: per-language timing report
//! - `config`: YAML configuration
//! - `report`: JSON and terminal output
//!
//! # Testing Without an Engine
//!
//! Every pipeline entry point is generic over `Engine`. See
//! `tests/common/mod.rs` for a recording fake.

pub mod analyze;
pub mod cli;
pub mod config;
pub mod count_loc;
pub mod database;
pub mod engine;
pub mod environment;
pub mod error;
pub mod filters;
pub mod languages;
pub mod logging;
pub mod report;
pub mod sarif;
pub mod status;
pub mod suite;

pub use analyze::{run_queries, QueryRunOptions};
pub use config::Config;
pub use database::{db_is_finalized, run_cleanup, run_finalize};
pub use engine::{Capabilities, CodeQl, Engine, EngineError, EngineVersion, ExecutionStrategy};
pub use environment::EnvironmentContext;
pub use error::{AnalysisError, Error, Result};
pub use languages::Language;
pub use status::{DatabaseCreationTimings, Phase, QueriesStatusReport};
