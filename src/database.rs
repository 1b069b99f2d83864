//! Database extraction, finalization and cleanup.
//!
//! Each language owns one database directory. A database is finalized once
//! its descriptor no longer carries the in-progress marker; finalized
//! databases are never extracted or finalized again. The state is re-read
//! from disk right before every action.

use std::fs;
use std::io;
use std::path::Path;
use std::time::Instant;

use serde_yaml::Value;
use tracing::{info, info_span, warn, Instrument};

use crate::config::Config;
use crate::engine::{Capabilities, Engine};
use crate::environment::{
    include_and_exclude_analysis_paths, setup_python_extractor, EnvironmentContext,
    TracingScope, TracingTeardown,
};
use crate::error::{Error, Result};
use crate::languages::Language;
use crate::status::DatabaseCreationTimings;

/// Descriptor file at the root of every database.
pub const DATABASE_DESCRIPTOR: &str = "codeql-database.yml";
/// Descriptor key present until the database is finalized.
const IN_PROGRESS_KEY: &str = "inProgress";

/// Read a database descriptor and report whether the database is finalized.
///
/// Fails with [`Error::DatabaseStateUnknown`] when the descriptor cannot be
/// read or is not a YAML mapping.
pub fn check_database_finalized(database_path: &Path, language: Language) -> Result<bool> {
    let unknown = |reason: String| Error::DatabaseStateUnknown { language, reason };

    let descriptor = database_path.join(DATABASE_DESCRIPTOR);
    let content = fs::read_to_string(&descriptor)
        .map_err(|e| unknown(format!("{}: {}", descriptor.display(), e)))?;
    let info: Value = serde_yaml::from_str(&content)
        .map_err(|e| unknown(format!("{}: {}", descriptor.display(), e)))?;

    match info {
        Value::Mapping(mapping) => Ok(!mapping.contains_key(IN_PROGRESS_KEY)),
        _ => Err(unknown(format!(
            "{} is not a mapping",
            descriptor.display()
        ))),
    }
}

/// Whether the database for `language` is finalized.
///
/// An unreadable descriptor is logged and treated as not finalized, so the
/// database is extracted and finalized again rather than silently skipped.
pub fn db_is_finalized(config: &Config, language: Language) -> bool {
    match check_database_finalized(&config.database_path(language), language) {
        Ok(finalized) => finalized,
        Err(e) => {
            warn!("{}. Assuming it is not.", e);
            false
        }
    }
}

/// Extract every scanned language whose database is not yet finalized.
pub async fn create_db_for_scanned_languages<E: Engine + ?Sized>(
    engine: &E,
    config: &Config,
    env: &mut EnvironmentContext,
) -> Result<()> {
    // Path filters must be in place before any extractor runs.
    include_and_exclude_analysis_paths(config, env);

    for &language in &config.languages {
        if !language.is_scanned(config.go_extraction_reconciliation)
            || db_is_finalized(config, language)
        {
            continue;
        }

        let database_path = config.database_path(language);
        async {
            info!("Extracting {}", language);
            if language == Language::Python {
                setup_python_extractor(env).await?;
            }
            engine
                .extract_scanned_language(&database_path, language, env)
                .await?;
            Ok::<_, Error>(())
        }
        .instrument(info_span!("extract", %language))
        .await?;
    }
    Ok(())
}

/// Extract scanned languages and finalize every configured database.
pub async fn finalize_database_creation<E: Engine + ?Sized>(
    engine: &E,
    config: &Config,
    env: &mut EnvironmentContext,
    threads_flag: &str,
    memory_flag: &str,
) -> Result<DatabaseCreationTimings> {
    let extraction_start = Instant::now();
    create_db_for_scanned_languages(engine, config, env).await?;
    let extraction_time = extraction_start.elapsed();

    let trap_import_start = Instant::now();
    for &language in &config.languages {
        if db_is_finalized(config, language) {
            info!(
                "There is already a finalized database for {} at the location where databases are placed, so we did not create one.",
                language
            );
            continue;
        }

        let database_path = config.database_path(language);
        engine
            .finalize_database(&database_path, threads_flag, memory_flag, env)
            .instrument(info_span!("finalize", %language))
            .await?;
    }
    let trap_import_time = trap_import_start.elapsed();

    Ok(DatabaseCreationTimings {
        scanned_language_extraction_duration_ms: extraction_time.as_millis() as u64,
        trap_import_duration_ms: trap_import_time.as_millis() as u64,
    })
}

/// Remove and recreate a directory. A missing directory is not an error.
fn reset_output_dir(output_dir: &Path) -> Result<()> {
    match fs::remove_dir_all(output_dir) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(e.into()),
    }
    fs::create_dir_all(output_dir)?;
    Ok(())
}

/// Prepare `output_dir` for findings reports, create and finalize every
/// database, then end tracing.
///
/// Tracing is torn down on every exit path; only a successful run reports
/// teardown failures as errors.
pub async fn run_finalize<E: Engine + ?Sized>(
    engine: &E,
    config: &Config,
    env: &mut EnvironmentContext,
    output_dir: &Path,
    threads_flag: &str,
    memory_flag: &str,
) -> Result<DatabaseCreationTimings> {
    reset_output_dir(output_dir)?;

    let capabilities = Capabilities::probe(engine, config.code_scanning_config_in_cli).await?;
    let teardown = TracingTeardown::for_config(config, capabilities.new_tracing);

    let mut scope = TracingScope::acquire(env, teardown);
    let timings =
        finalize_database_creation(engine, config, scope.env_mut(), threads_flag, memory_flag)
            .await?;
    scope.finish()?;

    Ok(timings)
}

/// Clean up every configured database to `cleanup_level`.
pub async fn run_cleanup<E: Engine + ?Sized>(
    engine: &E,
    config: &Config,
    env: &EnvironmentContext,
    cleanup_level: &str,
) -> Result<()> {
    async {
        info!("Cleaning up databases");
        for &language in &config.languages {
            let database_path = config.database_path(language);
            engine
                .database_cleanup(&database_path, cleanup_level, env)
                .await?;
        }
        Ok(())
    }
    .instrument(info_span!("cleanup"))
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_descriptor(db: &Path, content: &str) {
        fs::create_dir_all(db).unwrap();
        fs::write(db.join(DATABASE_DESCRIPTOR), content).unwrap();
    }

    #[test]
    fn test_in_progress_database_not_finalized() {
        let temp = TempDir::new().unwrap();
        write_descriptor(
            temp.path(),
            "sourceLocationPrefix: /src\ninProgress:\n  primaryLanguage: go\n",
        );
        assert!(!check_database_finalized(temp.path(), Language::Go).unwrap());
    }

    #[test]
    fn test_finalization_check_is_idempotent() {
        let temp = TempDir::new().unwrap();
        write_descriptor(temp.path(), "sourceLocationPrefix: /src\ninProgress: true\n");

        let first = check_database_finalized(temp.path(), Language::Go).unwrap();
        let second = check_database_finalized(temp.path(), Language::Go).unwrap();
        assert_eq!(first, second);
        assert!(!first);

        write_descriptor(temp.path(), "sourceLocationPrefix: /src\n");
        assert!(check_database_finalized(temp.path(), Language::Go).unwrap());
    }

    #[test]
    fn test_missing_descriptor_is_unknown() {
        let temp = TempDir::new().unwrap();
        let err = check_database_finalized(temp.path(), Language::Ruby).unwrap_err();
        assert!(matches!(
            err,
            Error::DatabaseStateUnknown {
                language: Language::Ruby,
                ..
            }
        ));
    }

    #[test]
    fn test_unparseable_descriptor_is_unknown() {
        let temp = TempDir::new().unwrap();
        write_descriptor(temp.path(), "just a string");
        assert!(check_database_finalized(temp.path(), Language::Go).is_err());

        write_descriptor(temp.path(), "key: [unclosed");
        assert!(check_database_finalized(temp.path(), Language::Go).is_err());
    }

    #[test]
    fn test_db_is_finalized_fails_safe() {
        let temp = TempDir::new().unwrap();
        let config = Config {
            languages: vec![Language::Java],
            db_location: Some(temp.path().to_path_buf()),
            ..Default::default()
        };
        assert!(!db_is_finalized(&config, Language::Java));

        write_descriptor(&config.database_path(Language::Java), "sourceLocationPrefix: /src\n");
        assert!(db_is_finalized(&config, Language::Java));
    }

    #[test]
    fn test_reset_output_dir() {
        let temp = TempDir::new().unwrap();
        let out = temp.path().join("results");
        reset_output_dir(&out).unwrap();
        fs::write(out.join("stale.sarif"), "{}").unwrap();
        reset_output_dir(&out).unwrap();
        assert!(out.is_dir());
        assert!(!out.join("stale.sarif").exists());
    }
}
