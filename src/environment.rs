//! Environment variables handed to engine processes.
//!
//! Extraction and tracing are configured through environment variables. The
//! pipeline never mutates its own process environment: changes are recorded
//! in an [`EnvironmentContext`] and applied to each engine child process.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::process::Command;
use tracing::{info, warn};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::languages::Language;

/// Legacy tracer configuration, cleared once databases are finalized.
pub const ODASA_TRACER_CONFIGURATION: &str = "ODASA_TRACER_CONFIGURATION";
/// Interpreter whose installed packages the Python extractor should see.
pub const CODEQL_PYTHON: &str = "CODEQL_PYTHON";
pub const LGTM_INDEX_IMPORT_PATH: &str = "LGTM_INDEX_IMPORT_PATH";
pub const LGTM_PYTHON_SETUP_VERSION: &str = "LGTM_PYTHON_SETUP_VERSION";
pub const LGTM_INDEX_INCLUDE: &str = "LGTM_INDEX_INCLUDE";
pub const LGTM_INDEX_EXCLUDE: &str = "LGTM_INDEX_EXCLUDE";
pub const LGTM_INDEX_FILTERS: &str = "LGTM_INDEX_FILTERS";
/// Forces the independent line counter to run.
pub const DEBUG_LOC: &str = "INTERNAL_CODEQL_ACTION_DEBUG_LOC";

/// A base set of variables plus the changes made by the pipeline.
#[derive(Debug, Clone, Default)]
pub struct EnvironmentContext {
    base: HashMap<String, String>,
    /// `Some` sets a variable, `None` removes it.
    changes: BTreeMap<String, Option<String>>,
}

impl EnvironmentContext {
    /// An empty context with no inherited variables.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot the current process environment.
    pub fn from_process() -> Self {
        Self::with_vars(std::env::vars())
    }

    pub fn with_vars<I, K, V>(vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            base: vars
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
            changes: BTreeMap::new(),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        match self.changes.get(key) {
            Some(change) => change.as_deref(),
            None => self.base.get(key).map(String::as_str),
        }
    }

    /// Whether a variable is present with a non-empty value.
    pub fn is_set(&self, key: &str) -> bool {
        self.get(key).map(|v| !v.is_empty()).unwrap_or(false)
    }

    pub fn set<K: Into<String>, V: Into<String>>(&mut self, key: K, value: V) {
        self.changes.insert(key.into(), Some(value.into()));
    }

    pub fn remove<K: Into<String>>(&mut self, key: K) {
        self.changes.insert(key.into(), None);
    }

    /// Changes recorded on top of the base environment.
    pub fn changes(&self) -> impl Iterator<Item = (&str, Option<&str>)> {
        self.changes
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_deref()))
    }

    /// Apply the recorded changes to a child process.
    pub fn apply(&self, cmd: &mut Command) {
        for (key, value) in &self.changes {
            match value {
                Some(value) => {
                    cmd.env(key, value);
                }
                None => {
                    cmd.env_remove(key);
                }
            }
        }
    }
}

/// Export the configured path filters for the extractors.
pub fn include_and_exclude_analysis_paths(config: &Config, env: &mut EnvironmentContext) {
    if !config.paths.is_empty() {
        env.set(LGTM_INDEX_INCLUDE, config.paths.join("\n"));
    }
    if !config.paths_ignore.is_empty() {
        env.set(LGTM_INDEX_EXCLUDE, config.paths_ignore.join("\n"));
    }

    let filters: Vec<String> = config
        .paths
        .iter()
        .map(|p| format!("include:{}", p))
        .chain(config.paths_ignore.iter().map(|p| format!("exclude:{}", p)))
        .collect();
    if !filters.is_empty() {
        env.set(LGTM_INDEX_FILTERS, filters.join("\n"));
    }
}

/// Point the Python extractor at the packages installed for `CODEQL_PYTHON`.
///
/// Does nothing when no interpreter is configured.
pub async fn setup_python_extractor(env: &mut EnvironmentContext) -> Result<()> {
    let python = match env.get(CODEQL_PYTHON) {
        Some(p) if !p.is_empty() => p.to_string(),
        _ => return Ok(()),
    };

    let import_path = run_python(
        &python,
        "import os; import pip; print(os.path.dirname(os.path.dirname(pip.__file__)))",
        env,
    )
    .await?;
    info!("Setting {}={}", LGTM_INDEX_IMPORT_PATH, import_path);
    env.set(LGTM_INDEX_IMPORT_PATH, import_path);

    let version = run_python(&python, "import sys; print(sys.version_info[0])", env).await?;
    info!("Setting {}={}", LGTM_PYTHON_SETUP_VERSION, version);
    env.set(LGTM_PYTHON_SETUP_VERSION, version);

    Ok(())
}

async fn run_python(python: &str, script: &str, env: &EnvironmentContext) -> Result<String> {
    let mut cmd = Command::new(python);
    cmd.arg("-c")
        .arg(script)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    env.apply(&mut cmd);

    let output = cmd.output().await?;
    if !output.status.success() {
        return Err(Error::CommandFailed {
            command: format!("{} -c {:?}", python, script),
            code: output.status.code().unwrap_or(-1),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

/// How tracing is unwound once databases are finalized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TracingTeardown {
    /// Older engines impose the tracer through a single variable.
    Legacy,
    /// Newer engines impose a cluster of variables described by a file.
    Cluster {
        end_tracing_file: PathBuf,
        traced_languages: Vec<Language>,
    },
}

impl TracingTeardown {
    /// Pick the teardown for a configuration and engine capability.
    pub fn for_config(config: &Config, new_tracing: bool) -> Self {
        if !new_tracing {
            return TracingTeardown::Legacy;
        }
        TracingTeardown::Cluster {
            end_tracing_file: end_tracing_file(&config.database_location()),
            traced_languages: config
                .languages
                .iter()
                .copied()
                .filter(|l| l.is_traced(config.go_extraction_reconciliation))
                .collect(),
        }
    }

    fn run(&self, env: &mut EnvironmentContext) -> Result<()> {
        match self {
            TracingTeardown::Legacy => {
                env.remove(ODASA_TRACER_CONFIGURATION);
                Ok(())
            }
            TracingTeardown::Cluster {
                end_tracing_file,
                traced_languages,
            } => {
                if traced_languages.is_empty() {
                    return Ok(());
                }
                end_tracing_for_cluster(end_tracing_file, env)
            }
        }
    }
}

/// Location of the end-tracing environment file for a database cluster.
pub fn end_tracing_file(db_location: &Path) -> PathBuf {
    db_location
        .join("temp")
        .join("tracingEnvironment")
        .join("end-tracing.json")
}

/// Apply the variable changes listed in an end-tracing file.
pub fn end_tracing_for_cluster(file: &Path, env: &mut EnvironmentContext) -> Result<()> {
    if !file.exists() {
        return Err(Error::config(format!(
            "Cannot end tracing: {} does not exist",
            file.display()
        )));
    }
    let content = fs::read_to_string(file)?;
    let variables: BTreeMap<String, Option<String>> = serde_json::from_str(&content)?;
    for (key, value) in variables {
        match value {
            Some(value) => env.set(key, value),
            None => env.remove(key),
        }
    }
    Ok(())
}

/// Holds the environment while tracing is active and unwinds it on exit.
///
/// Call [`TracingScope::finish`] to tear down and observe failures. If the
/// scope is dropped on an early return, the teardown still runs and any
/// failure is logged.
pub struct TracingScope<'a> {
    env: &'a mut EnvironmentContext,
    teardown: TracingTeardown,
    finished: bool,
}

impl<'a> TracingScope<'a> {
    pub fn acquire(env: &'a mut EnvironmentContext, teardown: TracingTeardown) -> Self {
        Self {
            env,
            teardown,
            finished: false,
        }
    }

    pub fn env(&self) -> &EnvironmentContext {
        &*self.env
    }

    pub fn env_mut(&mut self) -> &mut EnvironmentContext {
        &mut *self.env
    }

    pub fn finish(mut self) -> Result<()> {
        self.finished = true;
        self.teardown.run(self.env)
    }
}

impl Drop for TracingScope<'_> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        if let Err(e) = self.teardown.run(self.env) {
            warn!("Failed to end tracing: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_changes_shadow_base() {
        let mut env = EnvironmentContext::with_vars([("A", "1"), ("B", "2")]);
        env.set("A", "3");
        env.remove("B");
        assert_eq!(env.get("A"), Some("3"));
        assert_eq!(env.get("B"), None);
        assert!(!env.is_set("B"));
        assert_eq!(env.changes().count(), 2);
    }

    #[test]
    fn test_analysis_paths() {
        let config = Config {
            paths: vec!["src".to_string(), "lib".to_string()],
            paths_ignore: vec!["src/gen".to_string()],
            ..Default::default()
        };
        let mut env = EnvironmentContext::new();
        include_and_exclude_analysis_paths(&config, &mut env);
        assert_eq!(env.get(LGTM_INDEX_INCLUDE), Some("src\nlib"));
        assert_eq!(env.get(LGTM_INDEX_EXCLUDE), Some("src/gen"));
        assert_eq!(
            env.get(LGTM_INDEX_FILTERS),
            Some("include:src\ninclude:lib\nexclude:src/gen")
        );
    }

    #[test]
    fn test_analysis_paths_empty_sets_nothing() {
        let mut env = EnvironmentContext::new();
        include_and_exclude_analysis_paths(&Config::default(), &mut env);
        assert_eq!(env.changes().count(), 0);
    }

    #[tokio::test]
    async fn test_python_setup_without_interpreter_is_noop() {
        let mut env = EnvironmentContext::new();
        setup_python_extractor(&mut env).await.unwrap();
        assert!(env.get(LGTM_INDEX_IMPORT_PATH).is_none());
    }

    #[cfg(unix)]
    fn fake_interpreter(dir: &Path, body: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;

        let path = dir.join("python");
        fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_python_setup_sets_import_path_and_version() {
        let temp = TempDir::new().unwrap();
        let python = fake_interpreter(
            temp.path(),
            r#"case "$2" in *pip*) echo /site ;; *) echo 3 ;; esac"#,
        );
        let mut env = EnvironmentContext::with_vars([(CODEQL_PYTHON, python.to_str().unwrap())]);

        setup_python_extractor(&mut env).await.unwrap();

        assert_eq!(env.get(LGTM_INDEX_IMPORT_PATH), Some("/site"));
        assert_eq!(env.get(LGTM_PYTHON_SETUP_VERSION), Some("3"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_python_setup_reports_interpreter_failure() {
        let temp = TempDir::new().unwrap();
        let python = fake_interpreter(temp.path(), "echo 'No module named pip' >&2; exit 1");
        let mut env = EnvironmentContext::with_vars([(CODEQL_PYTHON, python.to_str().unwrap())]);

        let err = setup_python_extractor(&mut env).await.unwrap_err();

        match err {
            Error::CommandFailed { code, stderr, .. } => {
                assert_eq!(code, 1);
                assert_eq!(stderr, "No module named pip");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(env.get(LGTM_INDEX_IMPORT_PATH).is_none());
    }

    #[test]
    fn test_legacy_teardown_on_drop() {
        let mut env = EnvironmentContext::with_vars([(ODASA_TRACER_CONFIGURATION, "/tmp/tracer")]);
        {
            let scope = TracingScope::acquire(&mut env, TracingTeardown::Legacy);
            assert!(scope.env().is_set(ODASA_TRACER_CONFIGURATION));
        }
        assert!(!env.is_set(ODASA_TRACER_CONFIGURATION));
    }

    #[test]
    fn test_cluster_teardown_applies_file() {
        let temp = TempDir::new().unwrap();
        let file = end_tracing_file(temp.path());
        fs::create_dir_all(file.parent().unwrap()).unwrap();
        fs::write(&file, r#"{"LD_PRELOAD": null, "CODEQL_RUNNER": "off"}"#).unwrap();

        let mut env = EnvironmentContext::with_vars([("LD_PRELOAD", "libtrace.so")]);
        let teardown = TracingTeardown::Cluster {
            end_tracing_file: file,
            traced_languages: vec![Language::Cpp],
        };
        TracingScope::acquire(&mut env, teardown).finish().unwrap();

        assert_eq!(env.get("LD_PRELOAD"), None);
        assert_eq!(env.get("CODEQL_RUNNER"), Some("off"));
    }

    #[test]
    fn test_cluster_teardown_missing_file() {
        let temp = TempDir::new().unwrap();
        let teardown = TracingTeardown::Cluster {
            end_tracing_file: end_tracing_file(temp.path()),
            traced_languages: vec![Language::Java],
        };
        let mut env = EnvironmentContext::new();
        assert!(TracingScope::acquire(&mut env, teardown).finish().is_err());
    }

    #[test]
    fn test_cluster_teardown_without_traced_languages() {
        let temp = TempDir::new().unwrap();
        let teardown = TracingTeardown::Cluster {
            end_tracing_file: end_tracing_file(temp.path()),
            traced_languages: vec![],
        };
        let mut env = EnvironmentContext::new();
        assert!(TracingScope::acquire(&mut env, teardown).finish().is_ok());
    }
}
