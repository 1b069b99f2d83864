//! Shared helpers for integration tests: a recording fake engine and
//! database fixtures.

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;

use qlrun::database::DATABASE_DESCRIPTOR;
use qlrun::engine::{Engine, EngineError, EngineVersion, InterpretOptions};
use qlrun::environment::{EnvironmentContext, LGTM_INDEX_IMPORT_PATH, LGTM_INDEX_INCLUDE};
use qlrun::Language;

pub fn testdata_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("testdata")
}

/// Write a database descriptor, in progress or finalized.
pub fn write_descriptor(database_path: &Path, finalized: bool) {
    fs::create_dir_all(database_path).unwrap();
    let content = if finalized {
        "sourceLocationPrefix: /src\nbaselineLinesOfCode: 0\n"
    } else {
        "sourceLocationPrefix: /src\nbaselineLinesOfCode: 0\ninProgress:\n  primaryLanguage: x\n"
    };
    fs::write(database_path.join(DATABASE_DESCRIPTOR), content).unwrap();
}

/// Write an executable shell script that stands in for a Python interpreter.
/// It prints `site` for the pip lookup and `version` for the version query.
#[cfg(unix)]
pub fn write_fake_python(dir: &Path, site: &str, version: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join("python");
    fs::write(
        &path,
        format!(
            "#!/bin/sh\ncase \"$2\" in *pip*) echo {} ;; *) echo {} ;; esac\n",
            site, version
        ),
    )
    .unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    path
}

/// One engine invocation as seen by the fake.
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Version,
    Extract {
        language: Language,
        index_include: Option<String>,
        import_path: Option<String>,
    },
    Finalize(PathBuf),
    RunQueries {
        database: PathBuf,
        search_path: Option<String>,
        suite: Option<PathBuf>,
    },
    Interpret {
        database: PathBuf,
        queries: Option<Vec<PathBuf>>,
        output: PathBuf,
        verbosity: String,
        category: Option<String>,
    },
    PrintBaseline(PathBuf),
    Cleanup(PathBuf, String),
}

/// Engine double that records every call and simulates database state on
/// disk. Interpretation writes the SARIF fixture to the requested output.
pub struct FakeEngine {
    version: EngineVersion,
    fail_run_queries_for: Option<Language>,
    calls: Mutex<Vec<Call>>,
}

impl FakeEngine {
    pub fn new(version: EngineVersion) -> Self {
        Self {
            version,
            fail_run_queries_for: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Make `database run-queries` fail for one language's database.
    pub fn failing_run_queries_for(mut self, language: Language) -> Self {
        self.fail_run_queries_for = Some(language);
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl Engine for FakeEngine {
    async fn version(&self) -> Result<EngineVersion, EngineError> {
        self.record(Call::Version);
        Ok(self.version)
    }

    async fn extract_scanned_language(
        &self,
        database_path: &Path,
        language: Language,
        env: &EnvironmentContext,
    ) -> Result<(), EngineError> {
        self.record(Call::Extract {
            language,
            index_include: env.get(LGTM_INDEX_INCLUDE).map(str::to_string),
            import_path: env.get(LGTM_INDEX_IMPORT_PATH).map(str::to_string),
        });
        write_descriptor(database_path, false);
        Ok(())
    }

    async fn finalize_database(
        &self,
        database_path: &Path,
        _threads_flag: &str,
        _memory_flag: &str,
        _env: &EnvironmentContext,
    ) -> Result<(), EngineError> {
        self.record(Call::Finalize(database_path.to_path_buf()));
        write_descriptor(database_path, true);
        Ok(())
    }

    async fn database_run_queries(
        &self,
        database_path: &Path,
        search_path: Option<&str>,
        suite_path: Option<&Path>,
        _memory_flag: &str,
        _threads_flag: &str,
        _env: &EnvironmentContext,
    ) -> Result<(), EngineError> {
        self.record(Call::RunQueries {
            database: database_path.to_path_buf(),
            search_path: search_path.map(str::to_string),
            suite: suite_path.map(Path::to_path_buf),
        });
        if let Some(language) = self.fail_run_queries_for {
            if database_path.ends_with(language.as_str()) {
                return Err(EngineError::CommandFailed {
                    command: format!("codeql database run-queries {}", database_path.display()),
                    code: 2,
                    stderr: "A fatal error occurred: out of memory".to_string(),
                });
            }
        }
        Ok(())
    }

    async fn database_interpret_results(
        &self,
        database_path: &Path,
        options: InterpretOptions<'_>,
        _env: &EnvironmentContext,
    ) -> Result<String, EngineError> {
        self.record(Call::Interpret {
            database: database_path.to_path_buf(),
            queries: options.queries.map(<[PathBuf]>::to_vec),
            output: options.output.to_path_buf(),
            verbosity: options.verbosity.to_string(),
            category: options.automation_details_id.map(str::to_string),
        });
        fs::copy(testdata_path().join("findings.sarif"), options.output)
            .map_err(|e| EngineError::Output(e.to_string()))?;
        Ok("Analysis produced the following metric data: 2 metrics".to_string())
    }

    async fn database_print_baseline(
        &self,
        database_path: &Path,
        _env: &EnvironmentContext,
    ) -> Result<String, EngineError> {
        self.record(Call::PrintBaseline(database_path.to_path_buf()));
        Ok("Counted a baseline of 42 lines of code.".to_string())
    }

    async fn database_cleanup(
        &self,
        database_path: &Path,
        cleanup_level: &str,
        _env: &EnvironmentContext,
    ) -> Result<(), EngineError> {
        self.record(Call::Cleanup(
            database_path.to_path_buf(),
            cleanup_level.to_string(),
        ));
        Ok(())
    }
}
