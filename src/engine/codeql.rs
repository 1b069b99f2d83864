//! Engine implementation backed by the CodeQL command-line interface.

use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use once_cell::sync::OnceCell;
use serde::Deserialize;
use tokio::process::Command;
use tracing::debug;

use super::{Engine, EngineError, EngineVersion, InterpretOptions};
use crate::environment::EnvironmentContext;
use crate::languages::Language;

#[derive(Debug, Deserialize)]
struct VersionOutput {
    version: String,
}

/// Runs engine verbs as child processes of a CodeQL executable.
pub struct CodeQl {
    cmd: PathBuf,
    version: OnceCell<EngineVersion>,
}

impl CodeQl {
    pub fn new<P: AsRef<Path>>(cmd: P) -> Self {
        Self {
            cmd: cmd.as_ref().to_path_buf(),
            version: OnceCell::new(),
        }
    }

    fn describe(&self, args: &[OsString]) -> String {
        let mut line = self.cmd.display().to_string();
        for arg in args {
            line.push(' ');
            line.push_str(&arg.to_string_lossy());
        }
        line
    }

    /// Run the executable and return its standard output.
    async fn run(
        &self,
        args: Vec<OsString>,
        env: Option<&EnvironmentContext>,
    ) -> Result<String, EngineError> {
        let command = self.describe(&args);
        debug!(%command, "invoking engine");

        let mut cmd = Command::new(&self.cmd);
        cmd.args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(env) = env {
            env.apply(&mut cmd);
        }

        let output = cmd.output().await.map_err(|source| EngineError::Spawn {
            command: command.clone(),
            source,
        })?;

        if !output.status.success() {
            return Err(EngineError::CommandFailed {
                command,
                code: output.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    /// Locate the extractor pack for a language.
    async fn resolve_extractor(
        &self,
        language: Language,
        env: &EnvironmentContext,
    ) -> Result<PathBuf, EngineError> {
        let language_flag = format!("--language={}", language);
        let stdout = self
            .run(
                args([
                    OsStr::new("resolve"),
                    OsStr::new("extractor"),
                    OsStr::new("--format=json"),
                    OsStr::new(&language_flag),
                ]),
                Some(env),
            )
            .await?;
        let path: String = serde_json::from_str(stdout.trim())
            .map_err(|e| EngineError::Output(format!("resolve extractor: {}", e)))?;
        Ok(PathBuf::from(path))
    }
}

/// Collect arguments, dropping empty flags.
fn args<'a, I>(parts: I) -> Vec<OsString>
where
    I: IntoIterator<Item = &'a OsStr>,
{
    parts
        .into_iter()
        .filter(|p| !p.is_empty())
        .map(OsStr::to_os_string)
        .collect()
}

fn autobuild_script(extractor: &Path) -> PathBuf {
    let script = if cfg!(windows) {
        "autobuild.cmd"
    } else {
        "autobuild.sh"
    };
    extractor.join("tools").join(script)
}

#[async_trait]
impl Engine for CodeQl {
    async fn version(&self) -> Result<EngineVersion, EngineError> {
        if let Some(version) = self.version.get() {
            return Ok(*version);
        }
        let stdout = self
            .run(
                args([OsStr::new("version"), OsStr::new("--format=json")]),
                None,
            )
            .await?;
        let output: VersionOutput = serde_json::from_str(&stdout)
            .map_err(|e| EngineError::Output(format!("version: {}", e)))?;
        let version = EngineVersion::parse(&output.version)?;
        let _ = self.version.set(version);
        Ok(version)
    }

    async fn extract_scanned_language(
        &self,
        database_path: &Path,
        language: Language,
        env: &EnvironmentContext,
    ) -> Result<(), EngineError> {
        let extractor = self.resolve_extractor(language, env).await?;
        let script = autobuild_script(&extractor);
        self.run(
            args([
                OsStr::new("database"),
                OsStr::new("trace-command"),
                database_path.as_os_str(),
                OsStr::new("--"),
                script.as_os_str(),
            ]),
            Some(env),
        )
        .await?;
        Ok(())
    }

    async fn finalize_database(
        &self,
        database_path: &Path,
        threads_flag: &str,
        memory_flag: &str,
        env: &EnvironmentContext,
    ) -> Result<(), EngineError> {
        self.run(
            args([
                OsStr::new("database"),
                OsStr::new("finalize"),
                OsStr::new("--finalize-dataset"),
                OsStr::new(threads_flag),
                OsStr::new(memory_flag),
                database_path.as_os_str(),
            ]),
            Some(env),
        )
        .await?;
        Ok(())
    }

    async fn database_run_queries(
        &self,
        database_path: &Path,
        search_path: Option<&str>,
        suite_path: Option<&Path>,
        memory_flag: &str,
        threads_flag: &str,
        env: &EnvironmentContext,
    ) -> Result<(), EngineError> {
        let mut argv = args([
            OsStr::new("database"),
            OsStr::new("run-queries"),
            OsStr::new(memory_flag),
            OsStr::new(threads_flag),
            database_path.as_os_str(),
            OsStr::new("--min-disk-free=1024"),
            OsStr::new("-v"),
        ]);
        if let Some(search_path) = search_path {
            argv.push("--additional-packs".into());
            argv.push(search_path.into());
        }
        if let Some(suite_path) = suite_path {
            argv.push(suite_path.as_os_str().to_os_string());
        }
        self.run(argv, Some(env)).await?;
        Ok(())
    }

    async fn database_interpret_results(
        &self,
        database_path: &Path,
        options: InterpretOptions<'_>,
        env: &EnvironmentContext,
    ) -> Result<String, EngineError> {
        let output_flag = {
            let mut flag = OsString::from("--output=");
            flag.push(options.output.as_os_str());
            flag
        };
        let mut argv = args([
            OsStr::new("database"),
            OsStr::new("interpret-results"),
            OsStr::new(options.threads_flag),
            OsStr::new("--format=sarif-latest"),
            OsStr::new(options.verbosity),
            output_flag.as_os_str(),
            OsStr::new(options.snippets_flag),
            OsStr::new("--print-diagnostics-summary"),
            OsStr::new("--print-metrics-summary"),
            OsStr::new("--sarif-group-rules-by-pack"),
        ]);
        if let Some(id) = options.automation_details_id {
            argv.push(format!("--sarif-category={}", id).into());
        }
        argv.push(database_path.as_os_str().to_os_string());
        if let Some(queries) = options.queries {
            argv.extend(queries.iter().map(|q| q.as_os_str().to_os_string()));
        }
        self.run(argv, Some(env)).await
    }

    async fn database_print_baseline(
        &self,
        database_path: &Path,
        env: &EnvironmentContext,
    ) -> Result<String, EngineError> {
        self.run(
            args([
                OsStr::new("database"),
                OsStr::new("print-baseline"),
                database_path.as_os_str(),
            ]),
            Some(env),
        )
        .await
    }

    async fn database_cleanup(
        &self,
        database_path: &Path,
        cleanup_level: &str,
        env: &EnvironmentContext,
    ) -> Result<(), EngineError> {
        let mode = format!("--mode={}", cleanup_level);
        self.run(
            args([
                OsStr::new("database"),
                OsStr::new("cleanup"),
                database_path.as_os_str(),
                OsStr::new(&mode),
            ]),
            Some(env),
        )
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_drop_empty_flags() {
        let argv = args([OsStr::new("database"), OsStr::new(""), OsStr::new("-v")]);
        assert_eq!(argv, vec![OsString::from("database"), OsString::from("-v")]);
    }

    #[test]
    fn test_describe_joins_arguments() {
        let engine = CodeQl::new("/opt/codeql/codeql");
        let line = engine.describe(&args([OsStr::new("version"), OsStr::new("--format=json")]));
        assert_eq!(line, "/opt/codeql/codeql version --format=json");
    }

    #[test]
    fn test_autobuild_script_location() {
        let script = autobuild_script(Path::new("/opt/codeql/python"));
        assert!(script.starts_with("/opt/codeql/python/tools"));
    }

    #[tokio::test]
    async fn test_missing_executable_is_spawn_error() {
        let engine = CodeQl::new("/nonexistent/qlrun-test/codeql");
        let err = engine.version().await.unwrap_err();
        assert!(matches!(err, EngineError::Spawn { .. }));
    }
}
