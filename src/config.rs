//! Pipeline configuration.
//!
//! A configuration lists the languages to analyze, the queries and packs to
//! run for each of them, and where databases and the engine live.

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::languages::Language;

/// Engine executable used when the configuration names none.
pub const DEFAULT_CODEQL_CMD: &str = "codeql";

/// Top-level configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(rename_all = "kebab-case")]
pub struct Config {
    #[serde(default)]
    pub languages: Vec<Language>,
    /// Query references per language.
    #[serde(default)]
    pub queries: BTreeMap<Language, LanguageQueries>,
    /// Pack specifications (`name[@version][:path]`) per language.
    #[serde(default)]
    pub packs: BTreeMap<Language, Vec<String>>,
    /// Paths to include in extraction and line counting.
    #[serde(default)]
    pub paths: Vec<String>,
    /// Paths to exclude from extraction and line counting.
    #[serde(default)]
    pub paths_ignore: Vec<String>,
    /// Include/exclude filters exactly as the user wrote them. Validated
    /// when queries are run.
    #[serde(default)]
    pub query_filters: Option<serde_yaml::Value>,
    #[serde(default)]
    pub debug_mode: bool,
    /// Directory holding one database per language.
    #[serde(default)]
    pub db_location: Option<PathBuf>,
    /// Path to the engine executable (default: `codeql` on PATH).
    #[serde(default)]
    pub codeql_cmd: Option<PathBuf>,
    /// Extract Go explicitly instead of tracing the build.
    #[serde(default)]
    pub go_extraction_reconciliation: bool,
    /// Let the engine run the whole configuration in one call when it can.
    #[serde(default)]
    pub code_scanning_config_in_cli: bool,
}

/// Queries configured for one language.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct LanguageQueries {
    #[serde(default)]
    pub builtin: Vec<String>,
    #[serde(default)]
    pub custom: Vec<CustomQueries>,
}

/// A group of custom queries resolved against its own search path.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub struct CustomQueries {
    #[serde(default)]
    pub queries: Vec<String>,
    #[serde(default)]
    pub search_path: Option<String>,
}

impl Config {
    /// Parse a configuration from a YAML file.
    pub fn parse_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())?;
        let config: Config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Directory holding the per-language databases.
    ///
    /// Falls back to the user cache directory, then the system temp directory.
    pub fn database_location(&self) -> PathBuf {
        if let Some(location) = &self.db_location {
            return location.clone();
        }
        ProjectDirs::from("", "", "qlrun")
            .map(|dirs| dirs.cache_dir().join("databases"))
            .unwrap_or_else(|| std::env::temp_dir().join("qlrun").join("databases"))
    }

    /// Database directory for a language.
    pub fn database_path(&self, language: Language) -> PathBuf {
        self.database_location().join(language.as_str())
    }

    pub fn codeql_cmd(&self) -> &Path {
        self.codeql_cmd
            .as_deref()
            .unwrap_or_else(|| Path::new(DEFAULT_CODEQL_CMD))
    }

    /// Queries for a language, empty when none are configured.
    pub fn queries_for(&self, language: Language) -> LanguageQueries {
        self.queries.get(&language).cloned().unwrap_or_default()
    }

    /// Pack specifications for a language.
    pub fn packs_for(&self, language: Language) -> &[String] {
        self.packs
            .get(&language)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Whether a language has anything to run: builtin queries, at least one
    /// custom group, or packs.
    pub fn has_queries(&self, language: Language) -> bool {
        let queries = self.queries.get(&language);
        let has_builtin = queries.map(|q| !q.builtin.is_empty()).unwrap_or(false);
        let has_custom = queries.map(|q| !q.custom.is_empty()).unwrap_or(false);
        has_builtin || has_custom || !self.packs_for(language).is_empty()
    }
}

/// Validate a configuration for correctness.
pub fn validate(config: &Config) -> Result<()> {
    if config.languages.is_empty() {
        return Err(Error::config("no languages configured"));
    }

    let mut seen = HashSet::new();
    for language in &config.languages {
        if !seen.insert(*language) {
            return Err(Error::config(format!("language {} listed twice", language)));
        }
    }

    for language in config.queries.keys().chain(config.packs.keys()) {
        if !seen.contains(language) {
            return Err(Error::config(format!(
                "queries or packs configured for {}, which is not in languages",
                language
            )));
        }
    }

    for pattern in config.paths.iter().chain(config.paths_ignore.iter()) {
        globset::Glob::new(pattern)
            .map_err(|e| Error::config(format!("invalid path pattern {:?}: {}", pattern, e)))?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_config() {
        let yaml = r#"
languages: [go, python]
queries:
  go:
    builtin: [codeql/go-queries:codeql-suites/go-code-scanning.qls]
    custom:
      - queries: [/work/queries/extra.ql]
        search-path: /work/queries
packs:
  python: [codeql/python-queries@0.4.0]
paths: [src]
paths-ignore: [src/vendor]
query-filters:
  - exclude:
      id: py/unused-import
db-location: /tmp/dbs
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.languages, vec![Language::Go, Language::Python]);
        let go = config.queries_for(Language::Go);
        assert_eq!(go.builtin.len(), 1);
        assert_eq!(go.custom[0].search_path.as_deref(), Some("/work/queries"));
        assert_eq!(config.packs_for(Language::Python).len(), 1);
        assert!(config.query_filters.is_some());
        assert_eq!(config.database_path(Language::Go), PathBuf::from("/tmp/dbs/go"));
        validate(&config).unwrap();
    }

    #[test]
    fn test_has_queries() {
        let mut config = Config {
            languages: vec![Language::Go, Language::Java],
            ..Default::default()
        };
        config.packs.insert(Language::Go, vec!["my/pack".to_string()]);
        assert!(config.has_queries(Language::Go));
        assert!(!config.has_queries(Language::Java));
    }

    #[test]
    fn test_validate_rejects_bad_configs() {
        assert!(validate(&Config::default()).is_err());

        let duplicated = Config {
            languages: vec![Language::Go, Language::Go],
            ..Default::default()
        };
        assert!(validate(&duplicated).is_err());

        let mut stray = Config {
            languages: vec![Language::Go],
            ..Default::default()
        };
        stray.packs.insert(Language::Ruby, vec!["my/pack".to_string()]);
        assert!(validate(&stray).is_err());

        let bad_glob = Config {
            languages: vec![Language::Go],
            paths: vec!["src/[".to_string()],
            ..Default::default()
        };
        assert!(validate(&bad_glob).is_err());
    }

    #[test]
    fn test_default_codeql_cmd() {
        assert_eq!(Config::default().codeql_cmd(), Path::new("codeql"));
    }
}
