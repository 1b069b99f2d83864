//! Engine version parsing and capability gating.
//!
//! The engine gains features over time. Each capability is enabled once the
//! reported version reaches a fixed threshold.

use std::cmp::Ordering;

use once_cell::sync::Lazy;
use regex::Regex;

use super::{Engine, EngineError};

/// First version that can count baseline lines of code itself.
pub const CODEQL_VERSION_COUNTS_LINES: EngineVersion = EngineVersion::new(2, 6, 2);
/// First version that imposes tracing through an environment cluster.
pub const CODEQL_VERSION_NEW_TRACING: EngineVersion = EngineVersion::new(2, 7, 0);
/// First version that can run a whole code scanning configuration in one call.
pub const CODEQL_VERSION_CONFIG_FILES: EngineVersion = EngineVersion::new(2, 10, 1);

static VERSION_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^v?(\d+)\.(\d+)\.(\d+)(?:[-+].*)?$").unwrap());

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EngineVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl EngineVersion {
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// Parse a version such as `2.7.0`, `v2.10.1` or `2.6.2+202110`.
    pub fn parse(raw: &str) -> Result<Self, EngineError> {
        let caps = VERSION_PATTERN
            .captures(raw.trim())
            .ok_or_else(|| EngineError::Version(raw.to_string()))?;
        let part = |i: usize| {
            caps[i]
                .parse::<u32>()
                .map_err(|_| EngineError::Version(raw.to_string()))
        };
        Ok(Self::new(part(1)?, part(2)?, part(3)?))
    }

    pub fn is_at_least(&self, other: &EngineVersion) -> bool {
        self >= other
    }
}

impl PartialOrd for EngineVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for EngineVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        self.major
            .cmp(&other.major)
            .then(self.minor.cmp(&other.minor))
            .then(self.patch.cmp(&other.patch))
    }
}

impl std::fmt::Display for EngineVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// How queries are executed for every language in a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionStrategy {
    /// One suite file per query group, builtin and custom timed separately.
    Legacy,
    /// A single call runs the whole code scanning configuration.
    Unified,
}

/// Feature flags derived from the engine version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    pub version: EngineVersion,
    /// The engine reports the lines-of-code baseline itself.
    pub counts_lines: bool,
    /// The engine consumes the code scanning configuration directly.
    pub unified_execution: bool,
    /// Tracing is torn down through the end-tracing environment file.
    pub new_tracing: bool,
}

impl Capabilities {
    /// Derive capabilities from a version.
    ///
    /// `code_scanning_config_in_cli` gates the unified path on top of the
    /// version threshold.
    pub fn from_version(version: EngineVersion, code_scanning_config_in_cli: bool) -> Self {
        Self {
            version,
            counts_lines: version.is_at_least(&CODEQL_VERSION_COUNTS_LINES),
            unified_execution: code_scanning_config_in_cli
                && version.is_at_least(&CODEQL_VERSION_CONFIG_FILES),
            new_tracing: version.is_at_least(&CODEQL_VERSION_NEW_TRACING),
        }
    }

    /// Ask the engine for its version and derive capabilities from it.
    pub async fn probe<E: Engine + ?Sized>(
        engine: &E,
        code_scanning_config_in_cli: bool,
    ) -> Result<Self, EngineError> {
        let version = engine.version().await?;
        tracing::debug!(%version, "probed engine version");
        Ok(Self::from_version(version, code_scanning_config_in_cli))
    }

    pub fn execution_strategy(&self) -> ExecutionStrategy {
        if self.unified_execution {
            ExecutionStrategy::Unified
        } else {
            ExecutionStrategy::Legacy
        }
    }
}
