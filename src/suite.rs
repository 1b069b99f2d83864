//! Composition of query suite descriptors.
//!
//! A suite is an ordered YAML document of query and pack references followed
//! by the user's filters. The engine distinguishes running literal queries
//! from running everything discoverable in a pack, and a single suite may mix
//! both.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

use crate::error::{Error, Result};
use crate::filters::QueryFilter;

/// Extension of a single query file.
const QUERY_EXTENSION: &str = ".ql";
/// Extension of a query suite file.
const SUITE_EXTENSION: &str = ".qls";

static PACK_IDENTIFIER: Lazy<Regex> = Lazy::new(|| {
    let component = "[a-z0-9](?:[a-z0-9-]*[a-z0-9])?";
    Regex::new(&format!("^{c}/{c}$", c = component)).unwrap()
});

static VERSION_RANGE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[0-9A-Za-z.+\-^~<>=*| ]+$").unwrap());

/// A parsed `name[@version][:path]` pack specification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackSpec {
    pub name: String,
    pub version: Option<String>,
    pub path: Option<String>,
}

impl PackSpec {
    /// Parse a pack specification such as `codeql/go-queries@1.2.3:suites/x.qls`.
    pub fn parse(spec: &str) -> Result<Self> {
        let spec = spec.trim();
        let invalid = |why: &str| {
            Error::malformed(format!("Invalid package specification {:?}: {}", spec, why))
        };

        let at = spec.find('@');
        let colon = match at {
            Some(at) => spec[at..].find(':').map(|i| at + i),
            None => spec.find(':'),
        };
        let name_end = [at, colon].into_iter().flatten().min().unwrap_or(spec.len());

        let name = spec[..name_end].trim();
        let version = at.map(|at| spec[at + 1..colon.unwrap_or(spec.len())].trim());
        let path = colon.map(|colon| spec[colon + 1..].trim());

        if !PACK_IDENTIFIER.is_match(name) {
            return Err(invalid("pack names must look like <scope>/<name>"));
        }
        if let Some(version) = version {
            if version.is_empty() || !VERSION_RANGE.is_match(version) {
                return Err(invalid("invalid version range"));
            }
        }
        if let Some(path) = path {
            if path.is_empty() {
                return Err(invalid("the path after ':' is empty"));
            }
            if !is_normalized_relative(path) {
                return Err(invalid("the path must be relative and normalized"));
            }
        }

        Ok(Self {
            name: name.to_string(),
            version: version.map(str::to_string),
            path: path.map(str::to_string),
        })
    }
}

/// Relative, forward-slashed, no `.`/`..` or empty segments. A single
/// trailing slash is allowed.
fn is_normalized_relative(path: &str) -> bool {
    if path.starts_with('/') || path.contains('\\') || path.contains(':') {
        return false;
    }
    let trimmed = path.strip_suffix('/').unwrap_or(path);
    !trimmed.is_empty()
        && trimmed
            .split('/')
            .all(|segment| !segment.is_empty() && segment != "." && segment != "..")
}

/// A literal query reference: `- query: path/to/Query.ql`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueryReference {
    pub query: String,
}

/// A pack reference. Exactly one of the shapes below is produced per pack:
/// a query in the pack, a suite to apply, a directory to scan, or the whole
/// pack.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PackReference {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub qlpack: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub queries: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub apply: Option<String>,
}

/// One entry of a suite descriptor.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum QuerySuiteEntry {
    Query(QueryReference),
    Pack(PackReference),
    Filter(QueryFilter),
}

/// Convert a pack specification into a suite entry.
pub fn convert_pack_to_query_suite_entry(spec: &str) -> Result<PackReference> {
    let pack = PackSpec::parse(spec)?;
    let reference = match pack.path {
        None => PackReference {
            qlpack: Some(pack.name),
            version: pack.version,
            ..Default::default()
        },
        Some(path) if path.ends_with(QUERY_EXTENSION) => PackReference {
            from: Some(pack.name),
            version: pack.version,
            query: Some(path),
            ..Default::default()
        },
        Some(path) if path.ends_with(SUITE_EXTENSION) => PackReference {
            from: Some(pack.name),
            version: pack.version,
            apply: Some(path),
            ..Default::default()
        },
        Some(path) => PackReference {
            from: Some(pack.name),
            version: pack.version,
            queries: Some(path),
            ..Default::default()
        },
    };
    Ok(reference)
}

fn serialize(entries: &[QuerySuiteEntry]) -> Result<String> {
    Ok(serde_yaml::to_string(entries)?)
}

/// Suite listing each query as a literal reference, then the filters.
pub fn create_query_suite_contents(queries: &[String], filters: &[QueryFilter]) -> Result<String> {
    let entries: Vec<QuerySuiteEntry> = queries
        .iter()
        .map(|q| QuerySuiteEntry::Query(QueryReference { query: q.clone() }))
        .chain(filters.iter().cloned().map(QuerySuiteEntry::Filter))
        .collect();
    serialize(&entries)
}

/// Suite combining every pack of a language, then the filters.
pub fn create_pack_suite_contents(packs: &[String], filters: &[QueryFilter]) -> Result<String> {
    let mut entries = Vec::with_capacity(packs.len() + filters.len());
    for pack in packs {
        entries.push(QuerySuiteEntry::Pack(convert_pack_to_query_suite_entry(pack)?));
    }
    entries.extend(filters.iter().cloned().map(QuerySuiteEntry::Filter));
    serialize(&entries)
}
