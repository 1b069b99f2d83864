//! Validation of user-supplied query filters.
//!
//! Filters are single-key records, `include` or `exclude`, appended verbatim
//! to every composed query suite. Their payload is not inspected.

use serde::Serialize;
use serde_yaml::{Mapping, Value};

use crate::error::{Error, Result};

const ALLOWED_KEYS: &[&str] = &["exclude", "include"];

/// One validated `include` or `exclude` filter entry.
///
/// Only [`validate_query_filters`] builds these.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct QueryFilter(Mapping);

impl QueryFilter {
    /// The filter kind, `include` or `exclude`.
    pub fn kind(&self) -> &str {
        self.0
            .keys()
            .next()
            .and_then(Value::as_str)
            .unwrap_or_default()
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Sequence(_) => "array",
        Value::Mapping(_) => "object",
        Value::Tagged(_) => "tagged value",
    }
}

fn render(value: &Value) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| format!("{:?}", value))
}

/// Check that `filters` is a sequence of single-key include/exclude records.
///
/// Absent (or null) input yields no filters. Every offending entry is
/// reported, not just the first.
pub fn validate_query_filters(filters: Option<&Value>) -> Result<Vec<QueryFilter>> {
    let entries = match filters {
        None | Some(Value::Null) => return Ok(Vec::new()),
        Some(Value::Sequence(entries)) => entries,
        Some(other) => {
            return Err(Error::malformed(format!(
                "Query filters must be an array of \"include\" or \"exclude\" entries. Found {}",
                type_name(other)
            )))
        }
    };

    let mut errors = Vec::new();
    let mut validated = Vec::with_capacity(entries.len());
    for entry in entries {
        let mapping = entry.as_mapping();
        let key_count = mapping.map(Mapping::len).unwrap_or(0);
        if key_count != 1 {
            errors.push(format!(
                "Query filter must have exactly one key: {}",
                render(entry)
            ));
        }

        let first_key = mapping
            .and_then(|m| m.keys().next())
            .and_then(Value::as_str);
        if !first_key.map(|k| ALLOWED_KEYS.contains(&k)).unwrap_or(false) {
            errors.push(format!(
                "Only \"include\" or \"exclude\" filters are allowed:\n{}",
                render(entry)
            ));
        }

        if let Some(mapping) = mapping {
            validated.push(QueryFilter(mapping.clone()));
        }
    }

    if !errors.is_empty() {
        return Err(Error::malformed(format!(
            "Invalid query filter.\n{}",
            errors.join("\n")
        )));
    }

    Ok(validated)
}
