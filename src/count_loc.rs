//! Independent lines-of-code counting.
//!
//! Older engines cannot report a size baseline, so lines are counted here by
//! walking the source tree. Counting runs in the background while queries
//! execute and is only awaited where the numbers are needed.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt, Shared};
use globset::{Glob, GlobSet, GlobSetBuilder};
use rayon::prelude::*;
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::error::{Error, Result};
use crate::languages::Language;

/// Baseline line counts per language.
pub type LineCounts = BTreeMap<Language, u64>;

/// Directories never counted.
const SKIPPED_DIRS: &[&str] = &["node_modules", "vendor", "target", "__pycache__"];

fn build_globset(patterns: &[String]) -> Result<Option<GlobSet>> {
    if patterns.is_empty() {
        return Ok(None);
    }
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let pattern = pattern.trim_end_matches('/');
        builder.add(Glob::new(pattern).map_err(Error::config)?);
        // A directory pattern covers everything beneath it.
        builder.add(Glob::new(&format!("{}/**", pattern)).map_err(Error::config)?);
    }
    Ok(Some(builder.build().map_err(Error::config)?))
}

/// Count non-blank, non-comment lines in one file.
fn count_file_lines(content: &str, language: Language) -> u64 {
    let prefixes = language.line_comment_prefixes();
    let block = language.block_comment();
    let mut in_block = false;
    let mut count = 0;

    for line in content.lines().map(str::trim) {
        if line.is_empty() {
            continue;
        }
        let Some((open, close)) = block else {
            if !prefixes.iter().any(|p| line.starts_with(p)) {
                count += 1;
            }
            continue;
        };

        let mut rest = line;
        let mut has_code = false;
        loop {
            if in_block {
                match rest.find(close) {
                    Some(end) => {
                        in_block = false;
                        rest = rest[end + close.len()..].trim_start();
                    }
                    None => break,
                }
            } else {
                if rest.is_empty() || prefixes.iter().any(|p| rest.starts_with(p)) {
                    break;
                }
                match rest.find(open) {
                    Some(0) => {
                        in_block = true;
                        rest = &rest[open.len()..];
                    }
                    Some(start) => {
                        has_code = true;
                        in_block = true;
                        rest = &rest[start + open.len()..];
                    }
                    None => {
                        has_code = true;
                        break;
                    }
                }
            }
        }
        if has_code {
            count += 1;
        }
    }
    count
}

/// Count lines of code under `root` for the requested languages.
///
/// When `include` is non-empty, only files matching one of its patterns are
/// counted. Files matching `exclude` are always skipped. Patterns are
/// relative to `root`. Languages without any files are left out of the result.
pub fn count_loc(
    root: &Path,
    include: &[String],
    exclude: &[String],
    languages: &[Language],
) -> Result<LineCounts> {
    let include = build_globset(include)?;
    let exclude = build_globset(exclude)?;

    let mut files: Vec<(PathBuf, Language)> = Vec::new();
    for entry in WalkDir::new(root)
        .into_iter()
        .filter_entry(|e| {
            if e.depth() == 0 || !e.file_type().is_dir() {
                return true;
            }
            let name = e.file_name().to_string_lossy();
            !name.starts_with('.') && !SKIPPED_DIRS.contains(&name.as_ref())
        })
    {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                debug!("skipping unreadable entry: {}", e);
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let language = match path
            .extension()
            .and_then(|e| e.to_str())
            .and_then(Language::from_extension)
        {
            Some(l) if languages.contains(&l) => l,
            _ => continue,
        };

        let relative = path.strip_prefix(root).unwrap_or(path);
        if let Some(include) = &include {
            if !include.is_match(relative) {
                continue;
            }
        }
        if let Some(exclude) = &exclude {
            if exclude.is_match(relative) {
                continue;
            }
        }
        files.push((path.to_path_buf(), language));
    }

    let counts = files
        .par_iter()
        .filter_map(|(path, language)| {
            let bytes = fs::read(path).ok()?;
            let content = String::from_utf8_lossy(&bytes);
            Some((*language, count_file_lines(&content, *language)))
        })
        .fold(LineCounts::new, |mut acc, (language, lines)| {
            *acc.entry(language).or_insert(0) += lines;
            acc
        })
        .reduce(LineCounts::new, |mut a, b| {
            for (language, lines) in b {
                *a.entry(language).or_insert(0) += lines;
            }
            a
        });

    Ok(counts)
}

/// A line count running in the background, awaitable any number of times.
#[derive(Clone)]
pub struct LineCountTask {
    inner: Shared<BoxFuture<'static, Arc<LineCounts>>>,
}

impl LineCountTask {
    /// Start counting on the blocking thread pool.
    ///
    /// Counting is best effort: failures are logged and yield no counts.
    pub fn spawn(
        root: PathBuf,
        include: Vec<String>,
        exclude: Vec<String>,
        languages: Vec<Language>,
    ) -> Self {
        let handle = tokio::task::spawn_blocking(move || {
            count_loc(&root, &include, &exclude, &languages)
        });
        let future = async move {
            match handle.await {
                Ok(Ok(counts)) => Arc::new(counts),
                Ok(Err(e)) => {
                    warn!("Failed to count lines of code: {}", e);
                    Arc::new(LineCounts::new())
                }
                Err(e) => {
                    warn!("Line counting task did not complete: {}", e);
                    Arc::new(LineCounts::new())
                }
            }
        };
        Self {
            inner: future.boxed().shared(),
        }
    }

    /// A task that resolves immediately to the given counts.
    pub fn ready(counts: LineCounts) -> Self {
        Self {
            inner: futures::future::ready(Arc::new(counts)).boxed().shared(),
        }
    }

    pub async fn get(&self) -> Arc<LineCounts> {
        self.inner.clone().await
    }
}
