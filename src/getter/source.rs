//! Source string helpers: `//` subdir decomposition and glob subdir lookup

use crate::error::{GetterError, Result};
use std::path::{Path, PathBuf};

/// Split a source string into the source proper and its `//`-separated
/// subdirectory. The separator is searched after any `scheme://` prefix and
/// before the query string; a query that trails the subdir is moved back onto
/// the source.
///
/// `https://example.com/m.tgz//modules/vpc?ref=v1` becomes
/// (`https://example.com/m.tgz?ref=v1`, `modules/vpc`).
pub fn split_source_and_subdir(src: &str) -> (String, String) {
    let stop = src.find('?').unwrap_or(src.len());

    let offset = src[..stop].find("://").map(|idx| idx + 3).unwrap_or(0);

    let Some(idx) = src[offset..stop].find("//") else {
        return (src.to_string(), String::new());
    };
    let idx = idx + offset;

    let mut source = src[..idx].to_string();
    let mut subdir = src[idx + 2..].to_string();

    if let Some(q) = subdir.find('?') {
        source.push_str(&subdir[q..]);
        subdir.truncate(q);
    }

    (source, subdir)
}

/// Join subdirectories in order, dropping empty segments.
pub fn join_subdirs(first: &str, second: &str) -> String {
    first
        .split('/')
        .chain(second.split('/'))
        .filter(|segment| !segment.is_empty() && *segment != ".")
        .collect::<Vec<_>>()
        .join("/")
}

fn has_glob_meta(pattern: &str) -> bool {
    pattern.contains(['*', '?', '['])
}

/// Resolve `pattern` below `root`. A literal pattern is joined as-is; a glob
/// must match at most one path, and when it matches none the literal join is
/// returned so the caller's existence check reports it.
pub fn resolve_glob_subdir(root: &Path, pattern: &str) -> Result<PathBuf> {
    let joined = root.join(pattern);
    if !has_glob_meta(pattern) {
        return Ok(joined);
    }

    let full_pattern = format!(
        "{}/{}",
        glob::Pattern::escape(&root.to_string_lossy()),
        pattern.trim_start_matches('/')
    );

    let mut matches: Vec<PathBuf> = glob::glob(&full_pattern)?
        .filter_map(|entry| entry.ok())
        .collect();

    match matches.len() {
        0 => Ok(joined),
        1 => Ok(matches.remove(0)),
        _ => Err(GetterError::Fetch(format!(
            "subdir {:?} had multiple matches: {:?}",
            pattern, matches
        ))),
    }
}
