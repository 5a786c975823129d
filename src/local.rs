//! Filesystem source acquisition.
//!
//! Walks each configured root depth-first (directories before files, both
//! sorted by name) and reads every file whose root-relative path matches a
//! glob. Matched Markdown ledgers are split into one record per fenced
//! json block (see `record::extract_payloads`); other matches are read
//! whole. Local globs support `*` (any run of non-separator characters) and
//! `**` (any run of path segments). The remote loader deliberately uses a
//! simpler matcher; see `remote::remote_glob_match`.

use crate::config::LocalSources;
use crate::record::{extract_payloads, RawRecord, SourceOrigin};
use std::fs;
use std::path::Path;

/// Load records from every configured root. Per-source failures (missing
/// root, unreadable file) log a warning and contribute zero records.
pub fn load_local(sources: &LocalSources) -> Vec<RawRecord> {
    let mut records = Vec::new();
    for root in &sources.roots {
        if !root.is_dir() {
            tracing::warn!(root = %root.display(), "local root missing, skipping");
            continue;
        }
        let repo = root
            .file_name()
            .map_or_else(|| root.display().to_string(), |name| name.to_string_lossy().into_owned());
        walk_dir(root, root, &repo, &sources.globs, &mut records);
    }
    tracing::info!(count = records.len(), "local records loaded");
    records
}

fn walk_dir(root: &Path, dir: &Path, repo: &str, globs: &[String], out: &mut Vec<RawRecord>) {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) => {
            tracing::warn!(dir = %dir.display(), "read dir failed: {err}");
            return;
        }
    };
    // file_type() does not follow symlinks, so a link cycle inside a root
    // is skipped instead of recursed into.
    let mut paths: Vec<(std::path::PathBuf, fs::FileType)> = entries
        .filter_map(Result::ok)
        .filter_map(|entry| entry.file_type().ok().map(|file_type| (entry.path(), file_type)))
        .collect();
    paths.sort_by(|a, b| a.0.cmp(&b.0));

    for (path, _) in paths.iter().filter(|(_, file_type)| file_type.is_dir()) {
        walk_dir(root, path, repo, globs, out);
    }
    for (path, _) in paths.iter().filter(|(_, file_type)| file_type.is_file()) {
        let Ok(rel) = path.strip_prefix(root) else {
            continue;
        };
        let rel = rel
            .components()
            .map(|component| component.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        if !globs.iter().any(|glob| glob_match(glob, &rel)) {
            continue;
        }
        match fs::read(path) {
            Ok(bytes) => {
                let text = String::from_utf8_lossy(&bytes);
                for (payload_path, raw) in extract_payloads(&rel, &text) {
                    out.push(RawRecord {
                        origin: SourceOrigin {
                            repo: repo.to_string(),
                            path: payload_path,
                        },
                        raw,
                    });
                }
            }
            Err(err) => {
                tracing::warn!(path = %path.display(), "read failed, skipping: {err}");
            }
        }
    }
}

/// Match a `/`-separated path against a glob with `*` and `**` semantics.
pub fn glob_match(pattern: &str, path: &str) -> bool {
    let pattern: Vec<&str> = pattern.split('/').collect();
    let path: Vec<&str> = path.split('/').collect();
    match_segments(&pattern, &path)
}

fn match_segments(pattern: &[&str], path: &[&str]) -> bool {
    match pattern.first() {
        None => path.is_empty(),
        Some(&"**") => {
            (0..=path.len()).any(|skip| match_segments(&pattern[1..], &path[skip..]))
        }
        Some(segment) => {
            !path.is_empty()
                && match_segment(segment, path[0])
                && match_segments(&pattern[1..], &path[1..])
        }
    }
}

fn match_segment(pattern: &str, name: &str) -> bool {
    fn matches(pattern: &[char], name: &[char]) -> bool {
        match pattern.first() {
            None => name.is_empty(),
            Some('*') => {
                matches(&pattern[1..], name)
                    || (!name.is_empty() && matches(pattern, &name[1..]))
            }
            Some(ch) => name.first() == Some(ch) && matches(&pattern[1..], &name[1..]),
        }
    }
    let pattern: Vec<char> = pattern.chars().collect();
    let name: Vec<char> = name.chars().collect();
    matches(&pattern, &name)
}
