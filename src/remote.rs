//! Remote source acquisition over a code-hosting REST API.
//!
//! Per repository: default-branch lookup, one recursive tree listing, then
//! one blob fetch per matching entry. Repositories are fetched by a bounded
//! worker pool since latency dominates; a failure anywhere inside one
//! repository degrades to zero records from that repository and never
//! aborts the others.
//!
//! The remote glob matcher intentionally supports only a single `*`
//! wildcard. The asymmetry with the local `*`/`**` matcher is preserved on
//! purpose rather than unified.

use crate::config::RemoteSources;
use crate::record::{extract_payloads, RawRecord, SourceOrigin};
use anyhow::{anyhow, Context, Result};
use base64::{engine::general_purpose, Engine as _};
use serde::Deserialize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

const API_BASE: &str = "https://api.github.com";
const USER_AGENT: &str = concat!("codex-sync/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Deserialize)]
struct RepoInfo {
    default_branch: String,
}

#[derive(Debug, Deserialize)]
struct TreeListing {
    #[serde(default)]
    tree: Vec<TreeEntry>,
    #[serde(default)]
    truncated: bool,
}

#[derive(Debug, Deserialize)]
struct TreeEntry {
    path: String,
    sha: String,
    #[serde(rename = "type")]
    entry_type: String,
}

#[derive(Debug, Deserialize)]
struct BlobContent {
    content: String,
    encoding: String,
}

/// Fetch records from every configured repository, fanning out across a
/// bounded worker pool and flattening the per-repo results afterward.
pub fn load_remote(
    sources: &RemoteSources,
    token: Option<&str>,
    concurrency: usize,
    request_timeout: Duration,
) -> Vec<RawRecord> {
    let agent = ureq::Agent::config_builder()
        .timeout_global(Some(request_timeout))
        .build()
        .new_agent();

    let cursor = AtomicUsize::new(0);
    let workers = concurrency.clamp(1, sources.repos.len().max(1));
    let (sender, receiver) = mpsc::channel::<Vec<RawRecord>>();

    thread::scope(|scope| {
        for _ in 0..workers {
            let sender = sender.clone();
            let agent = agent.clone();
            let cursor = &cursor;
            let sources = &*sources;
            scope.spawn(move || loop {
                let index = cursor.fetch_add(1, Ordering::SeqCst);
                let Some(repo) = sources.repos.get(index) else {
                    break;
                };
                match fetch_repo(&agent, &sources.org, repo, &sources.globs, token) {
                    Ok(records) => {
                        tracing::info!(repo = %repo, count = records.len(), "remote repo fetched");
                        let _ = sender.send(records);
                    }
                    Err(err) => {
                        tracing::warn!(repo = %repo, "remote fetch failed, skipping: {err:#}");
                    }
                }
            });
        }
        drop(sender);
    });

    let mut records: Vec<RawRecord> = receiver.into_iter().flatten().collect();
    // Stable stream order regardless of worker timing.
    records.sort_by(|a, b| a.origin.cmp(&b.origin));
    tracing::info!(count = records.len(), "remote records loaded");
    records
}

fn fetch_repo(
    agent: &ureq::Agent,
    org: &str,
    repo: &str,
    globs: &[String],
    token: Option<&str>,
) -> Result<Vec<RawRecord>> {
    let info: RepoInfo = get_json(agent, &format!("{API_BASE}/repos/{org}/{repo}"), token)
        .context("look up default branch")?;

    let listing: TreeListing = get_json(
        agent,
        &format!(
            "{API_BASE}/repos/{org}/{repo}/git/trees/{}?recursive=1",
            info.default_branch
        ),
        token,
    )
    .context("fetch repository tree")?;
    if listing.truncated {
        tracing::warn!(repo = %repo, "tree listing truncated, using returned entries");
    }

    let mut records = Vec::new();
    for entry in matching_blobs(&listing, globs) {
        let blob: BlobContent = get_json(
            agent,
            &format!("{API_BASE}/repos/{org}/{repo}/git/blobs/{}", entry.sha),
            token,
        )
        .with_context(|| format!("fetch blob {}", entry.path))?;
        let text = decode_blob(&blob).with_context(|| format!("decode blob {}", entry.path))?;
        for (path, raw) in extract_payloads(&entry.path, &text) {
            records.push(RawRecord {
                origin: SourceOrigin {
                    repo: repo.to_string(),
                    path,
                },
                raw,
            });
        }
    }
    Ok(records)
}

fn matching_blobs<'a>(listing: &'a TreeListing, globs: &'a [String]) -> impl Iterator<Item = &'a TreeEntry> {
    listing.tree.iter().filter(move |entry| {
        entry.entry_type == "blob" && globs.iter().any(|glob| remote_glob_match(glob, &entry.path))
    })
}

fn get_json<T: serde::de::DeserializeOwned>(
    agent: &ureq::Agent,
    url: &str,
    token: Option<&str>,
) -> Result<T> {
    let mut request = agent
        .get(url)
        .header("User-Agent", USER_AGENT)
        .header("Accept", "application/vnd.github+json");
    if let Some(token) = token {
        request = request.header("Authorization", format!("Bearer {token}"));
    }
    let body = request
        .call()
        .with_context(|| format!("GET {url}"))?
        .into_body()
        .read_to_string()
        .with_context(|| format!("read response body for {url}"))?;
    serde_json::from_str(&body).with_context(|| format!("parse response for {url}"))
}

/// Decode a blob payload; the API base64-encodes content with embedded
/// newlines.
fn decode_blob(blob: &BlobContent) -> Result<String> {
    if blob.encoding != "base64" {
        return Err(anyhow!("unexpected blob encoding {:?}", blob.encoding));
    }
    let cleaned: String = blob.content.chars().filter(|ch| !ch.is_whitespace()).collect();
    let bytes = general_purpose::STANDARD
        .decode(cleaned)
        .context("base64 decode blob content")?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Remote glob matcher: literal match around at most one `*` wildcard.
pub fn remote_glob_match(pattern: &str, path: &str) -> bool {
    match pattern.split_once('*') {
        None => pattern == path,
        Some((prefix, suffix)) => {
            path.len() >= prefix.len() + suffix.len()
                && path.starts_with(prefix)
                && path.ends_with(suffix)
        }
    }
}
