//! Build configuration for a consolidation run.
//!
//! Configuration errors are the only fatal error class: they are surfaced
//! before any output I/O so a broken run never leaves partial artifacts.

use anyhow::{anyhow, Context, Result};
use regex::Regex;
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

/// Environment variable holding the optional remote bearer token.
pub const TOKEN_ENV: &str = "CODEX_SYNC_TOKEN";

const DEFAULT_CONCURRENCY: usize = 4;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BuildConfig {
    #[serde(default)]
    pub local: Option<LocalSources>,
    #[serde(default)]
    pub remote: Option<RemoteSources>,
    /// Regex patterns flagged as policy violations when matched in free text.
    #[serde(default)]
    pub blocklist: Vec<String>,
    /// Worker count for remote repository fetches.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// Global per-request timeout for remote calls.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LocalSources {
    pub roots: Vec<PathBuf>,
    pub globs: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RemoteSources {
    pub org: String,
    pub repos: Vec<String>,
    pub globs: Vec<String>,
}

fn default_concurrency() -> usize {
    DEFAULT_CONCURRENCY
}

fn default_request_timeout_secs() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}

impl BuildConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let bytes =
            fs::read(path).with_context(|| format!("read config {}", path.display()))?;
        let config: Self = serde_json::from_slice(&bytes)
            .with_context(|| format!("parse config {}", path.display()))?;
        config.ensure_sources()?;
        Ok(config)
    }

    /// At least one source block must name something to fetch from.
    fn ensure_sources(&self) -> Result<()> {
        let has_local = self.local.as_ref().is_some_and(|local| !local.roots.is_empty());
        let has_remote = self
            .remote
            .as_ref()
            .is_some_and(|remote| !remote.repos.is_empty());
        if !has_local && !has_remote {
            return Err(anyhow!("no sources configured: need local roots or remote repos"));
        }
        Ok(())
    }

    /// Compile the blocklist up front; a bad pattern is a configuration error.
    pub fn compile_blocklist(&self) -> Result<Vec<Regex>> {
        self.blocklist
            .iter()
            .map(|pattern| {
                Regex::new(pattern)
                    .with_context(|| format!("compile blocklist pattern {pattern:?}"))
            })
            .collect()
    }
}

/// Read the remote access token once at startup. Absence only lowers the
/// remote rate limit; it is never an error.
pub fn read_token() -> Option<String> {
    env::var(TOKEN_ENV).ok().filter(|token| !token.is_empty())
}
