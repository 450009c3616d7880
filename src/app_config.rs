//! Optional JSON configuration file.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use serde::Deserialize;
use sitecrawler_core::RateSpec;
use sitecrawler_core::crawler::{MAX_PARALLEL, MIN_PARALLEL};

/// Crawl defaults read from `--config`. Every field is optional; command-line
/// flags take precedence.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    /// Worker count (1..=256).
    pub parallel: Option<usize>,
    /// Hop ceiling.
    pub max_depth: Option<u32>,
    /// Body cap in bytes.
    pub max_body_size: Option<usize>,
    /// Per-fetch timeout in seconds (1..=3600).
    pub timeout_secs: Option<u64>,
    /// Root to rate spec, e.g. `{"example.com": "2/1s", "*": "10/1s"}`.
    pub rate_limits: BTreeMap<String, String>,
    /// Root to allow/disallow patterns.
    pub filters: BTreeMap<String, FilterConfig>,
    pub user_agents: Vec<String>,
    pub referrers: Vec<String>,
    pub proxies: Vec<String>,
    /// Consult robots.txt.
    pub respect_robots: Option<bool>,
    /// `SQLite` file for the visited store.
    pub visited_db: Option<PathBuf>,
    /// Leave visited URLs in `visited_db` after the crawl.
    pub keep_visited: Option<bool>,
    /// `SQLite` file for the frontier.
    pub frontier_db: Option<PathBuf>,
}

/// Patterns for one root.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct FilterConfig {
    pub allow: Vec<String>,
    pub disallow: Vec<String>,
}

impl FileConfig {
    /// Validates config values against runtime and CLI constraints.
    pub fn validate(&self) -> Result<()> {
        if let Some(parallel) = self.parallel
            && !(MIN_PARALLEL..=MAX_PARALLEL).contains(&parallel)
        {
            bail!(
                "Invalid config value for `parallel`: {parallel}. Expected range: {MIN_PARALLEL}..={MAX_PARALLEL}"
            );
        }

        if let Some(timeout) = self.timeout_secs
            && !(1..=3600).contains(&timeout)
        {
            bail!("Invalid config value for `timeout_secs`: {timeout}. Expected range: 1..=3600");
        }

        if let Some(size) = self.max_body_size
            && size == 0
        {
            bail!("Invalid config value for `max_body_size`: must be at least 1 byte");
        }

        for (root, spec) in &self.rate_limits {
            RateSpec::parse(root.as_str(), spec)
                .with_context(|| format!("Invalid config value in `rate_limits` for `{root}`"))?;
        }

        Ok(())
    }
}

/// Reads, parses and validates a config file.
pub fn load_file_config(path: &Path) -> Result<FileConfig> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file at {}", path.display()))?;
    let config: FileConfig = serde_json::from_str(&raw)
        .with_context(|| format!("Failed to parse config file at {}", path.display()))?;
    config
        .validate()
        .with_context(|| format!("Invalid config file at {}", path.display()))?;
    Ok(config)
}
