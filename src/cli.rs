//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::Parser;
use sitecrawler_core::RateSpec;

/// Crawl a site breadth-first, politely.
///
/// Starting from the seed URLs, sitecrawler follows same-site links up to a
/// hop ceiling and prints one JSON line per fetched page to stdout.
#[derive(Parser, Debug)]
#[command(name = "sitecrawler")]
#[command(author, version, about)]
pub struct Args {
    /// Seed URLs (read from stdin, one per line, when omitted)
    pub seeds: Vec<String>,

    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long)]
    pub quiet: bool,

    /// Number of concurrent workers (1-256) [default: available cores - 1]
    #[arg(short = 'p', long, value_parser = clap::value_parser!(u16).range(1..=256))]
    pub parallel: Option<u16>,

    /// Maximum hops from a seed (0 fetches seeds only) [default: 10]
    #[arg(short = 'd', long)]
    pub max_depth: Option<u32>,

    /// Truncate response bodies to this many bytes [default: 5 MiB]
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    pub max_body_size: Option<u64>,

    /// Per-fetch timeout in seconds (1-3600) [default: 10]
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..=3600))]
    pub timeout_secs: Option<u64>,

    /// Rate limit for a root, e.g. example.com=2/1s or *=10/1s (repeatable)
    #[arg(long = "rate", value_name = "ROOT=SPEC")]
    pub rates: Vec<RateSpec>,

    /// Only admit links of ROOT matching REGEX (repeatable)
    #[arg(long = "allow", value_name = "ROOT=REGEX", value_parser = parse_root_pattern)]
    pub allow: Vec<(String, String)>,

    /// Never admit links of ROOT matching REGEX (repeatable)
    #[arg(long = "disallow", value_name = "ROOT=REGEX", value_parser = parse_root_pattern)]
    pub disallow: Vec<(String, String)>,

    /// User-Agent to send, rotated across seeds (repeatable)
    #[arg(long = "user-agent", value_name = "UA")]
    pub user_agents: Vec<String>,

    /// Referer to send with seeds, rotated (repeatable)
    #[arg(long = "referrer", value_name = "URL")]
    pub referrers: Vec<String>,

    /// Proxy URL, rotated across seeds (repeatable)
    #[arg(long = "proxy", value_name = "URL")]
    pub proxies: Vec<String>,

    /// Honour robots.txt disallow rules
    #[arg(long)]
    pub robots: bool,

    /// Record visited URLs in this SQLite file instead of memory
    #[arg(long, value_name = "PATH")]
    pub visited_db: Option<PathBuf>,

    /// Leave this crawl's visited URLs in the visited database for later crawls
    #[arg(long)]
    pub keep_visited: bool,

    /// Queue pending requests in this SQLite file instead of memory
    #[arg(long, value_name = "PATH")]
    pub frontier_db: Option<PathBuf>,

    /// JSON config file with crawl defaults
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,
}

/// Splits `ROOT=REGEX` at the first `=`.
fn parse_root_pattern(s: &str) -> Result<(String, String), String> {
    let (root, pattern) = s
        .split_once('=')
        .ok_or_else(|| format!("expected ROOT=REGEX, got {s:?}"))?;
    let root = root.trim();
    if root.is_empty() || pattern.is_empty() {
        return Err(format!("expected ROOT=REGEX, got {s:?}"));
    }
    Ok((root.to_string(), pattern.to_string()))
}
