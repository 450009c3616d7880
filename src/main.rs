//! CLI entry point for sitecrawler.

use std::collections::BTreeMap;
use std::io::{self, BufRead, IsTerminal, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use sitecrawler_core::{
    CrawlerBuilder, Database, FilterRule, RateSpec, SqliteFrontier, SqliteVisitedStore,
};
use tracing::{debug, info, warn};

mod app_config;
mod cli;

use app_config::{FileConfig, load_file_config};
use cli::Args;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();

    // Priority: RUST_LOG env var > quiet flag > verbose flag > default (info)
    let default_level = if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    // Results go to stdout, logs to stderr
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    debug!(?args, "CLI arguments parsed");

    let file_config = match args.config.as_deref() {
        Some(path) => load_file_config(path)?,
        None => FileConfig::default(),
    };

    let seeds = read_seeds(&args)?;
    if seeds.is_empty() {
        info!("No seeds provided. Pass URLs as arguments or pipe them via stdin.");
        info!("Example: sitecrawler https://example.com/");
        return Ok(());
    }

    let mut builder = crawler_builder(&args, &file_config)?;
    let visited_db = args.visited_db.as_deref().or(file_config.visited_db.as_deref());
    let frontier_db = args.frontier_db.as_deref().or(file_config.frontier_db.as_deref());
    let mut databases = Databases::default();
    if let Some(path) = visited_db {
        let keep = args.keep_visited || file_config.keep_visited.unwrap_or(false);
        let store = SqliteVisitedStore::with_database(databases.open(path).await?)
            .await
            .with_context(|| format!("Failed to open visited store at {}", path.display()))?
            .clear_on_close(!keep);
        info!(path = %path.display(), run = %store.run_id(), keep, "Using SQLite visited store");
        builder = builder.visited_store(Arc::new(store));
    }
    if let Some(path) = frontier_db {
        let frontier = SqliteFrontier::with_database(databases.open(path).await?)
            .await
            .with_context(|| format!("Failed to open frontier at {}", path.display()))?;
        info!(path = %path.display(), run = %frontier.run_id(), "Using SQLite frontier");
        builder = builder.frontier(Arc::new(frontier));
    }
    drop(databases);
    let crawler = builder.build().context("Invalid crawler configuration")?;

    let (handle, mut results) = crawler.start(&seeds).await?;
    let mut stdout = io::stdout().lock();
    let mut interrupted = false;

    loop {
        tokio::select! {
            next = results.recv() => {
                let Some(result) = next else { break };
                let line = serde_json::to_string(&result.summary())?;
                if let Err(e) = writeln!(stdout, "{line}") {
                    warn!(error = %e, "stdout closed, stopping crawl");
                    handle.stop().await;
                    break;
                }
            }
            signal = tokio::signal::ctrl_c(), if !interrupted => {
                if let Err(e) = signal {
                    warn!(error = %e, "failed to listen for interrupt");
                } else {
                    info!("Interrupted, stopping crawl");
                    handle.stop().await;
                }
                interrupted = true;
            }
        }
    }
    drop(results);

    let report = handle.join().await;
    stdout.flush().ok();
    info!(
        pages = report.total_requests,
        failed = report.failed_requests,
        client_errors = report.client_errors,
        server_errors = report.server_errors,
        cancelled = report.cancelled,
        "Crawl complete"
    );

    Ok(())
}

/// Databases opened for this run, so the visited store and frontier share
/// one pool when they name the same file.
#[derive(Default)]
struct Databases {
    opened: Vec<(PathBuf, Database)>,
}

impl Databases {
    async fn open(&mut self, path: &Path) -> Result<Database> {
        if let Some((_, db)) = self.opened.iter().find(|(opened, _)| opened == path) {
            return Ok(db.clone());
        }
        let db = Database::open(path)
            .await
            .with_context(|| format!("Failed to open crawl database at {}", path.display()))?;
        self.opened.push((path.to_path_buf(), db.clone()));
        Ok(db)
    }
}

/// Seeds from the command line, or from stdin when none were given.
fn read_seeds(args: &Args) -> Result<Vec<String>> {
    if !args.seeds.is_empty() {
        return Ok(args.seeds.clone());
    }
    if io::stdin().is_terminal() {
        return Ok(Vec::new());
    }

    let mut seeds = Vec::new();
    for line in io::stdin().lock().lines() {
        let line = line.context("Failed to read seeds from stdin")?;
        let line = line.trim();
        if !line.is_empty() && !line.starts_with('#') {
            seeds.push(line.to_string());
        }
    }
    Ok(seeds)
}

/// Merges file config and flags into a builder. Flags win; rate specs and
/// filter patterns from both sources are combined per root.
fn crawler_builder(args: &Args, file: &FileConfig) -> Result<CrawlerBuilder> {
    let mut builder = CrawlerBuilder::new();

    if let Some(parallel) = args.parallel.map(usize::from).or(file.parallel) {
        builder = builder.parallel(parallel);
    }
    if let Some(depth) = args.max_depth.or(file.max_depth) {
        builder = builder.max_depth(depth);
    }
    let max_body_size = args
        .max_body_size
        .map(usize::try_from)
        .transpose()
        .context("--max-body-size does not fit in memory")?
        .or(file.max_body_size);
    if let Some(bytes) = max_body_size {
        builder = builder.max_body_size(bytes);
    }
    if let Some(secs) = args.timeout_secs.or(file.timeout_secs) {
        builder = builder.timeout(Duration::from_secs(secs));
    }

    let pick = |flags: &[String], file: &[String]| {
        if flags.is_empty() {
            file.to_vec()
        } else {
            flags.to_vec()
        }
    };
    let user_agents = pick(&args.user_agents, &file.user_agents);
    if !user_agents.is_empty() {
        builder = builder.user_agents(user_agents);
    }
    let referrers = pick(&args.referrers, &file.referrers);
    if !referrers.is_empty() {
        builder = builder.referrers(referrers);
    }
    builder = builder.proxies(pick(&args.proxies, &file.proxies));

    let mut rates = Vec::new();
    for (root, spec) in &file.rate_limits {
        rates.push(RateSpec::parse(root.as_str(), spec)?);
    }
    rates.extend(args.rates.iter().cloned());
    builder = builder.rate_limits(rates);

    let mut rules: BTreeMap<String, FilterRule> = BTreeMap::new();
    for (root, patterns) in &file.filters {
        rules.insert(
            root.clone(),
            FilterRule::new(root.as_str(), &patterns.allow, &patterns.disallow)?,
        );
    }
    for (root, pattern) in &args.allow {
        filter_rule(&mut rules, root)?.push_allow(pattern)?;
    }
    for (root, pattern) in &args.disallow {
        filter_rule(&mut rules, root)?.push_disallow(pattern)?;
    }
    builder = builder.filter_rules(rules.into_values().collect());

    Ok(builder.respect_robots(args.robots || file.respect_robots.unwrap_or(false)))
}

fn filter_rule<'a>(
    rules: &'a mut BTreeMap<String, FilterRule>,
    root: &str,
) -> Result<&'a mut FilterRule> {
    if !rules.contains_key(root) {
        let empty: &[&str] = &[];
        rules.insert(root.to_string(), FilterRule::new(root, empty, empty)?);
    }
    rules
        .get_mut(root)
        .context("filter rule missing after insert")
}
