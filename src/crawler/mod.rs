//! Concurrent crawl orchestrator.
//!
//! # Overview
//!
//! A [`Crawler`] owns a fixed pool of workers. Each worker pops a request from
//! the [`Frontier`], waits on the per-root [`RateLimiter`], calls the
//! [`Fetcher`], pushes admissible same-site children back onto the frontier,
//! and streams a [`FetchResult`] to the consumer.
//!
//! The crawl moves through [`CrawlState`]: `Idle` until seeds are submitted,
//! `Running` while workers are active, `Draining` once the depth ceiling is
//! hit, and `Stopped` when the frontier is exhausted or [`CrawlHandle::stop`]
//! is called.
//!
//! # Example
//!
//! ```no_run
//! use sitecrawler_core::crawler::Crawler;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let crawler = Crawler::builder().parallel(4).max_depth(2).build()?;
//! let report = crawler
//!     .run(["https://example.com/"], |result| {
//!         println!("{} {}", result.status, result.url);
//!     })
//!     .await?;
//! println!("fetched {} pages", report.total_requests);
//! # Ok(())
//! # }
//! ```

mod config;
mod error;
mod rotator;
mod state;
mod stats;
mod worker;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

pub use config::{
    CrawlerConfig, DEFAULT_MAX_DEPTH, DEFAULT_REFERRER, DEFAULT_RESULT_BUFFER, MAX_PARALLEL,
    MIN_PARALLEL, default_parallelism,
};
pub use error::{ConfigError, CrawlError};
pub use rotator::Rotator;
pub use state::CrawlState;
pub use stats::{CrawlReport, CrawlStats};

use worker::{Shared, run_worker};

use crate::fetch::{FetchRequest, FetchResult, Fetcher, HttpFetcher};
use crate::filter::{AdmissionFilter, FilterRule};
use crate::frontier::{Frontier, InMemoryFrontier};
use crate::limiter::{RateLimiter, RateSpec};
use crate::link::NormalizedUrl;
use crate::robots::RobotsCache;
use crate::store::{InMemoryVisitedStore, VisitedStore};

/// Builder for [`Crawler`].
///
/// Collaborators left unset get defaults: [`HttpFetcher`],
/// [`InMemoryFrontier`], [`InMemoryVisitedStore`], and (when robots are
/// respected) a fresh [`RobotsCache`].
#[derive(Default)]
pub struct CrawlerBuilder {
    config: CrawlerConfig,
    rate_limits: Vec<RateSpec>,
    filter_rules: Vec<FilterRule>,
    fetcher: Option<Arc<dyn Fetcher>>,
    frontier: Option<Arc<dyn Frontier>>,
    visited: Option<Arc<dyn VisitedStore>>,
    robots: Option<Arc<RobotsCache>>,
}

impl CrawlerBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the whole configuration.
    #[must_use]
    pub fn config(mut self, config: CrawlerConfig) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub fn parallel(mut self, parallel: usize) -> Self {
        self.config.parallel = parallel;
        self
    }

    #[must_use]
    pub fn max_depth(mut self, max_depth: u32) -> Self {
        self.config.max_depth = max_depth;
        self
    }

    #[must_use]
    pub fn max_body_size(mut self, bytes: usize) -> Self {
        self.config.max_body_size = bytes;
        self
    }

    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    #[must_use]
    pub fn user_agents(mut self, user_agents: Vec<String>) -> Self {
        self.config.user_agents = user_agents;
        self
    }

    #[must_use]
    pub fn referrers(mut self, referrers: Vec<String>) -> Self {
        self.config.referrers = referrers;
        self
    }

    #[must_use]
    pub fn proxies(mut self, proxies: Vec<String>) -> Self {
        self.config.proxies = proxies;
        self
    }

    /// Per-root politeness. A spec for root `*` replaces the default
    /// wildcard.
    #[must_use]
    pub fn rate_limits(mut self, specs: Vec<RateSpec>) -> Self {
        self.rate_limits = specs;
        self
    }

    #[must_use]
    pub fn filter_rules(mut self, rules: Vec<FilterRule>) -> Self {
        self.filter_rules = rules;
        self
    }

    #[must_use]
    pub fn respect_robots(mut self, respect: bool) -> Self {
        self.config.respect_robots = respect;
        self
    }

    #[must_use]
    pub fn result_buffer(mut self, capacity: usize) -> Self {
        self.config.result_buffer = capacity;
        self
    }

    #[must_use]
    pub fn fetcher(mut self, fetcher: Arc<dyn Fetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    #[must_use]
    pub fn frontier(mut self, frontier: Arc<dyn Frontier>) -> Self {
        self.frontier = Some(frontier);
        self
    }

    #[must_use]
    pub fn visited_store(mut self, visited: Arc<dyn VisitedStore>) -> Self {
        self.visited = Some(visited);
        self
    }

    /// Robots cache to consult. Implies `respect_robots(true)`.
    #[must_use]
    pub fn robots_cache(mut self, robots: Arc<RobotsCache>) -> Self {
        self.robots = Some(robots);
        self.config.respect_robots = true;
        self
    }

    /// Validates the configuration and assembles the crawler.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] for out-of-range settings or when a default
    /// collaborator cannot be built.
    pub fn build(self) -> Result<Crawler, ConfigError> {
        self.config.validate()?;

        let fetcher: Arc<dyn Fetcher> = match self.fetcher {
            Some(fetcher) => fetcher,
            None => Arc::new(HttpFetcher::new()?),
        };
        let frontier = self
            .frontier
            .unwrap_or_else(|| Arc::new(InMemoryFrontier::new()));
        let visited = self
            .visited
            .unwrap_or_else(|| Arc::new(InMemoryVisitedStore::new()));
        let robots = match (self.robots, self.config.respect_robots) {
            (Some(robots), _) => Some(robots),
            (None, true) => Some(Arc::new(RobotsCache::new(
                &self.config.primary_user_agent(),
            )?)),
            (None, false) => None,
        };

        let shared = Shared::new(
            self.config,
            fetcher,
            frontier,
            visited,
            RateLimiter::new(self.rate_limits),
            AdmissionFilter::new(self.filter_rules),
            robots,
        );
        Ok(Crawler {
            shared: Arc::new(shared),
        })
    }
}

/// A configured, not yet started crawl.
pub struct Crawler {
    shared: Arc<Shared>,
}

impl Crawler {
    #[must_use]
    pub fn builder() -> CrawlerBuilder {
        CrawlerBuilder::new()
    }

    #[must_use]
    pub fn state(&self) -> CrawlState {
        self.shared.state.get()
    }

    #[must_use]
    pub fn config(&self) -> &CrawlerConfig {
        &self.shared.config
    }

    /// Submits seeds and starts the worker pool.
    ///
    /// Malformed or unsupported seeds are logged and skipped. Duplicate seeds
    /// are admitted once.
    ///
    /// # Errors
    ///
    /// Returns [`CrawlError::NoValidSeeds`] if nothing could be admitted, or
    /// a frontier/store error raised while seeding. Collaborators are closed
    /// before an error is returned.
    #[instrument(skip_all, fields(parallel = self.shared.config.parallel, max_depth = self.shared.config.max_depth))]
    pub async fn start<I, S>(
        self,
        seeds: I,
    ) -> Result<(CrawlHandle, mpsc::Receiver<FetchResult>), CrawlError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let shared = self.shared;
        let started = Instant::now();

        let seeded = match seed_frontier(&shared, seeds).await {
            Ok(0) => Err(CrawlError::NoValidSeeds),
            other => other,
        };
        let admitted = match seeded {
            Ok(admitted) => admitted,
            Err(e) => {
                shared.state.advance(CrawlState::Stopped);
                close_collaborators(&shared).await;
                return Err(e);
            }
        };

        shared.state.advance(CrawlState::Running);
        info!(seeds = admitted, "crawl started");

        let (results_tx, results_rx) = mpsc::channel(shared.config.result_buffer);
        let workers = (0..shared.config.parallel)
            .map(|id| {
                let shared = Arc::clone(&shared);
                let results = results_tx.clone();
                tokio::spawn(run_worker(id, shared, results))
            })
            .collect();

        let handle = CrawlHandle {
            shared,
            workers,
            started,
        };
        Ok((handle, results_rx))
    }

    /// Crawls from `seeds`, handing every result to `on_result`, and returns
    /// the final report.
    ///
    /// # Errors
    ///
    /// Same as [`start`](Self::start).
    pub async fn run<I, S, F>(self, seeds: I, mut on_result: F) -> Result<CrawlReport, CrawlError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
        F: FnMut(FetchResult),
    {
        let (handle, mut results) = self.start(seeds).await?;
        while let Some(result) = results.recv().await {
            on_result(result);
        }
        Ok(handle.join().await)
    }
}

/// Pushes every valid, unseen seed. Returns how many were admitted.
async fn seed_frontier<I, S>(shared: &Shared, seeds: I) -> Result<usize, CrawlError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut admitted = 0;
    for seed in seeds {
        let seed = seed.as_ref();
        let target = match NormalizedUrl::parse(seed) {
            Ok(target) => target,
            Err(e) => {
                warn!(seed, error = %e, "rejecting seed");
                continue;
            }
        };
        if !shared.visited.mark_if_new(target.hash()).await? {
            debug!(seed, "duplicate seed");
            shared.stats.record_duplicate();
            continue;
        }
        shared
            .enqueue(FetchRequest::seed(target, shared.seed_params()))
            .await?;
        shared.stats.record_crawled();
        admitted += 1;
    }
    Ok(admitted)
}

async fn close_collaborators(shared: &Shared) {
    shared.frontier.close().await;
    shared.limiter.close();
    if let Err(e) = shared.visited.close().await {
        warn!(error = %e, "failed to close visited store");
    }
    shared.fetcher.close().await;
}

/// Control handle for a running crawl.
pub struct CrawlHandle {
    shared: Arc<Shared>,
    workers: Vec<JoinHandle<()>>,
    started: Instant,
}

impl CrawlHandle {
    #[must_use]
    pub fn state(&self) -> CrawlState {
        self.shared.state.get()
    }

    /// Requests queued or being processed.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.shared.outstanding()
    }

    /// Counters so far.
    #[must_use]
    pub fn stats(&self) -> CrawlReport {
        self.shared
            .stats
            .snapshot(self.started.elapsed(), self.shared.is_cancelled())
    }

    /// Requests cancellation. Blocked workers are released and in-flight
    /// fetches abandoned. Idempotent.
    pub async fn stop(&self) {
        self.shared.cancel().await;
    }

    /// Waits for every worker to exit, closes the frontier, rate limiter,
    /// visited store and fetcher, and returns the final report.
    #[instrument(skip_all)]
    pub async fn join(self) -> CrawlReport {
        for worker in self.workers {
            if let Err(e) = worker.await {
                warn!(error = %e, "crawl worker panicked");
            }
        }

        self.shared.state.advance(CrawlState::Stopped);
        close_collaborators(&self.shared).await;

        let report = self
            .shared
            .stats
            .snapshot(self.started.elapsed(), self.shared.is_cancelled());
        info!(
            requests = report.total_requests,
            ok = report.successful_requests,
            failed = report.failed_requests,
            redirects = report.redirects,
            client_errors = report.client_errors,
            server_errors = report.server_errors,
            crawled = report.crawled_links,
            skipped = report.skipped_links,
            duplicated = report.duplicated_links,
            elapsed_ms = report.elapsed_ms,
            cancelled = report.cancelled,
            "crawl finished"
        );
        report
    }
}
