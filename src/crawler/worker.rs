//! Per-worker crawl loop and the state workers share.
//!
//! # Completion
//!
//! `outstanding` counts requests that are queued or being processed. It is
//! incremented before a request is pushed and decremented only after the
//! request's children have been pushed and its result emitted. It therefore
//! equals frontier length plus in-flight work at every instant, and the worker
//! whose decrement takes it to zero is the one that closes the frontier.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::runtime::Handle;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

use super::state::{CrawlState, StateCell};
use super::stats::CrawlStats;
use super::{CrawlerConfig, Rotator};
use crate::fetch::{FetchError, FetchParams, FetchRequest, FetchResult, FetchedPage, Fetcher};
use crate::filter::AdmissionFilter;
use crate::frontier::{Frontier, FrontierError};
use crate::limiter::RateLimiter;
use crate::link::NormalizedUrl;
use crate::robots::RobotsCache;
use crate::store::VisitedStore;

/// Everything a crawl's workers share.
pub(crate) struct Shared {
    pub(crate) config: CrawlerConfig,
    pub(crate) fetcher: Arc<dyn Fetcher>,
    pub(crate) frontier: Arc<dyn Frontier>,
    pub(crate) visited: Arc<dyn VisitedStore>,
    pub(crate) limiter: RateLimiter,
    pub(crate) filter: AdmissionFilter,
    pub(crate) robots: Option<Arc<RobotsCache>>,
    pub(crate) stats: CrawlStats,
    pub(crate) state: StateCell,
    pub(crate) user_agents: Rotator<String>,
    pub(crate) referrers: Rotator<String>,
    pub(crate) proxies: Rotator<String>,
    outstanding: AtomicUsize,
    shutdown: watch::Sender<bool>,
}

impl Shared {
    pub(crate) fn new(
        config: CrawlerConfig,
        fetcher: Arc<dyn Fetcher>,
        frontier: Arc<dyn Frontier>,
        visited: Arc<dyn VisitedStore>,
        limiter: RateLimiter,
        filter: AdmissionFilter,
        robots: Option<Arc<RobotsCache>>,
    ) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            user_agents: Rotator::new(config.user_agents.clone()),
            referrers: Rotator::new(config.referrers.clone()),
            proxies: Rotator::new(config.proxies.clone()),
            config,
            fetcher,
            frontier,
            visited,
            limiter,
            filter,
            robots,
            stats: CrawlStats::new(),
            state: StateCell::default(),
            outstanding: AtomicUsize::new(0),
            shutdown,
        }
    }

    /// Transport parameters for the next seed, drawn from the rotators.
    pub(crate) fn seed_params(&self) -> FetchParams {
        let defaults = FetchParams::default();
        FetchParams {
            user_agent: self.user_agents.pick().unwrap_or(defaults.user_agent),
            proxy: self.proxies.pick(),
            referer: self.referrers.pick(),
            max_body_size: self.config.max_body_size,
            timeout: self.config.timeout,
        }
    }

    /// Counts `request` as outstanding and pushes it. The count is rolled back
    /// if the push fails.
    pub(crate) async fn enqueue(&self, request: FetchRequest) -> Result<(), FrontierError> {
        self.outstanding.fetch_add(1, Ordering::AcqRel);
        if let Err(e) = self.frontier.push(request).await {
            self.outstanding.fetch_sub(1, Ordering::AcqRel);
            return Err(e);
        }
        Ok(())
    }

    /// Marks one outstanding request as fully processed and closes the
    /// frontier when none remain.
    async fn release(&self) {
        if self.outstanding.fetch_sub(1, Ordering::AcqRel) == 1 {
            if self.state.advance(CrawlState::Stopped) {
                info!("frontier exhausted, stopping");
            }
            self.frontier.close().await;
        }
    }

    pub(crate) fn outstanding(&self) -> usize {
        self.outstanding.load(Ordering::Acquire)
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Requests cancellation. Idempotent.
    pub(crate) async fn cancel(&self) {
        if self.shutdown.send_replace(true) {
            return;
        }
        self.state.advance(CrawlState::Stopped);
        info!("crawl cancelled");
        self.frontier.close().await;
    }

    fn subscribe(&self) -> watch::Receiver<bool> {
        self.shutdown.subscribe()
    }

    fn enter_draining(&self, depth: u32) {
        if self.state.advance(CrawlState::Draining) {
            info!(depth, max_depth = self.config.max_depth, "depth ceiling reached, draining");
        }
    }
}

/// Releases the outstanding count of a request even if processing panics.
struct InFlight {
    shared: Arc<Shared>,
    released: bool,
}

impl InFlight {
    fn new(shared: &Arc<Shared>) -> Self {
        Self {
            shared: Arc::clone(shared),
            released: false,
        }
    }

    async fn release(mut self) {
        self.released = true;
        self.shared.release().await;
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        if let Ok(runtime) = Handle::try_current() {
            let shared = Arc::clone(&self.shared);
            runtime.spawn(async move { shared.release().await });
        }
    }
}

/// Resolves once cancellation has been requested.
async fn cancelled(shutdown: &mut watch::Receiver<bool>) {
    loop {
        let stopped = *shutdown.borrow_and_update();
        if stopped || shutdown.changed().await.is_err() {
            return;
        }
    }
}

/// Pops and processes requests until the frontier closes.
#[instrument(skip_all, fields(worker = id))]
pub(crate) async fn run_worker(id: usize, shared: Arc<Shared>, results: mpsc::Sender<FetchResult>) {
    let mut shutdown = shared.subscribe();
    debug!("worker started");

    loop {
        if shared.is_cancelled() {
            break;
        }
        let request = match shared.frontier.pop().await {
            Ok(request) => request,
            Err(FrontierError::Closed) => break,
            Err(e) => {
                warn!(error = %e, "frontier failed, cancelling crawl");
                shared.cancel().await;
                break;
            }
        };

        let in_flight = InFlight::new(&shared);
        process(&shared, request, &results, &mut shutdown).await;
        in_flight.release().await;
    }

    debug!("worker exiting");
}

async fn process(
    shared: &Shared,
    request: FetchRequest,
    results: &mpsc::Sender<FetchResult>,
    shutdown: &mut watch::Receiver<bool>,
) {
    let max_depth = shared.config.max_depth;
    if request.depth > max_depth {
        debug!(url = %request.target, depth = request.depth, "discarding request beyond depth ceiling");
        shared.enter_draining(request.depth);
        shared.stats.record_skipped();
        return;
    }

    if let Some(robots) = &shared.robots {
        let url = request.target.url();
        // Retrieving robots.txt is a request to the same site.
        if robots.needs_fetch(url) {
            tokio::select! {
                () = shared.limiter.wait(request.target.root()) => {}
                () = cancelled(shutdown) => return,
            }
        }
        let allowed = tokio::select! {
            allowed = robots.is_allowed_via(url, request.params.proxy.as_deref()) => allowed,
            () = cancelled(shutdown) => return,
        };
        if !allowed {
            debug!(url = %request.target, "blocked by robots.txt");
            shared.stats.record_skipped();
            return;
        }
    }

    tokio::select! {
        () = shared.limiter.wait(request.target.root()) => {}
        () = cancelled(shutdown) => return,
    }

    let started = Instant::now();
    let outcome = tokio::select! {
        outcome = fetch_with_timeout(shared.fetcher.as_ref(), &request) => outcome,
        () = cancelled(shutdown) => return,
    };
    let elapsed = started.elapsed();

    let result = match outcome {
        Ok(page) => {
            shared.stats.record_status(page.status);
            debug!(url = %request.target, status = page.status, links = page.links.len(), "fetched");
            let child_links = admit_children(shared, &request, &page).await;
            FetchResult {
                url: request.target,
                status: page.status,
                body: page.body,
                child_links,
                depth: request.depth,
                elapsed,
                err: None,
            }
        }
        Err(e) => {
            shared.stats.record_failure();
            warn!(url = %request.target, error = %e, "fetch failed");
            FetchResult {
                url: request.target,
                status: 0,
                body: Vec::new(),
                child_links: Vec::new(),
                depth: request.depth,
                elapsed,
                err: Some(e),
            }
        }
    };

    tokio::select! {
        sent = results.send(result) => {
            if sent.is_err() {
                debug!("result receiver dropped");
                shared.cancel().await;
            }
        }
        () = cancelled(shutdown) => {}
    }
}

async fn fetch_with_timeout(
    fetcher: &dyn Fetcher,
    request: &FetchRequest,
) -> Result<FetchedPage, FetchError> {
    tokio::time::timeout(request.params.timeout, fetcher.fetch(request))
        .await
        .unwrap_or_else(|_| Err(FetchError::timeout(request.target.as_str())))
}

/// Normalizes the page's links and pushes each admissible, unseen, same-site
/// child. Returns every link that normalized.
async fn admit_children(
    shared: &Shared,
    parent: &FetchRequest,
    page: &FetchedPage,
) -> Vec<NormalizedUrl> {
    let children_allowed = parent.depth < shared.config.max_depth;
    let mut normalized = Vec::with_capacity(page.links.len());

    for raw in &page.links {
        shared.stats.record_link();
        let child = match NormalizedUrl::parse(raw) {
            Ok(child) => child,
            Err(e) => {
                debug!(link = %raw, error = %e, "skipping malformed link");
                shared.stats.record_skipped();
                continue;
            }
        };
        normalized.push(child.clone());

        if !parent.target.is_same_site(&child) {
            debug!(link = %child, "skipping cross-site link");
            shared.stats.record_skipped();
            continue;
        }
        if !children_allowed {
            shared.enter_draining(parent.depth + 1);
            shared.stats.record_skipped();
            continue;
        }
        if !shared.filter.allow(&child) {
            debug!(link = %child, "rejected by filter");
            shared.stats.record_skipped();
            continue;
        }
        match shared.visited.mark_if_new(child.hash()).await {
            Ok(true) => {}
            Ok(false) => {
                shared.stats.record_duplicate();
                continue;
            }
            Err(e) => {
                warn!(link = %child, error = %e, "visited store failed, skipping link");
                shared.stats.record_skipped();
                continue;
            }
        }

        match shared.enqueue(parent.child(child)).await {
            Ok(()) => {}
            Err(FrontierError::Closed) => {
                debug!("frontier closed, dropping remaining children");
                break;
            }
            Err(e) => {
                warn!(link = %raw, error = %e, "failed to enqueue link");
                shared.stats.record_skipped();
                continue;
            }
        }
        shared.stats.record_crawled();
    }

    normalized
}
