//! Crawl counters.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use serde::Serialize;

/// Live counters, updated by workers.
#[derive(Debug, Default)]
pub struct CrawlStats {
    total_requests: AtomicUsize,
    successful_requests: AtomicUsize,
    failed_requests: AtomicUsize,
    redirects: AtomicUsize,
    client_errors: AtomicUsize,
    server_errors: AtomicUsize,
    total_links: AtomicUsize,
    crawled_links: AtomicUsize,
    skipped_links: AtomicUsize,
    duplicated_links: AtomicUsize,
}

impl CrawlStats {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Counts a fetch that produced an HTTP response.
    pub(crate) fn record_status(&self, status: u16) {
        self.total_requests.fetch_add(1, Ordering::SeqCst);
        match status {
            300..=399 => {
                self.redirects.fetch_add(1, Ordering::SeqCst);
            }
            400..=499 => {
                self.client_errors.fetch_add(1, Ordering::SeqCst);
            }
            500.. => {
                self.server_errors.fetch_add(1, Ordering::SeqCst);
            }
            _ => {}
        }
        if status < 400 {
            self.successful_requests.fetch_add(1, Ordering::SeqCst);
        } else {
            self.failed_requests.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// Counts a fetch that errored before any response.
    pub(crate) fn record_failure(&self) {
        self.total_requests.fetch_add(1, Ordering::SeqCst);
        self.failed_requests.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn record_link(&self) {
        self.total_links.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn record_crawled(&self) {
        self.crawled_links.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn record_skipped(&self) {
        self.skipped_links.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn record_duplicate(&self) {
        self.duplicated_links.fetch_add(1, Ordering::SeqCst);
    }

    /// Point-in-time copy of the counters.
    #[must_use]
    pub fn snapshot(&self, elapsed: Duration, cancelled: bool) -> CrawlReport {
        CrawlReport {
            total_requests: self.total_requests.load(Ordering::SeqCst),
            successful_requests: self.successful_requests.load(Ordering::SeqCst),
            failed_requests: self.failed_requests.load(Ordering::SeqCst),
            redirects: self.redirects.load(Ordering::SeqCst),
            client_errors: self.client_errors.load(Ordering::SeqCst),
            server_errors: self.server_errors.load(Ordering::SeqCst),
            total_links: self.total_links.load(Ordering::SeqCst),
            crawled_links: self.crawled_links.load(Ordering::SeqCst),
            skipped_links: self.skipped_links.load(Ordering::SeqCst),
            duplicated_links: self.duplicated_links.load(Ordering::SeqCst),
            elapsed_ms: u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
            cancelled,
        }
    }
}

/// Summary of a crawl.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CrawlReport {
    /// Requests handed to the fetcher.
    pub total_requests: usize,
    /// Fetches that returned a status below 400.
    pub successful_requests: usize,
    /// Fetches that errored or returned 4xx/5xx.
    pub failed_requests: usize,
    /// Responses with a 3xx status the client did not follow.
    pub redirects: usize,
    /// Responses with a 4xx status.
    pub client_errors: usize,
    /// Responses with a 5xx status.
    pub server_errors: usize,
    /// Child link candidates seen on fetched pages.
    pub total_links: usize,
    /// Links (and seeds) admitted to the frontier.
    pub crawled_links: usize,
    /// Links rejected as cross-site, filtered, over depth, or blocked by
    /// robots.txt.
    pub skipped_links: usize,
    /// Links already claimed by an earlier admission.
    pub duplicated_links: usize,
    pub elapsed_ms: u64,
    /// Whether the crawl was stopped before the frontier was exhausted.
    pub cancelled: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_accumulate() {
        let stats = CrawlStats::new();
        stats.record_status(200);
        stats.record_failure();
        stats.record_link();
        stats.record_link();
        stats.record_crawled();
        stats.record_skipped();
        stats.record_duplicate();

        let report = stats.snapshot(Duration::from_millis(1500), false);
        assert_eq!(report.total_requests, 2);
        assert_eq!(report.successful_requests, 1);
        assert_eq!(report.failed_requests, 1);
        assert_eq!(report.total_links, 2);
        assert_eq!(report.crawled_links, 1);
        assert_eq!(report.skipped_links, 1);
        assert_eq!(report.duplicated_links, 1);
        assert_eq!(report.elapsed_ms, 1500);
        assert!(!report.cancelled);
    }

    #[test]
    fn test_statuses_split_by_class() {
        let stats = CrawlStats::new();
        for status in [200, 204, 301, 304, 404, 410, 429, 500, 503] {
            stats.record_status(status);
        }
        stats.record_failure();

        let report = stats.snapshot(Duration::ZERO, false);
        assert_eq!(report.total_requests, 10);
        assert_eq!(report.successful_requests, 4);
        assert_eq!(report.failed_requests, 6);
        assert_eq!(report.redirects, 2);
        assert_eq!(report.client_errors, 3);
        assert_eq!(report.server_errors, 2);
    }

    #[test]
    fn test_report_serializes() {
        let report = CrawlStats::new().snapshot(Duration::ZERO, true);
        let json = serde_json::to_value(report).unwrap_or_default();
        assert_eq!(json["cancelled"], true);
        assert_eq!(json["total_requests"], 0);
    }
}
