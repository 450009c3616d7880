//! Sitecrawler Core Library
//!
//! A same-site, breadth-first web crawler engine: from one or more seed links
//! it fetches reachable pages up to a hop ceiling, rate limits per site,
//! deduplicates visited pages, and filters undesired URLs, streaming results
//! as they are produced.
//!
//! # Architecture
//!
//! Leaf to root:
//! - [`link`] - URL normalization, dedup hashing and registrable-domain roots
//! - [`filter`] - per-root allow/disallow admission rules
//! - [`limiter`] - per-root token-bucket rate limiting
//! - [`store`] - visited-URL deduplication (in-memory and `SQLite`)
//! - [`db`] - `SQLite` pool and run bookkeeping shared by the durable backends
//! - [`frontier`] - FIFO of pending requests (in-memory and `SQLite`)
//! - [`fetch`] - fetcher interface, request/result types, HTTP fetcher
//! - [`robots`] - optional robots.txt exclusion
//! - [`crawler`] - worker pool, lifecycle state machine and completion

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod crawler;
pub mod db;
pub mod fetch;
pub mod filter;
pub mod frontier;
pub mod limiter;
pub mod link;
pub mod robots;
pub mod store;

// Re-export commonly used types
pub use crawler::{
    ConfigError, CrawlError, CrawlHandle, CrawlReport, CrawlState, Crawler, CrawlerBuilder,
    CrawlerConfig,
};
pub use db::{Database, DbError, RunId};
pub use fetch::{
    FetchError, FetchParams, FetchRequest, FetchResult, FetchedPage, Fetcher, HttpFetcher,
    ResultSummary,
};
pub use filter::{AdmissionFilter, FilterError, FilterRule};
pub use frontier::{Frontier, FrontierError, InMemoryFrontier, SqliteFrontier};
pub use limiter::{RateLimiter, RateSpec, RateSpecError};
pub use link::{NormalizedUrl, UrlError, normalize};
pub use robots::{RobotsCache, RobotsDecision, RobotsError};
pub use store::{InMemoryVisitedStore, SqliteVisitedStore, StoreError, VisitedStore};
