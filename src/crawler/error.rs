//! Error types for building and starting a crawl.

use thiserror::Error;

use super::config::{MAX_PARALLEL, MIN_PARALLEL};
use crate::fetch::FetchError;
use crate::filter::FilterError;
use crate::frontier::FrontierError;
use crate::limiter::RateSpecError;
use crate::robots::RobotsError;
use crate::store::StoreError;

/// Invalid crawler configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Worker count out of range.
    #[error("invalid parallelism {value}: must be between {MIN_PARALLEL} and {MAX_PARALLEL}")]
    InvalidParallel {
        /// The rejected value.
        value: usize,
    },

    /// Result channel capacity of zero.
    #[error("result buffer must be at least 1")]
    InvalidResultBuffer,

    #[error(transparent)]
    RateSpec(#[from] RateSpecError),

    #[error(transparent)]
    Filter(#[from] FilterError),

    /// The default HTTP fetcher could not be built.
    #[error("failed to build fetcher: {0}")]
    Fetcher(#[from] FetchError),

    /// The robots.txt client could not be built.
    #[error("failed to build robots cache: {0}")]
    Robots(#[from] RobotsError),
}

/// Errors that prevent a crawl from starting.
///
/// Once workers are running nothing is fatal: failed fetches, bad links and
/// store hiccups are logged and counted instead.
#[derive(Debug, Error)]
pub enum CrawlError {
    /// Every seed was malformed, unsupported or already visited.
    #[error("no seed could be admitted")]
    NoValidSeeds,

    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Seeding the frontier failed.
    #[error("failed to enqueue seed: {0}")]
    Frontier(#[from] FrontierError),

    /// Claiming a seed in the visited store failed.
    #[error("failed to record seed: {0}")]
    Store(#[from] StoreError),
}
