//! Per-root rate limiting for fetches.
//!
//! This module provides the [`RateLimiter`] struct, a token bucket per root
//! (registrable domain). Each bucket holds up to `rate` tokens and earns them
//! back at `rate` per `interval`. A worker calls [`RateLimiter::wait`] before
//! every fetch and is suspended until its root has a token.
//!
//! Roots without an explicit [`RateSpec`] all draw from the single wildcard
//! bucket.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use sitecrawler_core::limiter::{RateLimiter, RateSpec};
//!
//! # async fn example() {
//! let limiter = RateLimiter::new([RateSpec::new("example.com", 2, Duration::from_secs(1)).unwrap()]);
//!
//! // Two tokens are available immediately, the third waits ~500ms
//! limiter.wait("example.com").await;
//! limiter.wait("example.com").await;
//! limiter.wait("example.com").await;
//! # }
//! ```

mod rate_spec;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, instrument, trace};

pub use rate_spec::{DEFAULT_RATE, RateSpec, RateSpecError};

use crate::filter::WILDCARD;

/// Per-root token bucket rate limiter.
///
/// Designed to be wrapped in `Arc` and shared across worker tasks. Bucket
/// creation goes through `DashMap::entry`, so two workers seeing a new root at
/// the same time end up sharing one bucket.
#[derive(Debug)]
pub struct RateLimiter {
    specs: HashMap<String, RateSpec>,
    wildcard: RateSpec,
    buckets: DashMap<String, Arc<Bucket>>,
}

#[derive(Debug)]
struct Bucket {
    spec: RateSpec,
    /// Held across the sleep so waiters are served in arrival order.
    state: Mutex<BucketState>,
}

#[derive(Debug)]
struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

impl Bucket {
    fn new(spec: RateSpec) -> Self {
        Self {
            state: Mutex::new(BucketState {
                tokens: f64::from(spec.rate()),
                last_refill: Instant::now(),
            }),
            spec,
        }
    }

    async fn take(&self) {
        let mut state = self.state.lock().await;
        self.refill(&mut state);

        if state.tokens < 1.0 {
            let missing = 1.0 - state.tokens;
            let delay = self.spec.token_period().mul_f64(missing);
            trace!(delay_ms = delay.as_millis(), "waiting for token");
            tokio::time::sleep(delay).await;
            self.refill(&mut state);
        }

        // Float rounding may leave the bucket a hair short after the sleep.
        state.tokens = (state.tokens - 1.0).max(0.0);
    }

    fn refill(&self, state: &mut BucketState) {
        let now = Instant::now();
        let elapsed = now.duration_since(state.last_refill);
        let earned = elapsed.as_secs_f64() / self.spec.token_period().as_secs_f64();
        state.tokens = (state.tokens + earned).min(f64::from(self.spec.rate()));
        state.last_refill = now;
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new([])
    }
}

impl RateLimiter {
    /// Creates a limiter from per-root specs.
    ///
    /// A spec with root `*` overrides the default wildcard ([`DEFAULT_RATE`]).
    #[must_use]
    #[instrument(skip_all)]
    pub fn new(specs: impl IntoIterator<Item = RateSpec>) -> Self {
        let mut specs: HashMap<String, RateSpec> = specs
            .into_iter()
            .map(|spec| (spec.root().to_string(), spec))
            .collect();
        let wildcard = specs
            .remove(WILDCARD)
            .unwrap_or_else(RateSpec::default_wildcard);

        debug!(
            roots = specs.len(),
            wildcard = %wildcard,
            "creating rate limiter"
        );

        Self {
            specs,
            wildcard,
            buckets: DashMap::new(),
        }
    }

    /// Returns the spec that governs `root`.
    #[must_use]
    pub fn spec_for(&self, root: &str) -> &RateSpec {
        self.specs.get(root).unwrap_or(&self.wildcard)
    }

    /// Suspends until a token for `root` is available, then consumes it.
    ///
    /// Never fails and never times out; callers that need to abandon the wait
    /// race it against their own shutdown signal.
    #[instrument(level = "debug", skip(self))]
    pub async fn wait(&self, root: &str) {
        let (key, spec) = match self.specs.get_key_value(root) {
            Some((key, spec)) => (key.as_str(), spec),
            None => (WILDCARD, &self.wildcard),
        };

        // Clone the Arc so the DashMap shard lock is released before awaiting
        let bucket = self
            .buckets
            .entry(key.to_string())
            .or_insert_with(|| {
                debug!(bucket = key, "creating rate limit bucket");
                Arc::new(Bucket::new(spec.clone()))
            })
            .clone();

        bucket.take().await;
    }

    /// Number of buckets created so far. Unconfigured roots share one.
    #[must_use]
    pub fn tracked_roots(&self) -> usize {
        self.buckets.len()
    }

    /// Drops all buckets.
    pub fn close(&self) {
        self.buckets.clear();
    }
}

/// Lower bound on the time `n` back-to-back waits take under `spec`.
#[must_use]
pub fn minimum_elapsed(spec: &RateSpec, n: u32) -> Duration {
    spec.token_period() * n.saturating_sub(spec.rate())
}
