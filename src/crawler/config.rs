//! Crawler tuning knobs.

use std::thread;
use std::time::Duration;

use super::ConfigError;
use crate::fetch::{DEFAULT_MAX_BODY_SIZE, DEFAULT_TIMEOUT, default_user_agent};

/// Minimum allowed worker count.
pub const MIN_PARALLEL: usize = 1;

/// Maximum allowed worker count.
pub const MAX_PARALLEL: usize = 256;

/// Default hop ceiling.
pub const DEFAULT_MAX_DEPTH: u32 = 10;

/// Referer sent with seed requests unless configured otherwise.
pub const DEFAULT_REFERRER: &str = "https://www.google.com/search";

/// Default capacity of the result channel.
pub const DEFAULT_RESULT_BUFFER: usize = 1024;

/// One less than the available cores, never below one.
#[must_use]
pub fn default_parallelism() -> usize {
    thread::available_parallelism()
        .map_or(MIN_PARALLEL, |n| n.get().saturating_sub(1))
        .max(MIN_PARALLEL)
}

/// Settings shared by every worker of a crawl.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawlerConfig {
    /// Number of workers.
    pub parallel: usize,
    /// Requests deeper than this are never fetched. `0` fetches seeds only.
    pub max_depth: u32,
    /// Response bodies are truncated to this many bytes.
    pub max_body_size: usize,
    /// Upper bound on a single fetch.
    pub timeout: Duration,
    /// Rotated across seed requests. Empty means the built-in agent.
    pub user_agents: Vec<String>,
    /// Rotated across seed requests. Empty sends no referer on seeds.
    pub referrers: Vec<String>,
    /// Rotated across seed requests. Empty connects directly.
    pub proxies: Vec<String>,
    /// Consult robots.txt before fetching.
    pub respect_robots: bool,
    /// Capacity of the result channel returned by `Crawler::start`.
    pub result_buffer: usize,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            parallel: default_parallelism(),
            max_depth: DEFAULT_MAX_DEPTH,
            max_body_size: DEFAULT_MAX_BODY_SIZE,
            timeout: DEFAULT_TIMEOUT,
            user_agents: vec![default_user_agent()],
            referrers: vec![DEFAULT_REFERRER.to_string()],
            proxies: Vec::new(),
            respect_robots: false,
            result_buffer: DEFAULT_RESULT_BUFFER,
        }
    }
}

impl CrawlerConfig {
    /// Checks ranges.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] describing the first invalid field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(MIN_PARALLEL..=MAX_PARALLEL).contains(&self.parallel) {
            return Err(ConfigError::InvalidParallel {
                value: self.parallel,
            });
        }
        if self.result_buffer == 0 {
            return Err(ConfigError::InvalidResultBuffer);
        }
        Ok(())
    }

    /// User agent used for robots.txt retrieval.
    #[must_use]
    pub fn primary_user_agent(&self) -> String {
        self.user_agents
            .first()
            .cloned()
            .unwrap_or_else(default_user_agent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = CrawlerConfig::default();
        assert!(config.validate().is_ok());
        assert!(config.parallel >= 1);
        assert_eq!(config.max_depth, 10);
        assert_eq!(config.referrers, vec![DEFAULT_REFERRER.to_string()]);
        assert!(!config.respect_robots);
    }

    #[test]
    fn test_parallel_bounds() {
        let mut config = CrawlerConfig {
            parallel: 0,
            ..CrawlerConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidParallel { value: 0 })
        ));

        config.parallel = MAX_PARALLEL + 1;
        assert!(config.validate().is_err());

        config.parallel = MAX_PARALLEL;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_result_buffer_rejected() {
        let config = CrawlerConfig {
            result_buffer: 0,
            ..CrawlerConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidResultBuffer)
        ));
    }

    #[test]
    fn test_primary_user_agent_falls_back() {
        let config = CrawlerConfig {
            user_agents: Vec::new(),
            ..CrawlerConfig::default()
        };
        assert_eq!(config.primary_user_agent(), default_user_agent());
    }
}
