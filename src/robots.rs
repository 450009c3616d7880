//! Optional robots.txt exclusion.
//!
//! Only `User-agent: *` groups and their `Disallow:` prefixes are honoured.
//! Rules are cached per origin for 24 hours. A robots.txt that cannot be
//! fetched, or returns a non-success status, allows everything.
//!
//! Retrieval goes through the same proxy as the page it guards, with one
//! pooled client per proxy. Callers that rate limit fetches should check
//! [`RobotsCache::needs_fetch`] and wait on the limiter before the check.

use std::time::{Duration, Instant};

use dashmap::DashMap;
use reqwest::{Client, Proxy, StatusCode};
use thiserror::Error;
use tracing::{debug, instrument, warn};
use url::Url;

const ROBOTS_TTL: Duration = Duration::from_secs(24 * 3600);
const ROBOTS_TIMEOUT: Duration = Duration::from_secs(10);

/// Result of checking a URL against robots.txt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RobotsDecision {
    Allowed,
    Disallowed,
}

/// Errors from robots.txt retrieval.
#[derive(Debug, Error)]
pub enum RobotsError {
    #[error("failed to build robots.txt client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("invalid proxy {proxy} for robots.txt: {source}")]
    Proxy {
        proxy: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("failed to fetch {url}: {source}")]
    Fetch {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("robots.txt returned status {status} for {url}")]
    Status { url: String, status: u16 },
}

/// Per-origin robots.txt cache.
#[derive(Debug)]
pub struct RobotsCache {
    client: Client,
    user_agent: Option<String>,
    proxied: DashMap<String, Client>,
    cache: DashMap<String, CachedRules>,
}

#[derive(Debug)]
struct CachedRules {
    disallowed_prefixes: Vec<String>,
    fetched_at: Instant,
}

impl CachedRules {
    fn new(disallowed_prefixes: Vec<String>) -> Self {
        Self {
            disallowed_prefixes,
            fetched_at: Instant::now(),
        }
    }

    fn is_fresh(&self) -> bool {
        self.fetched_at.elapsed() <= ROBOTS_TTL
    }

    fn allows(&self, path: &str) -> bool {
        !self
            .disallowed_prefixes
            .iter()
            .any(|prefix| path.starts_with(prefix.as_str()))
    }
}

impl RobotsCache {
    /// Creates a cache that fetches robots.txt as `user_agent`.
    ///
    /// # Errors
    ///
    /// Returns [`RobotsError::Client`] if the HTTP client cannot be built.
    pub fn new(user_agent: &str) -> Result<Self, RobotsError> {
        let client = client_builder(Some(user_agent))
            .build()
            .map_err(RobotsError::Client)?;
        Ok(Self {
            user_agent: Some(user_agent.to_string()),
            ..Self::with_client(client)
        })
    }

    /// Uses `client` for direct retrieval. Proxied clients are built with
    /// reqwest's default user agent.
    #[must_use]
    pub fn with_client(client: Client) -> Self {
        Self {
            client,
            user_agent: None,
            proxied: DashMap::new(),
            cache: DashMap::new(),
        }
    }

    /// Installs rules for `origin` (e.g. `https://example.com`) from a
    /// robots.txt body without fetching it.
    pub fn preload(&self, origin: &str, body: &str) {
        self.cache.insert(
            origin.trim_end_matches('/').to_string(),
            CachedRules::new(parse_disallow_rules(body)),
        );
    }

    /// Number of origins with cached rules.
    #[must_use]
    pub fn cached_origins(&self) -> usize {
        self.cache.len()
    }

    /// Whether checking `url` would retrieve robots.txt, because its origin
    /// has no fresh rules cached.
    #[must_use]
    pub fn needs_fetch(&self, url: &Url) -> bool {
        self.cache
            .get(&origin_of(url))
            .is_none_or(|rules| !rules.is_fresh())
    }

    /// Whether `url` may be fetched directly. See
    /// [`is_allowed_via`](Self::is_allowed_via).
    pub async fn is_allowed(&self, url: &Url) -> bool {
        self.is_allowed_via(url, None).await
    }

    /// Whether `url` may be fetched, retrieving robots.txt through `proxy`.
    /// Retrieval failures allow the URL and are cached like an empty
    /// robots.txt.
    pub async fn is_allowed_via(&self, url: &Url, proxy: Option<&str>) -> bool {
        match self.check_via(url, proxy).await {
            Ok(decision) => decision == RobotsDecision::Allowed,
            Err(e) => {
                warn!(error = %e, "robots.txt unavailable, allowing");
                self.cache
                    .insert(origin_of(url), CachedRules::new(Vec::new()));
                true
            }
        }
    }

    /// Checks `url` against its origin's rules, fetching them directly when
    /// absent or stale.
    ///
    /// # Errors
    ///
    /// Returns [`RobotsError`] if robots.txt cannot be retrieved.
    pub async fn check(&self, url: &Url) -> Result<RobotsDecision, RobotsError> {
        self.check_via(url, None).await
    }

    /// Like [`check`](Self::check), retrieving through `proxy` when set.
    ///
    /// # Errors
    ///
    /// Returns [`RobotsError`] if robots.txt cannot be retrieved or the proxy
    /// is invalid.
    #[instrument(skip(self, url), fields(url = %url))]
    pub async fn check_via(
        &self,
        url: &Url,
        proxy: Option<&str>,
    ) -> Result<RobotsDecision, RobotsError> {
        let origin = origin_of(url);
        let path = url.path();

        if let Some(rules) = self.cache.get(&origin)
            && rules.is_fresh()
        {
            return Ok(decide(&rules, path));
        }

        let body = self.fetch_robots_txt(&origin, proxy).await?;
        let rules = CachedRules::new(parse_disallow_rules(&body));
        let decision = decide(&rules, path);
        self.cache.insert(origin, rules);
        Ok(decision)
    }

    fn client_for(&self, proxy: Option<&str>) -> Result<Client, RobotsError> {
        let Some(proxy) = proxy else {
            return Ok(self.client.clone());
        };
        if let Some(client) = self.proxied.get(proxy) {
            return Ok(client.clone());
        }

        let invalid = |source| RobotsError::Proxy {
            proxy: proxy.to_string(),
            source,
        };
        let client = client_builder(self.user_agent.as_deref())
            .proxy(Proxy::all(proxy).map_err(invalid)?)
            .build()
            .map_err(invalid)?;
        Ok(self
            .proxied
            .entry(proxy.to_string())
            .or_insert(client)
            .clone())
    }

    async fn fetch_robots_txt(
        &self,
        origin: &str,
        proxy: Option<&str>,
    ) -> Result<String, RobotsError> {
        let robots_url = format!("{origin}/robots.txt");
        let response = self
            .client_for(proxy)?
            .get(&robots_url)
            .send()
            .await
            .map_err(|source| RobotsError::Fetch {
                url: robots_url.clone(),
                source,
            })?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND || status == StatusCode::GONE {
            debug!(url = %robots_url, "no robots.txt");
            return Ok(String::new());
        }
        if !status.is_success() {
            return Err(RobotsError::Status {
                url: robots_url,
                status: status.as_u16(),
            });
        }

        response.text().await.map_err(|source| RobotsError::Fetch {
            url: robots_url,
            source,
        })
    }
}

fn client_builder(user_agent: Option<&str>) -> reqwest::ClientBuilder {
    let builder = Client::builder().timeout(ROBOTS_TIMEOUT);
    match user_agent {
        Some(user_agent) => builder.user_agent(user_agent),
        None => builder,
    }
}

fn decide(rules: &CachedRules, path: &str) -> RobotsDecision {
    if rules.allows(path) {
        RobotsDecision::Allowed
    } else {
        debug!(path, "robots.txt disallows path");
        RobotsDecision::Disallowed
    }
}

/// Scheme, host and non-default port of `url`, without a trailing slash.
#[must_use]
pub fn origin_of(url: &Url) -> String {
    url.origin().ascii_serialization()
}

/// Collects `Disallow:` prefixes from `User-agent: *` groups, longest first.
fn parse_disallow_rules(body: &str) -> Vec<String> {
    let mut in_wildcard_group = false;
    let mut last_was_agent = false;
    let mut disallowed: Vec<String> = Vec::new();

    for line in body.lines() {
        let line = line.split('#').next().unwrap_or_default().trim();
        let Some((field, value)) = line.split_once(':') else {
            continue;
        };
        let value = value.trim();

        match field.trim().to_ascii_lowercase().as_str() {
            "user-agent" => {
                // Consecutive agent lines share one group.
                let is_wildcard = value == "*";
                in_wildcard_group = if last_was_agent {
                    in_wildcard_group || is_wildcard
                } else {
                    is_wildcard
                };
                last_was_agent = true;
            }
            "disallow" => {
                last_was_agent = false;
                if !in_wildcard_group || value.is_empty() {
                    continue;
                }
                let prefix = if value.starts_with('/') {
                    value.to_string()
                } else {
                    format!("/{value}")
                };
                if !disallowed.contains(&prefix) {
                    disallowed.push(prefix);
                }
            }
            _ => last_was_agent = false,
        }
    }

    disallowed.sort_by_key(|p| std::cmp::Reverse(p.len()));
    disallowed
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn cache() -> RobotsCache {
        RobotsCache::with_client(Client::new())
    }

    // ==================== Parsing Tests ====================

    #[test]
    fn test_parse_empty_body() {
        assert!(parse_disallow_rules("").is_empty());
    }

    #[test]
    fn test_parse_wildcard_group() {
        let rules = parse_disallow_rules("User-agent: *\nDisallow: /api/\nDisallow: /private/\n");
        assert!(rules.contains(&"/api/".to_string()));
        assert!(rules.contains(&"/private/".to_string()));
    }

    #[test]
    fn test_parse_named_agent_ignored() {
        let body = "User-agent: Googlebot\nDisallow: /nobot/\nUser-agent: *\nDisallow: /all/\n";
        let rules = parse_disallow_rules(body);
        assert_eq!(rules, vec!["/all/".to_string()]);
    }

    #[test]
    fn test_parse_shared_group_with_wildcard() {
        let body = "User-agent: Googlebot\nUser-agent: *\nDisallow: /shared/\n";
        assert_eq!(parse_disallow_rules(body), vec!["/shared/".to_string()]);
    }

    #[test]
    fn test_parse_comments_and_case() {
        let body = "# comment\nuser-agent: * # everyone\nDISALLOW: /secret/ # hidden\n";
        assert_eq!(parse_disallow_rules(body), vec!["/secret/".to_string()]);
    }

    #[test]
    fn test_parse_empty_disallow_allows_all() {
        assert!(parse_disallow_rules("User-agent: *\nDisallow: \n").is_empty());
    }

    #[test]
    fn test_parse_adds_leading_slash_and_dedups() {
        let body = "User-agent: *\nDisallow: tmp\nDisallow: /tmp\n";
        assert_eq!(parse_disallow_rules(body), vec!["/tmp".to_string()]);
    }

    #[test]
    fn test_parse_sorted_longest_first() {
        let body = "User-agent: *\nDisallow: /a/\nDisallow: /longer/path/\nDisallow: /medium/\n";
        let rules = parse_disallow_rules(body);
        assert_eq!(rules[0], "/longer/path/");
        assert_eq!(rules[2], "/a/");
    }

    // ==================== Origin Tests ====================

    #[test]
    fn test_origin_of_strips_path_query_fragment() {
        let url = Url::parse("https://example.com/path?q=1#frag").unwrap();
        assert_eq!(origin_of(&url), "https://example.com");
    }

    #[test]
    fn test_origin_of_keeps_non_default_port() {
        let url = Url::parse("https://example.com:9443/path").unwrap();
        assert_eq!(origin_of(&url), "https://example.com:9443");
        let url = Url::parse("https://example.com:443/path").unwrap();
        assert_eq!(origin_of(&url), "https://example.com");
    }

    // ==================== Cache Tests ====================

    #[tokio::test]
    async fn test_preloaded_rules_decide_without_fetching() {
        let robots = cache();
        robots.preload("https://example.com/", "User-agent: *\nDisallow: /private\n");

        let blocked = Url::parse("https://example.com/private/page").unwrap();
        let open = Url::parse("https://example.com/public").unwrap();

        assert_eq!(
            robots.check(&blocked).await.unwrap(),
            RobotsDecision::Disallowed
        );
        assert!(robots.is_allowed(&open).await);
        assert_eq!(robots.cached_origins(), 1);
    }

    #[tokio::test]
    async fn test_rules_are_per_origin() {
        let robots = cache();
        robots.preload("https://example.com", "User-agent: *\nDisallow: /\n");
        robots.preload("https://blog.example.com", "");

        let root = Url::parse("https://example.com/a").unwrap();
        let blog = Url::parse("https://blog.example.com/a").unwrap();

        assert!(!robots.is_allowed(&root).await);
        assert!(robots.is_allowed(&blog).await);
    }

    #[test]
    fn test_needs_fetch_until_rules_cached() {
        let robots = cache();
        let url = Url::parse("https://example.com/page").unwrap();
        assert!(robots.needs_fetch(&url));

        robots.preload("https://example.com", "");
        assert!(!robots.needs_fetch(&url));
        assert!(robots.needs_fetch(&Url::parse("https://other.com/").unwrap()));
    }

    #[test]
    fn test_proxy_clients_are_cached() {
        let robots = RobotsCache::new("test-crawler/1.0").unwrap();
        robots.client_for(Some("http://proxy.example.com:3128")).unwrap();
        robots.client_for(Some("http://proxy.example.com:3128")).unwrap();
        assert_eq!(robots.proxied.len(), 1);
    }

    #[tokio::test]
    async fn test_invalid_proxy_allows_and_caches() {
        let robots = cache();
        let url = Url::parse("https://example.com/page").unwrap();

        assert!(matches!(
            robots.check_via(&url, Some("http://[invalid")).await,
            Err(RobotsError::Proxy { .. })
        ));
        assert!(robots.is_allowed_via(&url, Some("http://[invalid")).await);
        assert!(!robots.needs_fetch(&url));
    }
}
