//! Request, page and result types exchanged between the crawler and a fetcher.

use std::time::Duration;

use serde::Serialize;

use super::FetchError;
use crate::link::NormalizedUrl;

/// Default cap on response bodies (5 MiB).
pub const DEFAULT_MAX_BODY_SIZE: usize = 5 * 1024 * 1024;

/// Default per-fetch timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Per-request transport parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchParams {
    /// `User-Agent` header value.
    pub user_agent: String,
    /// Proxy URL, if any.
    pub proxy: Option<String>,
    /// `Referer` header value, if any.
    pub referer: Option<String>,
    /// Bodies are truncated to this many bytes.
    pub max_body_size: usize,
    /// Upper bound on a single fetch.
    pub timeout: Duration,
}

impl Default for FetchParams {
    fn default() -> Self {
        Self {
            user_agent: crate::fetch::default_user_agent(),
            proxy: None,
            referer: None,
            max_body_size: DEFAULT_MAX_BODY_SIZE,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

/// A page waiting in the frontier.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    /// Page to fetch.
    pub target: NormalizedUrl,
    /// Transport parameters.
    pub params: FetchParams,
    /// Hops from the originating seed (seed = 0).
    pub depth: u32,
}

impl FetchRequest {
    /// Creates a seed request at depth 0.
    #[must_use]
    pub fn seed(target: NormalizedUrl, params: FetchParams) -> Self {
        Self {
            target,
            params,
            depth: 0,
        }
    }

    /// Creates the request for a link discovered on this page.
    ///
    /// The child inherits all params except the referer, which becomes this
    /// page's URL.
    #[must_use]
    pub fn child(&self, target: NormalizedUrl) -> Self {
        let mut params = self.params.clone();
        params.referer = Some(self.target.as_str().to_string());
        Self {
            target,
            params,
            depth: self.depth + 1,
        }
    }
}

/// What a [`Fetcher`](super::Fetcher) returns for one request.
#[derive(Debug, Clone, Default)]
pub struct FetchedPage {
    /// HTTP status code.
    pub status: u16,
    /// Body, already capped at `max_body_size`.
    pub body: Vec<u8>,
    /// Outbound link candidates as absolute URL strings.
    pub links: Vec<String>,
}

/// Outcome of processing one request, streamed to the consumer.
#[derive(Debug)]
pub struct FetchResult {
    /// The page that was requested.
    pub url: NormalizedUrl,
    /// HTTP status, or 0 when the fetch failed.
    pub status: u16,
    /// Response body (size-bounded).
    pub body: Vec<u8>,
    /// Outbound links that normalized successfully, before admission.
    pub child_links: Vec<NormalizedUrl>,
    /// Depth of the request.
    pub depth: u32,
    /// Time spent in the fetcher.
    pub elapsed: Duration,
    /// Fetch failure, if any.
    pub err: Option<FetchError>,
}

impl FetchResult {
    /// Whether the fetch succeeded at the transport level.
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.err.is_none()
    }

    /// Serializable summary without the body.
    #[must_use]
    pub fn summary(&self) -> ResultSummary {
        ResultSummary {
            url: self.url.as_str().to_string(),
            root: self.url.root().to_string(),
            status: self.status,
            depth: self.depth,
            body_bytes: self.body.len(),
            links: self.child_links.len(),
            elapsed_ms: u64::try_from(self.elapsed.as_millis()).unwrap_or(u64::MAX),
            error: self.err.as_ref().map(ToString::to_string),
        }
    }
}

/// One JSON line of crawler output.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ResultSummary {
    pub url: String,
    pub root: String,
    pub status: u16,
    pub depth: u32,
    pub body_bytes: usize,
    pub links: usize,
    pub elapsed_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::link::normalize;

    #[test]
    fn test_child_inherits_params_and_sets_referer() {
        let params = FetchParams {
            user_agent: "ua/1".to_string(),
            proxy: Some("http://proxy.example.com:8080".to_string()),
            referer: Some("https://www.google.com/search".to_string()),
            ..FetchParams::default()
        };
        let parent = FetchRequest::seed(normalize("https://example.com/").unwrap(), params);
        let child = parent.child(normalize("https://example.com/a").unwrap());

        assert_eq!(child.depth, 1);
        assert_eq!(child.params.user_agent, "ua/1");
        assert_eq!(child.params.proxy, parent.params.proxy);
        assert_eq!(child.params.referer.as_deref(), Some("https://example.com/"));
        assert_eq!(child.child(normalize("https://example.com/b").unwrap()).depth, 2);
    }

    #[test]
    fn test_summary_serializes_without_empty_error() {
        let result = FetchResult {
            url: normalize("https://example.com/").unwrap(),
            status: 200,
            body: b"<html></html>".to_vec(),
            child_links: vec![normalize("https://example.com/a").unwrap()],
            depth: 0,
            elapsed: Duration::from_millis(12),
            err: None,
        };
        let json = serde_json::to_value(result.summary()).unwrap();
        assert_eq!(json["status"], 200);
        assert_eq!(json["links"], 1);
        assert_eq!(json["body_bytes"], 13);
        assert!(json.get("error").is_none());
    }

    #[test]
    fn test_summary_includes_error_text() {
        let result = FetchResult {
            url: normalize("https://example.com/").unwrap(),
            status: 0,
            body: Vec::new(),
            child_links: Vec::new(),
            depth: 2,
            elapsed: Duration::ZERO,
            err: Some(FetchError::timeout("https://example.com/")),
        };
        assert!(!result.is_ok());
        let summary = result.summary();
        assert!(summary.error.unwrap().contains("timeout"));
    }
}
