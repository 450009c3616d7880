//! Error types for the fetch module.

use thiserror::Error;

/// Errors a [`Fetcher`](super::Fetcher) can report. The crawler drops the
/// request on any of them; there is no retry.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Network-level error (DNS resolution, connection refused, TLS errors, etc.)
    #[error("network error fetching {url}: {source}")]
    Network {
        /// The URL that failed.
        url: String,
        /// The underlying network error.
        #[source]
        source: reqwest::Error,
    },

    /// The fetch did not finish within `FetchParams::timeout`.
    #[error("timeout fetching {url}")]
    Timeout {
        /// The URL that timed out.
        url: String,
    },

    /// Reading the response body failed.
    #[error("error reading body of {url}: {source}")]
    Body {
        /// The URL whose body failed.
        url: String,
        /// The underlying error.
        #[source]
        source: reqwest::Error,
    },

    /// Building an HTTP client (e.g. for a proxy) failed.
    #[error("cannot build HTTP client for proxy {proxy:?}: {source}")]
    Client {
        /// Proxy that was being configured, if any.
        proxy: Option<String>,
        /// The underlying error.
        #[source]
        source: reqwest::Error,
    },

    /// Any other fetcher-specific failure.
    #[error("fetch failed for {url}: {message}")]
    Other {
        /// The URL that failed.
        url: String,
        /// Human-readable reason.
        message: String,
    },
}

impl FetchError {
    /// Creates a network error from a reqwest error, mapping reqwest timeouts
    /// to [`FetchError::Timeout`].
    pub fn network(url: impl Into<String>, source: reqwest::Error) -> Self {
        if source.is_timeout() {
            return Self::timeout(url);
        }
        Self::Network {
            url: url.into(),
            source,
        }
    }

    /// Creates a timeout error.
    pub fn timeout(url: impl Into<String>) -> Self {
        Self::Timeout { url: url.into() }
    }

    /// Creates a body read error.
    pub fn body(url: impl Into<String>, source: reqwest::Error) -> Self {
        if source.is_timeout() {
            return Self::timeout(url);
        }
        Self::Body {
            url: url.into(),
            source,
        }
    }

    /// Creates a client build error.
    pub fn client(proxy: Option<&str>, source: reqwest::Error) -> Self {
        Self::Client {
            proxy: proxy.map(str::to_string),
            source,
        }
    }

    /// Creates a free-form error, for custom fetchers.
    pub fn other(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Other {
            url: url.into(),
            message: message.into(),
        }
    }

    /// Whether this error is a timeout.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}
