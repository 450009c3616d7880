//! Error types for URL normalization.

use thiserror::Error;

/// Reasons a string cannot become a [`NormalizedUrl`](super::NormalizedUrl).
#[derive(Debug, Error)]
pub enum UrlError {
    /// The string is not a parseable absolute URL.
    #[error("invalid URL {url}: {source}")]
    Parse {
        /// The rejected input.
        url: String,
        /// The underlying parse error.
        #[source]
        source: url::ParseError,
    },

    /// Only `http` and `https` are crawlable.
    #[error("invalid URL {url}: unsupported scheme {scheme:?}")]
    UnsupportedScheme {
        /// The rejected input.
        url: String,
        /// The scheme that was found.
        scheme: String,
    },

    /// IP literals and host-less URLs have no registrable domain.
    #[error("invalid URL {url}: host is not a domain name")]
    MissingHost {
        /// The rejected input.
        url: String,
    },

    /// The host's suffix is not in the public suffix list.
    #[error("invalid URL {url}: unrecognized public suffix")]
    UnknownSuffix {
        /// The rejected input.
        url: String,
    },
}

impl UrlError {
    /// Returns the URL string that was rejected.
    #[must_use]
    pub fn url(&self) -> &str {
        match self {
            Self::Parse { url, .. }
            | Self::UnsupportedScheme { url, .. }
            | Self::MissingHost { url }
            | Self::UnknownSuffix { url } => url,
        }
    }
}
