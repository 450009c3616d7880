//! URL normalization and dedup identity.
//!
//! A [`NormalizedUrl`] pairs a parsed URL with two values derived from it once,
//! at construction:
//!
//! - `hash`: a SHA-256 hex digest of the URL with the scheme dropped, a leading
//!   `www.` removed from the host, the path percent-decoded, and trailing
//!   slashes trimmed. Two spellings of the same page share a hash.
//! - `root`: the registrable domain (eTLD+1) of the host, used for same-site
//!   scoping, rate limiting and filter rule lookup.
//!
//! # Example
//!
//! ```
//! use sitecrawler_core::link::normalize;
//!
//! let a = normalize("http://www.example.com/docs/").unwrap();
//! let b = normalize("https://example.com/docs").unwrap();
//! assert_eq!(a.hash(), b.hash());
//! assert_eq!(a.root(), "example.com");
//! ```

mod error;

use std::fmt;

use sha2::{Digest, Sha256};
use url::Url;

pub use error::UrlError;

/// A crawlable URL with its precomputed dedup key and registrable domain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedUrl {
    hash: String,
    root: String,
    raw: Url,
}

impl NormalizedUrl {
    /// Parses and normalizes a URL string.
    ///
    /// # Errors
    ///
    /// Returns [`UrlError`] if the string does not parse, the scheme is not
    /// `http`/`https`, or the host has no recognized public suffix.
    pub fn parse(raw: &str) -> Result<Self, UrlError> {
        let url = Url::parse(raw.trim()).map_err(|source| UrlError::Parse {
            url: raw.to_string(),
            source,
        })?;
        Self::from_url(url)
    }

    /// Normalizes an already parsed URL.
    ///
    /// # Errors
    ///
    /// Same conditions as [`parse`](Self::parse), minus the parse failure.
    pub fn from_url(mut url: Url) -> Result<Self, UrlError> {
        match url.scheme() {
            "http" | "https" => {}
            other => {
                return Err(UrlError::UnsupportedScheme {
                    url: url.to_string(),
                    scheme: other.to_string(),
                });
            }
        }

        url.set_fragment(None);
        let root = registrable_domain(&url)?;
        let hash = content_hash(&identity_key(&url));

        Ok(Self {
            hash,
            root,
            raw: url,
        })
    }

    /// Dedup key shared by every spelling of the same logical page.
    #[must_use]
    pub fn hash(&self) -> &str {
        &self.hash
    }

    /// Registrable domain (eTLD+1) of the host.
    #[must_use]
    pub fn root(&self) -> &str {
        &self.root
    }

    /// The parsed URL as it will be requested.
    #[must_use]
    pub fn url(&self) -> &Url {
        &self.raw
    }

    /// The URL as a string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.raw.as_str()
    }

    /// Whether `other` belongs to the same registrable domain.
    ///
    /// Subdomains share a root, so `blog.example.com` is same-site with
    /// `example.com`.
    #[must_use]
    pub fn is_same_site(&self, other: &Self) -> bool {
        self.root == other.root
    }
}

impl fmt::Display for NormalizedUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.raw.as_str())
    }
}

/// Normalizes a raw URL string.
///
/// # Errors
///
/// See [`NormalizedUrl::parse`].
pub fn normalize(raw: &str) -> Result<NormalizedUrl, UrlError> {
    NormalizedUrl::parse(raw)
}

fn registrable_domain(url: &Url) -> Result<String, UrlError> {
    let Some(host) = url.domain() else {
        return Err(UrlError::MissingHost {
            url: url.to_string(),
        });
    };
    let host = host.trim_end_matches('.');

    let domain = psl::domain(host.as_bytes())
        .filter(|domain| domain.suffix().is_known())
        .ok_or_else(|| UrlError::UnknownSuffix {
            url: url.to_string(),
        })?;

    Ok(String::from_utf8_lossy(domain.as_bytes()).to_ascii_lowercase())
}

/// Scheme-less, `www.`-less, percent-decoded, slash-trimmed form of the URL.
fn identity_key(url: &Url) -> String {
    let host = url.host_str().unwrap_or_default();
    let host = host.strip_prefix("www.").unwrap_or(host);
    let decoded_path = urlencoding::decode_binary(url.path().as_bytes());

    let mut key = String::with_capacity(url.as_str().len());
    key.push_str(host);
    if let Some(port) = url.port() {
        key.push(':');
        key.push_str(&port.to_string());
    }
    key.push_str(String::from_utf8_lossy(&decoded_path).trim_end_matches('/'));
    if let Some(query) = url.query() {
        key.push('?');
        key.push_str(query);
    }

    key
}

fn content_hash(key: &str) -> String {
    format!("{:x}", Sha256::digest(key.as_bytes()))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_extracts_registrable_root() {
        assert_eq!(normalize("http://www.google.com").unwrap().root(), "google.com");
        assert_eq!(
            normalize("https://sub.domain.google.com").unwrap().root(),
            "google.com"
        );
        assert_eq!(
            normalize("http://beta.moon.facebook.com").unwrap().root(),
            "facebook.com"
        );
    }

    #[test]
    fn test_normalize_handles_multi_label_suffix() {
        assert_eq!(
            normalize("https://news.bbc.co.uk/world").unwrap().root(),
            "bbc.co.uk"
        );
    }

    #[test]
    fn test_normalize_rejects_unknown_suffix() {
        assert!(matches!(
            normalize("http://www.google.invalidtld"),
            Err(UrlError::UnknownSuffix { .. })
        ));
        assert!(matches!(
            normalize("https://example.com.xxy"),
            Err(UrlError::UnknownSuffix { .. })
        ));
    }

    #[test]
    fn test_normalize_rejects_non_http_scheme() {
        assert!(matches!(
            normalize("ftp://example.com/file"),
            Err(UrlError::UnsupportedScheme { .. })
        ));
        assert!(matches!(
            normalize("mailto:someone@example.com"),
            Err(UrlError::UnsupportedScheme { .. })
        ));
    }

    #[test]
    fn test_normalize_rejects_ip_and_localhost() {
        assert!(matches!(
            normalize("http://127.0.0.1:8080/"),
            Err(UrlError::MissingHost { .. })
        ));
        assert!(normalize("http://localhost/").is_err());
    }

    #[test]
    fn test_normalize_rejects_garbage() {
        let err = normalize("not a url").unwrap_err();
        assert!(matches!(err, UrlError::Parse { .. }));
        assert_eq!(err.url(), "not a url");
    }

    #[test]
    fn test_hash_ignores_scheme_www_encoding_and_trailing_slash() {
        let variants = [
            "http://example.com/a b/",
            "https://example.com/a%20b",
            "https://www.example.com/a%20b/",
            "http://www.example.com/a%20b",
        ];
        let first = normalize(variants[0]).unwrap();
        for variant in &variants[1..] {
            assert_eq!(
                normalize(variant).unwrap().hash(),
                first.hash(),
                "hash mismatch for {variant}"
            );
        }
    }

    #[test]
    fn test_hash_root_page_with_and_without_slash() {
        assert_eq!(
            normalize("http://example.com/").unwrap().hash(),
            normalize("https://www.example.com").unwrap().hash()
        );
    }

    #[test]
    fn test_hash_ignores_fragment() {
        assert_eq!(
            normalize("https://example.com/page#intro").unwrap().hash(),
            normalize("https://example.com/page").unwrap().hash()
        );
    }

    #[test]
    fn test_hash_distinguishes_paths_and_queries() {
        let a = normalize("https://example.com/a").unwrap();
        let b = normalize("https://example.com/b").unwrap();
        let q = normalize("https://example.com/a?page=2").unwrap();
        assert_ne!(a.hash(), b.hash());
        assert_ne!(a.hash(), q.hash());

        let slashed = normalize("https://example.com/a/?page=2").unwrap();
        assert_eq!(q.hash(), slashed.hash());
        let query_slash = normalize("https://example.com/a?next=/").unwrap();
        assert_ne!(a.hash(), query_slash.hash());
    }

    #[test]
    fn test_hash_is_sha256_hex() {
        let url = normalize("https://example.com/").unwrap();
        assert_eq!(url.hash().len(), 64);
        assert!(url.hash().chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_same_site_includes_subdomains() {
        let parent = normalize("https://example.com/").unwrap();
        let sub = normalize("https://blog.example.com/post").unwrap();
        let other = normalize("http://other.com/c").unwrap();
        assert!(parent.is_same_site(&sub));
        assert!(!parent.is_same_site(&other));
    }
}
