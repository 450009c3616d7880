//! Page fetching.
//!
//! The crawler talks to the network only through the [`Fetcher`] trait. A
//! fetcher receives a [`FetchRequest`], must cap the body at
//! `params.max_body_size`, and returns the candidate outbound links of the
//! document as absolute URL strings.
//!
//! [`HttpFetcher`] is the default implementation, built on `reqwest` with link
//! extraction via `scraper`.
//!
//! # Example
//!
//! ```no_run
//! use sitecrawler_core::fetch::{FetchParams, FetchRequest, Fetcher, HttpFetcher};
//! use sitecrawler_core::link::normalize;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let fetcher = HttpFetcher::new()?;
//! let request = FetchRequest::seed(normalize("https://example.com/")?, FetchParams::default());
//! let page = fetcher.fetch(&request).await?;
//! println!("{} links", page.links.len());
//! # Ok(())
//! # }
//! ```

mod client;
mod error;
pub mod links;
mod types;

use async_trait::async_trait;

pub use client::HttpFetcher;
pub use error::FetchError;
pub use types::{
    DEFAULT_MAX_BODY_SIZE, DEFAULT_TIMEOUT, FetchParams, FetchRequest, FetchResult, FetchedPage,
    ResultSummary,
};

/// Project URL for User-Agent identification.
const PROJECT_UA_URL: &str = "https://github.com/fierce/sitecrawler";

/// Default User-Agent identifying the crawler.
#[must_use]
pub fn default_user_agent() -> String {
    let version = env!("CARGO_PKG_VERSION");
    format!("sitecrawler/{version} (+{PROJECT_UA_URL})")
}

/// Transport used by the crawler to retrieve pages.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Fetches one page.
    ///
    /// # Errors
    ///
    /// Any [`FetchError`]; the crawler reports it and drops the request.
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchedPage, FetchError>;

    /// Releases transport resources. Called once when the crawl stops.
    async fn close(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_user_agent_has_version_and_project_url() {
        let ua = default_user_agent();
        assert!(ua.starts_with(&format!("sitecrawler/{}", env!("CARGO_PKG_VERSION"))));
        assert!(ua.contains(PROJECT_UA_URL));
    }
}
