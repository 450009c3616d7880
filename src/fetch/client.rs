//! Default HTTP fetcher.
//!
//! This module provides the [`HttpFetcher`] struct which issues GET requests
//! with the request's User-Agent and Referer, streams the body up to the size
//! cap, and extracts outbound links from HTML responses.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use futures_util::StreamExt;
use reqwest::header::{CONTENT_TYPE, REFERER, USER_AGENT};
use reqwest::{Client, ClientBuilder, Proxy, Response};
use tracing::{debug, instrument};
use url::Url;

use super::links::extract_links;
use super::{FetchError, FetchParams, FetchRequest, FetchedPage, Fetcher};

/// Connect timeout applied to every client.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Redirect hops followed before giving up.
const MAX_REDIRECTS: usize = 10;

/// HTTP fetcher with one pooled client per proxy.
///
/// Cloning is cheap; clones share connection pools.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    direct: Client,
    proxied: Arc<DashMap<String, Client>>,
}

impl HttpFetcher {
    /// Creates a fetcher with a direct (non-proxied) client.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::Client`] if the HTTP client cannot be built.
    pub fn new() -> Result<Self, FetchError> {
        Ok(Self {
            direct: build_client(None)?,
            proxied: Arc::new(DashMap::new()),
        })
    }

    fn client_for(&self, proxy: Option<&str>) -> Result<Client, FetchError> {
        let Some(proxy) = proxy else {
            return Ok(self.direct.clone());
        };
        if let Some(client) = self.proxied.get(proxy) {
            return Ok(client.clone());
        }

        let client = build_client(Some(proxy))?;
        Ok(self
            .proxied
            .entry(proxy.to_string())
            .or_insert(client)
            .clone())
    }

    /// Fetches `url` with the given params.
    ///
    /// Non-2xx responses are returned as pages with their status and no links.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError`] on network failure, timeout, or body read failure.
    #[instrument(skip(self, params), fields(url = %url))]
    pub async fn fetch_url(&self, url: &Url, params: &FetchParams) -> Result<FetchedPage, FetchError> {
        let client = self.client_for(params.proxy.as_deref())?;

        let mut request = client
            .get(url.clone())
            .header(USER_AGENT, params.user_agent.as_str())
            .timeout(params.timeout);
        if let Some(referer) = params.referer.as_deref() {
            request = request.header(REFERER, referer);
        }

        let response = request
            .send()
            .await
            .map_err(|e| FetchError::network(url.as_str(), e))?;

        let status = response.status();
        let final_url = response.url().clone();
        let is_html = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .is_none_or(|content_type| content_type.contains("html"));

        let body = read_capped(response, params.max_body_size, url).await?;

        let links = if status.is_success() && is_html {
            extract_links(&String::from_utf8_lossy(&body), &final_url)
        } else {
            Vec::new()
        };

        debug!(
            status = status.as_u16(),
            body_bytes = body.len(),
            links = links.len(),
            "fetched page"
        );

        Ok(FetchedPage {
            status: status.as_u16(),
            body,
            links,
        })
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchedPage, FetchError> {
        self.fetch_url(request.target.url(), &request.params).await
    }

    async fn close(&self) {
        self.proxied.clear();
    }
}

fn build_client(proxy: Option<&str>) -> Result<Client, FetchError> {
    let mut builder = ClientBuilder::new()
        .connect_timeout(CONNECT_TIMEOUT)
        .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
        .cookie_store(true)
        .gzip(true);

    if let Some(proxy) = proxy {
        let proxy_config = Proxy::all(proxy).map_err(|e| FetchError::client(Some(proxy), e))?;
        builder = builder.proxy(proxy_config);
    }

    builder.build().map_err(|e| FetchError::client(proxy, e))
}

/// Reads at most `limit` bytes of the body, dropping the rest.
async fn read_capped(response: Response, limit: usize, url: &Url) -> Result<Vec<u8>, FetchError> {
    let mut body = Vec::with_capacity(limit.min(64 * 1024));
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| FetchError::body(url.as_str(), e))?;
        let remaining = limit - body.len();
        if chunk.len() >= remaining {
            body.extend_from_slice(&chunk[..remaining]);
            break;
        }
        body.extend_from_slice(&chunk);
    }

    Ok(body)
}
