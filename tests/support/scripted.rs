//! In-process fetcher serving a scripted site.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use sitecrawler_core::{FetchError, FetchParams, FetchRequest, FetchedPage, Fetcher};

/// How the fetcher answers one URL.
#[derive(Debug, Clone)]
pub enum Reply {
    Page { status: u16, links: Vec<String> },
    Slow { links: Vec<String>, delay: Duration },
    Fail,
    Hang,
}

/// One call seen by the fetcher.
#[derive(Debug, Clone)]
pub struct Call {
    pub url: String,
    pub depth: u32,
    pub params: FetchParams,
}

/// Fetcher answering from a map of URL to [`Reply`]. Unknown URLs are 404s.
#[derive(Debug, Default)]
pub struct ScriptedFetcher {
    replies: HashMap<String, Reply>,
    delay: Duration,
    calls: Mutex<Vec<Call>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    closed: AtomicUsize,
}

impl ScriptedFetcher {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A 200 page at `url` linking to `links`.
    #[must_use]
    pub fn page(mut self, url: &str, links: &[&str]) -> Self {
        self.replies.insert(
            url.to_string(),
            Reply::Page {
                status: 200,
                links: links.iter().map(ToString::to_string).collect(),
            },
        );
        self
    }

    /// Like [`page`](Self::page), answered only after `delay`.
    #[must_use]
    pub fn slow_page(mut self, url: &str, links: &[&str], delay: Duration) -> Self {
        self.replies.insert(
            url.to_string(),
            Reply::Slow {
                links: links.iter().map(ToString::to_string).collect(),
                delay,
            },
        );
        self
    }

    #[must_use]
    pub fn status(mut self, url: &str, status: u16) -> Self {
        self.replies.insert(
            url.to_string(),
            Reply::Page {
                status,
                links: Vec::new(),
            },
        );
        self
    }

    /// Fetching `url` fails with a network-style error.
    #[must_use]
    pub fn fail(mut self, url: &str) -> Self {
        self.replies.insert(url.to_string(), Reply::Fail);
        self
    }

    /// Fetching `url` never completes.
    #[must_use]
    pub fn hang(mut self, url: &str) -> Self {
        self.replies.insert(url.to_string(), Reply::Hang);
        self
    }

    /// Every fetch sleeps this long first.
    #[must_use]
    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    #[must_use]
    pub fn into_arc(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn fetched_urls(&self) -> Vec<String> {
        let mut urls: Vec<_> = self.calls().into_iter().map(|c| c.url).collect();
        urls.sort();
        urls
    }

    pub fn call_count(&self, url: &str) -> usize {
        self.calls().iter().filter(|c| c.url == url).count()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn close_count(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Fetcher for ScriptedFetcher {
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchedPage, FetchError> {
        let url = request.target.as_str().to_string();
        self.calls.lock().unwrap().push(Call {
            url: url.clone(),
            depth: request.depth,
            params: request.params.clone(),
        });

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let reply = self.replies.get(&url).cloned();
        let outcome = match reply {
            Some(Reply::Page { status, links }) => Ok(FetchedPage {
                status,
                body: format!("<html>{url}</html>").into_bytes(),
                links,
            }),
            Some(Reply::Slow { links, delay }) => {
                tokio::time::sleep(delay).await;
                Ok(FetchedPage {
                    status: 200,
                    body: format!("<html>{url}</html>").into_bytes(),
                    links,
                })
            }
            Some(Reply::Fail) => Err(FetchError::other(url, "connection refused")),
            Some(Reply::Hang) => std::future::pending().await,
            None => Ok(FetchedPage {
                status: 404,
                ..FetchedPage::default()
            }),
        };

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        outcome
    }

    async fn close(&self) {
        self.closed.fetch_add(1, Ordering::SeqCst);
    }
}
