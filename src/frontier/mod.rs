//! The crawl frontier: pending fetch requests.
//!
//! # Overview
//!
//! The frontier is a FIFO shared by all workers:
//! - [`Frontier::push`] appends and wakes one waiting popper
//! - [`Frontier::pop`] returns the oldest request, suspending while empty
//! - [`Frontier::close`] rejects further pushes, discards what is left, and
//!   releases every suspended popper with [`FrontierError::Closed`]
//!
//! [`InMemoryFrontier`] is the default implementation. [`SqliteFrontier`]
//! keeps pending requests in the crawl database instead of on the heap.

mod memory;
mod sqlite;

use async_trait::async_trait;
use thiserror::Error;

pub use memory::InMemoryFrontier;
pub use sqlite::SqliteFrontier;

use crate::db::DbError;
use crate::fetch::FetchRequest;
use crate::link::UrlError;

/// Errors from frontier operations.
#[derive(Debug, Error)]
pub enum FrontierError {
    /// The frontier was closed. Expected at shutdown; not a failure.
    #[error("frontier is closed")]
    Closed,

    /// The backing database failed.
    #[error("frontier storage failed: {0}")]
    Storage(#[from] DbError),

    /// A stored entry no longer parses as a crawlable URL.
    #[error("stored frontier entry is invalid: {0}")]
    InvalidEntry(#[from] UrlError),
}

impl From<sqlx::Error> for FrontierError {
    fn from(err: sqlx::Error) -> Self {
        Self::Storage(DbError::Query(err))
    }
}

/// Shared work queue of pending requests.
#[async_trait]
pub trait Frontier: Send + Sync {
    /// Appends a request.
    ///
    /// # Errors
    ///
    /// Returns [`FrontierError::Closed`] after [`close`](Self::close), or a
    /// storage error from a durable implementation.
    async fn push(&self, request: FetchRequest) -> Result<(), FrontierError>;

    /// Removes and returns the oldest request, waiting while the frontier is
    /// empty and open.
    ///
    /// # Errors
    ///
    /// Returns [`FrontierError::Closed`] once the frontier is closed, or a
    /// storage error from a durable implementation.
    async fn pop(&self) -> Result<FetchRequest, FrontierError>;

    /// Snapshot of the number of pending requests. A hint only; it may be
    /// stale by the time the caller looks at it.
    fn len(&self) -> usize;

    /// Whether [`len`](Self::len) is zero.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Closes the frontier. Idempotent.
    async fn close(&self);
}
