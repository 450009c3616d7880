//! Visited-URL deduplication.
//!
//! A [`VisitedStore`] answers one question atomically: "is this the first time
//! anyone has claimed this dedup key?" [`VisitedStore::mark_if_new`] returns
//! `true` to exactly one caller per key, which then owns enqueueing that URL.
//!
//! Implementations:
//! - [`InMemoryVisitedStore`] - sharded concurrent set, the default
//! - [`SqliteVisitedStore`] - `SQLite` table keyed by hash, for crawls that
//!   share or keep visited state

mod error;
mod memory;
mod sqlite;

use async_trait::async_trait;

pub use error::StoreError;
pub use memory::InMemoryVisitedStore;
pub use sqlite::SqliteVisitedStore;

/// Set of dedup keys already claimed during a crawl.
#[async_trait]
pub trait VisitedStore: Send + Sync {
    /// Inserts `hash` if absent. Returns `true` if this call inserted it.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the backing storage fails or the store is
    /// closed.
    async fn mark_if_new(&self, hash: &str) -> Result<bool, StoreError>;

    /// Stops accepting claims and releases resources. Whether claims outlive
    /// the store is up to the implementation. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the backing storage fails.
    async fn close(&self) -> Result<(), StoreError>;
}
