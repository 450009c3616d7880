//! Error types for visited stores.

use thiserror::Error;

use crate::db::DbError;

/// Errors from [`VisitedStore`](super::VisitedStore) operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Opening the backing database failed.
    #[error("visited store database error: {0}")]
    Db(#[from] DbError),

    /// A query against the backing database failed.
    #[error("visited store query failed: {0}")]
    Query(#[from] sqlx::Error),

    /// The store was used after `close()`.
    #[error("visited store is closed")]
    Closed,
}
