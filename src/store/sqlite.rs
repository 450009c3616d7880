//! `SQLite`-backed visited store.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tracing::{debug, instrument};

use super::{StoreError, VisitedStore};
use crate::db::{Database, RunId, RunKind};

/// Visited store persisted in the `visited` table.
///
/// The hash is the table's primary key, so `INSERT ... ON CONFLICT DO
/// NOTHING` is the check-and-insert: one caller gets a row count of 1 even
/// when several crawls share the file.
///
/// Each store claims keys under its own [`RunId`]. By default `close` keeps
/// the claims, so a later crawl on the same file skips pages already taken.
/// With [`clear_on_close`](Self::clear_on_close) it deletes only the rows
/// this store inserted and leaves other runs' claims alone.
#[derive(Debug)]
pub struct SqliteVisitedStore {
    db: Database,
    run: RunId,
    clear_on_close: bool,
    closed: AtomicBool,
}

impl SqliteVisitedStore {
    /// Registers a new run on `db`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Db`] if the run cannot be registered.
    pub async fn with_database(db: Database) -> Result<Self, StoreError> {
        let run = db.begin_run(RunKind::Visited).await?;
        Ok(Self {
            db,
            run,
            clear_on_close: false,
            closed: AtomicBool::new(false),
        })
    }

    /// Opens (creating if needed) a database file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Db`] if the database cannot be opened or migrated.
    pub async fn open(path: &Path) -> Result<Self, StoreError> {
        Self::with_database(Database::open(path).await?).await
    }

    /// Opens a private in-memory database. Its claims are cleared on close.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Db`] if the database cannot be created.
    pub async fn in_memory() -> Result<Self, StoreError> {
        Ok(Self::with_database(Database::in_memory().await?)
            .await?
            .clear_on_close(true))
    }

    /// Whether `close` deletes the keys this store claimed.
    #[must_use]
    pub fn clear_on_close(mut self, clear: bool) -> Self {
        self.clear_on_close = clear;
        self
    }

    /// The run this store claims keys under.
    #[must_use]
    pub fn run_id(&self) -> RunId {
        self.run
    }

    /// Number of keys claimed by any run in the file.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the store is closed or the query fails.
    pub async fn count(&self) -> Result<i64, StoreError> {
        self.ensure_open()?;
        let count = sqlx::query_scalar("SELECT COUNT(*) FROM visited")
            .fetch_one(self.db.pool())
            .await?;
        Ok(count)
    }

    /// Number of keys claimed by this store.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the store is closed or the query fails.
    pub async fn claimed(&self) -> Result<i64, StoreError> {
        self.ensure_open()?;
        let count = sqlx::query_scalar("SELECT COUNT(*) FROM visited WHERE run_id = ?")
            .bind(self.run.get())
            .fetch_one(self.db.pool())
            .await?;
        Ok(count)
    }

    fn ensure_open(&self) -> Result<(), StoreError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(StoreError::Closed);
        }
        Ok(())
    }
}

#[async_trait]
impl VisitedStore for SqliteVisitedStore {
    async fn mark_if_new(&self, hash: &str) -> Result<bool, StoreError> {
        self.ensure_open()?;
        let result = sqlx::query(
            "INSERT INTO visited (hash, run_id) VALUES (?, ?) ON CONFLICT (hash) DO NOTHING",
        )
        .bind(hash)
        .bind(self.run.get())
        .execute(self.db.pool())
        .await?;
        Ok(result.rows_affected() == 1)
    }

    #[instrument(skip(self), fields(run = %self.run))]
    async fn close(&self) -> Result<(), StoreError> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        if self.clear_on_close {
            let cleared = sqlx::query("DELETE FROM visited WHERE run_id = ?")
                .bind(self.run.get())
                .execute(self.db.pool())
                .await?;
            debug!(rows = cleared.rows_affected(), "cleared this run's claims");
        }
        self.db.finish_run(self.run).await?;
        Ok(())
    }
}
