//! `SQLite`-backed FIFO frontier.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use sqlx::FromRow;
use tokio::sync::{Notify, RwLock};
use tracing::{debug, warn};

use super::{Frontier, FrontierError};
use crate::db::{Database, RunId, RunKind};
use crate::fetch::{FetchParams, FetchRequest};
use crate::link::NormalizedUrl;

/// Frontier whose pending requests live in the `frontier` table.
///
/// Entries are ordered by row id, so pops are FIFO. Each instance reads and
/// writes only the rows of its own [`RunId`]; other crawls sharing the file
/// never see them. A pop is a single `DELETE ... RETURNING`, so two poppers
/// cannot take the same row.
///
/// `closed` is held for reading across every push and pop query and for
/// writing by [`close`](Frontier::close), so no row lands after close has
/// cleared the run.
#[derive(Debug)]
pub struct SqliteFrontier {
    db: Database,
    run: RunId,
    closed: RwLock<bool>,
    pending: AtomicUsize,
    available: Notify,
}

#[derive(Debug, FromRow)]
struct FrontierRow {
    target: String,
    depth: i64,
    user_agent: String,
    proxy: Option<String>,
    referer: Option<String>,
    max_body_size: i64,
    timeout_ms: i64,
}

impl FrontierRow {
    fn into_request(self) -> Result<FetchRequest, FrontierError> {
        let target = NormalizedUrl::parse(&self.target)?;
        let params = FetchParams {
            user_agent: self.user_agent,
            proxy: self.proxy,
            referer: self.referer,
            max_body_size: usize::try_from(self.max_body_size).unwrap_or(usize::MAX),
            timeout: Duration::from_millis(u64::try_from(self.timeout_ms).unwrap_or_default()),
        };
        Ok(FetchRequest {
            target,
            params,
            depth: u32::try_from(self.depth).unwrap_or(u32::MAX),
        })
    }
}

impl SqliteFrontier {
    /// Registers a new run on `db`.
    ///
    /// # Errors
    ///
    /// Returns [`FrontierError::Storage`] if the run cannot be registered.
    pub async fn with_database(db: Database) -> Result<Self, FrontierError> {
        let run = db.begin_run(RunKind::Frontier).await?;
        Ok(Self {
            db,
            run,
            closed: RwLock::new(false),
            pending: AtomicUsize::new(0),
            available: Notify::new(),
        })
    }

    /// Opens (creating if needed) a database file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`FrontierError::Storage`] if the database cannot be opened.
    pub async fn open(path: &Path) -> Result<Self, FrontierError> {
        Self::with_database(Database::open(path).await?).await
    }

    /// Opens a private in-memory database.
    ///
    /// # Errors
    ///
    /// Returns [`FrontierError::Storage`] if the database cannot be created.
    pub async fn in_memory() -> Result<Self, FrontierError> {
        Self::with_database(Database::in_memory().await?).await
    }

    /// The run this frontier's rows belong to.
    #[must_use]
    pub fn run_id(&self) -> RunId {
        self.run
    }

    /// Whether [`close`](Frontier::close) has been called.
    pub async fn is_closed(&self) -> bool {
        *self.closed.read().await
    }

    async fn take_oldest(&self) -> Result<Option<FetchRequest>, FrontierError> {
        let row: Option<FrontierRow> = sqlx::query_as(
            r"
            DELETE FROM frontier
            WHERE id = (
                SELECT id FROM frontier
                WHERE run_id = ?
                ORDER BY id
                LIMIT 1
            )
            RETURNING target, depth, user_agent, proxy, referer, max_body_size, timeout_ms
            ",
        )
        .bind(self.run.get())
        .fetch_optional(self.db.pool())
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let _ = self
            .pending
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));
        row.into_request().map(Some)
    }
}

#[async_trait]
impl Frontier for SqliteFrontier {
    async fn push(&self, request: FetchRequest) -> Result<(), FrontierError> {
        {
            let closed = self.closed.read().await;
            if *closed {
                return Err(FrontierError::Closed);
            }
            let params = &request.params;
            sqlx::query(
                r"
                INSERT INTO frontier
                    (run_id, target, depth, user_agent, proxy, referer, max_body_size, timeout_ms)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                ",
            )
            .bind(self.run.get())
            .bind(request.target.as_str())
            .bind(i64::from(request.depth))
            .bind(&params.user_agent)
            .bind(params.proxy.as_deref())
            .bind(params.referer.as_deref())
            .bind(i64::try_from(params.max_body_size).unwrap_or(i64::MAX))
            .bind(i64::try_from(params.timeout.as_millis()).unwrap_or(i64::MAX))
            .execute(self.db.pool())
            .await?;
            self.pending.fetch_add(1, Ordering::AcqRel);
        }
        self.available.notify_one();
        Ok(())
    }

    async fn pop(&self) -> Result<FetchRequest, FrontierError> {
        loop {
            // Registered before checking state, so a close() between the check
            // and the await still wakes us.
            let notified = self.available.notified();
            {
                let closed = self.closed.read().await;
                if *closed {
                    return Err(FrontierError::Closed);
                }
                if let Some(request) = self.take_oldest().await? {
                    return Ok(request);
                }
            }
            notified.await;
        }
    }

    fn len(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }

    async fn close(&self) {
        {
            let mut closed = self.closed.write().await;
            if *closed {
                return;
            }
            *closed = true;
            self.pending.store(0, Ordering::Release);

            match sqlx::query("DELETE FROM frontier WHERE run_id = ?")
                .bind(self.run.get())
                .execute(self.db.pool())
                .await
            {
                Ok(result) => debug!(
                    run = %self.run,
                    discarded = result.rows_affected(),
                    "frontier closed"
                ),
                Err(e) => warn!(run = %self.run, error = %e, "failed to discard frontier rows"),
            }
            if let Err(e) = self.db.finish_run(self.run).await {
                warn!(run = %self.run, error = %e, "failed to mark frontier run finished");
            }
        }
        self.available.notify_waiters();
    }
}
