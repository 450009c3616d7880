//! `SQLite` handle shared by the durable visited store and frontier.
//!
//! Every store opened on a [`Database`] registers a run (see [`RunId`]). The
//! rows it writes carry that id, so several crawls can point at one file:
//! visited claims are global across runs, while frontier entries and the
//! cleanup done on close only touch the caller's own rows.
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//! use std::sync::Arc;
//! use sitecrawler_core::{Database, SqliteFrontier, SqliteVisitedStore};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let db = Database::open(Path::new("crawl.db")).await?;
//! let visited = Arc::new(SqliteVisitedStore::with_database(db.clone()).await?);
//! let frontier = Arc::new(SqliteFrontier::with_database(db).await?);
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use thiserror::Error;
use tracing::{debug, instrument};

/// Pooled connections per file. Writers serialize on the file lock anyway.
const FILE_MAX_CONNECTIONS: u32 = 4;

/// How long a writer waits on a locked file before failing with `SQLITE_BUSY`.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Errors opening or bookkeeping the database.
#[derive(Debug, Error)]
pub enum DbError {
    #[error("failed to open crawl database at {}: {source}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: sqlx::Error,
    },

    #[error("failed to migrate crawl database: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("crawl database query failed: {0}")]
    Query(#[from] sqlx::Error),
}

/// What a run row was registered for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RunKind {
    Visited,
    Frontier,
}

impl RunKind {
    fn as_str(self) -> &'static str {
        match self {
            Self::Visited => "visited",
            Self::Frontier => "frontier",
        }
    }
}

/// Identifies the rows one store instance owns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RunId(i64);

impl RunId {
    #[must_use]
    pub fn get(self) -> i64 {
        self.0
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "run {}", self.0)
    }
}

/// Migrated connection pool. Clones share the pool; it closes when the last
/// clone is dropped.
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Opens (creating if needed) the file at `path` in WAL mode and applies
    /// pending migrations.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Open`] if the file cannot be opened, or
    /// [`DbError::Migration`] if the schema cannot be brought up to date.
    #[instrument(skip(path), fields(path = %path.display()))]
    pub async fn open(path: &Path) -> Result<Self, DbError> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(BUSY_TIMEOUT);

        let pool = SqlitePoolOptions::new()
            .max_connections(FILE_MAX_CONNECTIONS)
            .connect_with(options)
            .await
            .map_err(|source| DbError::Open {
                path: path.to_path_buf(),
                source,
            })?;

        Self::migrated(pool).await
    }

    /// Opens a private in-memory database.
    ///
    /// The pool holds exactly one connection that never expires, since each
    /// `:memory:` connection is a separate database.
    ///
    /// # Errors
    ///
    /// Same as [`open`](Self::open).
    #[instrument]
    pub async fn in_memory() -> Result<Self, DbError> {
        let memory = Path::new(":memory:");
        let options = SqliteConnectOptions::from_str("sqlite::memory:").map_err(|source| {
            DbError::Open {
                path: memory.to_path_buf(),
                source,
            }
        })?;

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(|source| DbError::Open {
                path: memory.to_path_buf(),
                source,
            })?;

        Self::migrated(pool).await
    }

    async fn migrated(pool: SqlitePool) -> Result<Self, DbError> {
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }

    pub(crate) fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Registers a new run and returns its id.
    pub(crate) async fn begin_run(&self, kind: RunKind) -> Result<RunId, DbError> {
        let id: i64 = sqlx::query_scalar("INSERT INTO runs (kind) VALUES (?) RETURNING id")
            .bind(kind.as_str())
            .fetch_one(&self.pool)
            .await?;
        debug!(run = id, kind = kind.as_str(), "run registered");
        Ok(RunId(id))
    }

    /// Stamps the run as finished.
    pub(crate) async fn finish_run(&self, run: RunId) -> Result<(), DbError> {
        sqlx::query("UPDATE runs SET finished_at = datetime('now') WHERE id = ?")
            .bind(run.0)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Number of runs ever registered in this database.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Query`] if the count fails.
    pub async fn run_count(&self) -> Result<i64, DbError> {
        let count = sqlx::query_scalar("SELECT COUNT(*) FROM runs")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}
