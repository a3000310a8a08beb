//! The Catalog Store (§4.1): the single SQLite-backed source of truth for
//! scan results, operation state, and configuration.

pub mod queries;

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;
use tracing::instrument;

use crate::error::Result;

pub use queries::{CatalogCounts, ListFilter, ScanResultUpdate, SortColumn, SortDirection};

/// Thin wrapper around a [`SqlitePool`] configured the way this service
/// needs it: WAL journaling, a generous busy timeout so the Write
/// Serializer never trips `SQLITE_BUSY` under read contention, and a pool
/// sized for "one writer, many readers".
#[derive(Clone)]
pub struct Catalog {
    pool: SqlitePool,
}

impl Catalog {
    #[instrument(skip_all, fields(path = %path.display()))]
    pub async fn open(path: &Path) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_secs(30));

        let pool = SqlitePoolOptions::new()
            .max_connections(8)
            .test_before_acquire(true)
            .max_lifetime(Duration::from_secs(300))
            .connect_with(options)
            .await?;

        sqlx::migrate!("./migrations").run(&pool).await?;

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

impl FromStr for SortColumn {
    type Err = crate::error::CatalogError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        queries::parse_sort_column(s)
    }
}
