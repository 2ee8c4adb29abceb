//! SQLite pool, row decoding helpers and the `GarageStore` entry point

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use gixat_core::store::GarageStore;
use gixat_core::{Error, OrganizationId, Result};
use rust_decimal::Decimal;
use sqlx::Row;
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteRow,
    SqliteSynchronous,
};
use std::path::Path;
use std::str::FromStr;
use tracing::info;
use uuid::Uuid;

use crate::migrations::run_migrations;

/// SQLite implementation of every Gixat store trait.
///
/// Cloning is cheap; clones share the connection pool.
#[derive(Clone)]
pub struct SqliteGarageStore {
    pub(crate) pool: SqlitePool,
}

impl SqliteGarageStore {
    /// Open (creating if needed) a database file and apply pending migrations
    pub async fn new(db_path: &Path, max_connections: u32) -> Result<Self> {
        if let Some(parent) = db_path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await?;
        }

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections.max(1))
            .connect_with(
                SqliteConnectOptions::new()
                    .filename(db_path)
                    .create_if_missing(true)
                    .foreign_keys(true)
                    .journal_mode(SqliteJournalMode::Wal)
                    .synchronous(SqliteSynchronous::Normal),
            )
            .await
            .map_err(|e| Error::Database(format!("Failed to open {}: {}", db_path.display(), e)))?;

        info!("Opened SQLite database at {}", db_path.display());
        Self::from_pool(pool).await
    }

    /// Open a database from a `sqlite:` URL such as `sqlite://data/gixat.db`
    /// or `sqlite::memory:`
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self> {
        if is_memory_url(url) {
            return Self::in_memory().await;
        }
        let path = url
            .strip_prefix("sqlite://")
            .or_else(|| url.strip_prefix("sqlite:"))
            .unwrap_or(url);
        Self::new(Path::new(path), max_connections).await
    }

    /// Private in-memory database, used by tests and the demo server.
    ///
    /// Limited to a single long-lived connection: every SQLite in-memory
    /// connection is its own database.
    pub async fn in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(db_err)?
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(db_err)?;
        Self::from_pool(pool).await
    }

    /// Wrap an existing pool, applying pending migrations
    pub async fn from_pool(pool: SqlitePool) -> Result<Self> {
        run_migrations(&pool).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn is_memory_url(url: &str) -> bool {
    url == "sqlite::memory:" || url == ":memory:" || url.contains("mode=memory")
}

#[async_trait]
impl GarageStore for SqliteGarageStore {
    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Error mapping
// ---------------------------------------------------------------------------

pub(crate) fn db_err(e: sqlx::Error) -> Error {
    Error::Database(e.to_string())
}

/// Map a write error, turning unique-index violations into a business rule
pub(crate) fn write_err(e: sqlx::Error, what: &str) -> Error {
    if let Some(db) = e.as_database_error()
        && db.is_unique_violation()
    {
        return Error::rule("DuplicateValue", format!("{} already exists.", what));
    }
    db_err(e)
}

// ---------------------------------------------------------------------------
// Column decoding
// ---------------------------------------------------------------------------

pub(crate) fn text(row: &SqliteRow, col: &str) -> Result<String> {
    row.try_get::<String, _>(col).map_err(db_err)
}

pub(crate) fn opt_text(row: &SqliteRow, col: &str) -> Result<Option<String>> {
    row.try_get::<Option<String>, _>(col).map_err(db_err)
}

pub(crate) fn uuid(row: &SqliteRow, col: &str) -> Result<Uuid> {
    let raw = text(row, col)?;
    Uuid::parse_str(&raw).map_err(|e| Error::Database(format!("Invalid uuid in {}: {}", col, e)))
}

pub(crate) fn opt_uuid(row: &SqliteRow, col: &str) -> Result<Option<Uuid>> {
    opt_text(row, col)?
        .map(|raw| {
            Uuid::parse_str(&raw)
                .map_err(|e| Error::Database(format!("Invalid uuid in {}: {}", col, e)))
        })
        .transpose()
}

pub(crate) fn decimal(row: &SqliteRow, col: &str) -> Result<Decimal> {
    let raw = text(row, col)?;
    Decimal::from_str(&raw)
        .map_err(|e| Error::Database(format!("Invalid decimal in {}: {}", col, e)))
}

pub(crate) fn timestamp(row: &SqliteRow, col: &str) -> Result<DateTime<Utc>> {
    row.try_get::<DateTime<Utc>, _>(col).map_err(db_err)
}

pub(crate) fn opt_timestamp(row: &SqliteRow, col: &str) -> Result<Option<DateTime<Utc>>> {
    row.try_get::<Option<DateTime<Utc>>, _>(col).map_err(db_err)
}

pub(crate) fn flag(row: &SqliteRow, col: &str) -> Result<bool> {
    row.try_get::<bool, _>(col).map_err(db_err)
}

pub(crate) fn int(row: &SqliteRow, col: &str) -> Result<i64> {
    row.try_get::<i64, _>(col).map_err(db_err)
}

/// Decode a TEXT column holding a `text_enum!` variant name
pub(crate) fn parsed<T>(row: &SqliteRow, col: &str) -> Result<T>
where
    T: FromStr<Err = Error>,
{
    text(row, col)?.parse()
}

pub(crate) fn org_text(org: OrganizationId) -> String {
    org.as_uuid().to_string()
}

/// Escape `%` and `_` and wrap the term for a `LIKE ... ESCAPE '\'` match
pub(crate) fn like_pattern(term: &str) -> String {
    let escaped = term
        .to_lowercase()
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{}%", escaped)
}
