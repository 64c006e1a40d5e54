/// Database layer for Steeple
///
/// Manages the SQLite connection pool, embedded migrations, and the
/// timestamp encoding shared by every table.

use crate::error::{SteepleError, SteepleResult};
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;

/// Database connection options
#[derive(Debug, Clone)]
pub struct DatabaseOptions {
    pub max_connections: u32,
    pub enable_wal: bool,
}

impl Default for DatabaseOptions {
    fn default() -> Self {
        Self {
            max_connections: 10,
            enable_wal: true,
        }
    }
}

/// Create a SQLite connection pool
pub async fn create_pool(path: &Path, options: DatabaseOptions) -> SteepleResult<SqlitePool> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let pool = SqlitePoolOptions::new()
        .max_connections(options.max_connections)
        .connect_with(
            SqliteConnectOptions::new()
                .filename(path)
                .create_if_missing(true)
                .journal_mode(if options.enable_wal {
                    SqliteJournalMode::Wal
                } else {
                    SqliteJournalMode::Delete
                })
                .foreign_keys(true)
                .busy_timeout(std::time::Duration::from_secs(5)),
        )
        .await?;

    Ok(pool)
}

/// Create a single-connection in-memory pool with the schema applied.
///
/// The pool never recycles its connection, since that would drop the database.
pub async fn create_memory_pool() -> SteepleResult<SqlitePool> {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .min_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await?;

    run_migrations(&pool).await?;
    Ok(pool)
}

/// Run migrations for a database
/// Migrations are embedded at compile time from ./migrations directory
pub async fn run_migrations(pool: &SqlitePool) -> SteepleResult<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

/// Test database connection
pub async fn test_connection(pool: &SqlitePool) -> SteepleResult<()> {
    sqlx::query("SELECT 1").execute(pool).await?;
    Ok(())
}

/// Encode a timestamp as fixed-width RFC 3339 UTC text.
///
/// Every stored timestamp uses this form so that lexical order in SQL
/// comparisons matches chronological order.
pub fn format_timestamp(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn parse_timestamp(value: &str) -> SteepleResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| SteepleError::Internal(format!("Invalid timestamp {:?}: {}", value, e)))
}

/// Generate a new row identifier
pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
