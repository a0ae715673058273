//! SQLite pool construction.
//!
//! Every connection handed out by the pool is configured for the
//! multi-process access pattern the pipeline relies on: WAL journal,
//! NORMAL durability, foreign keys on, and a busy timeout so a writer
//! blocked by another process waits instead of failing immediately.

use std::path::PathBuf;
use std::time::Duration;

use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous,
};
use sqlx::SqlitePool;
use tracing::info;

use crate::error::Result;

/// Store tuning, sourced from the `DB_*` environment.
#[derive(Debug, Clone)]
pub struct DbSettings {
    /// Path of the store file.
    pub path: PathBuf,
    /// How long a blocked writer waits before SQLITE_BUSY surfaces.
    pub busy_timeout: Duration,
    /// Attempts per write when the store reports busy.
    pub max_retries: u32,
    /// Fixed delay between busy retries.
    pub retry_delay: Duration,
}

impl Default for DbSettings {
    fn default() -> Self {
        Self {
            path: PathBuf::from("/data/video_db.sqlite"),
            busy_timeout: Duration::from_secs(30),
            max_retries: 3,
            retry_delay: Duration::from_millis(100),
        }
    }
}

/// Open a pool over the store file, creating the file if missing.
pub async fn open_pool(settings: &DbSettings) -> Result<SqlitePool> {
    let options = SqliteConnectOptions::new()
        .filename(&settings.path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        .foreign_keys(true)
        .busy_timeout(settings.busy_timeout);

    let pool = SqlitePoolOptions::new()
        .max_connections(2)
        .connect_with(options)
        .await?;

    info!(path = %settings.path.display(), "store opened");
    Ok(pool)
}

/// In-memory pool for tests. Single connection so the database lives as
/// long as the pool.
pub async fn open_memory_pool() -> Result<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await?;
    Ok(pool)
}
