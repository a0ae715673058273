//! Store schema creation and forward migration.
//!
//! All DDL lives here - single source of truth. Initialization runs under
//! `BEGIN EXCLUSIVE` so concurrently starting workers serialize on the
//! store instead of racing each other through CREATE/ALTER.

use sqlx::pool::PoolConnection;
use sqlx::{Row, Sqlite, SqlitePool};
use tracing::info;

use crate::error::Result;

/// Ensure the `videos` and `status_history` tables, indexes and the
/// `updated_at` trigger exist, adding any columns an older store file is
/// missing.
pub async fn ensure_schema(pool: &SqlitePool) -> Result<()> {
    let mut conn = pool.acquire().await?;

    sqlx::query("BEGIN EXCLUSIVE").execute(&mut *conn).await?;
    match create_all(&mut conn).await {
        Ok(()) => {
            sqlx::query("COMMIT").execute(&mut *conn).await?;
            info!("store schema verified");
            Ok(())
        }
        Err(err) => {
            let _ = sqlx::query("ROLLBACK").execute(&mut *conn).await;
            Err(err)
        }
    }
}

async fn create_all(conn: &mut PoolConnection<Sqlite>) -> Result<()> {
    sqlx::query(
        r#"CREATE TABLE IF NOT EXISTS videos (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            filename TEXT NOT NULL,
            filepath TEXT NOT NULL,
            ffprobe_data TEXT,
            ai_command TEXT,
            original_size INTEGER,
            optimized_size INTEGER,
            estimated_size INTEGER,
            optimized_path TEXT,
            original_codec TEXT,
            new_codec TEXT,
            status TEXT NOT NULL DEFAULT 'pending',
            progress TEXT,
            system_info TEXT,
            created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP
        )"#,
    )
    .execute(&mut **conn)
    .await?;

    // Columns that arrived after the first release; older store files
    // pick them up here.
    for (column, ty) in [
        ("original_codec", "TEXT"),
        ("new_codec", "TEXT"),
        ("progress", "TEXT"),
        ("system_info", "TEXT"),
        ("estimated_size", "INTEGER"),
    ] {
        add_column_if_missing(conn, "videos", column, ty).await?;
    }

    sqlx::query(
        r#"CREATE TABLE IF NOT EXISTS status_history (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            video_id INTEGER NOT NULL REFERENCES videos(id),
            status TEXT NOT NULL,
            at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP
        )"#,
    )
    .execute(&mut **conn)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_filepath ON videos(filepath)")
        .execute(&mut **conn)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_status ON videos(status)")
        .execute(&mut **conn)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_created_at ON videos(created_at)")
        .execute(&mut **conn)
        .await?;

    sqlx::query(
        r#"CREATE TRIGGER IF NOT EXISTS update_videos_timestamp
        AFTER UPDATE ON videos
        BEGIN
            UPDATE videos SET updated_at = CURRENT_TIMESTAMP
            WHERE id = NEW.id;
        END"#,
    )
    .execute(&mut **conn)
    .await?;

    Ok(())
}

async fn add_column_if_missing(
    conn: &mut PoolConnection<Sqlite>,
    table: &str,
    column: &str,
    ty: &str,
) -> Result<()> {
    let columns = sqlx::query("SELECT name FROM pragma_table_info(?)")
        .bind(table)
        .fetch_all(&mut **conn)
        .await?;

    let exists = columns
        .iter()
        .any(|row| row.get::<String, _>("name") == column);
    if !exists {
        sqlx::query(&format!("ALTER TABLE {table} ADD COLUMN {column} {ty}"))
            .execute(&mut **conn)
            .await?;
        info!(table, column, "store column added");
    }
    Ok(())
}
