//! Job repository: typed operations over the store.
//!
//! Workers hand jobs to each other exclusively through the `status`
//! column, so every status write here either goes through
//! [`JobRepo::transition`] (guarded by `WHERE status = ?` so a row that
//! moved under us is detected, not clobbered) or through
//! [`JobRepo::update_status`], the unguarded path reserved for manual
//! overrides from the API surface.
//!
//! Every write runs inside an explicit transaction, appends to
//! `status_history` when the status changes, and is retried on
//! SQLITE_BUSY with a fixed delay.

use std::time::Duration;

use sqlx::{Sqlite, SqlitePool, Transaction};
use tracing::{debug, info, warn};

use crate::error::{is_busy, DbError, Result};
use crate::models::{StatusCount, VideoJob, VideoStatus};
use crate::pool::DbSettings;

/// Aggregate queue view, read by the `status` subcommand.
#[derive(Debug, Clone, Default)]
pub struct JobStats {
    /// Row counts per status, statuses with zero rows omitted.
    pub counts: Vec<StatusCount>,
    /// Bytes saved across all replaced files.
    pub reclaimed_bytes: i64,
}

#[derive(Clone)]
pub struct JobRepo {
    pool: SqlitePool,
    max_retries: u32,
    retry_delay: Duration,
}

impl JobRepo {
    pub fn new(pool: SqlitePool, settings: &DbSettings) -> Self {
        Self {
            pool,
            max_retries: settings.max_retries.max(1),
            retry_delay: settings.retry_delay,
        }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Insert a newly discovered file as `pending`.
    ///
    /// Fails with [`DbError::Duplicate`] when a row with the same
    /// filepath already exists (checked by prior lookup, not by a
    /// unique constraint).
    pub async fn insert(
        &self,
        filepath: &str,
        filename: &str,
        ffprobe_json: Option<&str>,
        codec: &str,
        size: i64,
    ) -> Result<i64> {
        if self.by_path(filepath).await?.is_some() {
            return Err(DbError::Duplicate(filepath.to_string()));
        }
        let id = self
            .with_retry(|| self.insert_once(filepath, filename, ffprobe_json, codec, size))
            .await?;
        info!(job = id, file = filename, "job queued as pending");
        Ok(id)
    }

    async fn insert_once(
        &self,
        filepath: &str,
        filename: &str,
        ffprobe_json: Option<&str>,
        codec: &str,
        size: i64,
    ) -> Result<i64> {
        let mut tx = self.pool.begin().await?;
        let id = sqlx::query(
            r#"
            INSERT INTO videos (filepath, filename, ffprobe_data, original_codec, original_size, status)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(filepath)
        .bind(filename)
        .bind(ffprobe_json)
        .bind(codec)
        .bind(size)
        .bind(VideoStatus::Pending)
        .execute(&mut *tx)
        .await?
        .last_insert_rowid();
        record_history(&mut tx, id, VideoStatus::Pending).await?;
        tx.commit().await?;
        Ok(id)
    }

    pub async fn by_id(&self, id: i64) -> Result<Option<VideoJob>> {
        let job = sqlx::query_as::<_, VideoJob>("SELECT * FROM videos WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(job)
    }

    pub async fn by_path(&self, filepath: &str) -> Result<Option<VideoJob>> {
        let job = sqlx::query_as::<_, VideoJob>("SELECT * FROM videos WHERE filepath = ?")
            .bind(filepath)
            .fetch_optional(&self.pool)
            .await?;
        Ok(job)
    }

    /// Jobs in `status`, oldest first. `limit` of `None` returns all.
    pub async fn by_status(
        &self,
        status: VideoStatus,
        limit: Option<i64>,
    ) -> Result<Vec<VideoJob>> {
        let jobs = sqlx::query_as::<_, VideoJob>(
            r#"
            SELECT * FROM videos
            WHERE status = ?
            ORDER BY created_at ASC, id ASC
            LIMIT ?
            "#,
        )
        .bind(status)
        .bind(limit.unwrap_or(-1))
        .fetch_all(&self.pool)
        .await?;
        Ok(jobs)
    }

    /// The oldest `ready` job, if any.
    pub async fn next_ready(&self) -> Result<Option<VideoJob>> {
        Ok(self
            .by_status(VideoStatus::Ready, Some(1))
            .await?
            .into_iter()
            .next())
    }

    /// Unguarded status write for manual overrides. Accepts any valid
    /// status, regardless of the handoff diagram.
    pub async fn update_status(&self, id: i64, status: VideoStatus) -> Result<()> {
        self.with_retry(|| self.update_status_once(id, status))
            .await?;
        info!(job = id, status = %status, "status set");
        Ok(())
    }

    async fn update_status_once(&self, id: i64, status: VideoStatus) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        let affected = sqlx::query("UPDATE videos SET status = ? WHERE id = ?")
            .bind(status)
            .bind(id)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        if affected == 0 {
            return Err(DbError::NotFound(id));
        }
        record_history(&mut tx, id, status).await?;
        tx.commit().await?;
        Ok(())
    }

    /// Worker-issued transition, race-guarded by the expected current
    /// status. Returns `false` when the row moved under us (claimed or
    /// overridden by someone else) - callers skip the job in that case.
    pub async fn transition(&self, id: i64, from: VideoStatus, to: VideoStatus) -> Result<bool> {
        require_worker_edge(from, to)?;
        let moved = self
            .with_retry(|| self.guarded_update_once(id, from, to, &[]))
            .await?;
        if moved {
            info!(job = id, from = %from, to = %to, "job transitioned");
        } else {
            debug!(job = id, from = %from, "job no longer in expected status, skipped");
        }
        Ok(moved)
    }

    /// Bulk unconditional status write, one statement plus history.
    pub async fn bulk_update_status(&self, ids: &[i64], status: VideoStatus) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        self.with_retry(|| self.bulk_update_once(ids, status))
            .await?;
        info!(count = ids.len(), status = %status, "bulk status update");
        Ok(())
    }

    async fn bulk_update_once(&self, ids: &[i64], status: VideoStatus) -> Result<()> {
        let placeholders = vec!["?"; ids.len()].join(", ");
        let sql = format!("UPDATE videos SET status = ? WHERE id IN ({placeholders})");
        let mut tx = self.pool.begin().await?;
        let mut query = sqlx::query(&sql).bind(status);
        for id in ids {
            query = query.bind(id);
        }
        query.execute(&mut *tx).await?;
        for id in ids {
            record_history(&mut tx, *id, status).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// Store the synthesized command and host snapshot and move the job
    /// to `ready`, in one transaction. `from` must be `confirmed` or
    /// `re-confirmed`.
    pub async fn set_command_ready(
        &self,
        id: i64,
        from: VideoStatus,
        command: &str,
        system_info: &str,
    ) -> Result<bool> {
        require_worker_edge(from, VideoStatus::Ready)?;
        let extra = [("ai_command", command), ("system_info", system_info)];
        self.with_retry(|| self.guarded_update_once(id, from, VideoStatus::Ready, &extra))
            .await
    }

    /// Record the transcoder's output and move `ready -> optimized`.
    pub async fn update_final_output(
        &self,
        id: i64,
        optimized_path: &str,
        new_codec: &str,
        optimized_size: i64,
    ) -> Result<bool> {
        let size_text = optimized_size.to_string();
        let extra = [
            ("optimized_path", optimized_path),
            ("new_codec", new_codec),
            ("optimized_size", size_text.as_str()),
        ];
        self.with_retry(|| self.guarded_update_once(id, VideoStatus::Ready, VideoStatus::Optimized, &extra))
            .await
    }

    /// Best-effort progress line write; no history, no status change.
    pub async fn update_progress(&self, id: i64, line: &str) -> Result<()> {
        self.with_retry(|| self.set_column_once(id, "progress", line))
            .await
    }

    /// Rolling size projection write used during transcode.
    pub async fn update_estimated_size(&self, id: i64, estimated: i64) -> Result<()> {
        let text = estimated.to_string();
        self.with_retry(|| self.set_column_once(id, "estimated_size", &text))
            .await
    }

    async fn set_column_once(&self, id: i64, column: &str, value: &str) -> Result<()> {
        let sql = format!("UPDATE videos SET {column} = ? WHERE id = ?");
        let mut tx = self.pool.begin().await?;
        sqlx::query(&sql)
            .bind(value)
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    /// Status write guarded by the expected current status, with any
    /// extra columns in the same statement. Returns whether the guard
    /// matched.
    async fn guarded_update_once(
        &self,
        id: i64,
        from: VideoStatus,
        to: VideoStatus,
        extra: &[(&str, &str)],
    ) -> Result<bool> {
        let mut assignments = String::from("status = ?");
        for (column, _) in extra {
            assignments.push_str(&format!(", {column} = ?"));
        }
        let sql = format!("UPDATE videos SET {assignments} WHERE id = ? AND status = ?");

        let mut tx = self.pool.begin().await?;
        let mut query = sqlx::query(&sql).bind(to);
        for (_, value) in extra {
            query = query.bind(*value);
        }
        let affected = query
            .bind(id)
            .bind(from)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        if affected == 0 {
            tx.commit().await?;
            return Ok(false);
        }
        record_history(&mut tx, id, to).await?;
        tx.commit().await?;
        Ok(true)
    }

    /// Per-status counts and total bytes reclaimed by replacements.
    pub async fn stats(&self) -> Result<JobStats> {
        let counts = sqlx::query_as::<_, StatusCount>(
            "SELECT status, COUNT(*) AS count FROM videos GROUP BY status",
        )
        .fetch_all(&self.pool)
        .await?;

        let reclaimed_bytes: i64 = sqlx::query_scalar(
            r#"
            SELECT COALESCE(SUM(original_size - optimized_size), 0)
            FROM videos
            WHERE status = 'replaced' AND optimized_size IS NOT NULL
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(JobStats {
            counts,
            reclaimed_bytes,
        })
    }

    /// Retry `op` on SQLITE_BUSY up to `max_retries` attempts with a
    /// fixed delay. Any other error aborts immediately.
    async fn with_retry<T, F, Fut>(&self, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        let mut attempt = 1u32;
        loop {
            match op().await {
                Err(DbError::Sqlx(err)) if is_busy(&err) => {
                    if attempt >= self.max_retries {
                        warn!(attempts = attempt, "store busy, retries exhausted");
                        return Err(DbError::Busy { attempts: attempt });
                    }
                    warn!(
                        attempt,
                        max = self.max_retries,
                        "store busy, retrying in {:?}",
                        self.retry_delay
                    );
                    tokio::time::sleep(self.retry_delay).await;
                    attempt += 1;
                }
                other => return other,
            }
        }
    }
}

fn require_worker_edge(from: VideoStatus, to: VideoStatus) -> Result<()> {
    if !VideoStatus::worker_can_move(from, to) {
        return Err(DbError::invalid_status(format!(
            "worker transition {from} -> {to} is not allowed"
        )));
    }
    Ok(())
}

async fn record_history(
    tx: &mut Transaction<'_, Sqlite>,
    id: i64,
    status: VideoStatus,
) -> Result<()> {
    sqlx::query("INSERT INTO status_history (video_id, status) VALUES (?, ?)")
        .bind(id)
        .bind(status)
        .execute(&mut **tx)
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::open_memory_pool;
    use crate::schema::ensure_schema;

    async fn test_repo() -> JobRepo {
        let pool = open_memory_pool().await.unwrap();
        ensure_schema(&pool).await.unwrap();
        JobRepo::new(pool, &DbSettings::default())
    }

    async fn insert_sample(repo: &JobRepo, path: &str) -> i64 {
        let name = path.rsplit('/').next().unwrap();
        repo.insert(path, name, Some(r#"{"duration":"60"}"#), "h264", 1000)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn insert_assigns_ids_and_sets_pending() {
        let repo = test_repo().await;
        let id = insert_sample(&repo, "/in/a.mp4").await;

        let job = repo.by_id(id).await.unwrap().unwrap();
        assert_eq!(job.filename, "a.mp4");
        assert_eq!(job.filepath, "/in/a.mp4");
        assert_eq!(job.original_size, 1000);
        assert_eq!(job.original_codec.as_deref(), Some("h264"));
        assert_eq!(job.status, VideoStatus::Pending);
    }

    #[tokio::test]
    async fn duplicate_filepath_is_rejected() {
        let repo = test_repo().await;
        insert_sample(&repo, "/in/a.mp4").await;

        let err = repo
            .insert("/in/a.mp4", "a.mp4", None, "h264", 1000)
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::Duplicate(p) if p == "/in/a.mp4"));

        let pending = repo.by_status(VideoStatus::Pending, None).await.unwrap();
        assert_eq!(pending.len(), 1);
    }

    #[tokio::test]
    async fn by_status_is_fifo() {
        let repo = test_repo().await;
        let first = insert_sample(&repo, "/in/a.mp4").await;
        let second = insert_sample(&repo, "/in/b.mp4").await;
        let third = insert_sample(&repo, "/in/c.mp4").await;

        let pending = repo
            .by_status(VideoStatus::Pending, Some(2))
            .await
            .unwrap();
        assert_eq!(
            pending.iter().map(|j| j.id).collect::<Vec<_>>(),
            vec![first, second]
        );

        let all = repo.by_status(VideoStatus::Pending, None).await.unwrap();
        assert_eq!(all.last().unwrap().id, third);
    }

    #[tokio::test]
    async fn bulk_update_moves_every_listed_row() {
        let repo = test_repo().await;
        let a = insert_sample(&repo, "/in/a.mp4").await;
        let b = insert_sample(&repo, "/in/b.mp4").await;
        let c = insert_sample(&repo, "/in/c.mp4").await;

        repo.bulk_update_status(&[a, b], VideoStatus::Confirmed)
            .await
            .unwrap();

        let confirmed = repo.by_status(VideoStatus::Confirmed, None).await.unwrap();
        assert_eq!(confirmed.len(), 2);
        let pending = repo.by_status(VideoStatus::Pending, None).await.unwrap();
        assert_eq!(pending.iter().map(|j| j.id).collect::<Vec<_>>(), vec![c]);
    }

    #[tokio::test]
    async fn transition_guard_detects_stale_status() {
        let repo = test_repo().await;
        let id = insert_sample(&repo, "/in/a.mp4").await;

        let moved = repo
            .transition(id, VideoStatus::Pending, VideoStatus::Confirmed)
            .await
            .unwrap();
        assert!(moved);

        // Second attempt sees the row already confirmed and backs off.
        let moved = repo
            .transition(id, VideoStatus::Pending, VideoStatus::Confirmed)
            .await
            .unwrap();
        assert!(!moved);
    }

    #[tokio::test]
    async fn transition_rejects_non_worker_edges() {
        let repo = test_repo().await;
        let id = insert_sample(&repo, "/in/a.mp4").await;

        let err = repo
            .transition(id, VideoStatus::Pending, VideoStatus::Replaced)
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::InvalidStatus(_)));
    }

    #[tokio::test]
    async fn manual_override_permits_any_status() {
        let repo = test_repo().await;
        let id = insert_sample(&repo, "/in/a.mp4").await;

        repo.update_status(id, VideoStatus::Rejected).await.unwrap();
        let job = repo.by_id(id).await.unwrap().unwrap();
        assert_eq!(job.status, VideoStatus::Rejected);
    }

    #[tokio::test]
    async fn set_command_ready_requires_confirmed_states() {
        let repo = test_repo().await;
        let id = insert_sample(&repo, "/in/a.mp4").await;
        repo.update_status(id, VideoStatus::Confirmed).await.unwrap();

        let moved = repo
            .set_command_ready(
                id,
                VideoStatus::Confirmed,
                "ffmpeg -y -i input.mp4 -c:v libx265 output.mp4",
                r#"{"os":"linux"}"#,
            )
            .await
            .unwrap();
        assert!(moved);

        let job = repo.by_id(id).await.unwrap().unwrap();
        assert_eq!(job.status, VideoStatus::Ready);
        assert!(job.ai_command.unwrap().starts_with("ffmpeg"));
        assert!(job.system_info.is_some());

        let err = repo
            .set_command_ready(id, VideoStatus::Pending, "ffmpeg", "{}")
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::InvalidStatus(_)));
    }

    #[tokio::test]
    async fn final_output_moves_ready_to_optimized() {
        let repo = test_repo().await;
        let id = insert_sample(&repo, "/in/a.mp4").await;
        repo.update_status(id, VideoStatus::Ready).await.unwrap();

        let moved = repo
            .update_final_output(id, "/out/a.mp4", "hevc", 420)
            .await
            .unwrap();
        assert!(moved);

        let job = repo.by_id(id).await.unwrap().unwrap();
        assert_eq!(job.status, VideoStatus::Optimized);
        assert_eq!(job.optimized_path.as_deref(), Some("/out/a.mp4"));
        assert_eq!(job.new_codec.as_deref(), Some("hevc"));
        assert_eq!(job.optimized_size, Some(420));

        // A second attempt no longer matches the guard.
        let moved = repo
            .update_final_output(id, "/out/a.mp4", "hevc", 420)
            .await
            .unwrap();
        assert!(!moved);
    }

    #[tokio::test]
    async fn progress_and_estimate_do_not_touch_status() {
        let repo = test_repo().await;
        let id = insert_sample(&repo, "/in/a.mp4").await;
        repo.update_status(id, VideoStatus::Ready).await.unwrap();

        repo.update_progress(id, "frame= 100 time=00:00:12.00 size= 150kB")
            .await
            .unwrap();
        repo.update_estimated_size(id, 128_000).await.unwrap();

        let job = repo.by_id(id).await.unwrap().unwrap();
        assert_eq!(job.status, VideoStatus::Ready);
        assert!(job.progress.unwrap().contains("frame="));
        assert_eq!(job.estimated_size, Some(128_000));
    }

    #[tokio::test]
    async fn history_records_every_status_change() {
        let repo = test_repo().await;
        let id = insert_sample(&repo, "/in/a.mp4").await;
        repo.transition(id, VideoStatus::Pending, VideoStatus::Confirmed)
            .await
            .unwrap();
        repo.set_command_ready(id, VideoStatus::Confirmed, "ffmpeg -y", "{}")
            .await
            .unwrap();

        let entries: Vec<String> = sqlx::query_scalar(
            "SELECT status FROM status_history WHERE video_id = ? ORDER BY id ASC",
        )
        .bind(id)
        .fetch_all(repo.pool())
        .await
        .unwrap();
        assert_eq!(entries, vec!["pending", "confirmed", "ready"]);
    }

    #[tokio::test]
    async fn stats_counts_and_reclaimed_bytes() {
        let repo = test_repo().await;
        let a = insert_sample(&repo, "/in/a.mp4").await;
        insert_sample(&repo, "/in/b.mp4").await;

        repo.update_status(a, VideoStatus::Ready).await.unwrap();
        repo.update_final_output(a, "/out/a.mp4", "hevc", 400)
            .await
            .unwrap();
        repo.update_status(a, VideoStatus::Replaced).await.unwrap();

        let stats = repo.stats().await.unwrap();
        let count_for = |status: VideoStatus| {
            stats
                .counts
                .iter()
                .find(|c| c.status == status)
                .map(|c| c.count)
                .unwrap_or(0)
        };
        assert_eq!(count_for(VideoStatus::Pending), 1);
        assert_eq!(count_for(VideoStatus::Replaced), 1);
        assert_eq!(stats.reclaimed_bytes, 600);
    }
}
