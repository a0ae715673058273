//! File mover.
//!
//! Replaces originals of `accepted` jobs with their optimized outputs
//! (remove then rename, same filesystem) and sweeps leftover outputs of
//! `skipped` jobs. A row whose files are gone, or whose rename fails
//! after the original was removed, is marked `failed` for manual
//! recovery.

use std::path::Path;

use anyhow::Result;
use async_trait::async_trait;
use tracing::{info, warn};
use vidslim_db::{JobRepo, VideoJob, VideoStatus};

use crate::error::WorkerError;
use crate::tick::{Tick, WorkerLoop};

pub struct Mover {
    repo: JobRepo,
    batch_size: i64,
}

impl Mover {
    pub fn new(repo: JobRepo, batch_size: i64) -> Self {
        Self { repo, batch_size }
    }

    async fn replace_batch(&self) -> Result<()> {
        let batch = self
            .repo
            .by_status(VideoStatus::Accepted, Some(self.batch_size))
            .await?;
        for job in &batch {
            if let Err(err) = self.replace(job).await {
                warn!(job = job.id, file = %job.filename, "replace failed: {err}");
            }
        }
        Ok(())
    }

    async fn replace(&self, job: &VideoJob) -> crate::error::Result<()> {
        let original = Path::new(&job.filepath);
        let Some(optimized) = job.optimized_path.as_deref() else {
            self.mark_failed(job.id).await;
            return Err(WorkerError::MoveFailed(
                "no optimized output recorded".to_string(),
            ));
        };
        let optimized = Path::new(optimized);

        if !original.exists() {
            self.mark_failed(job.id).await;
            return Err(WorkerError::InputMissing(original.to_path_buf()));
        }
        if !optimized.exists() {
            self.mark_failed(job.id).await;
            return Err(WorkerError::InputMissing(optimized.to_path_buf()));
        }

        if let Err(err) = tokio::fs::remove_file(original).await {
            self.mark_failed(job.id).await;
            return Err(WorkerError::MoveFailed(format!(
                "removing original: {err}"
            )));
        }
        // Rename, not copy: the output directory sits on the same mount.
        // If this fails the original is already gone and the row stays
        // failed until someone intervenes.
        if let Err(err) = tokio::fs::rename(optimized, original).await {
            self.mark_failed(job.id).await;
            return Err(WorkerError::MoveFailed(format!(
                "renaming optimized file into place: {err}"
            )));
        }

        self.repo
            .transition(job.id, VideoStatus::Accepted, VideoStatus::Replaced)
            .await?;
        info!(job = job.id, path = %job.filepath, "original replaced");
        Ok(())
    }

    /// Remove leftover outputs of skipped jobs. Cleanup only - the
    /// status is not touched.
    async fn cleanup_skipped(&self) -> Result<()> {
        let skipped = self.repo.by_status(VideoStatus::Skipped, None).await?;
        for job in &skipped {
            let Some(optimized) = job.optimized_path.as_deref() else {
                continue;
            };
            let optimized = Path::new(optimized);
            if !optimized.exists() {
                continue;
            }
            match tokio::fs::remove_file(optimized).await {
                Ok(()) => info!(job = job.id, path = %optimized.display(), "leftover output removed"),
                Err(err) => warn!(job = job.id, "leftover cleanup failed: {err}"),
            }
        }
        Ok(())
    }

    async fn mark_failed(&self, id: i64) {
        if let Err(err) = self
            .repo
            .transition(id, VideoStatus::Accepted, VideoStatus::Failed)
            .await
        {
            warn!(job = id, "could not mark job failed: {err}");
        }
    }
}

#[async_trait]
impl WorkerLoop for Mover {
    fn name(&self) -> &'static str {
        "mover"
    }

    async fn tick(&mut self) -> Result<Tick> {
        self.replace_batch().await?;
        self.cleanup_skipped().await?;
        Ok(Tick::Idle)
    }
}
