//! Auto-approver.
//!
//! Two independent, flag-gated passes per tick: promote the oldest
//! `pending` rows to `confirmed`, and the oldest `optimized` rows to
//! `accepted`. Nothing else is ever touched.

use anyhow::Result;
use async_trait::async_trait;
use tracing::{debug, info};
use vidslim_db::{JobRepo, VideoStatus};

use crate::tick::{Tick, WorkerLoop};

pub struct Approver {
    repo: JobRepo,
    auto_confirmed: bool,
    auto_accept: bool,
    batch_size: i64,
}

impl Approver {
    pub fn new(repo: JobRepo, auto_confirmed: bool, auto_accept: bool, batch_size: i64) -> Self {
        Self {
            repo,
            auto_confirmed,
            auto_accept,
            batch_size,
        }
    }

    async fn promote(&self, from: VideoStatus, to: VideoStatus) -> Result<()> {
        let batch = self.repo.by_status(from, Some(self.batch_size)).await?;
        if batch.is_empty() {
            debug!(from = %from, "nothing to promote");
            return Ok(());
        }
        let ids: Vec<i64> = batch.iter().map(|job| job.id).collect();
        self.repo.bulk_update_status(&ids, to).await?;
        info!(count = ids.len(), from = %from, to = %to, "batch promoted");
        Ok(())
    }
}

#[async_trait]
impl WorkerLoop for Approver {
    fn name(&self) -> &'static str {
        "approver"
    }

    async fn tick(&mut self) -> Result<Tick> {
        // One batch per pass per tick, even with a backlog; the next
        // tick takes the next slice.
        if self.auto_confirmed {
            self.promote(VideoStatus::Pending, VideoStatus::Confirmed)
                .await?;
        }
        if self.auto_accept {
            self.promote(VideoStatus::Optimized, VideoStatus::Accepted)
                .await?;
        }
        Ok(Tick::Idle)
    }
}
