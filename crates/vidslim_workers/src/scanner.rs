//! Directory scanner.
//!
//! Walks the input tree once per tick and inserts every new video file
//! as a `pending` job. A file that fails to probe is logged and skipped;
//! only a broken walk (missing root, store down) fails the tick.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::{debug, info, warn};
use vidslim_db::{DbError, JobRepo};
use walkdir::WalkDir;

use crate::error::WorkerError;
use crate::probe::MediaProbe;
use crate::tick::{Tick, WorkerLoop};

/// Case-insensitive extension allow-list.
const VIDEO_EXTENSIONS: [&str; 4] = ["mp4", "mkv", "avi", "mov"];

pub struct Scanner<P> {
    repo: JobRepo,
    probe: P,
    video_dir: PathBuf,
}

impl<P: MediaProbe> Scanner<P> {
    pub fn new(repo: JobRepo, probe: P, video_dir: PathBuf) -> Self {
        Self {
            repo,
            probe,
            video_dir,
        }
    }

    async fn scan_once(&self) -> Result<usize> {
        if !self.video_dir.is_dir() {
            anyhow::bail!("video directory {} is not a directory", self.video_dir.display());
        }

        let mut inserted = 0;
        for entry in WalkDir::new(&self.video_dir) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    warn!("walk error under {}: {err}", self.video_dir.display());
                    continue;
                }
            };
            if !entry.file_type().is_file() || !is_video(entry.path()) {
                continue;
            }

            match self.scan_file(entry.path()).await {
                Ok(true) => inserted += 1,
                Ok(false) => {}
                // Store trouble is worth failing the tick over; anything
                // file-local is not.
                Err(WorkerError::Store(err)) => {
                    return Err(err).context("store write during scan");
                }
                Err(err) => {
                    warn!(path = %entry.path().display(), "skipping file: {err}");
                }
            }
        }
        Ok(inserted)
    }

    /// Returns whether a new row was inserted.
    async fn scan_file(&self, path: &Path) -> crate::error::Result<bool> {
        let filepath = path.to_string_lossy().into_owned();
        if self.repo.by_path(&filepath).await?.is_some() {
            return Ok(false);
        }

        let report = self.probe.probe(path).await?;
        let size = tokio::fs::metadata(path).await?.len() as i64;
        let filename = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| filepath.clone());

        match self
            .repo
            .insert(
                &filepath,
                &filename,
                Some(&report.format_json),
                &report.codec_name,
                size,
            )
            .await
        {
            Ok(_) => Ok(true),
            // Lost a race with another scanner; the row exists, which is
            // all we wanted.
            Err(DbError::Duplicate(_)) => Ok(false),
            Err(err) => Err(err.into()),
        }
    }
}

fn is_video(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            let ext = ext.to_ascii_lowercase();
            VIDEO_EXTENSIONS.iter().any(|allowed| *allowed == ext)
        })
        .unwrap_or(false)
}

#[async_trait]
impl<P: MediaProbe> WorkerLoop for Scanner<P> {
    fn name(&self) -> &'static str {
        "scanner"
    }

    async fn tick(&mut self) -> Result<Tick> {
        let inserted = self.scan_once().await?;
        if inserted > 0 {
            info!(inserted, "scan complete");
        } else {
            debug!("scan complete, nothing new");
        }
        // The walk already covered the whole tree; wait out the interval.
        Ok(Tick::Idle)
    }
}
