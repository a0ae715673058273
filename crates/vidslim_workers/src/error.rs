//! Worker error kinds.
//!
//! Most of these are handled where they occur (logged, job marked
//! `failed` or left for the next tick); only errors that escape a tick
//! reach the loop harness and count against the consecutive-failure
//! budget.

use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, WorkerError>;

#[derive(Error, Debug)]
pub enum WorkerError {
    /// Store failure, including exhausted busy retries.
    #[error(transparent)]
    Store(#[from] vidslim_db::DbError),

    /// External probe exited non-zero or was missing. Per-file,
    /// non-fatal.
    #[error("probe failed for {path}: {reason}")]
    ProbeFailed { path: PathBuf, reason: String },

    /// HTTP error, timeout, or empty/malformed model response.
    /// Per-job, non-fatal; the row is retried on the next tick.
    #[error("model request failed: {0}")]
    ModelFailed(String),

    /// Synthesized command lacks a required placeholder.
    #[error("invalid command: {0}")]
    CommandInvalid(String),

    /// Child process exited non-zero or output handling failed.
    #[error("transcode failed: {0}")]
    TranscodeFailed(String),

    /// Input file disappeared before transcode or move.
    #[error("input missing: {0}")]
    InputMissing(PathBuf),

    /// Remove/rename failure during replacement; the original may
    /// already be gone.
    #[error("move failed: {0}")]
    MoveFailed(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
