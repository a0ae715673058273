//! Row models for the job store.

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::error::DbError;

/// The coarse state of a job; the primary handoff between workers.
///
/// The on-disk spellings are the lowercase forms below (`re-confirmed`
/// included). Terminal states are never left by workers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum VideoStatus {
    Pending,
    Confirmed,
    #[sqlx(rename = "re-confirmed")]
    #[serde(rename = "re-confirmed")]
    ReConfirmed,
    Ready,
    Optimized,
    Accepted,
    Replaced,
    Skipped,
    Rejected,
    Failed,
}

impl VideoStatus {
    /// Every valid status, in pipeline order.
    pub const ALL: [VideoStatus; 10] = [
        VideoStatus::Pending,
        VideoStatus::Confirmed,
        VideoStatus::ReConfirmed,
        VideoStatus::Ready,
        VideoStatus::Optimized,
        VideoStatus::Accepted,
        VideoStatus::Replaced,
        VideoStatus::Skipped,
        VideoStatus::Rejected,
        VideoStatus::Failed,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            VideoStatus::Pending => "pending",
            VideoStatus::Confirmed => "confirmed",
            VideoStatus::ReConfirmed => "re-confirmed",
            VideoStatus::Ready => "ready",
            VideoStatus::Optimized => "optimized",
            VideoStatus::Accepted => "accepted",
            VideoStatus::Replaced => "replaced",
            VideoStatus::Skipped => "skipped",
            VideoStatus::Rejected => "rejected",
            VideoStatus::Failed => "failed",
        }
    }

    /// Terminal states are never left once entered.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            VideoStatus::Replaced | VideoStatus::Rejected | VideoStatus::Failed
        )
    }

    /// Whether a worker loop is allowed to issue `from -> to`.
    ///
    /// This is the handoff diagram: each transition has exactly one
    /// worker that writes it, so concurrent writers to the same row are
    /// impossible under normal operation. Manual overrides from the API
    /// surface bypass this table and go through
    /// [`crate::JobRepo::update_status`].
    pub fn worker_can_move(from: VideoStatus, to: VideoStatus) -> bool {
        use VideoStatus::*;
        matches!(
            (from, to),
            // approver
            (Pending, Confirmed)
                | (Optimized, Accepted)
                // synthesizer
                | (Confirmed, Ready)
                | (ReConfirmed, Ready)
                // transcoder
                | (Ready, Optimized)
                | (Ready, ReConfirmed)
                | (Ready, Failed)
                // mover
                | (Accepted, Replaced)
                | (Accepted, Failed)
        )
    }
}

impl FromStr for VideoStatus {
    type Err = DbError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        VideoStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| DbError::InvalidStatus(s.to_string()))
    }
}

impl fmt::Display for VideoStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One source file's progress through the pipeline.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct VideoJob {
    pub id: i64,
    pub filename: String,
    pub filepath: String,
    pub original_size: i64,
    pub original_codec: Option<String>,
    /// The probed `format` object, stored verbatim as JSON text.
    pub ffprobe_data: Option<String>,
    /// Single-line transcoder invocation with `input.mp4`/`output.mp4`
    /// placeholders.
    pub ai_command: Option<String>,
    /// Host capability snapshot used for synthesis, JSON text.
    pub system_info: Option<String>,
    pub estimated_size: Option<i64>,
    pub optimized_size: Option<i64>,
    pub optimized_path: Option<String>,
    pub new_codec: Option<String>,
    pub status: VideoStatus,
    /// Last parsed transcoder progress line.
    pub progress: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

/// Per-status row count, as returned by [`crate::JobRepo::stats`].
#[derive(Debug, Clone, FromRow)]
pub struct StatusCount {
    pub status: VideoStatus,
    pub count: i64,
}
