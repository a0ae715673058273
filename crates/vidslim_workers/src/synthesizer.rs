//! Command synthesizer.
//!
//! For each `confirmed` (and `re-confirmed`) job, asks the model for a
//! single-line transcoder invocation tailored to the file's probe data
//! and the host's capabilities, then parks the job as `ready`. A failed
//! request leaves the row where it was; the next tick retries it.

use std::path::PathBuf;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::{info, warn};
use vidslim_db::{JobRepo, VideoJob, VideoStatus};

use crate::error::WorkerError;
use crate::hostinfo::{self, HostOverrides};
use crate::llm::CommandModel;
use crate::tick::{Tick, WorkerLoop};

pub const SYSTEM_PROMPT: &str = "You are a video processing expert.";

const DEFAULT_INSTRUCTIONS: &str = "\
Based on this information, suggest the most optimal ffmpeg command to compress the video:
- Best possible space saving; prefer x265, or a hardware encoder when the system information shows one.
- Use a CRF between 22 and 28 and cap the video bitrate below the source bitrate.
- Keep the original resolution and frame rate, and copy the audio stream unchanged.
- Reply with exactly one line starting with ffmpeg; no explanation, no code fences.
- Use input.mp4 as the input file and output.mp4 as the output file, and include the overwrite flag (-y).";

const RETRY_INSTRUCTIONS: &str = "\
The command above did not reduce the file enough. Produce a stricter command: cap the video \
bitrate harder and raise the CRF (staying within 22-28) so the output comes out significantly smaller.";

pub struct Synthesizer<M> {
    repo: JobRepo,
    model: M,
    batch_size: i64,
    prompt_path: PathBuf,
    overrides: HostOverrides,
}

impl<M: CommandModel> Synthesizer<M> {
    pub fn new(
        repo: JobRepo,
        model: M,
        batch_size: i64,
        prompt_path: PathBuf,
        overrides: HostOverrides,
    ) -> Self {
        Self {
            repo,
            model,
            batch_size,
            prompt_path,
            overrides,
        }
    }

    async fn tick_inner(&self) -> Result<()> {
        // One host snapshot per tick, shared by every job in the batch.
        let overrides = self.overrides.clone();
        let host = tokio::task::spawn_blocking(move || hostinfo::collect(&overrides))
            .await
            .context("host probe task")?;
        let host_json = serde_json::to_string(&host).context("serialize host snapshot")?;
        let instructions = self.load_instructions().await;

        for from in [VideoStatus::Confirmed, VideoStatus::ReConfirmed] {
            let jobs = self.repo.by_status(from, Some(self.batch_size)).await?;
            for job in jobs {
                if let Err(err) = self.synthesize(&job, from, &host_json, &instructions).await {
                    warn!(job = job.id, file = %job.filename, "synthesis failed, will retry next tick: {err}");
                }
            }
        }
        Ok(())
    }

    /// Deployment-provided prompt override, or the built-in
    /// instructions when the file is absent or empty.
    async fn load_instructions(&self) -> String {
        match tokio::fs::read_to_string(&self.prompt_path).await {
            Ok(text) if !text.trim().is_empty() => text,
            _ => DEFAULT_INSTRUCTIONS.to_string(),
        }
    }

    async fn synthesize(
        &self,
        job: &VideoJob,
        from: VideoStatus,
        host_json: &str,
        instructions: &str,
    ) -> crate::error::Result<bool> {
        let prompt = build_prompt(job, host_json, instructions, from == VideoStatus::ReConfirmed);
        let raw = self.model.complete(SYSTEM_PROMPT, &prompt).await?;
        let command = normalize_command(&raw)
            .ok_or_else(|| WorkerError::ModelFailed("no ffmpeg command in response".to_string()))?;

        let moved = self
            .repo
            .set_command_ready(job.id, from, &command, host_json)
            .await?;
        if moved {
            info!(job = job.id, file = %job.filename, "command ready");
        }
        Ok(moved)
    }
}

/// Assemble the user message. Re-confirmed jobs carry their previous
/// command and last progress line plus stricter-command instructions.
pub fn build_prompt(job: &VideoJob, host_json: &str, instructions: &str, stricter: bool) -> String {
    let mut prompt = format!(
        "Here is the metadata of a video file:\n\
         The ffprobe data is: {}\n\
         And here is the system information: {}\n\
         {}",
        job.ffprobe_data.as_deref().unwrap_or("{}"),
        host_json,
        instructions,
    );

    if stricter {
        prompt.push_str("\n\nA previous attempt used this command:\n");
        prompt.push_str(job.ai_command.as_deref().unwrap_or("(none recorded)"));
        if let Some(progress) = job.progress.as_deref() {
            prompt.push_str("\nIts last reported progress was:\n");
            prompt.push_str(progress);
        }
        prompt.push('\n');
        prompt.push_str(RETRY_INSTRUCTIONS);
    }

    prompt
}

/// Strip code fences, keep text from the first `ffmpeg` onward, take
/// the single line, trim. `None` when no command is left.
pub fn normalize_command(raw: &str) -> Option<String> {
    let without_fences = raw
        .lines()
        .filter(|line| !line.trim_start().starts_with("```"))
        .collect::<Vec<_>>()
        .join("\n");

    let start = without_fences.find("ffmpeg")?;
    let command = without_fences[start..].lines().next()?.trim();
    (!command.is_empty()).then(|| command.to_string())
}

#[async_trait]
impl<M: CommandModel> WorkerLoop for Synthesizer<M> {
    fn name(&self) -> &'static str {
        "synthesizer"
    }

    async fn tick(&mut self) -> Result<Tick> {
        self.tick_inner().await?;
        // At most one batch per bucket per tick.
        Ok(Tick::Idle)
    }
}
