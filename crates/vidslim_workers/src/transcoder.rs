//! Transcoder.
//!
//! Runs one `ready` job at a time: rewrites the stored invocation's
//! placeholders into real paths, supervises the child process while
//! parsing its stderr for progress, keeps a rolling projection of the
//! final size, and aborts early when the projected reduction falls
//! below the threshold so the synthesizer can try a stricter command.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::time::timeout;
use tracing::{error, info, warn};
use vidslim_db::{JobRepo, VideoJob, VideoStatus};

use crate::error::WorkerError;
use crate::probe::{duration_from_format_json, MediaProbe};
use crate::progress::{below_threshold, project_final_size, reduction_ratio, ProgressParser};
use crate::tick::{Tick, WorkerLoop};

/// Grace period between the quit request and the kill on early abort.
const ABORT_GRACE: Duration = Duration::from_secs(5);
/// Bound on waiting for a child whose stderr has closed.
const EXIT_WAIT: Duration = Duration::from_secs(10);

const INPUT_PLACEHOLDER: &str = "input.mp4";
const OUTPUT_PLACEHOLDER: &str = "output.mp4";

/// How a supervised run ended.
#[derive(Debug, PartialEq, Eq)]
enum RunOutcome {
    /// Output written and recorded; job is `optimized`.
    Optimized,
    /// Projected reduction too small; job is `re-confirmed`.
    Aborted,
}

pub struct Transcoder<P> {
    repo: JobRepo,
    probe: P,
    output_dir: PathBuf,
    min_reduction_ratio: f64,
    parser: ProgressParser,
}

impl<P: MediaProbe> Transcoder<P> {
    pub fn new(repo: JobRepo, probe: P, output_dir: PathBuf, min_reduction_ratio: f64) -> Self {
        Self {
            repo,
            probe,
            output_dir,
            min_reduction_ratio,
            parser: ProgressParser::new(),
        }
    }

    async fn process(&self, job: &VideoJob) -> crate::error::Result<RunOutcome> {
        let input = PathBuf::from(&job.filepath);
        let output = self.output_path(&input)?;

        let command = job.ai_command.as_deref().unwrap_or_default();
        let argv = match build_argv(command, &input, &output) {
            Ok(argv) => argv,
            Err(err) => {
                self.mark_failed(job.id).await;
                return Err(err);
            }
        };

        if !input.exists() {
            self.mark_failed(job.id).await;
            return Err(WorkerError::InputMissing(input));
        }
        tokio::fs::create_dir_all(&self.output_dir).await?;

        let total_duration = job
            .ffprobe_data
            .as_deref()
            .map(duration_from_format_json)
            .unwrap_or(0.0);

        info!(job = job.id, command = %argv.join(" "), "transcoding");
        let mut child = match Command::new(&argv[0])
            .args(&argv[1..])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
        {
            Ok(child) => child,
            Err(err) => {
                self.mark_failed(job.id).await;
                return Err(WorkerError::TranscodeFailed(format!(
                    "failed to spawn {}: {err}",
                    argv[0]
                )));
            }
        };

        if let Some(outcome) = self
            .watch_stderr(job, &mut child, total_duration)
            .await?
        {
            return Ok(outcome);
        }

        // stderr closed; bound the wait for the exit status.
        let status = match timeout(EXIT_WAIT, child.wait()).await {
            Ok(Ok(status)) => status,
            Ok(Err(err)) => {
                self.mark_failed(job.id).await;
                return Err(WorkerError::TranscodeFailed(format!("wait failed: {err}")));
            }
            Err(_) => {
                let _ = child.kill().await;
                self.mark_failed(job.id).await;
                return Err(WorkerError::TranscodeFailed(format!(
                    "child did not exit within {EXIT_WAIT:?}"
                )));
            }
        };

        if !status.success() {
            self.mark_failed(job.id).await;
            return Err(WorkerError::TranscodeFailed(format!(
                "child exited with {status}"
            )));
        }

        self.record_output(job, &output).await
    }

    /// Stream progress lines until stderr closes or the projection trips
    /// the abort. `Some(outcome)` means the job already reached a final
    /// state here.
    async fn watch_stderr(
        &self,
        job: &VideoJob,
        child: &mut Child,
        total_duration: f64,
    ) -> crate::error::Result<Option<RunOutcome>> {
        let Some(stderr) = child.stderr.take() else {
            return Ok(None);
        };
        let mut lines = BufReader::new(stderr).lines();

        while let Ok(Some(line)) = lines.next_line().await {
            if !line.contains("frame=") {
                continue;
            }

            // Progress writes are best-effort; the encode matters more.
            if let Err(err) = self.repo.update_progress(job.id, line.trim()).await {
                warn!(job = job.id, "progress write failed: {err}");
            }

            let Some(sample) = self.parser.parse_line(&line) else {
                continue;
            };
            let Some(projected) = project_final_size(sample, total_duration) else {
                continue;
            };

            if let Err(err) = self
                .repo
                .update_estimated_size(job.id, projected as i64)
                .await
            {
                warn!(job = job.id, "estimate write failed: {err}");
            }

            let ratio = reduction_ratio(projected, job.original_size);
            if below_threshold(ratio, self.min_reduction_ratio) {
                info!(
                    job = job.id,
                    projected = projected as i64,
                    ratio = %format!("{:.1}%", ratio * 100.0),
                    "projected reduction below threshold, aborting"
                );
                self.stop_child(child).await;
                self.repo
                    .transition(job.id, VideoStatus::Ready, VideoStatus::ReConfirmed)
                    .await?;
                return Ok(Some(RunOutcome::Aborted));
            }
        }

        Ok(None)
    }

    /// Ask the encoder to quit (it honors `q` on stdin), then escalate
    /// to a kill after the grace period.
    async fn stop_child(&self, child: &mut Child) {
        if let Some(mut stdin) = child.stdin.take() {
            let _ = stdin.write_all(b"q\n").await;
            let _ = stdin.shutdown().await;
        }
        if timeout(ABORT_GRACE, child.wait()).await.is_err() {
            warn!("child ignored quit request, killing");
            let _ = child.kill().await;
        }
    }

    async fn record_output(
        &self,
        job: &VideoJob,
        output: &Path,
    ) -> crate::error::Result<RunOutcome> {
        let codec = match self.probe.codec_name(output).await {
            Ok(codec) => codec,
            Err(err) => {
                self.mark_failed(job.id).await;
                return Err(WorkerError::TranscodeFailed(format!(
                    "output probe failed: {err}"
                )));
            }
        };
        let size = match tokio::fs::metadata(output).await {
            Ok(metadata) => metadata.len() as i64,
            Err(err) => {
                self.mark_failed(job.id).await;
                return Err(WorkerError::TranscodeFailed(format!(
                    "output missing after success: {err}"
                )));
            }
        };

        let moved = self
            .repo
            .update_final_output(job.id, &output.to_string_lossy(), &codec, size)
            .await?;
        if moved {
            info!(
                job = job.id,
                size,
                codec = %codec,
                "optimized output recorded"
            );
        } else {
            warn!(job = job.id, "job left ready state mid-transcode");
        }
        Ok(RunOutcome::Optimized)
    }

    fn output_path(&self, input: &Path) -> crate::error::Result<PathBuf> {
        let name = input
            .file_name()
            .ok_or_else(|| WorkerError::InputMissing(input.to_path_buf()))?;
        Ok(self.output_dir.join(name))
    }

    async fn mark_failed(&self, id: i64) {
        if let Err(err) = self
            .repo
            .transition(id, VideoStatus::Ready, VideoStatus::Failed)
            .await
        {
            error!(job = id, "could not mark job failed: {err}");
        }
    }
}

/// Split the stored invocation on whitespace and substitute both
/// placeholders. Commands missing either placeholder are rejected.
fn build_argv(command: &str, input: &Path, output: &Path) -> crate::error::Result<Vec<String>> {
    let mut argv: Vec<String> = command.split_whitespace().map(str::to_string).collect();
    if argv.is_empty() {
        return Err(WorkerError::CommandInvalid("empty command".to_string()));
    }

    let mut saw_input = false;
    let mut saw_output = false;
    for token in argv.iter_mut() {
        if token == INPUT_PLACEHOLDER {
            *token = input.to_string_lossy().into_owned();
            saw_input = true;
        } else if token == OUTPUT_PLACEHOLDER {
            *token = output.to_string_lossy().into_owned();
            saw_output = true;
        }
    }

    if !saw_input || !saw_output {
        return Err(WorkerError::CommandInvalid(format!(
            "command must contain both {INPUT_PLACEHOLDER} and {OUTPUT_PLACEHOLDER} placeholders"
        )));
    }
    Ok(argv)
}

#[async_trait]
impl<P: MediaProbe> WorkerLoop for Transcoder<P> {
    fn name(&self) -> &'static str {
        "transcoder"
    }

    async fn tick(&mut self) -> Result<Tick> {
        let Some(job) = self.repo.next_ready().await? else {
            return Ok(Tick::Idle);
        };

        match self.process(&job).await {
            // An early abort is a scheduling decision, not a failure.
            Ok(_) => Ok(Tick::Worked),
            Err(err) => Err(err.into()),
        }
    }
}
