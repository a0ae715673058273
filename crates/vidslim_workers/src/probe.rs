//! Media probing seam.
//!
//! The scanner and the transcoder post-check both shell out to ffprobe;
//! tests substitute the trait with canned reports.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use serde_json::Value;
use tokio::process::Command;

use crate::error::{Result, WorkerError};

/// What the scanner stores about a freshly discovered file.
#[derive(Debug, Clone)]
pub struct ProbeReport {
    /// The container-level `format` object, verbatim JSON.
    pub format_json: String,
    /// Codec of the first video stream, `"unknown"` when absent.
    pub codec_name: String,
}

impl ProbeReport {
    /// Container duration in seconds, 0.0 when the probe did not report
    /// one. The same field is read back out of a stored job's
    /// `ffprobe_data` by the transcoder.
    pub fn duration_secs(&self) -> f64 {
        duration_from_format_json(&self.format_json)
    }
}

/// Parse `duration` out of a stored `format` JSON blob. ffprobe reports
/// it as a string; tolerate a bare number too.
pub fn duration_from_format_json(format_json: &str) -> f64 {
    let Ok(value) = serde_json::from_str::<Value>(format_json) else {
        return 0.0;
    };
    match value.get("duration") {
        Some(Value::String(s)) => s.trim().parse().unwrap_or(0.0),
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        _ => 0.0,
    }
}

#[async_trait]
pub trait MediaProbe: Send + Sync {
    /// Full probe used at discovery time.
    async fn probe(&self, path: &Path) -> Result<ProbeReport>;

    /// Codec-only probe used on transcoder outputs.
    async fn codec_name(&self, path: &Path) -> Result<String>;
}

/// ffprobe binary invocation.
#[derive(Debug, Clone)]
pub struct Ffprobe {
    binary: PathBuf,
}

impl Default for Ffprobe {
    fn default() -> Self {
        Self {
            binary: PathBuf::from("ffprobe"),
        }
    }
}

impl Ffprobe {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    async fn run(&self, args: &[&str], path: &Path) -> Result<Vec<u8>> {
        let output = Command::new(&self.binary)
            .args(args)
            .arg(path)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|err| WorkerError::ProbeFailed {
                path: path.to_path_buf(),
                reason: format!("failed to run {}: {err}", self.binary.display()),
            })?;

        if !output.status.success() {
            return Err(WorkerError::ProbeFailed {
                path: path.to_path_buf(),
                reason: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(output.stdout)
    }
}

#[async_trait]
impl MediaProbe for Ffprobe {
    async fn probe(&self, path: &Path) -> Result<ProbeReport> {
        let stdout = self
            .run(
                &[
                    "-v",
                    "error",
                    "-show_format",
                    "-show_streams",
                    "-select_streams",
                    "v:0",
                    "-show_entries",
                    "stream=codec_name",
                    "-print_format",
                    "json",
                ],
                path,
            )
            .await?;

        let value: Value =
            serde_json::from_slice(&stdout).map_err(|err| WorkerError::ProbeFailed {
                path: path.to_path_buf(),
                reason: format!("unparseable probe output: {err}"),
            })?;

        let format_json = value
            .get("format")
            .map(|format| format.to_string())
            .unwrap_or_else(|| "{}".to_string());
        let codec_name = value
            .get("streams")
            .and_then(|streams| streams.get(0))
            .and_then(|stream| stream.get("codec_name"))
            .and_then(|codec| codec.as_str())
            .unwrap_or("unknown")
            .to_string();

        Ok(ProbeReport {
            format_json,
            codec_name,
        })
    }

    async fn codec_name(&self, path: &Path) -> Result<String> {
        let stdout = self
            .run(
                &[
                    "-v",
                    "error",
                    "-select_streams",
                    "v:0",
                    "-show_entries",
                    "stream=codec_name",
                    "-of",
                    "default=noprint_wrappers=1:nokey=1",
                ],
                path,
            )
            .await?;

        let codec = String::from_utf8_lossy(&stdout)
            .lines()
            .next()
            .unwrap_or("unknown")
            .trim()
            .to_string();
        Ok(if codec.is_empty() {
            "unknown".to_string()
        } else {
            codec
        })
    }
}
