//! Shared fixtures for worker integration tests.
#![allow(dead_code)]

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use vidslim_db::{ensure_schema, open_memory_pool, DbSettings, JobRepo};
use vidslim_workers::error::{Result, WorkerError};
use vidslim_workers::probe::{MediaProbe, ProbeReport};

pub async fn test_repo() -> JobRepo {
    let pool = open_memory_pool().await.unwrap();
    ensure_schema(&pool).await.unwrap();
    JobRepo::new(pool, &DbSettings::default())
}

/// Canned probe: every file reports the same format blob and codec,
/// except paths listed in `fail_for`, which probe as broken.
pub struct MockProbe {
    pub format_json: String,
    pub codec: String,
    pub output_codec: String,
    pub fail_for: Vec<PathBuf>,
}

impl Default for MockProbe {
    fn default() -> Self {
        Self {
            format_json: r#"{"duration":"100"}"#.to_string(),
            codec: "h264".to_string(),
            output_codec: "hevc".to_string(),
            fail_for: Vec::new(),
        }
    }
}

#[async_trait]
impl MediaProbe for MockProbe {
    async fn probe(&self, path: &Path) -> Result<ProbeReport> {
        if self.fail_for.iter().any(|p| p == path) {
            return Err(WorkerError::ProbeFailed {
                path: path.to_path_buf(),
                reason: "moov atom not found".to_string(),
            });
        }
        Ok(ProbeReport {
            format_json: self.format_json.clone(),
            codec_name: self.codec.clone(),
        })
    }

    async fn codec_name(&self, _path: &Path) -> Result<String> {
        Ok(self.output_codec.clone())
    }
}

/// Write an executable shell script standing in for the encoder.
#[cfg(unix)]
pub fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join(name);
    std::fs::write(&path, body).unwrap();
    let mut perms = std::fs::metadata(&path).unwrap().permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(&path, perms).unwrap();
    path
}
