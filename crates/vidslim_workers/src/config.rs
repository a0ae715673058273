//! Pipeline configuration.
//!
//! Every knob is a long flag backed by the environment variable the
//! deployment sets; the struct is parsed once at startup and handed to
//! workers by value.

use std::path::PathBuf;
use std::time::Duration;

use vidslim_db::DbSettings;

use crate::hostinfo::HostOverrides;

#[derive(Debug, Clone, clap::Args)]
pub struct Config {
    /// Store file path
    #[arg(long, env = "DB_PATH", default_value = "/data/video_db.sqlite")]
    pub db_path: PathBuf,

    /// Seconds a blocked writer waits before failing
    #[arg(long, env = "DB_TIMEOUT", default_value_t = 30)]
    pub db_timeout: u64,

    /// Attempts per write when the store is busy
    #[arg(long, env = "DB_MAX_RETRIES", default_value_t = 3)]
    pub db_max_retries: u32,

    /// Seconds between busy retries
    #[arg(long, env = "DB_RETRY_DELAY", default_value_t = 0.1)]
    pub db_retry_delay: f64,

    /// Directory tree scanned for video files
    #[arg(long, env = "VIDEO_DIR", default_value = "/video-input")]
    pub video_dir: PathBuf,

    /// Directory receiving transcoded outputs; must share a filesystem
    /// with the inputs so replacement can rename instead of copy
    #[arg(long, env = "OUTPUT_DIR", default_value = "/video-output")]
    pub output_dir: PathBuf,

    /// Seconds between scanner ticks
    #[arg(long, env = "SCAN_INTERVAL", default_value_t = 30)]
    pub scan_interval: u64,

    /// Seconds between approver ticks
    #[arg(long, env = "CONFIRM_INTERVAL", default_value_t = 60)]
    pub confirm_interval: u64,

    /// Rows promoted per approver pass
    #[arg(long, env = "CONFIRM_BATCH_SIZE", default_value_t = 10)]
    pub confirm_batch_size: i64,

    /// Automatically promote pending jobs to confirmed
    #[arg(long, env = "AUTO_CONFIRMED")]
    pub auto_confirmed: bool,

    /// Automatically promote optimized jobs to accepted
    #[arg(long, env = "AUTO_ACCEPT")]
    pub auto_accept: bool,

    /// Seconds between synthesizer ticks
    #[arg(long, env = "AI_INTERVAL", default_value_t = 10)]
    pub ai_interval: u64,

    /// Jobs synthesized per status bucket per tick
    #[arg(long, env = "AI_BATCH_SIZE", default_value_t = 3)]
    pub ai_batch_size: i64,

    /// Chat model name
    #[arg(long, env = "AI_MODEL", default_value = "gpt-4o-mini")]
    pub ai_model: String,

    /// Chat endpoint credential; required wherever the synthesizer runs
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    pub openai_api_key: Option<String>,

    /// Chat endpoint base URL
    #[arg(long, env = "OPENAI_BASE_URL", default_value = "https://api.openai.com/v1")]
    pub openai_base_url: String,

    /// Optional prompt override file
    #[arg(long, env = "PROMPT_PATH", default_value = "/data/prompt.txt")]
    pub prompt_path: PathBuf,

    /// Base seconds for transcoder failure backoff
    #[arg(long, env = "PROCESS_RETRY_DELAY", default_value_t = 30)]
    pub process_retry_delay: u64,

    /// Consecutive failed ticks before a worker exits
    #[arg(long, env = "MAX_CONSECUTIVE_ERRORS", default_value_t = 3)]
    pub max_consecutive_errors: u32,

    /// Minimum projected size reduction before a transcode is aborted
    #[arg(long, env = "MIN_REDUCTION_RATIO", default_value_t = 0.2)]
    pub min_reduction_ratio: f64,

    /// Seconds the transcoder sleeps when no job is ready
    #[arg(long, env = "SLEEP_INTERVAL", default_value_t = 10)]
    pub sleep_interval: u64,

    /// Backoff ceiling in seconds
    #[arg(long, env = "MAX_RETRY_DELAY", default_value_t = 300)]
    pub max_retry_delay: u64,

    /// Rows replaced per mover tick
    #[arg(long, env = "REPLACE_BATCH_SIZE", default_value_t = 5)]
    pub replace_batch_size: i64,

    /// Seconds between mover ticks
    #[arg(long, env = "REPLACE_INTERVAL", default_value_t = 10)]
    pub replace_interval: u64,

    /// Directory for daily-rolled log files; stderr only when unset
    #[arg(long, env = "LOG_DIR")]
    pub log_dir: Option<PathBuf>,

    /// Host overrides for command synthesis
    #[arg(long, env = "HOST_OS", hide = true)]
    pub host_os: Option<String>,
    #[arg(long, env = "HOST_OS_VERSION", hide = true)]
    pub host_os_version: Option<String>,
    #[arg(long, env = "HOST_CPU_MODEL", hide = true)]
    pub host_cpu_model: Option<String>,
    #[arg(long, env = "HOST_TOTAL_RAM", hide = true)]
    pub host_total_ram: Option<String>,
    #[arg(long, env = "HOST_GPU_MODEL", hide = true)]
    pub host_gpu_model: Option<String>,
}

impl Config {
    pub fn db_settings(&self) -> DbSettings {
        DbSettings {
            path: self.db_path.clone(),
            busy_timeout: Duration::from_secs(self.db_timeout),
            max_retries: self.db_max_retries,
            retry_delay: Duration::from_secs_f64(self.db_retry_delay),
        }
    }

    pub fn host_overrides(&self) -> HostOverrides {
        HostOverrides {
            os: self.host_os.clone(),
            os_version: self.host_os_version.clone(),
            cpu_model: self.host_cpu_model.clone(),
            total_ram: self.host_total_ram.clone(),
            gpu: self.host_gpu_model.clone(),
        }
    }
}
