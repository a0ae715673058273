//! Shared logging setup for vidslim binaries.
//!
//! Stderr always gets a formatted layer; when a log directory is
//! configured, a second non-blocking layer writes the same events to a
//! daily-rolled file so long-running deployments keep bounded,
//! dated history.

use std::path::Path;

use anyhow::{Context, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

const DEFAULT_LOG_FILTER: &str = "vidslim=info,vidslim_db=info,vidslim_workers=info";

/// Initialize tracing. `RUST_LOG` overrides the default filter.
///
/// Returns the file writer's flush guard when a log directory is
/// configured; the caller keeps it alive for the life of the process so
/// buffered events reach disk on shutdown.
pub fn init(app_name: &str, log_dir: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let mut guard = None;
    let file_layer = match log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("creating log directory {}", dir.display()))?;
            let file_appender = tracing_appender::rolling::daily(dir, format!("{app_name}.log"));
            let (file_writer, file_guard) = tracing_appender::non_blocking(file_appender);
            guard = Some(file_guard);
            Some(
                tracing_subscriber::fmt::layer()
                    .with_writer(file_writer)
                    .with_ansi(false)
                    .with_filter(env_filter()),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(file_layer)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_filter(env_filter()),
        )
        .init();

    Ok(guard)
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER))
}
