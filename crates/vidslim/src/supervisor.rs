//! Workflow supervisor.
//!
//! Initializes the store schema once, then spawns the requested worker
//! loops, each with its own store connection. An interrupt lets every
//! loop finish its current job before the process exits cleanly; a loop
//! that spends its failure budget takes the whole process down with a
//! non-zero exit so an external supervisor restarts it.

use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{error, info};
use vidslim_db::{ensure_schema, open_pool, JobRepo};
use vidslim_workers::{
    run_loop, Approver, Config, Ffprobe, LoopPolicy, Mover, OpenAiModel, Scanner, Synthesizer,
    Transcoder,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Scanner,
    Approver,
    Synthesizer,
    Transcoder,
    Mover,
}

pub const ALL_ROLES: [Role; 5] = [
    Role::Scanner,
    Role::Approver,
    Role::Synthesizer,
    Role::Transcoder,
    Role::Mover,
];

pub async fn run(config: &Config, roles: &[Role]) -> Result<()> {
    let settings = config.db_settings();

    // Schema init runs once up front; the exclusive transaction inside
    // serializes against any sibling process doing the same.
    let pool = open_pool(&settings).await?;
    ensure_schema(&pool)
        .await
        .context("store schema initialization")?;
    pool.close().await;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut set: JoinSet<Result<()>> = JoinSet::new();

    for role in roles {
        let pool = open_pool(&settings).await?;
        let repo = JobRepo::new(pool, &settings);
        let shutdown = shutdown_rx.clone();

        match role {
            Role::Scanner => {
                let scanner = Scanner::new(repo, Ffprobe::default(), config.video_dir.clone());
                set.spawn(run_loop(scanner, policy(config, config.scan_interval), shutdown));
            }
            Role::Approver => {
                let approver = Approver::new(
                    repo,
                    config.auto_confirmed,
                    config.auto_accept,
                    config.confirm_batch_size,
                );
                set.spawn(run_loop(
                    approver,
                    policy(config, config.confirm_interval),
                    shutdown,
                ));
            }
            Role::Synthesizer => {
                let api_key = config
                    .openai_api_key
                    .clone()
                    .filter(|key| !key.trim().is_empty())
                    .context("OPENAI_API_KEY is required to run the command synthesizer")?;
                let model = OpenAiModel::new(
                    config.openai_base_url.clone(),
                    api_key,
                    config.ai_model.clone(),
                );
                let synthesizer = Synthesizer::new(
                    repo,
                    model,
                    config.ai_batch_size,
                    config.prompt_path.clone(),
                    config.host_overrides(),
                );
                set.spawn(run_loop(
                    synthesizer,
                    policy(config, config.ai_interval),
                    shutdown,
                ));
            }
            Role::Transcoder => {
                let transcoder = Transcoder::new(
                    repo,
                    Ffprobe::default(),
                    config.output_dir.clone(),
                    config.min_reduction_ratio,
                );
                set.spawn(run_loop(
                    transcoder,
                    policy(config, config.sleep_interval),
                    shutdown,
                ));
            }
            Role::Mover => {
                let mover = Mover::new(repo, config.replace_batch_size);
                set.spawn(run_loop(
                    mover,
                    policy(config, config.replace_interval),
                    shutdown,
                ));
            }
        }
    }
    drop(shutdown_rx);

    let mut failure: Option<anyhow::Error> = None;
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("interrupt received, finishing current work");
                let _ = shutdown_tx.send(true);
            }
            joined = set.join_next() => {
                match joined {
                    None => break,
                    Some(Ok(Ok(()))) => {}
                    Some(Ok(Err(err))) => {
                        error!("worker loop failed: {err:#}");
                        if failure.is_none() {
                            failure = Some(err);
                        }
                        let _ = shutdown_tx.send(true);
                    }
                    Some(Err(join_err)) => {
                        error!("worker task aborted: {join_err}");
                        if failure.is_none() {
                            failure = Some(anyhow::anyhow!("worker task aborted: {join_err}"));
                        }
                        let _ = shutdown_tx.send(true);
                    }
                }
            }
        }
    }

    match failure {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

fn policy(config: &Config, interval_secs: u64) -> LoopPolicy {
    LoopPolicy {
        interval: Duration::from_secs(interval_secs),
        retry_delay: Duration::from_secs(config.process_retry_delay),
        max_retry_delay: Duration::from_secs(config.max_retry_delay),
        max_consecutive_errors: config.max_consecutive_errors.max(1),
    }
}
