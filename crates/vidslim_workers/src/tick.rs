//! Shared worker loop harness.
//!
//! Every worker is an independent actor alternating between one unit of
//! work (a tick) and a sleep. The harness owns the failure policy: a
//! tick error is logged and backed off exponentially, and once the
//! consecutive-failure budget is spent the loop returns an error so the
//! process can exit non-zero for an external supervisor to restart.

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::watch;
use tracing::{error, info};

/// What a tick accomplished. `Worked` ticks skip the interval sleep so
/// a backlog drains at full speed; `Idle` ticks wait out the interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    Worked,
    Idle,
}

/// One worker loop body.
#[async_trait]
pub trait WorkerLoop: Send {
    fn name(&self) -> &'static str;

    async fn tick(&mut self) -> Result<Tick>;
}

/// Per-loop scheduling and failure policy.
#[derive(Debug, Clone, Copy)]
pub struct LoopPolicy {
    /// Sleep between idle ticks.
    pub interval: Duration,
    /// Base backoff delay after a failed tick.
    pub retry_delay: Duration,
    /// Backoff ceiling.
    pub max_retry_delay: Duration,
    /// Consecutive failed ticks before the loop gives up.
    pub max_consecutive_errors: u32,
}

impl LoopPolicy {
    fn backoff(&self, consecutive_errors: u32) -> Duration {
        let exp = consecutive_errors.min(16);
        let delay = self
            .retry_delay
            .saturating_mul(2u32.saturating_pow(exp));
        delay.min(self.max_retry_delay)
    }
}

/// Drive `worker` until shutdown is signalled or its failure budget is
/// spent. The current tick always finishes before the loop exits.
pub async fn run_loop<W: WorkerLoop>(
    mut worker: W,
    policy: LoopPolicy,
    mut shutdown: watch::Receiver<bool>,
) -> Result<()> {
    let name = worker.name();
    let mut consecutive_errors: u32 = 0;
    info!(worker = name, "loop started");

    loop {
        if *shutdown.borrow() {
            break;
        }

        match worker.tick().await {
            Ok(Tick::Worked) => {
                consecutive_errors = 0;
                continue;
            }
            Ok(Tick::Idle) => {
                consecutive_errors = 0;
                if sleep_or_shutdown(policy.interval, &mut shutdown).await {
                    break;
                }
            }
            Err(err) => {
                consecutive_errors += 1;
                error!(
                    worker = name,
                    consecutive = consecutive_errors,
                    max = policy.max_consecutive_errors,
                    "tick failed: {err:#}"
                );
                if consecutive_errors >= policy.max_consecutive_errors {
                    return Err(err.context(format!(
                        "{name}: {consecutive_errors} consecutive failures, giving up"
                    )));
                }
                let delay = policy.backoff(consecutive_errors);
                info!(worker = name, "retrying in {delay:?}");
                if sleep_or_shutdown(delay, &mut shutdown).await {
                    break;
                }
            }
        }
    }

    info!(worker = name, "loop stopped");
    Ok(())
}

/// Returns true when shutdown was requested during the sleep.
async fn sleep_or_shutdown(delay: Duration, shutdown: &mut watch::Receiver<bool>) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(delay) => *shutdown.borrow(),
        changed = shutdown.changed() => changed.is_err() || *shutdown.borrow(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    struct FlakyWorker {
        ticks: Arc<AtomicU32>,
        fail: bool,
    }

    #[async_trait]
    impl WorkerLoop for FlakyWorker {
        fn name(&self) -> &'static str {
            "flaky"
        }

        async fn tick(&mut self) -> Result<Tick> {
            self.ticks.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                anyhow::bail!("boom");
            }
            Ok(Tick::Idle)
        }
    }

    fn fast_policy() -> LoopPolicy {
        LoopPolicy {
            interval: Duration::from_millis(5),
            retry_delay: Duration::from_millis(1),
            max_retry_delay: Duration::from_millis(4),
            max_consecutive_errors: 3,
        }
    }

    #[tokio::test]
    async fn failing_loop_gives_up_after_budget() {
        let ticks = Arc::new(AtomicU32::new(0));
        let (_tx, rx) = watch::channel(false);
        let worker = FlakyWorker {
            ticks: ticks.clone(),
            fail: true,
        };

        let result = run_loop(worker, fast_policy(), rx).await;
        assert!(result.is_err());
        assert_eq!(ticks.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn shutdown_stops_a_healthy_loop() {
        let ticks = Arc::new(AtomicU32::new(0));
        let (tx, rx) = watch::channel(false);
        let worker = FlakyWorker {
            ticks: ticks.clone(),
            fail: false,
        };

        let handle = tokio::spawn(run_loop(worker, fast_policy(), rx));
        tokio::time::sleep(Duration::from_millis(20)).await;
        tx.send(true).unwrap();
        let result = handle.await.unwrap();
        assert!(result.is_ok());
        assert!(ticks.load(Ordering::SeqCst) >= 1);
    }

    #[test]
    fn backoff_is_exponential_and_capped() {
        let policy = LoopPolicy {
            interval: Duration::from_secs(30),
            retry_delay: Duration::from_secs(30),
            max_retry_delay: Duration::from_secs(300),
            max_consecutive_errors: 3,
        };
        assert_eq!(policy.backoff(1), Duration::from_secs(60));
        assert_eq!(policy.backoff(2), Duration::from_secs(120));
        assert_eq!(policy.backoff(3), Duration::from_secs(240));
        assert_eq!(policy.backoff(4), Duration::from_secs(300));
        assert_eq!(policy.backoff(10), Duration::from_secs(300));
    }
}
