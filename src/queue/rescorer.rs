//! Background rescorer
//!
//! Periodically retries candidates left `pending` by transient data
//! failures, bounded by the per-candidate attempt budget and gated on pool
//! availability. A sweep walks its batch sequentially with a pause between
//! attempts and aborts the moment the pool cannot fund a trade; the next
//! scheduled tick picks up where it left off.

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::AdmissionQueue;
use crate::config::RescorerConfig;
use crate::error::Result;
use crate::pool::CapacityPool;

pub struct BackgroundRescorer {
    queue: Arc<AdmissionQueue>,
    pool: Arc<CapacityPool>,
    config: RescorerConfig,
}

impl BackgroundRescorer {
    pub fn new(
        queue: Arc<AdmissionQueue>,
        pool: Arc<CapacityPool>,
        config: RescorerConfig,
    ) -> Self {
        Self {
            queue,
            pool,
            config,
        }
    }

    /// Start the periodic task. Resolves only on shutdown or a fatal error.
    pub fn spawn(self, shutdown: CancellationToken) -> JoinHandle<Result<()>> {
        tokio::spawn(async move { self.run(shutdown).await })
    }

    async fn run(self, shutdown: CancellationToken) -> Result<()> {
        let mut interval = tokio::time::interval(Duration::from_secs(self.config.interval_secs));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("rescorer stopped");
                    return Ok(());
                }
                _ = interval.tick() => {}
            }
            self.sweep(&shutdown).await?;
        }
    }

    async fn sweep(&self, shutdown: &CancellationToken) -> Result<()> {
        let cooldown = Duration::from_secs(self.config.retry_cooldown_secs);
        let due = self
            .queue
            .rescore_due(self.config.max_attempts, cooldown)
            .await;

        if due.is_empty() {
            return Ok(());
        }

        if !self.pool.can_fund().await {
            debug!("sweep skipped: pool depleted");
            return Ok(());
        }

        info!("rescoring {} pending candidates", due.len());

        for mint in due {
            if shutdown.is_cancelled() {
                return Ok(());
            }
            if !self.pool.can_fund().await {
                debug!("sweep aborted: pool depleted");
                break;
            }

            self.queue.run_stage1(&mint).await?;
            tokio::time::sleep(Duration::from_millis(self.config.retry_pause_ms)).await;
        }

        Ok(())
    }
}
