//! Periodic status reporting
//!
//! Queue counts and the pool summary are the externally observable health
//! signal of the pipeline; individual rejections never surface as failures.

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::ReportConfig;
use crate::pool::CapacityPool;
use crate::position::PositionBook;
use crate::queue::AdmissionQueue;

pub struct StatusReporter {
    pool: Arc<CapacityPool>,
    queue: Arc<AdmissionQueue>,
    book: Arc<PositionBook>,
    config: ReportConfig,
}

impl StatusReporter {
    pub fn new(
        pool: Arc<CapacityPool>,
        queue: Arc<AdmissionQueue>,
        book: Arc<PositionBook>,
        config: ReportConfig,
    ) -> Self {
        Self {
            pool,
            queue,
            book,
            config,
        }
    }

    pub fn spawn(self, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(self.config.interval_secs));
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = interval.tick() => {}
                }
                self.report().await;
            }
            info!("status reporter stopped");
        })
    }

    /// Emit one status snapshot
    pub async fn report(&self) {
        let counts = self.queue.status_counts().await;
        let pool = self.pool.summary().await;

        info!(
            pending = counts.pending,
            analyzing = counts.analyzing,
            bought = counts.bought,
            rejected = counts.rejected,
            pool_depleted = counts.pool_depleted,
            profit = counts.profit,
            loss = counts.loss,
            "queue status"
        );
        info!(
            balance = pool.balance,
            roi_pct = pool.roi_pct,
            win_rate_pct = pool.win_rate_pct,
            trades = pool.total_trades,
            peak = pool.peak_balance,
            trough = pool.trough_balance,
            target_progress_pct = pool.target_progress_pct,
            open_positions = self.book.len(),
            can_fund = pool.can_fund,
            "pool status"
        );

        for position in self.book.summaries() {
            info!(
                "  open {} | gain {:+.1}% | held {:.1}m of {}m",
                position.mint, position.gain_pct, position.hold_minutes, position.max_hold_minutes
            );
        }
    }
}
