//! Position monitoring
//!
//! One loop consumes price/volume ticks for open positions, runs the signal
//! analyzer and forwards hold extensions or exit-tier plans to the gateway.
//! A second loop consumes `TradeClosed` events from the gateway, settles the
//! pool and archives the candidate. Exit timing is advisory throughout -
//! order management stays with the gateway.

use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::PositionBook;
use crate::analyzer::history::TickSample;
use crate::analyzer::SignalAnalyzer;
use crate::error::Result;
use crate::gateway::{ExecutionGateway, ExitRecommendation, TradeClosed};
use crate::pool::CapacityPool;
use crate::queue::AdmissionQueue;

/// One price/volume observation for an open position
#[derive(Debug, Clone)]
pub struct PriceTick {
    pub mint: String,
    pub price: f64,
    /// Traded volume attributed to this tick, in SOL
    pub volume: f64,
    /// Portion of `volume` from whale-sized single trades
    pub whale_volume: f64,
}

/// Tick consumer driving the analyzer for every open position
pub struct PositionMonitor {
    book: Arc<PositionBook>,
    analyzer: Arc<SignalAnalyzer>,
    gateway: Arc<dyn ExecutionGateway>,
}

impl PositionMonitor {
    pub fn new(
        book: Arc<PositionBook>,
        analyzer: Arc<SignalAnalyzer>,
        gateway: Arc<dyn ExecutionGateway>,
    ) -> Self {
        Self {
            book,
            analyzer,
            gateway,
        }
    }

    pub fn spawn(
        self,
        tick_rx: mpsc::Receiver<PriceTick>,
        shutdown: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(async move { self.run(tick_rx, shutdown).await })
    }

    async fn run(self, mut tick_rx: mpsc::Receiver<PriceTick>, shutdown: CancellationToken) {
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                tick = tick_rx.recv() => match tick {
                    Some(tick) => self.handle_tick(tick).await,
                    None => break,
                },
            }
        }
        info!("position monitor stopped");
    }

    async fn handle_tick(&self, tick: PriceTick) {
        let now = Instant::now();
        let sample = TickSample {
            at: now,
            price: tick.price,
            volume: tick.volume,
            whale_volume: tick.whale_volume,
        };

        // Ticks for mints we do not hold are dropped at the door
        if !self.book.record_tick(&tick.mint, sample) {
            return;
        }

        let decision = match self.book.analyze(&tick.mint, &self.analyzer, now) {
            Some(decision) => decision,
            None => return,
        };

        if decision.should_hold && decision.extend_minutes > 0 {
            if let Some(new_deadline) = self.book.extend_hold(&tick.mint, decision.extend_minutes) {
                debug!(
                    "{}: hold extended {}m -> {}m total (confidence {:.0}, {} signals)",
                    tick.mint,
                    decision.extend_minutes,
                    new_deadline,
                    decision.confidence,
                    decision.signals.len()
                );
                let recommendation = ExitRecommendation::Extension {
                    additional_minutes: decision.extend_minutes,
                    confidence: decision.confidence,
                };
                if let Err(e) = self.gateway.recommend_exit(&tick.mint, recommendation).await {
                    warn!("{}: extension recommendation failed: {}", tick.mint, e);
                }
            }
        } else {
            let recommendation = ExitRecommendation::TierPlan(decision.suggested_exit_tiers);
            if let Err(e) = self.gateway.recommend_exit(&tick.mint, recommendation).await {
                warn!("{}: exit recommendation failed: {}", tick.mint, e);
            }
        }

        // The hold budget itself stays advisory: flag expiry, never force
        if self.book.is_expired(&tick.mint, now) {
            if let Err(e) = self
                .gateway
                .recommend_exit(&tick.mint, ExitRecommendation::HoldExpired)
                .await
            {
                warn!("{}: expiry recommendation failed: {}", tick.mint, e);
            }
        }
    }
}

/// Settlement callback consumer: reconciles realized outcomes into the pool
pub struct SettlementListener {
    pool: Arc<CapacityPool>,
    book: Arc<PositionBook>,
    queue: Arc<AdmissionQueue>,
}

impl SettlementListener {
    pub fn new(
        pool: Arc<CapacityPool>,
        book: Arc<PositionBook>,
        queue: Arc<AdmissionQueue>,
    ) -> Self {
        Self { pool, book, queue }
    }

    pub fn spawn(
        self,
        closed_rx: mpsc::Receiver<TradeClosed>,
        shutdown: CancellationToken,
    ) -> JoinHandle<Result<()>> {
        tokio::spawn(async move { self.run(closed_rx, shutdown).await })
    }

    async fn run(
        self,
        mut closed_rx: mpsc::Receiver<TradeClosed>,
        shutdown: CancellationToken,
    ) -> Result<()> {
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                closed = closed_rx.recv() => match closed {
                    Some(closed) => self.settle(closed).await?,
                    None => break,
                },
            }
        }
        info!("settlement listener stopped");
        Ok(())
    }

    async fn settle(&self, closed: TradeClosed) -> Result<()> {
        if self.book.remove(&closed.mint).is_none() {
            warn!("{}: trade close for unknown position", closed.mint);
        }

        let settlement = self
            .pool
            .settle(closed.pnl_pct, closed.hold_minutes)
            .await?;
        let status = self.queue.mark_closed(&closed.mint, closed.pnl_pct).await;

        info!(
            "{}: closed {:?} ({:+.1}%, {:+.2} SOL, held {:.1}m) - pool {:.2} SOL",
            closed.mint,
            status,
            closed.pnl_pct,
            settlement.delta,
            closed.hold_minutes,
            settlement.balance_after
        );

        Ok(())
    }
}
