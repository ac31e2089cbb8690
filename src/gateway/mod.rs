//! Execution gateway seam
//!
//! The core never places or cancels orders itself: buys and exit
//! recommendations go out through [`ExecutionGateway`], and realized outcomes
//! come back as [`TradeClosed`] events that drive pool settlement. The
//! [`PaperGateway`] simulates fills for dry-run sessions; a real gateway
//! would wrap the swap-execution layer behind the same trait.

use async_trait::async_trait;
use rand::Rng;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::analyzer::ExitTier;
use crate::error::{Error, Result};

/// Advisory exit guidance forwarded to the gateway
#[derive(Debug, Clone)]
pub enum ExitRecommendation {
    /// Replace the position's exit plan with these tiers
    TierPlan(Vec<ExitTier>),
    /// The hold deadline was extended; exit timing moves out accordingly
    Extension {
        additional_minutes: u64,
        confidence: f64,
    },
    /// The hold budget ran out; begin winding the position down
    HoldExpired,
}

/// Realized outcome reported back by the gateway
#[derive(Debug, Clone)]
pub struct TradeClosed {
    pub mint: String,
    pub pnl_pct: f64,
    pub hold_minutes: f64,
}

/// Outbound trading surface
#[async_trait]
pub trait ExecutionGateway: Send + Sync {
    /// Place a buy order. The return value acknowledges placement with the
    /// quoted entry price; it is not a fill confirmation.
    async fn request_buy(&self, mint: &str, amount_sol: f64) -> Result<f64>;

    /// Forward an exit recommendation. Advisory only - the gateway owns
    /// actual order management and cancellation.
    async fn recommend_exit(&self, mint: &str, recommendation: ExitRecommendation) -> Result<()>;
}

/// Simulated gateway for dry-run sessions.
///
/// Buys are acknowledged instantly at a synthetic entry price and each
/// position is closed after a randomized hold with a randomized outcome.
/// Randomness lives only here, on the execution side; decision logic
/// upstream stays deterministic.
pub struct PaperGateway {
    closed_tx: mpsc::Sender<TradeClosed>,
    min_hold_secs: u64,
    max_hold_secs: u64,
}

impl PaperGateway {
    pub fn new(closed_tx: mpsc::Sender<TradeClosed>) -> Self {
        Self {
            closed_tx,
            min_hold_secs: 30,
            max_hold_secs: 180,
        }
    }

    /// Shrink the simulated hold window (tests)
    pub fn with_hold_secs(mut self, min: u64, max: u64) -> Self {
        self.min_hold_secs = min;
        self.max_hold_secs = max.max(min + 1);
        self
    }
}

#[async_trait]
impl ExecutionGateway for PaperGateway {
    async fn request_buy(&self, mint: &str, amount_sol: f64) -> Result<f64> {
        let (entry_price, hold_secs, pnl_pct) = {
            let mut rng = rand::thread_rng();
            (
                rng.gen_range(0.000001..0.01),
                rng.gen_range(self.min_hold_secs..self.max_hold_secs),
                rng.gen_range(-80.0..300.0),
            )
        };

        info!(
            "[paper] buy {} SOL of {} @ {:.6}, closing in {}s",
            amount_sol, mint, entry_price, hold_secs
        );

        let closed_tx = self.closed_tx.clone();
        let mint = mint.to_string();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(hold_secs)).await;
            let closed = TradeClosed {
                mint,
                pnl_pct,
                hold_minutes: hold_secs as f64 / 60.0,
            };
            if closed_tx.send(closed).await.is_err() {
                warn!("[paper] settlement channel closed before trade close");
            }
        });

        Ok(entry_price)
    }

    async fn recommend_exit(&self, mint: &str, recommendation: ExitRecommendation) -> Result<()> {
        match recommendation {
            ExitRecommendation::TierPlan(tiers) => {
                debug!("[paper] {}: new exit plan with {} tiers", mint, tiers.len());
            }
            ExitRecommendation::Extension {
                additional_minutes,
                confidence,
            } => {
                debug!(
                    "[paper] {}: hold extended {}m (confidence {:.0})",
                    mint, additional_minutes, confidence
                );
            }
            ExitRecommendation::HoldExpired => {
                debug!("[paper] {}: hold budget exhausted", mint);
            }
        }
        Ok(())
    }
}
