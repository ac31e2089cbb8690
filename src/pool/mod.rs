//! Capacity pool: the single shared balance that funds every trade
//!
//! The pool is the unit of concurrency control for the whole pipeline. All
//! balance mutation funnels through exactly two operations - [`CapacityPool::allocate`]
//! and [`CapacityPool::settle`] - serialized by a single lock so that
//! check-then-act sequences are atomic across the admission pipeline, the
//! rescorer, and settlement callbacks. Allocation failure is a normal
//! control-flow branch (pool exhaustion), not an error.

pub mod ledger;

use chrono::Utc;
use serde::Serialize;
use std::path::PathBuf;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::config::PoolConfig;
use crate::error::Result;
use ledger::{Ledger, LedgerEntry, LedgerKind};

/// Balance milestones reported once each as the pool grows
const MILESTONES: &[f64] = &[
    1_000.0, 2_000.0, 5_000.0, 10_000.0, 15_000.0, 20_000.0, 25_000.0,
];

struct PoolInner {
    balance: f64,
    total_trades: u64,
    profitable_trades: u64,
    /// Explicit per-trade delta sum (never derived from balance)
    total_pnl: f64,
    peak_balance: f64,
    trough_balance: f64,
    next_milestone: usize,
    target_reached: bool,
    ledger: Ledger,
}

/// The shared capacity pool
pub struct CapacityPool {
    initial_balance: f64,
    position_size: f64,
    target: f64,
    inner: Mutex<PoolInner>,
}

/// Outcome of a settlement
#[derive(Debug, Clone)]
pub struct Settlement {
    /// Realized P&L for the trade, in SOL
    pub delta: f64,
    pub balance_after: f64,
    pub profitable: bool,
    /// True only on the first crossing of the configured target
    pub target_reached: bool,
}

/// Read-only snapshot for status reporting
#[derive(Debug, Clone, Serialize)]
pub struct PoolSummary {
    pub balance: f64,
    pub initial_balance: f64,
    pub position_size: f64,
    pub total_trades: u64,
    pub profitable_trades: u64,
    pub total_pnl: f64,
    pub roi_pct: f64,
    pub win_rate_pct: f64,
    pub peak_balance: f64,
    pub trough_balance: f64,
    pub target: f64,
    pub target_progress_pct: f64,
    /// Trades executed relative to what the initial balance alone could fund
    pub efficiency_pct: f64,
    pub can_fund: bool,
}

impl CapacityPool {
    /// Create the pool and record the opening status row
    pub async fn new(config: &PoolConfig) -> Result<Self> {
        let mut ledger = Ledger::open(config.ledger_path.clone().map(PathBuf::from)).await?;

        ledger
            .append(LedgerEntry {
                timestamp: Utc::now(),
                kind: LedgerKind::PoolStatus,
                amount: 0.0,
                balance_before: config.initial_balance_sol,
                balance_after: config.initial_balance_sol,
                trade_number: 0,
                note: format!(
                    "pool opened: {} SOL, {} SOL per position",
                    config.initial_balance_sol, config.position_size_sol
                ),
            })
            .await?;

        Ok(Self {
            initial_balance: config.initial_balance_sol,
            position_size: config.position_size_sol,
            target: config.target_balance_sol,
            inner: Mutex::new(PoolInner {
                balance: config.initial_balance_sol,
                total_trades: 0,
                profitable_trades: 0,
                total_pnl: 0.0,
                peak_balance: config.initial_balance_sol,
                trough_balance: config.initial_balance_sol,
                next_milestone: 0,
                target_reached: false,
                ledger,
            }),
        })
    }

    /// Per-trade position size, in SOL
    pub fn position_size(&self) -> f64 {
        self.position_size
    }

    /// Read-only funding pre-check; never mutates
    pub async fn can_fund(&self) -> bool {
        self.inner.lock().await.balance >= self.position_size
    }

    /// Reserve funds for one trade.
    ///
    /// Returns `Ok(false)` with zero side effects when the balance cannot
    /// cover one position - an expected, frequently-hit boundary condition.
    /// `Err` is reserved for ledger persistence failure.
    pub async fn allocate(&self) -> Result<bool> {
        let mut inner = self.inner.lock().await;

        if inner.balance < self.position_size {
            debug!(
                balance = inner.balance,
                needed = self.position_size,
                "allocation refused: pool depleted"
            );
            return Ok(false);
        }

        let before = inner.balance;
        inner.balance -= self.position_size;
        inner.total_trades += 1;
        inner.trough_balance = inner.trough_balance.min(inner.balance);

        let trade_number = inner.total_trades;
        let balance_after = inner.balance;
        inner
            .ledger
            .append(LedgerEntry {
                timestamp: Utc::now(),
                kind: LedgerKind::TradeExecution,
                amount: -self.position_size,
                balance_before: before,
                balance_after,
                trade_number,
                note: format!("trade #{} funded", trade_number),
            })
            .await?;

        debug!(
            trade = trade_number,
            balance = balance_after,
            "allocated {} SOL",
            self.position_size
        );
        Ok(true)
    }

    /// Return a position's funds plus realized P&L to the pool.
    ///
    /// Credits `position_size * (1 + pnl_pct/100)`. A compensating reversal
    /// after a failed buy is `settle(0.0, 0.0)`, which restores exactly the
    /// reserved amount.
    pub async fn settle(&self, pnl_pct: f64, hold_minutes: f64) -> Result<Settlement> {
        // A position cannot lose more than itself
        let pnl_pct = pnl_pct.max(-100.0);

        let mut inner = self.inner.lock().await;

        let delta = self.position_size * pnl_pct / 100.0;
        let credit = self.position_size + delta;
        let before = inner.balance;

        inner.balance += credit;
        inner.total_pnl += delta;
        inner.peak_balance = inner.peak_balance.max(inner.balance);
        inner.trough_balance = inner.trough_balance.min(inner.balance);

        let profitable = delta > 0.0;
        if profitable {
            inner.profitable_trades += 1;
        }

        let kind = if profitable {
            LedgerKind::ProfitReturn
        } else {
            LedgerKind::LossReturn
        };

        let trade_number = inner.total_trades;
        let balance_after = inner.balance;
        inner
            .ledger
            .append(LedgerEntry {
                timestamp: Utc::now(),
                kind,
                amount: credit,
                balance_before: before,
                balance_after,
                trade_number,
                note: format!(
                    "P&L {:+.2} SOL ({:+.1}%), held {:.1}m",
                    delta, pnl_pct, hold_minutes
                ),
            })
            .await?;

        // Milestone ladder, each reported once
        while inner.next_milestone < MILESTONES.len()
            && inner.balance >= MILESTONES[inner.next_milestone]
        {
            info!(
                balance = inner.balance,
                trades = inner.total_trades,
                "milestone reached: {} SOL",
                MILESTONES[inner.next_milestone]
            );
            inner.next_milestone += 1;
        }

        // Target crossing is reported exactly once per session
        let mut target_reached = false;
        if !inner.target_reached && inner.balance >= self.target {
            inner.target_reached = true;
            target_reached = true;
            let balance = inner.balance;
            inner
                .ledger
                .append(LedgerEntry {
                    timestamp: Utc::now(),
                    kind: LedgerKind::PoolStatus,
                    amount: 0.0,
                    balance_before: balance,
                    balance_after: balance,
                    trade_number,
                    note: format!("target {} SOL reached", self.target),
                })
                .await?;
            info!(
                balance = balance,
                trades = inner.total_trades,
                "pool target {} SOL reached",
                self.target
            );
        }

        Ok(Settlement {
            delta,
            balance_after,
            profitable,
            target_reached,
        })
    }

    /// Snapshot for the periodic report
    pub async fn summary(&self) -> PoolSummary {
        let inner = self.inner.lock().await;

        let roi_pct = if self.initial_balance > 0.0 {
            (inner.balance - self.initial_balance) / self.initial_balance * 100.0
        } else {
            0.0
        };
        let win_rate_pct = if inner.total_trades > 0 {
            inner.profitable_trades as f64 / inner.total_trades as f64 * 100.0
        } else {
            0.0
        };
        let max_unfunded_trades = (self.initial_balance / self.position_size).floor();
        let efficiency_pct = if max_unfunded_trades > 0.0 {
            inner.total_trades as f64 / max_unfunded_trades * 100.0
        } else {
            0.0
        };

        PoolSummary {
            balance: inner.balance,
            initial_balance: self.initial_balance,
            position_size: self.position_size,
            total_trades: inner.total_trades,
            profitable_trades: inner.profitable_trades,
            total_pnl: inner.total_pnl,
            roi_pct,
            win_rate_pct,
            peak_balance: inner.peak_balance,
            trough_balance: inner.trough_balance,
            target: self.target,
            target_progress_pct: if self.target > 0.0 {
                inner.balance / self.target * 100.0
            } else {
                0.0
            },
            efficiency_pct,
            can_fund: inner.balance >= self.position_size,
        }
    }

    /// Clone of the in-memory ledger rows
    pub async fn ledger_entries(&self) -> Vec<LedgerEntry> {
        self.inner.lock().await.ledger.entries().to_vec()
    }
}
