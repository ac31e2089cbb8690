//! Candidate records for the admission pipeline

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Instant;

/// Detection metadata accompanying a new-token event
#[derive(Debug, Clone, Default)]
pub struct DetectionMeta {
    pub signature: String,
    pub name: Option<String>,
    pub symbol: Option<String>,
}

/// Lifecycle status of a candidate.
///
/// Terminal states are immutable once reached and the candidate is never
/// re-admitted for the same mint within a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CandidateStatus {
    Pending,
    Analyzing,
    ReadyToBuy,
    Bought,
    Rejected,
    PoolDepleted,
    Profit,
    Loss,
}

impl CandidateStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            CandidateStatus::Rejected
                | CandidateStatus::PoolDepleted
                | CandidateStatus::Profit
                | CandidateStatus::Loss
        )
    }
}

/// A detected asset under evaluation
#[derive(Debug, Clone)]
pub struct Candidate {
    pub mint: String,
    pub signature: String,
    pub name: Option<String>,
    pub symbol: Option<String>,
    pub detected_at: DateTime<Utc>,
    pub detected_instant: Instant,
    /// Stage 1 scoring attempts so far
    pub attempts: u32,
    pub last_scored_at: Option<DateTime<Utc>>,
    pub liquidity_sol: Option<f64>,
    pub status: CandidateStatus,
    /// Ordered record of everything that went wrong, newest last
    pub errors: Vec<String>,
}

impl Candidate {
    pub fn new(mint: &str, meta: DetectionMeta) -> Self {
        Self {
            mint: mint.to_string(),
            signature: meta.signature,
            name: meta.name,
            symbol: meta.symbol,
            detected_at: Utc::now(),
            detected_instant: Instant::now(),
            attempts: 0,
            last_scored_at: None,
            liquidity_sol: None,
            status: CandidateStatus::Pending,
            errors: Vec::new(),
        }
    }

    /// Seconds since detection
    pub fn age_secs(&self, now: Instant) -> u64 {
        now.duration_since(self.detected_instant).as_secs()
    }

    pub fn record_error(&mut self, error: impl Into<String>) {
        self.errors.push(error.into());
    }
}

/// Per-status queue counts for the periodic report
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueStatusCounts {
    pub pending: usize,
    pub analyzing: usize,
    pub ready_to_buy: usize,
    pub bought: usize,
    pub rejected: usize,
    pub pool_depleted: usize,
    pub profit: usize,
    pub loss: usize,
}

impl QueueStatusCounts {
    pub fn tally(&mut self, status: CandidateStatus) {
        match status {
            CandidateStatus::Pending => self.pending += 1,
            CandidateStatus::Analyzing => self.analyzing += 1,
            CandidateStatus::ReadyToBuy => self.ready_to_buy += 1,
            CandidateStatus::Bought => self.bought += 1,
            CandidateStatus::Rejected => self.rejected += 1,
            CandidateStatus::PoolDepleted => self.pool_depleted += 1,
            CandidateStatus::Profit => self.profit += 1,
            CandidateStatus::Loss => self.loss += 1,
        }
    }
}
