//! Position tracking
//!
//! An open, funded candidate being actively monitored. Positions are only
//! mutated through the book's owned-mutation API - `record_tick` and
//! `extend_hold` - which keeps the "hold deadline only grows" invariant
//! mechanical. Each position's tick handler is its sole writer, so the book
//! needs no cross-position locking.

pub mod monitor;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use std::time::Instant;

use std::collections::VecDeque;

use crate::analyzer::history::{TickHistory, TickSample};
use crate::analyzer::{HoldDecision, Signal, SignalAnalyzer};

/// Fired signals retained per position, newest last
const SIGNAL_HISTORY_CAP: usize = 32;

/// An open position
#[derive(Debug)]
pub struct Position {
    mint: String,
    entry_price: f64,
    current_price: f64,
    entry_time: DateTime<Utc>,
    entry_instant: Instant,
    max_hold_minutes: u64,
    total_volume: f64,
    history: TickHistory,
    signal_history: VecDeque<Signal>,
}

impl Position {
    fn new(
        mint: String,
        entry_price: f64,
        max_hold_minutes: u64,
        medium_window: std::time::Duration,
    ) -> Self {
        Self {
            mint,
            entry_price,
            current_price: entry_price,
            entry_time: Utc::now(),
            entry_instant: Instant::now(),
            max_hold_minutes,
            total_volume: 0.0,
            history: TickHistory::new(medium_window),
            signal_history: VecDeque::new(),
        }
    }

    fn note_signals(&mut self, signals: &[Signal]) {
        for signal in signals {
            self.signal_history.push_back(signal.clone());
            if self.signal_history.len() > SIGNAL_HISTORY_CAP {
                self.signal_history.pop_front();
            }
        }
    }

    /// Unrealized gain in percent
    pub fn gain_pct(&self) -> f64 {
        if self.entry_price <= 0.0 {
            return 0.0;
        }
        (self.current_price - self.entry_price) / self.entry_price * 100.0
    }

    pub fn hold_minutes(&self, now: Instant) -> f64 {
        now.duration_since(self.entry_instant).as_secs_f64() / 60.0
    }

    pub fn is_expired(&self, now: Instant) -> bool {
        self.hold_minutes(now) >= self.max_hold_minutes as f64
    }

    pub fn max_hold_minutes(&self) -> u64 {
        self.max_hold_minutes
    }
}

/// Read-only view for reporting
#[derive(Debug, Clone, Serialize)]
pub struct PositionSummary {
    pub mint: String,
    pub entry_price: f64,
    pub current_price: f64,
    pub gain_pct: f64,
    pub hold_minutes: f64,
    pub max_hold_minutes: u64,
    pub total_volume: f64,
    pub entry_time: DateTime<Utc>,
    /// Signals that fired over the retained window
    pub signals_observed: usize,
}

/// Book of open positions, keyed by mint
pub struct PositionBook {
    positions: DashMap<String, Position>,
    medium_window: std::time::Duration,
}

impl PositionBook {
    pub fn new(medium_window: std::time::Duration) -> Self {
        Self {
            positions: DashMap::new(),
            medium_window,
        }
    }

    /// Open a position after a successful buy
    pub fn open(&self, mint: &str, entry_price: f64, max_hold_minutes: u64) {
        self.positions.insert(
            mint.to_string(),
            Position::new(
                mint.to_string(),
                entry_price,
                max_hold_minutes,
                self.medium_window,
            ),
        );
    }

    pub fn contains(&self, mint: &str) -> bool {
        self.positions.contains_key(mint)
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Apply one tick: price update, volume accumulation, history append.
    /// Returns false when no position is open for the mint.
    pub fn record_tick(&self, mint: &str, sample: TickSample) -> bool {
        match self.positions.get_mut(mint) {
            Some(mut position) => {
                position.current_price = sample.price;
                position.total_volume += sample.volume;
                position.history.record(sample);
                true
            }
            None => false,
        }
    }

    /// Run the analyzer against the position's rolling history. Fired
    /// signals are noted on the position (decision input, not authoritative
    /// state).
    pub fn analyze(
        &self,
        mint: &str,
        analyzer: &SignalAnalyzer,
        now: Instant,
    ) -> Option<HoldDecision> {
        let mut position = self.positions.get_mut(mint)?;
        let decision = analyzer.evaluate(&position.history, position.gain_pct(), now);
        position.note_signals(&decision.signals);
        Some(decision)
    }

    /// Extend the hold deadline. The only mutator of `max_hold_minutes`:
    /// strictly increasing and cumulative. Returns the new deadline.
    pub fn extend_hold(&self, mint: &str, additional_minutes: u64) -> Option<u64> {
        let mut position = self.positions.get_mut(mint)?;
        if additional_minutes > 0 {
            position.max_hold_minutes =
                position.max_hold_minutes.saturating_add(additional_minutes);
        }
        Some(position.max_hold_minutes)
    }

    pub fn is_expired(&self, mint: &str, now: Instant) -> bool {
        self.positions
            .get(mint)
            .map(|p| p.is_expired(now))
            .unwrap_or(false)
    }

    /// Hold time so far, in minutes
    pub fn hold_minutes(&self, mint: &str, now: Instant) -> Option<f64> {
        self.positions.get(mint).map(|p| p.hold_minutes(now))
    }

    /// Close out a position (after settlement); returns its final summary
    pub fn remove(&self, mint: &str) -> Option<PositionSummary> {
        let (_, position) = self.positions.remove(mint)?;
        Some(summarize(&position, Instant::now()))
    }

    pub fn summaries(&self) -> Vec<PositionSummary> {
        let now = Instant::now();
        self.positions
            .iter()
            .map(|entry| summarize(entry.value(), now))
            .collect()
    }
}

fn summarize(position: &Position, now: Instant) -> PositionSummary {
    PositionSummary {
        mint: position.mint.clone(),
        entry_price: position.entry_price,
        current_price: position.current_price,
        gain_pct: position.gain_pct(),
        hold_minutes: position.hold_minutes(now),
        max_hold_minutes: position.max_hold_minutes,
        total_volume: position.total_volume,
        entry_time: position.entry_time,
        signals_observed: position.signal_history.len(),
    }
}
