//! Rolling tick history for one open position
//!
//! Window queries take an explicit `now` so the math stays deterministic
//! under test. Samples older than twice the medium window are pruned on
//! every insert.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// One price/volume observation
#[derive(Debug, Clone, Copy)]
pub struct TickSample {
    pub at: Instant,
    pub price: f64,
    /// Traded volume attributed to this tick, in SOL
    pub volume: f64,
    /// Portion of `volume` from whale-sized single trades
    pub whale_volume: f64,
}

/// Rolling history of ticks for one position
#[derive(Debug)]
pub struct TickHistory {
    samples: VecDeque<TickSample>,
    max_age: Duration,
}

impl TickHistory {
    /// `medium_window` is the analyzer's longest lookback; history keeps
    /// twice that so previous-window comparisons always have data.
    pub fn new(medium_window: Duration) -> Self {
        Self {
            samples: VecDeque::with_capacity(128),
            max_age: medium_window * 2,
        }
    }

    pub fn record(&mut self, sample: TickSample) {
        let cutoff = sample.at.checked_sub(self.max_age);
        self.samples.push_back(sample);
        if let Some(cutoff) = cutoff {
            while let Some(front) = self.samples.front() {
                if front.at < cutoff {
                    self.samples.pop_front();
                } else {
                    break;
                }
            }
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    fn in_window(&self, now: Instant, window: Duration) -> impl Iterator<Item = &TickSample> {
        let start = now.checked_sub(window);
        self.samples
            .iter()
            .filter(move |s| start.map(|start| s.at >= start).unwrap_or(true) && s.at <= now)
    }

    /// Total volume over `[now - window, now]`
    pub fn window_volume(&self, now: Instant, window: Duration) -> f64 {
        self.in_window(now, window).map(|s| s.volume).sum()
    }

    /// Total volume over the preceding window `[now - 2w, now - w)`
    pub fn previous_window_volume(&self, now: Instant, window: Duration) -> f64 {
        match now.checked_sub(window) {
            Some(end) => self.window_volume(end, window),
            None => 0.0,
        }
    }

    /// Whale-attributed volume over `[now - window, now]`
    pub fn whale_window_volume(&self, now: Instant, window: Duration) -> f64 {
        self.in_window(now, window).map(|s| s.whale_volume).sum()
    }

    /// Price change over the window as a fraction (0.15 = +15%).
    /// None until at least two samples fall inside the window.
    pub fn price_change(&self, now: Instant, window: Duration) -> Option<f64> {
        let mut iter = self.in_window(now, window);
        let first = iter.next()?;
        let last = iter.last()?;
        if first.price <= 0.0 {
            return None;
        }
        Some((last.price - first.price) / first.price)
    }

    /// Higher-lows continuation: the window split into `segments` pieces
    /// shows strictly increasing per-segment minima.
    pub fn higher_lows(&self, now: Instant, window: Duration, segments: u32) -> bool {
        if segments < 2 {
            return false;
        }
        let seg_len = window / segments;
        let mut lows = Vec::with_capacity(segments as usize);

        for i in (0..segments).rev() {
            let seg_end = match now.checked_sub(seg_len * i) {
                Some(end) => end,
                None => return false,
            };
            let low = self
                .in_window(seg_end, seg_len)
                .map(|s| s.price)
                .fold(f64::INFINITY, f64::min);
            if !low.is_finite() {
                return false; // a segment with no samples breaks the pattern
            }
            lows.push(low);
        }

        lows.windows(2).all(|pair| pair[1] > pair[0])
    }

    /// Post-pump consolidation: the recent window trades in a band tighter
    /// than `band` (fraction of the window mean).
    pub fn is_consolidating(&self, now: Instant, window: Duration, band: f64) -> bool {
        let prices: Vec<f64> = self.in_window(now, window).map(|s| s.price).collect();
        if prices.len() < 4 {
            return false;
        }

        let high = prices.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        let low = prices.iter().cloned().fold(f64::INFINITY, f64::min);
        let mean = prices.iter().sum::<f64>() / prices.len() as f64;
        if mean <= 0.0 {
            return false;
        }

        (high - low) / mean < band
    }

    /// Pre-breakout volume compression: recent window volume dried up to
    /// under half of the preceding window.
    pub fn volume_compression(&self, now: Instant, window: Duration) -> bool {
        let previous = self.previous_window_volume(now, window);
        if previous <= 0.0 {
            return false;
        }
        self.window_volume(now, window) < previous * 0.5
    }
}
